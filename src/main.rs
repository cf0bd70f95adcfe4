//! The `vfsh` shell: an inode-based filesystem hosted in a single backing
//! file, driven by UNIX-style commands.

mod shell;

use std::env;
use std::path::PathBuf;
use std::process::exit;
use vfs::FsEngine;

fn main() {
    let mut args = env::args_os();
    args.next();
    let Some(path) = args.next() else {
        eprintln!("vfsh: error: specify the path to a backing file");
        exit(1);
    };
    if args.next().is_some() {
        eprintln!("vfsh: error: too many arguments");
        eprintln!("Usage: vfsh <backing-file>");
        exit(1);
    }

    let engine = FsEngine::open(PathBuf::from(path));
    shell::Shell::new(engine).run();
}
