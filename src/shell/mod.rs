//! The line-oriented shell around the filesystem engine.
//!
//! One command per line, UNIX-style names, one result line per command.
//! Until the image has been formatted only a small command subset is
//! accepted (limited mode).

use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;
use std::process::exit;
use vfs::FsEngine;
use vfs::engine::ItemKind;
use vfs::error::{FsError, Result};
use vfs::prompt::prompt;
use vfs::{path, size};

/// Commands that work before the filesystem is formatted.
const LIMITED_COMMANDS: &[&str] = &["help", "pwd", "load", "format", "exit", "quit"];

/// The interactive shell bound to one engine.
pub struct Shell {
    engine: FsEngine,
}

impl Shell {
    pub fn new(engine: FsEngine) -> Self {
        Self { engine }
    }

    /// Runs the interactive loop until end of input or `exit`/`quit`.
    pub fn run(&mut self) {
        if !self.engine.is_formatted() {
            println!("No filesystem in the backing file. Limited mode; use `format <size>`.");
        }
        while let Some(line) = prompt("> ") {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            self.execute(line);
        }
    }

    /// Dispatches one command line.
    pub fn execute(&mut self, input: &str) {
        let mut parts = input.split_whitespace();
        let Some(cmd) = parts.next() else {
            return;
        };
        let args: Vec<&str> = parts.collect();

        if is_known(cmd) && !LIMITED_COMMANDS.contains(&cmd) && !self.engine.is_formatted() {
            println!("{}", FsError::NotAvailable);
            println!("Use `format <size>` to leave limited mode.");
            return;
        }

        match cmd {
            "help" => self.help(),
            "exit" | "quit" => {
                println!("Goodbye.");
                exit(0);
            }
            "pwd" => println!("{}", self.engine.pwd()),
            "format" => self.format(&args),
            "load" => self.load(&args),
            "cd" => self.cd(&args),
            "ls" => self.ls(&args),
            "mkdir" => self.mkdir(&args),
            "rmdir" => self.rmdir(&args),
            "rm" => report(args1(&args).and_then(|p| self.engine.rm(p))),
            "cp" => report(args2(&args).and_then(|(a, b)| self.engine.cp(a, b))),
            "mv" => report(args2(&args).and_then(|(a, b)| self.engine.mv(a, b))),
            "ln" => report(args2(&args).and_then(|(a, b)| self.engine.ln(a, b))),
            "cat" => self.cat(&args),
            "info" => self.info(&args),
            "incp" => self.incp(&args),
            "outcp" => self.outcp(&args),
            _ => println!("Unknown command: {cmd}"),
        }
    }

    fn help(&self) {
        println!();
        if self.engine.is_formatted() {
            println!("Available commands:");
            println!(" help           Show this text");
            println!(" exit/quit      Leave the shell");
            println!(" format <size>  Create a fresh filesystem (size like 600K, 1M, 2G)");
            println!(" pwd            Print the current path");
            println!(" cd <path>      Change the current directory");
            println!(" ls [path]      List a directory (+ directories, - files)");
            println!(" mkdir <path>   Create a directory");
            println!(" rmdir <path>   Remove an empty directory");
            println!(" cat <file>     Print a file's contents");
            println!(" info [path]    Show inode and block mapping details");
            println!(" cp <src> <dst>   Copy a file");
            println!(" mv <src> <dst>   Move or rename a file");
            println!(" rm <file>        Remove a file (drops one hard link)");
            println!(" ln <src> <dst>   Create a hard link to a file");
            println!(" incp <host> <vfs>   Import a file from the host filesystem");
            println!(" outcp <vfs> <host>  Export a file to the host filesystem");
            println!(" load <host>    Run commands from a host file, one per line");
        } else {
            println!("Limited mode commands:");
            println!(" help           Show this text");
            println!(" exit/quit      Leave the shell");
            println!(" pwd            Print the current path");
            println!(" format <size>  Create a fresh filesystem (size like 600K, 1M, 2G)");
            println!(" load <host>    Run commands from a host file, one per line");
            println!("Use `format` to leave limited mode.");
        }
        println!();
    }

    fn format(&mut self, args: &[&str]) {
        let result = args1(args).and_then(|arg| {
            let size = size::parse(arg).ok_or(FsError::InvalidSize)?;
            self.engine.format(size)
        });
        match result {
            Ok(()) => println!("OK"),
            Err(FsError::Io(_)) => println!("CANNOT CREATE FILE"),
            Err(e) => println!("{e}"),
        }
    }

    /// Executes commands from a host file, echoing each one.
    fn load(&mut self, args: &[&str]) {
        let script = match args1(args).map(fs::read_to_string) {
            Ok(Ok(script)) => script,
            Ok(Err(_)) => {
                println!("{}", FsError::FileNotFound);
                return;
            }
            Err(e) => {
                println!("{e}");
                return;
            }
        };
        for line in script.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            println!("> {line}");
            self.execute(line);
        }
        println!("OK");
    }

    fn cd(&mut self, args: &[&str]) {
        match args1(args).and_then(|p| self.engine.cd(p)) {
            Ok(path) => println!("{path}"),
            Err(e) => println!("{e}"),
        }
    }

    fn ls(&mut self, args: &[&str]) {
        match args_at_most_one(args).and_then(|p| self.engine.ls(p)) {
            Ok(entries) => {
                for (kind, name) in entries {
                    let sigil = match kind {
                        ItemKind::Directory => '+',
                        ItemKind::File => '-',
                    };
                    println!("{sigil}{name}");
                }
            }
            Err(e) => println!("{e}"),
        }
    }

    fn mkdir(&mut self, args: &[&str]) {
        report(args1(args).and_then(|arg| {
            let (dir, name) = path::split(arg);
            self.engine.mkdir(dir, name)
        }));
    }

    fn rmdir(&mut self, args: &[&str]) {
        report(args1(args).and_then(|arg| {
            let (dir, name) = path::split(arg);
            self.engine.rmdir(dir, name)
        }));
    }

    fn cat(&mut self, args: &[&str]) {
        match args1(args).and_then(|p| self.engine.cat(p)) {
            Ok(content) => {
                let stdout = io::stdout();
                let _ = stdout.lock().write_all(&content);
                println!();
            }
            Err(e) => println!("{e}"),
        }
    }

    fn info(&mut self, args: &[&str]) {
        match args_at_most_one(args).and_then(|p| self.engine.info(p)) {
            Ok(text) => println!("{text}"),
            Err(e) => println!("{e}"),
        }
    }

    fn incp(&mut self, args: &[&str]) {
        report(args2(args).and_then(|(host, dst)| self.engine.incp(Path::new(host), dst)));
    }

    fn outcp(&mut self, args: &[&str]) {
        match args2(args) {
            Ok((src, host)) => match self.engine.outcp(src, Path::new(host)) {
                Ok(()) => println!("OK"),
                Err(FsError::Io(_)) => println!("CANNOT OPEN HOST FILE: {host}"),
                Err(e) => println!("{e}"),
            },
            Err(e) => println!("{e}"),
        }
    }
}

fn is_known(cmd: &str) -> bool {
    matches!(
        cmd,
        "help"
            | "exit"
            | "quit"
            | "pwd"
            | "format"
            | "load"
            | "cd"
            | "ls"
            | "mkdir"
            | "rmdir"
            | "rm"
            | "cp"
            | "mv"
            | "ln"
            | "cat"
            | "info"
            | "incp"
            | "outcp"
    )
}

/// Prints the single result line of a command.
fn report(result: Result<()>) {
    match result {
        Ok(()) => println!("OK"),
        Err(e) => println!("{e}"),
    }
}

fn args1<'a>(args: &[&'a str]) -> Result<&'a str> {
    match args {
        &[a] => Ok(a),
        _ => Err(FsError::InvalidArgument),
    }
}

fn args2<'a>(args: &[&'a str]) -> Result<(&'a str, &'a str)> {
    match args {
        &[a, b] => Ok((a, b)),
        _ => Err(FsError::InvalidArgument),
    }
}

fn args_at_most_one<'a>(args: &[&'a str]) -> Result<Option<&'a str>> {
    match args {
        [] => Ok(None),
        &[a] => Ok(Some(a)),
        _ => Err(FsError::InvalidArgument),
    }
}
