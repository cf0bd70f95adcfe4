//! Parsing of filesystem size strings.

/// Parses a size string: a decimal integer with an optional `K`, `M` or `G`
/// suffix (decimal multipliers). A bare integer is a byte count. Returns
/// `None` for anything else.
pub fn parse(s: &str) -> Option<i64> {
    let digits = s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let number: i64 = s[..digits].parse().ok()?;
    let factor = match &s[digits..] {
        "" => 1,
        "K" => 1_000,
        "M" => 1_000_000,
        "G" => 1_000_000_000,
        _ => return None,
    };
    number.checked_mul(factor)
}
