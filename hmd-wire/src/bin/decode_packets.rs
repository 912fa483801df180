//! Decode a dump of relay datagrams.
//!
//! Input is a text file with one hex-encoded datagram per line (whitespace
//! between bytes is allowed, `#` starts a comment). Each datagram is run
//! through the inbound decoder and printed with its result.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use hmd_wire::{decode, decode_reference_data};

#[derive(Parser, Debug)]
#[command(author, version, about = "Decode hex dumps of HMD relay datagrams", long_about = None)]
struct Args {
    /// Text file with one hex datagram per line
    input: PathBuf,

    /// Only print the summary line
    #[arg(long)]
    summary_only: bool,
}

/// Parse a line of hex digits, ignoring whitespace.
fn parse_hex(line: &str) -> Result<Vec<u8>> {
    let digits: Vec<u8> = line
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if let Some(bad) = digits.iter().find(|b| !b.is_ascii_hexdigit()) {
        anyhow::bail!("invalid hex digit in {:?} (byte 0x{bad:02x})", line);
    }
    if digits.len() % 2 != 0 {
        anyhow::bail!("odd number of hex digits");
    }
    digits
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).context("non-ASCII hex digit")?;
            u8::from_str_radix(pair, 16).with_context(|| format!("invalid hex byte {pair:?}"))
        })
        .collect()
}

fn main() -> Result<()> {
    let args = Args::parse();

    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    let mut decoded = 0usize;
    let mut rejected = 0usize;
    let mut telemetry = 0usize;

    for (line_no, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        let packet = parse_hex(line).with_context(|| format!("line {}", line_no + 1))?;

        // Outbound reference batches show up in captures of both directions
        if let Ok(batch) = decode_reference_data(&packet) {
            decoded += 1;
            if !args.summary_only {
                println!(
                    "{:>5}: reference data {} / {} ({} samples)",
                    line_no + 1,
                    batch.plugin_name,
                    batch.position_key,
                    batch.samples.len()
                );
            }
            continue;
        }

        match decode(&packet) {
            Ok(message) => {
                decoded += 1;
                if message.is_telemetry() {
                    telemetry += 1;
                }
                if !args.summary_only {
                    println!("{:>5}: {message:?}", line_no + 1);
                }
            }
            Err(e) => {
                rejected += 1;
                if !args.summary_only {
                    println!("{:>5}: rejected ({e})", line_no + 1);
                }
            }
        }
    }

    println!("Decoded {decoded} datagrams ({telemetry} telemetry), rejected {rejected}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_with_spacing() {
        assert_eq!(parse_hex("30 49").unwrap(), b"0I");
        assert_eq!(parse_hex("5a01").unwrap(), vec![0x5a, 0x01]);
    }

    #[test]
    fn test_parse_hex_rejects_bad_input() {
        assert!(parse_hex("5a0").is_err());
        assert!(parse_hex("zz").is_err());
        // Multi-byte characters are an error, not a panic
        assert!(parse_hex("a\u{e9}1").is_err());
        assert!(parse_hex("\u{e9}\u{e9}").is_err());
    }
}
