//! AirTrace codec/config CLI support library.
//!
//! Kept thin on purpose: the binary in `main.rs` is the only consumer.
//! Splitting the command implementations out of `main.rs` keeps them
//! testable without spawning a process.

use std::io::{self, Read, Write};
use std::path::Path;

use airtrace_core::{
    config::load_sim_config,
    envelope::{
        convert_external_io_envelope, list_io_envelope_codecs, parse_io_envelope_format,
    },
};

/// Reads `--input <path|->` fully into a `String`.
pub fn read_input(path: &str) -> io::Result<String> {
    if path == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path)
    }
}

/// Writes to `--output <path|->`.
pub fn write_output(path: &str, contents: &str) -> io::Result<()> {
    if path == "-" {
        io::stdout().write_all(contents.as_bytes())
    } else {
        std::fs::write(path, contents)
    }
}

/// Implements `airtrace codec --list-formats`.
pub fn list_formats() -> String {
    list_io_envelope_codecs()
        .into_iter()
        .map(|descriptor| format!("{} ({})", descriptor.canonical_name, descriptor.aliases.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Implements `airtrace codec --in-format <a> --out-format <b>`. Returns the
/// converted payload on success, or a human-readable error otherwise.
pub fn convert(in_format: &str, out_format: &str, input: &str) -> Result<String, String> {
    if parse_io_envelope_format(in_format).is_none() {
        return Err(format!("unsupported input format: {in_format}"));
    }
    if parse_io_envelope_format(out_format).is_none() {
        return Err(format!("unsupported output format: {out_format}"));
    }
    convert_external_io_envelope(input, in_format, out_format).map_err(|e| e.0)
}

/// Implements `airtrace config-check <path>`. Returns `(ok, report)`.
pub fn check_config(path: &Path) -> (bool, String) {
    let result = load_sim_config(path);
    if result.ok {
        (true, "config ok".to_string())
    } else {
        let lines: Vec<String> = result
            .issues
            .iter()
            .map(|issue| format!("{}: {}", issue.key, issue.message))
            .collect();
        (false, lines.join("\n"))
    }
}
