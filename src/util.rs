// Copyright (c) 2017-2018 ETH Zurich
// Fabian Schuiki <fschuiki@iis.ee.ethz.ch>

//! Various utilities.

#![deny(missing_docs)]

use std::collections::BTreeSet;
use std::fs::File;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

/// Re-export owo_colors for use in macros.
pub use owo_colors::OwoColorize;

/// Create a human-readable list of the form `a, b, and c`.
pub fn string_list<I, T>(mut iter: I, sep: &str, con: &str) -> Option<String>
where
    I: Iterator<Item = T>,
    T: AsRef<str>,
{
    let mut buffer = match iter.next() {
        Some(i) => String::from(i.as_ref()),
        None => return None,
    };
    let mut last = match iter.next() {
        Some(i) => i,
        None => return Some(buffer),
    };
    let mut had_separator = false;
    for i in iter {
        buffer.push_str(sep);
        buffer.push(' ');
        buffer.push_str(last.as_ref());
        last = i;
        had_separator = true;
    }
    if had_separator {
        buffer.push_str(sep);
    }
    buffer.push(' ');
    buffer.push_str(con);
    buffer.push(' ');
    buffer.push_str(last.as_ref());
    Some(buffer)
}

/// Read an entire file into a string.
pub fn read_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(contents)
}

/// Write an entire string to a file.
pub fn write_file(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents.as_bytes())?;
    Ok(())
}

/// Normalize a path to be relative to `root` with forward slashes.
///
/// Paths already relative are kept as-is apart from separator normalization.
/// Compiler logs mix absolute and relative spellings of the same file; this
/// is the canonical form used for all comparisons and for emitted output.
pub fn normalize_path(path: &Path, root: &Path) -> PathBuf {
    let rel = if path.is_absolute() {
        path.strip_prefix(root).unwrap_or(path)
    } else {
        path
    };
    PathBuf::from(rel.to_string_lossy().replace('\\', "/"))
}

/// Split a path into lowercase tokens.
///
/// Splits on path separators, `_`, `-`, `.`, and camel-case boundaries, so
/// `rtl/VivadoSim/top_tb.sv` yields `rtl`, `vivado`, `sim`, `top`, `tb`, `sv`.
pub fn path_tokens(path: &str) -> BTreeSet<String> {
    let mut tokens = BTreeSet::new();
    for raw in path.split(['/', '\\', '_', '-', '.']) {
        if raw.is_empty() {
            continue;
        }
        let mut word = String::new();
        let mut prev_lower = false;
        for c in raw.chars() {
            if c.is_uppercase() && prev_lower {
                tokens.insert(std::mem::take(&mut word));
            }
            prev_lower = c.is_lowercase() || c.is_numeric();
            word.extend(c.to_lowercase());
        }
        if !word.is_empty() {
            tokens.insert(word);
        }
    }
    tokens
}

/// The basename of a path as a lowercase string, without extension.
pub fn file_stem_lower(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Format time duration with proper units.
pub fn fmt_duration(duration: std::time::Duration) -> String {
    match duration.as_millis() {
        t if t < 1000 => format!("in {}ms", t),
        t if t < 60_000 => format!("in {:.1}s", t as f64 / 1000.0),
        t => format!("in {:.1}min", t as f64 / 60000.0),
    }
}

/// Format for unit and repository names in diagnostic messages.
#[macro_export]
macro_rules! fmt_unit {
    ($unit:expr) => {
        $crate::util::OwoColorize::bold(&$unit)
    };
}

/// Format for `path` fields in diagnostic messages.
#[macro_export]
macro_rules! fmt_path {
    ($path:expr) => {
        $crate::util::OwoColorize::underline(&$path)
    };
}

/// Format for `field` names in diagnostic messages.
#[macro_export]
macro_rules! fmt_field {
    ($field:expr) => {
        $crate::util::OwoColorize::italic(&$field)
    };
}

/// Format a value with a given style.
#[macro_export]
macro_rules! fmt_with_style {
    ($value:expr, $style:expr) => {
        $crate::util::OwoColorize::style(&$value, $style)
    };
}

/// Format a value dimmed.
#[macro_export]
macro_rules! fmt_dim {
    ($value:expr) => {
        $crate::util::OwoColorize::dimmed(&$value)
    };
}
