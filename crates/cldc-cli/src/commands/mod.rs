//! Subcommand implementations

pub mod check;
pub mod run;

use anyhow::Context;
use std::path::Path;

/// Read a `.jasm` source file
pub(crate) fn read_source(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Internal class name from a dotted or slashed one
pub(crate) fn internal_name(name: &str) -> String {
    name.replace('.', "/")
}
