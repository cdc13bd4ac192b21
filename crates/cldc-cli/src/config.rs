//! `cldc.toml` loading
//!
//! ```toml
//! [vm]
//! policy = "round-robin"
//! window_ms = 20
//! print_all_exceptions = true
//! ```
//!
//! Every key is optional. Command-line flags win over the file.

use anyhow::Context;
use cldc_engine::{SchedulingPolicy, VmOptions};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    vm: VmOptions,
}

/// Flag values that override the configuration file
#[derive(Debug, Default, Clone, Copy)]
pub struct Overrides {
    pub policy: Option<SchedulingPolicy>,
    pub window_ms: Option<u64>,
    pub trace: bool,
}

/// Parse the `[vm]` table of a configuration document
pub fn parse(text: &str) -> anyhow::Result<VmOptions> {
    let file: ConfigFile = toml::from_str(text)?;
    Ok(file.vm)
}

/// VM options from `path` (defaults when absent) with `overrides` applied
pub fn load(path: Option<&Path>, overrides: Overrides) -> anyhow::Result<VmOptions> {
    let mut options = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            parse(&text).with_context(|| format!("invalid config {}", path.display()))?
        }
        None => VmOptions::default(),
    };

    if let Some(policy) = overrides.policy {
        options.policy = policy;
    }
    if let Some(window_ms) = overrides.window_ms {
        options.window_ms = window_ms;
    }
    if overrides.trace {
        options.trace_instructions = true;
        options.trace_frames = true;
    }
    if !(1..=3).contains(&options.isolate_priority) {
        anyhow::bail!("isolate_priority must be between 1 and 3, got {}", options.isolate_priority);
    }
    Ok(options)
}
