//! `cldc run`: assemble, load and run a main class.

use super::{internal_name, read_source};
use crate::config::{self, Overrides};
use anyhow::Context;
use cldc_engine::Vm;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Exit status when a context died with an uncaught exception
pub const EXIT_UNCAUGHT: i32 = 1;
/// Exit status when contexts are left blocked with nothing to wake them
pub const EXIT_DEADLOCK: i32 = 2;

/// Run `main` and return the process exit status
pub fn execute(
    files: &[PathBuf],
    main: &str,
    config_path: Option<&Path>,
    overrides: Overrides,
) -> anyhow::Result<i32> {
    let options = config::load(config_path, overrides)?;
    tracing::debug!(?options, "vm options");
    let mut vm = Vm::new(options).context("failed to create VM")?;

    for file in files {
        let source = read_source(file)?;
        let classes = vm
            .load_source(&source)
            .with_context(|| format!("failed to load {}", file.display()))?;
        tracing::debug!(file = %file.display(), count = classes.len(), "loaded classes");
    }

    let main = internal_name(main);
    vm.run_main(&main)
        .with_context(|| format!("cannot run main class {}", main))?;
    let report = vm.run_until_idle().context("engine failure")?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(vm.runtime().console())?;
    stdout.flush()?;

    for failure in &report.failures {
        eprintln!("Uncaught exception in {}", failure);
    }
    if !report.failures.is_empty() {
        return Ok(EXIT_UNCAUGHT);
    }
    if !report.blocked.is_empty() {
        eprintln!("{} context(s) blocked with nothing left to wake them", report.blocked.len());
        return Ok(EXIT_DEADLOCK);
    }
    Ok(0)
}
