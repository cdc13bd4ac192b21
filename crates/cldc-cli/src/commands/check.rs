//! `cldc check`: assemble sources without running them.

use super::read_source;
use anyhow::Context;
use cldc_engine::bytecode::{AccessFlags, ClassFile};
use std::fmt::Write as _;
use std::path::PathBuf;

pub fn execute(files: &[PathBuf]) -> anyhow::Result<()> {
    for file in files {
        let source = read_source(file)?;
        let classes = cldc_engine::assemble(&source)
            .with_context(|| format!("failed to assemble {}", file.display()))?;
        print!("{}", describe(&classes));
    }
    Ok(())
}

fn modifiers(flags: AccessFlags) -> String {
    let mut out = String::new();
    for (set, word) in [
        (flags.is_static(), "static "),
        (flags.is_synchronized(), "synchronized "),
        (flags.is_native(), "native "),
        (flags.is_abstract(), "abstract "),
    ] {
        if set {
            out.push_str(word);
        }
    }
    out
}

/// One line per class, then one indented line per field and method
pub(crate) fn describe(classes: &[ClassFile]) -> String {
    let mut out = String::new();
    for class in classes {
        let kind = if class.flags.is_interface() { "interface" } else { "class" };
        let _ = write!(out, "{} {}", kind, class.name);
        if let Some(parent) = &class.super_name {
            let _ = write!(out, " extends {}", parent);
        }
        if !class.interfaces.is_empty() {
            let _ = write!(out, " implements {}", class.interfaces.join(", "));
        }
        out.push('\n');
        for field in &class.fields {
            let _ = writeln!(out, "  {}{} {}", modifiers(field.flags), field.name, field.descriptor);
        }
        for method in &class.methods {
            let _ = writeln!(
                out,
                "  {}{}{} ({} bytes)",
                modifiers(method.flags),
                method.name,
                method.descriptor,
                method.code.len()
            );
        }
    }
    out
}
