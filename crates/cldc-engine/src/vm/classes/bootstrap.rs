//! Core library classes

use crate::bytecode::{assemble, AssembleError, ClassFile};
use crate::vm::VmResult;
use once_cell::sync::Lazy;

const CORE_SOURCE: &str = include_str!("rt.jasm");

static CORE_CLASSES: Lazy<Result<Vec<ClassFile>, AssembleError>> = Lazy::new(|| assemble(CORE_SOURCE));

/// Class files of the core library, assembled once per process
pub(super) fn core_classes() -> VmResult<&'static [ClassFile]> {
    match &*CORE_CLASSES {
        Ok(classes) => Ok(classes),
        Err(e) => Err(crate::vm::VmError::Internal(format!("core library: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_library_assembles() {
        let classes = core_classes().unwrap();
        let names: Vec<&str> = classes.iter().map(|c| c.name.as_str()).collect();
        for expected in [
            "java/lang/Object",
            "java/lang/Thread",
            "java/lang/String",
            "java/lang/Throwable",
            "java/lang/IllegalMonitorStateException",
            "com/sun/cldchi/io/ConsoleOutputStream",
        ] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
        let object = classes.iter().find(|c| c.name == "java/lang/Object").unwrap();
        assert_eq!(object.super_name, None);
    }
}
