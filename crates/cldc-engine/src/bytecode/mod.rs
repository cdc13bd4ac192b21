//! Bytecode model: instruction set, descriptors, class files and the text
//! assembler used to produce them.

pub mod assembler;
pub mod class;
pub mod descriptor;
pub mod opcode;

pub use assembler::{assemble, AssembleError};
pub use class::{
    AccessFlags, ClassFile, Constant, ConstantPool, ExceptionEntry, FieldDef, MemberRef,
    MethodDef,
};
pub use descriptor::{DescriptorError, Kind, MethodSignature};
pub use opcode::{Opcode, Operands};
