//! CLDC instruction set
//!
//! One-byte opcodes of the CLDC subset of the JVM instruction set, plus the
//! synthetic `invokenative` instruction that native method frames execute.
//! The enum is generated from a single table so that decoding, mnemonics and
//! assembly never disagree.

/// Shape of the operands that follow an opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    /// No operands
    None,
    /// Unsigned 8-bit local variable index (widened by `wide`)
    Local,
    /// Signed 8-bit immediate (`bipush`)
    Byte,
    /// Signed 16-bit immediate (`sipush`)
    Short,
    /// 8-bit constant pool index (`ldc`)
    PoolIndex8,
    /// 16-bit constant pool index
    PoolIndex16,
    /// Local index and signed 8-bit increment (`iinc`)
    Increment,
    /// Signed 16-bit branch offset
    Branch16,
    /// Signed 32-bit branch offset
    Branch32,
    /// Aligned `tableswitch` payload
    TableSwitch,
    /// Aligned `lookupswitch` payload
    LookupSwitch,
    /// Primitive array type code (`newarray`)
    ArrayType,
    /// Pool index, argument count and a zero byte (`invokeinterface`)
    Interface,
    /// Pool index and dimension count (`multianewarray`)
    MultiArray,
    /// Modified instruction follows (`wide`)
    Wide,
}

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $variant:ident = $byte:literal, $mnemonic:literal, $operands:ident; )*) => {
        /// Bytecode opcode enumeration
        ///
        /// Every variant carries its JVM encoding as the discriminant.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $( $(#[$doc])* $variant = $byte, )*
        }

        impl Opcode {
            /// Decode an opcode byte
            pub fn from_u8(byte: u8) -> Option<Self> {
                match byte {
                    $( $byte => Some(Opcode::$variant), )*
                    _ => None,
                }
            }

            /// Mnemonic used by the assembler and in traces
            pub fn name(self) -> &'static str {
                match self {
                    $( Opcode::$variant => $mnemonic, )*
                }
            }

            /// Look up an opcode by mnemonic
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $( $mnemonic => Some(Opcode::$variant), )*
                    _ => None,
                }
            }

            /// Operand layout following the opcode byte
            pub fn operands(self) -> Operands {
                match self {
                    $( Opcode::$variant => Operands::$operands, )*
                }
            }
        }
    };
}

opcodes! {
    // ===== Constants (0x00-0x14) =====
    /// Do nothing
    Nop = 0x00, "nop", None;
    /// Push null
    AconstNull = 0x01, "aconst_null", None;
    /// Push int -1
    IconstM1 = 0x02, "iconst_m1", None;
    /// Push int 0
    Iconst0 = 0x03, "iconst_0", None;
    /// Push int 1
    Iconst1 = 0x04, "iconst_1", None;
    /// Push int 2
    Iconst2 = 0x05, "iconst_2", None;
    /// Push int 3
    Iconst3 = 0x06, "iconst_3", None;
    /// Push int 4
    Iconst4 = 0x07, "iconst_4", None;
    /// Push int 5
    Iconst5 = 0x08, "iconst_5", None;
    /// Push long 0
    Lconst0 = 0x09, "lconst_0", None;
    /// Push long 1
    Lconst1 = 0x0a, "lconst_1", None;
    /// Push float 0
    Fconst0 = 0x0b, "fconst_0", None;
    /// Push float 1
    Fconst1 = 0x0c, "fconst_1", None;
    /// Push float 2
    Fconst2 = 0x0d, "fconst_2", None;
    /// Push double 0
    Dconst0 = 0x0e, "dconst_0", None;
    /// Push double 1
    Dconst1 = 0x0f, "dconst_1", None;
    /// Push sign-extended byte
    Bipush = 0x10, "bipush", Byte;
    /// Push sign-extended short
    Sipush = 0x11, "sipush", Short;
    /// Push int, float, string or class constant (8-bit index)
    Ldc = 0x12, "ldc", PoolIndex8;
    /// Push int, float, string or class constant (16-bit index)
    LdcW = 0x13, "ldc_w", PoolIndex16;
    /// Push long or double constant
    Ldc2W = 0x14, "ldc2_w", PoolIndex16;

    // ===== Loads (0x15-0x35) =====
    /// Load int local
    Iload = 0x15, "iload", Local;
    /// Load long local
    Lload = 0x16, "lload", Local;
    /// Load float local
    Fload = 0x17, "fload", Local;
    /// Load double local
    Dload = 0x18, "dload", Local;
    /// Load reference local
    Aload = 0x19, "aload", Local;
    /// Load int local 0
    Iload0 = 0x1a, "iload_0", None;
    /// Load int local 1
    Iload1 = 0x1b, "iload_1", None;
    /// Load int local 2
    Iload2 = 0x1c, "iload_2", None;
    /// Load int local 3
    Iload3 = 0x1d, "iload_3", None;
    /// Load long local 0
    Lload0 = 0x1e, "lload_0", None;
    /// Load long local 1
    Lload1 = 0x1f, "lload_1", None;
    /// Load long local 2
    Lload2 = 0x20, "lload_2", None;
    /// Load long local 3
    Lload3 = 0x21, "lload_3", None;
    /// Load float local 0
    Fload0 = 0x22, "fload_0", None;
    /// Load float local 1
    Fload1 = 0x23, "fload_1", None;
    /// Load float local 2
    Fload2 = 0x24, "fload_2", None;
    /// Load float local 3
    Fload3 = 0x25, "fload_3", None;
    /// Load double local 0
    Dload0 = 0x26, "dload_0", None;
    /// Load double local 1
    Dload1 = 0x27, "dload_1", None;
    /// Load double local 2
    Dload2 = 0x28, "dload_2", None;
    /// Load double local 3
    Dload3 = 0x29, "dload_3", None;
    /// Load reference local 0
    Aload0 = 0x2a, "aload_0", None;
    /// Load reference local 1
    Aload1 = 0x2b, "aload_1", None;
    /// Load reference local 2
    Aload2 = 0x2c, "aload_2", None;
    /// Load reference local 3
    Aload3 = 0x2d, "aload_3", None;
    /// Load int array element
    Iaload = 0x2e, "iaload", None;
    /// Load long array element
    Laload = 0x2f, "laload", None;
    /// Load float array element
    Faload = 0x30, "faload", None;
    /// Load double array element
    Daload = 0x31, "daload", None;
    /// Load reference array element
    Aaload = 0x32, "aaload", None;
    /// Load byte or boolean array element
    Baload = 0x33, "baload", None;
    /// Load char array element
    Caload = 0x34, "caload", None;
    /// Load short array element
    Saload = 0x35, "saload", None;

    // ===== Stores (0x36-0x56) =====
    /// Store int local
    Istore = 0x36, "istore", Local;
    /// Store long local
    Lstore = 0x37, "lstore", Local;
    /// Store float local
    Fstore = 0x38, "fstore", Local;
    /// Store double local
    Dstore = 0x39, "dstore", Local;
    /// Store reference local
    Astore = 0x3a, "astore", Local;
    /// Store int local 0
    Istore0 = 0x3b, "istore_0", None;
    /// Store int local 1
    Istore1 = 0x3c, "istore_1", None;
    /// Store int local 2
    Istore2 = 0x3d, "istore_2", None;
    /// Store int local 3
    Istore3 = 0x3e, "istore_3", None;
    /// Store long local 0
    Lstore0 = 0x3f, "lstore_0", None;
    /// Store long local 1
    Lstore1 = 0x40, "lstore_1", None;
    /// Store long local 2
    Lstore2 = 0x41, "lstore_2", None;
    /// Store long local 3
    Lstore3 = 0x42, "lstore_3", None;
    /// Store float local 0
    Fstore0 = 0x43, "fstore_0", None;
    /// Store float local 1
    Fstore1 = 0x44, "fstore_1", None;
    /// Store float local 2
    Fstore2 = 0x45, "fstore_2", None;
    /// Store float local 3
    Fstore3 = 0x46, "fstore_3", None;
    /// Store double local 0
    Dstore0 = 0x47, "dstore_0", None;
    /// Store double local 1
    Dstore1 = 0x48, "dstore_1", None;
    /// Store double local 2
    Dstore2 = 0x49, "dstore_2", None;
    /// Store double local 3
    Dstore3 = 0x4a, "dstore_3", None;
    /// Store reference local 0
    Astore0 = 0x4b, "astore_0", None;
    /// Store reference local 1
    Astore1 = 0x4c, "astore_1", None;
    /// Store reference local 2
    Astore2 = 0x4d, "astore_2", None;
    /// Store reference local 3
    Astore3 = 0x4e, "astore_3", None;
    /// Store int array element
    Iastore = 0x4f, "iastore", None;
    /// Store long array element
    Lastore = 0x50, "lastore", None;
    /// Store float array element
    Fastore = 0x51, "fastore", None;
    /// Store double array element
    Dastore = 0x52, "dastore", None;
    /// Store reference array element (type checked)
    Aastore = 0x53, "aastore", None;
    /// Store byte or boolean array element
    Bastore = 0x54, "bastore", None;
    /// Store char array element
    Castore = 0x55, "castore", None;
    /// Store short array element
    Sastore = 0x56, "sastore", None;

    // ===== Stack (0x57-0x5f) =====
    /// Discard one slot
    Pop = 0x57, "pop", None;
    /// Discard two slots
    Pop2 = 0x58, "pop2", None;
    /// Duplicate one slot
    Dup = 0x59, "dup", None;
    /// Duplicate one slot below the second
    DupX1 = 0x5a, "dup_x1", None;
    /// Duplicate one slot below the third
    DupX2 = 0x5b, "dup_x2", None;
    /// Duplicate two slots
    Dup2 = 0x5c, "dup2", None;
    /// Duplicate two slots below the third
    Dup2X1 = 0x5d, "dup2_x1", None;
    /// Duplicate two slots below the fourth
    Dup2X2 = 0x5e, "dup2_x2", None;
    /// Swap the top two slots
    Swap = 0x5f, "swap", None;

    // ===== Arithmetic (0x60-0x84) =====
    /// Add ints
    Iadd = 0x60, "iadd", None;
    /// Add longs
    Ladd = 0x61, "ladd", None;
    /// Add floats
    Fadd = 0x62, "fadd", None;
    /// Add doubles
    Dadd = 0x63, "dadd", None;
    /// Subtract ints
    Isub = 0x64, "isub", None;
    /// Subtract longs
    Lsub = 0x65, "lsub", None;
    /// Subtract floats
    Fsub = 0x66, "fsub", None;
    /// Subtract doubles
    Dsub = 0x67, "dsub", None;
    /// Multiply ints
    Imul = 0x68, "imul", None;
    /// Multiply longs
    Lmul = 0x69, "lmul", None;
    /// Multiply floats
    Fmul = 0x6a, "fmul", None;
    /// Multiply doubles
    Dmul = 0x6b, "dmul", None;
    /// Divide ints
    Idiv = 0x6c, "idiv", None;
    /// Divide longs
    Ldiv = 0x6d, "ldiv", None;
    /// Divide floats
    Fdiv = 0x6e, "fdiv", None;
    /// Divide doubles
    Ddiv = 0x6f, "ddiv", None;
    /// Int remainder
    Irem = 0x70, "irem", None;
    /// Long remainder
    Lrem = 0x71, "lrem", None;
    /// Float remainder
    Frem = 0x72, "frem", None;
    /// Double remainder
    Drem = 0x73, "drem", None;
    /// Negate int
    Ineg = 0x74, "ineg", None;
    /// Negate long
    Lneg = 0x75, "lneg", None;
    /// Negate float
    Fneg = 0x76, "fneg", None;
    /// Negate double
    Dneg = 0x77, "dneg", None;
    /// Shift int left
    Ishl = 0x78, "ishl", None;
    /// Shift long left
    Lshl = 0x79, "lshl", None;
    /// Arithmetic shift int right
    Ishr = 0x7a, "ishr", None;
    /// Arithmetic shift long right
    Lshr = 0x7b, "lshr", None;
    /// Logical shift int right
    Iushr = 0x7c, "iushr", None;
    /// Logical shift long right
    Lushr = 0x7d, "lushr", None;
    /// Bitwise and of ints
    Iand = 0x7e, "iand", None;
    /// Bitwise and of longs
    Land = 0x7f, "land", None;
    /// Bitwise or of ints
    Ior = 0x80, "ior", None;
    /// Bitwise or of longs
    Lor = 0x81, "lor", None;
    /// Bitwise xor of ints
    Ixor = 0x82, "ixor", None;
    /// Bitwise xor of longs
    Lxor = 0x83, "lxor", None;
    /// Increment int local by immediate
    Iinc = 0x84, "iinc", Increment;

    // ===== Conversions (0x85-0x93) =====
    /// int to long
    I2l = 0x85, "i2l", None;
    /// int to float
    I2f = 0x86, "i2f", None;
    /// int to double
    I2d = 0x87, "i2d", None;
    /// long to int
    L2i = 0x88, "l2i", None;
    /// long to float
    L2f = 0x89, "l2f", None;
    /// long to double
    L2d = 0x8a, "l2d", None;
    /// float to int
    F2i = 0x8b, "f2i", None;
    /// float to long
    F2l = 0x8c, "f2l", None;
    /// float to double
    F2d = 0x8d, "f2d", None;
    /// double to int
    D2i = 0x8e, "d2i", None;
    /// double to long
    D2l = 0x8f, "d2l", None;
    /// double to float
    D2f = 0x90, "d2f", None;
    /// int to byte
    I2b = 0x91, "i2b", None;
    /// int to char
    I2c = 0x92, "i2c", None;
    /// int to short
    I2s = 0x93, "i2s", None;

    // ===== Comparisons (0x94-0x98) =====
    /// Compare longs
    Lcmp = 0x94, "lcmp", None;
    /// Compare floats, NaN yields -1
    Fcmpl = 0x95, "fcmpl", None;
    /// Compare floats, NaN yields 1
    Fcmpg = 0x96, "fcmpg", None;
    /// Compare doubles, NaN yields -1
    Dcmpl = 0x97, "dcmpl", None;
    /// Compare doubles, NaN yields 1
    Dcmpg = 0x98, "dcmpg", None;

    // ===== Control flow (0x99-0xb1) =====
    /// Branch if int is zero
    Ifeq = 0x99, "ifeq", Branch16;
    /// Branch if int is non-zero
    Ifne = 0x9a, "ifne", Branch16;
    /// Branch if int < 0
    Iflt = 0x9b, "iflt", Branch16;
    /// Branch if int >= 0
    Ifge = 0x9c, "ifge", Branch16;
    /// Branch if int > 0
    Ifgt = 0x9d, "ifgt", Branch16;
    /// Branch if int <= 0
    Ifle = 0x9e, "ifle", Branch16;
    /// Branch if ints are equal
    IfIcmpeq = 0x9f, "if_icmpeq", Branch16;
    /// Branch if ints differ
    IfIcmpne = 0xa0, "if_icmpne", Branch16;
    /// Branch if int a < b
    IfIcmplt = 0xa1, "if_icmplt", Branch16;
    /// Branch if int a >= b
    IfIcmpge = 0xa2, "if_icmpge", Branch16;
    /// Branch if int a > b
    IfIcmpgt = 0xa3, "if_icmpgt", Branch16;
    /// Branch if int a <= b
    IfIcmple = 0xa4, "if_icmple", Branch16;
    /// Branch if references are identical
    IfAcmpeq = 0xa5, "if_acmpeq", Branch16;
    /// Branch if references differ
    IfAcmpne = 0xa6, "if_acmpne", Branch16;
    /// Unconditional branch
    Goto = 0xa7, "goto", Branch16;
    /// Jump to subroutine
    Jsr = 0xa8, "jsr", Branch16;
    /// Return from subroutine
    Ret = 0xa9, "ret", Local;
    /// Jump table
    Tableswitch = 0xaa, "tableswitch", TableSwitch;
    /// Sorted key/offset table
    Lookupswitch = 0xab, "lookupswitch", LookupSwitch;
    /// Return int
    Ireturn = 0xac, "ireturn", None;
    /// Return long
    Lreturn = 0xad, "lreturn", None;
    /// Return float
    Freturn = 0xae, "freturn", None;
    /// Return double
    Dreturn = 0xaf, "dreturn", None;
    /// Return reference
    Areturn = 0xb0, "areturn", None;
    /// Return void
    Return = 0xb1, "return", None;

    // ===== Fields and invocation (0xb2-0xb9) =====
    /// Read static field
    Getstatic = 0xb2, "getstatic", PoolIndex16;
    /// Write static field
    Putstatic = 0xb3, "putstatic", PoolIndex16;
    /// Read instance field
    Getfield = 0xb4, "getfield", PoolIndex16;
    /// Write instance field
    Putfield = 0xb5, "putfield", PoolIndex16;
    /// Virtual dispatch
    Invokevirtual = 0xb6, "invokevirtual", PoolIndex16;
    /// Constructor, private or super call
    Invokespecial = 0xb7, "invokespecial", PoolIndex16;
    /// Static call
    Invokestatic = 0xb8, "invokestatic", PoolIndex16;
    /// Interface dispatch
    Invokeinterface = 0xb9, "invokeinterface", Interface;

    // ===== Objects (0xbb-0xc3) =====
    /// Allocate an instance
    New = 0xbb, "new", PoolIndex16;
    /// Allocate a primitive array
    Newarray = 0xbc, "newarray", ArrayType;
    /// Allocate a reference array
    Anewarray = 0xbd, "anewarray", PoolIndex16;
    /// Push array length
    Arraylength = 0xbe, "arraylength", None;
    /// Throw the exception on top of the stack
    Athrow = 0xbf, "athrow", None;
    /// Check cast without popping
    Checkcast = 0xc0, "checkcast", PoolIndex16;
    /// Push 1 if instance of class
    Instanceof = 0xc1, "instanceof", PoolIndex16;
    /// Enter object monitor
    Monitorenter = 0xc2, "monitorenter", None;
    /// Exit object monitor
    Monitorexit = 0xc3, "monitorexit", None;

    // ===== Extended (0xc4-0xc9) =====
    /// Widen the local index of the next instruction
    Wide = 0xc4, "wide", Wide;
    /// Allocate a multi-dimensional array
    Multianewarray = 0xc5, "multianewarray", MultiArray;
    /// Branch if null
    Ifnull = 0xc6, "ifnull", Branch16;
    /// Branch if not null
    Ifnonnull = 0xc7, "ifnonnull", Branch16;
    /// Unconditional branch with 32-bit offset
    GotoW = 0xc8, "goto_w", Branch32;
    /// Jump to subroutine with 32-bit offset
    JsrW = 0xc9, "jsr_w", Branch32;

    // ===== Synthetic =====
    /// Call the host function bound to a native frame
    InvokeNative = 0xfe, "invokenative", None;
}

/// Primitive element type codes of `newarray`
pub mod array_type {
    /// boolean[]
    pub const BOOLEAN: u8 = 4;
    /// char[]
    pub const CHAR: u8 = 5;
    /// float[]
    pub const FLOAT: u8 = 6;
    /// double[]
    pub const DOUBLE: u8 = 7;
    /// byte[]
    pub const BYTE: u8 = 8;
    /// short[]
    pub const SHORT: u8 = 9;
    /// int[]
    pub const INT: u8 = 10;
    /// long[]
    pub const LONG: u8 = 11;
}

impl Opcode {
    /// Returns true for the six return instructions
    pub fn is_return(self) -> bool {
        matches!(
            self,
            Opcode::Ireturn
                | Opcode::Lreturn
                | Opcode::Freturn
                | Opcode::Dreturn
                | Opcode::Areturn
                | Opcode::Return
        )
    }

    /// Returns true for instructions with a branch offset operand
    pub fn is_branch(self) -> bool {
        matches!(self.operands(), Operands::Branch16 | Operands::Branch32)
    }
}
