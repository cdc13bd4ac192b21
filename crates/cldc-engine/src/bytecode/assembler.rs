//! Text assembler for `.jasm` class sources
//!
//! A small line-oriented format, close to Jasmin:
//!
//! ```text
//! .class public Counter
//! .super java/lang/Object
//! .field static count I
//!
//! .method public static bump(I)I
//!   getstatic Counter.count I
//!   iload_0
//!   iadd
//!   dup
//!   putstatic Counter.count I
//!   ireturn
//! .end method
//! ```
//!
//! Labels are `name:` on their own line, branch operands name a label,
//! `tableswitch low L0 L1 .. default Ld` and `lookupswitch k:L .. default:Ld`
//! fit on one line, and `wide` is emitted automatically for large local
//! indices. `#` starts a comment.

use crate::bytecode::class::{
    AccessFlags, ClassFile, Constant, ConstantPool, ExceptionEntry, FieldDef, MemberRef,
    MethodDef,
};
use crate::bytecode::descriptor::{self, DescriptorError};
use crate::bytecode::opcode::{array_type, Opcode, Operands};
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Assembly failure with the offending source line
#[derive(Debug, Error)]
pub enum AssembleError {
    /// Malformed directive or instruction
    #[error("line {line}: {message}")]
    Syntax {
        /// 1-based source line
        line: usize,
        /// Description
        message: String,
    },

    /// Branch or handler refers to a label never defined
    #[error("line {line}: undefined label `{label}`")]
    UndefinedLabel {
        /// 1-based source line
        line: usize,
        /// Label name
        label: String,
    },

    /// Branch offset does not fit its encoding
    #[error("line {line}: branch to `{label}` out of range")]
    BranchOutOfRange {
        /// 1-based source line
        line: usize,
        /// Label name
        label: String,
    },

    /// Bad field or method descriptor
    #[error("line {line}: {source}")]
    Descriptor {
        /// 1-based source line
        line: usize,
        /// Parse failure
        source: DescriptorError,
    },
}

type Result<T> = std::result::Result<T, AssembleError>;

/// Assemble every class in `source`
pub fn assemble(source: &str) -> Result<Vec<ClassFile>> {
    let mut asm = Assembler::default();
    for (index, raw) in source.lines().enumerate() {
        asm.line = index + 1;
        let tokens = tokenize(raw).map_err(|message| asm.syntax(message))?;
        if tokens.is_empty() {
            continue;
        }
        asm.statement(&tokens)?;
    }
    asm.finish()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
}

impl Token {
    fn word(&self) -> Option<&str> {
        match self {
            Token::Word(w) => Some(w),
            Token::Str(_) => None,
        }
    }
}

fn tokenize(line: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c == '#' {
            break;
        }
        if c.is_whitespace() || c == ',' {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some('"') => text.push('"'),
                        Some('\\') => text.push('\\'),
                        Some(other) => return Err(format!("unknown escape `\\{}`", other)),
                        None => return Err("unterminated string".to_string()),
                    },
                    Some(ch) => text.push(ch),
                    None => return Err("unterminated string".to_string()),
                }
            }
            tokens.push(Token::Str(text));
            continue;
        }
        let mut word = String::new();
        while let Some(&ch) = chars.peek() {
            if ch.is_whitespace() || ch == ',' || ch == '#' {
                break;
            }
            word.push(ch);
            chars.next();
        }
        tokens.push(Token::Word(word));
    }
    Ok(tokens)
}

struct Fixup {
    /// Offset of the encoded branch operand
    at: usize,
    /// Start of the branching instruction
    op_pc: usize,
    wide: bool,
    label: String,
    line: usize,
}

struct PendingCatch {
    class: Option<String>,
    from: String,
    to: String,
    using: String,
    line: usize,
}

struct MethodBuilder {
    name: String,
    descriptor: String,
    flags: AccessFlags,
    code: Vec<u8>,
    labels: FxHashMap<String, usize>,
    fixups: Vec<Fixup>,
    catches: Vec<PendingCatch>,
    max_locals: Option<u16>,
    max_stack: Option<u16>,
    locals_used: usize,
}

struct ClassBuilder {
    name: String,
    super_name: Option<String>,
    interfaces: Vec<String>,
    flags: AccessFlags,
    pool: ConstantPool,
    fields: Vec<FieldDef>,
    methods: Vec<MethodDef>,
}

#[derive(Default)]
struct Assembler {
    line: usize,
    classes: Vec<ClassFile>,
    class: Option<ClassBuilder>,
    method: Option<MethodBuilder>,
}

fn parse_flags(words: &[&str]) -> (AccessFlags, usize) {
    let mut flags = 0;
    let mut used = 0;
    for word in words {
        match AccessFlags::from_keyword(word) {
            Some(flag) => {
                flags |= flag;
                used += 1;
            }
            None => break,
        }
    }
    (AccessFlags(flags), used)
}

impl Assembler {
    fn syntax(&self, message: impl Into<String>) -> AssembleError {
        AssembleError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }

    fn words<'t>(&self, tokens: &'t [Token]) -> Result<Vec<&'t str>> {
        tokens
            .iter()
            .map(|t| t.word().ok_or_else(|| self.syntax("unexpected string literal")))
            .collect()
    }

    fn statement(&mut self, tokens: &[Token]) -> Result<()> {
        let head = tokens[0]
            .word()
            .ok_or_else(|| self.syntax("line starts with a string literal"))?;
        if let Some(directive) = head.strip_prefix('.') {
            let words = self.words(tokens)?;
            return self.directive(directive, &words[1..]);
        }
        if let Some(label) = head.strip_suffix(':') {
            if tokens.len() != 1 {
                return Err(self.syntax("label must be on its own line"));
            }
            let line = self.line;
            let method = self.method_mut()?;
            let at = method.code.len();
            if method.labels.insert(label.to_string(), at).is_some() {
                return Err(AssembleError::Syntax {
                    line,
                    message: format!("duplicate label `{}`", label),
                });
            }
            return Ok(());
        }
        self.instruction(head, &tokens[1..])
    }

    fn directive(&mut self, name: &str, args: &[&str]) -> Result<()> {
        match name {
            "class" => {
                self.end_class()?;
                let (flags, used) = parse_flags(args);
                let [class_name] = &args[used..] else {
                    return Err(self.syntax(".class expects flags and a name"));
                };
                self.class = Some(ClassBuilder {
                    name: class_name.to_string(),
                    super_name: None,
                    interfaces: Vec::new(),
                    flags,
                    pool: ConstantPool::new(),
                    fields: Vec::new(),
                    methods: Vec::new(),
                });
            }
            "super" => {
                let [super_name] = args else {
                    return Err(self.syntax(".super expects a class name"));
                };
                self.class_mut()?.super_name = Some(super_name.to_string());
            }
            "implements" => {
                let [interface] = args else {
                    return Err(self.syntax(".implements expects an interface name"));
                };
                self.class_mut()?.interfaces.push(interface.to_string());
            }
            "field" => {
                let (flags, used) = parse_flags(args);
                let [field_name, desc] = &args[used..] else {
                    return Err(self.syntax(".field expects flags, a name and a descriptor"));
                };
                self.check_descriptor(descriptor::parse_field(desc).map(|_| ()))?;
                self.class_mut()?.fields.push(FieldDef {
                    name: field_name.to_string(),
                    descriptor: desc.to_string(),
                    flags,
                });
            }
            "method" => {
                if self.method.is_some() {
                    return Err(self.syntax("nested .method"));
                }
                self.class_mut()?;
                let (flags, used) = parse_flags(args);
                let [spec] = &args[used..] else {
                    return Err(self.syntax(".method expects flags and name(descriptor)"));
                };
                let paren = spec
                    .find('(')
                    .ok_or_else(|| self.syntax("method descriptor missing"))?;
                let (method_name, desc) = spec.split_at(paren);
                let sig = self.check_descriptor(descriptor::parse_method(desc))?;
                let receiver = usize::from(!flags.is_static());
                self.method = Some(MethodBuilder {
                    name: method_name.to_string(),
                    descriptor: desc.to_string(),
                    flags,
                    code: Vec::new(),
                    labels: FxHashMap::default(),
                    fixups: Vec::new(),
                    catches: Vec::new(),
                    max_locals: None,
                    max_stack: None,
                    locals_used: sig.arg_slots() + receiver,
                });
            }
            "limit" => {
                let [what, value] = args else {
                    return Err(self.syntax(".limit expects `locals N` or `stack N`"));
                };
                let value: u16 = value
                    .parse()
                    .map_err(|_| self.syntax(format!("bad limit `{}`", value)))?;
                let method = self.method_mut()?;
                match *what {
                    "locals" => method.max_locals = Some(value),
                    "stack" => method.max_stack = Some(value),
                    other => return Err(self.syntax(format!("unknown limit `{}`", other))),
                }
            }
            "catch" => {
                let [class, "from", from, "to", to, "using", using] = args else {
                    return Err(self.syntax(".catch expects `<class|all> from L to L using L`"));
                };
                let line = self.line;
                let class = (*class != "all").then(|| class.to_string());
                self.method_mut()?.catches.push(PendingCatch {
                    class,
                    from: from.to_string(),
                    to: to.to_string(),
                    using: using.to_string(),
                    line,
                });
            }
            "end" => match args {
                ["method"] => self.end_method()?,
                ["class"] => self.end_class()?,
                _ => return Err(self.syntax(".end expects `method` or `class`")),
            },
            other => return Err(self.syntax(format!("unknown directive `.{}`", other))),
        }
        Ok(())
    }

    fn check_descriptor<T>(&self, parsed: std::result::Result<T, DescriptorError>) -> Result<T> {
        parsed.map_err(|source| AssembleError::Descriptor {
            line: self.line,
            source,
        })
    }

    fn class_mut(&mut self) -> Result<&mut ClassBuilder> {
        let line = self.line;
        self.class.as_mut().ok_or(AssembleError::Syntax {
            line,
            message: "no enclosing .class".to_string(),
        })
    }

    fn method_mut(&mut self) -> Result<&mut MethodBuilder> {
        let line = self.line;
        self.method.as_mut().ok_or(AssembleError::Syntax {
            line,
            message: "instruction outside of .method".to_string(),
        })
    }

    fn pool(&mut self) -> Result<&mut ConstantPool> {
        Ok(&mut self.class_mut()?.pool)
    }

    fn end_method(&mut self) -> Result<()> {
        let Some(mut method) = self.method.take() else {
            return Err(self.syntax(".end method without .method"));
        };
        for fixup in &method.fixups {
            let target = *method.labels.get(&fixup.label).ok_or_else(|| {
                AssembleError::UndefinedLabel {
                    line: fixup.line,
                    label: fixup.label.clone(),
                }
            })?;
            let offset = target as i64 - fixup.op_pc as i64;
            if fixup.wide {
                let bytes = (offset as i32).to_be_bytes();
                method.code[fixup.at..fixup.at + 4].copy_from_slice(&bytes);
            } else {
                let offset = i16::try_from(offset).map_err(|_| AssembleError::BranchOutOfRange {
                    line: fixup.line,
                    label: fixup.label.clone(),
                })?;
                method.code[fixup.at..fixup.at + 2].copy_from_slice(&offset.to_be_bytes());
            }
        }

        let mut exception_table = Vec::with_capacity(method.catches.len());
        for catch in &method.catches {
            let lookup = |label: &String| {
                method
                    .labels
                    .get(label)
                    .map(|&pc| pc as u16)
                    .ok_or_else(|| AssembleError::UndefinedLabel {
                        line: catch.line,
                        label: label.clone(),
                    })
            };
            let (start_pc, end_pc, handler_pc) =
                (lookup(&catch.from)?, lookup(&catch.to)?, lookup(&catch.using)?);
            let catch_type = match &catch.class {
                Some(name) => self.pool()?.intern(Constant::Class(name.clone())),
                None => 0,
            };
            exception_table.push(ExceptionEntry {
                start_pc,
                end_pc,
                handler_pc,
                catch_type,
            });
        }

        let bodiless = method.flags.is_native() || method.flags.is_abstract();
        if bodiless && !method.code.is_empty() {
            return Err(self.syntax(format!("{} has code but is native or abstract", method.name)));
        }
        if !bodiless && method.code.is_empty() {
            return Err(self.syntax(format!("{} has no code", method.name)));
        }

        let def = MethodDef {
            name: method.name,
            descriptor: method.descriptor,
            flags: method.flags,
            max_locals: method.max_locals.unwrap_or(method.locals_used as u16),
            max_stack: method.max_stack.unwrap_or(8),
            code: method.code,
            exception_table,
        };
        self.class_mut()?.methods.push(def);
        Ok(())
    }

    fn end_class(&mut self) -> Result<()> {
        if self.method.is_some() {
            return Err(self.syntax("missing .end method"));
        }
        if let Some(class) = self.class.take() {
            let super_name = match class.super_name {
                Some(name) => Some(name),
                None if class.name == "java/lang/Object" => None,
                None => Some("java/lang/Object".to_string()),
            };
            self.classes.push(ClassFile {
                name: class.name,
                super_name,
                interfaces: class.interfaces,
                flags: class.flags,
                constant_pool: class.pool,
                fields: class.fields,
                methods: class.methods,
            });
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<ClassFile>> {
        self.end_class()?;
        Ok(self.classes)
    }

    // ========================================================================
    // Instructions
    // ========================================================================

    fn instruction(&mut self, mnemonic: &str, operands: &[Token]) -> Result<()> {
        let op = Opcode::from_name(mnemonic)
            .ok_or_else(|| self.syntax(format!("unknown instruction `{}`", mnemonic)))?;
        let line = self.line;
        let op_pc = self.method_mut()?.code.len();
        if let Some((index, width)) = implicit_local(op) {
            self.touch_local(index, width)?;
        }

        match op.operands() {
            Operands::None => {
                self.expect_count(operands, 0)?;
                self.emit(&[op as u8])?;
            }
            Operands::Local => {
                self.expect_count(operands, 1)?;
                let index: u16 = self.number(&operands[0])?;
                self.touch_local(index as usize, local_width(op))?;
                if index > u16::from(u8::MAX) {
                    self.emit(&[Opcode::Wide as u8, op as u8])?;
                    self.emit(&index.to_be_bytes())?;
                } else {
                    self.emit(&[op as u8, index as u8])?;
                }
            }
            Operands::Byte => {
                self.expect_count(operands, 1)?;
                let value: i8 = self.number(&operands[0])?;
                self.emit(&[op as u8, value as u8])?;
            }
            Operands::Short => {
                self.expect_count(operands, 1)?;
                let value: i16 = self.number(&operands[0])?;
                self.emit(&[op as u8])?;
                self.emit(&value.to_be_bytes())?;
            }
            Operands::PoolIndex8 | Operands::PoolIndex16 => {
                let index = self.pool_operand(op, operands)?;
                match (op, u8::try_from(index)) {
                    (Opcode::Ldc, Ok(small)) => self.emit(&[op as u8, small])?,
                    (Opcode::Ldc, Err(_)) => {
                        self.emit(&[Opcode::LdcW as u8])?;
                        self.emit(&index.to_be_bytes())?;
                    }
                    _ => {
                        self.emit(&[op as u8])?;
                        self.emit(&index.to_be_bytes())?;
                    }
                }
            }
            Operands::Increment => {
                self.expect_count(operands, 2)?;
                let index: u16 = self.number(&operands[0])?;
                let delta: i16 = self.number(&operands[1])?;
                self.touch_local(index as usize, 1)?;
                match (u8::try_from(index), i8::try_from(delta)) {
                    (Ok(index), Ok(delta)) => self.emit(&[op as u8, index, delta as u8])?,
                    _ => {
                        self.emit(&[Opcode::Wide as u8, op as u8])?;
                        self.emit(&index.to_be_bytes())?;
                        self.emit(&delta.to_be_bytes())?;
                    }
                }
            }
            Operands::Branch16 | Operands::Branch32 => {
                self.expect_count(operands, 1)?;
                let label = self.label_operand(&operands[0])?;
                let wide = op.operands() == Operands::Branch32;
                self.emit(&[op as u8])?;
                self.branch(op_pc, wide, label, line)?;
            }
            Operands::TableSwitch => self.table_switch(op_pc, operands)?,
            Operands::LookupSwitch => self.lookup_switch(op_pc, operands)?,
            Operands::ArrayType => {
                self.expect_count(operands, 1)?;
                let code = match operands[0].word() {
                    Some("boolean") => array_type::BOOLEAN,
                    Some("char") => array_type::CHAR,
                    Some("float") => array_type::FLOAT,
                    Some("double") => array_type::DOUBLE,
                    Some("byte") => array_type::BYTE,
                    Some("short") => array_type::SHORT,
                    Some("int") => array_type::INT,
                    Some("long") => array_type::LONG,
                    _ => return Err(self.syntax("newarray expects a primitive type name")),
                };
                self.emit(&[op as u8, code])?;
            }
            Operands::Interface => {
                let index = self.pool_operand(op, operands)?;
                let desc = match self.pool()?.get(index) {
                    Some(Constant::InterfaceMethod(member)) => member.descriptor.clone(),
                    _ => return Err(self.syntax("invokeinterface expects a method reference")),
                };
                let count = self.check_descriptor(descriptor::parse_method(&desc))?.arg_slots() + 1;
                self.emit(&[op as u8])?;
                self.emit(&index.to_be_bytes())?;
                self.emit(&[count as u8, 0])?;
            }
            Operands::MultiArray => {
                self.expect_count(operands, 2)?;
                let class = self.class_operand(&operands[0])?;
                let dims: u8 = self.number(&operands[1])?;
                let index = self.pool()?.intern(Constant::Class(class));
                self.emit(&[op as u8])?;
                self.emit(&index.to_be_bytes())?;
                self.emit(&[dims])?;
            }
            Operands::Wide => {
                return Err(self.syntax("`wide` is emitted automatically for large indices"));
            }
        }
        Ok(())
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        self.method_mut()?.code.extend_from_slice(bytes);
        Ok(())
    }

    fn touch_local(&mut self, index: usize, width: usize) -> Result<()> {
        let method = self.method_mut()?;
        method.locals_used = method.locals_used.max(index + width);
        Ok(())
    }

    fn branch(&mut self, op_pc: usize, wide: bool, label: String, line: usize) -> Result<()> {
        let method = self.method_mut()?;
        let at = method.code.len();
        method.fixups.push(Fixup {
            at,
            op_pc,
            wide,
            label,
            line,
        });
        let width = if wide { 4 } else { 2 };
        method.code.extend(std::iter::repeat(0).take(width));
        Ok(())
    }

    fn pad_to_word(&mut self) -> Result<()> {
        let method = self.method_mut()?;
        while method.code.len() % 4 != 0 {
            method.code.push(0);
        }
        Ok(())
    }

    fn table_switch(&mut self, op_pc: usize, operands: &[Token]) -> Result<()> {
        let line = self.line;
        let words = self.words(operands)?;
        let (low, rest) = words
            .split_first()
            .ok_or_else(|| self.syntax("tableswitch expects `low L.. default L`"))?;
        let low: i32 = low
            .parse()
            .map_err(|_| self.syntax(format!("bad tableswitch low `{}`", low)))?;
        let (targets, default) = match rest {
            [targets @ .., "default", default] if !targets.is_empty() => (targets, *default),
            _ => return Err(self.syntax("tableswitch expects `low L.. default L`")),
        };
        let high = low + targets.len() as i32 - 1;

        self.emit(&[Opcode::Tableswitch as u8])?;
        self.pad_to_word()?;
        self.branch(op_pc, true, default.to_string(), line)?;
        self.emit(&low.to_be_bytes())?;
        self.emit(&high.to_be_bytes())?;
        for target in targets {
            self.branch(op_pc, true, target.to_string(), line)?;
        }
        Ok(())
    }

    fn lookup_switch(&mut self, op_pc: usize, operands: &[Token]) -> Result<()> {
        let line = self.line;
        let words = self.words(operands)?;
        let mut pairs = Vec::new();
        let mut default = None;
        for word in words {
            let (key, label) = word
                .split_once(':')
                .ok_or_else(|| self.syntax(format!("bad lookupswitch entry `{}`", word)))?;
            if key == "default" {
                default = Some(label.to_string());
                continue;
            }
            let key: i32 = key
                .parse()
                .map_err(|_| self.syntax(format!("bad lookupswitch key `{}`", key)))?;
            pairs.push((key, label.to_string()));
        }
        let default = default.ok_or_else(|| self.syntax("lookupswitch without default"))?;
        pairs.sort_by_key(|(key, _)| *key);
        if pairs.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(self.syntax("duplicate lookupswitch key"));
        }

        self.emit(&[Opcode::Lookupswitch as u8])?;
        self.pad_to_word()?;
        self.branch(op_pc, true, default, line)?;
        self.emit(&(pairs.len() as i32).to_be_bytes())?;
        for (key, label) in pairs {
            self.emit(&key.to_be_bytes())?;
            self.branch(op_pc, true, label, line)?;
        }
        Ok(())
    }

    // ========================================================================
    // Operands
    // ========================================================================

    fn expect_count(&self, operands: &[Token], count: usize) -> Result<()> {
        if operands.len() != count {
            return Err(self.syntax(format!(
                "expected {} operand(s), found {}",
                count,
                operands.len()
            )));
        }
        Ok(())
    }

    fn number<T: std::str::FromStr>(&self, token: &Token) -> Result<T> {
        let word = token
            .word()
            .ok_or_else(|| self.syntax("expected a number"))?;
        word.parse()
            .map_err(|_| self.syntax(format!("bad number `{}`", word)))
    }

    fn label_operand(&self, token: &Token) -> Result<String> {
        token
            .word()
            .map(str::to_string)
            .ok_or_else(|| self.syntax("expected a label"))
    }

    fn class_operand(&self, token: &Token) -> Result<String> {
        token
            .word()
            .map(str::to_string)
            .ok_or_else(|| self.syntax("expected a class name"))
    }

    fn member(&self, spec: &str, desc: &str) -> Result<MemberRef> {
        let dot = spec
            .rfind('.')
            .ok_or_else(|| self.syntax(format!("expected Class.member, found `{}`", spec)))?;
        Ok(MemberRef {
            class: spec[..dot].to_string(),
            name: spec[dot + 1..].to_string(),
            descriptor: desc.to_string(),
        })
    }

    fn method_ref(&self, token: &Token) -> Result<MemberRef> {
        let word = token
            .word()
            .ok_or_else(|| self.syntax("expected Class.method(descriptor)"))?;
        let paren = word
            .find('(')
            .ok_or_else(|| self.syntax(format!("method descriptor missing in `{}`", word)))?;
        let (spec, desc) = word.split_at(paren);
        self.check_descriptor(descriptor::parse_method(desc))?;
        self.member(spec, desc)
    }

    fn pool_operand(&mut self, op: Opcode, operands: &[Token]) -> Result<u16> {
        let constant = match op {
            Opcode::Ldc | Opcode::LdcW => self.single_constant(operands)?,
            Opcode::Ldc2W => self.wide_constant(operands)?,
            Opcode::Getstatic | Opcode::Putstatic | Opcode::Getfield | Opcode::Putfield => {
                let [Token::Word(spec), Token::Word(desc)] = operands else {
                    return Err(self.syntax("field access expects `Class.name descriptor`"));
                };
                self.check_descriptor(descriptor::parse_field(desc))?;
                Constant::Field(self.member(spec, desc)?)
            }
            Opcode::Invokevirtual | Opcode::Invokespecial | Opcode::Invokestatic => {
                self.expect_count(operands, 1)?;
                Constant::Method(self.method_ref(&operands[0])?)
            }
            Opcode::Invokeinterface => {
                self.expect_count(operands, 1)?;
                Constant::InterfaceMethod(self.method_ref(&operands[0])?)
            }
            _ => {
                self.expect_count(operands, 1)?;
                Constant::Class(self.class_operand(&operands[0])?)
            }
        };
        Ok(self.pool()?.intern(constant))
    }

    fn single_constant(&self, operands: &[Token]) -> Result<Constant> {
        match operands {
            [Token::Str(text)] => Ok(Constant::String(text.clone())),
            [Token::Word(kw), Token::Word(name)] if kw == "class" => {
                Ok(Constant::Class(name.clone()))
            }
            [Token::Word(word)] => {
                if let Some(float) = word.strip_suffix(['f', 'F']) {
                    return float
                        .parse()
                        .map(Constant::Float)
                        .map_err(|_| self.syntax(format!("bad float `{}`", word)));
                }
                word.parse()
                    .map(Constant::Integer)
                    .map_err(|_| self.syntax(format!("bad int `{}`", word)))
            }
            _ => Err(self.syntax("ldc expects an int, float, string or `class Name`")),
        }
    }

    fn wide_constant(&self, operands: &[Token]) -> Result<Constant> {
        let [Token::Word(word)] = operands else {
            return Err(self.syntax("ldc2_w expects a long or double literal"));
        };
        if let Some(long) = word.strip_suffix(['l', 'L']) {
            return long
                .parse()
                .map(Constant::Long)
                .map_err(|_| self.syntax(format!("bad long `{}`", word)));
        }
        word.trim_end_matches(['d', 'D'])
            .parse()
            .map(Constant::Double)
            .map_err(|_| self.syntax(format!("bad double `{}`", word)))
    }
}

/// Index and width of the local touched by a `xload_n` / `xstore_n` form
fn implicit_local(op: Opcode) -> Option<(usize, usize)> {
    let name = op.name();
    let (stem, digit) = name.split_once('_')?;
    if !(stem.ends_with("load") || stem.ends_with("store")) {
        return None;
    }
    let index = digit.parse().ok()?;
    Some((index, local_width(op)))
}

fn local_width(op: Opcode) -> usize {
    match op.name().as_bytes().first() {
        Some(b'l') | Some(b'd') => 2,
        _ => 1,
    }
}
