//! The data model for MIPS32 assembly.
//!
//! This module holds the building blocks shared by the whole toolchain:
//! - [`Reg`]: a register index between 0 and 31.
//! - [`CodePointer`]: a branch or jump destination, symbolic or numeric.
//! - [`MemoryReference`]: a `offset(base)` memory operand.
//! - [`Operand`]: one parsed operand token, with typed accessors answering
//!   which operand categories the token can serve as.
//! - [`Mnemonic`] and the operand [`Template`] table: the set of valid
//!   `(mnemonic, operand-category list)` pairs.
//! - [`Instruction`]: the structured instruction entity, convertible to and
//!   from its tokenized form.

use std::fmt;

use crate::parse::{Directive, Line, LineKind, TokenizedInstruction};

/// A register index. Must be between 0 and 31.
///
/// Register 0 is the constant-zero register: the emulator silently drops all
/// writes to it. In assembly source a register can be spelled numerically
/// (`$5`, `$r5`) or by its ABI name (`$a1`).
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub struct Reg(pub(crate) u8);

impl Reg {
    /// Creates a register index, failing for indices above 31.
    pub fn new(index: u8) -> Option<Self> {
        (index < 32).then_some(Reg(index))
    }

    /// Gets the register number. This is always between 0 and 31.
    pub fn index(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

impl From<Reg> for usize {
    // Used for indexing the register file in [`crate::sim`].
    fn from(value: Reg) -> Self {
        usize::from(value.0)
    }
}

/// A branch or jump destination operand.
///
/// A code pointer is *absolute* for `J`/`JAL` (a 26-bit target combined with
/// the upper bits of PC at encode time) and *relative* for branches
/// (PC-relative, word-scaled). Either way it can name its destination through
/// a symbol or a numeric constant; symbols are resolved against the
/// executable's symbol table at encode or execute time, not at assembly time.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Default)]
pub struct CodePointer {
    /// True for `J`/`JAL` destinations, false for branch destinations.
    pub absolute: bool,
    /// The destination itself.
    pub target: PointerTarget,
}

/// How a [`CodePointer`] names its destination.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum PointerTarget {
    /// A named code location, resolved through the symbol table.
    Symbol(String),
    /// A numeric destination. For absolute pointers this is the full target
    /// address; for relative pointers it is a byte displacement from the
    /// delay slot that lands verbatim in the instruction's low 16 bits.
    Constant(u32),
}

impl Default for PointerTarget {
    fn default() -> Self {
        PointerTarget::Constant(0)
    }
}

/// A memory operand: a base register plus a signed 16-bit byte offset.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub struct MemoryReference {
    /// The base register.
    pub register: Reg,
    /// The byte offset added to the base register's value.
    pub offset: i16,
}

impl fmt::Display for MemoryReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.offset, self.register)
    }
}

/// One parsed operand of an instruction.
///
/// An operand may be able to serve as several operand categories at once. For
/// example, the operand `0x5` could be a 5-bit constant, a 16-bit constant,
/// or an absolute code pointer. The typed accessors ([`Operand::register`],
/// [`Operand::signed16`], ...) answer whether this operand fits a category,
/// and with which value.
///
/// ```
/// use mips32::ast::Operand;
///
/// let op: Operand = "0x5".parse().unwrap();
/// assert_eq!(op.constant5(), Some(5));
/// assert_eq!(op.unsigned16(), Some(5));
/// assert_eq!(op.register(), None);
///
/// let op: Operand = "$t0".parse().unwrap();
/// assert_eq!(op.register().map(|r| r.index()), Some(8));
/// assert_eq!(op.constant5(), None);
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Operand {
    /// A `$`-prefixed register name.
    Register(Reg),
    /// A numeric constant, stored as the low 32 bits of the parsed value.
    Constant(u32),
    /// A bare identifier naming a code location.
    Symbol(String),
    /// A `offset(base)` memory reference.
    Memory(MemoryReference),
}

impl Operand {
    /// The register index this operand holds, if it is a register.
    pub fn register(&self) -> Option<Reg> {
        match self {
            Operand::Register(register) => Some(*register),
            _ => None,
        }
    }

    /// The operand as a zero-extended 16-bit constant, if it fits.
    pub fn unsigned16(&self) -> Option<u16> {
        match self {
            Operand::Constant(value) if value & 0xffff_0000 == 0 => Some(*value as u16),
            _ => None,
        }
    }

    /// The operand as a sign-extended 16-bit constant, if the stored value
    /// equals its own signed-16-bit truncation.
    pub fn signed16(&self) -> Option<i16> {
        match self {
            Operand::Constant(value) if (*value as i16) as u32 == *value => Some(*value as i16),
            _ => None,
        }
    }

    /// The operand as a 5-bit shift amount, if it lies in `[0, 31]`.
    pub fn constant5(&self) -> Option<u8> {
        match self {
            Operand::Constant(value) if *value < 0x20 => Some(*value as u8),
            _ => None,
        }
    }

    /// The operand as a branch destination.
    ///
    /// A symbol always qualifies. A constant qualifies when it is
    /// word-aligned and its sign-extended 16-bit half reproduces it, i.e. it
    /// lies in the 18-bit signed reachable range of a branch.
    pub fn relative_pointer(&self) -> Option<CodePointer> {
        match self {
            Operand::Symbol(name) => Some(CodePointer {
                absolute: false,
                target: PointerTarget::Symbol(name.clone()),
            }),
            Operand::Constant(value) => {
                let half = (*value >> 2) as u16 as i16;
                (((half as i32) << 2) as u32 == *value).then(|| CodePointer {
                    absolute: false,
                    target: PointerTarget::Constant(*value),
                })
            }
            _ => None,
        }
    }

    /// The operand as a `J`/`JAL` destination.
    ///
    /// A symbol or any 32-bit constant qualifies; range and alignment are
    /// checked at encode time.
    pub fn absolute_pointer(&self) -> Option<CodePointer> {
        match self {
            Operand::Symbol(name) => Some(CodePointer {
                absolute: true,
                target: PointerTarget::Symbol(name.clone()),
            }),
            Operand::Constant(value) => Some(CodePointer {
                absolute: true,
                target: PointerTarget::Constant(*value),
            }),
            _ => None,
        }
    }

    /// The memory reference this operand holds, if it had the
    /// `offset(base)` form.
    pub fn memory(&self) -> Option<MemoryReference> {
        match self {
            Operand::Memory(reference) => Some(*reference),
            _ => None,
        }
    }

    /// Whether this operand can serve as the given category.
    pub fn satisfies(&self, kind: OperandKind) -> bool {
        match kind {
            OperandKind::Register => self.register().is_some(),
            OperandKind::SignedConstant16 => self.signed16().is_some(),
            OperandKind::UnsignedConstant16 => self.unsigned16().is_some(),
            OperandKind::Constant5 => self.constant5().is_some(),
            OperandKind::AbsoluteCodePointer => self.absolute_pointer().is_some(),
            OperandKind::RelativeCodePointer => self.relative_pointer().is_some(),
            OperandKind::MemoryAddress => self.memory().is_some(),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(register) => register.fmt(f),
            Operand::Constant(value) => write!(f, "0x{value:x}"),
            Operand::Symbol(name) => f.write_str(name),
            Operand::Memory(reference) => reference.fmt(f),
        }
    }
}

/// The categories an operand slot of a template can require.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum OperandKind {
    /// A register index.
    Register,
    /// A sign-extended 16-bit constant.
    SignedConstant16,
    /// A zero-extended 16-bit constant.
    UnsignedConstant16,
    /// A 5-bit shift amount.
    Constant5,
    /// A `J`/`JAL` destination.
    AbsoluteCodePointer,
    /// A branch destination.
    RelativeCodePointer,
    /// A `offset(base)` memory operand.
    MemoryAddress,
}

macro_rules! mnemonic_enum {
    ($($name:ident),+ $(,)?) => {
        /// An instruction mnemonic.
        ///
        /// Mnemonics are spelled in uppercase in assembly source. The extra
        /// [`Mnemonic::Word`] entry stands for the `.word` pseudo-instruction,
        /// which carries a literal 32-bit payload and is also the decoder's
        /// fallback for unrecognized words.
        #[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
        pub enum Mnemonic {
            $(
                #[allow(missing_docs)]
                $name,
            )+
            /// The `.word` pseudo-instruction.
            Word,
        }

        impl Mnemonic {
            /// Looks up a mnemonic from its uppercase spelling.
            ///
            /// `.word` is a directive rather than a mnemonic, so it is not
            /// found here.
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $(stringify!($name) => Some(Self::$name),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for Mnemonic {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$name => f.write_str(stringify!($name)),)+
                    Self::Word => f.write_str(".word"),
                }
            }
        }
    };
}

mnemonic_enum! {
    NOP, ADDIU, ADDU, AND, ANDI, BEQ, BGEZ, BGTZ, BLEZ, BLTZ, BNE,
    J, JAL, JALR, JR, LB, LBU, LW, SB, SW, LUI, MOVN, MOVZ, NOR,
    OR, ORI, SLL, SLLV, SLT, SLTI, SLTIU, SLTU, SRA, SRAV, SRL,
    SRLV, SUBU, XOR, XORI,
}

/// A valid `(mnemonic, operand-category list)` pair.
///
/// A tokenized instruction matches a template iff the names agree, the
/// operand counts agree, and every operand answers "yes" to its declared
/// category. Some mnemonics appear with several templates; the first matching
/// template wins, so `JALR`'s two-register form is tried before its
/// one-register form.
#[derive(Debug, Clone, Copy)]
pub struct Template {
    /// The mnemonic this template belongs to.
    pub name: Mnemonic,
    /// The required operand categories, in source order.
    pub operands: &'static [OperandKind],
}

impl Template {
    /// Whether the tokenized instruction's name and operands fit this
    /// template.
    pub fn matches(&self, instruction: &TokenizedInstruction) -> bool {
        Mnemonic::from_name(&instruction.name) == Some(self.name)
            && self.operands.len() == instruction.args.len()
            && self
                .operands
                .iter()
                .zip(&instruction.args)
                .all(|(&kind, arg)| arg.satisfies(kind))
    }

    /// Builds a structured instruction if the operands fit this template.
    fn apply(&self, instruction: &TokenizedInstruction) -> Option<Instruction> {
        if self.operands.len() != instruction.args.len() {
            return None;
        }
        let mut built = Instruction {
            name: self.name,
            ..Instruction::default()
        };
        for (kind, arg) in self.operands.iter().zip(&instruction.args) {
            match kind {
                OperandKind::Register => built.registers.push(arg.register()?),
                OperandKind::SignedConstant16 => built.signed16 = arg.signed16()?,
                OperandKind::UnsignedConstant16 => built.unsigned16 = arg.unsigned16()?,
                OperandKind::Constant5 => built.constant5 = arg.constant5()?,
                OperandKind::AbsoluteCodePointer => built.pointer = arg.absolute_pointer()?,
                OperandKind::RelativeCodePointer => built.pointer = arg.relative_pointer()?,
                OperandKind::MemoryAddress => built.memory = arg.memory()?,
            }
        }
        Some(built)
    }
}

use self::OperandKind as Op;

/// The fixed operand template table for the supported instruction set.
pub const TEMPLATES: &[Template] = &[
    Template { name: Mnemonic::NOP, operands: &[] },
    Template { name: Mnemonic::ADDIU, operands: &[Op::Register, Op::Register, Op::SignedConstant16] },
    Template { name: Mnemonic::ADDU, operands: &[Op::Register, Op::Register, Op::Register] },
    Template { name: Mnemonic::AND, operands: &[Op::Register, Op::Register, Op::Register] },
    Template { name: Mnemonic::ANDI, operands: &[Op::Register, Op::Register, Op::UnsignedConstant16] },
    Template { name: Mnemonic::BEQ, operands: &[Op::Register, Op::Register, Op::RelativeCodePointer] },
    Template { name: Mnemonic::BGEZ, operands: &[Op::Register, Op::RelativeCodePointer] },
    Template { name: Mnemonic::BGTZ, operands: &[Op::Register, Op::RelativeCodePointer] },
    Template { name: Mnemonic::BLEZ, operands: &[Op::Register, Op::RelativeCodePointer] },
    Template { name: Mnemonic::BLTZ, operands: &[Op::Register, Op::RelativeCodePointer] },
    Template { name: Mnemonic::BNE, operands: &[Op::Register, Op::Register, Op::RelativeCodePointer] },
    Template { name: Mnemonic::J, operands: &[Op::AbsoluteCodePointer] },
    Template { name: Mnemonic::JAL, operands: &[Op::AbsoluteCodePointer] },
    Template { name: Mnemonic::JALR, operands: &[Op::Register, Op::Register] },
    Template { name: Mnemonic::JALR, operands: &[Op::Register] },
    Template { name: Mnemonic::JR, operands: &[Op::Register] },
    Template { name: Mnemonic::LB, operands: &[Op::Register, Op::MemoryAddress] },
    Template { name: Mnemonic::LBU, operands: &[Op::Register, Op::MemoryAddress] },
    Template { name: Mnemonic::LW, operands: &[Op::Register, Op::MemoryAddress] },
    Template { name: Mnemonic::SB, operands: &[Op::Register, Op::MemoryAddress] },
    Template { name: Mnemonic::SW, operands: &[Op::Register, Op::MemoryAddress] },
    Template { name: Mnemonic::LUI, operands: &[Op::Register, Op::UnsignedConstant16] },
    Template { name: Mnemonic::MOVN, operands: &[Op::Register, Op::Register, Op::Register] },
    Template { name: Mnemonic::MOVZ, operands: &[Op::Register, Op::Register, Op::Register] },
    Template { name: Mnemonic::NOR, operands: &[Op::Register, Op::Register, Op::Register] },
    Template { name: Mnemonic::OR, operands: &[Op::Register, Op::Register, Op::Register] },
    Template { name: Mnemonic::ORI, operands: &[Op::Register, Op::Register, Op::UnsignedConstant16] },
    Template { name: Mnemonic::SLL, operands: &[Op::Register, Op::Register, Op::Constant5] },
    Template { name: Mnemonic::SLLV, operands: &[Op::Register, Op::Register, Op::Register] },
    Template { name: Mnemonic::SLT, operands: &[Op::Register, Op::Register, Op::Register] },
    Template { name: Mnemonic::SLTI, operands: &[Op::Register, Op::Register, Op::SignedConstant16] },
    Template { name: Mnemonic::SLTIU, operands: &[Op::Register, Op::Register, Op::SignedConstant16] },
    Template { name: Mnemonic::SLTU, operands: &[Op::Register, Op::Register, Op::Register] },
    Template { name: Mnemonic::SRA, operands: &[Op::Register, Op::Register, Op::Constant5] },
    Template { name: Mnemonic::SRAV, operands: &[Op::Register, Op::Register, Op::Register] },
    Template { name: Mnemonic::SRL, operands: &[Op::Register, Op::Register, Op::Constant5] },
    Template { name: Mnemonic::SRLV, operands: &[Op::Register, Op::Register, Op::Register] },
    Template { name: Mnemonic::SUBU, operands: &[Op::Register, Op::Register, Op::Register] },
    Template { name: Mnemonic::XOR, operands: &[Op::Register, Op::Register, Op::Register] },
    Template { name: Mnemonic::XORI, operands: &[Op::Register, Op::Register, Op::UnsignedConstant16] },
];

/// Errors from matching a tokenized instruction against the template table.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum TemplateErr {
    /// The mnemonic exists but no operand pattern of it fits.
    BadUsage(String),
    /// The mnemonic is not part of the supported set.
    Unknown(String),
}

impl fmt::Display for TemplateErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateErr::BadUsage(name) => write!(f, "bad instruction usage for {name}"),
            TemplateErr::Unknown(name) => write!(f, "unknown instruction {name}"),
        }
    }
}

impl std::error::Error for TemplateErr {}
impl crate::err::Error for TemplateErr {
    fn help(&self) -> Option<std::borrow::Cow<'_, str>> {
        match self {
            TemplateErr::BadUsage(_) => {
                Some("check the operand kinds and count against the instruction's template".into())
            }
            TemplateErr::Unknown(_) => {
                Some("mnemonics must be uppercase and part of the supported subset".into())
            }
        }
    }
}

/// A structured instruction.
///
/// Only the fields implied by the mnemonic's template are meaningful; the
/// rest stay default-initialized. `.word` is represented with
/// [`Mnemonic::Word`] and its payload in `raw_word`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Instruction {
    /// The instruction's mnemonic.
    pub name: Mnemonic,
    /// Register operands, in the same order as in assembly source.
    pub registers: Vec<Reg>,
    /// The zero-extended 16-bit immediate, when the template carries one.
    pub unsigned16: u16,
    /// The sign-extended 16-bit immediate, when the template carries one.
    pub signed16: i16,
    /// The 5-bit shift amount, for constant shifts.
    pub constant5: u8,
    /// The branch or jump destination, for control-flow instructions.
    pub pointer: CodePointer,
    /// The memory operand, for loads and stores.
    pub memory: MemoryReference,
    /// The literal payload of a `.word`.
    pub raw_word: u32,
}

impl Default for Instruction {
    fn default() -> Self {
        Instruction {
            name: Mnemonic::NOP,
            registers: Vec::new(),
            unsigned16: 0,
            signed16: 0,
            constant5: 0,
            pointer: CodePointer::default(),
            memory: MemoryReference::default(),
            raw_word: 0,
        }
    }
}

impl Instruction {
    /// Converts a tokenized instruction into its structured form.
    ///
    /// The templates of the mnemonic are tried in table order and the first
    /// one whose operand predicates all succeed wins.
    pub fn parse(instruction: &TokenizedInstruction) -> Result<Self, TemplateErr> {
        let Some(name) = Mnemonic::from_name(&instruction.name) else {
            return Err(TemplateErr::Unknown(instruction.name.clone()));
        };
        TEMPLATES
            .iter()
            .filter(|template| template.name == name)
            .find_map(|template| template.apply(instruction))
            .ok_or_else(|| TemplateErr::BadUsage(instruction.name.clone()))
    }

    /// Renders this instruction back into a tokenized line.
    ///
    /// The first template matching the mnemonic, the register count, and the
    /// code pointer's absoluteness is used to lay out the operand tokens.
    /// `.word` renders as the `.word` directive. The rendered line carries
    /// line number 0; callers renumber as needed.
    pub fn render(&self) -> Result<Line, TemplateErr> {
        if self.name == Mnemonic::Word {
            return Ok(Line {
                number: 0,
                comment: None,
                kind: LineKind::Directive(Directive {
                    name: "word".to_string(),
                    constant: self.raw_word,
                }),
            });
        }

        let template = TEMPLATES
            .iter()
            .find(|template| {
                template.name == self.name
                    && register_slots(template) == self.registers.len()
                    && template.operands.iter().all(|kind| match kind {
                        OperandKind::AbsoluteCodePointer => self.pointer.absolute,
                        OperandKind::RelativeCodePointer => !self.pointer.absolute,
                        _ => true,
                    })
            })
            .ok_or_else(|| TemplateErr::BadUsage(self.name.to_string()))?;

        let mut args = Vec::with_capacity(template.operands.len());
        let mut next_register = 0;
        for kind in template.operands {
            args.push(match kind {
                OperandKind::Register => {
                    let register = self.registers[next_register];
                    next_register += 1;
                    Operand::Register(register)
                }
                OperandKind::SignedConstant16 => Operand::Constant(self.signed16 as i32 as u32),
                OperandKind::UnsignedConstant16 => Operand::Constant(u32::from(self.unsigned16)),
                OperandKind::Constant5 => Operand::Constant(u32::from(self.constant5)),
                OperandKind::AbsoluteCodePointer | OperandKind::RelativeCodePointer => {
                    match &self.pointer.target {
                        PointerTarget::Symbol(name) => Operand::Symbol(name.clone()),
                        PointerTarget::Constant(value) => Operand::Constant(*value),
                    }
                }
                OperandKind::MemoryAddress => Operand::Memory(self.memory),
            });
        }

        Ok(Line {
            number: 0,
            comment: None,
            kind: LineKind::Instruction(TokenizedInstruction {
                name: self.name.to_string(),
                args,
            }),
        })
    }

    /// Collapsing equality over instructions.
    ///
    /// Compares the two instructions the way the codec round trip preserves
    /// them: `JALR $rs` collapses with `JALR $31, $rs`, and the two immediate
    /// representations are compared through their shared low 16 bits, since
    /// the decoder fills both while the template matcher fills exactly one.
    pub fn equivalent(&self, other: &Instruction) -> bool {
        fn registers(instruction: &Instruction) -> Vec<Reg> {
            match (instruction.name, instruction.registers.as_slice()) {
                (Mnemonic::JALR, &[source]) => vec![Reg(31), source],
                _ => instruction.registers.clone(),
            }
        }

        self.name == other.name
            && registers(self) == registers(other)
            && (self.unsigned16 | self.signed16 as u16)
                == (other.unsigned16 | other.signed16 as u16)
            && self.constant5 == other.constant5
            && self.pointer == other.pointer
            && self.memory == other.memory
            && self.raw_word == other.raw_word
    }
}

/// How many register operands a template consumes.
fn register_slots(template: &Template) -> usize {
    template
        .operands
        .iter()
        .filter(|kind| matches!(kind, OperandKind::Register))
        .count()
}
