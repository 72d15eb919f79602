//! The bit-exact mapping between structured instructions and 32-bit words.
//!
//! Encoding needs the instruction's own address and the executable's symbol
//! table, because control-flow operands may name their destination through a
//! symbol that resolves relative to the instruction. Decoding never fails:
//! words that match no encoding come back as `.word` instructions carrying
//! the raw payload.
//!
//! The same branch-displacement and jump-base helpers used by the encoder
//! drive the emulator's control transfers, so assembler and interpreter agree
//! on target arithmetic by construction.

use std::collections::HashMap;
use std::fmt;

use crate::ast::{CodePointer, Instruction, MemoryReference, Mnemonic, PointerTarget, Reg};

use super::Executable;

/// A bidirectional table between 6-bit field values and mnemonics.
type OpcodeTable = &'static [(u32, Mnemonic)];

const IMMEDIATE_OPCODES: OpcodeTable = &[
    (0x09, Mnemonic::ADDIU),
    (0x0c, Mnemonic::ANDI),
    (0x0d, Mnemonic::ORI),
    (0x0a, Mnemonic::SLTI),
    (0x0b, Mnemonic::SLTIU),
    (0x0e, Mnemonic::XORI),
];

const BRANCH_OPCODES: OpcodeTable = &[
    (0x04, Mnemonic::BEQ),
    (0x01, Mnemonic::BLTZ),
    (0x07, Mnemonic::BGTZ),
    (0x06, Mnemonic::BLEZ),
    (0x05, Mnemonic::BNE),
];

const JUMP_OPCODES: OpcodeTable = &[(0x02, Mnemonic::J), (0x03, Mnemonic::JAL)];

const MEMORY_OPCODES: OpcodeTable = &[
    (0x20, Mnemonic::LB),
    (0x24, Mnemonic::LBU),
    (0x23, Mnemonic::LW),
    (0x28, Mnemonic::SB),
    (0x2b, Mnemonic::SW),
];

const CONSTANT_SHIFT_FUNCTS: OpcodeTable = &[
    (0x00, Mnemonic::SLL),
    (0x03, Mnemonic::SRA),
    (0x02, Mnemonic::SRL),
];

const VARIABLE_SHIFT_FUNCTS: OpcodeTable = &[
    (0x04, Mnemonic::SLLV),
    (0x07, Mnemonic::SRAV),
    (0x06, Mnemonic::SRLV),
];

const THREE_REG_FUNCTS: OpcodeTable = &[
    (0x21, Mnemonic::ADDU),
    (0x24, Mnemonic::AND),
    (0x0b, Mnemonic::MOVN),
    (0x0a, Mnemonic::MOVZ),
    (0x27, Mnemonic::NOR),
    (0x25, Mnemonic::OR),
    (0x2a, Mnemonic::SLT),
    (0x2b, Mnemonic::SLTU),
    (0x23, Mnemonic::SUBU),
    (0x26, Mnemonic::XOR),
];

const LUI_OPCODE: u32 = 0x0f;
const JR_FUNCT: u32 = 0x08;
const JALR_FUNCT: u32 = 0x09;

/// Looks a mnemonic's field value up in its table.
///
/// The tables are small and fixed, so a linear scan is fine.
fn table_value(table: OpcodeTable, name: Mnemonic) -> u32 {
    table
        .iter()
        .find(|&&(_, n)| n == name)
        .map(|&(value, _)| value)
        .unwrap_or_else(|| unreachable!("{name} missing from its opcode table"))
}

/// Looks a field value's mnemonic up in a table.
fn table_name(table: OpcodeTable, value: u32) -> Option<Mnemonic> {
    table
        .iter()
        .find(|&&(v, _)| v == value)
        .map(|&(_, name)| name)
}

/// Errors from encoding an instruction or resolving a control-flow target.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum EncodeErr {
    /// The instruction carries the wrong number of register operands.
    RegisterCount(Mnemonic),
    /// A symbolic destination is not in the symbol table.
    UnknownSymbol(String),
    /// A symbolic branch destination is outside the signed 16-bit word range.
    BranchOutOfBounds,
    /// A symbolic jump destination's top four bits differ from PC+4's.
    JumpOverflow,
    /// A numeric jump destination's top four bits differ from PC+4's.
    JumpUnencodable,
    /// A control-flow destination is not word-aligned.
    Misaligned,
    /// A branch carried an absolute code pointer.
    ExpectedRelative(Mnemonic),
    /// A jump carried a relative code pointer.
    ExpectedAbsolute(Mnemonic),
}

impl fmt::Display for EncodeErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeErr::RegisterCount(name) => {
                write!(f, "invalid number of registers for {name}")
            }
            EncodeErr::UnknownSymbol(name) => write!(f, "unknown symbol: {name}"),
            EncodeErr::BranchOutOfBounds => f.write_str("branch offset out of bounds"),
            EncodeErr::JumpOverflow => f.write_str("jump address overflows 26 bits"),
            EncodeErr::JumpUnencodable => {
                f.write_str("cannot encode jump address in 26 bits")
            }
            EncodeErr::Misaligned => f.write_str("misaligned address"),
            EncodeErr::ExpectedRelative(name) => {
                write!(f, "expecting relative code pointer for {name}")
            }
            EncodeErr::ExpectedAbsolute(name) => {
                write!(f, "expecting absolute code pointer for {name}")
            }
        }
    }
}

impl std::error::Error for EncodeErr {}
impl crate::err::Error for EncodeErr {
    fn help(&self) -> Option<std::borrow::Cow<'_, str>> {
        match self {
            EncodeErr::UnknownSymbol(_) => {
                Some("declare the symbol with a `NAME:` marker".into())
            }
            EncodeErr::BranchOutOfBounds => {
                Some("branches reach at most 0x8000 words in either direction".into())
            }
            EncodeErr::JumpOverflow | EncodeErr::JumpUnencodable => Some(
                "jump targets must share their top four bits with the address after the jump"
                    .into(),
            ),
            EncodeErr::Misaligned => Some("code addresses are multiples of 4".into()),
            _ => None,
        }
    }
}

/// Resolves a branch destination to the byte displacement from the delay
/// slot (the address after the branch).
///
/// A symbolic destination is resolved through the symbol table and checked
/// to lie within the signed 16-bit word range. A numeric destination already
/// is the displacement; it only needs to be word-aligned.
pub(crate) fn branch_displacement(
    instruction: &Instruction,
    address: u32,
    symbols: &HashMap<String, u32>,
) -> Result<u32, EncodeErr> {
    if instruction.pointer.absolute {
        return Err(EncodeErr::ExpectedRelative(instruction.name));
    }
    match &instruction.pointer.target {
        PointerTarget::Symbol(name) => {
            let target = *symbols
                .get(name)
                .ok_or_else(|| EncodeErr::UnknownSymbol(name.clone()))?;
            let displacement = target.wrapping_sub(address.wrapping_add(4));
            let words = (displacement as i32) / 4;
            if !(-0x8000..0x8000).contains(&words) {
                return Err(EncodeErr::BranchOutOfBounds);
            }
            Ok(displacement)
        }
        PointerTarget::Constant(constant) => {
            if constant % 4 != 0 {
                return Err(EncodeErr::Misaligned);
            }
            Ok(*constant)
        }
    }
}

/// Resolves a `J`/`JAL` destination to its 26-bit jump base.
///
/// The destination's top four bits must equal those of the address after the
/// jump, since they are not part of the encoding.
pub(crate) fn jump_base(
    instruction: &Instruction,
    address: u32,
    symbols: &HashMap<String, u32>,
) -> Result<u32, EncodeErr> {
    if !instruction.pointer.absolute {
        return Err(EncodeErr::ExpectedAbsolute(instruction.name));
    }
    let next = address.wrapping_add(4);
    match &instruction.pointer.target {
        PointerTarget::Symbol(name) => {
            let target = *symbols
                .get(name)
                .ok_or_else(|| EncodeErr::UnknownSymbol(name.clone()))?;
            if target & 0xf000_0000 != next & 0xf000_0000 {
                return Err(EncodeErr::JumpOverflow);
            }
            Ok((target & 0x0fff_ffff) >> 2)
        }
        PointerTarget::Constant(constant) => {
            if constant & 0xf000_0000 != next & 0xf000_0000 {
                return Err(EncodeErr::JumpUnencodable);
            }
            if constant % 4 != 0 {
                return Err(EncodeErr::Misaligned);
            }
            Ok((constant & 0x0fff_ffff) >> 2)
        }
    }
}

impl Instruction {
    /// Encodes this instruction into its 32-bit word.
    ///
    /// `address` is where the instruction lives; it and `symbols` are needed
    /// to resolve control-flow destinations.
    pub fn encode(
        &self,
        address: u32,
        symbols: &HashMap<String, u32>,
    ) -> Result<u32, EncodeErr> {
        use Mnemonic::*;

        match self.name {
            Word => Ok(self.raw_word),
            NOP => {
                self.expect_registers(0)?;
                Ok(0)
            }
            ADDIU | ANDI | ORI | SLTI | SLTIU | XORI => {
                self.expect_registers(2)?;
                let opcode = table_value(IMMEDIATE_OPCODES, self.name);
                // The signed and unsigned representations share their low 16
                // bits, so a single field serves whichever one is set.
                let immediate =
                    u32::from(self.signed16 as u16) | u32::from(self.unsigned16);
                Ok(opcode << 26 | self.reg_bits(1, 21) | self.reg_bits(0, 16) | immediate)
            }
            LUI => {
                self.expect_registers(1)?;
                Ok(LUI_OPCODE << 26 | self.reg_bits(0, 16) | u32::from(self.unsigned16))
            }
            BEQ | BNE => {
                self.expect_registers(2)?;
                let opcode = table_value(BRANCH_OPCODES, self.name);
                let field = self.branch_field(address, symbols)?;
                Ok(opcode << 26 | self.reg_bits(0, 21) | self.reg_bits(1, 16) | field)
            }
            BGEZ | BGTZ | BLEZ | BLTZ => {
                self.expect_registers(1)?;
                // BGEZ shares BLTZ's opcode; the rt field tells them apart.
                let lookup = if self.name == BGEZ { BLTZ } else { self.name };
                let rt = u32::from(self.name == BGEZ);
                let opcode = table_value(BRANCH_OPCODES, lookup);
                let field = self.branch_field(address, symbols)?;
                Ok(opcode << 26 | self.reg_bits(0, 21) | rt << 16 | field)
            }
            J | JAL => {
                self.expect_registers(0)?;
                let opcode = table_value(JUMP_OPCODES, self.name);
                Ok(opcode << 26 | jump_base(self, address, symbols)?)
            }
            LB | LBU | LW | SB | SW => {
                self.expect_registers(1)?;
                let opcode = table_value(MEMORY_OPCODES, self.name);
                Ok(opcode << 26
                    | u32::from(self.memory.register.index()) << 21
                    | self.reg_bits(0, 16)
                    | u32::from(self.memory.offset as u16))
            }
            SLL | SRL | SRA => {
                self.expect_registers(2)?;
                let funct = table_value(CONSTANT_SHIFT_FUNCTS, self.name);
                Ok(self.reg_bits(1, 16)
                    | self.reg_bits(0, 11)
                    | u32::from(self.constant5) << 6
                    | funct)
            }
            SLLV | SRLV | SRAV => {
                self.expect_registers(3)?;
                let funct = table_value(VARIABLE_SHIFT_FUNCTS, self.name);
                Ok(self.reg_bits(2, 21) | self.reg_bits(1, 16) | self.reg_bits(0, 11) | funct)
            }
            ADDU | AND | MOVN | MOVZ | NOR | OR | SLT | SLTU | SUBU | XOR => {
                self.expect_registers(3)?;
                let funct = table_value(THREE_REG_FUNCTS, self.name);
                Ok(self.reg_bits(1, 21) | self.reg_bits(2, 16) | self.reg_bits(0, 11) | funct)
            }
            JR => {
                self.expect_registers(1)?;
                Ok(self.reg_bits(0, 21) | JR_FUNCT)
            }
            JALR => match self.registers.as_slice() {
                // The one-operand form implies $31 as the destination.
                [source] => Ok(u32::from(source.index()) << 21 | 31 << 11 | JALR_FUNCT),
                [destination, source] => Ok(u32::from(source.index()) << 21
                    | u32::from(destination.index()) << 11
                    | JALR_FUNCT),
                _ => Err(EncodeErr::RegisterCount(self.name)),
            },
        }
    }

    fn expect_registers(&self, count: usize) -> Result<(), EncodeErr> {
        match self.registers.len() == count {
            true => Ok(()),
            false => Err(EncodeErr::RegisterCount(self.name)),
        }
    }

    fn reg_bits(&self, index: usize, shift: u32) -> u32 {
        u32::from(self.registers[index].index()) << shift
    }

    /// The 16-bit branch offset field for this instruction's code pointer.
    fn branch_field(
        &self,
        address: u32,
        symbols: &HashMap<String, u32>,
    ) -> Result<u32, EncodeErr> {
        let displacement = branch_displacement(self, address, symbols)?;
        Ok(match self.pointer.target {
            // Symbolic displacements are in bytes; the field wants words.
            PointerTarget::Symbol(_) => (displacement >> 2) & 0xffff,
            PointerTarget::Constant(_) => displacement & 0xffff,
        })
    }
}

/// Decodes a 32-bit word into an instruction.
///
/// This never fails: the all-zero word decodes to `NOP`, and anything that
/// matches no encoding decodes to a `.word` carrying the raw value.
pub fn decode(word: u32) -> Instruction {
    if word == 0 {
        return Instruction { name: Mnemonic::NOP, ..Instruction::default() };
    }

    let opcode = (word >> 26) & 0x3f;
    let reg_s = Reg(((word >> 21) & 0x1f) as u8);
    let reg_t = Reg(((word >> 16) & 0x1f) as u8);
    let reg_d = Reg(((word >> 11) & 0x1f) as u8);
    let shamt = ((word >> 6) & 0x1f) as u8;
    let funct = word & 0x3f;
    let immediate = word & 0xffff;

    if let Some(name) = table_name(IMMEDIATE_OPCODES, opcode) {
        return Instruction {
            name,
            registers: vec![reg_t, reg_s],
            unsigned16: immediate as u16,
            signed16: immediate as i16,
            ..Instruction::default()
        };
    }

    if opcode == LUI_OPCODE && reg_s.index() == 0 {
        return Instruction {
            name: Mnemonic::LUI,
            registers: vec![reg_t],
            unsigned16: immediate as u16,
            ..Instruction::default()
        };
    }

    if let Some(name) = table_name(BRANCH_OPCODES, opcode) {
        let pointer = CodePointer {
            absolute: false,
            target: PointerTarget::Constant(immediate),
        };
        if matches!(name, Mnemonic::BEQ | Mnemonic::BNE) {
            return Instruction {
                name,
                registers: vec![reg_s, reg_t],
                pointer,
                ..Instruction::default()
            };
        }
        // A BLTZ-shaped word with rt = 1 is BGEZ.
        let (name, rt) = match (name, reg_t.index()) {
            (Mnemonic::BLTZ, 1) => (Mnemonic::BGEZ, 0),
            (name, rt) => (name, rt),
        };
        if rt == 0 {
            return Instruction {
                name,
                registers: vec![reg_s],
                pointer,
                ..Instruction::default()
            };
        }
        // Any other rt value matches no branch encoding.
    }

    if let Some(name) = table_name(JUMP_OPCODES, opcode) {
        return Instruction {
            name,
            pointer: CodePointer {
                absolute: true,
                target: PointerTarget::Constant((word & 0x03ff_ffff) << 2),
            },
            ..Instruction::default()
        };
    }

    if let Some(name) = table_name(MEMORY_OPCODES, opcode) {
        return Instruction {
            name,
            registers: vec![reg_t],
            memory: MemoryReference { register: reg_s, offset: immediate as i16 },
            ..Instruction::default()
        };
    }

    if opcode == 0 {
        if let Some(name) = table_name(CONSTANT_SHIFT_FUNCTS, funct) {
            if reg_s.index() == 0 {
                return Instruction {
                    name,
                    registers: vec![reg_d, reg_t],
                    constant5: shamt,
                    ..Instruction::default()
                };
            }
        }

        if let Some(name) = table_name(VARIABLE_SHIFT_FUNCTS, funct) {
            if shamt == 0 {
                return Instruction {
                    name,
                    registers: vec![reg_d, reg_t, reg_s],
                    ..Instruction::default()
                };
            }
        }

        if let Some(name) = table_name(THREE_REG_FUNCTS, funct) {
            if shamt == 0 {
                return Instruction {
                    name,
                    registers: vec![reg_d, reg_s, reg_t],
                    ..Instruction::default()
                };
            }
        }

        if funct == JR_FUNCT
            && reg_t.index() == 0
            && reg_d.index() == 0
            && shamt == 0
        {
            return Instruction {
                name: Mnemonic::JR,
                registers: vec![reg_s],
                ..Instruction::default()
            };
        }

        if funct == JALR_FUNCT && reg_t.index() == 0 && shamt == 0 {
            return Instruction {
                name: Mnemonic::JALR,
                registers: vec![reg_d, reg_s],
                ..Instruction::default()
            };
        }
    }

    Instruction { name: Mnemonic::Word, raw_word: word, ..Instruction::default() }
}

/// An input whose length is not a whole number of 32-bit words.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct BinaryLenErr {
    /// The offending byte length.
    pub len: usize,
}

impl fmt::Display for BinaryLenErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "binary length {} is not a multiple of 4", self.len)
    }
}

impl std::error::Error for BinaryLenErr {}
impl crate::err::Error for BinaryLenErr {}

/// Decodes a flat binary into instructions, one per 32-bit word.
///
/// The byte order within each word follows the `little_endian` flag
/// (big-endian by default for this toolchain's binaries).
pub fn decode_bytes(
    bytes: &[u8],
    little_endian: bool,
) -> Result<Vec<Instruction>, BinaryLenErr> {
    if bytes.len() % 4 != 0 {
        return Err(BinaryLenErr { len: bytes.len() });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| {
            let chunk = <[u8; 4]>::try_from(chunk).unwrap();
            let word = match little_endian {
                true => u32::from_le_bytes(chunk),
                false => u32::from_be_bytes(chunk),
            };
            decode(word)
        })
        .collect())
}

impl Executable {
    /// Encodes the executable into the flat words covering `0..end()`.
    ///
    /// Addresses inside gaps between segments become zero words.
    pub fn encode_words(&self) -> Result<Vec<u32>, EncodeErr> {
        let mut words = Vec::with_capacity((self.end() / 4) as usize);
        for address in (0..self.end()).step_by(4) {
            let word = match self.get(address) {
                Some(instruction) => instruction.encode(address, self.symbols())?,
                None => 0,
            };
            words.push(word);
        }
        Ok(words)
    }

    /// Encodes the executable into flat bytes, honoring the byte-order flag.
    pub fn encode_bytes(&self, little_endian: bool) -> Result<Vec<u8>, EncodeErr> {
        let words = self.encode_words()?;
        let mut bytes = Vec::with_capacity(words.len() * 4);
        for word in words {
            bytes.extend(match little_endian {
                true => word.to_le_bytes(),
                false => word.to_be_bytes(),
            });
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::parse::{tokenize, LineKind};

    use super::*;

    fn parse_program(code: &str) -> Vec<Instruction> {
        tokenize(code)
            .unwrap()
            .iter()
            .map(|line| {
                let LineKind::Instruction(tokenized) = &line.kind else {
                    panic!("expected an instruction on line {}", line.number);
                };
                Instruction::parse(tokenized).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_coding_program() {
        let code = "
            NOP
            ADDIU $r5, $r4, -0x1337
            ADDU $r6, $r31, $r15
            AND $r31, $r5, $r1
            ANDI $r17, $r2, 0xf0f0

            LUI $r5, 0xf0f0
            MOVN $r17, $r18, $r19
            MOVZ $r18, $r19, $r20
            NOR $r1, $r2, $r3
            OR $r17, $r2, $r17

            ORI $r18, $r0, 0xf007
            SLL $r1, $r18, 7
            SLLV $r2, $r30, $r5
            SLT $r15, $r5, $r8
            SLTI $r15, $r5, -10

            SLTU $r0, $r5, $r8
            SLTIU $r15, $r5, -10
            SRA $r5, $r3, 15
            SRAV $r5, $r1, $r0
            SRL $r5, $r3, 15

            SRLV $r5, $r1, $r31
            SUBU $r9, $r10, $r31
            XOR $r2, $r3, $r4
            XORI $r2, $r3, 666
        ";
        let words: [u32; 24] = [
            0x00000000, 0x2485ECC9, 0x03ef3021, 0x00a1f824, 0x3051f0f0,
            0x3c05f0f0, 0x0253880b, 0x0274900a, 0x00430827, 0x00518825,
            0x3412f007, 0x001209c0, 0x00be1004, 0x00a8782a, 0x28affff6,
            0x00a8002b, 0x2caffff6, 0x00032bc3, 0x00012807, 0x00032bc2,
            0x03e12806, 0x015f4823, 0x00641026, 0x3862029a,
        ];

        let symbols = HashMap::new();
        for (instruction, &word) in parse_program(code).iter().zip(&words) {
            let encoded = instruction.encode(0, &symbols).unwrap();
            assert_eq!(encoded, word, "bad encoding for {instruction:?}");

            let decoded = decode(word);
            assert!(
                decoded.equivalent(instruction),
                "bad decoding for 0x{word:08x}: {decoded:?}"
            );
        }
    }

    #[test]
    fn test_coding_control() {
        let symbols: HashMap<String, u32> = [
            ("SYM1", 0x0ffe_0004u32),
            ("SYM2", 0x1002_0000),
            ("SYM3", 0x1005_0000),
            ("SYM4", 0x0ffe_0000),
            ("SYM5", 0x1002_0004),
        ]
        .into_iter()
        .map(|(name, address)| (name.to_string(), address))
        .collect();

        let cases = [
            ("BEQ $r15, $r17, SYM1", Ok(0x11f1_8000)),
            ("BEQ $r15, $r17, SYM2", Ok(0x11f1_7fff)),
            ("J SYM3", Ok(0x0801_4000)),
            ("J 0x10000004", Ok(0x0800_0001)),
            ("BEQ $r15, $r17, SYM4", Err(EncodeErr::BranchOutOfBounds)),
            ("BEQ $r13, $r31, SYM5", Err(EncodeErr::BranchOutOfBounds)),
            ("J SYM1", Err(EncodeErr::JumpOverflow)),
            ("J 0x20000000", Err(EncodeErr::JumpUnencodable)),
            ("J 0x10000007", Err(EncodeErr::Misaligned)),
        ];
        for (code, expected) in cases {
            let instructions = parse_program(code);
            let result = instructions[0].encode(0x1000_0000, &symbols);
            assert_eq!(result, expected, "for {code:?}");
        }
    }

    #[test]
    fn test_fixed_encodings() {
        let symbols = HashMap::new();
        let cases = [
            ("NOP", 0x0000_0000u32),
            ("JR $r31", 0x03e0_0008),
            ("JALR $r5", 0x00a0_f809),
            ("JALR $r10, $r9", 0x0120_5009),
        ];
        for (code, word) in cases {
            let instructions = parse_program(code);
            assert_eq!(instructions[0].encode(0, &symbols), Ok(word), "for {code:?}");
        }
    }

    #[test]
    fn test_raw_words() {
        let decoded = decode(0xf234_5678);
        assert_eq!(decoded.name, Mnemonic::Word);
        assert_eq!(decoded.raw_word, 0xf234_5678);

        let instruction = Instruction {
            name: Mnemonic::Word,
            raw_word: 0xf234_5678,
            ..Instruction::default()
        };
        assert_eq!(instruction.encode(0, &HashMap::new()), Ok(0xf234_5678));
    }

    #[test]
    fn test_zero_word_is_nop() {
        assert_eq!(decode(0).name, Mnemonic::NOP);
    }

    #[test]
    fn test_bgez_round_trip() {
        // BGEZ is BLTZ's opcode with rt = 1.
        let instructions = parse_program("BGEZ $r9, 0x10");
        let word = instructions[0].encode(0, &HashMap::new()).unwrap();
        assert_eq!(word, 0x0521_0010);

        let decoded = decode(word);
        assert_eq!(decoded.name, Mnemonic::BGEZ);
        assert!(decoded.equivalent(&instructions[0]));
    }

    #[test]
    fn test_decode_reencode_sweep() {
        let mut rng = StdRng::seed_from_u64(0x1337);
        for _ in 0..20_000 {
            let word: u32 = rng.gen();
            let decoded = decode(word);
            if decoded.name == Mnemonic::Word {
                assert_eq!(decoded.raw_word, word);
                continue;
            }
            match decoded.encode(0, &HashMap::new()) {
                Ok(encoded) => assert_eq!(
                    encoded, word,
                    "0x{word:08x} decoded to {decoded:?} but re-encoded to 0x{encoded:08x}"
                ),
                // The only legal failure is a branch whose immediate is not
                // word-aligned; its pointer constant cannot be re-encoded.
                Err(EncodeErr::Misaligned) => {
                    assert!(
                        matches!(
                            decoded.name,
                            Mnemonic::BEQ
                                | Mnemonic::BNE
                                | Mnemonic::BGEZ
                                | Mnemonic::BGTZ
                                | Mnemonic::BLEZ
                                | Mnemonic::BLTZ
                        ),
                        "unexpected misalignment for {decoded:?}"
                    );
                    assert_ne!(word & 3, 0);
                }
                Err(err) => panic!("0x{word:08x}: unexpected encode error {err:?}"),
            }
        }
    }

    #[test]
    fn test_flat_binary() {
        let lines = tokenize(".text 8\nLUI $r5, 0xBEEF").unwrap();
        let executable = crate::asm::assemble(&lines).unwrap();

        let big = executable.encode_bytes(false).unwrap();
        assert_eq!(
            big,
            vec![0, 0, 0, 0, 0, 0, 0, 0, 0x3c, 0x05, 0xbe, 0xef]
        );
        let little = executable.encode_bytes(true).unwrap();
        assert_eq!(
            little,
            vec![0, 0, 0, 0, 0, 0, 0, 0, 0xef, 0xbe, 0x05, 0x3c]
        );

        let decoded = decode_bytes(&big, false).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].name, Mnemonic::NOP);
        assert_eq!(decoded[2].name, Mnemonic::LUI);
        assert_eq!(decoded[2].unsigned16, 0xbeef);

        assert_eq!(decode_bytes(&big[..5], false), Err(BinaryLenErr { len: 5 }));
    }
}
