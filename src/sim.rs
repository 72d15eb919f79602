//! Executing assembled programs on a virtual MIPS32 CPU.
//!
//! The emulator steps one instruction at a time with architectural delay
//! slots: a taken branch or jump does not transfer control immediately, but
//! after the instruction that follows it. Control-flow targets are resolved
//! through the same helpers the encoder uses, so running a program and
//! encoding it agree on every destination.
//!
//! The module consists of:
//! - [`Emulator`]: the virtual CPU with its registers, memory, and
//!   delay-slot state machine.
//! - [`mem`]: the sparse memory and the register file.

pub mod mem;

use std::fmt;

use crate::asm::encoding::{self, EncodeErr};
use crate::asm::Executable;
use crate::ast::{Instruction, Mnemonic, Reg};

use self::mem::{LazyMemory, Memory, RegisterFile};

/// Errors that can occur during execution, tagged with the address of the
/// offending instruction.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SimErr {
    /// The address the instruction was fetched from.
    pub address: u32,
    /// What went wrong.
    pub kind: SimErrKind,
}

/// Kinds of errors that can occur during execution.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum SimErrKind {
    /// A branch executed in another branch's or jump's delay slot.
    BranchInDelaySlot,
    /// A jump executed in another branch's or jump's delay slot.
    JumpInDelaySlot,
    /// `LW` from an address that is not a multiple of 4, with forced
    /// alignment on.
    MisalignedLoadWord,
    /// `SW` to an address that is not a multiple of 4, with forced
    /// alignment on.
    MisalignedStoreWord,
    /// `JR`/`JALR` to an address that is not a multiple of 4.
    MisalignedJumpTarget,
    /// A control-flow destination failed to resolve (unknown symbol,
    /// out-of-range offset, ...).
    Resolve(EncodeErr),
    /// The fetched instruction has no execution semantics (a `.word`).
    UnknownInstruction(Mnemonic),
}

impl fmt::Display for SimErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error at 0x{:08x}: {}", self.address, self.kind)
    }
}

impl fmt::Display for SimErrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimErrKind::BranchInDelaySlot => {
                f.write_str("branch in delay slot yields unpredictable behavior")
            }
            SimErrKind::JumpInDelaySlot => {
                f.write_str("jump in delay slot yields unpredictable behavior")
            }
            SimErrKind::MisalignedLoadWord => f.write_str("misaligned load word"),
            SimErrKind::MisalignedStoreWord => f.write_str("misaligned store word"),
            SimErrKind::MisalignedJumpTarget => f.write_str("misaligned address"),
            SimErrKind::Resolve(err) => err.fmt(f),
            SimErrKind::UnknownInstruction(name) => write!(f, "unknown instruction {name}"),
        }
    }
}

impl std::error::Error for SimErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            SimErrKind::Resolve(err) => Some(err),
            _ => None,
        }
    }
}

impl crate::err::Error for SimErr {
    fn help(&self) -> Option<std::borrow::Cow<'_, str>> {
        match &self.kind {
            SimErrKind::BranchInDelaySlot | SimErrKind::JumpInDelaySlot => {
                Some("the instruction after a branch or jump must not branch or jump".into())
            }
            SimErrKind::MisalignedLoadWord | SimErrKind::MisalignedStoreWord => {
                Some("word accesses must use addresses that are multiples of 4".into())
            }
            SimErrKind::MisalignedJumpTarget => {
                Some("jump-register targets must be multiples of 4".into())
            }
            SimErrKind::Resolve(err) => crate::err::Error::help(err),
            SimErrKind::UnknownInstruction(_) => {
                Some("this word decodes to data, not to an executable instruction".into())
            }
        }
    }
}

/// The virtual CPU.
///
/// The emulator pulls instructions from its executable, so no encoded
/// program image exists in its memory; memory holds only the program's data.
/// `step` never blocks and holds no background work, which leaves scheduling
/// (a "play" loop, a stop control) entirely to the host; see
/// [`Emulator::run_while`].
#[derive(Debug, Clone)]
pub struct Emulator<M = LazyMemory> {
    /// The register file.
    pub registers: RegisterFile,
    /// The data memory.
    pub memory: M,
    /// The program being executed.
    pub executable: Executable,
    /// The address of the next instruction to fetch.
    pub pc: u32,
    /// Whether words in memory are little-endian. Defaults to big-endian.
    pub little_endian: bool,
    /// Whether `LW`/`SW` reject addresses that are not multiples of 4.
    pub force_alignment: bool,

    in_delay_slot: bool,
    jump_next: bool,
    jump_target: u32,
}

impl Emulator<LazyMemory> {
    /// Creates an emulator over a fresh sparse memory, with the PC at 0.
    pub fn new(executable: Executable) -> Self {
        Self::with_memory(executable, LazyMemory::new())
    }
}

impl<M: Memory> Emulator<M> {
    /// Creates an emulator over the given memory, with the PC at 0.
    pub fn with_memory(executable: Executable, memory: M) -> Self {
        Emulator {
            registers: RegisterFile::new(),
            memory,
            executable,
            pc: 0,
            little_endian: false,
            force_alignment: false,
            in_delay_slot: false,
            jump_next: false,
            jump_target: 0,
        }
    }

    /// Whether execution has run off the end of the program.
    ///
    /// True iff no jump is pending and the PC is at or past
    /// [`Executable::end`].
    pub fn done(&self) -> bool {
        !self.jump_next && self.pc >= self.executable.end()
    }

    /// Executes a single instruction.
    ///
    /// The PC is advanced (or redirected, when leaving a taken branch's
    /// delay slot) *before* the instruction's semantics run, so after an
    /// error the PC already points past the failing instruction. Fetching an
    /// address outside every segment behaves as a `NOP`.
    pub fn step(&mut self) -> Result<(), SimErr> {
        let address = self.pc;
        let instruction = self.executable.get(address).cloned();

        if self.jump_next {
            self.in_delay_slot = true;
            self.jump_next = false;
            self.pc = self.jump_target;
        } else {
            self.in_delay_slot = false;
            self.pc = self.pc.wrapping_add(4);
        }

        match instruction {
            Some(instruction) => self.execute(instruction, address),
            None => Ok(()),
        }
    }

    /// Steps until the program is done or `keep_going` returns false.
    ///
    /// The closure is consulted between steps, which makes it the natural
    /// hook for a host's stop control: share a flag with the control thread
    /// and return its value.
    pub fn run_while(
        &mut self,
        mut keep_going: impl FnMut(&Self) -> bool,
    ) -> Result<(), SimErr> {
        while !self.done() && keep_going(self) {
            self.step()?;
        }
        Ok(())
    }

    /// Steps until the program is done.
    pub fn run(&mut self) -> Result<(), SimErr> {
        self.run_while(|_| true)
    }

    fn execute(&mut self, instruction: Instruction, address: u32) -> Result<(), SimErr> {
        use Mnemonic::*;

        let fail = |kind| Err(SimErr { address, kind });
        match instruction.name {
            NOP => {}

            ADDU => self.register_arith(&instruction, u32::wrapping_add),
            SUBU => self.register_arith(&instruction, u32::wrapping_sub),
            AND => self.register_arith(&instruction, |a, b| a & b),
            OR => self.register_arith(&instruction, |a, b| a | b),
            XOR => self.register_arith(&instruction, |a, b| a ^ b),
            NOR => self.register_arith(&instruction, |a, b| !(a | b)),

            ADDIU => {
                let value = self.source(&instruction, 1)
                    .wrapping_add(instruction.signed16 as i32 as u32);
                self.registers.set(instruction.registers[0], value);
            }
            ANDI => self.immediate_logic(&instruction, |a, b| a & b),
            ORI => self.immediate_logic(&instruction, |a, b| a | b),
            XORI => self.immediate_logic(&instruction, |a, b| a ^ b),

            LUI => {
                let value = u32::from(instruction.unsigned16) << 16;
                self.registers.set(instruction.registers[0], value);
            }

            SLT => self.set_less_than(&instruction, self.source(&instruction, 2), true),
            SLTU => self.set_less_than(&instruction, self.source(&instruction, 2), false),
            SLTI => self.set_less_than(&instruction, instruction.signed16 as i32 as u32, true),
            SLTIU => {
                self.set_less_than(&instruction, instruction.signed16 as i32 as u32, false)
            }

            SLL | SRL | SRA => {
                let value = self.source(&instruction, 1);
                let result = shifted(instruction.name, value, u32::from(instruction.constant5));
                self.registers.set(instruction.registers[0], result);
            }
            SLLV | SRLV | SRAV => {
                let amount = self.source(&instruction, 2) & 0x1f;
                let value = self.source(&instruction, 1);
                let result = shifted(instruction.name, value, amount);
                self.registers.set(instruction.registers[0], result);
            }

            MOVN | MOVZ => {
                let condition = self.source(&instruction, 2);
                if (instruction.name == MOVN) == (condition != 0) {
                    let value = self.source(&instruction, 1);
                    self.registers.set(instruction.registers[0], value);
                }
            }

            LB => {
                let byte = self.memory.get(self.effective_address(&instruction));
                self.registers
                    .set(instruction.registers[0], byte as i8 as i32 as u32);
            }
            LBU => {
                let byte = self.memory.get(self.effective_address(&instruction));
                self.registers.set(instruction.registers[0], u32::from(byte));
            }
            SB => {
                let value = self.source(&instruction, 0);
                self.memory.set(self.effective_address(&instruction), value as u8);
            }
            LW => {
                let target = self.effective_address(&instruction);
                if self.force_alignment && target % 4 != 0 {
                    return fail(SimErrKind::MisalignedLoadWord);
                }
                let word = self.read_word(target);
                self.registers.set(instruction.registers[0], word);
            }
            SW => {
                let target = self.effective_address(&instruction);
                if self.force_alignment && target % 4 != 0 {
                    return fail(SimErrKind::MisalignedStoreWord);
                }
                let value = self.source(&instruction, 0);
                self.write_word(target, value);
            }

            BEQ | BNE | BGEZ | BGTZ | BLEZ | BLTZ => {
                if self.in_delay_slot {
                    return fail(SimErrKind::BranchInDelaySlot);
                }
                let displacement =
                    encoding::branch_displacement(&instruction, address, self.executable.symbols())
                        .map_err(|err| SimErr { address, kind: SimErrKind::Resolve(err) })?;
                // The PC already points at the delay slot.
                let target = self.pc.wrapping_add(displacement);

                let taken = match instruction.name {
                    BEQ => self.source(&instruction, 0) == self.source(&instruction, 1),
                    BNE => self.source(&instruction, 0) != self.source(&instruction, 1),
                    name => {
                        let value = self.source(&instruction, 0) as i32;
                        match name {
                            BGEZ => value >= 0,
                            BGTZ => value > 0,
                            BLEZ => value <= 0,
                            _ => value < 0,
                        }
                    }
                };
                if taken {
                    self.jump_next = true;
                    self.jump_target = target;
                }
            }

            J | JAL => {
                if self.in_delay_slot {
                    return fail(SimErrKind::JumpInDelaySlot);
                }
                let base =
                    encoding::jump_base(&instruction, address, self.executable.symbols())
                        .map_err(|err| SimErr { address, kind: SimErrKind::Resolve(err) })?;
                self.jump_target = (self.pc & 0xf000_0000) | base << 2;
                self.jump_next = true;
                if instruction.name == JAL {
                    // The return address skips the delay slot.
                    let link = self.pc.wrapping_add(4);
                    self.registers.set(Reg(31), link);
                }
            }
            JR | JALR => {
                if self.in_delay_slot {
                    return fail(SimErrKind::JumpInDelaySlot);
                }
                let source = match instruction.registers.as_slice() {
                    [_, source] => *source,
                    _ => instruction.registers[0],
                };
                let target = self.registers[source];
                if target % 4 != 0 {
                    return fail(SimErrKind::MisalignedJumpTarget);
                }
                self.jump_target = target;
                self.jump_next = true;
                if instruction.name == JALR {
                    let destination = match instruction.registers.as_slice() {
                        [destination, _] => *destination,
                        _ => Reg(31),
                    };
                    self.registers.set(destination, self.pc.wrapping_add(4));
                }
            }

            Word => return fail(SimErrKind::UnknownInstruction(instruction.name)),
        }
        Ok(())
    }

    /// Reads the register operand at `index` of the instruction.
    fn source(&self, instruction: &Instruction, index: usize) -> u32 {
        self.registers[instruction.registers[index]]
    }

    fn register_arith(&mut self, instruction: &Instruction, f: impl Fn(u32, u32) -> u32) {
        let result = f(self.source(instruction, 1), self.source(instruction, 2));
        self.registers.set(instruction.registers[0], result);
    }

    fn immediate_logic(&mut self, instruction: &Instruction, f: impl Fn(u32, u32) -> u32) {
        let result = f(self.source(instruction, 1), u32::from(instruction.unsigned16));
        self.registers.set(instruction.registers[0], result);
    }

    fn set_less_than(&mut self, instruction: &Instruction, rhs: u32, signed: bool) {
        let lhs = self.source(instruction, 1);
        let result = match signed {
            true => (lhs as i32) < (rhs as i32),
            false => lhs < rhs,
        };
        self.registers.set(instruction.registers[0], u32::from(result));
    }

    fn effective_address(&self, instruction: &Instruction) -> u32 {
        let base = self.registers[instruction.memory.register];
        base.wrapping_add(instruction.memory.offset as i32 as u32)
    }

    /// Reads a word, honoring the endianness flag. In big-endian mode the
    /// lowest-address byte holds the most significant bits.
    fn read_word(&self, address: u32) -> u32 {
        let bytes = [
            self.memory.get(address),
            self.memory.get(address.wrapping_add(1)),
            self.memory.get(address.wrapping_add(2)),
            self.memory.get(address.wrapping_add(3)),
        ];
        match self.little_endian {
            true => u32::from_le_bytes(bytes),
            false => u32::from_be_bytes(bytes),
        }
    }

    /// Writes a word, honoring the endianness flag.
    fn write_word(&mut self, address: u32, value: u32) {
        let bytes = match self.little_endian {
            true => value.to_le_bytes(),
            false => value.to_be_bytes(),
        };
        for (offset, byte) in bytes.into_iter().enumerate() {
            self.memory.set(address.wrapping_add(offset as u32), byte);
        }
    }
}

/// Applies a shift by class: `SLL`/`SLLV` shift left, `SRL`/`SRLV` shift
/// right filling with zeros, `SRA`/`SRAV` shift right preserving the sign.
fn shifted(name: Mnemonic, value: u32, amount: u32) -> u32 {
    match name {
        Mnemonic::SLL | Mnemonic::SLLV => value << amount,
        Mnemonic::SRL | Mnemonic::SRLV => value >> amount,
        _ => ((value as i32) >> amount) as u32,
    }
}
