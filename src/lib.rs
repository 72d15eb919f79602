//! A MIPS32 assembler, disassembler, and emulator.
//!
//! This crate implements a classroom subset of the MIPS32 instruction set:
//! it lexes assembly source, assembles it into an address-mapped executable,
//! encodes instructions to 32-bit words (and decodes them back), and
//! interprets programs on a virtual CPU with architectural branch delay
//! slots, configurable endianness, and an alignment policy.
//!
//! # Usage
//!
//! Source code is tokenized and assembled into an [`asm::Executable`]:
//!
//! ```
//! use mips32::parse::tokenize;
//! use mips32::asm::assemble;
//!
//! let source = "
//!     LUI $1, 0x1234
//!     ORI $1, $1, 0x5678
//! ";
//! let lines = tokenize(source).unwrap();
//! let executable = assemble(&lines).unwrap();
//! assert_eq!(executable.end(), 8);
//! ```
//!
//! An executable can be run on the emulator:
//!
//! ```
//! # use mips32::parse::tokenize;
//! # use mips32::asm::assemble;
//! # let lines = tokenize("LUI $1, 0x1234\nORI $1, $1, 0x5678").unwrap();
//! # let executable = assemble(&lines).unwrap();
//! use mips32::ast::Reg;
//! use mips32::sim::Emulator;
//!
//! let mut emulator = Emulator::new(executable);
//! emulator.run().unwrap();
//! assert_eq!(emulator.registers.get(Reg::new(1).unwrap()), 0x12345678);
//! ```
//!
//! Or serialized to a flat binary (and read back, word by word):
//!
//! ```
//! # use mips32::parse::tokenize;
//! # use mips32::asm::assemble;
//! # let lines = tokenize("JR $31").unwrap();
//! # let executable = assemble(&lines).unwrap();
//! use mips32::asm::encoding;
//!
//! let bytes = executable.encode_bytes(false).unwrap();
//! assert_eq!(bytes, [0x03, 0xe0, 0x00, 0x08]);
//!
//! let instructions = encoding::decode_bytes(&bytes, false).unwrap();
//! assert_eq!(instructions[0].render().unwrap().to_string(), "JR $31");
//! ```
#![warn(missing_docs)]

pub mod asm;
pub mod ast;
pub mod err;
pub mod parse;
pub mod sim;
