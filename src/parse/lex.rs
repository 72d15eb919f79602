//! Tokenizing MIPS32 operands.
//!
//! This module holds the token that characterizes one instruction operand
//! ([`Token`]) and the validators behind it: the register name table, 32-bit
//! constant parsing, and memory-reference splitting. The line-oriented
//! tokenizer in [`crate::parse`] feeds each whitespace-delimited operand
//! field through this lexer via [`Operand`]'s [`FromStr`] implementation.

use std::str::FromStr;

use logos::{Lexer, Logos};

use crate::ast::{MemoryReference, Operand, Reg};

/// A single operand token of MIPS32 assembly.
///
/// The regexes span the whole operand field; the validator callbacks reject
/// fields that look like a token but carry an invalid payload (a register
/// index above 31, a constant outside 32 bits, a memory offset outside the
/// signed 16-bit range).
#[derive(Debug, Logos, PartialEq, Eq, Clone)]
#[logos(skip r"[ \t]+", error = LexErr)]
pub enum Token {
    /// A register operand (e.g. `$5`, `$r5`, `$t0`).
    #[regex(r"\$[A-Za-z0-9]+", lex_register)]
    Reg(Reg),

    /// A numeric constant, decimal or `0x`-hex, optionally negative.
    #[regex(r"-?(0x[0-9a-fA-F]+|[0-9]+)", lex_constant, priority = 10)]
    Constant(u32),

    /// A bare identifier, used for symbol references.
    #[regex(r"[A-Za-z0-9_]+", |lx| lx.slice().to_string(), priority = 3)]
    Symbol(String),

    /// A memory reference (e.g. `0x1337($t0)`, `-4($sp)`, `($0)`).
    #[regex(r"(-?(0x[0-9a-fA-F]+|[0-9]+))?\(\$[A-Za-z0-9]+\)", lex_memory)]
    Memory(MemoryReference),
}

/// Any errors raised while lexing a single operand.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum LexErr {
    /// A `$`-prefixed name that is not a recognized register.
    InvalidRegister,
    /// A constant that does not fit in 32 bits.
    ConstantOutOfRange,
    /// A memory reference whose offset does not fit in a signed 16-bit value.
    MemOffsetOutOfBounds,
    /// A memory reference whose base register is not a recognized register.
    InvalidMemoryReference,
    /// Anything that is not a register, constant, symbol, or memory
    /// reference.
    #[default]
    UnrecognizedOperand,
}

impl std::fmt::Display for LexErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexErr::InvalidRegister => f.write_str("invalid register name"),
            LexErr::ConstantOutOfRange => f.write_str("constant does not fit in 32 bits"),
            LexErr::MemOffsetOutOfBounds => f.write_str("memory offset out of bounds"),
            LexErr::InvalidMemoryReference => f.write_str("invalid memory reference"),
            LexErr::UnrecognizedOperand => f.write_str("unrecognized operand"),
        }
    }
}

impl std::error::Error for LexErr {}
impl crate::err::Error for LexErr {
    fn help(&self) -> Option<std::borrow::Cow<'_, str>> {
        match self {
            LexErr::InvalidRegister => {
                Some("registers are $0-$31, $r0-$r31, or an ABI name like $t0".into())
            }
            LexErr::ConstantOutOfRange => {
                Some(format!("constants must lie in [-{m}, {m}]", m = u32::MAX).into())
            }
            LexErr::MemOffsetOutOfBounds => Some(
                format!("memory offsets must lie in [{}, {}]", i16::MIN, i16::MAX).into(),
            ),
            LexErr::InvalidMemoryReference => {
                Some("memory references have the form offset($base)".into())
            }
            LexErr::UnrecognizedOperand => None,
        }
    }
}

/// Looks up a register index from its name, without the `$` prefix.
///
/// Accepts the numeric spellings `0`-`31` and `r0`-`r31` alongside the
/// standard ABI names. `fp` and `s8` both name register 30.
pub(crate) fn register_index(name: &str) -> Option<u8> {
    let index = match name {
        "zero" => 0,
        "at" => 1,
        "v0" => 2,
        "v1" => 3,
        "a0" => 4,
        "a1" => 5,
        "a2" => 6,
        "a3" => 7,
        "t0" => 8,
        "t1" => 9,
        "t2" => 10,
        "t3" => 11,
        "t4" => 12,
        "t5" => 13,
        "t6" => 14,
        "t7" => 15,
        "s0" => 16,
        "s1" => 17,
        "s2" => 18,
        "s3" => 19,
        "s4" => 20,
        "s5" => 21,
        "s6" => 22,
        "s7" => 23,
        "t8" => 24,
        "t9" => 25,
        "k0" => 26,
        "k1" => 27,
        "gp" => 28,
        "sp" => 29,
        "fp" | "s8" => 30,
        "ra" => 31,
        _ => {
            let digits = name.strip_prefix('r').unwrap_or(name);
            if digits.len() > 1 && digits.starts_with('0') {
                return None;
            }
            let index = digits.parse::<u8>().ok()?;
            if index > 31 {
                return None;
            }
            index
        }
    };
    Some(index)
}

/// Parses a decimal or `0x`-hex constant, optionally negative.
///
/// The value is parsed as a signed 64-bit number, rejected outside
/// `[-(2^32 - 1), 2^32 - 1]`, and stored as its low 32 bits.
pub(crate) fn parse_constant(text: &str) -> Option<u32> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude = match body.strip_prefix("0x") {
        Some(hex) => {
            if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            i64::from_str_radix(hex, 16).ok()?
        }
        None => {
            if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            body.parse::<i64>().ok()?
        }
    };
    let value = if negative { -magnitude } else { magnitude };
    if !(-0xffff_ffff..=0xffff_ffff).contains(&value) {
        return None;
    }
    Some(value as u32)
}

fn lex_register(lx: &mut Lexer<'_, Token>) -> Result<Reg, LexErr> {
    register_index(&lx.slice()[1..])
        .map(Reg)
        .ok_or(LexErr::InvalidRegister)
}

fn lex_constant(lx: &mut Lexer<'_, Token>) -> Result<u32, LexErr> {
    parse_constant(lx.slice()).ok_or(LexErr::ConstantOutOfRange)
}

fn lex_memory(lx: &mut Lexer<'_, Token>) -> Result<MemoryReference, LexErr> {
    let slice = lx.slice();
    let open = slice.find('(').ok_or(LexErr::InvalidMemoryReference)?;
    let offset_text = &slice[..open];
    // Strip the surrounding parentheses and the register's `$`.
    let register_name = &slice[open + 2..slice.len() - 1];

    let register = register_index(register_name)
        .map(Reg)
        .ok_or(LexErr::InvalidMemoryReference)?;
    let offset = match offset_text {
        "" => 0,
        text => {
            let constant = parse_constant(text).ok_or(LexErr::MemOffsetOutOfBounds)?;
            if (constant as i16) as u32 != constant {
                return Err(LexErr::MemOffsetOutOfBounds);
            }
            constant as i16
        }
    };
    Ok(MemoryReference { register, offset })
}

impl FromStr for Operand {
    type Err = LexErr;

    /// Parses one operand field. The field should already be trimmed; any
    /// trailing text after the first token is an error.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lexer = Token::lexer(s);
        let token = match lexer.next() {
            Some(token) => token?,
            None => return Err(LexErr::UnrecognizedOperand),
        };
        if lexer.next().is_some() {
            return Err(LexErr::UnrecognizedOperand);
        }
        Ok(match token {
            Token::Reg(register) => Operand::Register(register),
            Token::Constant(value) => Operand::Constant(value),
            Token::Symbol(name) => Operand::Symbol(name),
            Token::Memory(reference) => Operand::Memory(reference),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CodePointer, PointerTarget};

    fn operand(text: &str) -> Operand {
        text.parse().unwrap_or_else(|e| panic!("failed to parse {text:?}: {e}"))
    }

    #[test]
    fn test_small_constant() {
        let token = operand("5");
        assert_eq!(token.constant5(), Some(5));
        assert_eq!(token.signed16(), Some(5));
        assert_eq!(token.unsigned16(), Some(5));
        assert_eq!(token.register(), None);
        assert_eq!(token.memory(), None);
        assert_eq!(
            token.absolute_pointer(),
            Some(CodePointer { absolute: true, target: PointerTarget::Constant(5) })
        );
        // 5 is not word-aligned, so it cannot be a branch destination.
        assert_eq!(token.relative_pointer(), None);
    }

    #[test]
    fn test_hex_constant() {
        let token = operand("0x50");
        assert_eq!(token.constant5(), None);
        assert_eq!(token.signed16(), Some(0x50));
        assert_eq!(token.unsigned16(), Some(0x50));
        assert_eq!(
            token.relative_pointer(),
            Some(CodePointer { absolute: false, target: PointerTarget::Constant(0x50) })
        );
        assert_eq!(
            token.absolute_pointer(),
            Some(CodePointer { absolute: true, target: PointerTarget::Constant(0x50) })
        );
    }

    #[test]
    fn test_negative_constant() {
        let token = operand("-0x50");
        assert_eq!(token.constant5(), None);
        assert_eq!(token.signed16(), Some(-0x50));
        assert_eq!(token.unsigned16(), None);
        assert_eq!(
            token.relative_pointer(),
            Some(CodePointer { absolute: false, target: PointerTarget::Constant(0xffff_ffb0) })
        );
        assert_eq!(
            token.absolute_pointer(),
            Some(CodePointer { absolute: true, target: PointerTarget::Constant(0xffff_ffb0) })
        );
    }

    #[test]
    fn test_registers() {
        let cases = [
            ("$t0", 8),
            ("$8", 8),
            ("$r8", 8),
            ("$a0", 4),
            ("$4", 4),
            ("$r15", 15),
            ("$r31", 31),
        ];
        for (text, index) in cases {
            let token = operand(text);
            assert_eq!(token.register(), Reg::new(index), "register for {text}");
            assert_eq!(token.signed16(), None);
            assert_eq!(token.unsigned16(), None);
            assert_eq!(token.constant5(), None);
            assert_eq!(token.relative_pointer(), None);
            assert_eq!(token.absolute_pointer(), None);
            assert_eq!(token.memory(), None);
        }
    }

    #[test]
    fn test_register_name_table() {
        let mut expected = vec![
            ("zero".to_string(), 0),
            ("at".to_string(), 1),
            ("gp".to_string(), 28),
            ("sp".to_string(), 29),
            ("fp".to_string(), 30),
            ("ra".to_string(), 31),
            ("v0".to_string(), 2),
            ("v1".to_string(), 3),
            ("t8".to_string(), 24),
            ("t9".to_string(), 25),
            ("s8".to_string(), 30),
            ("k0".to_string(), 26),
            ("k1".to_string(), 27),
        ];
        for i in 0u8..32 {
            expected.push((i.to_string(), i));
            expected.push((format!("r{i}"), i));
        }
        for i in 0u8..8 {
            expected.push((format!("t{i}"), i + 8));
            expected.push((format!("s{i}"), i + 16));
        }
        for i in 0u8..4 {
            expected.push((format!("a{i}"), i + 4));
        }
        for (name, index) in expected {
            assert_eq!(register_index(&name), Some(index), "register ${name}");
        }
    }

    #[test]
    fn test_symbol() {
        let token = operand("Monkey5");
        assert_eq!(token.register(), None);
        assert_eq!(token.signed16(), None);
        assert_eq!(token.unsigned16(), None);
        assert_eq!(token.constant5(), None);
        assert_eq!(token.memory(), None);
        assert_eq!(
            token.relative_pointer(),
            Some(CodePointer {
                absolute: false,
                target: PointerTarget::Symbol("Monkey5".to_string()),
            })
        );
        assert_eq!(
            token.absolute_pointer(),
            Some(CodePointer {
                absolute: true,
                target: PointerTarget::Symbol("Monkey5".to_string()),
            })
        );
    }

    #[test]
    fn test_memory_references() {
        let token = operand("-0x50($r5)");
        assert_eq!(
            token.memory(),
            Some(MemoryReference { register: Reg(5), offset: -0x50 })
        );
        assert_eq!(token.register(), None);
        assert_eq!(token.signed16(), None);
        assert_eq!(token.relative_pointer(), None);
        assert_eq!(token.absolute_pointer(), None);

        // An empty offset means 0.
        let token = operand("($r31)");
        assert_eq!(
            token.memory(),
            Some(MemoryReference { register: Reg(31), offset: 0 })
        );

        for text in ["0x7fff($r1)", "-0x8000($r1)", "0x1337($t0)"] {
            assert!(text.parse::<Operand>().is_ok(), "expected {text:?} to parse");
        }
    }

    #[test]
    fn test_invalid_operands() {
        let cases = [
            ("Monkey Brain", LexErr::UnrecognizedOperand),
            ("$r32", LexErr::InvalidRegister),
            ("$32", LexErr::InvalidRegister),
            ("$r-1", LexErr::InvalidRegister),
            ("0x8000($r1)", LexErr::MemOffsetOutOfBounds),
            ("-0x8001($r1)", LexErr::MemOffsetOutOfBounds),
            ("0x100000000", LexErr::ConstantOutOfRange),
            ("-0x100000000", LexErr::ConstantOutOfRange),
            ("($zz)", LexErr::InvalidMemoryReference),
            ("", LexErr::UnrecognizedOperand),
            ("5,", LexErr::UnrecognizedOperand),
        ];
        for (text, expected) in cases {
            assert_eq!(text.parse::<Operand>(), Err(expected), "for {text:?}");
        }
    }

    #[test]
    fn test_leading_zero_register_rejected() {
        assert_eq!(register_index("07"), None);
        assert_eq!(register_index("r07"), None);
        assert_eq!(register_index("0"), Some(0));
        assert_eq!(register_index("r0"), Some(0));
    }
}
