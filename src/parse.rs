//! Turning assembly source into tokenized lines.
//!
//! The tokenizer is line-oriented: each statement occupies one source line,
//! and every kept line remembers its 1-based line number for error reporting.
//! A line is one of four things: nothing (possibly just a comment), a
//! directive like `.text 0x5000`, a symbol marker like `LOOP:`, or an
//! instruction call. Comments start at `#`, `//`, or `;` and run to the end
//! of the line.

pub mod lex;

use std::fmt;

use crate::ast::Operand;
use self::lex::{parse_constant, LexErr};

/// One tokenized line of an assembly source file.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Line {
    /// The 1-based line number in the originating source.
    pub number: usize,
    /// The trailing comment, without its lead characters.
    pub comment: Option<String>,
    /// What the line contains.
    pub kind: LineKind,
}

/// The content of a tokenized line.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum LineKind {
    /// Nothing but whitespace or a comment.
    Empty,
    /// A directive such as `.text 0x5000` or `.word 0xf2345678`.
    Directive(Directive),
    /// A symbol marker such as `LOOP:`.
    SymbolMarker(String),
    /// An instruction call.
    Instruction(TokenizedInstruction),
}

/// A directive: a dotted name followed by one constant.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Directive {
    /// The directive's name, without the leading dot.
    pub name: String,
    /// The directive's constant argument.
    pub constant: u32,
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{} 0x{:x}", self.name, self.constant)
    }
}

/// An instruction call: an uppercase mnemonic and its operand tokens.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TokenizedInstruction {
    /// The mnemonic as written in source.
    pub name: String,
    /// The parsed operands, in source order.
    pub args: Vec<Operand>,
}

impl fmt::Display for TokenizedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            match i {
                0 => write!(f, " {arg}")?,
                _ => write!(f, ", {arg}")?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LineKind::Empty => {}
            LineKind::Directive(directive) => directive.fmt(f)?,
            LineKind::SymbolMarker(name) => write!(f, "{name}:")?,
            LineKind::Instruction(instruction) => instruction.fmt(f)?,
        }
        if let Some(comment) = &self.comment {
            if !matches!(self.kind, LineKind::Empty) {
                f.write_str(" ")?;
            }
            write!(f, "#{comment}")?;
        }
        Ok(())
    }
}

/// An error raised while tokenizing source, with the offending line number.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ParseErr {
    /// The 1-based line the error occurred on.
    pub line: usize,
    /// What went wrong.
    pub kind: ParseErrKind,
}

/// Kinds of errors that can occur while tokenizing a line.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ParseErrKind {
    /// The leading field is not an uppercase mnemonic (or the line fits no
    /// other form).
    UnknownInstruction,
    /// A non-final operand is missing its trailing comma.
    MissingComma(usize),
    /// An operand failed to lex; carries the 1-based operand index.
    Operand(usize, LexErr),
}

impl fmt::Display for ParseErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error on line {}: {}", self.line, self.kind)
    }
}

impl fmt::Display for ParseErrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrKind::UnknownInstruction => f.write_str("unknown instruction"),
            ParseErrKind::MissingComma(index) => {
                write!(f, "missing comma after operand {index}")
            }
            ParseErrKind::Operand(index, err) => write!(f, "operand {index}: {err}"),
        }
    }
}

impl std::error::Error for ParseErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ParseErrKind::Operand(_, err) => Some(err),
            _ => None,
        }
    }
}

impl crate::err::Error for ParseErr {
    fn help(&self) -> Option<std::borrow::Cow<'_, str>> {
        match &self.kind {
            ParseErrKind::UnknownInstruction => {
                Some("statements are a directive, a `NAME:` marker, or an uppercase mnemonic".into())
            }
            ParseErrKind::MissingComma(_) => Some("separate operands with commas".into()),
            ParseErrKind::Operand(_, err) => crate::err::Error::help(err),
        }
    }
}

/// Tokenizes a whole source file.
///
/// Lines are split on `\n` and numbered from 1. Whitespace-only lines are
/// dropped; comment-only lines are kept as [`LineKind::Empty`] lines carrying
/// their comment.
pub fn tokenize(source: &str) -> Result<Vec<Line>, ParseErr> {
    let mut lines = Vec::new();
    for (index, text) in source.split('\n').enumerate() {
        let number = index + 1;
        let (kind, comment) =
            tokenize_line(text).map_err(|kind| ParseErr { line: number, kind })?;
        if matches!(kind, LineKind::Empty) && comment.is_none() {
            continue;
        }
        lines.push(Line { number, comment, kind });
    }
    Ok(lines)
}

const COMMENT_LEADS: [&str; 3] = ["#", "//", ";"];

/// Splits a line at its first comment lead, returning the prefix and the
/// comment text after the lead.
fn split_comment(text: &str) -> Option<(&str, &str)> {
    COMMENT_LEADS
        .iter()
        .filter_map(|lead| text.find(lead).map(|at| (at, at + lead.len())))
        .min_by_key(|&(at, _)| at)
        .map(|(at, end)| (&text[..at], &text[end..]))
}

/// Tokenizes a single line into its kind and optional comment.
fn tokenize_line(text: &str) -> Result<(LineKind, Option<String>), ParseErrKind> {
    if let Some((before, comment)) = split_comment(text) {
        // Re-tokenize the prefix; the comment rides along with whatever it is.
        let (kind, _) = tokenize_line(before)?;
        return Ok((kind, Some(comment.to_string())));
    }

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok((LineKind::Empty, None));
    }

    if trimmed.starts_with('.') {
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if let [head, constant_text] = fields.as_slice() {
            let name = &head[1..];
            if !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphabetic()) {
                if let Some(constant) = parse_constant(constant_text) {
                    return Ok((
                        LineKind::Directive(Directive { name: name.to_string(), constant }),
                        None,
                    ));
                }
            }
        }
        // Malformed directives fall through and fail the mnemonic check.
    }

    if let Some(name) = trimmed.strip_suffix(':') {
        if !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return Ok((LineKind::SymbolMarker(name.to_string()), None));
        }
    }

    let mut fields = trimmed.split_whitespace();
    let name = fields.next().unwrap_or("");
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(ParseErrKind::UnknownInstruction);
    }

    let operands: Vec<&str> = fields.collect();
    let mut args = Vec::with_capacity(operands.len());
    for (index, field) in operands.iter().copied().enumerate() {
        let operand_text = if index + 1 != operands.len() {
            field
                .strip_suffix(',')
                .ok_or(ParseErrKind::MissingComma(index + 1))?
        } else {
            field
        };
        let operand = operand_text
            .parse::<Operand>()
            .map_err(|err| ParseErrKind::Operand(index + 1, err))?;
        args.push(operand);
    }

    Ok((
        LineKind::Instruction(TokenizedInstruction { name: name.to_string(), args }),
        None,
    ))
}

#[cfg(test)]
mod tests {
    use crate::ast::{MemoryReference, Reg};

    use super::*;

    fn instruction(name: &str, args: Vec<Operand>) -> LineKind {
        LineKind::Instruction(TokenizedInstruction { name: name.to_string(), args })
    }

    #[test]
    fn test_tokenize_source() {
        let source = "\
.text 0x50000 # this says where our program's data is located.
    FOOBAR:
    LUI $r5, 0xDEAD
    ORI $r5, $r5, 0xBEEF # 0xDEADBEEF is a cool hex string.

    SW $r5, 0x1337($t0)

    # the next line is a NOP
    .data 0x00000000

    J FOOBAR
    NOP
    ";
        let lines = tokenize(source).unwrap();
        let expected = vec![
            Line {
                number: 1,
                comment: Some(" this says where our program's data is located.".to_string()),
                kind: LineKind::Directive(Directive { name: "text".to_string(), constant: 0x50000 }),
            },
            Line {
                number: 2,
                comment: None,
                kind: LineKind::SymbolMarker("FOOBAR".to_string()),
            },
            Line {
                number: 3,
                comment: None,
                kind: instruction(
                    "LUI",
                    vec![Operand::Register(Reg(5)), Operand::Constant(0xDEAD)],
                ),
            },
            Line {
                number: 4,
                comment: Some(" 0xDEADBEEF is a cool hex string.".to_string()),
                kind: instruction(
                    "ORI",
                    vec![
                        Operand::Register(Reg(5)),
                        Operand::Register(Reg(5)),
                        Operand::Constant(0xBEEF),
                    ],
                ),
            },
            Line {
                number: 6,
                comment: None,
                kind: instruction(
                    "SW",
                    vec![
                        Operand::Register(Reg(5)),
                        Operand::Memory(MemoryReference { register: Reg(8), offset: 0x1337 }),
                    ],
                ),
            },
            Line {
                number: 8,
                comment: Some(" the next line is a NOP".to_string()),
                kind: LineKind::Empty,
            },
            Line {
                number: 9,
                comment: None,
                kind: LineKind::Directive(Directive { name: "data".to_string(), constant: 0 }),
            },
            Line {
                number: 11,
                comment: None,
                kind: instruction("J", vec![Operand::Symbol("FOOBAR".to_string())]),
            },
            Line {
                number: 12,
                comment: None,
                kind: instruction("NOP", vec![]),
            },
        ];
        assert_eq!(lines, expected);
    }

    #[test]
    fn test_tokenize_invalid_lines() {
        let cases = [
            "LUI $r5 0xDEAD",
            ".text foo",
            "Monkey Brains:",
            "foo $r5",
            "$r5, $r4",
            "ORI $r1, 5,",
        ];
        for source in cases {
            assert!(tokenize(source).is_err(), "expected tokenize to fail: {source:?}");
        }
    }

    #[test]
    fn test_error_reporting() {
        let err = tokenize("NOP\nLUI $r5 0xDEAD").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.kind, ParseErrKind::MissingComma(1));
        assert_eq!(err.to_string(), "error on line 2: missing comma after operand 1");

        let err = tokenize("ORI $r1, $r99, 5").unwrap_err();
        assert_eq!(err.kind, ParseErrKind::Operand(2, LexErr::InvalidRegister));
    }

    #[test]
    fn test_comment_leads() {
        for source in ["NOP # c", "NOP // c", "NOP ; c"] {
            let lines = tokenize(source).unwrap();
            assert_eq!(lines.len(), 1);
            assert_eq!(lines[0].comment.as_deref(), Some(" c"));
            assert_eq!(lines[0].kind, instruction("NOP", vec![]));
        }

        // The earliest lead wins.
        let lines = tokenize("NOP ; x # y").unwrap();
        assert_eq!(lines[0].comment.as_deref(), Some(" x # y"));
    }

    #[test]
    fn test_line_display_round_trip() {
        let source = "\
.text 0x50
LOOP_1:
ADDIU $5, $6, 0xffffffef
SW $5, 4919($8)
J LOOP_1";
        let lines = tokenize(source).unwrap();
        let rendered: Vec<String> = lines.iter().map(Line::to_string).collect();
        let reparsed = tokenize(&rendered.join("\n")).unwrap();
        assert_eq!(lines, reparsed);
    }
}
