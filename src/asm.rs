//! Assembling tokenized lines into an executable.
//!
//! The assembler walks the lines in order, carrying a current segment start
//! and a current address. Instructions and `.word` directives land at the
//! current address and advance it by 4; `.text` moves both; symbol markers
//! record the current address under their name. Segments that end up exactly
//! adjacent are merged, so the segment map always holds maximal runs of
//! instructions.
//!
//! The module notably consists of:
//! - [`assemble`]: the entry point turning lines into an [`Executable`].
//! - [`Executable`]: the address-mapped program with its symbol table, which
//!   the emulator executes and the encoder serializes.

pub mod encoding;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fmt::Write as _;

use crate::ast::{Instruction, TemplateErr};
use crate::parse::{Directive, Line, LineKind};

/// An assembled program: segments of instructions mapped into the address
/// space, plus the symbol table.
///
/// Invariants upheld by [`assemble`]:
/// - segment start addresses are word-aligned and segments never overlap;
/// - exactly-adjacent segments are merged;
/// - symbol names are unique and their addresses word-aligned.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Executable {
    /// Maps each segment's start address to its run of instructions.
    pub(crate) segments: BTreeMap<u32, Vec<Instruction>>,
    /// Maps each symbol name to its address.
    pub(crate) symbols: HashMap<String, u32>,
}

impl Executable {
    /// The first address past the last instruction of any segment, or 0 for
    /// an empty executable.
    pub fn end(&self) -> u32 {
        self.segments
            .iter()
            .map(|(&start, run)| start.wrapping_add(4 * run.len() as u32))
            .max()
            .unwrap_or(0)
    }

    /// The instruction at `address`, if the address is word-aligned and lies
    /// within some segment.
    pub fn get(&self, address: u32) -> Option<&Instruction> {
        lookup(&self.segments, address)
    }

    /// The symbol table.
    pub fn symbols(&self) -> &HashMap<String, u32> {
        &self.symbols
    }

    /// Iterates over the segments in ascending start-address order.
    pub fn segments(&self) -> impl Iterator<Item = (u32, &[Instruction])> + '_ {
        self.segments.iter().map(|(&start, run)| (start, run.as_slice()))
    }

    /// Renders the executable back into tokenized lines.
    ///
    /// The output re-assembles to the same segments and symbol table:
    /// `.text` directives are emitted wherever the address cursor jumps
    /// (omitting the initial `.text 0`), and symbol markers are interleaved
    /// at their addresses, including addresses in gaps or past the last
    /// segment.
    pub fn render(&self) -> Result<Vec<Line>, TemplateErr> {
        let mut symbols: Vec<(&str, u32)> = self
            .symbols
            .iter()
            .map(|(name, &address)| (name.as_str(), address))
            .collect();
        symbols.sort_by(|a, b| (a.1, a.0).cmp(&(b.1, b.0)));

        let mut lines = Vec::new();
        let mut cursor = 0u32;
        let mut next_symbol = 0;

        for (&start, run) in &self.segments {
            while next_symbol < symbols.len() && symbols[next_symbol].1 < start {
                let (name, address) = symbols[next_symbol];
                if address != cursor {
                    lines.push(text_directive(address));
                    cursor = address;
                }
                lines.push(symbol_marker(name));
                next_symbol += 1;
            }
            if start != cursor {
                lines.push(text_directive(start));
                cursor = start;
            }
            for (index, instruction) in run.iter().enumerate() {
                let address = start.wrapping_add(4 * index as u32);
                while next_symbol < symbols.len() && symbols[next_symbol].1 == address {
                    lines.push(symbol_marker(symbols[next_symbol].0));
                    next_symbol += 1;
                }
                lines.push(instruction.render()?);
                cursor = address.wrapping_add(4);
            }
        }
        while next_symbol < symbols.len() {
            let (name, address) = symbols[next_symbol];
            if address != cursor {
                lines.push(text_directive(address));
                cursor = address;
            }
            lines.push(symbol_marker(name));
            next_symbol += 1;
        }

        for (index, line) in lines.iter_mut().enumerate() {
            line.number = index + 1;
        }
        Ok(lines)
    }

    /// Renders the executable to assembly source text.
    pub fn render_source(&self) -> Result<String, TemplateErr> {
        let mut source = String::new();
        for line in self.render()? {
            // Writing to a String cannot fail.
            let _ = writeln!(source, "{line}");
        }
        Ok(source)
    }
}

fn text_directive(address: u32) -> Line {
    Line {
        number: 0,
        comment: None,
        kind: LineKind::Directive(Directive { name: "text".to_string(), constant: address }),
    }
}

fn symbol_marker(name: &str) -> Line {
    Line { number: 0, comment: None, kind: LineKind::SymbolMarker(name.to_string()) }
}

fn lookup(segments: &BTreeMap<u32, Vec<Instruction>>, address: u32) -> Option<&Instruction> {
    if address % 4 != 0 {
        return None;
    }
    let (&start, run) = segments.range(..=address).next_back()?;
    run.get(((address - start) / 4) as usize)
}

/// An error raised while assembling, with the offending line number.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct AsmErr {
    /// The 1-based line the error occurred on.
    pub line: usize,
    /// What went wrong.
    pub kind: AsmErrKind,
}

/// Kinds of errors that can occur while assembling.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum AsmErrKind {
    /// An instruction failed template matching.
    Template(TemplateErr),
    /// An instruction or `.word` landed on an already-occupied address.
    OverwritingAddress(u32),
    /// A `.text` directive named an address that is not word-aligned.
    MisalignedSegment(u32),
    /// A symbol was declared twice.
    RepeatedSymbol(String),
    /// A directive other than `.text` or `.word`.
    UnknownDirective(String),
}

impl fmt::Display for AsmErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

impl fmt::Display for AsmErrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmErrKind::Template(err) => err.fmt(f),
            AsmErrKind::OverwritingAddress(address) => {
                write!(f, "overwriting address 0x{address:x}")
            }
            AsmErrKind::MisalignedSegment(address) => {
                write!(f, "misaligned segment 0x{address:x}")
            }
            AsmErrKind::RepeatedSymbol(name) => {
                write!(f, "repeated symbol declaration {name}")
            }
            AsmErrKind::UnknownDirective(name) => write!(f, "unknown directive .{name}"),
        }
    }
}

impl std::error::Error for AsmErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            AsmErrKind::Template(err) => Some(err),
            _ => None,
        }
    }
}

impl crate::err::Error for AsmErr {
    fn help(&self) -> Option<std::borrow::Cow<'_, str>> {
        match &self.kind {
            AsmErrKind::Template(err) => crate::err::Error::help(err),
            AsmErrKind::OverwritingAddress(_) => {
                Some("two segments are trying to claim the same address".into())
            }
            AsmErrKind::MisalignedSegment(_) => {
                Some(".text addresses must be multiples of 4".into())
            }
            AsmErrKind::RepeatedSymbol(_) => Some("symbol names must be unique".into()),
            AsmErrKind::UnknownDirective(_) => {
                Some("supported directives are .text and .word".into())
            }
        }
    }
}

/// Assembles tokenized lines into an executable.
pub fn assemble(lines: &[Line]) -> Result<Executable, AsmErr> {
    let mut segments: BTreeMap<u32, Vec<Instruction>> = BTreeMap::new();
    let mut symbols: HashMap<String, u32> = HashMap::new();
    let mut segment_start = 0u32;
    let mut address = 0u32;

    for line in lines {
        let fail = |kind| Err(AsmErr { line: line.number, kind });
        match &line.kind {
            LineKind::Empty => {}
            LineKind::SymbolMarker(name) => {
                if symbols.contains_key(name) {
                    return fail(AsmErrKind::RepeatedSymbol(name.clone()));
                }
                symbols.insert(name.clone(), address);
            }
            LineKind::Directive(directive) => match directive.name.as_str() {
                "text" => {
                    if directive.constant % 4 != 0 {
                        return fail(AsmErrKind::MisalignedSegment(directive.constant));
                    }
                    segment_start = directive.constant;
                    address = directive.constant;
                }
                "word" => {
                    // A `.word` is decoded eagerly; unrecognized values stay
                    // `.word` instructions and re-encode to themselves.
                    let instruction = encoding::decode(directive.constant);
                    if let Err(kind) =
                        append(&mut segments, segment_start, &mut address, instruction)
                    {
                        return fail(kind);
                    }
                }
                _ => return fail(AsmErrKind::UnknownDirective(directive.name.clone())),
            },
            LineKind::Instruction(tokenized) => {
                let instruction = match Instruction::parse(tokenized) {
                    Ok(instruction) => instruction,
                    Err(err) => return fail(AsmErrKind::Template(err)),
                };
                if let Err(kind) = append(&mut segments, segment_start, &mut address, instruction)
                {
                    return fail(kind);
                }
            }
        }
    }

    Ok(Executable { segments: coalesce(segments), symbols })
}

/// Appends an instruction at the current address, rejecting overlaps.
fn append(
    segments: &mut BTreeMap<u32, Vec<Instruction>>,
    segment_start: u32,
    address: &mut u32,
    instruction: Instruction,
) -> Result<(), AsmErrKind> {
    if lookup(segments, *address).is_some() {
        return Err(AsmErrKind::OverwritingAddress(*address));
    }
    segments.entry(segment_start).or_default().push(instruction);
    *address = address.wrapping_add(4);
    Ok(())
}

/// Merges exactly-adjacent segments in one ascending sweep.
fn coalesce(segments: BTreeMap<u32, Vec<Instruction>>) -> BTreeMap<u32, Vec<Instruction>> {
    let mut merged = BTreeMap::new();
    let mut current: Option<(u32, Vec<Instruction>)> = None;
    for (start, run) in segments {
        current = Some(match current.take() {
            Some((current_start, mut current_run))
                if current_start.wrapping_add(4 * current_run.len() as u32) == start =>
            {
                current_run.extend(run);
                (current_start, current_run)
            }
            Some((current_start, current_run)) => {
                merged.insert(current_start, current_run);
                (start, run)
            }
            None => (start, run),
        });
    }
    if let Some((start, run)) = current {
        merged.insert(start, run);
    }
    merged
}
