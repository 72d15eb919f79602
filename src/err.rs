//! Common behavior for errors raised by the toolchain.
//!
//! Every stage of the toolchain (lexing, assembling, encoding, execution)
//! reports failures as values implementing [`std::error::Error`]. This module
//! adds the crate-wide [`Error`] trait on top, which lets front-ends query a
//! human-readable hint alongside the message itself.

use std::borrow::Cow;

/// Extra diagnostics shared by all toolchain errors.
///
/// Errors already carry their context in their `Display` output
/// (a line number for lexing and assembling, an instruction address for
/// execution). `help` optionally adds a suggestion for resolving the error.
pub trait Error: std::error::Error {
    /// A hint on how to resolve this error, if one is known.
    fn help(&self) -> Option<Cow<'_, str>> {
        None
    }
}
