//! Front end for the macro language.
//!
//! Macro text is split into lines, modifiers (`<wait.2>`, `<unsafe>`, …) are
//! lifted out of each line, and the remaining text is matched against the verb
//! grammar to build one typed [`Command`] per line. The craft-loop rewriter
//! operates on raw text before parsing, and producers feed source lines lazily
//! for macros driven by another scripting runtime.

/// Typed command model.
pub mod command;
/// Craft-loop text rewriting.
pub mod craft_loop;
/// nom combinators for verbs and their arguments.
pub mod grammar;
/// Modifier extraction.
pub mod modifier;
/// Line-oriented macro parser.
pub mod parser;
/// Lazily evaluated command sources.
pub mod producer;

pub use command::{
    Command, CommandKind, GateCounter, GatePass, LoopCounter, LoopStep, WaitPolicy, WaitRangeError,
};
pub use craft_loop::{CraftLoopConfig, CraftLoopError, UNBOUNDED_CRAFT_COUNT, rewrite_craft_loop};
pub use modifier::{ConditionModifier, ItemQuality, Modifiers};
pub use parser::parse_macro;
pub use producer::{ChannelProducer, CommandProducer, IterProducer, ProducerError};

use thiserror::Error;

/// Convenience result alias for parsing operations.
pub type Result<T> = std::result::Result<T, SyntaxError>;

/// Parsing failed on a specific line.
///
/// `line` is the 0-based line number within the parsed text and `column` the
/// 0-based character offset within that line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at line {line}, column {column}: {message}")]
pub struct SyntaxError {
    /// Human readable description of the failure.
    pub message: String,
    /// 0-based line number.
    pub line: usize,
    /// 0-based character offset within the line.
    pub column: usize,
}

impl SyntaxError {
    /// Construct a new syntax error.
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}
