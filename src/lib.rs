//! Macrocraft – a crafting-macro language and its interpreter
//!
//! This crate implements a small line-oriented automation language with:
//! - A grammar and parser producing typed commands with orthogonal modifiers
//! - A craft-loop rewriter that wraps macro bodies with repeat scaffolding
//! - A stack-based execution engine with pause/resume/stop/step control
//! - Pluggable producers that feed commands lazily instead of from a fixed list
//! - Boundary traits for the output channel, environment, input and macro registry

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Macro language front end: grammar, modifiers, commands, parser, craft loops.
pub mod interpreter;
/// Execution engine and its collaborators.
pub mod runtime;

// Re-export key types for convenience
pub use interpreter::{Command, CommandKind, SyntaxError, parse_macro, rewrite_craft_loop};
pub use runtime::{EngineConfig, EngineState, MacroEngine};

/// Current version of the macrocraft crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
