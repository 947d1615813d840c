//! Error types for the macro engine
//!
//! Command failures are named `thiserror` variants the control loop reports
//! and pauses on. Host collaborator failures arrive as `anyhow` errors and are
//! treated as unanticipated.

use thiserror::Error;

use crate::interpreter::{CraftLoopError, ProducerError, SyntaxError};

/// Named failure raised while executing a command
#[derive(Debug, Error)]
pub enum CommandError {
    /// A bounded poll ran out of time
    #[error("timed out after {waited_ms}ms waiting for {target}")]
    Timeout {
        /// What was being waited for
        target: String,
        /// Accumulated wait in milliseconds
        waited_ms: u64,
    },

    /// No macro with this name exists
    #[error("no macro named \"{0}\"")]
    MacroNotFound(String),

    /// More than one macro has this name
    #[error("macro name \"{name}\" is ambiguous ({count} matches)")]
    AmbiguousMacro {
        /// Requested name
        name: String,
        /// Number of matching definitions
        count: usize,
    },

    /// Target could not be selected
    #[error("could not find target \"{0}\"")]
    TargetNotFound(String),

    /// Item could not be used
    #[error("could not use item \"{0}\"")]
    ItemNotFound(String),

    /// Recipe could not be resolved
    #[error("unknown recipe \"{0}\"")]
    RecipeNotFound(String),

    /// Recipe was resolved but could not be opened
    #[error("could not open recipe \"{name}\" ({id})")]
    RecipeNotOpened {
        /// Recipe name
        name: String,
        /// Resolved identifier
        id: u32,
    },

    /// Click name is not registered with the input injector
    #[error("unknown click \"{0}\"")]
    UnknownClick(String),

    /// Key name is not understood by the input injector
    #[error("unknown key \"{0}\"")]
    UnknownKey(String),

    /// The current frame cannot be restarted
    #[error("looping is not supported by {0}")]
    LoopUnsupported(String),

    /// Macro is written in a scripting language but no runtime is attached
    #[error("no script runtime available to run \"{0}\"")]
    NoScriptRuntime(String),

    /// Source text of a nested or produced macro failed to parse
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    /// Craft-loop scaffolding could not be applied
    #[error(transparent)]
    CraftLoop(#[from] CraftLoopError),

    /// A lazy command source failed
    #[error(transparent)]
    Producer(#[from] ProducerError),
}

/// Outcome of a failed execution attempt inside the control loop
#[derive(Debug, Error)]
pub enum ExecError {
    /// Named command failure; the frame stays and the engine pauses
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The engine is shutting down
    #[error("execution cancelled")]
    Cancelled,

    /// Anything else; the stack is cleared
    #[error("unexpected failure: {0}")]
    Unexpected(#[from] anyhow::Error),
}

/// Convenience result alias for command execution
pub type ExecResult<T> = std::result::Result<T, ExecError>;
