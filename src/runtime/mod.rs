//! Execution engine and public API
//!
//! This module provides the [`MacroEngine`] that runs parsed macros against an
//! external environment, plus the boundary traits that environment must
//! implement and the configuration that tunes timing and error policy.

use serde::{Deserialize, Serialize};

use crate::interpreter::CraftLoopConfig;

// Submodules
pub mod catalog;
pub mod control;
pub mod engine;
pub mod error;
pub mod execute;
pub mod frame;
pub mod host;
pub mod signal;
pub mod simulate;
pub mod storage;

/// Configuration for the macro engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default upper bound for `/waitaddon`, in milliseconds
    pub addon_max_wait_ms: u64,

    /// Poll interval for `/waitaddon`, in milliseconds
    pub addon_poll_ms: u64,

    /// Default upper bound for `/require`, in milliseconds
    pub status_max_wait_ms: u64,

    /// Poll interval for `/require`, in milliseconds
    pub status_poll_ms: u64,

    /// Upper bound when waiting for a crafting action to register
    pub action_max_wait_ms: u64,

    /// Poll interval while waiting for a crafting action to register
    pub action_poll_ms: u64,

    /// Default upper bound for quality/stat checks (zero checks once)
    pub stat_max_wait_ms: u64,

    /// Poll interval for quality/stat checks
    pub stat_poll_ms: u64,

    /// Treat an unconfirmed crafting action as a command error
    pub stop_on_action_timeout: bool,

    /// Craft-loop scaffolding settings
    pub craft_loop: CraftLoopConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            addon_max_wait_ms: 5000,
            addon_poll_ms: 500,
            status_max_wait_ms: 1000,
            status_poll_ms: 250,
            action_max_wait_ms: 5000,
            action_poll_ms: 100,
            stat_max_wait_ms: 0,
            stat_poll_ms: 250,
            stop_on_action_timeout: true,
            craft_loop: CraftLoopConfig::default(),
        }
    }
}

// Re-export commonly used types
pub use catalog::CraftActionCatalog;
pub use control::ControlCommand;
pub use engine::{EngineState, EngineStatus, FrameStatus, MacroEngine};
pub use error::{CommandError, ExecError};
pub use frame::ActiveMacro;
pub use host::{
    CharacterStats, CraftState, Environment, Host, InputInjector, MacroDefinition, MacroLanguage,
    MacroRegistry, MemoryRegistry, OutputChannel, ScriptRuntime, Severity,
};
