//! Boundary contracts between the engine and the outside world
//!
//! The engine never talks to a game client, chat box or input device directly.
//! Everything it needs is reached through the traits below, bundled in a
//! [`Host`]. Telemetry is exchanged as plain value structs.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::interpreter::{CommandProducer, ItemQuality};

/// Colour class for informational messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Neutral notice
    Info,
    /// Something needs attention
    Warning,
    /// Something failed
    Error,
}

/// One-way text sink (chat/command channel and log panes)
pub trait OutputChannel: Send + Sync {
    /// Send text to the command channel as if typed
    fn send(&self, text: &str);
    /// Print an informational message
    fn print_info(&self, text: &str);
    /// Print an echo message
    fn print_echo(&self, text: &str);
    /// Print an error message
    fn print_error(&self, text: &str);

    /// Print a message with a severity colour
    fn print_notice(&self, text: &str, severity: Severity) {
        match severity {
            Severity::Error => self.print_error(text),
            Severity::Info | Severity::Warning => self.print_info(text),
        }
    }
}

/// Snapshot of an in-progress synthesis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CraftState {
    /// 1-based step number, advancing after every registered action
    pub step: u32,
    /// Current progress
    pub progress: u32,
    /// Progress needed to finish
    pub max_progress: u32,
    /// Current quality
    pub quality: u32,
    /// Maximum quality
    pub max_quality: u32,
    /// Chance of a high-quality result, in percent
    pub percent_hq: u32,
    /// Remaining durability
    pub durability: u32,
    /// Current condition name (normal, good, excellent, poor, ...)
    pub condition: String,
}

/// Character attributes relevant to crafting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterStats {
    /// Craftsmanship
    pub craftsmanship: u32,
    /// Control
    pub control: u32,
    /// Crafting points
    pub cp: u32,
}

/// Queries and actions against the external environment
pub trait Environment: Send + Sync {
    /// Whether commands can run at all (connected, logged in)
    fn is_ready(&self) -> bool;

    /// Synthesis telemetry, `None` when not crafting
    fn craft_state(&self) -> Option<CraftState>;

    /// Current character stats
    fn character_stats(&self) -> CharacterStats;

    /// Whether equipped gear needs repair
    fn needs_repair(&self) -> bool;

    /// Whether any equipped gear is ready for materia extraction
    fn spiritbond_ready(&self) -> bool;

    /// Whether a named status effect is active
    fn has_status(&self, name: &str) -> bool;

    /// Whether a named UI element is visible and ready for input
    fn addon_ready(&self, name: &str) -> bool;

    /// Names of every crafting action, consulted once by the action catalog
    fn craft_action_names(&self) -> Vec<String>;

    /// Select an entity; `Ok(false)` when nothing matches
    fn select_target(&self, name: &str, index: Option<u32>) -> anyhow::Result<bool>;

    /// Use an inventory item; `Ok(false)` when none is available
    fn use_item(&self, name: &str, quality: Option<ItemQuality>) -> anyhow::Result<bool>;

    /// Resolve a recipe name to its identifier
    fn find_recipe(&self, name: &str) -> Option<u32>;

    /// Open the recipe window on a recipe; `Ok(false)` when refused
    fn open_recipe(&self, id: u32) -> anyhow::Result<bool>;
}

/// Simulated keyboard and UI input
pub trait InputInjector: Send + Sync {
    /// Press a named key or key combination; `Ok(false)` for unknown names
    fn send_key(&self, name: &str) -> anyhow::Result<bool>;

    /// Trigger a registered UI click; `Ok(false)` for unknown names
    fn send_click(&self, name: &str) -> anyhow::Result<bool>;
}

/// Language a macro is written in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacroLanguage {
    /// The line-oriented macro language parsed by this crate
    #[default]
    Native,
    /// An embedded scripting language run through a [`ScriptRuntime`]
    Script,
}

/// A stored macro
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroDefinition {
    /// Display name, used for lookup
    pub name: String,
    /// Raw source text
    pub contents: String,
    /// Source language
    #[serde(default)]
    pub language: MacroLanguage,
    /// Whether craft-loop scaffolding is applied when run
    #[serde(default)]
    pub craft_loop: bool,
    /// Craft-loop repeat count (`-1` forever, `0` no scaffold)
    #[serde(default)]
    pub craft_count: i32,
}

impl MacroDefinition {
    /// A plain native macro
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
            language: MacroLanguage::Native,
            craft_loop: false,
            craft_count: 0,
        }
    }

    /// Enable craft looping with a repeat count
    pub fn with_craft_loop(mut self, count: i32) -> Self {
        self.craft_loop = true;
        self.craft_count = count;
        self
    }

    /// Mark as written in the embedded scripting language
    pub fn scripted(mut self) -> Self {
        self.language = MacroLanguage::Script;
        self
    }
}

/// Lookup of stored macros
pub trait MacroRegistry: Send + Sync {
    /// Every macro whose name matches (case-insensitively)
    fn find_by_name(&self, name: &str) -> anyhow::Result<Vec<MacroDefinition>>;
}

/// Runs scripted macros, handing back a line producer
pub trait ScriptRuntime: Send + Sync {
    /// Start a script; the returned producer yields macro lines
    fn start(&self, definition: &MacroDefinition) -> anyhow::Result<Box<dyn CommandProducer>>;
}

/// In-memory registry, for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    macros: RwLock<Vec<MacroDefinition>>,
}

impl MemoryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition (duplicates are kept, making lookups ambiguous)
    pub fn insert(&self, definition: MacroDefinition) {
        self.macros.write().push(definition);
    }

    /// Remove every definition with this name
    pub fn remove(&self, name: &str) {
        self.macros
            .write()
            .retain(|def| !def.name.eq_ignore_ascii_case(name));
    }

    /// Number of stored definitions
    pub fn len(&self) -> usize {
        self.macros.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.macros.read().is_empty()
    }
}

impl MacroRegistry for MemoryRegistry {
    fn find_by_name(&self, name: &str) -> anyhow::Result<Vec<MacroDefinition>> {
        Ok(self
            .macros
            .read()
            .iter()
            .filter(|def| def.name.eq_ignore_ascii_case(name.trim()))
            .cloned()
            .collect())
    }
}

/// Every collaborator the engine needs
#[derive(Clone)]
pub struct Host {
    /// Text output
    pub output: Arc<dyn OutputChannel>,
    /// Environment queries and actions
    pub environment: Arc<dyn Environment>,
    /// Input simulation
    pub input: Arc<dyn InputInjector>,
    /// Stored macros
    pub registry: Arc<dyn MacroRegistry>,
    /// Optional scripting runtime
    pub scripts: Option<Arc<dyn ScriptRuntime>>,
}

impl Host {
    /// Bundle collaborators without a scripting runtime
    pub fn new(
        output: Arc<dyn OutputChannel>,
        environment: Arc<dyn Environment>,
        input: Arc<dyn InputInjector>,
        registry: Arc<dyn MacroRegistry>,
    ) -> Self {
        Self {
            output,
            environment,
            input,
            registry,
            scripts: None,
        }
    }

    /// Attach a scripting runtime
    pub fn with_scripts(mut self, scripts: Arc<dyn ScriptRuntime>) -> Self {
        self.scripts = Some(scripts);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_registry_matches_case_insensitively() {
        let registry = MemoryRegistry::new();
        registry.insert(MacroDefinition::new("Grade 8 Tincture", "/ac Reflect"));
        registry.insert(MacroDefinition::new("other", "/loop"));

        let found = registry.find_by_name("grade 8 tincture").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].contents, "/ac Reflect");
        assert!(registry.find_by_name("missing").unwrap().is_empty());
    }

    #[test]
    fn duplicate_names_are_all_returned() {
        let registry = MemoryRegistry::new();
        registry.insert(MacroDefinition::new("dup", "/echo 1"));
        registry.insert(MacroDefinition::new("DUP", "/echo 2"));
        assert_eq!(registry.find_by_name("dup").unwrap().len(), 2);

        registry.remove("Dup");
        assert!(registry.is_empty());
    }
}
