//! Deterministic dry-run host
//!
//! Stands in for a game client: every output line is recorded (and printed
//! when verbose), `/click synthesize` starts a synthesis, and each `/ac` line
//! advances the crafting step so action confirmation succeeds.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

use super::host::{
    CharacterStats, CraftState, Environment, Host, InputInjector, MacroRegistry, OutputChannel,
};
use crate::interpreter::ItemQuality;

const CRAFT_ACTIONS: &[&str] = &[
    "Basic Synthesis",
    "Basic Touch",
    "Master's Mend",
    "Observe",
    "Veneration",
    "Innovation",
    "Great Strides",
    "Waste Not",
    "Waste Not II",
    "Manipulation",
    "Byregot's Blessing",
    "Groundwork",
    "Careful Synthesis",
    "Prudent Touch",
    "Preparatory Touch",
    "Muscle Memory",
    "Reflect",
    "Trained Eye",
    "Delicate Synthesis",
    "Standard Touch",
    "Advanced Touch",
    "Final Appraisal",
    "Heart and Soul",
    "Intensive Synthesis",
    "Precise Touch",
    "Tricks of the Trade",
    "Rapid Synthesis",
    "Hasty Touch",
    "Trained Finesse",
    "Refined Touch",
    "Immaculate Mend",
    "Trained Perfection",
];

#[derive(Debug, Default)]
struct SimState {
    ready: bool,
    craft: Option<CraftState>,
    stats: CharacterStats,
    statuses: HashSet<String>,
    needs_repair: bool,
    spiritbond_ready: bool,
    transcript: Vec<String>,
}

/// Simulated environment, output channel and input injector
#[derive(Debug)]
pub struct DryRun {
    verbose: bool,
    state: Mutex<SimState>,
}

impl DryRun {
    /// Create a ready, idle simulation
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            state: Mutex::new(SimState {
                ready: true,
                stats: CharacterStats {
                    craftsmanship: 4000,
                    control: 3900,
                    cp: 600,
                },
                ..SimState::default()
            }),
        }
    }

    /// Bundle this simulation with a registry into a [`Host`]
    pub fn host(self: &Arc<Self>, registry: Arc<dyn MacroRegistry>) -> Host {
        Host::new(self.clone(), self.clone(), self.clone(), registry)
    }

    /// Every line recorded so far
    pub fn transcript(&self) -> Vec<String> {
        self.state.lock().transcript.clone()
    }

    /// Mark the environment ready or not
    pub fn set_ready(&self, ready: bool) {
        self.state.lock().ready = ready;
    }

    /// Add or remove a status effect
    pub fn set_status(&self, name: &str, active: bool) {
        let mut state = self.state.lock();
        let key = name.to_lowercase();
        if active {
            state.statuses.insert(key);
        } else {
            state.statuses.remove(&key);
        }
    }

    /// Set character stats
    pub fn set_stats(&self, stats: CharacterStats) {
        self.state.lock().stats = stats;
    }

    /// Flag gear as needing repair
    pub fn set_needs_repair(&self, needs_repair: bool) {
        self.state.lock().needs_repair = needs_repair;
    }

    fn record(&self, line: String) {
        if self.verbose {
            println!("{}", line);
        }
        self.state.lock().transcript.push(line);
    }

    fn start_synthesis(&self) {
        self.state.lock().craft = Some(CraftState {
            step: 1,
            max_progress: 100,
            max_quality: 1000,
            durability: 80,
            condition: "normal".to_string(),
            ..CraftState::default()
        });
    }

    fn apply_action(&self, name: &str) {
        let mut state = self.state.lock();
        let Some(craft) = state.craft.as_mut() else {
            return;
        };
        craft.step += 1;
        let lower = name.to_lowercase();
        if lower.contains("synthesis") {
            craft.progress = (craft.progress + 40).min(craft.max_progress);
        } else if lower.contains("touch") {
            craft.quality = (craft.quality + 200).min(craft.max_quality);
        }
        craft.durability = craft.durability.saturating_sub(10);
        if craft.progress >= craft.max_progress || craft.durability == 0 {
            state.craft = None;
        }
    }
}

impl OutputChannel for DryRun {
    fn send(&self, text: &str) {
        self.record(format!("> {}", text));
        if let Some(rest) = text.strip_prefix("/ac ") {
            self.apply_action(rest.trim().trim_matches('"'));
        }
    }

    fn print_info(&self, text: &str) {
        self.record(format!("[info] {}", text));
    }

    fn print_echo(&self, text: &str) {
        self.record(format!("[echo] {}", text));
    }

    fn print_error(&self, text: &str) {
        self.record(format!("[error] {}", text));
    }
}

impl Environment for DryRun {
    fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    fn craft_state(&self) -> Option<CraftState> {
        self.state.lock().craft.clone()
    }

    fn character_stats(&self) -> CharacterStats {
        self.state.lock().stats
    }

    fn needs_repair(&self) -> bool {
        self.state.lock().needs_repair
    }

    fn spiritbond_ready(&self) -> bool {
        self.state.lock().spiritbond_ready
    }

    fn has_status(&self, name: &str) -> bool {
        self.state.lock().statuses.contains(&name.to_lowercase())
    }

    fn addon_ready(&self, name: &str) -> bool {
        let crafting = self.state.lock().craft.is_some();
        match name.to_lowercase().as_str() {
            "synthesis" => crafting,
            "recipenote" => !crafting,
            _ => true,
        }
    }

    fn craft_action_names(&self) -> Vec<String> {
        CRAFT_ACTIONS.iter().map(|name| name.to_string()).collect()
    }

    fn select_target(&self, name: &str, index: Option<u32>) -> anyhow::Result<bool> {
        self.record(format!("[target] {} #{}", name, index.unwrap_or(1)));
        Ok(true)
    }

    fn use_item(&self, name: &str, quality: Option<ItemQuality>) -> anyhow::Result<bool> {
        let hq = matches!(quality, Some(ItemQuality::High));
        self.record(format!("[item] {}{}", name, if hq { " (hq)" } else { "" }));
        Ok(true)
    }

    fn find_recipe(&self, name: &str) -> Option<u32> {
        let id = name
            .bytes()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
        Some(id % 100_000)
    }

    fn open_recipe(&self, id: u32) -> anyhow::Result<bool> {
        self.record(format!("[recipe] {}", id));
        Ok(true)
    }
}

impl InputInjector for DryRun {
    fn send_key(&self, name: &str) -> anyhow::Result<bool> {
        self.record(format!("[key] {}", name));
        Ok(true)
    }

    fn send_click(&self, name: &str) -> anyhow::Result<bool> {
        self.record(format!("[click] {}", name));
        if name.eq_ignore_ascii_case("synthesize") {
            self.start_synthesis();
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesize_click_starts_a_craft_and_actions_advance_it() {
        let sim = DryRun::new(false);
        assert!(sim.craft_state().is_none());
        assert!(sim.addon_ready("RecipeNote"));

        sim.send_click("synthesize").unwrap();
        assert_eq!(sim.craft_state().unwrap().step, 1);
        assert!(sim.addon_ready("Synthesis"));

        sim.send("/ac \"Basic Touch\"");
        let craft = sim.craft_state().unwrap();
        assert_eq!(craft.step, 2);
        assert_eq!(craft.quality, 200);
    }

    #[test]
    fn craft_ends_once_progress_is_full() {
        let sim = DryRun::new(false);
        sim.send_click("synthesize").unwrap();
        for _ in 0..3 {
            sim.send("/ac \"Basic Synthesis\"");
        }
        assert!(sim.craft_state().is_none());
        assert_eq!(sim.transcript().len(), 4);
    }
}
