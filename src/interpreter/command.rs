use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::modifier::Modifiers;

/// Convert a seconds value to whole milliseconds.
pub fn seconds_to_millis(seconds: f64) -> u64 {
    (seconds * 1000.0).round().max(0.0) as u64
}

/// Wait range whose lower bound exceeds its upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("wait range start {wait_ms}ms exceeds end {until_ms}ms")]
pub struct WaitRangeError {
    /// Requested lower bound.
    pub wait_ms: u64,
    /// Requested upper bound.
    pub until_ms: u64,
}

/// Delay applied after a command completes.
///
/// `until_ms == 0` means "no range". Otherwise the delay is drawn uniformly
/// from `[wait_ms, until_ms)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitPolicy {
    wait_ms: u64,
    until_ms: u64,
}

impl WaitPolicy {
    /// No delay.
    pub const NONE: WaitPolicy = WaitPolicy {
        wait_ms: 0,
        until_ms: 0,
    };

    /// Build a policy, rejecting ranges whose start exceeds their end.
    pub fn new(wait_ms: u64, until_ms: u64) -> Result<Self, WaitRangeError> {
        if until_ms != 0 && wait_ms > until_ms {
            return Err(WaitRangeError { wait_ms, until_ms });
        }
        Ok(Self { wait_ms, until_ms })
    }

    /// Fixed delay.
    pub fn fixed(wait_ms: u64) -> Self {
        Self {
            wait_ms,
            until_ms: 0,
        }
    }

    /// Build a policy from seconds, as written in macro text.
    pub fn from_seconds(wait: f64, until: Option<f64>) -> Result<Self, WaitRangeError> {
        Self::new(
            seconds_to_millis(wait),
            until.map(seconds_to_millis).unwrap_or(0),
        )
    }

    /// Lower bound (or fixed delay) in milliseconds.
    pub fn wait_ms(&self) -> u64 {
        self.wait_ms
    }

    /// Upper bound in milliseconds, zero when no range is set.
    pub fn until_ms(&self) -> u64 {
        self.until_ms
    }

    /// Whether this policy never delays.
    pub fn is_zero(&self) -> bool {
        self.wait_ms == 0 && self.until_ms == 0
    }

    /// Draw a concrete delay.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let millis = if self.until_ms > self.wait_ms {
            rng.gen_range(self.wait_ms..self.until_ms)
        } else {
            self.wait_ms
        };
        Duration::from_millis(millis)
    }
}

/// Result of consulting a `/loop` counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStep {
    /// Jump back to the start; `remaining` is `None` for unbounded loops.
    Restart {
        /// Loops left after this one.
        remaining: Option<u32>,
    },
    /// Bounded loop finished; counter has been reset for the next entry.
    Exhausted,
}

/// Counter state carried by a `/loop` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopCounter {
    start: Option<u32>,
    remaining: Option<u32>,
}

impl LoopCounter {
    /// Create a counter; `None` loops forever.
    pub fn new(count: Option<u32>) -> Self {
        Self {
            start: count,
            remaining: count,
        }
    }

    /// Configured bound.
    pub fn start(&self) -> Option<u32> {
        self.start
    }

    /// Consume one iteration.
    pub fn next_step(&mut self) -> LoopStep {
        match self.remaining {
            None => LoopStep::Restart { remaining: None },
            Some(0) => {
                self.remaining = self.start;
                LoopStep::Exhausted
            }
            Some(n) => {
                self.remaining = Some(n - 1);
                LoopStep::Restart {
                    remaining: Some(n - 1),
                }
            }
        }
    }
}

/// Result of passing a `/craft` gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePass {
    /// The gate let execution through; `remaining` passes are left.
    Open {
        /// Count observed on entry to this pass.
        remaining: u32,
    },
    /// The gate is exhausted; its counter has been reset to the start value.
    Complete,
}

/// Counter state carried by a `/craft` gate.
///
/// A gate with count `N` lets `N + 1` passes through and reports
/// [`GatePass::Complete`] on the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateCounter {
    start: u32,
    remaining: i64,
}

impl GateCounter {
    /// Create a gate.
    pub fn new(count: u32) -> Self {
        Self {
            start: count,
            remaining: i64::from(count),
        }
    }

    /// Configured count.
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Remaining count as seen by the next pass (negative once exhausted).
    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    /// Attempt a pass through the gate.
    pub fn pass(&mut self) -> GatePass {
        if self.remaining < 0 {
            self.remaining = i64::from(self.start);
            return GatePass::Complete;
        }
        let observed = self.remaining as u32;
        self.remaining -= 1;
        GatePass::Open {
            remaining: observed,
        }
    }
}

/// Closed set of macro instructions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandKind {
    /// Forward text verbatim to the output channel.
    Native {
        /// Line with modifiers removed.
        line: String,
    },
    /// Use a named ability.
    Action {
        /// Ability name.
        name: String,
    },
    /// Invoke a pre-registered UI interaction.
    Click {
        /// Registered click name.
        name: String,
    },
    /// Pause; the duration lives in the command's wait policy.
    Wait,
    /// Poll until a UI element is ready.
    WaitAddon {
        /// UI element name.
        addon: String,
    },
    /// Poll until a status effect is present; failure is an error.
    Require {
        /// Status effect name.
        status: String,
    },
    /// Pause unless current quality reaches the threshold.
    RequireQuality {
        /// Minimum quality.
        quality: u32,
    },
    /// Pause unless character stats reach the thresholds.
    RequireStats {
        /// Minimum craftsmanship.
        craftsmanship: u32,
        /// Minimum control.
        control: u32,
        /// Minimum crafting points.
        cp: u32,
    },
    /// Pause when gear needs repair.
    RequireRepair,
    /// Pause when materia can be extracted.
    RequireSpiritbond,
    /// Select an entity by name.
    Target {
        /// Entity name.
        name: String,
    },
    /// Inject a named input event.
    Send {
        /// Key or key combination name.
        key: String,
    },
    /// Restart the current frame.
    Loop(LoopCounter),
    /// Bounded repeat counter for craft loops.
    Gate(GateCounter),
    /// Push another macro onto the stack.
    RunMacro {
        /// Macro name to resolve through the registry.
        name: String,
    },
    /// Use an inventory item.
    Item {
        /// Item name.
        name: String,
    },
    /// Open a crafting recipe.
    Recipe {
        /// Recipe name.
        name: String,
    },
}

impl CommandKind {
    /// Short lower-case name used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            CommandKind::Native { .. } => "native",
            CommandKind::Action { .. } => "action",
            CommandKind::Click { .. } => "click",
            CommandKind::Wait => "wait",
            CommandKind::WaitAddon { .. } => "waitaddon",
            CommandKind::Require { .. } => "require",
            CommandKind::RequireQuality { .. } => "requirequality",
            CommandKind::RequireStats { .. } => "requirestats",
            CommandKind::RequireRepair => "requirerepair",
            CommandKind::RequireSpiritbond => "requirespiritbond",
            CommandKind::Target { .. } => "target",
            CommandKind::Send { .. } => "send",
            CommandKind::Loop(_) => "loop",
            CommandKind::Gate(_) => "craft",
            CommandKind::RunMacro { .. } => "runmacro",
            CommandKind::Item { .. } => "item",
            CommandKind::Recipe { .. } => "recipe",
        }
    }
}

/// One parsed macro line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Original (trimmed) source line, modifiers included.
    pub text: String,
    /// Modifiers found on the line.
    pub modifiers: Modifiers,
    /// Instruction variant.
    pub kind: CommandKind,
}

impl Command {
    /// Assemble a command.
    pub fn new(text: impl Into<String>, modifiers: Modifiers, kind: CommandKind) -> Self {
        Self {
            text: text.into(),
            modifiers,
            kind,
        }
    }

    /// Delay applied after this command succeeds.
    pub fn wait_policy(&self) -> WaitPolicy {
        self.modifiers.wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn ranged_wait_stays_in_bounds() {
        let policy = WaitPolicy::from_seconds(1.0, Some(3.0)).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let delay = policy.sample(&mut rng);
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay < Duration::from_millis(3000));
        }
    }

    #[test]
    fn inverted_wait_range_is_rejected() {
        assert_eq!(
            WaitPolicy::from_seconds(3.0, Some(1.0)),
            Err(WaitRangeError {
                wait_ms: 3000,
                until_ms: 1000
            })
        );
    }

    #[test]
    fn zero_until_means_fixed() {
        let policy = WaitPolicy::new(2500, 0).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(policy.sample(&mut rng), Duration::from_millis(2500));
        assert!(WaitPolicy::NONE.is_zero());
    }

    #[test]
    fn gate_counts_down_then_completes_and_resets() {
        let mut gate = GateCounter::new(2);
        assert_eq!(gate.pass(), GatePass::Open { remaining: 2 });
        assert_eq!(gate.pass(), GatePass::Open { remaining: 1 });
        assert_eq!(gate.pass(), GatePass::Open { remaining: 0 });
        assert_eq!(gate.pass(), GatePass::Complete);
        assert_eq!(gate.remaining(), 2);
        assert_eq!(gate.pass(), GatePass::Open { remaining: 2 });
    }

    #[test]
    fn bounded_loop_exhausts_and_resets() {
        let mut counter = LoopCounter::new(Some(2));
        assert_eq!(
            counter.next_step(),
            LoopStep::Restart { remaining: Some(1) }
        );
        assert_eq!(
            counter.next_step(),
            LoopStep::Restart { remaining: Some(0) }
        );
        assert_eq!(counter.next_step(), LoopStep::Exhausted);
        assert_eq!(
            counter.next_step(),
            LoopStep::Restart { remaining: Some(1) }
        );
    }

    #[test]
    fn unbounded_loop_never_exhausts() {
        let mut counter = LoopCounter::new(None);
        for _ in 0..10 {
            assert_eq!(counter.next_step(), LoopStep::Restart { remaining: None });
        }
    }
}
