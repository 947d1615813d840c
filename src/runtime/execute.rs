//! Per-command execution
//!
//! [`execute`] runs one command against the host and reports what the control
//! loop should do next. Expected non-error outcomes (pausing on a failed
//! requirement, a finished craft gate, a nested macro) are values of
//! [`CommandOutcome`], not errors.

use std::time::Duration;

use super::EngineConfig;
use super::catalog::CraftActionCatalog;
use super::error::{CommandError, ExecResult};
use super::frame::ActiveMacro;
use super::host::{Host, MacroDefinition, MacroRegistry, Severity};
use super::signal::CancelToken;
use crate::interpreter::{Command, CommandKind, GatePass, LoopStep};

/// Everything a command may touch while it runs
pub struct ExecContext<'a> {
    /// Host collaborators
    pub host: &'a Host,
    /// Timing and error policy
    pub config: &'a EngineConfig,
    /// Shared cancellation for every suspension point
    pub cancel: &'a CancelToken,
    /// Craft action names
    pub catalog: &'a CraftActionCatalog,
}

/// What the control loop does after a command ran
#[derive(Debug)]
pub enum CommandOutcome {
    /// Advance the program counter, then apply the wait policy
    Continue,
    /// Advance without waiting (a gated action that did not fire)
    Skipped,
    /// A `/loop` ran; `restart` is false once a bounded loop is exhausted
    Loop {
        /// Whether to jump back to the first command
        restart: bool,
    },
    /// Stop advancing without an error; the frame stays as is
    Pause {
        /// Message for the output channel
        message: String,
        /// Colour of the message
        severity: Severity,
    },
    /// A craft gate ran out; the frame ends
    GateComplete,
    /// Push a nested macro after advancing past the current command
    Push(ActiveMacro),
}

/// Poll `probe` every `interval_ms` until it holds or `max_ms` has elapsed.
///
/// The probe is always evaluated at least once; `Ok(false)` means timeout.
pub async fn poll_until<F>(
    cancel: &CancelToken,
    max_ms: u64,
    interval_ms: u64,
    mut probe: F,
) -> ExecResult<bool>
where
    F: FnMut() -> bool,
{
    let interval = interval_ms.max(1);
    let mut waited = 0;
    loop {
        if probe() {
            return Ok(true);
        }
        if waited >= max_ms {
            return Ok(false);
        }
        cancel.sleep(Duration::from_millis(interval)).await?;
        waited += interval;
    }
}

/// Run a single command.
pub async fn execute(command: &mut Command, ctx: &ExecContext<'_>) -> ExecResult<CommandOutcome> {
    let host = ctx.host;
    let env = host.environment.as_ref();
    let modifiers = &command.modifiers;
    tracing::debug!(kind = command.kind.label(), text = %command.text, "executing command");

    match &mut command.kind {
        CommandKind::Native { line } => {
            host.output.send(line);
            Ok(CommandOutcome::Continue)
        }

        CommandKind::Action { name } => {
            if let Some(condition) = &modifiers.condition {
                let current = env.craft_state().map(|s| s.condition).unwrap_or_default();
                if !condition.is_met(&current) {
                    tracing::debug!(action = %name, condition = %current, "condition not met, skipping");
                    return Ok(CommandOutcome::Skipped);
                }
            }

            let before = env.craft_state().map(|s| s.step);
            host.output.send(&format!("/ac \"{}\"", name));

            let confirm = !modifiers.unsafe_action && before.is_some() && ctx.catalog.contains(name);
            if confirm {
                let max = modifiers
                    .max_wait_ms
                    .unwrap_or(ctx.config.action_max_wait_ms);
                let registered = poll_until(ctx.cancel, max, ctx.config.action_poll_ms, || {
                    env.craft_state().map(|s| s.step) != before
                })
                .await?;

                if !registered {
                    let err = CommandError::Timeout {
                        target: format!("action \"{}\"", name),
                        waited_ms: max,
                    };
                    if ctx.config.stop_on_action_timeout {
                        return Err(err.into());
                    }
                    tracing::warn!(action = %name, "action was not confirmed in time");
                    host.output.print_notice(&err.to_string(), Severity::Warning);
                }
            }
            Ok(CommandOutcome::Continue)
        }

        CommandKind::Click { name } => {
            if !host.input.send_click(name)? {
                return Err(CommandError::UnknownClick(name.clone()).into());
            }
            Ok(CommandOutcome::Continue)
        }

        CommandKind::Wait => Ok(CommandOutcome::Continue),

        CommandKind::WaitAddon { addon } => {
            let max = modifiers.max_wait_ms.unwrap_or(ctx.config.addon_max_wait_ms);
            let ready = poll_until(ctx.cancel, max, ctx.config.addon_poll_ms, || {
                env.addon_ready(addon.as_str())
            })
            .await?;
            if !ready {
                return Err(CommandError::Timeout {
                    target: format!("addon \"{}\"", addon),
                    waited_ms: max,
                }
                .into());
            }
            Ok(CommandOutcome::Continue)
        }

        CommandKind::Require { status } => {
            let max = modifiers.max_wait_ms.unwrap_or(ctx.config.status_max_wait_ms);
            let present = poll_until(ctx.cancel, max, ctx.config.status_poll_ms, || {
                env.has_status(status.as_str())
            })
            .await?;
            if !present {
                return Err(CommandError::Timeout {
                    target: format!("status \"{}\"", status),
                    waited_ms: max,
                }
                .into());
            }
            Ok(CommandOutcome::Continue)
        }

        CommandKind::RequireQuality { quality } => {
            let required = *quality;
            let max = modifiers.max_wait_ms.unwrap_or(ctx.config.stat_max_wait_ms);
            let met = poll_until(ctx.cancel, max, ctx.config.stat_poll_ms, || {
                env.craft_state().is_some_and(|s| s.quality >= required)
            })
            .await?;
            Ok(pause_unless(
                met,
                format!("Required quality {} was not reached", required),
                Severity::Error,
            ))
        }

        CommandKind::RequireStats {
            craftsmanship,
            control,
            cp,
        } => {
            let (craftsmanship, control, cp) = (*craftsmanship, *control, *cp);
            let max = modifiers.max_wait_ms.unwrap_or(ctx.config.stat_max_wait_ms);
            let met = poll_until(ctx.cancel, max, ctx.config.stat_poll_ms, || {
                let stats = env.character_stats();
                stats.craftsmanship >= craftsmanship && stats.control >= control && stats.cp >= cp
            })
            .await?;
            Ok(pause_unless(
                met,
                format!(
                    "Required stats were not met (craftsmanship {}, control {}, cp {})",
                    craftsmanship, control, cp
                ),
                Severity::Error,
            ))
        }

        CommandKind::RequireRepair => Ok(pause_unless(
            !env.needs_repair(),
            "Equipment needs repair".to_string(),
            Severity::Warning,
        )),

        CommandKind::RequireSpiritbond => Ok(pause_unless(
            !env.spiritbond_ready(),
            "Materia can be extracted".to_string(),
            Severity::Info,
        )),

        CommandKind::Target { name } => {
            if !env.select_target(name, modifiers.index)? {
                return Err(CommandError::TargetNotFound(name.clone()).into());
            }
            Ok(CommandOutcome::Continue)
        }

        CommandKind::Send { key } => {
            if !host.input.send_key(key)? {
                return Err(CommandError::UnknownKey(key.clone()).into());
            }
            Ok(CommandOutcome::Continue)
        }

        CommandKind::Loop(counter) => {
            let bounded = counter.start().is_some();
            match counter.next_step() {
                LoopStep::Restart { remaining } => {
                    if modifiers.echo && bounded {
                        match remaining {
                            Some(0) => host.output.print_echo("Last loop"),
                            Some(n) => host.output.print_echo(&format!("{} loops remaining", n)),
                            None => {}
                        }
                    }
                    Ok(CommandOutcome::Loop { restart: true })
                }
                LoopStep::Exhausted => {
                    if modifiers.echo {
                        host.output.print_echo("Loops complete");
                    }
                    Ok(CommandOutcome::Loop { restart: false })
                }
            }
        }

        CommandKind::Gate(gate) => match gate.pass() {
            GatePass::Open { remaining } => {
                if modifiers.echo {
                    host.output
                        .print_echo(&format!("{} craft(s) remaining", remaining));
                }
                Ok(CommandOutcome::Continue)
            }
            GatePass::Complete => Ok(CommandOutcome::GateComplete),
        },

        CommandKind::RunMacro { name } => {
            let definition = resolve_macro(host.registry.as_ref(), name)?;
            let frame = ActiveMacro::from_definition(
                definition,
                None,
                &ctx.config.craft_loop,
                host.scripts.as_ref(),
            )?;
            Ok(CommandOutcome::Push(frame))
        }

        CommandKind::Item { name } => {
            if !env.use_item(name, modifiers.quality)? {
                return Err(CommandError::ItemNotFound(name.clone()).into());
            }
            Ok(CommandOutcome::Continue)
        }

        CommandKind::Recipe { name } => {
            let Some(id) = env.find_recipe(name) else {
                return Err(CommandError::RecipeNotFound(name.clone()).into());
            };
            if !env.open_recipe(id)? {
                return Err(CommandError::RecipeNotOpened {
                    name: name.clone(),
                    id,
                }
                .into());
            }
            Ok(CommandOutcome::Continue)
        }
    }
}

/// Look up exactly one macro by name; zero or several matches fail.
pub fn resolve_macro(registry: &dyn MacroRegistry, name: &str) -> ExecResult<MacroDefinition> {
    let mut found = registry.find_by_name(name)?;
    match found.len() {
        0 => Err(CommandError::MacroNotFound(name.to_string()).into()),
        1 => Ok(found.remove(0)),
        count => Err(CommandError::AmbiguousMacro {
            name: name.to_string(),
            count,
        }
        .into()),
    }
}

fn pause_unless(met: bool, message: String, severity: Severity) -> CommandOutcome {
    if met {
        CommandOutcome::Continue
    } else {
        CommandOutcome::Pause { message, severity }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn poll_checks_once_with_zero_max() {
        let cancel = CancelToken::new();
        let mut calls = 0;
        let met = poll_until(&cancel, 0, 250, || {
            calls += 1;
            false
        })
        .await
        .unwrap();
        assert!(!met);
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_times_out_after_max() {
        let cancel = CancelToken::new();
        let mut calls = 0;
        let start = tokio::time::Instant::now();
        let met = poll_until(&cancel, 1000, 250, || {
            calls += 1;
            false
        })
        .await
        .unwrap();
        assert!(!met);
        assert_eq!(calls, 5);
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_returns_as_soon_as_probe_holds() {
        let cancel = CancelToken::new();
        let mut calls = 0;
        let met = poll_until(&cancel, 5000, 500, || {
            calls += 1;
            calls == 3
        })
        .await
        .unwrap();
        assert!(met);
        assert_eq!(calls, 3);
    }
}
