//! Craft-loop rewriting
//!
//! Wraps a macro body with the scaffolding needed to repeat a craft: wait for
//! the recipe window, press synthesize, wait for the synthesis window, run the
//! body, and loop (bounded by a `/craft` gate, or forever). Pure text in, text
//! out; the result is always valid parser input.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Count substituted for "repeat forever" in templates.
pub const UNBOUNDED_CRAFT_COUNT: u32 = 999_999;

const MACRO_PLACEHOLDER: &str = "{{macro}}";
const COUNT_PLACEHOLDER: &str = "{{count}}";

/// Craft-loop settings shared by every craft-looped macro.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CraftLoopConfig {
    /// Use `template` instead of the built-in scaffold.
    pub use_template: bool,
    /// Template containing `{{macro}}` and optionally `{{count}}`.
    ///
    /// `{{count}}` is written as a `/craft` gate count, so it is one less than
    /// the number of crafts (a `/craft N` gate opens `N + 1` times).
    pub template: String,
    /// The loop begins at the recipe window rather than inside a synthesis.
    pub from_recipe_note: bool,
    /// `<maxwait.N>` seconds added to synthesized `/waitaddon` lines.
    pub max_wait: Option<u32>,
    /// Add `<echo>` to synthesized `/craft` and `/loop` lines.
    pub echo: bool,
}

impl Default for CraftLoopConfig {
    fn default() -> Self {
        Self {
            use_template: false,
            template: [
                "/craft {{count}}",
                "/waitaddon \"RecipeNote\" <maxwait.5>",
                "/click \"synthesize\"",
                "/waitaddon \"Synthesis\" <maxwait.5>",
                "{{macro}}",
                "/loop",
            ]
            .join("\n"),
            from_recipe_note: true,
            max_wait: None,
            echo: false,
        }
    }
}

/// Craft-loop rewriting failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CraftLoopError {
    /// The template has nowhere to put the macro body.
    #[error("craft loop template does not contain the {{{{macro}}}} placeholder")]
    MissingMacroPlaceholder,
    /// Repeat counts below -1 have no meaning.
    #[error("invalid craft loop count {0}")]
    InvalidCount(i32),
}

/// How many times a craft should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Repeat {
    Skip,
    Times(u32),
    Forever,
}

impl Repeat {
    fn from_count(count: i32) -> Result<Self, CraftLoopError> {
        match count {
            -1 => Ok(Repeat::Forever),
            0 => Ok(Repeat::Skip),
            n if n > 0 => Ok(Repeat::Times(n as u32)),
            n => Err(CraftLoopError::InvalidCount(n)),
        }
    }
}

/// Rewrite `body` for craft looping.
///
/// `repeat_count` of `0` leaves the body alone, `-1` repeats indefinitely.
pub fn rewrite_craft_loop(
    body: &str,
    enabled: bool,
    repeat_count: i32,
    config: &CraftLoopConfig,
) -> Result<String, CraftLoopError> {
    if !enabled {
        return Ok(body.to_string());
    }

    let repeat = Repeat::from_count(repeat_count)?;
    if repeat == Repeat::Skip {
        return Ok(body.to_string());
    }

    if config.use_template {
        return apply_template(body, repeat, config);
    }

    Ok(builtin_scaffold(body, repeat, config))
}

fn apply_template(
    body: &str,
    repeat: Repeat,
    config: &CraftLoopConfig,
) -> Result<String, CraftLoopError> {
    if !config.template.contains(MACRO_PLACEHOLDER) {
        return Err(CraftLoopError::MissingMacroPlaceholder);
    }
    let count = match repeat {
        Repeat::Times(n) => n - 1,
        _ => UNBOUNDED_CRAFT_COUNT,
    };
    Ok(config
        .template
        .replace(COUNT_PLACEHOLDER, &count.to_string())
        .replace(MACRO_PLACEHOLDER, body))
}

fn builtin_scaffold(body: &str, repeat: Repeat, config: &CraftLoopConfig) -> String {
    let max_wait = config
        .max_wait
        .filter(|secs| *secs > 0)
        .map(|secs| format!(" <maxwait.{}>", secs))
        .unwrap_or_default();
    let echo = if config.echo { " <echo>" } else { "" };

    let click_steps = [
        format!("/waitaddon \"RecipeNote\"{}", max_wait),
        "/click \"synthesize\"".to_string(),
        format!("/waitaddon \"Synthesis\"{}", max_wait),
    ]
    .join("\n");
    let loop_step = format!("/loop{}", echo);
    let body = body.trim_end_matches(['\r', '\n']);

    let parts: Vec<String> = match (config.from_recipe_note, repeat) {
        (true, Repeat::Times(1)) => vec![click_steps, body.to_string()],
        (true, Repeat::Forever) => vec![click_steps, body.to_string(), loop_step],
        (true, Repeat::Times(n)) => vec![
            format!("/craft {}{}", n - 1, echo),
            click_steps,
            body.to_string(),
            loop_step,
        ],
        (false, Repeat::Times(1)) => vec![body.to_string()],
        (false, Repeat::Forever) => vec![body.to_string(), click_steps, loop_step],
        (false, Repeat::Times(n)) => vec![
            body.to_string(),
            format!("/craft {}{}", n - 2, echo),
            click_steps,
            loop_step,
        ],
        (_, Repeat::Skip) => vec![body.to_string()],
    };
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::command::CommandKind;
    use crate::interpreter::parse_macro;

    const BODY: &str = "/ac \"Basic Synthesis\" <wait.3>";

    fn builtin(from_recipe_note: bool) -> CraftLoopConfig {
        CraftLoopConfig {
            from_recipe_note,
            ..CraftLoopConfig::default()
        }
    }

    #[test]
    fn disabled_returns_body_unchanged() {
        for count in [-1, 0, 1, 7] {
            for config in [builtin(true), builtin(false), CraftLoopConfig {
                use_template: true,
                template: String::new(),
                ..CraftLoopConfig::default()
            }] {
                assert_eq!(rewrite_craft_loop(BODY, false, count, &config).unwrap(), BODY);
            }
        }
    }

    #[test]
    fn zero_count_returns_body_unchanged() {
        assert_eq!(rewrite_craft_loop(BODY, true, 0, &builtin(true)).unwrap(), BODY);
        assert_eq!(rewrite_craft_loop(BODY, true, 0, &builtin(false)).unwrap(), BODY);
    }

    #[test]
    fn unbounded_from_recipe_note_starts_with_clicks_and_ends_with_loop() {
        let out = rewrite_craft_loop(BODY, true, -1, &builtin(true)).unwrap();
        assert!(out.starts_with("/waitaddon \"RecipeNote\"\n/click \"synthesize\""));
        assert!(out.ends_with("\n/loop"));

        let commands = parse_macro(&out).expect("rewritten macro parses");
        assert!(matches!(
            commands.last().map(|c| &c.kind),
            Some(CommandKind::Loop(counter)) if counter.start().is_none()
        ));
    }

    #[test]
    fn bounded_from_recipe_note_gates_before_scaffold() {
        let out = rewrite_craft_loop(BODY, true, 3, &builtin(true)).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "/craft 2");
        assert_eq!(lines[4], BODY);
        assert_eq!(lines[5], "/loop");
    }

    #[test]
    fn bounded_inside_synthesis_gates_after_body() {
        let out = rewrite_craft_loop(BODY, true, 4, &builtin(false)).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], BODY);
        assert_eq!(lines[1], "/craft 2");
        assert_eq!(lines.last().copied(), Some("/loop"));
        assert_eq!(rewrite_craft_loop(BODY, true, 1, &builtin(false)).unwrap(), BODY);
    }

    #[test]
    fn modifiers_are_threaded_into_scaffold() {
        let config = CraftLoopConfig {
            max_wait: Some(8),
            echo: true,
            ..builtin(true)
        };
        let out = rewrite_craft_loop(BODY, true, 2, &config).unwrap();
        assert!(out.contains("/craft 1 <echo>"));
        assert!(out.contains("/waitaddon \"RecipeNote\" <maxwait.8>"));
        assert!(out.contains("/waitaddon \"Synthesis\" <maxwait.8>"));
        assert!(out.ends_with("/loop <echo>"));
        parse_macro(&out).expect("parses");
    }

    #[test]
    fn template_substitutes_count_and_body() {
        let config = CraftLoopConfig {
            use_template: true,
            ..CraftLoopConfig::default()
        };
        let out = rewrite_craft_loop(BODY, true, -1, &config).unwrap();
        assert!(out.starts_with("/craft 999999\n"));
        assert!(out.contains(BODY));
        parse_macro(&out).expect("parses");
    }

    #[test]
    fn template_count_matches_builtin_gate() {
        let config = CraftLoopConfig {
            use_template: true,
            ..CraftLoopConfig::default()
        };
        let templated = rewrite_craft_loop(BODY, true, 3, &config).unwrap();
        let scaffolded = rewrite_craft_loop(BODY, true, 3, &builtin(true)).unwrap();
        assert_eq!(templated.lines().next(), Some("/craft 2"));
        assert_eq!(scaffolded.lines().next(), Some("/craft 2"));

        let once = rewrite_craft_loop(BODY, true, 1, &config).unwrap();
        assert!(once.starts_with("/craft 0\n"));
    }

    #[test]
    fn template_without_placeholder_fails() {
        let config = CraftLoopConfig {
            use_template: true,
            template: "/loop".into(),
            ..CraftLoopConfig::default()
        };
        assert_eq!(
            rewrite_craft_loop(BODY, true, 2, &config),
            Err(CraftLoopError::MissingMacroPlaceholder)
        );
    }

    #[test]
    fn rejects_negative_counts_other_than_unbounded() {
        assert_eq!(
            rewrite_craft_loop(BODY, true, -3, &builtin(true)),
            Err(CraftLoopError::InvalidCount(-3))
        );
    }
}
