//! Textual control surface
//!
//! One line per request, for command-line front ends and chat-style hosts:
//!
//! ```text
//! run [loop N] "Macro name"
//! pause [loop]
//! resume
//! stop [loop]
//! step
//! status
//! ```
//!
//! Each command maps onto exactly one [`MacroEngine`] call.

use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{space0, space1},
    combinator::{all_consuming, map, map_res, opt, value},
    sequence::{pair, preceded, terminated},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::engine::{EngineStatus, MacroEngine};
use super::error::ExecResult;
use crate::interpreter::grammar::{Res, name_argument, uint};

/// A parsed control request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlCommand {
    /// Run a stored macro by name
    Run {
        /// Macro name
        name: String,
        /// Loop count override
        loops: Option<i32>,
    },
    /// Pause now or at the next loop
    Pause {
        /// Defer until the next `/loop`
        at_loop: bool,
    },
    /// Resume a paused engine
    Resume,
    /// Stop now or at the next loop
    Stop {
        /// Defer until the next `/loop`
        at_loop: bool,
    },
    /// Advance the top frame without executing
    Step,
    /// Report the engine status
    Status,
}

/// Control line that matches no request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised control command \"{0}\"")]
pub struct ControlParseError(pub String);

fn at_loop(input: &str) -> Res<'_, bool> {
    map(opt(preceded(space1, tag_no_case("loop"))), |found| {
        found.is_some()
    })(input)
}

fn loop_count(input: &str) -> Res<'_, i32> {
    map_res(
        terminated(preceded(pair(tag_no_case("loop"), space1), uint), space1),
        i32::try_from,
    )(input)
}

fn run(input: &str) -> Res<'_, ControlCommand> {
    map(
        preceded(
            pair(tag_no_case("run"), space1),
            pair(opt(loop_count), name_argument),
        ),
        |(loops, name)| ControlCommand::Run { name, loops },
    )(input)
}

fn request(input: &str) -> Res<'_, ControlCommand> {
    alt((
        run,
        map(preceded(tag_no_case("pause"), at_loop), |at_loop| {
            ControlCommand::Pause { at_loop }
        }),
        value(ControlCommand::Resume, tag_no_case("resume")),
        map(preceded(tag_no_case("stop"), at_loop), |at_loop| {
            ControlCommand::Stop { at_loop }
        }),
        value(ControlCommand::Step, tag_no_case("step")),
        value(ControlCommand::Status, tag_no_case("status")),
    ))(input)
}

impl ControlCommand {
    /// Parse one control line
    pub fn parse(line: &str) -> Result<Self, ControlParseError> {
        let line = line.trim();
        all_consuming(terminated(request, space0))(line)
            .map(|(_, command)| command)
            .map_err(|_| ControlParseError(line.to_string()))
    }

    /// Apply this request to an engine; `status` returns a snapshot
    pub fn dispatch(&self, engine: &MacroEngine) -> ExecResult<Option<EngineStatus>> {
        match self {
            ControlCommand::Run { name, loops } => {
                engine.run_by_name(name, *loops)?;
            }
            ControlCommand::Pause { at_loop } => engine.pause(*at_loop),
            ControlCommand::Resume => engine.resume(),
            ControlCommand::Stop { at_loop } => engine.stop(*at_loop),
            ControlCommand::Step => engine.step(),
            ControlCommand::Status => return Ok(Some(engine.status())),
        }
        Ok(None)
    }
}

impl std::str::FromStr for ControlCommand {
    type Err = ControlParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_and_without_loops() {
        assert_eq!(
            ControlCommand::parse("run \"Grade 8 Tincture\"").unwrap(),
            ControlCommand::Run {
                name: "Grade 8 Tincture".into(),
                loops: None
            }
        );
        assert_eq!(
            ControlCommand::parse("RUN loop 5 Tincture").unwrap(),
            ControlCommand::Run {
                name: "Tincture".into(),
                loops: Some(5)
            }
        );
        assert_eq!(
            ControlCommand::parse("run loopy macro").unwrap(),
            ControlCommand::Run {
                name: "loopy macro".into(),
                loops: None
            }
        );
    }

    #[test]
    fn parses_deferred_pause_and_stop() {
        assert_eq!(
            ControlCommand::parse("pause").unwrap(),
            ControlCommand::Pause { at_loop: false }
        );
        assert_eq!(
            ControlCommand::parse(" pause loop ").unwrap(),
            ControlCommand::Pause { at_loop: true }
        );
        assert_eq!(
            ControlCommand::parse("stop loop").unwrap(),
            ControlCommand::Stop { at_loop: true }
        );
        assert_eq!("status".parse(), Ok(ControlCommand::Status));
    }

    #[test]
    fn rejects_unknown_requests() {
        assert!(ControlCommand::parse("jump").is_err());
        assert!(ControlCommand::parse("pause now").is_err());
        assert!(ControlCommand::parse("run").is_err());
    }
}
