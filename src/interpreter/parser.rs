use tracing::{debug, trace};

use super::command::{Command, CommandKind, GateCounter, LoopCounter, WaitPolicy};
use super::grammar::{self, Statement};
use super::modifier::{self, MaskedLine, Modifiers};
use super::{Result, SyntaxError};

/// Parse macro source text into its command list.
///
/// Blank lines and comment lines (`#` or `//`) produce nothing. The first
/// malformed line aborts the whole parse.
pub fn parse_macro(source: &str) -> Result<Vec<Command>> {
    let mut commands = Vec::new();
    for (number, raw) in source.split('\n').enumerate() {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if let Some(command) = parse_line(raw, number)? {
            commands.push(command);
        }
    }
    debug!(count = commands.len(), "parsed macro");
    Ok(commands)
}

/// Parse a single line; `number` is its 0-based position for error reporting.
pub fn parse_line(raw: &str, number: usize) -> Result<Option<Command>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || is_comment(trimmed) {
        return Ok(None);
    }

    let leading = raw.len() - raw.trim_start().len();
    let column = |offset: usize| raw[..leading + offset].chars().count();

    let mut line = MaskedLine::new(trimmed);
    let mut modifiers = modifier::extract(&mut line)
        .map_err(|err| SyntaxError::new(err.message, number, column(err.offset)))?;

    let masked = line.masked();
    let body_start = masked.len() - masked.trim_start().len();
    let statement = grammar::statement(masked.trim()).map_err(|err| {
        SyntaxError::new(err.message, number, column(body_start + err.offset))
    })?;

    let kind = build_kind(statement, &mut modifiers, &line)
        .map_err(|message| SyntaxError::new(message, number, column(0)))?;

    trace!(line = number, kind = kind.label(), "parsed command");
    Ok(Some(Command::new(trimmed, modifiers, kind)))
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with("//")
}

fn build_kind(
    statement: Statement,
    modifiers: &mut Modifiers,
    line: &MaskedLine,
) -> std::result::Result<CommandKind, String> {
    let kind = match statement {
        Statement::Native => CommandKind::Native {
            line: line.stripped(),
        },
        Statement::Action(name) => CommandKind::Action { name },
        Statement::Click(name) => CommandKind::Click { name },
        Statement::Wait { wait, until } => {
            if modifiers.has_wait {
                return Err("/wait does not accept a <wait> modifier".to_string());
            }
            modifiers.wait = WaitPolicy::from_seconds(wait, until).map_err(|e| e.to_string())?;
            CommandKind::Wait
        }
        Statement::WaitAddon(addon) => CommandKind::WaitAddon { addon },
        Statement::Require(status) => CommandKind::Require { status },
        Statement::RequireQuality(quality) => CommandKind::RequireQuality { quality },
        Statement::RequireStats(craftsmanship, control, cp) => CommandKind::RequireStats {
            craftsmanship,
            control,
            cp,
        },
        Statement::RequireRepair => CommandKind::RequireRepair,
        Statement::RequireSpiritbond => CommandKind::RequireSpiritbond,
        Statement::Target(name) => CommandKind::Target { name },
        Statement::Send(key) => CommandKind::Send { key },
        Statement::Loop(count) => CommandKind::Loop(LoopCounter::new(count)),
        Statement::Gate(count) => CommandKind::Gate(GateCounter::new(count)),
        Statement::RunMacro(name) => CommandKind::RunMacro { name },
        Statement::Item(name) => CommandKind::Item { name },
        Statement::Recipe(name) => CommandKind::Recipe { name },
    };
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::modifier::ItemQuality;

    #[test]
    fn empty_and_comment_only_input_yields_nothing() {
        assert!(parse_macro("").unwrap().is_empty());
        assert!(parse_macro("\n\n# note\n   // other\n\n").unwrap().is_empty());
    }

    #[test]
    fn parses_a_typical_craft() {
        let src = "/ac \"Muscle Memory\" <wait.3>\n\n\n/ac Veneration <wait.2>\r\n/loop 5 <echo>";
        let commands = parse_macro(src).expect("parse");
        assert_eq!(commands.len(), 3);
        assert_eq!(
            commands[0].kind,
            CommandKind::Action {
                name: "Muscle Memory".into()
            }
        );
        assert_eq!(commands[0].wait_policy(), WaitPolicy::fixed(3000));
        assert_eq!(commands[1].text, "/ac Veneration <wait.2>");
        assert_eq!(commands[2].kind, CommandKind::Loop(LoopCounter::new(Some(5))));
        assert!(commands[2].modifiers.echo);
    }

    #[test]
    fn native_commands_drop_modifiers() {
        let commands = parse_macro("/echo Done! <wait.1> <se.1>").unwrap();
        assert_eq!(
            commands[0].kind,
            CommandKind::Native {
                line: "/echo Done! <se.1>".into()
            }
        );
        assert_eq!(commands[0].text, "/echo Done! <wait.1> <se.1>");
    }

    #[test]
    fn wait_command_carries_its_range_as_policy() {
        let commands = parse_macro("/wait 1-3").unwrap();
        assert_eq!(commands[0].kind, CommandKind::Wait);
        assert_eq!(commands[0].wait_policy(), WaitPolicy::new(1000, 3000).unwrap());
    }

    #[test]
    fn wait_modifier_on_wait_is_rejected() {
        let err = parse_macro("/wait 1 <wait.2>").unwrap_err();
        assert_eq!(err.line, 0);
    }

    #[test]
    fn reports_line_and_column_of_first_failure() {
        let err = parse_macro("/ac Observe\n\n  /wait soon\n/bogus").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 8);
    }

    #[test]
    fn non_command_text_is_a_syntax_error() {
        let err = parse_macro("/ac Observe\nhello there").unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 0);
    }

    #[test]
    fn modifier_errors_use_original_columns() {
        let err = parse_macro("  /ac Observe <wait.5-2>").unwrap_err();
        assert_eq!(err.line, 0);
        assert_eq!(err.column, 14);
    }

    #[test]
    fn item_with_quality() {
        let commands = parse_macro("/item \"Tsai tou Vounou\" <hq>").unwrap();
        assert_eq!(
            commands[0].kind,
            CommandKind::Item {
                name: "Tsai tou Vounou".into()
            }
        );
        assert_eq!(commands[0].modifiers.quality, Some(ItemQuality::High));
    }
}
