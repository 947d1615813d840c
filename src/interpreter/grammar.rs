//! Verb grammar for macro lines.
//!
//! Operates on a single line whose modifiers have already been masked out.
//! A line is `/verb` followed by verb-specific arguments. Unknown verbs are
//! accepted as native commands; known verbs with malformed arguments fail
//! with the byte offset of the first unparseable input.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit1, space0, space1},
    combinator::{all_consuming, map, map_res, opt, recognize, verify},
    error::{VerboseError, VerboseErrorKind, context},
    sequence::{delimited, pair, preceded, terminated, tuple},
};

/// Parser result carrying verbose errors.
pub type Res<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Verbs understood by the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// `/ac`, `/action`
    Action,
    /// `/click`
    Click,
    /// `/wait`
    Wait,
    /// `/waitaddon`
    WaitAddon,
    /// `/require`
    Require,
    /// `/requirequality`
    RequireQuality,
    /// `/requirestats`
    RequireStats,
    /// `/requirerepair`
    RequireRepair,
    /// `/requirespiritbond`
    RequireSpiritbond,
    /// `/target`
    Target,
    /// `/send`
    Send,
    /// `/loop`
    Loop,
    /// `/craft`, `/gate`
    Gate,
    /// `/runmacro`
    RunMacro,
    /// `/item`
    Item,
    /// `/recipe`
    Recipe,
}

impl Verb {
    /// Look up a verb by its (case-insensitive) name, without the slash.
    pub fn from_name(name: &str) -> Option<Self> {
        let verb = match name.to_ascii_lowercase().as_str() {
            "ac" | "action" => Verb::Action,
            "click" => Verb::Click,
            "wait" => Verb::Wait,
            "waitaddon" => Verb::WaitAddon,
            "require" => Verb::Require,
            "requirequality" => Verb::RequireQuality,
            "requirestats" => Verb::RequireStats,
            "requirerepair" => Verb::RequireRepair,
            "requirespiritbond" => Verb::RequireSpiritbond,
            "target" => Verb::Target,
            "send" => Verb::Send,
            "loop" => Verb::Loop,
            "craft" | "gate" => Verb::Gate,
            "runmacro" => Verb::RunMacro,
            "item" => Verb::Item,
            "recipe" => Verb::Recipe,
            _ => return None,
        };
        Some(verb)
    }
}

/// Verb with its parsed arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Unknown verb; forwarded verbatim.
    Native,
    /// `/ac name`
    Action(String),
    /// `/click name`
    Click(String),
    /// `/wait secs[-secs]`
    Wait {
        /// Lower bound (or fixed) seconds.
        wait: f64,
        /// Optional upper bound seconds.
        until: Option<f64>,
    },
    /// `/waitaddon name`
    WaitAddon(String),
    /// `/require name`
    Require(String),
    /// `/requirequality n`
    RequireQuality(u32),
    /// `/requirestats c ctrl cp`
    RequireStats(u32, u32, u32),
    /// `/requirerepair`
    RequireRepair,
    /// `/requirespiritbond`
    RequireSpiritbond,
    /// `/target name`
    Target(String),
    /// `/send key`
    Send(String),
    /// `/loop [n]`
    Loop(Option<u32>),
    /// `/craft n`
    Gate(u32),
    /// `/runmacro name`
    RunMacro(String),
    /// `/item name`
    Item(String),
    /// `/recipe name`
    Recipe(String),
}

/// Grammar failure with a byte offset into the matched line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarError {
    /// Description of what was expected.
    pub message: String,
    /// Byte offset into the line.
    pub offset: usize,
}

/// `/name`, returning the name without the slash.
pub fn verb(input: &str) -> Res<'_, &str> {
    preceded(char('/'), take_while1(|c: char| !c.is_whitespace()))(input)
}

/// `"any text"` with the quotes stripped.
pub fn quoted(input: &str) -> Res<'_, &str> {
    delimited(char('"'), take_while(|c: char| c != '"'), char('"'))(input)
}

/// A single whitespace-free token.
pub fn bare(input: &str) -> Res<'_, &str> {
    take_while1(|c: char| !c.is_whitespace() && c != '"')(input)
}

/// Quoted string or single bare token.
pub fn argument(input: &str) -> Res<'_, String> {
    context("quoted or bare argument", map(alt((quoted, bare)), str::to_string))(input)
}

/// Quoted string or the rest of the line (so `/ac Basic Synthesis` works).
pub fn name_argument(input: &str) -> Res<'_, String> {
    context(
        "name",
        alt((
            map(quoted, str::to_string),
            map(
                verify(take_while1(|c: char| c != '"'), |s: &str| !s.trim().is_empty()),
                |s: &str| s.trim_end().to_string(),
            ),
        )),
    )(input)
}

/// Culture-invariant decimal number.
pub fn number(input: &str) -> Res<'_, f64> {
    context(
        "number",
        map_res(recognize(pair(digit1, opt(pair(char('.'), digit1)))), |s: &str| {
            s.parse::<f64>()
        }),
    )(input)
}

/// Non-negative integer.
pub fn uint(input: &str) -> Res<'_, u32> {
    context("integer", map_res(digit1, |s: &str| s.parse::<u32>()))(input)
}

/// `a` or `a-b`.
pub fn range(input: &str) -> Res<'_, (f64, Option<f64>)> {
    pair(number, opt(preceded(char('-'), number)))(input)
}

fn required<'a, T>(
    parser: impl FnMut(&'a str) -> Res<'a, T>,
) -> impl FnMut(&'a str) -> Res<'a, T> {
    preceded(space1, parser)
}

/// Parse arguments for a known verb; `rest` is the text after the verb name.
fn arguments(verb: Verb, rest: &str) -> Res<'_, Statement> {
    match verb {
        Verb::Action => map(required(name_argument), Statement::Action)(rest),
        Verb::Click => map(required(argument), Statement::Click)(rest),
        Verb::Wait => map(required(range), |(wait, until)| Statement::Wait { wait, until })(rest),
        Verb::WaitAddon => map(required(name_argument), Statement::WaitAddon)(rest),
        Verb::Require => map(required(name_argument), Statement::Require)(rest),
        Verb::RequireQuality => map(required(uint), Statement::RequireQuality)(rest),
        Verb::RequireStats => map(
            tuple((required(uint), required(uint), required(uint))),
            |(craftsmanship, control, cp)| Statement::RequireStats(craftsmanship, control, cp),
        )(rest),
        Verb::RequireRepair => Ok((rest, Statement::RequireRepair)),
        Verb::RequireSpiritbond => Ok((rest, Statement::RequireSpiritbond)),
        Verb::Target => map(required(name_argument), Statement::Target)(rest),
        Verb::Send => map(required(argument), Statement::Send)(rest),
        Verb::Loop => map(opt(required(uint)), Statement::Loop)(rest),
        Verb::Gate => map(required(uint), Statement::Gate)(rest),
        Verb::RunMacro => map(required(name_argument), Statement::RunMacro)(rest),
        Verb::Item => map(required(name_argument), Statement::Item)(rest),
        Verb::Recipe => map(required(name_argument), Statement::Recipe)(rest),
    }
}

/// Match a masked command line (leading whitespace already removed).
pub fn statement(line: &str) -> Result<Statement, GrammarError> {
    let (rest, name) = match verb(line) {
        Ok(parsed) => parsed,
        Err(_) if line.starts_with('/') => return Ok(Statement::Native),
        Err(_) => {
            return Err(GrammarError {
                message: "expected '/' followed by a command name".to_string(),
                offset: 0,
            });
        }
    };

    let Some(known) = Verb::from_name(name) else {
        return Ok(Statement::Native);
    };

    match all_consuming(terminated(|i| arguments(known, i), space0))(rest) {
        Ok((_, statement)) => Ok(statement),
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => {
            Err(describe(line, name, err))
        }
        Err(nom::Err::Incomplete(_)) => Err(GrammarError {
            message: format!("incomplete arguments for /{}", name),
            offset: line.len(),
        }),
    }
}

fn describe(line: &str, name: &str, err: VerboseError<&str>) -> GrammarError {
    let offset = err
        .errors
        .first()
        .map(|(remaining, _)| line.len() - remaining.len())
        .unwrap_or(line.len());
    let expected = err.errors.iter().find_map(|(_, kind)| match kind {
        VerboseErrorKind::Context(label) => Some(*label),
        _ => None,
    });
    let message = match expected {
        Some(label) => format!("invalid arguments for /{}: expected {}", name, label),
        None if offset >= line.trim_end().len() => {
            format!("missing arguments for /{}", name)
        }
        None => format!("unexpected input for /{}", name),
    };
    GrammarError { message, offset }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_and_bare_names() {
        assert_eq!(
            statement("/ac \"Basic Synthesis\""),
            Ok(Statement::Action("Basic Synthesis".into()))
        );
        assert_eq!(
            statement("/ac Basic Synthesis   "),
            Ok(Statement::Action("Basic Synthesis".into()))
        );
        assert_eq!(
            statement("/click synthesize"),
            Ok(Statement::Click("synthesize".into()))
        );
    }

    #[test]
    fn verbs_are_case_insensitive() {
        assert_eq!(statement("/LOOP 3"), Ok(Statement::Loop(Some(3))));
        assert_eq!(statement("/Craft 5"), Ok(Statement::Gate(5)));
    }

    #[test]
    fn parses_wait_ranges() {
        assert_eq!(
            statement("/wait 1.5-3"),
            Ok(Statement::Wait {
                wait: 1.5,
                until: Some(3.0)
            })
        );
        assert_eq!(
            statement("/wait 2"),
            Ok(Statement::Wait {
                wait: 2.0,
                until: None
            })
        );
    }

    #[test]
    fn unknown_verbs_are_native() {
        assert_eq!(statement("/echo hello world"), Ok(Statement::Native));
        assert_eq!(statement("/waitx 3"), Ok(Statement::Native));
        assert_eq!(statement("/"), Ok(Statement::Native));
        assert_eq!(statement("/ hello"), Ok(Statement::Native));
        assert_eq!(statement("/ロット"), Ok(Statement::Native));
        assert_eq!(statement("/acロ Observe"), Ok(Statement::Native));
    }

    #[test]
    fn reports_offset_of_bad_argument() {
        let err = statement("/wait abc").unwrap_err();
        assert_eq!(err.offset, 6);

        let err = statement("/requirestats 10 20").unwrap_err();
        assert!(err.offset >= 19, "offset was {}", err.offset);
    }

    #[test]
    fn rejects_trailing_garbage_for_numeric_verbs() {
        let err = statement("/loop 3 times").unwrap_err();
        assert_eq!(err.offset, 8);
    }

    #[test]
    fn requires_something_to_start_with_slash() {
        let err = statement("ac Basic").unwrap_err();
        assert_eq!(err.offset, 0);
    }
}
