//! Modifier extraction
//!
//! Modifiers are angle-bracket annotations that may appear anywhere on a
//! command line. Each kind is lifted out independently of the verb grammar:
//! the matched span is blanked in a masked copy of the line (so column offsets
//! of the remaining text stay valid) and recorded so the stripped text can be
//! rebuilt for native commands.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;

use super::command::{WaitPolicy, seconds_to_millis};

static WAIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<wait\.(\d+(?:\.\d+)?)(?:-(\d+(?:\.\d+)?))?>").expect("valid wait regex")
});
static MAX_WAIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<maxwait\.(\d+(?:\.\d+)?)>").expect("valid maxwait regex"));
static UNSAFE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<unsafe>").expect("valid unsafe regex"));
static ECHO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<echo>").expect("valid echo regex"));
static INDEX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<index\.(\d+)>").expect("valid index regex"));
static QUALITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(hq|nq)>").expect("valid quality regex"));
static CONDITION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<condition\.(!?)([a-z_]+(?:,[a-z_]+)*)>").expect("valid condition regex")
});

/// Item quality requested through `<hq>` / `<nq>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemQuality {
    /// Normal quality.
    Normal,
    /// High quality.
    High,
}

/// Crafting-condition gate from `<condition.good,excellent>` or `<condition.!poor>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionModifier {
    /// Lower-cased condition names.
    pub conditions: Vec<String>,
    /// Whether the list names conditions that must *not* be current.
    pub negated: bool,
}

impl ConditionModifier {
    /// Whether the supplied current condition satisfies this gate.
    pub fn is_met(&self, current: &str) -> bool {
        let current = current.trim().to_ascii_lowercase();
        let listed = self.conditions.iter().any(|c| *c == current);
        listed != self.negated
    }
}

/// All modifiers found on a single line.
///
/// Absent modifiers take neutral values: zero wait, no max-wait override,
/// safe, silent, no index, no quality, no condition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Modifiers {
    /// Post-command wait policy from `<wait.N>` or `<wait.N-M>`.
    pub wait: WaitPolicy,
    /// Whether a `<wait>` modifier was present at all.
    pub has_wait: bool,
    /// Override for bounded polls from `<maxwait.N>`, in milliseconds.
    pub max_wait_ms: Option<u64>,
    /// `<unsafe>`: do not wait for the environment to confirm an action.
    pub unsafe_action: bool,
    /// `<echo>`: print progress messages.
    pub echo: bool,
    /// `<index.N>`: disambiguate between same-named targets.
    pub index: Option<u32>,
    /// `<hq>` / `<nq>`.
    pub quality: Option<ItemQuality>,
    /// `<condition.X>`.
    pub condition: Option<ConditionModifier>,
}

/// Failure while extracting a modifier; `offset` is a byte offset into the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifierError {
    /// Description of the problem.
    pub message: String,
    /// Byte offset of the offending token.
    pub offset: usize,
}

impl ModifierError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// A command line with modifier tokens blanked out.
#[derive(Debug, Clone)]
pub struct MaskedLine {
    original: String,
    masked: String,
    spans: Vec<Range<usize>>,
}

impl MaskedLine {
    /// Start masking the supplied line.
    pub fn new(line: &str) -> Self {
        Self {
            original: line.to_string(),
            masked: line.to_string(),
            spans: Vec::new(),
        }
    }

    /// Line text with every extracted modifier replaced by spaces.
    ///
    /// Byte offsets into the masked text equal offsets into the original line.
    pub fn masked(&self) -> &str {
        &self.masked
    }

    /// Line text with every extracted modifier removed, trimmed.
    pub fn stripped(&self) -> String {
        let mut spans = self.spans.clone();
        spans.sort_by_key(|span| span.start);

        let mut out = String::with_capacity(self.original.len());
        let mut cursor = 0;
        for span in spans {
            out.push_str(self.original[cursor..span.start].trim_end());
            cursor = span.end;
        }
        out.push_str(&self.original[cursor..]);
        out.trim().to_string()
    }

    /// Find at most one match of `re`, blank it, and return its capture groups.
    fn take(
        &mut self,
        re: &Regex,
        kind: &str,
    ) -> Result<Option<(usize, Vec<Option<String>>)>, ModifierError> {
        let quoted = quoted_spans(&self.masked);
        let found = {
            let mut matches = re.captures_iter(&self.masked).filter(|caps| {
                caps.get(0)
                    .is_some_and(|m| !quoted.iter().any(|span| span.contains(&m.start())))
            });
            match matches.next() {
                None => None,
                Some(first) => {
                    if let Some(second) = matches.next() {
                        let offset = second.get(0).map(|m| m.start()).unwrap_or_default();
                        return Err(ModifierError::new(
                            format!("duplicate <{}> modifier", kind),
                            offset,
                        ));
                    }
                    let whole = first.get(0).map(|m| m.range()).unwrap_or_default();
                    let groups: Vec<Option<String>> = first
                        .iter()
                        .skip(1)
                        .map(|group| group.map(|m| m.as_str().to_string()))
                        .collect();
                    Some((whole, groups))
                }
            }
        };
        let Some((whole, groups)) = found else {
            return Ok(None);
        };

        self.masked
            .replace_range(whole.clone(), &" ".repeat(whole.len()));
        let start = whole.start;
        self.spans.push(whole);
        Ok(Some((start, groups)))
    }
}

/// Byte ranges of closed `"..."` arguments, quotes included.
fn quoted_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut open = None;
    for (index, c) in text.char_indices() {
        if c == '"' {
            match open.take() {
                Some(start) => spans.push(start..index + 1),
                None => open = Some(index),
            }
        }
    }
    spans
}

fn parse_seconds(raw: &str, offset: usize) -> Result<u64, ModifierError> {
    raw.parse::<f64>()
        .map(seconds_to_millis)
        .map_err(|_| ModifierError::new(format!("invalid number '{}'", raw), offset))
}

/// Extract every supported modifier from `line`.
pub fn extract(line: &mut MaskedLine) -> Result<Modifiers, ModifierError> {
    let mut modifiers = Modifiers::default();

    if let Some((offset, groups)) = line.take(&WAIT_RE, "wait")? {
        let wait = parse_seconds(groups[0].as_deref().unwrap_or_default(), offset)?;
        let until = match groups[1].as_deref() {
            Some(raw) => parse_seconds(raw, offset)?,
            None => 0,
        };
        modifiers.wait = WaitPolicy::new(wait, until)
            .map_err(|err| ModifierError::new(err.to_string(), offset))?;
        modifiers.has_wait = true;
    }

    if let Some((offset, groups)) = line.take(&MAX_WAIT_RE, "maxwait")? {
        let raw = groups[0].as_deref().unwrap_or_default();
        modifiers.max_wait_ms = Some(parse_seconds(raw, offset)?);
    }

    modifiers.unsafe_action = line.take(&UNSAFE_RE, "unsafe")?.is_some();
    modifiers.echo = line.take(&ECHO_RE, "echo")?.is_some();

    if let Some((offset, groups)) = line.take(&INDEX_RE, "index")? {
        let raw = groups[0].as_deref().unwrap_or_default();
        let index = raw
            .parse::<u32>()
            .map_err(|_| ModifierError::new(format!("invalid index '{}'", raw), offset))?;
        modifiers.index = Some(index);
    }

    if let Some((_, groups)) = line.take(&QUALITY_RE, "hq")? {
        let raw = groups[0].as_deref().unwrap_or_default();
        modifiers.quality = Some(if raw.eq_ignore_ascii_case("hq") {
            ItemQuality::High
        } else {
            ItemQuality::Normal
        });
    }

    if let Some((_, groups)) = line.take(&CONDITION_RE, "condition")? {
        let negated = groups[0].as_deref() == Some("!");
        let conditions = groups[1]
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|name| name.to_ascii_lowercase())
            .collect();
        modifiers.condition = Some(ConditionModifier {
            conditions,
            negated,
        });
    }

    Ok(modifiers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract_line(text: &str) -> (Modifiers, MaskedLine) {
        let mut line = MaskedLine::new(text);
        let modifiers = extract(&mut line).expect("extract");
        (modifiers, line)
    }

    #[test]
    fn absent_modifiers_are_neutral_and_leave_line_untouched() {
        let (modifiers, line) = extract_line("/ac \"Basic Touch\"");
        assert_eq!(modifiers, Modifiers::default());
        assert_eq!(line.masked(), "/ac \"Basic Touch\"");
        assert_eq!(line.stripped(), "/ac \"Basic Touch\"");
    }

    #[test]
    fn masks_modifiers_in_place() {
        let (modifiers, line) = extract_line("/ac Veneration <wait.2> <unsafe>");
        assert_eq!(modifiers.wait, WaitPolicy::fixed(2000));
        assert!(modifiers.unsafe_action);
        assert_eq!(line.masked().len(), "/ac Veneration <wait.2> <unsafe>".len());
        assert_eq!(line.masked().trim_end(), "/ac Veneration");
        assert_eq!(line.stripped(), "/ac Veneration");
    }

    #[test]
    fn parses_wait_range_and_rejects_inverted_range() {
        let (modifiers, _) = extract_line("/echo hi <wait.1.5-3>");
        assert_eq!(modifiers.wait, WaitPolicy::new(1500, 3000).unwrap());

        let mut line = MaskedLine::new("/echo hi <wait.3-1>");
        let err = extract(&mut line).unwrap_err();
        assert_eq!(err.offset, 9);
    }

    #[test]
    fn rejects_duplicate_kinds() {
        let mut line = MaskedLine::new("/echo <echo> <echo>");
        let err = extract(&mut line).unwrap_err();
        assert!(err.message.contains("duplicate"));
        assert_eq!(err.offset, 13);
    }

    #[test]
    fn condition_modifier_supports_negation() {
        let (modifiers, _) = extract_line("/ac \"Precise Touch\" <condition.Good,excellent>");
        let condition = modifiers.condition.unwrap();
        assert!(condition.is_met("Good"));
        assert!(!condition.is_met("normal"));

        let (modifiers, _) = extract_line("/ac Observe <condition.!poor>");
        let condition = modifiers.condition.unwrap();
        assert!(condition.negated);
        assert!(condition.is_met("normal"));
        assert!(!condition.is_met("poor"));
    }

    #[test]
    fn stripped_text_keeps_interior_words() {
        let (_, line) = extract_line("/echo start <wait.1> end");
        assert_eq!(line.stripped(), "/echo start end");
    }

    #[test]
    fn quoted_arguments_keep_angle_brackets() {
        let (modifiers, line) = extract_line("/ac \"Foo <echo> Bar\"");
        assert!(!modifiers.echo);
        assert_eq!(line.masked(), "/ac \"Foo <echo> Bar\"");

        let (modifiers, line) = extract_line("/item \"Odd <hq>\" <hq> <wait.1>");
        assert_eq!(modifiers.quality, Some(ItemQuality::High));
        assert_eq!(modifiers.wait, WaitPolicy::fixed(1000));
        assert_eq!(line.stripped(), "/item \"Odd <hq>\"");
    }

    #[test]
    fn extracts_index_quality_and_maxwait() {
        let (modifiers, _) = extract_line("/item \"Draught\" <HQ> <index.2> <maxwait.10>");
        assert_eq!(modifiers.quality, Some(ItemQuality::High));
        assert_eq!(modifiers.index, Some(2));
        assert_eq!(modifiers.max_wait_ms, Some(10_000));
    }
}
