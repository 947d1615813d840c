//! Execution frames
//!
//! An [`ActiveMacro`] is one in-progress macro invocation: its definition, its
//! commands and a program counter. Frames backed by a [`CommandProducer`] pull
//! and parse lines on demand and keep every command they have yielded.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::engine::FrameStatus;
use super::error::{CommandError, ExecResult};
use super::host::{MacroDefinition, MacroLanguage, ScriptRuntime};
use crate::interpreter::parser::parse_line;
use crate::interpreter::{
    Command, CommandProducer, CraftLoopConfig, parse_macro, rewrite_craft_loop,
};

enum FrameBody {
    Static(Vec<Command>),
    Produced {
        producer: Box<dyn CommandProducer>,
        yielded: Vec<Command>,
        pulled: usize,
        exhausted: bool,
    },
}

/// One in-progress macro invocation
pub struct ActiveMacro {
    id: Uuid,
    definition: MacroDefinition,
    body: FrameBody,
    index: usize,
    iterations: u32,
    started_at: DateTime<Utc>,
}

impl ActiveMacro {
    /// Frame over an already parsed command list
    pub fn from_commands(definition: MacroDefinition, commands: Vec<Command>) -> Self {
        Self::with_body(definition, FrameBody::Static(commands))
    }

    /// Frame that pulls its lines lazily from `producer`
    pub fn from_producer(definition: MacroDefinition, producer: Box<dyn CommandProducer>) -> Self {
        Self::with_body(
            definition,
            FrameBody::Produced {
                producer,
                yielded: Vec::new(),
                pulled: 0,
                exhausted: false,
            },
        )
    }

    fn with_body(definition: MacroDefinition, body: FrameBody) -> Self {
        Self {
            id: Uuid::new_v4(),
            definition,
            body,
            index: 0,
            iterations: 0,
            started_at: Utc::now(),
        }
    }

    /// Build a frame for a stored macro.
    ///
    /// Craft-looped macros are rewritten first; `loop_override` replaces their
    /// repeat count. For plain macros a non-zero override appends a `/loop`
    /// line (`-1` loops forever). Script macros are started through `scripts`.
    pub fn from_definition(
        definition: MacroDefinition,
        loop_override: Option<i32>,
        config: &CraftLoopConfig,
        scripts: Option<&Arc<dyn ScriptRuntime>>,
    ) -> ExecResult<Self> {
        if definition.language == MacroLanguage::Script {
            let Some(runtime) = scripts else {
                return Err(CommandError::NoScriptRuntime(definition.name.clone()).into());
            };
            let producer = runtime.start(&definition)?;
            return Ok(Self::from_producer(definition, producer));
        }

        let source = if definition.craft_loop {
            let count = loop_override.unwrap_or(definition.craft_count);
            rewrite_craft_loop(&definition.contents, true, count, config)
                .map_err(CommandError::from)?
        } else {
            match loop_override {
                None | Some(0) => definition.contents.clone(),
                Some(n) if n < 0 => format!("{}\n/loop", definition.contents),
                Some(n) => format!("{}\n/loop {}", definition.contents, n),
            }
        };

        let commands = parse_macro(&source).map_err(CommandError::from)?;
        Ok(Self::from_commands(definition, commands))
    }

    /// Unique id of this invocation
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Macro name
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Source definition
    pub fn definition(&self) -> &MacroDefinition {
        &self.definition
    }

    /// Zero-based program counter
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of loop restarts so far
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// When the frame was created
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whether this frame is fed by a producer
    pub fn is_produced(&self) -> bool {
        matches!(self.body, FrameBody::Produced { .. })
    }

    /// Command count, when known (producers only know once exhausted)
    pub fn len(&self) -> Option<usize> {
        match &self.body {
            FrameBody::Static(commands) => Some(commands.len()),
            FrameBody::Produced {
                yielded, exhausted, ..
            } => exhausted.then_some(yielded.len()),
        }
    }

    /// Commands seen so far (the whole list for static frames)
    pub fn commands(&self) -> &[Command] {
        match &self.body {
            FrameBody::Static(commands) => commands,
            FrameBody::Produced { yielded, .. } => yielded,
        }
    }

    /// Command under the program counter, pulling from the producer if needed.
    ///
    /// `None` means the frame has run past its end.
    pub async fn current_command(&mut self) -> Result<Option<&mut Command>, CommandError> {
        if let FrameBody::Produced {
            producer,
            yielded,
            pulled,
            exhausted,
        } = &mut self.body
        {
            while self.index >= yielded.len() && !*exhausted {
                match producer.next_line().await? {
                    Some(line) => {
                        let number = *pulled;
                        *pulled += 1;
                        if let Some(command) = parse_line(&line, number)? {
                            yielded.push(command);
                        }
                    }
                    None => *exhausted = true,
                }
            }
        }

        let index = self.index;
        Ok(match &mut self.body {
            FrameBody::Static(commands) => commands.get_mut(index),
            FrameBody::Produced { yielded, .. } => yielded.get_mut(index),
        })
    }

    /// Move the program counter to the next command
    pub fn advance(&mut self) {
        self.index += 1;
    }

    /// Jump back to the first command
    pub fn restart(&mut self) -> Result<(), CommandError> {
        if self.is_produced() {
            return Err(CommandError::LoopUnsupported(self.definition.name.clone()));
        }
        self.index = 0;
        self.iterations += 1;
        Ok(())
    }

    /// Snapshot for status reporting
    pub fn status(&self) -> FrameStatus {
        FrameStatus {
            id: self.id,
            name: self.definition.name.clone(),
            index: self.index,
            total: self.len(),
            current: self.commands().get(self.index).map(|c| c.text.clone()),
            iterations: self.iterations,
            started_at: self.started_at,
        }
    }
}

impl fmt::Debug for ActiveMacro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveMacro")
            .field("id", &self.id)
            .field("name", &self.definition.name)
            .field("index", &self.index)
            .field("iterations", &self.iterations)
            .field("produced", &self.is_produced())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::{CommandKind, IterProducer};
    use crate::runtime::error::ExecError;

    fn lines(items: &[&str]) -> Box<dyn CommandProducer> {
        let owned: Vec<String> = items.iter().map(|s| s.to_string()).collect();
        Box::new(IterProducer::new(owned.into_iter()))
    }

    #[tokio::test]
    async fn static_frame_walks_commands_then_ends() {
        let def = MacroDefinition::new("walk", "/echo a\n/echo b");
        let mut frame =
            ActiveMacro::from_definition(def, None, &CraftLoopConfig::default(), None).unwrap();

        assert_eq!(frame.len(), Some(2));
        assert_eq!(frame.current_command().await.unwrap().unwrap().text, "/echo a");
        frame.advance();
        assert_eq!(frame.current_command().await.unwrap().unwrap().text, "/echo b");
        frame.advance();
        assert!(frame.current_command().await.unwrap().is_none());

        frame.restart().unwrap();
        assert_eq!(frame.index(), 0);
        assert_eq!(frame.iterations(), 1);
    }

    #[tokio::test]
    async fn produced_frame_parses_lazily_and_refuses_loop() {
        let def = MacroDefinition::new("script", "").scripted();
        let mut frame = ActiveMacro::from_producer(def, lines(&["/echo a", "", "/ac Observe"]));

        assert_eq!(frame.len(), None);
        assert!(frame.commands().is_empty());
        frame.current_command().await.unwrap();
        assert_eq!(frame.commands().len(), 1);

        frame.advance();
        let second = frame.current_command().await.unwrap().unwrap();
        assert_eq!(
            second.kind,
            CommandKind::Action {
                name: "Observe".into()
            }
        );

        frame.advance();
        assert!(frame.current_command().await.unwrap().is_none());
        assert_eq!(frame.len(), Some(2));
        assert!(matches!(
            frame.restart(),
            Err(CommandError::LoopUnsupported(_))
        ));
    }

    #[tokio::test]
    async fn produced_syntax_error_is_a_command_error() {
        let def = MacroDefinition::new("bad", "").scripted();
        let mut frame = ActiveMacro::from_producer(def, lines(&["not a command"]));
        assert!(matches!(
            frame.current_command().await,
            Err(CommandError::Syntax(_))
        ));
    }

    #[test]
    fn loop_override_appends_loop_to_plain_macros() {
        let def = MacroDefinition::new("plain", "/echo hi");
        let frame =
            ActiveMacro::from_definition(def, Some(3), &CraftLoopConfig::default(), None).unwrap();
        assert_eq!(frame.len(), Some(2));
        assert_eq!(frame.commands()[1].text, "/loop 3");
    }

    #[test]
    fn loop_override_replaces_craft_count() {
        let def = MacroDefinition::new("craft", "/ac Observe").with_craft_loop(0);
        let plain =
            ActiveMacro::from_definition(def.clone(), None, &CraftLoopConfig::default(), None)
                .unwrap();
        assert_eq!(plain.len(), Some(1));

        let looped =
            ActiveMacro::from_definition(def, Some(-1), &CraftLoopConfig::default(), None)
                .unwrap();
        assert!(looped.len().unwrap() > 1);
        assert!(matches!(
            looped.commands().last().map(|c| &c.kind),
            Some(CommandKind::Loop(_))
        ));
    }

    #[test]
    fn script_without_runtime_fails() {
        let def = MacroDefinition::new("lua", "yield('/echo')").scripted();
        let err = ActiveMacro::from_definition(def, None, &CraftLoopConfig::default(), None)
            .unwrap_err();
        assert!(matches!(
            err,
            ExecError::Command(CommandError::NoScriptRuntime(_))
        ));
    }
}
