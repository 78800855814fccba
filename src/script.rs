// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::command::{Command, CommandKind, Direction};
use crate::error::{CodelessError, Result};

/// Identifies a script run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptId(pub u64);

static NEXT_SCRIPT_ID: AtomicU64 = AtomicU64::new(1);

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "script#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptState {
    Created,
    Running,
    Stopped,
    Complete,
}

/// An ordered list of commands sent one after the other.
#[derive(Debug, Clone)]
pub struct Script {
    id: ScriptId,
    name: String,
    commands: Vec<Command>,
    index: usize,
    stop_on_error: bool,
    state: ScriptState,
    invalid: bool,
    custom: bool,
}

impl Script {
    /// One command per line. Blank lines are skipped.
    pub fn parse(name: impl Into<String>, text: &str) -> Self {
        let commands = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| Command::parse(l, Direction::Outbound))
            .collect();
        Self::from_commands(name, commands)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CodelessError::resource(format!("failed to read {}: {e}", path.display()))
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::parse(name, &text))
    }

    pub fn from_commands(name: impl Into<String>, commands: Vec<Command>) -> Self {
        let invalid = commands.iter().any(|c| !c.is_valid());
        let custom = commands.iter().any(|c| c.kind() == CommandKind::Custom);
        Self {
            id: ScriptId(NEXT_SCRIPT_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            commands,
            index: 0,
            stop_on_error: true,
            state: ScriptState::Created,
            invalid,
            custom,
        }
    }

    pub fn with_stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }

    pub fn id(&self) -> ScriptId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Index of the command currently running or next to run.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn stop_on_error(&self) -> bool {
        self.stop_on_error
    }

    pub fn state(&self) -> ScriptState {
        self.state
    }

    /// At least one line failed to parse.
    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    /// At least one line is not a known command.
    pub fn has_custom(&self) -> bool {
        self.custom
    }

    pub(crate) fn set_running(&mut self) {
        self.state = ScriptState::Running;
    }

    pub(crate) fn current(&self) -> Option<&Command> {
        self.commands.get(self.index)
    }

    /// Store the completed current command and move on. Returns false at the end.
    pub(crate) fn advance(&mut self, completed: Command) -> bool {
        if let Some(slot) = self.commands.get_mut(self.index) {
            *slot = completed;
        }
        self.index += 1;
        if self.index >= self.commands.len() {
            self.state = ScriptState::Complete;
            false
        } else {
            true
        }
    }

    pub(crate) fn record(&mut self, completed: Command) {
        if let Some(slot) = self.commands.get_mut(self.index) {
            *slot = completed;
        }
    }

    pub(crate) fn stop(&mut self) {
        if self.state != ScriptState::Complete {
            self.state = ScriptState::Stopped;
        }
    }
}
