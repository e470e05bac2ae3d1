//! Authoring-command boundary. Commands are opaque records the engine writes
//! back into; interpreting them is somebody else's job.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommandId(u32);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arg {
    Number(f32),
    Ident(String),
    Text(String),
    Vector([f32; 3]),
    List(Vec<Arg>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub keyword: String,
    pub name: String,
    #[serde(default)]
    pub args: BTreeMap<String, Arg>,
}

impl Command {
    pub fn new(keyword: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            name: name.into(),
            args: BTreeMap::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, arg: Arg) -> Self {
        self.args.insert(key.into(), arg);
        self
    }

    pub fn arg(&self, key: &str) -> Option<&Arg> {
        self.args.get(key)
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Number(value) => write!(f, "{value}"),
            Arg::Ident(ident) => write!(f, "{ident}"),
            Arg::Text(text) => write!(f, "\"{}\"", text.escape_default()),
            Arg::Vector([x, y, z]) => write!(f, "({x} {y} {z})"),
            Arg::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.keyword, self.name)?;
        for (key, arg) in &self.args {
            write!(f, " {key}={arg}")?;
        }
        write!(f, " end{}", self.keyword)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    pub command: CommandId,
    pub changed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandDocument {
    commands: Vec<Option<Command>>,
    #[serde(skip)]
    revision: u64,
}

impl CommandDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumped on every change; equal revisions mean an unchanged document.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn insert(&mut self, command: Command) -> CommandId {
        let id = CommandId(self.commands.len() as u32);
        self.commands.push(Some(command));
        self.revision += 1;
        id
    }

    pub fn get(&self, id: CommandId) -> Option<&Command> {
        self.commands.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn remove(&mut self, id: CommandId) -> Option<Command> {
        let removed = self.commands.get_mut(id.0 as usize).and_then(Option::take);
        if removed.is_some() {
            self.revision += 1;
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (CommandId, &Command)> + '_ {
        self.commands
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|cmd| (CommandId(index as u32), cmd)))
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes `command` into `target`, creating a new command when there is
    /// no live target or `create_new` is set. Identical content is left alone.
    pub fn write(
        &mut self,
        target: Option<CommandId>,
        create_new: bool,
        command: Command,
    ) -> SyncOutcome {
        if !create_new {
            if let Some(id) = target {
                if let Some(slot) = self.commands.get_mut(id.0 as usize) {
                    if let Some(existing) = slot.as_mut() {
                        if *existing == command {
                            return SyncOutcome {
                                command: id,
                                changed: false,
                            };
                        }
                        *existing = command;
                        self.revision += 1;
                        return SyncOutcome {
                            command: id,
                            changed: true,
                        };
                    }
                }
            }
        }
        SyncOutcome {
            command: self.insert(command),
            changed: true,
        }
    }

    /// Source text, one command per line.
    pub fn to_source(&self) -> String {
        self.iter()
            .map(|(_, command)| command.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
