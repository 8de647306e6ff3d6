//! JSON response tables.
//!
//! ```json
//! {
//!   "1": { "message": "ls -lh", "reply": ["a", "b"], "error": [], "returncode": 2 }
//! }
//! ```
//!
//! Entries keep the order they have in the source file; the first entry whose
//! `message` equals the command wins.

use crate::errors::WropenError;
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// `reply`/`error` may be written as a list of lines or as one string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum Lines {
    Many(Vec<String>),
    One(String),
}

impl From<Lines> for Vec<String> {
    fn from(value: Lines) -> Self {
        match value {
            Lines::Many(lines) => lines,
            Lines::One(line) => vec![line],
        }
    }
}

fn deserialize_lines<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let lines = Option::<Lines>::deserialize(deserializer)?;
    Ok(lines.map(Into::into).unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    pub message: String,
    #[serde(default, deserialize_with = "deserialize_lines")]
    pub reply: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_lines")]
    pub error: Vec<String>,
    #[serde(default)]
    pub returncode: i32,
}

/// Text-level answer for one command, before any encoding is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub stdout: String,
    pub stderr: String,
    pub returncode: i32,
    /// Key of the matching entry; `None` means the command was echoed back.
    pub entry_key: Option<String>,
}

impl Reply {
    pub fn matched(&self) -> bool {
        self.entry_key.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseTable {
    entries: Vec<(String, TableEntry)>,
}

impl ResponseTable {
    pub fn parse(text: &str) -> Result<Self, WropenError> {
        let raw: Map<String, Value> =
            serde_json::from_str(text).map_err(|e| WropenError::TableParse(e.to_string()))?;
        let mut entries = Vec::with_capacity(raw.len());
        for (key, value) in raw {
            let entry: TableEntry = serde_json::from_value(value)
                .map_err(|e| WropenError::TableParse(format!("entry {key}: {e}")))?;
            entries.push((key, entry));
        }
        Ok(Self { entries })
    }

    pub fn load(path: &Path, fs: &dyn FileSystem) -> Result<Self, WropenError> {
        let text = fs.read_to_string(path)?;
        Self::parse(&text).map_err(|e| match e {
            WropenError::TableParse(msg) => {
                WropenError::TableParse(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &TableEntry)> {
        self.entries.iter().map(|(key, entry)| (key.as_str(), entry))
    }

    pub fn lookup(&self, command: &str) -> Option<(&str, &TableEntry)> {
        self.entries().find(|(_, entry)| entry.message == command)
    }

    /// Canned reply for `command`, or the command echoed on stdout when no entry matches.
    pub fn resolve(&self, command: &str) -> Reply {
        match self.lookup(command) {
            Some((key, entry)) => Reply {
                stdout: entry.reply.join("\n"),
                stderr: entry.error.join("\n"),
                returncode: entry.returncode,
                entry_key: Some(key.to_string()),
            },
            None => Reply {
                stdout: command.to_string(),
                stderr: String::new(),
                returncode: 0,
                entry_key: None,
            },
        }
    }
}
