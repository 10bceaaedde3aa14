use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ScriptQueueError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: SourceLocation,
    pub end: SourceLocation,
}

impl SourceSpan {
    pub fn synthetic() -> Self {
        Self {
            start: SourceLocation { line: 1, column: 1 },
            end: SourceLocation { line: 1, column: 1 },
        }
    }

    pub fn line(line: usize, column: usize, width: usize) -> Self {
        Self {
            start: SourceLocation { line, column },
            end: SourceLocation {
                line,
                column: column + width,
            },
        }
    }
}

/// One piece of an argument value: literal text or the body of a `<...>` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum ChainPart {
    Text(String),
    Tag(String),
}

/// Unresolved argument value, opaque to everything but the tag resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagChain {
    pub parts: Vec<ChainPart>,
}

impl TagChain {
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            parts: vec![ChainPart::Text(text.into())],
        }
    }

    pub fn has_tags(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, ChainPart::Tag(_)))
    }

    /// Returns the literal text when the chain holds no tags.
    pub fn as_literal(&self) -> Option<String> {
        if self.has_tags() {
            return None;
        }
        Some(
            self.parts
                .iter()
                .map(|part| match part {
                    ChainPart::Text(text) | ChainPart::Tag(text) => text.as_str(),
                })
                .collect(),
        )
    }
}

impl fmt::Display for TagChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            match part {
                ChainPart::Text(text) => f.write_str(text)?,
                ChainPart::Tag(tag) => write!(f, "<{}>", tag)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledArgument {
    pub prefix: Option<String>,
    pub raw: String,
    pub chain: TagChain,
}

impl CompiledArgument {
    pub fn needs_resolution(&self) -> bool {
        self.chain.has_tags()
    }

    pub fn has_prefix(&self, name: &str) -> bool {
        self.prefix
            .as_deref()
            .map(|prefix| prefix.eq_ignore_ascii_case(name))
            .unwrap_or(false)
    }
}

/// A labeled, guarded sub-program attached to a control-flow entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub label: String,
    pub guard: Vec<CompiledArgument>,
    pub body: Vec<CompiledEntry>,
}

impl Block {
    pub fn is_unconditional(&self) -> bool {
        self.guard.is_empty()
    }
}

/// Compile-time form of one command invocation. Live entries are
/// instantiated from it each time it is queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledEntry {
    pub command: String,
    pub raw_arguments: Vec<String>,
    pub arguments: Vec<CompiledArgument>,
    pub blocks: Vec<Block>,
    pub instant: bool,
    pub await_completion: bool,
    pub broken: Option<String>,
    pub script: String,
    pub location: SourceSpan,
}

impl CompiledEntry {
    pub fn command_line(&self) -> String {
        if self.raw_arguments.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.raw_arguments.join(" "))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "every", rename_all = "camelCase")]
pub enum QueueSpeed {
    Instant,
    Every(Duration),
}

impl QueueSpeed {
    pub fn is_instant(&self) -> bool {
        match self {
            Self::Instant => true,
            Self::Every(duration) => duration.is_zero(),
        }
    }

    pub fn spacing(&self) -> Duration {
        match self {
            Self::Instant => Duration::ZERO,
            Self::Every(duration) => *duration,
        }
    }
}

/// A named script as loaded from source: its main program and optional
/// supplemental program run once the main program drains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptContainer {
    pub name: String,
    pub container_type: String,
    pub speed: Option<QueueSpeed>,
    pub definitions: Vec<String>,
    pub script: Vec<CompiledEntry>,
    pub on_complete: Option<Vec<CompiledEntry>>,
    pub location: SourceSpan,
}

/// What the compiler needs to know about a command without running it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSignature {
    pub name: String,
    pub required_args: usize,
    pub holdable: bool,
    pub forces_hold: bool,
    pub requires_block: bool,
    pub continuations: Vec<String>,
}

pub trait CommandCatalog {
    fn signature(&self, name: &str) -> Option<CommandSignature>;

    fn is_continuation_marker(&self, _name: &str) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompileDiagnostic {
    pub script: String,
    pub error: ScriptQueueError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompileProjectResult {
    pub scripts: BTreeMap<String, ScriptContainer>,
    pub diagnostics: Vec<CompileDiagnostic>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_chain_display_and_literal() {
        let chain = TagChain {
            parts: vec![
                ChainPart::Text("hi ".to_string()),
                ChainPart::Tag("name".to_string()),
            ],
        };
        assert!(chain.has_tags());
        assert_eq!(chain.to_string(), "hi <name>");
        assert_eq!(chain.as_literal(), None);
        assert_eq!(TagChain::literal("x").as_literal(), Some("x".to_string()));
    }

    #[test]
    fn queue_speed_treats_zero_spacing_as_instant() {
        assert!(QueueSpeed::Instant.is_instant());
        assert!(QueueSpeed::Every(Duration::ZERO).is_instant());
        assert!(!QueueSpeed::Every(Duration::from_millis(50)).is_instant());
    }
}
