use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use qs_core::{CommandCatalog, CommandSignature, QsValue, ScriptQueueError};

use crate::context::CommandContext;

pub const DISPATCH_INVALID_ARGUMENTS: &str = "DISPATCH_INVALID_ARGUMENTS";

/// Parsed, command-specific argument values handed to `execute`.
pub type CommandArgs = BTreeMap<String, QsValue>;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedArgument {
    pub prefix: Option<String>,
    pub raw: String,
    pub value: QsValue,
}

impl ResolvedArgument {
    pub fn text(&self) -> String {
        self.value.to_string()
    }

    pub fn is_word(&self, word: &str) -> bool {
        self.prefix.is_none() && self.text().eq_ignore_ascii_case(word)
    }
}

/// Arguments of one execution, already resolved. `save:` is not included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedArguments {
    items: Vec<ResolvedArgument>,
}

impl ResolvedArguments {
    pub fn new(items: Vec<ResolvedArgument>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedArgument> {
        self.items.iter()
    }

    pub fn positional(&self) -> impl Iterator<Item = &ResolvedArgument> {
        self.items.iter().filter(|item| item.prefix.is_none())
    }

    pub fn prefixed(&self, name: &str) -> Option<&ResolvedArgument> {
        self.items.iter().find(|item| {
            item.prefix
                .as_deref()
                .map(|prefix| prefix.eq_ignore_ascii_case(name))
                .unwrap_or(false)
        })
    }

    pub fn values(&self) -> Vec<QsValue> {
        self.items.iter().map(|item| item.value.clone()).collect()
    }
}

/// A command the dispatcher can run. `parse` validates and normalizes the
/// resolved arguments; `execute` acts on the queue through the context.
pub trait Command: Send + Sync {
    fn name(&self) -> &str;

    fn usage(&self) -> &str;

    fn required_args(&self) -> usize {
        0
    }

    /// Holdable commands finish their entry themselves, possibly later and
    /// from another thread.
    fn is_holdable(&self) -> bool {
        false
    }

    fn forces_hold(&self) -> bool {
        false
    }

    fn requires_block(&self) -> bool {
        false
    }

    fn continuations(&self) -> &[&'static str] {
        &[]
    }

    fn parse(&self, args: &ResolvedArguments) -> Result<CommandArgs, ScriptQueueError>;

    fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        args: CommandArgs,
    ) -> Result<(), ScriptQueueError>;

    fn signature(&self) -> CommandSignature {
        CommandSignature {
            name: self.name().to_string(),
            required_args: self.required_args(),
            holdable: self.is_holdable(),
            forces_hold: self.forces_hold(),
            requires_block: self.requires_block(),
            continuations: self
                .continuations()
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
        }
    }
}

pub fn invalid_arguments(message: impl Into<String>) -> ScriptQueueError {
    ScriptQueueError::new(DISPATCH_INVALID_ARGUMENTS, message)
}

/// Case-insensitive name to command table.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn Command>>,
    continuation_markers: BTreeSet<String>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::commands::register_builtins(&mut registry);
        registry
    }

    /// Registers `command`, replacing any command of the same name.
    pub fn register(&mut self, command: Arc<dyn Command>) {
        for marker in command.continuations() {
            self.continuation_markers.insert(marker.to_ascii_lowercase());
        }
        self.commands
            .insert(command.name().to_ascii_lowercase(), command);
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = self.commands.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .field("continuation_markers", &self.continuation_markers)
            .finish()
    }
}

impl CommandCatalog for CommandRegistry {
    fn signature(&self, name: &str) -> Option<CommandSignature> {
        self.lookup(name).map(|command| command.signature())
    }

    fn is_continuation_marker(&self, name: &str) -> bool {
        self.continuation_markers
            .contains(&name.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Command for Echo {
        fn name(&self) -> &str {
            "Echo"
        }

        fn usage(&self) -> &str {
            "echo <text>"
        }

        fn required_args(&self) -> usize {
            1
        }

        fn continuations(&self) -> &[&'static str] {
            &["otherwise"]
        }

        fn parse(&self, args: &ResolvedArguments) -> Result<CommandArgs, ScriptQueueError> {
            Ok(BTreeMap::from([(
                "text".to_string(),
                args.values().into_iter().next().unwrap_or_else(|| QsValue::from("")),
            )]))
        }

        fn execute(
            &self,
            _ctx: &mut CommandContext<'_>,
            _args: CommandArgs,
        ) -> Result<(), ScriptQueueError> {
            Ok(())
        }
    }

    #[test]
    fn registry_is_case_insensitive_and_exposes_signatures() {
        let mut registry = CommandRegistry::new();
        registry.register(Arc::new(Echo));
        assert!(registry.lookup("ECHO").is_some());
        let signature = registry.signature("echo").expect("signature");
        assert_eq!(signature.required_args, 1);
        assert_eq!(signature.continuations, vec!["otherwise"]);
        assert!(registry.is_continuation_marker("Otherwise"));
        assert!(!registry.is_continuation_marker("echo"));
    }

    #[test]
    fn builtins_cover_the_core_commands() {
        let registry = CommandRegistry::with_builtins();
        for name in [
            "narrate", "debug", "define", "wait", "sleep", "if", "while", "repeat", "foreach",
            "inject", "run", "queue", "stop",
        ] {
            assert!(registry.lookup(name).is_some(), "missing {}", name);
        }
        assert!(registry.is_continuation_marker("else"));
        assert!(registry.signature("sleep").expect("sleep").holdable);
    }

    #[test]
    fn resolved_arguments_split_positional_and_prefixed() {
        let args = ResolvedArguments::new(vec![
            ResolvedArgument {
                prefix: None,
                raw: "hello".to_string(),
                value: QsValue::from("hello"),
            },
            ResolvedArgument {
                prefix: Some("as".to_string()),
                raw: "as:item".to_string(),
                value: QsValue::from("item"),
            },
            ResolvedArgument {
                prefix: None,
                raw: "<n>".to_string(),
                value: QsValue::Number(2.0),
            },
        ]);
        assert_eq!(
            args.positional().map(ResolvedArgument::text).collect::<Vec<_>>(),
            vec!["hello".to_string(), "2".to_string()]
        );
        assert_eq!(args.prefixed("AS").map(|a| a.text()), Some("item".to_string()));
        assert!(args.iter().next().expect("first").is_word("HELLO"));
    }
}
