use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use qs_core::{Block, CompiledArgument, CompiledEntry, QsValue};

use crate::command::{Command, CommandRegistry};

/// One compiled argument plus the value it resolved to on the last run.
#[derive(Debug)]
pub struct ArgumentSlot {
    compiled: CompiledArgument,
    cached: Mutex<Option<QsValue>>,
}

impl ArgumentSlot {
    fn new(compiled: CompiledArgument) -> Self {
        Self {
            compiled,
            cached: Mutex::new(None),
        }
    }

    pub fn compiled(&self) -> &CompiledArgument {
        &self.compiled
    }

    pub fn cached(&self) -> Option<QsValue> {
        self.cached.lock().clone()
    }

    pub(crate) fn store(&self, value: QsValue) {
        *self.cached.lock() = Some(value);
    }
}

/// A live, queued command invocation. Every time a compiled entry is queued
/// a new `Entry` is built, so argument caches and flags never carry over
/// between loop iterations or re-injections.
pub struct Entry {
    compiled: Arc<CompiledEntry>,
    command: Option<Arc<dyn Command>>,
    slots: Vec<ArgumentSlot>,
    instant: AtomicBool,
    finished: AtomicBool,
    callback: bool,
    owner: Option<Arc<Entry>>,
    results: Mutex<BTreeMap<String, QsValue>>,
    scratch: Mutex<BTreeMap<String, QsValue>>,
}

impl Entry {
    pub fn instantiate(
        compiled: Arc<CompiledEntry>,
        commands: &CommandRegistry,
        owner: Option<Arc<Entry>>,
    ) -> Arc<Self> {
        Arc::new(Self::build(compiled, commands, owner, false))
    }

    pub fn instantiate_all(
        program: &[CompiledEntry],
        commands: &CommandRegistry,
        owner: Option<&Arc<Entry>>,
    ) -> Vec<Arc<Self>> {
        program
            .iter()
            .map(|compiled| {
                Self::instantiate(Arc::new(compiled.clone()), commands, owner.cloned())
            })
            .collect()
    }

    /// A synthetic entry that re-enters `owner`'s command after its block
    /// body finishes; loops use it to decide on the next iteration.
    pub fn callback_for(owner: &Arc<Entry>, commands: &CommandRegistry) -> Arc<Self> {
        Arc::new(Self::build(
            Arc::clone(&owner.compiled),
            commands,
            Some(Arc::clone(owner)),
            true,
        ))
    }

    fn build(
        compiled: Arc<CompiledEntry>,
        commands: &CommandRegistry,
        owner: Option<Arc<Entry>>,
        callback: bool,
    ) -> Self {
        let command = commands.lookup(&compiled.command);
        let slots = compiled
            .arguments
            .iter()
            .cloned()
            .map(ArgumentSlot::new)
            .collect();
        Self {
            instant: AtomicBool::new(compiled.instant || callback),
            compiled,
            command,
            slots,
            finished: AtomicBool::new(false),
            callback,
            owner,
            results: Mutex::new(BTreeMap::new()),
            scratch: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn compiled(&self) -> &CompiledEntry {
        &self.compiled
    }

    pub fn command_name(&self) -> &str {
        &self.compiled.command
    }

    pub fn command_line(&self) -> String {
        self.compiled.command_line()
    }

    pub fn script(&self) -> &str {
        &self.compiled.script
    }

    pub fn line(&self) -> usize {
        self.compiled.location.start.line
    }

    pub(crate) fn handle(&self) -> Option<&Arc<dyn Command>> {
        self.command.as_ref()
    }

    pub fn arguments(&self) -> &[ArgumentSlot] {
        &self.slots
    }

    pub fn blocks(&self) -> &[Block] {
        &self.compiled.blocks
    }

    pub fn broken_reason(&self) -> Option<String> {
        if let Some(reason) = &self.compiled.broken {
            return Some(reason.clone());
        }
        if self.command.is_none() {
            return Some(format!("Unknown command \"{}\".", self.compiled.command));
        }
        None
    }

    pub fn is_instant(&self) -> bool {
        self.instant.load(Ordering::Acquire)
    }

    pub(crate) fn set_instant(&self, instant: bool) {
        self.instant.store(instant, Ordering::Release);
    }

    pub fn must_await(&self) -> bool {
        self.compiled.await_completion
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_callback(&self) -> bool {
        self.callback
    }

    pub fn owner(&self) -> Option<&Arc<Entry>> {
        self.owner.as_ref()
    }

    pub fn result(&self, key: &str) -> Option<QsValue> {
        self.results.lock().get(key).cloned()
    }

    pub fn set_result(&self, key: impl Into<String>, value: QsValue) {
        self.results.lock().insert(key.into(), value);
    }

    pub fn results(&self) -> BTreeMap<String, QsValue> {
        self.results.lock().clone()
    }

    pub(crate) fn scratch(&self, key: &str) -> Option<QsValue> {
        self.scratch.lock().get(key).cloned()
    }

    pub(crate) fn set_scratch(&self, key: &str, value: QsValue) {
        self.scratch.lock().insert(key.to_string(), value);
    }

    /// Handle a holdable command keeps to mark this entry finished from
    /// another thread.
    pub fn completion(self: &Arc<Self>) -> EntryCompletion {
        EntryCompletion {
            entry: Arc::clone(self),
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("command", &self.command_line())
            .field("instant", &self.is_instant())
            .field("await", &self.must_await())
            .field("finished", &self.is_finished())
            .field("callback", &self.callback)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct EntryCompletion {
    entry: Arc<Entry>,
}

impl EntryCompletion {
    pub fn finish(&self) {
        self.entry.finish();
    }

    pub fn set_result(&self, key: impl Into<String>, value: QsValue) {
        self.entry.set_result(key, value);
    }

    pub fn is_finished(&self) -> bool {
        self.entry.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qs_core::{SourceSpan, TagChain};

    fn compiled(command: &str) -> CompiledEntry {
        CompiledEntry {
            command: command.to_string(),
            raw_arguments: vec!["<x>".to_string()],
            arguments: vec![CompiledArgument {
                prefix: None,
                raw: "<x>".to_string(),
                chain: TagChain::literal("x"),
            }],
            blocks: Vec::new(),
            instant: false,
            await_completion: false,
            broken: None,
            script: "main".to_string(),
            location: SourceSpan::synthetic(),
        }
    }

    #[test]
    fn instantiation_gives_fresh_caches_and_flags() {
        let commands = CommandRegistry::with_builtins();
        let program = vec![compiled("narrate")];
        let first = Entry::instantiate_all(&program, &commands, None);
        first[0].arguments()[0].store(QsValue::from("one"));
        first[0].finish();

        let second = Entry::instantiate_all(&program, &commands, None);
        assert_eq!(second[0].arguments()[0].cached(), None);
        assert!(!second[0].is_finished());
        assert!(first[0].is_finished());
    }

    #[test]
    fn unknown_command_is_broken_and_callbacks_are_instant() {
        let commands = CommandRegistry::with_builtins();
        let unknown = Entry::instantiate(Arc::new(compiled("nope")), &commands, None);
        assert!(unknown.broken_reason().is_some());

        let owner = Entry::instantiate(Arc::new(compiled("repeat")), &commands, None);
        assert!(!owner.is_instant());
        let callback = Entry::callback_for(&owner, &commands);
        assert!(callback.is_callback());
        assert!(callback.is_instant());
        assert!(Arc::ptr_eq(callback.owner().expect("owner"), &owner));
    }

    #[test]
    fn completion_handle_finishes_from_another_thread() {
        let commands = CommandRegistry::with_builtins();
        let entry = Entry::instantiate(Arc::new(compiled("sleep")), &commands, None);
        let completion = entry.completion();
        std::thread::spawn(move || {
            completion.set_result("status", QsValue::from("done"));
            completion.finish();
        })
        .join()
        .expect("worker should finish");
        assert!(entry.is_finished());
        assert_eq!(entry.result("status"), Some(QsValue::from("done")));
    }
}
