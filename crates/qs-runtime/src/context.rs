use std::sync::Arc;
use std::time::Duration;

use qs_core::{CompiledArgument, CompiledEntry, QsValue, ScriptQueueError};

use crate::dispatcher::resolve_values;
use crate::engine::ScriptEngine;
use crate::entry::{Entry, EntryCompletion};
use crate::queue::Queue;

/// What a command sees while it executes: the engine, the queue that owns
/// the entry (already locked), and the entry itself.
pub struct CommandContext<'a> {
    engine: &'a ScriptEngine,
    queue: &'a mut Queue,
    entry: &'a Arc<Entry>,
}

impl<'a> CommandContext<'a> {
    pub(crate) fn new(engine: &'a ScriptEngine, queue: &'a mut Queue, entry: &'a Arc<Entry>) -> Self {
        Self {
            engine,
            queue,
            entry,
        }
    }

    pub fn engine(&self) -> &'a ScriptEngine {
        self.engine
    }

    pub fn queue(&self) -> &Queue {
        &*self.queue
    }

    pub fn queue_mut(&mut self) -> &mut Queue {
        &mut *self.queue
    }

    pub fn entry(&self) -> &'a Arc<Entry> {
        self.entry
    }

    pub fn queue_id(&self) -> &str {
        self.queue.id()
    }

    pub fn now(&self) -> Duration {
        self.engine.now()
    }

    pub fn define(&mut self, name: &str, value: QsValue) {
        self.queue.define(name, value);
    }

    pub fn output(&self, text: &str) {
        self.engine.reporter().report_output(self.queue.id(), text);
    }

    pub fn debug(&self, message: &str) {
        self.engine.reporter().report_debug(self.queue.id(), message);
    }

    pub fn completion(&self) -> EntryCompletion {
        self.entry.completion()
    }

    /// Resolves compiled arguments against this queue, e.g. the guard of an
    /// `else if` block.
    pub fn resolve(&self, arguments: &[CompiledArgument]) -> Result<Vec<QsValue>, ScriptQueueError> {
        resolve_values(self.engine, &*self.queue, arguments)
    }

    /// Queues fresh entries for `body` at the front, owned by `owner`. With
    /// `callback` a synthetic entry re-entering `owner` follows the body.
    pub fn inject_body(&mut self, owner: &Arc<Entry>, body: &[CompiledEntry], callback: bool) {
        let commands = self.engine.commands();
        let mut entries = Entry::instantiate_all(body, commands, Some(owner));
        if callback {
            entries.push(Entry::callback_for(owner, commands));
        }
        self.queue.inject(entries, 0);
    }

    /// Queues a fresh copy of `program` at the front without an owner.
    pub fn inject_program(&mut self, program: &[CompiledEntry]) -> usize {
        let entries = Entry::instantiate_all(program, self.engine.commands(), None);
        let count = entries.len();
        self.queue.inject(entries, 0);
        count
    }

    /// Executes the head of this queue right now, ignoring speed and pauses.
    pub fn revolve_once_force(&mut self) -> bool {
        let engine = self.engine;
        engine.revolve_once_force(&mut *self.queue)
    }
}
