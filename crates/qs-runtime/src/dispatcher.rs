use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::debug;
use qs_core::{CompiledArgument, QsValue, ScriptQueueError};

use crate::command::{Command, ResolvedArgument, ResolvedArguments, DISPATCH_INVALID_ARGUMENTS};
use crate::context::CommandContext;
use crate::engine::ScriptEngine;
use crate::entry::Entry;
use crate::queue::Queue;
use crate::report::ErrorReport;
use crate::tags::TagEnvironment;

pub const DISPATCH_BROKEN_ENTRY: &str = "DISPATCH_BROKEN_ENTRY";
pub const DISPATCH_PANIC: &str = "DISPATCH_PANIC";
pub const SAVE_PREFIX: &str = "save";

impl TagEnvironment for Queue {
    fn queue_id(&self) -> &str {
        self.id()
    }

    fn definitions(&self) -> &BTreeMap<String, QsValue> {
        Queue::definitions(self)
    }

    fn context(&self) -> &BTreeMap<String, QsValue> {
        Queue::context(self)
    }

    fn held_results(&self) -> BTreeMap<String, QsValue> {
        Queue::held_results(self)
    }
}

fn resolve_argument(
    engine: &ScriptEngine,
    queue: &Queue,
    argument: &CompiledArgument,
) -> Result<QsValue, ScriptQueueError> {
    if argument.needs_resolution() {
        return engine.resolver().resolve(&argument.chain, queue);
    }
    Ok(QsValue::String(
        argument.chain.as_literal().unwrap_or_default(),
    ))
}

pub(crate) fn resolve_values(
    engine: &ScriptEngine,
    queue: &Queue,
    arguments: &[CompiledArgument],
) -> Result<Vec<QsValue>, ScriptQueueError> {
    arguments
        .iter()
        .map(|argument| resolve_argument(engine, queue, argument))
        .collect()
}

/// Runs one entry. Every failure (broken entry, tag error, bad arguments,
/// command error or panic) is reported and contained here; the entry is
/// then marked finished so the queue never waits on it.
pub(crate) fn dispatch(engine: &ScriptEngine, queue: &mut Queue, entry: &Arc<Entry>) {
    if let Some(reason) = entry.broken_reason() {
        report(
            engine,
            queue,
            entry,
            &ScriptQueueError::new(DISPATCH_BROKEN_ENTRY, reason),
        );
        entry.finish();
        return;
    }
    let Some(command) = entry.handle().cloned() else {
        entry.finish();
        return;
    };

    debug!("[{}] {}", queue.id(), entry.command_line());
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        execute_entry(engine, queue, entry, command.as_ref())
    }));

    match outcome {
        Ok(Ok(saved_as)) => {
            if let Some(name) = saved_as {
                queue.hold_entry(&name, Arc::clone(entry));
            }
            if !command.is_holdable() {
                entry.finish();
            }
        }
        Ok(Err(error)) => {
            report(engine, queue, entry, &error);
            entry.finish();
        }
        Err(payload) => {
            let message = if let Some(text) = payload.downcast_ref::<&str>() {
                text.to_string()
            } else if let Some(text) = payload.downcast_ref::<String>() {
                text.clone()
            } else {
                "command panicked".to_string()
            };
            report(
                engine,
                queue,
                entry,
                &ScriptQueueError::new(DISPATCH_PANIC, message),
            );
            entry.finish();
        }
    }
}

fn execute_entry(
    engine: &ScriptEngine,
    queue: &mut Queue,
    entry: &Arc<Entry>,
    command: &dyn Command,
) -> Result<Option<String>, ScriptQueueError> {
    let mut saved_as = None;
    for slot in entry.arguments() {
        if slot.compiled().has_prefix(SAVE_PREFIX) {
            let value = resolve_argument(engine, queue, slot.compiled())?;
            slot.store(value.clone());
            saved_as = Some(value.to_string());
        }
    }

    let mut resolved = Vec::with_capacity(entry.arguments().len());
    for slot in entry.arguments() {
        let compiled = slot.compiled();
        if compiled.has_prefix(SAVE_PREFIX) {
            continue;
        }
        let value = resolve_argument(engine, queue, compiled)?;
        slot.store(value.clone());
        resolved.push(ResolvedArgument {
            prefix: compiled.prefix.clone(),
            raw: compiled.raw.clone(),
            value,
        });
    }
    let arguments = ResolvedArguments::new(resolved);

    if arguments.len() < command.required_args() {
        return Err(ScriptQueueError::new(
            DISPATCH_INVALID_ARGUMENTS,
            format!(
                "Expected at least {} argument(s), got {}. Usage: {}",
                command.required_args(),
                arguments.len(),
                command.usage()
            ),
        ));
    }
    let parsed = command.parse(&arguments).map_err(|error| {
        if error.code == DISPATCH_INVALID_ARGUMENTS {
            ScriptQueueError::new(
                error.code,
                format!("{} Usage: {}", error.message, command.usage()),
            )
        } else {
            error
        }
    })?;

    let mut ctx = CommandContext::new(engine, queue, entry);
    command.execute(&mut ctx, parsed)?;
    Ok(saved_as)
}

pub(crate) fn report(
    engine: &ScriptEngine,
    queue: &Queue,
    entry: &Entry,
    error: &ScriptQueueError,
) {
    let line = entry.line();
    engine.reporter().report_error(&ErrorReport {
        queue_id: queue.id().to_string(),
        command: entry.command_line(),
        script: entry.script().to_string(),
        line: (line > 0).then_some(line),
        code: error.code.clone(),
        message: error.message.clone(),
    });
}
