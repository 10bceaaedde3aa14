mod command;
pub mod commands;
mod context;
mod dispatcher;
mod engine;
mod entry;
mod queue;
mod registry;
mod report;
mod rng;
mod summary;
mod tags;

pub use command::{
    invalid_arguments, Command, CommandArgs, CommandRegistry, ResolvedArgument,
    ResolvedArguments, DISPATCH_INVALID_ARGUMENTS,
};
pub use context::CommandContext;
pub use dispatcher::{DISPATCH_BROKEN_ENTRY, DISPATCH_PANIC};
pub use engine::{EngineOptions, RevolveOutcome, ScriptEngine, QUEUE_SCRIPT_NOT_FOUND};
pub use entry::{ArgumentSlot, Entry, EntryCompletion};
pub use queue::{CompletionCallback, Queue, QueueMode, QueueOptions, QueueState};
pub use registry::{QueueHandle, QueueRegistry};
pub use report::{ErrorReport, LogReporter, RecordingReporter, ScriptReporter};
pub use summary::QueueSummary;
pub use tags::{RhaiTagResolver, TagEnvironment, TagResolver, TAG_RESOLVE_ERROR};
