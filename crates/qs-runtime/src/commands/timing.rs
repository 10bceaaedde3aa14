use std::collections::BTreeMap;
use std::thread;

use qs_core::{QsValue, ScriptQueueError};

use super::{duration_arg, duration_value, value_duration};
use crate::command::{invalid_arguments, Command, CommandArgs, ResolvedArguments};
use crate::context::CommandContext;

pub const SLEEP_SPAWN_FAILED: &str = "SLEEP_SPAWN_FAILED";

fn parse_duration_arg(args: &ResolvedArguments) -> Result<CommandArgs, ScriptQueueError> {
    let first = args
        .positional()
        .next()
        .ok_or_else(|| invalid_arguments("Missing duration."))?;
    Ok(BTreeMap::from([(
        "duration".to_string(),
        duration_value(duration_arg(&first.value)?),
    )]))
}

/// Suspends the queue on the logical clock.
pub(super) struct WaitCommand;

impl Command for WaitCommand {
    fn name(&self) -> &str {
        "wait"
    }

    fn usage(&self) -> &str {
        "wait <duration>"
    }

    fn required_args(&self) -> usize {
        1
    }

    fn parse(&self, args: &ResolvedArguments) -> Result<CommandArgs, ScriptQueueError> {
        parse_duration_arg(args)
    }

    fn execute(&self, ctx: &mut CommandContext<'_>, args: CommandArgs) -> Result<(), ScriptQueueError> {
        let duration = value_duration(args.get("duration")).unwrap_or_default();
        let now = ctx.now();
        ctx.queue_mut().delay(duration, now);
        Ok(())
    }
}

/// Finishes its entry after a wall-clock sleep on a worker thread. Use it
/// with `~` to make the queue wait for it.
pub(super) struct SleepCommand;

impl Command for SleepCommand {
    fn name(&self) -> &str {
        "sleep"
    }

    fn usage(&self) -> &str {
        "~sleep <duration>"
    }

    fn required_args(&self) -> usize {
        1
    }

    fn is_holdable(&self) -> bool {
        true
    }

    fn parse(&self, args: &ResolvedArguments) -> Result<CommandArgs, ScriptQueueError> {
        parse_duration_arg(args)
    }

    fn execute(&self, ctx: &mut CommandContext<'_>, args: CommandArgs) -> Result<(), ScriptQueueError> {
        let duration = value_duration(args.get("duration")).unwrap_or_default();
        let completion = ctx.completion();
        thread::Builder::new()
            .name(format!("qs-sleep-{}", ctx.queue_id()))
            .spawn(move || {
                thread::sleep(duration);
                completion.set_result("slept_ms", QsValue::Number(duration.as_millis() as f64));
                completion.finish();
            })
            .map(|_| ())
            .map_err(|error| ScriptQueueError::new(SLEEP_SPAWN_FAILED, error.to_string()))
    }
}
