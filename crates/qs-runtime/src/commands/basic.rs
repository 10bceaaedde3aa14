use std::collections::BTreeMap;

use qs_core::{QsValue, QueueSpeed, ScriptQueueError};

use super::{duration_arg, duration_value, speed_arg, speed_value, value_duration, value_speed};
use crate::command::{invalid_arguments, Command, CommandArgs, ResolvedArgument, ResolvedArguments};
use crate::context::CommandContext;

fn display_text(args: &ResolvedArguments) -> String {
    args.iter()
        .map(|item: &ResolvedArgument| match &item.prefix {
            Some(prefix) => format!("{}:{}", prefix, item.text()),
            None => item.text(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn text_args(args: &ResolvedArguments) -> CommandArgs {
    BTreeMap::from([("text".to_string(), QsValue::from(display_text(args)))])
}

fn text_of(args: &CommandArgs) -> String {
    args.get("text").map(ToString::to_string).unwrap_or_default()
}

pub(super) struct NarrateCommand;

impl Command for NarrateCommand {
    fn name(&self) -> &str {
        "narrate"
    }

    fn usage(&self) -> &str {
        "narrate <text>"
    }

    fn required_args(&self) -> usize {
        1
    }

    fn parse(&self, args: &ResolvedArguments) -> Result<CommandArgs, ScriptQueueError> {
        Ok(text_args(args))
    }

    fn execute(&self, ctx: &mut CommandContext<'_>, args: CommandArgs) -> Result<(), ScriptQueueError> {
        ctx.output(&text_of(&args));
        Ok(())
    }
}

pub(super) struct DebugCommand;

impl Command for DebugCommand {
    fn name(&self) -> &str {
        "debug"
    }

    fn usage(&self) -> &str {
        "debug <text>"
    }

    fn required_args(&self) -> usize {
        1
    }

    fn parse(&self, args: &ResolvedArguments) -> Result<CommandArgs, ScriptQueueError> {
        Ok(text_args(args))
    }

    fn execute(&self, ctx: &mut CommandContext<'_>, args: CommandArgs) -> Result<(), ScriptQueueError> {
        ctx.debug(&text_of(&args));
        Ok(())
    }
}

/// `define <name> <value>` or `define <name>:<value>`.
pub(super) struct DefineCommand;

impl Command for DefineCommand {
    fn name(&self) -> &str {
        "define"
    }

    fn usage(&self) -> &str {
        "define <name> <value> | define <name>:<value>"
    }

    fn required_args(&self) -> usize {
        1
    }

    fn parse(&self, args: &ResolvedArguments) -> Result<CommandArgs, ScriptQueueError> {
        let items = args.iter().collect::<Vec<_>>();
        let (name, value) = match items.as_slice() {
            [single] => match &single.prefix {
                Some(prefix) => (prefix.clone(), single.value.clone()),
                None => return Err(invalid_arguments("Missing definition value.")),
            },
            [name, value] => (name.text(), value.value.clone()),
            [name, rest @ ..] => (
                name.text(),
                QsValue::from(
                    rest.iter()
                        .map(|item| item.text())
                        .collect::<Vec<_>>()
                        .join(" "),
                ),
            ),
            [] => return Err(invalid_arguments("Missing definition name.")),
        };
        if name.trim().is_empty() {
            return Err(invalid_arguments("Definition name must not be empty."));
        }
        Ok(BTreeMap::from([
            ("name".to_string(), QsValue::from(name)),
            ("value".to_string(), value),
        ]))
    }

    fn execute(&self, ctx: &mut CommandContext<'_>, args: CommandArgs) -> Result<(), ScriptQueueError> {
        let name = args.get("name").map(ToString::to_string).unwrap_or_default();
        let value = args.get("value").cloned().unwrap_or(QsValue::from(""));
        ctx.define(&name, value);
        Ok(())
    }
}

pub(super) struct StopCommand;

impl Command for StopCommand {
    fn name(&self) -> &str {
        "stop"
    }

    fn usage(&self) -> &str {
        "stop"
    }

    fn parse(&self, _args: &ResolvedArguments) -> Result<CommandArgs, ScriptQueueError> {
        Ok(CommandArgs::new())
    }

    fn execute(&self, ctx: &mut CommandContext<'_>, _args: CommandArgs) -> Result<(), ScriptQueueError> {
        ctx.queue_mut().request_stop();
        Ok(())
    }
}

/// Controls the queue running it.
pub(super) struct QueueCommand;

impl Command for QueueCommand {
    fn name(&self) -> &str {
        "queue"
    }

    fn usage(&self) -> &str {
        "queue pause|resume|clear|stop | queue delay:<duration> | queue speed:<speed>"
    }

    fn required_args(&self) -> usize {
        1
    }

    fn parse(&self, args: &ResolvedArguments) -> Result<CommandArgs, ScriptQueueError> {
        if let Some(delay) = args.prefixed("delay") {
            return Ok(BTreeMap::from([
                ("action".to_string(), QsValue::from("delay")),
                ("duration".to_string(), duration_value(duration_arg(&delay.value)?)),
            ]));
        }
        if let Some(speed) = args.prefixed("speed") {
            let speed = speed_arg(&speed.value)?;
            return Ok(BTreeMap::from([
                ("action".to_string(), QsValue::from("speed")),
                ("speed".to_string(), speed_value(speed)),
            ]));
        }
        let action = args
            .positional()
            .next()
            .map(|item| item.text().to_ascii_lowercase())
            .ok_or_else(|| invalid_arguments("Missing queue action."))?;
        match action.as_str() {
            "pause" | "resume" | "clear" | "stop" => {
                Ok(BTreeMap::from([("action".to_string(), QsValue::from(action))]))
            }
            other => Err(invalid_arguments(format!("Unknown queue action \"{}\".", other))),
        }
    }

    fn execute(&self, ctx: &mut CommandContext<'_>, args: CommandArgs) -> Result<(), ScriptQueueError> {
        let action = args.get("action").map(ToString::to_string).unwrap_or_default();
        let duration = value_duration(args.get("duration")).unwrap_or_default();
        let speed = value_speed(args.get("speed")).unwrap_or(QueueSpeed::Instant);
        let now = ctx.now();
        let queue = ctx.queue_mut();
        match action.as_str() {
            "pause" => queue.pause(),
            "resume" => queue.resume(),
            "clear" => queue.clear(),
            "stop" => queue.request_stop(),
            "delay" => queue.delay(duration, now),
            "speed" => queue.set_speed(speed),
            _ => {}
        }
        Ok(())
    }
}
