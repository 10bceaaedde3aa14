use std::collections::BTreeMap;

use log::debug;
use qs_core::{QsValue, ScriptQueueError};

use super::{
    duration_arg, duration_value, list_items, speed_arg, speed_value, value_duration, value_speed,
};
use crate::command::{invalid_arguments, Command, CommandArgs, ResolvedArguments};
use crate::context::CommandContext;
use crate::engine::QUEUE_SCRIPT_NOT_FOUND;
use crate::queue::QueueOptions;

const DEF_PREFIX: &str = "def.";

fn script_name(args: &ResolvedArguments) -> Result<String, ScriptQueueError> {
    args.positional()
        .next()
        .map(|item| item.text().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| invalid_arguments("Missing script name."))
}

fn unknown_script(name: &str) -> ScriptQueueError {
    ScriptQueueError::new(
        QUEUE_SCRIPT_NOT_FOUND,
        format!("Script \"{}\" is not loaded.", name),
    )
}

/// Splices another script's main program into this queue, ahead of
/// everything pending. `instantly` runs the spliced entries before returning.
pub(super) struct InjectCommand;

impl Command for InjectCommand {
    fn name(&self) -> &str {
        "inject"
    }

    fn usage(&self) -> &str {
        "inject <script> [instantly]"
    }

    fn required_args(&self) -> usize {
        1
    }

    fn parse(&self, args: &ResolvedArguments) -> Result<CommandArgs, ScriptQueueError> {
        let instantly = args.positional().skip(1).any(|item| item.is_word("instantly"));
        Ok(BTreeMap::from([
            ("script".to_string(), QsValue::from(script_name(args)?)),
            ("instantly".to_string(), QsValue::Bool(instantly)),
        ]))
    }

    fn execute(&self, ctx: &mut CommandContext<'_>, args: CommandArgs) -> Result<(), ScriptQueueError> {
        let name = args.get("script").map(ToString::to_string).unwrap_or_default();
        let container = ctx.engine().script(&name).ok_or_else(|| unknown_script(&name))?;
        let remaining = ctx.queue().size();
        let injected = ctx.inject_program(&container.script);
        debug!("[{}] injected {} entries from '{}'", ctx.queue_id(), injected, name);

        let instantly = args.get("instantly").map(QsValue::is_truthy).unwrap_or(false);
        if instantly {
            while ctx.queue().size() > remaining && !ctx.queue().stop_requested() {
                if !ctx.revolve_once_force() {
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Starts another script on a queue of its own. Definitions hand off via
/// `def.<name>:<value>` or `def:<a>|<b>` matched to the script's declared
/// definitions. The new queue id is kept as the `created_queue` result.
pub(super) struct RunCommand;

impl Command for RunCommand {
    fn name(&self) -> &str {
        "run"
    }

    fn usage(&self) -> &str {
        "run <script> [def.<name>:<value>] [def:<a>|<b>] [delay:<duration>] [speed:<speed>]"
    }

    fn required_args(&self) -> usize {
        1
    }

    fn parse(&self, args: &ResolvedArguments) -> Result<CommandArgs, ScriptQueueError> {
        let mut parsed = BTreeMap::from([(
            "script".to_string(),
            QsValue::from(script_name(args)?),
        )]);
        let mut named = BTreeMap::new();
        for item in args.iter() {
            let Some(prefix) = item.prefix.as_deref() else {
                continue;
            };
            if let Some(name) = prefix.strip_prefix(DEF_PREFIX) {
                named.insert(name.to_string(), item.value.clone());
            } else if prefix == "def" {
                parsed.insert("def_list".to_string(), QsValue::Array(list_items(&item.value)));
            } else if prefix == "delay" {
                parsed.insert("delay".to_string(), duration_value(duration_arg(&item.value)?));
            } else if prefix == "speed" {
                parsed.insert("speed".to_string(), speed_value(speed_arg(&item.value)?));
            } else {
                return Err(invalid_arguments(format!("Unknown run option \"{}:\".", prefix)));
            }
        }
        parsed.insert("definitions".to_string(), QsValue::Map(named));
        Ok(parsed)
    }

    fn execute(&self, ctx: &mut CommandContext<'_>, args: CommandArgs) -> Result<(), ScriptQueueError> {
        let name = args.get("script").map(ToString::to_string).unwrap_or_default();
        let engine = ctx.engine();
        let container = engine.script(&name).ok_or_else(|| unknown_script(&name))?;

        let mut options = QueueOptions {
            context: ctx.queue().context().clone(),
            ..QueueOptions::default()
        };
        if let Some(QsValue::Array(values)) = args.get("def_list") {
            for (declared, value) in container.definitions.iter().zip(values) {
                options.definitions.insert(declared.clone(), value.clone());
            }
        }
        if let Some(QsValue::Map(named)) = args.get("definitions") {
            for (definition, value) in named {
                options
                    .definitions
                    .insert(definition.to_ascii_lowercase(), value.clone());
            }
        }
        options.delay = value_duration(args.get("delay"));
        options.speed = value_speed(args.get("speed"));

        let queue = engine.create_queue(&name, options)?;
        ctx.entry()
            .set_result("created_queue", QsValue::from(queue.id()));
        debug!("[{}] run '{}' as {}", ctx.queue_id(), name, queue.id());
        engine.start(queue);
        Ok(())
    }
}
