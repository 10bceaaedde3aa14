use std::collections::BTreeMap;
use std::sync::Arc;

use qs_core::{QsValue, ScriptQueueError};

use super::condition::evaluate_condition;
use super::list_items;
use crate::command::{invalid_arguments, Command, CommandArgs, ResolvedArguments};
use crate::context::CommandContext;
use crate::entry::Entry;

pub const DISPATCH_MISSING_BLOCK: &str = "DISPATCH_MISSING_BLOCK";
pub const DISPATCH_NO_ACTIVE_LOOP: &str = "DISPATCH_NO_ACTIVE_LOOP";
pub const DISPATCH_INVALID_GUARD: &str = "DISPATCH_INVALID_GUARD";

const DEFAULT_LOOP_NAME: &str = "value";
const LOOP_INDEX: &str = "loop_index";

fn condition_args(args: &ResolvedArguments) -> CommandArgs {
    BTreeMap::from([("condition".to_string(), QsValue::Array(args.values()))])
}

fn condition_of(args: &CommandArgs) -> Vec<QsValue> {
    match args.get("condition") {
        Some(QsValue::Array(values)) => values.clone(),
        _ => Vec::new(),
    }
}

fn missing_block(command: &str) -> ScriptQueueError {
    ScriptQueueError::new(
        DISPATCH_MISSING_BLOCK,
        format!("\"{}\" needs a block to run.", command),
    )
}

/// Picks the first block whose guard passes: the command's own condition,
/// then each `else if <cond>` and finally a bare `else`.
pub(super) struct IfCommand;

impl Command for IfCommand {
    fn name(&self) -> &str {
        "if"
    }

    fn usage(&self) -> &str {
        "if <value> [<op> <value>]: ... else if <value>: ... else: ..."
    }

    fn required_args(&self) -> usize {
        1
    }

    fn requires_block(&self) -> bool {
        true
    }

    fn continuations(&self) -> &[&'static str] {
        &["else"]
    }

    fn parse(&self, args: &ResolvedArguments) -> Result<CommandArgs, ScriptQueueError> {
        Ok(condition_args(args))
    }

    fn execute(&self, ctx: &mut CommandContext<'_>, args: CommandArgs) -> Result<(), ScriptQueueError> {
        let entry = Arc::clone(ctx.entry());
        let blocks = entry.blocks();
        let Some(first) = blocks.first() else {
            return Err(missing_block("if"));
        };
        if evaluate_condition(&condition_of(&args))? {
            ctx.inject_body(&entry, &first.body, false);
            return Ok(());
        }
        for block in &blocks[1..] {
            let passes = match block.guard.split_first() {
                None => true,
                Some((marker, rest))
                    if marker.prefix.is_none() && marker.raw.eq_ignore_ascii_case("if") =>
                {
                    if rest.is_empty() {
                        return Err(ScriptQueueError::new(
                            DISPATCH_INVALID_GUARD,
                            "\"else if\" needs a condition.",
                        ));
                    }
                    evaluate_condition(&ctx.resolve(rest)?)?
                }
                Some((marker, _)) => {
                    return Err(ScriptQueueError::new(
                        DISPATCH_INVALID_GUARD,
                        format!("Unexpected \"{} {}\" block.", block.label, marker.raw),
                    ))
                }
            };
            if passes {
                ctx.inject_body(&entry, &block.body, false);
                return Ok(());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopControl {
    Stop,
    Next,
}

fn loop_control(args: &ResolvedArguments) -> Option<LoopControl> {
    if args.len() != 1 {
        return None;
    }
    let first = args.iter().next()?;
    if first.is_word("stop") {
        Some(LoopControl::Stop)
    } else if first.is_word("next") {
        Some(LoopControl::Next)
    } else {
        None
    }
}

fn control_args(control: LoopControl) -> CommandArgs {
    let word = match control {
        LoopControl::Stop => "stop",
        LoopControl::Next => "next",
    };
    BTreeMap::from([("control".to_string(), QsValue::from(word))])
}

/// Handles `<loop> stop` and `<loop> next` by discarding pending entries up
/// to the innermost callback of that loop (inclusive for stop).
fn apply_control(
    ctx: &mut CommandContext<'_>,
    command: &str,
    args: &CommandArgs,
) -> Option<Result<(), ScriptQueueError>> {
    let word = args.get("control")?.to_string();
    let stop = word == "stop";
    let found = ctx.queue_mut().drain_until(
        |entry| entry.is_callback() && entry.command_name().eq_ignore_ascii_case(command),
        stop,
    );
    if found {
        return Some(Ok(()));
    }
    Some(Err(ScriptQueueError::new(
        DISPATCH_NO_ACTIVE_LOOP,
        format!("No active {} loop to {}.", command, word),
    )))
}

/// The loop entry that owns the iteration state: the entry itself on the
/// first run, its owner when re-entered through a callback.
fn loop_owner(entry: &Arc<Entry>) -> Result<Arc<Entry>, ScriptQueueError> {
    if !entry.is_callback() {
        return Ok(Arc::clone(entry));
    }
    entry.owner().cloned().ok_or_else(|| {
        ScriptQueueError::new(DISPATCH_NO_ACTIVE_LOOP, "Loop callback lost its owner.")
    })
}

fn next_index(owner: &Entry, first_run: bool) -> f64 {
    if first_run {
        return 1.0;
    }
    owner
        .scratch("index")
        .and_then(|index| index.as_number())
        .unwrap_or(0.0)
        + 1.0
}

fn loop_name(args: &ResolvedArguments) -> String {
    args.prefixed("as")
        .map(|item| item.text().to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_LOOP_NAME.to_string())
}

fn run_iteration(ctx: &mut CommandContext<'_>, owner: &Arc<Entry>, index: f64) {
    owner.set_scratch("index", QsValue::Number(index));
    ctx.define(LOOP_INDEX, QsValue::Number(index));
    if let Some(block) = owner.blocks().first() {
        ctx.inject_body(owner, &block.body, true);
    }
}

pub(super) struct WhileCommand;

impl Command for WhileCommand {
    fn name(&self) -> &str {
        "while"
    }

    fn usage(&self) -> &str {
        "while <value> [<op> <value>]: ... | while stop | while next"
    }

    fn required_args(&self) -> usize {
        1
    }

    fn parse(&self, args: &ResolvedArguments) -> Result<CommandArgs, ScriptQueueError> {
        Ok(match loop_control(args) {
            Some(control) => control_args(control),
            None => condition_args(args),
        })
    }

    fn execute(&self, ctx: &mut CommandContext<'_>, args: CommandArgs) -> Result<(), ScriptQueueError> {
        if let Some(result) = apply_control(ctx, "while", &args) {
            return result;
        }
        let entry = Arc::clone(ctx.entry());
        let owner = loop_owner(&entry)?;
        if owner.blocks().is_empty() {
            return Err(missing_block("while"));
        }
        if evaluate_condition(&condition_of(&args))? {
            let index = next_index(&owner, !entry.is_callback());
            run_iteration(ctx, &owner, index);
        }
        Ok(())
    }
}

pub(super) struct RepeatCommand;

impl Command for RepeatCommand {
    fn name(&self) -> &str {
        "repeat"
    }

    fn usage(&self) -> &str {
        "repeat <count> [as:<name>]: ... | repeat stop | repeat next"
    }

    fn required_args(&self) -> usize {
        1
    }

    fn parse(&self, args: &ResolvedArguments) -> Result<CommandArgs, ScriptQueueError> {
        if let Some(control) = loop_control(args) {
            return Ok(control_args(control));
        }
        let count = args
            .positional()
            .next()
            .and_then(|item| item.value.as_number())
            .ok_or_else(|| invalid_arguments("Repeat count must be a number."))?;
        if !count.is_finite() {
            return Err(invalid_arguments(format!(
                "Repeat count must be finite, got {}.",
                count
            )));
        }
        Ok(BTreeMap::from([
            ("count".to_string(), QsValue::Number(count.floor())),
            ("as".to_string(), QsValue::from(loop_name(args))),
        ]))
    }

    fn execute(&self, ctx: &mut CommandContext<'_>, args: CommandArgs) -> Result<(), ScriptQueueError> {
        if let Some(result) = apply_control(ctx, "repeat", &args) {
            return result;
        }
        let entry = Arc::clone(ctx.entry());
        let owner = loop_owner(&entry)?;
        if owner.blocks().is_empty() {
            return Err(missing_block("repeat"));
        }
        if !entry.is_callback() {
            let count = args.get("count").and_then(QsValue::as_number).unwrap_or(0.0);
            owner.set_scratch("count", QsValue::Number(count));
        }
        let count = owner
            .scratch("count")
            .and_then(|count| count.as_number())
            .unwrap_or(0.0);
        let index = next_index(&owner, !entry.is_callback());
        if index > count {
            return Ok(());
        }
        let name = args.get("as").map(ToString::to_string).unwrap_or_default();
        ctx.define(&name, QsValue::Number(index));
        run_iteration(ctx, &owner, index);
        Ok(())
    }
}

pub(super) struct ForeachCommand;

impl Command for ForeachCommand {
    fn name(&self) -> &str {
        "foreach"
    }

    fn usage(&self) -> &str {
        "foreach <list> [as:<name>]: ... | foreach stop | foreach next"
    }

    fn required_args(&self) -> usize {
        1
    }

    fn parse(&self, args: &ResolvedArguments) -> Result<CommandArgs, ScriptQueueError> {
        if let Some(control) = loop_control(args) {
            return Ok(control_args(control));
        }
        let list = args
            .positional()
            .next()
            .ok_or_else(|| invalid_arguments("Missing list to loop over."))?;
        Ok(BTreeMap::from([
            ("items".to_string(), QsValue::Array(list_items(&list.value))),
            ("as".to_string(), QsValue::from(loop_name(args))),
        ]))
    }

    fn execute(&self, ctx: &mut CommandContext<'_>, args: CommandArgs) -> Result<(), ScriptQueueError> {
        if let Some(result) = apply_control(ctx, "foreach", &args) {
            return result;
        }
        let entry = Arc::clone(ctx.entry());
        let owner = loop_owner(&entry)?;
        if owner.blocks().is_empty() {
            return Err(missing_block("foreach"));
        }
        if !entry.is_callback() {
            let items = args.get("items").cloned().unwrap_or(QsValue::Array(Vec::new()));
            owner.set_scratch("items", items);
        }
        let items = match owner.scratch("items") {
            Some(QsValue::Array(items)) => items,
            _ => Vec::new(),
        };
        let index = next_index(&owner, !entry.is_callback());
        let Some(item) = items.get(index as usize - 1) else {
            return Ok(());
        };
        let name = args.get("as").map(ToString::to_string).unwrap_or_default();
        ctx.define(&name, item.clone());
        run_iteration(ctx, &owner, index);
        Ok(())
    }
}
