use qs_core::{Block, CompiledEntry, SourceSpan};
use qs_parser::DocumentNode;

use crate::arguments::{compile_argument, tokenize, Token};
use crate::block_compile::{compile_braces, compile_program};
use crate::context::CompileContext;

pub(crate) const SAVE_PREFIX: &str = "save";

/// Structural children of a `- command:` line, if it opened one.
pub(crate) struct NestedSource<'n> {
    pub(crate) opens_block: bool,
    pub(crate) children: &'n [DocumentNode],
}

pub(crate) fn compile_line(
    text: &str,
    nested: Option<NestedSource<'_>>,
    location: &SourceSpan,
    ctx: &mut CompileContext<'_>,
) -> CompiledEntry {
    match tokenize(text) {
        Ok(tokens) if !tokens.is_empty() => compile_tokens(tokens, nested, location, ctx),
        Ok(_) => {
            let mut entry = empty_entry("", location, ctx);
            ctx.mark_broken(&mut entry, "COMPILE_EMPTY_COMMAND", "Empty command.".to_string());
            entry
        }
        Err(error) => {
            let name = text.split_whitespace().next().unwrap_or_default();
            let mut entry = empty_entry(name, location, ctx);
            entry.raw_arguments = text
                .split_whitespace()
                .skip(1)
                .map(ToString::to_string)
                .collect();
            ctx.mark_broken(&mut entry, &error.code, error.message);
            entry
        }
    }
}

/// Splits `^` (instant) and `~` (await) markers off the command token.
pub(crate) fn split_command_flags(raw: &str) -> (String, bool, bool) {
    let mut instant = false;
    let mut await_completion = false;
    let mut rest = raw;
    loop {
        if let Some(stripped) = rest.strip_prefix('^') {
            instant = true;
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('~') {
            await_completion = true;
            rest = stripped;
        } else {
            break;
        }
    }
    (rest.to_ascii_lowercase(), instant, await_completion)
}

fn empty_entry(command: &str, location: &SourceSpan, ctx: &CompileContext<'_>) -> CompiledEntry {
    let (command, instant, await_completion) = split_command_flags(command);
    CompiledEntry {
        command,
        raw_arguments: Vec::new(),
        arguments: Vec::new(),
        blocks: Vec::new(),
        instant,
        await_completion,
        broken: None,
        script: ctx.script.clone(),
        location: location.clone(),
    }
}

pub(crate) fn compile_tokens(
    tokens: Vec<Token>,
    nested: Option<NestedSource<'_>>,
    location: &SourceSpan,
    ctx: &mut CompileContext<'_>,
) -> CompiledEntry {
    let mut tokens = tokens.into_iter();
    let head = tokens.next().map(|token| token.raw).unwrap_or_default();
    let rest = tokens.collect::<Vec<_>>();

    let mut entry = empty_entry(&head, location, ctx);
    entry.raw_arguments = rest.iter().map(|token| token.raw.clone()).collect();

    if rest.iter().any(|token| token.is_bare("{")) {
        match compile_braces(&entry.command, &rest, location, ctx) {
            Ok((header, blocks)) => {
                entry.arguments = header.iter().map(compile_argument).collect();
                entry.blocks = blocks;
            }
            Err(error) => {
                entry.arguments = rest.iter().map(compile_argument).collect();
                ctx.mark_broken(&mut entry, &error.code, error.message);
            }
        }
    } else {
        entry.arguments = rest.iter().map(compile_argument).collect();
    }

    if let Some(nested) = nested {
        if nested.opens_block {
            if nested.children.is_empty() {
                let message = format!("Block of \"{}\" has no commands.", entry.command);
                ctx.mark_broken(&mut entry, "COMPILE_EMPTY_BLOCK", message);
            } else {
                let body = compile_program(nested.children, ctx);
                entry.blocks.push(Block {
                    label: entry.command.clone(),
                    guard: entry.arguments.clone(),
                    body,
                });
            }
        }
    }

    check_signature(&mut entry, ctx);
    entry
}

fn check_signature(entry: &mut CompiledEntry, ctx: &mut CompileContext<'_>) {
    let Some(signature) = ctx.signature(&entry.command) else {
        let message = if ctx.catalog.is_continuation_marker(&entry.command) {
            format!(
                "\"{}\" must directly follow the command it continues.",
                entry.command
            )
        } else {
            format!("Unknown command \"{}\".", entry.command)
        };
        let code = if ctx.catalog.is_continuation_marker(&entry.command) {
            "COMPILE_ORPHAN_CONTINUATION"
        } else {
            "COMPILE_UNKNOWN_COMMAND"
        };
        ctx.mark_broken(entry, code, message);
        return;
    };

    if entry.await_completion && !signature.holdable {
        let message = format!(
            "Command \"{}\" cannot be awaited with \"~\": it is not holdable.",
            entry.command
        );
        ctx.mark_broken(entry, "COMPILE_NOT_HOLDABLE", message);
    }
    if signature.forces_hold {
        entry.await_completion = true;
    }

    let provided = entry
        .arguments
        .iter()
        .filter(|argument| !argument.has_prefix(SAVE_PREFIX))
        .count();
    if provided < signature.required_args {
        let message = format!(
            "Command \"{}\" needs at least {} argument(s), got {}.",
            entry.command, signature.required_args, provided
        );
        ctx.mark_broken(entry, "COMPILE_MISSING_ARGUMENTS", message);
    }

    if signature.requires_block && entry.blocks.is_empty() && entry.broken.is_none() {
        let message = format!("Command \"{}\" needs a nested block.", entry.command);
        ctx.mark_broken(entry, "COMPILE_MISSING_BLOCK", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_command_flags_handles_both_markers_in_any_order() {
        assert_eq!(split_command_flags("Narrate"), ("narrate".to_string(), false, false));
        assert_eq!(split_command_flags("^wait"), ("wait".to_string(), true, false));
        assert_eq!(split_command_flags("~^sleep"), ("sleep".to_string(), true, true));
    }
}
