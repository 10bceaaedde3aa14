use std::collections::BTreeSet;

use qs_core::{Block, CompiledEntry, ScriptQueueError, SourceSpan};
use qs_parser::{CommandLine, DocumentNode};

use crate::arguments::{compile_argument, tokenize, Token};
use crate::context::CompileContext;
use crate::entry_compile::{compile_line, compile_tokens, split_command_flags, NestedSource};

/// Compiles a structural child list into a flat program, folding
/// continuation lines (`else`) into the blocks of the entry they follow.
pub(crate) fn compile_program(
    nodes: &[DocumentNode],
    ctx: &mut CompileContext<'_>,
) -> Vec<CompiledEntry> {
    let lines = nodes
        .iter()
        .filter_map(|node| match node {
            DocumentNode::Command(line) => Some(line),
            DocumentNode::Section(section) => {
                ctx.report(ScriptQueueError::with_span(
                    "COMPILE_UNEXPECTED_NODE",
                    format!("Section \"{}\" is not allowed inside a program.", section.key),
                    section.location.clone(),
                ));
                None
            }
            DocumentNode::Value(value) => {
                ctx.report(ScriptQueueError::with_span(
                    "COMPILE_UNEXPECTED_NODE",
                    format!("Value \"{}\" is not allowed inside a program.", value.key),
                    value.location.clone(),
                ));
                None
            }
        })
        .collect::<Vec<_>>();

    let mut program = Vec::with_capacity(lines.len());
    let mut cursor = 0usize;
    while cursor < lines.len() {
        let line = lines[cursor];
        cursor += 1;
        let mut entry = compile_line(
            &line.text,
            Some(NestedSource {
                opens_block: line.opens_block,
                children: &line.children,
            }),
            &line.location,
            ctx,
        );

        let continuations = ctx
            .signature(&entry.command)
            .map(|signature| signature.continuations)
            .unwrap_or_default();
        if !continuations.is_empty() {
            while let Some(next) = lines.get(cursor) {
                let marker = continuation_marker(&next.text);
                if !continuations.iter().any(|candidate| *candidate == marker) {
                    break;
                }
                cursor += 1;
                attach_continuation(&mut entry, &marker, next, ctx);
            }
        }

        program.push(entry);
    }
    program
}

fn continuation_marker(text: &str) -> String {
    let head = text.split_whitespace().next().unwrap_or_default();
    split_command_flags(head).0
}

fn attach_continuation(
    owner: &mut CompiledEntry,
    marker: &str,
    line: &CommandLine,
    ctx: &mut CompileContext<'_>,
) {
    let tokens = match tokenize(&line.text) {
        Ok(tokens) => tokens,
        Err(error) => {
            ctx.report(ScriptQueueError::with_span(
                error.code,
                error.message,
                line.location.clone(),
            ));
            return;
        }
    };

    if owner
        .blocks
        .last()
        .map(|block| block.label == marker && block.is_unconditional())
        .unwrap_or(false)
    {
        ctx.report(ScriptQueueError::with_span(
            "COMPILE_BLOCK_AFTER_FALLBACK",
            format!(
                "\"{}\" cannot follow an unconditional \"{}\" block.",
                line.text, marker
            ),
            line.location.clone(),
        ));
        return;
    }

    if !line.opens_block || line.children.is_empty() {
        ctx.report(ScriptQueueError::with_span(
            "COMPILE_EMPTY_BLOCK",
            format!("Block of \"{}\" has no commands.", marker),
            line.location.clone(),
        ));
        return;
    }

    let guard = tokens.iter().skip(1).map(compile_argument).collect();
    let body = compile_program(&line.children, ctx);
    owner.blocks.push(Block {
        label: marker.to_string(),
        guard,
        body,
    });
}

/// Legacy single-line form: `cmd <guard> { - a - b } else { - c }`.
/// Returns the header arguments of the first block and every block.
pub(crate) fn compile_braces(
    command: &str,
    tokens: &[Token],
    location: &SourceSpan,
    ctx: &mut CompileContext<'_>,
) -> Result<(Vec<Token>, Vec<Block>), ScriptQueueError> {
    let mut depth = 0usize;
    let mut header: Vec<Token> = Vec::new();
    let mut first_header: Option<Vec<Token>> = None;
    let mut current_header: Vec<Token> = Vec::new();
    let mut commands: Vec<Vec<Token>> = Vec::new();
    let mut blocks = Vec::new();
    let mut seen_headers = BTreeSet::new();

    for token in tokens {
        if token.is_bare("{") {
            depth += 1;
            if depth == 1 {
                current_header = std::mem::take(&mut header);
                let key = if first_header.is_none() {
                    format!("{} {}", command, raw_text(&current_header))
                } else {
                    raw_text(&current_header)
                };
                if first_header.is_some() && current_header.is_empty() {
                    return Err(ScriptQueueError::with_span(
                        "COMPILE_MISSING_BLOCK_LABEL",
                        format!("Brace block of \"{}\" has no label.", command),
                        location.clone(),
                    ));
                }
                if !seen_headers.insert(key.to_ascii_lowercase()) {
                    return Err(ScriptQueueError::with_span(
                        "COMPILE_DUPLICATE_GUARD",
                        format!("Duplicate block \"{}\" in \"{}\".", key.trim(), command),
                        location.clone(),
                    ));
                }
                commands.clear();
                continue;
            }
        } else if token.is_bare("}") {
            if depth == 0 {
                return Err(unbalanced(command, location));
            }
            depth -= 1;
            if depth == 0 {
                let body = commands
                    .drain(..)
                    .map(|sub| compile_tokens(sub, None, location, ctx))
                    .collect::<Vec<_>>();
                if body.is_empty() {
                    return Err(ScriptQueueError::with_span(
                        "COMPILE_EMPTY_BLOCK",
                        format!("Brace block of \"{}\" has no commands.", command),
                        location.clone(),
                    ));
                }
                let block = if first_header.is_none() {
                    first_header = Some(current_header.clone());
                    Block {
                        label: command.to_string(),
                        guard: current_header.iter().map(compile_argument).collect(),
                        body,
                    }
                } else {
                    let label = split_command_flags(&current_header[0].value).0;
                    Block {
                        label,
                        guard: current_header.iter().skip(1).map(compile_argument).collect(),
                        body,
                    }
                };
                blocks.push(block);
                continue;
            }
        }

        if depth == 0 {
            header.push(token.clone());
        } else if depth == 1 && token.is_bare("-") {
            commands.push(Vec::new());
        } else {
            let Some(current) = commands.last_mut() else {
                return Err(ScriptQueueError::with_span(
                    "COMPILE_BRACE_MISSING_DASH",
                    format!(
                        "Commands inside braces of \"{}\" must start with \"-\".",
                        command
                    ),
                    location.clone(),
                ));
            };
            current.push(token.clone());
        }
    }

    if depth != 0 {
        return Err(unbalanced(command, location));
    }
    if !header.is_empty() {
        return Err(ScriptQueueError::with_span(
            "COMPILE_DANGLING_BRACE_TOKENS",
            format!(
                "Unexpected \"{}\" after the last block of \"{}\".",
                raw_text(&header),
                command
            ),
            location.clone(),
        ));
    }
    if let Some(empty) = commands_without_name(&blocks) {
        return Err(ScriptQueueError::with_span(
            "COMPILE_EMPTY_COMMAND",
            format!("Empty command inside block \"{}\".", empty),
            location.clone(),
        ));
    }

    Ok((first_header.unwrap_or_default(), blocks))
}

fn commands_without_name(blocks: &[Block]) -> Option<String> {
    blocks
        .iter()
        .find(|block| block.body.iter().any(|entry| entry.command.is_empty()))
        .map(|block| block.label.clone())
}

fn raw_text(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|token| token.raw.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn unbalanced(command: &str, location: &SourceSpan) -> ScriptQueueError {
    ScriptQueueError::with_span(
        "COMPILE_UNBALANCED_BRACES",
        format!("Unbalanced braces in \"{}\".", command),
        location.clone(),
    )
}
