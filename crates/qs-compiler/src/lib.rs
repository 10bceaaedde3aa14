use std::collections::BTreeMap;

use log::debug;
use qs_core::{
    CommandCatalog, CompileDiagnostic, CompileProjectResult, CompiledEntry, ScriptQueueError,
    SourceSpan,
};
use qs_parser::{parse_script_document, DocumentNode};

mod arguments;
mod block_compile;
mod context;
mod entry_compile;
mod script_compile;

use context::CompileContext;
pub use script_compile::parse_speed;

pub const SOURCE_EXTENSION: &str = ".qs";

/// Compiles every `.qs` source of a project. Parse and compile problems of
/// one container become diagnostics; unrelated containers still load.
pub fn compile_project_from_sources(
    sources: &BTreeMap<String, String>,
    catalog: &dyn CommandCatalog,
) -> Result<CompileProjectResult, ScriptQueueError> {
    let mut scripts = BTreeMap::new();
    let mut diagnostics = Vec::new();

    for (path, text) in sources {
        if !path.ends_with(SOURCE_EXTENSION) {
            return Err(ScriptQueueError::new(
                "SOURCE_KIND_UNSUPPORTED",
                format!("Unsupported source extension: {}", path),
            ));
        }

        let document = match parse_script_document(text) {
            Ok(document) => document,
            Err(error) => {
                log::warn!("[{}] {}", path, error);
                diagnostics.push(CompileDiagnostic {
                    script: path.clone(),
                    error,
                });
                continue;
            }
        };

        for node in &document.nodes {
            let DocumentNode::Section(section) = node else {
                let location = match node {
                    DocumentNode::Value(value) => value.location.clone(),
                    DocumentNode::Command(line) => line.location.clone(),
                    DocumentNode::Section(section) => section.location.clone(),
                };
                diagnostics.push(CompileDiagnostic {
                    script: path.clone(),
                    error: ScriptQueueError::with_span(
                        "COMPILE_UNEXPECTED_NODE",
                        "Only \"name:\" containers are allowed at the top level.",
                        location,
                    ),
                });
                continue;
            };

            let mut ctx = CompileContext::new(catalog, section.key.clone());
            let compiled = script_compile::compile_container(section, &mut ctx);
            diagnostics.append(&mut ctx.diagnostics);
            let Some(container) = compiled else {
                continue;
            };

            if scripts.contains_key(&container.name) {
                diagnostics.push(CompileDiagnostic {
                    script: container.name.clone(),
                    error: ScriptQueueError::with_span(
                        "COMPILE_DUPLICATE_SCRIPT",
                        format!(
                            "Script \"{}\" in {} is already defined; keeping the first.",
                            container.name, path
                        ),
                        container.location.clone(),
                    ),
                });
                continue;
            }
            debug!(
                "compiled script \"{}\" ({} entries)",
                container.name,
                container.script.len()
            );
            scripts.insert(container.name.clone(), container);
        }
    }

    Ok(CompileProjectResult {
        scripts,
        diagnostics,
    })
}

/// Compiles ad-hoc command lines (no leading `-`) into a program owned by
/// `script`, for hosts that build queues outside of script files.
pub fn compile_commands(
    lines: &[&str],
    script: &str,
    catalog: &dyn CommandCatalog,
) -> (Vec<CompiledEntry>, Vec<CompileDiagnostic>) {
    let source = lines
        .iter()
        .map(|line| format!("- {}", line))
        .collect::<Vec<_>>()
        .join("\n");
    let mut ctx = CompileContext::new(catalog, script);
    let program = match parse_script_document(&source) {
        Ok(document) => block_compile::compile_program(&document.nodes, &mut ctx),
        Err(error) => {
            ctx.report(error);
            Vec::new()
        }
    };
    (program, ctx.diagnostics)
}

/// Compiles one command line, brace blocks included.
pub fn compile_command_line(
    text: &str,
    script: &str,
    catalog: &dyn CommandCatalog,
) -> (CompiledEntry, Vec<CompileDiagnostic>) {
    let mut ctx = CompileContext::new(catalog, script);
    let entry = entry_compile::compile_line(text, None, &SourceSpan::synthetic(), &mut ctx);
    (entry, ctx.diagnostics)
}
