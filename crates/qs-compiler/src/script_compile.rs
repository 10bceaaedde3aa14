use log::debug;
use qs_core::{parse_duration, QueueSpeed, ScriptContainer, ScriptQueueError};
use qs_parser::{DocumentNode, SectionNode};

use crate::block_compile::compile_program;
use crate::context::CompileContext;

pub(crate) const SCRIPT_SECTION: &str = "script";
pub(crate) const ON_COMPLETE_SECTION: &str = "on complete";

pub(crate) fn compile_container(
    section: &SectionNode,
    ctx: &mut CompileContext<'_>,
) -> Option<ScriptContainer> {
    let mut container = ScriptContainer {
        name: section.key.clone(),
        container_type: "task".to_string(),
        speed: None,
        definitions: Vec::new(),
        script: Vec::new(),
        on_complete: None,
        location: section.location.clone(),
    };
    let mut has_script = false;

    for child in &section.children {
        match child {
            DocumentNode::Value(value) => match value.key.as_str() {
                "type" => container.container_type = value.value.to_ascii_lowercase(),
                "speed" => match parse_speed(&value.value) {
                    Ok(speed) => container.speed = Some(speed),
                    Err(error) => ctx.report(ScriptQueueError::with_span(
                        error.code,
                        error.message,
                        value.location.clone(),
                    )),
                },
                "definitions" => {
                    container.definitions = value
                        .value
                        .split('|')
                        .map(|name| name.trim().to_ascii_lowercase())
                        .filter(|name| !name.is_empty())
                        .collect();
                }
                other => debug!("[{}] ignoring key \"{}\"", container.name, other),
            },
            DocumentNode::Section(child) if child.key == SCRIPT_SECTION => {
                has_script = true;
                container.script = compile_program(&child.children, ctx);
            }
            DocumentNode::Section(child) if child.key == ON_COMPLETE_SECTION => {
                let program = compile_program(&child.children, ctx);
                if !program.is_empty() {
                    container.on_complete = Some(program);
                }
            }
            DocumentNode::Section(child) => {
                debug!("[{}] ignoring section \"{}\"", container.name, child.key)
            }
            DocumentNode::Command(line) => ctx.report(ScriptQueueError::with_span(
                "COMPILE_UNEXPECTED_NODE",
                format!(
                    "Command \"{}\" must live inside a \"script:\" section.",
                    line.text
                ),
                line.location.clone(),
            )),
        }
    }

    if !has_script {
        ctx.report(ScriptQueueError::with_span(
            "COMPILE_MISSING_SCRIPT_SECTION",
            format!("Script \"{}\" has no \"script:\" section.", container.name),
            container.location.clone(),
        ));
        return None;
    }
    Some(container)
}

pub fn parse_speed(raw: &str) -> Result<QueueSpeed, ScriptQueueError> {
    if raw.trim().eq_ignore_ascii_case("instant") {
        return Ok(QueueSpeed::Instant);
    }
    parse_duration(raw).map(QueueSpeed::Every)
}
