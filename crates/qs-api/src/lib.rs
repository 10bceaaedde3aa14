use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use qs_compiler::compile_project_from_sources;
use qs_core::{CompileDiagnostic, CompileProjectResult, QueueSpeed, ScriptQueueError};
use qs_runtime::{
    CommandRegistry, EngineOptions, QueueOptions, ScriptEngine, ScriptReporter, TagResolver,
};

#[derive(Clone, Default)]
pub struct CreateEngineOptions {
    /// `.qs` sources keyed by path.
    pub sources: BTreeMap<String, String>,
    pub commands: Option<CommandRegistry>,
    pub tag_resolver: Option<Arc<dyn TagResolver>>,
    pub reporter: Option<Arc<dyn ScriptReporter>>,
    pub tick_interval: Option<Duration>,
    pub default_speed: Option<QueueSpeed>,
    pub random_seed: Option<u32>,
    pub step_limit: Option<usize>,
    /// Refuse to build an engine when any container failed to compile.
    pub strict: bool,
}

/// An engine with its scripts loaded, plus whatever failed to compile.
pub struct LoadedEngine {
    pub engine: ScriptEngine,
    pub diagnostics: Vec<CompileDiagnostic>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub queue_id: Option<String>,
    pub ticks: usize,
    pub completed: bool,
}

pub fn compile_project(
    sources: &BTreeMap<String, String>,
    commands: &CommandRegistry,
) -> Result<CompileProjectResult, ScriptQueueError> {
    compile_project_from_sources(sources, commands)
}

pub fn create_engine(options: CreateEngineOptions) -> Result<LoadedEngine, ScriptQueueError> {
    let commands = options
        .commands
        .unwrap_or_else(CommandRegistry::with_builtins);
    let compiled = compile_project(&options.sources, &commands)?;
    for diagnostic in &compiled.diagnostics {
        warn!("{}: {}", diagnostic.script, diagnostic.error);
    }
    if options.strict {
        if let Some(first) = compiled.diagnostics.first() {
            return Err(first.error.clone());
        }
    }

    let engine = ScriptEngine::new(EngineOptions {
        tick_interval: options.tick_interval,
        default_speed: options.default_speed,
        commands: Some(commands),
        tag_resolver: options.tag_resolver,
        reporter: options.reporter,
        random_seed: options.random_seed,
        step_limit: options.step_limit,
    });
    engine.load_scripts(compiled.scripts.into_values());
    Ok(LoadedEngine {
        engine,
        diagnostics: compiled.diagnostics,
    })
}

/// Picks `explicit` when given, otherwise the script named `main`.
pub fn resolve_entry_script(
    engine: &ScriptEngine,
    explicit: Option<&str>,
) -> Result<String, ScriptQueueError> {
    if let Some(entry) = explicit {
        if engine.script(entry).is_none() {
            return Err(ScriptQueueError::new(
                "API_ENTRY_SCRIPT_NOT_FOUND",
                format!("Entry script \"{}\" is not loaded.", entry),
            ));
        }
        return Ok(entry.to_ascii_lowercase());
    }

    if engine.script("main").is_some() {
        return Ok("main".to_string());
    }

    Err(ScriptQueueError::new(
        "API_ENTRY_MAIN_NOT_FOUND",
        "Expected a script named \"main\" as default entry.",
    ))
}

/// Starts `script` and ticks the engine until its queue is gone or
/// `max_ticks` ticks have passed.
pub fn run_script(
    engine: &ScriptEngine,
    script: &str,
    options: QueueOptions,
    max_ticks: usize,
) -> Result<RunOutcome, ScriptQueueError> {
    let queue = engine.create_queue(script, options)?;
    let queue_id = queue.id().to_string();
    if engine.start(queue).is_none() {
        debug!("script \"{}\" has nothing to run", script);
        return Ok(RunOutcome {
            queue_id: None,
            ticks: 0,
            completed: true,
        });
    }

    let mut ticks = 0usize;
    while engine.queue(&queue_id).is_some() && ticks < max_ticks {
        engine.tick();
        ticks += 1;
    }
    Ok(RunOutcome {
        completed: engine.queue(&queue_id).is_none(),
        queue_id: Some(queue_id),
        ticks,
    })
}

/// Ticks until no queue is active; returns how many ticks that took, or
/// `None` when `max_ticks` ran out first.
pub fn run_until_idle(engine: &ScriptEngine, max_ticks: usize) -> Option<usize> {
    let mut ticks = 0usize;
    while engine.active_queue_count() > 0 {
        if ticks >= max_ticks {
            return None;
        }
        engine.tick();
        ticks += 1;
    }
    Some(ticks)
}
