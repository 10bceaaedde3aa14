use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{debug, info};
use qs_api::{compile_project, create_engine, resolve_entry_script, CreateEngineOptions};
use qs_core::ScriptQueueError;
use qs_runtime::{CommandRegistry, QueueOptions, QueueSummary, ScriptEngine, ScriptReporter};
use serde::Serialize;

mod cli_args;
mod error_map;
mod reporter;
mod source_loader;

pub(crate) use cli_args::{CheckArgs, Cli, Mode, RunArgs};
pub(crate) use error_map::{
    emit_error, json_string, map_cli_dump, map_cli_source_path, map_cli_source_read,
    map_cli_source_scan,
};
pub(crate) use reporter::StdoutReporter;
pub(crate) use source_loader::ScriptProject;

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => return error.exit_code(),
    };
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

fn run(cli: Cli) -> Result<i32, ScriptQueueError> {
    match cli.command {
        Mode::Run(args) => run_scripts(args),
        Mode::Check(args) => check_scripts(args),
    }
}

fn init_logging(level: Option<&str>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    // A second init in the same process (tests) keeps the first logger.
    let _ = builder.try_init();
}

fn run_scripts(args: RunArgs) -> Result<i32, ScriptQueueError> {
    init_logging(args.log_level.as_deref());
    let project = ScriptProject::open(&args.scripts_dir)?;
    info!(
        "loaded {} source file(s) from {}",
        project.file_count(),
        project.root.display()
    );
    let reporter = Arc::new(StdoutReporter::default());
    let sink: Arc<dyn ScriptReporter> = reporter.clone();
    let loaded = create_engine(CreateEngineOptions {
        sources: project.sources,
        reporter: Some(sink),
        tick_interval: args.tick_ms.map(Duration::from_millis),
        random_seed: args.seed,
        strict: args.strict,
        ..CreateEngineOptions::default()
    })?;
    for diagnostic in &loaded.diagnostics {
        print_diagnostic(&diagnostic.script, &diagnostic.error);
    }

    let engine = loaded.engine;
    let entry_script = resolve_entry_script(&engine, args.entry_script.as_deref())?;
    let queue = engine.create_queue(&entry_script, QueueOptions::default())?;
    let queue_id = queue.id().to_string();
    info!("starting {} as {}", entry_script, queue_id);
    if engine.start(queue).is_none() {
        debug!("{} has nothing to run", entry_script);
    }

    let mut ticks = 0usize;
    loop {
        if args.dump_queues {
            dump_queues(&engine, ticks)?;
        }
        if engine.active_queue_count() == 0 || ticks >= args.max_ticks {
            break;
        }
        engine.tick();
        ticks += 1;
    }

    if engine.active_queue_count() > 0 {
        return Err(ScriptQueueError::new(
            "CLI_RUN_MAX_TICKS",
            format!(
                "{} queue(s) still active after {} ticks.",
                engine.active_queue_count(),
                ticks
            ),
        ));
    }

    println!("RESULT:OK");
    println!("ENTRY_QUEUE:{}", queue_id);
    println!("TICKS:{}", ticks);
    println!("QUEUES_CREATED:{}", engine.total_queues_created());
    println!("OUTPUT_LINES:{}", reporter.output_count());
    println!("SCRIPT_ERRORS:{}", reporter.error_count());
    Ok(0)
}

fn check_scripts(args: CheckArgs) -> Result<i32, ScriptQueueError> {
    init_logging(args.log_level.as_deref());
    let project = ScriptProject::open(&args.scripts_dir)?;
    let compiled = compile_project(&project.sources, &CommandRegistry::with_builtins())?;
    println!("SOURCE_FILES:{}", project.file_count());
    for name in compiled.scripts.keys() {
        println!("SCRIPT:{}", name);
    }
    for diagnostic in &compiled.diagnostics {
        print_diagnostic(&diagnostic.script, &diagnostic.error);
    }

    if let Some(first) = compiled.diagnostics.first() {
        return Err(ScriptQueueError::new(
            "CLI_CHECK_FAILED",
            format!(
                "{} script(s) failed to compile; first: {}",
                compiled.diagnostics.len(),
                first.error
            ),
        ));
    }

    println!("RESULT:OK");
    Ok(0)
}

fn print_diagnostic(script: &str, error: &ScriptQueueError) {
    let line = error
        .line()
        .map(|line| line.to_string())
        .unwrap_or_default();
    println!(
        "DIAGNOSTIC:{}:{}:{}:{}",
        script,
        line,
        error.code,
        json_string(&error.message)
    );
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueueDump<'a> {
    tick: usize,
    clock_ms: u64,
    queues: &'a [QueueSummary],
}

fn dump_queues(engine: &ScriptEngine, tick: usize) -> Result<(), ScriptQueueError> {
    let queues = engine.list_queues();
    let payload = QueueDump {
        tick,
        clock_ms: engine.now().as_millis() as u64,
        queues: &queues,
    };
    let json = serde_json::to_string(&payload).map_err(map_cli_dump)?;
    println!("QUEUES_JSON:{}", json);
    Ok(())
}

#[cfg(test)]
mod cli_test_support;
#[cfg(test)]
mod tests;
