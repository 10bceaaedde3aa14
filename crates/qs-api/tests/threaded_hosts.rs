use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use qs_api::{create_engine, run_until_idle, CreateEngineOptions};
use qs_core::{QsValue, ScriptQueueError};
use qs_runtime::{
    Command, CommandArgs, CommandContext, CommandRegistry, EntryCompletion, QueueOptions,
    RecordingReporter, ResolvedArguments, ScriptReporter,
};

struct FetchCommand {
    waiting: Arc<Mutex<Vec<EntryCompletion>>>,
}

impl Command for FetchCommand {
    fn name(&self) -> &str {
        "fetch"
    }

    fn usage(&self) -> &str {
        "~fetch"
    }

    fn is_holdable(&self) -> bool {
        true
    }

    fn forces_hold(&self) -> bool {
        true
    }

    fn parse(&self, _args: &ResolvedArguments) -> Result<CommandArgs, ScriptQueueError> {
        Ok(CommandArgs::new())
    }

    fn execute(&self, ctx: &mut CommandContext<'_>, _args: CommandArgs) -> Result<(), ScriptQueueError> {
        self.waiting.lock().push(ctx.completion());
        Ok(())
    }
}

const SOURCE: &str = r#"
main:
  script:
  - fetch save:response
  - narrate <who> got <saved.response.body>
"#;

#[test]
fn completions_from_a_worker_thread_release_waiting_queues() {
    let waiting = Arc::new(Mutex::new(Vec::new()));
    let mut commands = CommandRegistry::with_builtins();
    commands.register(Arc::new(FetchCommand {
        waiting: Arc::clone(&waiting),
    }));
    let reporter = Arc::new(RecordingReporter::new());
    let sink: Arc<dyn ScriptReporter> = reporter.clone();
    let loaded = create_engine(CreateEngineOptions {
        sources: BTreeMap::from([("main.qs".to_string(), SOURCE.to_string())]),
        commands: Some(commands),
        reporter: Some(sink),
        random_seed: Some(3),
        strict: true,
        ..CreateEngineOptions::default()
    })
    .expect("engine should build");
    let engine = loaded.engine;

    for who in ["ada", "bob", "cy"] {
        engine
            .start_script("main", QueueOptions::default().with_definition("who", who))
            .expect("script should exist")
            .expect("queue should start");
    }
    assert_eq!(engine.active_queue_count(), 3);
    assert!(reporter.output().is_empty());

    let worker_waiting = Arc::clone(&waiting);
    let worker = thread::spawn(move || {
        let completions = std::mem::take(&mut *worker_waiting.lock());
        for (index, completion) in completions.into_iter().enumerate() {
            thread::sleep(Duration::from_millis(2));
            completion.set_result("body", QsValue::Number(index as f64));
            completion.finish();
        }
    });

    let ticker_engine = engine.clone();
    let ticker = thread::spawn(move || {
        for _ in 0..2_000 {
            if ticker_engine.active_queue_count() == 0 {
                break;
            }
            ticker_engine.tick();
            thread::sleep(Duration::from_millis(1));
        }
    });
    worker.join().expect("worker should finish");
    ticker.join().expect("ticker should finish");

    assert_eq!(run_until_idle(&engine, 10), Some(0));
    let mut output = reporter.output();
    output.sort();
    assert_eq!(output, vec!["ada got 0", "bob got 1", "cy got 2"]);
}
