use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use qs_core::{CompiledEntry, QueueSpeed, ScriptContainer, ScriptQueueError, TICK};

use crate::command::CommandRegistry;
use crate::dispatcher::dispatch;
use crate::entry::Entry;
use crate::queue::{CompletionCallback, Queue, QueueOptions, QueueState};
use crate::registry::{QueueHandle, QueueRegistry};
use crate::report::{LogReporter, ScriptReporter};
use crate::rng::seed_from_clock;
use crate::summary::QueueSummary;
use crate::tags::{RhaiTagResolver, TagResolver};

pub const QUEUE_SCRIPT_NOT_FOUND: &str = "QUEUE_SCRIPT_NOT_FOUND";

const DEFAULT_STEP_LIMIT: usize = 100_000;

#[derive(Default)]
pub struct EngineOptions {
    /// Logical time added by each `tick`. Defaults to one 50ms tick.
    pub tick_interval: Option<Duration>,
    /// Speed of queues whose script and options name none.
    pub default_speed: Option<QueueSpeed>,
    pub commands: Option<CommandRegistry>,
    pub tag_resolver: Option<Arc<dyn TagResolver>>,
    pub reporter: Option<Arc<dyn ScriptReporter>>,
    pub random_seed: Option<u32>,
    /// Entries one revolve may run before the queue is forced to yield.
    pub step_limit: Option<usize>,
}

/// Why a revolve returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevolveOutcome {
    /// Waiting on time, a pause or an awaited entry; a later tick resumes it.
    Yielded,
    /// The pending list is empty.
    Exhausted,
    StopRequested,
    /// An instant queue cannot continue inline and must become timed.
    Promote,
}

enum DriveStep {
    Idle,
    Again,
    Promoted(Queue),
    Finished(String, Option<CompletionCallback>),
}

struct EngineShared {
    commands: CommandRegistry,
    resolver: Arc<dyn TagResolver>,
    reporter: Arc<dyn ScriptReporter>,
    scripts: RwLock<BTreeMap<String, Arc<ScriptContainer>>>,
    registry: QueueRegistry,
    clock_millis: AtomicU64,
    tick_interval: Duration,
    default_speed: QueueSpeed,
    step_limit: usize,
}

/// Owns loaded scripts, the queue registry and the logical clock. Cheap to
/// clone; clones share all state.
#[derive(Clone)]
pub struct ScriptEngine {
    shared: Arc<EngineShared>,
}

impl ScriptEngine {
    pub fn new(options: EngineOptions) -> Self {
        let tick_interval = options.tick_interval.unwrap_or(TICK);
        Self {
            shared: Arc::new(EngineShared {
                commands: options.commands.unwrap_or_else(CommandRegistry::with_builtins),
                resolver: options
                    .tag_resolver
                    .unwrap_or_else(|| Arc::new(RhaiTagResolver::new())),
                reporter: options.reporter.unwrap_or_else(|| Arc::new(LogReporter)),
                scripts: RwLock::new(BTreeMap::new()),
                registry: QueueRegistry::new(options.random_seed.unwrap_or_else(seed_from_clock)),
                clock_millis: AtomicU64::new(0),
                tick_interval,
                default_speed: options.default_speed.unwrap_or(QueueSpeed::Instant),
                step_limit: options.step_limit.unwrap_or(DEFAULT_STEP_LIMIT).max(1),
            }),
        }
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.shared.commands
    }

    pub fn resolver(&self) -> &dyn TagResolver {
        self.shared.resolver.as_ref()
    }

    pub fn reporter(&self) -> &dyn ScriptReporter {
        self.shared.reporter.as_ref()
    }

    pub fn tick_interval(&self) -> Duration {
        self.shared.tick_interval
    }

    pub fn now(&self) -> Duration {
        Duration::from_millis(self.shared.clock_millis.load(Ordering::SeqCst))
    }

    /// Adds or replaces scripts by name.
    pub fn load_scripts<I>(&self, scripts: I)
    where
        I: IntoIterator<Item = ScriptContainer>,
    {
        let mut loaded = self.shared.scripts.write();
        for script in scripts {
            debug!("loaded script '{}'", script.name);
            loaded.insert(script.name.to_ascii_lowercase(), Arc::new(script));
        }
    }

    pub fn script(&self, name: &str) -> Option<Arc<ScriptContainer>> {
        self.shared
            .scripts
            .read()
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    pub fn script_names(&self) -> Vec<String> {
        self.shared.scripts.read().keys().cloned().collect()
    }

    /// Builds a queue holding fresh entries for `script`'s main program.
    pub fn create_queue(
        &self,
        script: &str,
        options: QueueOptions,
    ) -> Result<Queue, ScriptQueueError> {
        let container = self.script(script).ok_or_else(|| {
            ScriptQueueError::new(
                QUEUE_SCRIPT_NOT_FOUND,
                format!("Script \"{}\" is not loaded.", script),
            )
        })?;
        let speed = options
            .speed
            .or(container.speed)
            .unwrap_or(self.shared.default_speed);
        let entries = Entry::instantiate_all(&container.script, &self.shared.commands, None);
        let (id, debug_id) = self.shared.registry.generate_id(&container.name);
        Ok(Queue::new(
            id,
            debug_id,
            Some(container),
            entries,
            speed,
            options,
        ))
    }

    /// Builds a queue from an ad-hoc program that belongs to no script.
    pub fn create_queue_from_program(
        &self,
        name: &str,
        program: &[CompiledEntry],
        options: QueueOptions,
    ) -> Queue {
        let speed = options.speed.unwrap_or(self.shared.default_speed);
        let entries = Entry::instantiate_all(program, &self.shared.commands, None);
        let (id, debug_id) = self.shared.registry.generate_id(name);
        Queue::new(id, debug_id, None, entries, speed, options)
    }

    /// Registers `queue` and runs it as far as it can go right now. Instant
    /// queues usually complete before this returns. Starting an empty queue
    /// does nothing and registers nothing.
    pub fn start(&self, mut queue: Queue) -> Option<QueueHandle> {
        if queue.is_empty() {
            debug!("[{}] not started: no entries", queue.id());
            self.shared.registry.release(queue.id());
            return None;
        }
        queue.mark_started(self.now());
        let id = queue.id().to_string();
        let handle = Arc::new(Mutex::new(queue));
        self.shared.registry.insert(&id, Arc::clone(&handle));
        debug!("[{}] started", id);
        Some(self.drive(handle))
    }

    pub fn start_script(
        &self,
        script: &str,
        options: QueueOptions,
    ) -> Result<Option<QueueHandle>, ScriptQueueError> {
        let queue = self.create_queue(script, options)?;
        Ok(self.start(queue))
    }

    pub fn queue(&self, id: &str) -> Option<QueueHandle> {
        self.shared.registry.get(id)
    }

    pub fn active_queue_count(&self) -> usize {
        self.shared.registry.len()
    }

    pub fn total_queues_created(&self) -> u64 {
        self.shared.registry.total_created()
    }

    /// Stops the queue: pending entries are dropped, its on-complete program
    /// still gets one run, then the callback fires. Must not be called from a
    /// command running on the same queue; commands use `Queue::request_stop`.
    pub fn stop(&self, handle: &QueueHandle) -> QueueHandle {
        handle.lock().request_stop();
        self.drive(Arc::clone(handle))
    }

    pub fn clear(&self, handle: &QueueHandle) {
        handle.lock().clear();
    }

    pub fn pause(&self, handle: &QueueHandle) {
        handle.lock().pause();
    }

    pub fn resume(&self, handle: &QueueHandle) {
        handle.lock().resume();
    }

    pub fn delay(&self, handle: &QueueHandle, delay: Duration) {
        let now = self.now();
        handle.lock().delay(delay, now);
    }

    /// Queues fresh entries for `program` at `position` in the queue.
    pub fn inject_entries(&self, handle: &QueueHandle, program: &[CompiledEntry], position: usize) {
        let entries = Entry::instantiate_all(program, &self.shared.commands, None);
        handle.lock().inject(entries, position);
    }

    pub fn hold_entry(&self, handle: &QueueHandle, name: &str, entry: Arc<Entry>) {
        handle.lock().hold_entry(name, entry);
    }

    pub fn held_entry(&self, handle: &QueueHandle, name: &str) -> Option<Arc<Entry>> {
        handle.lock().held_entry(name).cloned()
    }

    /// Advances the clock by one tick interval and revolves every timed queue.
    pub fn tick(&self) {
        self.tick_by(self.shared.tick_interval);
    }

    pub fn tick_by(&self, elapsed: Duration) {
        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.shared.clock_millis.fetch_add(millis, Ordering::SeqCst);
        self.poll();
    }

    /// Revolves timed queues without moving the clock. Queues locked by
    /// another thread are skipped until the next poll.
    pub fn poll(&self) {
        for (id, handle) in self.shared.registry.snapshot() {
            let ready = match handle.try_lock() {
                Some(queue) => queue.is_timed() && !queue.is_stopped(),
                None => {
                    debug!("[{}] busy, skipped this tick", id);
                    false
                }
            };
            if ready {
                self.drive(handle);
            }
        }
    }

    fn drive(&self, handle: QueueHandle) -> QueueHandle {
        let mut handle = handle;
        loop {
            let step = {
                let mut queue = handle.lock();
                self.drive_step(&mut queue)
            };
            match step {
                DriveStep::Idle => return handle,
                DriveStep::Again => continue,
                DriveStep::Promoted(promoted) => {
                    let id = promoted.id().to_string();
                    let promoted = Arc::new(Mutex::new(promoted));
                    self.shared.registry.replace(&id, Arc::clone(&promoted));
                    debug!("[{}] promoted to a timed queue", id);
                    handle = promoted;
                }
                DriveStep::Finished(id, callback) => {
                    self.shared.registry.remove(&id, &handle);
                    debug!("[{}] completed", id);
                    if let Some(callback) = callback {
                        callback();
                    }
                    return handle;
                }
            }
        }
    }

    fn drive_step(&self, queue: &mut Queue) -> DriveStep {
        if queue.is_stopped() {
            return DriveStep::Idle;
        }
        match self.revolve(queue) {
            RevolveOutcome::Yielded => DriveStep::Idle,
            RevolveOutcome::Promote => DriveStep::Promoted(queue.promote(self.now())),
            RevolveOutcome::Exhausted | RevolveOutcome::StopRequested => {
                queue.set_state(QueueState::Stopping);
                let on_complete = queue
                    .script()
                    .and_then(|script| script.on_complete.clone())
                    .filter(|program| !program.is_empty());
                match on_complete {
                    Some(program) if !queue.on_complete_appended() => {
                        debug!("[{}] running on complete", queue.id());
                        let entries =
                            Entry::instantiate_all(&program, &self.shared.commands, None);
                        queue.begin_on_complete(entries);
                        DriveStep::Again
                    }
                    _ => DriveStep::Finished(queue.id().to_string(), queue.finalize()),
                }
            }
        }
    }

    /// Runs as many entries of `queue` as its mode, speed and state allow.
    pub fn revolve(&self, queue: &mut Queue) -> RevolveOutcome {
        let mut steps = 0usize;
        loop {
            if queue.stop_requested() {
                return RevolveOutcome::StopRequested;
            }
            if queue.cleared_and_empty() {
                return RevolveOutcome::Exhausted;
            }
            if queue.promotion_requested() {
                return RevolveOutcome::Promote;
            }
            let now = self.now();
            match queue.state() {
                QueueState::Paused | QueueState::Stopped => return RevolveOutcome::Yielded,
                QueueState::DelayedUntil(until) => {
                    if now < until {
                        return RevolveOutcome::Yielded;
                    }
                    queue.set_state(QueueState::Running);
                }
                QueueState::PendingStart | QueueState::Running | QueueState::Stopping => {}
            }
            if queue.is_timed() && now < queue.next_revolve_at() {
                return RevolveOutcome::Yielded;
            }
            if let Some(last) = queue.last_executed() {
                if last.must_await() && !last.is_finished() {
                    if queue.is_timed() {
                        return RevolveOutcome::Yielded;
                    }
                    queue.request_promotion(None);
                    return RevolveOutcome::Promote;
                }
            }
            if steps >= self.shared.step_limit {
                warn!("[{}] yielded after {} entries in one revolve", queue.id(), steps);
                queue.set_next_revolve_at(now + self.shared.tick_interval);
                if queue.is_timed() {
                    return RevolveOutcome::Yielded;
                }
                queue.request_promotion(None);
                return RevolveOutcome::Promote;
            }
            let Some(entry) = queue.pop_front() else {
                return RevolveOutcome::Exhausted;
            };
            steps += 1;
            queue.set_last_executed(Arc::clone(&entry));
            dispatch(self, queue, &entry);

            let spaced = !(queue.speed().is_instant() || entry.is_instant());
            if queue.is_timed() && spaced && !queue.is_empty() {
                queue.set_next_revolve_at(now + queue.speed().spacing());
                return RevolveOutcome::Yielded;
            }
        }
    }

    /// Pops and dispatches the head entry regardless of speed, pause or
    /// delay. Returns false when nothing was pending.
    pub fn revolve_once_force(&self, queue: &mut Queue) -> bool {
        let Some(entry) = queue.pop_front() else {
            return false;
        };
        queue.set_last_executed(Arc::clone(&entry));
        dispatch(self, queue, &entry);
        true
    }

    pub fn list_queues(&self) -> Vec<QueueSummary> {
        self.shared
            .registry
            .snapshot()
            .into_iter()
            .filter_map(|(_, handle)| handle.try_lock().map(|queue| QueueSummary::from_queue(&queue)))
            .collect()
    }

    pub fn queue_summary(&self, id: &str) -> Option<QueueSummary> {
        let handle = self.queue(id)?;
        let queue = handle.lock();
        Some(QueueSummary::from_queue(&queue))
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("now", &self.now())
            .field("scripts", &self.script_names())
            .field("active_queues", &self.active_queue_count())
            .finish()
    }
}
