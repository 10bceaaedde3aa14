use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use qs_core::{QsValue, QueueSpeed, ScriptContainer};
use serde::Serialize;

use crate::entry::Entry;

pub type CompletionCallback = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QueueMode {
    /// Runs to completion inside the call that started it.
    Instant,
    /// Advances only when the scheduler ticks.
    Timed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "until", rename_all = "camelCase")]
pub enum QueueState {
    PendingStart,
    Running,
    DelayedUntil(Duration),
    Paused,
    Stopping,
    Stopped,
}

/// Everything a host may set when building a queue.
#[derive(Default)]
pub struct QueueOptions {
    pub speed: Option<QueueSpeed>,
    pub delay: Option<Duration>,
    pub definitions: BTreeMap<String, QsValue>,
    pub context: BTreeMap<String, QsValue>,
    pub callback: Option<CompletionCallback>,
    /// Forces timed execution even when the speed is instant.
    pub timed: bool,
}

impl QueueOptions {
    pub fn with_definition(mut self, name: &str, value: impl Into<QsValue>) -> Self {
        self.definitions
            .insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_context(mut self, name: &str, value: impl Into<QsValue>) -> Self {
        self.context.insert(name.to_string(), value.into());
        self
    }

    pub fn with_speed(mut self, speed: QueueSpeed) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_callback(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn timed(mut self) -> Self {
        self.timed = true;
        self
    }
}

/// An ordered run of live entries with its own definitions, held entries
/// and lifecycle.
pub struct Queue {
    id: String,
    debug_id: String,
    script: Option<Arc<ScriptContainer>>,
    mode: QueueMode,
    speed: QueueSpeed,
    pending: VecDeque<Arc<Entry>>,
    definitions: BTreeMap<String, QsValue>,
    context: BTreeMap<String, QsValue>,
    held: BTreeMap<String, Arc<Entry>>,
    last_executed: Option<Arc<Entry>>,
    state: QueueState,
    start_delay: Option<Duration>,
    started_at: Option<Duration>,
    next_revolve_at: Duration,
    callback: Option<CompletionCallback>,
    on_complete_appended: bool,
    stop_requested: bool,
    cleared: bool,
    promotion: Option<Option<Duration>>,
}

impl Queue {
    pub(crate) fn new(
        id: String,
        debug_id: String,
        script: Option<Arc<ScriptContainer>>,
        entries: Vec<Arc<Entry>>,
        speed: QueueSpeed,
        options: QueueOptions,
    ) -> Self {
        let timed = options.timed || !speed.is_instant() || options.delay.is_some();
        Self {
            id,
            debug_id,
            script,
            mode: if timed {
                QueueMode::Timed
            } else {
                QueueMode::Instant
            },
            speed,
            pending: entries.into_iter().collect(),
            definitions: options
                .definitions
                .into_iter()
                .map(|(name, value)| (name.to_ascii_lowercase(), value))
                .collect(),
            context: options.context,
            held: BTreeMap::new(),
            last_executed: None,
            state: QueueState::PendingStart,
            start_delay: options.delay,
            started_at: None,
            next_revolve_at: Duration::ZERO,
            callback: options.callback,
            on_complete_appended: false,
            stop_requested: false,
            cleared: false,
            promotion: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn debug_id(&self) -> &str {
        &self.debug_id
    }

    pub fn script(&self) -> Option<&Arc<ScriptContainer>> {
        self.script.as_ref()
    }

    pub fn script_name(&self) -> Option<&str> {
        self.script.as_ref().map(|script| script.name.as_str())
    }

    pub fn mode(&self) -> QueueMode {
        self.mode
    }

    pub fn is_timed(&self) -> bool {
        self.mode == QueueMode::Timed
    }

    pub fn speed(&self) -> QueueSpeed {
        self.speed
    }

    pub fn set_speed(&mut self, speed: QueueSpeed) {
        self.speed = speed;
    }

    pub fn state(&self) -> QueueState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: QueueState) {
        self.state = state;
    }

    pub fn is_stopped(&self) -> bool {
        self.state == QueueState::Stopped
    }

    pub fn size(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn started_at(&self) -> Option<Duration> {
        self.started_at
    }

    pub fn pending_commands(&self) -> Vec<String> {
        self.pending.iter().map(|entry| entry.command_line()).collect()
    }

    pub(crate) fn pending(&self) -> &VecDeque<Arc<Entry>> {
        &self.pending
    }

    pub(crate) fn pop_front(&mut self) -> Option<Arc<Entry>> {
        self.pending.pop_front()
    }

    /// Inserts `entries` so the first one sits at `position` (clamped to the
    /// queue length). Injecting into a stopping or stopped queue is ignored.
    pub fn inject(&mut self, entries: Vec<Arc<Entry>>, position: usize) {
        if self.refuses_entries() {
            debug!("[{}] ignoring injection into a stopped queue", self.id);
            return;
        }
        if !entries.is_empty() {
            self.cleared = false;
        }
        let mut at = position.min(self.pending.len());
        for entry in entries {
            self.pending.insert(at, entry);
            at += 1;
        }
    }

    pub fn append(&mut self, entries: Vec<Arc<Entry>>) {
        if self.refuses_entries() {
            debug!("[{}] ignoring append to a stopped queue", self.id);
            return;
        }
        if !entries.is_empty() {
            self.cleared = false;
        }
        self.pending.extend(entries);
    }

    fn refuses_entries(&self) -> bool {
        self.stop_requested || self.state == QueueState::Stopped
    }

    /// Drops every pending entry. The next revolve completes the queue even
    /// when it is paused or delayed, unless entries were added since.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.cleared = true;
    }

    pub(crate) fn cleared_and_empty(&self) -> bool {
        self.cleared && self.pending.is_empty()
    }

    /// Removes pending entries for which `remove` returns true, stopping at
    /// the first entry `until` matches (inclusive when `inclusive`). Returns
    /// whether such an entry was found.
    pub(crate) fn drain_until<F>(&mut self, until: F, inclusive: bool) -> bool
    where
        F: Fn(&Arc<Entry>) -> bool,
    {
        let Some(index) = self.pending.iter().position(&until) else {
            return false;
        };
        let count = if inclusive { index + 1 } else { index };
        self.pending.drain(..count);
        true
    }

    pub fn definitions(&self) -> &BTreeMap<String, QsValue> {
        &self.definitions
    }

    pub fn definition(&self, name: &str) -> Option<&QsValue> {
        self.definitions.get(&name.to_ascii_lowercase())
    }

    pub fn define(&mut self, name: &str, value: QsValue) {
        self.definitions.insert(name.to_ascii_lowercase(), value);
    }

    pub fn remove_definition(&mut self, name: &str) -> Option<QsValue> {
        self.definitions.remove(&name.to_ascii_lowercase())
    }

    pub fn context(&self) -> &BTreeMap<String, QsValue> {
        &self.context
    }

    pub fn set_context(&mut self, name: &str, value: QsValue) {
        self.context.insert(name.to_string(), value);
    }

    pub fn hold_entry(&mut self, name: &str, entry: Arc<Entry>) {
        self.held.insert(name.to_ascii_lowercase(), entry);
    }

    pub fn held_entry(&self, name: &str) -> Option<&Arc<Entry>> {
        self.held.get(&name.to_ascii_lowercase())
    }

    pub fn held_results(&self) -> BTreeMap<String, QsValue> {
        self.held
            .iter()
            .map(|(name, entry)| (name.clone(), QsValue::Map(entry.results())))
            .collect()
    }

    pub fn last_executed(&self) -> Option<&Arc<Entry>> {
        self.last_executed.as_ref()
    }

    pub(crate) fn set_last_executed(&mut self, entry: Arc<Entry>) {
        self.last_executed = Some(entry);
    }

    pub fn is_paused(&self) -> bool {
        self.state == QueueState::Paused
    }

    /// Pausing an instant queue hands it to the scheduler first.
    pub fn pause(&mut self) {
        if matches!(self.state, QueueState::Stopping | QueueState::Stopped) {
            return;
        }
        self.state = QueueState::Paused;
        if self.mode == QueueMode::Instant {
            self.request_promotion(None);
        }
    }

    pub fn resume(&mut self) {
        if self.state == QueueState::Paused {
            self.state = QueueState::Running;
        }
    }

    /// Suspends the queue until `now + delay`. An instant queue cannot wait,
    /// so it asks to be promoted to a timed one instead.
    pub fn delay(&mut self, delay: Duration, now: Duration) {
        match self.mode {
            QueueMode::Instant => self.request_promotion(Some(delay)),
            QueueMode::Timed => {
                if !matches!(self.state, QueueState::Stopping | QueueState::Stopped) {
                    self.state = QueueState::DelayedUntil(now + delay);
                }
            }
        }
    }

    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub(crate) fn request_promotion(&mut self, delay: Option<Duration>) {
        if self.mode == QueueMode::Instant && self.promotion.is_none() {
            self.promotion = Some(delay);
        }
    }

    pub(crate) fn promotion_requested(&self) -> bool {
        self.promotion.is_some()
    }

    pub(crate) fn next_revolve_at(&self) -> Duration {
        self.next_revolve_at
    }

    pub(crate) fn set_next_revolve_at(&mut self, at: Duration) {
        self.next_revolve_at = at;
    }

    pub(crate) fn on_complete_appended(&self) -> bool {
        self.on_complete_appended
    }

    /// Re-arms the queue to run its supplemental program.
    pub(crate) fn begin_on_complete(&mut self, entries: Vec<Arc<Entry>>) {
        self.on_complete_appended = true;
        self.stop_requested = false;
        self.cleared = false;
        self.next_revolve_at = Duration::ZERO;
        self.pending = entries.into_iter().collect();
        if self.state == QueueState::Stopping {
            self.state = QueueState::Running;
        }
    }

    pub(crate) fn mark_started(&mut self, now: Duration) {
        self.started_at = Some(now);
        self.state = match self.start_delay {
            Some(delay) => QueueState::DelayedUntil(now + delay),
            None => QueueState::Running,
        };
    }

    /// Moves to `Stopped` and hands back the completion callback, which the
    /// caller must run after releasing the queue lock.
    pub(crate) fn finalize(&mut self) -> Option<CompletionCallback> {
        self.state = QueueState::Stopped;
        self.pending.clear();
        self.callback.take()
    }

    /// Builds the timed queue that replaces this instant one under the same
    /// id. Pending entries, definitions, held entries and the callback move
    /// across; this instance is left stopped and inert.
    pub(crate) fn promote(&mut self, now: Duration) -> Queue {
        let delay = self.promotion.take().flatten();
        let pending = std::mem::take(&mut self.pending);
        for entry in &pending {
            entry.set_instant(true);
        }
        let state = if self.state == QueueState::Paused {
            QueueState::Paused
        } else if let Some(delay) = delay {
            QueueState::DelayedUntil(now + delay)
        } else {
            QueueState::Running
        };
        let promoted = Queue {
            id: self.id.clone(),
            debug_id: self.debug_id.clone(),
            script: self.script.clone(),
            mode: QueueMode::Timed,
            speed: self.speed,
            pending,
            definitions: std::mem::take(&mut self.definitions),
            context: std::mem::take(&mut self.context),
            held: std::mem::take(&mut self.held),
            last_executed: self.last_executed.take(),
            state,
            start_delay: None,
            started_at: self.started_at,
            next_revolve_at: self.next_revolve_at.max(now),
            callback: self.callback.take(),
            on_complete_appended: self.on_complete_appended,
            stop_requested: self.stop_requested,
            cleared: self.cleared,
            promotion: None,
        };
        self.state = QueueState::Stopped;
        promoted
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("pending", &self.pending_commands())
            .finish()
    }
}
