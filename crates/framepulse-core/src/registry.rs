use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use serde::Serialize;

use crate::error::CallbackFailure;
use crate::priority::Priority;

/// Opaque value handed back to a callback on every invocation.
///
/// Shared with the caller; the scheduler only ever lends it out immutably.
pub type Context = Rc<dyn Any>;

pub type BoxedCallback = Box<dyn FnMut(&FrameArgs<'_>) -> anyhow::Result<()>>;

/// Handle of one registration.
///
/// Ids come from a per-scheduler counter and are never handed out twice, so a
/// stale id can only ever miss, never alias a newer registration.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct CallbackId(u64);

impl CallbackId {
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "callback#{}", self.0)
    }
}

/// Shared id counter. Handles allocate from the same sequence as the scheduler.
#[derive(Clone, Default)]
pub(crate) struct IdAllocator {
    last: Rc<Cell<u64>>,
}

impl IdAllocator {
    #[inline]
    pub(crate) fn next(&self) -> CallbackId {
        let id = self.last.get() + 1;
        self.last.set(id);
        CallbackId(id)
    }
}

/// Per-invocation arguments.
pub struct FrameArgs<'a> {
    pub id: CallbackId,
    pub priority: Priority,
    /// Milliseconds since the previous tick.
    pub delta_ms: f64,
    /// Timestamp the frame clock delivered for this tick.
    pub timestamp_ms: f64,
    /// 1-based index of the current tick.
    pub frame: u64,
    pub context: Option<&'a (dyn Any + 'static)>,
}

impl FrameArgs<'_> {
    /// Typed view of the registration context.
    #[inline]
    pub fn context<T: Any>(&self) -> Option<&T> {
        self.context?.downcast_ref::<T>()
    }
}

/// Registration options. `Registration::default()` is a Medium callback with no context.
#[derive(Clone, Default)]
pub struct Registration {
    pub priority: Priority,
    pub context: Option<Context>,
    pub label: Option<String>,
}

impl Registration {
    #[inline]
    pub fn new(priority: Priority) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }

    #[inline]
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    #[inline]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("priority", &self.priority)
            .field("has_context", &self.context.is_some())
            .field("label", &self.label)
            .finish()
    }
}

/// One registered callback with its timing history.
pub struct CallbackEntry {
    id: CallbackId,
    label: String,
    priority: Priority,
    context: Option<Context>,
    callback: BoxedCallback,

    pub(crate) enabled: bool,
    pub(crate) quarantined: bool,

    pub(crate) run_count: u64,
    pub(crate) total_time_ms: f64,
    pub(crate) error_count: u64,
    pub(crate) last_error: Option<String>,

    // Counters at the start of the current health window.
    window_runs: u64,
    window_time_ms: f64,
}

impl CallbackEntry {
    pub(crate) fn new(id: CallbackId, registration: Registration, callback: BoxedCallback) -> Self {
        let label = registration.label.unwrap_or_else(|| id.to_string());
        Self {
            id,
            label,
            priority: registration.priority,
            context: registration.context,
            callback,
            enabled: true,
            quarantined: false,
            run_count: 0,
            total_time_ms: 0.0,
            error_count: 0,
            last_error: None,
            window_runs: 0,
            window_time_ms: 0.0,
        }
    }

    #[inline]
    pub fn id(&self) -> CallbackId {
        self.id
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn is_quarantined(&self) -> bool {
        self.quarantined
    }

    #[inline]
    pub fn run_count(&self) -> u64 {
        self.run_count
    }

    #[inline]
    pub fn total_time_ms(&self) -> f64 {
        self.total_time_ms
    }

    /// Lifetime average over successful runs.
    pub fn average_time_ms(&self) -> f64 {
        if self.run_count == 0 {
            0.0
        } else {
            self.total_time_ms / self.run_count as f64
        }
    }

    /// Runs and time accumulated since the last (re-)enable.
    pub(crate) fn window(&self) -> (u64, f64) {
        (
            self.run_count - self.window_runs,
            self.total_time_ms - self.window_time_ms,
        )
    }

    /// Starts a fresh health window without touching lifetime counters.
    pub(crate) fn restart_window(&mut self) {
        self.window_runs = self.run_count;
        self.window_time_ms = self.total_time_ms;
    }

    /// Runs the callback behind an unwind boundary.
    pub(crate) fn invoke(
        &mut self,
        delta_ms: f64,
        timestamp_ms: f64,
        frame: u64,
    ) -> Result<(), CallbackFailure> {
        let args = FrameArgs {
            id: self.id,
            priority: self.priority,
            delta_ms,
            timestamp_ms,
            frame,
            context: self.context.as_deref(),
        };
        let callback = &mut self.callback;

        match panic::catch_unwind(AssertUnwindSafe(|| callback(&args))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(CallbackFailure::Error(err)),
            Err(payload) => Err(CallbackFailure::Panic(panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Registration-ordered store of callback entries.
///
/// Ids grow monotonically, so keeping the vector sorted by id keeps every tier
/// in registration order and makes lookups a binary search.
#[derive(Default)]
pub struct Registry {
    entries: Vec<CallbackEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn insert(&mut self, entry: CallbackEntry) {
        let at = self.entries.partition_point(|e| e.id < entry.id);
        self.entries.insert(at, entry);
    }

    pub(crate) fn remove(&mut self, id: CallbackId) -> Option<CallbackEntry> {
        let at = self.position(id)?;
        Some(self.entries.remove(at))
    }

    pub fn get(&self, id: CallbackId) -> Option<&CallbackEntry> {
        self.position(id).map(|at| &self.entries[at])
    }

    pub(crate) fn get_mut(&mut self, id: CallbackId) -> Option<&mut CallbackEntry> {
        let at = self.position(id)?;
        Some(&mut self.entries[at])
    }

    #[inline]
    pub fn contains(&self, id: CallbackId) -> bool {
        self.position(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CallbackEntry> {
        self.entries.iter()
    }

    /// Enabled entries of one tier, in registration order.
    pub(crate) fn runnable_mut(
        &mut self,
        priority: Priority,
    ) -> impl Iterator<Item = &mut CallbackEntry> {
        self.entries
            .iter_mut()
            .filter(move |e| e.priority == priority && e.enabled)
    }

    pub fn has_runnable(&self, priority: Priority) -> bool {
        self.entries
            .iter()
            .any(|e| e.priority == priority && e.enabled)
    }

    pub fn count_by_priority(&self) -> [usize; Priority::COUNT] {
        let mut counts = [0usize; Priority::COUNT];
        for e in self.entries.iter() {
            counts[e.priority.index()] += 1;
        }
        counts
    }

    pub fn enabled_count(&self) -> usize {
        self.entries.iter().filter(|e| e.enabled).count()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    #[inline]
    fn position(&self, id: CallbackId) -> Option<usize> {
        self.entries.binary_search_by_key(&id, |e| e.id).ok()
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
