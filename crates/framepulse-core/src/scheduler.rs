use std::collections::{BTreeMap, HashMap};

use log::{debug, info, warn};

use crate::clock::{FrameClock, FrameRequest};
use crate::config::{SchedulerConfig, MAX_TARGET_FPS, MIN_TARGET_FPS};
use crate::error::{SchedulerError, SchedulerResult};
use crate::handle::{Command, CommandQueue, SchedulerHandle};
use crate::health::{HealthMonitor, Verdict};
use crate::policy::SkipPolicy;
use crate::priority::Priority;
use crate::registry::{
    BoxedCallback, CallbackEntry, CallbackId, FrameArgs, IdAllocator, Registration, Registry,
};
use crate::stats::{CallbackStats, Stats};
use crate::telemetry::Telemetry;
use crate::time::FrameTimer;

/// Builds a callback from its config settings. Registered under a name and
/// instantiated by `register_named` / `register_configured`.
pub type CallbackFactory = Box<dyn Fn(&toml::Value) -> anyhow::Result<BoxedCallback>>;

/// Single-threaded, priority-ordered frame scheduler.
///
/// The host's frame clock delivers ticks through [`Scheduler::tick`]. Each tick
/// dispatches enabled callbacks tier by tier (Critical first), shedding tiers
/// when FPS degrades or when the frame budget is already spent, and quarantines
/// callbacks that are chronically slow.
pub struct Scheduler<C: FrameClock> {
    clock: C,
    cfg: SchedulerConfig,

    registry: Registry,
    ids: IdAllocator,
    commands: CommandQueue,
    factories: HashMap<String, CallbackFactory>,

    timer: FrameTimer,
    policy: SkipPolicy,
    health: HealthMonitor,
    telemetry: Telemetry,

    target_fps: f64,
    target_frame_time_ms: f64,
    frame_budget_ms: f64,

    is_running: bool,
    pending: Option<FrameRequest>,

    skipped_by_policy: u64,
    skipped_by_budget: u64,
    callback_failures: u64,
    quarantines: u64,
}

impl<C: FrameClock> Scheduler<C> {
    pub fn new(clock: C) -> Self {
        Self::with_config(clock, SchedulerConfig::default())
    }

    pub fn with_config(clock: C, cfg: SchedulerConfig) -> Self {
        let target_fps = clamp_target_fps(cfg.target_fps).unwrap_or(60.0);
        let target_frame_time_ms = 1000.0 / target_fps;

        let mut scheduler = Self {
            clock,
            registry: Registry::new(),
            ids: IdAllocator::default(),
            commands: CommandQueue::new(),
            factories: HashMap::new(),
            timer: FrameTimer::new(cfg.history_len, cfg.max_delta_ms, target_fps),
            policy: SkipPolicy::new(cfg.severe_fps, cfg.degraded_fps),
            health: HealthMonitor::new(cfg.slow_threshold_ms, cfg.slow_min_runs),
            telemetry: Telemetry::new(cfg.log_fps, cfg.fps_log_period_ms),
            target_fps,
            target_frame_time_ms,
            frame_budget_ms: target_frame_time_ms,
            is_running: false,
            pending: None,
            skipped_by_policy: 0,
            skipped_by_budget: 0,
            callback_failures: 0,
            quarantines: 0,
            cfg,
        };
        scheduler.cfg.target_fps = target_fps;
        scheduler
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Registers a per-frame callback. The first registration starts the scheduler.
    pub fn register<F>(&mut self, callback: F, registration: Registration) -> CallbackId
    where
        F: FnMut(&FrameArgs<'_>) -> anyhow::Result<()> + 'static,
    {
        self.apply_commands();
        let id = self.ids.next();
        self.insert(id, registration, Box::new(callback));
        id
    }

    /// Removes a callback. Unknown or already-removed ids are ignored.
    /// The last removal stops the scheduler.
    pub fn unregister(&mut self, id: CallbackId) {
        self.apply_commands();
        self.remove(id);
    }

    /// Enables or disables a callback without touching its counters.
    ///
    /// Re-enabling starts a fresh health window, which lifts a slowness quarantine.
    pub fn set_enabled(&mut self, id: CallbackId, enabled: bool) {
        self.apply_commands();
        self.toggle(id, enabled);
    }

    /// Cloneable handle for mutations requested while a tick is in flight.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle::new(self.ids.clone(), self.commands.sender())
    }

    /// Makes `name` available to `register_named` and `register_configured`.
    pub fn register_factory<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&toml::Value) -> anyhow::Result<BoxedCallback> + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Registers the callback built by the factory registered under `name`.
    ///
    /// Fails with `InvalidCallback` when no such factory exists.
    pub fn register_named(
        &mut self,
        name: &str,
        registration: Registration,
    ) -> SchedulerResult<CallbackId> {
        let empty = toml::Value::Table(toml::map::Map::new());
        self.register_named_with(name, &empty, registration)
    }

    /// Instantiates every `[[callbacks]]` entry of the config, in order.
    ///
    /// Entries marked `enabled = false` are registered disabled.
    pub fn register_configured(&mut self) -> SchedulerResult<Vec<CallbackId>> {
        let entries = self.cfg.callbacks.clone();
        let mut ids = Vec::with_capacity(entries.len());

        for c in entries.iter() {
            let registration = Registration::new(c.priority).with_label(c.name.clone());
            let id = self.register_named_with(&c.name, &c.settings, registration)?;
            if !c.enabled {
                info!("callback '{}' disabled by config", c.name);
                self.toggle(id, false);
            }
            ids.push(id);
        }
        Ok(ids)
    }

    fn register_named_with(
        &mut self,
        name: &str,
        settings: &toml::Value,
        registration: Registration,
    ) -> SchedulerResult<CallbackId> {
        let Some(factory) = self.factories.get(name) else {
            return Err(SchedulerError::InvalidCallback {
                name: name.to_string(),
            });
        };
        let callback = factory(settings).map_err(|e| SchedulerError::Factory {
            name: name.to_string(),
            message: format!("{e:#}"),
        })?;

        let registration = match registration.label {
            Some(_) => registration,
            None => registration.with_label(name),
        };

        self.apply_commands();
        let id = self.ids.next();
        self.insert(id, registration, callback);
        Ok(id)
    }

    fn insert(&mut self, id: CallbackId, registration: Registration, callback: BoxedCallback) {
        let was_empty = self.registry.is_empty();
        let entry = CallbackEntry::new(id, registration, callback);
        debug!(
            "register '{}' ({}, tier {})",
            entry.label(),
            id,
            entry.priority()
        );
        self.registry.insert(entry);

        if was_empty {
            self.subscribe();
        }
    }

    fn remove(&mut self, id: CallbackId) {
        let Some(entry) = self.registry.remove(id) else {
            debug!("unregister {id}: not registered");
            return;
        };
        debug!("unregister '{}' ({})", entry.label(), id);

        if self.registry.is_empty() {
            self.stop();
        }
    }

    fn toggle(&mut self, id: CallbackId, enabled: bool) {
        let Some(entry) = self.registry.get_mut(id) else {
            debug!("set_enabled {id}: not registered");
            return;
        };

        if enabled && !entry.enabled {
            entry.restart_window();
            if entry.quarantined {
                info!("callback '{}' ({}) re-enabled after quarantine", entry.label(), id);
            }
            entry.quarantined = false;
        }
        entry.enabled = enabled;
    }

    /// Applies mutations queued through handles.
    ///
    /// Hosts that hand out handles before driving any tick call this so a
    /// queued first registration starts the scheduler.
    pub fn apply_pending(&mut self) {
        self.apply_commands();
    }

    fn apply_commands(&mut self) {
        while let Some(cmd) = self.commands.try_recv() {
            match cmd {
                Command::Register {
                    id,
                    registration,
                    callback,
                } => self.insert(id, registration, callback),
                Command::Unregister(id) => self.remove(id),
                Command::SetEnabled(id, enabled) => self.toggle(id, enabled),
            }
        }
    }

    // ------------------------------------------------------------------
    // Frame clock
    // ------------------------------------------------------------------

    /// Clamps to [15, 120] and derives frame time and budget from it.
    /// Non-finite values are ignored.
    pub fn set_target_fps(&mut self, fps: f64) {
        let Some(target) = clamp_target_fps(fps) else {
            warn!("set_target_fps({fps}) ignored: not a finite number");
            return;
        };
        self.target_fps = target;
        self.target_frame_time_ms = 1000.0 / target;
        self.frame_budget_ms = self.target_frame_time_ms;
        self.cfg.target_fps = target;
        self.timer.set_default_fps(target);
    }

    /// Whether `priority` would be shed at the current FPS.
    ///
    /// Asking advances the Medium tier's alternation, exactly as a dispatch would.
    pub fn should_skip_priority(&mut self, priority: Priority) -> bool {
        self.policy
            .should_skip(priority, self.timer.fps(), self.target_fps)
    }

    /// Frame entry point, called by the host once per delivered tick.
    ///
    /// Ticks arriving while stopped are ignored.
    pub fn tick(&mut self, timestamp_ms: f64) {
        if !self.is_running {
            // A queued registration may start us; its own frame request drives the next tick.
            self.apply_commands();
            return;
        }
        self.pending = None;

        self.apply_commands();
        if !self.is_running {
            return;
        }

        let frame_start = self.clock.now_ms();
        let delta_ms = self.timer.advance(timestamp_ms);
        let fps = self.timer.fps();
        let frame = self.timer.frame_count();

        let mut over_budget = false;
        for priority in Priority::ALL {
            if !self.registry.has_runnable(priority) {
                continue;
            }

            if !over_budget && self.clock.now_ms() - frame_start > self.frame_budget_ms {
                over_budget = true;
                debug!("frame {frame}: budget {:.2}ms spent before tier {priority}", self.frame_budget_ms);
            }
            if over_budget {
                self.skipped_by_budget += 1;
                continue;
            }

            if self.policy.should_skip(priority, fps, self.target_fps) {
                self.skipped_by_policy += 1;
                continue;
            }

            self.dispatch_tier(priority, delta_ms, timestamp_ms, frame);
        }

        self.telemetry
            .frame_tick(timestamp_ms, fps, delta_ms, self.registry.len());

        self.apply_commands();
        if self.is_running {
            self.pending = Some(self.clock.request_frame());
        }
    }

    fn dispatch_tier(&mut self, priority: Priority, delta_ms: f64, timestamp_ms: f64, frame: u64) {
        let clock = &self.clock;
        let health = &self.health;

        for entry in self.registry.runnable_mut(priority) {
            let started = clock.now_ms();
            let outcome = entry.invoke(delta_ms, timestamp_ms, frame);
            let elapsed = (clock.now_ms() - started).max(0.0);
            match health.observe(entry, elapsed, outcome) {
                Verdict::Healthy => {}
                Verdict::Failed => self.callback_failures += 1,
                Verdict::Quarantined => self.quarantines += 1,
            }
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Subscribes to the frame clock. Idempotent.
    ///
    /// Refuses to run with an empty registry; the first registration starts
    /// the scheduler on its own.
    pub fn start(&mut self) {
        self.apply_commands();
        if self.registry.is_empty() {
            debug!("start ignored: no callbacks registered");
            return;
        }
        self.subscribe();
    }

    fn subscribe(&mut self) {
        if self.is_running {
            return;
        }
        self.is_running = true;
        self.timer.anchor(self.clock.now_ms());
        self.telemetry.reset();
        self.pending = Some(self.clock.request_frame());
        info!(
            "scheduler started: target_fps={:.1} budget={:.2}ms callbacks={}",
            self.target_fps,
            self.frame_budget_ms,
            self.registry.len()
        );
    }

    /// Cancels the frame-clock subscription, keeping every registration. Idempotent.
    pub fn stop(&mut self) {
        if !self.is_running {
            return;
        }
        self.is_running = false;
        if let Some(request) = self.pending.take() {
            self.clock.cancel_frame(request);
        }
        info!("scheduler stopped after {} frames", self.timer.frame_count());
    }

    /// Full teardown: stops, drops every registration and queued command,
    /// and resets all counters. Ids are still never reused afterwards.
    pub fn destroy(&mut self) {
        self.stop();
        let dropped = self.commands.discard();
        let removed = self.registry.len();
        self.registry.clear();
        self.timer.reset(self.target_fps);
        self.policy.reset();
        self.telemetry.reset();
        self.skipped_by_policy = 0;
        self.skipped_by_budget = 0;
        self.callback_failures = 0;
        self.quarantines = 0;
        info!("scheduler destroyed: {removed} callbacks removed, {dropped} queued commands dropped");
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn stats(&self) -> Stats {
        let counts = self.registry.count_by_priority();
        let callbacks_by_priority: BTreeMap<Priority, usize> = Priority::ALL
            .iter()
            .map(|p| (*p, counts[p.index()]))
            .collect();

        Stats {
            fps: self.timer.fps(),
            frame_count: self.timer.frame_count(),
            callback_count: self.registry.len(),
            enabled_count: self.registry.enabled_count(),
            average_frame_time: self.timer.average_frame_time(),
            callbacks_by_priority,
            skipped_by_policy: self.skipped_by_policy,
            skipped_by_budget: self.skipped_by_budget,
            callback_failures: self.callback_failures,
            quarantines: self.quarantines,
            target_fps: self.target_fps,
            is_running: self.is_running,
        }
    }

    pub fn callback_stats(&self, id: CallbackId) -> Option<CallbackStats> {
        self.registry.get(id).map(CallbackStats::from)
    }

    #[inline]
    pub fn is_registered(&self, id: CallbackId) -> bool {
        self.registry.contains(id)
    }

    /// `None` for unknown ids.
    #[inline]
    pub fn is_enabled(&self, id: CallbackId) -> Option<bool> {
        self.registry.get(id).map(|e| e.is_enabled())
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.is_running
    }

    #[inline]
    pub fn has_pending_frame(&self) -> bool {
        self.pending.is_some()
    }

    #[inline]
    pub fn fps(&self) -> f64 {
        self.timer.fps()
    }

    #[inline]
    pub fn delta_time_ms(&self) -> f64 {
        self.timer.delta_ms()
    }

    #[inline]
    pub fn last_frame_time_ms(&self) -> f64 {
        self.timer.last_frame_ms()
    }

    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.timer.frame_count()
    }

    #[inline]
    pub fn target_fps(&self) -> f64 {
        self.target_fps
    }

    #[inline]
    pub fn target_frame_time_ms(&self) -> f64 {
        self.target_frame_time_ms
    }

    #[inline]
    pub fn frame_budget_ms(&self) -> f64 {
        self.frame_budget_ms
    }

    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.cfg
    }

    #[inline]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    #[inline]
    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }
}

fn clamp_target_fps(fps: f64) -> Option<f64> {
    if fps.is_finite() {
        Some(fps.clamp(MIN_TARGET_FPS, MAX_TARGET_FPS))
    } else {
        None
    }
}

#[cfg(test)]
#[path = "tests/scheduler_tests.rs"]
mod tests;
