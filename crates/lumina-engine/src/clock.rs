//! Time sources for the render loop.
//!
//! The loop only ever asks "how far into the step are we". Where that answer
//! comes from depends on the deployment: a monotonic timer owned by the
//! executor, or the audio player reporting its position via sync messages.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lumina_core::config::{ClockConfig, ClockMode};
use lumina_core::Position;
use parking_lot::Mutex;

/// Source of elapsed time within the active step.
pub trait TimeSource: Send {
    /// Time into the active step.
    fn elapsed(&self) -> Duration;

    /// Start counting from zero.
    fn restart(&mut self);

    /// Freeze elapsed time (pause).
    fn hold(&mut self);

    /// Continue from the held value (resume).
    fn release(&mut self);

    /// Apply a position report from an external clock master.
    fn sync(&mut self, _position: Position) {}

    /// Whether the source has gone silent and its value can't be trusted.
    fn is_stalled(&self) -> bool {
        false
    }
}

/// Build the time source selected by the configuration.
pub fn for_config(config: &ClockConfig) -> Box<dyn TimeSource> {
    match config.mode {
        ClockMode::Internal => Box::new(InternalClock::new()),
        ClockMode::ClockMaster => Box::new(ClockMaster::new(config.stall_timeout())),
    }
}

/// Monotonic timer that accumulates across pauses.
#[derive(Debug, Clone)]
pub struct InternalClock {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl InternalClock {
    pub const fn new() -> Self {
        Self {
            accumulated: Duration::ZERO,
            running_since: None,
        }
    }

    pub fn elapsed_at(&self, now: Instant) -> Duration {
        self.accumulated
            + self
                .running_since
                .map_or(Duration::ZERO, |since| now.saturating_duration_since(since))
    }

    pub fn restart_at(&mut self, now: Instant) {
        self.accumulated = Duration::ZERO;
        self.running_since = Some(now);
    }

    pub fn hold_at(&mut self, now: Instant) {
        if self.running_since.is_some() {
            self.accumulated = self.elapsed_at(now);
            self.running_since = None;
        }
    }

    pub fn release_at(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }
}

impl Default for InternalClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for InternalClock {
    fn elapsed(&self) -> Duration {
        self.elapsed_at(Instant::now())
    }

    fn restart(&mut self) {
        self.restart_at(Instant::now());
    }

    fn hold(&mut self) {
        self.hold_at(Instant::now());
    }

    fn release(&mut self) {
        self.release_at(Instant::now());
    }
}

/// Clock fed by sync messages from the audio player.
///
/// Between reports the position is extrapolated. After a restart or resume
/// the value stays frozen until the next report arrives. If no report arrives
/// within `stall_timeout` while running, the clock reports itself stalled.
#[derive(Debug, Clone)]
pub struct ClockMaster {
    position: Duration,
    received_at: Instant,
    running: bool,
    awaiting_sync: bool,
    stall_timeout: Duration,
}

impl ClockMaster {
    pub fn new(stall_timeout: Duration) -> Self {
        Self {
            position: Duration::ZERO,
            received_at: Instant::now(),
            running: false,
            awaiting_sync: false,
            stall_timeout,
        }
    }

    pub fn elapsed_at(&self, now: Instant) -> Duration {
        if self.running && !self.awaiting_sync {
            self.position + now.saturating_duration_since(self.received_at)
        } else {
            self.position
        }
    }

    pub fn is_stalled_at(&self, now: Instant) -> bool {
        self.running && now.saturating_duration_since(self.received_at) > self.stall_timeout
    }

    pub fn restart_at(&mut self, now: Instant) {
        self.position = Duration::ZERO;
        self.received_at = now;
        self.running = true;
        self.awaiting_sync = true;
    }

    pub fn hold_at(&mut self, now: Instant) {
        if self.running {
            self.position = self.elapsed_at(now);
            self.running = false;
        }
    }

    pub fn release_at(&mut self, now: Instant) {
        if !self.running {
            self.received_at = now;
            self.running = true;
            self.awaiting_sync = true;
        }
    }

    pub fn sync_at(&mut self, position: Position, now: Instant) {
        self.position = position.as_duration();
        self.received_at = now;
        self.awaiting_sync = false;
    }
}

impl TimeSource for ClockMaster {
    fn elapsed(&self) -> Duration {
        self.elapsed_at(Instant::now())
    }

    fn restart(&mut self) {
        self.restart_at(Instant::now());
    }

    fn hold(&mut self) {
        self.hold_at(Instant::now());
    }

    fn release(&mut self) {
        self.release_at(Instant::now());
    }

    fn sync(&mut self, position: Position) {
        self.sync_at(position, Instant::now());
    }

    fn is_stalled(&self) -> bool {
        self.is_stalled_at(Instant::now())
    }
}

#[derive(Debug, Default)]
struct ManualState {
    elapsed: Duration,
    held: bool,
    stalled: bool,
}

/// Manually driven clock for deterministic tests.
///
/// Clones share state, so a test can keep a handle after giving the clock
/// to a player.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jump to an absolute position.
    pub fn set(&self, elapsed: Duration) {
        self.inner.lock().elapsed = elapsed;
    }

    pub fn set_millis(&self, millis: u64) {
        self.set(Duration::from_millis(millis));
    }

    /// Move forward unless held.
    pub fn advance(&self, by: Duration) {
        let mut state = self.inner.lock();
        if !state.held {
            state.elapsed += by;
        }
    }

    pub fn set_stalled(&self, stalled: bool) {
        self.inner.lock().stalled = stalled;
    }

    pub fn is_held(&self) -> bool {
        self.inner.lock().held
    }
}

impl TimeSource for ManualClock {
    fn elapsed(&self) -> Duration {
        self.inner.lock().elapsed
    }

    fn restart(&mut self) {
        let mut state = self.inner.lock();
        state.elapsed = Duration::ZERO;
        state.held = false;
    }

    fn hold(&mut self) {
        self.inner.lock().held = true;
    }

    fn release(&mut self) {
        self.inner.lock().held = false;
    }

    fn sync(&mut self, position: Position) {
        let mut state = self.inner.lock();
        state.elapsed = position.as_duration();
        state.stalled = false;
    }

    fn is_stalled(&self) -> bool {
        self.inner.lock().stalled
    }
}
