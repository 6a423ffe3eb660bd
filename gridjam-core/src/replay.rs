//! Replay state machine for scrubbing through a room's edit history.
//!
//! Three states: `Live` (render the current grid), `LinearReplay`
//! (walk the log at a fixed tempo on a generic timer) and
//! `CyclicReplay` (loop-synced timelapse — advancement is driven by the
//! step sequencer's wrap event, not an independent timer).
//!
//! ```text
//!            start_linear              start_cyclic
//!      ┌────────────────────┐    ┌─────────────────────┐
//!      ▼                    │    ▼                     │
//! LinearReplay ──────────► Live ◄────────────── CyclicReplay
//!      tick past end /      ▲      wrap with stop flag /
//!      request_stop         │      on_log_replaced
//!      on_log_replaced ─────┘
//! ```
//!
//! Cancellation contract: every transition unconditionally cancels any
//! pending timer token through the [`Scheduler`] and invalidates the
//! reconstruction cache. A stray tick from a stopped session is a no-op
//! (mode guard), never a render. Two replay modes are never active at
//! once — entering one begins by stopping the other.

use std::time::Duration;

use crate::action::{Action, ActionLog};
use crate::grid::GridConfig;
use crate::reconstruct::Reconstructor;
use crate::Grid;

/// Log entries the cyclic replay advances per sequencer wrap.
pub const DEFAULT_STRIDE: usize = 4;

/// Default linear tick interval (speed 10 on the 1..=20 slider).
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(300);

/// Timer abstraction the controller schedules its linear ticks through.
///
/// The host owns the actual timing source (a tokio timer, a UI event
/// loop). The controller only ever holds one outstanding token and
/// cancels it on every transition, so overlapping callbacks cannot race
/// on the reconstruction cache.
pub trait Scheduler {
    type Token;

    /// Arrange for a tick after `delay`; the host calls
    /// [`ReplayController::tick`] when it fires.
    fn schedule_after(&mut self, delay: Duration) -> Self::Token;

    /// Cancel a previously scheduled tick. Must be unconditional and
    /// immediate — no tick for this token may fire afterwards.
    fn cancel(&mut self, token: Self::Token);
}

/// Replay states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayMode {
    Live,
    LinearReplay,
    CyclicReplay,
}

/// One reconstructed frame handed to the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayFrame {
    pub grid: Grid,
    /// Log index this frame was reconstructed at.
    pub index: usize,
    /// Linear replay only: the session ended with this frame and the
    /// controller is back in `Live`.
    pub finished: bool,
}

/// Outcome of a sequencer wrap while in (or out of) cyclic replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WrapOutcome {
    /// Not in cyclic replay — the wrap belongs to live playback.
    Ignored,
    /// Advanced by the stride; render this frame.
    Advanced(ReplayFrame),
    /// A pending stop request was honored at the loop boundary; the
    /// controller is back in `Live` and the host re-renders the live grid.
    Stopped,
}

/// The replay state machine.
pub struct ReplayController<S: Scheduler> {
    scheduler: S,
    reconstructor: Reconstructor,
    mode: ReplayMode,
    cursor: usize,
    stride: usize,
    tick_interval: Duration,
    stop_requested: bool,
    pending: Option<S::Token>,
}

impl<S: Scheduler> ReplayController<S> {
    pub fn new(config: GridConfig, scheduler: S) -> Self {
        Self {
            scheduler,
            reconstructor: Reconstructor::new(config),
            mode: ReplayMode::Live,
            cursor: 0,
            stride: DEFAULT_STRIDE,
            tick_interval: DEFAULT_TICK_INTERVAL,
            stop_requested: false,
            pending: None,
        }
    }

    pub fn mode(&self) -> ReplayMode {
        self.mode
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn set_stride(&mut self, stride: usize) {
        self.stride = stride.max(1);
    }

    /// Linear tick interval from the 1..=20 speed slider:
    /// 550ms − speed×25ms.
    pub fn set_speed(&mut self, speed: u32) {
        let millis = 550u64.saturating_sub(u64::from(speed) * 25).max(25);
        self.tick_interval = Duration::from_millis(millis);
    }

    pub fn set_tick_interval(&mut self, interval: Duration) {
        self.tick_interval = interval;
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Enter linear replay. Any active session is stopped first. Returns
    /// false (and stays `Live`) when the log has nothing to replay.
    pub fn start_linear(&mut self, log: &ActionLog) -> bool {
        self.reset_to_live();
        if log.is_empty() {
            return false;
        }
        self.mode = ReplayMode::LinearReplay;
        self.pending = Some(self.scheduler.schedule_after(self.tick_interval));
        true
    }

    /// One linear replay tick (the scheduled timer fired). Reconstructs
    /// the frame at the cursor, advances, and reschedules — or finishes
    /// and transitions back to `Live` once the cursor passes the end.
    ///
    /// Ticks arriving in any other mode are stray callbacks from a
    /// stopped session and return `None`.
    pub fn tick(&mut self, log: &ActionLog) -> Option<ReplayFrame> {
        if self.mode != ReplayMode::LinearReplay {
            return None;
        }
        // The token that triggered this tick is spent.
        self.pending = None;

        let index = self.cursor;
        let grid = self.reconstructor.reconstruct(log, index);
        self.cursor += 1;

        if self.cursor >= log.len() {
            self.reset_to_live();
            return Some(ReplayFrame { grid, index, finished: true });
        }

        self.pending = Some(self.scheduler.schedule_after(self.tick_interval));
        Some(ReplayFrame { grid, index, finished: false })
    }

    /// Enter cyclic replay and return the frame at index 0 for immediate
    /// rendering. Subsequent advancement comes from [`Self::on_wrap`].
    /// Returns `None` (and stays `Live`) when the log is empty.
    pub fn start_cyclic(&mut self, log: &ActionLog) -> Option<ReplayFrame> {
        self.reset_to_live();
        if log.is_empty() {
            return None;
        }
        self.mode = ReplayMode::CyclicReplay;
        let grid = self.reconstructor.reconstruct(log, 0);
        Some(ReplayFrame { grid, index: 0, finished: false })
    }

    /// The step sequencer's column counter wrapped to 0.
    ///
    /// Advances the cursor by the stride, clamping to the last index and
    /// arming the stop flag when clamped; a wrap with the flag already
    /// armed ends the session at the loop boundary.
    pub fn on_wrap(&mut self, log: &ActionLog) -> WrapOutcome {
        if self.mode != ReplayMode::CyclicReplay {
            return WrapOutcome::Ignored;
        }
        if self.stop_requested {
            self.reset_to_live();
            return WrapOutcome::Stopped;
        }

        let last = log.last_index().unwrap_or(0);
        self.cursor = self.cursor.saturating_add(self.stride);
        if self.cursor >= last {
            self.cursor = last;
            self.stop_requested = true;
        }

        let index = self.cursor;
        let grid = self.reconstructor.reconstruct(log, index);
        WrapOutcome::Advanced(ReplayFrame { grid, index, finished: false })
    }

    /// User pressed stop. Linear replay stops immediately; cyclic replay
    /// arms the stop flag and ends at the next wrap boundary so the loop
    /// is not cut off mid-bar.
    pub fn request_stop(&mut self) {
        match self.mode {
            ReplayMode::Live => {}
            ReplayMode::LinearReplay => self.reset_to_live(),
            ReplayMode::CyclicReplay => self.stop_requested = true,
        }
    }

    /// Unconditional transition to `Live` from any state.
    pub fn stop(&mut self) {
        self.reset_to_live();
    }

    /// The server replaced the full log (join or import): the session is
    /// destroyed and the cache cannot survive.
    pub fn on_log_replaced(&mut self) {
        self.reset_to_live();
    }

    /// An action was appended to the log. The cached prefix is
    /// unchanged, so the cache stays valid; an active session keeps
    /// walking the (now longer) log.
    pub fn on_log_appended(&mut self, _action: &Action) {}

    fn reset_to_live(&mut self) {
        if let Some(token) = self.pending.take() {
            self.scheduler.cancel(token);
        }
        self.reconstructor.invalidate();
        self.mode = ReplayMode::Live;
        self.cursor = 0;
        self.stop_requested = false;
    }
}
