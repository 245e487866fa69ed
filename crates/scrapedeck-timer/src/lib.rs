//! Cancellable timers for Scrapedeck.
//!
//! Session lifecycles need two kinds of deferred work: a one-shot timer
//! (refresh the access token shortly before it expires) and a periodic
//! timer (check the token's expiry on a fixed cadence). Both are modelled
//! by [`Timer`], an owned handle that cancels its background task when it
//! is cancelled explicitly, replaced, or dropped. A timer is never left
//! running because someone forgot about it.
//!
//! # Firing model
//!
//! When a timer fires, its action is spawned as a *detached* task. The
//! timer itself only owns the waiting. This matters when an action
//! reschedules the very timer that fired it: replacing the handle cancels
//! the (already finished) wait, never the action that is still running.
//!
//! ```ignore
//! let mut slot: Option<Timer> = None;
//! slot = Some(Timer::once("token-refresh", Duration::from_secs(780), async move {
//!     // refresh, then store a new Timer in the slot
//! }));
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What a periodic timer does when it wakes up late (e.g. the process was
/// suspended or the runtime was overloaded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissedTickPolicy {
    /// Fire once for the missed ticks, then resume on the original grid.
    /// Safest default: a suspended laptop doesn't wake up to a burst.
    #[default]
    Skip,
    /// Fire every missed tick back to back until caught up.
    Burst,
    /// Fire once, then restart the period from the late fire.
    Delay,
}

impl MissedTickPolicy {
    fn behavior(self) -> MissedTickBehavior {
        match self {
            Self::Skip => MissedTickBehavior::Skip,
            Self::Burst => MissedTickBehavior::Burst,
            Self::Delay => MissedTickBehavior::Delay,
        }
    }
}

/// Configuration for a periodic timer.
#[derive(Debug, Clone)]
pub struct PeriodicConfig {
    /// Time between fires.
    pub period: Duration,
    /// Late-wakeup handling.
    pub policy: MissedTickPolicy,
    /// Random delay (0..jitter) added before the *first* fire, so many
    /// clients started together don't all wake at the same instant.
    pub initial_jitter: Duration,
}

impl PeriodicConfig {
    /// Shortest accepted period. Tokio rejects a zero period outright.
    pub const MIN_PERIOD: Duration = Duration::from_millis(1);

    /// A config with the given period, no jitter, and the default policy.
    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            policy: MissedTickPolicy::default(),
            initial_jitter: Duration::ZERO,
        }
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`Timer::every`].
    pub fn validated(mut self) -> Self {
        if self.period < Self::MIN_PERIOD {
            warn!(
                period_ms = self.period.as_secs_f64() * 1000.0,
                "timer period below minimum, clamping"
            );
            self.period = Self::MIN_PERIOD;
        }
        self
    }

    /// Delay before the first fire: one period plus jitter.
    fn first_delay(&self) -> Duration {
        let jitter_us = self.initial_jitter.as_micros() as u64;
        let jitter = if jitter_us > 0 {
            Duration::from_micros(rand::rng().random_range(0..jitter_us))
        } else {
            Duration::ZERO
        };
        self.period + jitter
    }
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

/// Whether a timer fires once or repeatedly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Once,
    Periodic,
}

/// An owned, cancellable timer.
///
/// At most one background task backs each handle. Cancelling is
/// idempotent; dropping the handle cancels it.
pub struct Timer {
    label: &'static str,
    kind: TimerKind,
    handle: Option<JoinHandle<()>>,
    fires: Arc<AtomicU64>,
}

impl Timer {
    /// Runs `action` once, `delay` from now.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime, like `tokio::spawn`.
    pub fn once<F>(label: &'static str, delay: Duration, action: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let fires = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&fires);
        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            counter.fetch_add(1, Ordering::Relaxed);
            trace!(timer = label, "one-shot timer fired");
            tokio::spawn(action);
        });

        debug!(
            timer = label,
            delay_ms = delay.as_millis() as u64,
            "one-shot timer scheduled"
        );

        Self {
            label,
            kind: TimerKind::Once,
            handle: Some(handle),
            fires,
        }
    }

    /// Runs a fresh future from `action` every `config.period`, starting
    /// one period (plus jitter) from now.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime, like `tokio::spawn`.
    pub fn every<F, Fut>(label: &'static str, config: PeriodicConfig, mut action: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let config = config.validated();
        let fires = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&fires);
        let start = Instant::now() + config.first_delay();
        let period = config.period;
        let policy = config.policy;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(start, period);
            interval.set_missed_tick_behavior(policy.behavior());
            loop {
                interval.tick().await;
                let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(timer = label, fire = n, "periodic timer fired");
                tokio::spawn(action());
            }
        });

        debug!(
            timer = label,
            period_ms = period.as_millis() as u64,
            ?policy,
            "periodic timer started"
        );

        Self {
            label,
            kind: TimerKind::Periodic,
            handle: Some(handle),
            fires,
        }
    }

    /// Stops the timer. Actions that already fired keep running.
    ///
    /// Safe to call multiple times (idempotent).
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                debug!(timer = self.label, "timer cancelled");
            }
            handle.abort();
        }
    }

    /// `true` while the timer can still fire: not cancelled, and (for a
    /// one-shot timer) not yet fired.
    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// How many times the timer has fired so far.
    pub fn fire_count(&self) -> u64 {
        self.fires.load(Ordering::Relaxed)
    }

    /// The name given at creation, used in logs.
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("pending", &self.is_pending())
            .field("fires", &self.fire_count())
            .finish()
    }
}
