//! Hashed Timing Wheel
//!
//! Schedules one-shot callbacks identified by a key. The wheel is a ring of
//! slots with a hand that advances one slot per tick:
//!
//! ```text
//!              hand
//!               │
//!        ┌───┬──▼┬───┬───┬───┬───┐
//!        │ 0 │ 1 │ 2 │ 3 │ 4 │ 5 │  ... slot_count
//!        └───┴───┴─┬─┴───┴───┴───┘
//!                  │
//!                  ▼
//!          { key -> (circle, job) }
//! ```
//!
//! A task whose delay exceeds one full rotation carries a `circle` counter
//! that is decremented each time the hand passes it; the task fires when the
//! hand reaches its slot with `circle == 0`.
//!
//! All mutation happens on a single Tokio task. [`TimeWheel`] is a cheap,
//! cloneable handle that talks to it over a channel, so `add`, `cancel` and
//! `stop` never block the caller.

use bytes::Bytes;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, trace};

/// A scheduled callback.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Tick interval and ring size for a [`TimeWheel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelConfig {
    /// Time the hand spends on each slot.
    pub tick: Duration,

    /// Number of slots in the ring.
    pub slots: usize,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            slots: 60,
        }
    }
}

struct Task {
    circle: usize,
    job: Job,
}

/// The ring itself. Owned by the wheel task; synchronous so the slot
/// arithmetic can be driven directly in tests.
struct Wheel {
    slots: Vec<HashMap<Bytes, Task>>,
    /// Which slot each pending key lives in.
    index: HashMap<Bytes, usize>,
    hand: usize,
    tick: Duration,
}

impl Wheel {
    fn new(config: &WheelConfig) -> Self {
        let slot_count = config.slots.max(1);
        Self {
            slots: (0..slot_count).map(|_| HashMap::new()).collect(),
            index: HashMap::new(),
            hand: 0,
            tick: config.tick.max(Duration::from_millis(1)),
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    /// Places a task `delay` into the future, replacing any task already
    /// registered under `key`.
    fn insert(&mut self, key: Bytes, delay: Duration, job: Job) {
        self.remove(&key);

        let slot_count = self.slots.len();
        let ticks = usize::try_from(delay.as_nanos() / self.tick.as_nanos()).unwrap_or(usize::MAX);

        let mut circle = ticks / slot_count;
        let mut pos = (self.hand + ticks % slot_count) % slot_count;

        // The hand has already left its current slot; a task landing there
        // either waits for the next pass or moves one slot ahead.
        if pos == self.hand {
            if circle > 0 {
                circle -= 1;
            } else {
                pos = (pos + 1) % slot_count;
            }
        }

        self.slots[pos].insert(key.clone(), Task { circle, job });
        self.index.insert(key, pos);
    }

    /// Drops the task registered under `key`, if any.
    fn remove(&mut self, key: &[u8]) -> bool {
        match self.index.remove(key) {
            Some(pos) => self.slots[pos].remove(key).is_some(),
            None => false,
        }
    }

    /// Moves the hand one slot and returns the tasks that are now due.
    fn advance(&mut self) -> Vec<(Bytes, Job)> {
        self.hand = (self.hand + 1) % self.slots.len();

        let slot = std::mem::take(&mut self.slots[self.hand]);
        let mut due = Vec::new();

        for (key, mut task) in slot {
            if task.circle > 0 {
                task.circle -= 1;
                self.slots[self.hand].insert(key, task);
            } else {
                self.index.remove(&key);
                due.push((key, task.job));
            }
        }

        due
    }
}

enum Message {
    Add { key: Bytes, delay: Duration, job: Job },
    Cancel(Bytes),
    Stop,
}

/// Handle to a running timing wheel.
///
/// Cloning the handle is cheap; all clones feed the same wheel task.
#[derive(Debug, Clone)]
pub struct TimeWheel {
    tx: mpsc::UnboundedSender<Message>,
}

impl TimeWheel {
    /// Spawns the wheel task on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(config: WheelConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let wheel = Wheel::new(&config);

        info!(
            tick_ms = wheel.tick.as_millis() as u64,
            slots = wheel.slots.len(),
            "Timing wheel started"
        );

        tokio::spawn(run(wheel, rx));
        Self { tx }
    }

    /// Schedules `job` to run after `delay`, replacing any pending job for
    /// the same key.
    pub fn add<F>(&self, key: Bytes, delay: Duration, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.send(Message::Add {
            key,
            delay,
            job: Box::new(job),
        });
    }

    /// Cancels the pending job for `key`. A no-op if none is pending.
    pub fn cancel(&self, key: Bytes) {
        self.send(Message::Cancel(key));
    }

    /// Stops the wheel. Pending jobs are dropped without running.
    pub fn stop(&self) {
        self.send(Message::Stop);
    }

    fn send(&self, message: Message) {
        if self.tx.send(message).is_err() {
            trace!("Timing wheel already stopped, message dropped");
        }
    }
}

async fn run(mut wheel: Wheel, mut rx: mpsc::UnboundedReceiver<Message>) {
    let mut ticker = interval(wheel.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let due = wheel.advance();
                if !due.is_empty() {
                    trace!(count = due.len(), pending = wheel.len(), "Timing wheel firing");
                }
                fire(due);
            }
            message = rx.recv() => match message {
                Some(Message::Add { key, delay, job }) => wheel.insert(key, delay, job),
                Some(Message::Cancel(key)) => {
                    wheel.remove(&key);
                }
                Some(Message::Stop) | None => break,
            },
        }
    }

    debug!(pending = wheel.len(), "Timing wheel stopped");
}

/// Runs due jobs, isolating panics so one bad callback cannot stop the wheel.
fn fire(due: Vec<(Bytes, Job)>) {
    for (key, job) in due {
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!(key = %String::from_utf8_lossy(&key), "Scheduled job panicked");
        }
    }
}
