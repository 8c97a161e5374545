use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

//
// ─── EVENTS ────────────────────────────────────────────────────────────────────
//

/// Named time-remaining warnings, each fired at most once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    FiveMinutes,
    OneMinute,
    ThirtySeconds,
}

impl Warning {
    /// Seconds remaining at which this warning triggers.
    #[must_use]
    pub fn threshold_secs(self) -> u32 {
        match self {
            Warning::FiveMinutes => 300,
            Warning::OneMinute => 60,
            Warning::ThirtySeconds => 30,
        }
    }
}

const WARNINGS: [Warning; 3] = [Warning::FiveMinutes, Warning::OneMinute, Warning::ThirtySeconds];

/// Typed events emitted by the countdown, one batch per second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountdownEvent {
    Tick { remaining_secs: u32 },
    Warning {
        warning: Warning,
        remaining_secs: u32,
    },
    Expired,
}

//
// ─── PURE COUNTDOWN CORE ───────────────────────────────────────────────────────
//

/// Per-second countdown transitions, independent of any timer.
///
/// Warnings are edge-triggered: each fires once when the remaining time
/// crosses its threshold from above, never again while below it. Thresholds
/// already at or below the starting budget never fire (a 2-minute quiz gets
/// no five-minute warning). After `Expired`, further ticks produce nothing.
#[derive(Debug, Clone)]
pub struct Countdown {
    remaining_secs: u32,
    fired: [bool; WARNINGS.len()],
    expired: bool,
}

impl Countdown {
    #[must_use]
    pub fn new(total_secs: u32) -> Self {
        let mut fired = [false; WARNINGS.len()];
        for (slot, warning) in fired.iter_mut().zip(WARNINGS) {
            // Never crossed if we start at or under the threshold.
            *slot = total_secs <= warning.threshold_secs();
        }
        Self {
            remaining_secs: total_secs,
            fired,
            expired: total_secs == 0,
        }
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Advance one second, returning the events this second produced.
    ///
    /// The batch holds any newly crossed warning followed by `Tick`, or
    /// `Expired` as the final event of the countdown's life.
    pub fn tick(&mut self) -> Vec<CountdownEvent> {
        if self.expired {
            return Vec::new();
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(1);

        let mut events = Vec::with_capacity(2);
        for (slot, warning) in self.fired.iter_mut().zip(WARNINGS) {
            if !*slot && self.remaining_secs <= warning.threshold_secs() {
                *slot = true;
                events.push(CountdownEvent::Warning {
                    warning,
                    remaining_secs: self.remaining_secs,
                });
            }
        }

        if self.remaining_secs == 0 {
            self.expired = true;
            events.push(CountdownEvent::Expired);
        } else {
            events.push(CountdownEvent::Tick {
                remaining_secs: self.remaining_secs,
            });
        }
        events
    }
}

//
// ─── SCHEDULER ─────────────────────────────────────────────────────────────────
//

/// Handle to a running countdown task.
///
/// Stopping is hard: the task is aborted and no further events are delivered.
/// Dropping the handle stops the task the same way, so an abandoned session
/// cannot keep a timer alive.
#[derive(Debug)]
pub struct CountdownHandle {
    task: JoinHandle<()>,
}

impl CountdownHandle {
    pub fn stop(&self) {
        self.task.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Drives a [`Countdown`] on a one-second interval, delivering events over a
/// channel until expiry, stop, or the receiver going away.
pub struct CountdownScheduler;

impl CountdownScheduler {
    #[must_use]
    pub fn spawn(total_secs: u32) -> (CountdownHandle, mpsc::UnboundedReceiver<CountdownEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let mut countdown = Countdown::new(total_secs);
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // The first interval tick completes immediately; skip it so the
            // first event arrives a full second after spawn.
            interval.tick().await;
            loop {
                interval.tick().await;
                for event in countdown.tick() {
                    let last = event == CountdownEvent::Expired;
                    if tx.send(event).is_err() || last {
                        return;
                    }
                }
            }
        });
        (CountdownHandle { task }, rx)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
