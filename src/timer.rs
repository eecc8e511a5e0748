//! Timers polled between breaths.
//!
//! The main loop polls the timer set once per iteration, after the breath
//! and before pacing. Timers run on the engine thread against the engine
//! clock, so like every other hook they must not block. Due timers run in
//! due order; ties run in activation order.

#![forbid(unsafe_code)]

use std::time::Duration;

type TimerFn = Box<dyn FnMut()>;

struct Timer {
    due: Duration,
    period: Option<Duration>,
    serial: u64,
    f: TimerFn,
}

/// The engine's pending timers.
#[derive(Default)]
pub struct Timers {
    pending: Vec<Timer>,
    next_serial: u64,
}

impl Timers {
    pub fn new() -> Timers {
        Timers::default()
    }

    /// Run `f` once, `delay` after `now`.
    pub fn once(&mut self, now: Duration, delay: Duration, f: impl FnMut() + 'static) {
        self.activate(now + delay, None, Box::new(f));
    }

    /// Run `f` every `period`, starting one period after `now`.
    pub fn every(&mut self, now: Duration, period: Duration, f: impl FnMut() + 'static) {
        self.activate(now + period, Some(period), Box::new(f));
    }

    fn activate(&mut self, due: Duration, period: Option<Duration>, f: TimerFn) {
        let serial = self.next_serial;
        self.next_serial += 1;
        self.pending.push(Timer {
            due,
            period,
            serial,
            f,
        });
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Run every timer due at `now`. Repeating timers are rescheduled from
    /// their previous due time so the cadence does not drift with poll
    /// jitter. Returns how many timers ran.
    pub fn poll(&mut self, now: Duration) -> usize {
        let mut due: Vec<Timer> = Vec::new();
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].due <= now {
                due.push(self.pending.swap_remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by_key(|t| (t.due, t.serial));
        let ran = due.len();
        for mut timer in due {
            (timer.f)();
            if let Some(period) = timer.period {
                timer.due += period;
                // A long stall may leave the due time still in the past;
                // catch up without firing for every missed period.
                if timer.due <= now {
                    timer.due = now + period;
                }
                self.pending.push(timer);
            }
        }
        ran
    }
}
