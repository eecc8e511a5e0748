//! Timeline: a statistically sampled event stream from the breath loop.
//!
//! The hot path signals facts; an observer judges them later. Events are
//! fixed-size `Copy` records pushed into a lock-free SPSC ring and drained
//! on the observer's side. If the ring is full the event is dropped,
//! which is preferable to blocking the breath.
//!
//! Severity gating is probabilistic: after each breath the engine rotates
//! the effective level by sampling, so `packet`-level detail shows up in
//! roughly one breath in 100,000 while `warning` events always land. The
//! average cost of detailed tracing is therefore negligible.

use rtrb::{Consumer, Producer, RingBuffer};

/// Event ring capacity. Large enough to hold the events of several
/// breaths between observer drains.
pub const TIMELINE_QUEUE_CAPACITY: usize = 4096;

/// Event severity, most important first. An event is recorded when its
/// level is at or below the effective level chosen for the current breath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Warning = 0,
    Info = 1,
    Trace = 2,
    App = 3,
    Packet = 4,
}

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    BreathStart,
    BreathPulled,
    BreathPushed,
    BreathEnd,
    Sleep,
    Wakeup,
    ConfigApplied,
    AppDead,
    AppRestarted,
}

/// A fixed-size timeline record. `arg0`/`arg1` carry event-specific data
/// (packet counts, sleep microseconds, app indexes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub level: Level,
    pub kind: EventKind,
    pub breath: u64,
    pub arg0: u64,
    pub arg1: u64,
}

// xorshift64* is enough here: the sampler only has to be cheap and
// well-spread, not cryptographic.
#[derive(Debug)]
struct Sampler(u64);

impl Sampler {
    fn new(seed: u64) -> Sampler {
        Sampler(if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed })
    }

    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn next_unit(&mut self) -> f64 {
        (self.next() >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Engine-side timeline handle: records events subject to the current
/// effective level.
#[derive(Debug)]
pub struct Timeline {
    tx: Producer<Event>,
    level: Level,
    sampler: Sampler,
}

impl Timeline {
    /// Create a timeline and the consumer an observer drains.
    pub fn new(seed: u64) -> (Timeline, Consumer<Event>) {
        let (tx, rx) = RingBuffer::new(TIMELINE_QUEUE_CAPACITY);
        (
            Timeline {
                tx,
                level: Level::Warning,
                sampler: Sampler::new(seed),
            },
            rx,
        )
    }

    /// The effective level for the current breath.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Sample a new effective level. Called once per breath.
    pub fn rotate(&mut self) {
        let r = self.sampler.next_unit();
        self.level = if r < 1e-5 {
            Level::Packet
        } else if r < 1e-4 {
            Level::App
        } else if r < 1e-2 {
            Level::Trace
        } else if r < 1e-1 {
            Level::Info
        } else {
            Level::Warning
        };
    }

    /// Record an event if `level` passes the gate. A full ring drops the
    /// event silently.
    pub fn record(&mut self, level: Level, kind: EventKind, breath: u64, arg0: u64, arg1: u64) {
        if level <= self.level {
            let _ = self.tx.push(Event {
                level,
                kind,
                breath,
                arg0,
                arg1,
            });
        }
    }
}

/// Drain all pending events on the observer side.
pub fn drain(rx: &mut Consumer<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(e) = rx.pop() {
        events.push(e);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_always_passes() {
        let (mut tl, mut rx) = Timeline::new(1);
        tl.record(Level::Warning, EventKind::AppDead, 0, 0, 0);
        tl.record(Level::Trace, EventKind::BreathStart, 0, 0, 0);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::AppDead);
    }

    #[test]
    fn rotation_favors_warning() {
        let (mut tl, _rx) = Timeline::new(42);
        let mut counts = [0usize; 5];
        for _ in 0..100_000 {
            tl.rotate();
            counts[tl.level() as usize] += 1;
        }
        // Warning ~90%, info ~9%, trace ~1%; the detailed levels are rare.
        assert!(counts[Level::Warning as usize] > 85_000);
        assert!(counts[Level::Info as usize] > 5_000);
        assert!(counts[Level::Trace as usize] > 300);
        assert!(counts[Level::Packet as usize] < 50);
    }

    #[test]
    fn full_ring_drops() {
        let (mut tl, mut rx) = Timeline::new(7);
        for i in 0..(TIMELINE_QUEUE_CAPACITY as u64 + 100) {
            tl.record(Level::Warning, EventKind::BreathEnd, i, 0, 0);
        }
        assert_eq!(drain(&mut rx).len(), TIMELINE_QUEUE_CAPACITY);
    }

    #[test]
    fn sampler_is_deterministic() {
        let (mut a, _ra) = Timeline::new(99);
        let (mut b, _rb) = Timeline::new(99);
        for _ in 0..1000 {
            a.rotate();
            b.rotate();
            assert_eq!(a.level(), b.level());
        }
    }
}
