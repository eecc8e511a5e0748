//! Pacing behavior between breaths.

use bellows::apps::basic::{SINK, SOURCE};
use bellows::config::Config;
use bellows::engine::{Engine, EngineOptions, MainOptions, Pacing};
use serde_json::Value;
use std::time::Duration;

#[test]
fn adaptive_sleep_saturates_when_idle() {
    // No apps, no traffic: every breath frees zero packets, so the
    // backoff climbs one microsecond per breath to the ceiling.
    let mut engine = Engine::new(EngineOptions {
        pacing: Pacing::Adaptive,
        max_sleep_us: 50,
        ..Default::default()
    });
    engine.configure(Config::new()).unwrap();
    engine.main(MainOptions {
        duration: Some(Duration::from_millis(100)),
        no_report: true,
        ..Default::default()
    });
    assert_eq!(engine.current_sleep_us(), 50);
}

#[test]
fn adaptive_sleep_vanishes_under_load() {
    let mut engine = Engine::new(EngineOptions {
        pacing: Pacing::Adaptive,
        max_sleep_us: 100,
        ..Default::default()
    });
    let mut c = Config::new();
    c.app("psrc", &SOURCE, Value::Null).unwrap();
    c.app("psnk", &SINK, Value::Null).unwrap();
    c.link("psrc.tx -> psnk.rx").unwrap();
    engine.configure(c).unwrap();
    engine.main(MainOptions {
        duration: Some(Duration::from_millis(100)),
        no_report: true,
        ..Default::default()
    });
    // Every breath frees packets, so the backoff halves to nothing.
    assert_eq!(engine.current_sleep_us(), 0);
}

#[test]
fn fixed_hz_holds_cadence() {
    let mut engine = Engine::new(EngineOptions {
        pacing: Pacing::Hz(200),
        ..Default::default()
    });
    engine.configure(Config::new()).unwrap();
    engine.main(MainOptions {
        duration: Some(Duration::from_millis(500)),
        no_report: true,
        ..Default::default()
    });
    // ~100 breaths expected; generous bounds for loaded CI machines.
    let breaths = engine.breaths();
    assert!(breaths >= 25, "breaths: {}", breaths);
    assert!(breaths <= 400, "breaths: {}", breaths);
}

#[test]
fn busywait_never_sleeps() {
    let mut engine = Engine::new(EngineOptions {
        pacing: Pacing::Busywait,
        ..Default::default()
    });
    engine.configure(Config::new()).unwrap();
    engine.main(MainOptions {
        duration: Some(Duration::from_millis(50)),
        no_report: true,
        ..Default::default()
    });
    // Orders of magnitude more iterations than any paced mode.
    assert!(engine.breaths() > 1_000, "breaths: {}", engine.breaths());
}
