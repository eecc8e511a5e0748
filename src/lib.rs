//! # Bellows
//!
//! A single-threaded, user-space packet dataflow engine.
//!
//! ## Architecture
//!
//! The core flow is: **Config → Engine → Breath**.
//!
//! - **Config**: Describe apps and the links between their ports.
//! - **Engine**: `configure` migrates the running graph to a new
//!   configuration with minimal disruption.
//! - **Breath**: One loop iteration: every app's `pull` brings packets
//!   in, then a fixed-point `push` sweep drains links until quiescence.
//!
//! ## Hot-path discipline
//!
//! The breath loop avoids allocation and locking: packets recycle through
//! an arena free-list, links are preallocated rings, and counters are
//! plain cells mirrored to atomics every hundred breaths. Graph mutation
//! and configuration may allocate.
//!
//! ## Fault containment
//!
//! In tolerant mode an app that panics in a hook is marked dead and the
//! engine keeps breathing; dead apps restart after a delay. In strict
//! mode (the default) the panic propagates.
//!
//! ## Invariants
//!
//! - A full link drops the incoming packet and counts it; enqueue never
//!   blocks and never exceeds the ring.
//! - Pulls happen strictly before pushes within a breath; apps and links
//!   run in deterministic (insertion) order.
//! - `configure` is all-or-nothing between breaths: a rejected
//!   configuration leaves the running graph untouched.
//!
//! ## Example
//!
//! ```rust
//! use bellows::apps::basic::{SINK, SOURCE};
//! use bellows::config::Config;
//! use bellows::engine::{Engine, EngineOptions, MainOptions};
//! use serde_json::Value;
//! use std::time::Duration;
//!
//! let mut config = Config::new();
//! config.app("src", &SOURCE, Value::Null).unwrap();
//! config.app("snk", &SINK, Value::Null).unwrap();
//! config.link("src.tx -> snk.rx").unwrap();
//!
//! let mut engine = Engine::new(EngineOptions::default());
//! engine.configure(config).unwrap();
//! engine.main(MainOptions {
//!     duration: Some(Duration::from_millis(10)),
//!     no_report: true,
//!     ..Default::default()
//! });
//! assert!(engine.breaths() > 0);
//! ```

pub mod app;
pub mod apps;
pub mod config;
pub mod counter;
pub mod engine;
pub mod histogram;
pub mod link;
pub mod packet;
pub mod timeline;
pub mod timer;
