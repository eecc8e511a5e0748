//! The app contract: pluggable packet producers, transformers and
//! consumers driven by the engine.
//!
//! Apps come in two halves, the same split the node contract in the
//! original kernel uses: an [`AppClass`] is the static side (constructor,
//! config schema, diagnostic zone, counter names) and an [`App`] is one
//! running instance with optional lifecycle hooks. Hooks an app does not
//! implement default to no-ops; the engine consults [`App::hooks`] once at
//! start so the breath loop skips apps without a `pull` or `push` without
//! a dynamic check per call.
//!
//! During `pull` and `push` an app reaches its wired links through an
//! [`AppCtx`]. Port tables are rebuilt on every reconfiguration; the
//! `link` hook is the app's chance to re-resolve port names into
//! [`LinkId`]s it caches for the hot path.

use crate::config::ConfigSchema;
use crate::counter::Frame;
use crate::link::Link;
use crate::packet::{self, Packet};
use serde_json::Value;
use thiserror::Error;

/// Error from an app constructor or reconfig hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct AppError(pub String);

impl AppError {
    pub fn new(msg: impl Into<String>) -> AppError {
        AppError(msg.into())
    }
}

/// Which optional hooks an app instance implements.
///
/// `stop` and `link` are cheap and rare, so they are always invoked (a
/// no-op default body costs nothing); only the hooks the scheduler and
/// reconfigurator must branch on are declared here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hooks {
    pub pull: bool,
    pub push: bool,
    pub report: bool,
    pub reconfig: bool,
}

impl Hooks {
    pub fn none() -> Hooks {
        Hooks::default()
    }

    pub fn with_pull(mut self) -> Hooks {
        self.pull = true;
        self
    }

    pub fn with_push(mut self) -> Hooks {
        self.push = true;
        self
    }

    pub fn with_report(mut self) -> Hooks {
        self.report = true;
        self
    }

    pub fn with_reconfig(mut self) -> Hooks {
        self.reconfig = true;
        self
    }
}

/// Handle to a link in the engine's active link array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub(crate) usize);

/// An app's named ports, keyed both by port name and by insertion index.
#[derive(Debug, Default, Clone)]
pub struct PortTable {
    ports: Vec<(String, LinkId)>,
}

impl PortTable {
    pub(crate) fn clear(&mut self) {
        self.ports.clear();
    }

    pub(crate) fn insert(&mut self, name: &str, id: LinkId) {
        self.ports.push((name.to_string(), id));
    }

    /// Link wired to the named port.
    pub fn get(&self, name: &str) -> Option<LinkId> {
        self.ports
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    }

    /// Link by insertion index.
    pub fn at(&self, index: usize) -> Option<LinkId> {
        self.ports.get(index).map(|(_, id)| *id)
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, LinkId)> {
        self.ports.iter().map(|(n, id)| (n.as_str(), *id))
    }
}

/// What an app sees while its `pull` or `push` hook runs: its own port
/// tables, packet transfer on the wired links, and its counter frame.
pub struct AppCtx<'a> {
    input: &'a PortTable,
    output: &'a PortTable,
    links: &'a mut [Link],
    frame: Option<&'a Frame>,
}

impl<'a> AppCtx<'a> {
    pub(crate) fn new(
        input: &'a PortTable,
        output: &'a PortTable,
        links: &'a mut [Link],
        frame: Option<&'a Frame>,
    ) -> AppCtx<'a> {
        AppCtx {
            input,
            output,
            links,
            frame,
        }
    }

    pub fn input(&self) -> &PortTable {
        self.input
    }

    pub fn output(&self) -> &PortTable {
        self.output
    }

    /// Enqueue a packet onto a link. A full link drops the packet and
    /// counts it; see [`crate::link::Link::transmit`].
    pub fn transmit(&mut self, id: LinkId, p: Packet) {
        self.links[id.0].transmit(p);
    }

    /// Dequeue the oldest packet from a link.
    pub fn receive(&mut self, id: LinkId) -> Option<Packet> {
        self.links[id.0].receive()
    }

    /// Packets queued on a link.
    pub fn readable(&self, id: LinkId) -> usize {
        self.links[id.0].readable()
    }

    /// Free slots on a link.
    pub fn writable(&self, id: LinkId) -> usize {
        self.links[id.0].writable()
    }

    /// Return a packet to the arena.
    pub fn free(&mut self, p: Packet) {
        packet::free(p);
    }

    /// The app's counter frame, if its class declares one.
    pub fn frame(&self) -> Option<&Frame> {
        self.frame
    }
}

/// One running app instance. All hooks are optional; override
/// [`App::hooks`] to tell the engine which ones to dispatch.
pub trait App {
    /// Which optional hooks this instance implements.
    fn hooks(&self) -> Hooks {
        Hooks::none()
    }

    /// Producer phase: bring new packets into the graph. Called once per
    /// breath. Enqueue at most [`crate::link::PULL_CAP`] packets per
    /// output link per call.
    fn pull(&mut self, _ctx: &mut AppCtx) {}

    /// Consumer phase: advance packets one step. Called whenever an input
    /// link has new data.
    fn push(&mut self, _ctx: &mut AppCtx) {}

    /// Called after every reconfiguration, once ports are wired. Cache
    /// port lookups here.
    fn link(&mut self, _input: &PortTable, _output: &PortTable) {}

    /// In-place reconfiguration with a new argument. Only called when
    /// [`App::hooks`] declares `reconfig`; otherwise an argument change
    /// restarts the app.
    fn reconfig(&mut self, _arg: &Value) {}

    /// Called before the instance is destroyed.
    fn stop(&mut self) {}

    /// Called at report emission.
    fn report(&mut self) {}
}

/// The static side of an app: identity, constructor and schemas.
///
/// Classes are compared by [`AppClass::name`] during reconfiguration: a
/// changed class restarts the app.
pub trait AppClass: Sync {
    /// Class name, the identity used by the configuration diff.
    fn name(&self) -> &'static str;

    /// Schema the configuration layer validates app arguments against.
    fn schema(&self) -> ConfigSchema {
        ConfigSchema::default()
    }

    /// Diagnostic label for profiling and tracing. Defaults to the class
    /// name.
    fn zone(&self) -> &'static str {
        self.name()
    }

    /// Names of the per-app counters to create in the app's frame. Empty
    /// means no frame.
    fn counters(&self) -> &'static [&'static str] {
        &[]
    }

    /// Construct an instance from a validated argument.
    fn new(&self, arg: &Value) -> Result<Box<dyn App>, AppError>;
}
