//! The engine: owns the active app graph and drives it breath by breath.
//!
//! A breath is one iteration of the event loop: refresh the clock,
//! restart overdue dead apps, run every app's `pull` (inhale), then drain
//! links to a fixed point by running consumers' `push` (exhale). Between
//! breaths the pacer sleeps to hold a fixed cadence or to back off when
//! idle. Everything runs on one thread; parallelism is achieved by
//! running more engine processes, not more threads.
//!
//! `configure` migrates the running graph to a new configuration with
//! minimal disruption: unchanged apps keep their instances, changed
//! arguments reconfigure in place when the app supports it, and link
//! buffers survive whenever their specification does.

use crate::app::{App, AppClass, AppCtx, Hooks, LinkId, PortTable};
use crate::config::Config;
use crate::counter::{Counter, Frame};
use crate::histogram::Histogram;
use crate::link::{Link, LinkStats};
use crate::packet;
use crate::timeline::{self, EventKind, Level, Timeline};
use crate::timer::Timers;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Counters are published to their mirrors every this many breaths.
const COUNTER_COMMIT_INTERVAL: u64 = 100;

/// Minimum sleep worth suspending for in fixed-frequency pacing.
const MIN_SLEEP: Duration = Duration::from_micros(1);

/// Errors surfaced synchronously from [`Engine::configure`]. The running
/// graph is left untouched when configure fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigureError {
    #[error("link {link:?} references undefined app {app:?}")]
    UndefinedApp { link: String, app: String },
    #[error("constructing app {app:?}: {error}")]
    Construction { app: String, error: String },
}

/// Inter-breath pacing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Never sleep. Lowest latency, one full core.
    Busywait,
    /// Hold a fixed breaths-per-second cadence.
    Hz(u64),
    /// Back off proportionally when breaths free no packets.
    Adaptive,
}

/// Engine construction options.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub pacing: Pacing,
    /// Ceiling for the adaptive pacer's sleep, in microseconds.
    pub max_sleep_us: u64,
    /// How long an app stays dead before the engine restarts it.
    pub restart_delay: Duration,
    /// Tolerant mode contains app failures; strict mode (the default)
    /// propagates them.
    pub tolerant: bool,
    /// Seed for the timeline's severity sampler. Zero picks a fixed seed.
    pub timeline_seed: u64,
}

impl Default for EngineOptions {
    fn default() -> EngineOptions {
        EngineOptions {
            pacing: Pacing::Adaptive,
            max_sleep_us: 100,
            restart_delay: Duration::from_secs(2),
            tolerant: false,
            timeline_seed: 0,
        }
    }
}

/// Which sections the end-of-run report includes.
#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    pub load: bool,
    pub links: bool,
    pub apps: bool,
}

impl Default for ReportOptions {
    fn default() -> ReportOptions {
        ReportOptions {
            load: true,
            links: true,
            apps: true,
        }
    }
}

/// Options for [`Engine::main`].
#[derive(Default)]
pub struct MainOptions {
    /// Stop after this long.
    pub duration: Option<Duration>,
    /// Stop when this returns true. Checked once per iteration.
    pub done: Option<Box<dyn FnMut() -> bool>>,
    /// Skip timer polling.
    pub no_timers: bool,
    /// Skip the end-of-run report.
    pub no_report: bool,
    pub report: ReportOptions,
    /// Also emit the report periodically while running.
    pub report_interval: Option<Duration>,
    /// Record per-breath latency in a log-scale histogram.
    pub measure_latency: bool,
}

struct Dead {
    error: String,
    time: Duration,
}

struct AppSlot {
    name: String,
    class: &'static dyn AppClass,
    arg: Value,
    zone: &'static str,
    instance: Box<dyn App>,
    hooks: Hooks,
    input: PortTable,
    output: PortTable,
    dead: Option<Dead>,
    frame: Option<Frame>,
}

#[derive(Default)]
struct Pacer {
    sleep_us: u64,
    nextbreath: Option<Duration>,
    lastfrees: u64,
}

struct MainMark {
    at: Duration,
    breaths: u64,
    frees: u64,
    freebytes: u64,
}

/// The packet-processing engine. One instance owns one app graph.
pub struct Engine {
    options: EngineOptions,
    config: Config,
    apps: Vec<AppSlot>,
    app_index: HashMap<String, usize>,
    links: Vec<Link>,
    link_index: HashMap<String, usize>,
    start: Instant,
    now: Duration,
    breaths: Counter,
    configs: Counter,
    frees: Counter,
    freebytes: Counter,
    freebits: Counter,
    pacer: Pacer,
    timers: Timers,
    timeline: Timeline,
    timeline_rx: Option<rtrb::Consumer<timeline::Event>>,
    latency: Option<Histogram>,
    main_mark: Option<MainMark>,
}

enum Action {
    Start,
    Keep,
    Reconfig,
    Restart,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "app hook panicked".to_string()
    }
}

/// Run an app hook. In tolerant mode a panic becomes an error message for
/// the caller to record; in strict mode it propagates and takes the
/// process down.
fn shielded<F: FnOnce()>(tolerant: bool, f: F) -> Result<(), String> {
    if !tolerant {
        f();
        return Ok(());
    }
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => Ok(()),
        Err(payload) => Err(panic_message(payload)),
    }
}

impl Engine {
    pub fn new(options: EngineOptions) -> Engine {
        let (timeline, timeline_rx) = Timeline::new(options.timeline_seed);
        Engine {
            options,
            config: Config::new(),
            apps: Vec::new(),
            app_index: HashMap::new(),
            links: Vec::new(),
            link_index: HashMap::new(),
            start: Instant::now(),
            now: Duration::ZERO,
            breaths: Counter::new("engine/breaths"),
            configs: Counter::new("engine/configs"),
            frees: Counter::new("engine/frees"),
            freebytes: Counter::new("engine/freebytes"),
            freebits: Counter::new("engine/freebits"),
            pacer: Pacer::default(),
            timers: Timers::new(),
            timeline,
            timeline_rx: Some(timeline_rx),
            latency: None,
            main_mark: None,
        }
    }

    /// The cached monotonic timestamp. Constant within a breath.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// The configuration the engine is currently running.
    pub fn configuration(&self) -> &Config {
        &self.config
    }

    pub fn breaths(&self) -> u64 {
        self.breaths.read()
    }

    pub fn configs(&self) -> u64 {
        self.configs.read()
    }

    pub fn app_count(&self) -> usize {
        self.apps.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn has_app(&self, name: &str) -> bool {
        self.app_index.contains_key(name)
    }

    /// App names in scheduling order.
    pub fn app_names(&self) -> Vec<String> {
        self.apps.iter().map(|a| a.name.clone()).collect()
    }

    /// The error an app died with, if it is currently dead.
    pub fn dead_error(&self, name: &str) -> Option<String> {
        let &i = self.app_index.get(name)?;
        self.apps[i].dead.as_ref().map(|d| d.error.clone())
    }

    /// Counters of the link with this canonical specification.
    pub fn link_stats(&self, spec: &str) -> Option<LinkStats> {
        self.link_index.get(spec).map(|&i| self.links[i].stats)
    }

    /// Pending timers, for registering work to run between breaths.
    pub fn timers(&mut self) -> &mut Timers {
        &mut self.timers
    }

    /// Take the timeline consumer. Yields `Some` once.
    pub fn timeline_consumer(&mut self) -> Option<rtrb::Consumer<timeline::Event>> {
        self.timeline_rx.take()
    }

    /// Swap the running graph to `config`.
    ///
    /// Apps are diffed by name: same class and argument keeps the
    /// instance, a changed argument reconfigures in place when the app
    /// supports it and restarts it otherwise, a changed class always
    /// restarts, and names only on one side start or stop. Hook
    /// application order is stop, restart, keep, reconfig, start.
    /// Constructors for started and restarted apps run first, out of
    /// place, so a construction failure leaves the running graph
    /// untouched.
    pub fn configure(&mut self, config: Config) -> Result<(), ConfigureError> {
        for spec in config.links() {
            for app in [&spec.from_app, &spec.to_app] {
                if !config.has_app(app) {
                    return Err(ConfigureError::UndefinedApp {
                        link: spec.canonical(),
                        app: app.clone(),
                    });
                }
            }
        }

        let mut actions: Vec<Action> = Vec::with_capacity(config.apps().len());
        for spec in config.apps() {
            let action = match self.app_index.get(&spec.name) {
                None => Action::Start,
                Some(&i) => {
                    let old = &self.apps[i];
                    if old.class.name() != spec.class.name() {
                        Action::Restart
                    } else if old.arg != spec.arg {
                        if old.hooks.reconfig {
                            Action::Reconfig
                        } else {
                            Action::Restart
                        }
                    } else {
                        Action::Keep
                    }
                }
            };
            actions.push(action);
        }

        // Stage all new instances before touching the running graph.
        let mut staged: HashMap<String, Box<dyn App>> = HashMap::new();
        for (spec, action) in config.apps().iter().zip(&actions) {
            if matches!(action, Action::Start | Action::Restart) {
                match spec.class.new(&spec.arg) {
                    Ok(instance) => {
                        staged.insert(spec.name.clone(), instance);
                    }
                    Err(e) => {
                        return Err(ConfigureError::Construction {
                            app: spec.name.clone(),
                            error: e.to_string(),
                        })
                    }
                }
            }
        }

        let tolerant = self.options.tolerant;
        let now = self.now;
        let old_index = std::mem::take(&mut self.app_index);
        let mut old_apps: Vec<Option<AppSlot>> =
            self.apps.drain(..).map(Some).collect();

        // stop: apps absent from the new configuration.
        for (name, &i) in &old_index {
            if !config.has_app(name) {
                let mut slot = old_apps[i].take().expect("slot taken once");
                debug!(app = %name, "stopping app");
                if let Err(error) = shielded(tolerant, || slot.instance.stop()) {
                    warn!(app = %name, %error, "stop hook failed");
                }
            }
        }

        // restart: stop the old instance; the staged one replaces it.
        for (spec, action) in config.apps().iter().zip(&actions) {
            if matches!(action, Action::Restart) {
                let i = old_index[&spec.name];
                let mut slot = old_apps[i].take().expect("slot taken once");
                debug!(app = %spec.name, "restarting app");
                if let Err(error) = shielded(tolerant, || slot.instance.stop()) {
                    warn!(app = %spec.name, %error, "stop hook failed");
                }
            }
        }

        // reconfig: same instance, new argument.
        for (spec, action) in config.apps().iter().zip(&actions) {
            if matches!(action, Action::Reconfig) {
                let i = old_index[&spec.name];
                let slot = old_apps[i].as_mut().expect("slot present");
                debug!(app = %spec.name, "reconfiguring app");
                let instance = &mut slot.instance;
                let arg = &spec.arg;
                if let Err(error) = shielded(tolerant, || instance.reconfig(arg)) {
                    warn!(app = %spec.name, %error, "reconfig hook failed");
                    slot.dead = Some(Dead { error, time: now });
                }
            }
        }

        // Assemble the new app array in configuration order.
        for (spec, action) in config.apps().iter().zip(&actions) {
            let slot = match action {
                Action::Keep | Action::Reconfig => {
                    let i = old_index[&spec.name];
                    let mut slot = old_apps[i].take().expect("slot taken once");
                    slot.arg = spec.arg.clone();
                    slot.input.clear();
                    slot.output.clear();
                    slot
                }
                Action::Start | Action::Restart => {
                    let instance = staged.remove(&spec.name).expect("staged instance");
                    let hooks = instance.hooks();
                    let frame = if spec.class.counters().is_empty() {
                        None
                    } else {
                        Some(Frame::new(
                            &format!("apps/{}", spec.name),
                            spec.class.counters(),
                        ))
                    };
                    AppSlot {
                        name: spec.name.clone(),
                        class: spec.class,
                        arg: spec.arg.clone(),
                        zone: spec.class.zone(),
                        instance,
                        hooks,
                        input: PortTable::default(),
                        output: PortTable::default(),
                        dead: None,
                        frame,
                    }
                }
            };
            self.app_index.insert(spec.name.clone(), self.apps.len());
            self.apps.push(slot);
        }

        // Links: reuse the buffer whenever the specification survives.
        let old_link_index = std::mem::take(&mut self.link_index);
        let mut old_links: Vec<Option<Link>> = self.links.drain(..).map(Some).collect();
        let mut surviving: HashMap<String, Link> = HashMap::new();
        for (canon, i) in old_link_index {
            surviving.insert(canon, old_links[i].take().expect("link taken once"));
        }
        for spec in config.links() {
            let canon = spec.canonical();
            let mut link = surviving
                .remove(&canon)
                .unwrap_or_else(|| Link::new(&canon));
            link.consumer = self.app_index[&spec.to_app];
            let id = LinkId(self.links.len());
            self.link_index.insert(canon, self.links.len());
            self.links.push(link);
            let from = self.app_index[&spec.from_app];
            self.apps[from].output.insert(&spec.from_port, id);
            let to = self.app_index[&spec.to_app];
            self.apps[to].input.insert(&spec.to_port, id);
        }
        for (canon, mut link) in surviving {
            debug!(link = %canon, "freeing link");
            link.flush();
        }

        // Ports are wired; let apps re-resolve them.
        for slot in &mut self.apps {
            let AppSlot {
                name,
                instance,
                input,
                output,
                dead,
                ..
            } = slot;
            if let Err(error) = shielded(tolerant, || instance.link(input, output)) {
                warn!(app = %name, %error, "link hook failed");
                *dead = Some(Dead { error, time: now });
            }
        }

        self.config = config;
        self.configs.add(1);
        // Configuration changes are rare; record them unconditionally.
        self.timeline.record(
            Level::Warning,
            EventKind::ConfigApplied,
            self.breaths.read(),
            self.apps.len() as u64,
            self.links.len() as u64,
        );
        info!(
            apps = self.apps.len(),
            links = self.links.len(),
            "configuration applied"
        );
        Ok(())
    }

    /// One iteration of the event loop.
    pub fn breath(&mut self) {
        self.now = self.start.elapsed();
        let breath = self.breaths.read();
        self.timeline
            .record(Level::Trace, EventKind::BreathStart, breath, 0, 0);
        if self.options.tolerant {
            self.restart_dead_apps();
        }
        self.inhale();
        self.timeline
            .record(Level::Trace, EventKind::BreathPulled, breath, 0, 0);
        self.exhale();
        self.timeline
            .record(Level::Trace, EventKind::BreathPushed, breath, 0, 0);
        self.breaths.add(1);
        if self.breaths.read() % COUNTER_COMMIT_INTERVAL == 0 {
            self.commit_counters();
        }
        self.timeline.record(
            Level::Trace,
            EventKind::BreathEnd,
            breath,
            packet::frees(),
            0,
        );
        self.timeline.rotate();
    }

    /// Producer phase: every live app with a `pull` hook runs once.
    fn inhale(&mut self) {
        let now = self.now;
        let tolerant = self.options.tolerant;
        let breath = self.breaths.read();
        let Engine {
            apps,
            links,
            timeline,
            ..
        } = self;
        for i in 0..apps.len() {
            let slot = &mut apps[i];
            if !slot.hooks.pull || slot.dead.is_some() {
                continue;
            }
            let AppSlot {
                name,
                instance,
                input,
                output,
                frame,
                dead,
                ..
            } = slot;
            let mut ctx = AppCtx::new(input, output, links, frame.as_ref());
            if let Err(error) = shielded(tolerant, || instance.pull(&mut ctx)) {
                warn!(app = %name, %error, "app died in pull");
                *dead = Some(Dead { error, time: now });
                timeline.record(Level::Warning, EventKind::AppDead, breath, i as u64, 0);
            }
        }
    }

    /// Consumer phase: sweep the links, pushing wherever data arrived,
    /// until a sweep makes no progress. The first sweep visits every
    /// link; later sweeps only those flagged since. Terminates because
    /// every push either drains a link or fills a bounded one.
    fn exhale(&mut self) {
        let now = self.now;
        let tolerant = self.options.tolerant;
        let breath = self.breaths.read();
        let Engine {
            apps,
            links,
            timeline,
            ..
        } = self;
        let mut firstloop = true;
        loop {
            let mut progress = false;
            for li in 0..links.len() {
                if !(firstloop || links[li].has_new_data) {
                    continue;
                }
                links[li].has_new_data = false;
                let ci = links[li].consumer;
                let slot = &mut apps[ci];
                if !slot.hooks.push || slot.dead.is_some() {
                    continue;
                }
                let AppSlot {
                    name,
                    instance,
                    input,
                    output,
                    frame,
                    dead,
                    ..
                } = slot;
                let mut ctx = AppCtx::new(input, output, links, frame.as_ref());
                if let Err(error) = shielded(tolerant, || instance.push(&mut ctx)) {
                    warn!(app = %name, %error, "app died in push");
                    *dead = Some(Dead { error, time: now });
                    timeline.record(Level::Warning, EventKind::AppDead, breath, ci as u64, 0);
                }
                progress = true;
            }
            if !progress {
                break;
            }
            firstloop = false;
        }
    }

    /// Restart every app that has been dead for the restart delay.
    fn restart_dead_apps(&mut self) {
        let now = self.now;
        let delay = self.options.restart_delay;
        for i in 0..self.apps.len() {
            let due = matches!(
                &self.apps[i].dead,
                Some(d) if now.saturating_sub(d.time) >= delay
            );
            if due {
                self.restart_app(i);
            }
        }
    }

    /// Stop the dead instance and build a fresh one from the same class
    /// and argument. A failed constructor counts as a fresh death, so a
    /// chronically failing app is retried at the restart cadence forever.
    fn restart_app(&mut self, i: usize) {
        let now = self.now;
        let breath = self.breaths.read();
        let slot = &mut self.apps[i];
        info!(app = %slot.name, "restarting dead app");
        if let Err(error) = shielded(true, || slot.instance.stop()) {
            warn!(app = %slot.name, %error, "stop hook failed during restart");
        }
        let class = slot.class;
        let arg = slot.arg.clone();
        match catch_unwind(AssertUnwindSafe(|| class.new(&arg))) {
            Ok(Ok(instance)) => {
                slot.instance = instance;
                slot.hooks = slot.instance.hooks();
                slot.dead = None;
                if !class.counters().is_empty() {
                    // Drop the old frame first: its counters unregister by
                    // path, and the replacement registers the same paths.
                    slot.frame = None;
                    slot.frame = Some(Frame::new(
                        &format!("apps/{}", slot.name),
                        class.counters(),
                    ));
                }
                let AppSlot {
                    name,
                    instance,
                    input,
                    output,
                    dead,
                    ..
                } = slot;
                if let Err(error) = shielded(true, || instance.link(input, output)) {
                    warn!(app = %name, %error, "link hook failed during restart");
                    *dead = Some(Dead { error, time: now });
                } else {
                    self.timeline.record(
                        Level::Warning,
                        EventKind::AppRestarted,
                        breath,
                        i as u64,
                        0,
                    );
                }
            }
            Ok(Err(e)) => {
                slot.dead = Some(Dead {
                    error: e.to_string(),
                    time: now,
                });
            }
            Err(payload) => {
                slot.dead = Some(Dead {
                    error: panic_message(payload),
                    time: now,
                });
            }
        }
    }

    /// Give up CPU between breaths according to the pacing policy.
    fn pace(&mut self) {
        let breath = self.breaths.read();
        match self.options.pacing {
            Pacing::Busywait => {}
            Pacing::Hz(hz) => {
                let period = Duration::from_secs_f64(1.0 / hz.max(1) as f64);
                let now = self.start.elapsed();
                let next = self.pacer.nextbreath.unwrap_or(now);
                if next > now && next - now > MIN_SLEEP {
                    let sleep = next - now;
                    self.timeline.record(
                        Level::Info,
                        EventKind::Sleep,
                        breath,
                        sleep.as_micros() as u64,
                        0,
                    );
                    std::thread::sleep(sleep);
                    self.timeline
                        .record(Level::Info, EventKind::Wakeup, breath, 0, 0);
                }
                self.pacer.nextbreath = Some((next + period).max(self.start.elapsed()));
            }
            Pacing::Adaptive => {
                let frees = packet::frees();
                if frees == self.pacer.lastfrees {
                    self.pacer.sleep_us =
                        (self.pacer.sleep_us + 1).min(self.options.max_sleep_us);
                    if self.pacer.sleep_us > 0 {
                        self.timeline.record(
                            Level::Info,
                            EventKind::Sleep,
                            breath,
                            self.pacer.sleep_us,
                            0,
                        );
                        std::thread::sleep(Duration::from_micros(self.pacer.sleep_us));
                        self.timeline
                            .record(Level::Info, EventKind::Wakeup, breath, 0, 0);
                    }
                } else {
                    self.pacer.sleep_us /= 2;
                }
                self.pacer.lastfrees = frees;
            }
        }
    }

    /// The adaptive pacer's current backoff, in microseconds.
    pub fn current_sleep_us(&self) -> u64 {
        self.pacer.sleep_us
    }

    /// Run the loop: breath, timer poll, pace, test the termination
    /// predicate. Runs forever when no predicate or duration is given.
    pub fn main(&mut self, mut options: MainOptions) {
        self.now = self.start.elapsed();
        let deadline = options.duration.map(|d| self.now + d);
        let mut next_report = options.report_interval.map(|i| self.now + i);
        let mut latency = options.measure_latency.then(Histogram::new);
        self.main_mark = Some(MainMark {
            at: self.now,
            breaths: self.breaths.read(),
            frees: packet::frees(),
            freebytes: packet::freebytes(),
        });
        loop {
            if let Some(h) = latency.as_mut() {
                let t0 = Instant::now();
                self.breath();
                h.record(t0.elapsed());
            } else {
                self.breath();
            }
            if !options.no_timers {
                self.timers.poll(self.now);
            }
            self.pace();
            if let Some(at) = next_report {
                if self.now >= at {
                    let text = self.report(&options.report);
                    print!("{}", text);
                    next_report = options.report_interval.map(|i| self.now + i);
                }
            }
            if let Some(done) = options.done.as_mut() {
                if done() {
                    break;
                }
            }
            if let Some(deadline) = deadline {
                if self.now >= deadline {
                    break;
                }
            }
        }
        self.commit_counters();
        self.latency = latency;
        if !options.no_report {
            let text = self.report(&options.report);
            print!("{}", text);
        }
    }

    /// Publish every counter mirror.
    pub fn commit_counters(&self) {
        self.breaths.commit();
        self.configs.commit();
        self.frees.set(packet::frees());
        self.frees.commit();
        self.freebytes.set(packet::freebytes());
        self.freebytes.commit();
        self.freebits.set(packet::freebits());
        self.freebits.commit();
        for link in &self.links {
            link.commit_counters();
        }
        for slot in &self.apps {
            if let Some(frame) = &slot.frame {
                frame.commit();
            }
        }
    }

    /// Build the textual report: load, per-link, per-app. App report
    /// hooks run under the fault shield like any other hook.
    pub fn report(&mut self, options: &ReportOptions) -> String {
        let mut out = String::new();
        if options.load {
            if let Some(mark) = &self.main_mark {
                let elapsed = self.now.saturating_sub(mark.at).as_secs_f64().max(1e-9);
                let breaths = self.breaths.read() - mark.breaths;
                let frees = packet::frees() - mark.frees;
                let bytes = packet::freebytes() - mark.freebytes;
                let _ = writeln!(
                    out,
                    "load: {:.3} Mpps, {:.3} Gbps, {} breaths/s",
                    frees as f64 / elapsed / 1e6,
                    bytes as f64 * 8.0 / elapsed / 1e9,
                    (breaths as f64 / elapsed) as u64,
                );
            }
        }
        if options.links {
            let mut entries: Vec<(&String, usize)> =
                self.link_index.iter().map(|(k, &v)| (k, v)).collect();
            entries.sort_by_key(|&(_, i)| i);
            for (canon, i) in entries {
                let s = self.links[i].stats;
                let sent = s.txpackets + s.txdrop;
                let loss = if sent == 0 {
                    0.0
                } else {
                    s.txdrop as f64 * 100.0 / sent as f64
                };
                let _ = writeln!(
                    out,
                    "link {}: {} packets, {} drops ({:.3}% loss)",
                    canon, s.txpackets, s.txdrop, loss,
                );
            }
        }
        if options.apps {
            let tolerant = self.options.tolerant;
            let now = self.now;
            let breath = self.breaths.read();
            let Engine {
                apps, timeline, ..
            } = self;
            for (i, slot) in apps.iter_mut().enumerate() {
                match &slot.dead {
                    Some(d) => {
                        let _ = writeln!(
                            out,
                            "app {} [{}]: dead ({})",
                            slot.name, slot.zone, d.error
                        );
                    }
                    None => {
                        let _ = writeln!(out, "app {} [{}]", slot.name, slot.zone);
                        if slot.hooks.report {
                            let AppSlot {
                                name,
                                instance,
                                dead,
                                ..
                            } = slot;
                            if let Err(error) = shielded(tolerant, || instance.report()) {
                                warn!(app = %name, %error, "app died in report");
                                *dead = Some(Dead { error, time: now });
                                timeline.record(
                                    Level::Warning,
                                    EventKind::AppDead,
                                    breath,
                                    i as u64,
                                    0,
                                );
                            }
                        }
                    }
                }
            }
        }
        if let Some(h) = &self.latency {
            let _ = writeln!(out, "latency: {}", h.summary());
        }
        out
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Queued packets go back to the arena; stop hooks run so apps can
        // release external resources.
        for link in &mut self.links {
            link.flush();
        }
        for slot in &mut self.apps {
            let _ = catch_unwind(AssertUnwindSafe(|| slot.instance.stop()));
        }
    }
}
