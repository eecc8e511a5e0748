//! Basic traffic apps: synthetic sources, sinks and fan-out.
//!
//! These exercise the whole app contract through the public API only, and
//! are what the engine's own integration tests and benchmarks wire up.

use crate::app::{App, AppClass, AppCtx, AppError, Hooks, LinkId, PortTable};
use crate::config::ConfigSchema;
use crate::link::PULL_CAP;
use crate::packet;
use serde_json::Value;

/// `Source`: emits synthetic packets of a fixed size on every output.
pub struct SourceClass;

/// Canonical class value to hand to `Config::app`.
pub static SOURCE: SourceClass = SourceClass;

impl AppClass for SourceClass {
    fn name(&self) -> &'static str {
        "Source"
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema::new().optional("size", Value::from(60))
    }

    fn counters(&self) -> &'static [&'static str] {
        &["produced"]
    }

    fn new(&self, arg: &Value) -> Result<Box<dyn App>, AppError> {
        let size = arg["size"]
            .as_u64()
            .ok_or_else(|| AppError::new("size must be a number"))? as usize;
        if size > packet::PAYLOAD_SIZE {
            return Err(AppError::new(format!(
                "size {} exceeds packet capacity",
                size
            )));
        }
        Ok(Box::new(Source {
            size,
            outputs: Vec::new(),
        }))
    }
}

pub struct Source {
    size: usize,
    outputs: Vec<LinkId>,
}

impl App for Source {
    fn hooks(&self) -> Hooks {
        Hooks::none().with_pull()
    }

    fn link(&mut self, _input: &PortTable, output: &PortTable) {
        self.outputs = output.iter().map(|(_, id)| id).collect();
    }

    fn pull(&mut self, ctx: &mut AppCtx) {
        let mut produced = 0u64;
        for &id in &self.outputs {
            for _ in 0..PULL_CAP {
                let mut p = packet::allocate();
                p.set_length(self.size);
                ctx.transmit(id, p);
                produced += 1;
            }
        }
        if let Some(frame) = ctx.frame() {
            if let Some(c) = frame.get("produced") {
                c.add(produced);
            }
        }
    }
}

/// `Sink`: frees every packet arriving on any input.
pub struct SinkClass;

pub static SINK: SinkClass = SinkClass;

impl AppClass for SinkClass {
    fn name(&self) -> &'static str {
        "Sink"
    }

    fn new(&self, _arg: &Value) -> Result<Box<dyn App>, AppError> {
        Ok(Box::new(Sink { inputs: Vec::new() }))
    }
}

pub struct Sink {
    inputs: Vec<LinkId>,
}

impl App for Sink {
    fn hooks(&self) -> Hooks {
        Hooks::none().with_push()
    }

    fn link(&mut self, input: &PortTable, _output: &PortTable) {
        self.inputs = input.iter().map(|(_, id)| id).collect();
    }

    fn push(&mut self, ctx: &mut AppCtx) {
        for &id in &self.inputs {
            while let Some(p) = ctx.receive(id) {
                ctx.free(p);
            }
        }
    }
}

/// `Tee`: replicates each input packet onto every output.
pub struct TeeClass;

pub static TEE: TeeClass = TeeClass;

impl AppClass for TeeClass {
    fn name(&self) -> &'static str {
        "Tee"
    }

    fn new(&self, _arg: &Value) -> Result<Box<dyn App>, AppError> {
        Ok(Box::new(Tee {
            inputs: Vec::new(),
            outputs: Vec::new(),
        }))
    }
}

pub struct Tee {
    inputs: Vec<LinkId>,
    outputs: Vec<LinkId>,
}

impl App for Tee {
    fn hooks(&self) -> Hooks {
        Hooks::none().with_push()
    }

    fn link(&mut self, input: &PortTable, output: &PortTable) {
        self.inputs = input.iter().map(|(_, id)| id).collect();
        self.outputs = output.iter().map(|(_, id)| id).collect();
    }

    fn push(&mut self, ctx: &mut AppCtx) {
        for &input in &self.inputs {
            while let Some(p) = ctx.receive(input) {
                match self.outputs.split_first() {
                    None => ctx.free(p),
                    Some((&first, rest)) => {
                        for &out in rest {
                            ctx.transmit(out, p.duplicate());
                        }
                        ctx.transmit(first, p);
                    }
                }
            }
        }
    }
}
