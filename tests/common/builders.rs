//! Test pipeline builders

use std::sync::Arc;
use vcgraph::engine::MockEngine;
use vcgraph::pipeline::{ComponentId, Pipeline, PortId, PortKind};

/// Builder for chains of components linked output 0 -> input 0
pub struct ChainBuilder {
    engine: Arc<MockEngine>,
    names: Vec<String>,
}

/// A built chain and the ids of its members, head first
pub struct Chain {
    pub engine: Arc<MockEngine>,
    pub pipeline: Pipeline,
    pub ids: Vec<ComponentId>,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self {
            engine: Arc::new(MockEngine::new()),
            names: Vec::new(),
        }
    }

    pub fn engine(mut self, engine: MockEngine) -> Self {
        self.engine = Arc::new(engine);
        self
    }

    pub fn component(mut self, name: &str) -> Self {
        self.names.push(name.to_string());
        self
    }

    pub fn build(self) -> Chain {
        let mut pipeline = Pipeline::new(self.engine.clone()).unwrap();
        let ids: Vec<_> = self
            .names
            .iter()
            .map(|name| pipeline.create_component(name).unwrap())
            .collect();
        for pair in ids.windows(2) {
            let out = output(&pipeline, pair[0], 0);
            let inp = input(&pipeline, pair[1], 0);
            pipeline.connect(out, inp).unwrap();
        }
        Chain {
            engine: self.engine,
            pipeline,
            ids,
        }
    }
}

pub fn output(pipeline: &Pipeline, component: ComponentId, index: usize) -> PortId {
    pipeline
        .port_id(component, PortKind::Output, index)
        .expect("output port")
}

pub fn input(pipeline: &Pipeline, component: ComponentId, index: usize) -> PortId {
    pipeline
        .port_id(component, PortKind::Input, index)
        .expect("input port")
}
