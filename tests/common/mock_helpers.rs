//! Mock construction helpers

use std::sync::Arc;
use vcgraph::engine::{MediaEngine, MockEngine};

/// An initialised reference engine
pub fn initialised_engine() -> Arc<MockEngine> {
    let engine = Arc::new(MockEngine::new());
    assert!(engine.init().is_success());
    engine
}

/// Reference engine whose output ports end the stream after `frames`
pub fn streaming_engine(frames: u64, fill: u32) -> MockEngine {
    MockEngine::new().with_eos_after(frames).with_fill_length(fill)
}
