//! # vcgraph: media pipeline lifecycle management
//!
//! Builds pipelines of hardware media components (camera, encoder, renderer)
//! connected through typed ports, and manages the parts that are easy to get
//! wrong: buffer pools and their reference-counted buffers, downstream-first
//! enable/disable cascades, and teardown that releases every native resource
//! exactly once.
//!
//! ## Architecture
//!
//! - **Engine**: the native media engine behind the [`engine::MediaEngine`]
//!   trait, with [`engine::MockEngine`] as an in-process reference engine
//! - **Pipeline**: components, ports, connections and pools in
//!   [`pipeline`], owned by a [`Pipeline`] arena
//! - **Communication**: engine callbacks are posted to a crossbeam channel
//!   and drained on the controlling thread
//!
//! ## Configuration
//!
//! Pipelines can be described in TOML or JSON ([`config::PipelineConfig`]).
//! The default config file lives in the platform data directory under
//! `dev.hxyulin.vcgraph`.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vcgraph::engine::MockEngine;
//! use vcgraph::pipeline::{InMemoryHandler, Pipeline, PortKind};
//!
//! let mut pipeline = Pipeline::new(Arc::new(MockEngine::new()))?;
//! let camera = pipeline.create_component("vc.ril.camera")?;
//! let encoder = pipeline.create_component("vc.ril.video_encode")?;
//! pipeline.connect(
//!     pipeline.port_id(camera, PortKind::Output, 1).unwrap(),
//!     pipeline.port_id(encoder, PortKind::Input, 0).unwrap(),
//! )?;
//! pipeline.start()?;
//!
//! let out = pipeline.port_id(encoder, PortKind::Output, 0).unwrap();
//! pipeline.start_capture(out, Box::new(InMemoryHandler::new()))?;
//! while !pipeline.all_captures_finished() {
//!     pipeline.dispatch_pending()?;
//! }
//! pipeline.shutdown()?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use engine::{MediaEngine, MockEngine, Status};
pub use error::{Result, ResultExt, VcError};
pub use pipeline::{Component, ComponentId, Pipeline, PipelineError, Port, PortId, PortKind};
