//! Component / port / connection / pool lifecycle.
//!
//! Components own their ports; ports own their pool, their outgoing
//! connection and their capture handler. The [`Pipeline`] owns every
//! component in an arena and drives cascades and teardown across it.
//!
//! # Architecture
//!
//! ```text
//! [camera] out:1 ──► in:0 [encoder] out:0 ──► capture handler
//!          out:0 ──► in:0 [null_sink]
//! ```
//!
//! # Design
//!
//! - **Arena, not back-references**: components live in `Pipeline`; a
//!   connection names its downstream port by [`PortId`].
//! - **Read-through state**: enabled flags and reference counts are always
//!   queried from the engine, never cached.
//! - **Idempotent teardown**: disable, pool destroy, dispose and shutdown
//!   can all be repeated after a partial failure.
//! - **Message-passing callbacks**: the engine posts returned buffers to a
//!   channel drained by [`Pipeline::dispatch_pending`].

pub mod buffer;
pub mod component;
pub mod connection;
pub mod error;
pub mod graph;
pub mod handler;
pub mod id;
pub mod pool;
pub mod port;

pub use buffer::{Buffer, BufferGuard};
pub use component::Component;
pub use connection::Connection;
pub use error::{PipelineError, PipelineResult};
pub use graph::Pipeline;
pub use handler::{CaptureHandler, CaptureStats, CapturedFrame, FileCaptureHandler, InMemoryHandler};
pub use id::{ComponentId, PortId, PortUid};
pub use pool::BufferPool;
pub use port::{Port, PortKind};
