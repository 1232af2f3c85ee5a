//! Directed data paths between an output port and an input port.
//!
//! A connection is owned by its upstream output port. The downstream side is
//! a lookup relation ([`Connection::target`]) into the pipeline's component
//! arena, so the component graph never owns itself.
//!
//! The recursive part of a cascade lives in
//! [`Pipeline::enable_connections`](crate::pipeline::Pipeline::enable_connections);
//! this type only toggles its own edge once everything below it is done.

use crate::engine::{ConnectionHandle, MediaEngine};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::{ComponentId, PortId};
use crate::pipeline::port::{Port, PortKind};
use std::sync::Arc;

pub struct Connection {
    handle: ConnectionHandle,
    source: PortId,
    target: PortId,
    engine: Arc<dyn MediaEngine>,
    live: bool,
}

impl Connection {
    /// Create the native connection from `source` (an output) to `target`
    /// (an input). The connection starts disabled.
    pub(crate) fn create(
        engine: Arc<dyn MediaEngine>,
        source: &Port,
        target: &Port,
    ) -> PipelineResult<Self> {
        if source.kind() != PortKind::Output || target.kind() != PortKind::Input {
            return Err(PipelineError::InvalidGraphState(format!(
                "Cannot connect {} to {}: need an output and an input",
                source.name(),
                target.name()
            )));
        }
        let handle = engine
            .create_connection(source.handle(), target.handle())
            .map_err(|status| PipelineError::NativeOperationFailed {
                operation: "create_connection",
                status,
            })?;
        tracing::info!(
            "Connected {} -> {} ({})",
            source.name(),
            target.name(),
            handle
        );
        Ok(Self {
            handle,
            source: source.id(),
            target: target.id(),
            engine,
            live: true,
        })
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    pub fn source(&self) -> PortId {
        self.source
    }

    pub fn target(&self) -> PortId {
        self.target
    }

    /// Component that receives this connection's buffers.
    pub fn downstream(&self) -> ComponentId {
        self.target.component()
    }

    pub fn is_enabled(&self) -> bool {
        self.live && self.engine.connection_enabled(self.handle)
    }

    /// Enable the downstream input port, then this edge. If the edge fails
    /// the input port is left disabled again.
    pub fn enable(&self, target: &Port) -> PipelineResult<()> {
        debug_assert_eq!(target.id(), self.target);
        if !self.live {
            return Err(PipelineError::InvalidGraphState(format!(
                "{} has been destroyed",
                self.handle
            )));
        }
        if self.is_enabled() {
            return Ok(());
        }
        let enabled_port = !target.is_enabled();
        if enabled_port {
            target.enable(None)?;
        }
        if let Err(e) = self
            .engine
            .enable_connection(self.handle)
            .check("enable_connection")
        {
            if enabled_port {
                if let Err(rollback) = target.disable() {
                    tracing::warn!("Rolling back {} failed: {}", target.name(), rollback);
                }
            }
            return Err(e);
        }
        tracing::debug!("Enabled {}", self.handle);
        Ok(())
    }

    /// Disable the downstream input port, then this edge.
    pub fn disable(&self, target: &Port) -> PipelineResult<()> {
        debug_assert_eq!(target.id(), self.target);
        if !self.is_enabled() {
            return Ok(());
        }
        target.disable()?;
        self.engine
            .disable_connection(self.handle)
            .check("disable_connection")?;
        tracing::debug!("Disabled {}", self.handle);
        Ok(())
    }

    /// Free the native connection, disabling it first if needed. A second
    /// call does nothing.
    pub fn destroy(&mut self) -> PipelineResult<()> {
        if !self.live {
            return Ok(());
        }
        if self.engine.connection_enabled(self.handle) {
            self.engine
                .disable_connection(self.handle)
                .check("disable_connection")?;
        }
        self.engine
            .destroy_connection(self.handle)
            .check("destroy_connection")?;
        self.live = false;
        tracing::debug!("Destroyed {}", self.handle);
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("handle", &self.handle)
            .field("source", &self.source)
            .field("target", &self.target)
            .field("live", &self.live)
            .finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            tracing::warn!("Dropping {} failed: {}", self.handle, e);
        }
    }
}
