//! Ports: typed endpoints on a component.
//!
//! A port's enabled state is never cached; every query reads it from the
//! engine. Input and output ports may own a [`BufferPool`], output ports may
//! own the [`Connection`] leaving them, and any port may own a capture
//! handler.

use crate::config::PoolSettings;
use crate::engine::{
    BufferCallback, BufferRequirements, MediaEngine, PortFormat, PortHandle,
};
use crate::pipeline::buffer::Buffer;
use crate::pipeline::connection::Connection;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::handler::{CaptureHandler, CapturedFrame};
use crate::pipeline::id::{PortId, PortUid};
use crate::pipeline::pool::BufferPool;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// What a port is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    Control,
    Input,
    Output,
    Clock,
    Generic,
}

impl PortKind {
    /// Short name used in port addresses (`camera:out:0`).
    pub fn short_name(self) -> &'static str {
        match self {
            PortKind::Control => "ctrl",
            PortKind::Input => "in",
            PortKind::Output => "out",
            PortKind::Clock => "clk",
            PortKind::Generic => "gen",
        }
    }

    /// Whether buffers flow through ports of this kind.
    pub fn carries_data(self) -> bool {
        matches!(self, PortKind::Input | PortKind::Output)
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for PortKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => Ok(PortKind::Control),
            "in" | "input" => Ok(PortKind::Input),
            "out" | "output" => Ok(PortKind::Output),
            "clk" | "clock" => Ok(PortKind::Clock),
            "gen" | "generic" => Ok(PortKind::Generic),
            other => Err(format!("Unknown port kind '{}'", other)),
        }
    }
}

pub struct Port {
    id: PortId,
    uid: PortUid,
    kind: PortKind,
    index: usize,
    handle: PortHandle,
    name: String,
    engine: Arc<dyn MediaEngine>,
    pool: Option<BufferPool>,
    connection: Option<Connection>,
    /// Output port feeding this input, if any.
    upstream: Option<PortId>,
    handler: Option<Box<dyn CaptureHandler>>,
    eos: bool,
}

impl Port {
    pub(crate) fn new(
        engine: Arc<dyn MediaEngine>,
        id: PortId,
        kind: PortKind,
        index: usize,
        handle: PortHandle,
        component_name: &str,
    ) -> Self {
        Self {
            id,
            uid: PortUid::next(),
            kind,
            index,
            handle,
            name: format!("{}:{}:{}", component_name, kind, index),
            engine,
            pool: None,
            connection: None,
            upstream: None,
            handler: None,
            eos: false,
        }
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn uid(&self) -> PortUid {
        self.uid
    }

    pub fn kind(&self) -> PortKind {
        self.kind
    }

    /// Position among the component's ports of the same kind.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn handle(&self) -> PortHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.engine.port_enabled(self.handle)
    }

    /// Start data flow. `callback` receives buffers the engine hands back;
    /// connected ports may pass `None`. Enabling an enabled port does nothing.
    pub fn enable(&self, callback: Option<BufferCallback>) -> PipelineResult<()> {
        if self.is_enabled() {
            return Ok(());
        }
        let status = self.engine.enable_port(self.handle, callback);
        if !status.is_success() {
            tracing::warn!("Enabling {} failed: {}", self.name, status);
            return Err(PipelineError::PortEnableFailed {
                port: self.name.clone(),
                status,
            });
        }
        tracing::debug!("Enabled {}", self.name);
        Ok(())
    }

    /// Stop data flow. Buffers held by the engine are returned through the
    /// callback first. A disabled port is left alone.
    pub fn disable(&self) -> PipelineResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.engine.disable_port(self.handle).check("disable_port")?;
        tracing::debug!("Disabled {}", self.name);
        Ok(())
    }

    pub fn format(&self) -> PipelineResult<PortFormat> {
        self.engine
            .port_format(self.handle)
            .map_err(|status| PipelineError::NativeOperationFailed {
                operation: "port_format",
                status,
            })
    }

    /// Commit a new format. Must happen while the port is disabled.
    pub fn set_format(&self, format: PortFormat) -> PipelineResult<()> {
        if self.is_enabled() {
            return Err(PipelineError::InvalidGraphState(format!(
                "{} must be disabled to change its format",
                self.name
            )));
        }
        self.engine
            .set_port_format(self.handle, format)
            .check("set_port_format")
    }

    pub fn requirements(&self) -> PipelineResult<BufferRequirements> {
        self.engine
            .port_requirements(self.handle)
            .map_err(|status| PipelineError::NativeOperationFailed {
                operation: "port_requirements",
                status,
            })
    }

    // ── Pool ──

    pub fn pool(&self) -> Option<&BufferPool> {
        self.pool.as_ref()
    }

    pub fn has_pool(&self) -> bool {
        self.pool.as_ref().is_some_and(|p| p.is_live())
    }

    /// Allocate this port's pool. The port must be disabled and must not
    /// already own a live pool.
    pub fn create_pool(&mut self, count: u32, size: u32) -> PipelineResult<&BufferPool> {
        if !self.kind.carries_data() {
            return Err(PipelineError::InvalidGraphState(format!(
                "{} does not carry buffers",
                self.name
            )));
        }
        if self.is_enabled() {
            return Err(PipelineError::InvalidGraphState(format!(
                "{} is enabled; disable it before creating a pool",
                self.name
            )));
        }
        if self.has_pool() {
            return Err(PipelineError::InvalidGraphState(format!(
                "{} already owns a pool",
                self.name
            )));
        }
        let pool = BufferPool::create(self.engine.clone(), self.id, self.handle, count, size)?;
        Ok(self.pool.insert(pool))
    }

    /// Allocate a pool sized from the port's requirements, overridden by
    /// `settings` where given.
    pub fn create_default_pool(&mut self, settings: &PoolSettings) -> PipelineResult<&BufferPool> {
        let (count, size) = self.default_pool_shape(settings)?;
        self.create_pool(count, size)
    }

    /// Buffer count and size `create_default_pool` would use.
    pub fn default_pool_shape(&self, settings: &PoolSettings) -> PipelineResult<(u32, u32)> {
        let (num, size) = self.requirements()?.preferred();
        Ok((
            settings.buffer_count.unwrap_or(num),
            settings.buffer_size.unwrap_or(size),
        ))
    }

    /// Destroy the owned pool, disabling the port first. Without a pool this
    /// does nothing.
    ///
    /// Refused while an enabled connection drives the port: disabling the
    /// port underneath it would leave the connection enabled on a dead port.
    pub fn destroy_port_pool(&mut self) -> PipelineResult<()> {
        let Some(pool) = self.pool.as_mut() else {
            return Ok(());
        };
        let owned_edge = self.connection.as_ref().is_some_and(|c| c.is_enabled());
        let upstream_edge = self.upstream.is_some() && self.engine.port_enabled(self.handle);
        if owned_edge || upstream_edge {
            return Err(PipelineError::InvalidGraphState(format!(
                "{} is driven by an enabled connection; disable it first",
                self.name
            )));
        }
        pool.destroy()?;
        self.pool = None;
        Ok(())
    }

    /// Take a buffer from this port's pool.
    pub fn acquire_buffer(&self) -> PipelineResult<Buffer> {
        let pool = self.pool.as_ref().ok_or_else(|| {
            PipelineError::InvalidGraphState(format!("{} has no pool", self.name))
        })?;
        pool.get()
    }

    /// Hand `buffer` to the engine: an empty buffer to fill on an output
    /// port, a full one to consume on an input port.
    pub fn send_buffer(&self, buffer: Buffer) -> PipelineResult<()> {
        self.engine
            .send_buffer(self.handle, buffer.handle())
            .check("send_buffer")?;
        buffer.into_handle();
        Ok(())
    }

    /// Send every free pool buffer to the engine. Returns how many were sent.
    pub fn prime(&self) -> PipelineResult<usize> {
        let Some(pool) = self.pool.as_ref() else {
            return Ok(0);
        };
        let mut sent = 0;
        while pool.available() > 0 {
            self.send_buffer(pool.get()?)?;
            sent += 1;
        }
        Ok(sent)
    }

    // ── Connection ──

    /// Connection leaving this (output) port.
    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Input port at the other end of this port's connection.
    pub fn connected_reference(&self) -> Option<PortId> {
        self.connection.as_ref().map(|c| c.target())
    }

    /// Output port feeding this (input) port.
    pub fn upstream(&self) -> Option<PortId> {
        self.upstream
    }

    pub(crate) fn attach_connection(&mut self, connection: Connection) {
        self.connection = Some(connection);
    }

    pub(crate) fn take_connection(&mut self) -> Option<Connection> {
        self.connection.take()
    }

    pub(crate) fn set_upstream(&mut self, upstream: Option<PortId>) {
        self.upstream = upstream;
    }

    // ── Capture handler ──

    pub fn set_handler(&mut self, handler: Box<dyn CaptureHandler>) {
        self.handler = Some(handler);
        self.eos = false;
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Dispose and drop the capture handler, if any.
    pub fn dispose_handler(&mut self) -> PipelineResult<()> {
        if let Some(mut handler) = self.handler.take() {
            handler.dispose()?;
        }
        Ok(())
    }

    /// Whether an end-of-stream buffer has been delivered here.
    pub fn eos_seen(&self) -> bool {
        self.eos
    }

    /// Hand a returned buffer's payload to the capture handler. The buffer
    /// stays locked only for the duration of the call. Returns whether the
    /// buffer carried end of stream.
    pub(crate) fn deliver(&mut self, buffer: &Buffer) -> PipelineResult<bool> {
        let guard = buffer.lock()?;
        let metadata = guard.metadata()?;
        if let Some(handler) = self.handler.as_mut() {
            if metadata.length > 0 {
                let payload = guard.payload()?;
                handler.process(&CapturedFrame {
                    port: &self.name,
                    metadata,
                    payload: &payload,
                })?;
            }
            if metadata.is_eos() {
                handler.on_end_of_stream();
            }
        }
        guard.unlock()?;

        if metadata.is_eos() && !self.eos {
            tracing::info!("End of stream on {}", self.name);
            self.eos = true;
        }
        Ok(metadata.is_eos())
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("uid", &self.uid)
            .field("handle", &self.handle)
            .field("pool", &self.pool)
            .field("connected_reference", &self.connected_reference())
            .field("upstream", &self.upstream)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}
