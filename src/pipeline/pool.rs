//! Fixed-size buffer pools bound to a port.
//!
//! A pool is created against one port, owns every buffer it allocates, and
//! must be destroyed before the port's component. The free list lives in the
//! engine; this type only tracks liveness and routes acquisition.

use crate::engine::{BufferHandle, MediaEngine, PoolHandle, PortHandle, PreReleaseHook};
use crate::pipeline::buffer::Buffer;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::PortId;
use std::sync::Arc;

pub struct BufferPool {
    handle: PoolHandle,
    port: PortId,
    port_handle: PortHandle,
    buffer_count: u32,
    buffer_size: u32,
    engine: Arc<dyn MediaEngine>,
    live: bool,
}

impl BufferPool {
    /// Allocate `count` buffers of `size` bytes for `port`. Nothing is
    /// allocated when this fails.
    pub(crate) fn create(
        engine: Arc<dyn MediaEngine>,
        port: PortId,
        port_handle: PortHandle,
        count: u32,
        size: u32,
    ) -> PipelineResult<Self> {
        if count == 0 || size == 0 {
            return Err(PipelineError::AllocationFailed(format!(
                "pool of {} x {} bytes is empty",
                count, size
            )));
        }
        let handle = engine.create_pool(port_handle, count, size).map_err(|status| {
            PipelineError::AllocationFailed(format!(
                "{} buffers of {} bytes on {}: {}",
                count, size, port_handle, status
            ))
        })?;
        tracing::debug!(
            "Created {} ({} x {} bytes) on {}",
            handle,
            count,
            size,
            port_handle
        );
        Ok(Self {
            handle,
            port,
            port_handle,
            buffer_count: count,
            buffer_size: size,
            engine,
            live: true,
        })
    }

    pub fn handle(&self) -> PoolHandle {
        self.handle
    }

    pub fn port(&self) -> PortId {
        self.port
    }

    pub fn buffer_count(&self) -> u32 {
        self.buffer_count
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Buffers currently on the free list.
    pub fn available(&self) -> usize {
        if !self.live {
            return 0;
        }
        self.engine.pool_available(self.handle)
    }

    /// Buffers held by ports, callbacks or callers.
    pub fn in_flight(&self) -> usize {
        if !self.live {
            return 0;
        }
        (self.buffer_count as usize).saturating_sub(self.available())
    }

    /// Take a buffer from the free list.
    pub(crate) fn get(&self) -> PipelineResult<Buffer> {
        if !self.live {
            return Err(PipelineError::InvalidGraphState(format!(
                "{} has been destroyed",
                self.handle
            )));
        }
        let handle = self
            .engine
            .pool_get(self.handle)
            .map_err(|status| PipelineError::NativeOperationFailed {
                operation: "pool_get",
                status,
            })?
            .ok_or_else(|| {
                PipelineError::AllocationFailed(format!(
                    "{} exhausted ({} buffers in flight)",
                    self.handle, self.buffer_count
                ))
            })?;
        Ok(Buffer::adopt(self.engine.clone(), handle))
    }

    /// Install (or clear) the hook run when a buffer's last reference goes.
    pub fn set_pre_release_hook(&self, hook: Option<PreReleaseHook>) -> PipelineResult<()> {
        self.engine
            .set_pre_release_hook(self.handle, hook)
            .check("set_pre_release_hook")
    }

    /// Return a buffer kept back by the pre-release hook to the free list.
    pub fn release_continue(&self, buffer: BufferHandle) -> PipelineResult<()> {
        self.engine
            .buffer_release_continue(buffer)
            .check("buffer_release_continue")
    }

    /// Disable the owning port if needed, then free every buffer. A second
    /// call does nothing.
    ///
    /// Goes through [`Port::destroy_port_pool`](crate::pipeline::Port::destroy_port_pool),
    /// which refuses while a connection keeps the port enabled.
    pub(crate) fn destroy(&mut self) -> PipelineResult<()> {
        if !self.live {
            return Ok(());
        }
        if self.engine.port_enabled(self.port_handle) {
            self.engine
                .disable_port(self.port_handle)
                .check("disable_port")?;
        }
        self.engine.destroy_pool(self.handle).check("destroy_pool")?;
        self.live = false;
        tracing::debug!("Destroyed {} on {}", self.handle, self.port_handle);
        Ok(())
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("handle", &self.handle)
            .field("port", &self.port)
            .field("buffer_count", &self.buffer_count)
            .field("buffer_size", &self.buffer_size)
            .field("live", &self.live)
            .finish()
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            tracing::warn!("Dropping {} failed: {}", self.handle, e);
        }
    }
}
