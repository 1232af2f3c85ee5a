//! Reference-counted buffer views.
//!
//! A [`Buffer`] value is exactly one reference on a native buffer header.
//! Dropping it releases that reference; [`Buffer::acquire`] hands out another
//! one. Passing a buffer to a port ([`Port::send_buffer`]) moves the reference
//! into the engine, which gives it back through the port's callback channel.
//!
//! Metadata and payload are only reachable through a [`BufferGuard`], which
//! keeps the memory locked for as long as it lives.
//!
//! [`Port::send_buffer`]: crate::pipeline::Port::send_buffer

use crate::engine::{BufferFlags, BufferHandle, BufferMetadata, MediaEngine};
use crate::pipeline::error::{PipelineError, PipelineResult};
use std::fmt;
use std::sync::Arc;

/// One reference on a pool buffer.
pub struct Buffer {
    handle: BufferHandle,
    engine: Arc<dyn MediaEngine>,
    owned: bool,
}

impl Buffer {
    /// Take ownership of a reference the engine handed over.
    pub(crate) fn adopt(engine: Arc<dyn MediaEngine>, handle: BufferHandle) -> Self {
        Self {
            handle,
            engine,
            owned: true,
        }
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// Add a reference. Each returned buffer must be released (or dropped)
    /// exactly once.
    pub fn acquire(&self) -> PipelineResult<Buffer> {
        self.engine
            .buffer_acquire(self.handle)
            .check("buffer_acquire")?;
        Ok(Self::adopt(self.engine.clone(), self.handle))
    }

    /// Drop this reference. The buffer returns to its pool when the last one
    /// goes, unless the pool's pre-release hook keeps it.
    pub fn release(mut self) -> PipelineResult<()> {
        self.owned = false;
        self.engine
            .buffer_release(self.handle)
            .check("buffer_release")
    }

    /// Clear length, flags, command and timestamps for reuse.
    pub fn reset(&self) -> PipelineResult<()> {
        self.engine.buffer_reset(self.handle).check("buffer_reset")
    }

    /// Lock the buffer memory. The lock is held until the guard is dropped.
    pub fn lock(&self) -> PipelineResult<BufferGuard<'_>> {
        self.engine.lock_buffer(self.handle).check("lock_buffer")?;
        Ok(BufferGuard {
            buffer: self,
            locked: true,
        })
    }

    /// Make `target` describe this buffer's memory and metadata. `target`
    /// keeps a reference on this buffer until it is itself released.
    pub fn replicate(&self, target: &Buffer) -> PipelineResult<()> {
        self.engine
            .replicate_buffer(target.handle, self.handle)
            .check("replicate_buffer")
    }

    /// Give the reference away without releasing it.
    pub(crate) fn into_handle(mut self) -> BufferHandle {
        self.owned = false;
        self.handle
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("handle", &self.handle)
            .field("owned", &self.owned)
            .finish()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if self.owned {
            let status = self.engine.buffer_release(self.handle);
            if !status.is_success() {
                tracing::warn!("Releasing {} on drop failed: {}", self.handle, status);
            }
        }
    }
}

/// Scoped lock over a buffer's memory.
pub struct BufferGuard<'a> {
    buffer: &'a Buffer,
    locked: bool,
}

impl BufferGuard<'_> {
    pub fn metadata(&self) -> PipelineResult<BufferMetadata> {
        self.engine()
            .read_header(self.buffer.handle)
            .map_err(|status| PipelineError::NativeOperationFailed {
                operation: "read_header",
                status,
            })
    }

    pub fn set_metadata(&self, metadata: BufferMetadata) -> PipelineResult<()> {
        self.engine()
            .write_header(self.buffer.handle, metadata)
            .check("write_header")
    }

    pub fn length(&self) -> PipelineResult<u32> {
        Ok(self.metadata()?.length)
    }

    pub fn flags(&self) -> PipelineResult<BufferFlags> {
        Ok(self.metadata()?.flags)
    }

    pub fn set_flags(&self, flags: BufferFlags) -> PipelineResult<()> {
        let mut metadata = self.metadata()?;
        metadata.flags = flags;
        self.set_metadata(metadata)
    }

    pub fn set_timestamps(&self, pts: i64, dts: i64) -> PipelineResult<()> {
        let mut metadata = self.metadata()?;
        metadata.pts = pts;
        metadata.dts = dts;
        self.set_metadata(metadata)
    }

    /// Copy of the valid payload bytes.
    pub fn payload(&self) -> PipelineResult<Vec<u8>> {
        self.engine()
            .read_payload(self.buffer.handle)
            .map_err(|status| PipelineError::NativeOperationFailed {
                operation: "read_payload",
                status,
            })
    }

    /// Replace the payload. Fails if `data` does not fit the allocation.
    pub fn write_payload(&self, data: &[u8]) -> PipelineResult<()> {
        self.engine()
            .write_payload(self.buffer.handle, data)
            .check("write_payload")
    }

    /// Unlock now, surfacing a failed unlock.
    pub fn unlock(mut self) -> PipelineResult<()> {
        self.locked = false;
        self.engine()
            .unlock_buffer(self.buffer.handle)
            .check("unlock_buffer")
    }

    fn engine(&self) -> &dyn MediaEngine {
        self.buffer.engine.as_ref()
    }
}

impl Drop for BufferGuard<'_> {
    fn drop(&mut self) {
        if self.locked {
            let status = self.engine().unlock_buffer(self.buffer.handle);
            if !status.is_success() {
                tracing::warn!("Unlocking {} failed: {}", self.buffer.handle, status);
            }
        }
    }
}
