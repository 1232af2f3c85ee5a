//! Capture handlers: the consumers of buffer payloads at a port.
//!
//! A handler is owned by its port for disposal purposes. The pipeline hands
//! it each filled buffer's payload while the buffer is locked, then releases
//! the buffer itself.

use crate::engine::BufferMetadata;
use crate::pipeline::error::{PipelineError, PipelineResult};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A filled buffer as seen by a handler.
#[derive(Debug, Clone, Copy)]
pub struct CapturedFrame<'a> {
    /// Display name of the delivering port, e.g. `vc.ril.camera:out:1`.
    pub port: &'a str,
    pub metadata: BufferMetadata,
    pub payload: &'a [u8],
}

impl CapturedFrame<'_> {
    pub fn is_eos(&self) -> bool {
        self.metadata.is_eos()
    }
}

/// Consumer of payloads delivered at a port.
pub trait CaptureHandler: Send {
    /// Handle one buffer's payload. Empty buffers are not delivered.
    fn process(&mut self, frame: &CapturedFrame<'_>) -> PipelineResult<()>;

    /// Called once the port reports end of stream.
    fn on_end_of_stream(&mut self) {}

    /// Flush and release whatever the handler holds.
    fn dispose(&mut self) -> PipelineResult<()> {
        Ok(())
    }
}

/// Counters shared between an [`InMemoryHandler`] and its creator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames: usize,
    pub bytes: usize,
    pub keyframes: usize,
    pub end_of_stream: bool,
    pub disposed: bool,
    pub data: Vec<u8>,
}

/// Keeps everything it receives in memory.
#[derive(Debug, Default)]
pub struct InMemoryHandler {
    stats: Arc<Mutex<CaptureStats>>,
    keep_data: bool,
}

impl InMemoryHandler {
    /// Counting handler that discards payload bytes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler that also keeps every payload byte.
    pub fn retaining() -> Self {
        Self {
            keep_data: true,
            ..Self::default()
        }
    }

    /// Shared view of the counters, usable after the handler is moved.
    pub fn stats(&self) -> Arc<Mutex<CaptureStats>> {
        self.stats.clone()
    }
}

impl CaptureHandler for InMemoryHandler {
    fn process(&mut self, frame: &CapturedFrame<'_>) -> PipelineResult<()> {
        let mut stats = self.stats.lock();
        stats.frames += 1;
        stats.bytes += frame.payload.len();
        if frame
            .metadata
            .flags
            .contains(crate::engine::BufferFlags::KEYFRAME)
        {
            stats.keyframes += 1;
        }
        if self.keep_data {
            stats.data.extend_from_slice(frame.payload);
        }
        Ok(())
    }

    fn on_end_of_stream(&mut self) {
        self.stats.lock().end_of_stream = true;
    }

    fn dispose(&mut self) -> PipelineResult<()> {
        self.stats.lock().disposed = true;
        Ok(())
    }
}

/// Appends every payload to a file.
pub struct FileCaptureHandler {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    written: u64,
}

impl FileCaptureHandler {
    /// Create (truncate) `path`.
    pub fn create(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| {
            PipelineError::Handler(format!("Failed to create {}: {}", path.display(), e))
        })?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }
}

impl CaptureHandler for FileCaptureHandler {
    fn process(&mut self, frame: &CapturedFrame<'_>) -> PipelineResult<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            PipelineError::Handler(format!("{} is already closed", self.path.display()))
        })?;
        writer
            .write_all(frame.payload)
            .map_err(|e| PipelineError::Handler(format!("Write failed: {}", e)))?;
        self.written += frame.payload.len() as u64;
        Ok(())
    }

    fn on_end_of_stream(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                tracing::warn!("Flushing {} failed: {}", self.path.display(), e);
            }
        }
    }

    fn dispose(&mut self) -> PipelineResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .map_err(|e| PipelineError::Handler(format!("Flush failed: {}", e)))?;
            tracing::info!(
                "Closed {} after {} bytes",
                self.path.display(),
                self.written
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BufferFlags, TIME_UNKNOWN};

    fn frame(payload: &[u8], flags: BufferFlags) -> CapturedFrame<'_> {
        CapturedFrame {
            port: "test:out:0",
            metadata: BufferMetadata {
                command: 0,
                alloc_size: 64,
                length: payload.len() as u32,
                offset: 0,
                flags,
                pts: TIME_UNKNOWN,
                dts: TIME_UNKNOWN,
            },
            payload,
        }
    }

    #[test]
    fn test_in_memory_counts() {
        let mut handler = InMemoryHandler::retaining();
        let stats = handler.stats();
        handler
            .process(&frame(b"ab", BufferFlags::KEYFRAME))
            .unwrap();
        handler.process(&frame(b"cde", BufferFlags::empty())).unwrap();
        handler.on_end_of_stream();
        handler.dispose().unwrap();

        let stats = stats.lock();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.bytes, 5);
        assert_eq!(stats.keyframes, 1);
        assert_eq!(stats.data, b"abcde");
        assert!(stats.end_of_stream);
        assert!(stats.disposed);
    }

    #[test]
    fn test_file_handler_writes_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.h264");
        let mut handler = FileCaptureHandler::create(&path).unwrap();
        handler.process(&frame(b"\x00\x00\x01", BufferFlags::FRAME_END)).unwrap();
        handler.process(&frame(b"\x65", BufferFlags::FRAME_END)).unwrap();
        handler.dispose().unwrap();
        handler.dispose().unwrap();

        assert_eq!(handler.bytes_written(), 4);
        assert_eq!(std::fs::read(&path).unwrap(), b"\x00\x00\x01\x65");
        assert!(handler.process(&frame(b"x", BufferFlags::empty())).is_err());
    }
}
