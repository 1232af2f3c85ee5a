//! Native media engine boundary.
//!
//! The engine is an opaque capability: it owns components, ports, pools and
//! buffer headers, and hands out [`handle`]s to them. Everything in
//! [`crate::pipeline`] talks to it exclusively through the [`MediaEngine`]
//! trait, enabling both a hardware binding and the in-process [`MockEngine`]
//! used by tests and the demo binary.
//!
//! # Callback delivery
//!
//! Engines deliver buffers on their own threads. Instead of invoking user
//! code there, an enabled port is given a [`BufferCallback`] (a channel
//! sender) and the engine posts a [`BufferEvent`] onto it. The controlling
//! thread drains the channel; see
//! [`Pipeline::dispatch_pending`](crate::pipeline::Pipeline::dispatch_pending).

pub mod handle;
pub mod header;
pub mod mock;

pub use handle::{BufferHandle, ComponentHandle, ConnectionHandle, PoolHandle, PortHandle};
pub use header::{BufferFlags, BufferMetadata, RawBufferHeader, TIME_UNKNOWN};
pub use mock::{EngineCall, MockComponentSpec, MockEngine};

use crate::pipeline::error::{PipelineError, PipelineResult};
use crossbeam_channel::Sender;
use std::fmt;
use std::sync::Arc;

/// Status code returned by every native operation.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success = 0,
    NoMemory = 1,
    NoSpace = 2,
    InvalidArgument = 3,
    NotImplemented = 4,
    NotFound = 5,
    NoSuchDevice = 6,
    Io = 7,
    IllegalSeek = 8,
    Corrupt = 9,
    NotReady = 10,
    BadConfig = 11,
    AlreadyConnected = 12,
    NotConnected = 13,
    Again = 14,
    BadAddress = 15,
}

impl Status {
    #[inline]
    pub fn is_success(self) -> bool {
        self == Status::Success
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    /// Map a non-success status to [`PipelineError::NativeOperationFailed`].
    pub fn check(self, operation: &'static str) -> PipelineResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(PipelineError::NativeOperationFailed {
                operation,
                status: self,
            })
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::Success => "success",
            Status::NoMemory => "out of memory",
            Status::NoSpace => "out of resources",
            Status::InvalidArgument => "invalid argument",
            Status::NotImplemented => "not implemented",
            Status::NotFound => "not found",
            Status::NoSuchDevice => "no such device",
            Status::Io => "I/O error",
            Status::IllegalSeek => "illegal seek",
            Status::Corrupt => "data is corrupt",
            Status::NotReady => "component is not ready",
            Status::BadConfig => "component is not configured",
            Status::AlreadyConnected => "port is already connected",
            Status::NotConnected => "port is disconnected",
            Status::Again => "resource temporarily unavailable",
            Status::BadAddress => "bad address",
        };
        write!(f, "{} ({})", text, self.code())
    }
}

/// Four-character code identifying an encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FourCc(pub u32);

impl FourCc {
    pub const UNSET: FourCc = FourCc(0);
    pub const I420: FourCc = FourCc::new(b"I420");
    pub const RGB3: FourCc = FourCc::new(b"RGB3");
    pub const H264: FourCc = FourCc::new(b"H264");
    pub const JPEG: FourCc = FourCc::new(b"JPEG");
    pub const OPAQUE: FourCc = FourCc::new(b"OPQV");

    pub const fn new(code: &[u8; 4]) -> Self {
        Self(u32::from_le_bytes(*code))
    }

    pub fn is_set(self) -> bool {
        self != Self::UNSET
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({})", self)
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_set() {
            return write!(f, "----");
        }
        for b in self.0.to_le_bytes() {
            let c = if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '?'
            };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

/// Elementary stream format negotiated on a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortFormat {
    pub encoding: FourCc,
    pub encoding_variant: FourCc,
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
}

impl PortFormat {
    pub fn video(encoding: FourCc, width: u32, height: u32) -> Self {
        Self {
            encoding,
            encoding_variant: FourCc::UNSET,
            width,
            height,
            bitrate: 0,
        }
    }
}

/// Buffer requirements a port reports once its format is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferRequirements {
    pub num_min: u32,
    pub size_min: u32,
    pub num_recommended: u32,
    pub size_recommended: u32,
}

impl BufferRequirements {
    /// Count/size to allocate when the caller has no preference.
    pub fn preferred(&self) -> (u32, u32) {
        (
            self.num_recommended.max(self.num_min),
            self.size_recommended.max(self.size_min),
        )
    }
}

/// Native port table of a freshly created component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
    pub handle: ComponentHandle,
    pub control: PortHandle,
    pub inputs: Vec<PortHandle>,
    pub outputs: Vec<PortHandle>,
    pub clocks: Vec<PortHandle>,
    pub generic: Vec<PortHandle>,
}

/// A buffer handed back by the engine to the port's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferEvent {
    pub port: PortHandle,
    pub buffer: BufferHandle,
}

/// Where the engine posts [`BufferEvent`]s for an enabled port.
pub type BufferCallback = Sender<BufferEvent>;

/// Invoked when a pool buffer's last reference is released. Returning
/// `true` keeps the buffer out of the free list until
/// [`MediaEngine::buffer_release_continue`] is called.
pub type PreReleaseHook = Arc<dyn Fn(BufferHandle) -> bool + Send + Sync>;

/// The native engine's operation set.
///
/// All methods are callable from any thread. Operations on a handle that
/// does not refer to a live object return [`Status::InvalidArgument`].
#[cfg_attr(test, mockall::automock)]
pub trait MediaEngine: Send + Sync {
    /// Initialise process-wide engine state. Must precede any other call.
    fn init(&self) -> Status;

    /// Tear down process-wide state. Fails while components are alive.
    fn deinit(&self) -> Status;

    // ── Components ──

    fn create_component(&self, name: &str) -> Result<ComponentInfo, Status>;

    /// Release the caller's reference and destroy the component.
    fn destroy_component(&self, component: ComponentHandle) -> Status;

    fn acquire_component(&self, component: ComponentHandle) -> Status;

    fn release_component(&self, component: ComponentHandle) -> Status;

    fn enable_component(&self, component: ComponentHandle) -> Status;

    fn disable_component(&self, component: ComponentHandle) -> Status;

    fn component_enabled(&self, component: ComponentHandle) -> bool;

    fn component_name(&self, component: ComponentHandle) -> Option<String>;

    // ── Ports ──

    fn enable_port(&self, port: PortHandle, callback: Option<BufferCallback>) -> Status;

    fn disable_port(&self, port: PortHandle) -> Status;

    fn port_enabled(&self, port: PortHandle) -> bool;

    fn port_format(&self, port: PortHandle) -> Result<PortFormat, Status>;

    fn set_port_format(&self, port: PortHandle, format: PortFormat) -> Status;

    fn port_requirements(&self, port: PortHandle) -> Result<BufferRequirements, Status>;

    /// Hand a buffer to a port: an empty one to fill (output) or a full one
    /// to consume (input).
    fn send_buffer(&self, port: PortHandle, buffer: BufferHandle) -> Status;

    // ── Pools ──

    fn create_pool(&self, port: PortHandle, count: u32, size: u32)
        -> Result<PoolHandle, Status>;

    fn destroy_pool(&self, pool: PoolHandle) -> Status;

    /// Take a buffer from the free list. `Ok(None)` when the pool is empty.
    fn pool_get(&self, pool: PoolHandle) -> Result<Option<BufferHandle>, Status>;

    fn pool_available(&self, pool: PoolHandle) -> usize;

    fn set_pre_release_hook(&self, pool: PoolHandle, hook: Option<PreReleaseHook>) -> Status;

    // ── Connections ──

    fn create_connection(
        &self,
        source: PortHandle,
        target: PortHandle,
    ) -> Result<ConnectionHandle, Status>;

    fn destroy_connection(&self, connection: ConnectionHandle) -> Status;

    fn enable_connection(&self, connection: ConnectionHandle) -> Status;

    fn disable_connection(&self, connection: ConnectionHandle) -> Status;

    fn connection_enabled(&self, connection: ConnectionHandle) -> bool;

    // ── Buffer headers ──

    fn buffer_acquire(&self, buffer: BufferHandle) -> Status;

    fn buffer_release(&self, buffer: BufferHandle) -> Status;

    /// Return a buffer kept by a pre-release hook to its pool.
    fn buffer_release_continue(&self, buffer: BufferHandle) -> Status;

    fn buffer_reset(&self, buffer: BufferHandle) -> Status;

    fn lock_buffer(&self, buffer: BufferHandle) -> Status;

    fn unlock_buffer(&self, buffer: BufferHandle) -> Status;

    /// Requires the buffer to be locked.
    fn read_header(&self, buffer: BufferHandle) -> Result<BufferMetadata, Status>;

    /// Requires the buffer to be locked.
    fn write_header(&self, buffer: BufferHandle, metadata: BufferMetadata) -> Status;

    /// The `length` bytes starting at `offset`. Requires the buffer to be locked.
    fn read_payload(&self, buffer: BufferHandle) -> Result<Vec<u8>, Status>;

    /// Copy `data` to the start of the buffer and set `length`/`offset`.
    /// Requires the buffer to be locked.
    fn write_payload(&self, buffer: BufferHandle, data: &[u8]) -> Status;

    /// Make `dest` describe the same memory and metadata as `source`.
    fn replicate_buffer(&self, dest: BufferHandle, source: BufferHandle) -> Status;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_check() {
        assert!(Status::Success.check("noop").is_ok());
        let err = Status::NoMemory.check("create_pool").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::NativeOperationFailed {
                operation: "create_pool",
                status: Status::NoMemory
            }
        ));
        assert!(err.to_string().contains("create_pool"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::Success.code(), 0);
        assert_eq!(Status::NotReady.code(), 10);
        assert_eq!(Status::BadAddress.code(), 15);
    }

    #[test]
    fn test_fourcc_display() {
        assert_eq!(FourCc::H264.to_string(), "H264");
        assert_eq!(FourCc::UNSET.to_string(), "----");
        assert_eq!(format!("{:?}", FourCc::I420), "FourCc(I420)");
    }

    #[test]
    fn test_requirements_preferred() {
        let req = BufferRequirements {
            num_min: 4,
            size_min: 1024,
            num_recommended: 2,
            size_recommended: 4096,
        };
        assert_eq!(req.preferred(), (4, 4096));
    }
}
