//! Native buffer header layout and its safe metadata view.
//!
//! [`RawBufferHeader`] is the bit-exact structure exchanged with the engine.
//! Field order and sizes must not change: the engine reads and writes it
//! directly. Code outside the engine never dereferences its pointers; it
//! works with the copied [`BufferMetadata`] instead.

use bitflags::bitflags;
use std::ffi::c_void;
use std::ptr;

/// Timestamp sentinel meaning "unknown".
pub const TIME_UNKNOWN: i64 = i64::MIN;

bitflags! {
    /// Flag word of a buffer header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u32 {
        /// End of stream.
        const EOS = 1 << 0;
        /// Start of a frame.
        const FRAME_START = 1 << 1;
        /// End of a frame.
        const FRAME_END = 1 << 2;
        /// A complete frame.
        const FRAME = Self::FRAME_START.bits() | Self::FRAME_END.bits();
        /// Key frame.
        const KEYFRAME = 1 << 3;
        /// Data discontinuity before this buffer.
        const DISCONTINUITY = 1 << 4;
        /// Codec configuration data.
        const CONFIG = 1 << 5;
        /// Payload is encrypted.
        const ENCRYPTED = 1 << 6;
        /// Codec side information.
        const CODEC_SIDE_INFO = 1 << 7;
        /// Snapshot frame.
        const SNAPSHOT = 1 << 8;
        /// Payload is known to be corrupted.
        const CORRUPTED = 1 << 9;
        /// Payload could not be transmitted.
        const TRANSMISSION_FAILED = 1 << 10;
        /// Decode but do not display.
        const DECODE_ONLY = 1 << 11;
        /// End of a NAL unit.
        const NAL_END = 1 << 12;
    }
}

/// Buffer header as laid out by the native engine.
#[repr(C)]
#[derive(Debug)]
pub struct RawBufferHeader {
    /// Engine-internal queue link.
    pub next: *mut RawBufferHeader,
    /// Engine-private state.
    pub priv_: *mut c_void,
    pub cmd: u32,
    pub data: *mut u8,
    pub alloc_size: u32,
    pub length: u32,
    pub offset: u32,
    pub flags: u32,
    pub pts: i64,
    pub dts: i64,
    /// Type-specific descriptor.
    pub type_: *mut c_void,
    pub user_data: *mut c_void,
}

impl RawBufferHeader {
    /// Header describing `alloc_size` bytes at `data`, in the reset state.
    pub fn new(data: *mut u8, alloc_size: u32) -> Self {
        Self {
            next: ptr::null_mut(),
            priv_: ptr::null_mut(),
            cmd: 0,
            data,
            alloc_size,
            length: 0,
            offset: 0,
            flags: 0,
            pts: TIME_UNKNOWN,
            dts: TIME_UNKNOWN,
            type_: ptr::null_mut(),
            user_data: ptr::null_mut(),
        }
    }

    /// Clear length, offset, flags, command and timestamps. Memory is kept.
    pub fn reset(&mut self) {
        self.cmd = 0;
        self.length = 0;
        self.offset = 0;
        self.flags = 0;
        self.pts = TIME_UNKNOWN;
        self.dts = TIME_UNKNOWN;
    }
}

/// Copied view of a buffer header's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferMetadata {
    pub command: u32,
    pub alloc_size: u32,
    pub length: u32,
    pub offset: u32,
    pub flags: BufferFlags,
    pub pts: i64,
    pub dts: i64,
}

impl BufferMetadata {
    pub fn from_raw(raw: &RawBufferHeader) -> Self {
        Self {
            command: raw.cmd,
            alloc_size: raw.alloc_size,
            length: raw.length,
            offset: raw.offset,
            flags: BufferFlags::from_bits_retain(raw.flags),
            pts: raw.pts,
            dts: raw.dts,
        }
    }

    /// Write the mutable fields back into a native header.
    ///
    /// `alloc_size` and the pointer fields belong to the engine and are left
    /// untouched.
    pub fn apply_to(&self, raw: &mut RawBufferHeader) {
        raw.cmd = self.command;
        raw.length = self.length;
        raw.offset = self.offset;
        raw.flags = self.flags.bits();
        raw.pts = self.pts;
        raw.dts = self.dts;
    }

    /// True when the header is in the reset state.
    pub fn is_empty(&self) -> bool {
        self.length == 0
            && self.flags.is_empty()
            && self.pts == TIME_UNKNOWN
            && self.dts == TIME_UNKNOWN
    }

    pub fn is_eos(&self) -> bool {
        self.flags.contains(BufferFlags::EOS)
    }

    /// `length + offset` must fit in the allocation.
    pub fn is_consistent(&self) -> bool {
        (self.length as u64 + self.offset as u64) <= self.alloc_size as u64
    }
}
