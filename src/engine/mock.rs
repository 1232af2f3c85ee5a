//! Mock Engine Implementation for Testing
//!
//! This module provides an in-process engine that behaves like the native
//! media engine closely enough to exercise the whole lifecycle: component
//! creation from a named port table, port enable/disable with callback
//! delivery, fixed-size pools with reference-counted buffer headers, memory
//! locking, connections and teardown hazards.
//!
//! # Features
//!
//! - **Call log**: every state-changing operation is appended to an ordered
//!   log ([`MockEngine::calls`]) so tests can assert cascade ordering.
//! - **Fault injection**: [`MockEngine::fail_next`] makes the next call of a
//!   named operation return a chosen status.
//! - **Memory budget**: pool allocation fails with [`Status::NoMemory`] once
//!   the configured budget is exhausted.
//! - **Teardown hazards**: destroying a component that still owns pools, or a
//!   pool whose buffers are queued on an enabled port, returns
//!   [`Status::NotReady`] where the real engine would block forever.
//!
//! # Buffer delivery
//!
//! With auto-processing on (the default) a buffer sent to an enabled port is
//! processed immediately and posted to the port's callback channel. Output
//! ports fill it with a synthetic frame first. With auto-processing off,
//! buffers stay queued on the port until [`MockEngine::process_port`] is
//! called, which may happen on any thread.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vcgraph::engine::{MediaEngine, MockEngine};
//!
//! let engine = Arc::new(MockEngine::new());
//! engine.init();
//! let info = engine.create_component("vc.ril.camera").unwrap();
//! assert_eq!(info.outputs.len(), 3);
//! ```

use super::header::{BufferFlags, BufferMetadata, RawBufferHeader};
use super::{
    BufferCallback, BufferEvent, BufferHandle, BufferRequirements, ComponentHandle,
    ComponentInfo, ConnectionHandle, FourCc, MediaEngine, PoolHandle, PortFormat, PortHandle,
    PreReleaseHook, Status,
};
use crate::pipeline::port::PortKind;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Default memory budget for pool allocations (64 MiB).
pub const DEFAULT_MEMORY_BUDGET: usize = 64 * 1024 * 1024;

/// Frame interval used for synthetic timestamps (30 fps, microseconds).
const FRAME_INTERVAL_US: i64 = 33_333;

/// Key frame period for synthetic frames.
const KEYFRAME_PERIOD: u64 = 30;

/// Operation recorded in the mock's call log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Init,
    Deinit,
    CreateComponent(String),
    DestroyComponent(ComponentHandle),
    AcquireComponent(ComponentHandle),
    ReleaseComponent(ComponentHandle),
    EnableComponent(ComponentHandle),
    DisableComponent(ComponentHandle),
    EnablePort(PortHandle),
    DisablePort(PortHandle),
    SetFormat(PortHandle),
    SendBuffer { port: PortHandle, buffer: BufferHandle },
    CreatePool { port: PortHandle, count: u32, size: u32 },
    DestroyPool(PoolHandle),
    CreateConnection { source: PortHandle, target: PortHandle },
    DestroyConnection(ConnectionHandle),
    EnableConnection(ConnectionHandle),
    DisableConnection(ConnectionHandle),
}

/// Port table and default formats for a named mock component.
#[derive(Debug, Clone)]
pub struct MockComponentSpec {
    pub inputs: u32,
    pub outputs: u32,
    pub clocks: u32,
    pub generic: u32,
    pub input_format: PortFormat,
    pub output_format: PortFormat,
    pub buffer_num_recommended: u32,
    pub buffer_size_recommended: u32,
}

impl MockComponentSpec {
    pub fn new(inputs: u32, outputs: u32, clocks: u32) -> Self {
        let raw = PortFormat::video(FourCc::I420, 640, 480);
        Self {
            inputs,
            outputs,
            clocks,
            generic: 0,
            input_format: raw,
            output_format: raw,
            buffer_num_recommended: 3,
            buffer_size_recommended: 640 * 480 * 3 / 2,
        }
    }

    pub fn with_generic(mut self, generic: u32) -> Self {
        self.generic = generic;
        self
    }

    pub fn with_output_format(mut self, format: PortFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_input_format(mut self, format: PortFormat) -> Self {
        self.input_format = format;
        self
    }

    pub fn with_buffers(mut self, count: u32, size: u32) -> Self {
        self.buffer_num_recommended = count;
        self.buffer_size_recommended = size;
        self
    }
}

fn default_component_table() -> HashMap<String, MockComponentSpec> {
    let h264 = PortFormat {
        bitrate: 17_000_000,
        ..PortFormat::video(FourCc::H264, 640, 480)
    };
    let jpeg = PortFormat::video(FourCc::JPEG, 640, 480);

    let mut table = HashMap::new();
    table.insert(
        "vc.ril.camera".to_string(),
        MockComponentSpec::new(0, 3, 1).with_output_format(PortFormat::video(
            FourCc::OPAQUE,
            640,
            480,
        )),
    );
    table.insert(
        "vc.ril.video_encode".to_string(),
        MockComponentSpec::new(1, 1, 0)
            .with_output_format(h264)
            .with_buffers(1, 64 * 1024),
    );
    table.insert(
        "vc.ril.image_encode".to_string(),
        MockComponentSpec::new(1, 1, 0)
            .with_output_format(jpeg)
            .with_buffers(1, 128 * 1024),
    );
    table.insert(
        "vc.ril.video_render".to_string(),
        MockComponentSpec::new(1, 0, 0),
    );
    table.insert("vc.null_sink".to_string(), MockComponentSpec::new(1, 0, 0));
    table.insert(
        "vc.ril.video_splitter".to_string(),
        MockComponentSpec::new(1, 4, 0),
    );
    table.insert("vc.ril.resize".to_string(), MockComponentSpec::new(1, 1, 0));
    table.insert("vc.ril.isp".to_string(), MockComponentSpec::new(1, 3, 0));
    table
}

struct MockComponent {
    name: String,
    refcount: u32,
    enabled: bool,
    ports: Vec<PortHandle>,
}

struct MockPort {
    component: ComponentHandle,
    kind: PortKind,
    enabled: bool,
    format: PortFormat,
    requirements: BufferRequirements,
    callback: Option<BufferCallback>,
    queued: VecDeque<BufferHandle>,
    connection: Option<ConnectionHandle>,
    frames_emitted: u64,
}

struct MockPool {
    port: PortHandle,
    buffers: Vec<BufferHandle>,
    free: VecDeque<BufferHandle>,
    buffer_size: u32,
    pre_release: Option<PreReleaseHook>,
}

struct MockBuffer {
    header: RawBufferHeader,
    storage: Box<[u8]>,
    pool: PoolHandle,
    refcount: u32,
    lock_count: u32,
    owner: Option<PortHandle>,
    /// Memory borrowed from another header via replication.
    replicated_from: Option<BufferHandle>,
    held_by_hook: bool,
}

// SAFETY: the header's pointer fields are either null or point into
// `storage`, which is owned by the same value and only touched under the
// engine mutex.
unsafe impl Send for MockBuffer {}

struct MockConnection {
    source: PortHandle,
    target: PortHandle,
    enabled: bool,
}

struct MockState {
    initialized: bool,
    table: HashMap<String, MockComponentSpec>,
    components: HashMap<ComponentHandle, MockComponent>,
    ports: HashMap<PortHandle, MockPort>,
    pools: HashMap<PoolHandle, MockPool>,
    buffers: HashMap<BufferHandle, MockBuffer>,
    connections: HashMap<ConnectionHandle, MockConnection>,
    next_handle: u32,
    memory_used: usize,
    memory_budget: usize,
    auto_process: bool,
    fill_length: Option<u32>,
    eos_after: Option<u64>,
    faults: Vec<(&'static str, Status)>,
    calls: Vec<EngineCall>,
}

impl MockState {
    fn next_handle(&mut self) -> u32 {
        let h = self.next_handle;
        self.next_handle += 1;
        h
    }

    fn take_fault(&mut self, operation: &str) -> Option<Status> {
        let idx = self.faults.iter().position(|(op, _)| *op == operation)?;
        Some(self.faults.remove(idx).1)
    }

    /// Fill an output buffer with a synthetic frame.
    fn fill_frame(&mut self, port: PortHandle, buffer: BufferHandle) {
        let fill_length = self.fill_length;
        let eos_after = self.eos_after;
        let frame = match self.ports.get_mut(&port) {
            Some(p) => {
                p.frames_emitted += 1;
                p.frames_emitted
            }
            None => return,
        };
        let Some(buf) = self.buffers.get_mut(&buffer) else {
            return;
        };
        let len = fill_length
            .unwrap_or((buf.header.alloc_size / 2).max(1))
            .min(buf.header.alloc_size) as usize;
        buf.storage[..len].fill(frame as u8);

        let mut flags = BufferFlags::FRAME_END;
        if frame % KEYFRAME_PERIOD == 1 {
            flags |= BufferFlags::KEYFRAME;
        }
        if eos_after.is_some_and(|n| frame >= n) {
            flags |= BufferFlags::EOS;
        }
        buf.header.length = len as u32;
        buf.header.offset = 0;
        buf.header.flags = flags.bits();
        buf.header.pts = (frame as i64 - 1) * FRAME_INTERVAL_US;
        buf.header.dts = buf.header.pts;
    }

    /// Hand the oldest queued buffer of `port` back to its owner. A full
    /// callback queue leaves the buffer queued for a later pass.
    fn process_one(&mut self, port: PortHandle) -> bool {
        let Some(p) = self.ports.get_mut(&port) else {
            return false;
        };
        if p.callback.as_ref().is_some_and(|cb| cb.is_full()) {
            tracing::trace!("Mock engine: callback queue full, {} holds its buffers", port);
            return false;
        }
        let Some(buffer) = p.queued.pop_front() else {
            return false;
        };
        let kind = p.kind;
        let callback = p.callback.clone();
        if kind == PortKind::Output {
            self.fill_frame(port, buffer);
        }
        if let Some(buf) = self.buffers.get_mut(&buffer) {
            buf.owner = None;
        }
        match callback {
            Some(cb) => {
                if let Err(e) = cb.try_send(BufferEvent { port, buffer }) {
                    tracing::warn!("Mock engine: posting to {} failed: {}", port, e);
                }
            }
            None => tracing::warn!("Mock engine: {} has no callback, buffer dropped", port),
        }
        true
    }

    /// Return every buffer queued on `port` to its owner (port flush).
    fn flush_port(&mut self, port: PortHandle) -> Vec<BufferHandle> {
        let Some(p) = self.ports.get_mut(&port) else {
            return Vec::new();
        };
        let queued: Vec<_> = p.queued.drain(..).collect();
        let callback = p.callback.clone();
        let mut unowned = Vec::new();
        for &buffer in &queued {
            if let Some(buf) = self.buffers.get_mut(&buffer) {
                buf.owner = None;
                buf.header.reset();
            }
            match &callback {
                Some(cb) if cb.try_send(BufferEvent { port, buffer }).is_ok() => {}
                _ => unowned.push(buffer),
            }
        }
        unowned
    }

    fn set_port_enabled(&mut self, port: PortHandle, enabled: bool) -> Vec<BufferHandle> {
        let mut flushed = Vec::new();
        if !enabled {
            flushed = self.flush_port(port);
        }
        if let Some(p) = self.ports.get_mut(&port) {
            p.enabled = enabled;
            if !enabled {
                p.callback = None;
            }
        }
        flushed
    }

    /// Drop one reference. Returns the hook to run (outside the lock) when
    /// the last reference went away on a hooked pool.
    fn release_ref(&mut self, buffer: BufferHandle) -> Result<Option<PreReleaseHook>, Status> {
        let buf = self.buffers.get_mut(&buffer).ok_or(Status::InvalidArgument)?;
        if buf.refcount == 0 {
            return Err(Status::InvalidArgument);
        }
        buf.refcount -= 1;
        if buf.refcount > 0 {
            return Ok(None);
        }
        let pool = buf.pool;
        let hook = self.pools.get(&pool).and_then(|p| p.pre_release.clone());
        if hook.is_some() {
            return Ok(hook);
        }
        self.return_to_pool(buffer);
        Ok(None)
    }

    fn return_to_pool(&mut self, buffer: BufferHandle) {
        let Some(buf) = self.buffers.get_mut(&buffer) else {
            return;
        };
        buf.header.reset();
        buf.owner = None;
        buf.held_by_hook = false;
        buf.lock_count = 0;
        let pool = buf.pool;
        let source = buf.replicated_from.take();
        if let Some(p) = self.pools.get_mut(&pool) {
            if !p.free.contains(&buffer) {
                p.free.push_back(buffer);
            }
        }
        if let Some(source) = source {
            // The replica's memory reference goes with it.
            if let Ok(Some(_hook)) = self.release_ref(source) {
                self.return_to_pool(source);
            }
        }
    }

    fn payload_source(&self, buffer: BufferHandle) -> BufferHandle {
        self.buffers
            .get(&buffer)
            .and_then(|b| b.replicated_from)
            .unwrap_or(buffer)
    }
}

/// In-process reference engine.
pub struct MockEngine {
    state: Mutex<MockState>,
}

impl MockEngine {
    /// Create a mock engine with the default component table.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                initialized: false,
                table: default_component_table(),
                components: HashMap::new(),
                ports: HashMap::new(),
                pools: HashMap::new(),
                buffers: HashMap::new(),
                connections: HashMap::new(),
                next_handle: 1,
                memory_used: 0,
                memory_budget: DEFAULT_MEMORY_BUDGET,
                auto_process: true,
                fill_length: None,
                eos_after: None,
                faults: Vec::new(),
                calls: Vec::new(),
            }),
        }
    }

    /// Register (or replace) a named component.
    pub fn with_component(self, name: impl Into<String>, spec: MockComponentSpec) -> Self {
        self.state.lock().table.insert(name.into(), spec);
        self
    }

    /// Limit the memory available to pools.
    pub fn with_memory_budget(self, bytes: usize) -> Self {
        self.state.lock().memory_budget = bytes;
        self
    }

    /// Fixed payload length for synthetic frames (default: half the buffer).
    pub fn with_fill_length(self, bytes: u32) -> Self {
        self.state.lock().fill_length = Some(bytes);
        self
    }

    /// Flag the `n`th frame of every output port with EOS.
    pub fn with_eos_after(self, frames: u64) -> Self {
        self.state.lock().eos_after = Some(frames);
        self
    }

    /// Turn immediate processing of sent buffers on or off.
    pub fn set_auto_process(&self, enabled: bool) {
        self.state.lock().auto_process = enabled;
    }

    /// Make the next call of `operation` return `status`.
    pub fn fail_next(&self, operation: &'static str, status: Status) {
        self.state.lock().faults.push((operation, status));
    }

    /// Process every buffer queued on `port`. Returns how many were delivered.
    pub fn process_port(&self, port: PortHandle) -> usize {
        let mut state = self.state.lock();
        let mut n = 0;
        while state.process_one(port) {
            n += 1;
        }
        n
    }

    /// Buffers currently queued on `port`.
    pub fn queued(&self, port: PortHandle) -> usize {
        self.state
            .lock()
            .ports
            .get(&port)
            .map(|p| p.queued.len())
            .unwrap_or(0)
    }

    /// Snapshot of the call log.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn live_components(&self) -> usize {
        self.state.lock().components.len()
    }

    pub fn live_pools(&self) -> usize {
        self.state.lock().pools.len()
    }

    pub fn live_connections(&self) -> usize {
        self.state.lock().connections.len()
    }

    pub fn memory_used(&self) -> usize {
        self.state.lock().memory_used
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    /// Native reference count of a component (0 once destroyed).
    pub fn component_refcount(&self, component: ComponentHandle) -> u32 {
        self.state
            .lock()
            .components
            .get(&component)
            .map(|c| c.refcount)
            .unwrap_or(0)
    }

    /// Reference count of a buffer header (0 while idle in its pool).
    pub fn buffer_refcount(&self, buffer: BufferHandle) -> u32 {
        self.state
            .lock()
            .buffers
            .get(&buffer)
            .map(|b| b.refcount)
            .unwrap_or(0)
    }

    pub fn buffer_locked(&self, buffer: BufferHandle) -> bool {
        self.state
            .lock()
            .buffers
            .get(&buffer)
            .is_some_and(|b| b.lock_count > 0)
    }

    pub fn buffer_held_by_hook(&self, buffer: BufferHandle) -> bool {
        self.state
            .lock()
            .buffers
            .get(&buffer)
            .is_some_and(|b| b.held_by_hook)
    }

    fn destroy_component_locked(state: &mut MockState, component: ComponentHandle) -> Status {
        let Some(comp) = state.components.get(&component) else {
            return Status::InvalidArgument;
        };
        let ports = comp.ports.clone();
        let has_pools = state.pools.values().any(|p| ports.contains(&p.port));
        let connected = ports
            .iter()
            .any(|p| state.ports.get(p).is_some_and(|p| p.connection.is_some()));
        if has_pools || connected {
            // The native engine would wait forever for the outstanding buffers.
            tracing::error!(
                "Mock engine: {} destroyed with live pools or connections",
                component
            );
            return Status::NotReady;
        }
        for port in &ports {
            state.ports.remove(port);
        }
        state.components.remove(&component);
        Status::Success
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! fault {
    ($state:expr, $op:literal) => {
        if let Some(status) = $state.take_fault($op) {
            tracing::debug!("Mock engine: injected {} for {}", status, $op);
            return status;
        }
    };
    ($state:expr, $op:literal, Err) => {
        if let Some(status) = $state.take_fault($op) {
            tracing::debug!("Mock engine: injected {} for {}", status, $op);
            return Err(status);
        }
    };
}

impl MediaEngine for MockEngine {
    fn init(&self) -> Status {
        let mut state = self.state.lock();
        fault!(state, "init");
        state.initialized = true;
        state.calls.push(EngineCall::Init);
        Status::Success
    }

    fn deinit(&self) -> Status {
        let mut state = self.state.lock();
        fault!(state, "deinit");
        if !state.components.is_empty() {
            return Status::NotReady;
        }
        state.initialized = false;
        state.calls.push(EngineCall::Deinit);
        Status::Success
    }

    fn create_component(&self, name: &str) -> Result<ComponentInfo, Status> {
        let mut state = self.state.lock();
        fault!(state, "create_component", Err);
        if !state.initialized {
            return Err(Status::NotReady);
        }
        let spec = state.table.get(name).cloned().ok_or(Status::NotFound)?;
        let handle = ComponentHandle(state.next_handle());

        let requirements = BufferRequirements {
            num_min: 1,
            size_min: (spec.buffer_size_recommended / 2).max(1),
            num_recommended: spec.buffer_num_recommended,
            size_recommended: spec.buffer_size_recommended,
        };

        let state = &mut *state;
        let make_port = |state: &mut MockState, kind: PortKind| {
            let port = PortHandle(state.next_handle());
            let format = match kind {
                PortKind::Input => spec.input_format,
                PortKind::Output => spec.output_format,
                _ => PortFormat::default(),
            };
            state.ports.insert(
                port,
                MockPort {
                    component: handle,
                    kind,
                    enabled: false,
                    format,
                    requirements,
                    callback: None,
                    queued: VecDeque::new(),
                    connection: None,
                    frames_emitted: 0,
                },
            );
            port
        };

        let control = make_port(&mut *state, PortKind::Control);
        let inputs: Vec<_> = (0..spec.inputs)
            .map(|_| make_port(&mut *state, PortKind::Input))
            .collect();
        let outputs: Vec<_> = (0..spec.outputs)
            .map(|_| make_port(&mut *state, PortKind::Output))
            .collect();
        let clocks: Vec<_> = (0..spec.clocks)
            .map(|_| make_port(&mut *state, PortKind::Clock))
            .collect();
        let generic: Vec<_> = (0..spec.generic)
            .map(|_| make_port(&mut *state, PortKind::Generic))
            .collect();

        let mut ports = vec![control];
        ports.extend(&inputs);
        ports.extend(&outputs);
        ports.extend(&clocks);
        ports.extend(&generic);

        state.components.insert(
            handle,
            MockComponent {
                name: name.to_string(),
                refcount: 1,
                enabled: false,
                ports,
            },
        );
        state.calls.push(EngineCall::CreateComponent(name.to_string()));

        Ok(ComponentInfo {
            handle,
            control,
            inputs,
            outputs,
            clocks,
            generic,
        })
    }

    fn destroy_component(&self, component: ComponentHandle) -> Status {
        let mut state = self.state.lock();
        fault!(state, "destroy_component");
        match state.components.get(&component) {
            None => return Status::InvalidArgument,
            Some(c) if c.refcount > 1 => return Status::NotReady,
            Some(_) => {}
        }
        let status = Self::destroy_component_locked(&mut state, component);
        if status.is_success() {
            state.calls.push(EngineCall::DestroyComponent(component));
        }
        status
    }

    fn acquire_component(&self, component: ComponentHandle) -> Status {
        let mut state = self.state.lock();
        fault!(state, "acquire_component");
        let Some(comp) = state.components.get_mut(&component) else {
            return Status::InvalidArgument;
        };
        comp.refcount += 1;
        state.calls.push(EngineCall::AcquireComponent(component));
        Status::Success
    }

    fn release_component(&self, component: ComponentHandle) -> Status {
        let mut state = self.state.lock();
        fault!(state, "release_component");
        let Some(comp) = state.components.get_mut(&component) else {
            return Status::InvalidArgument;
        };
        if comp.refcount > 1 {
            comp.refcount -= 1;
            state.calls.push(EngineCall::ReleaseComponent(component));
            return Status::Success;
        }
        let status = Self::destroy_component_locked(&mut state, component);
        if status.is_success() {
            state.calls.push(EngineCall::ReleaseComponent(component));
        }
        status
    }

    fn enable_component(&self, component: ComponentHandle) -> Status {
        let mut state = self.state.lock();
        fault!(state, "enable_component");
        let Some(comp) = state.components.get_mut(&component) else {
            return Status::InvalidArgument;
        };
        comp.enabled = true;
        state.calls.push(EngineCall::EnableComponent(component));
        Status::Success
    }

    fn disable_component(&self, component: ComponentHandle) -> Status {
        let mut state = self.state.lock();
        fault!(state, "disable_component");
        let Some(comp) = state.components.get_mut(&component) else {
            return Status::InvalidArgument;
        };
        comp.enabled = false;
        state.calls.push(EngineCall::DisableComponent(component));
        Status::Success
    }

    fn component_enabled(&self, component: ComponentHandle) -> bool {
        self.state
            .lock()
            .components
            .get(&component)
            .is_some_and(|c| c.enabled)
    }

    fn component_name(&self, component: ComponentHandle) -> Option<String> {
        self.state
            .lock()
            .components
            .get(&component)
            .map(|c| c.name.clone())
    }

    fn enable_port(&self, port: PortHandle, callback: Option<BufferCallback>) -> Status {
        let mut state = self.state.lock();
        fault!(state, "enable_port");
        let Some(p) = state.ports.get_mut(&port) else {
            return Status::InvalidArgument;
        };
        if p.enabled {
            return Status::InvalidArgument;
        }
        let data_port = matches!(p.kind, PortKind::Input | PortKind::Output);
        if data_port && callback.is_none() && p.connection.is_none() {
            return Status::InvalidArgument;
        }
        if data_port && !p.format.encoding.is_set() {
            return Status::BadConfig;
        }
        p.enabled = true;
        p.callback = callback;
        state.calls.push(EngineCall::EnablePort(port));
        Status::Success
    }

    fn disable_port(&self, port: PortHandle) -> Status {
        let mut state = self.state.lock();
        fault!(state, "disable_port");
        match state.ports.get(&port) {
            None => return Status::InvalidArgument,
            Some(p) if !p.enabled => return Status::InvalidArgument,
            Some(_) => {}
        }
        let unowned = state.set_port_enabled(port, false);
        for buffer in unowned {
            if let Ok(Some(_hook)) = state.release_ref(buffer) {
                state.return_to_pool(buffer);
            }
        }
        state.calls.push(EngineCall::DisablePort(port));
        Status::Success
    }

    fn port_enabled(&self, port: PortHandle) -> bool {
        self.state
            .lock()
            .ports
            .get(&port)
            .is_some_and(|p| p.enabled)
    }

    fn port_format(&self, port: PortHandle) -> Result<PortFormat, Status> {
        self.state
            .lock()
            .ports
            .get(&port)
            .map(|p| p.format)
            .ok_or(Status::InvalidArgument)
    }

    fn set_port_format(&self, port: PortHandle, format: PortFormat) -> Status {
        let mut state = self.state.lock();
        fault!(state, "set_port_format");
        let Some(p) = state.ports.get_mut(&port) else {
            return Status::InvalidArgument;
        };
        if p.enabled {
            return Status::InvalidArgument;
        }
        p.format = format;
        if format.width > 0 && format.height > 0 && format.bitrate == 0 {
            let frame = format.width * format.height * 3 / 2;
            p.requirements.size_recommended = frame;
            p.requirements.size_min = (frame / 2).max(1);
        }
        state.calls.push(EngineCall::SetFormat(port));
        Status::Success
    }

    fn port_requirements(&self, port: PortHandle) -> Result<BufferRequirements, Status> {
        self.state
            .lock()
            .ports
            .get(&port)
            .map(|p| p.requirements)
            .ok_or(Status::InvalidArgument)
    }

    fn send_buffer(&self, port: PortHandle, buffer: BufferHandle) -> Status {
        let mut state = self.state.lock();
        fault!(state, "send_buffer");
        match state.ports.get(&port) {
            None => return Status::InvalidArgument,
            Some(p) if !p.enabled || p.callback.is_none() => return Status::InvalidArgument,
            Some(_) => {}
        }
        match state.buffers.get_mut(&buffer) {
            None => return Status::InvalidArgument,
            Some(b) if b.refcount == 0 || b.owner.is_some() || b.lock_count > 0 => {
                return Status::InvalidArgument
            }
            Some(b) => b.owner = Some(port),
        }
        if let Some(p) = state.ports.get_mut(&port) {
            p.queued.push_back(buffer);
        }
        state.calls.push(EngineCall::SendBuffer { port, buffer });
        if state.auto_process {
            state.process_one(port);
        }
        Status::Success
    }

    fn create_pool(
        &self,
        port: PortHandle,
        count: u32,
        size: u32,
    ) -> Result<PoolHandle, Status> {
        let mut state = self.state.lock();
        fault!(state, "create_pool", Err);
        if !state.ports.contains_key(&port) || count == 0 {
            return Err(Status::InvalidArgument);
        }
        let bytes = count as usize * size as usize;
        if state.memory_used + bytes > state.memory_budget {
            return Err(Status::NoMemory);
        }
        let pool = PoolHandle(state.next_handle());
        let mut buffers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let handle = BufferHandle(state.next_handle());
            let mut storage = vec![0u8; size as usize].into_boxed_slice();
            let header = RawBufferHeader::new(storage.as_mut_ptr(), size);
            state.buffers.insert(
                handle,
                MockBuffer {
                    header,
                    storage,
                    pool,
                    refcount: 0,
                    lock_count: 0,
                    owner: None,
                    replicated_from: None,
                    held_by_hook: false,
                },
            );
            buffers.push(handle);
        }
        state.memory_used += bytes;
        state.pools.insert(
            pool,
            MockPool {
                port,
                free: buffers.iter().copied().collect(),
                buffers,
                buffer_size: size,
                pre_release: None,
            },
        );
        state.calls.push(EngineCall::CreatePool { port, count, size });
        Ok(pool)
    }

    fn destroy_pool(&self, pool: PoolHandle) -> Status {
        let mut state = self.state.lock();
        fault!(state, "destroy_pool");
        let Some(p) = state.pools.get(&pool) else {
            return Status::InvalidArgument;
        };
        let port = p.port;
        let port_busy = state.ports.get(&port).is_some_and(|mp| {
            mp.enabled && mp.queued.iter().any(|b| p.buffers.contains(b))
        });
        if port_busy {
            // Buffers in flight on an enabled port: the real engine blocks here.
            return Status::NotReady;
        }
        let Some(p) = state.pools.remove(&pool) else {
            return Status::InvalidArgument;
        };
        for b in &p.buffers {
            state.buffers.remove(b);
        }
        if let Some(mp) = state.ports.get_mut(&port) {
            mp.queued.retain(|b| !p.buffers.contains(b));
        }
        state.memory_used -= p.buffers.len() * p.buffer_size as usize;
        state.calls.push(EngineCall::DestroyPool(pool));
        Status::Success
    }

    fn pool_get(&self, pool: PoolHandle) -> Result<Option<BufferHandle>, Status> {
        let mut state = self.state.lock();
        fault!(state, "pool_get", Err);
        let p = state.pools.get_mut(&pool).ok_or(Status::InvalidArgument)?;
        let Some(buffer) = p.free.pop_front() else {
            return Ok(None);
        };
        if let Some(b) = state.buffers.get_mut(&buffer) {
            b.refcount = 1;
            b.header.reset();
        }
        Ok(Some(buffer))
    }

    fn pool_available(&self, pool: PoolHandle) -> usize {
        self.state
            .lock()
            .pools
            .get(&pool)
            .map(|p| p.free.len())
            .unwrap_or(0)
    }

    fn set_pre_release_hook(&self, pool: PoolHandle, hook: Option<PreReleaseHook>) -> Status {
        let mut state = self.state.lock();
        let Some(p) = state.pools.get_mut(&pool) else {
            return Status::InvalidArgument;
        };
        p.pre_release = hook;
        Status::Success
    }

    fn create_connection(
        &self,
        source: PortHandle,
        target: PortHandle,
    ) -> Result<ConnectionHandle, Status> {
        let mut state = self.state.lock();
        fault!(state, "create_connection", Err);
        let (Some(src), Some(dst)) = (state.ports.get(&source), state.ports.get(&target)) else {
            return Err(Status::InvalidArgument);
        };
        if src.kind != PortKind::Output || dst.kind != PortKind::Input {
            return Err(Status::InvalidArgument);
        }
        if src.connection.is_some() || dst.connection.is_some() {
            return Err(Status::AlreadyConnected);
        }
        if src.component == dst.component {
            return Err(Status::InvalidArgument);
        }
        let connection = ConnectionHandle(state.next_handle());
        state.connections.insert(
            connection,
            MockConnection {
                source,
                target,
                enabled: false,
            },
        );
        if let Some(p) = state.ports.get_mut(&source) {
            p.connection = Some(connection);
        }
        if let Some(p) = state.ports.get_mut(&target) {
            p.connection = Some(connection);
        }
        state
            .calls
            .push(EngineCall::CreateConnection { source, target });
        Ok(connection)
    }

    fn destroy_connection(&self, connection: ConnectionHandle) -> Status {
        let mut state = self.state.lock();
        fault!(state, "destroy_connection");
        match state.connections.get(&connection) {
            None => return Status::InvalidArgument,
            Some(c) if c.enabled => return Status::NotReady,
            Some(_) => {}
        }
        if let Some(c) = state.connections.remove(&connection) {
            for port in [c.source, c.target] {
                if let Some(p) = state.ports.get_mut(&port) {
                    p.connection = None;
                }
            }
        }
        state.calls.push(EngineCall::DestroyConnection(connection));
        Status::Success
    }

    fn enable_connection(&self, connection: ConnectionHandle) -> Status {
        let mut state = self.state.lock();
        fault!(state, "enable_connection");
        let Some(c) = state.connections.get(&connection) else {
            return Status::InvalidArgument;
        };
        if c.enabled {
            return Status::InvalidArgument;
        }
        let (source, target) = (c.source, c.target);
        state.set_port_enabled(target, true);
        state.set_port_enabled(source, true);
        if let Some(c) = state.connections.get_mut(&connection) {
            c.enabled = true;
        }
        state.calls.push(EngineCall::EnableConnection(connection));
        Status::Success
    }

    fn disable_connection(&self, connection: ConnectionHandle) -> Status {
        let mut state = self.state.lock();
        fault!(state, "disable_connection");
        let Some(c) = state.connections.get(&connection) else {
            return Status::InvalidArgument;
        };
        if !c.enabled {
            return Status::InvalidArgument;
        }
        let (source, target) = (c.source, c.target);
        let mut unowned = state.set_port_enabled(source, false);
        unowned.extend(state.set_port_enabled(target, false));
        for buffer in unowned {
            if let Ok(Some(_hook)) = state.release_ref(buffer) {
                state.return_to_pool(buffer);
            }
        }
        if let Some(c) = state.connections.get_mut(&connection) {
            c.enabled = false;
        }
        state.calls.push(EngineCall::DisableConnection(connection));
        Status::Success
    }

    fn connection_enabled(&self, connection: ConnectionHandle) -> bool {
        self.state
            .lock()
            .connections
            .get(&connection)
            .is_some_and(|c| c.enabled)
    }

    fn buffer_acquire(&self, buffer: BufferHandle) -> Status {
        let mut state = self.state.lock();
        fault!(state, "buffer_acquire");
        match state.buffers.get_mut(&buffer) {
            Some(b) if b.refcount > 0 => {
                b.refcount += 1;
                Status::Success
            }
            _ => Status::InvalidArgument,
        }
    }

    fn buffer_release(&self, buffer: BufferHandle) -> Status {
        let hook = {
            let mut state = self.state.lock();
            fault!(state, "buffer_release");
            match state.release_ref(buffer) {
                Ok(Some(hook)) => hook,
                Ok(None) => return Status::Success,
                Err(status) => return status,
            }
        };

        // Run the hook without holding the engine lock; it may call back in.
        let keep = hook(buffer);
        let mut state = self.state.lock();
        if keep {
            if let Some(b) = state.buffers.get_mut(&buffer) {
                b.held_by_hook = true;
            }
        } else {
            state.return_to_pool(buffer);
        }
        Status::Success
    }

    fn buffer_release_continue(&self, buffer: BufferHandle) -> Status {
        let mut state = self.state.lock();
        match state.buffers.get(&buffer) {
            Some(b) if b.held_by_hook && b.refcount == 0 => {
                state.return_to_pool(buffer);
                Status::Success
            }
            _ => Status::InvalidArgument,
        }
    }

    fn buffer_reset(&self, buffer: BufferHandle) -> Status {
        let mut state = self.state.lock();
        match state.buffers.get_mut(&buffer) {
            Some(b) => {
                b.header.reset();
                Status::Success
            }
            None => Status::InvalidArgument,
        }
    }

    fn lock_buffer(&self, buffer: BufferHandle) -> Status {
        let mut state = self.state.lock();
        fault!(state, "lock_buffer");
        match state.buffers.get_mut(&buffer) {
            Some(b) => {
                b.lock_count += 1;
                Status::Success
            }
            None => Status::InvalidArgument,
        }
    }

    fn unlock_buffer(&self, buffer: BufferHandle) -> Status {
        let mut state = self.state.lock();
        fault!(state, "unlock_buffer");
        match state.buffers.get_mut(&buffer) {
            Some(b) if b.lock_count > 0 => {
                b.lock_count -= 1;
                Status::Success
            }
            _ => Status::InvalidArgument,
        }
    }

    fn read_header(&self, buffer: BufferHandle) -> Result<BufferMetadata, Status> {
        let state = self.state.lock();
        let b = state.buffers.get(&buffer).ok_or(Status::InvalidArgument)?;
        if b.lock_count == 0 {
            return Err(Status::NotReady);
        }
        Ok(BufferMetadata::from_raw(&b.header))
    }

    fn write_header(&self, buffer: BufferHandle, metadata: BufferMetadata) -> Status {
        let mut state = self.state.lock();
        let Some(b) = state.buffers.get_mut(&buffer) else {
            return Status::InvalidArgument;
        };
        if b.lock_count == 0 {
            return Status::NotReady;
        }
        let mut check = metadata;
        check.alloc_size = b.header.alloc_size;
        if !check.is_consistent() {
            return Status::InvalidArgument;
        }
        metadata.apply_to(&mut b.header);
        Status::Success
    }

    fn read_payload(&self, buffer: BufferHandle) -> Result<Vec<u8>, Status> {
        let state = self.state.lock();
        let b = state.buffers.get(&buffer).ok_or(Status::InvalidArgument)?;
        if b.lock_count == 0 {
            return Err(Status::NotReady);
        }
        let start = b.header.offset as usize;
        let end = start + b.header.length as usize;
        let source = state.payload_source(buffer);
        let storage = &state
            .buffers
            .get(&source)
            .ok_or(Status::InvalidArgument)?
            .storage;
        storage
            .get(start..end)
            .map(|s| s.to_vec())
            .ok_or(Status::BadAddress)
    }

    fn write_payload(&self, buffer: BufferHandle, data: &[u8]) -> Status {
        let mut state = self.state.lock();
        let Some(b) = state.buffers.get_mut(&buffer) else {
            return Status::InvalidArgument;
        };
        if b.lock_count == 0 {
            return Status::NotReady;
        }
        if b.replicated_from.is_some() {
            // Replicas share read-only memory.
            return Status::InvalidArgument;
        }
        if data.len() > b.storage.len() {
            return Status::NoSpace;
        }
        b.storage[..data.len()].copy_from_slice(data);
        b.header.length = data.len() as u32;
        b.header.offset = 0;
        Status::Success
    }

    fn replicate_buffer(&self, dest: BufferHandle, source: BufferHandle) -> Status {
        let mut state = self.state.lock();
        fault!(state, "replicate_buffer");
        if dest == source {
            return Status::InvalidArgument;
        }
        let Some(src) = state.buffers.get(&source) else {
            return Status::InvalidArgument;
        };
        if src.refcount == 0 {
            return Status::InvalidArgument;
        }
        let metadata = BufferMetadata::from_raw(&src.header);
        let data = src.header.data;
        let root = src.replicated_from.unwrap_or(source);
        match state.buffers.get_mut(&dest) {
            Some(d) if d.refcount > 0 && d.replicated_from.is_none() => {
                metadata.apply_to(&mut d.header);
                d.header.data = data;
                d.replicated_from = Some(root);
            }
            _ => return Status::InvalidArgument,
        }
        if let Some(r) = state.buffers.get_mut(&root) {
            r.refcount += 1;
        }
        Status::Success
    }
}
