//! The pipeline registry: an arena of components and the connections
//! between their ports.
//!
//! Components are addressed by [`ComponentId`] (their arena index) and ports
//! by [`PortId`]. Connections are owned by their upstream output port and
//! point downstream by id, so cascades walk the arena instead of following
//! owning references.
//!
//! # Cascades
//!
//! [`Pipeline::enable_connections`] and [`Pipeline::disable_connections`]
//! recurse to the bottom of the graph before touching an edge: for
//! `A -> B -> C`, C's input port is toggled before B's, and B's before the
//! `A -> B` connection. [`Pipeline::connect`] refuses edges that would close
//! a cycle, so the recursion always terminates.
//!
//! # Callback dispatch
//!
//! Every port enabled through the pipeline posts returned buffers to one
//! channel. [`Pipeline::dispatch_pending`] drains it on the calling thread.

use crate::config::{DispatchSettings, PoolSettings};
use crate::engine::{BufferEvent, MediaEngine, PortHandle};
use crate::pipeline::buffer::Buffer;
use crate::pipeline::component::Component;
use crate::pipeline::connection::Connection;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::handler::CaptureHandler;
use crate::pipeline::id::{ComponentId, PortId};
use crate::pipeline::port::{Port, PortKind};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::sync::Arc;

pub struct Pipeline {
    engine: Arc<dyn MediaEngine>,
    components: Vec<Option<Component>>,
    aliases: HashMap<String, ComponentId>,
    /// Routes engine callbacks back to the port that was handed the buffer.
    port_index: HashMap<PortHandle, PortId>,
    events_tx: Sender<BufferEvent>,
    events_rx: Receiver<BufferEvent>,
    pool_settings: PoolSettings,
    dispatch: DispatchSettings,
    shut_down: bool,
}

impl Pipeline {
    /// Initialise the engine and create an empty pipeline with default
    /// settings.
    pub fn new(engine: Arc<dyn MediaEngine>) -> PipelineResult<Self> {
        Self::with_settings(engine, PoolSettings::default(), DispatchSettings::default())
    }

    pub fn with_settings(
        engine: Arc<dyn MediaEngine>,
        pool_settings: PoolSettings,
        dispatch: DispatchSettings,
    ) -> PipelineResult<Self> {
        engine.init().check("init")?;
        let (events_tx, events_rx) = if dispatch.queue_capacity == 0 {
            crossbeam_channel::unbounded()
        } else {
            crossbeam_channel::bounded(dispatch.queue_capacity)
        };
        tracing::info!("Pipeline initialised");
        Ok(Self {
            engine,
            components: Vec::new(),
            aliases: HashMap::new(),
            port_index: HashMap::new(),
            events_tx,
            events_rx,
            pool_settings,
            dispatch,
            shut_down: false,
        })
    }

    pub fn engine(&self) -> &Arc<dyn MediaEngine> {
        &self.engine
    }

    // ── Components ──

    /// Create the engine component `name`. A failure leaves nothing behind.
    pub fn create_component(&mut self, name: &str) -> PipelineResult<ComponentId> {
        self.ensure_running()?;
        let id = ComponentId::from_index(self.components.len()).ok_or_else(|| {
            PipelineError::InvalidGraphState(format!(
                "Pipeline already holds {} components",
                PortId::MAX_COMPONENTS
            ))
        })?;
        let component = Component::create(self.engine.clone(), id, name)?;
        for port in component.ports() {
            self.port_index.insert(port.handle(), port.id());
        }
        self.components.push(Some(component));
        Ok(id)
    }

    /// Create a component reachable by `alias` through [`Pipeline::lookup`].
    pub fn create_named(&mut self, alias: &str, name: &str) -> PipelineResult<ComponentId> {
        if self.aliases.contains_key(alias) {
            return Err(PipelineError::InvalidGraphState(format!(
                "Alias '{}' is already in use",
                alias
            )));
        }
        let id = self.create_component(name)?;
        self.aliases.insert(alias.to_string(), id);
        Ok(id)
    }

    pub fn lookup(&self, alias: &str) -> Option<ComponentId> {
        self.aliases.get(alias).copied()
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(id.index()).and_then(|c| c.as_ref())
    }

    pub fn component_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.components.get_mut(id.index()).and_then(|c| c.as_mut())
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.iter().flatten()
    }

    /// Port `index` of `kind` on `component`.
    pub fn port_id(&self, component: ComponentId, kind: PortKind, index: usize) -> Option<PortId> {
        self.component(component)?
            .port_of(kind, index)
            .map(|p| p.id())
    }

    pub fn port(&self, id: PortId) -> Option<&Port> {
        self.component(id.component())?.port(id)
    }

    pub fn port_mut(&mut self, id: PortId) -> Option<&mut Port> {
        self.component_mut(id.component())?.port_mut(id)
    }

    fn require_component(&self, id: ComponentId) -> PipelineResult<&Component> {
        self.component(id)
            .ok_or_else(|| PipelineError::InvalidGraphState(format!("No component {}", id)))
    }

    fn require_port(&self, id: PortId) -> PipelineResult<&Port> {
        self.port(id)
            .ok_or_else(|| PipelineError::InvalidGraphState(format!("No port {:?}", id)))
    }

    fn require_port_mut(&mut self, id: PortId) -> PipelineResult<&mut Port> {
        self.port_mut(id)
            .ok_or_else(|| PipelineError::InvalidGraphState(format!("No port {:?}", id)))
    }

    /// Components no connection points into.
    pub fn heads(&self) -> Vec<ComponentId> {
        self.components()
            .filter(|c| c.inputs().iter().all(|p| p.upstream().is_none()))
            .map(|c| c.id())
            .collect()
    }

    /// Components fed by `id`'s output connections.
    pub fn downstream_of(&self, id: ComponentId) -> Vec<ComponentId> {
        self.component(id)
            .map(|c| {
                c.connected_outputs()
                    .filter_map(|p| p.connection().map(|conn| conn.downstream()))
                    .collect()
            })
            .unwrap_or_default()
    }

    // ── Graph edits ──

    /// Connect output port `source` to input port `target`.
    pub fn connect(&mut self, source: PortId, target: PortId) -> PipelineResult<()> {
        self.ensure_running()?;
        let source_port = self.require_port(source)?;
        let target_port = self.require_port(target)?;

        if let Some(existing) = source_port.connected_reference() {
            return Err(PipelineError::InvalidGraphState(format!(
                "{} is already connected to {:?}",
                source_port.name(),
                existing
            )));
        }
        if let Some(existing) = target_port.upstream() {
            return Err(PipelineError::InvalidGraphState(format!(
                "{} is already fed by {:?}",
                target_port.name(),
                existing
            )));
        }
        if self.would_create_cycle(source.component(), target.component()) {
            tracing::warn!(
                "Refusing {} -> {}: cycle",
                source_port.name(),
                target_port.name()
            );
            return Err(PipelineError::CycleDetected);
        }

        let connection = Connection::create(self.engine.clone(), source_port, target_port)?;
        self.require_port_mut(source)?.attach_connection(connection);
        self.require_port_mut(target)?.set_upstream(Some(source));
        Ok(())
    }

    /// Disable (downstream first) and destroy the connection leaving
    /// `source`. Without a connection this does nothing.
    pub fn disconnect(&mut self, source: PortId) -> PipelineResult<()> {
        let Some(target) = self.require_port(source)?.connected_reference() else {
            return Ok(());
        };
        self.disable_connections(target.component())?;
        self.disable_edge(source)?;

        let port = self.require_port_mut(source)?;
        if let Some(mut connection) = port.take_connection() {
            if let Err(e) = connection.destroy() {
                port.attach_connection(connection);
                return Err(e);
            }
        }
        if let Some(port) = self.port_mut(target) {
            port.set_upstream(None);
        }
        tracing::info!("Disconnected {:?} -> {:?}", source, target);
        Ok(())
    }

    /// Whether adding `from -> to` would close a cycle, i.e. `to` already
    /// reaches `from`.
    fn would_create_cycle(&self, from: ComponentId, to: ComponentId) -> bool {
        let mut visited = vec![false; self.components.len()];
        let mut stack = vec![to];

        while let Some(current) = stack.pop() {
            if current == from {
                return true;
            }
            let idx = current.index();
            if idx >= visited.len() || visited[idx] {
                continue;
            }
            visited[idx] = true;
            stack.extend(self.downstream_of(current));
        }
        false
    }

    // ── Cascades ──

    /// Enable every connection reachable from `id`, bottom of the graph
    /// first.
    pub fn enable_connections(&self, id: ComponentId) -> PipelineResult<()> {
        let component = self.require_component(id)?;
        for output in component.connected_outputs() {
            let Some(connection) = output.connection() else {
                continue;
            };
            self.enable_connections(connection.downstream())?;
            let target = self.require_port(connection.target())?;
            connection.enable(target)?;
            tracing::debug!("Cascade enabled {} -> {}", output.name(), target.name());
        }
        Ok(())
    }

    /// Disable every connection reachable from `id`, bottom of the graph
    /// first.
    pub fn disable_connections(&self, id: ComponentId) -> PipelineResult<()> {
        let component = self.require_component(id)?;
        for output in component.connected_outputs() {
            self.disable_edge(output.id())?;
        }
        Ok(())
    }

    fn disable_edge(&self, source: PortId) -> PipelineResult<()> {
        let output = self.require_port(source)?;
        let Some(connection) = output.connection() else {
            return Ok(());
        };
        self.disable_connections(connection.downstream())?;
        let target = self.require_port(connection.target())?;
        connection.disable(target)?;
        tracing::debug!("Cascade disabled {} -> {}", output.name(), target.name());
        Ok(())
    }

    /// Enable every component, then cascade-enable from each head.
    pub fn start(&self) -> PipelineResult<()> {
        for component in self.components() {
            component.enable()?;
        }
        for head in self.heads() {
            self.enable_connections(head)?;
        }
        Ok(())
    }

    // ── Buffer circulation ──

    /// Enable `port` with the pipeline's callback channel.
    pub fn enable_port(&self, port: PortId) -> PipelineResult<()> {
        self.require_port(port)?
            .enable(Some(self.events_tx.clone()))
    }

    /// Create a pool on `port` sized by the pipeline's pool settings.
    pub fn create_port_pool(&mut self, port: PortId) -> PipelineResult<()> {
        let settings = self.pool_settings;
        let (count, _) = self.require_port(port)?.default_pool_shape(&settings)?;
        self.check_queue_capacity(count)?;
        self.require_port_mut(port)?.create_default_pool(&settings)?;
        Ok(())
    }

    /// Buffers held by every pool in the pipeline.
    pub fn pooled_buffers(&self) -> u32 {
        self.components()
            .flat_map(|c| c.ports())
            .filter_map(|p| p.pool())
            .map(|pool| pool.buffer_count())
            .sum()
    }

    /// Refuse pools that could post more buffers than a bounded callback
    /// queue holds; the engine would stall on the controlling thread.
    fn check_queue_capacity(&self, extra: u32) -> PipelineResult<()> {
        let capacity = self.dispatch.queue_capacity;
        if capacity == 0 {
            return Ok(());
        }
        let total = self.pooled_buffers() as usize + extra as usize;
        if total > capacity {
            return Err(PipelineError::InvalidGraphState(format!(
                "{} pooled buffers exceed the callback queue capacity of {}",
                total, capacity
            )));
        }
        Ok(())
    }

    /// Give `port` a pool if it has none, enable it, (for outputs) hand the
    /// engine every free buffer and attach `handler`. The handler is only
    /// attached once all of that succeeded.
    pub fn start_capture(
        &mut self,
        port: PortId,
        handler: Box<dyn CaptureHandler>,
    ) -> PipelineResult<()> {
        self.ensure_running()?;
        let settings = self.pool_settings;
        let callback = self.events_tx.clone();
        let existing = self.require_port(port)?;
        if !existing.kind().carries_data() {
            return Err(PipelineError::InvalidGraphState(format!(
                "{} cannot be captured",
                existing.name()
            )));
        }
        if existing.has_handler() {
            return Err(PipelineError::InvalidGraphState(format!(
                "{} is already being captured",
                existing.name()
            )));
        }
        if !existing.has_pool() {
            let (count, _) = existing.default_pool_shape(&settings)?;
            self.check_queue_capacity(count)?;
        }

        let port = self.require_port_mut(port)?;
        let created = !port.has_pool();
        if created {
            port.create_default_pool(&settings)?;
        }
        if let Err(e) = port.enable(Some(callback)) {
            if created {
                if let Err(cleanup) = port.destroy_port_pool() {
                    tracing::warn!("Dropping pool of {} failed: {}", port.name(), cleanup);
                }
            }
            return Err(e);
        }
        if port.kind() == PortKind::Output {
            let sent = port.prime()?;
            tracing::info!("Capturing from {} ({} buffers primed)", port.name(), sent);
        }
        port.set_handler(handler);
        Ok(())
    }

    /// Handle buffers the engine has returned, waiting up to the configured
    /// poll timeout for the first one. Returns how many were handled.
    ///
    /// Each buffer is locked, handed to its port's capture handler, unlocked
    /// and released. An output port that is still enabled and has not seen
    /// end of stream gets a fresh buffer back.
    pub fn dispatch_pending(&mut self) -> PipelineResult<usize> {
        let first = match self.events_rx.recv_timeout(self.dispatch.poll_timeout()) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => return Ok(0),
            Err(RecvTimeoutError::Disconnected) => return Err(PipelineError::ChannelRecv),
        };

        let mut handled = 0;
        let mut next = Some(first);
        while let Some(event) = next {
            self.handle_event(event)?;
            handled += 1;
            if handled >= self.dispatch.max_events_per_poll {
                break;
            }
            next = self.events_rx.try_recv().ok();
        }
        tracing::trace!("Dispatched {} buffer events", handled);
        Ok(handled)
    }

    fn handle_event(&mut self, event: BufferEvent) -> PipelineResult<()> {
        let buffer = Buffer::adopt(self.engine.clone(), event.buffer);
        let Some(&port_id) = self.port_index.get(&event.port) else {
            tracing::warn!("Buffer {} returned by unknown {}", event.buffer, event.port);
            return buffer.release();
        };
        let Some(port) = self.port_mut(port_id) else {
            return buffer.release();
        };

        let eos = port.deliver(&buffer)?;
        buffer.release()?;

        if port.kind() == PortKind::Output && port.is_enabled() && !eos && port.has_pool() {
            let fresh = port.acquire_buffer()?;
            port.send_buffer(fresh)?;
        }
        Ok(())
    }

    /// Whether every port with a capture handler has seen end of stream.
    pub fn all_captures_finished(&self) -> bool {
        let mut captures = self
            .components()
            .flat_map(|c| c.ports())
            .filter(|p| p.has_handler())
            .peekable();
        captures.peek().is_some() && captures.all(|p| p.eos_seen())
    }

    /// Release every buffer waiting in the callback queue without handing it
    /// to a handler.
    fn drain_events(&self) -> usize {
        let mut drained = 0;
        for event in self.events_rx.try_iter() {
            if let Err(e) = Buffer::adopt(self.engine.clone(), event.buffer).release() {
                tracing::warn!("Releasing {} during drain failed: {}", event.buffer, e);
            }
            drained += 1;
        }
        drained
    }

    // ── Teardown ──

    /// Disable every cascade, destroy every connection, dispose every
    /// component and de-initialise the engine. Calling it again after
    /// success does nothing; after a failure it resumes where it stopped.
    pub fn shutdown(&mut self) -> PipelineResult<()> {
        if self.shut_down {
            return Ok(());
        }
        tracing::info!("Shutting down pipeline");

        for head in self.heads() {
            self.disable_connections(head)?;
        }

        // Stop every port so in-flight buffers come back, then return them.
        for port in self.components().flat_map(|c| c.ports()) {
            if port.kind().carries_data() {
                port.disable()?;
            }
        }
        let drained = self.drain_events();
        if drained > 0 {
            tracing::debug!("Returned {} in-flight buffers", drained);
        }

        for slot in self.components.iter_mut().flatten() {
            for index in 0..slot.outputs().len() {
                let Some(port) = slot.output_mut(index) else {
                    continue;
                };
                if let Some(mut connection) = port.take_connection() {
                    let target = connection.target();
                    if let Err(e) = connection.destroy() {
                        port.attach_connection(connection);
                        return Err(e);
                    }
                    tracing::debug!("Destroyed connection to {:?}", target);
                }
            }
        }
        for component in self.components.iter_mut().flatten() {
            for index in 0..component.inputs().len() {
                if let Some(port) = component.input_mut(index) {
                    port.set_upstream(None);
                }
            }
        }

        for component in self.components.iter_mut().rev().flatten() {
            component.dispose()?;
        }
        self.components.clear();
        self.aliases.clear();
        self.port_index.clear();

        self.engine.deinit().check("deinit")?;
        self.shut_down = true;
        tracing::info!("Pipeline shut down");
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    fn ensure_running(&self) -> PipelineResult<()> {
        if self.shut_down {
            return Err(PipelineError::InvalidGraphState(
                "Pipeline has been shut down".to_string(),
            ));
        }
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!("Pipeline shutdown on drop failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineCall, MockEngine, MockMediaEngine, Status};
    use crate::pipeline::handler::InMemoryHandler;

    fn pipeline() -> (Arc<MockEngine>, Pipeline) {
        let engine = Arc::new(MockEngine::new());
        let pipeline = Pipeline::new(engine.clone()).unwrap();
        (engine, pipeline)
    }

    fn output(p: &Pipeline, c: ComponentId, i: usize) -> PortId {
        p.port_id(c, PortKind::Output, i).unwrap()
    }

    fn input(p: &Pipeline, c: ComponentId, i: usize) -> PortId {
        p.port_id(c, PortKind::Input, i).unwrap()
    }

    #[test]
    fn test_new_initialises_engine() {
        let (engine, mut pipeline) = pipeline();
        assert!(engine.is_initialized());
        pipeline.shutdown().unwrap();
        assert!(!engine.is_initialized());
    }

    #[test]
    fn test_cycle_is_rejected() {
        let (_engine, mut p) = pipeline();
        let a = p.create_component("vc.ril.resize").unwrap();
        let b = p.create_component("vc.ril.resize").unwrap();
        let c = p.create_component("vc.ril.resize").unwrap();
        p.connect(output(&p, a, 0), input(&p, b, 0)).unwrap();
        p.connect(output(&p, b, 0), input(&p, c, 0)).unwrap();

        let result = p.connect(output(&p, c, 0), input(&p, a, 0));
        assert!(matches!(result, Err(PipelineError::CycleDetected)));
        assert!(p.port(output(&p, c, 0)).unwrap().connection().is_none());
    }

    #[test]
    fn test_self_loop_is_rejected() {
        let (_engine, mut p) = pipeline();
        let a = p.create_component("vc.ril.resize").unwrap();
        let result = p.connect(output(&p, a, 0), input(&p, a, 0));
        assert!(matches!(result, Err(PipelineError::CycleDetected)));
    }

    #[test]
    fn test_double_connect_is_rejected() {
        let (_engine, mut p) = pipeline();
        let cam = p.create_component("vc.ril.camera").unwrap();
        let enc = p.create_component("vc.ril.video_encode").unwrap();
        p.connect(output(&p, cam, 1), input(&p, enc, 0)).unwrap();

        let again = p.connect(output(&p, cam, 1), input(&p, enc, 0));
        assert!(matches!(again, Err(PipelineError::InvalidGraphState(_))));
        let second_feed = p.connect(output(&p, cam, 2), input(&p, enc, 0));
        assert!(matches!(second_feed, Err(PipelineError::InvalidGraphState(_))));
    }

    #[test]
    fn test_heads_and_downstream() {
        let (_engine, mut p) = pipeline();
        let cam = p.create_named("camera", "vc.ril.camera").unwrap();
        let split = p.create_named("split", "vc.ril.video_splitter").unwrap();
        let sink = p.create_named("sink", "vc.null_sink").unwrap();
        p.connect(output(&p, cam, 0), input(&p, split, 0)).unwrap();
        p.connect(output(&p, split, 2), input(&p, sink, 0)).unwrap();

        assert_eq!(p.heads(), vec![cam]);
        assert_eq!(p.downstream_of(cam), vec![split]);
        assert_eq!(p.lookup("sink"), Some(sink));
        assert!(matches!(
            p.create_named("sink", "vc.null_sink"),
            Err(PipelineError::InvalidGraphState(_))
        ));
    }

    #[test]
    fn test_fan_out_cascade_enables_each_edge_once() {
        let (engine, mut p) = pipeline();
        let src = p.create_component("vc.ril.video_splitter").unwrap();
        let left = p.create_component("vc.ril.resize").unwrap();
        let right = p.create_component("vc.ril.resize").unwrap();
        let tail = p.create_component("vc.ril.video_encode").unwrap();
        let tail_sink = p.create_component("vc.null_sink").unwrap();
        p.connect(output(&p, src, 0), input(&p, left, 0)).unwrap();
        p.connect(output(&p, src, 1), input(&p, right, 0)).unwrap();
        p.connect(output(&p, left, 0), input(&p, tail, 0)).unwrap();
        p.connect(output(&p, tail, 0), input(&p, tail_sink, 0)).unwrap();
        assert_eq!(p.downstream_of(src), vec![left, right]);

        engine.clear_calls();
        p.enable_connections(src).unwrap();
        p.enable_connections(src).unwrap();
        let enables = engine
            .calls()
            .into_iter()
            .filter(|c| matches!(c, EngineCall::EnableConnection(_)))
            .count();
        assert_eq!(enables, 4);

        p.disable_connections(src).unwrap();
        p.disable_connections(src).unwrap();
        let disables = engine
            .calls()
            .into_iter()
            .filter(|c| matches!(c, EngineCall::DisableConnection(_)))
            .count();
        assert_eq!(disables, 4);
    }

    #[test]
    fn test_disconnect_clears_references() {
        let (engine, mut p) = pipeline();
        let cam = p.create_component("vc.ril.camera").unwrap();
        let sink = p.create_component("vc.null_sink").unwrap();
        let out = output(&p, cam, 0);
        let inp = input(&p, sink, 0);
        p.connect(out, inp).unwrap();
        p.enable_connections(cam).unwrap();

        p.disconnect(out).unwrap();
        assert!(p.port(out).unwrap().connected_reference().is_none());
        assert!(p.port(inp).unwrap().upstream().is_none());
        assert!(!p.port(inp).unwrap().is_enabled());
        assert_eq!(engine.live_connections(), 0);
        p.disconnect(out).unwrap();

        // The freed ports can be linked again.
        p.connect(out, inp).unwrap();
    }

    #[test]
    fn test_capture_and_dispatch() {
        let engine = Arc::new(MockEngine::new().with_fill_length(100).with_eos_after(5));
        let mut p = Pipeline::with_settings(
            engine.clone(),
            PoolSettings {
                buffer_count: Some(2),
                buffer_size: Some(256),
            },
            DispatchSettings {
                poll_timeout_ms: 10,
                ..DispatchSettings::default()
            },
        )
        .unwrap();
        let enc = p.create_component("vc.ril.video_encode").unwrap();
        let out = output(&p, enc, 0);
        let handler = InMemoryHandler::new();
        let stats = handler.stats();
        p.start_capture(out, Box::new(handler)).unwrap();

        let mut polls = 0;
        while !p.all_captures_finished() && polls < 20 {
            p.dispatch_pending().unwrap();
            polls += 1;
        }
        assert!(p.all_captures_finished());
        let stats = stats.lock().clone();
        assert!(stats.end_of_stream);
        assert!(stats.frames >= 5);
        assert_eq!(stats.bytes, stats.frames * 100);
        assert_eq!(stats.keyframes, 1);

        p.shutdown().unwrap();
        assert_eq!(engine.live_pools(), 0);
        assert_eq!(engine.live_components(), 0);
    }

    #[test]
    fn test_dispatch_times_out_when_idle() {
        let (_engine, mut p) = pipeline();
        p.dispatch = DispatchSettings {
            poll_timeout_ms: 1,
            ..DispatchSettings::default()
        };
        assert_eq!(p.dispatch_pending().unwrap(), 0);
    }

    #[test]
    fn test_shutdown_is_idempotent_and_terminal() {
        let (engine, mut p) = pipeline();
        let cam = p.create_component("vc.ril.camera").unwrap();
        let sink = p.create_component("vc.null_sink").unwrap();
        p.connect(output(&p, cam, 0), input(&p, sink, 0)).unwrap();
        p.start().unwrap();

        p.shutdown().unwrap();
        p.shutdown().unwrap();
        assert!(p.is_shut_down());
        assert_eq!(engine.live_connections(), 0);
        assert!(matches!(
            p.create_component("vc.null_sink"),
            Err(PipelineError::InvalidGraphState(_))
        ));
    }

    #[test]
    fn test_init_failure_surfaces() {
        let mut mock = MockMediaEngine::new();
        mock.expect_init().return_const(Status::NoSuchDevice);
        let err = Pipeline::new(Arc::new(mock)).err().unwrap();
        assert_eq!(err.status(), Some(Status::NoSuchDevice));
    }

    #[test]
    fn test_create_failure_leaves_nothing() {
        let (engine, mut p) = pipeline();
        engine.fail_next("create_component", Status::NoMemory);
        assert!(p.create_component("vc.ril.camera").is_err());
        assert_eq!(p.components().count(), 0);
        assert_eq!(engine.live_components(), 0);
    }
}
