//! Components: a native processing stage and the ports it owns.
//!
//! Ports are stored in one vector in slot order: control first, then
//! inputs, outputs, clocks and generic ports. A port's [`PortId`] slot is its
//! index in that vector.

use crate::engine::{ComponentHandle, MediaEngine};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::{ComponentId, PortId};
use crate::pipeline::port::{Port, PortKind};
use std::fmt::Write as _;
use std::ops::Range;
use std::sync::Arc;

pub struct Component {
    id: ComponentId,
    handle: ComponentHandle,
    name: String,
    engine: Arc<dyn MediaEngine>,
    ports: Vec<Port>,
    inputs: Range<usize>,
    outputs: Range<usize>,
    clocks: Range<usize>,
    generic: Range<usize>,
    /// References taken through `acquire_component` and not yet released.
    extra_refs: u32,
    disposed: bool,
}

impl Component {
    /// Create the native component `name` and build a port for every entry
    /// of its port table.
    pub fn create(
        engine: Arc<dyn MediaEngine>,
        id: ComponentId,
        name: &str,
    ) -> PipelineResult<Self> {
        let info = engine.create_component(name).map_err(|status| {
            tracing::warn!("Creating component '{}' failed: {}", name, status);
            PipelineError::NativeOperationFailed {
                operation: "create_component",
                status,
            }
        })?;

        let total =
            1 + info.inputs.len() + info.outputs.len() + info.clocks.len() + info.generic.len();
        if total > PortId::MAX_SLOTS {
            // Hand the reference back; nothing else owns it yet.
            engine.destroy_component(info.handle).check("destroy_component")?;
            return Err(PipelineError::InvalidGraphState(format!(
                "Component '{}' has {} ports, more than a PortId can address",
                name, total
            )));
        }
        let mut ports = Vec::with_capacity(total);
        let mut push = |kind: PortKind, handles: &[crate::engine::PortHandle]| {
            let start = ports.len();
            for (index, &handle) in handles.iter().enumerate() {
                let slot = ports.len() as u16;
                ports.push(Port::new(
                    engine.clone(),
                    PortId::new(id, slot),
                    kind,
                    index,
                    handle,
                    name,
                ));
            }
            start..ports.len()
        };
        push(PortKind::Control, &[info.control]);
        let inputs = push(PortKind::Input, &info.inputs);
        let outputs = push(PortKind::Output, &info.outputs);
        let clocks = push(PortKind::Clock, &info.clocks);
        let generic = push(PortKind::Generic, &info.generic);

        tracing::info!(
            "Created component '{}' ({}): {} in, {} out, {} clock, {} generic",
            name,
            info.handle,
            inputs.len(),
            outputs.len(),
            clocks.len(),
            generic.len()
        );

        Ok(Self {
            id,
            handle: info.handle,
            name: name.to_string(),
            engine,
            ports,
            inputs,
            outputs,
            clocks,
            generic,
            extra_refs: 0,
            disposed: false,
        })
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn handle(&self) -> ComponentHandle {
        self.handle
    }

    /// Name reported by the engine, falling back to the requested one.
    pub fn name(&self) -> String {
        self.engine
            .component_name(self.handle)
            .unwrap_or_else(|| self.name.clone())
    }

    pub fn is_enabled(&self) -> bool {
        !self.disposed && self.engine.component_enabled(self.handle)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    // ── Ports ──

    pub fn control(&self) -> &Port {
        &self.ports[0]
    }

    pub fn inputs(&self) -> &[Port] {
        &self.ports[self.inputs.clone()]
    }

    pub fn outputs(&self) -> &[Port] {
        &self.ports[self.outputs.clone()]
    }

    pub fn clocks(&self) -> &[Port] {
        &self.ports[self.clocks.clone()]
    }

    pub fn generic(&self) -> &[Port] {
        &self.ports[self.generic.clone()]
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn port(&self, id: PortId) -> Option<&Port> {
        if id.component() != self.id {
            return None;
        }
        self.ports.get(id.slot() as usize)
    }

    pub fn port_mut(&mut self, id: PortId) -> Option<&mut Port> {
        if id.component() != self.id {
            return None;
        }
        self.ports.get_mut(id.slot() as usize)
    }

    /// The `index`th port of `kind`.
    pub fn port_of(&self, kind: PortKind, index: usize) -> Option<&Port> {
        let slot = self.range(kind).nth(index)?;
        self.ports.get(slot)
    }

    pub fn port_of_mut(&mut self, kind: PortKind, index: usize) -> Option<&mut Port> {
        let slot = self.range(kind).nth(index)?;
        self.ports.get_mut(slot)
    }

    pub fn input_mut(&mut self, index: usize) -> Option<&mut Port> {
        self.port_of_mut(PortKind::Input, index)
    }

    pub fn output_mut(&mut self, index: usize) -> Option<&mut Port> {
        self.port_of_mut(PortKind::Output, index)
    }

    fn range(&self, kind: PortKind) -> Range<usize> {
        match kind {
            PortKind::Control => 0..1,
            PortKind::Input => self.inputs.clone(),
            PortKind::Output => self.outputs.clone(),
            PortKind::Clock => self.clocks.clone(),
            PortKind::Generic => self.generic.clone(),
        }
    }

    /// Output ports currently owning a connection.
    pub fn connected_outputs(&self) -> impl Iterator<Item = &Port> {
        self.outputs().iter().filter(|p| p.connection().is_some())
    }

    // ── Native state ──

    pub fn enable(&self) -> PipelineResult<()> {
        self.ensure_alive()?;
        if self.is_enabled() {
            return Ok(());
        }
        self.engine
            .enable_component(self.handle)
            .check("enable_component")?;
        tracing::debug!("Enabled component '{}'", self.name);
        Ok(())
    }

    /// Disable the component. A disabled component is left alone.
    pub fn disable(&self) -> PipelineResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.engine
            .disable_component(self.handle)
            .check("disable_component")?;
        tracing::debug!("Disabled component '{}'", self.name);
        Ok(())
    }

    /// Take an extra native reference for another owner.
    pub fn acquire_component(&mut self) -> PipelineResult<()> {
        self.ensure_alive()?;
        self.engine
            .acquire_component(self.handle)
            .check("acquire_component")?;
        self.extra_refs += 1;
        Ok(())
    }

    /// Drop a reference taken with [`acquire_component`](Self::acquire_component).
    ///
    /// The owning reference is only dropped by
    /// [`destroy_component`](Self::destroy_component), so a release with no
    /// matching acquire is refused.
    pub fn release_component(&mut self) -> PipelineResult<()> {
        self.ensure_alive()?;
        if self.extra_refs == 0 {
            return Err(PipelineError::InvalidGraphState(format!(
                "Component '{}' has no extra reference to release",
                self.name
            )));
        }
        self.engine
            .release_component(self.handle)
            .check("release_component")?;
        self.extra_refs -= 1;
        Ok(())
    }

    pub fn extra_refs(&self) -> u32 {
        self.extra_refs
    }

    /// Ask the engine to destroy the component. Refused while any port still
    /// owns a pool, since the engine would wait on those buffers forever.
    pub fn destroy_component(&mut self) -> PipelineResult<()> {
        self.ensure_alive()?;
        if let Some(port) = self.ports.iter().find(|p| p.has_pool()) {
            return Err(PipelineError::InvalidGraphState(format!(
                "{} still owns a pool",
                port.name()
            )));
        }
        if let Some(port) = self.ports.iter().find(|p| p.connection().is_some()) {
            return Err(PipelineError::InvalidGraphState(format!(
                "{} is still connected",
                port.name()
            )));
        }
        self.engine
            .destroy_component(self.handle)
            .check("destroy_component")?;
        self.disposed = true;
        tracing::info!("Destroyed component '{}' ({})", self.name, self.handle);
        Ok(())
    }

    /// Disable and destroy the pool of every input and output port.
    pub fn clean_port_pools(&mut self) -> PipelineResult<()> {
        let data_ports = self.inputs.start..self.outputs.end;
        for port in &mut self.ports[data_ports] {
            if port.has_pool() {
                port.destroy_port_pool()?;
            }
        }
        Ok(())
    }

    /// Tear the component down: connections it owns, pools, capture
    /// handlers, then disable and destroy. Safe to call again after a
    /// failure or after success.
    pub fn dispose(&mut self) -> PipelineResult<()> {
        if self.disposed {
            return Ok(());
        }
        tracing::debug!("Disposing component '{}'", self.name);

        for slot in self.outputs.clone() {
            if let Some(mut connection) = self.ports[slot].take_connection() {
                if let Err(e) = connection.destroy() {
                    self.ports[slot].attach_connection(connection);
                    return Err(e);
                }
            }
        }
        self.clean_port_pools()?;
        for port in &mut self.ports {
            port.dispose_handler()?;
        }
        self.disable()?;
        self.destroy_component()
    }

    /// Human-readable description of the component and its ports.
    pub fn print_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Component '{}' ({}) enabled={}",
            self.name(),
            self.handle,
            self.is_enabled()
        );
        for port in &self.ports[1..] {
            let format = port
                .format()
                .map(|f| format!("{} {}x{}", f.encoding, f.width, f.height))
                .unwrap_or_else(|e| format!("<{}>", e));
            let _ = write!(
                out,
                "  {:<28} {} enabled={}",
                port.name(),
                format,
                port.is_enabled()
            );
            if let Some(pool) = port.pool() {
                let _ = write!(
                    out,
                    " pool={}x{}",
                    pool.buffer_count(),
                    pool.buffer_size()
                );
            }
            if let Some(target) = port.connected_reference() {
                let _ = write!(out, " -> {:?}", target);
            }
            out.push('\n');
        }
        for line in out.lines() {
            tracing::info!("{}", line);
        }
        out
    }

    fn ensure_alive(&self) -> PipelineResult<()> {
        if self.disposed {
            return Err(PipelineError::InvalidGraphState(format!(
                "Component '{}' has been disposed",
                self.name
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("ports", &self.ports.len())
            .field("extra_refs", &self.extra_refs)
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl Drop for Component {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            tracing::warn!("Disposing component '{}' on drop failed: {}", self.name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineCall, MockEngine, MockMediaEngine, Status};

    fn engine() -> Arc<MockEngine> {
        let engine = Arc::new(MockEngine::new());
        engine.init();
        engine
    }

    #[test]
    fn test_camera_port_counts() {
        let engine = engine();
        let camera = Component::create(engine.clone(), ComponentId(0), "vc.ril.camera").unwrap();
        assert_eq!(camera.inputs().len(), 0);
        assert_eq!(camera.outputs().len(), 3);
        assert_eq!(camera.clocks().len(), 1);
        assert_eq!(camera.control().kind(), PortKind::Control);
        assert_eq!(camera.name(), "vc.ril.camera");
        assert_eq!(camera.outputs()[2].name(), "vc.ril.camera:out:2");
    }

    #[test]
    fn test_port_lookup_by_id() {
        let engine = engine();
        let splitter =
            Component::create(engine.clone(), ComponentId(4), "vc.ril.video_splitter").unwrap();
        let out3 = splitter.port_of(PortKind::Output, 3).unwrap();
        assert_eq!(out3.id().component(), ComponentId(4));
        assert_eq!(splitter.port(out3.id()).unwrap().handle(), out3.handle());
        assert!(splitter.port(PortId::new(ComponentId(5), 1)).is_none());
        assert!(splitter.port_of(PortKind::Output, 4).is_none());
    }

    #[test]
    fn test_unknown_name_fails() {
        let engine = engine();
        let err = Component::create(engine.clone(), ComponentId(0), "vc.ril.bogus").unwrap_err();
        assert_eq!(err.status(), Some(Status::NotFound));
    }

    #[test]
    fn test_dispose_order() {
        let engine = engine();
        let mut encoder =
            Component::create(engine.clone(), ComponentId(0), "vc.ril.video_encode").unwrap();
        encoder.enable().unwrap();
        let port = encoder.output_mut(0).unwrap();
        port.create_pool(2, 1024).unwrap();
        let (tx, _rx) = crossbeam_channel::unbounded();
        port.enable(Some(tx)).unwrap();
        let port_handle = port.handle();
        let pool_handle = port.pool().unwrap().handle();
        engine.clear_calls();

        encoder.dispose().unwrap();
        assert_eq!(
            engine.calls(),
            vec![
                EngineCall::DisablePort(port_handle),
                EngineCall::DestroyPool(pool_handle),
                EngineCall::DisableComponent(encoder.handle()),
                EngineCall::DestroyComponent(encoder.handle()),
            ]
        );
        assert!(encoder.is_disposed());
        assert_eq!(engine.live_components(), 0);
    }

    #[test]
    fn test_double_dispose() {
        let engine = engine();
        let mut camera = Component::create(engine.clone(), ComponentId(0), "vc.ril.camera").unwrap();
        camera.dispose().unwrap();
        engine.clear_calls();
        camera.dispose().unwrap();
        drop(camera);
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn test_dispose_retries_after_partial_failure() {
        let engine = engine();
        let mut encoder =
            Component::create(engine.clone(), ComponentId(0), "vc.ril.video_encode").unwrap();
        encoder.input_mut(0).unwrap().create_pool(1, 256).unwrap();

        engine.fail_next("destroy_pool", Status::Io);
        assert!(encoder.dispose().is_err());
        assert!(!encoder.is_disposed());

        encoder.dispose().unwrap();
        assert_eq!(engine.live_pools(), 0);
        assert_eq!(engine.live_components(), 0);
    }

    #[test]
    fn test_destroy_component_refused_with_pool() {
        let engine = engine();
        let mut sink = Component::create(engine.clone(), ComponentId(0), "vc.null_sink").unwrap();
        sink.input_mut(0).unwrap().create_pool(1, 64).unwrap();
        assert!(matches!(
            sink.destroy_component(),
            Err(PipelineError::InvalidGraphState(_))
        ));
        assert_eq!(engine.live_components(), 1);
    }

    #[test]
    fn test_destroy_component_with_extra_reference() {
        let engine = engine();
        let mut sink = Component::create(engine.clone(), ComponentId(0), "vc.null_sink").unwrap();
        sink.acquire_component().unwrap();
        let err = sink.destroy_component().unwrap_err();
        assert_eq!(err.status(), Some(Status::NotReady));

        sink.release_component().unwrap();
        assert_eq!(engine.component_refcount(sink.handle()), 1);
        sink.destroy_component().unwrap();
        assert!(matches!(
            sink.acquire_component(),
            Err(PipelineError::InvalidGraphState(_))
        ));
    }

    #[test]
    fn test_unbalanced_release_keeps_owning_reference() {
        let engine = engine();
        let mut sink = Component::create(engine.clone(), ComponentId(0), "vc.null_sink").unwrap();
        engine.clear_calls();

        assert!(matches!(
            sink.release_component(),
            Err(PipelineError::InvalidGraphState(_))
        ));
        assert!(engine.calls().is_empty());
        assert_eq!(engine.component_refcount(sink.handle()), 1);
        assert_eq!(engine.live_components(), 1);

        sink.acquire_component().unwrap();
        sink.release_component().unwrap();
        assert_eq!(sink.extra_refs(), 0);
        assert!(sink.release_component().is_err());

        sink.dispose().unwrap();
        assert!(sink.is_disposed());
        assert_eq!(engine.live_components(), 0);
    }

    #[test]
    fn test_print_summary_lists_ports() {
        let engine = engine();
        let mut encoder =
            Component::create(engine.clone(), ComponentId(0), "vc.ril.video_encode").unwrap();
        encoder.output_mut(0).unwrap().create_pool(1, 4096).unwrap();
        let summary = encoder.print_summary();
        assert!(summary.contains("vc.ril.video_encode:in:0"));
        assert!(summary.contains("vc.ril.video_encode:out:0 "));
        assert!(summary.contains("H264 640x480"));
        assert!(summary.contains("pool=1x4096"));
    }

    #[test]
    fn test_disable_failure_surfaces() {
        let mut mock = MockMediaEngine::new();
        mock.expect_create_component().returning(|_| {
            Ok(crate::engine::ComponentInfo {
                handle: ComponentHandle(1),
                control: crate::engine::PortHandle(2),
                inputs: vec![],
                outputs: vec![],
                clocks: vec![],
                generic: vec![],
            })
        });
        mock.expect_component_enabled().return_const(true);
        // Fails once; the retry from Drop succeeds.
        let mut disable_calls = 0;
        mock.expect_disable_component().returning(move |_| {
            disable_calls += 1;
            if disable_calls == 1 {
                Status::Io
            } else {
                Status::Success
            }
        });
        mock.expect_destroy_component().return_const(Status::Success);
        mock.expect_component_name().return_const(None);

        let mut component =
            Component::create(Arc::new(mock), ComponentId(0), "vc.ril.camera").unwrap();
        let err = component.dispose().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::NativeOperationFailed {
                operation: "disable_component",
                status: Status::Io
            }
        ));
        assert!(!component.is_disposed());
    }
}
