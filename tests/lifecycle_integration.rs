//! Integration tests for component lifecycle and teardown
//!
//! These tests validate:
//! - Port discovery for engine components
//! - Idempotent dispose, pool destroy and shutdown
//! - Every native resource released after shutdown
//! - Generic ports and the per-component port limit

mod common;

use common::builders::{input, output, ChainBuilder};
use common::mock_helpers::initialised_engine;
use std::sync::Arc;
use vcgraph::engine::{EngineCall, FourCc, MockComponentSpec, MockEngine, PortFormat, Status};
use vcgraph::pipeline::{
    Component, ComponentId, InMemoryHandler, Pipeline, PipelineError, PortId, PortKind,
};

#[test]
fn test_camera_port_discovery() {
    let engine = initialised_engine();
    let camera = Component::create(engine.clone(), ComponentId(0), "vc.ril.camera").unwrap();

    assert_eq!(camera.inputs().len(), 0);
    assert_eq!(camera.outputs().len(), 3);
    assert_eq!(camera.clocks().len(), 1);
    assert_eq!(camera.control().kind(), PortKind::Control);
    assert_eq!(camera.name(), "vc.ril.camera");
    for (i, port) in camera.outputs().iter().enumerate() {
        assert_eq!(port.kind(), PortKind::Output);
        assert_eq!(port.index(), i);
    }
}

#[test]
fn test_unknown_component_fails() {
    let mut pipeline = Pipeline::new(Arc::new(MockEngine::new())).unwrap();
    let err = pipeline.create_component("vc.ril.nothing").unwrap_err();
    assert_eq!(err.status(), Some(Status::NotFound));
}

#[test]
fn test_dispose_twice() {
    let engine = initialised_engine();
    let mut component = Component::create(engine.clone(), ComponentId(0), "vc.ril.camera").unwrap();
    component.enable().unwrap();

    component.dispose().unwrap();
    assert!(component.is_disposed());
    assert_eq!(engine.live_components(), 0);

    engine.clear_calls();
    component.dispose().unwrap();
    assert!(engine.calls().is_empty());
}

#[test]
fn test_destroy_port_pool_twice() {
    let engine = initialised_engine();
    let mut component = Component::create(engine.clone(), ComponentId(0), "vc.null_sink").unwrap();
    let port = component.input_mut(0).unwrap();
    port.create_pool(2, 1024).unwrap();
    assert_eq!(engine.live_pools(), 1);

    port.destroy_port_pool().unwrap();
    port.destroy_port_pool().unwrap();
    assert!(!port.has_pool());
    assert_eq!(engine.live_pools(), 0);
}

#[test]
fn test_destroy_component_refuses_with_pools() {
    let engine = initialised_engine();
    let mut component = Component::create(engine.clone(), ComponentId(0), "vc.null_sink").unwrap();
    component.input_mut(0).unwrap().create_pool(2, 1024).unwrap();

    let err = component.destroy_component().unwrap_err();
    assert!(matches!(err, PipelineError::InvalidGraphState(_)));

    component.clean_port_pools().unwrap();
    component.destroy_component().unwrap();
    assert_eq!(engine.live_components(), 0);
}

#[test]
fn test_shutdown_releases_everything() {
    let mut chain = ChainBuilder::new()
        .component("vc.ril.camera")
        .component("vc.ril.video_encode")
        .build();
    let encoder_out = output(&chain.pipeline, chain.ids[1], 0);

    chain.pipeline.start().unwrap();
    chain
        .pipeline
        .start_capture(encoder_out, Box::new(InMemoryHandler::new()))
        .unwrap();
    chain.pipeline.dispatch_pending().unwrap();

    chain.pipeline.shutdown().unwrap();

    assert_eq!(chain.engine.live_components(), 0);
    assert_eq!(chain.engine.live_pools(), 0);
    assert_eq!(chain.engine.live_connections(), 0);
    assert_eq!(chain.engine.memory_used(), 0);
    assert!(!chain.engine.is_initialized());
    assert_eq!(chain.engine.calls().last(), Some(&EngineCall::Deinit));

    chain.engine.clear_calls();
    chain.pipeline.shutdown().unwrap();
    assert!(chain.engine.calls().is_empty());
}

#[test]
fn test_shutdown_resumes_after_failure() {
    let mut chain = ChainBuilder::new()
        .component("vc.ril.camera")
        .component("vc.null_sink")
        .build();
    chain.pipeline.start().unwrap();

    chain.engine.fail_next("destroy_component", Status::Io);
    assert!(chain.pipeline.shutdown().is_err());
    assert!(!chain.pipeline.is_shut_down());

    chain.pipeline.shutdown().unwrap();
    assert_eq!(chain.engine.live_components(), 0);
    assert_eq!(chain.engine.live_connections(), 0);
}

#[test]
fn test_operations_after_shutdown_fail() {
    let mut chain = ChainBuilder::new()
        .component("vc.ril.camera")
        .component("vc.null_sink")
        .build();
    let a_out = output(&chain.pipeline, chain.ids[0], 1);
    let b_in = input(&chain.pipeline, chain.ids[1], 0);
    chain.pipeline.shutdown().unwrap();

    assert!(chain.pipeline.create_component("vc.null_sink").is_err());
    assert!(chain.pipeline.connect(a_out, b_in).is_err());
}

#[test]
fn test_acquire_release_component_refcount() {
    let engine = initialised_engine();
    let mut component =
        Component::create(engine.clone(), ComponentId(0), "vc.ril.resize").unwrap();
    let handle = component.handle();

    component.acquire_component().unwrap();
    assert_eq!(engine.component_refcount(handle), 2);
    component.release_component().unwrap();
    assert_eq!(engine.component_refcount(handle), 1);
    drop(component);
    assert_eq!(engine.live_components(), 0);
}

#[test]
fn test_unbalanced_release_does_not_block_shutdown() {
    let mut chain = ChainBuilder::new()
        .component("vc.ril.camera")
        .component("vc.null_sink")
        .build();
    let sink = chain.ids[1];
    let handle = chain.pipeline.component(sink).unwrap().handle();

    let component = chain.pipeline.component_mut(sink).unwrap();
    assert!(matches!(
        component.release_component(),
        Err(PipelineError::InvalidGraphState(_))
    ));
    assert_eq!(chain.engine.component_refcount(handle), 1);

    chain.pipeline.shutdown().unwrap();
    assert!(chain.pipeline.is_shut_down());
    assert_eq!(chain.engine.live_components(), 0);
    assert!(!chain.engine.is_initialized());
    assert_eq!(chain.engine.calls().last(), Some(&EngineCall::Deinit));
}

#[test]
fn test_generic_ports_are_discovered() {
    let engine = MockEngine::new().with_component(
        "vc.ril.bridge",
        MockComponentSpec::new(1, 1, 0)
            .with_generic(2)
            .with_input_format(PortFormat::video(FourCc::JPEG, 320, 240)),
    );
    let mut pipeline = Pipeline::new(Arc::new(engine)).unwrap();
    let id = pipeline.create_component("vc.ril.bridge").unwrap();

    let bridge = pipeline.component(id).unwrap();
    assert_eq!(bridge.generic().len(), 2);
    for (i, port) in bridge.generic().iter().enumerate() {
        assert_eq!(port.kind(), PortKind::Generic);
        assert_eq!(port.index(), i);
        assert!(!port.kind().carries_data());
    }
    assert_eq!(bridge.inputs()[0].format().unwrap().encoding, FourCc::JPEG);

    // Slots run control, inputs, outputs, clocks, generic.
    let generic = pipeline.port_id(id, PortKind::Generic, 1).unwrap();
    assert_eq!(generic.slot(), 4);
    assert!(matches!(
        pipeline.start_capture(generic, Box::new(InMemoryHandler::new())),
        Err(PipelineError::InvalidGraphState(_))
    ));
}

#[test]
fn test_component_with_too_many_ports_is_refused() {
    let spec = MockComponentSpec::new(0, 0, 0).with_generic(PortId::MAX_SLOTS as u32);
    let engine = Arc::new(MockEngine::new().with_component("vc.ril.wide", spec));
    let mut pipeline = Pipeline::new(engine.clone()).unwrap();

    assert!(matches!(
        pipeline.create_component("vc.ril.wide"),
        Err(PipelineError::InvalidGraphState(_))
    ));
    assert_eq!(engine.live_components(), 0);
    assert_eq!(pipeline.components().count(), 0);
    assert!(pipeline.create_component("vc.null_sink").is_ok());
}
