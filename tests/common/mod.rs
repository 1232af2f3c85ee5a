//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use vcgraph::engine::EngineCall;

/// Index of `call` in a recorded call log, failing the test if absent.
pub fn position_of(calls: &[EngineCall], call: &EngineCall) -> usize {
    calls
        .iter()
        .position(|c| c == call)
        .unwrap_or_else(|| panic!("{:?} not found in call log {:?}", call, calls))
}

/// Assert `first` was recorded strictly before `second`.
pub fn assert_called_before(calls: &[EngineCall], first: &EngineCall, second: &EngineCall) {
    let a = position_of(calls, first);
    let b = position_of(calls, second);
    assert!(
        a < b,
        "Expected {:?} (#{}) before {:?} (#{})",
        first,
        a,
        second,
        b
    );
}
