//! Identity types for the pipeline graph.
//!
//! IDs are newtypes over `u32` that serve as direct indices into the
//! pipeline's component arena, providing O(1) lookup without the
//! component → port → connection → component reference cycle.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Index into `Pipeline::components`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ComponentId(pub u32);

impl ComponentId {
    pub const INVALID: ComponentId = ComponentId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The id for arena slot `index`, if a [`PortId`] can still address it.
    pub fn from_index(index: usize) -> Option<Self> {
        (index < PortId::MAX_COMPONENTS).then_some(ComponentId(index as u32))
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "ComponentId(INVALID)")
        } else {
            write!(f, "ComponentId({})", self.0)
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Compact port identifier. High 20 bits = component index, low 12 bits =
/// port slot within the component (see [`Component::port`]).
///
/// [`Component::port`]: crate::pipeline::Component::port
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortId(pub u32);

impl PortId {
    const PORT_BITS: u32 = 12;
    const PORT_MASK: u32 = (1 << Self::PORT_BITS) - 1;

    /// Components addressable in one pipeline.
    pub const MAX_COMPONENTS: usize = 1 << (32 - Self::PORT_BITS);
    /// Ports addressable on one component.
    pub const MAX_SLOTS: usize = 1 << Self::PORT_BITS;

    pub fn new(component: ComponentId, slot: u16) -> Self {
        debug_assert!(slot < (1 << Self::PORT_BITS) as u16);
        Self((component.0 << Self::PORT_BITS) | (slot as u32 & Self::PORT_MASK))
    }

    #[inline]
    pub fn component(self) -> ComponentId {
        ComponentId(self.0 >> Self::PORT_BITS)
    }

    #[inline]
    pub fn slot(self) -> u16 {
        (self.0 & Self::PORT_MASK) as u16
    }
}

impl fmt::Debug for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PortId(component={}, slot={})",
            self.component().0,
            self.slot()
        )
    }
}

static NEXT_PORT_UID: AtomicU64 = AtomicU64::new(1);

/// Process-unique port identifier, assigned when a port is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortUid(pub u64);

impl PortUid {
    pub fn next() -> Self {
        Self(NEXT_PORT_UID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PortUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
