//! Opaque handles to native engine objects.
//!
//! Handles are plain newtypes over `u32`. They never expose the address of
//! the native object; the engine resolves them internally. A handle that no
//! longer refers to a live object is rejected by the engine with
//! [`Status::InvalidArgument`](super::Status::InvalidArgument).

use std::fmt;

macro_rules! native_handle {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub const INVALID: $name = $name(u32::MAX);

            #[inline]
            pub fn is_valid(self) -> bool {
                self != Self::INVALID
            }

            #[inline]
            pub fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if *self == Self::INVALID {
                    write!(f, concat!($label, "(INVALID)"))
                } else {
                    write!(f, concat!($label, "({})"), self.0)
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }
    };
}

native_handle!(
    /// Native component object.
    ComponentHandle,
    "Component"
);
native_handle!(
    /// Native port object, owned by a component.
    PortHandle,
    "Port"
);
native_handle!(
    /// Native buffer pool.
    PoolHandle,
    "Pool"
);
native_handle!(
    /// Native buffer header.
    BufferHandle,
    "Buffer"
);
native_handle!(
    /// Native connection between an output and an input port.
    ConnectionHandle,
    "Connection"
);
