//! Mirror Bridge - object lifetime bridge to a managed runtime
//!
//! Native objects can acquire a mirror object inside a garbage-collected
//! managed runtime. This crate decides which side owns each pair, creates
//! the mirror at most once per object, and caches the runtime's per-thread
//! interface for threads native code did not create.

pub mod config;
pub mod error;
pub mod ffi;
pub mod heap;
pub mod logging;
pub mod mirror;
pub mod reference;
pub mod runtime;

// Re-export core types
pub use config::BridgeConfig;
pub use error::{BridgeError, MirrorError, RuntimeError};
pub use ffi::{CallSurface, ObjectRegistry};
pub use heap::{ClassDef, ManagedHeap};
pub use mirror::{LockPolicy, MirrorSlot, MirrorState, Mirrored, Owner};
pub use reference::{ManagedReference, RefMode};
pub use runtime::{
    ManagedRuntime, MethodRef, NativeHandle, ObjectRef, RuntimeHandle, RuntimeHandleCache,
    ThreadHandle, ThreadInterface, IDENTITY_CONSTRUCTOR_SIGNATURE,
};
