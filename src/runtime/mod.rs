//! Managed runtime abstraction and per-thread handle cache
//!
//! Design: the runtime is a pluggable capability.
//! 1. `ManagedRuntime` - process-wide view, knows how to attach threads
//! 2. `ThreadInterface` - per-thread interface, valid only on its thread
//! 3. `RuntimeHandleCache` - write-once runtime slot + lazily attached
//!    thread handles kept in thread-local storage

mod cache;

#[cfg(test)]
mod tests;

pub use cache::RuntimeHandleCache;

use core::fmt;
use core::num::NonZeroU64;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::RuntimeError;

/// Descriptor of the constructor every mirror class must provide:
/// one 64-bit argument carrying the native object's address.
pub const IDENTITY_CONSTRUCTOR_SIGNATURE: &str = "(J)V";

/// Opaque reference to a managed object (local, strong or weak)
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef(NonZeroU64);

impl ObjectRef {
    /// Wrap a raw reference value; zero is the null reference
    #[inline]
    pub const fn from_raw(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    #[inline]
    pub const fn as_raw(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:#x})", self.0)
    }
}

/// Opaque reference to a managed method
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodRef(NonZeroU64);

impl MethodRef {
    #[inline]
    pub const fn from_raw(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    #[inline]
    pub const fn as_raw(self) -> u64 {
        self.0.get()
    }
}

/// Identity of a native object on the managed side: its address
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(u64);

impl NativeHandle {
    /// Address of `object`, used as its cross-boundary identity
    #[inline]
    pub fn of<T: ?Sized>(object: &T) -> Self {
        Self(object as *const T as *const () as usize as u64)
    }

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeHandle({:#x})", self.0)
    }
}

/// Process-wide side of a managed runtime
pub trait ManagedRuntime: Send + Sync {
    /// Register the calling thread and return its interface.
    /// Safe to call redundantly; callers cache the result per thread.
    fn attach_current_thread(&self) -> Result<ThreadHandle, RuntimeError>;
}

/// Per-thread interface into the runtime
///
/// Local references returned from `find_class` and `new_object` belong to
/// the caller, who releases them with `delete_local_ref`.
pub trait ThreadInterface {
    /// The runtime this interface belongs to
    fn runtime(&self) -> RuntimeHandle;

    fn find_class(&self, name: &str) -> Result<ObjectRef, RuntimeError>;

    fn find_constructor(&self, class: ObjectRef, signature: &str) -> Result<MethodRef, RuntimeError>;

    /// Instantiate `class` through the identity constructor
    fn new_object(
        &self,
        class: ObjectRef,
        constructor: MethodRef,
        identity: NativeHandle,
    ) -> Result<ObjectRef, RuntimeError>;

    fn delete_local_ref(&self, object: ObjectRef);

    /// Keep-alive reference; `None` if `object` is no longer reachable
    fn new_strong_ref(&self, object: ObjectRef) -> Option<ObjectRef>;

    fn delete_strong_ref(&self, object: ObjectRef);

    /// Non-owning reference; `None` if `object` is no longer reachable
    fn new_weak_ref(&self, object: ObjectRef) -> Option<ObjectRef>;

    fn delete_weak_ref(&self, object: ObjectRef);

    /// Identity comparison; `None` is the null reference. A weak reference
    /// whose target was collected compares equal to `None`.
    fn is_same_object(&self, a: Option<ObjectRef>, b: Option<ObjectRef>) -> bool;

    /// Tell `mirror` its native peer is being destroyed by native code
    fn notify_native_dropped(&self, mirror: ObjectRef);

    /// Managed byte buffer viewing `capacity` native bytes at `address`.
    /// The memory is not copied and stays owned by native code.
    fn new_direct_buffer(&self, address: u64, capacity: usize) -> Result<ObjectRef, RuntimeError>;

    /// Native address behind a direct buffer; `None` for other objects
    fn direct_buffer_address(&self, buffer: ObjectRef) -> Option<u64>;

    fn direct_buffer_capacity(&self, buffer: ObjectRef) -> Option<usize>;
}

/// Shared handle to the process-wide runtime
#[derive(Clone)]
pub struct RuntimeHandle(Arc<dyn ManagedRuntime>);

impl RuntimeHandle {
    pub fn new(runtime: Arc<dyn ManagedRuntime>) -> Self {
        Self(runtime)
    }

    /// Address of the runtime instance, as handed across the boundary
    #[inline]
    pub fn as_raw(&self) -> u64 {
        Arc::as_ptr(&self.0) as *const () as usize as u64
    }

    #[inline]
    pub fn attach_current_thread(&self) -> Result<ThreadHandle, RuntimeError> {
        self.0.attach_current_thread()
    }
}

impl PartialEq for RuntimeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.as_raw() == other.as_raw()
    }
}

impl Eq for RuntimeHandle {}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuntimeHandle({:#x})", self.as_raw())
    }
}

impl<R: ManagedRuntime + 'static> From<Arc<R>> for RuntimeHandle {
    fn from(runtime: Arc<R>) -> Self {
        Self(runtime)
    }
}

/// Per-thread interface handle. Not `Send`: it never leaves its thread.
#[derive(Clone)]
pub struct ThreadHandle(Rc<dyn ThreadInterface>);

impl ThreadHandle {
    pub fn new(interface: Rc<dyn ThreadInterface>) -> Self {
        Self(interface)
    }

    /// Same underlying interface (no re-attachment happened in between)
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        core::ptr::eq(
            Rc::as_ptr(&self.0) as *const (),
            Rc::as_ptr(&other.0) as *const (),
        )
    }
}

impl core::ops::Deref for ThreadHandle {
    type Target = dyn ThreadInterface;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ThreadHandle({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}
