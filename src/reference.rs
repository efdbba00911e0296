//! Managed object reference - owns zero or one reference to a managed object
//!
//! Design: strong references keep the target alive, weak references only
//! observe it. Release always matches the acquisition mode; the runtime
//! keeps the two reference classes in separate tables.
//!
//! The held reference lives in atomics so readers never lock. Writers
//! (`set`, `clear`) must be serialized by the owner.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::logging::{log_reference_acquired, log_reference_released};
use crate::runtime::{ObjectRef, RuntimeHandleCache};

/// How a reference holds its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefMode {
    /// Keep-alive: the target cannot be collected while held
    Strong,
    /// Observing: the target may be collected at any time
    Weak,
}

impl RefMode {
    #[inline]
    fn from_strong(strong: bool) -> Self {
        if strong {
            Self::Strong
        } else {
            Self::Weak
        }
    }
}

pub struct ManagedReference {
    object: AtomicU64,
    strong: AtomicBool,
    cache: Arc<RuntimeHandleCache>,
}

impl ManagedReference {
    /// Empty reference; runtime calls go through `cache`
    pub fn new(cache: Arc<RuntimeHandleCache>) -> Self {
        Self {
            object: AtomicU64::new(0),
            strong: AtomicBool::new(false),
            cache,
        }
    }

    /// Release the current reference, then hold `object` in `mode`.
    /// `None` just clears.
    pub fn set(&self, object: Option<ObjectRef>, mode: RefMode) {
        self.clear();

        let Some(object) = object else {
            return;
        };

        let env = self.cache.thread_handle();
        let acquired = match mode {
            RefMode::Strong => env.new_strong_ref(object),
            RefMode::Weak => env.new_weak_ref(object),
        };

        if let Some(held) = acquired {
            self.strong.store(mode == RefMode::Strong, Ordering::Relaxed);
            self.object.store(held.as_raw(), Ordering::Release);
            log_reference_acquired(held.as_raw(), mode == RefMode::Strong);
        }
    }

    /// Held object; `None` when empty or when a weak target was collected
    pub fn get(&self) -> Option<ObjectRef> {
        let held = self.raw()?;
        if self.strong.load(Ordering::Relaxed) {
            return Some(held);
        }

        let env = self.cache.thread_handle();
        if env.is_same_object(Some(held), None) {
            None
        } else {
            Some(held)
        }
    }

    /// Held reference value without checking weak liveness
    #[inline]
    pub fn raw(&self) -> Option<ObjectRef> {
        ObjectRef::from_raw(self.object.load(Ordering::Acquire))
    }

    /// Mode of the held reference, `None` when empty
    pub fn mode(&self) -> Option<RefMode> {
        self.raw()
            .map(|_| RefMode::from_strong(self.strong.load(Ordering::Relaxed)))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw().is_none()
    }

    /// Release whatever is held
    pub fn clear(&self) {
        let Some(held) = ObjectRef::from_raw(self.object.swap(0, Ordering::AcqRel)) else {
            return;
        };

        let strong = self.strong.load(Ordering::Relaxed);
        let env = self.cache.thread_handle();
        if strong {
            env.delete_strong_ref(held);
        } else {
            env.delete_weak_ref(held);
        }
        log_reference_released(held.as_raw(), strong);
    }

    /// Cache this reference talks to the runtime through
    #[inline]
    pub fn cache(&self) -> &Arc<RuntimeHandleCache> {
        &self.cache
    }
}

impl Drop for ManagedReference {
    fn drop(&mut self) {
        self.clear();
    }
}

impl core::fmt::Debug for ManagedReference {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ManagedReference")
            .field("object", &self.raw())
            .field("mode", &self.mode())
            .finish()
    }
}
