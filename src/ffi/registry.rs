//! Registry of native objects handed to the managed side
//!
//! The managed side only ever sees addresses. Objects it may destroy or
//! attach mirrors to are published here first, so an address coming back
//! across the boundary can be resolved without trusting it blindly.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::logging::trace;
use crate::mirror::Mirrored;
use crate::runtime::NativeHandle;

/// Process-wide registry (concurrent map, sharded locks)
static GLOBAL: Lazy<Arc<ObjectRegistry>> = Lazy::new(|| Arc::new(ObjectRegistry::new()));

pub struct ObjectRegistry {
    objects: DashMap<NativeHandle, Arc<dyn Mirrored>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self {
            objects: DashMap::with_capacity(128),
        }
    }

    pub fn global() -> &'static Arc<ObjectRegistry> {
        &GLOBAL
    }

    /// Make `object` reachable by address; returns that address
    pub fn publish<T: Mirrored + 'static>(&self, object: Arc<T>) -> NativeHandle {
        let handle = object.native_handle();
        trace!(native = handle.as_raw(), "Native object published");
        self.objects.insert(handle, object);
        handle
    }

    #[inline]
    pub fn get(&self, handle: NativeHandle) -> Option<Arc<dyn Mirrored>> {
        self.objects.get(&handle).map(|entry| entry.value().clone())
    }

    /// Stop tracking `handle`, returning the registry's share of the object
    #[inline]
    pub fn remove(&self, handle: NativeHandle) -> Option<Arc<dyn Mirrored>> {
        self.objects.remove(&handle).map(|(_, object)| object)
    }

    /// Stop tracking `handle` only when the registry holds the last share.
    ///
    /// `Ok(None)` for unknown handles. `Err` carries the number of shares
    /// native code still holds; the entry is left in place.
    pub fn remove_unshared(&self, handle: NativeHandle) -> Result<Option<Arc<dyn Mirrored>>, usize> {
        loop {
            if let Some((_, object)) = self
                .objects
                .remove_if(&handle, |_, object| Arc::strong_count(object) == 1)
            {
                return Ok(Some(object));
            }

            let shares = match self.objects.get(&handle) {
                Some(entry) => Arc::strong_count(entry.value()) - 1,
                None => return Ok(None),
            };
            // Last outside share went away in between
            if shares > 0 {
                return Err(shares);
            }
        }
    }

    #[inline]
    pub fn contains(&self, handle: NativeHandle) -> bool {
        self.objects.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}
