//! Runtime handle cache - write-once runtime slot, per-thread attachment
//!
//! The runtime's per-thread interface is only valid on the thread that
//! obtained it, so each thread attaches lazily on first use and keeps its
//! handle in thread-local storage until it exits.

use core::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};

use super::{RuntimeHandle, ThreadHandle};
use crate::error::{fatal, BridgeError, RuntimeError};
use crate::logging::{log_runtime_set, log_thread_attached, trace};

/// Process-wide default cache
static GLOBAL: Lazy<Arc<RuntimeHandleCache>> = Lazy::new(|| Arc::new(RuntimeHandleCache::new()));

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Attached thread handles of this thread, keyed by cache id
    static THREAD_HANDLES: RefCell<Vec<(u64, ThreadHandle)>> = const { RefCell::new(Vec::new()) };
}

/// Write-once runtime slot plus per-thread handle cache
pub struct RuntimeHandleCache {
    id: u64,
    runtime: OnceCell<RuntimeHandle>,
}

impl RuntimeHandleCache {
    pub fn new() -> Self {
        Self {
            id: NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed),
            runtime: OnceCell::new(),
        }
    }

    /// Cache used by the exported entry points
    pub fn global() -> &'static Arc<RuntimeHandleCache> {
        &GLOBAL
    }

    /// Record the runtime; fatal if a different one is already recorded
    pub fn set_runtime(&self, runtime: RuntimeHandle) {
        if let Err(err) = self.try_set_runtime(runtime) {
            fatal(err);
        }
    }

    /// Record the runtime. Identical handle again is a no-op.
    pub fn try_set_runtime(&self, runtime: RuntimeHandle) -> Result<(), BridgeError> {
        let raw = runtime.as_raw();
        let mut installed = false;
        let current = self.runtime.get_or_init(|| {
            installed = true;
            runtime
        });

        if installed {
            log_runtime_set(raw);
            return Ok(());
        }
        if current.as_raw() == raw {
            return Ok(());
        }
        Err(BridgeError::RuntimeConflict)
    }

    /// The recorded runtime, if any
    #[inline]
    pub fn runtime(&self) -> Option<RuntimeHandle> {
        self.runtime.get().cloned()
    }

    /// Calling thread's handle, attaching on first use; fatal on failure
    pub fn thread_handle(&self) -> ThreadHandle {
        match self.try_thread_handle() {
            Ok(handle) => handle,
            Err(err) => fatal(err),
        }
    }

    /// Calling thread's handle, attaching on first use
    pub fn try_thread_handle(&self) -> Result<ThreadHandle, RuntimeError> {
        if let Some(handle) = self.cached_handle() {
            return Ok(handle);
        }

        let runtime = self.runtime.get().ok_or(RuntimeError::NoRuntime)?;
        // Attach outside the borrow: the runtime may consult this cache
        let handle = runtime.attach_current_thread()?;
        log_thread_attached(self.id);

        THREAD_HANDLES.with(|handles| {
            handles.borrow_mut().push((self.id, handle.clone()));
        });
        Ok(handle)
    }

    /// Whether the calling thread already holds a handle from this cache
    pub fn has_thread_handle(&self) -> bool {
        self.cached_handle().is_some()
    }

    #[inline]
    fn cached_handle(&self) -> Option<ThreadHandle> {
        THREAD_HANDLES.with(|handles| {
            handles
                .borrow()
                .iter()
                .find(|(id, _)| *id == self.id)
                .map(|(_, handle)| handle.clone())
        })
    }
}

impl Default for RuntimeHandleCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RuntimeHandleCache {
    fn drop(&mut self) {
        // Only this thread's entry can be reached; others go at thread exit
        let id = self.id;
        let _ = THREAD_HANDLES.try_with(|handles| {
            if let Ok(mut handles) = handles.try_borrow_mut() {
                handles.retain(|(cache, _)| *cache != id);
            }
        });
        trace!(cache = id, "Runtime handle cache dropped");
    }
}
