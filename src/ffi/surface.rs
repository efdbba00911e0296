//! Entry points invoked by the managed side

use std::sync::Arc;

use once_cell::sync::Lazy;

use super::ObjectRegistry;
use crate::error::{fatal, BridgeError, MirrorError, RuntimeError};
use crate::logging::{log_native_destroyed, warn};
use crate::mirror::Owner;
use crate::runtime::{NativeHandle, ObjectRef, RuntimeHandle, RuntimeHandleCache, ThreadHandle};

static GLOBAL: Lazy<CallSurface> = Lazy::new(|| {
    CallSurface::new(
        RuntimeHandleCache::global().clone(),
        ObjectRegistry::global().clone(),
    )
});

/// Cache and registry the managed side talks to
pub struct CallSurface {
    cache: Arc<RuntimeHandleCache>,
    registry: Arc<ObjectRegistry>,
}

impl CallSurface {
    pub fn new(cache: Arc<RuntimeHandleCache>, registry: Arc<ObjectRegistry>) -> Self {
        Self { cache, registry }
    }

    /// Surface over the process-wide cache and registry
    pub fn global() -> &'static CallSurface {
        &GLOBAL
    }

    pub fn cache(&self) -> &Arc<RuntimeHandleCache> {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<ObjectRegistry> {
        &self.registry
    }

    /// Destroy a published native object on behalf of the managed side;
    /// fatal if native code still shares it
    pub fn destroy(&self, handle: NativeHandle) -> bool {
        match self.try_destroy(handle) {
            Ok(destroyed) => destroyed,
            Err(err) => fatal(err),
        }
    }

    /// Destroy a published native object on behalf of the managed side.
    ///
    /// The registry must hold the only share, so the destructor runs here
    /// and exactly once. The mirror reference is cleared first, without
    /// notifying the mirror, so its teardown does not run a second time.
    /// Returns false for unknown handles.
    pub fn try_destroy(&self, handle: NativeHandle) -> Result<bool, BridgeError> {
        let object = match self.registry.remove_unshared(handle) {
            Ok(Some(object)) => object,
            Ok(None) => {
                warn!(native = handle.as_raw(), "Destroy requested for unknown native object");
                return Ok(false);
            }
            Err(shares) => {
                return Err(BridgeError::NativeShared {
                    native: handle.as_raw(),
                    shares,
                })
            }
        };

        object.mirror_slot().clear_for_destroy();
        drop(object);
        log_native_destroyed(handle.as_raw());
        Ok(true)
    }

    /// Attach a mirror the managed side constructed itself; fatal if a
    /// different mirror is already attached
    pub fn attach_existing(
        &self,
        handle: NativeHandle,
        object: Option<ObjectRef>,
        managed_responsible: bool,
    ) -> bool {
        match self.try_attach_existing(handle, object, managed_responsible) {
            Ok(attached) => attached,
            Err(err) => fatal(err),
        }
    }

    /// Attach a mirror the managed side constructed itself.
    ///
    /// `managed_responsible` leaves the native side holding only a weak
    /// reference. Returns false for unknown handles.
    pub fn try_attach_existing(
        &self,
        handle: NativeHandle,
        object: Option<ObjectRef>,
        managed_responsible: bool,
    ) -> Result<bool, MirrorError> {
        let Some(native) = self.registry.get(handle) else {
            warn!(native = handle.as_raw(), "Attach requested for unknown native object");
            return Ok(false);
        };

        let owner = if managed_responsible {
            Owner::Managed
        } else {
            Owner::Native
        };
        native.try_set_mirror(object, owner)?;
        Ok(true)
    }

    /// The recorded runtime, taken from the caller's interface if unset
    pub fn runtime_handle(&self, env: &ThreadHandle) -> RuntimeHandle {
        match self.try_runtime_handle(env) {
            Ok(runtime) => runtime,
            Err(err) => fatal(err),
        }
    }

    pub fn try_runtime_handle(&self, env: &ThreadHandle) -> Result<RuntimeHandle, BridgeError> {
        if let Some(runtime) = self.cache.runtime() {
            return Ok(runtime);
        }
        let runtime = env.runtime();
        self.cache.try_set_runtime(runtime.clone())?;
        Ok(runtime)
    }

    /// Native address behind a direct buffer, `None` for any other object
    pub fn buffer_address(&self, env: &ThreadHandle, buffer: ObjectRef) -> Option<u64> {
        env.direct_buffer_address(buffer)
    }

    /// Managed buffer over `length` native bytes at `address`, without
    /// copying. The returned local reference belongs to the caller.
    pub fn wrap_buffer(
        &self,
        env: &ThreadHandle,
        address: u64,
        length: usize,
    ) -> Result<ObjectRef, RuntimeError> {
        env.new_direct_buffer(address, length)
    }
}
