//! C FFI - entry points for the managed side
//!
//! Design: thin exported functions over safe Rust entry points:
//! 1. Library init (logging, configuration)
//! 2. Mirror lifecycle (destroy, attach existing mirror, runtime handle)
//! 3. Direct buffers (address of a buffer, buffer over native memory)
//! 4. Raw memory accessors (unchecked, caller-validated addresses)
//!
//! Handles cross the boundary as 64-bit integers; zero is null. `env`
//! arguments point to the caller's `ThreadHandle`; null means the handle
//! this thread holds through the process-wide cache. Violations abort
//! instead of unwinding into the caller.

mod memory;
mod registry;
mod surface;


pub use memory::*;
pub use registry::ObjectRegistry;
pub use surface::CallSurface;

use core::ffi::c_void;

use crate::config::BridgeConfig;
use crate::error::fatal_abort;
use crate::logging::{self, info, warn};
use crate::runtime::{NativeHandle, ObjectRef, ThreadHandle};

/// Run `f` with the caller's interface, or this thread's cached one when
/// `env` is null. `None` when no interface can be obtained.
///
/// # Safety
/// `env` must be null or point to a live `ThreadHandle` of this thread
unsafe fn with_env<R>(env: *const c_void, f: impl FnOnce(&ThreadHandle) -> R) -> Option<R> {
    if let Some(env) = (env as *const ThreadHandle).as_ref() {
        return Some(f(env));
    }
    match CallSurface::global().cache().try_thread_handle() {
        Ok(env) => Some(f(&env)),
        Err(err) => {
            warn!(%err, "No thread interface for entry point");
            None
        }
    }
}

/// Initialize logging and process defaults from the environment
#[no_mangle]
pub extern "C" fn mirror_bridge_init() {
    let config = BridgeConfig::from_env();
    logging::init_with_config(config.log_config());
    config.apply();
    info!(lock_policy = %config.lock_policy, "Mirror bridge initialized");
}

/// Destroy a published native object; the managed side is responsible
#[no_mangle]
pub extern "C" fn mirror_bridge_destroy(handle: u64) {
    if let Err(err) = CallSurface::global().try_destroy(NativeHandle::from_raw(handle)) {
        fatal_abort(err);
    }
}

/// Attach `object` as the mirror of the published native object `handle`
#[no_mangle]
pub extern "C" fn mirror_bridge_attach_existing(handle: u64, object: u64, managed_responsible: bool) {
    let attached = CallSurface::global().try_attach_existing(
        NativeHandle::from_raw(handle),
        ObjectRef::from_raw(object),
        managed_responsible,
    );
    if let Err(err) = attached {
        fatal_abort(err);
    }
}

/// Address of the recorded runtime. When none is recorded yet it is taken
/// from `env`. Zero if neither is available.
///
/// # Safety
/// `env` must be null or point to a live `ThreadHandle` of this thread
#[no_mangle]
pub unsafe extern "C" fn mirror_bridge_runtime_handle(env: *const c_void) -> u64 {
    match with_env(env, |env| CallSurface::global().try_runtime_handle(env)) {
        Some(Ok(runtime)) => runtime.as_raw(),
        Some(Err(err)) => fatal_abort(err),
        None => 0,
    }
}

/// Native address behind a direct buffer, zero for other objects
///
/// # Safety
/// `env` must be null or point to a live `ThreadHandle` of this thread
#[no_mangle]
pub unsafe extern "C" fn mirror_bridge_buffer_address(env: *const c_void, buffer: u64) -> u64 {
    let Some(buffer) = ObjectRef::from_raw(buffer) else {
        return 0;
    };
    with_env(env, |env| CallSurface::global().buffer_address(env, buffer))
        .flatten()
        .unwrap_or(0)
}

/// Managed buffer over `length` bytes at `address` (local reference), zero
/// on failure
///
/// # Safety
/// `env` must be null or point to a live `ThreadHandle` of this thread;
/// the memory must outlive the buffer
#[no_mangle]
pub unsafe extern "C" fn mirror_bridge_wrap_buffer(env: *const c_void, address: u64, length: i32) -> u64 {
    let Ok(length) = usize::try_from(length) else {
        warn!(length, "Negative buffer length");
        return 0;
    };
    let wrapped = with_env(env, |env| CallSurface::global().wrap_buffer(env, address, length));
    match wrapped {
        Some(Ok(buffer)) => buffer.as_raw(),
        Some(Err(err)) => {
            warn!(%err, address, "Buffer creation failed");
            0
        }
        None => 0,
    }
}
