//! Mirror slot - the managed reference embedded in every mirrored object

use std::sync::Arc;

use super::lock::CreationLock;
use super::{LockPolicy, MirrorState, Owner};
use crate::error::MirrorError;
use crate::logging::{debug, log_mirror_attached, log_mirror_created, warn};
use crate::reference::{ManagedReference, RefMode};
use crate::runtime::{
    NativeHandle, ObjectRef, RuntimeHandleCache, ThreadHandle, IDENTITY_CONSTRUCTOR_SIGNATURE,
};

/// Holds the optional mirror of one native object
///
/// Reads are lock-free. Creation and attachment run under the creation
/// lock and re-check the slot after acquiring it, so at most one mirror is
/// ever constructed per slot.
pub struct MirrorSlot {
    reference: ManagedReference,
    lock: CreationLock,
}

impl MirrorSlot {
    /// Empty slot using the process-default lock policy
    pub fn new(cache: Arc<RuntimeHandleCache>) -> Self {
        Self::with_policy(cache, LockPolicy::process_default())
    }

    pub fn with_policy(cache: Arc<RuntimeHandleCache>, policy: LockPolicy) -> Self {
        Self {
            reference: ManagedReference::new(cache),
            lock: CreationLock::new(policy),
        }
    }

    /// Current mirror, if one is attached and still reachable
    #[inline]
    pub fn get(&self) -> Option<ObjectRef> {
        self.reference.get()
    }

    pub fn state(&self) -> MirrorState {
        if self.get().is_some() {
            MirrorState::MirrorPresent
        } else {
            MirrorState::NoMirror
        }
    }

    /// Mode of the held reference: strong when native code is responsible
    pub fn owner(&self) -> Option<Owner> {
        self.reference.mode().map(|mode| match mode {
            RefMode::Strong => Owner::Native,
            RefMode::Weak => Owner::Managed,
        })
    }

    pub fn lock_policy(&self) -> LockPolicy {
        self.lock.policy()
    }

    /// Current mirror, creating it on first access.
    ///
    /// A slot only ever creates one mirror: once a managed-owned mirror has
    /// been collected this fails with `MirrorError::Collected`.
    pub fn get_or_create(
        &self,
        identity: NativeHandle,
        class_name: Option<&str>,
    ) -> Result<ObjectRef, MirrorError> {
        if let Some(mirror) = self.get() {
            return Ok(mirror);
        }
        self.create(identity, class_name)
    }

    #[cold]
    fn create(&self, identity: NativeHandle, class_name: Option<&str>) -> Result<ObjectRef, MirrorError> {
        let _guard = self.lock.lock();
        // Another thread may have finished while we waited
        if let Some(mirror) = self.get() {
            return Ok(mirror);
        }
        // A collected managed-owned mirror is never replaced
        if !self.reference.is_empty() {
            warn!(native = identity.as_raw(), "Mirror requested after managed owner collected it");
            return Err(MirrorError::Collected);
        }

        let env = self.reference.cache().try_thread_handle()?;
        let class_name = class_name.ok_or(MirrorError::NoClassName)?;
        let local = instantiate(&env, class_name, identity)?;

        self.reference.set(Some(local), RefMode::Strong);
        env.delete_local_ref(local);

        let mirror = self
            .reference
            .raw()
            .ok_or_else(|| MirrorError::InstantiationFailed(class_name.to_string()))?;
        log_mirror_created(identity.as_raw(), class_name, mirror.as_raw());
        Ok(mirror)
    }

    /// Attach a mirror supplied from outside.
    ///
    /// Re-attaching the same mirror is a no-op and `None` detaches. A
    /// different mirror while one is attached is rejected.
    pub fn attach(
        &self,
        identity: NativeHandle,
        object: Option<ObjectRef>,
        owner: Owner,
    ) -> Result<(), MirrorError> {
        let _guard = self.lock.lock();

        let current = self.get();
        if current.is_none() && object.is_none() && self.reference.is_empty() {
            return Ok(());
        }

        let env = self.reference.cache().try_thread_handle()?;
        if current.is_some() && env.is_same_object(current, object) {
            return Ok(());
        }
        if current.is_some() && object.is_some() {
            warn!(native = identity.as_raw(), "Rejected attempt to replace mirror");
            return Err(MirrorError::AlreadyAttached);
        }

        let mode = match owner {
            Owner::Native => RefMode::Strong,
            Owner::Managed => RefMode::Weak,
        };
        self.reference.set(object, mode);
        log_mirror_attached(
            identity.as_raw(),
            object.map(ObjectRef::as_raw),
            owner == Owner::Native,
        );
        Ok(())
    }

    /// Drop the mirror reference without notifying the mirror.
    /// Used when the managed side itself requested destruction.
    pub fn clear_for_destroy(&self) {
        let _guard = self.lock.lock();
        self.reference.clear();
    }
}

/// Look up `class_name`, find its identity constructor and instantiate it.
/// Returns a local reference owned by the caller.
fn instantiate(
    env: &ThreadHandle,
    class_name: &str,
    identity: NativeHandle,
) -> Result<ObjectRef, MirrorError> {
    let class = env.find_class(class_name)?;

    let result = env
        .find_constructor(class, IDENTITY_CONSTRUCTOR_SIGNATURE)
        .and_then(|ctor| env.new_object(class, ctor, identity));
    env.delete_local_ref(class);

    result.map_err(MirrorError::from)
}

impl Drop for MirrorSlot {
    fn drop(&mut self) {
        if self.reference.is_empty() {
            return;
        }
        if let Some(mirror) = self.reference.get() {
            debug!(mirror = mirror.as_raw(), "Notifying mirror of native drop");
            self.reference.cache().thread_handle().notify_native_dropped(mirror);
        }
        // `reference` releases itself with the matching mode
    }
}

impl core::fmt::Debug for MirrorSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MirrorSlot")
            .field("reference", &self.reference)
            .field("lock", &self.lock.policy())
            .finish()
    }
}
