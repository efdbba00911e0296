//! Native object mirrors - lazily created managed-side counterparts
//!
//! Design: every mirrored native type embeds a `MirrorSlot` and implements
//! `Mirrored`. The slot goes from `NoMirror` to `MirrorPresent` exactly once,
//! either by creating the mirror from the native side (`mirror()`) or by
//! having the managed side attach its own (`set_mirror()`).
//!
//! Ownership follows who is responsible for the pair:
//! - `Owner::Native`: the slot holds a strong reference and releases it when
//!   the native object drops
//! - `Owner::Managed`: the slot only observes the mirror; the managed side
//!   destroys the native object through the call surface

mod lock;
mod slot;

#[cfg(test)]
mod tests;

pub use lock::LockPolicy;
pub use slot::MirrorSlot;

use crate::error::{fatal, MirrorError};
use crate::runtime::{NativeHandle, ObjectRef};

/// Which side keeps the pair alive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// Native code holds the mirror strongly
    Native,
    /// The managed side is responsible; native code holds a weak reference
    Managed,
}

/// Whether a slot currently has a reachable mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    NoMirror,
    MirrorPresent,
}

/// Native types that can be mirrored on the managed side
pub trait Mirrored: Send + Sync {
    /// Embedded slot holding the mirror reference
    fn mirror_slot(&self) -> &MirrorSlot;

    /// Fully-qualified name of the managed mirror class. Types that are only
    /// ever mirrored from the managed side may leave this unset.
    fn managed_class_name(&self) -> Option<&str> {
        None
    }

    /// Cross-boundary identity: the object's address
    fn native_handle(&self) -> NativeHandle {
        NativeHandle::of(self)
    }

    /// Mirror of this object, created on first access.
    ///
    /// Fatal if the mirror class cannot be resolved or instantiated.
    fn mirror(&self) -> ObjectRef {
        match self.try_mirror() {
            Ok(mirror) => mirror,
            Err(err) => fatal(err),
        }
    }

    /// Like `mirror`, but reports failure. A failed creation leaves the
    /// object without a mirror.
    fn try_mirror(&self) -> Result<ObjectRef, MirrorError> {
        self.mirror_slot()
            .get_or_create(self.native_handle(), self.managed_class_name())
    }

    /// Attach a mirror supplied from outside; fatal if a different one is
    /// already attached
    fn set_mirror(&self, object: Option<ObjectRef>, owner: Owner) {
        if let Err(err) = self.try_set_mirror(object, owner) {
            fatal(err);
        }
    }

    fn try_set_mirror(&self, object: Option<ObjectRef>, owner: Owner) -> Result<(), MirrorError> {
        self.mirror_slot().attach(self.native_handle(), object, owner)
    }
}
