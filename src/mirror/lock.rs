//! Creation lock granularity

use core::fmt;
use core::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::{const_mutex, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

/// One lock for every slot built with `LockPolicy::Shared`
static SHARED_CREATE_LOCK: Mutex<()> = const_mutex(());

static PROCESS_DEFAULT: AtomicU8 = AtomicU8::new(LockPolicy::Shared as u8);

/// Which lock serializes mirror creation and attachment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum LockPolicy {
    /// One process-wide lock: no per-object memory, contends on first access
    #[default]
    Shared = 0,
    /// A lock inside every slot
    PerObject = 1,
}

impl LockPolicy {
    /// Policy used by `MirrorSlot::new`
    pub fn process_default() -> Self {
        match PROCESS_DEFAULT.load(Ordering::Relaxed) {
            1 => Self::PerObject,
            _ => Self::Shared,
        }
    }

    pub fn set_process_default(policy: Self) {
        PROCESS_DEFAULT.store(policy as u8, Ordering::Relaxed);
    }
}

impl FromStr for LockPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "shared" => Ok(Self::Shared),
            "per-object" | "per_object" => Ok(Self::PerObject),
            other => Err(format!("unknown lock policy '{}'", other)),
        }
    }
}

impl fmt::Display for LockPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => write!(f, "shared"),
            Self::PerObject => write!(f, "per-object"),
        }
    }
}

/// Lock owned by a slot, or a marker for the shared one
pub(super) enum CreationLock {
    Shared,
    Own(Mutex<()>),
}

impl CreationLock {
    pub(super) fn new(policy: LockPolicy) -> Self {
        match policy {
            LockPolicy::Shared => Self::Shared,
            LockPolicy::PerObject => Self::Own(Mutex::new(())),
        }
    }

    #[inline]
    pub(super) fn lock(&self) -> MutexGuard<'_, ()> {
        match self {
            Self::Shared => SHARED_CREATE_LOCK.lock(),
            Self::Own(mutex) => mutex.lock(),
        }
    }

    pub(super) fn policy(&self) -> LockPolicy {
        match self {
            Self::Shared => LockPolicy::Shared,
            Self::Own(_) => LockPolicy::PerObject,
        }
    }
}
