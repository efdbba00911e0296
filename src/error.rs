//! Error types for the bridge
//!
//! Two classes of failure exist. Consistency violations (runtime set twice,
//! mirror replaced, class or constructor missing) are reported as values
//! here and escalated through [`fatal`] by the entry points that must not
//! continue. Caller-responsibility violations (bad addresses handed to the
//! raw accessors) are not detected at all.

use core::fmt;
use crate::logging::error;

/// Failure reported by a managed runtime implementation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// No runtime has been recorded in the cache
    NoRuntime,
    /// The runtime refused to attach the calling thread
    AttachFailed(String),
    /// Class lookup by name failed
    ClassNotFound(String),
    /// Class exists but has no constructor with the requested signature
    MethodNotFound { class: String, signature: String },
    /// Constructor ran but produced no object
    InstantiationFailed(String),
    /// Handle does not name a live object of the expected kind
    InvalidReference(u64),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRuntime => {
                write!(f, "No managed runtime set - cannot attach thread")
            }
            Self::AttachFailed(msg) => write!(f, "Thread attach failed: {}", msg),
            Self::ClassNotFound(name) => write!(f, "Class not found: {}", name),
            Self::MethodNotFound { class, signature } => {
                write!(f, "No constructor {} found for class {}", signature, class)
            }
            Self::InstantiationFailed(class) => {
                write!(f, "Object creation failed for class {}", class)
            }
            Self::InvalidReference(raw) => write!(f, "Invalid reference: {:#x}", raw),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Failure while materializing or attaching a mirror
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorError {
    /// The native type does not name a managed class
    NoClassName,
    ClassNotFound(String),
    ConstructorNotFound { class: String, signature: String },
    InstantiationFailed(String),
    /// A different mirror is already attached
    AlreadyAttached,
    /// The managed-owned mirror was collected; the managed side still owes
    /// the native object its destruction
    Collected,
    Runtime(RuntimeError),
}

impl fmt::Display for MirrorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoClassName => write!(
                f,
                "Cannot create mirror without class name - type must override managed_class_name()"
            ),
            Self::ClassNotFound(name) => write!(f, "Mirror class not found: {}", name),
            Self::ConstructorNotFound { class, signature } => write!(
                f,
                "No constructor {} taking the native address found for class {}",
                signature, class
            ),
            Self::InstantiationFailed(class) => {
                write!(f, "Mirror object creation failed for class {}", class)
            }
            Self::AlreadyAttached => write!(f, "Mirror already set to a different instance"),
            Self::Collected => write!(
                f,
                "Managed-owned mirror was collected - native object is pending destruction"
            ),
            Self::Runtime(err) => write!(f, "Runtime error: {}", err),
        }
    }
}

impl std::error::Error for MirrorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Runtime(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RuntimeError> for MirrorError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::ClassNotFound(name) => Self::ClassNotFound(name),
            RuntimeError::MethodNotFound { class, signature } => {
                Self::ConstructorNotFound { class, signature }
            }
            RuntimeError::InstantiationFailed(class) => Self::InstantiationFailed(class),
            other => Self::Runtime(other),
        }
    }
}

/// Umbrella error for bridge operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Runtime already set to a different instance
    RuntimeConflict,
    /// Destroy requested while native code still shares the object
    NativeShared { native: u64, shares: usize },
    Runtime(RuntimeError),
    Mirror(MirrorError),
    Config(String),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RuntimeConflict => write!(f, "Managed runtime already set to a different instance"),
            Self::NativeShared { native, shares } => write!(
                f,
                "Cannot destroy native object {:#x} - {} native owner(s) remain",
                native, shares
            ),
            Self::Runtime(err) => write!(f, "{}", err),
            Self::Mirror(err) => write!(f, "{}", err),
            Self::Config(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Runtime(err) => Some(err),
            Self::Mirror(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RuntimeError> for BridgeError {
    fn from(err: RuntimeError) -> Self {
        Self::Runtime(err)
    }
}

impl From<MirrorError> for BridgeError {
    fn from(err: MirrorError) -> Self {
        Self::Mirror(err)
    }
}

/// Report an unrecoverable embedding or consistency violation
///
/// Logs the error and panics. Release builds abort on panic, so nothing
/// unwinds into foreign frames.
#[cold]
#[inline(never)]
#[track_caller]
pub fn fatal(err: impl Into<BridgeError>) -> ! {
    let err = err.into();
    error!(event = "fatal", error = %err, "Unrecoverable bridge violation");
    panic!("{}", err)
}

/// `fatal` for `extern "C"` entry points: logs and aborts without unwinding
#[cold]
#[inline(never)]
pub fn fatal_abort(err: impl Into<BridgeError>) -> ! {
    let err = err.into();
    error!(event = "fatal", error = %err, "Unrecoverable bridge violation at the C boundary");
    std::process::abort()
}
