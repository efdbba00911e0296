//! Class definitions registered with the in-process heap

use std::time::Duration;

/// Shape of a managed class
#[derive(Debug, Clone, Default)]
pub struct ClassDef {
    pub(super) constructors: Vec<String>,
    pub(super) failing: bool,
    pub(super) finalizes_native: bool,
    pub(super) construct_delay: Option<Duration>,
}

impl ClassDef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constructor with the given descriptor, e.g. `"(J)V"`
    pub fn constructor(mut self, signature: &str) -> Self {
        self.constructors.push(signature.to_string());
        self
    }

    /// Constructors of this class produce no object
    #[cfg(any(test, feature = "testing"))]
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Instances destroy their native peer when finalized
    pub fn finalizes_native(mut self) -> Self {
        self.finalizes_native = true;
        self
    }

    /// Constructors take at least this long (widens creation races)
    #[cfg(any(test, feature = "testing"))]
    pub fn construct_delay(mut self, delay: Duration) -> Self {
        self.construct_delay = Some(delay);
        self
    }

    pub(super) fn has_constructor(&self, signature: &str) -> bool {
        self.constructors.iter().any(|sig| sig == signature)
    }
}
