//! Configuration for expression bindings.

// ---------------------------------------------------------------------------
// BindingConfig
// ---------------------------------------------------------------------------

/// What an [`ExpressionBinding`](crate::ExpressionBinding) tracks and how
/// strictly its instrumentation is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingConfig {
    /// Track attributes read with `LOAD_ATTR`.
    pub monitor_attributes: bool,
    /// Track attributes read through `getattr(obj, name[, default])`.
    pub monitor_getattr: bool,
    /// Reject non-neutral directives and re-check stack depths after
    /// splicing.
    pub verify_stack: bool,
    /// Evaluate the original code, untracked, when instrumentation fails.
    pub fallback_uninstrumented: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            monitor_attributes: true,
            monitor_getattr: true,
            verify_stack: true,
            fallback_uninstrumented: true,
        }
    }
}

impl BindingConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track nothing: expressions evaluate but never invalidate.
    pub fn untracked() -> Self {
        Self {
            monitor_attributes: false,
            monitor_getattr: false,
            ..Self::default()
        }
    }

    /// Set attribute tracking (builder).
    pub fn with_monitor_attributes(mut self, enabled: bool) -> Self {
        self.monitor_attributes = enabled;
        self
    }

    /// Set `getattr` tracking (builder).
    pub fn with_monitor_getattr(mut self, enabled: bool) -> Self {
        self.monitor_getattr = enabled;
        self
    }

    /// Set stack verification (builder).
    pub fn with_verify_stack(mut self, enabled: bool) -> Self {
        self.verify_stack = enabled;
        self
    }

    /// Set the uninstrumented fallback (builder).
    pub fn with_fallback_uninstrumented(mut self, enabled: bool) -> Self {
        self.fallback_uninstrumented = enabled;
        self
    }

    /// Whether any monitor is enabled.
    pub fn tracks_anything(&self) -> bool {
        self.monitor_attributes || self.monitor_getattr
    }
}
