//! Outcome of an idempotent "create if missing" call.
//!
//! Existing resources are never diffed or updated: a realm, client or project
//! that already exists is returned as-is even if its configuration drifted.

/// Result of an `ensure_*` helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ensured<T> {
    /// The resource already existed; nothing was changed.
    Existing(T),
    /// The resource was created by this call.
    Created(T),
    /// The resource is missing and dry-run suppressed its creation.
    DryRun,
}

impl<T> Ensured<T> {
    /// The resource value, if one exists after the call.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Existing(v) | Self::Created(v) => Some(v),
            Self::DryRun => None,
        }
    }

    /// Consume into the resource value.
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Existing(v) | Self::Created(v) => Some(v),
            Self::DryRun => None,
        }
    }

    /// Whether this call created the resource.
    #[must_use]
    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    /// Map the contained value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Ensured<U> {
        match self {
            Self::Existing(v) => Ensured::Existing(f(v)),
            Self::Created(v) => Ensured::Created(f(v)),
            Self::DryRun => Ensured::DryRun,
        }
    }

    /// Short label for log lines.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Existing(_) => "exists",
            Self::Created(_) => "created",
            Self::DryRun => "dry-run",
        }
    }
}
