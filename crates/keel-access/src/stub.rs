//! Stub implementation for platforms without a known permission model.

use crate::error::AccessError;
use keel_core::{AccessRule, Identity, RuleSource};
use std::path::Path;

/// Stub rule source.
///
/// This allows the crate to compile everywhere, but every query fails, so
/// probes built on it answer "no access".
pub struct NativeRules;

impl NativeRules {
    /// Create a new stub source.
    pub fn new() -> Self {
        NativeRules
    }
}

impl Default for NativeRules {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleSource for NativeRules {
    fn rules(&self, _path: &Path) -> anyhow::Result<Vec<AccessRule>> {
        Err(AccessError::Unsupported.into())
    }

    fn identity(&self) -> anyhow::Result<Identity> {
        Err(AccessError::Unsupported.into())
    }
}
