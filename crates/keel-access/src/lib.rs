//! # Keel Platform Access Rules
//!
//! This crate provides the platform-specific [`RuleSource`] used by
//! `keel_core::RuleProbe` to answer "can this process read/write the settings
//! file". It uses:
//!
//! - **POSIX mode bits** and the effective uid/gid/groups on Unix
//! - **DACLs** and the process token on Windows
//!
//! ## Architecture
//!
//! All unsafe platform calls are isolated here:
//!
//! - `posix.rs`: `stat` mode bits and `getgroups`
//! - `acl.rs`: `GetNamedSecurityInfoW`, ACE walking, token groups
//! - `stub.rs`: fallback for other targets, every query fails
//!
//! [`RuleSource`]: keel_core::RuleSource

#[cfg(unix)]
mod posix;

#[cfg(unix)]
pub use posix::NativeRules;

#[cfg(windows)]
mod acl;

#[cfg(windows)]
pub use acl::NativeRules;

#[cfg(not(any(unix, windows)))]
mod stub;

#[cfg(not(any(unix, windows)))]
pub use stub::NativeRules;

/// Error types specific to permission queries
pub mod error;
pub use error::AccessError;

use keel_core::RuleProbe;

/// Probe backed by the current platform's permission model.
pub type NativeProbe = RuleProbe<NativeRules>;

/// Create a probe for the current platform.
pub fn native_probe() -> NativeProbe {
    RuleProbe::new(NativeRules::new())
}
