//! Permission probing.
//!
//! Platform crates expose the permission model of a filesystem object as a
//! flat list of [`AccessRule`]s plus the [`Identity`] of the current process.
//! [`RuleProbe`] evaluates those rules with deny-takes-precedence semantics
//! and answers the two questions the store cares about: can this process read
//! the settings file, and can it write it.

use std::fmt;
use std::path::Path;
use tracing::debug;

/// Classes of access a rule can grant or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rights(u32);

impl Rights {
    /// No rights
    pub const NONE: Self = Rights(0);
    /// Read-class rights (data, attributes, extended attributes, permissions)
    pub const READ: Self = Rights(1);
    /// Write-class rights (data, append, attributes, create children)
    pub const WRITE: Self = Rights(2);
    /// Both classes
    pub const READ_WRITE: Self = Rights(3);

    /// True if any bit of `other` is present.
    pub fn intersects(self, other: Rights) -> bool {
        self.0 & other.0 != 0
    }

    /// Union of two right sets.
    pub fn union(self, other: Rights) -> Rights {
        Rights(self.0 | other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for Rights {
    type Output = Rights;

    fn bitor(self, rhs: Rights) -> Rights {
        self.union(rhs)
    }
}

/// Whether a rule grants or refuses its rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Allow,
    Deny,
}

/// Who a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Principal {
    /// Every caller
    Everyone,

    /// A user or group identifier in the platform's string form
    /// (`u:1000` / `g:100` on Unix, string SIDs on Windows)
    Id(String),
}

impl Principal {
    pub fn id(id: impl Into<String>) -> Self {
        Principal::Id(id.into())
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Everyone => write!(f, "everyone"),
            Principal::Id(id) => write!(f, "{}", id),
        }
    }
}

/// One authorization rule attached to a filesystem object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRule {
    pub principal: Principal,
    pub kind: RuleKind,
    pub rights: Rights,
}

impl AccessRule {
    /// Create an allow rule
    pub fn allow(principal: Principal, rights: Rights) -> Self {
        AccessRule {
            principal,
            kind: RuleKind::Allow,
            rights,
        }
    }

    /// Create a deny rule
    pub fn deny(principal: Principal, rights: Rights) -> Self {
        AccessRule {
            principal,
            kind: RuleKind::Deny,
            rights,
        }
    }
}

/// The identity the current process acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// The user identifier
    pub user: String,

    /// Identifiers of every group the user belongs to
    pub groups: Vec<String>,
}

impl Identity {
    pub fn new(user: impl Into<String>, groups: Vec<String>) -> Self {
        Identity {
            user: user.into(),
            groups,
        }
    }

    /// True if `principal` names this identity or one of its groups.
    pub fn matches(&self, principal: &Principal) -> bool {
        match principal {
            Principal::Everyone => true,
            Principal::Id(id) => *id == self.user || self.groups.iter().any(|g| g == id),
        }
    }
}

/// Answers whether the current process may read or write a path.
///
/// Probes never fail: anything that prevents an answer means "no".
pub trait AccessProbe: Send + Sync {
    /// Can the current identity read `path`?
    fn can_read(&self, path: &Path) -> bool;

    /// Can the current identity write `path`? Implies readability.
    fn can_write(&self, path: &Path) -> bool;
}

/// Supplies the raw material for [`RuleProbe`].
///
/// Implemented per platform in `keel-access`.
pub trait RuleSource: Send + Sync {
    /// Authorization rules attached to `path`.
    fn rules(&self, path: &Path) -> anyhow::Result<Vec<AccessRule>>;

    /// Identity of the current process.
    fn identity(&self) -> anyhow::Result<Identity>;
}

/// Evaluate `rules` for `identity` and the requested rights class.
///
/// A matching deny wins immediately; otherwise any matching allow grants.
pub fn evaluate(rules: &[AccessRule], identity: &Identity, wanted: Rights) -> bool {
    let mut allowed = false;

    for rule in rules {
        if !identity.matches(&rule.principal) || !rule.rights.intersects(wanted) {
            continue;
        }
        match rule.kind {
            RuleKind::Deny => return false,
            RuleKind::Allow => allowed = true,
        }
    }

    allowed
}

/// [`AccessProbe`] backed by a [`RuleSource`].
pub struct RuleProbe<S> {
    source: S,
}

impl<S: RuleSource> RuleProbe<S> {
    pub fn new(source: S) -> Self {
        RuleProbe { source }
    }

    /// The wrapped rule source.
    pub fn source(&self) -> &S {
        &self.source
    }

    fn check(&self, path: &Path, wanted: Rights) -> bool {
        let rules = match self.source.rules(path) {
            Ok(rules) => rules,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Cannot read access rules");
                return false;
            }
        };
        let identity = match self.source.identity() {
            Ok(identity) => identity,
            Err(e) => {
                debug!(error = %e, "Cannot resolve process identity");
                return false;
            }
        };

        evaluate(&rules, &identity, wanted)
    }
}

impl<S: RuleSource> AccessProbe for RuleProbe<S> {
    fn can_read(&self, path: &Path) -> bool {
        self.check(path, Rights::READ)
    }

    fn can_write(&self, path: &Path) -> bool {
        self.check(path, Rights::WRITE) && self.can_read(path)
    }
}
