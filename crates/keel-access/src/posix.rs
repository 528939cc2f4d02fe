//! POSIX permission rules.
//!
//! Mode bits only grant; POSIX picks exactly one class (owner, group or
//! other) for a caller and ignores the rest. The source therefore reports the
//! rules of the applicable class only: present bits as allows, missing bits
//! as denies, so a group that lacks write is not rescued by a generous
//! "other" class.

use crate::error::AccessError;
use keel_core::{AccessRule, Identity, Principal, Rights, RuleSource};
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use tracing::{debug, trace};

const OWNER_READ: u32 = 0o400;
const OWNER_WRITE: u32 = 0o200;
const GROUP_READ: u32 = 0o040;
const GROUP_WRITE: u32 = 0o020;
const OTHER_READ: u32 = 0o004;
const OTHER_WRITE: u32 = 0o002;

/// Rule source reading `stat` mode bits and the effective credentials.
#[derive(Debug, Default)]
pub struct NativeRules;

impl NativeRules {
    pub fn new() -> Self {
        NativeRules
    }
}

impl RuleSource for NativeRules {
    fn rules(&self, path: &Path) -> anyhow::Result<Vec<AccessRule>> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) => {
                let err = AccessError::from(e);
                if err.is_access_denied() {
                    // A parent directory refuses search; nothing grants access.
                    debug!(path = %path.display(), "Cannot stat file, no rules apply");
                    return Ok(Vec::new());
                }
                return Err(AccessError::permissions(path, err.to_string()).into());
            }
        };
        let identity = current_identity()?;

        let rules = class_rules(meta.mode(), meta.uid(), meta.gid(), &identity);
        trace!(
            path = %path.display(),
            mode = %format!("{:o}", meta.mode() & 0o777),
            ?rules,
            "Mode rules"
        );
        Ok(rules)
    }

    fn identity(&self) -> anyhow::Result<Identity> {
        Ok(current_identity()?)
    }
}

fn user_id(uid: u32) -> String {
    format!("u:{}", uid)
}

fn group_id(gid: u32) -> String {
    format!("g:{}", gid)
}

/// Rules of the mode class that applies to `identity`.
fn class_rules(mode: u32, uid: u32, gid: u32, identity: &Identity) -> Vec<AccessRule> {
    // The superuser bypasses read/write checks on regular files.
    if identity.user == user_id(0) {
        return vec![AccessRule::allow(
            Principal::id(identity.user.clone()),
            Rights::READ_WRITE,
        )];
    }

    let owner = Principal::id(user_id(uid));
    let group = Principal::id(group_id(gid));

    let (principal, read_bit, write_bit) = if identity.matches(&owner) {
        (owner, OWNER_READ, OWNER_WRITE)
    } else if identity.matches(&group) {
        (group, GROUP_READ, GROUP_WRITE)
    } else {
        (Principal::Everyone, OTHER_READ, OTHER_WRITE)
    };

    let mut granted = Rights::NONE;
    let mut refused = Rights::NONE;
    for (bit, rights) in [(read_bit, Rights::READ), (write_bit, Rights::WRITE)] {
        if mode & bit != 0 {
            granted = granted | rights;
        } else {
            refused = refused | rights;
        }
    }

    let mut rules = Vec::with_capacity(2);
    if !granted.is_empty() {
        rules.push(AccessRule::allow(principal.clone(), granted));
    }
    if !refused.is_empty() {
        rules.push(AccessRule::deny(principal, refused));
    }
    rules
}

fn current_identity() -> Result<Identity, AccessError> {
    // SAFETY: these calls only read the credentials of the calling process.
    let (euid, egid) = unsafe { (libc::geteuid(), libc::getegid()) };

    let mut groups = vec![group_id(egid)];
    for gid in supplementary_groups()? {
        let id = group_id(gid);
        if !groups.contains(&id) {
            groups.push(id);
        }
    }

    Ok(Identity::new(user_id(euid), groups))
}

fn supplementary_groups() -> Result<Vec<libc::gid_t>, AccessError> {
    // SAFETY: a zero size asks for the count only and never touches the buffer.
    let count = unsafe { libc::getgroups(0, std::ptr::null_mut()) };
    if count < 0 {
        return Err(AccessError::identity(io::Error::last_os_error().to_string()));
    }

    let mut gids: Vec<libc::gid_t> = vec![0; count as usize];
    // SAFETY: the buffer holds exactly `count` entries.
    let filled = unsafe { libc::getgroups(count, gids.as_mut_ptr()) };
    if filled < 0 {
        return Err(AccessError::identity(io::Error::last_os_error().to_string()));
    }
    gids.truncate(filled as usize);
    Ok(gids)
}
