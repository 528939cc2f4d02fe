//! Windows DACL rules.
//!
//! This module contains every Windows API call the crate makes. The DACL of
//! the file is read with `GetNamedSecurityInfoW` and each allow/deny ACE is
//! reduced to read/write [`Rights`] for the SID it names. The process
//! identity is the token's user SID plus its group SIDs.

use crate::error::AccessError;
use keel_core::{AccessRule, Identity, Principal, Rights, RuleSource};
use std::ffi::c_void;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use tracing::trace;
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{CloseHandle, LocalFree, ERROR_SUCCESS, HANDLE, HLOCAL, PSID};
use windows::Win32::Security::Authorization::{
    ConvertSidToStringSidW, GetNamedSecurityInfoW, SE_FILE_OBJECT,
};
use windows::Win32::Security::{
    GetAce, GetTokenInformation, TokenGroups, TokenUser, ACCESS_ALLOWED_ACE, ACE_HEADER, ACL,
    DACL_SECURITY_INFORMATION, PSECURITY_DESCRIPTOR, TOKEN_GROUPS, TOKEN_INFORMATION_CLASS,
    TOKEN_QUERY, TOKEN_USER,
};
use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

const ACCESS_ALLOWED_ACE_TYPE: u8 = 0;
const ACCESS_DENIED_ACE_TYPE: u8 = 1;
const INHERIT_ONLY_ACE: u8 = 0x08;

const EVERYONE_SID: &str = "S-1-1-0";

const GENERIC_READ: u32 = 0x8000_0000;
const GENERIC_WRITE: u32 = 0x4000_0000;
const GENERIC_ALL: u32 = 0x1000_0000;

/// Data, extended attributes, attributes, read-control
const READ_MASK: u32 = 0x0001 | 0x0008 | 0x0080 | 0x0002_0000 | GENERIC_READ | GENERIC_ALL;
/// Data, append, extended attributes, attributes
const WRITE_MASK: u32 = 0x0002 | 0x0004 | 0x0010 | 0x0100 | GENERIC_WRITE | GENERIC_ALL;

/// Rule source reading file DACLs and the process token.
#[derive(Debug, Default)]
pub struct NativeRules;

impl NativeRules {
    pub fn new() -> Self {
        NativeRules
    }
}

impl RuleSource for NativeRules {
    fn rules(&self, path: &Path) -> anyhow::Result<Vec<AccessRule>> {
        Ok(dacl_rules(path)?)
    }

    fn identity(&self) -> anyhow::Result<Identity> {
        Ok(token_identity()?)
    }
}

/// Owns memory returned by the security APIs.
struct LocalBox(*mut c_void);

impl Drop for LocalBox {
    fn drop(&mut self) {
        if !self.0.is_null() {
            // SAFETY: the pointer came from an API documented to allocate with LocalAlloc.
            unsafe {
                let _ = LocalFree(HLOCAL(self.0));
            }
        }
    }
}

/// Owns a token handle.
struct TokenHandle(HANDLE);

impl Drop for TokenHandle {
    fn drop(&mut self) {
        // SAFETY: the handle was opened by OpenProcessToken and is closed once.
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

fn mask_rights(mask: u32) -> Rights {
    let mut rights = Rights::NONE;
    if mask & READ_MASK != 0 {
        rights = rights | Rights::READ;
    }
    if mask & WRITE_MASK != 0 {
        rights = rights | Rights::WRITE;
    }
    rights
}

fn principal_for(sid: String) -> Principal {
    if sid == EVERYONE_SID {
        Principal::Everyone
    } else {
        Principal::Id(sid)
    }
}

fn sid_string(sid: PSID) -> Result<String, AccessError> {
    let mut raw = PWSTR::null();
    // SAFETY: `sid` points at a valid SID owned by the caller; the string is
    // released by LocalBox.
    unsafe {
        ConvertSidToStringSidW(sid, &mut raw)
            .map_err(|e| AccessError::identity(format!("ConvertSidToStringSidW: {}", e)))?;
        let _owner = LocalBox(raw.0 as *mut c_void);
        raw.to_string()
            .map_err(|e| AccessError::identity(format!("invalid SID string: {}", e)))
    }
}

fn dacl_rules(path: &Path) -> Result<Vec<AccessRule>, AccessError> {
    let wide: Vec<u16> = path
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();

    let mut dacl: *mut ACL = std::ptr::null_mut();
    let mut descriptor = PSECURITY_DESCRIPTOR::default();

    // SAFETY: `wide` is NUL-terminated and outlives the call; the descriptor
    // is released by LocalBox and `dacl` points into it.
    let status = unsafe {
        GetNamedSecurityInfoW(
            PCWSTR(wide.as_ptr()),
            SE_FILE_OBJECT,
            DACL_SECURITY_INFORMATION,
            None,
            None,
            Some(&mut dacl),
            None,
            &mut descriptor,
        )
    };
    if status != ERROR_SUCCESS {
        return Err(AccessError::permissions(
            path,
            format!("GetNamedSecurityInfoW failed with {}", status.0),
        ));
    }
    let _descriptor = LocalBox(descriptor.0);

    // A missing DACL grants everyone full access.
    if dacl.is_null() {
        return Ok(vec![AccessRule::allow(Principal::Everyone, Rights::READ_WRITE)]);
    }

    // SAFETY: `dacl` is non-null and lives as long as `_descriptor`.
    let count = unsafe { (*dacl).AceCount };
    let mut rules = Vec::with_capacity(count as usize);

    for index in 0..count as u32 {
        let mut ace: *mut c_void = std::ptr::null_mut();
        // SAFETY: index is below AceCount.
        if unsafe { GetAce(dacl, index, &mut ace) }.is_err() || ace.is_null() {
            continue;
        }

        // SAFETY: every ACE starts with an ACE_HEADER.
        let header = unsafe { &*(ace as *const ACE_HEADER) };
        if header.AceFlags & INHERIT_ONLY_ACE != 0 {
            continue;
        }
        if header.AceType != ACCESS_ALLOWED_ACE_TYPE && header.AceType != ACCESS_DENIED_ACE_TYPE {
            continue;
        }

        // Allowed and denied ACEs share one layout.
        // SAFETY: the type check above guarantees the layout.
        let body = unsafe { &*(ace as *const ACCESS_ALLOWED_ACE) };
        let rights = mask_rights(body.Mask);
        if rights.is_empty() {
            continue;
        }

        let sid = PSID(&body.SidStart as *const u32 as *mut c_void);
        let principal = principal_for(sid_string(sid)?);

        rules.push(if header.AceType == ACCESS_DENIED_ACE_TYPE {
            AccessRule::deny(principal, rights)
        } else {
            AccessRule::allow(principal, rights)
        });
    }

    trace!(path = %path.display(), ?rules, "DACL rules");
    Ok(rules)
}

/// Read a variable-length token information class into an aligned buffer.
fn token_info(
    token: &TokenHandle,
    class: TOKEN_INFORMATION_CLASS,
) -> Result<Vec<u64>, AccessError> {
    let mut needed = 0u32;
    // SAFETY: a null buffer only queries the required size; the call is
    // expected to fail with ERROR_INSUFFICIENT_BUFFER.
    unsafe {
        let _ = GetTokenInformation(token.0, class, None, 0, &mut needed);
    }
    if needed == 0 {
        return Err(AccessError::identity("GetTokenInformation returned no size"));
    }

    let mut buffer = vec![0u64; (needed as usize).div_ceil(8)];
    // SAFETY: the buffer holds at least `needed` bytes.
    unsafe {
        GetTokenInformation(
            token.0,
            class,
            Some(buffer.as_mut_ptr() as *mut c_void),
            needed,
            &mut needed,
        )
    }
    .map_err(|e| AccessError::identity(format!("GetTokenInformation: {}", e)))?;

    Ok(buffer)
}

fn token_identity() -> Result<Identity, AccessError> {
    let mut handle = HANDLE::default();
    // SAFETY: the pseudo handle of the current process is always valid.
    unsafe { OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut handle) }
        .map_err(|e| AccessError::identity(format!("OpenProcessToken: {}", e)))?;
    let token = TokenHandle(handle);

    let user_buffer = token_info(&token, TokenUser)?;
    // SAFETY: the buffer was filled as a TOKEN_USER and is suitably aligned.
    let user = unsafe { &*(user_buffer.as_ptr() as *const TOKEN_USER) };
    let user_sid = sid_string(user.User.Sid)?;

    let groups_buffer = token_info(&token, TokenGroups)?;
    // SAFETY: the buffer was filled as a TOKEN_GROUPS whose trailing array
    // holds GroupCount entries.
    let groups = unsafe {
        let header = &*(groups_buffer.as_ptr() as *const TOKEN_GROUPS);
        std::slice::from_raw_parts(header.Groups.as_ptr(), header.GroupCount as usize)
    };

    let mut group_sids = Vec::with_capacity(groups.len());
    for group in groups {
        group_sids.push(sid_string(group.Sid)?);
    }

    Ok(Identity::new(user_sid, group_sids))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{AccessProbe, RuleProbe};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_mask_rights() {
        assert_eq!(mask_rights(0x0001), Rights::READ);
        assert_eq!(mask_rights(0x0002), Rights::WRITE);
        assert_eq!(mask_rights(GENERIC_ALL), Rights::READ_WRITE);
        assert_eq!(mask_rights(0x0004_0000), Rights::NONE);
    }

    #[test]
    fn test_everyone_sid() {
        assert_eq!(principal_for(EVERYONE_SID.to_string()), Principal::Everyone);
        assert_eq!(
            principal_for("S-1-5-32-544".to_string()),
            Principal::id("S-1-5-32-544")
        );
    }

    #[test]
    fn test_token_identity() {
        let identity = token_identity().unwrap();
        assert!(identity.user.starts_with("S-1-"));
        assert!(!identity.groups.is_empty());
    }

    #[test]
    fn test_probe_own_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.json");
        fs::write(&path, "{}").unwrap();

        let probe = RuleProbe::new(NativeRules::new());
        assert!(probe.can_read(&path));
        assert!(probe.can_write(&path));
    }
}
