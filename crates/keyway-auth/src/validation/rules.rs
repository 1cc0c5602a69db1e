//! Built-in validation rules

use keyway_core::types::{DirectoryIdentity, LocalRecord};

use super::{RuleVerdict, ValidationRule};

const MEMBER_OF: &str = "memberOf";
const USER_ACCOUNT_CONTROL: &str = "userAccountControl";
const ACCOUNTDISABLE: u32 = 0x2;

fn groups(identity: &DirectoryIdentity) -> impl Iterator<Item = &str> {
    identity.get_values(MEMBER_OF).iter().map(|g| g.trim())
}

/// Identity must belong to at least one of the given groups
pub struct MemberOf {
    groups: Vec<String>,
}

impl MemberOf {
    pub fn new(groups: &[String]) -> Self {
        Self {
            groups: groups.to_vec(),
        }
    }
}

impl ValidationRule for MemberOf {
    fn check(&self, identity: &DirectoryIdentity, _record: Option<&LocalRecord>) -> RuleVerdict {
        let member = groups(identity)
            .any(|group| self.groups.iter().any(|g| g.trim().eq_ignore_ascii_case(group)));

        if member {
            RuleVerdict::Passed
        } else {
            RuleVerdict::Failed(format!(
                "{} is not a member of any of: {}",
                identity.dn,
                self.groups.join("; ")
            ))
        }
    }
}

/// Identity must belong to none of the given groups
pub struct NotMemberOf {
    groups: Vec<String>,
}

impl NotMemberOf {
    pub fn new(groups: &[String]) -> Self {
        Self {
            groups: groups.to_vec(),
        }
    }
}

impl ValidationRule for NotMemberOf {
    fn check(&self, identity: &DirectoryIdentity, _record: Option<&LocalRecord>) -> RuleVerdict {
        match groups(identity)
            .find(|group| self.groups.iter().any(|g| g.trim().eq_ignore_ascii_case(group)))
        {
            Some(group) => RuleVerdict::Failed(format!("{} is a member of {}", identity.dn, group)),
            None => RuleVerdict::Passed,
        }
    }
}

/// Only identities that already have a local record may sign in
pub struct OnlyImported;

impl ValidationRule for OnlyImported {
    fn check(&self, identity: &DirectoryIdentity, record: Option<&LocalRecord>) -> RuleVerdict {
        match record {
            Some(_) => RuleVerdict::Passed,
            None => RuleVerdict::Failed(format!("{} has not been imported", identity.dn)),
        }
    }
}

/// Active Directory account must not carry the ACCOUNTDISABLE flag.
/// Entries without `userAccountControl` pass.
pub struct AccountEnabled;

impl ValidationRule for AccountEnabled {
    fn check(&self, identity: &DirectoryIdentity, _record: Option<&LocalRecord>) -> RuleVerdict {
        let Some(value) = identity.get_attribute(USER_ACCOUNT_CONTROL) else {
            return RuleVerdict::Passed;
        };

        match value.trim().parse::<u32>() {
            Ok(flags) if flags & ACCOUNTDISABLE != 0 => {
                RuleVerdict::Failed(format!("{} is disabled", identity.dn))
            }
            Ok(_) => RuleVerdict::Passed,
            Err(_) => RuleVerdict::Failed(format!(
                "{} has an unreadable userAccountControl value: {}",
                identity.dn, value
            )),
        }
    }
}
