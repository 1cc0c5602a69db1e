//! Validation rules
//!
//! Rules run after the directory accepted the credential and may still refuse
//! the identity. They are configured by identifier and resolved through a
//! [`RuleRegistry`] when the domain is built.

mod registry;
mod rules;

pub use registry::{BoundRule, RuleFactory, RuleRegistry};
pub use rules::{AccountEnabled, MemberOf, NotMemberOf, OnlyImported};

use keyway_core::types::{DirectoryIdentity, LocalRecord};
use tracing::debug;

/// Result of a single rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleVerdict {
    Passed,
    Failed(String),
}

/// A check applied to a located, authenticated identity
pub trait ValidationRule: Send {
    fn check(&self, identity: &DirectoryIdentity, record: Option<&LocalRecord>) -> RuleVerdict;
}

/// Result of running a domain's rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Passed,
    Failed { rule: String, reason: String },
}

impl ValidationOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, ValidationOutcome::Passed)
    }
}

/// Runs bound rules in configured order and stops at the first failure.
///
/// Rules are instantiated as they are reached, so rules after a failing one
/// are never constructed.
pub struct ValidationRuleChain<'a> {
    rules: &'a [BoundRule],
}

impl<'a> ValidationRuleChain<'a> {
    pub fn new(rules: &'a [BoundRule]) -> Self {
        Self { rules }
    }

    pub fn evaluate(
        &self,
        identity: &DirectoryIdentity,
        record: Option<&LocalRecord>,
    ) -> ValidationOutcome {
        for bound in self.rules {
            let rule = bound.instantiate();
            match rule.check(identity, record) {
                RuleVerdict::Passed => {
                    debug!("Rule {} passed for {}", bound.id(), identity.dn);
                }
                RuleVerdict::Failed(reason) => {
                    return ValidationOutcome::Failed {
                        rule: bound.id().to_string(),
                        reason,
                    };
                }
            }
        }

        ValidationOutcome::Passed
    }
}
