//! Rule registry: identifier to factory

use keyway_core::config::RuleConfig;
use keyway_core::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::rules::{AccountEnabled, MemberOf, NotMemberOf, OnlyImported};
use super::ValidationRule;

/// Builds a rule instance from its configured arguments
pub type RuleFactory = Arc<dyn Fn(&[String]) -> Box<dyn ValidationRule> + Send + Sync>;

struct RuleEntry {
    factory: RuleFactory,
    min_args: usize,
}

/// Known rule identifiers
#[derive(Default)]
pub struct RuleRegistry {
    rules: HashMap<String, RuleEntry>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `member_of`, `not_member_of`, `only_imported`
    /// and `account_enabled`
    pub fn with_builtin_rules() -> Self {
        let mut registry = Self::new();

        registry.register_with_arity("member_of", 1, |args: &[String]| {
            Box::new(MemberOf::new(args)) as Box<dyn ValidationRule>
        });
        registry.register_with_arity("not_member_of", 1, |args: &[String]| {
            Box::new(NotMemberOf::new(args)) as Box<dyn ValidationRule>
        });
        registry.register("only_imported", |_: &[String]| {
            Box::new(OnlyImported) as Box<dyn ValidationRule>
        });
        registry.register("account_enabled", |_: &[String]| {
            Box::new(AccountEnabled) as Box<dyn ValidationRule>
        });

        registry
    }

    /// Register a rule; an existing rule with the same id is replaced
    pub fn register<F>(&mut self, id: &str, factory: F)
    where
        F: Fn(&[String]) -> Box<dyn ValidationRule> + Send + Sync + 'static,
    {
        self.register_with_arity(id, 0, factory);
    }

    /// Register a rule that needs at least `min_args` arguments
    pub fn register_with_arity<F>(&mut self, id: &str, min_args: usize, factory: F)
    where
        F: Fn(&[String]) -> Box<dyn ValidationRule> + Send + Sync + 'static,
    {
        self.rules.insert(
            id.to_string(),
            RuleEntry {
                factory: Arc::new(factory),
                min_args,
            },
        );
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rules.contains_key(id)
    }

    /// Resolve a configured rule
    pub fn bind(&self, config: &RuleConfig) -> Result<BoundRule> {
        let entry = self
            .rules
            .get(&config.id)
            .ok_or_else(|| Error::UnknownRule(config.id.clone()))?;

        if config.args.len() < entry.min_args {
            return Err(Error::InvalidConfig(format!(
                "Rule {} needs at least {} argument(s)",
                config.id, entry.min_args
            )));
        }

        Ok(BoundRule {
            id: config.id.clone(),
            args: config.args.clone(),
            factory: entry.factory.clone(),
        })
    }
}

/// A rule identifier resolved to its factory, with arguments attached
#[derive(Clone)]
pub struct BoundRule {
    id: String,
    args: Vec<String>,
    factory: RuleFactory,
}

impl BoundRule {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn instantiate(&self) -> Box<dyn ValidationRule> {
        (self.factory)(&self.args)
    }
}

impl fmt::Debug for BoundRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundRule")
            .field("id", &self.id)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}
