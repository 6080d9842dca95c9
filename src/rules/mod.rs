//! Rule engine module.
//!
//! Declarative trigger rules map application events to notification
//! templates. Evaluation is pure; rule sets come from the built-in catalog
//! or an operator-provided TOML override.

pub mod catalog;
pub mod engine;
pub mod errors;
pub mod persistence;
pub mod types;

pub use catalog::builtin_rules;
pub use engine::{check_condition, check_rule, nested_value, DefaultRulesEngine, RulesEngine};
pub use errors::RuleError;
pub use persistence::{RulesProvider, StaticRulesProvider, TomlRulesProvider};
pub use types::{
    ConditionOperator, NotificationRule, RuleSet, RuleTrigger, TriggerCondition, TriggerEvent,
};
