//! Deep links for generated notifications.
//!
//! A static per-rule table of route templates, rendered against the event
//! data. A link whose placeholders cannot all be resolved is omitted rather
//! than emitted half-filled.

use lazy_static::lazy_static;
use std::collections::HashMap;

use crate::templates::{has_unresolved_placeholders, render};

lazy_static! {
    static ref DEEP_LINKS: HashMap<&'static str, &'static str> = HashMap::from([
        (
            "workshop_completion_celebration",
            "/missions/{{mission_id}}/workshops/{{workshop_id}}/results",
        ),
        (
            "validation_error_immediate",
            "/missions/{{mission_id}}/workshops/{{workshop_id}}?step={{step_id}}",
        ),
        (
            "mission_validation_required",
            "/missions/{{mission_id}}/validate",
        ),
        ("report_generation_success", "/reports/{{report_id}}"),
        (
            "new_comment_notification",
            "/missions/{{mission_id}}/comments#comment-{{comment_id}}",
        ),
    ]);
}

/// Resolved deep link for a rule, or `None` when the rule has no route or
/// the event data leaves a placeholder unresolved.
pub fn deep_link_for(
    rule_id: &str,
    data: &HashMap<String, serde_json::Value>,
) -> Option<String> {
    let template = DEEP_LINKS.get(rule_id)?;
    for name in placeholder_names(template) {
        match data.get(name) {
            Some(v) if !v.is_null() => {}
            _ => return None,
        }
    }
    let rendered = render(template, data);
    debug_assert!(!has_unresolved_placeholders(&rendered));
    Some(rendered)
}

fn placeholder_names(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else { break };
        names.push(&after[..close]);
        rest = &after[close + 2..];
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(pairs: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn renders_known_routes() {
        let d = data(&[("mission_id", json!("m1")), ("workshop_id", json!(2))]);
        assert_eq!(
            deep_link_for("workshop_completion_celebration", &d),
            Some("/missions/m1/workshops/2/results".to_string())
        );

        let d = data(&[("report_id", json!("r9"))]);
        assert_eq!(
            deep_link_for("report_generation_success", &d),
            Some("/reports/r9".to_string())
        );
    }

    #[test]
    fn unresolved_placeholder_omits_the_link() {
        let d = data(&[("workshop_id", json!(2))]);
        assert_eq!(deep_link_for("workshop_completion_celebration", &d), None);

        let d = data(&[("mission_id", json!("m1")), ("workshop_id", json!(2))]);
        assert_eq!(deep_link_for("validation_error_immediate", &d), None);
    }

    #[test]
    fn unknown_rule_has_no_link() {
        assert_eq!(deep_link_for("sync_failure_alert", &data(&[])), None);
    }
}
