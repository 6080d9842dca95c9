//! Built-in rule catalog.
//!
//! Default rule set shipped with the platform; a persisted rules document
//! (see `persistence`) replaces it entirely when present.

use serde_json::json;

use super::types::{ConditionOperator, NotificationRule, RuleTrigger, TriggerCondition};

const MINUTE_MS: u64 = 60_000;
const HOUR_MS: u64 = 60 * MINUTE_MS;
const DAY_MS: u64 = 24 * HOUR_MS;

fn cond(field: &str, operator: ConditionOperator, value: serde_json::Value) -> TriggerCondition {
    TriggerCondition::new(field, operator, value)
}

#[allow(clippy::too_many_arguments)]
fn rule(
    id: &str,
    name: &str,
    description: &str,
    event: &str,
    conditions: Vec<TriggerCondition>,
    template_id: &str,
    cooldown_ms: u64,
    max_per_day: u32,
) -> NotificationRule {
    NotificationRule {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        enabled: true,
        trigger: RuleTrigger {
            event: event.to_string(),
            conditions,
        },
        template_id: template_id.to_string(),
        cooldown_ms,
        max_per_day,
        target_users: Vec::new(),
    }
}

/// The default rule set.
pub fn builtin_rules() -> Vec<NotificationRule> {
    use ConditionOperator::*;

    vec![
        // Training
        rule(
            "workshop_completion_celebration",
            "Workshop Completion Celebration",
            "Congratulates the user when a workshop ends",
            "workshop_completed",
            vec![cond("score", GreaterThan, json!(0))],
            "workshop_completed",
            0,
            10,
        ),
        rule(
            "validation_error_immediate",
            "Immediate Validation Error",
            "Immediate alert on a critical validation error",
            "validation_error",
            vec![cond("severity", In, json!(["high", "critical"]))],
            "workshop_validation_error",
            5 * MINUTE_MS,
            20,
        ),
        rule(
            "inactivity_reminder_progressive",
            "Progressive Inactivity Reminder",
            "Reminders scaled to the inactivity duration",
            "user_inactive",
            vec![cond("days_inactive", GreaterThan, json!(3))],
            "inactivity_reminder",
            DAY_MS,
            1,
        ),
        rule(
            "perfect_score_achievement",
            "Perfect Score Achievement",
            "Rewards a perfect workshop score",
            "workshop_completed",
            vec![cond("score", Equals, json!(100))],
            "perfect_score",
            0,
            5,
        ),
        rule(
            "first_workshop_milestone",
            "First Workshop Milestone",
            "Celebrates the first completed workshop",
            "workshop_completed",
            vec![
                cond("workshop_id", Equals, json!(1)),
                cond("user_workshop_count", Equals, json!(1)),
            ],
            "first_workshop_completed",
            0,
            1,
        ),
        // Validation and quality
        rule(
            "mission_validation_required",
            "Mission Validation Required",
            "Requests validation when a mission is complete",
            "mission_completed",
            vec![
                cond("all_workshops_completed", Equals, json!(true)),
                cond("validation_status", Equals, json!("pending")),
            ],
            "mission_validation_required",
            HOUR_MS,
            3,
        ),
        rule(
            "ai_inconsistency_detection",
            "Assistant Inconsistency Detection",
            "Alerts when the analysis assistant finds inconsistencies",
            "ai_analysis_completed",
            vec![
                cond("inconsistencies_found", GreaterThan, json!(0)),
                cond("confidence_level", GreaterThan, json!(0.8)),
            ],
            "data_inconsistency_detected",
            30 * MINUTE_MS,
            10,
        ),
        rule(
            "compliance_check_failure",
            "Compliance Check Failure",
            "Urgent alert on a failed compliance check",
            "compliance_check_completed",
            vec![
                cond("compliance_status", Equals, json!("failed")),
                cond("standard", Contains, json!("ANSSI")),
            ],
            "compliance_check_failed",
            0,
            50,
        ),
        // Reports
        rule(
            "report_generation_success",
            "Report Generated",
            "Notifies when a report is ready for download",
            "report_generated",
            vec![
                cond("status", Equals, json!("success")),
                cond("file_size", GreaterThan, json!(0)),
            ],
            "report_generated",
            0,
            20,
        ),
        rule(
            "report_generation_failure",
            "Report Generation Failure",
            "Alert when report generation fails",
            "report_generation_failed",
            vec![cond("retry_count", LessThan, json!(3))],
            "report_generation_error",
            10 * MINUTE_MS,
            10,
        ),
        rule(
            "report_shared_notification",
            "Report Shared",
            "Notifies the target user of a shared report",
            "report_shared",
            vec![cond("target_user_id", Exists, json!(true))],
            "report_shared",
            0,
            30,
        ),
        // Collaboration
        rule(
            "new_comment_notification",
            "New Comment",
            "Notifies about substantive new comments",
            "comment_added",
            vec![
                cond("target_user_id", Exists, json!(true)),
                cond("comment_length", GreaterThan, json!(10)),
            ],
            "new_comment",
            5 * MINUTE_MS,
            50,
        ),
        rule(
            "team_invitation_notification",
            "Team Invitation",
            "Invitation to join a mission team",
            "team_invitation_sent",
            vec![cond("invitee_user_id", Exists, json!(true))],
            "team_invitation",
            0,
            10,
        ),
        rule(
            "review_request_notification",
            "Review Request",
            "Expert review request",
            "review_requested",
            vec![
                cond("reviewer_user_id", Exists, json!(true)),
                cond("urgency_level", In, json!(["medium", "high", "urgent"])),
            ],
            "review_request",
            30 * MINUTE_MS,
            15,
        ),
        // Synchronization
        rule(
            "sync_success_summary",
            "Sync Success Summary",
            "Success summary after a sizable sync",
            "sync_completed",
            vec![
                cond("status", Equals, json!("success")),
                cond("items_synced", GreaterThan, json!(5)),
            ],
            "sync_success",
            HOUR_MS,
            5,
        ),
        rule(
            "sync_failure_alert",
            "Sync Failure Alert",
            "Alert after repeated sync failures",
            "sync_failed",
            vec![cond("consecutive_failures", GreaterThan, json!(2))],
            "sync_failed",
            30 * MINUTE_MS,
            10,
        ),
        rule(
            "sync_conflict_resolution",
            "Sync Conflict Resolution",
            "Conflict requiring a manual decision",
            "sync_conflict_detected",
            vec![cond("auto_resolution_failed", Equals, json!(true))],
            "sync_conflict",
            0,
            20,
        ),
        // Contextual
        rule(
            "weekend_reminder",
            "Weekend Reminder",
            "Gentle weekend training reminder",
            "time_based_check",
            vec![
                cond("day_of_week", In, json!(["saturday", "sunday"])),
                cond("user_active_weekends", Equals, json!(true)),
                cond("last_activity_days", GreaterThan, json!(2)),
            ],
            "inactivity_reminder",
            2 * DAY_MS,
            1,
        ),
        rule(
            "deadline_approaching",
            "Deadline Approaching",
            "Alert when a mission deadline is close",
            "deadline_check",
            vec![
                cond("days_until_deadline", InRange, json!([1, 7])),
                cond("mission_completion", LessThan, json!(80)),
            ],
            "mission_validation_required",
            DAY_MS,
            2,
        ),
        rule(
            "expert_recommendation",
            "Expert Recommendation",
            "Content suggestion based on the user level",
            "user_level_updated",
            vec![
                cond("new_level", In, json!(["intermediate", "advanced", "expert"])),
                cond("completion_rate", GreaterThan, json!(75)),
            ],
            "new_module_available",
            7 * DAY_MS,
            1,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::template_by_id;
    use std::collections::HashSet;

    #[test]
    fn rule_ids_are_unique() {
        let rules = builtin_rules();
        let ids: HashSet<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids.len(), rules.len());
    }

    #[test]
    fn every_rule_references_a_known_template() {
        for rule in builtin_rules() {
            assert!(
                template_by_id(&rule.template_id).is_some(),
                "rule '{}' references unknown template '{}'",
                rule.id,
                rule.template_id
            );
        }
    }
}
