//! Built-in template catalog.
//!
//! Covers the training, validation, report, sync, collaboration and
//! achievement notifications the rule catalog references.

use lazy_static::lazy_static;
use std::collections::HashMap;

use super::{NotificationTemplate, TemplateAction};
use crate::notifications::types::{
    ActionStyle, NotificationCategory, NotificationPriority, NotificationType,
};

fn action(id: &str, label: &str, style: ActionStyle, icon: &str) -> TemplateAction {
    TemplateAction {
        id: id.to_string(),
        label: label.to_string(),
        style,
        icon: Some(icon.to_string()),
        navigate_template: None,
    }
}

#[allow(clippy::too_many_arguments)]
fn template(
    id: &str,
    name: &str,
    category: NotificationCategory,
    notification_type: NotificationType,
    priority: NotificationPriority,
    title: &str,
    message: &str,
    description: Option<&str>,
    icon: &str,
    actions: Vec<TemplateAction>,
    tags: &[&str],
) -> (String, NotificationTemplate) {
    (
        id.to_string(),
        NotificationTemplate {
            id: id.to_string(),
            name: name.to_string(),
            category,
            notification_type,
            priority,
            title_template: title.to_string(),
            message_template: message.to_string(),
            description_template: description.map(str::to_string),
            icon: Some(icon.to_string()),
            actions,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        },
    )
}

lazy_static! {
    /// All built-in templates, keyed by template id.
    pub static ref TEMPLATES: HashMap<String, NotificationTemplate> = {
        use ActionStyle::{Primary, Secondary};
        use NotificationCategory::*;
        use NotificationPriority::*;
        use NotificationType::*;

        HashMap::from([
            // Training
            template(
                "workshop_completed",
                "Workshop Completed",
                Formation,
                Achievement,
                Medium,
                "Workshop {{workshop_id}} completed!",
                "Congratulations! Score: {{score}}/100{{#next_workshop}} - ready for workshop {{next_workshop}}?{{/next_workshop}}",
                Some("You completed workshop {{workshop_id}} with a score of {{score}}/100.{{#next_workshop}} Workshop {{next_workshop}} is now available.{{/next_workshop}}"),
                "celebration",
                vec![
                    action("view_results", "View results", Secondary, "chart"),
                    action("start_next", "Next workshop", Primary, "play"),
                ],
                &["workshop", "completion", "achievement"],
            ),
            template(
                "workshop_validation_error",
                "Workshop Validation Error",
                Validation,
                Error,
                High,
                "Workshop {{workshop_id}} error",
                "{{error_message}}",
                Some("A validation error was detected in workshop {{workshop_id}} at step \"{{step_name}}\". It must be fixed before continuing."),
                "warning",
                vec![
                    action("fix_error", "Fix now", Primary, "wrench"),
                    action("view_help", "Methodology help", Secondary, "book"),
                ],
                &["workshop", "error", "validation"],
            ),
            template(
                "new_module_available",
                "New Module Available",
                Formation,
                Update,
                Medium,
                "New training module available",
                "The module \"{{module_name}}\" is now accessible",
                Some("A new training module is available: {{module_name}}."),
                "sparkle",
                vec![
                    action("start_module", "Start now", Primary, "rocket"),
                    action("learn_more", "Learn more", Secondary, "info"),
                ],
                &["formation", "new-module", "update"],
            ),
            template(
                "inactivity_reminder",
                "Inactivity Reminder",
                Formation,
                Reminder,
                Low,
                "Resume your training",
                "No progress for {{days_since}} day{{#plural}}s{{/plural}}",
                Some("Your last training activity was on {{last_activity}}. Keep going to maintain your progression."),
                "clock",
                vec![
                    action("resume_training", "Resume training", Primary, "play"),
                    action("view_progress", "View my progress", Secondary, "chart"),
                ],
                &["formation", "reminder", "inactivity"],
            ),
            // Reports
            template(
                "report_generated",
                "Report Generated",
                Report,
                Success,
                Medium,
                "Report generated",
                "The report \"{{report_name}}\" is ready",
                Some("Your report \"{{report_name}}\" was generated successfully. It contains {{page_count}} pages and is ready for download."),
                "chart",
                vec![
                    action("download_pdf", "Download PDF", Primary, "download"),
                    action("view_online", "View online", Secondary, "eye"),
                    action("share_report", "Share", Secondary, "share"),
                ],
                &["report", "generated", "download"],
            ),
            template(
                "report_generation_error",
                "Report Generation Error",
                Report,
                Error,
                High,
                "Report generation failed",
                "Could not generate \"{{report_name}}\": {{error_message}}",
                Some("Generation of \"{{report_name}}\" failed. Check that all required data is complete and retry."),
                "error",
                vec![
                    action("retry_generation", "Retry", Primary, "refresh"),
                    action("check_data", "Check data", Secondary, "search"),
                    action("contact_support", "Contact support", Secondary, "lifebuoy"),
                ],
                &["report", "error", "generation"],
            ),
            template(
                "report_shared",
                "Report Shared",
                Collaboration,
                Info,
                Medium,
                "Report shared with you",
                "{{shared_by}} shared the report \"{{report_name}}\" with you",
                Some("{{shared_by}} gave you access to the report \"{{report_name}}\" of mission {{mission_name}}."),
                "share",
                vec![
                    action("view_report", "View report", Primary, "eye"),
                    action("add_comment", "Comment", Secondary, "comment"),
                ],
                &["report", "shared", "collaboration"],
            ),
            // Validation and security
            template(
                "mission_validation_required",
                "Mission Validation Required",
                Validation,
                Action,
                High,
                "Validation required",
                "Mission \"{{mission_name}}\" requires validation before publication",
                Some("Your mission \"{{mission_name}}\" is complete but needs a final validation before being published."),
                "target",
                vec![
                    action("validate_mission", "Validate now", Primary, "check"),
                    action("review_mission", "Review mission", Secondary, "search"),
                    action("schedule_validation", "Schedule for later", Secondary, "calendar"),
                ],
                &["mission", "validation", "action-required"],
            ),
            template(
                "data_inconsistency_detected",
                "Inconsistency Detected",
                Validation,
                Warning,
                High,
                "Inconsistency detected",
                "Inconsistent data in {{location}} of mission \"{{mission_name}}\"",
                Some("The assistant detected inconsistencies in {{location}}. They may affect the quality of your risk analysis."),
                "warning",
                vec![
                    action("fix_inconsistency", "Fix now", Primary, "wrench"),
                    action("view_details", "View details", Secondary, "search"),
                    action("ignore_warning", "Ignore", Secondary, "close"),
                ],
                &["validation", "inconsistency", "ai-detected"],
            ),
            template(
                "compliance_check_failed",
                "Compliance Check Failed",
                Security,
                Error,
                Urgent,
                "Compliance failure detected",
                "Mission \"{{mission_name}}\" does not meet the {{standard}} requirements",
                Some("Your mission does not meet the {{standard}} requirements. Immediate correction is required to stay compliant."),
                "shield",
                vec![
                    action("fix_compliance", "Fix immediately", Primary, "alarm"),
                    action("view_requirements", "View requirements", Secondary, "clipboard"),
                    action("contact_expert", "Contact an expert", Secondary, "expert"),
                ],
                &["security", "compliance", "urgent"],
            ),
            // Sync
            template(
                "sync_success",
                "Sync Succeeded",
                Sync,
                Success,
                Low,
                "Synchronization complete",
                "{{items_count}} item{{#plural}}s{{/plural}} synchronized",
                Some("Your data was synchronized successfully. {{items_count}} item(s) updated."),
                "check",
                vec![],
                &["sync", "success"],
            ),
            template(
                "sync_failed",
                "Sync Failed",
                Sync,
                Error,
                Medium,
                "Synchronization failed",
                "{{error_message}}",
                Some("Synchronization failed: {{error_message}}. Local data is kept."),
                "error",
                vec![
                    action("retry_sync", "Retry", Primary, "refresh"),
                    action("work_offline", "Continue offline", Secondary, "offline"),
                ],
                &["sync", "error", "failed"],
            ),
            template(
                "sync_conflict",
                "Sync Conflict",
                Sync,
                Warning,
                High,
                "Data conflict",
                "Conflict detected in {{location}}",
                Some("Conflicting changes were detected. Choose which version to keep."),
                "conflict",
                vec![
                    action("resolve_conflict", "Resolve conflict", Primary, "wrench"),
                    action("keep_local", "Keep local", Secondary, "laptop"),
                    action("keep_remote", "Keep remote", Secondary, "cloud"),
                ],
                &["sync", "conflict", "resolution-required"],
            ),
            // Collaboration
            template(
                "new_comment",
                "New Comment",
                Collaboration,
                Info,
                Medium,
                "New comment",
                "{{author_name}} commented on {{location}}",
                Some("{{author_name}} added a comment on {{location}} in mission \"{{mission_name}}\"."),
                "comment",
                vec![
                    action("view_comment", "View comment", Primary, "eye"),
                    action("reply_comment", "Reply", Secondary, "reply"),
                ],
                &["collaboration", "comment", "discussion"],
            ),
            template(
                "team_invitation",
                "Team Invitation",
                Collaboration,
                Action,
                High,
                "Invitation to join a team",
                "{{inviter_name}} invited you to join mission \"{{mission_name}}\"",
                Some("{{inviter_name}} invited you to collaborate on mission \"{{mission_name}}\"."),
                "team",
                vec![
                    action("accept_invitation", "Accept", Primary, "check"),
                    action("decline_invitation", "Decline", Secondary, "close"),
                    action("view_mission", "View mission", Secondary, "eye"),
                ],
                &["collaboration", "invitation", "team"],
            ),
            template(
                "review_request",
                "Review Request",
                Collaboration,
                Action,
                High,
                "Review requested",
                "{{requester_name}} requests a review of {{location}}",
                Some("{{requester_name}} asked for your expert opinion on {{location}} in mission \"{{mission_name}}\"."),
                "review",
                vec![
                    action("start_review", "Start review", Primary, "search"),
                    action("schedule_review", "Schedule for later", Secondary, "calendar"),
                    action("delegate_review", "Delegate", Secondary, "person"),
                ],
                &["collaboration", "review", "expert-opinion"],
            ),
            // Achievements
            template(
                "first_workshop_completed",
                "First Workshop Completed",
                Formation,
                Achievement,
                Medium,
                "First workshop completed!",
                "Congratulations! You completed your first workshop",
                Some("You just passed an important milestone in your training. Keep it up!"),
                "trophy",
                vec![
                    action("continue_learning", "Continue learning", Primary, "book"),
                    action("share_achievement", "Share", Secondary, "share"),
                ],
                &["achievement", "first-time", "milestone"],
            ),
            template(
                "expert_level_reached",
                "Expert Level Reached",
                Formation,
                Achievement,
                High,
                "Expert level reached!",
                "You are now a certified expert",
                Some("Congratulations! You reached the expert level. Your expertise is now recognized."),
                "graduate",
                vec![
                    action("download_certificate", "Download certificate", Primary, "certificate"),
                    action("become_mentor", "Become a mentor", Secondary, "mentor"),
                    action("share_success", "Share", Secondary, "share"),
                ],
                &["achievement", "expert", "certification"],
            ),
            template(
                "perfect_score",
                "Perfect Score",
                Formation,
                Achievement,
                Medium,
                "Perfect score!",
                "100/100 on workshop {{workshop_id}} - outstanding performance!",
                Some("You scored a perfect 100/100 on workshop {{workshop_id}}."),
                "medal",
                vec![
                    action("view_analysis", "View analysis", Primary, "chart"),
                    action("share_score", "Share", Secondary, "share"),
                ],
                &["achievement", "perfect-score", "excellence"],
            ),
        ])
    };
}

pub fn template_by_id(id: &str) -> Option<&'static NotificationTemplate> {
    TEMPLATES.get(id)
}
