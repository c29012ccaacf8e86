use provision_core::{NotificationTarget, RuleConfig};
use serde::Serialize;
use serde_json::{json, Value};

const EVENT_FREQUENCY: &str = "sentry.rules.conditions.event_frequency.EventFrequencyCondition";
const REGRESSION_EVENT: &str = "sentry.rules.conditions.regression_event.RegressionEventCondition";
const SLACK_ACTION: &str = "sentry.integrations.slack.notify_action.SlackNotifyServiceAction";
const TEAMS_ACTION: &str = "sentry.integrations.msteams.notify_action.MsTeamsNotifyServiceAction";

/// Request body for creating an issue alert rule.
///
/// # Examples
///
/// ```
/// use provision_core::{NotificationTarget, RuleConfig};
/// use provision_sentry::rules::rule_payload;
///
/// let payload = rule_payload("shop-prod", None, &RuleConfig::default(), &NotificationTarget::None);
/// assert_eq!(payload.projects, vec!["shop-prod".to_string()]);
/// assert!(payload.actions.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RulePayload {
    /// Conditions that trigger the rule.
    pub conditions: Vec<Value>,
    /// Event filters; always empty.
    pub filters: Vec<Value>,
    /// Notification actions.
    pub actions: Vec<Value>,
    /// How conditions combine.
    pub action_match: String,
    /// How filters combine.
    pub filter_match: String,
    /// Minutes between notifications for the same issue.
    pub frequency: u32,
    /// Rule name.
    pub name: String,
    /// Actor owning the rule, e.g. `team:123`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// The single project this rule is attached to.
    pub projects: Vec<String>,
}

/// Build the standard alert rule for `app_slug`.
///
/// The rule fires when an issue is seen more than `rule.threshold` times in
/// `rule.interval`, or regresses from resolved to unresolved, and notifies
/// `target` (no action for [`NotificationTarget::None`]).
pub fn rule_payload(
    app_slug: &str,
    owner: Option<&str>,
    rule: &RuleConfig,
    target: &NotificationTarget,
) -> RulePayload {
    let conditions = vec![
        json!({
            "interval": rule.interval,
            "id": EVENT_FREQUENCY,
            "value": rule.threshold,
            "comparisonType": "count",
            "name": format!(
                "The issue is seen more than {} times in {}",
                rule.threshold, rule.interval
            ),
        }),
        json!({
            "id": REGRESSION_EVENT,
            "name": "The issue changes state from resolved to unresolved",
        }),
    ];

    RulePayload {
        conditions,
        filters: Vec::new(),
        actions: notify_action(target, &rule.tags).into_iter().collect(),
        action_match: "all".into(),
        filter_match: "all".into(),
        frequency: rule.frequency,
        name: rule.name.clone(),
        owner: owner.map(str::to_string),
        projects: vec![app_slug.to_string()],
    }
}

fn notify_action(target: &NotificationTarget, tags: &str) -> Option<Value> {
    match target {
        NotificationTarget::Slack { workspace, channel } => Some(json!({
            "tags": tags,
            "workspace": workspace,
            "id": SLACK_ACTION,
            "channel": channel,
            "name": "Send a notification to Slack",
        })),
        NotificationTarget::Teams {
            team,
            channel,
            channel_id,
        } => Some(json!({
            "tags": tags,
            "team": team,
            "id": TEAMS_ACTION,
            "channel": channel,
            "channel_id": channel_id,
            "name": "Send a notification to Microsoft Teams",
        })),
        NotificationTarget::None => None,
    }
}
