//! Query views for the Notification Campaign context.

use chrono::{DateTime, Utc};
use liveops_core::comparison::FieldValue;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{Campaign, Schedule};

/// Read-only summary of a campaign.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignView {
    /// The campaign identifier.
    pub campaign_id: Uuid,
    /// Display name.
    pub name: String,
    /// When the campaign fires.
    pub schedule: Schedule,
    /// Target segment.
    pub target_segment: String,
    /// Whether the campaign can fire.
    pub enabled: bool,
    /// Successful sends.
    pub sent_count: u64,
    /// When the last successful send happened.
    pub last_sent: Option<DateTime<Utc>>,
    /// Whether a failed send is awaiting retry.
    pub retry_pending: bool,
}

impl From<&Campaign> for CampaignView {
    fn from(campaign: &Campaign) -> Self {
        Self {
            campaign_id: campaign.id,
            name: campaign.name.clone(),
            schedule: campaign.schedule,
            target_segment: campaign.target_segment.clone(),
            enabled: campaign.enabled,
            sent_count: campaign.sent_count,
            last_sent: campaign.last_sent,
            retry_pending: campaign.retry.is_some(),
        }
    }
}

/// Resolves a named field of a campaign for rule conditions.
///
/// Known fields: `enabled` (`1` or `0`), `sent_count`, `failure_count`,
/// `retry_pending` (`1` or `0`).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn field_value(campaign: &Campaign, field: &str) -> Option<FieldValue> {
    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    let number = match field {
        "enabled" => flag(campaign.enabled),
        "sent_count" => campaign.sent_count as f64,
        "failure_count" => campaign.failure_count as f64,
        "retry_pending" => flag(campaign.retry.is_some()),
        _ => return None,
    };
    Some(FieldValue::Number(number))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use liveops_test_support::fixed_now;

    use super::*;
    use crate::domain::commands::RegisterCampaign;
    use crate::domain::template::MessageTemplate;

    fn campaign() -> Campaign {
        let command = RegisterCampaign {
            correlation_id: Uuid::new_v4(),
            name: "daily reminder".into(),
            schedule: Schedule::Recurring {
                period_secs: 86_400,
            },
            target_segment: "all".into(),
            template: MessageTemplate::new("Daily chest", "Your chest is ready"),
            variables: BTreeMap::new(),
        };
        let mut campaign = Campaign::register(Uuid::new_v4(), &command, fixed_now()).unwrap();
        campaign.record_delivered(fixed_now());
        campaign
    }

    #[test]
    fn test_field_value_reads_counters_and_flags() {
        let campaign = campaign();

        assert_eq!(field_value(&campaign, "sent_count"), Some(FieldValue::Number(1.0)));
        assert_eq!(field_value(&campaign, "enabled"), Some(FieldValue::Number(1.0)));
        assert_eq!(field_value(&campaign, "retry_pending"), Some(FieldValue::Number(0.0)));
        assert_eq!(field_value(&campaign, "title"), None);
    }

    #[test]
    fn test_view_projects_campaign() {
        let campaign = campaign();

        let view = CampaignView::from(&campaign);

        assert_eq!(view.sent_count, 1);
        assert_eq!(view.last_sent, Some(fixed_now()));
        assert!(!view.retry_pending);
    }
}
