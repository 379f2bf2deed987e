//! Commands for the Notification Campaign context.

use std::collections::BTreeMap;

use liveops_core::command::Command;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregates::Schedule;
use super::template::MessageTemplate;

/// Command to register a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterCampaign {
    /// The correlation ID for tracing.
    #[serde(default = "Uuid::new_v4")]
    pub correlation_id: Uuid,
    /// Display name.
    pub name: String,
    /// When the campaign fires.
    #[serde(flatten)]
    pub schedule: Schedule,
    /// Segment handed to the delivery channel.
    pub target_segment: String,
    /// Message template.
    pub template: MessageTemplate,
    /// Values for the template placeholders.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl Command for RegisterCampaign {
    fn command_type(&self) -> &'static str {
        "notifications.register_campaign"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to enable or disable a campaign.
#[derive(Debug, Clone)]
pub struct SetCampaignEnabled {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The campaign.
    pub campaign_id: Uuid,
    /// New flag.
    pub enabled: bool,
}

impl Command for SetCampaignEnabled {
    fn command_type(&self) -> &'static str {
        "notifications.set_campaign_enabled"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
