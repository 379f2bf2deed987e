//! Demo host for the live-operations engine.
//!
//! Wires the engine to logging adapters, seeds a small live-ops setup when no
//! snapshot exists, runs reconciliation until Ctrl-C and saves state on exit.

use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use liveops_alerts::domain::commands::RegisterAlert;
use liveops_automation::domain::aggregates::{Action, Condition, TriggerKind};
use liveops_automation::domain::commands::RegisterRule;
use liveops_content::domain::aggregates::RolloutPlan;
use liveops_content::domain::commands::SubmitContent;
use liveops_content::domain::validation::ValidationRule;
use liveops_core::clock::SystemClock;
use liveops_core::comparison::Comparison;
use liveops_core::rng::SeededRng;
use liveops_core::trigger::Severity;
use liveops_engine::adapters::{
    ALL_PLAYERS, AttributeSegmentResolver, FileSnapshotStore, LoggingDeliveryChannel,
    LoggingRewardService, TracingAnalyticsSink,
};
use liveops_engine::config::EngineConfig;
use liveops_engine::facade::{Collaborators, LiveOpsEngine};
use liveops_engine::runner::ReconciliationRunner;
use liveops_engine::telemetry;
use liveops_notifications::domain::aggregates::Schedule;
use liveops_notifications::domain::commands::RegisterCampaign;
use liveops_notifications::domain::template::MessageTemplate;
use tokio::sync::Mutex;
use uuid::Uuid;

fn seed(engine: &mut LiveOpsEngine) -> Result<(), Box<dyn Error>> {
    let version_id = engine.submit_content(&SubmitContent {
        correlation_id: Uuid::new_v4(),
        content_type: "level_pack".into(),
        payload_ref: "cdn://level_pack/spring.zip".into(),
        manifest: serde_json::json!({"levels": 12, "theme": "spring"}),
        checksum: None,
        rules: vec![ValidationRule::NonEmptyManifest, ValidationRule::ChecksumMatches],
        dependencies: Vec::new(),
        rollout_plan: RolloutPlan::Staged {
            steps: vec![10, 50, 100],
            step_interval_secs: 60,
        },
    })?;

    engine.register_alert(&RegisterAlert {
        correlation_id: Uuid::new_v4(),
        name: "error rate".into(),
        metric: "error_rate".into(),
        operator: Comparison::GreaterThan,
        threshold: 0.05,
        severity: Severity::Critical,
        mode: None,
    })?;

    engine.register_rule(&RegisterRule {
        correlation_id: Uuid::new_v4(),
        name: "roll back spring pack on errors".into(),
        trigger: TriggerKind::MetricThreshold,
        mode: None,
        conditions: vec![Condition::metric("error_rate", Comparison::GreaterThan, 0.05)],
        actions: vec![Action::RollbackContent {
            version_id,
            reason: "error rate above 5%".into(),
        }],
    })?;

    engine.register_campaign(&RegisterCampaign {
        correlation_id: Uuid::new_v4(),
        name: "daily chest".into(),
        schedule: Schedule::Recurring {
            period_secs: 86_400,
        },
        target_segment: ALL_PLAYERS.into(),
        template: MessageTemplate::new("{{chest}} is ready", "Open your {{chest}} today"),
        variables: BTreeMap::from([("chest".to_owned(), "Daily chest".to_owned())]),
    })?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    telemetry::init_tracing()?;

    tracing::info!("Starting live-ops host");

    // Read configuration from file and environment.
    let config_path = std::env::var("LIVEOPS_CONFIG").ok().map(PathBuf::from);
    let config = EngineConfig::load(config_path.as_deref())?;
    let snapshots = config.snapshot_dir.clone().map(FileSnapshotStore::new);

    let segments = AttributeSegmentResolver::new().with_segment(
        "spenders",
        "spend_tier",
        ["medium", "high"],
    );
    let collaborators = Collaborators {
        rewards: Arc::new(LoggingRewardService),
        delivery: Arc::new(LoggingDeliveryChannel),
        segments: Arc::new(segments),
        analytics: Arc::new(TracingAnalyticsSink),
        clock: Arc::new(SystemClock),
    };
    let mut engine = LiveOpsEngine::new(
        config.clone(),
        collaborators,
        Box::new(SeededRng::from_entropy()),
    );

    let restored = match &snapshots {
        Some(store) => engine.load(store).await?,
        None => 0,
    };
    if restored == 0 {
        seed(&mut engine)?;
        tracing::info!("seeded demo setup");
    }

    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::debug!(
                event_type = %event.event_type(),
                aggregate_id = %event.metadata.aggregate_id,
                "lifecycle event"
            );
        }
    });

    let engine = Arc::new(Mutex::new(engine));
    let runner = ReconciliationRunner::start(Arc::clone(&engine), config.tick_interval());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    let passes = runner.stop().await?;

    if let Some(store) = &snapshots {
        engine.lock().await.save(store).await?;
    }
    tracing::info!(passes, "live-ops host stopped");

    Ok(())
}
