//! Test harness for coordinator workflows.
//!
//! Provides:
//! - FakeTracker: records every tracker call, keeps issue descriptions in
//!   memory and fails on demand
//! - TestHarness: SQLite stores in a temp dir, a MemoryBroker and the
//!   producing channels the coordinators write to

use crate::{
    CrashIngestCoordinator, DuplicateCoordinator, IntegrationService, UniqueCrashFound,
    VerificationCoordinator,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use reporter_bus::{Broker, MemoryBroker, Message, ProducingChannel, RetryPolicy};
use reporter_database::{AsyncDatabase, ConfigStore, IntegrationConfig, NewIntegrationConfig};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use youtrack_client::{Issue, TrackerClient, TrackerError, TrackerResult};

pub const API_GATEWAY: &str = "api-gateway";
pub const INTERNAL: &str = "youtrack-reporter-internal";
pub const PROJECT_ID: &str = "0-7";

/// Tracker operation, for call logs and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerOp {
    Validate,
    Create,
    Update,
    GetDescription,
}

/// A call the fake tracker received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerCall {
    Validate {
        config_id: String,
    },
    Create {
        config_id: String,
        summary: String,
        description: String,
    },
    Update {
        issue_id: String,
        description: String,
    },
    GetDescription {
        issue_id: String,
    },
}

impl TrackerCall {
    pub fn op(&self) -> TrackerOp {
        match self {
            Self::Validate { .. } => TrackerOp::Validate,
            Self::Create { .. } => TrackerOp::Create,
            Self::Update { .. } => TrackerOp::Update,
            Self::GetDescription { .. } => TrackerOp::GetDescription,
        }
    }
}

/// In-memory tracker.
#[derive(Default)]
pub struct FakeTracker {
    calls: Mutex<Vec<TrackerCall>>,
    descriptions: Mutex<HashMap<String, String>>,
    failing: Mutex<HashSet<TrackerOp>>,
    next_issue: AtomicU64,
}

impl FakeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `op` fail with a 500 until cleared.
    pub fn fail(&self, op: TrackerOp) {
        self.failing.lock().insert(op);
    }

    pub fn recover(&self, op: TrackerOp) {
        self.failing.lock().remove(&op);
    }

    pub fn calls(&self) -> Vec<TrackerCall> {
        self.calls.lock().clone()
    }

    pub fn ops(&self) -> Vec<TrackerOp> {
        self.calls.lock().iter().map(TrackerCall::op).collect()
    }

    pub fn count(&self, op: TrackerOp) -> usize {
        self.calls.lock().iter().filter(|c| c.op() == op).count()
    }

    pub fn description(&self, issue_id: &str) -> Option<String> {
        self.descriptions.lock().get(issue_id).cloned()
    }

    /// Seed an issue as if it had been filed earlier.
    pub fn set_description(&self, issue_id: &str, description: &str) {
        self.descriptions
            .lock()
            .insert(issue_id.to_string(), description.to_string());
    }

    fn record(&self, call: TrackerCall) -> TrackerResult<()> {
        let op = call.op();
        self.calls.lock().push(call);
        if self.failing.lock().contains(&op) {
            return Err(TrackerError::ResponseStatus(500));
        }
        Ok(())
    }
}

#[async_trait]
impl TrackerClient for FakeTracker {
    async fn validate_credentials(&self, config: &IntegrationConfig) -> TrackerResult<IntegrationConfig> {
        self.record(TrackerCall::Validate {
            config_id: config.id.clone(),
        })?;
        let mut validated = config.clone();
        validated.project_id = Some(PROJECT_ID.to_string());
        Ok(validated)
    }

    async fn create_issue(
        &self,
        config: &IntegrationConfig,
        summary: &str,
        description: &str,
    ) -> TrackerResult<Issue> {
        self.record(TrackerCall::Create {
            config_id: config.id.clone(),
            summary: summary.to_string(),
            description: description.to_string(),
        })?;
        let id = format!("P-{}", self.next_issue.fetch_add(1, Ordering::Relaxed) + 1);
        self.set_description(&id, description);
        Ok(Issue::new(id))
    }

    async fn update_issue(
        &self,
        _config: &IntegrationConfig,
        issue: &Issue,
        description: &str,
    ) -> TrackerResult<()> {
        self.record(TrackerCall::Update {
            issue_id: issue.id.clone(),
            description: description.to_string(),
        })?;
        self.set_description(&issue.id, description);
        Ok(())
    }

    async fn get_issue_description(
        &self,
        _config: &IntegrationConfig,
        issue: &Issue,
    ) -> TrackerResult<String> {
        self.record(TrackerCall::GetDescription {
            issue_id: issue.id.clone(),
        })?;
        self.description(&issue.id)
            .ok_or(TrackerError::ResponseStatus(404))
    }
}

/// Stores, tracker and channels wired the way the binary wires them.
pub struct TestHarness {
    pub db: AsyncDatabase,
    pub tracker: Arc<FakeTracker>,
    pub broker: MemoryBroker,
    pub api_gateway: Arc<ProducingChannel>,
    pub internal: Arc<ProducingChannel>,
    _dir: TempDir,
}

impl TestHarness {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = AsyncDatabase::open(&dir.path().join("reporter.db"))
            .await
            .unwrap();
        let broker = MemoryBroker::new();
        let shared: Arc<dyn Broker> = Arc::new(broker.clone());
        let retry = RetryPolicy::from_millis(5, 20);

        Self {
            db,
            tracker: Arc::new(FakeTracker::new()),
            broker,
            api_gateway: Arc::new(ProducingChannel::new(API_GATEWAY, shared.clone(), retry)),
            internal: Arc::new(ProducingChannel::new(INTERNAL, shared, retry)),
            _dir: dir,
        }
    }

    pub fn verification(&self) -> VerificationCoordinator {
        VerificationCoordinator::new(
            Arc::new(self.db.clone()),
            self.tracker.clone(),
            self.api_gateway.clone(),
        )
    }

    pub fn crash_ingest(&self) -> CrashIngestCoordinator {
        CrashIngestCoordinator::new(
            Arc::new(self.db.clone()),
            Arc::new(self.db.clone()),
            self.tracker.clone(),
            self.api_gateway.clone(),
        )
    }

    pub fn duplicates(&self) -> DuplicateCoordinator {
        DuplicateCoordinator::new(
            Arc::new(self.db.clone()),
            Arc::new(self.db.clone()),
            self.tracker.clone(),
            self.api_gateway.clone(),
        )
    }

    pub fn integrations(&self) -> IntegrationService {
        IntegrationService::new(Arc::new(self.db.clone()), self.internal.clone())
    }

    /// Insert `{url:"https://t", token:"x", project:"P"}` at revision `rev`.
    pub async fn insert_config(&self, rev: &str) -> IntegrationConfig {
        ConfigStore::insert(
            &self.db,
            NewIntegrationConfig {
                update_rev: rev.to_string(),
                url: "https://t".to_string(),
                token: "x".to_string(),
                project: "P".to_string(),
            },
        )
        .await
        .unwrap()
    }

    pub async fn config(&self, id: &str) -> IntegrationConfig {
        ConfigStore::get(&self.db, id).await.unwrap()
    }

    /// Publish everything the channels hold and decode what reached `queue`
    /// under `M`'s name.
    pub async fn produced<M: Message>(&self, queue: &str) -> Vec<M> {
        for channel in [&self.api_gateway, &self.internal] {
            while channel.flush_once().await.unwrap() {}
        }
        self.broker
            .published_named(queue, M::NAME)
            .iter()
            .map(|e| e.decode::<M>().unwrap())
            .collect()
    }
}

pub fn unique_crash(config_id: &str, crash_id: &str) -> UniqueCrashFound {
    UniqueCrashFound {
        config_id: config_id.to_string(),
        crash_id: crash_id.to_string(),
        crash_info: "heap-buffer-overflow in parse_header".to_string(),
        crash_type: "crash".to_string(),
        crash_output: "==4242==ERROR: AddressSanitizer: heap-buffer-overflow".to_string(),
        crash_url: format!("https://fuzz.example/crashes/{crash_id}"),
        project_name: "libfoo".to_string(),
        fuzzer_name: "afl".to_string(),
        revision_name: "r42".to_string(),
    }
}
