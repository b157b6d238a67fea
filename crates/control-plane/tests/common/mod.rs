//! Shared setup for the integration suites.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use migration_control_plane::{
    batch::{JobMessage, JobScheduler, LocalJobQueue, ScheduledJob},
    memory::MemoryStore,
    migration::DelegateRegistry,
    model::parse_model,
    ports::{InstanceRepository, PendingWrites},
    runtime::{ExecutionNode, InstanceState},
    services::{MigrationService, MigrationSettings},
    AppResult,
};

pub const ORDERS_V1: &str = r#"
key: orders
version: 1
activities:
  - { id: start, type: start_event }
  - { id: taskA, type: user_task }
  - { id: taskC, type: user_task }
  - { id: legacy, type: user_task }
"#;

/// ORDERS_V1 with `taskA` renamed `taskB` and `legacy` dropped.
pub const ORDERS_V2: &str = r#"
key: orders
version: 2
activities:
  - { id: start, type: start_event }
  - { id: taskB, type: user_task }
  - { id: taskC, type: user_task }
"#;

pub const CALLER_V1: &str = r#"
key: caller
version: 1
activities:
  - { id: callX, type: call_activity, calledElement: procA }
"#;

pub const CALLER_V2: &str = r#"
key: caller
version: 2
activities:
  - { id: callX, type: call_activity, calledElement: procB }
"#;

pub const PROC_A: &str = r#"
key: procA
version: 1
activities:
  - { id: aTask, type: user_task }
"#;

pub const PROC_B: &str = r#"
key: procB
version: 1
activities:
  - { id: bTask, type: user_task }
"#;

pub const REVIEW_V1: &str = r#"
key: review
version: 1
activities:
  - { id: review, type: sub_process, multiInstance: { cardinality: "2" } }
  - { id: check, type: user_task, parent: review }
  - { id: after, type: user_task }
"#;

pub const REVIEW_V2: &str = r#"
key: review
version: 2
activities:
  - { id: review, type: sub_process, multiInstance: { cardinality: "2" } }
  - { id: check, type: user_task, parent: review }
  - { id: after, type: user_task }
  - { id: archive, type: user_task }
"#;

pub struct Harness {
    pub store: MemoryStore,
    pub service: MigrationService,
    pub jobs: UnboundedReceiver<ScheduledJob>,
}

impl Harness {
    /// Part jobs handed to the local queue so far. Status jobs are
    /// re-armed on a timer and driven explicitly by the tests.
    pub fn part_jobs(&mut self) -> Vec<ScheduledJob> {
        let mut jobs = Vec::new();
        while let Ok(job) = self.jobs.try_recv() {
            if matches!(job.message, JobMessage::MigratePart { .. }) {
                jobs.push(job);
            }
        }
        jobs
    }
}

pub fn settings() -> MigrationSettings {
    MigrationSettings {
        batch_status_cycle: Duration::from_millis(20),
        ..MigrationSettings::default()
    }
}

pub async fn harness() -> Harness {
    let store = MemoryStore::new();
    let (queue, jobs) = LocalJobQueue::new();
    let service = MigrationService::with_store(
        store.clone(),
        Arc::new(queue),
        DelegateRegistry::default(),
        settings(),
    );
    Harness {
        store,
        service,
        jobs,
    }
}

pub async fn deploy(store: &MemoryStore, yaml: &str) -> String {
    store.deploy(parse_model(yaml).unwrap()).await
}

/// Instance with one active execution per `(execution id, activity id)`
/// directly under its root.
pub fn running(instance_id: &str, definition_id: &str, executions: &[(&str, &str)]) -> InstanceState {
    let mut instance = InstanceState::new(instance_id, definition_id);
    for (id, activity) in executions {
        instance
            .executions
            .push(ExecutionNode::at_activity(id.to_string(), instance_id, instance_id, activity));
    }
    instance
}

/// Instance of REVIEW_V1 with two elements of `review`, each at `check`.
pub fn reviewing(instance_id: &str, definition_id: &str) -> InstanceState {
    let mut instance = InstanceState::new(instance_id, definition_id);
    let mut root = ExecutionNode::scope("mi".to_string(), instance_id, instance_id, "review");
    root.multi_instance_root = true;
    instance.executions.push(root);
    for n in 1..=2 {
        let element = format!("el-{}", n);
        instance.executions.push(ExecutionNode::scope(element.clone(), instance_id, "mi", "review"));
        instance.executions.push(ExecutionNode::at_activity(
            format!("c-{}", n),
            instance_id,
            &element,
            "check",
        ));
    }
    instance
}

/// Instance repository whose instances always change between read and commit.
pub struct RacingStore(pub MemoryStore);

#[async_trait]
impl InstanceRepository for RacingStore {
    async fn load_instance(&self, instance_id: &str) -> AppResult<InstanceState> {
        let instance = self.0.load_instance(instance_id).await?;
        self.0.bump_revision(instance_id).await;
        Ok(instance)
    }

    async fn instance_ids_of_definition(&self, definition_id: &str) -> AppResult<Vec<String>> {
        self.0.instance_ids_of_definition(definition_id).await
    }

    async fn find_sub_process_instance(
        &self,
        call_activity_execution_id: &str,
    ) -> AppResult<Option<String>> {
        self.0.find_sub_process_instance(call_activity_execution_id).await
    }

    async fn commit(&self, writes: &PendingWrites) -> AppResult<()> {
        self.0.commit(writes).await
    }
}

/// Service over `store` whose commits always hit a concurrent change.
pub fn racing_service(store: &MemoryStore, scheduler: Arc<dyn JobScheduler>) -> MigrationService {
    MigrationService::new(
        Arc::new(store.clone()),
        Arc::new(RacingStore(store.clone())),
        Arc::new(store.clone()),
        scheduler,
        DelegateRegistry::default(),
        settings(),
    )
}
