//! Synchronous instance and definition migration against the in-memory store.

mod common;

use std::sync::Arc;

use common::*;
use migration_control_plane::{
    batch::LocalJobQueue,
    migration::{ActivityMigrationMapping, MigrationDocument},
    ports::HistoryRefUpdate,
    runtime::{ExecutionNode, InstanceState},
    AppError,
};
use serde_json::json;

fn to(definition_id: &str, mappings: Vec<ActivityMigrationMapping>) -> MigrationDocument {
    mappings
        .into_iter()
        .fold(MigrationDocument::builder().migrate_to_definition_id(definition_id), |b, m| {
            b.add_mapping(m)
        })
        .build()
        .unwrap()
}

async fn orders(h: &Harness, executions: &[(&str, &str)]) -> (String, String) {
    let v1 = deploy(&h.store, ORDERS_V1).await;
    let v2 = deploy(&h.store, ORDERS_V2).await;
    h.store.insert_instance(running("pi-1", &v1, executions)).await;
    (v1, v2)
}

async fn stored(h: &Harness, instance_id: &str) -> InstanceState {
    h.store.instance(instance_id).await.unwrap()
}

#[tokio::test]
async fn test_renamed_task_moves_with_new_assignee() {
    let h = harness().await;
    let (_, v2) = orders(&h, &[("e1", "taskA"), ("e2", "taskC")]).await;
    let doc = to(
        &v2,
        vec![ActivityMigrationMapping::one_to_one("taskA", "taskB").with_new_assignee("kermit")],
    );

    assert!(h.service.validate_instance("pi-1", &doc).await.unwrap().is_empty());
    h.service.migrate_instance("pi-1", &doc).await.unwrap();

    let instance = stored(&h, "pi-1").await;
    assert_eq!(instance.definition_id, v2);
    assert_eq!(instance.active_activity_ids(), vec!["taskB", "taskC"]);
    assert_eq!(instance.revision, 2);
    let task_b = instance.executions.iter().find(|e| e.is_at("taskB")).unwrap();
    assert_eq!(task_b.assignee.as_deref(), Some("kermit"));
    assert!(instance.execution("e2").is_some());
}

#[tokio::test]
async fn test_history_points_at_the_new_definition() {
    let h = harness().await;
    let (_, v2) = orders(&h, &[("e1", "taskA")]).await;
    let doc = to(&v2, vec![ActivityMigrationMapping::one_to_one("taskA", "taskB")]);

    h.service.migrate_instance("pi-1", &doc).await.unwrap();

    assert_eq!(
        h.store.history_updates().await,
        vec![HistoryRefUpdate {
            instance_id: "pi-1".to_string(),
            definition_id: v2,
        }]
    );
}

#[tokio::test]
async fn test_different_called_element_is_one_diagnostic() {
    let h = harness().await;
    let v1 = deploy(&h.store, CALLER_V1).await;
    let v2 = deploy(&h.store, CALLER_V2).await;
    let proc_a = deploy(&h.store, PROC_A).await;
    deploy(&h.store, PROC_B).await;

    let mut parent = running("pi-1", &v1, &[("cx", "callX")]);
    parent.executions[1].sub_process_instance_id = Some("sub-1".to_string());
    let mut child = running("sub-1", &proc_a, &[("a1", "aTask")]);
    child.parent_instance_id = Some("pi-1".to_string());
    child.super_execution_id = Some("cx".to_string());
    h.store.insert_instance(parent).await;
    h.store.insert_instance(child).await;

    let doc = to(&v2, vec![]);
    let found = h.service.validate_instance("pi-1", &doc).await.unwrap();
    assert_eq!(found.len(), 1, "{:?}", found);
    assert!(found[0].activity_ids.contains(&"callX".to_string()));
    assert!(found[0].message.contains("different called element"));

    let err = h.service.migrate_instance("pi-1", &doc).await.unwrap_err();
    assert!(matches!(err, AppError::Migration(_)));
    assert_eq!(stored(&h, "pi-1").await.definition_id, v1);
    assert!(h.store.instance("sub-1").await.is_some());
}

#[tokio::test]
async fn test_migrating_to_the_same_definition_changes_nothing() {
    let h = harness().await;
    let (v1, _) = orders(&h, &[("e1", "taskA"), ("e2", "taskC")]).await;
    let before = stored(&h, "pi-1").await;
    let doc = to(&v1, vec![]);

    assert!(h.service.validate_instance("pi-1", &doc).await.unwrap().is_empty());
    h.service.migrate_instance("pi-1", &doc).await.unwrap();

    let after = stored(&h, "pi-1").await;
    assert_eq!(after.definition_id, v1);
    assert_eq!(after.active_activity_ids(), before.active_activity_ids());
    assert_eq!(after.executions, before.executions);
}

#[tokio::test]
async fn test_explicit_mapping_beats_auto_mapping() {
    let h = harness().await;
    let (_, v2) = orders(&h, &[("e1", "taskC")]).await;
    let doc = to(&v2, vec![ActivityMigrationMapping::one_to_one("taskC", "taskB")]);

    h.service.migrate_instance("pi-1", &doc).await.unwrap();

    assert_eq!(stored(&h, "pi-1").await.active_activity_ids(), vec!["taskB"]);
}

#[tokio::test]
async fn test_every_running_activity_must_be_covered() {
    let h = harness().await;
    let (v1, v2) = orders(&h, &[("e1", "taskA"), ("e2", "legacy")]).await;

    let partial = to(&v2, vec![ActivityMigrationMapping::one_to_one("taskA", "taskB")]);
    let found = h.service.validate_instance("pi-1", &partial).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].activity_ids, vec!["legacy"]);

    let err = h.service.migrate_instance("pi-1", &partial).await.unwrap_err();
    assert!(matches!(err, AppError::Migration(_)));
    let untouched = stored(&h, "pi-1").await;
    assert_eq!(untouched.definition_id, v1);
    assert_eq!(untouched.revision, 1);

    let complete = to(
        &v2,
        vec![
            ActivityMigrationMapping::one_to_one("taskA", "taskB"),
            ActivityMigrationMapping::one_to_one("legacy", "taskC"),
        ],
    );
    h.service.migrate_instance("pi-1", &complete).await.unwrap();
    let migrated = stored(&h, "pi-1").await;
    assert_eq!(migrated.active_activity_ids(), vec!["taskB", "taskC"]);
    assert_eq!(migrated.active_executions().count(), 2);
}

#[tokio::test]
async fn test_multi_instance_children_move_only_with_their_container() {
    let h = harness().await;
    let v1 = deploy(&h.store, REVIEW_V1).await;
    let v2 = deploy(&h.store, REVIEW_V2).await;
    h.store.insert_instance(reviewing("pi-1", &v1)).await;
    let before = stored(&h, "pi-1").await;

    let individual = to(&v2, vec![ActivityMigrationMapping::one_to_one("check", "archive")]);
    let found = h.service.validate_instance("pi-1", &individual).await.unwrap();
    assert_eq!(found.len(), 1);
    assert!(found[0].message.contains("cannot be mapped individually"));
    assert!(h.service.migrate_instance("pi-1", &individual).await.is_err());
    assert_eq!(stored(&h, "pi-1").await.executions, before.executions);

    h.service.migrate_instance("pi-1", &to(&v2, vec![])).await.unwrap();
    let after = stored(&h, "pi-1").await;
    assert_eq!(after.definition_id, v2);
    assert_eq!(after.executions, before.executions);
}

#[tokio::test]
async fn test_concurrent_change_is_a_conflict() {
    let h = harness().await;
    let (v1, v2) = orders(&h, &[("e1", "taskA")]).await;
    let (queue, _jobs) = LocalJobQueue::new();
    let service = racing_service(&h.store, Arc::new(queue));
    let doc = to(&v2, vec![ActivityMigrationMapping::one_to_one("taskA", "taskB")]);

    let err = service.migrate_instance("pi-1", &doc).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(stored(&h, "pi-1").await.definition_id, v1);
}

#[tokio::test]
async fn test_variables_and_post_hook_are_applied() {
    let h = harness().await;
    let (_, v2) = orders(&h, &[("e1", "taskA")]).await;
    let doc = MigrationDocument::builder()
        .migrate_to_definition_id(&v2)
        .add_mapping(ActivityMigrationMapping::one_to_one("taskA", "taskB"))
        .process_variable("region", json!("emea"))
        .post_upgrade_script("rhai", "let migrated = true;")
        .build()
        .unwrap();

    h.service.migrate_instance("pi-1", &doc).await.unwrap();

    let instance = stored(&h, "pi-1").await;
    assert_eq!(instance.variables["region"], json!("emea"));
    assert_eq!(instance.variables["migrated"], json!(true));
}

#[tokio::test]
async fn test_missing_target_definition_is_not_found() {
    let h = harness().await;
    orders(&h, &[("e1", "taskA")]).await;
    let doc = to("orders:9", vec![]);

    let err = h.service.migrate_instance("pi-1", &doc).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_definition_validation_prefixes_instance_ids() {
    let h = harness().await;
    let (v1, v2) = orders(&h, &[("e1", "taskA")]).await;
    h.store.insert_instance(running("pi-2", &v1, &[("e1", "legacy")])).await;
    let doc = to(&v2, vec![ActivityMigrationMapping::one_to_one("taskA", "taskB")]);

    let found = h.service.validate_definition(&v1, &doc).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].instance_id, "pi-2");
    assert!(found[0].message.starts_with("Process instance 'pi-2'"));
}

#[tokio::test]
async fn test_definition_migration_respects_instance_filter() {
    let h = harness().await;
    let (v1, v2) = orders(&h, &[("e1", "taskA")]).await;
    h.store.insert_instance(running("pi-2", &v1, &[("e1", "legacy")])).await;
    let doc = MigrationDocument::builder()
        .migrate_to_definition_id(&v2)
        .instance_ids(["pi-1"])
        .add_mapping(ActivityMigrationMapping::one_to_one("taskA", "taskB"))
        .build()
        .unwrap();

    assert_eq!(h.service.migrate_definition(&v1, &doc).await.unwrap(), 1);
    assert_eq!(stored(&h, "pi-1").await.definition_id, v2);
    assert_eq!(stored(&h, "pi-2").await.definition_id, v1);
}

const ENTRY_V1: &str = r#"
key: entry
version: 1
activities:
  - { id: taskA, type: user_task }
"#;

/// The called process is chosen by the instance variable `childKey`.
const ENTRY_V2: &str = r#"
key: entry
version: 2
activities:
  - { id: callY, type: call_activity, calledElement: "${childKey}" }
"#;

const CHILD_V1: &str = r#"
key: child
version: 1
activities:
  - { id: subTask, type: user_task }
"#;

const CHILD_V2: &str = r#"
key: child
version: 2
activities:
  - { id: subTask, type: user_task }
  - { id: review, type: user_task }
"#;

async fn entering_call_activity(h: &Harness, version: Option<i32>) -> (String, InstanceState) {
    let v1 = deploy(&h.store, ENTRY_V1).await;
    let v2 = deploy(&h.store, ENTRY_V2).await;
    deploy(&h.store, CHILD_V1).await;
    deploy(&h.store, CHILD_V2).await;

    let mut instance = running("pi-1", &v1, &[("e1", "taskA")]);
    instance.variables.insert("childKey".to_string(), json!("child"));
    h.store.insert_instance(instance).await;

    let doc = to(
        &v2,
        vec![ActivityMigrationMapping::one_to_one("taskA", "subTask").in_call_activity("callY", version)],
    );
    assert!(h.service.validate_instance("pi-1", &doc).await.unwrap().is_empty());
    h.service.migrate_instance("pi-1", &doc).await.unwrap();

    let root = stored(h, "pi-1").await;
    let sub_id = root
        .executions
        .iter()
        .find(|e| e.is_at("callY"))
        .and_then(|e| e.sub_process_instance_id.clone())
        .unwrap();
    (v2, h.store.instance(&sub_id).await.unwrap())
}

#[tokio::test]
async fn test_mapping_into_call_activity_uses_pinned_version() {
    let h = harness().await;
    let (v2, sub) = entering_call_activity(&h, Some(1)).await;

    let root = stored(&h, "pi-1").await;
    assert_eq!(root.definition_id, v2);
    assert_eq!(root.active_activity_ids(), vec!["callY"]);

    assert_eq!(sub.definition_id, "child:1");
    assert_eq!(sub.parent_instance_id.as_deref(), Some("pi-1"));
    assert_eq!(sub.active_activity_ids(), vec!["subTask"]);
}

#[tokio::test]
async fn test_mapping_into_call_activity_defaults_to_latest_version() {
    let h = harness().await;
    let (_, sub) = entering_call_activity(&h, None).await;

    assert_eq!(sub.definition_id, "child:2");
    assert_eq!(sub.active_activity_ids(), vec!["subTask"]);
}

#[tokio::test]
async fn test_unknown_called_version_is_a_diagnostic() {
    let h = harness().await;
    let v1 = deploy(&h.store, ENTRY_V1).await;
    let v2 = deploy(&h.store, ENTRY_V2).await;
    deploy(&h.store, CHILD_V1).await;
    let mut instance = running("pi-1", &v1, &[("e1", "taskA")]);
    instance.variables.insert("childKey".to_string(), json!("child"));
    h.store.insert_instance(instance).await;

    let doc = to(
        &v2,
        vec![ActivityMigrationMapping::one_to_one("taskA", "subTask").in_call_activity("callY", Some(7))],
    );
    let found = h.service.validate_instance("pi-1", &doc).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].activity_ids, vec!["callY"]);
    assert!(found[0].message.contains("version 7"));
    assert!(h.service.migrate_instance("pi-1", &doc).await.is_err());
    assert_eq!(stored(&h, "pi-1").await.definition_id, v1);
}

const SPLIT_V1: &str = r#"
key: split
version: 1
activities:
  - { id: start, type: start_event }
  - { id: taskA, type: user_task }
"#;

const SPLIT_V2: &str = r#"
key: split
version: 2
activities:
  - { id: start, type: start_event }
  - { id: taskB, type: user_task }
  - { id: sub1, type: sub_process }
  - { id: inner, type: user_task, parent: sub1 }
  - { id: timer, type: boundary_event, parent: sub1, attachedTo: inner }
"#;

#[tokio::test]
async fn test_one_to_many_mapping_fans_out() {
    let h = harness().await;
    let v1 = deploy(&h.store, SPLIT_V1).await;
    let v2 = deploy(&h.store, SPLIT_V2).await;
    h.store.insert_instance(running("pi-1", &v1, &[("e1", "taskA")])).await;

    let doc = to(&v2, vec![ActivityMigrationMapping::one_to_many("taskA", ["taskB", "inner"])]);
    assert!(h.service.validate_instance("pi-1", &doc).await.unwrap().is_empty());
    h.service.migrate_instance("pi-1", &doc).await.unwrap();

    let instance = stored(&h, "pi-1").await;
    assert_eq!(instance.active_activity_ids(), vec!["inner", "taskB", "timer"]);
    assert!(instance.execution("e1").is_none());
    let inner = instance.executions.iter().find(|e| e.is_at("inner")).unwrap();
    let scope = instance.execution(inner.parent_id.as_deref().unwrap()).unwrap();
    assert!(scope.is_at("sub1"));
    assert!(scope.is_scope);
}

const FANOUT_V1: &str = r#"
key: fanout
version: 1
activities:
  - { id: callX, type: call_activity, calledElement: procA, multiInstance: { cardinality: "2" } }
"#;

const FANOUT_V2: &str = r#"
key: fanout
version: 2
activities:
  - { id: taskP, type: user_task }
"#;

#[tokio::test]
async fn test_children_of_multi_instance_call_activity_move_to_parent() {
    let h = harness().await;
    let v1 = deploy(&h.store, FANOUT_V1).await;
    let v2 = deploy(&h.store, FANOUT_V2).await;
    let proc_a = deploy(&h.store, PROC_A).await;

    let mut parent = InstanceState::new("pi-1", &v1);
    let mut mi = ExecutionNode::scope("mi".to_string(), "pi-1", "pi-1", "callX");
    mi.multi_instance_root = true;
    parent.executions.push(mi);
    for n in 1..=2 {
        let mut element = ExecutionNode::at_activity(format!("ca-{}", n), "pi-1", "mi", "callX");
        element.sub_process_instance_id = Some(format!("sub-{}", n));
        parent.executions.push(element);

        let child_id = format!("sub-{}", n);
        let task_id = format!("a-{}", n);
        let mut child = running(&child_id, &proc_a, &[(task_id.as_str(), "aTask")]);
        child.parent_instance_id = Some("pi-1".to_string());
        child.super_execution_id = Some(format!("ca-{}", n));
        h.store.insert_instance(child).await;
    }
    h.store.insert_instance(parent).await;

    let doc = to(
        &v2,
        vec![ActivityMigrationMapping::one_to_one("aTask", "taskP").to_parent_process("callX")],
    );
    assert!(h.service.validate_instance("pi-1", &doc).await.unwrap().is_empty());
    h.service.migrate_instance("pi-1", &doc).await.unwrap();

    let instance = stored(&h, "pi-1").await;
    assert_eq!(instance.definition_id, v2);
    assert_eq!(instance.active_executions().filter(|e| e.is_at("taskP")).count(), 2);
    assert!(instance.executions.iter().all(|e| !e.is_at("callX")));
    assert!(h.store.instance("sub-1").await.is_none());
    assert!(h.store.instance("sub-2").await.is_none());
}

#[tokio::test]
async fn test_parent_and_call_activity_targets_on_one_mapping_are_rejected() {
    let json = json!({
        "moveToProcessDefinitionId": "caller:2",
        "activityMappings": [{
            "fromActivityId": "aTask",
            "toActivityId": "bTask",
            "toCallActivityId": "callX",
            "toParentProcess": true,
            "fromCallActivityId": "callX"
        }]
    });
    let err = MigrationDocument::from_json(&json.to_string()).unwrap_err();
    assert!(matches!(err, AppError::Config(_)));

    let built = MigrationDocument::builder()
        .migrate_to_definition_id("caller:2")
        .add_mapping(
            ActivityMigrationMapping::one_to_one("aTask", "bTask")
                .in_call_activity("callX", None)
                .to_parent_process("callX"),
        )
        .build();
    assert!(matches!(built, Err(AppError::Config(_))));
}
