//! Aurora-style cluster lifecycle cases against a simulated cluster API.
//!
//! The simulated API reports absence with a provider-specific fault code,
//! computes endpoints on its own and lags one read behind every update.

mod common;

use common::harness;
use driftcheck_harness::{Assertion, RunResult, Step, TestCase};
use driftcheck_memory::MemoryProviderOptions;
use driftcheck_provider::{CallKind, CallOutcome, ResourceId};
use serde_json::{Value, json};

const NOT_FOUND_CODE: &str = "DBClusterNotFoundFault";

fn cluster_api() -> MemoryProviderOptions {
    MemoryProviderOptions::default()
        .with_not_found_code(NOT_FOUND_CODE)
        .with_visibility_lag(1)
        .with_transform(|id: &ResourceId, mut document: Value| {
            if let Some(obj) = document.as_object_mut() {
                obj.insert(
                    "reader_endpoint".into(),
                    json!(format!("{id}.cluster-ro-c1a2b3.us-west-2.rds.amazonaws.com")),
                );
                obj.entry("storage_encrypted").or_insert(json!(false));
                obj.entry("db_cluster_parameter_group_name")
                    .or_insert(json!("default.aurora5.6"));
                obj.remove("master_password");
            }
            document
        })
}

fn base_config() -> Value {
    json!({
        "availability_zones": ["us-west-2a", "us-west-2b", "us-west-2c"],
        "database_name": "mydb",
        "master_username": "foo",
        "master_password": "mustbeeightcharaters",
    })
}

fn with(mut config: Value, extra: Value) -> Value {
    if let (Some(target), Value::Object(extra)) = (config.as_object_mut(), extra) {
        target.extend(extra);
    }
    config
}

fn cluster_id() -> ResourceId {
    ResourceId::generate("tf-aurora-cluster")
}

fn assert_passed(result: &RunResult) {
    assert!(
        result.is_success(),
        "run for {} failed: {:#?}",
        result.id,
        result.failure_messages()
    );
}

#[tokio::test(start_paused = true)]
async fn basic() {
    let (harness, journal) = harness(cluster_api());
    let id = cluster_id();

    let case = TestCase::new(id.clone())
        .precheck(|| Ok(()))
        .step(
            Step::new(with(
                base_config(),
                json!({
                    "db_cluster_parameter_group_name": "default.aurora5.6",
                    "tags": { "Environment": "production" },
                }),
            ))
            .named("create")
            .check(Assertion::equals("storage_encrypted", "false"))
            .check(Assertion::equals(
                "db_cluster_parameter_group_name",
                "default.aurora5.6",
            ))
            .check(Assertion::present("reader_endpoint"))
            .check(Assertion::count("availability_zones", 3))
            .check(Assertion::absent("master_password")),
        );

    let result = harness.run(case).await.unwrap();
    assert_passed(&result);

    // teardown saw the provider-specific fault code and accepted it as absence
    let last = journal.calls_for(&id).pop().unwrap();
    assert_eq!(last.kind, CallKind::Fetch);
    assert_eq!(last.outcome, CallOutcome::NotFound);
}

#[tokio::test(start_paused = true)]
async fn update_tags() {
    let (harness, _) = harness(cluster_api());

    let case = TestCase::new(cluster_id())
        .step(
            Step::new(with(base_config(), json!({ "tags": { "Environment": "production" } })))
                .check(Assertion::equals("tags.%", "1")),
        )
        .step(
            Step::new(with(
                base_config(),
                json!({ "tags": { "Environment": "production", "AnotherTag": "test" } }),
            ))
            .check(Assertion::equals("tags.%", "2"))
            .check(Assertion::equals("tags.AnotherTag", "test")),
        );

    let result = harness.run(case).await.unwrap();
    assert_passed(&result);
    assert_eq!(result.steps_passed, 2);
}

#[tokio::test(start_paused = true)]
async fn kms_key() {
    let (harness, _) = harness(cluster_api());

    let case = TestCase::new(cluster_id()).step(
        Step::new(with(
            base_config(),
            json!({
                "storage_encrypted": true,
                "kms_key_id": "arn:aws:kms:us-west-2:123456789012:key/6a1b2c3d-0000-4000-8000-123456789abc",
            }),
        ))
        .check(Assertion::matches("kms_key_id", "^arn:aws:kms:").unwrap()),
    );

    assert_passed(&harness.run(case).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn encrypted() {
    let (harness, _) = harness(cluster_api());

    let case = TestCase::new(cluster_id()).step(
        Step::new(with(base_config(), json!({ "storage_encrypted": true })))
            .check(Assertion::equals("storage_encrypted", true))
            .check(Assertion::equals(
                "db_cluster_parameter_group_name",
                "default.aurora5.6",
            )),
    );

    assert_passed(&harness.run(case).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn backups_update() {
    let (harness, _) = harness(cluster_api());

    let case = TestCase::new(cluster_id())
        .step(
            Step::new(with(
                base_config(),
                json!({
                    "backup_retention_period": 5,
                    "preferred_backup_window": "07:00-09:00",
                    "preferred_maintenance_window": "tue:04:00-tue:04:30",
                }),
            ))
            .checks([
                Assertion::equals("preferred_backup_window", "07:00-09:00"),
                Assertion::equals("backup_retention_period", 5),
                Assertion::equals("preferred_maintenance_window", "tue:04:00-tue:04:30"),
            ]),
        )
        .step(
            Step::new(with(
                base_config(),
                json!({
                    "backup_retention_period": 10,
                    "preferred_backup_window": "03:00-09:00",
                    "preferred_maintenance_window": "wed:01:00-wed:01:30",
                    "apply_immediately": true,
                }),
            ))
            .checks([
                Assertion::equals("preferred_backup_window", "03:00-09:00"),
                Assertion::equals("backup_retention_period", "10"),
                Assertion::equals("preferred_maintenance_window", "wed:01:00-wed:01:30"),
            ]),
        );

    let result = harness.run(case).await.unwrap();
    assert_passed(&result);
    assert_eq!(
        result.last_observed.as_ref().and_then(|s| s.get("backup_retention_period")),
        Some("10")
    );
}

#[tokio::test(start_paused = true)]
async fn suite_runs_concurrently() {
    let (harness, _) = harness(cluster_api());

    let cases = (0..3)
        .map(|_| {
            TestCase::new(cluster_id()).step(
                Step::new(with(base_config(), json!({ "storage_encrypted": true })))
                    .check(Assertion::equals("storage_encrypted", true)),
            )
        })
        .collect();

    let results = harness.run_many(cases).await.unwrap();
    assert_eq!(results.len(), 3);
    results.iter().for_each(assert_passed);
    assert!(harness.provider().inner().is_empty());
}
