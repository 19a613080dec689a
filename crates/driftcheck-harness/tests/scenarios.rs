//! End-to-end runs against the in-memory provider.

mod common;

use std::time::Duration;

use common::{fast_config, harness, harness_with};
use driftcheck_harness::{
    Assertion, Harness, HarnessError, Phase, RunStatus, SequencerState, Step, StepFailure,
    TeardownOutcome, TestCase,
};
use driftcheck_memory::{DeletionBehavior, Fault, InMemoryProvider, MemoryProviderOptions};
use driftcheck_provider::{CallKind, CallOutcome, ObservedState, ProviderError, ResourceId};
use serde_json::{Value, json};

/// Simulates a provider that silently keeps only the first tag.
fn keep_first_tag(_: &ResourceId, mut document: Value) -> Value {
    if let Some(tags) = document.get_mut("tags").and_then(Value::as_object_mut) {
        let first = tags.iter().next().map(|(k, v)| (k.clone(), v.clone()));
        tags.clear();
        if let Some((key, value)) = first {
            tags.insert(key, value);
        }
    }
    document
}

#[tokio::test(start_paused = true)]
async fn single_step_passes_and_confirms_absence() {
    let (harness, journal) = harness(MemoryProviderOptions::default());
    let id = ResourceId::new("scenario-a");

    let result = harness
        .run(TestCase::new(id.clone()).step(
            Step::new(json!({ "replicas": 3 })).check(Assertion::equals("replicas", "3")),
        ))
        .await
        .unwrap();

    assert!(result.is_success(), "{:?}", result.failure_messages());
    assert!(result.failure_messages().is_empty());
    assert_eq!(result.steps_passed, 1);
    assert_eq!(result.teardown, TeardownOutcome::Verified { attempts: 1 });
    assert_eq!(
        result.transitions,
        vec![
            SequencerState::Idle,
            SequencerState::Applying(1),
            SequencerState::Verifying(1),
            SequencerState::Advancing(1),
            SequencerState::TornDown,
        ]
    );
    assert_eq!(
        result.last_observed.as_ref().and_then(|s| s.get("replicas")),
        Some("3")
    );
    assert_eq!(journal.count(CallKind::Destroy, &id), 1);
    assert!(harness.provider().inner().is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropped_tag_fails_second_step_and_still_tears_down() {
    let (harness, journal) =
        harness(MemoryProviderOptions::default().with_transform(keep_first_tag));
    let id = ResourceId::new("scenario-b");

    let result = harness
        .run(
            TestCase::new(id.clone())
                .step(Step::new(json!({ "tags": { "env": "prod" } })).check(Assertion::count("tags", 1)))
                .step(
                    Step::new(json!({ "tags": { "env": "prod", "owner": "team" } }))
                        .check(Assertion::count("tags", 2)),
                ),
        )
        .await
        .unwrap();

    assert_eq!(result.status(), RunStatus::Failed);
    assert_eq!(result.failed_step(), Some(2));
    assert_eq!(result.steps_passed, 1);
    let failures = result.assertion_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].key.as_deref(), Some("tags"));
    assert_eq!(failures[0].expected, "2");
    assert_eq!(failures[0].actual.as_deref(), Some("1"));

    assert!(result.teardown.is_verified());
    assert_eq!(journal.count(CallKind::Destroy, &id), 1);
    assert!(!harness.provider().inner().contains(&id));
}

#[tokio::test(start_paused = true)]
async fn apply_failure_skips_verification() {
    let (harness, journal) = harness(MemoryProviderOptions::default());
    let id = ResourceId::new("scenario-c");
    harness.provider().inner().inject(Fault::once(
        CallKind::Apply,
        ProviderError::rejected("InvalidParameterCombination"),
    ));

    let result = harness
        .run(TestCase::new(id.clone()).step(
            Step::new(json!({ "replicas": 3 })).check(Assertion::equals("replicas", 3)),
        ))
        .await
        .unwrap();

    assert_eq!(
        result.step_failure,
        Some(StepFailure::Apply {
            step: 1,
            error: ProviderError::rejected("InvalidParameterCombination"),
        })
    );
    assert_eq!(result.steps_applied, 0);

    let kinds: Vec<_> = journal.calls_for(&id).into_iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![CallKind::Apply, CallKind::Destroy, CallKind::Fetch]);
    let destroy = &journal.calls_for(&id)[1];
    assert_eq!(destroy.outcome, CallOutcome::NotFound);
    assert!(result.teardown.is_verified());
}

#[tokio::test(start_paused = true)]
async fn stuck_deletion_is_unverified_even_when_steps_pass() {
    let (harness, _) =
        harness(MemoryProviderOptions::default().with_deletion(DeletionBehavior::Never));
    let id = ResourceId::new("scenario-d");

    let result = harness
        .run(TestCase::new(id.clone()).step(
            Step::new(json!({ "replicas": 1 })).check(Assertion::present("replicas")),
        ))
        .await
        .unwrap();

    assert!(result.step_failure.is_none());
    assert_eq!(result.steps_passed, 1);
    match &result.teardown {
        TeardownOutcome::Unverified { id: leaked, attempts, .. } => {
            assert_eq!(leaked, &id);
            assert_eq!(*attempts, 5);
        }
        other => panic!("unexpected teardown outcome: {other:?}"),
    }
    assert_eq!(result.status(), RunStatus::Failed);
    assert!(result.failure_messages()[0].contains("may be leaked"));
}

#[tokio::test(start_paused = true)]
async fn slow_deletion_is_polled_until_gone() {
    let (harness, _) = harness(
        MemoryProviderOptions::default().with_deletion(DeletionBehavior::AfterFetches(3)),
    );

    let result = harness
        .run(TestCase::new("slow-delete").step(Step::new(json!({ "replicas": 1 }))))
        .await
        .unwrap();

    assert_eq!(result.teardown, TeardownOutcome::Verified { attempts: 4 });
    assert!(result.is_success());
}

#[tokio::test(start_paused = true)]
async fn failing_step_stops_the_sequence() {
    let mut config = fast_config();
    config.verify.await_convergence = false;
    let (harness, journal) = harness_with(MemoryProviderOptions::default(), config);
    let id = ResourceId::new("early-abort");

    let result = harness
        .run(
            TestCase::new(id.clone())
                .step(Step::new(json!({ "replicas": 1 })).check(Assertion::equals("replicas", 1)))
                .step(Step::new(json!({ "replicas": 2 })).check(Assertion::equals("replicas", 3)))
                .step(Step::new(json!({ "replicas": 3 })).check(Assertion::equals("replicas", 3))),
        )
        .await
        .unwrap();

    assert_eq!(result.failed_step(), Some(2));
    assert_eq!(result.steps_applied, 2);
    assert_eq!(journal.count(CallKind::Apply, &id), 2);
    assert_eq!(journal.count(CallKind::Destroy, &id), 1);
    assert!(!result.transitions.contains(&SequencerState::Applying(3)));
    assert_eq!(
        result.transitions[result.transitions.len() - 2..],
        [SequencerState::Failed(2), SequencerState::TornDown]
    );
}

#[tokio::test(start_paused = true)]
async fn every_violated_assertion_is_reported() {
    let mut config = fast_config();
    config.verify.await_convergence = false;
    let (harness, _) = harness_with(MemoryProviderOptions::default(), config);

    let result = harness
        .run(TestCase::new("all-failures").step(
            Step::new(json!({ "replicas": 1, "engine": "aurora-mysql" })).checks([
                Assertion::equals("replicas", 2),
                Assertion::equals("engine", "aurora-mysql"),
                Assertion::present("endpoint"),
                Assertion::matches("engine", "^aurora-postgresql").unwrap(),
            ]),
        ))
        .await
        .unwrap();

    let keys: Vec<_> = result
        .assertion_failures()
        .iter()
        .map(|f| f.key.clone().unwrap_or_default())
        .collect();
    assert_eq!(keys, vec!["replicas", "endpoint", "engine"]);
}

#[tokio::test(start_paused = true)]
async fn lagging_reads_converge_within_budget() {
    let (harness, journal) = harness(MemoryProviderOptions::default().with_visibility_lag(2));
    let id = ResourceId::new("lagging");

    let result = harness
        .run(
            TestCase::new(id.clone())
                .step(Step::new(json!({ "replicas": 1 })).check(Assertion::equals("replicas", 1)))
                .step(Step::new(json!({ "replicas": 2 })).check(Assertion::equals("replicas", 2))),
        )
        .await
        .unwrap();

    assert!(result.is_success(), "{:?}", result.failure_messages());
    // one fetch for step 1, three for step 2 (two stale), one for teardown
    assert_eq!(journal.count(CallKind::Fetch, &id), 5);
}

#[tokio::test(start_paused = true)]
async fn without_convergence_a_stale_read_fails() {
    let mut config = fast_config();
    config.verify.await_convergence = false;
    let (harness, _) = harness_with(MemoryProviderOptions::default().with_visibility_lag(1), config);

    let result = harness
        .run(
            TestCase::new("no-convergence")
                .step(Step::new(json!({ "replicas": 1 })))
                .step(Step::new(json!({ "replicas": 2 })).check(Assertion::equals("replicas", 2))),
        )
        .await
        .unwrap();

    assert_eq!(result.failed_step(), Some(2));
    assert_eq!(result.assertion_failures()[0].actual.as_deref(), Some("1"));
}

#[tokio::test(start_paused = true)]
async fn absence_while_verifying_is_not_an_assertion_failure() {
    let (harness, _) = harness(MemoryProviderOptions::default());
    let id = ResourceId::new("vanished");
    harness.provider().inner().inject(
        Fault::once(CallKind::Fetch, ProviderError::not_found(id.as_str())).for_resource(id.clone()),
    );

    let result = harness
        .run(TestCase::new(id.clone()).step(
            Step::new(json!({ "replicas": 1 })).check(Assertion::equals("replicas", 1)),
        ))
        .await
        .unwrap();

    assert_eq!(
        result.step_failure,
        Some(StepFailure::UnexpectedAbsence { step: 1, id })
    );
    assert!(result.assertion_failures().is_empty());
    assert!(result.teardown.is_verified());
}

#[tokio::test(start_paused = true)]
async fn transient_fetch_errors_are_retried() {
    let (harness, _) = harness(MemoryProviderOptions::default());
    harness
        .provider()
        .inner()
        .inject(Fault::once(CallKind::Fetch, ProviderError::throttled("Rate exceeded")).times(2));

    let result = harness
        .run(TestCase::new("throttled").step(
            Step::new(json!({ "replicas": 1 })).check(Assertion::equals("replicas", 1)),
        ))
        .await
        .unwrap();

    assert!(result.is_success(), "{:?}", result.failure_messages());
}

#[tokio::test(start_paused = true)]
async fn persistent_fetch_errors_surface_with_attempts() {
    let (harness, _) = harness(MemoryProviderOptions::default());
    let id = ResourceId::new("unreachable");
    harness.provider().inner().inject(
        Fault::once(CallKind::Fetch, ProviderError::connection("connection reset"))
            .for_resource(id.clone())
            .times(5),
    );

    let result = harness
        .run(TestCase::new(id.clone()).step(Step::new(json!({ "replicas": 1 }))))
        .await
        .unwrap();

    assert_eq!(
        result.step_failure,
        Some(StepFailure::AmbiguousFetch {
            step: 1,
            id,
            attempts: 5,
            error: ProviderError::connection("connection reset"),
            unconverged: vec![],
        })
    );
    assert!(result.teardown.is_verified());
}

#[tokio::test(start_paused = true)]
async fn fetch_errors_after_a_stale_read_keep_its_failures() {
    let (harness, _) = harness(MemoryProviderOptions::default().with_visibility_lag(1));
    let id = ResourceId::new("stale-then-unreachable");
    // step 1 and the first step-2 fetch succeed, every later verify fetch fails
    harness.provider().inner().inject(
        Fault::once(CallKind::Fetch, ProviderError::connection("connection reset"))
            .for_resource(id.clone())
            .after(2)
            .times(4),
    );

    let result = harness
        .run(
            TestCase::new(id.clone())
                .step(Step::new(json!({ "replicas": 1 })))
                .step(Step::new(json!({ "replicas": 2 })).check(Assertion::equals("replicas", 2))),
        )
        .await
        .unwrap();

    let Some(StepFailure::AmbiguousFetch {
        step,
        attempts,
        error,
        unconverged,
        ..
    }) = &result.step_failure
    else {
        panic!("expected an ambiguous fetch, got {:?}", result.step_failure);
    };
    assert_eq!((*step, *attempts), (2, 5));
    assert_eq!(error, &ProviderError::connection("connection reset"));
    assert_eq!(unconverged.len(), 1);
    assert_eq!(unconverged[0].actual.as_deref(), Some("1"));

    assert_eq!(result.assertion_failures().len(), 1);
    assert_eq!(
        result.last_observed.as_ref().and_then(|s| s.get("replicas")),
        Some("1")
    );
    assert!(result.teardown.is_verified());
}

#[tokio::test(start_paused = true)]
async fn run_deadline_interrupts_and_teardown_still_runs() {
    let mut config = fast_config();
    config.run.deadline_ms = 1_500;
    let (harness, journal) = harness_with(
        MemoryProviderOptions::default().with_latency(Duration::from_secs(1)),
        config,
    );
    let id = ResourceId::new("deadline");

    let result = harness
        .run(TestCase::new(id.clone()).step(Step::new(json!({ "replicas": 1 }))))
        .await
        .unwrap();

    assert_eq!(
        result.step_failure,
        Some(StepFailure::DeadlineExceeded {
            step: 1,
            phase: Phase::Verifying,
        })
    );
    assert_eq!(journal.count(CallKind::Destroy, &id), 1);
    assert_eq!(result.teardown, TeardownOutcome::Verified { attempts: 1 });
    assert!(!harness.provider().inner().contains(&id));
}

#[tokio::test(start_paused = true)]
async fn panicking_check_is_reported_and_torn_down() {
    let (harness, journal) = harness(MemoryProviderOptions::default());
    let id = ResourceId::new("panics");

    let result = harness
        .run(
            TestCase::new(id.clone())
                .step(Step::new(json!({ "replicas": 1 })))
                .step(
                    Step::new(json!({ "replicas": 2 }))
                        .check(Assertion::custom("explodes", |_: &ObservedState| panic!("boom"))),
                ),
        )
        .await
        .unwrap();

    assert_eq!(
        result.step_failure,
        Some(StepFailure::Panicked {
            step: 2,
            message: "boom".into(),
        })
    );
    assert_eq!(journal.count(CallKind::Destroy, &id), 1);
    assert!(result.teardown.is_verified());
}

#[tokio::test(start_paused = true)]
async fn failed_precheck_skips_without_touching_the_provider() {
    let (harness, journal) = harness(MemoryProviderOptions::default());

    let result = harness
        .run(
            TestCase::new("skipped")
                .precheck(|| Err("AWS_ACCESS_KEY_ID must be set".into()))
                .step(Step::new(json!({ "replicas": 1 }))),
        )
        .await
        .unwrap();

    assert_eq!(result.status(), RunStatus::Skipped);
    assert_eq!(result.skipped.as_deref(), Some("AWS_ACCESS_KEY_ID must be set"));
    assert_eq!(result.teardown, TeardownOutcome::NotRequired);
    assert!(journal.is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_runs_return_in_input_order() {
    let (harness, journal) = harness(
        MemoryProviderOptions::default().with_latency(Duration::from_millis(5)),
    );
    let ids: Vec<_> = (0..4).map(|i| ResourceId::new(format!("cluster-{i}"))).collect();
    let cases = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            TestCase::new(id.clone()).step(
                Step::new(json!({ "replicas": i })).check(Assertion::equals("replicas", i)),
            )
        })
        .collect();

    let results = harness.run_many(cases).await.unwrap();

    let returned: Vec<_> = results.iter().map(|r| r.id.clone()).collect();
    assert_eq!(returned, ids);
    assert!(results.iter().all(|r| r.is_success()));
    for id in &ids {
        assert_eq!(journal.count(CallKind::Destroy, id), 1);
    }
    assert!(harness.provider().inner().is_empty());
}

#[tokio::test]
async fn duplicate_ids_are_rejected_before_running() {
    let (harness, journal) = harness(MemoryProviderOptions::default());
    let cases = vec![
        TestCase::new("same").step(Step::new(json!({}))),
        TestCase::new("other").step(Step::new(json!({}))),
        TestCase::new("same").step(Step::new(json!({}))),
    ];

    let err = harness.run_many(cases).await.unwrap_err();
    assert!(matches!(err, HarnessError::DuplicateResourceId { id } if id.as_str() == "same"));
    assert!(journal.is_empty());
}

#[tokio::test(start_paused = true)]
async fn malformed_case_rejects_the_whole_batch_before_running() {
    let (harness, journal) = harness(
        MemoryProviderOptions::default().with_latency(Duration::from_millis(5)),
    );
    let cases = vec![
        TestCase::new("valid").step(Step::new(json!({ "replicas": 1 }))),
        TestCase::new("bad"),
    ];

    let err = harness.run_many(cases).await.unwrap_err();
    assert!(matches!(err, HarnessError::NoSteps { id } if id.as_str() == "bad"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(journal.is_empty());
    assert!(harness.provider().inner().is_empty());

    let cases = vec![
        TestCase::new("valid").step(Step::new(json!({ "replicas": 1 }))),
        TestCase::new("").step(Step::new(json!({}))),
    ];
    let err = harness.run_many(cases).await.unwrap_err();
    assert!(matches!(err, HarnessError::EmptyResourceId));
    assert!(journal.is_empty());
}

#[tokio::test]
async fn misuse_is_an_error() {
    let (harness, _) = harness(MemoryProviderOptions::default());

    let err = harness.run(TestCase::new("empty")).await.unwrap_err();
    assert!(matches!(err, HarnessError::NoSteps { .. }));

    let err = harness
        .run(TestCase::new("  ").step(Step::new(json!({}))))
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::EmptyResourceId));

    let mut config = fast_config();
    config.verify.max_attempts = 0;
    let err = Harness::new(std::sync::Arc::new(InMemoryProvider::new()), config)
        .err()
        .expect("invalid config");
    assert_eq!(
        err.to_string(),
        "Invalid configuration: verify.max_attempts must be > 0"
    );
}
