//! Cancellation and mutual-exclusion scenarios: immediate abort of an
//! idle pipeline, a parked abort honored at the next attempt boundary,
//! and fail-fast refusal of a second writer.

use std::sync::Arc;

use greenlight_conductor::{AbortOutcome, ConductorError};
use greenlight_integration::helpers::{default_checks, temp_workspace, TestControlPlane};
use greenlight_storage::AttemptStore;
use greenlight_types::{PipelineId, StageStatus};
use greenlight_verifier::{ScriptedChecker, ScriptedRepair, VerificationOutcome, VerifierConfig};

#[tokio::test]
async fn aborting_an_idle_pipeline_is_immediate() {
    let plane = TestControlPlane::new();
    let id = PipelineId::new("recipe-box-1");
    plane.conductor.initialize(&id).await.unwrap();

    let outcome = plane
        .conductor
        .abort(&id, "product direction changed")
        .await
        .unwrap();
    assert_eq!(outcome, AbortOutcome::Aborted);
    assert_eq!(plane.status(&id).await, "aborted");
    assert!(plane
        .event_names(&id)
        .await
        .contains(&"pipeline_aborted".to_string()));
}

#[tokio::test]
async fn parked_abort_stops_the_next_verification_run() {
    let plane = TestControlPlane::new();
    let id = PipelineId::new("recipe-box-1");
    plane.run_generative_stages(&id, default_checks()).await;

    // A stage holds the lock, so the abort can only park.
    let guard = plane.conductor.lock(&id).unwrap();
    let outcome = plane
        .conductor
        .abort(&id, "customer cancelled the order")
        .await
        .unwrap();
    assert_eq!(outcome, AbortOutcome::Deferred);
    assert_eq!(plane.status(&id).await, "verifying");
    drop(guard);

    let looper = plane.verifier(
        Arc::new(ScriptedChecker::passing()),
        Arc::new(ScriptedChecker::passing()),
        Arc::new(ScriptedRepair::declining("unused")),
        VerifierConfig::default(),
    );
    let (_dir, workspace) = temp_workspace();

    let run = looper.run(&id, &workspace).await.unwrap();
    assert_eq!(
        run,
        VerificationOutcome::Aborted {
            reason: "customer cancelled the order".to_string()
        }
    );
    assert_eq!(plane.status(&id).await, "aborted");
    assert!(plane.store.list_attempts(&id).await.unwrap().is_empty());
    assert!(!plane.conductor.snapshot(&id).await.unwrap().locked);
}

#[tokio::test]
async fn second_writer_is_refused_while_locked() {
    let plane = TestControlPlane::new();
    let id = PipelineId::new("recipe-box-1");
    plane.conductor.initialize(&id).await.unwrap();

    let guard = plane.conductor.lock(&id).unwrap();
    assert!(plane.conductor.snapshot(&id).await.unwrap().locked);

    let refused = plane
        .conductor
        .transition(&id, &StageStatus::from("base_prompt_ready"), "prompt_writer")
        .await;
    assert!(matches!(refused, Err(ConductorError::LockViolation(_))));
    assert_eq!(plane.status(&id).await, "idea");

    drop(guard);
    assert!(!plane.conductor.snapshot(&id).await.unwrap().locked);
    plane
        .conductor
        .transition(&id, &StageStatus::from("base_prompt_ready"), "prompt_writer")
        .await
        .unwrap();
}
