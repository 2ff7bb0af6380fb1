//! Completion-audit scenarios over real loop output: reproducible
//! verdicts, a skipped verification phase, and a failed run.

use std::sync::Arc;

use chrono::Utc;
use greenlight_integration::helpers::{default_checks, temp_workspace, TestControlPlane};
use greenlight_storage::PipelineStore;
use greenlight_types::{PipelineId, StageStatus};
use greenlight_verifier::{ScriptedChecker, ScriptedRepair, VerifierConfig};

#[tokio::test]
async fn verdicts_are_reproducible_for_unchanged_state() {
    let plane = TestControlPlane::new();
    let id = PipelineId::new("recipe-box-1");
    plane.run_generative_stages(&id, default_checks()).await;

    let looper = plane.verifier(
        Arc::new(ScriptedChecker::passing()),
        Arc::new(ScriptedChecker::passing()),
        Arc::new(ScriptedRepair::declining("unused")),
        VerifierConfig::default(),
    );
    let (_dir, workspace) = temp_workspace();
    looper.run(&id, &workspace).await.unwrap();

    let first = plane.auditor.audit(&id).await.unwrap();
    let second = plane.auditor.audit(&id).await.unwrap();
    assert!(first.complete);
    assert_eq!(first.content_hash(), second.content_hash());
}

#[tokio::test]
async fn skipped_verification_cannot_audit_complete() {
    let plane = TestControlPlane::new();
    let id = PipelineId::new("recipe-box-1");
    plane.run_generative_stages(&id, default_checks()).await;

    // Force the terminal status without ever running the loop.
    plane
        .store
        .transition_stage(
            &id,
            &StageStatus::from("verifying"),
            &StageStatus::from("completed"),
            Some("rogue_stage"),
            None,
            Utc::now(),
        )
        .await
        .unwrap();

    let report = plane.auditor.audit(&id).await.unwrap();
    assert!(!report.complete);
    assert!(report
        .failures
        .iter()
        .any(|f| f.contains("no approved verification_report")));
    assert!(report
        .failures
        .iter()
        .any(|f| f.contains("no verification attempts")));
}

#[tokio::test]
async fn failed_run_is_reported_with_reasons() {
    let plane = TestControlPlane::new();
    let id = PipelineId::new("recipe-box-1");
    plane.run_generative_stages(&id, default_checks()).await;

    let looper = plane.verifier(
        Arc::new(ScriptedChecker::failing("home screen does not render")),
        Arc::new(ScriptedChecker::passing()),
        Arc::new(ScriptedRepair::declining("cannot repair rendering")),
        VerifierConfig::default(),
    );
    let (_dir, workspace) = temp_workspace();
    looper.run(&id, &workspace).await.unwrap();
    assert_eq!(plane.status(&id).await, "failed");

    let report = plane.auditor.audit(&id).await.unwrap();
    assert!(!report.complete);
    assert!(report
        .failures
        .iter()
        .any(|f| f.contains("completion requires completed")));
    assert!(report
        .failures
        .iter()
        .any(|f| f.contains("final verification attempt 1 failed")));
    assert!(report
        .failures
        .iter()
        .any(|f| f.contains("failing run")));
    assert!(plane
        .event_names(&id)
        .await
        .contains(&"completion_audited:not_complete".to_string()));
}
