mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use common::{count_kind, deregistered, eventually, fast_config, harness, reaches_phase};
use seedkeep_app::{SubmitRequest, TaskPhase};
use seedkeep_test_support::{
    EngineCall, ListenerEvent, RecordingListener, identity_from_seed, magnet_for,
    sample_identity, snapshot,
};
use seedkeep_torrent_core::{EngineState, RequesterId, TaskId, TorrentError};

fn request(task_id: u64, link: String) -> SubmitRequest {
    SubmitRequest::new(RequesterId(1), link, format!("/downloads/{task_id}"))
}

#[tokio::test]
async fn magnet_submission_starts_once_and_registers() -> Result<()> {
    let h = harness(fast_config())?;
    let listener = Arc::new(RecordingListener::new(1));
    let identity = sample_identity();

    let handle = h
        .orchestrator
        .submit(listener.clone(), request(1, magnet_for(&identity)))
        .await?;

    assert_eq!(handle.identity(), &identity);
    assert_eq!(handle.phase(), TaskPhase::Downloading);
    assert_eq!(listener.count(|event| *event == ListenerEvent::Started), 1);
    assert_eq!(
        h.engine.count_calls(|call| matches!(
            call,
            EngineCall::Submit { tag, paused: false } if tag == "1"
        )),
        1
    );
    assert!(h.orchestrator.registry().get(&identity).await.is_some());
    assert!(h.orchestrator.is_monitoring().await);
    assert_eq!(count_kind(&h.orchestrator, "task_started"), 1);
    assert_eq!(count_kind(&h.orchestrator, "status_refresh"), 1);
    assert_eq!(h.orchestrator.metrics().transitions("started"), 1);

    h.orchestrator.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn batch_members_skip_individual_status_refresh() -> Result<()> {
    let h = harness(fast_config())?;
    let listener = Arc::new(RecordingListener::new(1).with_multi_count(3));
    h.orchestrator
        .submit(listener, request(1, magnet_for(&sample_identity())))
        .await?;

    assert_eq!(count_kind(&h.orchestrator, "status_refresh"), 0);
    h.orchestrator.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn already_known_identity_is_rejected_before_submission() -> Result<()> {
    let h = harness(fast_config())?;
    let identity = sample_identity();
    h.engine
        .insert(snapshot(&identity, EngineState::StalledUpload, 1.0));
    let listener = Arc::new(RecordingListener::new(2));

    let result = h
        .orchestrator
        .submit(listener.clone(), request(2, magnet_for(&identity)))
        .await;

    assert!(matches!(result, Err(TorrentError::DuplicateTask { .. })));
    assert_eq!(h.engine.count_calls(|call| matches!(call, EngineCall::Submit { .. })), 0);
    assert_eq!(listener.errors().len(), 1);
    assert_eq!(h.orchestrator.admission().active_count(), 0);
    assert_eq!(count_kind(&h.orchestrator, "task_failed"), 1);
    Ok(())
}

#[tokio::test]
async fn failing_duplicate_lookup_does_not_block_submission() -> Result<()> {
    let h = harness(fast_config())?;
    let identity = sample_identity();
    h.engine.fail_next_list();

    let handle = h
        .orchestrator
        .submit(
            Arc::new(RecordingListener::new(3)),
            request(3, magnet_for(&identity)),
        )
        .await?;

    assert_eq!(handle.identity(), &identity);
    assert_eq!(h.orchestrator.metrics().engine_errors("list"), 1);
    h.orchestrator.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn rejected_submission_reports_engine_message() -> Result<()> {
    let h = harness(fast_config())?;
    h.engine.reject_next_submission("Fails.");
    let listener = Arc::new(RecordingListener::new(4));

    let result = h
        .orchestrator
        .submit(listener.clone(), request(4, magnet_for(&sample_identity())))
        .await;

    match result {
        Err(TorrentError::SubmissionRejected { message }) => assert_eq!(message, "Fails."),
        other => panic!("unexpected submission outcome: {other:?}"),
    }
    assert_eq!(listener.errors().len(), 1);
    assert_eq!(listener.count(|event| *event == ListenerEvent::Started), 0);
    assert!(h.orchestrator.registry().is_empty().await);
    assert_eq!(h.orchestrator.admission().active_count(), 0);
    assert!(!h.orchestrator.is_monitoring().await);
    Ok(())
}

#[tokio::test]
async fn invisible_submission_times_out_after_configured_attempts() -> Result<()> {
    let h = harness(fast_config())?;
    h.engine.hide_submissions();
    let listener = Arc::new(RecordingListener::new(5));
    let identity = sample_identity();

    let result = h
        .orchestrator
        .submit(listener.clone(), request(5, magnet_for(&identity)))
        .await;

    assert!(matches!(
        result,
        Err(TorrentError::SubmissionTimeout { attempts: 3 })
    ));
    // One pre-check lookup plus three polls.
    assert_eq!(
        h.engine
            .count_calls(|call| *call == EngineCall::List(Some(identity.clone()))),
        4
    );
    assert_eq!(listener.errors().len(), 1);
    Ok(())
}

#[tokio::test]
async fn remote_link_resolves_to_newest_engine_task() -> Result<()> {
    let h = harness(fast_config())?;
    let mut older = snapshot(&identity_from_seed(8), EngineState::StalledUpload, 1.0);
    older.added_at = Utc::now() - chrono::Duration::hours(1);
    h.engine.insert(older);
    let fresh = identity_from_seed(7);
    h.engine.set_url_identity(fresh.clone());

    let handle = h
        .orchestrator
        .submit(
            Arc::new(RecordingListener::new(6)),
            request(6, "https://example.org/releases/seven.torrent".to_string()),
        )
        .await?;

    assert_eq!(handle.identity(), &fresh);
    assert!(h.engine.count_calls(|call| *call == EngineCall::List(None)) >= 1);
    h.orchestrator.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn file_only_variant_rejects_magnets() -> Result<()> {
    let h = harness(fast_config())?;
    let listener = Arc::new(RecordingListener::new(7));

    let result = h
        .orchestrator
        .submit_file(listener.clone(), request(7, magnet_for(&sample_identity())))
        .await;

    assert!(matches!(
        result,
        Err(TorrentError::InvalidIdentity {
            reason: "not_a_torrent_file",
            ..
        })
    ));
    assert_eq!(listener.errors().len(), 1);
    assert!(h.engine.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn corrupt_torrent_file_fails_fast() -> Result<()> {
    let h = harness(fast_config())?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("broken.torrent");
    std::fs::write(&path, b"not bencode")?;
    let listener = Arc::new(RecordingListener::new(8));

    let result = h
        .orchestrator
        .submit(
            listener.clone(),
            request(8, path.to_string_lossy().into_owned()),
        )
        .await;

    assert!(matches!(result, Err(TorrentError::Metainfo { .. })));
    assert!(h.engine.calls().is_empty());
    assert_eq!(listener.errors().len(), 1);
    Ok(())
}

#[tokio::test]
async fn admission_queues_in_submission_order() -> Result<()> {
    let mut config = fast_config();
    config.admission.max_active = Some(1);
    let h = harness(config)?;
    let first = identity_from_seed(1);
    let second = identity_from_seed(2);
    let third = identity_from_seed(3);

    for (task_id, identity) in [(1, &first), (2, &second), (3, &third)] {
        h.orchestrator
            .submit(
                Arc::new(RecordingListener::new(task_id)),
                request(task_id, magnet_for(identity)),
            )
            .await?;
    }

    assert_eq!(h.orchestrator.admission().active_count(), 1);
    assert_eq!(h.orchestrator.admission().queued_count(), 2);
    assert_eq!(
        h.engine
            .count_calls(|call| matches!(call, EngineCall::Submit { paused: true, .. })),
        2
    );
    let phase = h.orchestrator.status(TaskId(2)).await.map(|handle| handle.phase());
    assert_eq!(phase, Some(TaskPhase::Queued));
    assert_eq!(count_kind(&h.orchestrator, "task_queued"), 2);

    // Finishing the first download hands its slot to the second task only.
    h.engine.set_state(&first, EngineState::Uploading, 1.0);
    assert!(reaches_phase(&h.orchestrator, TaskId(2), TaskPhase::Downloading).await);
    assert!(eventually(|| h.engine.count_calls(|call| *call == EngineCall::Resume(second.clone())) == 1).await);
    assert_eq!(
        h.engine
            .count_calls(|call| *call == EngineCall::Resume(third.clone())),
        0
    );
    assert_eq!(h.orchestrator.admission().queued_count(), 1);
    assert_eq!(count_kind(&h.orchestrator, "task_resumed"), 1);

    h.orchestrator.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn cancelling_a_queued_task_frees_its_place() -> Result<()> {
    let mut config = fast_config();
    config.admission.max_active = Some(1);
    let h = harness(config)?;
    let first = identity_from_seed(1);
    let second = identity_from_seed(2);
    let queued = Arc::new(RecordingListener::new(2));

    h.orchestrator
        .submit(Arc::new(RecordingListener::new(1)), request(1, magnet_for(&first)))
        .await?;
    h.orchestrator
        .submit(queued.clone(), request(2, magnet_for(&second)))
        .await?;
    assert!(h.orchestrator.cancel(TaskId(2)).await);

    assert_eq!(h.orchestrator.admission().queued_count(), 0);
    assert_eq!(queued.errors(), vec!["download stopped by user".to_string()]);
    assert!(h.engine.task(&second).is_none());

    h.engine.set_state(&first, EngineState::Uploading, 1.0);
    assert!(deregistered(&h.orchestrator, &first).await);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(
        h.engine
            .count_calls(|call| *call == EngineCall::Resume(second.clone())),
        0
    );
    assert_eq!(h.orchestrator.admission().active_count(), 0);
    h.orchestrator.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn cancel_during_submission_polling_refuses_registration() -> Result<()> {
    let mut config = fast_config();
    config.admission.max_active = Some(1);
    let h = harness(config)?;
    let identity = identity_from_seed(1);
    let listener = Arc::new(RecordingListener::new(1));
    h.engine.delay_lookups(Duration::from_millis(200));

    // The duplicate pre-check and the first visibility poll each take 200ms,
    // so the cancel lands after the engine accepted the task.
    let (submitted, cancelled) = tokio::join!(
        h.orchestrator
            .submit(listener.clone(), request(1, magnet_for(&identity))),
        async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            h.orchestrator.cancel(TaskId(1)).await
        }
    );

    assert!(cancelled);
    assert!(matches!(
        submitted,
        Err(TorrentError::Cancelled { task_id: TaskId(1) })
    ));
    assert_eq!(listener.errors(), vec!["download stopped by user".to_string()]);
    assert_eq!(listener.count(|event| *event == ListenerEvent::Started), 0);
    assert!(h.orchestrator.registry().is_empty().await);
    assert_eq!(
        h.engine.count_calls(|call| matches!(
            call,
            EngineCall::Remove { identity: removed, .. } if removed == &identity
        )),
        1
    );
    assert!(h.engine.task(&identity).is_none());
    assert_eq!(h.orchestrator.admission().active_count(), 0);
    assert_eq!(count_kind(&h.orchestrator, "task_started"), 0);
    assert_eq!(h.orchestrator.metrics().transitions("cancelled"), 1);

    // The freed slot goes to the next submission, which starts unpaused.
    h.engine.delay_lookups(Duration::ZERO);
    let next = identity_from_seed(2);
    let handle = h
        .orchestrator
        .submit(Arc::new(RecordingListener::new(2)), request(2, magnet_for(&next)))
        .await?;
    assert_eq!(handle.phase(), TaskPhase::Downloading);
    assert_eq!(h.orchestrator.admission().active_count(), 1);
    assert_eq!(h.orchestrator.admission().queued_count(), 0);
    assert_eq!(
        h.engine
            .count_calls(|call| matches!(call, EngineCall::Submit { tag, paused: false } if tag == "2")),
        1
    );

    h.orchestrator.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn cancel_of_unknown_task_reports_false() -> Result<()> {
    let h = harness(fast_config())?;
    assert!(!h.orchestrator.cancel(TaskId(42)).await);
    assert_eq!(h.orchestrator.metrics().transitions("cancelled"), 0);
    Ok(())
}

#[tokio::test]
async fn queued_task_withdrawn_from_admission_is_stopped() -> Result<()> {
    let mut config = fast_config();
    config.admission.max_active = Some(1);
    let h = harness(config)?;
    let first = identity_from_seed(1);
    let second = identity_from_seed(2);
    let queued = Arc::new(RecordingListener::new(2));

    h.orchestrator
        .submit(Arc::new(RecordingListener::new(1)), request(1, magnet_for(&first)))
        .await?;
    h.orchestrator
        .submit(queued.clone(), request(2, magnet_for(&second)))
        .await?;
    assert_eq!(h.orchestrator.admission().queued_count(), 1);

    // Dropping the waiter closes its ticket without a slot.
    h.orchestrator.admission().cancel(TaskId(2));

    assert!(deregistered(&h.orchestrator, &second).await);
    assert!(
        queued
            .wait_for(common::WAIT, |event| matches!(event, ListenerEvent::Error { .. }))
            .await
    );
    assert_eq!(queued.errors(), vec!["download stopped by user".to_string()]);
    assert!(eventually(|| h.engine.task(&second).is_none()).await);
    assert_eq!(
        h.engine
            .count_calls(|call| *call == EngineCall::Resume(second.clone())),
        0
    );
    assert_eq!(h.orchestrator.admission().active_count(), 1);
    assert!(h.orchestrator.admission().is_active(TaskId(1)));

    h.orchestrator.shutdown().await;
    Ok(())
}
