//! ---
//! mb_section: "07-testing-qa"
//! mb_subsection: "integration-tests"
//! mb_type: "source"
//! mb_scope: "code"
//! mb_description: "Integration and validation tests for the M-BENCH stack."
//! mb_version: "v0.0.0-prealpha"
//! mb_owner: "tbd"
//! ---
//! Replaying a recorded log through the orchestrator's loopback transport.

use std::sync::Arc;
use std::time::{Duration, Instant};

use m_bench_common::config::EngineConfig;
use m_bench_messaging::Message;
use m_bench_orchestrator::Orchestrator;
use m_bench_replay::log::write_spaced_log;
use m_bench_replay::ReplaySession;
use tempfile::tempdir;

fn spaced_log(offsets_ms: &[u64]) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("replay.messages");
    let messages: Vec<(u64, Message)> = offsets_ms
        .iter()
        .map(|ms| (*ms, Message::text("replay/feed", format!("m{ms}"))))
        .collect();
    write_spaced_log(&path, &messages).unwrap();
    (dir, path)
}

#[tokio::test(flavor = "multi_thread")]
async fn double_speed_replay_halves_the_recorded_gaps() {
    let (_dir, path) = spaced_log(&[0, 1000, 2500]);

    let (orchestrator, _pump) = Orchestrator::with_loopback(EngineConfig::default());
    orchestrator.buffer().register("replay/#");

    let session = Arc::new(ReplaySession::new());
    assert_eq!(session.load(&path).unwrap(), 3);
    session.set_speed(2.0).unwrap();
    session.start();

    let started = Instant::now();
    let mut ready_at = Vec::new();
    for index in 0..session.message_count() {
        while !session.is_ready_to_publish(index) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        ready_at.push(started.elapsed());
        let record = session.next_message().unwrap();
        let message = Message::binary(record.topic, record.payload)
            .with_qos(record.qos)
            .with_retained(record.retained);
        orchestrator.route_inbound(message).await;
    }

    // Recorded gaps of 1000ms and 2500ms shrink to ~500ms and ~1250ms.
    assert!(ready_at[0] < Duration::from_millis(200), "{ready_at:?}");
    assert!(
        ready_at[1] >= Duration::from_millis(450) && ready_at[1] < Duration::from_millis(900),
        "{ready_at:?}"
    );
    assert!(
        ready_at[2] >= Duration::from_millis(1200) && ready_at[2] < Duration::from_millis(1800),
        "{ready_at:?}"
    );

    // Everything landed in the buffer, newest first.
    assert_eq!(orchestrator.buffer().count("replay/#"), 3);
    let buffered = orchestrator.buffer().query("replay/#");
    assert_eq!(buffered[0].payload_text(), "m2500");
    assert_eq!(buffered[2].payload_text(), "m0");
    orchestrator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn speed_change_mid_replay_only_affects_remaining_time() {
    let (_dir, path) = spaced_log(&[0, 600]);

    let session = ReplaySession::new();
    session.load(&path).unwrap();
    session.start();
    assert!(session.is_ready_to_publish(0));

    // Burn ~150ms of the 600ms gap at real time, then jump to x4: the
    // remaining ~450ms of virtual time should elapse in ~115ms of wall time.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!session.is_ready_to_publish(1));
    session.set_speed(4.0).unwrap();

    let started = Instant::now();
    while !session.is_ready_to_publish(1) {
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "record never became ready"
        );
    }
    let waited = started.elapsed();
    assert!(
        waited < Duration::from_millis(400),
        "expected accelerated readiness, waited {waited:?}"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn replay_after_stop_resumes_where_it_froze() {
    let (_dir, path) = spaced_log(&[0, 200]);

    let session = ReplaySession::new();
    session.load(&path).unwrap();
    session.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.stop();

    // A long pause while stopped adds no virtual time.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!session.is_ready_to_publish(1));

    session.start();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(session.is_ready_to_publish(1));
}
