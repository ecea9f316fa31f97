//! End-to-end tailer behavior: ordering, live tail, rollover, reclamation,
//! and corruption handling.
//!
//! Run with: cargo test --test tailer_tests

mod common;

use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;

use common::{append_to_segment, make_entry, seq_of, write_segment, StopAfter};
use dlqtail::codec::RECORD_PREFIX_LEN;
use dlqtail::{codec, DlqTailer, TailerConfig, TailerError, TailerState};

fn config_for(temp_dir: &TempDir) -> TailerConfig {
    let queue = temp_dir.path().join("queue");
    std::fs::create_dir_all(&queue).unwrap();
    let mut config = TailerConfig::new(queue);
    config.sincedb_path = Some(temp_dir.path().join("sincedb.json"));
    config
}

#[tokio::test]
async fn test_delivers_entries_in_order_across_segments() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_for(&temp_dir);
    let queue = config.path.clone();

    write_segment(&queue, 1, &[make_entry(0), make_entry(1), make_entry(2)]);
    write_segment(&queue, 2, &[make_entry(3), make_entry(4)]);
    write_segment(&queue, 3, &[make_entry(5), make_entry(6), make_entry(7)]);

    let mut tailer = DlqTailer::new(config);
    tailer.register().await.unwrap();

    let mut consumer = StopAfter::new(8, tailer.stop_handle());
    timeout(Duration::from_secs(10), tailer.run(&mut consumer))
        .await
        .expect("run should stop after the last entry")
        .unwrap();

    let seqs: Vec<u64> = consumer.seen.iter().map(seq_of).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(tailer.state(), TailerState::Closed);
}

#[tokio::test]
async fn test_live_tail_picks_up_appended_entries() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_for(&temp_dir);
    let queue = config.path.clone();

    write_segment(&queue, 1, &[make_entry(0)]);

    let mut tailer = DlqTailer::new(config);
    tailer.register().await.unwrap();
    let stop = tailer.stop_handle();

    let (tx, mut rx) = mpsc::channel(16);
    let run = tokio::spawn(async move {
        let mut consumer = tx;
        tailer.run(&mut consumer).await
    });

    let first = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("existing entry should be delivered")
        .unwrap();
    assert_eq!(seq_of(&first), 0);

    // Append while the tailer is blocked waiting for changes.
    tokio::time::sleep(Duration::from_millis(300)).await;
    append_to_segment(&queue, 1, &[make_entry(1)]);

    let second = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("appended entry should be delivered without polling")
        .unwrap();
    assert_eq!(seq_of(&second), 1);

    stop.stop();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_waits_for_first_segment_on_empty_queue() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_for(&temp_dir);
    let queue = config.path.clone();

    let mut tailer = DlqTailer::new(config);
    tailer.register().await.unwrap();
    let stop = tailer.stop_handle();

    let (tx, mut rx) = mpsc::channel(16);
    let run = tokio::spawn(async move {
        let mut consumer = tx;
        tailer.run(&mut consumer).await
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    write_segment(&queue, 1, &[make_entry(0)]);

    let entry = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("entry in the first segment should be delivered")
        .unwrap();
    assert_eq!(seq_of(&entry), 0);

    stop.stop();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_stop_unblocks_idle_run() {
    let temp_dir = TempDir::new().unwrap();
    let mut tailer = DlqTailer::new(config_for(&temp_dir));
    tailer.register().await.unwrap();

    let stop = tailer.stop_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop.stop();
    });

    let (tx, _rx) = mpsc::channel(16);
    let mut consumer = tx;
    timeout(Duration::from_secs(5), tailer.run(&mut consumer))
        .await
        .expect("stop should unblock an idle run")
        .unwrap();
    assert_eq!(tailer.state(), TailerState::Closed);
}

#[tokio::test]
async fn test_clean_consumed_deletes_sealed_segments() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = config_for(&temp_dir);
    config.clean_consumed = true;
    let queue = config.path.clone();

    write_segment(&queue, 1, &[make_entry(0), make_entry(1)]);
    write_segment(&queue, 2, &[make_entry(2), make_entry(3)]);

    let mut tailer = DlqTailer::new(config);
    tailer.register().await.unwrap();

    let mut consumer = StopAfter::new(4, tailer.stop_handle());
    timeout(Duration::from_secs(10), tailer.run(&mut consumer))
        .await
        .expect("run should stop after the last entry")
        .unwrap();

    assert_eq!(consumer.seen.len(), 4);
    assert!(
        !queue.join("1.log").exists(),
        "fully consumed sealed segment should be reclaimed"
    );
    assert!(
        queue.join("2.log").exists(),
        "the current segment is never reclaimed"
    );
}

#[tokio::test]
async fn test_corrupt_record_fails_without_skipping() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_for(&temp_dir);
    let queue = config.path.clone();

    let mut bytes = codec::encode_record(&make_entry(0)).unwrap();
    let mut bad = codec::encode_record(&make_entry(1)).unwrap();
    bad[RECORD_PREFIX_LEN] ^= 0xff;
    bytes.extend_from_slice(&bad);
    std::fs::write(queue.join("1.log"), &bytes).unwrap();

    let mut tailer = DlqTailer::new(config);
    tailer.register().await.unwrap();

    let (tx, _rx) = mpsc::channel(16);
    let mut consumer = tx;
    let err = timeout(Duration::from_secs(10), tailer.run(&mut consumer))
        .await
        .expect("corruption should fail the run promptly")
        .unwrap_err();

    assert!(
        matches!(err, TailerError::Decode { segment_id: 1, .. }),
        "{err}"
    );
}

#[tokio::test]
async fn test_torn_sealed_segment_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_for(&temp_dir);
    let queue = config.path.clone();

    // Segment 1 ends mid-frame and a later segment exists, so the partial
    // record can never complete.
    let mut bytes = codec::encode_record(&make_entry(0)).unwrap();
    let partial = codec::encode_record(&make_entry(1)).unwrap();
    bytes.extend_from_slice(&partial[..partial.len() - 3]);
    std::fs::write(queue.join("1.log"), &bytes).unwrap();
    write_segment(&queue, 2, &[make_entry(2)]);

    let mut tailer = DlqTailer::new(config);
    tailer.register().await.unwrap();

    let (tx, _rx) = mpsc::channel(16);
    let mut consumer = tx;
    let err = timeout(Duration::from_secs(10), tailer.run(&mut consumer))
        .await
        .expect("a torn sealed segment should fail, not hang")
        .unwrap_err();

    assert!(
        matches!(err, TailerError::TornSegment { segment_id: 1, .. }),
        "{err}"
    );
}

#[tokio::test]
async fn test_start_timestamp_skips_older_entries() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = config_for(&temp_dir);
    let queue = config.path.clone();

    // Entries 0..4 are timestamped at ts(0), ts(10), ... ts(40).
    write_segment(&queue, 1, &[make_entry(0), make_entry(1)]);
    write_segment(&queue, 2, &[make_entry(2), make_entry(3), make_entry(4)]);

    config.start_timestamp = Some(common::ts(15).to_rfc3339());

    let mut tailer = DlqTailer::new(config);
    tailer.register().await.unwrap();

    let mut consumer = StopAfter::new(3, tailer.stop_handle());
    timeout(Duration::from_secs(10), tailer.run(&mut consumer))
        .await
        .expect("run should stop after the last admitted entry")
        .unwrap();

    let seqs: Vec<u64> = consumer.seen.iter().map(seq_of).collect();
    assert_eq!(seqs, vec![2, 3, 4]);
}

#[tokio::test]
async fn test_start_timestamp_past_everything_delivers_only_new_entries() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = config_for(&temp_dir);
    let queue = config.path.clone();

    write_segment(&queue, 1, &[make_entry(0), make_entry(1)]);

    config.start_timestamp = Some(common::ts(3600).to_rfc3339());

    let mut tailer = DlqTailer::new(config);
    tailer.register().await.unwrap();
    let stop = tailer.stop_handle();

    let (tx, mut rx) = mpsc::channel(16);
    let run = tokio::spawn(async move {
        let mut consumer = tx;
        tailer.run(&mut consumer).await
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    let mut fresh = make_entry(9);
    fresh.entry_time = common::ts(7200);
    append_to_segment(&queue, 1, &[fresh]);

    let entry = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("entry appended after the threshold should be delivered")
        .unwrap();
    assert_eq!(seq_of(&entry), 9);

    stop.stop();
    run.await.unwrap().unwrap();
}
