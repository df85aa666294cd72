use futures::StreamExt;
use std::time::Duration;
use sandbox_depth::{
    FilterConfig, FilterError, FilteredFrames, FrameProducer, StreamingPipeline, Submission,
};

fn quick_config() -> FilterConfig {
    FilterConfig {
        num_averaging_slots: 4,
        min_num_samples: 2,
        max_variance: 0,
        hysteresis: 0.0,
        spatial_filter_enabled: false,
        gradient_resolution: 2,
        ..FilterConfig::default()
    }
}

fn spawn() -> StreamingPipeline {
    StreamingPipeline::spawn(2, 2, quick_config()).unwrap()
}

async fn next_output(producer: &FrameProducer, frames: &FilteredFrames, value: u8) -> f32 {
    producer.submit(vec![value; 4]);
    frames.next().await.unwrap().value.as_slice()[0]
}

#[tokio::test]
async fn test_frames_and_gradients_share_frame_ids() {
    let pipeline = spawn();
    let producer = pipeline.producer();
    let frames = pipeline.filtered_frames();
    let gradients = pipeline.gradient_fields();

    for expected_id in 0..3 {
        assert_eq!(producer.submit(vec![90; 4]), Submission::Queued);
        let field = gradients.next().await.unwrap();
        assert_eq!(pipeline.in_flight(), 1);
        let frame = frames.next().await.unwrap();
        assert_eq!(field.frame_id, expected_id);
        assert_eq!(frame.frame_id, expected_id);
        assert_eq!(field.captured_at, frame.captured_at);
        assert_eq!(pipeline.in_flight(), 0);
    }

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unclaimed_raw_frame_is_replaced() {
    let pipeline = spawn();
    let producer = pipeline.producer();
    let frames = pipeline.filtered_frames();

    // The worker cannot run before this task yields, so the first frame is
    // still waiting when the second arrives.
    assert_eq!(producer.submit(vec![10; 4]), Submission::Queued);
    assert_eq!(producer.submit(vec![20; 4]), Submission::Replaced);
    assert_eq!(pipeline.dropped_frames(), 1);

    let frame = frames.next().await.unwrap();
    assert_eq!(frame.frame_id, 1);
    assert!(frames.try_latest().is_none());

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_slow_consumer_only_sees_latest_result() {
    let pipeline = spawn();
    let producer = pipeline.producer();
    let frames = pipeline.filtered_frames();
    let gradients = pipeline.gradient_fields();

    for _ in 0..3 {
        producer.submit(vec![50; 4]);
        gradients.next().await.unwrap();
    }
    assert_eq!(pipeline.in_flight(), 1);

    let latest = frames.try_latest().unwrap();
    assert_eq!(latest.frame_id, 2);
    assert!(frames.try_latest().is_none());
    assert_eq!(pipeline.in_flight(), 0);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_throttled_submit_waits_for_consumer() {
    let pipeline = spawn();
    let producer = pipeline.producer();
    let frames = pipeline.filtered_frames();
    let gradients = pipeline.gradient_fields();

    assert_eq!(producer.submit_throttled(vec![70; 4]), Submission::Queued);
    gradients.next().await.unwrap();
    assert_eq!(producer.in_flight(), 1);
    assert_eq!(producer.submit_throttled(vec![71; 4]), Submission::Throttled);

    frames.next().await.unwrap();
    assert_eq!(producer.submit_throttled(vec![72; 4]), Submission::Queued);
    let frame = frames.next().await.unwrap();
    assert_eq!(frame.frame_id, 1);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_config_changes_apply_between_frames() {
    let pipeline = spawn();
    let producer = pipeline.producer();
    let frames = pipeline.filtered_frames();
    let config = pipeline.config();

    assert_eq!(next_output(&producer, &frames, 100).await, 0.0);
    assert_eq!(next_output(&producer, &frames, 100).await, 100.0);

    // A per-frame parameter keeps the accumulated history.
    config.set_hysteresis(5.0).unwrap();
    assert_eq!(next_output(&producer, &frames, 100).await, 100.0);
    assert_eq!(pipeline.config().snapshot().1.hysteresis, 5.0);

    // A layout parameter starts over from empty buffers.
    config.set_depth_range(100.0, 900.0).unwrap();
    assert_eq!(next_output(&producer, &frames, 100).await, 0.0);
    assert_eq!(next_output(&producer, &frames, 100).await, 100.0);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rejected_range_does_not_block_later_updates() {
    let pipeline = spawn();
    let producer = pipeline.producer();
    let frames = pipeline.filtered_frames();
    let config = pipeline.config();

    next_output(&producer, &frames, 100).await;
    assert_eq!(next_output(&producer, &frames, 100).await, 100.0);

    assert!(matches!(
        config.set_depth_range(900.0, 100.0),
        Err(FilterError::InvalidDepthRange { .. })
    ));
    assert_eq!(config.snapshot().1.depth_range, quick_config().depth_range);
    assert_eq!(next_output(&producer, &frames, 100).await, 100.0);

    config
        .update(|cfg| {
            cfg.retain_valids = false;
            cfg.instable_value = -7.0;
            cfg.min_num_samples = 50;
        })
        .unwrap();
    assert_eq!(next_output(&producer, &frames, 100).await, -7.0);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stream_ends_after_shutdown() {
    let pipeline = spawn();
    let producer = pipeline.producer();
    let gradients = pipeline.gradient_fields();
    let stream = pipeline.filtered_frames().into_stream();

    producer.submit(vec![30; 4]);
    gradients.next().await.unwrap();
    pipeline.shutdown().await.unwrap();

    // The result published before shutdown is still delivered.
    let ids: Vec<u64> = stream.map(|frame| frame.frame_id).collect().await;
    assert_eq!(ids, vec![0]);
    assert_eq!(producer.submit(vec![30; 4]), Submission::Closed);
}

#[tokio::test]
async fn test_shutdown_releases_every_waiting_consumer() {
    let pipeline = spawn();
    let first = pipeline.filtered_frames();
    let second = first.clone();
    let gradients = pipeline.gradient_fields();
    let gradients_clone = gradients.clone();

    let waiters = [
        tokio::spawn(async move { first.next().await.is_none() }),
        tokio::spawn(async move { second.next().await.is_none() }),
        tokio::spawn(async move { gradients.next().await.is_none() }),
        tokio::spawn(async move { gradients_clone.next().await.is_none() }),
    ];
    // Let every consumer park before stopping the worker.
    tokio::time::sleep(Duration::from_millis(20)).await;
    pipeline.shutdown().await.unwrap();

    for waiter in waiters {
        let finished = tokio::time::timeout(Duration::from_millis(500), waiter)
            .await
            .expect("consumer still parked after shutdown");
        assert!(finished.unwrap());
    }
}

#[tokio::test]
async fn test_dropping_the_pipeline_stops_the_worker() {
    let pipeline = spawn();
    let frames = pipeline.filtered_frames();
    drop(pipeline);
    assert!(frames.next().await.is_none());
}
