// THEORY:
// The `stream_pipeline` module puts the synchronous `DepthPipeline` behind a
// producer/consumer boundary that can never stall the camera.
//
// Key architectural principles:
// 1.  **Single owner**: one dedicated tokio worker owns the `DepthPipeline` and is
//     the only code that ever touches its buffers.
// 2.  **Latest value wins**: raw frames go in, and filtered frames and gradient
//     fields come out, through single-slot mailboxes. A producer that outruns the
//     worker overwrites the undelivered frame; a consumer that falls behind only
//     ever sees the newest result.
// 3.  **In-flight accounting**: a counter tracks filtered frames published but
//     not yet taken. Acquisition loops can use `submit_throttled` to skip frames
//     while the chain downstream is still draining.
// 4.  **Frame-boundary configuration**: settings live behind one lock in a
//     `ConfigHandle`. The worker snapshots the whole struct between frames, so a
//     pass never sees half of an update.
// 5.  **Clean shutdown**: a watch channel tells the worker to stop. A result that
//     finishes after shutdown was requested is dropped, never published.

use crate::config::FilterConfig;
use crate::core_modules::depth_sample::FrameDimensions;
use crate::core_modules::filtered_frame::FilteredFrame;
use crate::core_modules::gradient_field::GradientField;
use crate::core_modules::mailbox::Mailbox;
use crate::error::{FilterError, StreamError};
use crate::pipeline::DepthPipeline;
use futures::Stream;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// A pipeline output tagged with the raw frame it came from.
#[derive(Debug, Clone)]
pub struct Published<T> {
    pub frame_id: u64,
    pub captured_at: Instant,
    pub value: T,
}

/// Outcome of handing a raw frame to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The frame is waiting for the worker.
    Queued,
    /// The frame replaced an older one the worker had not picked up yet.
    Replaced,
    /// Skipped because earlier results are still in flight.
    Throttled,
    /// The worker has stopped.
    Closed,
}

struct RawFrame {
    frame_id: u64,
    captured_at: Instant,
    data: Vec<u8>,
}

struct Shared {
    inbox: Mailbox<RawFrame>,
    frames_out: Mailbox<Published<FilteredFrame>>,
    gradients_out: Mailbox<Published<GradientField>>,
    in_flight: AtomicUsize,
    next_frame_id: AtomicU64,
    dropped_frames: AtomicU64,
}

/// Shared, lock-guarded configuration with a revision counter.
#[derive(Clone)]
pub struct ConfigHandle {
    config: Arc<RwLock<FilterConfig>>,
    revision: Arc<AtomicU64>,
    dimensions: FrameDimensions,
}

impl ConfigHandle {
    fn new(config: FilterConfig, dimensions: FrameDimensions) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            revision: Arc::new(AtomicU64::new(0)),
            dimensions,
        }
    }

    /// Applies `change` to a copy of the configuration and commits it only if
    /// the result is valid for the frame geometry. A rejected change leaves the
    /// shared configuration and its revision as they were.
    pub fn update(&self, change: impl FnOnce(&mut FilterConfig)) -> Result<(), FilterError> {
        let mut config = self.config.write();
        let mut candidate = config.clone();
        change(&mut candidate);
        candidate.validate(self.dimensions)?;
        *config = candidate;
        self.revision.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// A consistent copy of the configuration and its revision.
    pub fn snapshot(&self) -> (u64, FilterConfig) {
        let config = self.config.read();
        (self.revision.load(Ordering::Acquire), config.clone())
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    pub fn set_depth_range(&self, near: f32, far: f32) -> Result<(), FilterError> {
        self.update(|config| config.depth_range = (near, far))
    }

    pub fn set_stable_parameters(
        &self,
        min_num_samples: u32,
        max_variance: u32,
    ) -> Result<(), FilterError> {
        self.update(|config| {
            config.min_num_samples = min_num_samples;
            config.max_variance = max_variance;
        })
    }

    pub fn set_hysteresis(&self, hysteresis: f32) -> Result<(), FilterError> {
        self.update(|config| config.hysteresis = hysteresis)
    }

    pub fn set_retain_valids(&self, retain_valids: bool) -> Result<(), FilterError> {
        self.update(|config| config.retain_valids = retain_valids)
    }

    pub fn set_instable_value(&self, instable_value: f32) -> Result<(), FilterError> {
        self.update(|config| config.instable_value = instable_value)
    }

    pub fn set_spatial_filter(&self, enabled: bool) -> Result<(), FilterError> {
        self.update(|config| config.spatial_filter_enabled = enabled)
    }

    pub fn set_spatial_filter_passes(&self, passes: u32) -> Result<(), FilterError> {
        self.update(|config| config.spatial_filter_passes = passes)
    }

    pub fn set_valid_raw_range(&self, low: u8, high: u8) -> Result<(), FilterError> {
        self.update(|config| config.valid_raw_range = (low, high))
    }

    pub fn set_num_averaging_slots(&self, slots: usize) -> Result<(), FilterError> {
        self.update(|config| config.num_averaging_slots = slots)
    }

    pub fn set_gradient_resolution(&self, resolution: u32) -> Result<(), FilterError> {
        self.update(|config| config.gradient_resolution = resolution)
    }

    pub fn set_max_gradient_magnitude(&self, magnitude: f32) -> Result<(), FilterError> {
        self.update(|config| config.max_gradient_magnitude = magnitude)
    }
}

/// Producer side: hands raw frames to the worker without ever waiting.
#[derive(Clone)]
pub struct FrameProducer {
    shared: Arc<Shared>,
}

impl FrameProducer {
    /// Posts a frame, replacing any frame the worker has not started on.
    pub fn submit(&self, data: Vec<u8>) -> Submission {
        if self.shared.inbox.is_closed() {
            return Submission::Closed;
        }
        let frame = RawFrame {
            frame_id: self.shared.next_frame_id.fetch_add(1, Ordering::Relaxed),
            captured_at: Instant::now(),
            data,
        };
        match self.shared.inbox.post(frame) {
            None => Submission::Queued,
            Some(stale) => {
                self.shared.dropped_frames.fetch_add(1, Ordering::Relaxed);
                debug!(frame_id = stale.frame_id, "dropped stale raw frame");
                Submission::Replaced
            }
        }
    }

    /// Like `submit`, but skips the frame while filtered results are still
    /// waiting for a consumer.
    pub fn submit_throttled(&self, data: Vec<u8>) -> Submission {
        if self.shared.in_flight.load(Ordering::Acquire) > 0 {
            return Submission::Throttled;
        }
        self.submit(data)
    }

    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }
}

/// Consumer side for filtered frames.
#[derive(Clone)]
pub struct FilteredFrames {
    shared: Arc<Shared>,
}

impl FilteredFrames {
    /// Newest filtered frame, if one arrived since the last take.
    pub fn try_latest(&self) -> Option<Published<FilteredFrame>> {
        let frame = self.shared.frames_out.try_take()?;
        self.shared.in_flight.fetch_sub(1, Ordering::AcqRel);
        Some(frame)
    }

    /// Waits for the next filtered frame; `None` once the worker has stopped.
    pub async fn next(&self) -> Option<Published<FilteredFrame>> {
        let frame = self.shared.frames_out.recv().await?;
        self.shared.in_flight.fetch_sub(1, Ordering::AcqRel);
        Some(frame)
    }

    pub fn into_stream(self) -> impl Stream<Item = Published<FilteredFrame>> {
        futures::stream::unfold(self, |frames| async move {
            let frame = frames.next().await?;
            Some((frame, frames))
        })
    }
}

/// Consumer side for gradient fields.
#[derive(Clone)]
pub struct GradientFields {
    shared: Arc<Shared>,
}

impl GradientFields {
    pub fn try_latest(&self) -> Option<Published<GradientField>> {
        self.shared.gradients_out.try_take()
    }

    pub async fn next(&self) -> Option<Published<GradientField>> {
        self.shared.gradients_out.recv().await
    }

    pub fn into_stream(self) -> impl Stream<Item = Published<GradientField>> {
        futures::stream::unfold(self, |fields| async move {
            let field = fields.next().await?;
            Some((field, fields))
        })
    }
}

/// A `DepthPipeline` running on its own worker task.
pub struct StreamingPipeline {
    shared: Arc<Shared>,
    config: ConfigHandle,
    shutdown_tx: watch::Sender<bool>,
    worker: Option<tokio::task::JoinHandle<()>>,
}

impl StreamingPipeline {
    /// Sets up the pipeline and spawns its worker. Must be called from inside
    /// a tokio runtime.
    pub fn spawn(width: u32, height: u32, config: FilterConfig) -> Result<Self, StreamError> {
        let pipeline = DepthPipeline::setup(width, height, config.clone())?;
        let shared = Arc::new(Shared {
            inbox: Mailbox::new(),
            frames_out: Mailbox::new(),
            gradients_out: Mailbox::new(),
            in_flight: AtomicUsize::new(0),
            next_frame_id: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
        });
        let config = ConfigHandle::new(config, pipeline.dimensions());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn(Self::run_worker(
            pipeline,
            shared.clone(),
            config.clone(),
            shutdown_rx,
        ));

        Ok(Self {
            shared,
            config,
            shutdown_tx,
            worker: Some(worker),
        })
    }

    async fn run_worker(
        mut pipeline: DepthPipeline,
        shared: Arc<Shared>,
        config: ConfigHandle,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut applied_revision = config.revision();
        info!("depth filter worker started");

        loop {
            let frame = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                frame = shared.inbox.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            Self::apply_pending_config(&mut pipeline, &config, &mut applied_revision);

            let result = pipeline
                .filter(&frame.data)
                .map(|(filtered, gradients)| (filtered, gradients.clone()));

            if *shutdown.borrow() {
                debug!(frame_id = frame.frame_id, "discarding frame filtered during shutdown");
                break;
            }

            match result {
                Ok((filtered, gradients)) => Self::publish(&shared, &frame, filtered, gradients),
                Err(error) => warn!(frame_id = frame.frame_id, %error, "skipping raw frame"),
            }

            tokio::task::yield_now().await;
        }

        shared.inbox.close();
        shared.frames_out.close();
        shared.gradients_out.close();
        info!(
            frames = pipeline.frames_processed(),
            dropped = shared.dropped_frames.load(Ordering::Relaxed),
            "depth filter worker stopped"
        );
    }

    fn apply_pending_config(
        pipeline: &mut DepthPipeline,
        config: &ConfigHandle,
        applied_revision: &mut u64,
    ) {
        let (revision, snapshot) = config.snapshot();
        if revision == *applied_revision {
            return;
        }
        *applied_revision = revision;
        match pipeline.apply_config(snapshot) {
            Ok(true) => debug!(revision, "configuration applied with buffer reset"),
            Ok(false) => debug!(revision, "configuration applied"),
            Err(error) => error!(revision, %error, "rejected configuration update"),
        }
    }

    fn publish(shared: &Shared, frame: &RawFrame, filtered: FilteredFrame, gradients: GradientField) {
        // Count before posting so a consumer's decrement can never run first.
        shared.in_flight.fetch_add(1, Ordering::AcqRel);
        let replaced = shared.frames_out.post(Published {
            frame_id: frame.frame_id,
            captured_at: frame.captured_at,
            value: filtered,
        });
        if replaced.is_some() {
            shared.in_flight.fetch_sub(1, Ordering::AcqRel);
        }
        shared.gradients_out.post(Published {
            frame_id: frame.frame_id,
            captured_at: frame.captured_at,
            value: gradients,
        });
    }

    pub fn producer(&self) -> FrameProducer {
        FrameProducer {
            shared: self.shared.clone(),
        }
    }

    pub fn filtered_frames(&self) -> FilteredFrames {
        FilteredFrames {
            shared: self.shared.clone(),
        }
    }

    pub fn gradient_fields(&self) -> GradientFields {
        GradientFields {
            shared: self.shared.clone(),
        }
    }

    pub fn config(&self) -> ConfigHandle {
        self.config.clone()
    }

    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Raw frames overwritten before the worker could pick them up.
    pub fn dropped_frames(&self) -> u64 {
        self.shared.dropped_frames.load(Ordering::Relaxed)
    }

    /// Stops the worker and waits for it to release its buffers.
    pub async fn shutdown(mut self) -> Result<(), StreamError> {
        self.shutdown_tx.send_replace(true);
        self.shared.inbox.close();
        match self.worker.take() {
            Some(worker) => worker.await.map_err(StreamError::from),
            None => Ok(()),
        }
    }
}

impl Drop for StreamingPipeline {
    fn drop(&mut self) {
        // Best effort stop when the handle is dropped without `shutdown`.
        self.shutdown_tx.send_replace(true);
        self.shared.inbox.close();
    }
}
