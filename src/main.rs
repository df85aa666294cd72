// Demo runner for the `sandbox_depth` library. It feeds a synthetic, noisy sand
// surface through a `StreamingPipeline` and reports what comes out.
//
// Environment:
//   SANDBOX_CONFIG  path to a TOML `FilterConfig` (defaults otherwise)
//   SANDBOX_FRAMES  number of raw frames to produce (default 120)
//   SANDBOX_PNG     where to write the last filtered frame as a PNG
//   SANDBOX_REPLAY  grayscale depth image to replay instead of the synthetic hill
//   RUST_LOG        tracing filter (default "info")

use anyhow::Context;
use futures::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sandbox_depth::core_modules::utils::image_helper::image_helper;
use sandbox_depth::{FilterConfig, StreamError, StreamingPipeline, Submission};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;

/// A sand hill in the middle of the box with sensor noise and dropouts.
fn synthetic_frame(rng: &mut StdRng) -> Vec<u8> {
    let (cx, cy) = (WIDTH as f32 / 2.0, HEIGHT as f32 / 2.0);
    let mut frame = Vec::with_capacity((WIDTH * HEIGHT) as usize);
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            if rng.gen_bool(0.02) {
                frame.push(if rng.gen_bool(0.5) { 0 } else { 255 });
                continue;
            }
            let distance = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
            let height = 180.0 - (distance * 1.2).min(120.0);
            let noise = rng.gen_range(-1..=1) as f32;
            frame.push((height + noise).clamp(1.0, 254.0) as u8);
        }
    }
    frame
}

/// Where raw frames come from.
enum Surface {
    Synthetic,
    Recorded { width: u32, height: u32, samples: Vec<u8> },
}

impl Surface {
    fn load() -> anyhow::Result<Self> {
        let Ok(path) = std::env::var("SANDBOX_REPLAY") else {
            return Ok(Surface::Synthetic);
        };
        let recorded = image::open(&path)
            .with_context(|| format!("reading recorded frame {path}"))?
            .to_luma8();
        info!(%path, width = recorded.width(), height = recorded.height(), "replaying recorded frame");
        Ok(Surface::Recorded {
            width: recorded.width(),
            height: recorded.height(),
            samples: image_helper::raw_frame_from_image(&recorded),
        })
    }

    fn dimensions(&self) -> (u32, u32) {
        match self {
            Surface::Synthetic => (WIDTH, HEIGHT),
            Surface::Recorded { width, height, .. } => (*width, *height),
        }
    }

    /// The next raw frame, with one unit of sensor noise on valid samples.
    fn next_frame(&self, rng: &mut StdRng) -> Vec<u8> {
        match self {
            Surface::Synthetic => synthetic_frame(rng),
            Surface::Recorded { samples, .. } => samples
                .iter()
                .map(|&sample| match sample {
                    0 | 255 => sample,
                    _ => (sample as i16 + rng.gen_range(-1..=1)).clamp(1, 254) as u8,
                })
                .collect(),
        }
    }
}

fn load_config() -> anyhow::Result<FilterConfig> {
    match std::env::var("SANDBOX_CONFIG") {
        Ok(path) => {
            let source = std::fs::read_to_string(&path)
                .with_context(|| format!("reading filter config {path}"))?;
            Ok(FilterConfig::from_toml_str(&source)?)
        }
        Err(_) => Ok(FilterConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config()?;
    let frame_count: u64 = std::env::var("SANDBOX_FRAMES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(120);
    let png_path = std::env::var("SANDBOX_PNG").ok();

    let surface = Surface::load()?;
    let (width, height) = surface.dimensions();
    let pipeline = StreamingPipeline::spawn(width, height, config)?;
    let producer = pipeline.producer();

    let consumer = tokio::spawn({
        let frames = pipeline.filtered_frames().into_stream();
        async move {
            let mut frames = Box::pin(frames);
            let mut last = None;
            while let Some(published) = frames.next().await {
                if let Some((low, high)) = published.value.value_range() {
                    info!(
                        frame_id = published.frame_id,
                        latency_us = published.captured_at.elapsed().as_micros() as u64,
                        low,
                        high,
                        "filtered frame"
                    );
                }
                last = Some(published);
            }
            last
        }
    });

    let mut rng = StdRng::seed_from_u64(0x5a4d);
    let mut ticker = tokio::time::interval(Duration::from_millis(33));
    let mut skipped = 0u64;
    for _ in 0..frame_count {
        ticker.tick().await;
        match producer.submit_throttled(surface.next_frame(&mut rng)) {
            Submission::Throttled => skipped += 1,
            Submission::Closed => return Err(StreamError::Closed.into()),
            Submission::Queued | Submission::Replaced => {}
        }
    }

    if let Some(published) = pipeline.gradient_fields().try_latest() {
        let strongest = published
            .value
            .vectors()
            .iter()
            .map(|v| v.length())
            .fold(0.0f32, f32::max);
        info!(frame_id = published.frame_id, strongest, "gradient field");
    }

    let dropped = pipeline.dropped_frames();
    pipeline.shutdown().await?;
    let last = consumer.await?;
    info!(skipped, dropped, "producer finished");

    match (png_path, last) {
        (Some(path), Some(published)) => {
            image_helper::save(&path, &published.value)
                .with_context(|| format!("writing {path}"))?;
            info!(%path, frame_id = published.frame_id, "saved filtered frame");
        }
        (Some(_), None) => warn!("no filtered frame to save"),
        (None, _) => {}
    }

    Ok(())
}
