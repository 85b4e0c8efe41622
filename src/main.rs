//! Demo: run the staging pipeline against the synthetic camera and
//! consume frames at a render-style tick.

use std::sync::Arc;
use std::time::{Duration, Instant};

use artemis::device::synthetic::{NullMarkerDetect, SyntheticBodyTracker, SyntheticCamera};
use artemis::{CameraPipeline, Config};
use color_eyre::Result;
use tracing::info;

fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter("artemis=debug")
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Artemis launching...");

    let mut config = Config::default();
    config.capture.width = 640;
    config.capture.height = 480;
    config.capture.capture_body_mask = true;

    let camera = Arc::new(SyntheticCamera::new());
    let tracker = Arc::new(SyntheticBodyTracker::new(config.pipeline.ring_capacity));
    let detector = Arc::new(NullMarkerDetect);

    let mut pipeline = CameraPipeline::start(camera, Some(tracker), detector, &config)?;

    let color_bytes = (config.capture.width * config.capture.height * 4) as usize;
    let depth_bytes = (config.capture.width * config.capture.height * 2) as usize;
    let mut color = vec![0u8; color_bytes];
    let mut depth = vec![0u8; depth_bytes];
    let mut body_mask = vec![0u8; depth_bytes];

    // Consume like a renderer: one non-blocking fetch per tick, keeping
    // the previous frame whenever the pipeline has nothing new.
    let tick = Duration::from_millis(33);
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut updated = 0u64;
    let mut skipped = 0u64;

    while Instant::now() < deadline {
        std::thread::sleep(tick);
        // The counter names the frame in flight; the newest completed
        // frame sits one behind it.
        let index = pipeline.current_frame_index().saturating_sub(1);
        if pipeline.update_views(
            index,
            Some(&mut color),
            Some(&mut depth),
            Some(&mut body_mask),
        ) {
            updated += 1;
        } else {
            skipped += 1;
        }
    }

    info!(updated, skipped, last_index = pipeline.current_frame_index(), "consumer finished");
    pipeline.stop();

    info!("Artemis shutting down");
    Ok(())
}
