//! Runs the bridge for two seconds against a mock 440Hz capture source and
//! prints what came out the other end.
//!
//! ```sh
//! cargo run --example mock_bridge
//! ```

use std::sync::Arc;
use std::time::Duration;

use usb_audio_bridge::{
    spawn_status_logger, AudioFormatProfile, BridgeError, ChannelSink, MockCaptureSource,
    Pipeline, PipelineConfig,
};

#[tokio::main]
async fn main() -> Result<(), BridgeError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let profile = AudioFormatProfile::new(32, 24)?;
    // Real-time paced: one 2ms block of 440Hz sine per capture cycle, for
    // two seconds of audio.
    let source = MockCaptureSource::sine(profile, 440.0).with_block_limit(1000);
    let (sink, mut chunks) = ChannelSink::new(64);

    let mut pipeline = Pipeline::new(PipelineConfig::default());
    if let Some(events) = pipeline.take_status_events() {
        spawn_status_logger(events);
    }
    pipeline.start(profile, source, Arc::new(sink))?;

    let drain = tokio::spawn(async move {
        let mut received = 0u64;
        while let Some(chunk) = chunks.recv().await {
            received += chunk.len() as u64;
        }
        received
    });

    tokio::time::sleep(Duration::from_secs(2)).await;
    pipeline.stop().await?;
    let stats = pipeline.stats();

    // Sink channel closes once the transmit worker drops its sender.
    let received = drain.await.unwrap_or(0);
    tracing::info!(
        bytes_captured = stats.bytes_captured,
        bytes_transmitted = stats.bytes_transmitted,
        bytes_received = received,
        overruns = stats.overruns,
        underruns = stats.underruns,
        "bridge session complete"
    );
    Ok(())
}
