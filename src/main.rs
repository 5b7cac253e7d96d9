//! Frame relay demo: a synthetic decoder that under-delivers frames, relayed to a consumer

use std::sync::Arc;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use tracing::{info, warn};

use frame_relay::consumer::{ChannelConsumer, ConsumerEvent};
use frame_relay::producer::SyntheticProducer;
use frame_relay::{Config, FrameDescriptor, FrameRelay};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter("frame_relay=debug")
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Frame relay demo launching...");

    // Load configuration
    let path = std::env::args().nth(1);
    let config = Config::load(path.as_deref().map(std::path::Path::new))?;
    frame_relay::CONFIG.store(Arc::new(config.clone()));
    let demo = config.demo.clone();

    let producer = SyntheticProducer::default();
    let (consumer, events) = ChannelConsumer::new();
    let relay = FrameRelay::new(producer.clone(), consumer, &config.relay)?;
    relay.set_default_buffer_size(demo.width, demo.height)?;
    let feedback = relay.feedback();

    // Consumer: process one frame at a time, then ask for the next
    let consumer_handle = tokio::spawn(async move {
        let mut frames = 0u32;
        feedback.on_ready();
        while let Ok(event) = events.recv_async().await {
            match event {
                ConsumerEvent::Frame(frame) => {
                    frames += 1;
                    info!(
                        "Processing frame {} at {} us ({}x{})",
                        frames,
                        frame.presentation_time_us,
                        frame.texture.width,
                        frame.texture.height
                    );
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    feedback.on_frame_processed(frame.handle);
                    feedback.on_ready();
                }
                ConsumerEvent::EndOfStream => {
                    info!("End of stream after {} frames", frames);
                    return frames;
                }
            }
        }
        frames
    });

    // Decoder: register every frame, deliver only some of them
    for i in 0..demo.frame_count {
        relay.register_frame(FrameDescriptor::new(
            demo.width,
            demo.height,
            demo.timestamp_offset_us,
        ))?;
        if i >= demo.delivered_count {
            warn!("Decoder will skip frame {}", i);
        }
    }
    let frame_interval = Duration::from_secs(1) / demo.fps.max(1);
    let mut ticker = tokio::time::interval(frame_interval);
    let start = tokio::time::Instant::now();
    for _ in 0..demo.delivered_count.min(demo.frame_count) {
        ticker.tick().await;
        let elapsed_ns = i64::try_from(start.elapsed().as_nanos()).unwrap_or(i64::MAX);
        producer.emit(elapsed_ns);
    }
    relay.signal_end_of_stream()?;

    let frames = tokio::select! {
        joined = consumer_handle => joined?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted before end of stream");
            0
        }
    };

    let snapshot = relay.snapshot().await?;
    info!(
        "Relayed {} frames ({} dropped, {} forced end-of-stream)",
        frames, snapshot.stats.frames_dropped, snapshot.stats.eos_forced
    );
    if let Some(missing) = snapshot.stats.last_forced_missing {
        warn!("Decoder under-delivered {} frames", missing);
    }

    relay
        .release_and_wait()
        .await
        .map_err(|e| eyre!("Relay shutdown failed: {}", e))?;
    info!("Frame relay demo shutting down");
    Ok(())
}
