use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flume::Receiver;
use tokio::time::Instant;

use frame_relay::consumer::{ChannelConsumer, ConsumerEvent};
use frame_relay::producer::SyntheticProducer;
use frame_relay::relay::EosPhase;
use frame_relay::{
    ConsumerFeedback, FrameDescriptor, FrameRelay, QueuedFrame, RelayConfig, RelayError,
    WatchdogConfig,
};

const TIMEOUT: Duration = Duration::from_millis(500);

fn config() -> RelayConfig {
    RelayConfig {
        executor_name: "relay-test".into(),
        watchdog: WatchdogConfig {
            timeout_ms: 500,
            emulator_timeout_ms: 10_000,
            timeout_override_ms: Some(TIMEOUT.as_millis() as u64),
        },
    }
}

struct Harness {
    producer: SyntheticProducer,
    relay: FrameRelay,
    feedback: ConsumerFeedback,
    events: Receiver<ConsumerEvent>,
}

impl Harness {
    fn new() -> Self {
        let producer = SyntheticProducer::default();
        let (consumer, events) = ChannelConsumer::new();
        let relay = FrameRelay::new(producer.clone(), consumer, &config()).expect("relay");
        let feedback = relay.feedback();
        Self {
            producer,
            relay,
            feedback,
            events,
        }
    }

    fn register(&self, offset_us: i64) {
        self.relay
            .register_frame(FrameDescriptor::new(640, 480, offset_us))
            .expect("register");
    }

    /// Everything delivered so far, after all submitted events were handled.
    async fn delivered(&self) -> Vec<ConsumerEvent> {
        self.relay.snapshot().await.expect("snapshot");
        self.events.try_iter().collect()
    }

    async fn delivered_frames(&self) -> Vec<QueuedFrame> {
        self.delivered()
            .await
            .into_iter()
            .map(|event| match event {
                ConsumerEvent::Frame(frame) => frame,
                ConsumerEvent::EndOfStream => panic!("unexpected end of stream"),
            })
            .collect()
    }

    async fn next_event(&self) -> ConsumerEvent {
        tokio::time::timeout(Duration::from_secs(60), self.events.recv_async())
            .await
            .expect("no delivery before timeout")
            .expect("consumer channel closed")
    }
}

#[tokio::test(start_paused = true)]
async fn frames_forward_in_registration_order_with_corrected_time() {
    let h = Harness::new();
    for offset in [100, 200, 300] {
        h.register(offset);
    }
    for ms in 1..=3 {
        h.producer.emit(ms * 1_000_000);
    }

    let mut presentation_times = Vec::new();
    for _ in 0..3 {
        h.feedback.on_ready();
        let frames = h.delivered_frames().await;
        assert_eq!(frames.len(), 1, "exactly one frame per completion");
        let frame = frames[0];
        assert_eq!(frame.texture.width, 640);
        presentation_times.push(frame.presentation_time_us);
        h.feedback.on_frame_processed(frame.handle);
    }

    assert_eq!(presentation_times, vec![1_100, 2_200, 3_300]);
    let snapshot = h.relay.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.pending, 0);
    assert_eq!(snapshot.stats.frames_forwarded, 3);
    assert!(snapshot.in_flight.is_none());
}

#[tokio::test(start_paused = true)]
async fn no_dispatch_without_capacity() {
    let h = Harness::new();
    h.register(0);
    h.producer.emit(1_000);

    assert!(h.delivered().await.is_empty());
    let snapshot = h.relay.snapshot().await.expect("snapshot");
    assert_eq!((snapshot.capacity, snapshot.available), (0, 1));

    h.feedback.on_ready();
    assert_eq!(h.delivered_frames().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn no_dispatch_before_arrival() {
    let h = Harness::new();
    h.register(0);
    h.feedback.on_ready();
    assert!(h.delivered().await.is_empty());

    h.producer.emit(1_000);
    assert_eq!(h.delivered_frames().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn in_flight_frame_blocks_second_forward() {
    let h = Harness::new();
    h.register(0);
    h.register(0);
    h.producer.emit(1_000);
    h.producer.emit(2_000);
    h.feedback.on_ready();
    h.feedback.on_ready();

    let first = h.delivered_frames().await;
    assert_eq!(first.len(), 1);
    let snapshot = h.relay.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.capacity, 1);
    assert_eq!(snapshot.in_flight.map(|f| f.handle), Some(first[0].handle));

    h.feedback.on_frame_processed(first[0].handle);
    let second = h.delivered_frames().await;
    assert_eq!(second.len(), 1);
    assert_ne!(second[0].handle, first[0].handle);
    assert_eq!(h.relay.snapshot().await.expect("snapshot").capacity, 0);
}

#[tokio::test(start_paused = true)]
async fn excess_arrivals_are_discarded() {
    let h = Harness::new();
    h.register(0);
    h.producer.emit(1_000);
    h.producer.emit(2_000);
    h.feedback.on_ready();
    h.feedback.on_ready();

    assert_eq!(h.delivered_frames().await.len(), 1);
    let snapshot = h.relay.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.available, 0);
    assert_eq!(snapshot.stats.frames_dropped, 1);
    assert_eq!(h.producer.stats().discarded, 1);
}

#[tokio::test(start_paused = true)]
async fn out_of_order_sequence_is_flagged_but_forwarded() {
    let h = Harness::new();
    h.relay
        .register_frame(FrameDescriptor::new(640, 480, 0).with_sequence(7))
        .expect("register");
    h.producer.emit(1_000);
    h.feedback.on_ready();

    assert_eq!(h.delivered_frames().await.len(), 1);
    let snapshot = h.relay.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.stats.frames_mismatched, 1);
}

#[tokio::test(start_paused = true)]
async fn flush_discards_late_arrivals_then_completes() {
    let h = Harness::new();
    for _ in 0..3 {
        h.register(0);
    }
    h.producer.emit(1_000);
    h.feedback.on_ready();
    let pre_flush = h.delivered_frames().await;
    assert_eq!(pre_flush.len(), 1);

    let completions = Arc::new(AtomicUsize::new(0));
    let counter = completions.clone();
    h.relay
        .flush_then(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("flush");

    let snapshot = h.relay.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.drop_on_arrival, 2);
    assert_eq!(snapshot.capacity, 0);
    assert_eq!(snapshot.pending, 0);
    assert!(snapshot.in_flight.is_none());
    assert_eq!(completions.load(Ordering::SeqCst), 0);

    h.feedback.on_ready();
    h.producer.emit(2_000);
    assert!(h.delivered().await.is_empty());
    assert_eq!(completions.load(Ordering::SeqCst), 0);

    h.producer.emit(3_000);
    assert!(h.delivered().await.is_empty());
    assert_eq!(completions.load(Ordering::SeqCst), 1);

    let snapshot = h.relay.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.drop_on_arrival, 0);
    assert_eq!(snapshot.capacity, 1, "late arrivals never consume capacity");
    assert_eq!(h.producer.stats().discarded, 2);

    // Completion of the frame forwarded before the flush changes nothing.
    h.feedback.on_frame_processed(pre_flush[0].handle);
    h.register(0);
    h.producer.emit(4_000);
    let post_flush = h.delivered_frames().await;
    assert_eq!(post_flush.len(), 1);
    h.feedback.on_frame_processed(pre_flush[0].handle);
    let snapshot = h.relay.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.in_flight.map(|f| f.handle), Some(post_flush[0].handle));
    assert_eq!(completions.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn flush_with_nothing_outstanding_completes_immediately() {
    let h = Harness::new();
    h.register(0);
    h.register(0);
    h.producer.emit(1_000);
    h.producer.emit(2_000);

    let completions = Arc::new(AtomicUsize::new(0));
    let counter = completions.clone();
    h.relay
        .flush_then(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("flush");

    let snapshot = h.relay.snapshot().await.expect("snapshot");
    assert_eq!(completions.load(Ordering::SeqCst), 1);
    assert_eq!(snapshot.available, 0);
    assert_eq!(snapshot.drop_on_arrival, 0);
    assert_eq!(h.producer.stats().discarded, 2);
}

#[tokio::test(start_paused = true)]
async fn flush_during_dispatch_resets_in_flight_and_capacity() {
    let h = Harness::new();
    h.register(0);
    h.producer.emit(1_000);
    h.feedback.on_ready();
    h.feedback.on_ready();
    let stale = h.delivered_frames().await;
    assert_eq!(stale.len(), 1);

    h.relay.flush().expect("flush");
    h.feedback.on_frame_processed(stale[0].handle);
    let snapshot = h.relay.snapshot().await.expect("snapshot");
    assert!(snapshot.in_flight.is_none());
    assert_eq!(snapshot.capacity, 0);

    h.register(0);
    h.producer.emit(2_000);
    assert!(h.delivered().await.is_empty(), "capacity must be granted again");
    h.feedback.on_ready();
    assert_eq!(h.delivered_frames().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn end_of_stream_on_idle_relay_is_immediate() {
    let h = Harness::new();
    h.relay.signal_end_of_stream().expect("eos");
    assert_eq!(h.delivered().await, vec![ConsumerEvent::EndOfStream]);
    let snapshot = h.relay.snapshot().await.expect("snapshot");
    assert!(!snapshot.watchdog_armed);
    assert_eq!(snapshot.eos_phase, EosPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn end_of_stream_follows_last_completion() {
    let h = Harness::new();
    h.register(0);
    h.producer.emit(1_000);
    h.feedback.on_ready();
    let frames = h.delivered_frames().await;

    h.relay.signal_end_of_stream().expect("eos");
    let snapshot = h.relay.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.eos_phase, EosPhase::EndedPending);
    assert!(snapshot.watchdog_armed);
    assert!(h.events.try_recv().is_err());

    h.feedback.on_frame_processed(frames[0].handle);
    assert_eq!(h.delivered().await, vec![ConsumerEvent::EndOfStream]);
    let snapshot = h.relay.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.eos_phase, EosPhase::Idle);
    assert!(!snapshot.watchdog_armed);
    assert_eq!(snapshot.stats.eos_forced, 0);
}

#[tokio::test(start_paused = true)]
async fn flush_propagates_pending_end_of_stream() {
    let h = Harness::new();
    h.register(0);
    h.register(0);
    h.producer.emit(1_000);
    h.feedback.on_ready();
    assert_eq!(h.delivered_frames().await.len(), 1);

    h.relay.signal_end_of_stream().expect("eos");
    h.relay.flush().expect("flush");
    assert_eq!(h.delivered().await, vec![ConsumerEvent::EndOfStream]);

    let snapshot = h.relay.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.eos_phase, EosPhase::Idle);
    assert!(!snapshot.watchdog_armed);
    assert_eq!(snapshot.drop_on_arrival, 1);
    assert_eq!(snapshot.stats.eos_propagated, 1);
    assert_eq!(snapshot.stats.eos_forced, 0);

    tokio::time::sleep(TIMEOUT * 4).await;
    assert!(h.delivered().await.is_empty());
    let snapshot = h.relay.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.stats.eos_propagated, 1);
    assert_eq!(snapshot.stats.eos_forced, 0);
}

#[tokio::test(start_paused = true)]
async fn excess_arrival_while_ending_is_dropped() {
    let h = Harness::new();
    h.register(0);
    h.producer.emit(1_000);
    h.feedback.on_ready();
    let frames = h.delivered_frames().await;
    assert_eq!(frames.len(), 1);

    h.relay.signal_end_of_stream().expect("eos");
    h.producer.emit(2_000);
    assert!(h.delivered().await.is_empty());
    assert_eq!(h.producer.stats().discarded, 1);
    let snapshot = h.relay.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.eos_phase, EosPhase::EndedPending);
    assert_eq!(snapshot.available, 0);

    h.feedback.on_frame_processed(frames[0].handle);
    assert_eq!(h.delivered().await, vec![ConsumerEvent::EndOfStream]);
    let snapshot = h.relay.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.eos_phase, EosPhase::Idle);
    assert_eq!(snapshot.stats.eos_forced, 0);
}

#[tokio::test(start_paused = true)]
async fn watchdog_forces_end_of_stream_when_frames_go_missing() {
    let h = Harness::new();
    h.register(0);
    h.register(0);
    h.producer.emit(1_000);
    h.feedback.on_ready();
    let frames = h.delivered_frames().await;
    assert_eq!(frames.len(), 1);

    let start = Instant::now();
    h.relay.signal_end_of_stream().expect("eos");
    h.feedback.on_frame_processed(frames[0].handle);
    assert!(h.delivered().await.is_empty(), "one frame is still missing");

    assert_eq!(h.next_event().await, ConsumerEvent::EndOfStream);
    assert!(start.elapsed() >= TIMEOUT);

    let snapshot = h.relay.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.stats.eos_forced, 1);
    assert_eq!(snapshot.stats.last_forced_missing, Some(1));
    assert_eq!(snapshot.pending, 0);
    assert!(snapshot.reject_incoming);
    assert!(!snapshot.watchdog_armed);

    // The straggler shows up after all; it is dropped.
    h.producer.emit(2_000);
    assert!(h.delivered().await.is_empty());
    assert_eq!(h.producer.stats().discarded, 1);

    // A new stream accepts frames again.
    h.register(0);
    h.producer.emit(3_000);
    h.feedback.on_ready();
    assert_eq!(h.delivered_frames().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn watchdog_clears_frame_stuck_in_flight() {
    let h = Harness::new();
    h.register(0);
    h.register(0);
    h.producer.emit(1_000);
    h.feedback.on_ready();
    let frames = h.delivered_frames().await;

    h.relay.signal_end_of_stream().expect("eos");
    assert_eq!(h.next_event().await, ConsumerEvent::EndOfStream);

    h.feedback.on_frame_processed(frames[0].handle);
    let snapshot = h.relay.snapshot().await.expect("snapshot");
    assert!(snapshot.in_flight.is_none());
    assert_eq!(snapshot.stats.eos_propagated, 1);
    assert!(h.events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn arrivals_keep_restarting_the_watchdog() {
    let h = Harness::new();
    for _ in 0..3 {
        h.register(0);
    }
    h.feedback.on_ready();
    h.relay.signal_end_of_stream().expect("eos");

    for i in 0..3 {
        tokio::time::sleep(TIMEOUT * 3 / 5).await;
        h.producer.emit(i * 1_000);
        let frames = h.delivered_frames().await;
        assert_eq!(frames.len(), 1, "frame {i} forwarded");
        h.feedback.on_frame_processed(frames[0].handle);
        h.feedback.on_ready();
    }

    assert_eq!(h.delivered().await, vec![ConsumerEvent::EndOfStream]);
    let snapshot = h.relay.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.stats.eos_forced, 0);
    assert_eq!(snapshot.stats.eos_propagated, 1);
}

#[tokio::test(start_paused = true)]
async fn relay_carries_consecutive_streams() {
    let h = Harness::new();
    for stream in 0..2 {
        h.register(stream);
        h.producer.emit(1_000);
        h.feedback.on_ready();
        let frames = h.delivered_frames().await;
        assert_eq!(frames[0].presentation_time_us, 1 + stream);
        h.relay.signal_end_of_stream().expect("eos");
        h.feedback.on_frame_processed(frames[0].handle);
        assert_eq!(h.delivered().await, vec![ConsumerEvent::EndOfStream]);
    }
    let snapshot = h.relay.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.stats.eos_propagated, 2);
}

#[tokio::test]
async fn pending_count_reflects_registration_immediately() {
    let h = Harness::new();
    h.register(0);
    h.register(0);
    assert_eq!(h.relay.pending_frame_count(), 2);
}

#[tokio::test]
async fn buffer_size_reaches_producer() {
    let h = Harness::new();
    h.relay.set_default_buffer_size(1920, 1080).expect("buffer size");
    h.relay.snapshot().await.expect("snapshot");
    assert_eq!(h.producer.stats().buffer_size, Some((1920, 1080)));
}

#[tokio::test]
async fn allocation_failure_yields_no_relay() {
    let (consumer, _events) = ChannelConsumer::new();
    let result = FrameRelay::new(SyntheticProducer::failing("out of memory"), consumer, &config());
    assert!(matches!(result, Err(RelayError::ProducerInit(_))));
}

#[test]
fn construction_requires_runtime() {
    let (consumer, _events) = ChannelConsumer::new();
    let result = FrameRelay::new(SyntheticProducer::default(), consumer, &config());
    assert!(matches!(result, Err(RelayError::NoRuntime)));
}

#[tokio::test]
async fn release_frees_producer_and_ignores_late_callbacks() {
    let h = Harness::new();
    h.register(0);
    h.relay.release_and_wait().await.expect("release");
    assert!(h.producer.stats().released);

    h.feedback.on_ready();
    h.producer.emit(1_000);
    assert!(h.events.try_recv().is_err());
}
