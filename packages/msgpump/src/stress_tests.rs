//! Stress tests for ordering and concurrency.
//!
//! These tests hammer the channel, pump, and driver with concurrent producers,
//! slow handlers, and cancellation to check that ordering holds and nothing is
//! lost, duplicated, or run concurrently.

#[cfg(test)]
mod stress_tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use crate::channel::{channel, channel_with, ChannelConfig, Overflow};
    use crate::dispatch::Dispatcher;
    use crate::driver::{Driver, DriverConfig, ExitReason, QuitPolicy};
    use crate::message::{Click, Key, Message, Tick};
    use crate::pump::Pump;
    use crate::testing::{Recorder, SlowRecorder};

    // ==========================================================================
    // Helpers
    // ==========================================================================

    fn recording_driver(recorder: &Recorder) -> Driver {
        Driver::new(
            Dispatcher::new()
                .with_handler::<Click, _>(recorder.clone())
                .with_handler::<Key, _>(recorder.clone())
                .with_handler::<Tick, _>(recorder.clone()),
        )
    }

    /// Group `Click { x: producer, y: seq }` messages by producer.
    fn sequences_by_producer(messages: &[Message]) -> HashMap<i32, Vec<i32>> {
        let mut by_producer: HashMap<i32, Vec<i32>> = HashMap::new();
        for message in messages {
            if let Message::Click(Click { x, y }) = message {
                by_producer.entry(*x).or_default().push(*y);
            }
        }
        by_producer
    }

    // ==========================================================================
    // TEST: Single producer, large volume
    // ==========================================================================
    //
    // Every message written before completion must arrive exactly once, in
    // write order.

    #[tokio::test]
    async fn test_single_producer_order_no_loss_no_duplication() {
        let recorder = Recorder::new();
        let driver = recording_driver(&recorder);
        let (writer, reader) = channel();
        let count = 10_000;

        let producer = tokio::spawn(async move {
            for seq in 0..count {
                writer.write(Message::click(0, seq)).unwrap();
                if seq % 97 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            writer.complete();
        });

        let report = tokio::time::timeout(
            Duration::from_secs(10),
            driver.run(Pump::uncancellable(reader)),
        )
        .await
        .expect("run should finish")
        .unwrap();
        producer.await.unwrap();

        assert_eq!(report.exit, ExitReason::Exhausted);
        assert_eq!(report.dispatched, count as u64);

        let seqs = sequences_by_producer(&recorder.messages()).remove(&0).unwrap();
        assert_eq!(seqs, (0..count).collect::<Vec<_>>());
    }

    // ==========================================================================
    // TEST: Concurrent producers
    // ==========================================================================
    //
    // Interleaving across producers is unconstrained, but each producer's own
    // messages must come out in the order it wrote them.

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_preserve_per_producer_order() {
        let recorder = Recorder::new();
        let driver = recording_driver(&recorder);
        let (writer, reader) = channel();
        let producers = 8;
        let per_producer = 500;

        let mut handles = Vec::new();
        for producer in 0..producers {
            let writer = writer.clone();
            handles.push(tokio::spawn(async move {
                for seq in 0..per_producer {
                    writer.write(Message::click(producer, seq)).unwrap();
                    if fastrand::u8(..) < 16 {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }
        // Completion happens when the last producer's writer drops
        drop(writer);

        let report = tokio::time::timeout(
            Duration::from_secs(10),
            driver.run(Pump::uncancellable(reader)),
        )
        .await
        .expect("run should finish")
        .unwrap();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(report.exit, ExitReason::Exhausted);
        assert_eq!(report.dispatched, (producers * per_producer) as u64);

        let by_producer = sequences_by_producer(&recorder.messages());
        assert_eq!(by_producer.len(), producers as usize);
        for producer in 0..producers {
            assert_eq!(
                by_producer[&producer],
                (0..per_producer).collect::<Vec<_>>(),
                "producer {} out of order",
                producer
            );
        }
    }

    // ==========================================================================
    // TEST: Handlers never overlap
    // ==========================================================================
    //
    // A slow handler must finish before the next message is pulled, even when
    // producers keep writing.

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slow_handlers_run_one_at_a_time() {
        let recorder = Recorder::new();
        let slow = SlowRecorder::new(recorder.clone(), Duration::from_millis(2));
        let driver = Driver::new(
            Dispatcher::new()
                .with_handler::<Click, _>(slow.clone())
                .with_handler::<Key, _>(slow.clone()),
        );
        let (writer, reader) = channel();

        let mut handles = Vec::new();
        for producer in 0..4 {
            let writer = writer.clone();
            handles.push(tokio::spawn(async move {
                for seq in 0..20 {
                    writer.write(Message::click(producer, seq)).unwrap();
                }
            }));
        }
        drop(writer);

        let report = tokio::time::timeout(
            Duration::from_secs(10),
            driver.run(Pump::uncancellable(reader)),
        )
        .await
        .expect("run should finish")
        .unwrap();

        assert_eq!(report.dispatched, 80);
        assert_eq!(recorder.len(), 80);
        assert!(!slow.overlapped());
    }

    // ==========================================================================
    // TEST: Quit from one of many producers
    // ==========================================================================
    //
    // Nothing may be dispatched after Quit, whichever producer sent it.

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_nothing_dispatched_after_quit() {
        let recorder = Recorder::new();
        let quit_marker = Recorder::new();
        let driver = Driver::new(
            Dispatcher::new()
                .with_handler::<Click, _>(recorder.clone())
                .with_quit_hook(quit_marker.clone()),
        );
        let (writer, reader) = channel();

        let mut handles = Vec::new();
        for producer in 0..4 {
            let writer = writer.clone();
            handles.push(tokio::spawn(async move {
                for seq in 0..200 {
                    // Late writes may race with completion
                    if writer.write(Message::click(producer, seq)).is_err() {
                        break;
                    }
                    if producer == 0 && seq == 100 {
                        let _ = writer.write(Message::quit());
                    }
                }
            }));
        }
        drop(writer);

        let report = tokio::time::timeout(
            Duration::from_secs(10),
            driver.run(Pump::uncancellable(reader)),
        )
        .await
        .expect("run should finish")
        .unwrap();

        assert_eq!(report.exit, ExitReason::Quit);
        assert_eq!(quit_marker.messages(), vec![Message::quit()]);
        // Everything before Quit was handled, nothing after
        assert_eq!(report.dispatched, recorder.len() as u64 + 1);

        let by_producer = sequences_by_producer(&recorder.messages());
        let zero = by_producer.get(&0).cloned().unwrap_or_default();
        assert_eq!(zero, (0..=100).collect::<Vec<_>>());
    }

    // ==========================================================================
    // TEST: Drain policy after Quit
    // ==========================================================================

    #[tokio::test]
    async fn test_drain_policy_delivers_everything_buffered() {
        let recorder = Recorder::new();
        let driver = recording_driver(&recorder).with_config(DriverConfig {
            quit_policy: QuitPolicy::DrainBuffered,
            ..Default::default()
        });
        let (writer, reader) = channel();

        writer.write(Message::quit()).unwrap();
        for seq in 0..50 {
            writer.write(Message::click(0, seq)).unwrap();
        }
        writer.complete();

        let report = driver.run(Pump::uncancellable(reader)).await.unwrap();
        assert_eq!(report.exit, ExitReason::Quit);
        assert_eq!(recorder.len(), 50);
    }

    // ==========================================================================
    // TEST: Cancellation mid-stream
    // ==========================================================================
    //
    // Cancelling while a producer is still writing ends the run cleanly; every
    // message dispatched before that point was dispatched in order.

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_while_producing() {
        let recorder = Recorder::new();
        let driver = recording_driver(&recorder);
        let (writer, reader) = channel();
        let token = CancellationToken::new();

        let producer = tokio::spawn(async move {
            let mut seq = 0;
            while writer.write(Message::click(0, seq)).is_ok() {
                seq += 1;
                tokio::time::sleep(Duration::from_millis(1)).await;
                if seq == 1_000 {
                    break;
                }
            }
        });

        let cancel = token.clone();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            driver.run(Pump::new(reader, token)),
        )
        .await
        .expect("run should end on cancel")
        .unwrap();
        canceller.await.unwrap();
        producer.abort();

        assert_eq!(report.exit, ExitReason::Cancelled);
        let seqs = sequences_by_producer(&recorder.messages())
            .remove(&0)
            .unwrap_or_default();
        assert_eq!(seqs, (0..seqs.len() as i32).collect::<Vec<_>>());
    }

    // ==========================================================================
    // TEST: Bounded channel under a flood
    // ==========================================================================
    //
    // Drop-oldest keeps the newest `capacity` messages, still in order.

    #[tokio::test]
    async fn test_bounded_drop_oldest_keeps_newest_in_order() {
        let recorder = Recorder::new();
        let driver = recording_driver(&recorder);
        let (writer, reader) = channel_with(ChannelConfig::bounded(16, Overflow::DropOldest));

        for seq in 0..1_000 {
            writer.write(Message::click(0, seq)).unwrap();
        }
        writer.complete();

        let report = driver.run(Pump::uncancellable(reader)).await.unwrap();
        assert_eq!(report.dispatched, 16);

        let seqs = sequences_by_producer(&recorder.messages()).remove(&0).unwrap();
        assert_eq!(seqs, (984..1_000).collect::<Vec<_>>());
    }
}
