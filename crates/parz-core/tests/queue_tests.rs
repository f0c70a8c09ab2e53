mod common;

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use parz_core::core::{AbortFlag, ReorderQueue, block_queue};

use common::pseudo_random_bytes;

#[test]
fn concurrent_producers_yield_ascending_sequence() -> Result<(), Box<dyn std::error::Error>> {
    const BLOCKS: u64 = 400;
    const PRODUCERS: usize = 6;
    let abort = AbortFlag::new();
    let queue = ReorderQueue::new(PRODUCERS * 3, abort.clone());
    let next_seq = AtomicU64::new(0);
    let delays = pseudo_random_bytes(BLOCKS as usize);

    let observed = thread::scope(|scope| -> Result<Vec<u64>, Box<dyn std::error::Error>> {
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|_| {
                scope.spawn(|| -> parz_core::Result<()> {
                    loop {
                        let seq = next_seq.fetch_add(1, Ordering::SeqCst);
                        if seq >= BLOCKS {
                            return Ok(());
                        }
                        let delay = u64::from(delays[seq as usize] % 4) * 100;
                        thread::sleep(Duration::from_micros(delay));
                        queue.push(seq, seq)?;
                    }
                })
            })
            .collect();

        let consumer = scope.spawn(|| -> parz_core::Result<Vec<u64>> {
            let mut seen = Vec::new();
            while let Some(seq) = queue.pop()? {
                seen.push(seq);
            }
            Ok(seen)
        });

        for producer in producers {
            producer.join().map_err(|_| "producer panicked")??;
        }
        queue.close();
        Ok(consumer.join().map_err(|_| "consumer panicked")??)
    })?;

    let expected: Vec<u64> = (0..BLOCKS).collect();
    assert_eq!(observed, expected);
    Ok(())
}

#[test]
fn full_queue_still_admits_next_expected() -> Result<(), Box<dyn std::error::Error>> {
    let abort = AbortFlag::new();
    let queue = ReorderQueue::new(2, abort.clone());
    queue.push(2, "c")?;
    queue.push(3, "d")?;
    assert_eq!(queue.len(), 2);

    let drained = thread::scope(|scope| -> parz_core::Result<Vec<&str>> {
        let late = scope.spawn(|| queue.push(1, "b"));
        // Full with out-of-order items only, yet seq 0 is admitted.
        queue.push(0, "a")?;

        let mut drained = Vec::new();
        for _ in 0..4 {
            drained.push(queue.pop()?.ok_or(parz_core::ParzError::Cancelled)?);
        }
        late.join().map_err(|_| parz_core::ParzError::Cancelled)??;
        queue.close();
        assert_eq!(queue.pop()?, None);
        Ok(drained)
    })?;

    assert_eq!(drained, vec!["a", "b", "c", "d"]);
    assert!(!abort.is_raised());
    Ok(())
}

#[test]
fn abort_releases_blocked_stages() -> Result<(), Box<dyn std::error::Error>> {
    let abort = AbortFlag::new();
    let (read_queue, _read_receiver) = block_queue(1, abort.clone());
    let write_queue: ReorderQueue<u32> = ReorderQueue::new(1, abort.clone());
    read_queue.push(1u32)?;

    thread::scope(|scope| {
        let producer = scope.spawn(|| read_queue.push(2));
        let consumer = scope.spawn(|| write_queue.pop());
        thread::sleep(Duration::from_millis(30));
        abort.raise();

        let pushed = producer.join().map_err(|_| "producer panicked")?;
        let popped = consumer.join().map_err(|_| "consumer panicked")?;
        assert!(pushed.is_err_and(|error| error.is_cancelled()));
        assert!(popped.is_err_and(|error| error.is_cancelled()));
        Ok::<_, Box<dyn std::error::Error>>(())
    })?;
    Ok(())
}
