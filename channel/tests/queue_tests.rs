//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Ordering tests for the write queue feeding a pipe

use bytes::Bytes;
use proptest::prelude::*;
use sockline_channel::{ChannelError, ChannelOrigin, ChannelPair, WriteQueue};
use std::sync::Arc;
use std::time::Duration;

/// Enqueue one pipe write per payload, each delayed before it writes
async fn write_with_delays(delays: &[u64]) -> Vec<u64> {
    let pair = Arc::new(ChannelPair::new(ChannelOrigin::Http, delays.len().max(1)));
    let queue = WriteQueue::new();

    for (index, delay) in delays.iter().copied().enumerate() {
        let pair = pair.clone();
        drop(queue.enqueue(move || async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            pair.output()
                .write(Bytes::from(index.to_string()))
                .await
        }));
    }
    queue.drain().await.unwrap();
    pair.output().complete();

    let mut seen = Vec::new();
    while let Some(data) = pair.output().read().await {
        let text = String::from_utf8(data.to_vec()).unwrap();
        seen.push(text.parse().unwrap());
    }
    seen
}

proptest! {
    #[test]
    fn prop_writes_land_in_enqueue_order(delays in prop::collection::vec(0u64..50, 1..24)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        let seen = runtime.block_on(write_with_delays(&delays));
        let expected: Vec<u64> = (0..delays.len() as u64).collect();
        prop_assert_eq!(seen, expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_keep_their_own_order() {
    let pair = Arc::new(ChannelPair::new(ChannelOrigin::Duplex, 8));
    let queue = Arc::new(WriteQueue::new());
    const PRODUCERS: usize = 4;
    const WRITES: usize = 50;

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let pair = pair.clone();
            let queue = queue.clone();
            tokio::spawn(async move {
                for sequence in 0..WRITES {
                    let pair = pair.clone();
                    let payload = format!("{producer}:{sequence}");
                    drop(queue.enqueue(move || async move {
                        pair.output().write(Bytes::from(payload)).await
                    }));
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    let reader = {
        let pair = pair.clone();
        tokio::spawn(async move {
            let mut next = [0usize; PRODUCERS];
            let mut total = 0;
            while let Some(data) = pair.output().read().await {
                let text = String::from_utf8(data.to_vec()).unwrap();
                let (producer, sequence) = text.split_once(':').unwrap();
                let producer: usize = producer.parse().unwrap();
                let sequence: usize = sequence.parse().unwrap();
                assert_eq!(next[producer], sequence, "producer {producer} reordered");
                next[producer] += 1;
                total += 1;
            }
            total
        })
    };

    for producer in producers {
        producer.await.unwrap();
    }
    queue.drain().await.unwrap();
    pair.output().complete();

    assert_eq!(reader.await.unwrap(), PRODUCERS * WRITES);
}

#[tokio::test]
async fn test_writes_after_abort_fail_in_order() {
    let pair = Arc::new(ChannelPair::new(ChannelOrigin::Http, 4));
    let queue = WriteQueue::new();
    pair.abort();

    let first = {
        let pair = pair.clone();
        queue.enqueue(move || async move { pair.output().write(Bytes::from_static(b"a")).await })
    };
    let second = {
        let pair = pair.clone();
        queue.enqueue(move || async move { pair.output().write(Bytes::from_static(b"b")).await })
    };

    assert_eq!(first.await, Err(ChannelError::Closed));
    assert_eq!(second.await, Err(ChannelError::Closed));
}
