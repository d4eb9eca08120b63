//! Concurrency stress tests: torn reads, racing lifecycle operations

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };
    use std::thread;

    use kestrel::{config, define_topic, Broker};

    define_topic!(COUNTER, 0, "stress_counter", 16);
    define_topic!(MULTI, 1, "stress_multi", 8);
    define_topic!(CHURN, 2, "stress_churn", 8);

    /// Payload is the counter value twice; a torn read would produce
    /// mismatched halves.
    fn counter_payload(value: u64) -> [u8; 16] {
        let mut payload = [0u8; 16];
        payload[..8].copy_from_slice(&value.to_le_bytes());
        payload[8..].copy_from_slice(&value.to_le_bytes());
        payload
    }

    #[test]
    fn test_no_torn_reads_under_contention() {
        const PUBLISHES: u64 = 20_000;
        const READERS: usize = 4;

        let broker = Arc::new(Broker::new(8));
        let advert = broker.advertise(&COUNTER, Some(&counter_payload(0)), 8).unwrap();
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                let broker = broker.clone();
                let done = done.clone();
                thread::spawn(move || {
                    let mut sub = broker.subscribe(&COUNTER).unwrap();
                    let mut dst = [0u8; 16];
                    let mut last_value = 0u64;
                    let mut reads = 0u64;
                    while !done.load(Ordering::Acquire) || reads == 0 {
                        if sub.copy(&broker, &mut dst).unwrap() == 0 {
                            continue;
                        }
                        let front = u64::from_le_bytes(dst[..8].try_into().unwrap());
                        let back = u64::from_le_bytes(dst[8..].try_into().unwrap());
                        assert_eq!(front, back, "torn payload observed");
                        assert!(front >= last_value, "reader went backwards");
                        last_value = front;
                        reads += 1;
                    }
                    broker.unsubscribe(sub);
                    reads
                })
            })
            .collect();

        for value in 1..=PUBLISHES {
            advert.publish(&counter_payload(value)).unwrap();
        }
        done.store(true, Ordering::Release);

        for reader in readers {
            assert!(reader.join().unwrap() > 0);
        }
        assert_eq!(advert.generation(), PUBLISHES as u32 + 1);
        broker.unadvertise(advert);
        assert_eq!(broker.node_count(), 0);
    }

    #[test]
    fn test_concurrent_multi_advertise_claims_unique_instances() {
        let broker = Arc::new(Broker::new(8));

        let attempts: Vec<_> = (0..config::MAX_INSTANCES * 2)
            .map(|_| {
                let broker = broker.clone();
                thread::spawn(move || broker.advertise_multi(&MULTI, None, 1).ok())
            })
            .collect();

        let mut claimed: Vec<u8> = attempts
            .into_iter()
            .filter_map(|handle| handle.join().unwrap())
            .map(|advert| advert.instance())
            .collect();
        claimed.sort_unstable();

        assert_eq!(claimed.len(), config::MAX_INSTANCES);
        assert_eq!(claimed, vec![0, 1, 2, 3]);
        assert_eq!(broker.node_count(), config::MAX_INSTANCES);
    }

    #[test]
    fn test_unadvertise_races_with_readers() {
        let broker = Arc::new(Broker::new(8));
        let advert = broker.advertise(&CHURN, None, 4).unwrap();
        for value in 1..=100u64 {
            advert.publish(&value.to_le_bytes()).unwrap();
        }

        let stop = Arc::new(AtomicBool::new(false));
        let readers: Vec<_> = (0..3)
            .map(|_| {
                let broker = broker.clone();
                let stop = stop.clone();
                thread::spawn(move || {
                    let mut sub = broker.subscribe(&CHURN).unwrap();
                    let mut dst = [0u8; 8];
                    while !stop.load(Ordering::Acquire) {
                        // Keeps working against the tombstoned node.
                        assert_eq!(sub.copy(&broker, &mut dst).unwrap(), 8);
                    }
                    broker.unsubscribe(sub);
                })
            })
            .collect();

        // Let readers attach before tombstoning the node under them.
        while broker.find_node(&CHURN, 0).map(|n| n.subscriber_count()).unwrap_or(0) < 3 {
            thread::yield_now();
        }
        broker.unadvertise(advert);
        assert!(!broker.exists(&CHURN, 0));

        stop.store(true, Ordering::Release);
        for reader in readers {
            reader.join().unwrap();
        }
        // Last detach swept the tombstone away.
        assert_eq!(broker.node_count(), 0);
    }

    #[test]
    fn test_subscribe_unsubscribe_churn() {
        let broker = Arc::new(Broker::new(8));
        let advert = broker.advertise(&CHURN, Some(&7u64.to_le_bytes()), 1).unwrap();

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let broker = broker.clone();
                thread::spawn(move || {
                    let mut dst = [0u8; 8];
                    for _ in 0..500 {
                        let mut sub = broker.subscribe(&CHURN).unwrap();
                        assert_eq!(sub.copy(&broker, &mut dst).unwrap(), 8);
                        assert_eq!(u64::from_le_bytes(dst), 7);
                        broker.unsubscribe(sub);
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        let node = broker.find_node(&CHURN, 0).unwrap();
        assert_eq!(node.subscriber_count(), 0);
        assert_eq!(broker.node_count(), 1);
        broker.unadvertise(advert);
        assert_eq!(broker.node_count(), 0);
    }
}
