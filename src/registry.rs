//! Existence registry: a dense 2-D bitset over (topic, instance)
//!
//! Answers "has a node for (topic, instance) been created" in O(1) without
//! walking the node directory. The directory consults this as a fast reject
//! before scanning, and the two must never disagree: the bit for a pair is
//! set exactly while its node is alive (including tombstoned nodes).
//!
//! All of the word/bit index arithmetic lives in this module.

use crate::descriptor::TopicId;

const BITS_PER_WORD: usize = u32::BITS as usize;

/// Bit-indexed set of created (topic, instance) pairs
///
/// Backing store is one bit per pair, `topic_count * max_instances` bits
/// total. Out-of-range queries return `false`; out-of-range updates are
/// no-ops. Neither is ever undefined behavior.
#[derive(Debug)]
pub struct ExistenceRegistry {
    words: Vec<u32>,
    topic_count: usize,
    max_instances: usize,
}

impl ExistenceRegistry {
    /// Create an empty registry for `topic_count` topics with
    /// `max_instances` instances each
    pub fn new(topic_count: usize, max_instances: usize) -> Self {
        let total_bits = topic_count * max_instances;
        let words = total_bits.div_ceil(BITS_PER_WORD);
        Self {
            words: vec![0; words],
            topic_count,
            max_instances,
        }
    }

    /// Number of topics this registry covers
    pub fn topic_count(&self) -> usize {
        self.topic_count
    }

    /// Instance cap per topic
    pub fn max_instances(&self) -> usize {
        self.max_instances
    }

    /// Whether (topic, instance) is inside the registry's bounds
    pub fn in_bounds(&self, topic: TopicId, instance: u8) -> bool {
        (topic as usize) < self.topic_count && (instance as usize) < self.max_instances
    }

    /// Check whether a node exists for (topic, instance)
    pub fn exists(&self, topic: TopicId, instance: u8) -> bool {
        match self.index(topic, instance) {
            Some((word, bit)) => self.words[word] & (1 << bit) != 0,
            None => false,
        }
    }

    /// Mark (topic, instance) as existing
    pub fn mark(&mut self, topic: TopicId, instance: u8) {
        if let Some((word, bit)) = self.index(topic, instance) {
            self.words[word] |= 1 << bit;
        }
    }

    /// Clear the existence bit for (topic, instance)
    pub fn clear(&mut self, topic: TopicId, instance: u8) {
        if let Some((word, bit)) = self.index(topic, instance) {
            self.words[word] &= !(1 << bit);
        }
    }

    /// Number of set bits, for stats and diagnostics
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Whether no node exists at all
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    fn index(&self, topic: TopicId, instance: u8) -> Option<(usize, usize)> {
        if !self.in_bounds(topic, instance) {
            return None;
        }
        let bit_index = topic as usize * self.max_instances + instance as usize;
        Some((bit_index / BITS_PER_WORD, bit_index % BITS_PER_WORD))
    }
}
