/// Bounded sliding windows of samples and transactions
///
/// Every window has a fixed maximum length and evicts its oldest entries first.
use crate::types::{Sample, TickInput, TimestampMs, TransactionRecord};
use std::collections::VecDeque;

/// Rolling price/volume window plus the latest transaction list
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    /// Maximum number of samples to keep
    capacity: usize,
    /// Samples in arrival order
    samples: VecDeque<Sample>,
    /// Transactions supplied with the most recent accepted sample
    transactions: Vec<TransactionRecord>,
}

impl SampleBuffer {
    /// Create a new buffer with the given capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
            transactions: Vec::with_capacity(TickInput::MAX_TRANSACTIONS),
        }
    }

    /// Append a sample, evicting from the front once over capacity.
    ///
    /// Returns `false` without touching the buffer when price or volume is
    /// missing, so a scrape gap stalls the pipeline for one tick.
    pub fn append(&mut self, sample: Sample) -> bool {
        if !sample.is_valid() {
            return false;
        }

        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        true
    }

    /// Replace the transaction window with the newest records (at most 50).
    pub fn set_transactions(&mut self, transactions: &[TransactionRecord]) {
        self.transactions.clear();
        self.transactions.extend(
            transactions
                .iter()
                .take(TickInput::MAX_TRANSACTIONS)
                .cloned(),
        );
    }

    /// Change the capacity (operating mode switch), trimming the oldest entries.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get number of samples in the window
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the window is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Clear all samples and transactions
    pub fn clear(&mut self) {
        self.samples.clear();
        self.transactions.clear();
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn transactions(&self) -> &[TransactionRecord] {
        &self.transactions
    }

    /// Prices in arrival order
    pub fn prices(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.price).collect()
    }

    /// Volumes in arrival order
    pub fn volumes(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.volume).collect()
    }

    /// Highest price among samples with `after < timestamp <= until`.
    pub fn max_price_between(&self, after: TimestampMs, until: TimestampMs) -> Option<f64> {
        self.samples
            .iter()
            .filter(|s| s.timestamp > after && s.timestamp <= until)
            .map(|s| s.price)
            .fold(None, |max, p| Some(max.map_or(p, |m: f64| m.max(p))))
    }
}
