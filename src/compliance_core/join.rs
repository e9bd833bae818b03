//! Sliding processing-time window join of the PPE and people-count streams
//!
//! Windows are `[s, s + length)` for every `s` that is a multiple of `slide`.
//! A record belongs to `length / slide` overlapping windows, so one true pair of
//! records is emitted once per window they share. Duplicate suppression happens
//! downstream in [`super::dedup`].

use super::detection::CorrelationKey;
use super::records::{JoinedRecord, PeopleCountPercentage, PpePercentage};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct KeyBuffer {
    ppe: Vec<PpePercentage>,
    people: Vec<PeopleCountPercentage>,
}

#[derive(Debug, Default)]
struct JoinWindow {
    by_key: BTreeMap<CorrelationKey, KeyBuffer>,
}

pub struct SlidingWindowJoin {
    length_ms: i64,
    slide_ms: i64,
    /// Open windows by start time
    windows: BTreeMap<i64, JoinWindow>,
    /// Highest time passed to `advance`; windows ending at or before it are closed
    watermark_ms: i64,
}

impl SlidingWindowJoin {
    pub fn new(length_ms: i64, slide_ms: i64) -> Self {
        Self {
            length_ms,
            slide_ms,
            windows: BTreeMap::new(),
            watermark_ms: i64::MIN,
        }
    }

    pub fn insert_ppe(&mut self, record: PpePercentage) {
        let key = record.0.correlation_key();
        let ts = record.0.emitted_at_ms;
        for start in self.open_starts_for(ts) {
            self.buffer(start, &key).ppe.push(record.clone());
        }
    }

    pub fn insert_people(&mut self, record: PeopleCountPercentage) {
        let key = record.0.correlation_key();
        let ts = record.0.emitted_at_ms;
        for start in self.open_starts_for(ts) {
            self.buffer(start, &key).people.push(record.clone());
        }
    }

    /// Close every window ending at or before `now_ms` and emit its pairs,
    /// ordered by window close time.
    pub fn advance(&mut self, now_ms: i64) -> Vec<JoinedRecord> {
        self.watermark_ms = self.watermark_ms.max(now_ms);

        // Windows starting at or after this bound still end after `now_ms`
        let open_from = now_ms.saturating_sub(self.length_ms).saturating_add(1);
        let still_open = self.windows.split_off(&open_from);
        let closing = std::mem::replace(&mut self.windows, still_open);

        let mut joined = Vec::new();
        for (_, window) in closing {
            for (_, buffer) in window.by_key {
                // One-sided keys produce nothing
                for ppe in &buffer.ppe {
                    for people in &buffer.people {
                        joined.push(JoinedRecord::from_pair(ppe, people));
                    }
                }
            }
        }
        joined
    }

    pub fn open_window_count(&self) -> usize {
        self.windows.len()
    }

    fn buffer(&mut self, start: i64, key: &CorrelationKey) -> &mut KeyBuffer {
        self.windows
            .entry(start)
            .or_default()
            .by_key
            .entry(key.clone())
            .or_default()
    }

    /// Starts of all windows containing `ts` that have not closed yet
    fn open_starts_for(&self, ts: i64) -> Vec<i64> {
        let last_start = ts.div_euclid(self.slide_ms) * self.slide_ms;
        let first_start = last_start - self.length_ms + self.slide_ms;

        let mut starts = Vec::with_capacity((self.length_ms / self.slide_ms) as usize);
        let mut start = first_start;
        while start <= last_start {
            if start + self.length_ms > self.watermark_ms {
                starts.push(start);
            }
            start += self.slide_ms;
        }
        starts
    }
}
