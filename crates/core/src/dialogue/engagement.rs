use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;

use crate::types::{ActivityLevel, EngagementSnapshot};

/// Rolling window of user message timestamps.
#[derive(Debug)]
pub struct EngagementTracker {
    window: chrono::Duration,
    high_threshold: u32,
    medium_threshold: u32,
    activity: VecDeque<DateTime<Utc>>,
}

impl EngagementTracker {
    pub fn new(window: Duration, high_threshold: u32, medium_threshold: u32) -> Self {
        Self {
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX),
            high_threshold,
            medium_threshold,
            activity: VecDeque::new(),
        }
    }

    /// Record a user message. Entries older than the window are pruned.
    pub fn record_message(&mut self, at: DateTime<Utc>) {
        let pos = self.activity.partition_point(|t| *t <= at);
        self.activity.insert(pos, at);
        if let Some(&newest) = self.activity.back() {
            while self.activity.front().is_some_and(|t| newest - *t > self.window) {
                self.activity.pop_front();
            }
        }
    }

    /// Messages within the window ending at `now`.
    pub fn recent_count(&self, now: DateTime<Utc>) -> u32 {
        self.activity
            .iter()
            .filter(|t| **t <= now && now - **t <= self.window)
            .count() as u32
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> EngagementSnapshot {
        let recent_count = self.recent_count(now);
        // high == 0 is treated as always high rather than divided by.
        let score = if self.high_threshold > 0 {
            (recent_count as f32 / self.high_threshold as f32).min(1.0)
        } else {
            1.0
        };
        let level = if recent_count >= self.high_threshold {
            ActivityLevel::High
        } else if recent_count >= self.medium_threshold {
            ActivityLevel::Medium
        } else {
            ActivityLevel::Low
        };
        EngagementSnapshot { recent_count, score, level }
    }
}
