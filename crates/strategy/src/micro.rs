//! Micro-range tracker
//!
//! Rolling (timestamp, mid) samples for one symbol, fed from the symbol's own
//! depth reads. Used to judge whether the market has recently moved far
//! enough to make a stop distance plausible.

use chrono::Duration;
use meridian_core::{Price, Timestamp};
use rust_decimal::Decimal;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct PriceWindow {
    samples: VecDeque<(Timestamp, Price)>,
    retention: Duration,
}

impl PriceWindow {
    pub fn new(retention: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            retention,
        }
    }

    pub fn record(&mut self, at: Timestamp, price: Price) {
        if price <= Decimal::ZERO {
            return;
        }
        self.samples.push_back((at, price));
        let horizon = at - self.retention;
        while self.samples.front().is_some_and(|(t, _)| *t < horizon) {
            self.samples.pop_front();
        }
    }

    /// (max - min) / min over samples no older than `window`; zero with fewer than two
    pub fn range(&self, now: Timestamp, window: Duration) -> Decimal {
        let since = now - window;
        let mut recent = self
            .samples
            .iter()
            .filter(|(t, _)| *t >= since)
            .map(|(_, p)| *p);
        let Some(first) = recent.next() else {
            return Decimal::ZERO;
        };
        let (mut low, mut high, mut count) = (first, first, 1usize);
        for price in recent {
            low = low.min(price);
            high = high.max(price);
            count += 1;
        }
        if count < 2 || low <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (high - low) / low
    }

    pub fn last(&self) -> Option<Price> {
        self.samples.back().map(|(_, p)| *p)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
