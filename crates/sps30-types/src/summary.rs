//! Per-channel statistics over a set of readings.

use crate::types::{Channel, Reading};

/// Current, average and maximum of one channel.
///
/// Non-finite values are skipped; a statistic is `None` when no finite
/// value is left to compute it from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSummary {
    pub channel: Channel,
    /// Value of the most recent reading.
    pub current: Option<f32>,
    pub average: Option<f32>,
    pub max: Option<f32>,
}

impl ChannelSummary {
    /// Summarize one channel of `readings`, which must be ordered oldest first.
    #[must_use]
    pub fn compute(channel: Channel, readings: &[Reading]) -> Self {
        let current = readings
            .last()
            .map(|r| r.value(channel))
            .filter(|v| v.is_finite());

        let mut sum = 0.0f64;
        let mut count = 0usize;
        let mut max: Option<f32> = None;
        for value in readings.iter().map(|r| r.value(channel)) {
            if !value.is_finite() {
                continue;
            }
            sum += f64::from(value);
            count += 1;
            max = Some(max.map_or(value, |m| m.max(value)));
        }

        let average = (count > 0).then(|| (sum / count as f64) as f32);

        Self {
            channel,
            current,
            average,
            max,
        }
    }
}

/// Statistics for every channel over a window of readings.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    /// Number of readings summarized.
    pub count: usize,
    /// One entry per channel, in [`Channel::ALL`] order.
    pub channels: [ChannelSummary; 4],
}

impl Summary {
    /// Summarize `readings` (oldest first). Returns `None` when empty.
    #[must_use]
    pub fn from_readings(readings: &[Reading]) -> Option<Self> {
        if readings.is_empty() {
            return None;
        }
        Some(Self {
            count: readings.len(),
            channels: Channel::ALL.map(|channel| ChannelSummary::compute(channel, readings)),
        })
    }

    /// Statistics of a single channel.
    #[must_use]
    pub fn channel(&self, channel: Channel) -> &ChannelSummary {
        // ALL is in declaration order, so the discriminant is the index.
        &self.channels[channel as usize]
    }
}
