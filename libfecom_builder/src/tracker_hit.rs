use serde::{Deserialize, Serialize};

use super::constants::{NUMBER_OF_ANODIC_TIMES, TRACKER_CLOCK_TICK_NS};
use super::electronic_id::CellId;

/// TrackerHit is a single drift cell firing, rebuilt from its electrode channels.
///
/// Slots hold the raw TDC timestamp values; times in ns are derived with the tracker clock.
/// Any slot may be empty. A hit without a cell id comes from a channel that is not in
/// the channel map and is kept for bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerHit {
    pub trigger_id: u32,
    pub cell_geometric_id: Option<CellId>,
    pub anodic_timestamps: [Option<u64>; NUMBER_OF_ANODIC_TIMES],
    pub bot_cathodic_timestamp: Option<u64>,
    pub top_cathodic_timestamp: Option<u64>,
}

fn to_ns(timestamp: Option<u64>) -> Option<f64> {
    timestamp.map(|value| value as f64 * TRACKER_CLOCK_TICK_NS)
}

impl TrackerHit {
    pub fn new(trigger_id: u32) -> Self {
        Self {
            trigger_id,
            ..Default::default()
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.cell_geometric_id.is_some()
    }

    /// Anodic time for register `index` (0..=4) in ns
    pub fn anodic_time_ns(&self, index: usize) -> Option<f64> {
        to_ns(self.anodic_timestamps.get(index).copied().flatten())
    }

    pub fn bot_cathodic_time_ns(&self) -> Option<f64> {
        to_ns(self.bot_cathodic_timestamp)
    }

    pub fn top_cathodic_time_ns(&self) -> Option<f64> {
        to_ns(self.top_cathodic_timestamp)
    }

    /// Number of filled timestamp slots
    pub fn n_filled(&self) -> usize {
        self.anodic_timestamps.iter().filter(|t| t.is_some()).count()
            + self.bot_cathodic_timestamp.is_some() as usize
            + self.top_cathodic_timestamp.is_some() as usize
    }

    /// The reference time of the cell, the anodic R0 register
    pub fn time_ns(&self) -> Option<f64> {
        self.anodic_time_ns(0)
    }
}
