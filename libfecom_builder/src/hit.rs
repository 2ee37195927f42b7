use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Display;
use std::str::FromStr;

use super::constants::TRACKER_CLOCK_TICK_NS;
use super::electronic_id::{ChannelKind, ElectronicId};
use super::error::ElectronicIdError;

/// A single calorimeter channel pulse as read out by the crate.
///
/// Hits are ordered (and deduplicated) by trigger id, then electronic id, then
/// leading-edge time and falling time. The hit id and threshold flags do not take
/// part in the ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaloHit {
    pub hit_id: u64,
    pub trigger_id: u32,
    pub electronic_id: ElectronicId,
    pub tdc_ns: f64,
    pub falling_time_ns: f64,
    pub low_threshold: bool,
    pub high_threshold: bool,
}

impl CaloHit {
    /// Time used by the event builder: the falling edge of the pulse
    pub fn time_ns(&self) -> f64 {
        self.tdc_ns + self.falling_time_ns
    }

    pub fn is_valid(&self) -> bool {
        self.electronic_id.kind == ChannelKind::Calo
            && self.electronic_id.is_valid()
            && self.tdc_ns.is_finite()
            && self.falling_time_ns.is_finite()
    }

    /// Did either discriminator fire
    pub fn is_above_threshold(&self) -> bool {
        self.low_threshold || self.high_threshold
    }

    fn order_key(&self, other: &Self) -> Ordering {
        self.trigger_id
            .cmp(&other.trigger_id)
            .then_with(|| self.electronic_id.cmp(&other.electronic_id))
            .then_with(|| self.tdc_ns.total_cmp(&other.tdc_ns))
            .then_with(|| self.falling_time_ns.total_cmp(&other.falling_time_ns))
    }
}

impl PartialEq for CaloHit {
    fn eq(&self, other: &Self) -> bool {
        self.order_key(other) == Ordering::Equal
    }
}

impl Eq for CaloHit {}

impl PartialOrd for CaloHit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CaloHit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order_key(other)
    }
}

/// The timestamp register a tracker channel value was read from.
///
/// Anodes read out five registers (R0..R4), each cathode a single one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimestampLabel {
    R0,
    R1,
    R2,
    R3,
    R4,
    #[serde(rename = "R5")]
    Cathodic,
}

impl TimestampLabel {
    pub const ANODIC: [TimestampLabel; 5] = [Self::R0, Self::R1, Self::R2, Self::R3, Self::R4];

    /// Index of the anodic register, None for the cathodic label
    pub fn anodic_index(&self) -> Option<usize> {
        match self {
            Self::R0 => Some(0),
            Self::R1 => Some(1),
            Self::R2 => Some(2),
            Self::R3 => Some(3),
            Self::R4 => Some(4),
            Self::Cathodic => None,
        }
    }

    /// Channel kind this label can be read out from
    pub fn channel_kind(&self) -> ChannelKind {
        match self {
            Self::Cathodic => ChannelKind::Cathodic,
            _ => ChannelKind::Anodic,
        }
    }
}

impl FromStr for TimestampLabel {
    type Err = ElectronicIdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "R0" => Ok(Self::R0),
            "R1" => Ok(Self::R1),
            "R2" => Ok(Self::R2),
            "R3" => Ok(Self::R3),
            "R4" => Ok(Self::R4),
            // Bottom and top cathodes were historically written as R5 and R6
            "R5" | "R6" => Ok(Self::Cathodic),
            _ => Err(ElectronicIdError::BadTimestampLabel(s.to_string())),
        }
    }
}

impl Display for TimestampLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.anodic_index() {
            Some(idx) => write!(f, "R{idx}"),
            None => write!(f, "R5"),
        }
    }
}

/// A single raw tracker electrode signal.
///
/// Hits are ordered (and deduplicated) by trigger id, then electronic id, then timestamp
/// label, then timestamp value. This order decides which hit anchors a cell when the
/// cell resolver runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerChannelHit {
    pub hit_id: u64,
    pub trigger_id: u32,
    pub electronic_id: ElectronicId,
    pub timestamp_label: TimestampLabel,
    pub timestamp_value: u64,
    pub timestamp_time_ns: f64,
    #[serde(default)]
    associated: bool,
}

impl TrackerChannelHit {
    /// Create a new hit, converting the raw timestamp to ns using the tracker clock
    pub fn new(
        hit_id: u64,
        trigger_id: u32,
        electronic_id: ElectronicId,
        timestamp_label: TimestampLabel,
        timestamp_value: u64,
    ) -> Self {
        Self {
            hit_id,
            trigger_id,
            electronic_id,
            timestamp_label,
            timestamp_value,
            timestamp_time_ns: timestamp_value as f64 * TRACKER_CLOCK_TICK_NS,
            associated: false,
        }
    }

    pub fn time_ns(&self) -> f64 {
        self.timestamp_time_ns
    }

    /// A hit is valid if its address is a tracker channel of the crate, its time is set, and
    /// its label can be read from its channel kind.
    pub fn is_valid(&self) -> bool {
        if !self.electronic_id.kind.is_tracker()
            || !self.electronic_id.is_valid()
            || !self.timestamp_time_ns.is_finite()
        {
            return false;
        }
        // Kind mismatches against the mapping are judged by the cell resolver
        self.timestamp_label.channel_kind() == self.electronic_id.kind
    }

    /// Registers with a null value were never latched
    pub fn has_timestamp(&self) -> bool {
        self.timestamp_value != 0 && self.timestamp_time_ns > 0.0
    }

    /// Has this hit been claimed by a tracker hit
    pub fn is_associated(&self) -> bool {
        self.associated
    }

    pub(crate) fn mark_associated(&mut self) {
        self.associated = true;
    }

    /// Full reset of the association, used when an event is reused
    pub fn reset_association(&mut self) {
        self.associated = false;
    }

    fn order_key(&self, other: &Self) -> Ordering {
        self.trigger_id
            .cmp(&other.trigger_id)
            .then_with(|| self.electronic_id.cmp(&other.electronic_id))
            .then_with(|| self.timestamp_label.cmp(&other.timestamp_label))
            .then_with(|| self.timestamp_value.cmp(&other.timestamp_value))
    }
}

impl PartialEq for TrackerChannelHit {
    fn eq(&self, other: &Self) -> bool {
        self.order_key(other) == Ordering::Equal
    }
}

impl Eq for TrackerChannelHit {}

impl PartialOrd for TrackerChannelHit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TrackerChannelHit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order_key(other)
    }
}

/// A typed hit coming out of a hit source
#[derive(Debug, Clone, PartialEq)]
pub enum RawHit {
    Calo(CaloHit),
    Tracker(TrackerChannelHit),
}

impl RawHit {
    pub fn time_ns(&self) -> f64 {
        match self {
            Self::Calo(hit) => hit.time_ns(),
            Self::Tracker(hit) => hit.time_ns(),
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Self::Calo(hit) => hit.is_valid(),
            Self::Tracker(hit) => hit.is_valid(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anodic(channel: u16, label: TimestampLabel, value: u64) -> TrackerChannelHit {
        TrackerChannelHit::new(
            0,
            1,
            ElectronicId::tracker(ChannelKind::Anodic, 0, 0, channel),
            label,
            value,
        )
    }

    #[test]
    fn test_calo_time_is_falling_edge() {
        let hit = CaloHit {
            hit_id: 0,
            trigger_id: 0,
            electronic_id: ElectronicId::calo(0, 1),
            tdc_ns: 1000.0,
            falling_time_ns: 50.0,
            low_threshold: true,
            high_threshold: false,
        };
        assert_eq!(hit.time_ns(), 1050.0);
        assert!(hit.is_valid());
        assert!(hit.is_above_threshold());
    }

    #[test]
    fn test_calo_validity_requires_timing() {
        let hit = CaloHit {
            hit_id: 0,
            trigger_id: 0,
            electronic_id: ElectronicId::calo(0, 1),
            tdc_ns: f64::NAN,
            falling_time_ns: 50.0,
            low_threshold: false,
            high_threshold: false,
        };
        assert!(!hit.is_valid());
    }

    #[test]
    fn test_tracker_time_uses_clock_tick() {
        let hit = anodic(3, TimestampLabel::R0, 8);
        assert_eq!(hit.time_ns(), 100.0);
        assert!(hit.has_timestamp());
        assert!(!anodic(3, TimestampLabel::R0, 0).has_timestamp());
    }

    #[test]
    fn test_tracker_label_must_match_kind() {
        let mut hit = anodic(3, TimestampLabel::Cathodic, 8);
        assert!(!hit.is_valid());
        hit.electronic_id.kind = ChannelKind::Cathodic;
        assert!(hit.is_valid());
    }

    #[test]
    fn test_tracker_hit_on_calo_channel_is_invalid() {
        let mut hit = anodic(3, TimestampLabel::R0, 8);
        hit.electronic_id.kind = ChannelKind::Calo;
        assert!(!hit.is_valid());
    }

    #[test]
    fn test_tracker_ordering_ignores_hit_id_and_association() {
        let mut a = anodic(3, TimestampLabel::R1, 8);
        let mut b = a.clone();
        b.hit_id = 99;
        a.mark_associated();
        assert_eq!(a, b);
        let c = anodic(3, TimestampLabel::R0, 9);
        assert!(c < b);
        let d = anodic(2, TimestampLabel::R4, 9);
        assert!(d < c);
    }

    #[test]
    fn test_label_parsing() {
        assert_eq!(TimestampLabel::from_str("R3").unwrap(), TimestampLabel::R3);
        assert_eq!(
            TimestampLabel::from_str("R6").unwrap(),
            TimestampLabel::Cathodic
        );
        assert!(TimestampLabel::from_str("t0").is_err());
        assert_eq!(TimestampLabel::R2.to_string(), "R2");
    }
}
