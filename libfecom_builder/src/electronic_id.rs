use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

use super::constants::{
    NUMBER_OF_CALO_CHANNELS, NUMBER_OF_FEASTS, NUMBER_OF_SLOTS, NUMBER_OF_TRACKER_CHANNELS,
};
use super::error::ElectronicIdError;

/// The type of electronics channel a signal was read out from.
///
/// The ordering of the variants is part of the hit ordering (calo < anodic < cathodic).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Calo,
    Anodic,
    Cathodic,
}

impl ChannelKind {
    pub fn is_tracker(&self) -> bool {
        matches!(self, Self::Anodic | Self::Cathodic)
    }
}

impl FromStr for ChannelKind {
    type Err = ElectronicIdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "calo" => Ok(Self::Calo),
            "anodic" => Ok(Self::Anodic),
            "cathodic" => Ok(Self::Cathodic),
            _ => Err(ElectronicIdError::BadKind(s.to_string())),
        }
    }
}

impl Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Calo => write!(f, "calo"),
            Self::Anodic => write!(f, "anodic"),
            Self::Cathodic => write!(f, "cathodic"),
        }
    }
}

/// ElectronicId is the hardware address of a single readout channel.
///
/// Calorimeter channels are addressed by (slot, channel); the FEAST is always 0 for them.
/// Tracker channels are addressed by (slot, FEAST, channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElectronicId {
    pub kind: ChannelKind,
    pub slot: u16,
    pub feast: u16,
    pub channel: u16,
}

impl ElectronicId {
    pub fn calo(slot: u16, channel: u16) -> Self {
        Self {
            kind: ChannelKind::Calo,
            slot,
            feast: 0,
            channel,
        }
    }

    pub fn tracker(kind: ChannelKind, slot: u16, feast: u16, channel: u16) -> Self {
        Self {
            kind,
            slot,
            feast,
            channel,
        }
    }

    /// Check that the address fits within the commissioning crate
    pub fn is_valid(&self) -> bool {
        if self.slot >= NUMBER_OF_SLOTS {
            return false;
        }
        match self.kind {
            ChannelKind::Calo => self.feast == 0 && self.channel < NUMBER_OF_CALO_CHANNELS,
            ChannelKind::Anodic | ChannelKind::Cathodic => {
                self.feast < NUMBER_OF_FEASTS && self.channel < NUMBER_OF_TRACKER_CHANNELS
            }
        }
    }

    /// Exact-match key used when searching sibling channels within an event
    pub fn same_tracker_channel(&self, other: &ElectronicId) -> bool {
        self.kind == other.kind
            && self.slot == other.slot
            && self.feast == other.feast
            && self.channel == other.channel
    }
}

impl Display for ElectronicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}:{}.{}.{}]",
            self.kind, self.slot, self.feast, self.channel
        )
    }
}

/// Generate a unique id number for a given hardware location, ignoring the channel kind
pub fn generate_uuid(slot: &u16, feast: &u16, channel: &u16) -> u64 {
    (*channel as u64) + (*feast as u64) * 100 + (*slot as u64) * 10_000
}

/// The three electrodes read out for a single Geiger drift cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Electrode {
    Anode,
    BottomCathode,
    TopCathode,
}

impl Electrode {
    /// The kind of electronics channel wired to this electrode
    pub fn channel_kind(&self) -> ChannelKind {
        match self {
            Self::Anode => ChannelKind::Anodic,
            Self::BottomCathode | Self::TopCathode => ChannelKind::Cathodic,
        }
    }
}

impl FromStr for Electrode {
    type Err = ElectronicIdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anode" => Ok(Self::Anode),
            "bottom_cathode" => Ok(Self::BottomCathode),
            "top_cathode" => Ok(Self::TopCathode),
            _ => Err(ElectronicIdError::BadElectrode(s.to_string())),
        }
    }
}

/// Geometric address of a drift cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellId {
    pub side: u16,
    pub layer: u16,
    pub row: u16,
}

impl Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[cell:{}.{}.{}]", self.side, self.layer, self.row)
    }
}

/// Geometric address of a single tracker readout channel: the cell plus which electrode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackerGeomId {
    pub cell: CellId,
    pub electrode: Electrode,
}

/// Geometric address of a calorimeter optical module
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpticalModuleId {
    pub side: u16,
    pub column: u16,
    pub row: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_bounds() {
        assert!(ElectronicId::calo(19, 15).is_valid());
        assert!(!ElectronicId::calo(20, 0).is_valid());
        assert!(!ElectronicId::calo(0, 16).is_valid());
        assert!(ElectronicId::tracker(ChannelKind::Anodic, 3, 1, 53).is_valid());
        assert!(!ElectronicId::tracker(ChannelKind::Cathodic, 3, 2, 0).is_valid());
        assert!(!ElectronicId::tracker(ChannelKind::Anodic, 3, 0, 54).is_valid());
    }

    #[test]
    fn test_tracker_channel_match() {
        let a = ElectronicId::tracker(ChannelKind::Anodic, 0, 1, 7);
        let b = ElectronicId::tracker(ChannelKind::Anodic, 0, 1, 7);
        let other_slot = ElectronicId::tracker(ChannelKind::Anodic, 4, 1, 7);
        let c = ElectronicId::tracker(ChannelKind::Cathodic, 0, 1, 7);
        assert!(a.same_tracker_channel(&b));
        assert!(!a.same_tracker_channel(&other_slot));
        assert!(!a.same_tracker_channel(&c));
    }

    #[test]
    fn test_uuid_unique_over_crate() {
        let mut seen = std::collections::HashSet::new();
        for slot in 0..NUMBER_OF_SLOTS {
            for feast in 0..NUMBER_OF_FEASTS {
                for channel in 0..NUMBER_OF_TRACKER_CHANNELS {
                    assert!(seen.insert(generate_uuid(&slot, &feast, &channel)));
                }
            }
        }
    }

    #[test]
    fn test_electrode_parsing() {
        assert_eq!(Electrode::from_str("anode").unwrap(), Electrode::Anode);
        assert_eq!(
            Electrode::from_str("top_cathode").unwrap().channel_kind(),
            ChannelKind::Cathodic
        );
        assert!(Electrode::from_str("grid").is_err());
    }
}
