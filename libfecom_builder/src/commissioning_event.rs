use bitvec::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::constants::TRACKER_ONLY_TRAIT_BIT;
use super::hit::{CaloHit, TrackerChannelHit};
use super::tracker_hit::TrackerHit;

/// Structural flags of an event. Bit 0 marks a tracker-only event.
pub type EventTraits = BitArr!(for 32, in u32, Lsb0);

/// Identity of an emitted event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId {
    pub run_number: i32,
    pub event_number: u64,
}

impl Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.run_number, self.event_number)
    }
}

mod traits_serde {
    use super::EventTraits;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(traits: &EventTraits, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(traits.as_raw_slice()[0])
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<EventTraits, D::Error> {
        let raw = u32::deserialize(deserializer)?;
        Ok(EventTraits::new([raw]))
    }
}

fn insert_sorted<T: Ord>(collection: &mut Vec<T>, item: T) -> bool {
    match collection.binary_search(&item) {
        Ok(_) => false,
        Err(idx) => {
            collection.insert(idx, item);
            true
        }
    }
}

/// CommissioningEvent is a group of time-coherent calorimeter and tracker channel hits.
///
/// Hit collections are kept sorted and unique by the hit ordering; adding a hit equal to one
/// already present is a no-op. Hits are never removed except by [CommissioningEvent::reset].
/// The tracker hits are filled by the cell resolver once the event is closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissioningEvent {
    event_id: Option<EventId>,
    time_start_ns: Option<f64>,
    #[serde(with = "traits_serde")]
    traits: EventTraits,
    calo_hits: Vec<CaloHit>,
    tracker_channel_hits: Vec<TrackerChannelHit>,
    tracker_hits: Vec<TrackerHit>,
}

impl Default for CommissioningEvent {
    fn default() -> Self {
        Self {
            event_id: None,
            time_start_ns: None,
            traits: EventTraits::ZERO,
            calo_hits: Vec::new(),
            tracker_channel_hits: Vec::new(),
            tracker_hits: Vec::new(),
        }
    }
}

impl CommissioningEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// An event is valid once it has been given an identity
    pub fn is_valid(&self) -> bool {
        self.event_id.is_some()
    }

    pub fn event_id(&self) -> Option<&EventId> {
        self.event_id.as_ref()
    }

    pub fn set_event_id(&mut self, event_id: EventId) {
        self.event_id = Some(event_id);
    }

    pub fn time_start_ns(&self) -> Option<f64> {
        self.time_start_ns
    }

    pub fn set_time_start_ns(&mut self, time_start_ns: f64) {
        self.time_start_ns = Some(time_start_ns);
    }

    pub fn traits(&self) -> &EventTraits {
        &self.traits
    }

    pub fn set_trait(&mut self, bit: usize, value: bool) {
        self.traits.set(bit, value);
    }

    pub fn is_tracker_only(&self) -> bool {
        self.traits[TRACKER_ONLY_TRAIT_BIT]
    }

    /// Add a calorimeter hit. Returns false if an identical hit is already present.
    pub fn add_calo_hit(&mut self, hit: CaloHit) -> bool {
        insert_sorted(&mut self.calo_hits, hit)
    }

    /// Add a tracker channel hit. Returns false if an identical hit is already present.
    pub fn add_tracker_channel_hit(&mut self, hit: TrackerChannelHit) -> bool {
        insert_sorted(&mut self.tracker_channel_hits, hit)
    }

    pub fn calo_hits(&self) -> &[CaloHit] {
        &self.calo_hits
    }

    pub fn tracker_channel_hits(&self) -> &[TrackerChannelHit] {
        &self.tracker_channel_hits
    }

    pub fn tracker_hits(&self) -> &[TrackerHit] {
        &self.tracker_hits
    }

    /// Mutable view for the cell resolver. A slice cannot be reordered or resized, so the
    /// sorted-unique invariant holds as long as only the association flags are written.
    pub(crate) fn tracker_channel_hits_mut(&mut self) -> &mut [TrackerChannelHit] {
        &mut self.tracker_channel_hits
    }

    pub(crate) fn push_tracker_hit(&mut self, hit: TrackerHit) {
        self.tracker_hits.push(hit);
    }

    pub fn is_empty(&self) -> bool {
        self.calo_hits.is_empty() && self.tracker_channel_hits.is_empty()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Display for CommissioningEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.event_id {
            Some(id) => write!(f, "Event {id}")?,
            None => write!(f, "Event <unset>")?,
        }
        match self.time_start_ns {
            Some(t) => write!(f, " -- Time start (ns): {t}")?,
            None => write!(f, " -- Time start (ns): <unset>")?,
        }
        write!(
            f,
            " Traits: {:#034b} Calo hits: {} Tracker channel hits: {} Tracker hits: {}",
            self.traits.as_raw_slice()[0],
            self.calo_hits.len(),
            self.tracker_channel_hits.len(),
            self.tracker_hits.len()
        )
    }
}
