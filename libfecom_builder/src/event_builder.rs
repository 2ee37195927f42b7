use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;

use super::cell_resolver::CellResolver;
use super::channel_map::ChannelMap;
use super::commissioning_event::{CommissioningEvent, EventId};
use super::constants::{DEFAULT_GATE_NS, TRACKER_ONLY_TRAIT_BIT};
use super::error::EventBuilderError;
use super::hit::{CaloHit, RawHit, TrackerChannelHit};

/// Which hits are allowed to open a new event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpeningPolicy {
    /// Only a calorimeter hit opens an event; tracker hits outside of any event are dropped
    CaloOnly,
    /// A tracker hit outside of any event opens a tracker-only event
    CaloOrTracker,
}

impl Display for OpeningPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CaloOnly => write!(f, "calo_only"),
            Self::CaloOrTracker => write!(f, "calo_or_tracker"),
        }
    }
}

/// What to do with a hit record that fails to parse or fails its validity check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidRecordPolicy {
    /// Abort the whole run
    #[default]
    Abort,
    /// Log the record and continue with the next one
    Skip,
}

/// Settings of the EventBuilder state machine
#[derive(Debug, Clone, PartialEq)]
pub struct BuilderSettings {
    /// Event gate in ns, measured from the event time start
    pub gate_ns: f64,
    /// Gate in ns applied to calorimeter hits only. Defaults to `gate_ns`
    pub calo_gate_ns: Option<f64>,
    pub opening_policy: OpeningPolicy,
    /// Skip calorimeter hits which fired neither threshold
    pub require_calo_threshold: bool,
    /// Events with fewer calorimeter hits are not emitted
    pub min_calo_hits: usize,
    /// Events with fewer resolved tracker hits are not emitted
    pub min_tracker_hits: usize,
}

impl BuilderSettings {
    pub fn new(opening_policy: OpeningPolicy) -> Self {
        Self {
            gate_ns: DEFAULT_GATE_NS,
            calo_gate_ns: None,
            opening_policy,
            require_calo_threshold: false,
            min_calo_hits: 0,
            min_tracker_hits: 0,
        }
    }

    fn effective_calo_gate_ns(&self) -> f64 {
        self.calo_gate_ns.unwrap_or(self.gate_ns)
    }
}

/// Counters kept by the EventBuilder over a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuilderStats {
    pub calo_hits: u64,
    pub tracker_channel_hits: u64,
    pub below_threshold_calo_hits: u64,
    pub null_timestamp_tracker_hits: u64,
    pub orphan_tracker_hits: u64,
    pub unmapped_calo_hits: u64,
    pub unmapped_tracker_channels: u64,
    pub events_built: u64,
    pub events_rejected: u64,
    pub events_emitted: u64,
}

impl Display for BuilderStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Calo hits: {} (below threshold: {}, unmapped: {}) Tracker channel hits: {} (null timestamp: {}, outside of any event: {}, unmapped: {}) Events built: {} rejected: {} emitted: {}",
            self.calo_hits,
            self.below_threshold_calo_hits,
            self.unmapped_calo_hits,
            self.tracker_channel_hits,
            self.null_timestamp_tracker_hits,
            self.orphan_tracker_hits,
            self.unmapped_tracker_channels,
            self.events_built,
            self.events_rejected,
            self.events_emitted
        )
    }
}

/// State of the working event
#[derive(Debug, Clone, Copy, PartialEq)]
enum BuildState {
    Empty,
    OpenByCalo { calo_time_stop: f64, time_stop: f64 },
    OpenByTracker,
}

/// EventBuilder groups a time ordered stream of hits into CommissioningEvents.
///
/// An event is opened by an anchor hit, which sets its time start. Calorimeter hits are
/// added while they fall before the calorimeter gate stop, tracker hits while they fall before
/// the event gate stop; the first hit past its stop closes the event and anchors the next one.
/// An event opened by a tracker hit has no time bound and stays open until a calorimeter hit
/// arrives.
///
/// Closed events are resolved into tracker hits, filtered, and given their event number.
#[derive(Debug)]
pub struct EventBuilder {
    channel_map: Arc<ChannelMap>,
    settings: BuilderSettings,
    run_number: i32,
    next_event_number: u64,
    state: BuildState,
    working_event: CommissioningEvent,
    stats: BuilderStats,
}

impl EventBuilder {
    /// Create a new EventBuilder.
    ///
    /// Requires a ChannelMap, which is shared read-only with the CellResolver.
    pub fn new(
        channel_map: Arc<ChannelMap>,
        settings: BuilderSettings,
        run_number: i32,
        first_event_number: u64,
    ) -> Self {
        EventBuilder {
            channel_map,
            settings,
            run_number,
            next_event_number: first_event_number,
            state: BuildState::Empty,
            working_event: CommissioningEvent::new(),
            stats: BuilderStats::default(),
        }
    }

    pub fn stats(&self) -> &BuilderStats {
        &self.stats
    }

    pub fn run_number(&self) -> i32 {
        self.run_number
    }

    pub fn settings(&self) -> &BuilderSettings {
        &self.settings
    }

    pub fn has_open_event(&self) -> bool {
        self.state != BuildState::Empty
    }

    /// Add a hit to the event being built.
    ///
    /// Returns a `Result<Option<CommissioningEvent>>`. If the Option is None, no event was
    /// completed by this hit (or the completed event was filtered out). If the Option is Some,
    /// the hit closed the working event, and that event is returned ready to be stored.
    pub fn append_hit(
        &mut self,
        hit: RawHit,
    ) -> Result<Option<CommissioningEvent>, EventBuilderError> {
        match hit {
            RawHit::Calo(calo_hit) => self.append_calo_hit(calo_hit),
            RawHit::Tracker(tracker_hit) => self.append_tracker_hit(tracker_hit),
        }
    }

    fn append_calo_hit(
        &mut self,
        hit: CaloHit,
    ) -> Result<Option<CommissioningEvent>, EventBuilderError> {
        self.stats.calo_hits += 1;
        if self.settings.require_calo_threshold && !hit.is_above_threshold() {
            self.stats.below_threshold_calo_hits += 1;
            return Ok(None);
        }

        let time = hit.time_ns();
        match self.state {
            BuildState::OpenByCalo { calo_time_stop, .. } if time < calo_time_stop => {
                self.working_event.add_calo_hit(hit);
                Ok(None)
            }
            BuildState::Empty => {
                self.open_by_calo(hit);
                Ok(None)
            }
            // Out of the gate, or a calorimeter hit ending a tracker-only event
            _ => {
                let closed = self.take_working_event();
                self.open_by_calo(hit);
                self.finish_event(closed)
            }
        }
    }

    fn append_tracker_hit(
        &mut self,
        hit: TrackerChannelHit,
    ) -> Result<Option<CommissioningEvent>, EventBuilderError> {
        self.stats.tracker_channel_hits += 1;
        if !hit.has_timestamp() {
            self.stats.null_timestamp_tracker_hits += 1;
            return Ok(None);
        }

        let time = hit.time_ns();
        match self.state {
            BuildState::OpenByCalo { time_stop, .. } if time < time_stop => {
                self.working_event.add_tracker_channel_hit(hit);
                Ok(None)
            }
            BuildState::OpenByTracker => {
                self.working_event.add_tracker_channel_hit(hit);
                Ok(None)
            }
            BuildState::Empty => {
                self.open_by_tracker(hit);
                Ok(None)
            }
            BuildState::OpenByCalo { .. } => {
                let closed = self.take_working_event();
                self.open_by_tracker(hit);
                self.finish_event(closed)
            }
        }
    }

    fn open_by_calo(&mut self, hit: CaloHit) {
        let time_start = hit.time_ns();
        self.working_event.set_time_start_ns(time_start);
        self.working_event.add_calo_hit(hit);
        self.state = BuildState::OpenByCalo {
            calo_time_stop: time_start + self.settings.effective_calo_gate_ns(),
            time_stop: time_start + self.settings.gate_ns,
        };
    }

    fn open_by_tracker(&mut self, hit: TrackerChannelHit) {
        if self.settings.opening_policy == OpeningPolicy::CaloOnly {
            self.stats.orphan_tracker_hits += 1;
            return;
        }
        self.working_event.set_time_start_ns(hit.time_ns());
        self.working_event.set_trait(TRACKER_ONLY_TRAIT_BIT, true);
        self.working_event.add_tracker_channel_hit(hit);
        self.state = BuildState::OpenByTracker;
    }

    fn take_working_event(&mut self) -> CommissioningEvent {
        self.state = BuildState::Empty;
        std::mem::take(&mut self.working_event)
    }

    /// Resolve a closed event, apply the emission filters and give it its identity
    fn finish_event(
        &mut self,
        mut event: CommissioningEvent,
    ) -> Result<Option<CommissioningEvent>, EventBuilderError> {
        self.stats.events_built += 1;

        if !event.tracker_channel_hits().is_empty() {
            let summary = CellResolver::new(&self.channel_map).resolve(&mut event)?;
            self.stats.unmapped_tracker_channels += summary.unmapped_channels as u64;
        }
        self.stats.unmapped_calo_hits += event
            .calo_hits()
            .iter()
            .filter(|hit| !self.channel_map.is_calo_channel_mapped(&hit.electronic_id))
            .count() as u64;

        if event.calo_hits().len() < self.settings.min_calo_hits
            || event.tracker_hits().len() < self.settings.min_tracker_hits
        {
            self.stats.events_rejected += 1;
            return Ok(None);
        }

        event.set_event_id(EventId {
            run_number: self.run_number,
            event_number: self.next_event_number,
        });
        self.next_event_number += 1;
        self.stats.events_emitted += 1;
        spdlog::debug!("{event}");
        Ok(Some(event))
    }

    /// Takes the working event and flushes it as a final event.
    ///
    /// Used at the end of processing a run.
    /// Returns None if no event was open, or if the final event was filtered out.
    pub fn flush_final_event(&mut self) -> Result<Option<CommissioningEvent>, EventBuilderError> {
        if self.state == BuildState::Empty {
            return Ok(None);
        }
        let closed = self.take_working_event();
        self.finish_event(closed)
    }

    /// Drop the working event without emitting it. Used when a run is cancelled.
    pub fn discard_working_event(&mut self) {
        if self.has_open_event() {
            let event = self.take_working_event();
            spdlog::info!(
                "Discarded unfinished event with {} calo hits and {} tracker channel hits",
                event.calo_hits().len(),
                event.tracker_channel_hits().len()
            );
        }
    }
}
