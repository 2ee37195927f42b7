use super::channel_map::ChannelMap;
use super::commissioning_event::CommissioningEvent;
use super::electronic_id::ElectronicId;
use super::error::CellResolverError;
use super::hit::{TimestampLabel, TrackerChannelHit};
use super::tracker_hit::TrackerHit;

/// Counts of what a single resolution pass produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveSummary {
    pub tracker_hits: usize,
    pub unmapped_channels: usize,
}

/// Find the first hit matching the channel (and label if given). The hit is claimed only if it
/// has not been claimed before; the index of a claimed hit is returned.
fn claim_sibling(
    hits: &mut [TrackerChannelHit],
    sibling: &ElectronicId,
    label: Option<TimestampLabel>,
) -> Option<usize> {
    let idx = hits.iter().position(|hit| {
        hit.electronic_id.same_tracker_channel(sibling)
            && label.map_or(true, |l| hit.timestamp_label == l)
    })?;
    if hits[idx].is_associated() {
        return None;
    }
    hits[idx].mark_associated();
    Some(idx)
}

/// CellResolver turns the raw tracker channel hits of a closed event into TrackerHits.
///
/// Each unclaimed channel hit, walked in the event's order, anchors one TrackerHit. The anchor's
/// cell siblings are searched in the same event and every hit found is claimed, so that no
/// channel hit is ever consumed by two TrackerHits.
#[derive(Debug)]
pub struct CellResolver<'a> {
    map: &'a ChannelMap,
}

impl<'a> CellResolver<'a> {
    pub fn new(map: &'a ChannelMap) -> Self {
        Self { map }
    }

    /// Resolve the event's tracker channel hits in place, appending TrackerHits to the event.
    ///
    /// Channels missing from the map still give a TrackerHit carrying only the trigger id.
    /// A channel whose kind disagrees with the mapped electrode fails the whole event.
    pub fn resolve(
        &self,
        event: &mut CommissioningEvent,
    ) -> Result<ResolveSummary, CellResolverError> {
        let mut summary = ResolveSummary::default();
        let n_hits = event.tracker_channel_hits().len();

        for anchor_idx in 0..n_hits {
            let hits = event.tracker_channel_hits_mut();
            if hits[anchor_idx].is_associated() {
                continue;
            }
            let anchor_id = hits[anchor_idx].electronic_id;
            let mut tracker_hit = TrackerHit::new(hits[anchor_idx].trigger_id);

            if !anchor_id.kind.is_tracker() {
                return Err(CellResolverError::NotTrackerChannel(anchor_id));
            }

            let geom = match self.map.get_tracker_geometric_id(&anchor_id) {
                Some(geom) => *geom,
                None => {
                    spdlog::debug!("Tracker channel {anchor_id} is not in the channel map");
                    hits[anchor_idx].mark_associated();
                    event.push_tracker_hit(tracker_hit);
                    summary.tracker_hits += 1;
                    summary.unmapped_channels += 1;
                    continue;
                }
            };

            if geom.electrode.channel_kind() != anchor_id.kind {
                return Err(CellResolverError::MappingInconsistency {
                    id: anchor_id,
                    expected: geom.electrode.channel_kind(),
                });
            }

            tracker_hit.cell_geometric_id = Some(geom.cell);
            if let Some(siblings) = self.map.get_cell_channels(&anchor_id) {
                if let Some(anode) = &siblings.anode {
                    for label in TimestampLabel::ANODIC {
                        if let Some(idx) = claim_sibling(hits, anode, Some(label)) {
                            if let Some(slot) = label.anodic_index() {
                                tracker_hit.anodic_timestamps[slot] =
                                    Some(hits[idx].timestamp_value);
                            }
                        }
                    }
                }
                if let Some(bottom) = &siblings.bottom_cathode {
                    if let Some(idx) = claim_sibling(hits, bottom, None) {
                        tracker_hit.bot_cathodic_timestamp = Some(hits[idx].timestamp_value);
                    }
                }
                if let Some(top) = &siblings.top_cathode {
                    if let Some(idx) = claim_sibling(hits, top, None) {
                        tracker_hit.top_cathodic_timestamp = Some(hits[idx].timestamp_value);
                    }
                }
            }

            // The anchor may be shadowed by an earlier hit on the same channel
            if !hits[anchor_idx].is_associated() {
                hits[anchor_idx].mark_associated();
            }
            event.push_tracker_hit(tracker_hit);
            summary.tracker_hits += 1;
        }

        Ok(summary)
    }
}
