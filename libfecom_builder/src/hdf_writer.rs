use hdf5::types::VarLenUnicode;
use hdf5::File;
use ndarray::Array2;
use std::path::Path;
use std::str::FromStr;

use super::commissioning_event::CommissioningEvent;
use super::constants::{NUMBER_OF_ANODIC_TIMES, START_EVENT_NUMBER};
use super::electronic_id::ChannelKind;
use super::error::EventSinkError;
use super::event_sink::{builder_version, EventSink};

const EVENTS_NAME: &str = "events";
const CALO_HITS_NAME: &str = "calo_hits";
const TRACKER_CHANNEL_HITS_NAME: &str = "tracker_channel_hits";
const TRACKER_HITS_NAME: &str = "tracker_hits";

const CALO_COLUMNS: usize = 8; //hit_id, trigger_id, slot, channel, tdc_ns, falling_time_ns, lt, ht
const TRACKER_CHANNEL_COLUMNS: usize = 9; //hit_id, trigger_id, kind, slot, feast, channel, label, value, associated
const TRACKER_HIT_COLUMNS: usize = 6 + NUMBER_OF_ANODIC_TIMES; //trigger_id, side, layer, row, t0..t4, bot, top

/// Value written for an absent cell id or timestamp
const ABSENT: i64 = -1;

/// A simple struct which wraps around the hdf5-rust library.
///
/// Opens an HDF5 file for writing CommissioningEvents, one group per event.
#[derive(Debug)]
pub struct HDFWriter {
    file_handle: File,
    events_group: hdf5::Group,
    first_event: Option<u64>,
    last_event: u64,
    n_events: u64,
}
// Structure
// events - min_event, max_event, run_number, version
// |---- event_# - run_number, event_number, time_start_ns, traits
// |    |---- calo_hits(dset)
// |    |---- tracker_channel_hits(dset)
// |    |---- tracker_hits(dset)

impl HDFWriter {
    /// Create the writer, opening a file at path and creating the events group
    pub fn new(path: &Path, run_number: i32) -> Result<Self, EventSinkError> {
        let file_handle = File::create(path)?;

        let events_group = file_handle.create_group(EVENTS_NAME)?;
        events_group.new_attr::<u64>().create("min_event")?;
        events_group.new_attr::<u64>().create("max_event")?;
        events_group
            .new_attr::<i32>()
            .create("run_number")?
            .write_scalar(&run_number)?;
        events_group
            .new_attr::<VarLenUnicode>()
            .create("version")?
            .write_scalar(&VarLenUnicode::from_str(&builder_version())?)?;

        Ok(Self {
            file_handle,
            events_group,
            first_event: None,
            last_event: START_EVENT_NUMBER,
            n_events: 0,
        })
    }

    fn calo_matrix(event: &CommissioningEvent) -> Array2<f64> {
        let hits = event.calo_hits();
        let mut matrix = Array2::<f64>::zeros([hits.len(), CALO_COLUMNS]);
        for (row, hit) in hits.iter().enumerate() {
            matrix[[row, 0]] = hit.hit_id as f64;
            matrix[[row, 1]] = hit.trigger_id as f64;
            matrix[[row, 2]] = hit.electronic_id.slot as f64;
            matrix[[row, 3]] = hit.electronic_id.channel as f64;
            matrix[[row, 4]] = hit.tdc_ns;
            matrix[[row, 5]] = hit.falling_time_ns;
            matrix[[row, 6]] = hit.low_threshold as u8 as f64;
            matrix[[row, 7]] = hit.high_threshold as u8 as f64;
        }
        matrix
    }

    fn tracker_channel_matrix(event: &CommissioningEvent) -> Array2<u64> {
        let hits = event.tracker_channel_hits();
        let mut matrix = Array2::<u64>::zeros([hits.len(), TRACKER_CHANNEL_COLUMNS]);
        for (row, hit) in hits.iter().enumerate() {
            matrix[[row, 0]] = hit.hit_id;
            matrix[[row, 1]] = hit.trigger_id as u64;
            matrix[[row, 2]] = match hit.electronic_id.kind {
                ChannelKind::Calo => 0,
                ChannelKind::Anodic => 1,
                ChannelKind::Cathodic => 2,
            };
            matrix[[row, 3]] = hit.electronic_id.slot as u64;
            matrix[[row, 4]] = hit.electronic_id.feast as u64;
            matrix[[row, 5]] = hit.electronic_id.channel as u64;
            matrix[[row, 6]] = hit
                .timestamp_label
                .anodic_index()
                .unwrap_or(NUMBER_OF_ANODIC_TIMES) as u64;
            matrix[[row, 7]] = hit.timestamp_value;
            matrix[[row, 8]] = hit.is_associated() as u64;
        }
        matrix
    }

    fn tracker_hit_matrix(event: &CommissioningEvent) -> Array2<i64> {
        let hits = event.tracker_hits();
        let mut matrix = Array2::<i64>::from_elem([hits.len(), TRACKER_HIT_COLUMNS], ABSENT);
        let to_column = |value: Option<u64>| value.map_or(ABSENT, |v| v as i64);
        for (row, hit) in hits.iter().enumerate() {
            matrix[[row, 0]] = hit.trigger_id as i64;
            if let Some(cell) = &hit.cell_geometric_id {
                matrix[[row, 1]] = cell.side as i64;
                matrix[[row, 2]] = cell.layer as i64;
                matrix[[row, 3]] = cell.row as i64;
            }
            for (idx, timestamp) in hit.anodic_timestamps.iter().enumerate() {
                matrix[[row, 4 + idx]] = to_column(*timestamp);
            }
            matrix[[row, 4 + NUMBER_OF_ANODIC_TIMES]] = to_column(hit.bot_cathodic_timestamp);
            matrix[[row, 5 + NUMBER_OF_ANODIC_TIMES]] = to_column(hit.top_cathodic_timestamp);
        }
        matrix
    }

    /// Write an event, where the hit collections are converted into data matrices
    pub fn write_event(&mut self, event: &CommissioningEvent) -> Result<(), EventSinkError> {
        let (run_number, event_number) = match event.event_id() {
            Some(id) => (id.run_number, id.event_number),
            None => {
                spdlog::warn!("Refusing to write an event without an event id: {event}");
                return Ok(());
            }
        };
        self.first_event.get_or_insert(event_number);
        if event_number > self.last_event {
            self.last_event = event_number;
        }

        let event_group = self
            .events_group
            .create_group(&format!("event_{event_number}"))?;
        event_group
            .new_dataset_builder()
            .with_data(&Self::calo_matrix(event))
            .create(CALO_HITS_NAME)?;
        event_group
            .new_dataset_builder()
            .with_data(&Self::tracker_channel_matrix(event))
            .create(TRACKER_CHANNEL_HITS_NAME)?;
        event_group
            .new_dataset_builder()
            .with_data(&Self::tracker_hit_matrix(event))
            .create(TRACKER_HITS_NAME)?;
        event_group
            .new_attr::<i32>()
            .create("run_number")?
            .write_scalar(&run_number)?;
        event_group
            .new_attr::<u64>()
            .create("event_number")?
            .write_scalar(&event_number)?;
        event_group
            .new_attr::<f64>()
            .create("time_start_ns")?
            .write_scalar(&event.time_start_ns().unwrap_or(f64::NAN))?;
        event_group
            .new_attr::<u32>()
            .create("traits")?
            .write_scalar(&event.traits().as_raw_slice()[0])?;
        self.n_events += 1;
        Ok(())
    }

    /// Write meta information on first and last events
    pub fn close(&mut self) -> Result<(), EventSinkError> {
        self.events_group
            .attr("min_event")?
            .write_scalar(&self.first_event.unwrap_or(START_EVENT_NUMBER))?;
        self.events_group
            .attr("max_event")?
            .write_scalar(&self.last_event)?;
        self.file_handle.flush()?;
        spdlog::info!(
            "{} events written to {}",
            self.n_events,
            self.file_handle.filename()
        );
        Ok(())
    }
}

impl EventSink for HDFWriter {
    fn store(&mut self, event: &CommissioningEvent) -> Result<(), EventSinkError> {
        self.write_event(event)
    }

    fn finish(&mut self) -> Result<(), EventSinkError> {
        self.close()
    }
}
