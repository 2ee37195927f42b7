use serde::Deserialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::commissioning_event::CommissioningEvent;
use super::error::EventSinkError;

/// This is the version of the output format
pub const FORMAT_VERSION: &str = "1.0";

/// The builder version string written into every output file
pub fn builder_version() -> String {
    format!("{}:{}", env!("CARGO_PKG_NAME"), FORMAT_VERSION)
}

/// EventSink is where finished events go.
///
/// Errors are the sink's own and are passed up to the run unmodified.
pub trait EventSink {
    /// Store one finished event
    fn store(&mut self, event: &CommissioningEvent) -> Result<(), EventSinkError>;

    /// Write any meta information and flush. Called once after the last event
    fn finish(&mut self) -> Result<(), EventSinkError> {
        Ok(())
    }
}

impl EventSink for Vec<CommissioningEvent> {
    fn store(&mut self, event: &CommissioningEvent) -> Result<(), EventSinkError> {
        self.push(event.clone());
        Ok(())
    }
}

/// Writes events as a stream of YAML documents, one document per event.
///
/// The stream opens with a comment header naming the builder version, the run and the creation
/// time. It can be read back with [read_yaml_events].
#[derive(Debug)]
pub struct YamlWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    n_events: u64,
    first_event: Option<u64>,
    last_event: Option<u64>,
}

impl YamlWriter {
    /// Create the writer, opening a file at path and writing the header
    pub fn new(path: &Path, run_number: i32) -> Result<Self, EventSinkError> {
        let mut writer = BufWriter::new(File::create(path)?);
        let created = OffsetDateTime::now_utc().format(&Rfc3339)?;
        writeln!(writer, "# {}", builder_version())?;
        writeln!(writer, "# run: {run_number}")?;
        writeln!(writer, "# created: {created}")?;
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            n_events: 0,
            first_event: None,
            last_event: None,
        })
    }

    pub fn n_events(&self) -> u64 {
        self.n_events
    }
}

impl EventSink for YamlWriter {
    fn store(&mut self, event: &CommissioningEvent) -> Result<(), EventSinkError> {
        writeln!(self.writer, "---")?;
        self.writer
            .write_all(serde_yaml::to_string(event)?.as_bytes())?;
        if let Some(id) = event.event_id() {
            self.first_event.get_or_insert(id.event_number);
            self.last_event = Some(id.event_number);
        }
        self.n_events += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), EventSinkError> {
        self.writer.flush()?;
        let size = self.path.metadata()?.len();
        match (self.first_event, self.last_event) {
            (Some(first), Some(last)) => spdlog::info!(
                "{} events (#{first} to #{last}) written to {:?} ({})",
                self.n_events,
                self.path,
                human_bytes::human_bytes(size as f64)
            ),
            _ => spdlog::info!(
                "{} events written to {:?} ({})",
                self.n_events,
                self.path,
                human_bytes::human_bytes(size as f64)
            ),
        }
        Ok(())
    }
}

/// Read back every event of a file written by a [YamlWriter]
///
/// A file without events still holds the header comments, which parse as an empty document.
pub fn read_yaml_events(path: &Path) -> Result<Vec<CommissioningEvent>, EventSinkError> {
    let yaml_str = std::fs::read_to_string(path)?;
    let mut events = Vec::new();
    for document in serde_yaml::Deserializer::from_str(&yaml_str) {
        if let Some(event) = Option::<CommissioningEvent>::deserialize(document)? {
            events.push(event);
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commissioning_event::EventId;
    use crate::electronic_id::{CellId, ChannelKind, ElectronicId};
    use crate::hit::{CaloHit, TimestampLabel, TrackerChannelHit};
    use crate::tracker_hit::TrackerHit;

    fn event(event_number: u64) -> CommissioningEvent {
        let mut event = CommissioningEvent::new();
        event.set_event_id(EventId {
            run_number: 7,
            event_number,
        });
        event.set_time_start_ns(1050.0);
        event.add_calo_hit(CaloHit {
            hit_id: 3,
            trigger_id: 1,
            electronic_id: ElectronicId::calo(2, 4),
            tdc_ns: 1000.0,
            falling_time_ns: 50.0,
            low_threshold: true,
            high_threshold: true,
        });
        event.add_tracker_channel_hit(TrackerChannelHit::new(
            4,
            1,
            ElectronicId::tracker(ChannelKind::Anodic, 2, 1, 9),
            TimestampLabel::R0,
            88,
        ));
        let mut hit = TrackerHit::new(1);
        hit.cell_geometric_id = Some(CellId {
            side: 0,
            layer: 8,
            row: 12,
        });
        hit.anodic_timestamps[0] = Some(88);
        event.push_tracker_hit(hit);
        event
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_0007.yaml");
        let mut writer = YamlWriter::new(&path, 7).unwrap();
        writer.store(&event(0)).unwrap();
        writer.store(&event(1)).unwrap();
        writer.finish().unwrap();
        assert_eq!(writer.n_events(), 2);

        let events = read_yaml_events(&path).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], event(0));
        assert_eq!(events[1].event_id().unwrap().event_number, 1);
        assert_eq!(events[1].tracker_hits()[0].anodic_timestamps[0], Some(88));
    }

    #[test]
    fn test_empty_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_0008.yaml");
        let mut writer = YamlWriter::new(&path, 8).unwrap();
        writer.finish().unwrap();
        assert!(read_yaml_events(&path).unwrap().is_empty());
    }

    #[test]
    fn test_vec_sink() {
        let mut sink: Vec<CommissioningEvent> = Vec::new();
        sink.store(&event(5)).unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.len(), 1);
    }
}
