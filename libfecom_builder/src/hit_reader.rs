use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use super::electronic_id::{ChannelKind, ElectronicId};
use super::error::HitSourceError;
use super::hit::{CaloHit, RawHit, TimestampLabel, TrackerChannelHit};

const ENTRIES_PER_RECORD: usize = 9;
const CALO_TAG: &str = "calo";
const TRACKER_TAG: &str = "tracker";
const COMMENT_TAG: char = '#';

/// HitSource is anything that can hand out hits in time order, one at a time.
pub trait HitSource {
    /// Get the next hit of the stream
    ///
    /// Returns a `Result<Option<RawHit>>`. The Option is None once the source is exhausted.
    /// A record that cannot be turned into a valid hit gives a `MalformedRecord` error; the
    /// source has moved past it so a caller may keep reading.
    fn next_hit(&mut self) -> Result<Option<RawHit>, HitSourceError>;

    /// Number of bytes consumed so far, for progress reporting
    fn bytes_read(&self) -> u64 {
        0
    }
}

fn malformed(line: usize, reason: impl Into<String>) -> HitSourceError {
    HitSourceError::MalformedRecord {
        line,
        reason: reason.into(),
    }
}

fn parse_entry<T: FromStr>(entry: &str, name: &str, line: usize) -> Result<T, HitSourceError> {
    entry
        .trim()
        .parse::<T>()
        .map_err(|_| malformed(line, format!("could not parse {name} from '{entry}'")))
}

fn parse_flag(entry: &str, name: &str, line: usize) -> Result<bool, HitSourceError> {
    match entry.trim() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(malformed(line, format!("could not parse {name} from '{entry}'"))),
    }
}

/// Parse one record of the hit text format
fn parse_record(record: &str, line: usize) -> Result<RawHit, HitSourceError> {
    let entries: Vec<&str> = record.split_terminator(',').collect();
    if entries.len() != ENTRIES_PER_RECORD {
        return Err(malformed(
            line,
            format!("expected {ENTRIES_PER_RECORD} entries, found {}", entries.len()),
        ));
    }

    let hit = match entries[0].trim() {
        CALO_TAG => RawHit::Calo(CaloHit {
            hit_id: parse_entry(entries[1], "hit_id", line)?,
            trigger_id: parse_entry(entries[2], "trigger_id", line)?,
            electronic_id: ElectronicId::calo(
                parse_entry(entries[3], "slot", line)?,
                parse_entry(entries[4], "channel", line)?,
            ),
            tdc_ns: parse_entry(entries[5], "tdc_ns", line)?,
            falling_time_ns: parse_entry(entries[6], "falling_time_ns", line)?,
            low_threshold: parse_flag(entries[7], "low_threshold", line)?,
            high_threshold: parse_flag(entries[8], "high_threshold", line)?,
        }),
        TRACKER_TAG => {
            let kind = ChannelKind::from_str(entries[6].trim())
                .map_err(|e| malformed(line, e.to_string()))?;
            let label = TimestampLabel::from_str(entries[7].trim())
                .map_err(|e| malformed(line, e.to_string()))?;
            RawHit::Tracker(TrackerChannelHit::new(
                parse_entry(entries[1], "hit_id", line)?,
                parse_entry(entries[2], "trigger_id", line)?,
                ElectronicId::tracker(
                    kind,
                    parse_entry(entries[3], "slot", line)?,
                    parse_entry(entries[4], "feast", line)?,
                    parse_entry(entries[5], "channel", line)?,
                ),
                label,
                parse_entry(entries[8], "timestamp value", line)?,
            ))
        }
        other => return Err(malformed(line, format!("unknown record tag '{other}'"))),
    };

    if !hit.is_valid() {
        return Err(malformed(line, "deserialized hit is not valid"));
    }
    Ok(hit)
}

/// HitReader reads hits from the line based text format written by the crate decoder.
///
/// Each non-empty line not starting with `#` is one hit:
/// - `calo,hit_id,trigger_id,slot,channel,tdc_ns,falling_time_ns,low_threshold,high_threshold`
/// - `tracker,hit_id,trigger_id,slot,feast,channel,kind,label,value`
#[derive(Debug)]
pub struct HitReader<R: BufRead> {
    reader: R,
    buffer: String,
    line_number: usize,
    bytes_read: u64,
}

impl HitReader<BufReader<File>> {
    /// Open a hit file
    pub fn open(path: &Path) -> Result<Self, HitSourceError> {
        if !path.exists() {
            return Err(HitSourceError::BadFilePath(path.to_path_buf()));
        }
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> HitReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: String::new(),
            line_number: 0,
            bytes_read: 0,
        }
    }

    /// Line number of the last line read (starting from 1)
    pub fn line_number(&self) -> usize {
        self.line_number
    }
}

impl<R: BufRead> HitSource for HitReader<R> {
    fn next_hit(&mut self) -> Result<Option<RawHit>, HitSourceError> {
        loop {
            self.buffer.clear();
            let n_bytes = self.reader.read_line(&mut self.buffer)?;
            if n_bytes == 0 {
                return Ok(None);
            }
            self.bytes_read += n_bytes as u64;
            self.line_number += 1;

            let record = self.buffer.trim();
            if record.is_empty() || record.starts_with(COMMENT_TAG) {
                continue;
            }
            return parse_record(record, self.line_number).map(Some);
        }
    }

    fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

/// An in-memory HitSource, mostly for tests and for embedding the builder
#[derive(Debug, Default)]
pub struct MemoryHitSource {
    hits: VecDeque<RawHit>,
    position: usize,
}

impl MemoryHitSource {
    pub fn new(hits: Vec<RawHit>) -> Self {
        Self {
            hits: hits.into(),
            position: 0,
        }
    }
}

impl HitSource for MemoryHitSource {
    fn next_hit(&mut self) -> Result<Option<RawHit>, HitSourceError> {
        match self.hits.pop_front() {
            Some(hit) => {
                self.position += 1;
                if hit.is_valid() {
                    Ok(Some(hit))
                } else {
                    Err(malformed(self.position, "hit is not valid"))
                }
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    const HITS: &str = "# run 12
calo,0,1,3,11,1000.5,50.0,1,0

tracker,1,1,3,0,5,anodic,R0,80
tracker,2,1,3,1,7,cathodic,R5,96
";

    #[test]
    fn test_read_records() {
        let mut reader = HitReader::new(Cursor::new(HITS));
        match reader.next_hit().unwrap() {
            Some(RawHit::Calo(hit)) => {
                assert_eq!(hit.electronic_id, ElectronicId::calo(3, 11));
                assert_eq!(hit.time_ns(), 1050.5);
                assert!(hit.low_threshold);
                assert!(!hit.high_threshold);
            }
            other => panic!("unexpected hit {other:?}"),
        }
        match reader.next_hit().unwrap() {
            Some(RawHit::Tracker(hit)) => {
                assert_eq!(hit.timestamp_label, TimestampLabel::R0);
                assert_eq!(hit.time_ns(), 1000.0);
                assert_eq!(hit.electronic_id.feast, 0);
            }
            other => panic!("unexpected hit {other:?}"),
        }
        match reader.next_hit().unwrap() {
            Some(RawHit::Tracker(hit)) => {
                assert_eq!(hit.timestamp_label, TimestampLabel::Cathodic);
                assert_eq!(hit.electronic_id.kind, ChannelKind::Cathodic);
            }
            other => panic!("unexpected hit {other:?}"),
        }
        assert!(reader.next_hit().unwrap().is_none());
        assert_eq!(reader.bytes_read(), HITS.len() as u64);
    }

    #[test]
    fn test_malformed_record_can_be_skipped() {
        let text = "calo,0,1,3,11,1000.5,50.0,1\ncalo,0,1,3,99,1.0,1.0,1,0\ncalo,1,1,3,1,1.0,1.0,0,1\n";
        let mut reader = HitReader::new(Cursor::new(text));
        match reader.next_hit() {
            Err(HitSourceError::MalformedRecord { line, .. }) => assert_eq!(line, 1),
            other => panic!("unexpected result {other:?}"),
        }
        // Channel 99 does not exist on a calo board
        match reader.next_hit() {
            Err(HitSourceError::MalformedRecord { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result {other:?}"),
        }
        assert!(matches!(reader.next_hit(), Ok(Some(RawHit::Calo(_)))));
        assert_eq!(reader.line_number(), 3);
    }

    #[test]
    fn test_label_kind_mismatch_is_malformed() {
        let text = "tracker,1,1,3,0,5,cathodic,R2,80\n";
        let mut reader = HitReader::new(Cursor::new(text));
        assert!(matches!(
            reader.next_hit(),
            Err(HitSourceError::MalformedRecord { line: 1, .. })
        ));
    }

    #[test]
    fn test_tracker_record_on_calo_channel_is_malformed() {
        let text = "tracker,1,1,3,0,5,calo,R0,80\ntracker,2,1,3,0,5,anodic,R0,80\n";
        let mut reader = HitReader::new(Cursor::new(text));
        assert!(matches!(
            reader.next_hit(),
            Err(HitSourceError::MalformedRecord { line: 1, .. })
        ));
        // The reader has moved on, so the record can be skipped
        assert!(matches!(reader.next_hit(), Ok(Some(RawHit::Tracker(_)))));
    }

    #[test]
    fn test_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_0001.hits");
        File::create(&path)
            .unwrap()
            .write_all(HITS.as_bytes())
            .unwrap();
        let mut reader = HitReader::open(&path).unwrap();
        let mut count = 0;
        while reader.next_hit().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
        assert!(matches!(
            HitReader::open(&dir.path().join("run_0002.hits")),
            Err(HitSourceError::BadFilePath(_))
        ));
    }

    #[test]
    fn test_memory_source() {
        let hit = CaloHit {
            hit_id: 0,
            trigger_id: 0,
            electronic_id: ElectronicId::calo(0, 1),
            tdc_ns: 1.0,
            falling_time_ns: f64::INFINITY,
            low_threshold: true,
            high_threshold: true,
        };
        let mut good = hit.clone();
        good.falling_time_ns = 2.0;
        let mut source = MemoryHitSource::new(vec![RawHit::Calo(hit), RawHit::Calo(good)]);
        assert!(source.next_hit().is_err());
        assert!(source.next_hit().unwrap().is_some());
        assert!(source.next_hit().unwrap().is_none());
    }
}
