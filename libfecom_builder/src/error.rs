use std::path::PathBuf;
use thiserror::Error;

use super::electronic_id::{CellId, ChannelKind, Electrode, ElectronicId};
use super::worker_status::WorkerStatus;

#[derive(Debug, Clone, Error)]
pub enum ElectronicIdError {
    #[error("Found invalid channel kind keyword: {0}")]
    BadKind(String),
    #[error("Found invalid electrode keyword: {0}")]
    BadElectrode(String),
    #[error("Found invalid timestamp label: {0}")]
    BadTimestampLabel(String),
}

#[derive(Debug, Error)]
pub enum ChannelMapError {
    #[error("ChannelMap could not open table because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("ChannelMap failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("ChannelMap failed to parse an integer: {0}")]
    ParsingError(#[from] std::num::ParseIntError),
    #[error("ChannelMap failed to parse a keyword: {0}")]
    BadKeyword(#[from] ElectronicIdError),
    #[error("ChannelMap was given a table with the incorrect format at line {0}; most likely the number of columns is incorrect")]
    BadFileFormat(usize),
    #[error("ChannelMap was given an electronic id outside of the crate: {0}")]
    InvalidChannel(ElectronicId),
    #[error("ChannelMap found electronic channel {0} mapped more than once")]
    DuplicateChannel(ElectronicId),
    #[error("ChannelMap found the {1:?} of cell {0} mapped more than once")]
    DuplicateElectrode(CellId, Electrode),
}

#[derive(Debug, Error)]
pub enum HitSourceError {
    #[error("Could not open hit file because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Hit source failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Malformed hit record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum CellResolverError {
    #[error("The tracker channel {0} is not an anodic or cathodic channel; check that the mapping matches the data")]
    NotTrackerChannel(ElectronicId),
    #[error("The tracker channel {id} is {} but the mapping expects a {expected} channel; check that the mapping is correct", .id.kind)]
    MappingInconsistency {
        id: ElectronicId,
        expected: ChannelKind,
    },
}

#[derive(Debug, Error)]
pub enum EventBuilderError {
    #[error("EventBuilder failed due to CellResolver error: {0}")]
    ResolverError(#[from] CellResolverError),
}

#[derive(Debug, Error)]
pub enum EventSinkError {
    #[error("EventSink failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("EventSink failed to convert to yaml: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("EventSink failed to format the creation time: {0}")]
    TimeFormatError(#[from] time::error::Format),
    #[cfg(feature = "hdf5")]
    #[error("EventSink failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[cfg(feature = "hdf5")]
    #[error("EventSink failed to convert a string for HDF5: {0}")]
    HDF5StringError(#[from] hdf5::types::StringError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config does not set an opening_policy; choose calo_only or calo_or_tracker")]
    MissingOpeningPolicy,
    #[error("Config has an invalid gate of {0} ns; gates must be positive")]
    InvalidGate(f64),
    #[error("Config has an invalid number of threads: {0}")]
    InvalidThreads(i32),
    #[error("Config requests HDF5 output but this build does not include the hdf5 feature")]
    Hdf5Unavailable,
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to HitSource error: {0}")]
    HitSourceError(#[from] HitSourceError),
    #[error("Processor failed due to EventBuilder error: {0}")]
    EVBError(#[from] EventBuilderError),
    #[error("Processor failed due to EventSink error: {0}")]
    SinkError(#[from] EventSinkError),
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to ChannelMap error: {0}")]
    MapError(#[from] ChannelMapError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Run {run_number} aborted after {events_written} events were written: {source}")]
    RunAborted {
        run_number: i32,
        events_written: u64,
        source: Box<ProcessorError>,
    },
}
