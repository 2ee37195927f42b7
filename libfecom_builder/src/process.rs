use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use super::channel_map::ChannelMap;
use super::config::{Config, OutputFormat};
use super::error::{HitSourceError, ProcessorError};
use super::event_builder::{BuilderStats, EventBuilder, InvalidRecordPolicy};
use super::event_sink::{EventSink, YamlWriter};
#[cfg(feature = "hdf5")]
use super::hdf_writer::HDFWriter;
use super::hit_reader::{HitReader, HitSource};
use super::worker_status::WorkerStatus;

/// Fraction of a run between two progress reports
const FLUSH_FRAC: f32 = 0.01;

/// How a run treats bad records and when it stops early
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub invalid_records: InvalidRecordPolicy,
    /// Stop the run once this many events were written
    pub max_events: Option<u64>,
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            invalid_records: config.invalid_records,
            max_events: config.max_events,
        }
    }
}

/// What happened over a single run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub run_number: i32,
    pub events_written: u64,
    pub skipped_records: u64,
    pub cancelled: bool,
    pub reached_max_events: bool,
    pub stats: BuilderStats,
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Run {}: {} events written, {} records skipped",
            self.run_number, self.events_written, self.skipped_records
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        if self.reached_max_events {
            write!(f, " (maximum number of events reached)")?;
        }
        Ok(())
    }
}

/// Load the channel map named by the config, to be shared by all workers
pub fn load_channel_map(config: &Config) -> Result<Arc<ChannelMap>, ProcessorError> {
    let tracker_path = config.get_tracker_map_path();
    let calo_path = config.get_calo_map_path();
    spdlog::info!("Loading channel map from {tracker_path:?} and {calo_path:?}");
    Ok(Arc::new(ChannelMap::new(&tracker_path, &calo_path)?))
}

fn drive_run<S, W, F>(
    source: &mut S,
    sink: &mut W,
    evb: &mut EventBuilder,
    options: &RunOptions,
    cancel: &AtomicBool,
    on_progress: &mut F,
    summary: &mut RunSummary,
) -> Result<(), ProcessorError>
where
    S: HitSource,
    W: EventSink,
    F: FnMut(u64, u64) -> Result<(), ProcessorError>,
{
    loop {
        if cancel.load(Ordering::Relaxed) {
            spdlog::warn!("Run {} was cancelled", summary.run_number);
            evb.discard_working_event();
            summary.cancelled = true;
            sink.finish()?;
            return Ok(());
        }

        let hit = match source.next_hit() {
            Ok(Some(hit)) => hit,
            Ok(None) => break,
            Err(HitSourceError::MalformedRecord { line, reason })
                if options.invalid_records == InvalidRecordPolicy::Skip =>
            {
                spdlog::warn!("Skipping malformed record at line {line}: {reason}");
                summary.skipped_records += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(event) = evb.append_hit(hit)? {
            sink.store(&event)?;
            summary.events_written += 1;
            if options
                .max_events
                .is_some_and(|max| summary.events_written >= max)
            {
                spdlog::info!("Maximum number of events is reached.");
                evb.discard_working_event();
                summary.reached_max_events = true;
                sink.finish()?;
                return Ok(());
            }
        }
        on_progress(source.bytes_read(), summary.events_written)?;
    }

    //The final event of the EventBuilder will need a manual flush
    if let Some(event) = evb.flush_final_event()? {
        sink.store(&event)?;
        summary.events_written += 1;
    }
    sink.finish()?;
    Ok(())
}

/// Build every event of a hit source into a sink.
///
/// `on_progress` is called after every hit with the bytes read so far and the number of events
/// written. Any fatal error is reported as a `RunAborted` carrying the number of events that
/// were already written; the sink is left as it was at the failure.
pub fn build_run<S, W, F>(
    source: &mut S,
    sink: &mut W,
    evb: &mut EventBuilder,
    options: &RunOptions,
    cancel: &AtomicBool,
    mut on_progress: F,
) -> Result<RunSummary, ProcessorError>
where
    S: HitSource,
    W: EventSink,
    F: FnMut(u64, u64) -> Result<(), ProcessorError>,
{
    let mut summary = RunSummary {
        run_number: evb.run_number(),
        ..Default::default()
    };
    let result = drive_run(
        source,
        sink,
        evb,
        options,
        cancel,
        &mut on_progress,
        &mut summary,
    );
    summary.stats = evb.stats().clone();
    match result {
        Ok(()) => Ok(summary),
        Err(e) => {
            spdlog::error!(
                "Run {} aborted after {} events: {e}",
                summary.run_number,
                summary.events_written
            );
            Err(ProcessorError::RunAborted {
                run_number: summary.run_number,
                events_written: summary.events_written,
                source: Box::new(e),
            })
        }
    }
}

/// The main loop of fecom_builder.
///
/// This takes in a config (and progress monitor) and builds the events of one run.
pub fn process_run(
    config: &Config,
    channel_map: Arc<ChannelMap>,
    run_number: i32,
    tx: &Sender<WorkerStatus>,
    worker_id: &usize,
    cancel: &AtomicBool,
) -> Result<RunSummary, ProcessorError> {
    let settings = config.builder_settings()?;
    let options = RunOptions::from_config(config);
    let hit_path = config.get_hit_file(run_number);
    let output_path = config.get_output_file(run_number)?;

    let mut source = HitReader::open(&hit_path)?;
    let total_data_size = hit_path.metadata()?.len();
    spdlog::info!(
        "Total run size: {}",
        human_bytes::human_bytes(total_data_size as f64)
    );
    spdlog::info!(
        "Building events with a {} ns gate and the {} opening policy",
        settings.gate_ns,
        settings.opening_policy
    );

    let mut evb = EventBuilder::new(
        channel_map,
        settings,
        run_number,
        config.first_event_number,
    );
    let flush_val = (total_data_size as f64 * FLUSH_FRAC as f64) as u64;
    let mut last_flush: u64 = 0;
    tx.send(WorkerStatus::new(0.0, run_number, *worker_id, 0))?;
    let on_progress = |bytes: u64, events: u64| -> Result<(), ProcessorError> {
        if bytes - last_flush > flush_val {
            last_flush = bytes;
            tx.send(WorkerStatus::new(
                bytes as f32 / total_data_size as f32,
                run_number,
                *worker_id,
                events,
            ))?;
        }
        Ok(())
    };

    let summary = match config.output_format {
        OutputFormat::Yaml => {
            let mut writer = YamlWriter::new(&output_path, run_number)?;
            build_run(
                &mut source,
                &mut writer,
                &mut evb,
                &options,
                cancel,
                on_progress,
            )?
        }
        #[cfg(feature = "hdf5")]
        OutputFormat::Hdf5 => {
            let mut writer = HDFWriter::new(&output_path, run_number)?;
            build_run(
                &mut source,
                &mut writer,
                &mut evb,
                &options,
                cancel,
                on_progress,
            )?
        }
        #[cfg(not(feature = "hdf5"))]
        OutputFormat::Hdf5 => {
            return Err(super::error::ConfigError::Hdf5Unavailable.into());
        }
    };

    tx.send(WorkerStatus::new(
        1.0,
        run_number,
        *worker_id,
        summary.events_written,
    ))?;
    spdlog::info!("{summary}");
    spdlog::info!("{}", summary.stats);
    if summary.stats.unmapped_tracker_channels > 0 || summary.stats.unmapped_calo_hits > 0 {
        spdlog::warn!(
            "Run {run_number} had {} unmapped tracker channels and {} unmapped calo hits",
            summary.stats.unmapped_tracker_channels,
            summary.stats.unmapped_calo_hits
        );
    }
    Ok(summary)
}

/// The function to be called by a separate thread.
/// Loads the channel map and processes every run of the config.
pub fn process(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    cancel: Arc<AtomicBool>,
) -> Result<Vec<RunSummary>, ProcessorError> {
    config.validate()?;
    let channel_map = load_channel_map(&config)?;
    let runs = (config.first_run_number..(config.last_run_number + 1)).collect();
    process_subset(config, channel_map, tx, worker_id, runs, cancel)
}

/// Process a subset of runs
pub fn process_subset(
    config: Config,
    channel_map: Arc<ChannelMap>,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    subset: Vec<i32>,
    cancel: Arc<AtomicBool>,
) -> Result<Vec<RunSummary>, ProcessorError> {
    let mut summaries = Vec::new();
    for run in subset {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        if config.does_run_exist(run) {
            spdlog::info!("Processing run {}...", run);
            let summary =
                process_run(&config, channel_map.clone(), run, &tx, &worker_id, &cancel)?;
            spdlog::info!("Finished processing run {}.", run);
            summaries.push(summary);
        } else {
            spdlog::info!("Run {} does not exist, skipping...", run);
        }
    }
    Ok(summaries)
}

/// Divide a run range in to a set of subranges (per thread/worker)
pub fn create_subsets(config: &Config) -> Vec<Vec<i32>> {
    let mut subsets: Vec<Vec<i32>> = vec![Vec::new(); config.n_threads.max(1) as usize];
    let n_subsets = subsets.len();

    for (idx, run) in (config.first_run_number..(config.last_run_number + 1)).enumerate() {
        subsets[idx % n_subsets].push(run)
    }

    subsets.retain(|subset| !subset.is_empty());
    subsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commissioning_event::CommissioningEvent;
    use crate::electronic_id::ElectronicId;
    use crate::error::EventSinkError;
    use crate::event_builder::{BuilderSettings, OpeningPolicy};
    use crate::hit::{CaloHit, RawHit};
    use crate::hit_reader::MemoryHitSource;

    fn calo(channel: u16, tdc_ns: f64) -> RawHit {
        RawHit::Calo(CaloHit {
            hit_id: 0,
            trigger_id: 0,
            electronic_id: ElectronicId::calo(0, channel),
            tdc_ns,
            falling_time_ns: 0.0,
            low_threshold: true,
            high_threshold: false,
        })
    }

    fn bad_calo() -> RawHit {
        RawHit::Calo(CaloHit {
            hit_id: 0,
            trigger_id: 0,
            electronic_id: ElectronicId::calo(0, 40),
            tdc_ns: 1.0,
            falling_time_ns: 0.0,
            low_threshold: true,
            high_threshold: false,
        })
    }

    fn builder() -> EventBuilder {
        let map = ChannelMap::from_tables("header\n", "header\n").unwrap();
        let mut settings = BuilderSettings::new(OpeningPolicy::CaloOnly);
        settings.gate_ns = 10.0;
        EventBuilder::new(Arc::new(map), settings, 4, 0)
    }

    fn no_progress(_: u64, _: u64) -> Result<(), ProcessorError> {
        Ok(())
    }

    /// A sink which fails on its second event
    struct FailingSink(usize);

    impl EventSink for FailingSink {
        fn store(&mut self, _: &CommissioningEvent) -> Result<(), EventSinkError> {
            self.0 += 1;
            if self.0 > 1 {
                Err(std::io::Error::other("disk full").into())
            } else {
                Ok(())
            }
        }
    }

    /// A sink which counts what it was asked to do
    #[derive(Default)]
    struct CountingSink {
        stored: usize,
        finished: usize,
    }

    impl EventSink for CountingSink {
        fn store(&mut self, _: &CommissioningEvent) -> Result<(), EventSinkError> {
            self.stored += 1;
            Ok(())
        }

        fn finish(&mut self) -> Result<(), EventSinkError> {
            self.finished += 1;
            Ok(())
        }
    }

    #[test]
    fn test_all_events_stored() {
        let mut source = MemoryHitSource::new((0..4).map(|i| calo(0, i as f64 * 100.0)).collect());
        let mut sink: Vec<CommissioningEvent> = Vec::new();
        let summary = build_run(
            &mut source,
            &mut sink,
            &mut builder(),
            &RunOptions::default(),
            &AtomicBool::new(false),
            no_progress,
        )
        .unwrap();
        assert_eq!(summary.events_written, 4);
        assert_eq!(sink.len(), 4);
        assert_eq!(summary.stats.events_emitted, 4);
        assert!(!summary.cancelled);
    }

    #[test]
    fn test_invalid_record_policies() {
        let hits = vec![calo(0, 0.0), bad_calo(), calo(0, 100.0)];
        let mut sink: Vec<CommissioningEvent> = Vec::new();
        let result = build_run(
            &mut MemoryHitSource::new(hits.clone()),
            &mut sink,
            &mut builder(),
            &RunOptions::default(),
            &AtomicBool::new(false),
            no_progress,
        );
        match result {
            Err(ProcessorError::RunAborted {
                run_number,
                events_written,
                source,
            }) => {
                assert_eq!(run_number, 4);
                assert_eq!(events_written, 0);
                assert!(matches!(
                    *source,
                    ProcessorError::HitSourceError(HitSourceError::MalformedRecord { .. })
                ));
            }
            other => panic!("unexpected result {other:?}"),
        }

        let options = RunOptions {
            invalid_records: InvalidRecordPolicy::Skip,
            max_events: None,
        };
        let mut sink: Vec<CommissioningEvent> = Vec::new();
        let summary = build_run(
            &mut MemoryHitSource::new(hits),
            &mut sink,
            &mut builder(),
            &options,
            &AtomicBool::new(false),
            no_progress,
        )
        .unwrap();
        assert_eq!(summary.skipped_records, 1);
        assert_eq!(summary.events_written, 2);
    }

    #[test]
    fn test_sink_failure_reports_written_events() {
        let mut source = MemoryHitSource::new((0..4).map(|i| calo(0, i as f64 * 100.0)).collect());
        let result = build_run(
            &mut source,
            &mut FailingSink(0),
            &mut builder(),
            &RunOptions::default(),
            &AtomicBool::new(false),
            no_progress,
        );
        match result {
            Err(ProcessorError::RunAborted {
                events_written,
                source,
                ..
            }) => {
                assert_eq!(events_written, 1);
                assert!(matches!(*source, ProcessorError::SinkError(_)));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_cancel_drops_working_event_and_finishes_sink() {
        let cancel = AtomicBool::new(false);
        let mut source = MemoryHitSource::new((0..4).map(|i| calo(0, i as f64 * 100.0)).collect());
        let mut sink = CountingSink::default();
        let summary = build_run(
            &mut source,
            &mut sink,
            &mut builder(),
            &RunOptions::default(),
            &cancel,
            |_, events| {
                if events == 2 {
                    cancel.store(true, Ordering::Relaxed);
                }
                Ok(())
            },
        )
        .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.events_written, 2);
        assert_eq!(sink.stored, 2);
        assert_eq!(sink.finished, 1);
    }

    #[test]
    fn test_max_events() {
        let mut source = MemoryHitSource::new((0..6).map(|i| calo(0, i as f64 * 100.0)).collect());
        let mut sink: Vec<CommissioningEvent> = Vec::new();
        let options = RunOptions {
            invalid_records: InvalidRecordPolicy::Abort,
            max_events: Some(3),
        };
        let summary = build_run(
            &mut source,
            &mut sink,
            &mut builder(),
            &options,
            &AtomicBool::new(false),
            no_progress,
        )
        .unwrap();
        assert!(summary.reached_max_events);
        assert_eq!(sink.len(), 3);
    }

    #[test]
    fn test_create_subsets() {
        let config = Config {
            first_run_number: 1,
            last_run_number: 5,
            n_threads: 3,
            ..Default::default()
        };
        let subsets = create_subsets(&config);
        assert_eq!(subsets, vec![vec![1, 4], vec![2, 5], vec![3]]);

        let config = Config {
            first_run_number: 1,
            last_run_number: 2,
            n_threads: 4,
            ..Default::default()
        };
        assert_eq!(create_subsets(&config).len(), 2);
    }
}
