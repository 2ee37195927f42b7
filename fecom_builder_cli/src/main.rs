//! # fecom_builder_cli
//!
//! Part of the fecom_builder crate family.
//!
//! This is the command line application which builds commissioning events from the
//! half-detector commissioning crate hits.
//!
//! ## Use
//!
//! Make a template configuration, edit it, and run it:
//!
//! ```bash
//! fecom_builder_cli new -p config.yaml
//! fecom_builder_cli -p config.yaml
//! ```
//!
//! The run range is divided over `n_threads` workers, each with its own progress bar. A
//! detailed log is written to `fecom_builder.log` in the working directory.
use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use libfecom_builder::config::Config;
use libfecom_builder::error::ProcessorError;
use libfecom_builder::process::{create_subsets, load_channel_map, process_subset, RunSummary};
use libfecom_builder::worker_status::WorkerStatus;

const LOG_FILE_NAME: &str = "./fecom_builder.log";

type WorkerHandle = JoinHandle<Result<Vec<RunSummary>, ProcessorError>>;

/// Route the library's spdlog output to a log file
fn init_file_logger() -> Result<(), spdlog::Error> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from(LOG_FILE_NAME))
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

fn make_template_config(path: &Path) {
    match Config::default().write_config_file(path) {
        Ok(()) => log::info!("Done."),
        Err(e) => log::error!("Could not write template config: {e}"),
    }
}

fn make_progress_bar(pb_manager: &MultiProgress, worker_id: usize) -> ProgressBar {
    let pb = pb_manager.add(ProgressBar::new(100));
    if let Ok(style) = ProgressStyle::with_template(
        "{prefix:>12} [{bar:40.cyan/blue}] {pos:>3}% {msg}",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_prefix(format!("Worker {worker_id}"));
    pb
}

fn main() {
    // Create a cli
    let matches = Command::new("fecom_builder_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .global(true)
                .help("Path to the configuration file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }
    if let Err(e) = init_file_logger() {
        log::warn!("Could not create log file {LOG_FILE_NAME}: {e}");
    }

    // Parse the cli
    let config_path = match matches.get_one::<String>("path") {
        Some(path) => PathBuf::from(path),
        None => {
            log::error!("A configuration path is required");
            return;
        }
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        make_template_config(&config_path);
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path).and_then(|c| {
        c.validate()?;
        Ok(c)
    }) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("Hit Path: {}", config.hit_path.to_string_lossy());
    log::info!("Output Path: {}", config.output_path.to_string_lossy());
    log::info!(
        "Tracker Map: {} Calo Map: {}",
        config.get_tracker_map_path().to_string_lossy(),
        config.get_calo_map_path().to_string_lossy()
    );
    log::info!(
        "First Run: {} Last Run: {}",
        config.first_run_number,
        config.last_run_number
    );
    spdlog::info!("Starting fecom_builder with config {config_path:?}");

    let channel_map = match load_channel_map(&config) {
        Ok(map) => map,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };

    // Spawn the workers!
    let cancel = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    let mut handles: Vec<WorkerHandle> = Vec::new();
    let mut bars: Vec<ProgressBar> = Vec::new();
    for (worker_id, subset) in create_subsets(&config).into_iter().enumerate() {
        let worker_config = config.clone();
        let worker_map = channel_map.clone();
        let worker_tx = tx.clone();
        let worker_cancel = cancel.clone();
        bars.push(make_progress_bar(&pb_manager, worker_id));
        handles.push(std::thread::spawn(move || {
            let result = process_subset(
                worker_config,
                worker_map,
                worker_tx,
                worker_id,
                subset,
                worker_cancel.clone(),
            );
            // Stop everybody as soon as one worker fails
            if result.is_err() {
                worker_cancel.store(true, Ordering::Relaxed);
            }
            result
        }));
    }
    drop(tx);

    // The loop ends once every worker has dropped its sender
    for status in rx.iter() {
        if let Some(pb) = bars.get(status.worker_id) {
            pb.set_position((status.progress * 100.0) as u64);
            pb.set_message(format!(
                "run {} - {} events",
                status.run_number, status.events_written
            ));
        }
    }

    let mut n_events: u64 = 0;
    let mut failed = false;
    for (worker_id, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok(summaries)) => {
                for summary in summaries {
                    log::info!("{summary}");
                    n_events += summary.events_written;
                }
            }
            Ok(Err(e)) => {
                log::error!("Worker {worker_id} failed with error: {e}");
                failed = true;
            }
            Err(_) => {
                log::error!("Failed to join worker {worker_id}!");
                cancel.store(true, Ordering::Relaxed);
                failed = true;
            }
        }
        if let Some(pb) = bars.get(worker_id) {
            pb.finish();
        }
    }

    if failed {
        log::error!("Event building failed, check {LOG_FILE_NAME} for details.");
        std::process::exit(1);
    }
    log::info!("Successfully built {n_events} events!");
    log::info!("Done.");
}
