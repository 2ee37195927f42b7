//! # fecom_builder
//!
//! fecom_builder is the event builder of the SuperNEMO half-detector commissioning crate,
//! written in Rust. It takes the time ordered calorimeter and tracker channel hits decoded
//! from the crate, groups them into commissioning events with a sliding time gate, rebuilds
//! tracker cell hits from the raw electrode channels, and writes the events to YAML (or HDF5).
//!
//! ## Building & Install
//!
//! To build and install the CLI use `cargo install --path ./fecom_builder_cli` from the top
//! level repository. HDF5 output is optional; build with `--features hdf5` to enable it. HDF5
//! must then be installed, and the Rust libraries will typically auto detect the location of
//! the install. If they do not, set `HDF5_DIR` in `.cargo/config.toml`:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//! ```
//!
//! ## Configuration
//!
//! The builder is driven by a YAML configuration. A template can be made with
//! `fecom_builder_cli new -p config.yaml`. The format is as follows:
//!
//! ```yml
//! hit_path: /data/hits
//! output_path: /data/events
//! tracker_map_path: null
//! calo_map_path: null
//! first_run_number: 0
//! last_run_number: 0
//! n_threads: 1
//! first_event_number: 0
//! gate_ns: 150000.0
//! calo_gate_ns: null
//! opening_policy: calo_only
//! invalid_records: abort
//! require_calo_threshold: false
//! min_calo_hits: 0
//! min_tracker_hits: 0
//! max_events: null
//! output_format: yaml
//! ```
//!
//! `opening_policy` has no default and must be one of `calo_only` (only a calorimeter hit
//! opens an event) or `calo_or_tracker` (a tracker hit outside of any event opens a
//! tracker-only event). If the map paths are `null`, `mapping_tracker.csv` and
//! `mapping_calo.csv` are looked for in `hit_path`.
//!
//! ### Channel Map Format
//!
//! Both tables are CSV files with *no* whitespaces and a header line. The tracker table:
//!
//! ```csv
//! slot,feast,channel,side,layer,row,electrode
//! ```
//!
//! where `electrode` is one of `anode`, `bottom_cathode`, `top_cathode`. The calorimeter table:
//!
//! ```csv
//! slot,channel,side,column,row
//! ```
//!
//! ### Hit Format
//!
//! Each run is read from `run_####.hits` in `hit_path`, one hit per line:
//!
//! ```text
//! calo,hit_id,trigger_id,slot,channel,tdc_ns,falling_time_ns,low_threshold,high_threshold
//! tracker,hit_id,trigger_id,slot,feast,channel,kind,label,value
//! ```
//!
//! ## Output
//!
//! Events are written to `run_####.yaml` in `output_path`, one YAML document per event, or to
//! `run_####.h5` with the layout:
//!
//! ```text
//! events - min_event, max_event, run_number, version
//! |---- event_# - run_number, event_number, time_start_ns, traits
//! |    |---- calo_hits(dset)
//! |    |---- tracker_channel_hits(dset)
//! |    |---- tracker_hits(dset)
//! ```
pub mod cell_resolver;
pub mod channel_map;
pub mod commissioning_event;
pub mod config;
pub mod constants;
pub mod electronic_id;
pub mod error;
pub mod event_builder;
pub mod event_sink;
#[cfg(feature = "hdf5")]
pub mod hdf_writer;
pub mod hit;
pub mod hit_reader;
pub mod process;
pub mod tracker_hit;
pub mod worker_status;
