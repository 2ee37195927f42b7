// Commissioning crate electronics
pub const NUMBER_OF_SLOTS: u16 = 20;
pub const NUMBER_OF_CALO_CHANNELS: u16 = 16;
pub const NUMBER_OF_FEASTS: u16 = 2;
pub const NUMBER_OF_TRACKER_CHANNELS: u16 = 54;

/// Number of anodic timestamp registers (R0..R4) read out per anode
pub const NUMBER_OF_ANODIC_TIMES: usize = 5;

/// The tracker TDC runs at 80 MHz
pub const TRACKER_CLOCK_TICK_NS: f64 = 12.5;

// Event building gates
pub const DEFAULT_GATE_NS: f64 = 150_000.0;

/// Bit of the event traits flagging an event which was closed without any calorimeter hit
pub const TRACKER_ONLY_TRAIT_BIT: usize = 0;

// All event counters start from 0 by law
pub const START_EVENT_NUMBER: u64 = 0;
