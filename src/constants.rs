// Run chunking constants
pub const MIN_CHUNK_ITERATIONS: u32 = 50;
pub const MAX_CHUNK_ITERATIONS: u32 = 200;

// Histogram constants
pub const HISTOGRAM_BIN_SIZE: f64 = 50.0; // dps per bucket

// Timeline constants
pub const TIMELINE_DELTA_T: f64 = 0.25; // seconds per timeline bucket

// Synthetic kernel defaults
pub const DEFAULT_AGENTS: usize = 3;
pub const DEFAULT_BASE_DPS: f64 = 900.0;
pub const DEFAULT_DPS_SPREAD: f64 = 0.15; // +/- fraction of base dps
pub const DEFAULT_DURATION_SECONDS: f64 = 45.0;
pub const IGNITE_SHARE: f64 = 0.3;
