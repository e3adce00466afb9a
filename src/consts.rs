// Shared numeric constants

/// Tolerance used when comparing floats in assertions and degenerate checks.
pub const FLOAT_COMPARISON_EPSILON: f64 = 1e-9;

/// Below this total weight a projected portfolio is considered empty.
pub const PROJECTION_EPSILON: f64 = 1e-6;

/// How often (in generations) the engine logs its progress by default.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 100;

pub const DAYS_PER_YEAR: f64 = 365.;
