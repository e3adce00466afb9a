pub mod aggregator;
pub mod dfo;
pub mod fitness;
pub mod objective;
pub mod projection;
