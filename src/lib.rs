// Modules
pub mod consts;
pub mod evolution;
pub mod experiment;
pub mod portfolio;
pub mod sampling;
