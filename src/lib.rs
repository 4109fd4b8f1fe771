pub mod actuator;
pub mod calibration;
pub mod config;
pub mod feedback;
pub mod filter;
pub mod mapping;
pub mod metrics;
pub mod pose;
pub mod runtime;
