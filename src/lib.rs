// src/lib.rs
pub mod aggregator;
pub mod api;
pub mod banner;
pub mod config;
pub mod deadline;
pub mod errors;
pub mod providers;
