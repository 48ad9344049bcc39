// src/api/handlers/mod.rs
mod compare;
mod health;

pub use compare::{ask_provider, compare, method_not_allowed, preflight, CompareRequest};
pub use health::{health_check, health_method_not_allowed};
