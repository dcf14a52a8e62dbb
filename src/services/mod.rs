// src/services/mod.rs
pub mod affordability;
pub mod assistant;
pub mod audit;
pub mod auth;
pub mod rate_limit;
