// src/handlers/mod.rs
pub mod activity;
pub mod audit;
pub mod auth;
pub mod chat;
pub mod events;
pub mod financial;
pub mod notifications;
pub mod partners;
pub mod recommendations;
pub mod system;
pub mod users;
