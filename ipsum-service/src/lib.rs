//! ipsum-service: themed placeholder text generated by an upstream LLM.

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;

pub use startup::{AppState, Application, build_router};
