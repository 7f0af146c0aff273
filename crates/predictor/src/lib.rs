//! Irrigation prediction service
//!
//! HTTP adapter, configuration and backend collaborators around the
//! prediction pipeline of `predictor-lib`.

pub mod api;
pub mod backend;
pub mod config;
