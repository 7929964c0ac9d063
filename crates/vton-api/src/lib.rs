//! # vton-api
//!
//! HTTP surface of the try-on pipeline.
//!
//! ## Endpoints
//!
//! - `POST /api/tryon?filename=<stem>&filename2=<stem>`: multipart
//!   fields `person_image` and `clothes_image`; stages the pair, runs
//!   the composition stage through the driver subprocess, streams the
//!   rendered PNG back.
//! - `GET /api/v1/health`: liveness check.
//!
//! Every request gets its own session: staged filenames, pair manifest
//! and result directory are all derived from the session id, and the
//! expected result path is computed from the same contract the driver
//! writes with. Driver runs hold a permit of a bounded job queue and
//! are killed on timeout.

pub mod config;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod session;
pub mod state;
pub mod types;

pub use config::*;
pub use server::*;
pub use state::*;
