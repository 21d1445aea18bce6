//! Daily aggregation and timeline layout for client wellness logs.
//!
//! Records are logged against pillars (nutrition, hydration, sleep,
//! activity, stress, cravings, measurements, protocol, planner) plus two
//! event-like categories (appointments, scheduled events). This crate
//! answers the two recurring questions over those records: what happened on
//! a given day in the client's local timezone, and how those events render
//! on a 24-hour timeline without visual overlap.
//!
//! The pipeline: [`window::TemporalWindow`] turns a local calendar date into
//! UTC instant ranges; [`fetch`] fans queries out across every pillar and
//! both historical storage shapes; [`normalize`] collapses the result to one
//! canonical record per event; [`services::daily`] and [`services::rolling`]
//! fold records into cached summaries; [`layout`] packs a day's records into
//! conflict-free timeline rectangles. [`recompute`] keeps the summary caches
//! eventually consistent with record writes.

pub mod config;
pub mod error;
pub mod fetch;
pub mod layout;
pub mod normalize;
pub mod pillars;
pub mod recompute;
pub mod services;
pub mod store;
pub mod types;
pub mod window;

pub use crate::error::{EngineError, StoreError};
pub use crate::pillars::Pillar;
pub use crate::types::{
    CanonicalRecord, ClientProfile, ClientSummary, DailySummary, PositionedRecord, RawRecord,
};
pub use crate::window::TemporalWindow;
