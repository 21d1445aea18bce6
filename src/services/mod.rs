//! Aggregation services over the normalized record pipeline.

pub mod daily;
pub mod rolling;
