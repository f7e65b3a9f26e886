// src/analyze/mod.rs
//! Scoring and aggregation stages that run after normalization and dedup.

pub mod aggregate;
pub mod scoring;

pub use crate::analyze::aggregate::{
    aggregate, EngagementTier, EngagementTiers, Summary, TierCuts, TopItem,
};
pub use crate::analyze::scoring::Scorer;
