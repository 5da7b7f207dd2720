//! Indoor-localization engine: region-classifier Monte-Carlo particle filtering over a
//! typed floor-plan raster.
//!
//! Three components compose leaf-first: [`map::BuildingMap`] (region lookup),
//! [`feed::FeedProcessor`] (the observation stream), and [`filter::ParticleFilter`]
//! (the filter itself — motion, reweighting, resampling, clustering). See `SPEC_FULL.md`
//! for the full design.

pub mod config;
pub mod error;
pub mod feed;
pub mod filter;
pub mod map;
pub mod region;

pub use feed::{FeedProcessor, Observation};
pub use filter::{FilterConfig, ParticleFilter};
pub use map::BuildingMap;
