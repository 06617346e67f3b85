//! Core types and containers for the volgrid data layer.
//!
//! This crate provides the foundation the grid representations build on:
//! - Typed error values
//! - Math helpers for index-space arithmetic and world-space boxes
//! - The `Vol3` linear-storage 3D container

pub mod error;
pub mod math;
pub mod vol3;

pub use error::{Error, Result};
pub use math::{div_round_up, volume, Aabb};
pub use vol3::Vol3;
