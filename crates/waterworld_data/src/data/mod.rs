//! Core data structures for the WaterWorld simulation.

pub mod entity;
pub mod geometry;
