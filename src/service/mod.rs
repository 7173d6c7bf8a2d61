//! Generic repository over model descriptors.

pub mod repository;
pub mod rows;

pub use repository::*;
