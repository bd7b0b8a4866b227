//! Client for the CollisionDB atomic and molecular collision-data
//! service: validated query construction, archive retrieval, manifest
//! indexing and consistency-checked views over the retrieved datasets.

pub mod app;
pub mod archive;
pub mod collection;
pub mod config;
pub mod dataset;
pub mod error;
pub mod manifest;
pub mod query;
pub mod refs;
