//! Cattle muzzle identification service.
//!
//! An uploaded photo is sent to a hosted vision model that reports whether a
//! close-up muzzle is present and where. The muzzle is cropped, identified by
//! a local ONNX classifier, and matched against a registration table.

pub mod classifier;
pub mod config;
pub mod error;
pub mod geometry;
pub mod handlers;
pub mod ingest;
pub mod localizer;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod registry;
