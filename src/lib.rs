//! tablesight - Client-Side Capture, Streaming and Labeling Controller
//!
//! Captures frames from a live video source, streams them to the table
//! analysis service over a persistent duplex connection, and runs the
//! interactive region-labeling workflow that feeds the card detection
//! training dataset.

pub mod auto_detect;
pub mod dataset_sync;
pub mod error;
pub mod frame_scheduler;
pub mod frame_source;
pub mod labeling_store;
pub mod layout;
pub mod models;
pub mod quick_label;
pub mod session;
pub mod state;
pub mod streaming_client;
pub mod training_monitor;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result};
