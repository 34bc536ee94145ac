//! Tool acquisition: download, unpack and install with phased progress
//!
//! ## Module Organization
//!
//! - `progress` - Targets, phases, events and percent weighting
//! - `controller` - Single-flight acquisition with cancel-before-start

mod controller;
mod progress;

pub use controller::{AcquireOutcome, AcquisitionController};
pub use progress::{
    AcquireTarget, AcquisitionEvent, AcquisitionPhase, AcquisitionProgress, STATUS_CLEANING_UP,
    STATUS_DOWNLOADING_FFMPEG, STATUS_DOWNLOADING_YTDLP, STATUS_EXTRACTING,
    STATUS_FFMPEG_COMPLETE, STATUS_YTDLP_COMPLETE,
};
