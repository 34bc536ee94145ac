//! Job execution: argument synthesis, process supervision and output parsing
//!
//! ## Module Organization
//!
//! - `request` - Structured job description (serde, camelCase)
//! - `args` - Ordered yt-dlp argument builder
//! - `encoders` - Hardware encoder detection and codec table
//! - `info` - Metadata lookup before a job
//! - `parser` - Console output to progress state
//! - `runner` - Single-flight process runner with cancellation

mod args;
mod encoders;
mod info;
mod parser;
mod request;
mod runner;

pub use args::build_args;
pub use encoders::{
    HW_ENCODERS, HwEncoder, detect_hw_encoders, parse_encoder_listing, resolve_hw_encoder,
    video_encoder,
};
pub use info::{fetch_video_info, info_args};
pub use parser::{JobPhase, ParsedLine, ProgressParser, ProgressState, parse_line};
pub use request::{
    AdvancedOptions, AudioCodec, DEFAULT_OUTPUT_TEMPLATE, FormatOptions, HwAccel, JobRequest,
    MediaMode, PlaylistMode, TimeRange, VideoCodec, VideoConversion,
};
pub use runner::{JobEvent, JobResult, JobRunner};
