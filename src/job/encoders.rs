//! Hardware video encoder detection and selection

use std::path::Path;
use std::process::Stdio;

use log::{debug, warn};
use serde::Serialize;

use super::request::{HwAccel, VideoCodec};
use crate::process;

/// Hardware encoder family available to ffmpeg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HwEncoder {
    Nvenc,
    Qsv,
    Videotoolbox,
    Amf,
}

/// Families in auto-selection priority order
pub const HW_ENCODERS: &[HwEncoder] = &[
    HwEncoder::Nvenc,
    HwEncoder::Qsv,
    HwEncoder::Videotoolbox,
    HwEncoder::Amf,
];

impl HwEncoder {
    pub fn name(&self) -> &'static str {
        match self {
            HwEncoder::Nvenc => "nvenc",
            HwEncoder::Qsv => "qsv",
            HwEncoder::Videotoolbox => "videotoolbox",
            HwEncoder::Amf => "amf",
        }
    }

    /// ffmpeg encoder for `codec`, or `None` when this family has no encoder for it
    fn encoder_for(&self, codec: VideoCodec) -> Option<&'static str> {
        match (self, codec) {
            (HwEncoder::Nvenc, VideoCodec::H264) => Some("h264_nvenc"),
            (HwEncoder::Nvenc, VideoCodec::H265) => Some("hevc_nvenc"),
            (HwEncoder::Qsv, VideoCodec::H264) => Some("h264_qsv"),
            (HwEncoder::Qsv, VideoCodec::H265) => Some("hevc_qsv"),
            (HwEncoder::Videotoolbox, VideoCodec::H264) => Some("h264_videotoolbox"),
            (HwEncoder::Videotoolbox, VideoCodec::H265) => Some("hevc_videotoolbox"),
            (HwEncoder::Amf, VideoCodec::H264) => Some("h264_amf"),
            (HwEncoder::Amf, VideoCodec::H265) => Some("hevc_amf"),
            _ => None,
        }
    }
}

/// ffmpeg encoder name for `codec`. Hardware families without an encoder for
/// the codec fall back to the software one. `Copy` has no encoder.
pub fn video_encoder(codec: VideoCodec, hw: Option<HwEncoder>) -> Option<&'static str> {
    if let Some(encoder) = hw.and_then(|hw| hw.encoder_for(codec)) {
        return Some(encoder);
    }
    match codec {
        VideoCodec::H264 => Some("libx264"),
        VideoCodec::H265 => Some("libx265"),
        VideoCodec::Vp9 => Some("libvpx-vp9"),
        VideoCodec::Av1 => Some("libaom-av1"),
        VideoCodec::Copy => None,
    }
}

/// Families whose H.264 or HEVC encoder appears in `ffmpeg -hide_banner -encoders` output
pub fn parse_encoder_listing(listing: &str) -> Vec<HwEncoder> {
    HW_ENCODERS
        .iter()
        .copied()
        .filter(|hw| {
            listing.contains(&format!("h264_{}", hw.name()))
                || listing.contains(&format!("hevc_{}", hw.name()))
        })
        .collect()
}

/// Ask an ffmpeg binary which hardware encoder families it was built with
pub async fn detect_hw_encoders(ffmpeg: &Path) -> Vec<HwEncoder> {
    let output = match process::command(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            warn!("Failed to list encoders of {}: {}", ffmpeg.display(), e);
            return Vec::new();
        }
    };
    let available = parse_encoder_listing(&String::from_utf8_lossy(&output.stdout));
    debug!("Hardware encoders available: {available:?}");
    available
}

/// Turn a preference into a concrete family. `Auto` picks the first available
/// one; an explicit family is honored even when detection did not report it.
pub fn resolve_hw_encoder(preference: HwAccel, available: &[HwEncoder]) -> Option<HwEncoder> {
    match preference {
        HwAccel::Auto => available.first().copied(),
        HwAccel::None => None,
        HwAccel::Nvenc => Some(HwEncoder::Nvenc),
        HwAccel::Qsv => Some(HwEncoder::Qsv),
        HwAccel::Videotoolbox => Some(HwEncoder::Videotoolbox),
        HwAccel::Amf => Some(HwEncoder::Amf),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
Encoders:
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC
 V....D h264_qsv             H.264 / AVC (Intel Quick Sync Video acceleration)
 V....D hevc_amf             AMD AMF HEVC encoder
 A....D aac                  AAC (Advanced Audio Coding)
";

    #[test]
    fn listing_is_reduced_to_families_in_priority_order() {
        assert_eq!(parse_encoder_listing(LISTING), vec![HwEncoder::Qsv, HwEncoder::Amf]);
        assert!(parse_encoder_listing("").is_empty());
    }

    #[test]
    fn auto_takes_first_available() {
        let available = [HwEncoder::Qsv, HwEncoder::Amf];
        assert_eq!(resolve_hw_encoder(HwAccel::Auto, &available), Some(HwEncoder::Qsv));
        assert_eq!(resolve_hw_encoder(HwAccel::Auto, &[]), None);
        assert_eq!(resolve_hw_encoder(HwAccel::None, &available), None);
        assert_eq!(resolve_hw_encoder(HwAccel::Nvenc, &[]), Some(HwEncoder::Nvenc));
    }

    #[test]
    fn encoder_table_falls_back_to_software() {
        assert_eq!(video_encoder(VideoCodec::H264, None), Some("libx264"));
        assert_eq!(video_encoder(VideoCodec::H265, Some(HwEncoder::Nvenc)), Some("hevc_nvenc"));
        assert_eq!(video_encoder(VideoCodec::Vp9, Some(HwEncoder::Nvenc)), Some("libvpx-vp9"));
        assert_eq!(
            video_encoder(VideoCodec::H264, Some(HwEncoder::Videotoolbox)),
            Some("h264_videotoolbox")
        );
        assert_eq!(video_encoder(VideoCodec::Copy, Some(HwEncoder::Amf)), None);
    }
}
