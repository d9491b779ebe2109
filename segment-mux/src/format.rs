use crate::muxer::MuxError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output container format for the live stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Hls,
    Dash,
}

impl ContainerFormat {
    /// Fixed manifest file name for the format.
    pub fn manifest_name(&self) -> &'static str {
        match self {
            ContainerFormat::Hls => "livestream.m3u8",
            ContainerFormat::Dash => "livestream.mpd",
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerFormat::Hls => f.write_str("hls"),
            ContainerFormat::Dash => f.write_str("dash"),
        }
    }
}

impl FromStr for ContainerFormat {
    type Err = MuxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hls" => Ok(ContainerFormat::Hls),
            "dash" => Ok(ContainerFormat::Dash),
            _ => Err(MuxError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// HLS segment container. Ignored for DASH output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentType {
    MpegTs,
    Fmp4,
}

impl SegmentType {
    pub(crate) fn ffmpeg_name(&self) -> &'static str {
        match self {
            SegmentType::MpegTs => "mpegts",
            SegmentType::Fmp4 => "fmp4",
        }
    }

    pub(crate) fn extension(&self) -> &'static str {
        match self {
            SegmentType::MpegTs => "ts",
            SegmentType::Fmp4 => "m4s",
        }
    }
}

impl Default for SegmentType {
    fn default() -> Self {
        SegmentType::MpegTs
    }
}

impl FromStr for SegmentType {
    type Err = MuxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mpegts" => Ok(SegmentType::MpegTs),
            "fmp4" => Ok(SegmentType::Fmp4),
            _ => Err(MuxError::UnsupportedSegmentType(s.to_string())),
        }
    }
}
