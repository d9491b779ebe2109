use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which camera capture binary to launch.
///
/// Older Raspberry Pi OS releases ship `raspivid`; Bullseye and later use
/// the libcamera stack. Both take the same argument surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CameraCommand {
    Raspivid,
    LibcameraVid,
}

impl CameraCommand {
    /// Name of the executable to spawn.
    pub fn binary(&self) -> &'static str {
        match self {
            CameraCommand::Raspivid => "raspivid",
            CameraCommand::LibcameraVid => "libcamera-vid",
        }
    }
}

impl Default for CameraCommand {
    fn default() -> Self {
        CameraCommand::Raspivid
    }
}

impl fmt::Display for CameraCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

impl FromStr for CameraCommand {
    type Err = UnknownCameraCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raspivid" => Ok(CameraCommand::Raspivid),
            "libcamera" | "libcamera-vid" => Ok(CameraCommand::LibcameraVid),
            _ => Err(UnknownCameraCommand(s.to_string())),
        }
    }
}

/// Returned when a camera command string is not recognized.
#[derive(Debug, thiserror::Error)]
#[error("unknown camera command: {0} (valid: \"raspivid\", \"libcamera-vid\")")]
pub struct UnknownCameraCommand(pub String);

/// Configuration for the camera capture process.
///
/// The camera binary will step in and use its own defaults for any value
/// left at zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraOptions {
    /// Width of the video
    #[serde(default = "default_width")]
    pub width: u32,
    /// Height of the video
    #[serde(default = "default_height")]
    pub height: u32,
    /// Framerate of the video
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Flip the video horizontally
    #[serde(default)]
    pub horizontal_flip: bool,
    /// Flip the video vertically
    #[serde(default)]
    pub vertical_flip: bool,
    /// Capture binary to use
    #[serde(default)]
    pub camera: CameraCommand,
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_fps() -> u32 {
    25
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            horizontal_flip: false,
            vertical_flip: false,
            camera: CameraCommand::default(),
        }
    }
}

impl CameraOptions {
    /// Derive the capture process argument list.
    ///
    /// `-o -` routes video to stdout and `-t 0` removes the capture
    /// duration limit; everything else is appended only when set.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "-".to_string(),
            "-t".to_string(),
            "0".to_string(),
        ];

        if self.width != 0 {
            args.push("--width".to_string());
            args.push(self.width.to_string());
        }

        if self.height != 0 {
            args.push("--height".to_string());
            args.push(self.height.to_string());
        }

        if self.fps != 0 {
            args.push("--framerate".to_string());
            args.push(self.fps.to_string());
        }

        if self.horizontal_flip {
            args.push("--hflip".to_string());
        }

        if self.vertical_flip {
            args.push("--vflip".to_string());
        }

        args
    }
}
