//! Camera capture process handle.
//!
//! Owns the external camera binary (`raspivid` or `libcamera-vid`) that
//! produces a continuous raw H.264 byte stream on its standard output.
//! The stream has no fixed duration; it runs until the process is stopped.
//!
//! # Example
//! ```ignore
//! use camera_stream::{CameraOptions, CaptureStream};
//!
//! let mut capture = CaptureStream::spawn(&CameraOptions::default())?;
//! let video = capture.take_video().expect("stdout piped");
//! // ... hand `video` to a consumer ...
//! capture.stop().await;
//! ```

pub mod options;
pub mod stream;

pub use options::{CameraCommand, CameraOptions, UnknownCameraCommand};
pub use stream::{CaptureError, CaptureStream};
