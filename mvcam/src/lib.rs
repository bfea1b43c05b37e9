//! # Motion Vector Camera
//!
//! Hardware-assisted motion detection and pre/post-roll recording for embedded cameras.
//!
//! Motion is detected purely from the motion vectors the hardware encoder produces alongside
//! the video, one per 16x16 macroblock. Per frame, the [`analyzer`] estimates block noise,
//! finds the biggest connected region of moving blocks and feeds the result through a
//! temporal hysteresis, which drives a shared trigger. The [`recorder`] waits on that trigger
//! and drains the in-memory [`buffer`] of encoded video into recordings.
//!
//! The easiest way to use the library is to import its prelude:
//!
//! ```
//! use mvcam::prelude::v1::*;
//! ```

pub mod analyzer;
pub mod buffer;
pub mod camera;
pub mod capture_log;
pub mod detection;
pub mod hysteresis;
pub mod indicator;
pub mod motion_field;
pub mod noise;
pub mod recorder;
pub mod settings;
pub mod signal;
pub mod source;
pub mod transcode;
pub mod utils;

pub mod prelude {
    pub mod v1 {
        pub use crate::{
            analyzer::MotionAnalyzer,
            buffer::{CircularVideoBuffer, EncodedFrame, FrameKind},
            camera::{Camera, MotionHandler},
            capture_log::{CaptureLogReader, CaptureLogWriter, LoggedFrame},
            detection::Connectivity,
            motion_field::{MagnitudeField, MotionVector, MotionVectorFrame},
            recorder::{Recorder, RecorderQueues, RecorderState},
            settings::Settings,
            signal::{CaptureState, TriggerSignal},
            source::MotionSource,
            transcode::{Ffmpeg, Passthrough, Transcoder},
        };
        pub use anyhow::{anyhow, Error, Result};
    }
}
