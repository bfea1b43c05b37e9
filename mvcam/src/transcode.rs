//! # Container remuxing
//!
//! Recordings are written as a raw elementary stream, which carries no timing information.
//! Before they are handed off, they get wrapped in a container at the capture framerate.

use anyhow::{anyhow, Context, Result};
use log::*;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Remux capability used by the recorder.
pub trait Transcoder: Send {
    /// Wrap the raw stream at `input` into a container at `output`.
    ///
    /// # Arguments
    ///
    /// * `input` - raw elementary stream file.
    /// * `output` - container file to create.
    /// * `framerate` - framerate of the stream.
    fn remux(&mut self, input: &Path, output: &Path, framerate: u32) -> Result<()>;

    /// Extension of the produced files.
    fn extension(&self) -> &str;
}

/// Remux through an external `ffmpeg` binary, copying the video stream as-is.
pub struct Ffmpeg {
    binary: PathBuf,
    extension: String,
}

impl Ffmpeg {
    /// Look up `ffmpeg` in `PATH`.
    pub fn locate() -> Result<Self> {
        let binary = which::which("ffmpeg").context("ffmpeg not found")?;
        debug!("remuxing with {}", binary.display());
        Ok(Self::new(binary))
    }

    /// Use a given binary, producing `mkv` files.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            extension: "mkv".into(),
        }
    }

    /// Produce files with a different container extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    fn command(&self, input: &Path, output: &Path, framerate: u32) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-y")
            .args(["-loglevel", "error"])
            .arg("-r")
            .arg(framerate.to_string())
            .arg("-i")
            .arg(input)
            .args(["-vcodec", "copy"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

impl Transcoder for Ffmpeg {
    fn remux(&mut self, input: &Path, output: &Path, framerate: u32) -> Result<()> {
        let status = self
            .command(input, output, framerate)
            .status()
            .with_context(|| format!("unable to run {}", self.binary.display()))?;

        if status.success() {
            Ok(())
        } else {
            Err(anyhow!("{} exited with {}", self.binary.display(), status))
        }
    }

    fn extension(&self) -> &str {
        &self.extension
    }
}

/// Keep the raw stream, only moving it to the output path.
#[derive(Default)]
pub struct Passthrough;

impl Transcoder for Passthrough {
    fn remux(&mut self, input: &Path, output: &Path, _framerate: u32) -> Result<()> {
        if input != output {
            std::fs::rename(input, output)?;
        }
        Ok(())
    }

    fn extension(&self) -> &str {
        "h264"
    }
}
