//! # Motion triggered recording
//!
//! The recorder waits for the motion trigger, then writes the in-memory video buffer into a
//! new file and keeps appending to it until motion ends. Finished recordings are remuxed into
//! a container and their paths are posted to the captures queue, where whatever consumes the
//! recordings can pick them up.

use crate::buffer::{CircularVideoBuffer, FrameKind};
use crate::camera::Camera;
use crate::settings::Settings;
use crate::signal::TriggerSignal;
use crate::transcode::Transcoder;
use anyhow::{anyhow, Context, Result};
use chrono::Local;
use log::*;
use std::fs::File;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Receiver, Sender},
    Arc,
};
use std::thread::{Builder, JoinHandle};
use std::time::{Duration, Instant};

/// Longest uninterrupted wait for the trigger, so that the loop notices capture stopping.
const IDLE_SLICE: Duration = Duration::from_millis(250);

/// Where recordings are written to.
pub trait RecordingStore: Send {
    /// Create a new raw recording at `path`.
    fn create(&mut self, path: &Path) -> Result<Box<dyn Write + Send>>;
}

/// Store recordings as regular files.
#[derive(Default)]
pub struct FileStore;

impl RecordingStore for FileStore {
    fn create(&mut self, path: &Path) -> Result<Box<dyn Write + Send>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(path)
            .with_context(|| format!("unable to create {}", path.display()))?;

        Ok(Box::new(BufWriter::new(file)))
    }
}

/// State of the recording loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
}

/// Consumer side of the recorder's output queues.
pub struct RecorderQueues {
    /// Paths of finished recordings.
    pub captures: Receiver<PathBuf>,
    /// Paths of still images taken at the start of motion.
    pub images: Receiver<PathBuf>,
}

/// Recording orchestrator.
pub struct Recorder {
    settings: Settings,
    camera: Arc<dyn Camera>,
    trigger: Arc<TriggerSignal>,
    buffer: Arc<CircularVideoBuffer>,
    store: Box<dyn RecordingStore>,
    transcoder: Box<dyn Transcoder>,
    captures: Sender<PathBuf>,
    images: Sender<PathBuf>,
    recording: Arc<AtomicBool>,
}

fn remove_file(path: &Path) {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => {
            warn!("unable to remove {}: {}", path.display(), e)
        }
        _ => {}
    }
}

impl Recorder {
    /// Create a new recorder.
    ///
    /// # Arguments
    ///
    /// * `settings` - recorder settings.
    /// * `camera` - capture device.
    /// * `trigger` - motion trigger, driven by the motion analyzer.
    /// * `buffer` - video buffer the encoder appends to.
    /// * `transcoder` - remuxer of finished recordings.
    pub fn new(
        settings: Settings,
        camera: Arc<dyn Camera>,
        trigger: Arc<TriggerSignal>,
        buffer: Arc<CircularVideoBuffer>,
        transcoder: Box<dyn Transcoder>,
    ) -> (Self, RecorderQueues) {
        let (captures, captures_rx) = mpsc::channel();
        let (images, images_rx) = mpsc::channel();

        (
            Self {
                settings,
                camera,
                trigger,
                buffer,
                store: Box::new(FileStore),
                transcoder,
                captures,
                images,
                recording: Default::default(),
            },
            RecorderQueues {
                captures: captures_rx,
                images: images_rx,
            },
        )
    }

    /// Write recordings through a different store.
    pub fn with_store(mut self, store: impl RecordingStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn state(&self) -> RecorderState {
        if self.recording.load(Ordering::Relaxed) {
            RecorderState::Recording
        } else {
            RecorderState::Idle
        }
    }

    /// Shared flag that is raised while a recording is open.
    pub fn recording_flag(&self) -> Arc<AtomicBool> {
        self.recording.clone()
    }

    /// Run the recording loop until the camera stops capturing.
    pub fn run(&mut self) {
        info!("now ready to detect motion");

        while self.camera.is_capturing() {
            self.poll();
        }

        debug!("recorder stopped");
    }

    /// Run the recording loop on a new thread.
    pub fn spawn(mut self) -> Result<JoinHandle<()>> {
        Builder::new()
            .name("recorder".into())
            .spawn(move || self.run())
            .map_err(Into::into)
    }

    /// Wait for motion once, and record it if it comes.
    ///
    /// Returns the path of the published recording, if any.
    pub fn poll(&mut self) -> Option<PathBuf> {
        let prebuffer = self.settings.prebuffer();

        if !(self.wait_for_motion(prebuffer) && self.trigger.is_set()) {
            return None;
        }

        let published = self.record();

        // Let the buffer fill up before the next recording.
        self.camera.wait(prebuffer / 2);

        published
    }

    /// Wait up to `timeout` for the trigger, giving up early once capture stops.
    fn wait_for_motion(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        while self.camera.is_capturing() {
            let remaining = deadline.saturating_duration_since(Instant::now());

            if remaining.is_zero() {
                return false;
            }

            if self.trigger.wait(remaining.min(IDLE_SLICE)) {
                return true;
            }
        }

        false
    }

    /// Record until motion ends, then finalise and publish the recording.
    pub fn record(&mut self) -> Option<PathBuf> {
        info!("Detected motion");

        self.recording.store(true, Ordering::Relaxed);
        self.camera.set_led(true);

        let name = Local::now()
            .format(&self.settings.video_file_pattern)
            .to_string();
        let raw = self.settings.video_dir.join(format!("{name}.h264"));

        let result = self.capture(&raw);

        self.camera.set_led(false);

        let published = match result.and_then(|_| self.finalise(&raw, &name)) {
            Ok(path) => {
                info!("motion capture in {}", path.display());
                Some(path)
            }
            Err(e) => {
                error!("while saving recording: {:#}", e);
                remove_file(&raw);
                None
            }
        };

        self.recording.store(false, Ordering::Relaxed);

        published
    }

    /// Write the buffer into a new raw recording while motion lasts.
    fn capture(&mut self, raw: &Path) -> Result<()> {
        let prebuffer = self.settings.prebuffer();
        let mut output = self.store.create(raw)?;

        // Keep asking for a header until the file has a decodable start.
        let mut header = true;

        self.append_buffer(&mut output, &mut header)?;

        if self.settings.capture_still {
            self.capture_still();
        }

        while self.trigger.is_set() && self.camera.is_capturing() {
            self.camera.wait(prebuffer / 2);
            self.append_buffer(&mut output, &mut header)?;
        }

        output.flush()?;

        Ok(())
    }

    /// Flush contents of the video buffer to the current recording.
    fn append_buffer(&self, output: &mut impl Write, header: &mut bool) -> Result<()> {
        let first_frame = header.then(|| FrameKind::Header);

        if self
            .buffer
            .drain_into(output, self.settings.prebuffer(), first_frame)?
            > 0
        {
            *header = false;
        }

        Ok(())
    }

    /// Take a still image, and publish it to the images queue.
    fn capture_still(&self) {
        let name = Local::now()
            .format(&self.settings.image_file_pattern)
            .to_string();
        let path = self.settings.image_dir.join(format!("{name}.jpg"));

        let result = std::fs::create_dir_all(&self.settings.image_dir)
            .map_err(Into::into)
            .and_then(|_| self.camera.capture_still(&path));

        match result {
            Ok(()) => {
                if self.images.send(path).is_err() {
                    debug!("image queue is closed");
                }
            }
            Err(e) => warn!("unable to capture still image: {:#}", e),
        }
    }

    /// Remux a closed raw recording and post it to the captures queue.
    fn finalise(&mut self, raw: &Path, name: &str) -> Result<PathBuf> {
        let path = self
            .settings
            .video_dir
            .join(format!("{name}.{}", self.transcoder.extension()));

        let result = self
            .transcoder
            .remux(raw, &path, self.settings.framerate);

        if raw != path {
            remove_file(raw);
        }

        result.context("unable to remux recording")?;

        if !path.is_file() {
            return Err(anyhow!("remuxed recording {} is missing", path.display()));
        }

        if self.captures.send(path.clone()).is_err() {
            remove_file(&path);
            return Err(anyhow!("captures queue is closed"));
        }

        Ok(path)
    }
}
