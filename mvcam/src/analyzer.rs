//! # Per-frame motion analysis
//!
//! Runs once per encoded frame on the macroblock motion vectors (a few thousand of them for
//! HD-class resolutions), never on pixel data. This keeps the analysis well within the frame
//! interval even on small devices.

use crate::camera::MotionHandler;
use crate::capture_log::CaptureLogWriter;
use crate::detection::{activity_mask, Connectivity, RegionDetector};
use crate::hysteresis::{HysteresisTracker, TriggerUpdate};
use crate::motion_field::{MagnitudeField, MotionVectorFrame};
use crate::noise::NoiseModel;
use crate::settings::Settings;
use crate::signal::TriggerSignal;
use anyhow::Result;
use log::*;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

/// Latest magnitude field, shared with preview consumers.
pub type SharedField = Arc<RwLock<Option<MagnitudeField>>>;

/// Motion analyzer.
///
/// Sequences noise estimation, block activity, region labeling and temporal hysteresis, and
/// drives the [`TriggerSignal`] from the result.
pub struct MotionAnalyzer {
    area: usize,
    noise: NoiseModel,
    detector: RegionDetector,
    tracker: HysteresisTracker,
    trigger: Arc<TriggerSignal>,
    enabled: bool,
    field: Option<SharedField>,
    output: Option<CaptureLogWriter<Box<dyn Write + Send>>>,
    frame_index: u32,
    last_largest: usize,
}

impl std::fmt::Display for MotionAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "sensitivity {}/{}", self.area, self.tracker.frames())
    }
}

impl MotionAnalyzer {
    /// Create a new motion analyzer.
    ///
    /// # Arguments
    ///
    /// * `window` - number of recent frame decisions considered, in frames.
    /// * `area` - minimum number of connected active blocks for a frame to contain motion.
    /// * `frames` - minimum run of motion frames to set the trigger.
    pub fn new(window: usize, area: usize, frames: usize) -> Self {
        let ret = Self {
            area,
            noise: NoiseModel::new(window),
            detector: RegionDetector::new(Connectivity::Four),
            tracker: HysteresisTracker::new(window, frames),
            trigger: Arc::new(TriggerSignal::new()),
            enabled: true,
            field: None,
            output: None,
            frame_index: 0,
            last_largest: 0,
        };

        debug!("motion detection {}", ret);

        ret
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.window(), settings.area, settings.frames)
    }

    /// Use a different neighbourhood for joining active blocks.
    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.detector = RegionDetector::new(connectivity);
        self
    }

    /// Get a handle to the trigger driven by this analyzer.
    pub fn trigger(&self) -> Arc<TriggerSignal> {
        self.trigger.clone()
    }

    /// Mirror every computed magnitude field into a shared slot.
    pub fn mirror_field(&mut self) -> SharedField {
        self.field.get_or_insert_with(Default::default).clone()
    }

    /// Append a diagnostic record of every analyzed frame to a file.
    ///
    /// Every record is flushed as soon as it is written.
    pub fn save_motion_vectors(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let log = CaptureLogWriter::append(path)?;
        self.set_capture_log(log.into_inner());
        Ok(())
    }

    /// Append a diagnostic record of every analyzed frame to a writer.
    pub fn set_capture_log(&mut self, out: impl Write + Send + 'static) {
        self.output = Some(CaptureLogWriter::new(Box::new(out)));
    }

    pub fn area(&self) -> usize {
        self.area
    }

    pub fn set_area(&mut self, area: usize) {
        self.area = area;
    }

    pub fn frames(&self) -> usize {
        self.tracker.frames()
    }

    pub fn set_frames(&mut self, frames: usize) {
        self.tracker.set_frames(frames);
    }

    pub fn window(&self) -> usize {
        self.tracker.history().window()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable the analysis.
    ///
    /// A disabled analyzer still ages out its history, but never touches the trigger.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Biggest region size of the last analyzed frame.
    pub fn last_largest(&self) -> usize {
        self.last_largest
    }

    pub fn noise(&self) -> &NoiseModel {
        &self.noise
    }

    /// Analyze a single frame.
    ///
    /// Must be called once per frame, in frame order. Returns whether this frame on its own
    /// contained a big enough region of motion.
    pub fn analyze(&mut self, frame: &MotionVectorFrame) -> bool {
        let index = self.frame_index;
        self.frame_index = self.frame_index.wrapping_add(1);

        if !self.enabled {
            self.tracker.age();
            return false;
        }

        self.log_frame(index, frame);

        self.noise.update(frame);

        let magnitude = frame.magnitude();
        let mask = activity_mask(&magnitude, &self.noise);

        if let Some(field) = &self.field {
            *field.write().unwrap_or_else(PoisonError::into_inner) = Some(magnitude);
        }

        self.last_largest = self.detector.largest_region(mask);
        let motion = self.last_largest >= self.area;

        match self.tracker.update(motion) {
            TriggerUpdate::Set => self.trigger.set(),
            TriggerUpdate::Clear => self.trigger.clear(),
            TriggerUpdate::Hold => {}
        }

        motion
    }

    fn log_frame(&mut self, index: u32, frame: &MotionVectorFrame) {
        if let Some(output) = &mut self.output {
            let written = output
                .write_frame(index, self.trigger.is_set(), frame)
                .and_then(|_| output.flush());

            if let Err(e) = written {
                warn!("disabling motion vector log: {}", e);
                self.output = None;
            }
        }
    }
}

impl MotionHandler for MotionAnalyzer {
    fn on_motion_vectors(&mut self, frame: &MotionVectorFrame) -> bool {
        self.analyze(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture_log::CaptureLogReader;
    use crate::motion_field::MotionVector;
    use std::sync::Mutex;

    const ROWS: usize = 20;
    const COLS: usize = 30;

    fn still() -> MotionVectorFrame {
        MotionVectorFrame::new(ROWS, COLS)
    }

    /// Frame with a single moving `h`x`w` block region.
    fn moving(h: usize, w: usize) -> MotionVectorFrame {
        let mut frame = still();
        for r in 2..2 + h {
            for c in 3..3 + w {
                frame.set(r, c, MotionVector::new(10, -4, 0));
            }
        }
        frame
    }

    #[test]
    fn empty_frames_never_trigger() {
        let mut analyzer = MotionAnalyzer::new(40, 25, 4);

        for _ in 0..100 {
            assert!(!analyzer.analyze(&still()));
            assert_eq!(analyzer.last_largest(), 0);
        }

        assert!(!analyzer.trigger().is_set());
    }

    #[test]
    fn consecutive_motion_sets_trigger() {
        let mut analyzer = MotionAnalyzer::new(40, 25, 4);
        let trigger = analyzer.trigger();

        for _ in 0..5 {
            analyzer.analyze(&still());
        }

        for i in 1..=4 {
            assert!(!trigger.is_set(), "set before frame {}", i);
            // 30 connected blocks.
            assert!(analyzer.analyze(&moving(5, 6)));
            assert_eq!(analyzer.last_largest(), 30);
        }

        assert!(trigger.is_set());

        for _ in 0..10 {
            analyzer.analyze(&still());
        }

        assert!(trigger.is_set());
    }

    #[test]
    fn interrupted_motion_does_not_trigger() {
        let mut analyzer = MotionAnalyzer::new(40, 25, 4);

        let frames = [
            moving(5, 6),
            moving(5, 6),
            still(),
            moving(5, 6),
            moving(5, 6),
        ];

        for frame in &frames {
            analyzer.analyze(frame);
        }

        for _ in 0..40 {
            analyzer.analyze(&still());
            assert!(!analyzer.trigger().is_set());
        }
    }

    #[test]
    fn small_regions_are_ignored() {
        let mut analyzer = MotionAnalyzer::new(40, 25, 4);

        for _ in 0..10 {
            // 24 connected blocks.
            assert!(!analyzer.analyze(&moving(4, 6)));
        }

        assert!(!analyzer.trigger().is_set());
    }

    #[test]
    fn trigger_clears_after_window() {
        let window = 10;
        let mut analyzer = MotionAnalyzer::new(window, 25, 2);
        let trigger = analyzer.trigger();

        analyzer.analyze(&moving(5, 6));
        analyzer.analyze(&moving(5, 6));
        assert!(trigger.is_set());

        for _ in 0..window - 1 {
            analyzer.analyze(&still());
            assert!(trigger.is_set());
        }

        analyzer.analyze(&still());
        assert!(!trigger.is_set());
    }

    #[test]
    fn disabled_analyzer_ages_history() {
        let window = 6;
        let mut analyzer = MotionAnalyzer::new(window, 25, 2);
        let trigger = analyzer.trigger();

        analyzer.analyze(&moving(5, 6));
        analyzer.analyze(&moving(5, 6));
        assert!(trigger.is_set());

        analyzer.set_enabled(false);

        for _ in 0..window {
            assert!(!analyzer.analyze(&moving(5, 6)));
        }

        // Trigger is left alone while disabled.
        assert!(trigger.is_set());

        analyzer.set_enabled(true);
        analyzer.analyze(&still());
        assert!(!trigger.is_set());
    }

    #[test]
    fn mirrors_magnitude() {
        let mut analyzer = MotionAnalyzer::new(10, 25, 4);
        let field = analyzer.mirror_field();

        assert!(field.read().unwrap().is_none());
        analyzer.analyze(&moving(1, 1));

        let field = field.read().unwrap();
        let field = field.as_ref().unwrap();
        assert_eq!(field.shape(), (ROWS, COLS));
        assert_eq!(field[(2, 3)], 11);
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn logs_every_analyzed_frame() {
        let buf = SharedBuf::default();
        let mut analyzer = MotionAnalyzer::new(10, 25, 1);
        analyzer.set_capture_log(buf.clone());

        analyzer.analyze(&moving(5, 6));
        analyzer.analyze(&still());

        let bytes = buf.0.lock().unwrap().clone();
        let frames = CaptureLogReader::new(bytes.as_slice())
            .collect::<Result<Vec<_>>>()
            .unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].index, 0);
        assert!(!frames[0].trigger);
        assert_eq!(frames[0].frame, moving(5, 6));
        assert_eq!(frames[1].index, 1);
        assert!(frames[1].trigger);
    }

    #[test]
    fn log_file_is_flushed_per_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.mvlog");

        let mut analyzer = MotionAnalyzer::new(10, 25, 1);
        analyzer.save_motion_vectors(&path).unwrap();
        analyzer.analyze(&moving(5, 6));

        // Analyzer still holds the file open.
        let bytes = std::fs::read(&path).unwrap();
        let frames = CaptureLogReader::new(bytes.as_slice())
            .collect::<Result<Vec<_>>>()
            .unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame, moving(5, 6));
    }

    #[test]
    fn display_sensitivity() {
        let mut analyzer = MotionAnalyzer::new(10, 25, 4);
        assert_eq!(analyzer.to_string(), "sensitivity 25/4");
        analyzer.set_area(30);
        analyzer.set_frames(2);
        assert_eq!(analyzer.to_string(), "sensitivity 30/2");
    }
}
