//! # Recorder configuration

use crate::motion_field::grid_dim;
use anyhow::{anyhow, Context, Result};
use chrono::format::{Item, StrftimeItems};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Prefix of the environment variables read by [`Settings::from_env`].
pub const ENV_PREFIX: &str = "MVCAM_";

/// Camera, detection and recording settings.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Settings {
    pub width: usize,
    pub height: usize,
    /// Frames per second. Lower framerates leave more time for per-frame analysis.
    pub framerate: u32,
    /// Encoder bitrate, in bits per second.
    pub bitrate: u32,
    /// Seconds of video kept in memory before motion starts.
    pub prebuffer: f32,
    /// Seconds of recording kept after motion was last seen.
    pub postbuffer: f32,
    pub rotation: u32,
    /// Minimum number of connected active blocks to count as a moving object.
    pub area: usize,
    /// Minimum number of consecutive motion frames to trigger.
    pub frames: usize,
    pub overlay: bool,
    pub capture_still: bool,
    pub video_dir: PathBuf,
    pub image_dir: PathBuf,
    /// `strftime` pattern of recording names.
    pub video_file_pattern: String,
    /// `strftime` pattern of still image names.
    pub image_file_pattern: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            width: 1296,
            height: 972,
            framerate: 10,
            bitrate: 2_000_000,
            prebuffer: 10.0,
            postbuffer: 5.0,
            rotation: 0,
            area: 25,
            frames: 4,
            overlay: false,
            capture_still: false,
            video_dir: default_dir(dirs::video_dir(), "videos"),
            image_dir: default_dir(dirs::picture_dir(), "images"),
            video_file_pattern: "%Y-%m-%d_%H-%M-%S".into(),
            image_file_pattern: "%Y-%m-%d_%H-%M-%S".into(),
        }
    }
}

fn default_dir(base: Option<PathBuf>, name: &str) -> PathBuf {
    base.map(|b| b.join("mvcam")).unwrap_or_else(|| name.into())
}

fn env_var<T: FromStr>(name: &str, out: &mut T) -> Result<()>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let key = format!("{ENV_PREFIX}{name}");

    if let Ok(value) = std::env::var(&key) {
        *out = value
            .trim()
            .parse()
            .with_context(|| format!("invalid value of {key}: {value:?}"))?;
    }

    Ok(())
}

fn env_flag(name: &str, out: &mut bool) -> Result<()> {
    let mut value = String::new();
    env_var(name, &mut value)?;

    match value.as_str() {
        "" => {}
        "1" | "true" | "yes" | "on" => *out = true,
        "0" | "false" | "no" | "off" => *out = false,
        v => return Err(anyhow!("invalid value of {ENV_PREFIX}{name}: {v:?}")),
    }

    Ok(())
}

impl Settings {
    /// Load settings from a JSON file.
    ///
    /// Missing fields take their default values.
    #[cfg(feature = "serde")]
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("unable to open {}", path.display()))?;
        let settings: Self = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("unable to parse {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from `MVCAM_*` environment variables over the defaults.
    ///
    /// Variables from a `.env` file in the working directory are picked up too, without
    /// overriding ones already set.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::load_env()
    }

    /// Load settings from a given `.env` file, then the environment.
    ///
    /// Variables already set in the environment take precedence over the file.
    pub fn from_env_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        dotenvy::from_path(path)
            .with_context(|| format!("unable to load {}", path.display()))?;
        Self::load_env()
    }

    fn load_env() -> Result<Self> {
        let mut s = Self::default();
        s.apply_env()?;
        s.validate()?;
        Ok(s)
    }

    /// Override fields that are set in the environment.
    pub fn apply_env(&mut self) -> Result<()> {
        env_var("WIDTH", &mut self.width)?;
        env_var("HEIGHT", &mut self.height)?;
        env_var("FPS", &mut self.framerate)?;

        let mut kbps = self.bitrate / 1000;
        env_var("BITRATE_KBPS", &mut kbps)?;
        self.bitrate = kbps * 1000;

        env_var("PREBUFFER_SEC", &mut self.prebuffer)?;
        env_var("POSTBUFFER_SEC", &mut self.postbuffer)?;
        env_var("ROTATION", &mut self.rotation)?;
        env_var("DETECT_BLOCKS", &mut self.area)?;
        env_var("DETECT_FRAMES", &mut self.frames)?;
        env_flag("OVERLAY", &mut self.overlay)?;
        env_flag("JPEG", &mut self.capture_still)?;
        env_var("VIDEO_DIR", &mut self.video_dir)?;
        env_var("IMAGE_DIR", &mut self.image_dir)?;

        Ok(())
    }

    /// Check the settings for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!("resolution must not be empty"));
        }

        let (rows, cols) = self.grid_dim();
        if rows > u8::MAX as usize || cols > u8::MAX as usize {
            return Err(anyhow!("{}x{} motion vector grid is too big", rows, cols));
        }

        if self.framerate == 0 {
            return Err(anyhow!("framerate must not be zero"));
        }

        if !(self.prebuffer > 0.0) || !(self.postbuffer >= 0.0) {
            return Err(anyhow!("buffer durations must be positive"));
        }

        if ![0, 90, 180, 270].contains(&self.rotation) {
            return Err(anyhow!("invalid rotation {}", self.rotation));
        }

        if self.frames == 0 || self.frames > self.window() {
            return Err(anyhow!(
                "frame threshold {} must be within the {} frame window",
                self.frames,
                self.window()
            ));
        }

        for pattern in [&self.video_file_pattern, &self.image_file_pattern] {
            if pattern.is_empty() || StrftimeItems::new(pattern).any(|i| i == Item::Error) {
                return Err(anyhow!("invalid file name pattern {:?}", pattern));
            }
        }

        Ok(())
    }

    /// Post-motion window, in frames.
    pub fn window(&self) -> usize {
        (self.postbuffer * self.framerate as f32).round() as usize
    }

    /// Pre-buffer duration.
    pub fn prebuffer(&self) -> Duration {
        Duration::from_secs_f32(self.prebuffer)
    }

    /// Capacity of the in-memory video buffer.
    pub fn buffer_capacity(&self) -> Duration {
        self.prebuffer() + Duration::from_secs(1)
    }

    /// Key frame interval to configure the encoder with, in frames.
    ///
    /// Guarantees at least one key frame within the pre-buffer at any time.
    pub fn intra_period(&self) -> u32 {
        ((self.prebuffer * self.framerate as f32) as u32 / 2).max(1)
    }

    /// Motion vector grid dimensions, `(rows, cols)`.
    pub fn grid_dim(&self) -> (usize, usize) {
        grid_dim(self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[test]
    fn defaults_are_valid() {
        let s = Settings::default();
        s.validate().unwrap();
        assert_eq!(s.window(), 50);
        assert_eq!(s.buffer_capacity(), Duration::from_secs(11));
        assert_eq!(s.intra_period(), 50);
        assert_eq!(s.grid_dim(), (61, 82));
    }

    #[test]
    fn rejects_inconsistent_settings() {
        let invalid = [
            Settings {
                frames: 60,
                ..Default::default()
            },
            Settings {
                frames: 0,
                ..Default::default()
            },
            Settings {
                framerate: 0,
                ..Default::default()
            },
            Settings {
                prebuffer: 0.0,
                ..Default::default()
            },
            Settings {
                rotation: 45,
                ..Default::default()
            },
            Settings {
                width: 4096,
                ..Default::default()
            },
            Settings {
                video_file_pattern: "%Y-%".into(),
                ..Default::default()
            },
        ];

        for s in &invalid {
            assert!(s.validate().is_err(), "{:?}", s);
        }
    }

    #[test]
    fn environment_overrides() {
        let _guard = env_lock();

        std::env::set_var("MVCAM_FPS", "5");
        std::env::set_var("MVCAM_POSTBUFFER_SEC", "4");
        std::env::set_var("MVCAM_DETECT_BLOCKS", "12");
        std::env::set_var("MVCAM_JPEG", "1");
        std::env::set_var("MVCAM_BITRATE_KBPS", "1500");

        let s = Settings::from_env().unwrap();

        assert_eq!(s.framerate, 5);
        assert_eq!(s.window(), 20);
        assert_eq!(s.area, 12);
        assert!(s.capture_still);
        assert_eq!(s.bitrate, 1_500_000);

        std::env::set_var("MVCAM_ROTATION", "sideways");
        assert!(Settings::from_env().is_err());

        for var in [
            "FPS",
            "POSTBUFFER_SEC",
            "DETECT_BLOCKS",
            "JPEG",
            "BITRATE_KBPS",
            "ROTATION",
        ] {
            std::env::remove_var(format!("{ENV_PREFIX}{var}"));
        }
    }

    #[test]
    fn loads_dotenv_file() {
        let _guard = env_lock();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "MVCAM_DETECT_FRAMES=7\nMVCAM_VIDEO_DIR=/srv/videos\nMVCAM_OVERLAY=on\n",
        )
        .unwrap();

        std::env::set_var("MVCAM_DETECT_FRAMES", "6");

        let s = Settings::from_env_file(&path).unwrap();

        // Already set variables win over the file.
        assert_eq!(s.frames, 6);
        assert_eq!(s.video_dir, PathBuf::from("/srv/videos"));
        assert!(s.overlay);

        assert!(Settings::from_env_file(dir.path().join("missing.env")).is_err());

        for var in ["DETECT_FRAMES", "VIDEO_DIR", "OVERLAY"] {
            std::env::remove_var(format!("{ENV_PREFIX}{var}"));
        }
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "area": 40, "prebuffer": 6, "video_dir": "/tmp/v" }"#)
            .unwrap();

        let s = Settings::from_json_file(&path).unwrap();

        assert_eq!(s.area, 40);
        assert_eq!(s.prebuffer(), Duration::from_secs(6));
        assert_eq!(s.video_dir, PathBuf::from("/tmp/v"));
        assert_eq!(s.frames, Settings::default().frames);
    }
}
