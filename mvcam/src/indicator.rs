//! # Indicator light

use crate::camera::Camera;
use crate::signal::TriggerSignal;
use anyhow::Result;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{Builder, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const BLINK: Duration = Duration::from_millis(50);
const PERIOD: Duration = Duration::from_secs(2);

/// Time left until the next whole blink period of the wall clock.
fn until_next_period() -> Duration {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let phase = now.as_millis() % PERIOD.as_millis();
    PERIOD - Duration::from_millis(phase as u64)
}

/// Blink the camera light while idle, to show the detector is alive.
///
/// Returns once the camera stops capturing.
pub fn blink(camera: &dyn Camera, trigger: &TriggerSignal, recording: &AtomicBool) {
    while camera.is_capturing() {
        if !trigger.is_set() && !recording.load(Ordering::Relaxed) {
            camera.set_led(true);
            camera.wait(BLINK);
            camera.set_led(false);
        }
        camera.wait(until_next_period());
    }
}

/// Run [`blink`] on a new thread.
pub fn spawn_blinker(
    camera: Arc<dyn Camera>,
    trigger: Arc<TriggerSignal>,
    recording: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    Builder::new()
        .name("blink".into())
        .spawn(move || blink(&*camera, &trigger, &recording))
        .map_err(Into::into)
}
