//! Status indicator output.

use std::fs;
use std::path::PathBuf;

/// A single on/off status output.
pub trait IndicatorOutput {
    fn set(&mut self, on: bool);
}

impl<T: IndicatorOutput + ?Sized> IndicatorOutput for Box<T> {
    fn set(&mut self, on: bool) {
        (**self).set(on)
    }
}

/// LED driven through a sysfs `brightness` file.
#[derive(Debug)]
pub struct SysfsLed {
    brightness: PathBuf,
    failed: bool,
}

impl SysfsLed {
    pub fn new(brightness: impl Into<PathBuf>) -> Self {
        Self {
            brightness: brightness.into(),
            failed: false,
        }
    }
}

impl IndicatorOutput for SysfsLed {
    fn set(&mut self, on: bool) {
        let value = if on { "1" } else { "0" };
        match fs::write(&self.brightness, value) {
            Ok(()) => self.failed = false,
            // Warn once per failure streak; the indicator toggles every poll.
            Err(e) if !self.failed => {
                tracing::warn!("Cannot drive LED {}: {}", self.brightness.display(), e);
                self.failed = true;
            }
            Err(_) => {}
        }
    }
}

/// Indicator that only traces its state.
#[derive(Debug, Default)]
pub struct LogIndicator;

impl IndicatorOutput for LogIndicator {
    fn set(&mut self, on: bool) {
        tracing::trace!(on, "indicator");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sysfs_led_writes_brightness() {
        let dir = std::env::temp_dir().join(format!("ampwire-led-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("brightness");

        let mut led = SysfsLed::new(&path);
        led.set(true);
        assert_eq!(fs::read_to_string(&path).unwrap(), "1");
        led.set(false);
        assert_eq!(fs::read_to_string(&path).unwrap(), "0");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn sysfs_led_tolerates_missing_file() {
        let mut led = SysfsLed::new("/nonexistent/ampwire/brightness");
        led.set(true);
        led.set(false);
        assert!(led.failed);
    }
}
