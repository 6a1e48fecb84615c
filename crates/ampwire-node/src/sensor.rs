//! Current sensor input.

use std::fs;
use std::path::PathBuf;

/// Source of current magnitude samples, in amps.
pub trait CurrentSensor {
    fn sample(&mut self) -> f64;
}

impl<F: FnMut() -> f64> CurrentSensor for F {
    fn sample(&mut self) -> f64 {
        self()
    }
}

/// Converter value read from a sysfs/IIO file, scaled by a calibration factor.
#[derive(Debug)]
pub struct AdcSensor {
    path: PathBuf,
    calibration: f64,
}

impl AdcSensor {
    pub fn new(path: impl Into<PathBuf>, calibration: f64) -> Self {
        Self {
            path: path.into(),
            calibration,
        }
    }

    fn read_raw(&self) -> Result<f64, String> {
        let text = fs::read_to_string(&self.path).map_err(|e| e.to_string())?;
        let raw = text.trim().parse::<f64>().map_err(|e| e.to_string())?;
        if !raw.is_finite() {
            return Err(format!("non-finite sample {raw}"));
        }
        Ok(raw)
    }
}

impl CurrentSensor for AdcSensor {
    fn sample(&mut self) -> f64 {
        match self.read_raw() {
            Ok(raw) => raw * self.calibration,
            Err(e) => {
                tracing::warn!("Cannot read sensor {}: {}", self.path.display(), e);
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_raw_value() {
        let dir = std::env::temp_dir().join(format!("ampwire-adc-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("in_current0_raw");
        fs::write(&path, "0.25\n").unwrap();

        let mut sensor = AdcSensor::new(&path, 100.0);
        assert_eq!(sensor.sample(), 25.0);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unreadable_input_reads_zero() {
        let mut sensor = AdcSensor::new("/nonexistent/ampwire/raw", 100.0);
        assert_eq!(sensor.sample(), 0.0);
    }

    #[test]
    fn non_finite_input_reads_zero() {
        let dir = std::env::temp_dir().join(format!("ampwire-adc-nan-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("in_current0_raw");
        let mut sensor = AdcSensor::new(&path, 100.0);

        for text in ["nan\n", "inf\n", "-inf\n"] {
            fs::write(&path, text).unwrap();
            assert_eq!(sensor.sample(), 0.0, "{text:?}");
        }

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn closures_are_sensors() {
        let mut n = 0.0;
        let mut sensor = move || {
            n += 1.5;
            n
        };
        assert_eq!(CurrentSensor::sample(&mut sensor), 1.5);
        assert_eq!(CurrentSensor::sample(&mut sensor), 3.0);
    }
}
