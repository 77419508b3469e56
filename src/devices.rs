//! Hardware the demo pages report on.
//!
//! Real drivers live outside this crate; the pages only need the two
//! traits below. [`SimulatedSensor`] and [`StaticNetwork`] are fixed
//! in-memory stand-ins used by the binary and the tests.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;

pub trait Sensor: Send + Sync {
    fn name(&self) -> &str;

    fn unit(&self) -> &str;

    /// Takes a new reading and records it in the min/max bookkeeping.
    fn read(&self) -> f64;

    /// Lowest value read so far, 0.0 before the first reading.
    fn recorded_min(&self) -> f64;

    /// Highest value read so far, 0.0 before the first reading.
    fn recorded_max(&self) -> f64;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkStatus {
    pub connected: bool,
    pub ip_address: String,
    pub ssid: String,
}

pub trait NetworkStatus: Send + Sync {
    fn status(&self) -> LinkStatus;
}

#[derive(Debug, Default)]
struct Recorded {
    next: usize,
    range: Option<(f64, f64)>,
}

/// Replays a fixed series of readings, wrapping around at the end.
#[derive(Debug)]
pub struct SimulatedSensor {
    name: String,
    unit: String,
    readings: Vec<f64>,
    recorded: Mutex<Recorded>,
}

impl SimulatedSensor {
    pub fn new(name: &str, unit: &str, readings: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            unit: unit.to_string(),
            readings,
            recorded: Mutex::new(Recorded::default()),
        }
    }

    fn range(&self) -> Option<(f64, f64)> {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .range
    }
}

impl Sensor for SimulatedSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn unit(&self) -> &str {
        &self.unit
    }

    fn read(&self) -> f64 {
        let mut recorded = self.recorded.lock().unwrap_or_else(PoisonError::into_inner);
        let value = match self.readings.len() {
            0 => 0.0,
            len => self.readings[recorded.next % len],
        };
        recorded.next = recorded.next.wrapping_add(1);
        recorded.range = Some(match recorded.range {
            Some((min, max)) => (min.min(value), max.max(value)),
            None => (value, value),
        });
        value
    }

    fn recorded_min(&self) -> f64 {
        self.range().map_or(0.0, |(min, _)| min)
    }

    fn recorded_max(&self) -> f64 {
        self.range().map_or(0.0, |(_, max)| max)
    }
}

#[derive(Debug, Clone)]
pub struct StaticNetwork {
    status: LinkStatus,
}

impl StaticNetwork {
    pub fn new(status: LinkStatus) -> Self {
        Self { status }
    }

    pub fn disconnected() -> Self {
        Self::new(LinkStatus {
            connected: false,
            ip_address: String::new(),
            ssid: String::new(),
        })
    }
}

impl NetworkStatus for StaticNetwork {
    fn status(&self) -> LinkStatus {
        self.status.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_max_bookkeeping() {
        let sensor = SimulatedSensor::new("temperature", "C", vec![21.5, 19.0, 23.25]);
        assert_eq!(sensor.recorded_min(), 0.0);
        assert_eq!(sensor.recorded_max(), 0.0);

        assert_eq!(sensor.read(), 21.5);
        assert_eq!(sensor.recorded_min(), 21.5);
        assert_eq!(sensor.recorded_max(), 21.5);

        sensor.read();
        sensor.read();
        assert_eq!(sensor.read(), 21.5);
        assert_eq!(sensor.recorded_min(), 19.0);
        assert_eq!(sensor.recorded_max(), 23.25);
    }

    #[test]
    fn test_empty_series_reads_zero() {
        let sensor = SimulatedSensor::new("lux", "lx", Vec::new());
        assert_eq!(sensor.read(), 0.0);
        assert_eq!(sensor.recorded_max(), 0.0);
    }
}
