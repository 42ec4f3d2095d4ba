use crate::reading::Reading;
use chrono::NaiveDateTime;
use log::debug;
use std::collections::HashMap;

/// Energy drawn while this process has been watching, in Watt-hours.
///
/// Each newly seen reading adds `energy += watts × Δt`, where `Δt` is the
/// time since the previous reading of the same device. Only readings newer
/// than anything seen before count, so overlapping polls never integrate the
/// same interval twice.
#[derive(Debug, Default)]
pub struct SessionEnergyAccumulator {
    total_wh: f64,
    newest_seen: Option<NaiveDateTime>,
    last_by_device: HashMap<String, NaiveDateTime>,
}

impl SessionEnergyAccumulator {

    pub fn new() -> SessionEnergyAccumulator {
        SessionEnergyAccumulator::default()
    }

    pub fn total_wh(&self) -> f64 {
        self.total_wh
    }

    /// Forget everything, as after a logout
    pub fn reset(&mut self) {
        *self = SessionEnergyAccumulator::default();
    }

    /// Integrate the readings of a newest-first buffer not observed before.
    ///
    /// Returns the energy added by this call.
    pub fn observe(&mut self, buffer: &[Reading]) -> f64 {
        let newest = match buffer.first().and_then(Reading::measured_on) {
            Some(newest) => newest,
            None => return 0.0,
        };

        let Some(newest_seen) = self.newest_seen else {
            // First sight: what is already there is only a starting point
            for reading in buffer.iter().rev() {
                if let Some(at) = reading.measured_on() {
                    self.last_by_device.insert(reading.device_id.clone(), at);
                }
            }
            self.newest_seen = Some(newest);
            return 0.0;
        };

        if newest <= newest_seen {
            return 0.0;
        }

        let mut added_wh = 0.0;
        for reading in buffer.iter().rev() {
            let Some(at) = reading.measured_on() else { continue };
            if at <= newest_seen {
                continue;
            }
            if let Some(previous_at) = self.last_by_device.get(&reading.device_id) {
                if at > *previous_at {
                    let hours = (at - *previous_at).num_milliseconds() as f64 / 3_600_000.0;
                    added_wh += reading.watts * hours;
                }
            }
            self.last_by_device.insert(reading.device_id.clone(), at);
        }

        self.newest_seen = Some(newest);
        self.total_wh += added_wh;
        debug!("session energy +{:.4}Wh, total {:.4}Wh", added_wh, self.total_wh);
        added_wh
    }
}
