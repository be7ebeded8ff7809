//! Latest-value hand-off between input producers and the fusion loop.
//!
//! Producers (detector callbacks, odometry) only ever overwrite a slot;
//! the loop takes whatever is there at the start of a tick. No queueing:
//! a batch that is overwritten before the loop reads it is simply lost.

use crate::types::{DetectionBatch, Modality, ModalityMap, OdometryReading};
use parking_lot::Mutex;

/// Single-slot, overwrite-on-post mailbox.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored value.
    pub fn post(&self, value: T) {
        *self.slot.lock() = Some(value);
    }

    /// Remove and return the stored value.
    pub fn take(&self) -> Option<T> {
        self.slot.lock().take()
    }
}

impl<T: Clone> Mailbox<T> {
    /// Copy of the stored value, leaving it in place.
    pub fn peek(&self) -> Option<T> {
        self.slot.lock().clone()
    }
}

/// Every input the fusion loop reads, shared as `Arc<PipelineInputs>`.
#[derive(Debug, Default)]
pub struct PipelineInputs {
    odometry: Mailbox<OdometryReading>,
    detections: ModalityMap<Mailbox<DetectionBatch>>,
}

impl PipelineInputs {
    /// Mailboxes for exactly `modalities`. Batches for any other modality
    /// are dropped on post.
    pub fn new(modalities: impl IntoIterator<Item = Modality>) -> Self {
        Self {
            odometry: Mailbox::new(),
            detections: modalities.into_iter().map(|m| (m, Mailbox::new())).collect(),
        }
    }

    pub fn post_odometry(&self, reading: OdometryReading) {
        self.odometry.post(reading);
    }

    /// Latest odometry. Kept across ticks: the robot keeps moving whether
    /// or not a new reading arrived.
    pub fn latest_odometry(&self) -> Option<OdometryReading> {
        self.odometry.peek()
    }

    /// Store `batch` in its modality's slot. Returns false when that
    /// modality has no slot.
    pub fn post_detections(&self, batch: DetectionBatch) -> bool {
        match self.detections.get(batch.modality) {
            Some(mailbox) => {
                mailbox.post(batch);
                true
            }
            None => {
                tracing::debug!(modality = %batch.modality, "no mailbox for disabled modality");
                false
            }
        }
    }

    /// Consume the pending batch of `modality`.
    pub fn take_detections(&self, modality: Modality) -> Option<DetectionBatch> {
        self.detections.get(modality).and_then(Mailbox::take)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SensorDetection, Velocity};
    use std::sync::Arc;

    fn batch(modality: Modality, stamp: f64) -> DetectionBatch {
        DetectionBatch {
            modality,
            frame_id: "base_footprint".into(),
            stamp,
            detections: vec![SensorDetection::new(2.0, 0.0)],
        }
    }

    #[test]
    fn post_overwrites_and_take_empties() {
        let mb = Mailbox::new();
        mb.post(1);
        mb.post(2);
        assert_eq!(mb.peek(), Some(2));
        assert_eq!(mb.take(), Some(2));
        assert_eq!(mb.take(), None);
    }

    #[test]
    fn disabled_modality_is_dropped() {
        let inputs = PipelineInputs::new([Modality::Leg]);
        assert!(inputs.post_detections(batch(Modality::Leg, 1.0)));
        assert!(!inputs.post_detections(batch(Modality::Sound, 1.0)));
        assert!(inputs.take_detections(Modality::Sound).is_none());
        assert_eq!(inputs.take_detections(Modality::Leg).unwrap().stamp, 1.0);
    }

    #[test]
    fn odometry_survives_reads() {
        let inputs = PipelineInputs::new(Modality::ALL);
        inputs.post_odometry(OdometryReading {
            velocity: Velocity::new(0.5, 0.0, 0.0),
            stamp: 2.0,
        });
        assert!(inputs.latest_odometry().is_some());
        assert!(inputs.latest_odometry().is_some());
    }

    #[test]
    fn producers_on_other_threads() {
        let inputs = Arc::new(PipelineInputs::new(Modality::ALL));
        let handles: Vec<_> = Modality::ALL
            .into_iter()
            .map(|m| {
                let inputs = Arc::clone(&inputs);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        inputs.post_detections(batch(m, i as f64));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        for m in Modality::ALL {
            assert_eq!(inputs.take_detections(m).unwrap().stamp, 99.0);
        }
    }
}
