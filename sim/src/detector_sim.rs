//! Detector payload simulator.
//!
//! Generates native detector payloads (leg poses, image boxes, sound
//! sources) in each detector's own frame with:
//! - Uniform range/bearing noise
//! - Miss probability (1 - P_D)
//! - Poisson clutter (false alarms) inside the detector's coverage
//!
//! Camera boxes are produced by inverting the pinhole model the adapters
//! use, so a noise-free box adapts back to the true range and bearing.

use fusion_core::{
    error::SensorFault, metrics::GroundTruth, transform::CoordinateTransform,
    types::{normalize_angle, CartesianPose, Modality, BASE_FRAME},
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use sensor_models::{
    adapters::CameraParams, AdapterConfig, BoundingBox, PoseArray, RawDetectionRecord, RawPayload,
    SensorSetup, SoundSource, SoundSourceRecord, StaticTransforms,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SCHEDULE_EPS: f64 = 1e-9;

const IMAGE_WIDTH: u32 = 640;
const IMAGE_HEIGHT: u32 = 480;

/// Loudness of a speaking human (same units as the sound adapter's `min_power`)
const VOICE_POWER: f64 = 40.0;

/// Noise and coverage of one simulated detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorParams {
    /// Scans per second
    pub refresh_rate: f64,
    pub p_detection: f64,
    /// Mean number of false alarms per scan
    pub lambda_clutter: f64,
    /// Half-width of the uniform range noise (meters)
    pub range_noise: f64,
    /// Half-width of the uniform bearing noise (degrees)
    pub bearing_noise_deg: f64,
    pub min_range: f64,
    pub max_range: f64,
    /// Half of the angular coverage (degrees)
    pub fov_half_deg: f64,
}

/// One configured detector in the simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimDetector {
    pub modality: Modality,
    /// Mount frame the payloads are expressed in
    pub frame_id: String,
    pub params: DetectorParams,
    /// Next scheduled scan time
    pub next_scan_time: f64,
}

impl SimDetector {
    pub fn new(modality: Modality, frame_id: impl Into<String>, params: DetectorParams) -> Self {
        Self {
            modality,
            frame_id: frame_id.into(),
            params,
            next_scan_time: 0.0,
        }
    }

    /// Check if this detector should fire at the current simulation time.
    pub fn should_scan(&self, t: f64) -> bool {
        // Tolerate the drift of a schedule built by repeated addition
        t >= self.next_scan_time - SCHEDULE_EPS
    }

    /// Advance the schedule by one scan interval.
    pub fn advance_schedule(&mut self) {
        self.next_scan_time += 1.0 / self.params.refresh_rate;
    }

    fn covers(&self, range: f64, bearing: f64) -> bool {
        range >= self.params.min_range
            && range <= self.params.max_range
            && normalize_angle(bearing).abs() <= self.params.fov_half_deg.to_radians()
    }
}

/// Generates payloads from ground-truth human positions.
pub struct DetectorSimulator {
    pub detectors: Vec<SimDetector>,
    adapters: AdapterConfig,
    transforms: StaticTransforms,
    rng: ChaCha8Rng,
    next_source_id: u32,
}

impl DetectorSimulator {
    pub fn new(detectors: Vec<SimDetector>, setup: &SensorSetup, seed: u64) -> Self {
        Self {
            detectors,
            adapters: setup.adapters.clone(),
            transforms: setup.transforms(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_source_id: 0,
        }
    }

    /// Generate the payloads of every detector due at `sim_time`.
    ///
    /// `humans` are base-frame positions of the humans present at that time.
    pub fn generate(
        &mut self,
        humans: &[GroundTruth],
        sim_time: f64,
    ) -> Result<Vec<RawPayload>, SensorFault> {
        let positions: Vec<CartesianPose> = humans.iter().map(|h| h.position).collect();
        let mut payloads = Vec::new();

        for detector in &mut self.detectors {
            if !detector.should_scan(sim_time) {
                continue;
            }
            let scan_time = detector.next_scan_time;
            detector.advance_schedule();

            let local = self.transforms.transform(
                &positions,
                BASE_FRAME,
                &detector.frame_id,
                Duration::ZERO,
            )?;

            // (range, bearing, is_human)
            let mut hits: Vec<(f64, f64, bool)> = Vec::new();

            // True detections
            for p in &local {
                if self.rng.gen::<f64>() > detector.params.p_detection {
                    continue;
                }
                let range = p.x.hypot(p.y);
                let bearing = p.y.atan2(p.x);
                if !detector.covers(range, bearing) {
                    continue;
                }
                let rn = detector.params.range_noise;
                let bn = detector.params.bearing_noise_deg.to_radians();
                let noisy_range = range + self.rng.gen::<f64>() * rn * 2.0 - rn;
                let noisy_bearing = bearing + self.rng.gen::<f64>() * bn * 2.0 - bn;
                hits.push((noisy_range.max(0.1), noisy_bearing, true));
            }

            // Clutter (Poisson)
            let n_clutter = poisson(&mut self.rng, detector.params.lambda_clutter);
            for _ in 0..n_clutter {
                let (lo, hi) = (detector.params.min_range, detector.params.max_range);
                let range = lo + (hi - lo) * self.rng.gen::<f64>();
                let half = detector.params.fov_half_deg.to_radians();
                let bearing = self.rng.gen::<f64>() * 2.0 * half - half;
                hits.push((range, bearing, false));
            }

            let payload = match detector.modality {
                Modality::Leg => RawPayload::Legs(PoseArray {
                    frame_id: detector.frame_id.clone(),
                    stamp: scan_time,
                    poses: hits
                        .iter()
                        .map(|&(r, b, _)| CartesianPose::new(r * b.cos(), r * b.sin()))
                        .collect(),
                }),
                Modality::Torso => RawPayload::Torso(camera_record(
                    &self.adapters.torso_camera,
                    &detector.frame_id,
                    scan_time,
                    &hits,
                )),
                Modality::PeriodicGesture => RawPayload::PeriodicGesture(camera_record(
                    &self.adapters.periodic_camera,
                    &detector.frame_id,
                    scan_time,
                    &hits,
                )),
                Modality::Sound => {
                    let min_power = self.adapters.sound.min_power;
                    let mut sources = Vec::with_capacity(hits.len());
                    for &(_, b, is_human) in &hits {
                        // Clutter spans quiet noise up to a loud knock
                        let power = if is_human {
                            VOICE_POWER + 10.0 * self.rng.gen::<f64>()
                        } else {
                            2.0 * min_power * self.rng.gen::<f64>()
                        };
                        sources.push(SoundSource {
                            id: self.next_source_id,
                            azimuth: b.to_degrees(),
                            power,
                        });
                        self.next_source_id += 1;
                    }
                    RawPayload::Sound(SoundSourceRecord {
                        frame_id: detector.frame_id.clone(),
                        stamp: scan_time,
                        sources,
                    })
                }
            };
            payloads.push(payload);
        }

        Ok(payloads)
    }
}

/// Boxes whose pinhole projection matches each `(range, bearing)`.
/// Hits outside the horizontal field of view leave the image.
fn camera_record(
    camera: &CameraParams,
    frame_id: &str,
    stamp: f64,
    hits: &[(f64, f64, bool)],
) -> RawDetectionRecord {
    let w = IMAGE_WIDTH as f64;
    let half_fov = camera.horizontal_fov_deg.to_radians() / 2.0;
    let f = w / (2.0 * half_fov.tan());
    let detections = hits
        .iter()
        .filter(|(_, b, _)| b.abs() < half_fov)
        .map(|&(r, b, _)| {
            let width = camera.feature_width * f / r;
            let cx = w / 2.0 - f * b.tan();
            BoundingBox {
                x: cx - width / 2.0,
                y: IMAGE_HEIGHT as f64 / 4.0,
                width,
                height: 2.0 * width,
            }
        })
        .collect();
    RawDetectionRecord {
        frame_id: frame_id.to_string(),
        stamp,
        image_width: IMAGE_WIDTH,
        image_height: IMAGE_HEIGHT,
        detections,
    }
}

/// Poisson draw by multiplying uniforms until the product drops below e^{-λ}.
fn poisson(rng: &mut ChaCha8Rng, lambda: f64) -> usize {
    if lambda <= 0.0 {
        return 0;
    }
    let mut n = 0usize;
    let threshold = (-lambda).exp();
    let mut prod = rng.gen::<f64>();
    while prod > threshold && n < 50 {
        prod *= rng.gen::<f64>();
        n += 1;
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use sensor_models::AdapterSet;

    fn perfect(modality: Modality, frame: &str) -> SimDetector {
        SimDetector::new(
            modality,
            frame,
            DetectorParams {
                refresh_rate: 10.0,
                p_detection: 1.0,
                lambda_clutter: 0.0,
                range_noise: 0.0,
                bearing_noise_deg: 0.0,
                min_range: 0.5,
                max_range: 10.0,
                fov_half_deg: 180.0,
            },
        )
    }

    fn human(x: f64, y: f64) -> GroundTruth {
        GroundTruth {
            human_id: 0,
            time: 0.0,
            position: CartesianPose::new(x, y),
        }
    }

    #[test]
    fn camera_boxes_adapt_back_to_the_human() {
        let setup = SensorSetup::default();
        let mut sim = DetectorSimulator::new(vec![perfect(Modality::Torso, "head_camera")], &setup, 1);
        let payloads = sim.generate(&[human(4.05, 1.0)], 0.0).unwrap();
        assert_eq!(payloads.len(), 1);

        let fusion = fusion_core::FusionConfig::default();
        let batch = AdapterSet::new(&fusion, &setup.adapters)
            .adapt(&payloads[0])
            .unwrap();
        let d = batch.detections[0];
        // head_camera sits 5 cm ahead of the base
        assert_abs_diff_eq!(d.range, 4.0f64.hypot(1.0), epsilon = 1e-9);
        assert_abs_diff_eq!(d.bearing, 1.0f64.atan2(4.0), epsilon = 1e-9);
    }

    #[test]
    fn payloads_are_in_the_mount_frame() {
        let mut sim = DetectorSimulator::new(
            vec![perfect(Modality::Leg, "base_laser_link")],
            &SensorSetup::default(),
            1,
        );
        let payloads = sim.generate(&[human(3.0, 0.0)], 0.0).unwrap();
        match &payloads[0] {
            RawPayload::Legs(p) => {
                assert_eq!(p.frame_id, "base_laser_link");
                assert_abs_diff_eq!(p.poses[0].x, 2.8, epsilon = 1e-12);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn schedule_follows_refresh_rate() {
        let mut det = perfect(Modality::Sound, "mic_array");
        det.params.refresh_rate = 5.0;
        let mut sim = DetectorSimulator::new(vec![det], &SensorSetup::default(), 3);
        let fired: usize = (0..10)
            .map(|i| sim.generate(&[], i as f64 * 0.1).unwrap().len())
            .sum();
        assert_eq!(fired, 5);
    }

    #[test]
    fn missing_mount_is_a_fault() {
        let mut sim = DetectorSimulator::new(
            vec![perfect(Modality::Leg, "rear_laser")],
            &SensorSetup::default(),
            1,
        );
        assert!(sim.generate(&[human(1.0, 0.0)], 0.0).is_err());
    }

    #[test]
    fn poisson_mean_is_close() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let n = 4000;
        let total: usize = (0..n).map(|_| poisson(&mut rng, 2.0)).sum();
        let mean = total as f64 / n as f64;
        assert!((mean - 2.0).abs() < 0.15, "mean {mean}");
    }
}
