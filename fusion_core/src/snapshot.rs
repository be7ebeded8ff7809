//! Published wire schema.
//!
//! Every message is an owned copy built from a [`CycleOutput`]; nothing here
//! borrows pipeline state. Grid streams send their metadata only once, with
//! the first message, and the full cell array every time.

use crate::{
    grid::{GridOrigin, OccupancyGrid},
    pipeline::CycleOutput,
    types::{CartesianPose, Modality, ModalityMap, BASE_FRAME},
};
use serde::{Deserialize, Serialize};

/// Stream carrying the fused human grid.
pub const HUMAN_GRID_TOPIC: &str = "human_occupancy_grid";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub stamp: f64,
    pub frame_id: String,
}

impl Header {
    fn base(stamp: f64) -> Self {
        Self {
            stamp,
            frame_id: BASE_FRAME.to_string(),
        }
    }
}

/// Raster layout, sent once per stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapMetaData {
    pub width: usize,
    pub height: usize,
    pub resolution: f64,
    pub origin: GridOrigin,
    pub frame_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OccupancyGridMsg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<MapMetaData>,
    pub stamp: f64,
    /// `round(100·p)`, row-major
    pub cells: Vec<u8>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<CartesianPose> for Point {
    fn from(p: CartesianPose) -> Self {
        Self {
            x: p.x,
            y: p.y,
            z: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseArrayMsg {
    pub header: Header,
    pub poses: Vec<Point>,
}

impl PoseArrayMsg {
    pub fn new(stamp: f64, poses: impl IntoIterator<Item = CartesianPose>) -> Self {
        Self {
            header: Header::base(stamp),
            poses: poses.into_iter().map(Point::from).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointStampedMsg {
    pub header: Header,
    pub point: Point,
}

/// Scale a probability to the 0..=100 occupancy range.
pub fn to_occupancy(p: f64) -> u8 {
    (p.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// One outgoing grid stream; remembers whether its metadata went out.
#[derive(Clone, Debug, Default)]
pub struct GridPublisher {
    info_sent: bool,
}

impl GridPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&mut self, grid: &OccupancyGrid, stamp: f64) -> OccupancyGridMsg {
        let info = (!self.info_sent).then(|| MapMetaData {
            width: grid.width(),
            height: grid.height(),
            resolution: grid.resolution(),
            origin: grid.origin(),
            frame_id: BASE_FRAME.to_string(),
        });
        self.info_sent = true;
        OccupancyGridMsg {
            info,
            stamp,
            cells: grid.cells.iter().map(|&p| to_occupancy(p)).collect(),
        }
    }
}

/// Debug pose arrays of one modality.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionArrays {
    pub current: PoseArrayMsg,
    pub predicted: PoseArrayMsg,
    pub past: PoseArrayMsg,
}

/// Everything published for one tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleMessages {
    /// (topic, message) per enabled modality, then the human grid
    pub grids: Vec<(String, OccupancyGridMsg)>,
    pub local_maxima: PoseArrayMsg,
    pub highest_prob_point: Option<PointStampedMsg>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub debug: Vec<(Modality, DetectionArrays)>,
}

/// Turns cycle outputs into messages, one grid stream per modality plus the
/// human grid.
#[derive(Clone, Debug, Default)]
pub struct SnapshotPublisher {
    modalities: ModalityMap<GridPublisher>,
    human: GridPublisher,
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&mut self, output: &CycleOutput) -> CycleMessages {
        let stamp = output.stamp;
        let mut grids = Vec::with_capacity(output.modality_grids.len() + 1);
        for (modality, grid) in output.modality_grids.iter() {
            if !self.modalities.contains(modality) {
                self.modalities.insert(modality, GridPublisher::new());
            }
            if let Some(publisher) = self.modalities.get_mut(modality) {
                grids.push((modality.topic().to_string(), publisher.publish(grid, stamp)));
            }
        }
        grids.push((
            HUMAN_GRID_TOPIC.to_string(),
            self.human.publish(&output.human_grid, stamp),
        ));

        let debug = output
            .debug
            .iter()
            .map(|(modality, sets)| {
                let arrays = |poses: &[crate::types::PolarPose]| {
                    PoseArrayMsg::new(stamp, poses.iter().map(|p| p.to_cartesian()))
                };
                (
                    modality,
                    DetectionArrays {
                        current: arrays(&sets.current),
                        predicted: arrays(&sets.predicted),
                        past: arrays(&sets.past),
                    },
                )
            })
            .collect();

        CycleMessages {
            grids,
            local_maxima: PoseArrayMsg::new(
                stamp,
                output.maxima.local_maxima.iter().map(|c| c.position),
            ),
            highest_prob_point: output.maxima.highest.map(|p| PointStampedMsg {
                header: Header::base(stamp),
                point: p.into(),
            }),
            debug,
        }
    }
}
