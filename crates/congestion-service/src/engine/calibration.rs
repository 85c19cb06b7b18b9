/// Lane polygon calibration: the JSON document written by the calibration tool and its
/// validated, priority-ordered form consumed by the pipeline.
use super::error::{EngineError, EngineResult};
use super::geometry::LanePolygon;
use anyhow::{Context, Result};
use common::traffic::Point;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Calibrated lanes are quadrilaterals
pub const LANE_VERTEX_COUNT: usize = 4;

const LANE_KEY_PREFIX: &str = "lane_";

/// Raw calibration document, e.g.
/// `{"lane_1": [[x,y],..4], "lane_2": [[x,y],..4], "frame_width": 1280, "frame_height": 720}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibrationDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_height: Option<u32>,

    #[serde(flatten)]
    pub lanes: BTreeMap<String, Vec<[i64; 2]>>,
}

/// One calibrated lane
#[derive(Debug, Clone, PartialEq)]
pub struct LaneDefinition {
    pub id: String,
    pub polygon: LanePolygon,
}

/// Validated lane set in assignment priority order
#[derive(Debug, Clone, PartialEq)]
pub struct LaneCalibration {
    lanes: Vec<LaneDefinition>,
    frame_size: Option<(u32, u32)>,
}

impl LaneCalibration {
    /// Validate lanes given in priority order
    pub fn new(lanes: Vec<LaneDefinition>, frame_size: Option<(u32, u32)>) -> EngineResult<Self> {
        if lanes.is_empty() {
            return Err(EngineError::NoLanes);
        }
        for lane in &lanes {
            validate_lane(lane, frame_size)?;
        }
        Ok(Self { lanes, frame_size })
    }

    /// Validate a calibration document; lanes are ordered by their numeric key suffix
    pub fn from_document(doc: CalibrationDocument) -> EngineResult<Self> {
        let mut keyed = Vec::with_capacity(doc.lanes.len());
        for (key, vertices) in doc.lanes {
            let rank = lane_rank(&key).ok_or_else(|| EngineError::InvalidLaneKey(key.clone()))?;
            let polygon = LanePolygon::new(
                vertices
                    .iter()
                    .map(|[x, y]| Point::new(*x as f64, *y as f64))
                    .collect(),
            );
            keyed.push((rank, LaneDefinition { id: key, polygon }));
        }
        keyed.sort_by_key(|(rank, _)| *rank);

        let frame_size = match (doc.frame_width, doc.frame_height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        };

        Self::new(keyed.into_iter().map(|(_, lane)| lane).collect(), frame_size)
    }

    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        let doc: CalibrationDocument =
            serde_json::from_value(value).context("Malformed lane calibration document")?;
        Ok(Self::from_document(doc)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let doc: CalibrationDocument =
            serde_json::from_str(json).context("Malformed lane calibration document")?;
        Ok(Self::from_document(doc)?)
    }

    /// Load and validate a calibration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read calibration file {}", path.display()))?;
        Self::from_json_str(&json)
            .with_context(|| format!("Invalid calibration file {}", path.display()))
    }

    pub fn lanes(&self) -> &[LaneDefinition] {
        &self.lanes
    }

    pub fn frame_size(&self) -> Option<(u32, u32)> {
        self.frame_size
    }

    pub fn lane_ids(&self) -> Vec<String> {
        self.lanes.iter().map(|l| l.id.clone()).collect()
    }

    pub fn into_lanes(self) -> Vec<LaneDefinition> {
        self.lanes
    }
}

fn lane_rank(key: &str) -> Option<u32> {
    key.strip_prefix(LANE_KEY_PREFIX)?.parse().ok()
}

fn validate_lane(lane: &LaneDefinition, frame_size: Option<(u32, u32)>) -> EngineResult<()> {
    let vertices = lane.polygon.vertices();
    if vertices.len() != LANE_VERTEX_COUNT {
        return Err(EngineError::InvalidVertexCount {
            lane: lane.id.clone(),
            expected: LANE_VERTEX_COUNT,
            found: vertices.len(),
        });
    }

    if let Some((width, height)) = frame_size {
        let outside = vertices.iter().find(|v| {
            v.x < 0.0 || v.y < 0.0 || v.x > f64::from(width) || v.y > f64::from(height)
        });
        if let Some(v) = outside {
            return Err(EngineError::VertexOutOfBounds {
                lane: lane.id.clone(),
                x: v.x,
                y: v.y,
                width,
                height,
            });
        }
    }

    if lane.polygon.signed_area() == 0.0 {
        return Err(EngineError::DegeneratePolygon {
            lane: lane.id.clone(),
        });
    }

    if !lane.polygon.is_simple() {
        return Err(EngineError::SelfIntersecting {
            lane: lane.id.clone(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_lanes() -> serde_json::Value {
        json!({
            "lane_1": [[80, 320], [340, 320], [300, 180], [120, 180]],
            "lane_2": [[340, 320], [600, 320], [560, 180], [380, 180]],
            "frame_width": 640,
            "frame_height": 360
        })
    }

    #[test]
    fn test_load_valid_document() {
        let cal = LaneCalibration::from_json_value(two_lanes()).unwrap();
        assert_eq!(cal.lane_ids(), vec!["lane_1", "lane_2"]);
        assert_eq!(cal.frame_size(), Some((640, 360)));
        assert_eq!(cal.lanes()[0].polygon.vertices()[0], Point::new(80.0, 320.0));
    }

    #[test]
    fn test_lane_priority_uses_numeric_suffix() {
        let square = |x: i64| json!([[x, 0], [x + 10, 0], [x + 10, 10], [x, 10]]);
        let doc = json!({
            "lane_10": square(40),
            "lane_2": square(20),
            "lane_1": square(0),
        });
        let cal = LaneCalibration::from_json_value(doc).unwrap();
        assert_eq!(cal.lane_ids(), vec!["lane_1", "lane_2", "lane_10"]);
    }

    #[test]
    fn test_wrong_vertex_count_rejected() {
        let doc = json!({ "lane_1": [[0, 0], [10, 0], [5, 10]] });
        let err = LaneCalibration::from_document(serde_json::from_value(doc).unwrap()).unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidVertexCount {
                lane: "lane_1".to_string(),
                expected: 4,
                found: 3
            }
        );
    }

    #[test]
    fn test_self_intersecting_rejected() {
        let doc = json!({ "lane_1": [[0, 0], [10, 10], [10, 0], [0, 20]] });
        let err = LaneCalibration::from_document(serde_json::from_value(doc).unwrap()).unwrap_err();
        assert!(matches!(err, EngineError::SelfIntersecting { .. }));
    }

    #[test]
    fn test_degenerate_rejected() {
        let doc = json!({ "lane_1": [[0, 0], [5, 0], [10, 0], [20, 0]] });
        let err = LaneCalibration::from_document(serde_json::from_value(doc).unwrap()).unwrap_err();
        assert!(matches!(err, EngineError::DegeneratePolygon { .. }));
    }

    #[test]
    fn test_out_of_frame_rejected() {
        let mut doc = two_lanes();
        doc["frame_width"] = json!(500);
        let err = LaneCalibration::from_json_value(doc).unwrap_err();
        let engine_err = err.downcast_ref::<EngineError>().unwrap();
        assert!(matches!(engine_err, EngineError::VertexOutOfBounds { x, .. } if *x == 600.0));
    }

    #[test]
    fn test_bad_keys_and_empty_rejected() {
        let doc = json!({ "lane_one": [[0, 0], [10, 0], [10, 10], [0, 10]] });
        let err = LaneCalibration::from_document(serde_json::from_value(doc).unwrap()).unwrap_err();
        assert_eq!(err, EngineError::InvalidLaneKey("lane_one".to_string()));

        let err = LaneCalibration::from_document(CalibrationDocument::default()).unwrap_err();
        assert_eq!(err, EngineError::NoLanes);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lane_polygons.json");
        std::fs::write(&path, two_lanes().to_string()).unwrap();

        let cal = LaneCalibration::load(&path).unwrap();
        assert_eq!(cal.lanes().len(), 2);

        assert!(LaneCalibration::load(dir.path().join("missing.json")).is_err());
    }
}
