//! Per-class counts and the traffic sign advisory derived from them.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::detect::DetectionResult;

/// Detections per class name, in first-seen order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassCounts {
    entries: Vec<(String, usize)>,
}

impl ClassCounts {
    pub fn from_results(results: &[DetectionResult]) -> Self {
        let mut counts = Self::default();
        for result in results {
            counts.add(&result.class_name);
        }
        counts
    }

    fn add(&mut self, class_name: &str) {
        match self.entries.iter_mut().find(|(name, _)| name == class_name) {
            Some((_, count)) => *count += 1,
            None => self.entries.push((class_name.to_string(), 1)),
        }
    }

    pub fn get(&self, class_name: &str) -> usize {
        self.entries
            .iter()
            .find(|(name, _)| name == class_name)
            .map_or(0, |(_, count)| *count)
    }

    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, count)| count).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(name, count)| (name.as_str(), *count))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compact JSON object, e.g. `{"person":2,"car":1}`.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Serialize for ClassCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, count) in &self.entries {
            map.serialize_entry(name, count)?;
        }
        map.end()
    }
}

/// State shown on the roadside sign.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignState {
    Ok,
    Busy,
    Pedestrians,
    TrafficLights,
}

impl SignState {
    pub fn message(self) -> &'static str {
        match self {
            SignState::Ok => "OK",
            SignState::Busy => "Heavy traffic - reduce speed",
            SignState::Pedestrians => "Caution: many pedestrians",
            SignState::TrafficLights => "Traffic light ahead",
        }
    }
}

/// Class names and counts that drive the advisory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisoryRules {
    pub traffic_light_class: String,
    pub vehicle_class: String,
    pub busy_vehicle_count: usize,
    pub pedestrian_class: String,
    pub pedestrian_count: usize,
}

impl Default for AdvisoryRules {
    fn default() -> Self {
        Self {
            traffic_light_class: "traffic light".to_string(),
            vehicle_class: "car".to_string(),
            busy_vehicle_count: 5,
            pedestrian_class: "person".to_string(),
            pedestrian_count: 3,
        }
    }
}

/// Maps class counts to a sign state.
///
/// Precedence: traffic lights, then busy traffic, then pedestrians.
#[derive(Clone, Debug, Default)]
pub struct SignAdvisor {
    rules: AdvisoryRules,
}

impl SignAdvisor {
    pub fn new(rules: AdvisoryRules) -> Self {
        Self { rules }
    }

    pub fn advise(&self, counts: &ClassCounts) -> SignState {
        let rules = &self.rules;
        if counts.get(&rules.traffic_light_class) > 0 {
            SignState::TrafficLights
        } else if counts.get(&rules.vehicle_class) >= rules.busy_vehicle_count {
            SignState::Busy
        } else if counts.get(&rules.pedestrian_class) >= rules.pedestrian_count {
            SignState::Pedestrians
        } else {
            SignState::Ok
        }
    }
}
