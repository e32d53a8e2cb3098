use anyhow::{anyhow, Result};

/// Result of running the object detector on a frame (C3, §4.3).
#[derive(Clone, Debug, Default)]
pub struct DetectionResult {
    /// Bounding boxes (normalized 0..1 coordinates), post-NMS.
    pub detections: Vec<Detection>,
    /// Confidence of the strongest detection.
    pub confidence: f32,
}

impl DetectionResult {
    /// The detection with the highest confidence, if any fired.
    pub fn top(&self) -> Option<&Detection> {
        self.detections
            .iter()
            .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap_or(std::cmp::Ordering::Equal))
    }

    pub fn contains_class(&self, class: ObjectClass) -> bool {
        self.detections.iter().any(|d| d.class == class)
    }
}

#[derive(Clone, Debug)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub confidence: f32,
    pub class: ObjectClass,
}

/// Closed set of object classes the proctoring detector distinguishes (§4.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectClass {
    Person,
    Phone,
    Material,
    Headphones,
    Unknown,
}

impl ObjectClass {
    /// Parses the class names used in `object_detector.alert_classes`.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "Person" => Ok(Self::Person),
            "Phone" => Ok(Self::Phone),
            "Material" => Ok(Self::Material),
            "Headphones" => Ok(Self::Headphones),
            "Unknown" => Ok(Self::Unknown),
            other => Err(anyhow!("unknown object class '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_class_parse_round_trips() {
        assert_eq!(ObjectClass::parse("Phone").unwrap(), ObjectClass::Phone);
        assert!(ObjectClass::parse("Dog").is_err());
    }
}
