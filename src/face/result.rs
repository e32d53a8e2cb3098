/// Per-frame face-analyzer output (§4.2). `None` from the backend means "no
/// face found"; `Some` always carries at least a face count.
#[derive(Clone, Debug)]
pub struct FaceSignal {
    pub face_count: u32,
    pub gaze_direction: GazeDirection,
    pub mouth_open: bool,
    pub bounding_box: Option<(f32, f32, f32, f32)>,
}

impl FaceSignal {
    pub fn none_detected() -> Self {
        Self {
            face_count: 0,
            gaze_direction: GazeDirection::Unknown,
            mouth_open: false,
            bounding_box: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GazeDirection {
    Center,
    Away,
    Unknown,
}
