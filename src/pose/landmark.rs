/// 33-point body landmark index (MediaPipe Pose topology)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum LandmarkIndex {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl LandmarkIndex {
    pub const COUNT: usize = 33;
}

/// Single landmark in image-fraction coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    /// Normalized X (0.0..1.0)
    pub x: f64,
    /// Normalized Y (0.0..1.0, downwards)
    pub y: f64,
    /// Detector confidence (0.0..1.0)
    pub visibility: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, visibility: f64) -> Self {
        Self { x, y, visibility }
    }

    pub fn is_visible(&self, threshold: f64) -> bool {
        self.visibility >= threshold
    }

    pub fn distance(&self, other: &Landmark) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl Default for Landmark {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            visibility: 0.0,
        }
    }
}

/// One detection: a full landmark set
#[derive(Debug, Clone, PartialEq)]
pub struct Landmarks {
    pub points: [Landmark; LandmarkIndex::COUNT],
}

impl Landmarks {
    pub fn new(points: [Landmark; LandmarkIndex::COUNT]) -> Self {
        Self { points }
    }

    /// Build from a possibly short list; missing entries are invisible,
    /// surplus entries are ignored.
    pub fn from_slice(values: &[Landmark]) -> Self {
        let mut points = [Landmark::default(); LandmarkIndex::COUNT];
        for (dst, src) in points.iter_mut().zip(values) {
            *dst = *src;
        }
        Self { points }
    }

    pub fn get(&self, index: LandmarkIndex) -> &Landmark {
        &self.points[index as usize]
    }

    pub fn set(&mut self, index: LandmarkIndex, landmark: Landmark) {
        self.points[index as usize] = landmark;
    }

    pub fn visibility(&self, index: LandmarkIndex) -> f64 {
        self.get(index).visibility
    }

    pub fn midpoint(&self, a: LandmarkIndex, b: LandmarkIndex) -> (f64, f64) {
        let a = self.get(a);
        let b = self.get(b);
        ((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
    }
}

impl Default for Landmarks {
    fn default() -> Self {
        Self {
            points: [Landmark::default(); LandmarkIndex::COUNT],
        }
    }
}
