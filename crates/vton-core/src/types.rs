//! Fundamental types for the try-on pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for one try-on request; owns the staged inputs, the pair
/// manifest and the result directory of that request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Inference stage selector for the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Geometric matching: predict a TPS warp aligning garment to body pose.
    Gmm,
    /// Try-on composition: render the garment onto the person.
    Tom,
}

impl Stage {
    /// Sub-directory of the result tree this stage writes its primary
    /// output into.
    pub fn output_subdir(&self) -> &'static str {
        match self {
            Stage::Gmm => "warp-cloth",
            Stage::Tom => "try-on",
        }
    }
}

impl std::str::FromStr for Stage {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "GMM" | "gmm" => Ok(Stage::Gmm),
            "TOM" | "tom" => Ok(Stage::Tom),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown stage: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Gmm => write!(f, "GMM"),
            Stage::Tom => write!(f, "TOM"),
        }
    }
}

/// Body keypoints in COCO-18 order (OpenPose convention).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(usize)]
pub enum Keypoint {
    Nose = 0,
    Neck = 1,
    RightShoulder = 2,
    RightElbow = 3,
    RightWrist = 4,
    LeftShoulder = 5,
    LeftElbow = 6,
    LeftWrist = 7,
    RightHip = 8,
    RightKnee = 9,
    RightAnkle = 10,
    LeftHip = 11,
    LeftKnee = 12,
    LeftAnkle = 13,
    RightEye = 14,
    LeftEye = 15,
    RightEar = 16,
    LeftEar = 17,
}

impl Keypoint {
    pub const COUNT: usize = 18;

    /// Limb segments as keypoint index pairs, used for skeleton drawing
    /// and the pose-derived coarse parse.
    pub const LIMBS: [(Keypoint, Keypoint); 13] = [
        (Keypoint::Neck, Keypoint::RightShoulder),
        (Keypoint::Neck, Keypoint::LeftShoulder),
        (Keypoint::RightShoulder, Keypoint::RightElbow),
        (Keypoint::RightElbow, Keypoint::RightWrist),
        (Keypoint::LeftShoulder, Keypoint::LeftElbow),
        (Keypoint::LeftElbow, Keypoint::LeftWrist),
        (Keypoint::Neck, Keypoint::RightHip),
        (Keypoint::Neck, Keypoint::LeftHip),
        (Keypoint::RightHip, Keypoint::RightKnee),
        (Keypoint::RightKnee, Keypoint::RightAnkle),
        (Keypoint::LeftHip, Keypoint::LeftKnee),
        (Keypoint::LeftKnee, Keypoint::LeftAnkle),
        (Keypoint::Nose, Keypoint::Neck),
    ];

    pub fn all() -> impl Iterator<Item = Keypoint> {
        (0..Self::COUNT).map(|i| Self::from_index(i).unwrap())
    }

    pub fn from_index(i: usize) -> Option<Keypoint> {
        use Keypoint::*;
        const ALL: [Keypoint; 18] = [
            Nose,
            Neck,
            RightShoulder,
            RightElbow,
            RightWrist,
            LeftShoulder,
            LeftElbow,
            LeftWrist,
            RightHip,
            RightKnee,
            RightAnkle,
            LeftHip,
            LeftKnee,
            LeftAnkle,
            RightEye,
            LeftEye,
            RightEar,
            LeftEar,
        ];
        ALL.get(i).copied()
    }
}

/// A single detected keypoint in image coordinates (pixels).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PosePoint {
    pub x: f32,
    pub y: f32,
    /// Detection confidence in [0, 1]; 0 means the point was not found.
    pub confidence: f32,
}

impl PosePoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    pub fn is_present(&self) -> bool {
        self.confidence > 0.0
    }
}

/// Full-body skeleton: one point per COCO-18 keypoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseSkeleton {
    pub points: [PosePoint; Keypoint::COUNT],
}

impl PoseSkeleton {
    pub fn new(points: [PosePoint; Keypoint::COUNT]) -> Self {
        Self { points }
    }

    pub fn get(&self, kp: Keypoint) -> PosePoint {
        self.points[kp as usize]
    }

    /// Mean confidence over detected points; 0 when nothing was found.
    pub fn overall_confidence(&self) -> f32 {
        let present: Vec<_> = self.points.iter().filter(|p| p.is_present()).collect();
        if present.is_empty() {
            0.0
        } else {
            present.iter().map(|p| p.confidence).sum::<f32>() / present.len() as f32
        }
    }
}

impl Default for PoseSkeleton {
    fn default() -> Self {
        Self {
            points: [PosePoint::default(); Keypoint::COUNT],
        }
    }
}

/// On-disk form of a skeleton (`pose/<stem>_keypoints.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseRecord {
    /// `[x, y, confidence]` triples in COCO-18 order.
    pub keypoints: Vec<[f32; 3]>,
}

impl From<&PoseSkeleton> for PoseRecord {
    fn from(skeleton: &PoseSkeleton) -> Self {
        Self {
            keypoints: skeleton
                .points
                .iter()
                .map(|p| [p.x, p.y, p.confidence])
                .collect(),
        }
    }
}

impl PoseRecord {
    pub fn into_skeleton(self) -> crate::Result<PoseSkeleton> {
        if self.keypoints.len() != Keypoint::COUNT {
            return Err(crate::Error::Pose(format!(
                "expected {} keypoints, got {}",
                Keypoint::COUNT,
                self.keypoints.len()
            )));
        }
        let mut points = [PosePoint::default(); Keypoint::COUNT];
        for (slot, [x, y, c]) in points.iter_mut().zip(self.keypoints) {
            *slot = PosePoint::new(x, y, c);
        }
        Ok(PoseSkeleton::new(points))
    }
}

/// Human-parse labels (LIP convention). Only the classes the pipeline
/// consumes are named; anything else round-trips as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParseLabel {
    Background,
    Hat,
    Hair,
    Sunglasses,
    UpperClothes,
    Dress,
    Coat,
    Pants,
    Face,
    LeftArm,
    RightArm,
    LeftLeg,
    RightLeg,
    Other(u8),
}

impl ParseLabel {
    /// Labels making up the head region of a parse map.
    pub const HEAD: [ParseLabel; 4] = [
        ParseLabel::Hat,
        ParseLabel::Hair,
        ParseLabel::Sunglasses,
        ParseLabel::Face,
    ];

    /// Labels covered by the garment being replaced.
    pub const CLOTH: [ParseLabel; 3] = [
        ParseLabel::UpperClothes,
        ParseLabel::Dress,
        ParseLabel::Coat,
    ];

    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => ParseLabel::Background,
            1 => ParseLabel::Hat,
            2 => ParseLabel::Hair,
            4 => ParseLabel::Sunglasses,
            5 => ParseLabel::UpperClothes,
            6 => ParseLabel::Dress,
            7 => ParseLabel::Coat,
            9 => ParseLabel::Pants,
            13 => ParseLabel::Face,
            14 => ParseLabel::LeftArm,
            15 => ParseLabel::RightArm,
            16 => ParseLabel::LeftLeg,
            17 => ParseLabel::RightLeg,
            other => ParseLabel::Other(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ParseLabel::Background => 0,
            ParseLabel::Hat => 1,
            ParseLabel::Hair => 2,
            ParseLabel::Sunglasses => 4,
            ParseLabel::UpperClothes => 5,
            ParseLabel::Dress => 6,
            ParseLabel::Coat => 7,
            ParseLabel::Pants => 9,
            ParseLabel::Face => 13,
            ParseLabel::LeftArm => 14,
            ParseLabel::RightArm => 15,
            ParseLabel::LeftLeg => 16,
            ParseLabel::RightLeg => 17,
            ParseLabel::Other(v) => *v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_round_trip() {
        assert_eq!("GMM".parse::<Stage>().unwrap(), Stage::Gmm);
        assert_eq!("TOM".parse::<Stage>().unwrap(), Stage::Tom);
        assert!("XYZ".parse::<Stage>().is_err());
        assert_eq!(Stage::Tom.output_subdir(), "try-on");
    }

    #[test]
    fn keypoint_indices_round_trip() {
        for kp in Keypoint::all() {
            assert_eq!(Keypoint::from_index(kp as usize), Some(kp));
        }
        assert_eq!(Keypoint::from_index(Keypoint::COUNT), None);
    }

    #[test]
    fn pose_record_round_trip() {
        let mut skeleton = PoseSkeleton::default();
        skeleton.points[Keypoint::Nose as usize] = PosePoint::new(96.0, 40.0, 0.9);

        let record = PoseRecord::from(&skeleton);
        let json = serde_json::to_string(&record).unwrap();
        let back: PoseRecord = serde_json::from_str(&json).unwrap();
        let restored = back.into_skeleton().unwrap();

        assert_eq!(restored, skeleton);
    }

    #[test]
    fn pose_record_rejects_wrong_length() {
        let record = PoseRecord {
            keypoints: vec![[0.0; 3]; 5],
        };
        assert!(record.into_skeleton().is_err());
    }

    #[test]
    fn parse_label_round_trip() {
        for v in 0..=255u8 {
            assert_eq!(ParseLabel::from_u8(v).as_u8(), v);
        }
    }
}
