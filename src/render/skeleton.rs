use crate::pose::BodyPart;

/// Bones drawn in the debug view (start, end)
pub const SKELETON_CONNECTIONS: [(BodyPart, BodyPart); 16] = [
    // face
    (BodyPart::LeftEar, BodyPart::LeftEye),
    (BodyPart::LeftEye, BodyPart::Nose),
    (BodyPart::Nose, BodyPart::RightEye),
    (BodyPart::RightEye, BodyPart::RightEar),
    // arms
    (BodyPart::LeftShoulder, BodyPart::RightShoulder),
    (BodyPart::LeftShoulder, BodyPart::LeftElbow),
    (BodyPart::LeftElbow, BodyPart::LeftWrist),
    (BodyPart::RightShoulder, BodyPart::RightElbow),
    (BodyPart::RightElbow, BodyPart::RightWrist),
    // torso
    (BodyPart::LeftShoulder, BodyPart::LeftHip),
    (BodyPart::RightShoulder, BodyPart::RightHip),
    (BodyPart::LeftHip, BodyPart::RightHip),
    // legs
    (BodyPart::LeftHip, BodyPart::LeftKnee),
    (BodyPart::LeftKnee, BodyPart::LeftAnkle),
    (BodyPart::RightHip, BodyPart::RightKnee),
    (BodyPart::RightKnee, BodyPart::RightAnkle),
];

/// Tracked keypoint (RGB)
pub const KEYPOINT_COLOR: u32 = 0x00FF00;

pub const SKELETON_COLOR: u32 = 0xFFFF00;

/// Entry carried over from an earlier frame
pub const STALE_COLOR: u32 = 0xFF0000;

/// Torso anchor box and centre
pub const ANCHOR_COLOR: u32 = 0x00FFFF;
