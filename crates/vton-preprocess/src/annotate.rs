//! Pose annotation: skeleton overlay on a person photo.

use image::{Rgb, RgbImage};
use vton_core::{Keypoint, PoseSkeleton};

use crate::raster::{fill_capsule, fill_disc};

const LIMB_COLOR: [u8; 3] = [0, 200, 80];
const JOINT_COLOR: [u8; 3] = [230, 40, 40];
const LIMB_WIDTH: f32 = 1.5;
const JOINT_RADIUS: f32 = 3.0;

/// Minimum keypoint confidence for a point to be drawn.
const MIN_CONFIDENCE: f32 = 0.1;

/// Draw the skeleton's limbs and joints onto a copy of the person image.
pub fn annotate_pose(person: &RgbImage, skeleton: &PoseSkeleton) -> RgbImage {
    let mut out = person.clone();
    let (width, height) = out.dimensions();
    let get = |kp: Keypoint| {
        let p = skeleton.get(kp);
        (p.confidence >= MIN_CONFIDENCE).then_some((p.x, p.y))
    };

    for (a, b) in Keypoint::LIMBS {
        if let (Some((ax, ay)), Some((bx, by))) = (get(a), get(b)) {
            fill_capsule(width, height, ax, ay, bx, by, LIMB_WIDTH, |x, y| {
                out.put_pixel(x, y, Rgb(LIMB_COLOR))
            });
        }
    }

    for kp in Keypoint::all() {
        if let Some((cx, cy)) = get(kp) {
            fill_disc(width, height, cx, cy, JOINT_RADIUS, |x, y| {
                out.put_pixel(x, y, Rgb(JOINT_COLOR))
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use vton_core::PosePoint;

    #[test]
    fn empty_skeleton_leaves_image_untouched() {
        let person = RgbImage::from_pixel(32, 32, Rgb([9, 9, 9]));
        let out = annotate_pose(&person, &PoseSkeleton::default());
        assert_eq!(out, person);
    }

    #[test]
    fn joints_are_painted() {
        let person = RgbImage::from_pixel(64, 64, Rgb([0, 0, 0]));
        let mut skeleton = PoseSkeleton::default();
        skeleton.points[Keypoint::Nose as usize] = PosePoint::new(32.0, 32.0, 0.9);

        let out = annotate_pose(&person, &skeleton);
        assert_eq!(out.get_pixel(32, 32).0, JOINT_COLOR);
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn limbs_connect_joint_pairs() {
        let person = RgbImage::from_pixel(64, 64, Rgb([0, 0, 0]));
        let mut skeleton = PoseSkeleton::default();
        skeleton.points[Keypoint::Neck as usize] = PosePoint::new(10.0, 32.0, 0.9);
        skeleton.points[Keypoint::RightShoulder as usize] = PosePoint::new(50.0, 32.0, 0.9);

        let out = annotate_pose(&person, &skeleton);
        // Midpoint of the limb segment is painted, away from both joints.
        assert_eq!(out.get_pixel(30, 32).0, LIMB_COLOR);
    }
}
