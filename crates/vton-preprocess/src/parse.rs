//! Coarse human-parse map derived from a pose skeleton.
//!
//! Offline datasets ship LIP-style parse maps produced by a dedicated
//! human parser; request-time uploads have none. This transform fills
//! that gap deterministically: a head disc, a torso quad spanned by the
//! shoulders and hips, and limb capsules, each painted with the parse
//! label the downstream dataset expects. The result is coarse: it only
//! has to localize the fill/head/shape regions, not segment precisely.

use image::GrayImage;
use vton_core::{Keypoint, ParseLabel, PoseSkeleton};

use crate::raster::{fill_capsule, fill_disc, point_in_quad};

/// Minimum keypoint confidence for a point to shape the parse.
const MIN_CONFIDENCE: f32 = 0.1;

/// Derive a label map of the given dimensions from a skeleton.
///
/// Points below the confidence floor are ignored; with no usable points
/// the map is entirely background.
pub fn parse_from_pose(skeleton: &PoseSkeleton, width: u32, height: u32) -> GrayImage {
    let mut parse = GrayImage::new(width, height);
    let get = |kp: Keypoint| {
        let p = skeleton.get(kp);
        (p.confidence >= MIN_CONFIDENCE).then_some((p.x, p.y))
    };

    // Body scale: shoulder span, falling back to a fraction of the width.
    let scale = match (get(Keypoint::RightShoulder), get(Keypoint::LeftShoulder)) {
        (Some((rx, ry)), Some((lx, ly))) => ((rx - lx).powi(2) + (ry - ly).powi(2)).sqrt(),
        _ => width as f32 * 0.3,
    };
    let limb_radius = (scale * 0.18).max(2.0);

    // Legs and arms first so the torso and head overwrite any overlap.
    for (a, b, label) in [
        (Keypoint::RightHip, Keypoint::RightKnee, ParseLabel::Pants),
        (Keypoint::RightKnee, Keypoint::RightAnkle, ParseLabel::RightLeg),
        (Keypoint::LeftHip, Keypoint::LeftKnee, ParseLabel::Pants),
        (Keypoint::LeftKnee, Keypoint::LeftAnkle, ParseLabel::LeftLeg),
        (Keypoint::RightShoulder, Keypoint::RightElbow, ParseLabel::RightArm),
        (Keypoint::RightElbow, Keypoint::RightWrist, ParseLabel::RightArm),
        (Keypoint::LeftShoulder, Keypoint::LeftElbow, ParseLabel::LeftArm),
        (Keypoint::LeftElbow, Keypoint::LeftWrist, ParseLabel::LeftArm),
    ] {
        if let (Some((ax, ay)), Some((bx, by))) = (get(a), get(b)) {
            let byte = label.as_u8();
            fill_capsule(width, height, ax, ay, bx, by, limb_radius, |x, y| {
                parse.put_pixel(x, y, image::Luma([byte]))
            });
        }
    }

    // Torso quad: shoulders down to hips, widened a little so sleeves
    // attach to the body.
    if let (Some(rs), Some(ls), Some(lh), Some(rh)) = (
        get(Keypoint::RightShoulder),
        get(Keypoint::LeftShoulder),
        get(Keypoint::LeftHip),
        get(Keypoint::RightHip),
    ) {
        let widen = limb_radius;
        let quad = [
            (rs.0 - widen, rs.1 - widen),
            (ls.0 + widen, ls.1 - widen),
            (lh.0 + widen, lh.1),
            (rh.0 - widen, rh.1),
        ];
        let byte = ParseLabel::UpperClothes.as_u8();
        for y in 0..height {
            for x in 0..width {
                if point_in_quad(x as f32, y as f32, quad) {
                    parse.put_pixel(x, y, image::Luma([byte]));
                }
            }
        }
    }

    // Head: a face disc around the nose (or eye midpoint), with a hair
    // cap on its upper half.
    let face_center = get(Keypoint::Nose).or_else(|| {
        match (get(Keypoint::RightEye), get(Keypoint::LeftEye)) {
            (Some((rx, ry)), Some((lx, ly))) => Some(((rx + lx) / 2.0, (ry + ly) / 2.0)),
            _ => None,
        }
    });
    if let Some((cx, cy)) = face_center {
        let radius = (scale * 0.45).max(3.0);
        let face = ParseLabel::Face.as_u8();
        let hair = ParseLabel::Hair.as_u8();
        fill_disc(width, height, cx, cy, radius, |x, y| {
            let byte = if (y as f32) < cy - radius * 0.3 {
                hair
            } else {
                face
            };
            parse.put_pixel(x, y, image::Luma([byte]));
        });
    }

    parse
}
