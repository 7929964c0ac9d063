//! Cloth mask: binary garment silhouette from a catalog photo.
//!
//! Garment photos come on a near-white studio background; anything at or
//! above the background threshold is background (0), everything else is
//! garment (255). An input that is already binary passes through
//! unchanged, so re-thresholding a mask is the identity.

use image::GrayImage;

/// Grayscale values at or above this are treated as studio background.
pub const BACKGROUND_THRESHOLD: u8 = 250;

const FOREGROUND: u8 = 255;
const BACKGROUND: u8 = 0;

/// Binarize a grayscale garment image into a cloth mask.
pub fn cloth_mask(gray: &GrayImage) -> GrayImage {
    if is_binary(gray) {
        return gray.clone();
    }

    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y)[0];
        if v >= BACKGROUND_THRESHOLD {
            image::Luma([BACKGROUND])
        } else {
            image::Luma([FOREGROUND])
        }
    })
}

fn is_binary(gray: &GrayImage) -> bool {
    gray.pixels()
        .all(|p| p[0] == FOREGROUND || p[0] == BACKGROUND)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn separates_garment_from_background() {
        let gray = GrayImage::from_fn(6, 1, |x, _| match x {
            0 => Luma([0]),
            1 => Luma([120]),
            2 => Luma([249]),
            _ => Luma([252]),
        });
        let mask = cloth_mask(&gray);
        assert_eq!(mask.get_pixel(0, 0)[0], 255);
        assert_eq!(mask.get_pixel(1, 0)[0], 255);
        assert_eq!(mask.get_pixel(2, 0)[0], 255);
        assert_eq!(mask.get_pixel(3, 0)[0], 0);
    }

    #[test]
    fn output_is_binary() {
        let gray = GrayImage::from_fn(16, 16, |x, y| Luma([(x * 16 + y) as u8]));
        let mask = cloth_mask(&gray);
        assert!(mask.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn rethresholding_a_mask_is_identity() {
        let gray = GrayImage::from_fn(16, 16, |x, _| Luma([(x * 17) as u8]));
        let mask = cloth_mask(&gray);
        assert_eq!(cloth_mask(&mask), mask);
    }
}
