//! Garment-agnostic person image.
//!
//! Pixels whose parse label falls in the target label set are replaced by
//! a flat fill color; every other pixel is byte-identical to the input.

use image::{GrayImage, Rgb, RgbImage};
use vton_core::{Error, ParseLabel, Result};

/// Neutral fill used when the caller has no preference.
pub const DEFAULT_FILL: [u8; 3] = [128, 128, 128];

/// Build the agnostic image from a person photo and its parse map.
///
/// `parse` holds one label byte per pixel and must match the person
/// image's dimensions exactly.
pub fn agnostic_image(
    person: &RgbImage,
    parse: &GrayImage,
    labels: &[ParseLabel],
    fill: [u8; 3],
) -> Result<RgbImage> {
    if person.dimensions() != parse.dimensions() {
        return Err(Error::InvalidInput(format!(
            "person {:?} and parse {:?} dimensions differ",
            person.dimensions(),
            parse.dimensions()
        )));
    }

    let mut out = person.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let label = ParseLabel::from_u8(parse.get_pixel(x, y)[0]);
        if labels.contains(&label) {
            *pixel = Rgb(fill);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person_and_parse() -> (RgbImage, GrayImage) {
        let person = RgbImage::from_fn(8, 8, |x, y| Rgb([x as u8 * 10, y as u8 * 10, 7]));
        // Left half garment, right half background.
        let parse = GrayImage::from_fn(8, 8, |x, _| {
            if x < 4 {
                image::Luma([ParseLabel::UpperClothes.as_u8()])
            } else {
                image::Luma([0])
            }
        });
        (person, parse)
    }

    #[test]
    fn fills_target_labels_only() {
        let (person, parse) = person_and_parse();
        let out = agnostic_image(&person, &parse, &ParseLabel::CLOTH, DEFAULT_FILL).unwrap();

        for (x, y, pixel) in out.enumerate_pixels() {
            if x < 4 {
                assert_eq!(pixel.0, DEFAULT_FILL, "garment pixel at ({x},{y})");
            } else {
                assert_eq!(pixel, person.get_pixel(x, y), "pixel at ({x},{y}) changed");
            }
        }
    }

    #[test]
    fn empty_label_set_is_identity() {
        let (person, parse) = person_and_parse();
        let out = agnostic_image(&person, &parse, &[], DEFAULT_FILL).unwrap();
        assert_eq!(out, person);
    }

    #[test]
    fn rejects_dimension_mismatch() {
        let person = RgbImage::new(8, 8);
        let parse = GrayImage::new(4, 8);
        assert!(agnostic_image(&person, &parse, &ParseLabel::CLOTH, DEFAULT_FILL).is_err());
    }
}
