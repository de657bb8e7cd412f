//! Image XObject encoding
//!
//! Uploaded images arrive in whatever format the client had (JPEG, PNG, ...).
//! They are decoded with the `image` crate and re-encoded as Flate-compressed
//! 8-bit samples, with a soft mask when the source carries transparency.

use std::io::Write;

use flate2::{write::ZlibEncoder, Compression};
use image::{ColorType, DynamicImage, GenericImageView};
use lopdf::{dictionary, Document, ObjectId, Stream};

use crate::error::OverlayError;

/// A decoded upload ready to be added to a document
#[derive(Debug, Clone)]
pub struct ImageXObject {
    pub width: u32,
    pub height: u32,
    image: Stream,
    mask: Option<Stream>,
}

impl ImageXObject {
    /// Decode `bytes` uploaded for `slot`
    pub fn decode(slot: &str, bytes: &[u8]) -> Result<Self, OverlayError> {
        let decoded = image::load_from_memory(bytes).map_err(|e| OverlayError::ImageError {
            slot: slot.to_string(),
            message: e.to_string(),
        })?;
        Self::from_image(slot, &decoded)
    }

    pub fn from_image(slot: &str, decoded: &DynamicImage) -> Result<Self, OverlayError> {
        let (width, height) = decoded.dimensions();
        if width == 0 || height == 0 {
            return Err(OverlayError::ImageError {
                slot: slot.to_string(),
                message: format!("image has no pixels ({}x{})", width, height),
            });
        }

        let (samples, color_space) = if is_grayscale(decoded.color()) {
            (decoded.to_luma8().into_raw(), "DeviceGray")
        } else {
            (decoded.to_rgb8().into_raw(), "DeviceRGB")
        };

        let image = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => color_space,
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            deflate(&samples)?,
        );

        let mask = match alpha_channel(decoded) {
            Some(alpha) => Some(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width as i64,
                    "Height" => height as i64,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                    "Filter" => "FlateDecode",
                },
                deflate(&alpha)?,
            )),
            None => None,
        };

        Ok(Self {
            width,
            height,
            image,
            mask,
        })
    }

    pub fn has_mask(&self) -> bool {
        self.mask.is_some()
    }

    /// Add the image (and its mask) to `doc`, returning the image's id
    pub fn embed(self, doc: &mut Document) -> ObjectId {
        let mut image = self.image;
        if let Some(mask) = self.mask {
            let mask_id = doc.add_object(mask);
            image.dict.set("SMask", mask_id);
        }
        doc.add_object(image)
    }
}

fn is_grayscale(color: ColorType) -> bool {
    matches!(
        color,
        ColorType::L8 | ColorType::La8 | ColorType::L16 | ColorType::La16
    )
}

/// Alpha samples, or `None` when the image is fully opaque
fn alpha_channel(decoded: &DynamicImage) -> Option<Vec<u8>> {
    if !decoded.color().has_alpha() {
        return None;
    }
    let alpha: Vec<u8> = decoded.to_rgba8().pixels().map(|p| p.0[3]).collect();
    if alpha.iter().all(|&a| a == u8::MAX) {
        None
    } else {
        Some(alpha)
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, OverlayError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
