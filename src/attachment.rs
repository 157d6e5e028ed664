use std::io::Cursor;

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{DynamicImage, ImageReader, codecs::jpeg::JpegEncoder};
use serde::Deserialize;
use tracing::debug;

/// Re-encode quality for images forwarded to the provider.
pub const JPEG_QUALITY: u8 = 85;

const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// How attachments are prepared for the deployed generation strategy.
/// The two modes are never active together.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentMode {
    /// Decode bytes as an image; undecodable attachments are dropped.
    #[default]
    Image,
    /// Base64-encode bytes unconditionally; nothing is validated.
    Blob,
}

/// Attachment bytes as downloaded, before normalization.
#[derive(Debug, Clone)]
pub struct RawAttachment {
    pub bytes: Vec<u8>,
    pub declared_type: Option<String>,
}

#[derive(Debug, Clone)]
pub enum NormalizedAttachment {
    Image(DynamicImage),
    Blob { media_type: String, data: String },
}

/// Normalizes each attachment independently. A failure on one attachment
/// never discards its siblings.
pub fn normalize(mode: AttachmentMode, attachments: Vec<RawAttachment>) -> Vec<NormalizedAttachment> {
    attachments
        .into_iter()
        .filter_map(|attachment| match mode {
            AttachmentMode::Image => match decode_image(&attachment.bytes) {
                Ok(image) => Some(NormalizedAttachment::Image(image)),
                Err(err) => {
                    debug!("dropping undecodable attachment: {err:#}");
                    None
                }
            },
            AttachmentMode::Blob => Some(NormalizedAttachment::Blob {
                media_type: attachment
                    .declared_type
                    .unwrap_or_else(|| FALLBACK_MEDIA_TYPE.into()),
                data: STANDARD.encode(&attachment.bytes),
            }),
        })
        .collect()
}

fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("failed to guess image format")?
        .decode()
        .context("failed to decode image")
}

/// Re-encodes a decoded image as RGB JPEG at [`JPEG_QUALITY`].
pub fn to_jpeg(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
    image
        .to_rgb8()
        .write_with_encoder(encoder)
        .context("failed to encode image as JPEG")?;
    Ok(buffer)
}

/// JPEG data URL embeddable directly in a completion request payload.
pub fn to_data_url(image: &DynamicImage) -> Result<String> {
    Ok(format!(
        "data:image/jpeg;base64,{}",
        STANDARD.encode(to_jpeg(image)?)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageFormat, Rgb, RgbImage};

    fn png_attachment() -> RawAttachment {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([10, 200, 120])));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        RawAttachment {
            bytes,
            declared_type: Some("image/png".into()),
        }
    }

    fn corrupt_attachment() -> RawAttachment {
        RawAttachment {
            bytes: b"definitely not an image".to_vec(),
            declared_type: None,
        }
    }

    #[test]
    fn image_mode_drops_only_the_corrupt_attachment() {
        let normalized = normalize(
            AttachmentMode::Image,
            vec![png_attachment(), corrupt_attachment()],
        );
        assert_eq!(normalized.len(), 1);
        assert!(matches!(normalized[0], NormalizedAttachment::Image(_)));
    }

    #[test]
    fn image_mode_survives_corrupt_first_attachment() {
        let normalized = normalize(
            AttachmentMode::Image,
            vec![corrupt_attachment(), png_attachment()],
        );
        assert_eq!(normalized.len(), 1);
    }

    #[test]
    fn blob_mode_includes_everything() {
        let normalized = normalize(
            AttachmentMode::Blob,
            vec![png_attachment(), corrupt_attachment()],
        );
        assert_eq!(normalized.len(), 2);
        match &normalized[1] {
            NormalizedAttachment::Blob { media_type, data } => {
                assert_eq!(media_type, FALLBACK_MEDIA_TYPE);
                assert_eq!(
                    STANDARD.decode(data).unwrap(),
                    b"definitely not an image".to_vec()
                );
            }
            other => panic!("expected blob, got {other:?}"),
        }
    }

    #[test]
    fn blob_mode_carries_declared_media_type() {
        let normalized = normalize(AttachmentMode::Blob, vec![png_attachment()]);
        match &normalized[0] {
            NormalizedAttachment::Blob { media_type, .. } => assert_eq!(media_type, "image/png"),
            other => panic!("expected blob, got {other:?}"),
        }
    }

    #[test]
    fn data_url_round_trips_through_jpeg() {
        let original = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([180, 40, 90])));
        let data_url = to_data_url(&original).unwrap();
        let encoded = data_url.strip_prefix("data:image/jpeg;base64,").unwrap();

        let decoded = image::load_from_memory(&STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!(decoded.dimensions(), original.dimensions());

        // JPEG is lossy: compare structure, not bytes
        let (original, decoded) = (original.to_rgb8(), decoded.to_rgb8());
        for (a, b) in original.pixels().zip(decoded.pixels()) {
            for channel in 0..3 {
                let delta = (i16::from(a.0[channel]) - i16::from(b.0[channel])).abs();
                assert!(delta <= 8, "channel drifted by {delta}");
            }
        }
    }
}
