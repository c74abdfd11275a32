use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::error::ServiceError;

/// Smallest payload that can plausibly be a camera capture.
pub const MIN_IMAGE_BYTES: usize = 100;

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47];

/// A capture that passed the sanity check. Keeps the original data URL for storage
/// alongside the decoded bytes used for matching.
#[derive(Debug, Clone)]
pub struct FaceImage {
    pub data_url: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl FaceImage {
    /// Parses `data:image/<jpeg|jpg|png>;base64,<payload>` and checks that the payload
    /// really is an image of that kind within the size bounds.
    pub fn from_data_url(data_url: &str, max_bytes: usize) -> Result<Self, ServiceError> {
        let data_url = data_url.trim();
        let (header, payload) = data_url
            .split_once(',')
            .ok_or(ServiceError::NoFaceOrInvalidImage)?;

        let mime = header
            .strip_prefix("data:")
            .and_then(|h| h.strip_suffix(";base64"))
            .map(str::to_ascii_lowercase)
            .ok_or(ServiceError::NoFaceOrInvalidImage)?;

        let expected_magic = match mime.as_str() {
            "image/jpeg" | "image/jpg" => JPEG_MAGIC,
            "image/png" => PNG_MAGIC,
            other => {
                tracing::debug!(mime = %other, "Rejected capture with unsupported type");
                return Err(ServiceError::NoFaceOrInvalidImage);
            }
        };

        // rough pre-check so an oversized payload is never decoded
        if payload.len() / 4 * 3 > max_bytes + 3 {
            return Err(ServiceError::NoFaceOrInvalidImage);
        }

        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD
            .decode(compact.as_bytes())
            .map_err(|_| ServiceError::NoFaceOrInvalidImage)?;

        if bytes.len() < MIN_IMAGE_BYTES || bytes.len() > max_bytes {
            return Err(ServiceError::NoFaceOrInvalidImage);
        }
        if !bytes.starts_with(expected_magic) {
            return Err(ServiceError::NoFaceOrInvalidImage);
        }

        Ok(Self {
            data_url: data_url.to_string(),
            mime,
            bytes,
        })
    }
}

/// A small but well-formed PNG capture whose content varies with `seed`.
#[cfg(test)]
pub fn png_data_url(seed: u8) -> String {
    let mut bytes = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend((0..200u16).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)));
    format!("data:image/png;base64,{}", STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 5 * 1024 * 1024;

    #[test]
    fn accepts_png_capture() {
        let image = FaceImage::from_data_url(&png_data_url(1), MAX).unwrap();
        assert_eq!(image.mime, "image/png");
        assert_eq!(image.bytes.len(), 208);
    }

    #[test]
    fn accepts_jpeg_capture() {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
        bytes.resize(150, 0x11);
        let url = format!("data:image/jpg;base64,{}", STANDARD.encode(&bytes));
        assert!(FaceImage::from_data_url(&url, MAX).is_ok());
    }

    #[test]
    fn rejects_non_images() {
        let gif = format!("data:image/gif;base64,{}", STANDARD.encode([0u8; 200]));
        let no_header = STANDARD.encode([0u8; 200]);
        let bad_base64 = "data:image/png;base64,@@@not-base64@@@".to_string();

        for input in [gif, no_header, bad_base64, String::new()] {
            assert!(matches!(
                FaceImage::from_data_url(&input, MAX),
                Err(ServiceError::NoFaceOrInvalidImage)
            ));
        }
    }

    #[test]
    fn rejects_wrong_magic_and_size() {
        // claims png, carries jpeg bytes
        let mut jpeg = vec![0xFF, 0xD8, 0xFF];
        jpeg.resize(200, 0);
        let mislabeled = format!("data:image/png;base64,{}", STANDARD.encode(&jpeg));
        assert!(FaceImage::from_data_url(&mislabeled, MAX).is_err());

        let tiny = format!("data:image/png;base64,{}", STANDARD.encode(PNG_MAGIC));
        assert!(FaceImage::from_data_url(&tiny, MAX).is_err());

        assert!(FaceImage::from_data_url(&png_data_url(1), 150).is_err());
    }
}
