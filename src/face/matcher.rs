use std::sync::Arc;

use ::image::imageops::FilterType;
use sha2::{Digest, Sha256};
use strum_macros::{Display, EnumString};

use super::image::FaceImage;
use crate::error::ServiceError;

/// Which comparison backs face verification; chosen with `FACE_MATCH_POLICY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum FacePolicy {
    /// Share of equal bytes between digests
    Bytes,
    /// Share of equal bits between digests
    Bits,
    /// Hamming similarity of 8x8 grayscale average hashes
    #[strum(serialize = "ahash")]
    AverageHash,
}

impl FacePolicy {
    /// Threshold used when `FACE_MATCH_THRESHOLD` is not set.
    pub fn default_threshold(self) -> f64 {
        match self {
            FacePolicy::Bytes | FacePolicy::Bits => 0.95,
            // at most 12 of 64 bits may differ
            FacePolicy::AverageHash => 0.8,
        }
    }
}

/// Face comparison seam. Callers only ever store `reference` output and ask
/// `accept(score(..))`; the policy decides everything else.
pub trait FaceMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Opaque reference persisted at enrollment.
    fn reference(&self, image: &FaceImage) -> Result<Vec<u8>, ServiceError>;

    /// Similarity in `[0, 1]` of a candidate capture to a stored reference.
    fn score(&self, reference: &[u8], candidate: &FaceImage) -> Result<f64, ServiceError>;

    fn threshold(&self) -> f64;

    fn accept(&self, score: f64) -> bool {
        score >= self.threshold()
    }
}

fn digest(image: &FaceImage) -> Vec<u8> {
    Sha256::digest(&image.bytes).to_vec()
}

fn clamp_threshold(threshold: f64) -> f64 {
    if threshold.is_nan() { 1.0 } else { threshold.clamp(0.0, 1.0) }
}

/// 1 - normalized Hamming distance; bytes present on only one side count as fully different.
fn bit_similarity(reference: &[u8], candidate: &[u8]) -> f64 {
    let bits = reference.len().max(candidate.len()) * 8;
    if bits == 0 {
        return 0.0;
    }

    let length_gap = reference.len().abs_diff(candidate.len()) * 8;
    let distance: usize = reference
        .iter()
        .zip(candidate)
        .map(|(a, b)| (a ^ b).count_ones() as usize)
        .sum::<usize>()
        + length_gap;

    1.0 - distance as f64 / bits as f64
}

#[derive(Debug, Clone)]
pub struct ByteMatchPolicy {
    threshold: f64,
}

impl ByteMatchPolicy {
    pub fn new(threshold: f64) -> Self {
        Self { threshold: clamp_threshold(threshold) }
    }
}

impl FaceMatcher for ByteMatchPolicy {
    fn name(&self) -> &'static str {
        "bytes"
    }

    fn reference(&self, image: &FaceImage) -> Result<Vec<u8>, ServiceError> {
        Ok(digest(image))
    }

    fn score(&self, reference: &[u8], candidate: &FaceImage) -> Result<f64, ServiceError> {
        let candidate = digest(candidate);
        let total = reference.len().max(candidate.len());
        if total == 0 {
            return Ok(0.0);
        }

        let equal = reference
            .iter()
            .zip(&candidate)
            .filter(|(a, b)| a == b)
            .count();
        Ok(equal as f64 / total as f64)
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}

#[derive(Debug, Clone)]
pub struct BitMatchPolicy {
    threshold: f64,
}

impl BitMatchPolicy {
    pub fn new(threshold: f64) -> Self {
        Self { threshold: clamp_threshold(threshold) }
    }
}

impl FaceMatcher for BitMatchPolicy {
    fn name(&self) -> &'static str {
        "bits"
    }

    fn reference(&self, image: &FaceImage) -> Result<Vec<u8>, ServiceError> {
        Ok(digest(image))
    }

    fn score(&self, reference: &[u8], candidate: &FaceImage) -> Result<f64, ServiceError> {
        Ok(bit_similarity(reference, &digest(candidate)))
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}

/// Perceptual average hash: the capture is decoded, shrunk to 8x8 grayscale and
/// each pixel brighter than the mean sets one bit. Small changes in lighting or
/// compression flip few bits, so near-identical captures still match.
#[derive(Debug, Clone)]
pub struct AverageHashPolicy {
    threshold: f64,
}

impl AverageHashPolicy {
    pub const HASH_SIDE: u32 = 8;

    pub fn new(threshold: f64) -> Self {
        Self { threshold: clamp_threshold(threshold) }
    }

    fn hash(image: &FaceImage) -> Result<Vec<u8>, ServiceError> {
        let decoded = ::image::load_from_memory(&image.bytes).map_err(|e| {
            tracing::debug!(error = %e, mime = %image.mime, "Capture could not be decoded");
            ServiceError::NoFaceOrInvalidImage
        })?;

        let pixels = decoded
            .resize_exact(Self::HASH_SIDE, Self::HASH_SIDE, FilterType::Triangle)
            .to_luma8()
            .into_raw();
        let mean = pixels.iter().map(|p| u32::from(*p)).sum::<u32>() / pixels.len().max(1) as u32;

        let mut hash = vec![0u8; pixels.len().div_ceil(8)];
        for (i, p) in pixels.iter().enumerate() {
            if u32::from(*p) > mean {
                hash[i / 8] |= 0x80 >> (i % 8);
            }
        }
        Ok(hash)
    }
}

impl FaceMatcher for AverageHashPolicy {
    fn name(&self) -> &'static str {
        "ahash"
    }

    fn reference(&self, image: &FaceImage) -> Result<Vec<u8>, ServiceError> {
        Self::hash(image)
    }

    fn score(&self, reference: &[u8], candidate: &FaceImage) -> Result<f64, ServiceError> {
        Ok(bit_similarity(reference, &Self::hash(candidate)?))
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}

pub fn from_config(policy: FacePolicy, threshold: f64) -> Arc<dyn FaceMatcher> {
    match policy {
        FacePolicy::Bytes => Arc::new(ByteMatchPolicy::new(threshold)),
        FacePolicy::Bits => Arc::new(BitMatchPolicy::new(threshold)),
        FacePolicy::AverageHash => Arc::new(AverageHashPolicy::new(threshold)),
    }
}
