//! Steganography Detection Module
//!
//! Least-significant-bit plane analysis for raster uploads:
//! - Decode the image to RGBA through a [`PixelDecoder`]
//! - Rebuild a byte stream from the low bit of each channel byte
//! - Flag near-random streams and streams carrying file signatures
//!
//! The decoder is an injected capability. A scanner built without one
//! skips this analysis entirely.

use crate::config::ScanLimits;
use crate::entropy::shannon_entropy;
use crate::errors::{GuardError, GuardResult};
use crate::models::LsbReport;
use crate::signatures::{FileKind, SignatureScan, LSB_KINDS};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Decoded pixels, channel-interleaved.
#[derive(Debug, Clone)]
pub struct RgbaPixels {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub data: Vec<u8>,
}

impl RgbaPixels {
    pub fn pixel_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.data.len() / self.channels
        }
    }
}

/// Turns encoded image bytes into raw per-channel pixel bytes.
///
/// Implementations must force an alpha channel and return at most
/// `max_pixels` pixels in row-major order. Inputs they cannot handle should
/// fail with [`GuardError::Decode`].
pub trait PixelDecoder: Send + Sync {
    fn decode_rgba(&self, encoded: &[u8], max_pixels: usize) -> GuardResult<RgbaPixels>;
}

/// Decoder backed by the `image` crate (JPEG, PNG, GIF, BMP, WEBP).
///
/// Images whose decoded size exceeds `max_alloc` are refused before any
/// pixel buffer is allocated.
#[cfg(feature = "pixel-decoder")]
#[derive(Debug, Clone, Copy)]
pub struct ImageCrateDecoder {
    max_alloc: u64,
}

#[cfg(feature = "pixel-decoder")]
impl Default for ImageCrateDecoder {
    fn default() -> Self {
        Self::new(ScanLimits::default().lsb_decode_max_bytes as u64)
    }
}

#[cfg(feature = "pixel-decoder")]
impl ImageCrateDecoder {
    pub fn new(max_alloc: u64) -> Self {
        Self { max_alloc }
    }
}

#[cfg(feature = "pixel-decoder")]
impl PixelDecoder for ImageCrateDecoder {
    fn decode_rgba(&self, encoded: &[u8], max_pixels: usize) -> GuardResult<RgbaPixels> {
        use image::GenericImageView;

        let mut reader = image::ImageReader::new(std::io::Cursor::new(encoded))
            .with_guessed_format()
            .map_err(|e| GuardError::Decode(e.to_string()))?;
        let mut limits = image::Limits::default();
        limits.max_alloc = Some(self.max_alloc);
        reader.limits(limits);

        let img = reader.decode().map_err(|e| GuardError::Decode(e.to_string()))?;
        let (width, height) = img.dimensions();
        // Only the prefix the LSB pass reads is converted to RGBA.
        let data: Vec<u8> = img
            .pixels()
            .take(max_pixels)
            .flat_map(|(_, _, pixel)| pixel.0)
            .collect();
        Ok(RgbaPixels {
            width,
            height,
            channels: 4,
            data,
        })
    }
}

/// Pack the low bit of each byte into bytes, most significant bit first.
///
/// A trailing group of fewer than eight bits is dropped.
pub fn extract_lsb_stream(channel_bytes: &[u8]) -> Vec<u8> {
    channel_bytes
        .chunks_exact(8)
        .map(|group| group.iter().fold(0u8, |acc, &b| (acc << 1) | (b & 1)))
        .collect()
}

/// Analyse the LSB plane of already-decoded pixels.
pub fn analyze_lsb(pixels: &RgbaPixels, limits: &ScanLimits) -> LsbReport {
    let used = pixels.pixel_count().min(limits.lsb_max_pixels) * pixels.channels;
    let stream = extract_lsb_stream(&pixels.data[..used.min(pixels.data.len())]);

    let entropy_bits = shannon_entropy(&stream);
    let signatures_found: Vec<_> =
        SignatureScan::prefix(&stream, &LSB_KINDS, limits.lsb_signature_scan_bytes).collect();
    let high_entropy = entropy_bits > limits.lsb_entropy_threshold;

    let reason = if !signatures_found.is_empty() {
        let labels: Vec<&str> = signatures_found.iter().map(|h| h.format.label()).collect();
        Some(format!("signatures: {}", labels.join(",")))
    } else if high_entropy {
        Some("high LSB entropy".to_string())
    } else {
        None
    };

    log::trace!(
        "LSB stream of {} bytes: entropy {:.3}, {} signature(s)",
        stream.len(),
        entropy_bits,
        signatures_found.len()
    );

    LsbReport {
        suspicious: high_entropy || !signatures_found.is_empty(),
        entropy_bits,
        signatures_found,
        reason,
    }
}

/// Steganography detector
#[derive(Clone)]
pub struct StegoDetector {
    decoder: Arc<dyn PixelDecoder>,
}

impl std::fmt::Debug for StegoDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StegoDetector").finish_non_exhaustive()
    }
}

impl StegoDetector {
    pub fn new(decoder: Arc<dyn PixelDecoder>) -> Self {
        Self { decoder }
    }

    /// Detector using the bundled `image` decoder with a decode budget of
    /// `max_alloc` bytes.
    #[cfg(feature = "pixel-decoder")]
    pub fn with_image_crate(max_alloc: u64) -> Self {
        Self::new(Arc::new(ImageCrateDecoder::new(max_alloc)))
    }

    /// Decode `encoded` and analyse its LSB plane.
    ///
    /// A panic inside the decoder is reported as an error, not propagated.
    pub fn analyze(&self, encoded: &[u8], kind: FileKind, limits: &ScanLimits) -> GuardResult<LsbReport> {
        let decoded = panic::catch_unwind(AssertUnwindSafe(|| {
            self.decoder.decode_rgba(encoded, limits.lsb_max_pixels)
        }));
        let pixels = match decoded {
            Ok(result) => result?,
            Err(_) => {
                log::error!("Pixel decoder panicked on {} input", kind);
                return Err(GuardError::external("pixel decoder", "panicked while decoding"));
            }
        };
        log::debug!(
            "Decoded {} image {}x{} for LSB analysis",
            kind,
            pixels.width,
            pixels.height
        );
        Ok(analyze_lsb(&pixels, limits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixels_from_stream(stream: &[u8]) -> RgbaPixels {
        // Spread each bit over one channel byte, high bits set to look like image data.
        let data: Vec<u8> = stream
            .iter()
            .flat_map(|&byte| (0..8).rev().map(move |bit| 0xA0 | ((byte >> bit) & 1)))
            .collect();
        RgbaPixels {
            width: (data.len() / 4) as u32,
            height: 1,
            channels: 4,
            data,
        }
    }

    #[test]
    fn test_extract_msb_first() {
        let bytes = [1, 0, 0, 0, 0, 0, 0, 1, 255];
        assert_eq!(extract_lsb_stream(&bytes), vec![0b1000_0001]);
    }

    #[test]
    fn test_signature_in_lsb_plane() {
        let mut stream = vec![0u8; 32];
        stream.extend_from_slice(b"PK\x03\x04");
        stream.extend_from_slice(&[0u8; 28]);
        let report = analyze_lsb(&pixels_from_stream(&stream), &ScanLimits::default());
        assert!(report.suspicious);
        assert_eq!(report.signatures_found[0].format, FileKind::Zip);
        assert_eq!(report.signatures_found[0].byte_offset, 32);
        assert_eq!(report.reason.as_deref(), Some("signatures: ZIP"));
    }

    #[test]
    fn test_flat_plane_is_clean() {
        let report = analyze_lsb(&pixels_from_stream(&[0u8; 256]), &ScanLimits::default());
        assert!(!report.suspicious);
        assert_eq!(report.entropy_bits, 0.0);
        assert!(report.reason.is_none());
    }

    #[test]
    fn test_random_plane_is_high_entropy() {
        let stream: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let report = analyze_lsb(&pixels_from_stream(&stream), &ScanLimits::default());
        assert!(report.suspicious);
        assert_eq!(report.reason.as_deref(), Some("high LSB entropy"));
    }

    #[test]
    fn test_pixel_cap_limits_stream() {
        let mut stream = vec![0u8; 64];
        stream.extend_from_slice(b"%PDF");
        let limits = ScanLimits {
            lsb_max_pixels: 64 * 2, // 64 bytes of stream at 4 channels per pixel
            ..ScanLimits::default()
        };
        assert!(!analyze_lsb(&pixels_from_stream(&stream), &limits).suspicious);
    }

    struct FailingDecoder;

    impl PixelDecoder for FailingDecoder {
        fn decode_rgba(&self, _encoded: &[u8], _max_pixels: usize) -> GuardResult<RgbaPixels> {
            Err(GuardError::Decode("unsupported".into()))
        }
    }

    #[test]
    fn test_decoder_error_propagates() {
        let detector = StegoDetector::new(Arc::new(FailingDecoder));
        let err = detector
            .analyze(b"\x89PNG", FileKind::Png, &ScanLimits::default())
            .unwrap_err();
        assert!(err.is_decode());
    }

    struct PanickingDecoder;

    impl PixelDecoder for PanickingDecoder {
        fn decode_rgba(&self, _encoded: &[u8], _max_pixels: usize) -> GuardResult<RgbaPixels> {
            panic!("corrupt huffman table");
        }
    }

    #[test]
    fn test_decoder_panic_becomes_error() {
        let detector = StegoDetector::new(Arc::new(PanickingDecoder));
        let err = detector
            .analyze(b"\xFF\xD8\xFF", FileKind::Jpeg, &ScanLimits::default())
            .unwrap_err();
        assert!(!err.is_decode());
        assert!(err.to_string().contains("panicked"));
    }

    #[cfg(feature = "pixel-decoder")]
    fn encode_png(img: image::DynamicImage) -> Vec<u8> {
        let mut png = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        png
    }

    #[cfg(feature = "pixel-decoder")]
    #[test]
    fn test_image_crate_forces_alpha() {
        let img = image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 31]));
        let png = encode_png(image::DynamicImage::ImageRgb8(img));
        let pixels = ImageCrateDecoder::default().decode_rgba(&png, usize::MAX).unwrap();
        assert_eq!(pixels.channels, 4);
        assert_eq!(pixels.data.len(), 3 * 2 * 4);
        assert_eq!(&pixels.data[..4], &[10, 20, 31, 255]);
    }

    #[cfg(feature = "pixel-decoder")]
    #[test]
    fn test_image_crate_converts_only_needed_pixels() {
        let img = image::GrayImage::from_pixel(1000, 1000, image::Luma([7]));
        let png = encode_png(image::DynamicImage::ImageLuma8(img));
        let pixels = ImageCrateDecoder::default().decode_rgba(&png, 100).unwrap();
        assert_eq!((pixels.width, pixels.height), (1000, 1000));
        assert_eq!(pixels.data.len(), 100 * 4);
        assert_eq!(&pixels.data[..4], &[7, 7, 7, 255]);
    }

    #[cfg(feature = "pixel-decoder")]
    #[test]
    fn test_image_crate_refuses_oversized_image() {
        // 4 MB of grey pixels from a few kilobytes of PNG.
        let img = image::GrayImage::new(2000, 2000);
        let png = encode_png(image::DynamicImage::ImageLuma8(img));
        assert!(png.len() < 64 * 1024);
        let err = ImageCrateDecoder::new(1024 * 1024)
            .decode_rgba(&png, 200_000)
            .unwrap_err();
        assert!(err.is_decode());
    }
}
