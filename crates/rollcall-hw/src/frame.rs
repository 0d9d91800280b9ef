//! Frame type and pixel conversion — YUYV, MJPG and GREY to packed RGB.

use image::ImageFormat;

/// A captured camera frame, packed RGB8.
#[derive(Clone)]
pub struct Frame {
    /// RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    /// Wrap packed RGB8 data, checking it matches the dimensions.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::ZeroDimensions);
        }
        let expected = rgb_len(width, height);
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence,
        })
    }
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Motion-JPEG, one JPEG image per buffer.
    Mjpg,
    /// 8-bit grayscale.
    Grey,
    /// Packed RGB, 3 bytes/pixel.
    Rgb24,
}

impl PixelFormat {
    pub fn from_fourcc(repr: &[u8; 4]) -> Option<Self> {
        match repr {
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"MJPG" => Some(PixelFormat::Mjpg),
            b"GREY" => Some(PixelFormat::Grey),
            b"RGB3" => Some(PixelFormat::Rgb24),
            _ => None,
        }
    }

    pub fn fourcc(self) -> &'static [u8; 4] {
        match self {
            PixelFormat::Yuyv => b"YUYV",
            PixelFormat::Mjpg => b"MJPG",
            PixelFormat::Grey => b"GREY",
            PixelFormat::Rgb24 => b"RGB3",
        }
    }
}

fn rgb_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

/// Convert a raw buffer in `format` to packed RGB8.
pub fn to_rgb(format: PixelFormat, buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    match format {
        PixelFormat::Yuyv => yuyv_to_rgb(buf, width, height),
        PixelFormat::Mjpg => mjpg_to_rgb(buf, width, height),
        PixelFormat::Grey => grey_to_rgb(buf, width, height),
        PixelFormat::Rgb24 => {
            let expected = rgb_len(width, height);
            if buf.len() < expected {
                return Err(FrameError::InvalidLength {
                    expected,
                    actual: buf.len(),
                });
            }
            Ok(buf[..expected].to_vec())
        }
    }
}

/// Convert packed YUYV (4:2:2) to RGB using BT.601 integer coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = width as usize * height as usize * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    let mut rgb = Vec::with_capacity(rgb_len(width, height));
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_pixel(y0, u, v));
        rgb.extend_from_slice(&yuv_pixel(y1, u, v));
    }
    Ok(rgb)
}

fn yuv_pixel(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| (x >> 8).clamp(0, 255) as u8;
    [
        clamp(298 * c + 409 * e + 128),
        clamp(298 * c - 100 * d - 208 * e + 128),
        clamp(298 * c + 516 * d + 128),
    ]
}

/// Expand 8-bit grayscale to RGB.
pub fn grey_to_rgb(gray: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = width as usize * height as usize;
    if gray.len() < pixels {
        return Err(FrameError::InvalidLength {
            expected: pixels,
            actual: gray.len(),
        });
    }
    Ok(gray[..pixels].iter().flat_map(|&p| [p, p, p]).collect())
}

/// Decode one MJPG buffer. The decoded size must match the negotiated size.
pub fn mjpg_to_rgb(buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let decoded = image::load_from_memory_with_format(buf, ImageFormat::Jpeg)
        .map_err(|e| FrameError::Decode(e.to_string()))?
        .to_rgb8();
    if decoded.dimensions() != (width, height) {
        return Err(FrameError::DimensionMismatch {
            expected: (width, height),
            actual: decoded.dimensions(),
        });
    }
    Ok(decoded.into_raw())
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("frame has zero width or height")]
    ZeroDimensions,
    #[error("MJPG decode failed: {0}")]
    Decode(String),
    #[error("decoded frame is {actual:?}, negotiated {expected:?}")]
    DimensionMismatch { expected: (u32, u32), actual: (u32, u32) },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_black_and_white() {
        // 2x1 image: Y0=16 (black), Y1=235 (white), neutral chroma
        let yuyv = vec![16, 128, 235, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb, vec![0, 0, 0, 255, 255, 255]);
    }

    #[test]
    fn test_yuyv_mid_grey() {
        let yuyv = vec![126, 128, 126, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb, vec![128; 6]);
    }

    #[test]
    fn test_yuyv_red_dominant() {
        // High V pushes red up and green down.
        let rgb = yuyv_to_rgb(&[81, 90, 81, 240], 2, 1).unwrap();
        assert!(rgb[0] > 200, "red = {}", rgb[0]);
        assert!(rgb[1] < 50, "green = {}", rgb[1]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let result = yuyv_to_rgb(&[100, 128], 2, 1);
        assert!(matches!(
            result,
            Err(FrameError::InvalidLength { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_grey_to_rgb() {
        let rgb = grey_to_rgb(&[7, 200], 2, 1).unwrap();
        assert_eq!(rgb, vec![7, 7, 7, 200, 200, 200]);
    }

    #[test]
    fn test_mjpg_round_trip_dimensions() {
        let img = image::RgbImage::from_pixel(8, 4, image::Rgb([90, 120, 30]));
        let mut jpeg = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, 90)
            .encode_image(&img)
            .unwrap();
        let rgb = mjpg_to_rgb(&jpeg, 8, 4).unwrap();
        assert_eq!(rgb.len(), 8 * 4 * 3);
        assert!(matches!(
            mjpg_to_rgb(&jpeg, 16, 4),
            Err(FrameError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_mjpg_garbage_is_decode_error() {
        assert!(matches!(
            mjpg_to_rgb(&[0, 1, 2, 3], 2, 2),
            Err(FrameError::Decode(_))
        ));
    }

    #[test]
    fn test_from_rgb_validates() {
        assert!(Frame::from_rgb(vec![0; 12], 2, 2, 0).is_ok());
        assert!(matches!(
            Frame::from_rgb(vec![0; 11], 2, 2, 0),
            Err(FrameError::InvalidLength { expected: 12, actual: 11 })
        ));
        assert!(matches!(
            Frame::from_rgb(vec![], 0, 2, 0),
            Err(FrameError::ZeroDimensions)
        ));
    }

    #[test]
    fn test_fourcc_mapping() {
        for format in [
            PixelFormat::Yuyv,
            PixelFormat::Mjpg,
            PixelFormat::Grey,
            PixelFormat::Rgb24,
        ] {
            assert_eq!(PixelFormat::from_fourcc(format.fourcc()), Some(format));
        }
        assert_eq!(PixelFormat::from_fourcc(b"Y16 "), None);
    }
}
