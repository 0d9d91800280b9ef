//! Still-frame capture: rasterization into the frame buffer and JPEG
//! encodings for upload.

use crate::error::CameraError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use rollcall_hw::Frame;
use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;

pub const JPEG_MIME: &str = "image/jpeg";
pub const DEFAULT_QUALITY: f32 = 0.9;

const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("frame has zero width or height")]
    EmptyFrame,
    #[error("frame data length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("jpeg encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),
    #[error("encoder task failed: {0}")]
    Task(String),
}

impl From<EncodeError> for CameraError {
    fn from(err: EncodeError) -> Self {
        match err {
            EncodeError::EmptyFrame => CameraError::NotReady,
            other => CameraError::unknown(other.to_string()),
        }
    }
}

/// Requested output of a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureFormat {
    /// Raw JPEG bytes, encoded off the async executor.
    Blob,
    /// `data:image/jpeg;base64,...`
    #[default]
    DataUrl,
    /// Base-64 payload without the data-URL header.
    Base64,
    /// Data URL plus dimensions and capture time.
    Detailed,
}

impl FromStr for CaptureFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blob" | "jpeg" | "jpg" => Ok(CaptureFormat::Blob),
            "dataurl" | "data-url" => Ok(CaptureFormat::DataUrl),
            "base64" => Ok(CaptureFormat::Base64),
            "detailed" | "json" => Ok(CaptureFormat::Detailed),
            other => Err(format!(
                "unknown capture format: {other} (expected blob, data-url, base64, or json)"
            )),
        }
    }
}

/// Encoded JPEG payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

/// Data URL with the frame's dimensions and capture time (ms since epoch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureDetails {
    pub data_url: String,
    pub width: u32,
    pub height: u32,
    pub timestamp: i64,
}

/// Result of a capture, in the requested format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capture {
    Blob(ImageBlob),
    DataUrl(String),
    Base64(String),
    Detailed(CaptureDetails),
}

/// Offscreen raster, created on first use and resized to each frame.
#[derive(Default)]
pub struct FrameBuffer {
    image: Option<RgbImage>,
}

impl FrameBuffer {
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.image.as_ref().map(RgbImage::dimensions)
    }

    /// Copy `frame` into the buffer, resizing it to the frame's dimensions.
    pub fn rasterize(&mut self, frame: &Frame) -> Result<&RgbImage, EncodeError> {
        let (width, height) = (frame.width, frame.height);
        if width == 0 || height == 0 {
            return Err(EncodeError::EmptyFrame);
        }
        let expected = width as usize * height as usize * 3;
        if frame.data.len() != expected {
            return Err(EncodeError::LengthMismatch {
                expected,
                actual: frame.data.len(),
            });
        }

        if self.dimensions() != Some((width, height)) {
            tracing::debug!(width, height, "resizing frame buffer");
            self.image = None;
        }
        let image = self
            .image
            .get_or_insert_with(|| RgbImage::new(width, height));
        image.copy_from_slice(&frame.data);
        Ok(image)
    }
}

/// Map a [0, 1] quality to the encoder's 1–100 scale.
pub fn jpeg_quality(quality: f32) -> u8 {
    let quality = if quality.is_finite() {
        quality.clamp(0.0, 1.0)
    } else {
        DEFAULT_QUALITY
    };
    ((quality * 100.0).round() as u8).max(1)
}

pub fn encode_jpeg(image: &RgbImage, quality: f32) -> Result<Vec<u8>, EncodeError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, jpeg_quality(quality)).encode_image(image)?;
    Ok(bytes)
}

/// Encode on the blocking pool and wrap the bytes as a JPEG blob.
pub async fn encode_blob(image: RgbImage, quality: f32) -> Result<ImageBlob, EncodeError> {
    let bytes = tokio::task::spawn_blocking(move || encode_jpeg(&image, quality))
        .await
        .map_err(|e| EncodeError::Task(e.to_string()))??;
    Ok(ImageBlob {
        bytes,
        mime: JPEG_MIME,
    })
}

pub fn encode_base64(image: &RgbImage, quality: f32) -> Result<String, EncodeError> {
    Ok(STANDARD.encode(encode_jpeg(image, quality)?))
}

pub fn encode_data_url(image: &RgbImage, quality: f32) -> Result<String, EncodeError> {
    Ok(format!("{DATA_URL_PREFIX}{}", encode_base64(image, quality)?))
}

/// The base-64 payload of a data URL.
pub fn strip_data_url_header(data_url: &str) -> Option<&str> {
    data_url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .map(|(_, payload)| payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Frame {
        let data = (0..width * height)
            .flat_map(|i| {
                let v = (i % 251) as u8;
                [v, v.wrapping_mul(3), 255 - v]
            })
            .collect();
        Frame::from_rgb(data, width, height, 0).unwrap()
    }

    #[test]
    fn test_buffer_is_lazy_and_follows_frame_size() {
        let mut buffer = FrameBuffer::default();
        assert_eq!(buffer.dimensions(), None);

        buffer.rasterize(&gradient(8, 4)).unwrap();
        assert_eq!(buffer.dimensions(), Some((8, 4)));

        let image = buffer.rasterize(&gradient(16, 2)).unwrap();
        assert_eq!(image.dimensions(), (16, 2));
        assert_eq!(image.get_pixel(1, 0).0, [1, 3, 254]);
    }

    #[test]
    fn test_rasterize_rejects_mismatched_frame() {
        let mut buffer = FrameBuffer::default();
        let mut frame = gradient(4, 4);
        frame.data.truncate(10);
        assert!(matches!(
            buffer.rasterize(&frame),
            Err(EncodeError::LengthMismatch { expected: 48, actual: 10 })
        ));
        frame.width = 0;
        assert!(matches!(buffer.rasterize(&frame), Err(EncodeError::EmptyFrame)));
        assert_eq!(buffer.dimensions(), None);
    }

    #[test]
    fn test_jpeg_quality_mapping() {
        assert_eq!(jpeg_quality(0.9), 90);
        assert_eq!(jpeg_quality(1.0), 100);
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(7.5), 100);
        assert_eq!(jpeg_quality(-1.0), 1);
        assert_eq!(jpeg_quality(f32::NAN), 90);
    }

    #[test]
    fn test_encode_jpeg_has_soi_marker() {
        let mut buffer = FrameBuffer::default();
        let image = buffer.rasterize(&gradient(32, 16)).unwrap();
        let bytes = encode_jpeg(image, 0.9).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_blob_is_tagged_jpeg() {
        let mut buffer = FrameBuffer::default();
        let image = buffer.rasterize(&gradient(16, 8)).unwrap().clone();
        let blob = encode_blob(image, 0.6).await.unwrap();
        assert_eq!(blob.mime, JPEG_MIME);
        assert_eq!(&blob.bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_data_url_header_strips_to_base64() {
        let mut buffer = FrameBuffer::default();
        let image = buffer.rasterize(&gradient(32, 16)).unwrap();
        let data_url = encode_data_url(image, 0.7).unwrap();
        assert!(data_url.starts_with("data:image/jpeg;base64,"));
        let base64 = encode_base64(image, 0.7).unwrap();
        assert_eq!(strip_data_url_header(&data_url), Some(base64.as_str()));
    }

    #[test]
    fn test_strip_header_rejects_non_data_url() {
        assert_eq!(strip_data_url_header("aGVsbG8="), None);
        assert_eq!(strip_data_url_header("data:image/jpeg;base64"), None);
    }

    #[test]
    fn test_capture_format_parse() {
        assert_eq!("data-url".parse::<CaptureFormat>(), Ok(CaptureFormat::DataUrl));
        assert_eq!("BASE64".parse::<CaptureFormat>(), Ok(CaptureFormat::Base64));
        assert_eq!("json".parse::<CaptureFormat>(), Ok(CaptureFormat::Detailed));
        assert_eq!("blob".parse::<CaptureFormat>(), Ok(CaptureFormat::Blob));
        assert!("gif".parse::<CaptureFormat>().is_err());
        assert_eq!(CaptureFormat::default(), CaptureFormat::DataUrl);
    }

    #[test]
    fn test_empty_frame_maps_to_not_ready() {
        assert_eq!(CameraError::from(EncodeError::EmptyFrame), CameraError::NotReady);
        assert_eq!(
            CameraError::from(EncodeError::Task("cancelled".into())).category(),
            "Unknown"
        );
    }
}
