//! Stream profiles and profile requests
//!
//! A sensor advertises a list of `StreamProfile`s. Only video profiles carry a
//! resolution; motion profiles are listed by the SDK too but never match a
//! `StreamProfileRequest`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stream kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Depth,
    Color,
    Infrared,
    Confidence,
    Gyro,
    Accel,
}

/// Pixel / sample format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Z16,
    Y8,
    Y16,
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
    Yuyv,
    Uyvy,
    Raw8,
    MotionXyz32f,
}

impl PixelFormat {
    /// Bytes per pixel (motion samples count as one 12 byte "pixel")
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Y8 | Self::Raw8 => 1,
            Self::Z16 | Self::Y16 | Self::Yuyv | Self::Uyvy => 2,
            Self::Rgb8 | Self::Bgr8 => 3,
            Self::Rgba8 | Self::Bgra8 => 4,
            Self::MotionXyz32f => 12,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Depth => "Depth",
            Self::Color => "Color",
            Self::Infrared => "Infrared",
            Self::Confidence => "Confidence",
            Self::Gyro => "Gyro",
            Self::Accel => "Accel",
        };
        f.write_str(name)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Z16 => "Z16",
            Self::Y8 => "Y8",
            Self::Y16 => "Y16",
            Self::Rgb8 => "RGB8",
            Self::Bgr8 => "BGR8",
            Self::Rgba8 => "RGBA8",
            Self::Bgra8 => "BGRA8",
            Self::Yuyv => "YUYV",
            Self::Uyvy => "UYVY",
            Self::Raw8 => "RAW8",
            Self::MotionXyz32f => "MOTION_XYZ32F",
        };
        f.write_str(name)
    }
}

/// Video stream profile (exposes resolution)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoStreamProfile {
    /// SDK assigned unique id
    pub unique_id: u32,
    pub stream_kind: StreamKind,
    pub stream_index: u32,
    pub format: PixelFormat,
    pub frame_rate: u32,
    pub width: u32,
    pub height: u32,
}

impl VideoStreamProfile {
    /// Size of one frame in bytes
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

/// Motion stream profile (no resolution)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MotionStreamProfile {
    pub unique_id: u32,
    pub stream_kind: StreamKind,
    pub stream_index: u32,
    pub format: PixelFormat,
    pub frame_rate: u32,
}

/// A profile advertised by a sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamProfile {
    Video(VideoStreamProfile),
    Motion(MotionStreamProfile),
}

impl StreamProfile {
    pub fn unique_id(&self) -> u32 {
        match self {
            Self::Video(p) => p.unique_id,
            Self::Motion(p) => p.unique_id,
        }
    }

    pub fn stream_kind(&self) -> StreamKind {
        match self {
            Self::Video(p) => p.stream_kind,
            Self::Motion(p) => p.stream_kind,
        }
    }

    pub fn frame_rate(&self) -> u32 {
        match self {
            Self::Video(p) => p.frame_rate,
            Self::Motion(p) => p.frame_rate,
        }
    }

    /// The video view of this profile, if it has one
    pub fn as_video(&self) -> Option<&VideoStreamProfile> {
        match self {
            Self::Video(p) => Some(p),
            Self::Motion(_) => None,
        }
    }
}

impl fmt::Display for StreamProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video(p) => write!(
                f,
                "{} #{} {} {}x{} @ {}fps",
                p.stream_kind, p.stream_index, p.format, p.width, p.height, p.frame_rate
            ),
            Self::Motion(p) => write!(
                f,
                "{} #{} {} @ {}Hz",
                p.stream_kind, p.stream_index, p.format, p.frame_rate
            ),
        }
    }
}

/// Desired stream configuration
///
/// Fully specifies one stream. A profile matches only when every field is equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamProfileRequest {
    pub frame_rate: u32,
    pub stream_kind: StreamKind,
    pub stream_index: u32,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
}

impl StreamProfileRequest {
    /// 6 fps BGR8 1280x720 color stream
    pub const fn default_color() -> Self {
        Self {
            frame_rate: 6,
            stream_kind: StreamKind::Color,
            stream_index: 0,
            format: PixelFormat::Bgr8,
            width: 1280,
            height: 720,
        }
    }

    /// 6 fps Z16 1280x720 depth stream
    pub const fn default_depth() -> Self {
        Self {
            frame_rate: 6,
            stream_kind: StreamKind::Depth,
            stream_index: 0,
            format: PixelFormat::Z16,
            width: 1280,
            height: 720,
        }
    }

    /// Exact match on all six fields
    pub fn matches(&self, profile: &VideoStreamProfile) -> bool {
        profile.frame_rate == self.frame_rate
            && profile.stream_kind == self.stream_kind
            && profile.stream_index == self.stream_index
            && profile.format == self.format
            && profile.width == self.width
            && profile.height == self.height
    }
}

impl fmt::Display for StreamProfileRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{} {} {}x{} @ {}fps",
            self.stream_kind, self.stream_index, self.format, self.width, self.height, self.frame_rate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(frame_rate: u32, width: u32, height: u32) -> VideoStreamProfile {
        VideoStreamProfile {
            unique_id: 7,
            stream_kind: StreamKind::Color,
            stream_index: 0,
            format: PixelFormat::Bgr8,
            frame_rate,
            width,
            height,
        }
    }

    #[test]
    fn test_request_matches_exactly() {
        let request = StreamProfileRequest::default_color();
        assert!(request.matches(&video(6, 1280, 720)));
        assert!(!request.matches(&video(15, 1280, 720)));
        assert!(!request.matches(&video(6, 1280, 800)));
        assert!(!request.matches(&video(6, 640, 720)));
    }

    #[test]
    fn test_request_rejects_other_index_and_format() {
        let request = StreamProfileRequest::default_color();
        let mut profile = video(6, 1280, 720);
        profile.stream_index = 1;
        assert!(!request.matches(&profile));

        let mut profile = video(6, 1280, 720);
        profile.format = PixelFormat::Rgb8;
        assert!(!request.matches(&profile));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            StreamProfileRequest::default_depth().to_string(),
            "Depth #0 Z16 1280x720 @ 6fps"
        );
        let motion = StreamProfile::Motion(MotionStreamProfile {
            unique_id: 1,
            stream_kind: StreamKind::Gyro,
            stream_index: 0,
            format: PixelFormat::MotionXyz32f,
            frame_rate: 200,
        });
        assert_eq!(motion.to_string(), "Gyro #0 MOTION_XYZ32F @ 200Hz");
        assert!(motion.as_video().is_none());
    }

    #[test]
    fn test_profile_serde_tagged() {
        let profile = StreamProfile::Video(video(6, 1280, 720));
        let json = serde_json::to_string(&profile).unwrap();
        assert!(json.contains("\"type\":\"video\""));
        assert!(json.contains("\"format\":\"bgr8\""));
    }

    #[test]
    fn test_frame_bytes() {
        assert_eq!(video(6, 1280, 720).frame_bytes(), 1280 * 720 * 3);
    }
}
