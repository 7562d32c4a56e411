//! Video frame types and processing

use image::RgbImage;

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            sequence,
        }
    }

    /// Create a frame from a decoded image
    pub fn from_image(image: RgbImage, sequence: u32) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            sequence,
        }
    }

    /// True when the frame has zero area or the buffer does not match its dimensions
    pub fn is_malformed(&self) -> bool {
        self.width == 0
            || self.height == 0
            || self.data.len() != self.width as usize * self.height as usize * 3
    }

    /// Borrow the frame as an RGB image
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        if self.is_malformed() {
            return None;
        }
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// Mirror the frame horizontally
    pub fn mirrored(&self) -> VideoFrame {
        let mut data = Vec::with_capacity(self.data.len());
        for row in self.data.chunks(self.width as usize * 3) {
            for pixel in row.chunks(3).rev() {
                data.extend_from_slice(pixel);
            }
        }
        VideoFrame {
            data,
            width: self.width,
            height: self.height,
            sequence: self.sequence,
        }
    }
}
