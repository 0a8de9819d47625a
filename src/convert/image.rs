//! Image and camera message conversions.
//!
//! Incoming messages are validated completely before the destination frame
//! is touched; on mismatch the frame keeps its previous contents.

use layercast_msgs::{encodings, CameraInfo, Header, Image};

use crate::core::error::Error;
use crate::core::Result;
use crate::sensor::camera::Camera;
use crate::sensor::frame::{ColorImage, DepthImage, COLOR_BYTES_PER_PIXEL, DEPTH_BYTES_PER_PIXEL};

/// Check encoding, endianness and buffer sizes; returns the row length in bytes
fn validate(msg: &Image, encoding: &str, bytes_per_pixel: usize) -> Result<usize> {
    if msg.encoding != encoding {
        return Err(Error::format_mismatch(encoding, msg.encoding.as_str()));
    }
    if msg.is_bigendian != 0 && bytes_per_pixel > 1 {
        return Err(Error::format_mismatch("little endian", "big endian"));
    }
    let row_bytes = msg.width as usize * bytes_per_pixel;
    let step = msg.step as usize;
    if step < row_bytes {
        return Err(Error::format_mismatch(
            format!("step >= {}", row_bytes),
            format!("step {}", step),
        ));
    }
    let needed = step * msg.height as usize;
    if msg.data.len() < needed {
        return Err(Error::format_mismatch(
            format!("{} data bytes", needed),
            format!("{} data bytes", msg.data.len()),
        ));
    }
    Ok(row_bytes)
}

/// Iterate the pixel bytes of each row, skipping stride padding
fn rows(msg: &Image, row_bytes: usize) -> impl Iterator<Item = &[u8]> {
    msg.data
        .chunks(msg.step.max(1) as usize)
        .take(msg.height as usize)
        .map(move |row| &row[..row_bytes])
}

/// Convert a `32FC1` image message into a depth frame
pub fn depth_image_from_image_message(msg: &Image, frame: &mut DepthImage) -> Result<()> {
    let row_bytes = validate(msg, encodings::TYPE_32FC1, DEPTH_BYTES_PER_PIXEL)?;
    let mut pixels = Vec::with_capacity(msg.width as usize * msg.height as usize);
    for row in rows(msg, row_bytes) {
        pixels.extend(
            row.chunks_exact(DEPTH_BYTES_PER_PIXEL)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        );
    }
    let converted = DepthImage::from_raw(msg.width, msg.height, pixels)
        .ok_or_else(|| Error::format_mismatch("complete depth buffer", "short buffer"))?;
    *frame = converted;
    Ok(())
}

/// Convert an `rgb8` image message into a color frame
pub fn color_image_from_image_message(msg: &Image, frame: &mut ColorImage) -> Result<()> {
    let row_bytes = validate(msg, encodings::RGB8, COLOR_BYTES_PER_PIXEL)?;
    let mut pixels = Vec::with_capacity(row_bytes * msg.height as usize);
    for row in rows(msg, row_bytes) {
        pixels.extend_from_slice(row);
    }
    let converted = ColorImage::from_raw(msg.width, msg.height, pixels)
        .ok_or_else(|| Error::format_mismatch("complete color buffer", "short buffer"))?;
    *frame = converted;
    Ok(())
}

/// Depth frame to a tightly packed little-endian `32FC1` message
pub fn image_message_from_depth_image(frame: &DepthImage, frame_id: &str) -> Image {
    let data = frame.as_raw().iter().flat_map(|d| d.to_le_bytes()).collect();
    Image {
        header: Header::with_frame(frame_id),
        height: frame.height(),
        width: frame.width(),
        encoding: encodings::TYPE_32FC1.to_string(),
        is_bigendian: 0,
        step: frame.width() * DEPTH_BYTES_PER_PIXEL as u32,
        data,
    }
}

/// Color frame to a tightly packed `rgb8` message
pub fn image_message_from_color_image(frame: &ColorImage, frame_id: &str) -> Image {
    Image {
        header: Header::with_frame(frame_id),
        height: frame.height(),
        width: frame.width(),
        encoding: encodings::RGB8.to_string(),
        is_bigendian: 0,
        step: frame.width() * COLOR_BYTES_PER_PIXEL as u32,
        data: frame.as_raw().clone(),
    }
}

/// Pinhole intrinsics from calibration (K row-major: fu, _, cu, _, fv, cv, ...)
pub fn camera_from_message(info: &CameraInfo) -> Camera {
    Camera::new(
        info.k[0] as f32,
        info.k[4] as f32,
        info.k[2] as f32,
        info.k[5] as f32,
        info.width,
        info.height,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn depth_message(width: u32, height: u32, step: u32) -> Image {
        let mut data = vec![0u8; (step * height) as usize];
        for y in 0..height {
            for x in 0..width {
                let at = (y * step + x * 4) as usize;
                let value = (y * width + x) as f32 * 0.5;
                data[at..at + 4].copy_from_slice(&value.to_le_bytes());
            }
        }
        Image {
            header: Header::with_frame("camera"),
            height,
            width,
            encoding: encodings::TYPE_32FC1.to_string(),
            is_bigendian: 0,
            step,
            data,
        }
    }

    #[test]
    fn test_depth_from_padded_rows() {
        let msg = depth_message(3, 2, 16);
        let mut frame = DepthImage::new(1, 1);
        depth_image_from_image_message(&msg, &mut frame).unwrap();
        assert_eq!(frame.dimensions(), (3, 2));
        assert_eq!(frame.get_pixel(2, 1)[0], 2.5);
    }

    #[test]
    fn test_mono8_is_rejected_and_frame_untouched() {
        let mut msg = depth_message(2, 2, 8);
        msg.encoding = encodings::MONO8.to_string();
        let mut frame = DepthImage::from_pixel(4, 4, Luma([7.0]));
        let before = frame.clone();

        let result = depth_image_from_image_message(&msg, &mut frame);
        assert!(matches!(result, Err(Error::FormatMismatch { .. })));
        assert_eq!(frame, before);
    }

    #[test]
    fn test_short_step_or_data_rejected() {
        let mut frame = DepthImage::new(1, 1);
        let mut msg = depth_message(4, 2, 16);
        msg.step = 12;
        assert!(depth_image_from_image_message(&msg, &mut frame).is_err());

        let mut msg = depth_message(4, 2, 16);
        msg.data.truncate(20);
        assert!(depth_image_from_image_message(&msg, &mut frame).is_err());
        assert_eq!(frame.dimensions(), (1, 1));
    }

    #[test]
    fn test_big_endian_depth_rejected() {
        let mut msg = depth_message(1, 1, 4);
        msg.is_bigendian = 1;
        let mut frame = DepthImage::new(1, 1);
        assert!(depth_image_from_image_message(&msg, &mut frame).is_err());
    }

    #[test]
    fn test_depth_message_round_trip_fields() {
        let frame = DepthImage::from_fn(3, 2, |x, y| Luma([(x + y) as f32]));
        let msg = image_message_from_depth_image(&frame, "depth_cam");
        assert_eq!(msg.header.frame_id, "depth_cam");
        assert_eq!(msg.step, 12);
        assert_eq!(msg.is_bigendian, 0);
        assert_eq!(msg.data.len(), 24);

        let mut back = DepthImage::new(1, 1);
        depth_image_from_image_message(&msg, &mut back).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn test_color_conversion_and_encoding_check() {
        let frame = ColorImage::from_pixel(2, 2, Rgb([10, 20, 30]));
        let mut msg = image_message_from_color_image(&frame, "rgb_cam");
        assert_eq!(msg.encoding, "rgb8");
        assert_eq!(msg.step, 6);

        let mut back = ColorImage::new(1, 1);
        color_image_from_image_message(&msg, &mut back).unwrap();
        assert_eq!(back, frame);

        msg.encoding = encodings::RGBA8.to_string();
        let mut untouched = ColorImage::new(1, 1);
        assert!(color_image_from_image_message(&msg, &mut untouched).is_err());
        assert_eq!(untouched.dimensions(), (1, 1));
    }

    #[test]
    fn test_camera_from_intrinsics() {
        let info = CameraInfo {
            width: 640,
            height: 480,
            k: [525.0, 0.0, 319.5, 0.0, 526.0, 239.5, 0.0, 0.0, 1.0],
            ..Default::default()
        };
        let camera = camera_from_message(&info);
        assert_eq!(camera.fu, 525.0);
        assert_eq!(camera.fv, 526.0);
        assert_eq!(camera.cu, 319.5);
        assert_eq!(camera.cv, 239.5);
        assert_eq!((camera.width, camera.height), (640, 480));
    }
}
