use fast_image_resize as fir;
use image::{RgbaImage, imageops};
use ndarray::Array4;
use rayon::prelude::*;

use crate::{
    error::{PoseError, PoseResult},
    types::{Frame, FrameContext},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputDtype {
    /// Raw channel values 0..=255.
    U8,
    /// Channel values scaled to `[0, 1]`.
    F32Normalized,
}

/// Declared model input: `(1, height, width, channels)` in NHWC order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputSpec {
    pub height: u32,
    pub width: u32,
    pub channels: u32,
    pub dtype: InputDtype,
}

impl InputSpec {
    pub fn shape(&self) -> [usize; 4] {
        [
            1,
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        ]
    }
}

#[derive(Clone, Debug)]
pub enum InputTensor {
    U8(Array4<u8>),
    F32(Array4<f32>),
}

impl InputTensor {
    pub fn shape(&self) -> &[usize] {
        match self {
            InputTensor::U8(array) => array.shape(),
            InputTensor::F32(array) => array.shape(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            InputTensor::U8(array) => array.len(),
            InputTensor::F32(array) => array.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug)]
pub struct EncodedFrame {
    pub tensor: InputTensor,
    /// Geometry after rotation correction, before resize.
    pub context: FrameContext,
}

pub struct TensorEncoder {
    spec: InputSpec,
    resizer: fir::Resizer,
}

impl TensorEncoder {
    pub fn new(spec: InputSpec) -> Self {
        Self {
            spec,
            resizer: fir::Resizer::new(),
        }
    }

    pub fn encode(&mut self, frame: &Frame) -> PoseResult<EncodedFrame> {
        if frame.width == 0 || frame.height == 0 {
            return Err(PoseError::Encoding(format!(
                "frame has empty geometry {}x{}",
                frame.width, frame.height
            )));
        }
        let expected_len = (frame.width as usize)
            .saturating_mul(frame.height as usize)
            .saturating_mul(4);
        if frame.rgba.len() != expected_len {
            return Err(PoseError::Encoding(format!(
                "frame buffer size mismatch: got {}, expected {}",
                frame.rgba.len(),
                expected_len
            )));
        }
        if !matches!(self.spec.channels, 1 | 3 | 4) {
            return Err(PoseError::Encoding(format!(
                "unsupported channel count {}",
                self.spec.channels
            )));
        }
        if self.spec.width == 0 || self.spec.height == 0 {
            return Err(PoseError::Encoding(format!(
                "declared input geometry {}x{} is empty",
                self.spec.width, self.spec.height
            )));
        }

        let (upright, width, height) = rotate_upright(
            &frame.rgba,
            frame.width,
            frame.height,
            frame.rotation_degrees,
        )?;
        let resized = self.resize(upright, width, height)?;
        let tensor = pack(&resized, &self.spec)?;

        Ok(EncodedFrame {
            tensor,
            context: FrameContext {
                source_width: width,
                source_height: height,
                rotation_degrees: frame.rotation_degrees % 360,
            },
        })
    }

    fn resize(&mut self, rgba: Vec<u8>, width: u32, height: u32) -> PoseResult<Vec<u8>> {
        if width == self.spec.width && height == self.spec.height {
            return Ok(rgba);
        }

        let src_image = fir::images::Image::from_vec_u8(width, height, rgba, fir::PixelType::U8x4)
            .map_err(|err| PoseError::Encoding(format!("invalid source image: {err}")))?;
        let mut dst_image =
            fir::images::Image::new(self.spec.width, self.spec.height, fir::PixelType::U8x4);
        let resize_options = fir::ResizeOptions::new()
            .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
        self.resizer
            .resize(&src_image, &mut dst_image, Some(&resize_options))
            .map_err(|err| PoseError::Encoding(format!("resize failed: {err}")))?;

        Ok(dst_image.into_vec())
    }
}

/// Applies the sensor rotation (clockwise degrees) and returns the upright
/// pixels with their new dimensions.
pub(crate) fn rotate_upright(
    rgba: &[u8],
    width: u32,
    height: u32,
    rotation_degrees: u32,
) -> PoseResult<(Vec<u8>, u32, u32)> {
    let rotation = rotation_degrees % 360;
    if rotation == 0 {
        return Ok((rgba.to_vec(), width, height));
    }

    let Some(img) = RgbaImage::from_raw(width, height, rgba.to_vec()) else {
        return Err(PoseError::Encoding(
            "failed to build RGBA image from frame".to_string(),
        ));
    };

    let rotated = match rotation {
        90 => imageops::rotate90(&img),
        180 => imageops::rotate180(&img),
        270 => imageops::rotate270(&img),
        other => {
            return Err(PoseError::Encoding(format!(
                "unsupported rotation {other} degrees"
            )));
        }
    };

    let (width, height) = rotated.dimensions();
    Ok((rotated.into_raw(), width, height))
}

fn pack(rgba: &[u8], spec: &InputSpec) -> PoseResult<InputTensor> {
    let pixels = spec.width as usize * spec.height as usize;
    if rgba.len() != pixels * 4 {
        return Err(PoseError::Encoding(format!(
            "resized buffer size mismatch: got {}, expected {}",
            rgba.len(),
            pixels * 4
        )));
    }

    let channels = spec.channels as usize;
    let bytes: Vec<u8> = rgba
        .par_chunks_exact(4)
        .flat_map_iter(|px| {
            let weighted = px[0] as u32 * 299 + px[1] as u32 * 587 + px[2] as u32 * 114;
            let luma = (weighted / 1000) as u8;
            let all = [px[0], px[1], px[2], px[3]];
            let picked: [u8; 4] = if channels == 1 { [luma, 0, 0, 0] } else { all };
            picked.into_iter().take(channels)
        })
        .collect();

    let shape = (1, spec.height as usize, spec.width as usize, channels);
    let tensor = match spec.dtype {
        InputDtype::U8 => InputTensor::U8(Array4::from_shape_vec(shape, bytes).map_err(|err| {
            PoseError::Encoding(format!("failed to build input tensor: {err}"))
        })?),
        InputDtype::F32Normalized => {
            let normalized: Vec<f32> = bytes.par_iter().map(|&v| v as f32 / 255.0).collect();
            InputTensor::F32(
                Array4::from_shape_vec(shape, normalized).map_err(|err| {
                    PoseError::Encoding(format!("failed to build input tensor: {err}"))
                })?,
            )
        }
    };

    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, rgba: [u8; 4], rotation: u32) -> Frame {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Frame::new(data, width, height, rotation)
    }

    fn spec(dtype: InputDtype) -> InputSpec {
        InputSpec {
            height: 8,
            width: 8,
            channels: 3,
            dtype,
        }
    }

    #[test]
    fn rejects_empty_frame() {
        let mut encoder = TensorEncoder::new(spec(InputDtype::F32Normalized));
        let frame = Frame::new(Vec::new(), 0, 4, 0);
        assert!(matches!(encoder.encode(&frame), Err(PoseError::Encoding(_))));
    }

    #[test]
    fn rejects_short_buffer_instead_of_truncating() {
        let mut encoder = TensorEncoder::new(spec(InputDtype::F32Normalized));
        let frame = Frame::new(vec![0; 10 * 10 * 4 - 1], 10, 10, 0);
        assert!(matches!(encoder.encode(&frame), Err(PoseError::Encoding(_))));
    }

    #[test]
    fn rejects_odd_rotation() {
        let mut encoder = TensorEncoder::new(spec(InputDtype::U8));
        let frame = solid_frame(4, 4, [1, 2, 3, 255], 45);
        assert!(matches!(encoder.encode(&frame), Err(PoseError::Encoding(_))));
    }

    #[test]
    fn normalized_output_has_declared_shape_and_range() {
        let mut encoder = TensorEncoder::new(spec(InputDtype::F32Normalized));
        let frame = solid_frame(32, 24, [255, 0, 51, 255], 0);
        let encoded = encoder.encode(&frame).unwrap();

        assert_eq!(encoded.tensor.shape(), &[1, 8, 8, 3]);
        assert_eq!(encoded.tensor.len(), 8 * 8 * 3);
        let InputTensor::F32(array) = encoded.tensor else {
            panic!("expected f32 tensor");
        };
        // Interleaved R, G, B for a uniform colour stays uniform under bilinear.
        let flat: Vec<f32> = array.iter().copied().collect();
        for px in flat.chunks_exact(3) {
            assert!((px[0] - 1.0).abs() < 1e-6);
            assert!(px[1].abs() < 1e-6);
            assert!((px[2] - 0.2).abs() < 1e-6);
        }
    }

    #[test]
    fn u8_output_keeps_raw_channel_values() {
        let mut encoder = TensorEncoder::new(spec(InputDtype::U8));
        let frame = solid_frame(8, 8, [10, 20, 30, 255], 0);
        let encoded = encoder.encode(&frame).unwrap();
        let InputTensor::U8(array) = encoded.tensor else {
            panic!("expected u8 tensor");
        };
        assert_eq!(array[[0, 3, 5, 0]], 10);
        assert_eq!(array[[0, 3, 5, 1]], 20);
        assert_eq!(array[[0, 3, 5, 2]], 30);
    }

    #[test]
    fn rotation_is_applied_before_resize() {
        let mut encoder = TensorEncoder::new(spec(InputDtype::U8));
        let frame = solid_frame(640, 480, [0, 0, 0, 255], 90);
        let encoded = encoder.encode(&frame).unwrap();
        assert_eq!(encoded.context.source_width, 480);
        assert_eq!(encoded.context.source_height, 640);
        assert_eq!(encoded.context.rotation_degrees, 90);
    }

    #[test]
    fn rotation_moves_pixels_clockwise() {
        // 2x1 frame: left red, right blue. After 90° clockwise it is 1x2 with
        // red on top.
        let pixels = [255, 0, 0, 255, 0, 0, 255, 255];
        let (rgba, width, height) = rotate_upright(&pixels, 2, 1, 90).unwrap();
        assert_eq!((width, height), (1, 2));
        assert_eq!(&rgba[..4], &[255, 0, 0, 255]);
        assert_eq!(&rgba[4..], &[0, 0, 255, 255]);
    }
}
