use anyhow::{Result, anyhow};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use crate::types::Frame;

/// Pixel layouts a capture source may deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceLayout {
    Nv12,
    Yuyv,
    Mjpeg,
    Rgb,
    Bgr,
    Gray,
}

/// Converts one raw capture buffer to an RGBA8 [`Frame`]. Short buffers are
/// rejected rather than padded.
pub fn to_frame(
    layout: SourceLayout,
    data: &[u8],
    width: u32,
    height: u32,
    rotation_degrees: u32,
) -> Result<Frame> {
    let (rgba, width, height) = match layout {
        SourceLayout::Nv12 => (nv12_to_rgba(data, width, height)?, width, height),
        SourceLayout::Yuyv => (yuyv_to_rgba(data, width, height)?, width, height),
        SourceLayout::Mjpeg => mjpeg_to_rgba(data)?,
        SourceLayout::Rgb => (rgb_like_to_rgba(data, width, height, false)?, width, height),
        SourceLayout::Bgr => (rgb_like_to_rgba(data, width, height, true)?, width, height),
        SourceLayout::Gray => (gray_to_rgba(data, width, height)?, width, height),
    };

    if width == 0 || height == 0 {
        return Err(anyhow!("capture produced an empty {width}x{height} frame"));
    }
    Ok(Frame::new(rgba, width, height, rotation_degrees))
}

#[cfg(feature = "camera-nokhwa")]
pub fn layout_of(format: nokhwa::utils::FrameFormat) -> SourceLayout {
    use nokhwa::utils::FrameFormat;

    match format {
        FrameFormat::NV12 => SourceLayout::Nv12,
        FrameFormat::YUYV => SourceLayout::Yuyv,
        FrameFormat::MJPEG => SourceLayout::Mjpeg,
        FrameFormat::RAWRGB => SourceLayout::Rgb,
        FrameFormat::RAWBGR => SourceLayout::Bgr,
        FrameFormat::GRAY => SourceLayout::Gray,
    }
}

fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let y_plane_len = width as usize * height as usize;
    let uv_plane_len = y_plane_len / 2;

    if data.len() < y_plane_len + uv_plane_len {
        return Err(anyhow!(
            "NV12 buffer too small: got {}, expected {}",
            data.len(),
            y_plane_len + uv_plane_len
        ));
    }

    let mut rgba = vec![0u8; y_plane_len * 4];
    let image = YuvBiPlanarImage {
        y_plane: &data[..y_plane_len],
        y_stride: width,
        uv_plane: &data[y_plane_len..y_plane_len + uv_plane_len],
        uv_stride: width,
        width,
        height,
    };

    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12 to RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize * 2;
    if data.len() < expected_len {
        return Err(anyhow!(
            "YUYV buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }

    let mut rgba = vec![0u8; (width as usize * height as usize) * 4];
    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };

    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422 to RGBA failed: {err:?}"))?;

    Ok(rgba)
}

/// Dimensions come from the JPEG header, not the driver's resolution.
fn mjpeg_to_rgba(data: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let mut rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("MJPEG decoder returned no header info"))?;
    let width = u32::try_from(info.width).map_err(|_| anyhow!("MJPEG width out of range"))?;
    let height = u32::try_from(info.height).map_err(|_| anyhow!("MJPEG height out of range"))?;
    let expected_len = usize::try_from(width)
        .and_then(|w| usize::try_from(height).map(|h| w * h * 4))
        .map_err(|_| anyhow!("MJPEG dimensions do not fit usize"))?;
    if rgba.len() < expected_len {
        return Err(anyhow!(
            "MJPEG decode produced too few bytes: got {}, expected {}",
            rgba.len(),
            expected_len
        ));
    }
    rgba.truncate(expected_len);

    Ok((rgba, width, height))
}

fn rgb_like_to_rgba(data: &[u8], width: u32, height: u32, swap_rb: bool) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize * 3;
    if data.len() < expected_len {
        return Err(anyhow!(
            "RGB buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }

    let mut rgba = vec![0u8; (width as usize * height as usize) * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_chunks_exact(3))
        .for_each(|(dst, src)| {
            if swap_rb {
                dst[0] = src[2];
                dst[1] = src[1];
                dst[2] = src[0];
            } else {
                dst[..3].copy_from_slice(src);
            }
            dst[3] = 255;
        });

    Ok(rgba)
}

fn gray_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize;
    if data.len() < expected_len {
        return Err(anyhow!(
            "GRAY buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }

    let mut rgba = vec![0u8; expected_len * 4];
    rgba.par_chunks_mut(4)
        .zip(data[..expected_len].par_iter().copied())
        .for_each(|(dst, value)| {
            dst[..3].fill(value);
            dst[3] = 255;
        });

    Ok(rgba)
}
