use std::sync::Arc;

use ab_glyph::{FontVec, PxScale};
use fast_image_resize as fir;
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_text_mut;

use super::{
    encoder::rotate_upright,
    mapper::ViewTransform,
    overlay::{Canvas, Color},
};
use crate::types::{BodyPart, PreviewImage, ViewGeometry};

pub const SKELETON_EDGES: &[(BodyPart, BodyPart)] = &[
    (BodyPart::Nose, BodyPart::LeftEye),
    (BodyPart::Nose, BodyPart::RightEye),
    (BodyPart::LeftEye, BodyPart::LeftEar),
    (BodyPart::RightEye, BodyPart::RightEar),
    (BodyPart::Nose, BodyPart::LeftShoulder),
    (BodyPart::Nose, BodyPart::RightShoulder),
    (BodyPart::LeftShoulder, BodyPart::LeftElbow),
    (BodyPart::LeftElbow, BodyPart::LeftWrist),
    (BodyPart::RightShoulder, BodyPart::RightElbow),
    (BodyPart::RightElbow, BodyPart::RightWrist),
    (BodyPart::LeftShoulder, BodyPart::RightShoulder),
    (BodyPart::LeftShoulder, BodyPart::LeftHip),
    (BodyPart::RightShoulder, BodyPart::RightHip),
    (BodyPart::LeftHip, BodyPart::RightHip),
    (BodyPart::LeftHip, BodyPart::LeftKnee),
    (BodyPart::LeftKnee, BodyPart::LeftAnkle),
    (BodyPart::RightHip, BodyPart::RightKnee),
    (BodyPart::RightKnee, BodyPart::RightAnkle),
];

const SHADOW: Color = [0, 0, 0, 255];
const SHADOW_OFFSET: i32 = 2;

/// Software render surface over an RGBA8 buffer.
pub struct RgbaCanvas {
    image: RgbaImage,
    font: Option<Arc<FontVec>>,
}

impl RgbaCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255])),
            font: None,
        }
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self { image, font: None }
    }

    pub fn with_font(mut self, font: Option<Arc<FontVec>>) -> Self {
        self.font = font;
        self
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn view(&self) -> ViewGeometry {
        ViewGeometry::new(self.image.width() as f32, self.image.height() as f32)
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x < self.image.width() && y < self.image.height() {
            Some(self.image.get_pixel(x, y).0)
        } else {
            None
        }
    }

    /// Packs the buffer as `0x00RRGGBB` words for window backends.
    pub fn to_argb(&self) -> Vec<u32> {
        self.image
            .pixels()
            .map(|px| ((px[0] as u32) << 16) | ((px[1] as u32) << 8) | px[2] as u32)
            .collect()
    }

    /// Draws the camera image upright and letterboxed with the same fit the
    /// keypoints use, so the skeleton lines up with the picture.
    pub fn blit_letterboxed(&mut self, preview: &PreviewImage) -> anyhow::Result<()> {
        let (rgba, width, height) = rotate_upright(
            &preview.rgba,
            preview.width,
            preview.height,
            preview.rotation_degrees,
        )?;
        let transform = ViewTransform::fit(width as f32, height as f32, self.view());
        let new_w = (width as f32 * transform.scale).round().max(1.0) as u32;
        let new_h = (height as f32 * transform.scale).round().max(1.0) as u32;

        let src_image = fir::images::Image::from_vec_u8(width, height, rgba, fir::PixelType::U8x4)?;
        let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
        let mut resizer = fir::Resizer::new();
        let resize_options = fir::ResizeOptions::new()
            .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
        resizer.resize(&src_image, &mut dst_image, Some(&resize_options))?;
        let resized = dst_image.into_vec();

        let pad_x = transform.offset_x.round().max(0.0) as u32;
        let pad_y = transform.offset_y.round().max(0.0) as u32;
        let canvas_w = self.image.width();
        let canvas_h = self.image.height();
        for row in 0..new_h {
            let y = pad_y + row;
            if y >= canvas_h {
                break;
            }
            for col in 0..new_w {
                let x = pad_x + col;
                if x >= canvas_w {
                    break;
                }
                let idx = ((row * new_w + col) as usize) * 4;
                let px = [resized[idx], resized[idx + 1], resized[idx + 2], 255];
                self.image.put_pixel(x, y, Rgba(px));
            }
        }
        Ok(())
    }

    fn put_pixel_safe(&mut self, x: i32, y: i32, color: Color) {
        if x < 0 || y < 0 {
            return;
        }
        let (ux, uy) = (x as u32, y as u32);
        if ux >= self.image.width() || uy >= self.image.height() {
            return;
        }

        let alpha = color[3] as u32;
        if alpha == 255 {
            self.image.put_pixel(ux, uy, Rgba(color));
            return;
        }
        let dst = self.image.get_pixel_mut(ux, uy);
        for c in 0..3 {
            let blended = (color[c] as u32 * alpha + dst[c] as u32 * (255 - alpha)) / 255;
            dst[c] = blended as u8;
        }
    }
}

type Point = (f32, f32);

/// Liang-Barsky clip of a segment against the box `(min, max)`. Returns
/// `None` when nothing of the segment lies inside or an end is not finite.
fn clip_segment(from: Point, to: Point, (min, max): (Point, Point)) -> Option<(Point, Point)> {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    if ![from.0, from.1, dx, dy].iter().all(|v| v.is_finite()) {
        return None;
    }

    let mut t0 = 0.0f32;
    let mut t1 = 1.0f32;
    let edges = [
        (-dx, from.0 - min.0),
        (dx, max.0 - from.0),
        (-dy, from.1 - min.1),
        (dy, max.1 - from.1),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            t0 = t0.max(t);
        } else {
            t1 = t1.min(t);
        }
        if t0 > t1 {
            return None;
        }
    }

    Some((
        (from.0 + t0 * dx, from.1 + t0 * dy),
        (from.0 + t1 * dx, from.1 + t1 * dy),
    ))
}

impl Canvas for RgbaCanvas {
    fn fill_circle(&mut self, center: (f32, f32), radius: f32, color: Color) {
        if !(center.0.is_finite() && center.1.is_finite() && radius.is_finite()) {
            return;
        }
        let (cx, cy) = (center.0.round() as i32, center.1.round() as i32);
        let radius = radius.round().max(1.0) as i32;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.put_pixel_safe(cx + dx, cy + dy, color);
                }
            }
        }
    }

    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), thickness: f32, color: Color) {
        let radius = ((thickness.round() as i32).max(1) - 1) / 2;
        // Only the part of the segment that can touch the buffer is walked.
        let margin = (radius + 1) as f32;
        let bounds = (
            (-margin, -margin),
            (self.image.width() as f32 + margin, self.image.height() as f32 + margin),
        );
        let Some((from, to)) = clip_segment(from, to, bounds) else {
            return;
        };

        let (mut x0, mut y0) = (from.0 as i32, from.1 as i32);
        let (x1, y1) = (to.0 as i32, to.1 as i32);
        let dx = (x1 - x0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let dy = -(y1 - y0).abs();
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            self.put_pixel_safe(x0, y0, color);
            if radius > 0 {
                for ox in -radius..=radius {
                    for oy in -radius..=radius {
                        if ox == 0 && oy == 0 {
                            continue;
                        }
                        if ox.abs() + oy.abs() <= radius {
                            self.put_pixel_safe(x0 + ox, y0 + oy, color);
                        }
                    }
                }
            }
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Color) {
        let x0 = x.round() as i32;
        let y0 = y.round() as i32;
        let x1 = (x + width).round() as i32;
        let y1 = (y + height).round() as i32;
        for py in y0.max(0)..y1.min(self.image.height() as i32) {
            for px in x0.max(0)..x1.min(self.image.width() as i32) {
                self.put_pixel_safe(px, py, color);
            }
        }
    }

    fn text_with_shadow(&mut self, text: &str, at: (f32, f32), size: f32, color: Color) {
        let Some(font) = self.font.clone() else {
            return;
        };
        let scale = PxScale::from(size);
        // `at` is the baseline origin; imageproc positions glyphs by their top.
        let x = at.0.round() as i32;
        let y = (at.1 - size * 0.8).round() as i32;
        draw_text_mut(
            &mut self.image,
            Rgba(SHADOW),
            x + SHADOW_OFFSET,
            y + SHADOW_OFFSET,
            scale,
            &*font,
            text,
        );
        draw_text_mut(&mut self.image, Rgba(color), x, y, scale, &*font, text);
    }
}
