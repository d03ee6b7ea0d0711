use crate::types::{CoordinateSpace, FrameContext, Keypoint, ViewGeometry};

/// Aspect-preserving fit of a source area into a view: uniform scale plus
/// centering offsets.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl ViewTransform {
    pub fn fit(source_width: f32, source_height: f32, view: ViewGeometry) -> Self {
        if source_width <= 0.0 || source_height <= 0.0 {
            return Self {
                scale: 1.0,
                offset_x: 0.0,
                offset_y: 0.0,
            };
        }

        let scale = (view.view_width / source_width).min(view.view_height / source_height);
        Self {
            scale,
            offset_x: (view.view_width - source_width * scale) / 2.0,
            offset_y: (view.view_height - source_height * scale) / 2.0,
        }
    }

    pub fn for_context(context: &FrameContext, view: ViewGeometry) -> Self {
        Self::fit(
            context.source_width as f32,
            context.source_height as f32,
            view,
        )
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.scale + self.offset_x, y * self.scale + self.offset_y)
    }
}

/// Maps keypoints into view space. Normalized positions are first scaled to
/// source pixels.
pub fn map_keypoints(
    keypoints: &[Keypoint],
    context: &FrameContext,
    space: CoordinateSpace,
    view: ViewGeometry,
) -> Vec<Keypoint> {
    let transform = ViewTransform::for_context(context, view);
    let (sx, sy) = match space {
        CoordinateSpace::Pixel => (1.0, 1.0),
        CoordinateSpace::Normalized => (
            context.source_width as f32,
            context.source_height as f32,
        ),
    };

    keypoints
        .iter()
        .map(|kp| {
            let position = transform.apply(kp.x() * sx, kp.y() * sy);
            Keypoint { position, ..*kp }
        })
        .collect()
}
