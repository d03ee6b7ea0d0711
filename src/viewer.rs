use std::sync::Arc;

use ab_glyph::FontVec;
use anyhow::{Result, anyhow};
use crossbeam_channel::Receiver;
use image::RgbaImage;
use minifb::{Key, KeyRepeat, Window, WindowOptions};

use crate::{
    pipeline::{
        overlay::{OverlayRenderer, OverlayState, OverlayToggles},
        skeleton::RgbaCanvas,
    },
    types::{PoseUpdate, PreviewImage},
};

const TARGET_FPS: usize = 60;

/// Flips the toggle bound to `key`. Returns false for unbound keys.
pub fn apply_key(toggles: &mut OverlayToggles, key: Key) -> bool {
    match key {
        Key::D => toggles.debug = !toggles.debug,
        Key::L => toggles.labels = !toggles.labels,
        Key::B => toggles.background = !toggles.background,
        _ => return false,
    }
    true
}

/// Letterboxed preview at the current window size. Rebuilt only when a new
/// preview arrives or the window is resized.
#[derive(Default)]
struct Backdrop {
    image: Option<RgbaImage>,
    rebuilds: u64,
}

impl Backdrop {
    fn invalidate(&mut self) {
        self.image = None;
    }

    fn get(&mut self, preview: Option<&PreviewImage>, width: u32, height: u32) -> &RgbaImage {
        let stale = self
            .image
            .as_ref()
            .is_none_or(|image| image.dimensions() != (width, height));
        if stale {
            let mut canvas = RgbaCanvas::new(width, height);
            if let Some(preview) = preview {
                if let Err(err) = canvas.blit_letterboxed(preview) {
                    log::warn!("failed to draw preview: {err:?}");
                }
            }
            self.rebuilds += 1;
            self.image = Some(canvas.into_image());
        }
        self.image.get_or_insert_with(|| RgbaImage::new(width, height))
    }
}

/// Desktop render surface: camera preview with the pose overlay on top.
pub struct LiveViewer {
    window: Window,
    renderer: OverlayRenderer,
    state: OverlayState,
    font: Option<Arc<FontVec>>,
    preview: Option<PreviewImage>,
    backdrop: Backdrop,
}

impl LiveViewer {
    pub fn new(
        title: &str,
        width: usize,
        height: usize,
        toggles: OverlayToggles,
        font: Option<Arc<FontVec>>,
    ) -> Result<Self> {
        let mut window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: true,
                ..WindowOptions::default()
            },
        )
        .map_err(|err| anyhow!("failed to create window: {err}"))?;
        window.set_target_fps(TARGET_FPS);

        Ok(Self {
            window,
            renderer: OverlayRenderer::default(),
            state: OverlayState::new(toggles),
            font,
            preview: None,
            backdrop: Backdrop::default(),
        })
    }

    /// Runs until the window is closed or Esc is pressed.
    pub fn run(
        mut self,
        preview_rx: Receiver<PreviewImage>,
        update_rx: Receiver<PoseUpdate>,
    ) -> Result<()> {
        while self.window.is_open() && !self.window.is_key_down(Key::Escape) {
            while let Ok(preview) = preview_rx.try_recv() {
                self.preview = Some(preview);
                self.backdrop.invalidate();
            }
            while let Ok(update) = update_rx.try_recv() {
                self.state.update(update);
            }
            for key in self.window.get_keys_pressed(KeyRepeat::No) {
                if apply_key(&mut self.state.toggles, key) {
                    log::info!("overlay toggles now {:?}", self.state.toggles);
                }
            }

            self.present()?;
        }
        Ok(())
    }

    /// Window size is read every frame, so resizing changes the view
    /// geometry without waiting for a new camera frame.
    fn present(&mut self) -> Result<()> {
        let (width, height) = self.window.get_size();
        if width == 0 || height == 0 {
            self.window.update();
            return Ok(());
        }

        let backdrop = self
            .backdrop
            .get(self.preview.as_ref(), width as u32, height as u32)
            .clone();
        let mut canvas = RgbaCanvas::from_image(backdrop).with_font(self.font.clone());
        let view = canvas.view();
        self.state.render(&self.renderer, &mut canvas, view);

        self.window
            .update_with_buffer(&canvas.to_argb(), width, height)
            .map_err(|err| anyhow!("failed to update window: {err}"))
    }
}
