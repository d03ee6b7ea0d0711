use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use ab_glyph::FontVec;
use anyhow::{Context, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

/// Release assets that carry the label font.
pub const FONT_ASSETS_URL: &str = "https://github.com/ultralytics/assets/releases/download/v0.0.0";
pub const FONT_FILENAME: &str = "Arial.ttf";
pub const DEFAULT_MODEL_FILENAME: &str = "movenet_singlepose_lightning.onnx";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetKind {
    PoseModel,
    LabelFont,
}

impl AssetKind {
    fn label(self) -> &'static str {
        match self {
            AssetKind::PoseModel => "pose model",
            AssetKind::LabelFont => "label font",
        }
    }
}

#[derive(Clone, Debug)]
pub enum AssetEvent {
    AlreadyPresent {
        asset: AssetKind,
    },
    Started {
        asset: AssetKind,
        total: Option<u64>,
    },
    Progress {
        asset: AssetKind,
        downloaded: u64,
        total: Option<u64>,
    },
    Finished {
        asset: AssetKind,
    },
}

pub fn default_model_path() -> PathBuf {
    PathBuf::from("models").join(DEFAULT_MODEL_FILENAME)
}

pub fn default_font_path() -> PathBuf {
    PathBuf::from("assets").join(FONT_FILENAME)
}

pub fn default_font_url() -> String {
    format!("{FONT_ASSETS_URL}/{FONT_FILENAME}")
}

/// Makes sure `path` exists, downloading it from `url` when it is missing.
/// Without a URL a missing file is an error.
pub fn ensure_asset_ready<F>(
    asset: AssetKind,
    path: &Path,
    url: Option<&str>,
    mut on_event: F,
) -> anyhow::Result<()>
where
    F: FnMut(AssetEvent),
{
    if path.exists() {
        on_event(AssetEvent::AlreadyPresent { asset });
        on_event(AssetEvent::Finished { asset });
        return Ok(());
    }

    let Some(url) = url else {
        return Err(anyhow!(
            "{} not found at {} and no download URL configured",
            asset.label(),
            path.display()
        ));
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let mut progress: Option<ProgressBar> = None;
    download_to_path(asset, url, path, &mut |event| {
        match &event {
            AssetEvent::Started { total, .. } => {
                progress = Some(create_progress_bar(*total, asset));
            }
            AssetEvent::Progress { downloaded, .. } => {
                if let Some(pb) = progress.as_ref() {
                    pb.set_position(*downloaded);
                }
            }
            AssetEvent::Finished { .. } => {
                if let Some(pb) = progress.take() {
                    pb.finish_with_message(format!("{} ready", asset.label()));
                }
            }
            AssetEvent::AlreadyPresent { .. } => {}
        }
        on_event(event);
    })
    .with_context(|| format!("failed to download {} to {}", asset.label(), path.display()))
}

fn download_to_path<F>(
    asset: AssetKind,
    url: &str,
    dest: &Path,
    on_event: &mut F,
) -> anyhow::Result<()>
where
    F: FnMut(AssetEvent),
{
    log::info!("downloading {} from {url} to {}", asset.label(), dest.display());

    let client = Client::new();
    let mut response = client
        .get(url)
        .send()
        .context("failed to start download")?
        .error_for_status()
        .context("download returned error status")?;

    let total_size = response.content_length();
    on_event(AssetEvent::Started {
        asset,
        total: total_size,
    });

    let tmp_path = dest.with_extension("download");
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 16 * 1024];
    loop {
        let bytes_read = response
            .read(&mut buffer)
            .context("failed while reading download bytes")?;
        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .context("failed while writing download to disk")?;
        downloaded += bytes_read as u64;
        on_event(AssetEvent::Progress {
            asset,
            downloaded,
            total: total_size,
        });
    }

    file.sync_all()
        .context("failed to flush download to disk")?;
    fs::rename(&tmp_path, dest).with_context(|| {
        format!(
            "failed to move {} into place at {}",
            tmp_path.display(),
            dest.display()
        )
    })?;

    on_event(AssetEvent::Finished { asset });
    Ok(())
}

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})";

fn create_progress_bar(total_size: Option<u64>, asset: AssetKind) -> ProgressBar {
    match total_size {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
                pb.set_style(style);
            }
            pb.set_message(format!("downloading {}", asset.label()));
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }
    }
}

pub fn load_font(path: &Path) -> anyhow::Result<FontVec> {
    let bytes = fs::read(path).with_context(|| format!("failed to read font {}", path.display()))?;
    FontVec::try_from_vec(bytes).map_err(|err| anyhow!("invalid font {}: {err}", path.display()))
}

/// Label text is optional: any failure here leaves the overlay without text.
pub fn prepare_font(path: &Path, url: Option<&str>) -> Option<Arc<FontVec>> {
    let result =
        ensure_asset_ready(AssetKind::LabelFont, path, url, |_| {}).and_then(|()| load_font(path));
    match result {
        Ok(font) => Some(Arc::new(font)),
        Err(err) => {
            log::warn!("labels disabled, no usable font: {err:?}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pose-overlay-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn present_asset_is_not_downloaded() {
        let dir = scratch_dir("present");
        let path = dir.join("model.onnx");
        fs::write(&path, b"onnx").unwrap();

        let mut events = Vec::new();
        ensure_asset_ready(AssetKind::PoseModel, &path, None, |evt| events.push(evt)).unwrap();
        assert!(matches!(events[0], AssetEvent::AlreadyPresent { .. }));
        assert!(matches!(events[1], AssetEvent::Finished { .. }));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_asset_without_url_is_an_error() {
        let dir = scratch_dir("missing");
        let path = dir.join("nope.onnx");
        let err = ensure_asset_ready(AssetKind::PoseModel, &path, None, |_| {}).unwrap_err();
        assert!(err.to_string().contains("no download URL"));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn invalid_font_disables_labels() {
        let dir = scratch_dir("font");
        let path = dir.join("broken.ttf");
        fs::write(&path, b"not a font").unwrap();
        assert!(prepare_font(&path, None).is_none());
        fs::remove_dir_all(&dir).unwrap();
    }
}
