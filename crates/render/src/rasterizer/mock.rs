use super::{Rasterizer, RenderedImage};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tome_storage::FileRef;

/// Rasterizer for tests: returns a small generated PNG and records every
/// call.
#[derive(Debug, Default)]
pub struct MockRasterizer {
    calls: AtomicUsize,
    requests: Mutex<Vec<(PathBuf, PathBuf)>>,
    delay: Option<Duration>,
    failing: AtomicBool,
}
impl MockRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every render takes this long, so concurrent requests overlap.
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Default::default() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(attachment, requesting document)` of every call, in call order.
    pub fn requests(&self) -> Vec<(PathBuf, PathBuf)> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// The image every render returns: a blue block on a white border.
    pub fn png() -> Vec<u8> {
        let mut canvas = RgbaImage::from_pixel(24, 16, Rgba([255, 255, 255, 255]));
        for x in 4..20 {
            for y in 4..12 {
                canvas.put_pixel(x, y, Rgba([0, 0, 255, 255]));
            }
        }
        let mut out = Cursor::new(Vec::new());
        match DynamicImage::ImageRgba8(canvas).write_to(&mut out, ImageFormat::Png) {
            Ok(()) => out.into_inner(),
            Err(e) => panic!("encoding mock render: {e}"),
        }
    }
}

#[async_trait]
impl Rasterizer for MockRasterizer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn render(&self, attachment: &FileRef, requesting: &Path) -> Result<RenderedImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((attachment.path.clone(), requesting.to_path_buf()));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::RasterizerFailed { program: "mock".to_string(), code: Some(1) });
        }
        Ok(RenderedImage { bytes: Self::png() })
    }
}
