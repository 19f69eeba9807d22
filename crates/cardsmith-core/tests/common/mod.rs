#![allow(dead_code)]

use cardsmith_core::layer::FontWeight;
use cardsmith_core::{AssetLoader, FontBook};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Serves fixed byte blobs by path and counts calls. Unknown paths fail.
#[derive(Default)]
pub struct MockLoader {
    files: HashMap<String, Vec<u8>>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(path.to_string(), bytes);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AssetLoader for MockLoader {
    fn load_bytes(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        match self.files.get(path) {
            Some(bytes) => Ok(bytes.clone()),
            None => anyhow::bail!("no such asset: {}", path),
        }
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// DejaVu Sans, bundled so text tests never depend on system fonts.
pub const FIXTURE_FONT: &[u8] = include_bytes!("../fixtures/DejaVuSans.ttf");

pub fn fixture_fonts() -> FontBook {
    let mut fonts = FontBook::new();
    fonts
        .register("DejaVu Sans", FontWeight::NORMAL, FIXTURE_FONT)
        .unwrap();
    fonts
}
