//! # Asset Cache
//!
//! Loads and decodes images once per source string and shares the decoded
//! pixmaps read-only.
//!
//! ## Responsibilities
//! - **Loading**: the only place that performs I/O, through an [`AssetLoader`].
//! - **Decoding**: any format the `image` crate reads, converted to a
//!   premultiplied `tiny_skia::Pixmap`.
//! - **Sharing**: entries are `Arc<Pixmap>`; drawing code copies before
//!   applying filters, so a cached image is never mutated.
//! - **Timeouts**: [`TimeoutLoader`] bounds how long one load may block.
//!
//! Failures are cached too, so a broken asset referenced by every row of a
//! batch is fetched once rather than once per row. Each source has its own
//! slot: concurrent first requests for the same source wait on one load
//! while loads of other sources proceed.

use crate::error::AssetError;
use crate::AssetLoader;
use crossbeam_channel::RecvTimeoutError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;
use tiny_skia::{ColorU8, Pixmap};

type Entry = Result<Arc<Pixmap>, AssetError>;
type Slot = Arc<OnceLock<Entry>>;

#[derive(Clone)]
pub struct ImageCache {
    loader: Arc<dyn AssetLoader>,
    entries: Arc<Mutex<HashMap<String, Slot>>>,
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("entries", &self.len())
            .finish()
    }
}

impl ImageCache {
    pub fn new(loader: Arc<dyn AssetLoader>) -> Self {
        Self {
            loader,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn loader(&self) -> Arc<dyn AssetLoader> {
        self.loader.clone()
    }

    /// Returns the decoded image for `source`, loading it on first use.
    ///
    /// The map lock is held only to find the slot; the load itself runs
    /// under the slot, so callers racing on one source share one fetch.
    pub fn load(&self, source: &str) -> Result<Arc<Pixmap>, AssetError> {
        let slot = self.lock().entry(source.to_string()).or_default().clone();
        slot.get_or_init(|| {
            let entry = fetch(self.loader.as_ref(), source).map(Arc::new);
            if let Err(err) = &entry {
                tracing::warn!("{}", err);
            }
            entry
        })
        .clone()
    }

    /// Cached result for `source`, without loading. A load still in
    /// progress counts as absent.
    pub fn get(&self, source: &str) -> Option<Entry> {
        self.lock().get(source).and_then(|slot| slot.get().cloned())
    }

    /// Stores a result produced elsewhere (e.g. by a background load).
    pub fn insert(&self, source: impl Into<String>, entry: Entry) {
        self.lock().insert(source.into(), Arc::new(OnceLock::from(entry)));
    }

    /// Drops the entry for `source` so the next [`ImageCache::load`] retries.
    pub fn forget(&self, source: &str) {
        self.lock().remove(source);
    }

    /// Number of sources with a finished result.
    pub fn len(&self) -> usize {
        self.lock().values().filter(|slot| slot.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Loads and decodes `source` without touching any cache.
pub fn fetch(loader: &dyn AssetLoader, source: &str) -> Result<Pixmap, AssetError> {
    let bytes = loader.load_bytes(source).map_err(|err| match err.downcast::<AssetError>() {
        Ok(asset_err) => asset_err,
        Err(err) => AssetError::Load {
            source_ref: source.to_string(),
            reason: format!("{:#}", err),
        },
    })?;
    decode(source, &bytes)
}

/// Decodes encoded image bytes into a premultiplied pixmap.
pub fn decode(source: &str, bytes: &[u8]) -> Result<Pixmap, AssetError> {
    let decode_err = |reason: String| AssetError::Decode {
        source_ref: source.to_string(),
        reason,
    };

    let rgba = image::load_from_memory(bytes)
        .map_err(|e| decode_err(e.to_string()))?
        .to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| decode_err(format!("unsupported dimensions {}x{}", width, height)))?;

    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(rgba.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Ok(pixmap)
}

/// Fails any load that takes longer than `timeout`.
///
/// The inner load runs on its own thread; on timeout the caller gets an
/// [`AssetError::Timeout`] and the thread's eventual result is dropped.
pub struct TimeoutLoader {
    inner: Arc<dyn AssetLoader>,
    timeout: Duration,
}

impl TimeoutLoader {
    pub fn new(inner: Arc<dyn AssetLoader>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl AssetLoader for TimeoutLoader {
    fn load_bytes(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let inner = self.inner.clone();
        let owned = path.to_string();
        std::thread::Builder::new()
            .name("asset-load".to_string())
            .spawn(move || {
                let _ = tx.send(inner.load_bytes(&owned));
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(AssetError::Timeout {
                source_ref: path.to_string(),
                millis: self.timeout.as_millis() as u64,
            }
            .into()),
            Err(RecvTimeoutError::Disconnected) => {
                anyhow::bail!("Loader thread for '{}' exited without a result", path)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    struct MockLoader {
        calls: AtomicUsize,
        bytes: Vec<u8>,
    }

    impl AssetLoader for MockLoader {
        fn load_bytes(&self, path: &str) -> anyhow::Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if path.starts_with("missing") {
                anyhow::bail!("no such file");
            }
            Ok(self.bytes.clone())
        }
    }

    struct SlowLoader;

    impl AssetLoader for SlowLoader {
        fn load_bytes(&self, _path: &str) -> anyhow::Result<Vec<u8>> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_image_caching() {
        let loader = Arc::new(MockLoader {
            calls: AtomicUsize::new(0),
            bytes: png_bytes(4, 3, [255, 0, 0, 255]),
        });
        let cache = ImageCache::new(loader.clone());

        let a = cache.load("seal.png").unwrap();
        let b = cache.load("seal.png").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!((a.width(), a.height()), (4, 3));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1, "Should only load once for same path");

        cache.load("other.png").unwrap();
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2, "Should load new path");
    }

    #[test]
    fn failures_are_cached_until_forgotten() {
        let loader = Arc::new(MockLoader {
            calls: AtomicUsize::new(0),
            bytes: Vec::new(),
        });
        let cache = ImageCache::new(loader.clone());

        assert!(matches!(cache.load("missing.png"), Err(AssetError::Load { .. })));
        assert!(cache.load("missing.png").is_err());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);

        cache.forget("missing.png");
        assert!(cache.load("missing.png").is_err());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_first_loads_share_one_fetch() {
        struct CountingLoader {
            calls: AtomicUsize,
            bytes: Vec<u8>,
        }

        impl AssetLoader for CountingLoader {
            fn load_bytes(&self, _path: &str) -> anyhow::Result<Vec<u8>> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(100));
                Ok(self.bytes.clone())
            }
        }

        let loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
            bytes: png_bytes(2, 2, [0, 0, 255, 255]),
        });
        let cache = ImageCache::new(loader.clone());
        let barrier = std::sync::Barrier::new(8);

        let images: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        cache.load("bg.png").unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert!(images.iter().all(|img| Arc::ptr_eq(img, &images[0])));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let loader = Arc::new(MockLoader {
            calls: AtomicUsize::new(0),
            bytes: b"not an image".to_vec(),
        });
        let cache = ImageCache::new(loader);
        assert!(matches!(cache.load("x.png"), Err(AssetError::Decode { .. })));
    }

    #[test]
    fn decode_premultiplies() {
        let pixmap = decode("half.png", &png_bytes(1, 1, [200, 100, 0, 128])).unwrap();
        let px = pixmap.pixels()[0];
        assert_eq!(px.alpha(), 128);
        assert!(px.red() <= 101 && px.red() >= 99);
    }

    #[test]
    fn timeout_loader_gives_up() {
        let loader = TimeoutLoader::new(Arc::new(SlowLoader), Duration::from_millis(20));
        let err = loader.load_bytes("slow.png").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AssetError>(),
            Some(AssetError::Timeout { millis: 20, .. })
        ));

        let cache = ImageCache::new(Arc::new(loader));
        assert!(matches!(cache.load("slow.png"), Err(AssetError::Timeout { .. })));
    }
}
