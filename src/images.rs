//! Image loading with SVG support and a memory cache sized from the platform
//! memory budget.

#[cfg(feature = "gui")]
use eframe::egui;
use log::{debug, info, warn};
use moka::sync::Cache;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;

use crate::platform::{Platform, PlatformError};

/// Share of the platform memory budget the decoded-image cache may use.
pub const MEMORY_CACHE_PERCENT: f64 = 0.25;
pub const DEFAULT_CROSSFADE: Duration = Duration::from_millis(200);
/// Longest edge an SVG is rasterized at. Larger documents are scaled down.
pub const MAX_SVG_EDGE: u32 = 4096;

static DEFAULT_LOADER: OnceLock<Arc<ImageLoader>> = OnceLock::new();

#[derive(Debug, Error)]
pub enum ImageLoadError {
    #[error("cannot read image {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("no decoder accepts '{0}'")]
    Unsupported(String),
    #[error("cannot decode '{key}': {message}")]
    Decode { key: String, message: String },
    #[error("a default image loader is already installed")]
    AlreadyInstalled,
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Decoded pixels, RGBA8 with straight alpha.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl DecodedImage {
    pub fn byte_size(&self) -> usize {
        self.rgba.len()
    }

    #[cfg(feature = "gui")]
    pub fn to_color_image(&self) -> egui::ColorImage {
        egui::ColorImage::from_rgba_unmultiplied([self.width as usize, self.height as usize], &self.rgba)
    }
}

pub trait Decoder: Send + Sync {
    fn name(&self) -> &'static str;
    fn handles(&self, key: &str, bytes: &[u8]) -> bool;
    fn decode(&self, key: &str, bytes: &[u8]) -> Result<DecodedImage, ImageLoadError>;
}

pub struct SvgDecoder;

impl Decoder for SvgDecoder {
    fn name(&self) -> &'static str {
        "svg"
    }

    fn handles(&self, key: &str, bytes: &[u8]) -> bool {
        if key.to_ascii_lowercase().ends_with(".svg") {
            return true;
        }
        let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
        let head = head.trim_start();
        head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg"))
    }

    fn decode(&self, key: &str, bytes: &[u8]) -> Result<DecodedImage, ImageLoadError> {
        use resvg::{tiny_skia, usvg};

        let decode_err = |message: String| ImageLoadError::Decode {
            key: key.to_string(),
            message,
        };
        let tree = usvg::Tree::from_data(bytes, &usvg::Options::default())
            .map_err(|err| decode_err(err.to_string()))?;
        let size = tree.size();
        let scale = (MAX_SVG_EDGE as f32 / size.width().max(size.height())).min(1.0);
        let edge = |len: f32| ((len * scale).round() as u32).clamp(1, MAX_SVG_EDGE);
        let (width, height) = (edge(size.width()), edge(size.height()));
        if scale < 1.0 {
            debug!(
                "[Images] {} is {}x{}, rendering at {}x{}",
                key,
                size.width(),
                size.height(),
                width,
                height
            );
        }
        let mut pixmap = tiny_skia::Pixmap::new(width, height)
            .ok_or_else(|| decode_err(format!("invalid size {width}x{height}")))?;
        resvg::render(&tree, tiny_skia::Transform::from_scale(scale, scale), &mut pixmap.as_mut());

        let mut rgba = Vec::with_capacity(pixmap.data().len());
        for pixel in pixmap.pixels() {
            let c = pixel.demultiply();
            rgba.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        Ok(DecodedImage { width, height, rgba })
    }
}

/// Everything the `image` crate can guess a format for.
pub struct RasterDecoder;

impl Decoder for RasterDecoder {
    fn name(&self) -> &'static str {
        "raster"
    }

    fn handles(&self, _key: &str, bytes: &[u8]) -> bool {
        image::guess_format(bytes).is_ok()
    }

    fn decode(&self, key: &str, bytes: &[u8]) -> Result<DecodedImage, ImageLoadError> {
        let img = image::load_from_memory(bytes).map_err(|err| ImageLoadError::Decode {
            key: key.to_string(),
            message: err.to_string(),
        })?;
        let rgba = img.to_rgba8();
        Ok(DecodedImage {
            width: rgba.width(),
            height: rgba.height(),
            rgba: rgba.into_raw(),
        })
    }
}

pub struct ImageLoader {
    decoders: Vec<Box<dyn Decoder>>,
    cache: Cache<String, Arc<DecodedImage>>,
    memory_cache_max_bytes: u64,
    crossfade: Option<Duration>,
}

impl fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageLoader")
            .field("decoders", &self.decoder_names())
            .field("memory_cache_max_bytes", &self.memory_cache_max_bytes)
            .field("crossfade", &self.crossfade)
            .finish()
    }
}

pub struct ImageLoaderBuilder {
    components: Vec<Box<dyn Decoder>>,
    memory_budget: u64,
    memory_cache_percent: f64,
    crossfade: Option<Duration>,
}

impl ImageLoaderBuilder {
    pub fn new(memory_budget: u64) -> Self {
        Self {
            components: Vec::new(),
            memory_budget,
            memory_cache_percent: MEMORY_CACHE_PERCENT,
            crossfade: None,
        }
    }

    /// Registers a decoder ahead of the default raster decoder.
    pub fn component(mut self, decoder: impl Decoder + 'static) -> Self {
        self.components.push(Box::new(decoder));
        self
    }

    pub fn memory_cache_percent(mut self, percent: f64) -> Self {
        self.memory_cache_percent = percent.clamp(0.0, 1.0);
        self
    }

    pub fn crossfade(mut self, enabled: bool) -> Self {
        self.crossfade = enabled.then_some(DEFAULT_CROSSFADE);
        self
    }

    pub fn crossfade_duration(mut self, duration: Duration) -> Self {
        self.crossfade = Some(duration);
        self
    }

    pub fn build(self) -> ImageLoader {
        let mut decoders = self.components;
        decoders.push(Box::new(RasterDecoder));

        let max_bytes = (self.memory_budget as f64 * self.memory_cache_percent).floor() as u64;
        let cache = Cache::builder()
            .max_capacity(max_bytes)
            .weigher(|_key: &String, image: &Arc<DecodedImage>| -> u32 {
                image.byte_size().try_into().unwrap_or(u32::MAX)
            })
            .build();
        info!(
            "[Images] Memory cache bounded to {} bytes of a {} byte budget",
            max_bytes, self.memory_budget
        );

        ImageLoader {
            decoders,
            cache,
            memory_cache_max_bytes: max_bytes,
            crossfade: self.crossfade,
        }
    }
}

impl ImageLoader {
    pub fn builder(memory_budget: u64) -> ImageLoaderBuilder {
        ImageLoaderBuilder::new(memory_budget)
    }

    pub fn decoder_names(&self) -> Vec<&'static str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }

    pub fn memory_cache_max_bytes(&self) -> u64 {
        self.memory_cache_max_bytes
    }

    pub fn crossfade(&self) -> Option<Duration> {
        self.crossfade
    }

    pub fn cached(&self, key: &str) -> Option<Arc<DecodedImage>> {
        self.cache.get(key)
    }

    pub fn clear_memory_cache(&self) {
        self.cache.invalidate_all();
    }

    pub fn load(&self, path: &Path) -> Result<Arc<DecodedImage>, ImageLoadError> {
        let key = path.to_string_lossy().into_owned();
        if let Some(hit) = self.cache.get(&key) {
            debug!("[Images] Memory cache hit for {}", key);
            return Ok(hit);
        }
        let bytes = fs::read(path).map_err(|source| ImageLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.decode_and_cache(key, &bytes)
    }

    pub fn load_bytes(&self, key: &str, bytes: &[u8]) -> Result<Arc<DecodedImage>, ImageLoadError> {
        if let Some(hit) = self.cache.get(key) {
            debug!("[Images] Memory cache hit for {}", key);
            return Ok(hit);
        }
        self.decode_and_cache(key.to_string(), bytes)
    }

    fn decode_and_cache(&self, key: String, bytes: &[u8]) -> Result<Arc<DecodedImage>, ImageLoadError> {
        let decoder = self
            .decoders
            .iter()
            .find(|d| d.handles(&key, bytes))
            .ok_or_else(|| ImageLoadError::Unsupported(key.clone()))?;
        let image = Arc::new(decoder.decode(&key, bytes)?);
        debug!(
            "[Images] Decoded {} with '{}' ({}x{})",
            key,
            decoder.name(),
            image.width,
            image.height
        );
        self.cache.insert(key, Arc::clone(&image));
        Ok(image)
    }
}

/// Loader with an SVG decoder, a 25% memory cache and cross-fade enabled.
pub fn new_image_loader(platform: &Platform) -> Result<ImageLoader, ImageLoadError> {
    let budget = platform.memory_budget()?;
    Ok(ImageLoader::builder(budget)
        .component(SvgDecoder)
        .memory_cache_percent(MEMORY_CACHE_PERCENT)
        .crossfade(true)
        .build())
}

/// Installs the process-wide default loader. Only the first call succeeds.
pub fn set_default(loader: ImageLoader) -> Result<Arc<ImageLoader>, ImageLoadError> {
    let loader = Arc::new(loader);
    match DEFAULT_LOADER.set(Arc::clone(&loader)) {
        Ok(()) => Ok(loader),
        Err(_) => {
            warn!("[Images] Default image loader already installed");
            Err(ImageLoadError::AlreadyInstalled)
        }
    }
}

pub fn default_loader() -> Option<Arc<ImageLoader>> {
    DEFAULT_LOADER.get().cloned()
}
