//! Reference image shown behind the grid for tracing.
//!
//! The image is fitted to the square of the larger canvas side (keeping its
//! aspect ratio), centred on the canvas, then offset, rotated and scaled by
//! [`BackgroundTransform`]. Sampling works in canvas pixel space, the same
//! space the renderer draws in, and always treats the image as fully opaque
//! regardless of the display opacity.

use std::sync::Arc;

use image::{ImageError, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::components::colors::Color;

/// Opacity a freshly loaded reference image starts at.
pub const DEFAULT_IMAGE_OPACITY: f32 = 0.8;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackgroundTransform {
    /// Offset from the canvas centre, in canvas pixels.
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    /// Radians, clockwise in screen space.
    pub rotation: f64,
}

impl Default for BackgroundTransform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale: 1.0,
            rotation: 0.0,
        }
    }
}

/// Everything needed to bring a removed background back.
#[derive(Clone, Debug, PartialEq)]
pub struct BackgroundSnapshot {
    pub image: Arc<RgbaImage>,
    pub opacity: f32,
    pub transform: BackgroundTransform,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Background {
    image: Option<Arc<RgbaImage>>,
    /// Display opacity (0..=1). Never affects sampling.
    pub opacity: f32,
    pub transform: BackgroundTransform,
}

impl Default for Background {
    fn default() -> Self {
        Self::new()
    }
}

impl Background {
    pub fn new() -> Self {
        Self {
            image: None,
            opacity: 1.0,
            transform: BackgroundTransform::default(),
        }
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    pub fn image(&self) -> Option<&Arc<RgbaImage>> {
        self.image.as_ref()
    }

    /// Install a new reference image with a reset transform.
    pub fn set_image(&mut self, image: RgbaImage) {
        log::info!("background image set ({}x{})", image.width(), image.height());
        self.image = Some(Arc::new(image));
        self.transform = BackgroundTransform::default();
        self.opacity = DEFAULT_IMAGE_OPACITY;
    }

    /// Decode any format the `image` crate understands and install it.
    pub fn load_from_memory(&mut self, bytes: &[u8]) -> Result<(), ImageError> {
        let decoded = image::load_from_memory(bytes)?.into_rgba8();
        self.set_image(decoded);
        Ok(())
    }

    pub fn snapshot(&self) -> Option<BackgroundSnapshot> {
        self.image.as_ref().map(|image| BackgroundSnapshot {
            image: Arc::clone(image),
            opacity: self.opacity,
            transform: self.transform,
        })
    }

    /// Drop the image. Returns what was removed so it can be restored.
    pub fn remove(&mut self) -> Option<BackgroundSnapshot> {
        let snapshot = self.snapshot();
        self.image = None;
        self.opacity = 1.0;
        snapshot
    }

    pub fn restore(&mut self, snapshot: &BackgroundSnapshot) {
        self.image = Some(Arc::clone(&snapshot.image));
        self.opacity = snapshot.opacity;
        self.transform = snapshot.transform;
    }

    /// Sampler for a `grid_width x grid_height` grid of `cell_size` pixel
    /// cells. `None` when there is no image.
    pub fn sampler(&self, grid_width: u32, grid_height: u32, cell_size: u32) -> Option<BackgroundSampler> {
        let image = Arc::clone(self.image.as_ref()?);
        Some(BackgroundSampler::new(
            image,
            self.transform,
            grid_width as f64 * cell_size as f64,
            grid_height as f64 * cell_size as f64,
        ))
    }

    /// Eyedropper: opaque colour under the centre of cell (x, y).
    pub fn color_at_cell(&self, x: u32, y: u32, grid_width: u32, grid_height: u32, cell_size: u32) -> Option<Color> {
        let sampler = self.sampler(grid_width, grid_height, cell_size)?;
        let cs = cell_size as f64;
        let px = x as f64 * cs + cs / 2.0;
        let py = y as f64 * cs + cs / 2.0;
        let Rgba([r, g, b, a]) = sampler.sample(px, py)?;
        (a > 0).then(|| Color::from_rgb(r, g, b))
    }
}

/// Pixel lookup at canvas coordinates. Returns `None` where nothing is drawn.
pub trait ImageSource {
    fn sample(&self, x: f64, y: f64) -> Option<Rgba<u8>>;
}

/// Background image with its placement resolved for one canvas size.
#[derive(Clone, Debug)]
pub struct BackgroundSampler {
    image: Arc<RgbaImage>,
    center_x: f64,
    center_y: f64,
    base_width: f64,
    base_height: f64,
    cos: f64,
    sin: f64,
    scale: f64,
}

impl BackgroundSampler {
    pub fn new(image: Arc<RgbaImage>, transform: BackgroundTransform, canvas_width: f64, canvas_height: f64) -> Self {
        let canvas_size = canvas_width.max(canvas_height);
        let (iw, ih) = (image.width().max(1) as f64, image.height().max(1) as f64);
        let aspect = iw / ih;
        let (base_width, base_height) = if iw > ih {
            (canvas_size, canvas_size / aspect)
        } else {
            (canvas_size * aspect, canvas_size)
        };
        Self {
            image,
            center_x: canvas_width / 2.0 + transform.x,
            center_y: canvas_height / 2.0 + transform.y,
            base_width,
            base_height,
            cos: transform.rotation.cos(),
            sin: transform.rotation.sin(),
            scale: transform.scale,
        }
    }
}

impl ImageSource for BackgroundSampler {
    fn sample(&self, x: f64, y: f64) -> Option<Rgba<u8>> {
        if self.scale.abs() < f64::EPSILON {
            return None;
        }
        // Sample the centre of the canvas pixel containing (x, y)
        let dx = x.floor() + 0.5 - self.center_x;
        let dy = y.floor() + 0.5 - self.center_y;

        // Undo rotate, then scale
        let u = (dx * self.cos + dy * self.sin) / self.scale;
        let v = (-dx * self.sin + dy * self.cos) / self.scale;

        let fx = (u + self.base_width / 2.0) / self.base_width * self.image.width() as f64;
        let fy = (v + self.base_height / 2.0) / self.base_height * self.image.height() as f64;
        if fx < 0.0 || fy < 0.0 {
            return None;
        }
        let (ix, iy) = (fx as u32, fy as u32);
        if ix >= self.image.width() || iy >= self.image.height() {
            return None;
        }
        Some(*self.image.get_pixel(ix, iy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn quadrants() -> RgbaImage {
        RgbaImage::from_fn(2, 2, |x, y| match (x, y) {
            (0, 0) => Rgba([255, 0, 0, 255]),
            (1, 0) => Rgba([0, 255, 0, 255]),
            (0, 1) => Rgba([0, 0, 255, 255]),
            _ => Rgba([0, 0, 0, 0]),
        })
    }

    #[test]
    fn identity_transform_fits_square_canvas() {
        let sampler = BackgroundSampler::new(Arc::new(quadrants()), BackgroundTransform::default(), 20.0, 20.0);
        assert_eq!(sampler.sample(5.0, 5.0), Some(Rgba([255, 0, 0, 255])));
        assert_eq!(sampler.sample(15.0, 5.0), Some(Rgba([0, 255, 0, 255])));
        assert_eq!(sampler.sample(5.0, 15.0), Some(Rgba([0, 0, 255, 255])));
        assert_eq!(sampler.sample(-1.0, 5.0), None);
        assert_eq!(sampler.sample(20.0, 5.0), None);
    }

    #[test]
    fn offset_moves_the_image() {
        let transform = BackgroundTransform { x: 10.0, ..Default::default() };
        let sampler = BackgroundSampler::new(Arc::new(quadrants()), transform, 20.0, 20.0);
        assert_eq!(sampler.sample(5.0, 5.0), None);
        assert_eq!(sampler.sample(15.0, 5.0), Some(Rgba([255, 0, 0, 255])));
    }

    #[test]
    fn half_turn_swaps_quadrants() {
        let transform = BackgroundTransform {
            rotation: std::f64::consts::PI,
            ..Default::default()
        };
        let sampler = BackgroundSampler::new(Arc::new(quadrants()), transform, 20.0, 20.0);
        // Top-left now shows the bottom-right (transparent) pixel
        assert_eq!(sampler.sample(5.0, 5.0).map(|p| p.0[3]), Some(0));
        assert_eq!(sampler.sample(15.0, 15.0), Some(Rgba([255, 0, 0, 255])));
    }

    #[test]
    fn remove_and_restore_round_trip() {
        let mut bg = Background::new();
        assert!(bg.remove().is_none());
        bg.set_image(quadrants());
        assert_eq!(bg.opacity, DEFAULT_IMAGE_OPACITY);
        bg.transform.scale = 2.0;
        let before = bg.clone();

        let snapshot = bg.remove().unwrap();
        assert!(!bg.has_image());
        assert_eq!(bg.opacity, 1.0);
        bg.restore(&snapshot);
        assert_eq!(bg, before);
    }

    #[test]
    fn eyedropper_ignores_transparent_pixels() {
        let mut bg = Background::new();
        bg.set_image(quadrants());
        assert_eq!(bg.color_at_cell(0, 0, 2, 2, 10), Some(Color::from_rgb(255, 0, 0)));
        assert_eq!(bg.color_at_cell(1, 1, 2, 2, 10), None);
    }

    #[test]
    fn huge_cell_size_does_not_overflow() {
        let mut bg = Background::new();
        bg.set_image(quadrants());
        assert_eq!(bg.color_at_cell(0, 0, 1024, 1024, u32::MAX), Some(Color::from_rgb(255, 0, 0)));
        assert_eq!(bg.color_at_cell(1023, 1023, 1024, 1024, u32::MAX), None);
    }
}
