use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose};
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageError, ImageOutputFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::background::BackgroundTransform;
use crate::canvas::{CanvasState, DisplaySettings, GridError, PixelGrid, clamp_cell_size, validate_rows};
use crate::components::colors::{Color, ColorParseError};
use crate::components::layers::LayerEntry;

/// Project file format version written by [`save_project`].
pub const PROJECT_VERSION: &str = "1.0";

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub enum ProjectError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Image(ImageError),
    InvalidFormat(String),
}

impl std::fmt::Display for ProjectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectError::Io(e) => write!(f, "I/O error: {}", e),
            ProjectError::Json(e) => write!(f, "JSON error: {}", e),
            ProjectError::Image(e) => write!(f, "Image error: {}", e),
            ProjectError::InvalidFormat(e) => write!(f, "Invalid format: {}", e),
        }
    }
}

impl std::error::Error for ProjectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProjectError::Io(e) => Some(e),
            ProjectError::Json(e) => Some(e),
            ProjectError::Image(e) => Some(e),
            ProjectError::InvalidFormat(_) => None,
        }
    }
}

impl From<std::io::Error> for ProjectError {
    fn from(e: std::io::Error) -> Self {
        ProjectError::Io(e)
    }
}

impl From<serde_json::Error> for ProjectError {
    fn from(e: serde_json::Error) -> Self {
        ProjectError::Json(e)
    }
}

impl From<ImageError> for ProjectError {
    fn from(e: ImageError) -> Self {
        ProjectError::Image(e)
    }
}

impl From<GridError> for ProjectError {
    fn from(e: GridError) -> Self {
        ProjectError::InvalidFormat(e.to_string())
    }
}

impl From<ColorParseError> for ProjectError {
    fn from(e: ColorParseError) -> Self {
        ProjectError::InvalidFormat(e.to_string())
    }
}

// ============================================================================
// PROJECT FILE (JSON)
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub saved_at: Option<String>,
    pub grid: GridData,
    #[serde(default)]
    pub layers: Vec<LayerEntry>,
    #[serde(default = "default_current_color")]
    pub current_color: Color,
    #[serde(default)]
    pub background: BackgroundData,
    #[serde(default)]
    pub settings: SettingsData,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridData {
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub cell_size: Option<u32>,
    /// `rows[y][x]`, each cell a colour string or `null`. Kept loose so the
    /// shape can be validated with a useful message.
    #[serde(default)]
    pub pixels: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackgroundData {
    pub has_image: bool,
    pub opacity: f32,
    /// `data:image/png;base64,...`
    pub image_data: Option<String>,
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub rotation: f64,
}

impl Default for BackgroundData {
    fn default() -> Self {
        Self {
            has_image: false,
            opacity: 1.0,
            image_data: None,
            x: 0.0,
            y: 0.0,
            scale: 1.0,
            rotation: 0.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsData {
    pub show_grid: bool,
    pub zoom: f32,
    pub background_color: Color,
    pub fade_to_black: u8,
}

impl Default for SettingsData {
    fn default() -> Self {
        Self {
            show_grid: true,
            zoom: 1.0,
            background_color: Color::WHITE,
            fade_to_black: 100,
        }
    }
}

fn default_version() -> String {
    PROJECT_VERSION.to_string()
}

fn default_current_color() -> Color {
    Color::BLACK
}

/// Snapshot `state` into the serialisable project form.
pub fn build_project_file(state: &CanvasState) -> ProjectFile {
    let pixels = Value::Array(
        state
            .grid
            .get_all()
            .into_iter()
            .map(|row| {
                Value::Array(
                    row.into_iter()
                        .map(|cell| cell.map_or(Value::Null, |c| Value::String(c.to_hex())))
                        .collect(),
                )
            })
            .collect(),
    );

    let bg = &state.background;
    let image_data = bg.image().and_then(|image| match png_data_url(image) {
        Ok(url) => Some(url),
        Err(e) => {
            log::warn!("could not encode background image: {}", e);
            None
        }
    });

    ProjectFile {
        version: PROJECT_VERSION.to_string(),
        saved_at: Some(iso_timestamp()),
        grid: GridData {
            width: Some(state.width()),
            height: Some(state.height()),
            cell_size: Some(state.display.cell_size),
            pixels,
        },
        layers: state.layers.entries(),
        current_color: state.current_color,
        background: BackgroundData {
            has_image: image_data.is_some(),
            opacity: bg.opacity,
            image_data,
            x: bg.transform.x,
            y: bg.transform.y,
            scale: bg.transform.scale,
            rotation: bg.transform.rotation,
        },
        settings: SettingsData {
            show_grid: state.display.show_grid,
            zoom: state.display.zoom,
            background_color: state.background_color,
            fade_to_black: state.display.fade_to_black,
        },
    }
}

pub fn project_to_json(state: &CanvasState) -> Result<String, ProjectError> {
    Ok(serde_json::to_string_pretty(&build_project_file(state))?)
}

/// Parse and validate a project document. Builds a fresh state; nothing
/// existing is touched, so a failed load leaves the caller's document as is.
pub fn project_from_json(json: &str) -> Result<CanvasState, ProjectError> {
    let file: ProjectFile = serde_json::from_str(json)?;
    canvas_from_project(&file)
}

pub fn canvas_from_project(file: &ProjectFile) -> Result<CanvasState, ProjectError> {
    let rows = parse_pixel_rows(&file.grid.pixels)?;
    let row_len = validate_rows(&rows)?;

    let width = file.grid.width.filter(|w| *w > 0).unwrap_or(row_len as u32);
    let height = file.grid.height.filter(|h| *h > 0).unwrap_or(rows.len() as u32);
    let mut grid = PixelGrid::new(width, height)?;
    grid.set_all(&rows)?;

    let mut state = CanvasState::from_grid(grid);
    state.layers.restore_visibility(&file.layers);
    state.current_color = file.current_color;
    state.background_color = file.settings.background_color;
    state.display = DisplaySettings {
        show_grid: file.settings.show_grid,
        zoom: file.settings.zoom,
        fade_to_black: file.settings.fade_to_black.min(100),
        cell_size: file
            .grid
            .cell_size
            .filter(|c| *c > 0)
            .map(clamp_cell_size)
            .unwrap_or(state.display.cell_size),
        grid_color: state.display.grid_color,
    };

    let bg = &file.background;
    if bg.has_image {
        match bg.image_data.as_deref().map(decode_data_url) {
            Some(Ok(image)) => {
                state.background.set_image(image);
                state.background.opacity = bg.opacity.clamp(0.0, 1.0);
                state.background.transform = BackgroundTransform {
                    x: bg.x,
                    y: bg.y,
                    scale: bg.scale,
                    rotation: bg.rotation,
                };
            }
            Some(Err(e)) => log::warn!("skipping unreadable background image: {}", e),
            None => log::warn!("project claims a background image but has no image data"),
        }
    }

    log::info!(
        "loaded project v{} ({}x{}, {} layers)",
        file.version,
        width,
        height,
        state.layers.len()
    );
    Ok(state)
}

fn parse_pixel_rows(pixels: &Value) -> Result<Vec<Vec<Option<Color>>>, ProjectError> {
    let invalid = || ProjectError::InvalidFormat("Invalid project file format".to_string());
    let rows = pixels.as_array().filter(|rows| !rows.is_empty()).ok_or_else(invalid)?;
    if !rows[0].is_array() {
        return Err(invalid());
    }

    rows.iter()
        .enumerate()
        .map(|(y, row)| {
            let cells = row
                .as_array()
                .ok_or_else(|| ProjectError::InvalidFormat(format!("Pixel row {} is not an array", y)))?;
            cells
                .iter()
                .map(|cell| match cell {
                    Value::Null => Ok(None),
                    Value::String(s) => Ok(Color::parse_cell(Some(s.as_str()))?),
                    other => Err(ProjectError::InvalidFormat(format!(
                        "Unexpected cell value {} in row {}",
                        other, y
                    ))),
                })
                .collect()
        })
        .collect()
}

pub fn save_project(state: &CanvasState, path: &Path) -> Result<(), ProjectError> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &build_project_file(state))?;
    log::info!("saved project to {}", path.display());
    Ok(())
}

pub fn load_project(path: &Path) -> Result<CanvasState, ProjectError> {
    let json = std::fs::read_to_string(path)?;
    project_from_json(&json).inspect_err(|e| log::warn!("rejected {}: {}", path.display(), e))
}

// ============================================================================
// BACKGROUND IMAGE DATA URLS
// ============================================================================

pub fn png_data_url(image: &RgbaImage) -> Result<String, ImageError> {
    let mut png_bytes: Vec<u8> = Vec::new();
    DynamicImage::ImageRgba8(image.clone()).write_to(&mut Cursor::new(&mut png_bytes), ImageOutputFormat::Png)?;
    let b64 = general_purpose::STANDARD.encode(&png_bytes);
    Ok(format!("data:image/png;base64,{}", b64))
}

/// Decode a `data:<mime>;base64,<payload>` URL into an image.
pub fn decode_data_url(url: &str) -> Result<RgbaImage, ProjectError> {
    let payload = url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
        .map(|(_, payload)| payload)
        .ok_or_else(|| ProjectError::InvalidFormat("Background image is not a base64 data URL".to_string()))?;
    let bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| ProjectError::InvalidFormat(format!("Bad base64 image data: {}", e)))?;
    Ok(image::load_from_memory(&bytes)?.into_rgba8())
}

// ============================================================================
// PNG EXPORT
// ============================================================================

/// What fills export pixels not covered by a visible cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportBackdrop {
    Transparent,
    /// The document's background colour.
    BackgroundColor,
    Solid(Color),
}

/// Inclusive bounding box `(min_x, min_y, max_x, max_y)` of visible painted
/// cells, or `None` when nothing is visible.
pub fn visible_bounds(state: &CanvasState) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for y in 0..state.height() {
        for x in 0..state.width() {
            if state.visible_color(x, y).is_none() {
                continue;
            }
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
    }
    bounds
}

/// Render visible cells cropped to their bounding box, `cell_size` pixels
/// per cell. An empty canvas renders as a single pixel.
pub fn export_png_image(state: &CanvasState, backdrop: ExportBackdrop) -> RgbaImage {
    let fill = match backdrop {
        ExportBackdrop::Transparent => Rgba([0, 0, 0, 0]),
        ExportBackdrop::BackgroundColor => state.background_color.to_rgba(),
        ExportBackdrop::Solid(c) => c.to_rgba(),
    };
    let Some((x0, y0, x1, y1)) = visible_bounds(state) else {
        return RgbaImage::from_pixel(1, 1, fill);
    };

    let cs = state.cell_size();
    let mut out = RgbaImage::from_pixel((x1 - x0 + 1) * cs, (y1 - y0 + 1) * cs, fill);
    for y in y0..=y1 {
        for x in x0..=x1 {
            let Some(color) = state.visible_color(x, y) else {
                continue;
            };
            let px = color.to_rgba();
            let (ox, oy) = ((x - x0) * cs, (y - y0) * cs);
            for dy in 0..cs {
                for dx in 0..cs {
                    out.put_pixel(ox + dx, oy + dy, px);
                }
            }
        }
    }
    out
}

pub fn export_png(state: &CanvasState, backdrop: ExportBackdrop, path: &Path) -> Result<(), ProjectError> {
    let image = export_png_image(state, backdrop);
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let encoder = PngEncoder::new(&mut writer);
    #[allow(deprecated)]
    encoder.encode(image.as_raw(), image.width(), image.height(), image::ColorType::Rgba8)?;
    log::info!("exported {}x{} PNG to {}", image.width(), image.height(), path.display());
    Ok(())
}

/// File-name stem safe for any platform: ASCII alphanumerics, `-` and `_`
/// are kept, everything else becomes `-`.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    if cleaned.is_empty() {
        "pixel-art-project".to_string()
    } else {
        cleaned
    }
}

/// UTC `YYYY-MM-DDTHH:MM:SSZ` for the `savedAt` field.
fn iso_timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;

    // Civil-from-days, proleptic Gregorian
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        month,
        day,
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}
