//! PixelFE: the document core of a grid pixel-art editor.
//!
//! A [`CanvasState`] holds the pixel grid, its per-colour layer index, the
//! tracing background and document colours. Every edit in [`ops`] mutates it
//! and records one [`HistoryEntry`] so it can be undone and redone.
#![allow(clippy::large_enum_variant)]

pub mod background;
pub mod canvas;
pub mod components;
pub mod io;
pub mod logger;
pub mod ops;
pub mod project;
pub mod settings;

pub use background::{Background, BackgroundTransform, ImageSource};
pub use canvas::{CanvasState, CellChange, GridError, PixelGrid};
pub use components::colors::{Color, Palette};
pub use components::history::{HistoryEntry, HistoryManager, HistoryStatus, TransformKind};
pub use components::layers::{LayerEntry, LayerIndex, LayerInfo};
pub use io::ProjectError;
pub use ops::trace::{CancelToken, TraceJob, TraceProgress, TraceSettings, TraceStatus};
pub use project::Project;
pub use settings::EditorSettings;
