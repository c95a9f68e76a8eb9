use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::canvas::{CanvasState, GridError};
use crate::components::history::HistoryManager;
use crate::io::{self, ProjectError};
use crate::settings::EditorSettings;

/// Single open document.
#[derive(Debug)]
pub struct Project {
    pub id: Uuid,
    pub canvas_state: CanvasState,
    pub history: HistoryManager,
    /// `None` for unsaved/untitled files.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,

    /// Display name (derived from path or "Untitled-X")
    pub name: String,
}

impl Project {
    /// Blank document sized and styled from the editor preferences.
    pub fn new_untitled(untitled_counter: usize, settings: &EditorSettings) -> Result<Self, GridError> {
        Ok(Self {
            id: Uuid::new_v4(),
            canvas_state: settings.new_canvas()?,
            history: HistoryManager::new(),
            path: None,
            is_dirty: false,
            name: format!("Untitled-{}", untitled_counter),
        })
    }

    pub fn from_file(path: PathBuf, canvas_state: CanvasState) -> Self {
        let mut project = Self {
            id: Uuid::new_v4(),
            canvas_state,
            history: HistoryManager::new(),
            path: Some(path),
            is_dirty: false,
            name: String::new(),
        };
        project.update_name_from_path();
        project
    }

    /// Load a saved project from disk.
    pub fn open(path: &Path) -> Result<Self, ProjectError> {
        let canvas_state = io::load_project(path)?;
        Ok(Self::from_file(path.to_path_buf(), canvas_state))
    }

    /// Write to `path` and adopt it as this document's location.
    pub fn save_as(&mut self, path: PathBuf) -> Result<(), ProjectError> {
        io::save_project(&self.canvas_state, &path)?;
        self.path = Some(path);
        self.update_name_from_path();
        self.mark_clean();
        Ok(())
    }

    /// Write to the current path. Untitled projects need [`Project::save_as`].
    pub fn save(&mut self) -> Result<(), ProjectError> {
        let Some(path) = self.path.clone() else {
            return Err(ProjectError::InvalidFormat("Project has no file path".to_string()));
        };
        self.save_as(path)
    }

    /// Swap in a freshly loaded document: grid, layers, background and
    /// settings are replaced together and history starts over.
    pub fn replace_document(&mut self, canvas_state: CanvasState) {
        self.canvas_state = canvas_state;
        self.history.clear();
        self.canvas_state.mark_dirty();
        self.mark_clean();
    }

    pub fn undo(&mut self) -> Option<String> {
        let description = self.history.undo(&mut self.canvas_state)?;
        self.mark_dirty();
        Some(description)
    }

    pub fn redo(&mut self) -> Option<String> {
        let description = self.history.redo(&mut self.canvas_state)?;
        self.mark_dirty();
        Some(description)
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    pub fn update_name_from_path(&mut self) {
        if let Some(ref path) = self.path {
            self.name = path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "Unknown".to_string());
        }
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }
}
