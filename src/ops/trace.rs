//! Background tracing: sample the reference image once per grid cell,
//! quantise to the palette, paint the result.
//!
//! The scan is a resumable [`TraceJob`]. Each [`TraceJob::step`] processes
//! one batch and returns, so the host can redraw and poll input between
//! batches. Cancellation is cooperative and keeps whatever was already
//! painted; [`TraceJob::commit`] records it all as a single history entry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::background::{BackgroundSampler, ImageSource};
use crate::canvas::{CanvasState, CellChange};
use crate::components::colors::{Color, Palette};
use crate::components::history::{HistoryEntry, HistoryManager};

/// Tunables for the cell sampler.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TraceSettings {
    /// Cells processed between yields.
    pub batch_size: usize,
    /// A sample with every channel at or above this is treated as paper and skipped.
    pub white_threshold: u8,
    /// Distance of the four corner samples from the cell edges, in canvas pixels.
    pub sample_inset: f64,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            white_threshold: 240,
            sample_inset: 2.0,
        }
    }
}

/// Shared cancel flag. Clone it into whatever UI triggers the stop.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TraceProgress {
    pub processed: usize,
    pub total: usize,
    /// Cells whose colour changed.
    pub drawn: usize,
    /// Cells left unpainted because the sample was near-white.
    pub skipped: usize,
}

impl TraceProgress {
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            return 100;
        }
        ((self.processed as f64 / self.total as f64) * 100.0).round() as u32
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceStatus {
    Running(TraceProgress),
    Finished(TraceProgress),
    Cancelled(TraceProgress),
}

impl TraceStatus {
    pub fn progress(&self) -> TraceProgress {
        match self {
            TraceStatus::Running(p) | TraceStatus::Finished(p) | TraceStatus::Cancelled(p) => *p,
        }
    }

    pub fn is_done(&self) -> bool {
        !matches!(self, TraceStatus::Running(_))
    }
}

/// Result of a committed trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceOutcome {
    pub progress: TraceProgress,
    pub cancelled: bool,
    /// True when a history entry was pushed.
    pub recorded: bool,
}

/// Average of the opaque samples at the centre and four inset corners of
/// cell (x, y). `None` when every sample is transparent.
pub fn sample_cell<S: ImageSource + ?Sized>(
    source: &S,
    x: u32,
    y: u32,
    cell_size: u32,
    inset: f64,
) -> Option<[u8; 3]> {
    let cs = cell_size as f64;
    let left = x as f64 * cs;
    let top = y as f64 * cs;
    let right = left + cs;
    let bottom = top + cs;
    let points = [
        (left + cs / 2.0, top + cs / 2.0),
        (left + inset, top + inset),
        (right - inset, top + inset),
        (left + inset, bottom - inset),
        (right - inset, bottom - inset),
    ];

    let mut total = [0u32; 3];
    let mut valid = 0u32;
    for (px, py) in points {
        let Some(pixel) = source.sample(px.floor(), py.floor()) else {
            continue;
        };
        if pixel.0[3] == 0 {
            continue;
        }
        for (sum, channel) in total.iter_mut().zip(pixel.0) {
            *sum += channel as u32;
        }
        valid += 1;
    }

    if valid == 0 {
        return None;
    }
    let avg = |sum: u32| (sum as f64 / valid as f64).round() as u8;
    Some([avg(total[0]), avg(total[1]), avg(total[2])])
}

pub fn is_primarily_white(rgb: [u8; 3], threshold: u8) -> bool {
    rgb.iter().all(|&c| c >= threshold)
}

/// An in-progress trace over every cell of a canvas, row-major.
pub struct TraceJob<S: ImageSource> {
    source: S,
    palette: Palette,
    settings: TraceSettings,
    cancel: CancelToken,
    width: u32,
    cell_size: u32,
    next: usize,
    changes: Vec<CellChange>,
    /// Hidden colours whose layer the trace has deleted so far.
    hidden: Vec<Color>,
    progress: TraceProgress,
    cancelled: bool,
}

impl TraceJob<BackgroundSampler> {
    /// Trace the canvas's own background. `None` when no image is loaded.
    pub fn from_background(
        canvas: &CanvasState,
        palette: Palette,
        settings: TraceSettings,
        cancel: CancelToken,
    ) -> Option<Self> {
        let sampler = canvas
            .background
            .sampler(canvas.width(), canvas.height(), canvas.cell_size())?;
        Some(Self::new(sampler, canvas, palette, settings, cancel))
    }
}

impl<S: ImageSource> TraceJob<S> {
    pub fn new(source: S, canvas: &CanvasState, palette: Palette, settings: TraceSettings, cancel: CancelToken) -> Self {
        let total = (canvas.width() * canvas.height()) as usize;
        log::info!(
            "trace started: {}x{} cells, batch {}",
            canvas.width(),
            canvas.height(),
            settings.batch_size
        );
        Self {
            source,
            palette,
            settings,
            cancel,
            width: canvas.width(),
            cell_size: canvas.cell_size(),
            next: 0,
            changes: Vec::new(),
            hidden: Vec::new(),
            progress: TraceProgress {
                total,
                ..Default::default()
            },
            cancelled: false,
        }
    }

    pub fn progress(&self) -> TraceProgress {
        self.progress
    }

    /// Process one batch against `canvas`.
    pub fn step(&mut self, canvas: &mut CanvasState) -> TraceStatus {
        if self.cancelled || self.cancel.is_cancelled() {
            self.cancelled = true;
            return TraceStatus::Cancelled(self.progress);
        }
        if self.next >= self.progress.total {
            return TraceStatus::Finished(self.progress);
        }

        let hidden_before = canvas.hidden_colors();
        let end = (self.next + self.settings.batch_size.max(1)).min(self.progress.total);
        while self.next < end {
            if self.cancel.is_cancelled() {
                self.cancelled = true;
                break;
            }
            let i = self.next;
            self.next += 1;
            self.progress.processed += 1;
            let x = (i % self.width as usize) as u32;
            let y = (i / self.width as usize) as u32;
            self.trace_cell(canvas, x, y);
        }
        for color in canvas.dropped_hidden(&hidden_before) {
            if !self.hidden.contains(&color) {
                self.hidden.push(color);
            }
        }
        canvas.mark_dirty();

        if self.cancelled {
            TraceStatus::Cancelled(self.progress)
        } else if self.next >= self.progress.total {
            TraceStatus::Finished(self.progress)
        } else {
            TraceStatus::Running(self.progress)
        }
    }

    fn trace_cell(&mut self, canvas: &mut CanvasState, x: u32, y: u32) {
        let Some(rgb) = sample_cell(&self.source, x, y, self.cell_size, self.settings.sample_inset) else {
            return;
        };
        let Some(color) = quantize_cell(rgb, &self.palette, &self.settings) else {
            self.progress.skipped += 1;
            return;
        };
        if let Some(change) = canvas.write_cell(x, y, Some(color)) {
            self.changes.push(change);
            self.progress.drawn = self.changes.len();
        }
    }

    /// Record everything painted so far as one `Trace` entry. Works the same
    /// after cancellation: partial work is kept.
    pub fn commit(self, history: &mut HistoryManager) -> TraceOutcome {
        let recorded = !self.changes.is_empty();
        if self.cancelled {
            log::info!(
                "trace cancelled after {}/{} cells, keeping {} changes",
                self.progress.processed,
                self.progress.total,
                self.changes.len()
            );
        } else {
            log::info!(
                "trace finished: {} drawn, {} white skipped",
                self.progress.drawn,
                self.progress.skipped
            );
        }
        if recorded {
            history.push(HistoryEntry::Trace {
                changes: self.changes,
                hidden: self.hidden,
            });
        }
        TraceOutcome {
            progress: self.progress,
            cancelled: self.cancelled,
            recorded,
        }
    }

    /// Drive the job to completion or cancellation, calling `on_batch` after
    /// every batch, then commit.
    pub fn run(
        mut self,
        canvas: &mut CanvasState,
        history: &mut HistoryManager,
        mut on_batch: impl FnMut(&TraceProgress),
    ) -> TraceOutcome {
        loop {
            let status = self.step(canvas);
            on_batch(&status.progress());
            if status.is_done() {
                break;
            }
        }
        self.commit(history)
    }
}

/// Trace the canvas background in one call. Returns `None` when there is no
/// background image.
pub fn trace_background(
    canvas: &mut CanvasState,
    history: &mut HistoryManager,
    palette: &Palette,
    settings: TraceSettings,
    cancel: CancelToken,
    on_batch: impl FnMut(&TraceProgress),
) -> Option<TraceOutcome> {
    let job = TraceJob::from_background(canvas, palette.clone(), settings, cancel)?;
    Some(job.run(canvas, history, on_batch))
}

/// Nearest palette colour for a sampled cell. `None` when the sample counts
/// as paper or the palette is empty.
pub fn quantize_cell(rgb: [u8; 3], palette: &Palette, settings: &TraceSettings) -> Option<Color> {
    if is_primarily_white(rgb, settings.white_threshold) {
        return None;
    }
    palette.nearest(rgb)
}
