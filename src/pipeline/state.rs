//! Shared Pipeline State
//!
//! Handles shared between the dispatch task and the API handlers. The cycle
//! store sits behind a tokio `RwLock`; readers take snapshots. The render
//! frame is published on a `watch` channel whenever the dirty flag was set.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

use super::cycle_store::CycleStore;
use crate::processing::{project_prpd, resample, PrpdOptions};
use crate::types::{PrpdProjection, SurfaceGrid};

// ============================================================================
// Render Frame
// ============================================================================

/// Both projections computed together on one render tick.
#[derive(Debug, Clone, Serialize)]
pub struct RenderFrame {
    /// Increments on every render
    pub frame_no: u64,
    pub rendered_at: DateTime<Local>,
    pub counter: u32,
    pub max_cycles: u32,
    pub total_points: usize,
    pub options: PrpdOptions,
    /// Amplitude axis label for the current unit
    pub axis_label: &'static str,
    pub surface: SurfaceGrid,
    /// Colour-scale bounds of the surface, `None` when it is empty
    pub z_range: Option<(f64, f64)>,
    pub prpd: PrpdProjection,
}

impl RenderFrame {
    /// Frame published before anything has been rendered.
    pub fn empty(options: PrpdOptions) -> Self {
        Self::render(&CycleStore::new(1, 1), options, 0)
    }

    pub fn render(store: &CycleStore, options: PrpdOptions, frame_no: u64) -> Self {
        let accumulation = store.accumulation_window();
        let surface = resample(&store.surface_window(), options.unit);
        Self {
            frame_no,
            rendered_at: Local::now(),
            counter: store.counter(),
            max_cycles: store.max_cycles(),
            total_points: store.total_points(),
            options,
            axis_label: options.unit.label(),
            z_range: surface.z_range(),
            surface,
            prpd: project_prpd(&accumulation, store.max_cycles() as usize, options),
        }
    }
}

// ============================================================================
// Shared State
// ============================================================================

/// Cloneable bundle of the pipeline's shared handles.
#[derive(Clone)]
pub struct SharedState {
    pub store: Arc<RwLock<CycleStore>>,
    /// Display options used by the render tick
    pub view: Arc<RwLock<PrpdOptions>>,
    /// Persist cycles and raw frames
    pub persist: Arc<AtomicBool>,
    dirty: Arc<AtomicBool>,
    frames: watch::Receiver<Arc<RenderFrame>>,
}

impl SharedState {
    /// Build the shared state and the sender the dispatch task publishes on.
    pub fn new(
        accumulation_cycles: usize,
        surface_cycles: usize,
        persist: bool,
    ) -> (Self, watch::Sender<Arc<RenderFrame>>) {
        let view = PrpdOptions::default();
        let (frame_tx, frames) = watch::channel(Arc::new(RenderFrame::empty(view)));
        let state = Self {
            store: Arc::new(RwLock::new(CycleStore::new(accumulation_cycles, surface_cycles))),
            view: Arc::new(RwLock::new(view)),
            persist: Arc::new(AtomicBool::new(persist)),
            dirty: Arc::new(AtomicBool::new(false)),
            frames,
        };
        (state, frame_tx)
    }

    /// Request a re-render on the next render tick.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Clear the dirty flag, returning whether it was set.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    pub fn persist_enabled(&self) -> bool {
        self.persist.load(Ordering::Relaxed)
    }

    pub fn set_persist(&self, enabled: bool) {
        self.persist.store(enabled, Ordering::Relaxed);
    }

    /// Latest published render frame.
    pub fn latest_frame(&self) -> Arc<RenderFrame> {
        Arc::clone(&self.frames.borrow())
    }

    pub fn subscribe_frames(&self) -> watch::Receiver<Arc<RenderFrame>> {
        self.frames.clone()
    }
}
