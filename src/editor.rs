use tracing::debug;

use crate::curves::{polyline, CurveLuts};
use crate::error::{Result, StudioError};
use crate::history::HistoryStack;
use crate::models::{Channel, ControlPoint, CurveSettings, Interpolation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PointDrag {
    channel: Channel,
    index: usize,
}

/// Owns the live curve settings and their history. Discrete edits commit
/// immediately; a point drag mutates live state and commits once on release.
#[derive(Debug, Clone)]
pub struct CurveEditor {
    settings: CurveSettings,
    history: HistoryStack,
    active: Channel,
    drag: Option<PointDrag>,
}

impl CurveEditor {
    pub fn new(settings: CurveSettings, history_capacity: usize) -> Self {
        let mut history = HistoryStack::new(history_capacity);
        history.commit(&settings);
        Self {
            settings,
            history,
            active: Channel::All,
            drag: None,
        }
    }

    pub fn settings(&self) -> &CurveSettings {
        &self.settings
    }

    pub fn history(&self) -> &HistoryStack {
        &self.history
    }

    pub fn active_channel(&self) -> Channel {
        self.active
    }

    pub fn select_channel(&mut self, channel: Channel) {
        self.active = channel;
    }

    pub fn luts(&self) -> CurveLuts {
        CurveLuts::from_settings(&self.settings)
    }

    /// Display samples for the active channel, drawn with the LUT's own
    /// interpolation.
    pub fn active_polyline(&self, samples: usize) -> Vec<(f32, f32)> {
        polyline(
            self.settings.curve(self.active),
            self.settings.interpolation,
            samples,
        )
    }

    fn commit(&mut self) -> bool {
        let grew = self.history.commit(&self.settings);
        if grew {
            debug!(index = self.history.index(), len = self.history.len(), "curve edit committed");
        }
        grew
    }

    /// Rejected while a point drag is active; the drag holds a point index.
    pub fn add_point(&mut self, x: u8, y: u8) -> Result<usize> {
        if self.drag.is_some() {
            return Err(StudioError::DragInProgress);
        }
        let index = self
            .settings
            .curve_mut(self.active)
            .insert_point(ControlPoint::new(x, y))?;
        self.commit();
        Ok(index)
    }

    pub fn remove_point(&mut self, index: usize) -> Result<()> {
        if self.drag.is_some() {
            return Err(StudioError::DragInProgress);
        }
        self.settings.curve_mut(self.active).remove_point(index)?;
        self.commit();
        Ok(())
    }

    /// Starts a point drag on the active channel. Returns `false` for an
    /// unknown index.
    pub fn begin_drag(&mut self, index: usize) -> bool {
        if index >= self.settings.curve(self.active).points().len() {
            return false;
        }
        self.drag = Some(PointDrag {
            channel: self.active,
            index,
        });
        true
    }

    /// Intermediate drag movement; live state only, no history entry.
    pub fn drag_to(&mut self, x: u8, y: u8) -> bool {
        match self.drag {
            Some(drag) => self
                .settings
                .curve_mut(drag.channel)
                .move_point(drag.index, x, y),
            None => false,
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Ends the gesture with a single commit. Returns whether history grew.
    pub fn end_drag(&mut self) -> bool {
        if self.drag.take().is_none() {
            return false;
        }
        self.commit()
    }

    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        self.settings.interpolation = interpolation;
        self.commit();
    }

    pub fn reset_channel(&mut self) {
        *self.settings.curve_mut(self.active) = Default::default();
        self.drag = None;
        self.commit();
    }

    pub fn reset_all(&mut self) {
        self.settings = CurveSettings {
            interpolation: self.settings.interpolation,
            ..CurveSettings::default()
        };
        self.drag = None;
        self.commit();
    }

    /// Replaces everything, e.g. with settings loaded from a sidecar.
    pub fn replace(&mut self, settings: CurveSettings) {
        self.settings = settings;
        self.drag = None;
        self.commit();
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> bool {
        self.drag = None;
        match self.history.undo() {
            Some(snapshot) => {
                self.settings = snapshot.clone();
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        self.drag = None;
        match self.history.redo() {
            Some(snapshot) => {
                self.settings = snapshot.clone();
                true
            }
            None => false,
        }
    }
}
