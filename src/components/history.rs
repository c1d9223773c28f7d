use std::collections::VecDeque;

use crate::canvas::{DrawingLayer, TiledImage};

// ============================================================================
// COMMAND TRAIT
// ============================================================================

/// An undoable edit to a drawing layer.
pub trait Command: Send + Sync {
    fn undo(&self, layer: &mut DrawingLayer);
    fn redo(&self, layer: &mut DrawingLayer);
    fn description(&self) -> String;
    fn memory_size(&self) -> usize;
}

// ============================================================================
// HISTORY MANAGER - undo/redo stacks with count and memory limits
// ============================================================================

pub struct HistoryManager {
    undo_stack: VecDeque<Box<dyn Command>>,
    redo_stack: VecDeque<Box<dyn Command>>,
    max_history_size: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running total across both stacks.
    total_memory: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(50)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size: max_history_size.max(1),
            max_memory_bytes: Some(100 * 1024 * 1024),
            total_memory: 0,
        }
    }

    pub fn with_memory_limit(mut self, max_bytes: Option<usize>) -> Self {
        self.max_memory_bytes = max_bytes;
        self.prune();
        self
    }

    /// Record a finished edit. Anything that was redoable is dropped.
    pub fn push(&mut self, command: Box<dyn Command>) {
        for cmd in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(cmd.memory_size());
        }
        self.total_memory += command.memory_size();
        self.undo_stack.push_back(command);
        self.prune();
    }

    pub fn undo(&mut self, layer: &mut DrawingLayer) -> Option<String> {
        let command = self.undo_stack.pop_back()?;
        let description = command.description();
        command.undo(layer);
        self.redo_stack.push_back(command);
        Some(description)
    }

    pub fn redo(&mut self, layer: &mut DrawingLayer) -> Option<String> {
        let command = self.redo_stack.pop_back()?;
        let description = command.description();
        command.redo(layer);
        self.undo_stack.push_back(command);
        Some(description)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.back().map(|c| c.description())
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.back().map(|c| c.description())
    }

    /// Most recent first.
    pub fn undo_history(&self) -> Vec<String> {
        self.undo_stack.iter().rev().map(|c| c.description()).collect()
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            }
        }
        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.undo_stack.len() > 1 {
                if let Some(removed) = self.undo_stack.pop_front() {
                    self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
    }

    /// Undo `steps` times, stopping early when history runs out.
    /// Returns how many undos actually happened.
    pub fn undo_steps(&mut self, steps: usize, layer: &mut DrawingLayer) -> usize {
        let mut done = 0;
        while done < steps && self.undo(layer).is_some() {
            done += 1;
        }
        done
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}

// ============================================================================
// LAYER SNAPSHOT: before/after copies of the drawing layer
// ============================================================================

/// Whole-layer undo. Chunks are shared copy-on-write, so a snapshot only
/// pays for the 64×64 tiles the edit touched.
pub struct LayerSnapshotCommand {
    description: String,
    before: TiledImage,
    after: Option<TiledImage>,
}

impl LayerSnapshotCommand {
    /// Create BEFORE the edit, then call `set_after()` once it is done.
    pub fn new(description: impl Into<String>, layer: &DrawingLayer) -> Self {
        Self { description: description.into(), before: layer.pixels.clone(), after: None }
    }

    pub fn set_after(&mut self, layer: &DrawingLayer) {
        self.after = Some(layer.pixels.clone());
    }

    /// False when the edit left every pixel unchanged.
    pub fn changed(&self) -> bool {
        match self.after {
            Some(ref after) => !after.pixels_eq(&self.before),
            None => false,
        }
    }
}

impl Command for LayerSnapshotCommand {
    fn undo(&self, layer: &mut DrawingLayer) {
        layer.pixels = self.before.clone();
        layer.mark_dirty(None);
    }

    fn redo(&self, layer: &mut DrawingLayer) {
        if let Some(ref after) = self.after {
            layer.pixels = after.clone();
            layer.mark_dirty(None);
        }
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn memory_size(&self) -> usize {
        self.before.memory_bytes() + self.after.as_ref().map_or(0, |a| a.memory_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn dab(layer: &mut DrawingLayer, x: u32, y: u32) -> LayerSnapshotCommand {
        let mut cmd = LayerSnapshotCommand::new("Hair Stroke", layer);
        layer.pixels.put_pixel(x, y, Rgba([40, 20, 10, 200]));
        cmd.set_after(layer);
        cmd
    }

    #[test]
    fn test_undo_all_strokes_restores_blank() {
        let mut layer = DrawingLayer::new(128, 128);
        let mut history = HistoryManager::new(50);
        for i in 0..5 {
            let cmd = dab(&mut layer, i * 20, i * 20);
            history.push(Box::new(cmd));
        }
        assert!(layer.has_content());
        assert_eq!(history.undo_steps(5, &mut layer), 5);
        assert!(!layer.has_content());
        assert!(!history.can_undo());
        assert_eq!(history.redo_count(), 5);
    }

    #[test]
    fn test_redo_is_pixel_identical() {
        let mut layer = DrawingLayer::new(100, 100);
        let mut history = HistoryManager::default();
        history.push(Box::new(dab(&mut layer, 10, 10)));
        history.push(Box::new(dab(&mut layer, 90, 90)));
        let painted = layer.pixels.clone();

        history.undo(&mut layer);
        history.undo(&mut layer);
        history.redo(&mut layer);
        history.redo(&mut layer);
        assert!(layer.pixels.pixels_eq(&painted));
    }

    #[test]
    fn test_push_clears_redo() {
        let mut layer = DrawingLayer::new(64, 64);
        let mut history = HistoryManager::default();
        history.push(Box::new(dab(&mut layer, 1, 1)));
        history.undo(&mut layer);
        assert!(history.can_redo());
        history.push(Box::new(dab(&mut layer, 2, 2)));
        assert!(!history.can_redo());
        assert_eq!(history.undo_count(), 1);
    }

    #[test]
    fn test_prune_by_count() {
        let mut layer = DrawingLayer::new(64, 64);
        let mut history = HistoryManager::new(3);
        for i in 0..6 {
            history.push(Box::new(dab(&mut layer, i, 0)));
        }
        assert_eq!(history.undo_count(), 3);
        assert_eq!(history.undo_steps(10, &mut layer), 3);
        // the three oldest strokes are beyond reach
        assert_eq!(layer.pixels.get_pixel(0, 0).0[3], 200);
        assert_eq!(layer.pixels.get_pixel(5, 0).0[3], 0);
    }

    #[test]
    fn test_undo_on_empty_history() {
        let mut layer = DrawingLayer::new(8, 8);
        let mut history = HistoryManager::default();
        assert_eq!(history.undo(&mut layer), None);
        assert_eq!(history.redo(&mut layer), None);
    }

    #[test]
    fn test_prune_by_memory() {
        let mut layer = DrawingLayer::new(256, 256);
        let first = dab(&mut layer, 0, 0);
        let per_entry = first.memory_size();
        let mut history = HistoryManager::new(50).with_memory_limit(Some(per_entry * 3));
        history.push(Box::new(first));
        for i in 1..8 {
            history.push(Box::new(dab(&mut layer, (i % 4) * 64, (i / 4) * 64)));
        }
        assert!(history.undo_count() < 8);
        assert!(history.memory_usage() <= per_entry * 3 || history.undo_count() == 1);
        assert_eq!(history.undo_description().as_deref(), Some("Hair Stroke"));
        assert_eq!(history.redo_description(), None);
    }

    #[test]
    fn test_unchanged_edit_detected() {
        let layer = DrawingLayer::new(8, 8);
        let mut cmd = LayerSnapshotCommand::new("noop", &layer);
        cmd.set_after(&layer);
        assert!(!cmd.changed());
    }
}
