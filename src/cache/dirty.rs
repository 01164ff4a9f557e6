//! Dirty Tracking Module
//!
//! Records whether the in-memory map holds mutations not yet on disk.

// == Dirty State ==
/// Write-back state of a bound definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirtyState {
    /// Disk matches memory
    #[default]
    Clean,
    /// Memory holds unflushed mutations
    Dirty,
}

impl DirtyState {
    /// Marks the state dirty after a mutation.
    pub fn mark_dirty(&mut self) {
        *self = DirtyState::Dirty;
    }

    /// Marks the state clean; only call after a confirmed flush.
    pub fn mark_clean(&mut self) {
        *self = DirtyState::Clean;
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self, DirtyState::Dirty)
    }

    /// Returns true if a flush should touch the disk.
    pub fn needs_flush(&self) -> bool {
        self.is_dirty()
    }
}
