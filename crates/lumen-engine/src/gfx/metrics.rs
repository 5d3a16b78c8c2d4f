use std::fmt;

/// Snapshot of the manager's counters.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct GraphicsMetrics {
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub pipeline_pushes: u64,
    pub device_resets: u64,
    /// Resets skipped because the target had a zero-size client area.
    pub skipped_resets: u64,
    pub textures_created: u64,
    pub textures_released: u64,
}

impl fmt::Display for GraphicsMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sessions {}/{} | pipeline pushes {} | resets {} (skipped {}) | textures +{} -{}",
            self.sessions_opened,
            self.sessions_closed,
            self.pipeline_pushes,
            self.device_resets,
            self.skipped_resets,
            self.textures_created,
            self.textures_released,
        )
    }
}
