//! Engine knobs. The agent fills these from flags/env; the library never reads env itself.

/// Spans at or above this many seconds use one summary sample per chunk.
pub const DEFAULT_SUMMARY_THRESHOLD: u32 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Sampling interval in raw ticks (seconds for diagnostic captures).
    pub span: u32,
    pub summary_threshold: u32,
    /// Decode pool size; `None` picks `available_parallelism - 1` (min 1).
    pub workers: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            span: 1,
            summary_threshold: DEFAULT_SUMMARY_THRESHOLD,
            workers: None,
        }
    }
}

impl EngineConfig {
    pub fn with_span(mut self, span: u32) -> Self {
        self.span = span.max(1);
        self
    }

    pub fn pool_size(&self) -> usize {
        if let Some(n) = self.workers {
            return n.max(1);
        }
        std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1)
    }
}
