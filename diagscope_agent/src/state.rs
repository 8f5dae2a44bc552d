//! Shared agent state: the series store and the paths it is rebuilt from.

use std::path::PathBuf;
use std::sync::Arc;

use diagscope::SeriesStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SeriesStore>,
    // rebuilds always re-read the paths given at startup
    pub paths: Arc<Vec<PathBuf>>,
}

impl AppState {
    pub fn new(store: SeriesStore, paths: Vec<PathBuf>) -> Self {
        Self {
            store: Arc::new(store),
            paths: Arc::new(paths),
        }
    }
}
