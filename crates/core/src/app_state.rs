//! UI state store.
//!
//! [`AppState`] is created once at startup and owned by the UI layer. All
//! mutation goes through the named methods below; the orchestrator never
//! touches it, the UI writes results in after each job.

use serde::Serialize;
use uuid::Uuid;

use crate::types::Timestamp;

/// Maximum number of history entries kept; older entries are evicted.
pub const MAX_HISTORY_ITEMS: usize = 20;

/// An image known to the UI: the uploaded original or a processed result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRecord {
    pub id: Uuid,
    /// Where the image can be read back from (file path or URL).
    pub locator: String,
    /// Name of the local file it came from, if any.
    pub source_file: Option<String>,
    /// Prompt that produced this image, for processed results.
    pub prompt: Option<String>,
    pub timestamp: Timestamp,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ImageRecord {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            locator: locator.into(),
            source_file: None,
            prompt: None,
            timestamp: chrono::Utc::now(),
            width: None,
            height: None,
        }
    }

    pub fn with_source_file(mut self, name: impl Into<String>) -> Self {
        self.source_file = Some(name.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_dimensions(mut self, dimensions: Option<(u32, u32)>) -> Self {
        if let Some((width, height)) = dimensions {
            self.width = Some(width);
            self.height = Some(height);
        }
        self
    }
}

/// One completed edit in the history list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub image: ImageRecord,
    pub prompt: String,
    pub timestamp: Timestamp,
}

impl HistoryEntry {
    pub fn new(image: ImageRecord, prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            image,
            prompt: prompt.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppState {
    current_image: Option<ImageRecord>,
    current_prompt: String,
    is_processing: bool,
    is_loading: bool,
    /// Newest first.
    history: Vec<HistoryEntry>,
    error: Option<String>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_image(&self) -> Option<&ImageRecord> {
        self.current_image.as_ref()
    }

    pub fn current_prompt(&self) -> &str {
        &self.current_prompt
    }

    pub fn is_processing(&self) -> bool {
        self.is_processing
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_current_image(&mut self, image: Option<ImageRecord>) {
        self.current_image = image;
    }

    pub fn set_current_prompt(&mut self, prompt: impl Into<String>) {
        self.current_prompt = prompt.into();
    }

    pub fn set_processing(&mut self, is_processing: bool) {
        self.is_processing = is_processing;
    }

    pub fn set_loading(&mut self, is_loading: bool) {
        self.is_loading = is_loading;
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.error = error;
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Prepend an entry, evicting the oldest beyond [`MAX_HISTORY_ITEMS`].
    pub fn add_to_history(&mut self, entry: HistoryEntry) {
        self.history.insert(0, entry);
        self.history.truncate(MAX_HISTORY_ITEMS);
    }

    /// Make a history entry's image and prompt current.
    ///
    /// The history list itself is left unchanged. Returns `false` if no
    /// entry has the given ID.
    pub fn switch_to_history_item(&mut self, history_id: Uuid) -> bool {
        match self.history.iter().find(|entry| entry.id == history_id) {
            Some(entry) => {
                self.current_image = Some(entry.image.clone());
                self.current_prompt = entry.prompt.clone();
                true
            }
            None => false,
        }
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Return to the initial empty state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(n: usize) -> HistoryEntry {
        let image = ImageRecord::new(format!("output/result-{n}.png")).with_prompt(format!("edit {n}"));
        HistoryEntry::new(image, format!("edit {n}"))
    }

    #[test]
    fn new_state_is_empty() {
        let state = AppState::new();
        assert!(state.current_image().is_none());
        assert_eq!(state.current_prompt(), "");
        assert!(!state.is_processing());
        assert!(!state.is_loading());
        assert!(state.history().is_empty());
        assert!(state.error().is_none());
    }

    #[test]
    fn history_is_newest_first() {
        let mut state = AppState::new();
        state.add_to_history(submission(1));
        state.add_to_history(submission(2));

        assert_eq!(state.history()[0].prompt, "edit 2");
        assert_eq!(state.history()[1].prompt, "edit 1");
    }

    #[test]
    fn history_is_capped_and_evicts_oldest() {
        let mut state = AppState::new();
        for n in 1..=25 {
            state.add_to_history(submission(n));
        }

        let history = state.history();
        assert_eq!(history.len(), MAX_HISTORY_ITEMS);
        assert_eq!(history[0].prompt, "edit 25");
        assert_eq!(history[MAX_HISTORY_ITEMS - 1].prompt, "edit 6");
        for n in 1..=5 {
            let prompt = format!("edit {n}");
            assert!(history.iter().all(|e| e.prompt != prompt));
        }
    }

    #[test]
    fn switch_to_history_item_sets_current() {
        let mut state = AppState::new();
        let first = submission(1);
        let first_id = first.id;
        state.add_to_history(first);
        state.add_to_history(submission(2));

        assert!(state.switch_to_history_item(first_id));
        assert_eq!(state.current_prompt(), "edit 1");
        assert_eq!(state.current_image().unwrap().locator, "output/result-1.png");
        assert_eq!(state.history().len(), 2);
        assert_eq!(state.history()[0].prompt, "edit 2");
    }

    #[test]
    fn switch_to_unknown_item_is_noop() {
        let mut state = AppState::new();
        state.set_current_prompt("keep me");
        state.add_to_history(submission(1));

        assert!(!state.switch_to_history_item(Uuid::new_v4()));
        assert_eq!(state.current_prompt(), "keep me");
    }

    #[test]
    fn error_set_and_clear() {
        let mut state = AppState::new();
        state.set_error(Some("boom".to_string()));
        assert_eq!(state.error(), Some("boom"));
        state.clear_error();
        assert!(state.error().is_none());
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut state = AppState::new();
        state.set_current_image(Some(ImageRecord::new("input.png")));
        state.set_current_prompt("prompt");
        state.set_processing(true);
        state.set_loading(true);
        state.set_error(Some("err".to_string()));
        state.add_to_history(submission(1));

        state.reset();
        assert!(state.current_image().is_none());
        assert_eq!(state.current_prompt(), "");
        assert!(!state.is_processing());
        assert!(!state.is_loading());
        assert!(state.history().is_empty());
        assert!(state.error().is_none());
    }

    #[test]
    fn clear_history_keeps_current_image() {
        let mut state = AppState::new();
        state.set_current_image(Some(ImageRecord::new("input.png")));
        state.add_to_history(submission(1));

        state.clear_history();
        assert!(state.history().is_empty());
        assert!(state.current_image().is_some());
    }

    #[test]
    fn image_record_builder() {
        let record = ImageRecord::new("in.png")
            .with_source_file("in.png")
            .with_dimensions(Some((640, 480)));
        assert_eq!(record.width, Some(640));
        assert_eq!(record.height, Some(480));
        assert_eq!(record.source_file.as_deref(), Some("in.png"));
        assert!(record.prompt.is_none());
    }
}
