use std::path::{Path, PathBuf};
use std::sync::Arc;

use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use punkstudy_core::upload::is_accepted;
use punkstudy_core::{Backend, Config, ConversationStore, Notice, UploadWidget};
use tokio::sync::mpsc;

use crate::tui::AppEvent;
use crate::ui::wrapped_height;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Chat,
    Input,
    Uploader,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerEntry {
    Parent,
    Dir(PathBuf),
    File(PathBuf),
}

impl PickerEntry {
    pub fn label(&self) -> String {
        match self {
            PickerEntry::Parent => "../".to_string(),
            PickerEntry::Dir(path) => format!("{}/", file_label(path)),
            PickerEntry::File(path) => file_label(path),
        }
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Directory browser offering only the accepted document types
pub struct FilePicker {
    pub dir: PathBuf,
    pub entries: Vec<PickerEntry>,
    pub state: ListState,
}

impl FilePicker {
    pub fn open(dir: &Path) -> std::io::Result<Self> {
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let hidden = path
                .file_name()
                .map(|name| name.to_string_lossy().starts_with('.'))
                .unwrap_or(false);
            if hidden {
                continue;
            }
            if path.is_dir() {
                dirs.push(path);
            } else if is_accepted(&path) {
                files.push(path);
            }
        }
        dirs.sort();
        files.sort();

        let mut entries = Vec::with_capacity(dirs.len() + files.len() + 1);
        if dir.parent().is_some() {
            entries.push(PickerEntry::Parent);
        }
        entries.extend(dirs.into_iter().map(PickerEntry::Dir));
        entries.extend(files.into_iter().map(PickerEntry::File));

        let mut state = ListState::default();
        if !entries.is_empty() {
            state.select(Some(0));
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            entries,
            state,
        })
    }

    pub fn selected(&self) -> Option<&PickerEntry> {
        self.state.selected().and_then(|i| self.entries.get(i))
    }

    pub fn nav_down(&mut self) {
        let len = self.entries.len();
        if len > 0 {
            let i = self.state.selected().unwrap_or(0);
            self.state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn nav_up(&mut self) {
        let i = self.state.selected().unwrap_or(0);
        self.state.select(Some(i.saturating_sub(1)));
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,

    // Conversation
    pub conversation: ConversationStore,
    pub query_input: String,
    pub query_cursor: usize, // cursor position in query_input (chars)
    pub chat_scroll: usize, // first visible row of the rendered log
    pub follow_tail: bool,
    pub chat_height: u16, // inner height of the chat pane, set during render
    pub chat_width: u16,  // inner width of the chat pane, set during render

    // Uploads
    pub uploader: UploadWidget,
    pub notice: Option<Notice>,
    pub file_picker: Option<FilePicker>,
    pub picker_error: Option<String>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Panel areas for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,

    // Backend access
    pub backend: Arc<dyn Backend>,
    pub user_id: String,
    pub events: mpsc::UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(
        backend: Arc<dyn Backend>,
        config: &Config,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            focus: FocusPane::Input,

            conversation: ConversationStore::with_greeting(config.reply_ordering()),
            query_input: String::new(),
            query_cursor: 0,
            chat_scroll: 0,
            follow_tail: true,
            chat_height: 0,
            chat_width: 0,

            uploader: UploadWidget::new(),
            notice: None,
            file_picker: None,
            picker_error: None,

            animation_frame: 0,

            chat_area: None,

            backend,
            user_id: config.user_id().to_string(),
            events,
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.uploader.is_uploading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Total rendered height of the chat log at the current width
    pub fn chat_content_height(&self) -> usize {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 { self.chat_width } else { 50 };
        self.conversation
            .messages()
            .iter()
            .map(|msg| wrapped_height(msg, wrap_width))
            .sum()
    }

    fn max_chat_scroll(&self) -> usize {
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.chat_content_height().saturating_sub(usize::from(visible_height))
    }

    /// Keep the newest message visible unless the user scrolled away
    pub fn sync_chat_scroll(&mut self) {
        if self.follow_tail {
            self.chat_scroll = self.max_chat_scroll();
        } else {
            self.chat_scroll = self.chat_scroll.min(self.max_chat_scroll());
        }
    }

    pub fn scroll_chat_down(&mut self, lines: usize) {
        let max = self.max_chat_scroll();
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max);
        self.follow_tail = self.chat_scroll >= max;
    }

    pub fn scroll_chat_up(&mut self, lines: usize) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
        self.follow_tail = self.chat_scroll >= self.max_chat_scroll();
    }

    pub fn scroll_chat_to_top(&mut self) {
        self.chat_scroll = 0;
        self.follow_tail = self.max_chat_scroll() == 0;
    }

    pub fn scroll_chat_to_bottom(&mut self) {
        self.follow_tail = true;
        self.sync_chat_scroll();
    }

    pub fn open_file_picker(&mut self) {
        if self.uploader.is_uploading() {
            return;
        }
        let start = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        self.open_picker_at(&start);
    }

    pub fn open_picker_at(&mut self, dir: &Path) {
        match FilePicker::open(dir) {
            Ok(picker) => {
                self.picker_error = None;
                self.file_picker = Some(picker);
            }
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "could not list directory");
                self.picker_error = Some(format!("Cannot open {}: {}", dir.display(), err));
            }
        }
    }

    /// Replies still outstanding, shown in the header
    pub fn awaiting_replies(&self) -> usize {
        self.conversation.awaiting_replies()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use punkstudy_core::{
        GenerationResult, QueryResult, TransportError, UploadFile, UploadResult,
    };
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    use crate::ui;

    /// The scroll tests never reach the network.
    struct OfflineBackend;

    #[async_trait]
    impl Backend for OfflineBackend {
        async fn upload_document(
            &self,
            _file: &UploadFile,
            _user_id: &str,
        ) -> Result<UploadResult, TransportError> {
            unreachable!()
        }

        async fn process_query(
            &self,
            _query: &str,
            _user_id: &str,
        ) -> Result<QueryResult, TransportError> {
            unreachable!()
        }

        async fn generate_text(
            &self,
            _prompt: &str,
            _max_length: u32,
        ) -> Result<GenerationResult, TransportError> {
            unreachable!()
        }
    }

    fn offline_app() -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        App::new(Arc::new(OfflineBackend), &Config::new(), tx)
    }

    fn screen_text(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_newest_message_visible_past_u16_rows() {
        let mut app = offline_app();
        for i in 0..=25_000 {
            app.conversation.append_user_message(&format!("message {i}"));
        }
        assert!(app.chat_content_height() > usize::from(u16::MAX));

        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|frame| ui::render(&mut app, frame)).unwrap();

        assert!(app.follow_tail);
        assert_eq!(
            app.chat_scroll,
            app.chat_content_height() - usize::from(app.chat_height)
        );
        let screen = screen_text(&terminal);
        assert!(screen.contains("message 25000"));
        assert!(!screen.contains("message 24990"));
    }

    #[test]
    fn test_scrolled_view_holds_until_bottom() {
        let mut app = offline_app();
        for i in 0..40 {
            app.conversation.append_user_message(&format!("message {i}"));
        }
        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|frame| ui::render(&mut app, frame)).unwrap();
        let tail = app.chat_scroll;
        assert!(app.follow_tail);

        app.scroll_chat_up(5);
        assert!(!app.follow_tail);
        app.conversation.append_user_message("late arrival");
        terminal.draw(|frame| ui::render(&mut app, frame)).unwrap();
        assert_eq!(app.chat_scroll, tail - 5);
        assert!(!screen_text(&terminal).contains("late arrival"));

        app.scroll_chat_to_bottom();
        terminal.draw(|frame| ui::render(&mut app, frame)).unwrap();
        assert!(app.follow_tail);
        assert!(screen_text(&terminal).contains("late arrival"));
    }

    #[test]
    fn test_scroll_to_top_and_back() {
        let mut app = offline_app();
        for i in 0..40 {
            app.conversation.append_user_message(&format!("message {i}"));
        }
        app.chat_width = 60;
        app.chat_height = 10;

        app.scroll_chat_to_top();
        assert_eq!(app.chat_scroll, 0);
        assert!(!app.follow_tail);

        app.scroll_chat_down(usize::MAX);
        assert_eq!(app.chat_scroll, app.chat_content_height() - 10);
        assert!(app.follow_tail);
    }

    #[test]
    fn test_picker_lists_dirs_and_accepted_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("week2")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::write(dir.path().join("slides.pdf"), "x").unwrap();
        std::fs::write(dir.path().join("photo.png"), "x").unwrap();
        std::fs::write(dir.path().join(".hidden.txt"), "x").unwrap();

        let picker = FilePicker::open(dir.path()).unwrap();
        let labels: Vec<String> = picker.entries.iter().map(PickerEntry::label).collect();
        assert_eq!(labels, ["../", "week2/", "notes.txt", "slides.pdf"]);
        assert_eq!(picker.selected(), Some(&PickerEntry::Parent));
    }

    #[test]
    fn test_picker_navigation_clamps() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();

        let mut picker = FilePicker::open(dir.path()).unwrap();
        picker.nav_up();
        assert_eq!(picker.state.selected(), Some(0));
        picker.nav_down();
        picker.nav_down();
        assert_eq!(picker.state.selected(), Some(1));
        assert!(matches!(picker.selected(), Some(PickerEntry::File(_))));
    }
}
