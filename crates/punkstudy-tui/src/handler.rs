use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use punkstudy_core::upload::{parse_dropped_paths, upload_path};
use tracing::debug;

use crate::app::{App, FocusPane, InputMode, PickerEntry};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Paste(text) => handle_paste(app, &text),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::QueryResolved { pending, outcome } => {
            app.conversation.resolve_query(pending, outcome);
            app.sync_chat_scroll();
        }
        AppEvent::UploadResolved(outcome) => {
            if let Some(notice) = app.uploader.finish(outcome) {
                app.notice = Some(notice);
            }
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // An open notice swallows everything until acknowledged
    if app.notice.is_some() {
        if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
            app.notice = None;
        }
        return;
    }

    if app.file_picker.is_some() {
        handle_picker(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn cycle_focus(app: &mut App) {
    app.focus = match app.focus {
        FocusPane::Input => FocusPane::Chat,
        FocusPane::Chat => FocusPane::Uploader,
        FocusPane::Uploader => FocusPane::Input,
    };

    // Auto-enter editing mode when focusing input
    if app.focus == FocusPane::Input {
        app.input_mode = InputMode::Editing;
        app.query_cursor = app.query_input.chars().count();
    } else {
        app.input_mode = InputMode::Normal;
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Tab => cycle_focus(app),

        KeyCode::Char('i') | KeyCode::Char('a') => {
            app.focus = FocusPane::Input;
            app.input_mode = InputMode::Editing;
        }

        // Half-page scroll (must be before plain 'd'/'u' to match first)
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_chat_down(usize::from((app.chat_height / 2).max(1)));
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_chat_up(usize::from((app.chat_height / 2).max(1)));
        }

        KeyCode::Char('j') | KeyCode::Down => app.scroll_chat_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_chat_up(1),
        KeyCode::PageDown => app.scroll_chat_down(usize::from(app.chat_height.max(1))),
        KeyCode::PageUp => app.scroll_chat_up(usize::from(app.chat_height.max(1))),
        KeyCode::Char('g') | KeyCode::Home => app.scroll_chat_to_top(),
        KeyCode::Char('G') | KeyCode::End => app.scroll_chat_to_bottom(),

        KeyCode::Char('o') | KeyCode::Char('u') => app.open_file_picker(),
        KeyCode::Enter if app.focus == FocusPane::Uploader => app.open_file_picker(),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Tab => cycle_focus(app),
        KeyCode::Enter => submit_query(app),
        KeyCode::Backspace => {
            if app.query_cursor > 0 {
                app.query_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.query_input, app.query_cursor);
                app.query_input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.query_input.chars().count();
            if app.query_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.query_input, app.query_cursor);
                app.query_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.query_cursor = app.query_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.query_input.chars().count();
            app.query_cursor = (app.query_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.query_cursor = 0;
        }
        KeyCode::End => {
            app.query_cursor = app.query_input.chars().count();
        }
        KeyCode::Char(c) => insert_text(app, &c.to_string()),
        _ => {}
    }
}

fn insert_text(app: &mut App, text: &str) {
    for c in text.chars() {
        // The input is a single line
        let c = if c == '\n' || c == '\r' || c == '\t' { ' ' } else { c };
        let byte_pos = char_to_byte_index(&app.query_input, app.query_cursor);
        app.query_input.insert(byte_pos, c);
        app.query_cursor += 1;
    }
}

/// Sends the typed query; the reply comes back as `AppEvent::QueryResolved`.
fn submit_query(app: &mut App) {
    // Blank input stays as typed and nothing is sent
    if app.query_input.trim().is_empty() {
        return;
    }

    let text = std::mem::take(&mut app.query_input);
    app.query_cursor = 0;
    let Some(pending) = app.conversation.begin_query(&text) else {
        return;
    };
    app.scroll_chat_to_bottom();

    let backend = Arc::clone(&app.backend);
    let user_id = app.user_id.clone();
    let events = app.events.clone();
    tokio::spawn(async move {
        let outcome = backend.process_query(pending.text(), &user_id).await;
        // The loop may already be gone on shutdown
        let _ = events.send(AppEvent::QueryResolved { pending, outcome });
    });
}

/// Starts an upload for the first of `paths` unless one is already running.
fn start_upload(app: &mut App, paths: &[PathBuf]) {
    let Some(path) = app.uploader.accept(paths) else {
        return;
    };

    let backend = Arc::clone(&app.backend);
    let user_id = app.user_id.clone();
    let events = app.events.clone();
    tokio::spawn(async move {
        let outcome = upload_path(backend.as_ref(), &path, &user_id).await;
        let _ = events.send(AppEvent::UploadResolved(outcome));
    });
}

/// Pasted file paths count as a drop; anything else is typed text.
fn handle_paste(app: &mut App, text: &str) {
    let paths = parse_dropped_paths(text);
    let is_drop = !paths.is_empty() && paths.iter().all(|path| path.is_file());

    if is_drop {
        debug!(files = paths.len(), "files dropped");
        if app.notice.is_none() {
            start_upload(app, &paths);
        }
    } else if app.input_mode == InputMode::Editing
        && app.notice.is_none()
        && app.file_picker.is_none()
    {
        insert_text(app, text);
    }
}

fn handle_picker(app: &mut App, key: KeyEvent) {
    let Some(picker) = app.file_picker.as_mut() else {
        return;
    };

    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => {
            app.file_picker = None;
        }
        KeyCode::Char('j') | KeyCode::Down => picker.nav_down(),
        KeyCode::Char('k') | KeyCode::Up => picker.nav_up(),
        KeyCode::Backspace | KeyCode::Char('h') | KeyCode::Left => {
            if let Some(parent) = picker.dir.parent().map(PathBuf::from) {
                app.open_picker_at(&parent);
            }
        }
        KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => match picker.selected().cloned() {
            Some(PickerEntry::Parent) => {
                if let Some(parent) = picker.dir.parent().map(PathBuf::from) {
                    app.open_picker_at(&parent);
                }
            }
            Some(PickerEntry::Dir(dir)) => app.open_picker_at(&dir),
            Some(PickerEntry::File(path)) => {
                app.file_picker = None;
                start_upload(app, &[path]);
            }
            None => {}
        },
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);

    if !in_chat || app.notice.is_some() || app.file_picker.is_some() {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_chat_down(3),
        MouseEventKind::ScrollUp => app.scroll_chat_up(3),
        _ => {}
    }
}
