use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use chrono::Local;
use punkstudy_core::upload::ACCEPTED_EXTENSIONS;
use punkstudy_core::{Message, Sender};
use crate::app::{App, FocusPane, InputMode};

const BOT_COLOR: Color = Color::Magenta;
const USER_COLOR: Color = Color::LightRed;

const STUDY_TIPS: [&str; 4] = [
    "Upload your study materials",
    "Ask questions about your notes",
    "Get AI-powered explanations",
    "Practice with generated quizzes",
];

/// Wrap text to fit within a given width, returning multiple lines
/// Uses word boundaries for wrapping; words longer than the width are split
fn wrap_text_to_width(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current_line = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: String = word.to_string();
        let mut word_len = word.chars().count();

        // Break words that can never fit on one line
        while word_len > width {
            if current_len > 0 {
                lines.push(std::mem::take(&mut current_line));
                current_len = 0;
            }
            let head: String = word.chars().take(width).collect();
            word = word.chars().skip(width).collect();
            word_len -= width;
            lines.push(head);
        }

        if current_len == 0 {
            current_line = word;
            current_len = word_len;
        } else if current_len + 1 + word_len <= width {
            current_line.push(' ');
            current_line.push_str(&word);
            current_len += 1 + word_len;
        } else {
            lines.push(std::mem::replace(&mut current_line, word));
            current_len = word_len;
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }

    lines
}

/// Visual rows for one message: bot on the left, user on the right.
///
/// `width` is the inner width of the chat pane; bubbles take at most 80% of it.
pub fn message_lines(message: &Message, width: u16) -> Vec<Line<'static>> {
    let is_bot = message.sender == Sender::Bot;
    let (alignment, color) = if is_bot {
        (Alignment::Left, BOT_COLOR)
    } else {
        (Alignment::Right, USER_COLOR)
    };

    let time = message.timestamp.with_timezone(&Local).format("%H:%M").to_string();
    let header = if is_bot {
        format!("🤖 PunkBot · {}", time)
    } else {
        format!("{} · You 🧑", time)
    };

    let mut lines = vec![Line::from(Span::styled(
        header,
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    ))
    .alignment(alignment)];

    let bubble_width = ((usize::from(width) * 4) / 5).max(10);
    let text_style = if is_bot {
        Style::default()
    } else {
        Style::default().fg(USER_COLOR)
    };
    for paragraph in message.content.lines() {
        for wrapped in wrap_text_to_width(paragraph, bubble_width) {
            lines.push(Line::from(Span::styled(wrapped, text_style)).alignment(alignment));
        }
    }
    lines.push(Line::default());
    lines
}

/// Number of rows a message occupies in the chat pane
pub fn wrapped_height(message: &Message, width: u16) -> usize {
    message_lines(message, width).len()
}

/// Rows `offset..offset + height` of the whole rendered log.
///
/// Only this window is handed to the `Paragraph`, so the log can grow past
/// what a `u16` scroll offset can address.
pub fn visible_chat_lines(
    messages: &[Message],
    width: u16,
    offset: usize,
    height: usize,
) -> Vec<Line<'static>> {
    let mut skip = offset;
    let mut visible = Vec::with_capacity(height);
    for message in messages {
        if visible.len() >= height {
            break;
        }
        let lines = message_lines(message, width);
        if skip >= lines.len() {
            skip -= lines.len();
            continue;
        }
        let room = height - visible.len();
        visible.extend(lines.into_iter().skip(skip).take(room));
        skip = 0;
    }
    visible
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    let [chat_column, side_column] = Layout::horizontal([
        Constraint::Percentage(66),
        Constraint::Percentage(34),
    ])
    .areas(body_area);

    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(chat_column);

    let [uploader_area, tips_area] = Layout::vertical([
        Constraint::Length(7),
        Constraint::Min(0),
    ])
    .areas(side_column);

    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_uploader(app, frame, uploader_area);
    render_tips(frame, tips_area);
    render_footer(app, frame, footer_area);

    // Render popups (in order of priority)
    if app.notice.is_some() {
        render_notice(app, frame, area);
    } else if app.file_picker.is_some() {
        render_file_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let awaiting = app.awaiting_replies();
    let awaiting_indicator = if awaiting > 0 {
        format!(" [{} awaiting reply]", awaiting)
    } else {
        String::new()
    };

    let title = Line::from(vec![
        Span::styled(" 📻 PunkStudy ", Style::default().fg(USER_COLOR).bold()),
        Span::styled(" ⚡ AI Powered ", Style::default().fg(Color::Yellow)),
        Span::styled(" 📖 Study Smarter ", Style::default().fg(BOT_COLOR)),
        Span::styled(awaiting_indicator, Style::default().fg(Color::Gray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store area for mouse hit-testing and inner size for scroll calculations
    app.chat_area = Some(area);
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);
    app.sync_chat_scroll();

    let focused = app.focus == FocusPane::Chat;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };
    let title = if app.follow_tail {
        " Chat ".to_string()
    } else {
        " Chat (scrolled, G for latest) ".to_string()
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    let lines = visible_chat_lines(
        app.conversation.messages(),
        app.chat_width,
        app.chat_scroll,
        usize::from(app.chat_height),
    );

    let chat = Paragraph::new(Text::from(lines)).block(block);

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == FocusPane::Input;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Send (Enter) ");

    let inner_width = usize::from(area.width.saturating_sub(2));
    let cursor_pos = app.query_cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let input = if app.query_input.is_empty() {
        Paragraph::new(Span::styled(
            "Ask anything about your notes...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let visible_text: String = app
            .query_input
            .chars()
            .skip(scroll_offset)
            .take(inner_width)
            .collect();
        Paragraph::new(visible_text).style(Style::default().fg(Color::White))
    };

    frame.render_widget(input.block(input_block), area);

    // Show cursor when editing
    if app.input_mode == InputMode::Editing && app.notice.is_none() && app.file_picker.is_none() {
        let cursor_x = u16::try_from(cursor_pos - scroll_offset).unwrap_or(0);
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_uploader(app: &App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == FocusPane::Uploader;
    let border_color = if app.uploader.is_uploading() {
        Color::Yellow
    } else if focused {
        Color::Cyan
    } else {
        Color::DarkGray
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Upload Your Notes ");

    let mut lines: Vec<Line> = Vec::new();
    if let Some(path) = app.uploader.in_flight() {
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat(usize::from(app.animation_frame) + 1);
        lines.push(Line::from(Span::styled(
            format!("⏳ Uploading your notebook{}", dots),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(Span::styled(
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Style::default().fg(Color::Gray),
        )));
    } else {
        lines.push(Line::from("⬆ Drop your notebook here"));
        lines.push(Line::from(vec![
            Span::raw("or press "),
            Span::styled("o", Style::default().fg(Color::Cyan).bold()),
            Span::raw(" to pick a file"),
        ]));
        let supported = ACCEPTED_EXTENSIONS
            .iter()
            .map(|ext| ext.to_uppercase())
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(Line::from(Span::styled(
            format!("Supports {}", supported),
            Style::default().fg(Color::Gray),
        )));
    }
    if let Some(err) = &app.picker_error {
        lines.push(Line::from(Span::styled(err.clone(), Style::default().fg(Color::Red))));
    }

    let uploader = Paragraph::new(lines)
        .block(block)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    frame.render_widget(uploader, area);
}

fn render_tips(frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Study Tips ");

    let lines: Vec<Line> = STUDY_TIPS
        .iter()
        .map(|tip| {
            Line::from(vec![
                Span::styled(" • ", Style::default().fg(USER_COLOR)),
                Span::raw(*tip),
            ])
        })
        .collect();

    let tips = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
    frame.render_widget(tips, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match app.input_mode {
        InputMode::Normal => " NORMAL ",
        InputMode::Editing => " INSERT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let pairs: Vec<(&str, &str)> = if app.notice.is_some() {
        vec![("Enter", "dismiss")]
    } else if app.file_picker.is_some() {
        vec![("j/k", "nav"), ("Enter", "open/upload"), ("Backspace", "up"), ("Esc", "cancel")]
    } else if app.input_mode == InputMode::Editing {
        vec![("Enter", "send"), ("Esc", "stop typing"), ("Tab", "focus")]
    } else {
        vec![
            ("i", "type"),
            ("j/k", "scroll"),
            ("g/G", "top/latest"),
            ("o", "upload"),
            ("Tab", "focus"),
            ("q", "quit"),
        ]
    };

    let hints = pairs.into_iter().flat_map(|(key, label)| {
        [
            Span::styled(format!(" {} ", key), key_style),
            Span::styled(format!(" {} ", label), label_style),
        ]
    });

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn centered_popup(area: Rect, width: u16, height: u16) -> Rect {
    let popup_width = width.min(area.width.saturating_sub(4));
    let popup_height = height.min(area.height.saturating_sub(4));
    let popup_x = area.x + (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = area.y + (area.height.saturating_sub(popup_height)) / 2;
    Rect::new(popup_x, popup_y, popup_width, popup_height)
}

fn render_notice(app: &App, frame: &mut Frame, area: Rect) {
    let Some(notice) = &app.notice else {
        return;
    };

    let popup_area = centered_popup(area, 44, 6);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let color = if notice.succeeded() { Color::Green } else { Color::Red };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .title(" Upload ");

    let lines = vec![
        Line::from(Span::styled(
            notice.message(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(notice.file_name.clone(), Style::default().fg(Color::Gray))),
        Line::default(),
        Line::from(Span::styled("Press Enter to continue", Style::default().fg(Color::DarkGray))),
    ];

    let popup = Paragraph::new(lines)
        .block(block)
        .alignment(Alignment::Center);
    frame.render_widget(popup, popup_area);
}

fn render_file_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let Some(picker) = app.file_picker.as_mut() else {
        return;
    };

    let height = u16::try_from(picker.entries.len() + 2).unwrap_or(u16::MAX).max(5);
    let popup_area = centered_popup(area, 60, height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" {} ", picker.dir.display()));

    if picker.entries.is_empty() {
        let empty = Paragraph::new(Span::styled(
            "No PDF, DOCX or TXT files here",
            Style::default().fg(Color::DarkGray),
        ))
        .block(block);
        frame.render_widget(empty, popup_area);
        return;
    }

    let items: Vec<ListItem> = picker
        .entries
        .iter()
        .map(|entry| ListItem::new(format!(" {} ", entry.label())))
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut picker.state);
}
