use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};

use crate::app::{App, InputMode, Status};
use crate::model::{FileEntry, ResourceKind, RowData};
use crate::navigation::ViewKind;
use crate::viewport::{Searchable, Viewport};
use crate::views::{ViewBody, list_resource, list_view};

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);
const PL_C: Color = Color::Rgb(55, 48, 163);
const PL_D: Color = Color::Rgb(82, 24, 124);
const SELECTED_BG: Color = Color::Rgb(24, 36, 58);

pub fn render(frame: &mut Frame, app: &App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    render_body(frame, root[1], app);
    render_footer(frame, root[2], app);
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let left_line = build_left_header_line(app);
    let right_line = build_right_header_line(app);
    let right_width = spans_width(&right_line.spans) as u16;
    if area.width < 42 || right_width == 0 || right_width >= area.width {
        frame.render_widget(
            Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
            area,
        );
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(right_line).style(Style::default().bg(BG)),
        chunks[1],
    );
}

fn build_left_header_line(app: &App) -> Line<'static> {
    let active = app.nav().active();
    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, " berth ", Color::White, PL_A, PL_B);
    push_powerline_segment(
        &mut spans,
        format!(" {} ", compact_text(app.runtime_label(), 16)),
        Color::White,
        PL_B,
        PL_C,
    );

    let detail = list_resource(active).map(|kind| {
        let table = app.views().table(kind);
        let refreshed = table
            .last_refreshed()
            .map(|at| at.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "--:--:--".to_string());
        let loading = if table.is_loading() { " ⟳" } else { "" };
        format!(" {} {refreshed}{loading} ", compact_text(&table.scope().label(), 28))
    });
    match detail {
        Some(detail) => {
            push_powerline_segment(&mut spans, format!(" {active} "), Color::White, PL_C, PL_D);
            push_powerline_segment(&mut spans, detail, Color::White, PL_D, BG);
        }
        None => push_powerline_segment(&mut spans, format!(" {active} "), Color::White, PL_C, BG),
    }
    Line::from(spans)
}

fn build_right_header_line(app: &App) -> Line<'static> {
    let active = app.nav().active();
    let mut spans = Vec::new();
    let mut next_bg = BG;
    for (slot, kind) in ResourceKind::ALL.into_iter().enumerate() {
        let is_active = list_view(kind) == active;
        let bg = if is_active {
            Color::Rgb(59, 130, 246)
        } else {
            Color::Rgb(30, 41, 59)
        };
        let fg = if is_active { Color::Black } else { Color::White };
        push_powerline_segment_rtl(&mut spans, view_slot_label(slot + 1, kind, is_active), fg, bg, next_bg);
        next_bg = bg;
    }
    spans.push(Span::styled(" ", Style::default().bg(next_bg)));
    Line::from(spans)
}

fn render_body(frame: &mut Frame, area: Rect, app: &App) {
    let active = app.nav().active();
    if active == ViewKind::Confirm {
        let beneath = app.nav().previous().unwrap_or(ViewKind::Containers);
        render_view(frame, area, app, beneath);
        if let ViewBody::Confirm { prompt } = app.views().get(active).body() {
            render_confirm_modal(frame, &prompt);
        }
        return;
    }
    render_view(frame, area, app, active);
}

fn render_view(frame: &mut Frame, area: Rect, app: &App, kind: ViewKind) {
    let view = app.views().get(kind);
    let title = view.title();
    match view.body() {
        ViewBody::Table {
            headers,
            rows,
            error,
        } => {
            let title = decorate_title(title, rows);
            if rows.is_empty()
                && let Some(error) = error
            {
                render_error(frame, area, &title, error);
                return;
            }
            render_table(frame, area, &title, headers, rows, error.is_some());
        }
        ViewBody::Lines { lines, error } => {
            let title = decorate_title(title, lines);
            if lines.is_empty()
                && let Some(error) = error
            {
                render_error(frame, area, &title, error);
                return;
            }
            let json = kind == ViewKind::Inspect;
            render_lines(frame, area, &title, lines, json, error.is_some());
        }
        ViewBody::Files { entries, error } => {
            let title = decorate_title(title, entries);
            if entries.is_empty()
                && let Some(error) = error
            {
                render_error(frame, area, &title, error);
                return;
            }
            render_files(frame, area, &title, entries);
        }
        ViewBody::Confirm { prompt } => render_confirm_modal(frame, &prompt),
    }
}

/// Appends the active filter and search position to a view title.
fn decorate_title<T: Searchable>(mut title: String, viewport: &Viewport<T>) -> String {
    if let Some(filter) = viewport.filter_state() {
        let state = if filter.is_enabled() { "" } else { " off" };
        title.push_str(&format!(" | {}{state}", compact_text(filter.label(), 24)));
    }
    if let Some(search) = viewport.search_state() {
        let total = search.matches().len();
        let position = search.current().map_or(0, |current| current + 1);
        title.push_str(&format!(
            " /{} {position}/{total}",
            compact_text(&search.query().pattern, 24)
        ));
    }
    title
}

fn body_block(title: &str, border: Color) -> Block<'static> {
    Block::default()
        .title(title.to_string())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(PANEL))
}

fn render_error(frame: &mut Frame, area: Rect, title: &str, error: &str) {
    let panel = Paragraph::new(Text::from(error.to_string()))
        .wrap(Wrap { trim: false })
        .block(body_block(title, ERROR))
        .style(Style::default().fg(ERROR));
    frame.render_widget(panel, area);
}

fn row_style<T: Searchable>(viewport: &Viewport<T>, index: usize) -> Style {
    if viewport.is_current_match(index) {
        Style::default().fg(Color::Black).bg(WARN)
    } else if viewport.is_match(index) {
        Style::default().fg(WARN)
    } else {
        Style::default().fg(Color::White)
    }
}

fn render_table(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    headers: &[String],
    rows: &Viewport<RowData>,
    stale: bool,
) {
    let header_row = Row::new(headers.iter().map(|header| {
        Cell::from(header.clone()).style(Style::default().add_modifier(Modifier::BOLD))
    }))
    .height(1)
    .style(Style::default().fg(ACCENT));

    let (start, _) = rows.window();
    let body_rows = rows.window_rows().map(|(index, row)| {
        Row::new(row.cells.iter().cloned().map(Cell::from)).style(row_style(rows, index))
    });

    let border = if stale { ERROR } else { ACCENT };
    let table = Table::new(body_rows, column_constraints(headers.len()))
        .header(header_row)
        .block(body_block(title, border))
        .column_spacing(1)
        .row_highlight_style(Style::default().bg(SELECTED_BG).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    let mut state = TableState::default();
    if !rows.is_empty() {
        state.select(Some(rows.cursor().saturating_sub(start)));
    }
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_lines(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    lines: &Viewport<String>,
    json: bool,
    failed: bool,
) {
    let cursor = lines.cursor();
    let text = lines
        .window_rows()
        .map(|(index, line)| {
            let mut rendered = if json && !lines.is_match(index) {
                highlight_json_line(line)
            } else {
                Line::from(Span::styled(line.clone(), row_style(lines, index)))
            };
            if index == cursor {
                rendered = rendered.style(Style::default().bg(SELECTED_BG));
            }
            rendered
        })
        .collect::<Vec<_>>();

    let border = if failed { ERROR } else { ACCENT };
    let paragraph = Paragraph::new(text)
        .block(body_block(title, border))
        .style(Style::default().fg(Color::White));
    frame.render_widget(paragraph, area);
}

fn render_files(frame: &mut Frame, area: Rect, title: &str, entries: &Viewport<FileEntry>) {
    let cursor = entries.cursor();
    let text = entries
        .window_rows()
        .map(|(index, entry)| {
            let (label, color) = if entry.is_dir {
                (format!("{}/", entry.name), Color::Rgb(125, 211, 252))
            } else {
                (entry.name.clone(), Color::White)
            };
            let mut style = row_style(entries, index);
            if !entries.is_match(index) {
                style = style.fg(color);
            }
            if index == cursor {
                style = style.bg(SELECTED_BG).add_modifier(Modifier::BOLD);
            }
            Line::from(Span::styled(label, style))
        })
        .collect::<Vec<_>>();

    frame.render_widget(
        Paragraph::new(text).block(body_block(title, ACCENT)),
        area,
    );
}

fn render_confirm_modal(frame: &mut Frame, prompt: &str) {
    let area = centered_rect(60, 40, frame.area());
    frame.render_widget(Clear, area);
    let modal = Paragraph::new(Line::from(prompt.to_string()))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .title("Confirm")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(WARN))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(Color::White));
    frame.render_widget(modal, area);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    if app.mode() == InputMode::Normal {
        render_status_footer(frame, area, app);
        return;
    }

    let (label, sigil, prompt_bg) = match app.mode() {
        InputMode::Command => (" cmd ", ':', ACCENT),
        InputMode::Search => (" search ", '/', Color::Rgb(125, 211, 252)),
        InputMode::Filter | InputMode::Normal => (" filter ", '|', WARN),
    };

    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, label, Color::Black, prompt_bg, PL_B);
    push_powerline_segment(
        &mut spans,
        format!(" {sigil}{} ", app.input()),
        Color::White,
        PL_B,
        BG,
    );
    if matches!(app.mode(), InputMode::Search | InputMode::Filter) {
        let (ignore_case, regex) = app.pattern_flags();
        let flag = |on: bool, name: &str| {
            let style = if on {
                Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(MUTED)
            };
            Span::styled(format!(" [{name}]"), style)
        };
        spans.push(flag(regex, "regex"));
        spans.push(flag(ignore_case, "icase"));
        spans.push(Span::styled("  ^R ^T", Style::default().fg(MUTED)));
    }
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        area,
    );
}

fn render_status_footer(frame: &mut Frame, area: Rect, app: &App) {
    let (text, fg, bg) = if app.quit_armed() {
        ("Really quit? (y/n)".to_string(), Color::Black, WARN)
    } else {
        match app.status() {
            Some(Status::Error(text)) => (text.clone(), Color::Black, ERROR),
            Some(Status::Info(text)) => (text.clone(), Color::White, PL_B),
            None => (String::new(), Color::White, PL_B),
        }
    };

    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, " nrm ", Color::White, PL_A, bg);
    let width_hint = area.width.saturating_sub(28).max(24) as usize;
    push_powerline_segment(
        &mut spans,
        format!(" {} ", compact_text(&text, width_hint)),
        fg,
        bg,
        BG,
    );

    let right = Line::from(vec![Span::styled(
        format!(
            " {} · ? help ",
            app.config_source().map_or("defaults".to_string(), |source| compact_text(source, 24))
        ),
        Style::default().fg(MUTED),
    )]);
    let right_width = spans_width(&right.spans) as u16;
    if right_width + 28 > area.width {
        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
            area,
        );
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(right)
            .style(Style::default().bg(BG))
            .alignment(Alignment::Right),
        chunks[1],
    );
}

fn highlight_json_line(line: &str) -> Line<'static> {
    let chars = line.chars().collect::<Vec<_>>();
    let mut index = 0usize;
    let mut spans = Vec::new();

    while index < chars.len() {
        let ch = chars[index];
        if ch.is_ascii_whitespace() {
            spans.push(Span::raw(ch.to_string()));
            index += 1;
            continue;
        }

        if matches!(ch, '{' | '}' | '[' | ']' | ':' | ',') {
            spans.push(Span::styled(ch.to_string(), Style::default().fg(MUTED)));
            index += 1;
            continue;
        }

        if ch == '"' {
            let (token, next_index) = read_json_string(&chars, index);
            let mut look_ahead = next_index;
            while look_ahead < chars.len() && chars[look_ahead].is_ascii_whitespace() {
                look_ahead += 1;
            }
            let color = if look_ahead < chars.len() && chars[look_ahead] == ':' {
                Color::Rgb(103, 232, 249)
            } else {
                Color::Rgb(125, 211, 252)
            };
            spans.push(Span::styled(token, Style::default().fg(color)));
            index = next_index;
            continue;
        }

        if ch.is_ascii_digit() || ch == '-' {
            let start = index;
            while index < chars.len()
                && (chars[index].is_ascii_digit()
                    || matches!(chars[index], '-' | '+' | '.' | 'e' | 'E'))
            {
                index += 1;
            }
            spans.push(Span::styled(
                chars[start..index].iter().collect::<String>(),
                Style::default().fg(Color::Rgb(251, 146, 60)),
            ));
            continue;
        }

        if ch.is_ascii_alphabetic() {
            let start = index;
            while index < chars.len() && chars[index].is_ascii_alphabetic() {
                index += 1;
            }
            let word = chars[start..index].iter().collect::<String>();
            let color = if matches!(word.as_str(), "true" | "false" | "null") {
                WARN
            } else {
                Color::White
            };
            spans.push(Span::styled(word, Style::default().fg(color)));
            continue;
        }

        spans.push(Span::styled(ch.to_string(), Style::default().fg(Color::White)));
        index += 1;
    }

    Line::from(spans)
}

fn read_json_string(chars: &[char], start: usize) -> (String, usize) {
    let mut index = start;
    let mut escaped = false;
    let mut token = String::new();
    while index < chars.len() {
        let ch = chars[index];
        token.push(ch);
        if index > start {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                return (token, index + 1);
            }
        }
        index += 1;
    }
    (token, chars.len())
}

fn push_powerline_segment(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
}

fn push_powerline_segment_rtl(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
}

fn view_slot_label(slot: usize, kind: ResourceKind, active: bool) -> String {
    if active {
        format!(" ◉{slot} {} ", kind.title().to_lowercase())
    } else {
        format!(" {slot} ")
    }
}

fn spans_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(|span| span.content.chars().count()).sum()
}

fn compact_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }

    if max_chars <= 1 {
        return "…".to_string();
    }

    let mut out = value
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn column_constraints(columns: usize) -> Vec<Constraint> {
    if columns == 0 {
        return vec![Constraint::Percentage(100)];
    }

    let width = (100 / columns as u16).max(1);
    (0..columns)
        .map(|_| Constraint::Percentage(width))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{compact_text, highlight_json_line, render};
    use crate::app::{App, Msg};
    use crate::config::Settings;
    use crate::model::{ListScope, ResourceKind, RowData, TableData};
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn screen(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 14)).unwrap();
        terminal.draw(|frame| render(frame, app)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        let width = buffer.area.width as usize;
        buffer
            .content()
            .chunks(width)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn loaded_app() -> App {
        let mut app = App::new(Settings::default()).unwrap();
        app.update(Msg::Resize { cols: 100, rows: 14 });
        app.init();
        app.update(Msg::RowsLoaded {
            kind: ResourceKind::Containers,
            scope: ListScope::default(),
            result: Ok(TableData {
                headers: vec!["NAME".to_string(), "STATE".to_string()],
                rows: ["web", "db"]
                    .into_iter()
                    .map(|name| RowData {
                        id: name.to_string(),
                        name: name.to_string(),
                        cells: vec![name.to_string(), "running".to_string()],
                        ..RowData::default()
                    })
                    .collect(),
            }),
        });
        app
    }

    #[test]
    fn renders_table_rows_under_header() {
        let screen = screen(&loaded_app());
        let lines = screen.lines().collect::<Vec<_>>();
        assert!(lines[0].contains("berth"));
        assert!(lines[1].contains("Containers [2]"));
        assert!(lines[2].contains("NAME"));
        assert!(lines[3].contains("web"));
        assert!(lines[4].contains("db"));
    }

    #[test]
    fn footer_shows_quit_gate() {
        let mut app = loaded_app();
        app.update(Msg::Key(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE)));
        let screen = screen(&app);
        assert!(screen.lines().last().unwrap().contains("Really quit? (y/n)"));
    }

    #[test]
    fn confirm_modal_draws_over_previous_view() {
        let mut app = loaded_app();
        app.update(Msg::Key(KeyEvent::new(KeyCode::Char('s'), KeyModifiers::NONE)));
        let screen = screen(&app);
        assert!(screen.contains("Stop web?"));
        assert!(screen.contains("Containers [2]"));
    }

    #[test]
    fn command_prompt_is_echoed() {
        let mut app = loaded_app();
        for c in [':', 'l', 'o'] {
            app.update(Msg::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)));
        }
        assert!(screen(&app).lines().last().unwrap().contains(":lo"));
    }

    #[test]
    fn json_keys_and_literals_are_split() {
        let line = highlight_json_line("  \"Running\": true,");
        let tokens = line
            .spans
            .iter()
            .map(|span| span.content.to_string())
            .filter(|token| !token.trim().is_empty())
            .collect::<Vec<_>>();
        assert_eq!(tokens, vec!["\"Running\"", ":", "true", ","]);
    }

    #[test]
    fn compact_text_truncates_with_ellipsis() {
        assert_eq!(compact_text("containers", 5), "cont…");
        assert_eq!(compact_text("web", 5), "web");
    }
}
