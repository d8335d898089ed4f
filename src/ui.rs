pub mod charting;
pub mod screen;

use chrono::Local;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Cell, Chart, Dataset, GraphType, Paragraph, Row, Table, Widget, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::app::{App, AppState};
use crate::session::Word;
use crate::time_series::chart_bounds;
use crate::transport::ConnectionState;
use crate::util::{format_time, format_wpm};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;
const PAPER_WIDTH: u16 = 26;

/// Draw the screen for the current state.
pub fn draw(app: &mut App, f: &mut Frame) {
    let screen = screen::current_screen(&app.state);
    screen.render(app, f);
}

struct TypingLayout {
    status: Rect,
    words: Rect,
    hint: Rect,
    legend: Rect,
    tape: Option<Rect>,
}

fn typing_layout(area: Rect, show_tape: bool) -> TypingLayout {
    let (main, tape) = if show_tape && area.width > PAPER_WIDTH * 2 {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(1), Constraint::Length(PAPER_WIDTH)])
            .split(area);
        (cols[0], Some(cols[1]))
    } else {
        (area, None)
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Length(1), // status
            Constraint::Length(1), // padding
            Constraint::Min(1),    // words
            Constraint::Length(1), // hint
            Constraint::Length(1), // legend
        ])
        .split(main);

    TypingLayout {
        status: rows[0],
        words: rows[2],
        hint: rows[3],
        legend: rows[4],
        tape,
    }
}

/// Display width of a word slot: the target, or the input if it runs longer.
fn slot_width(word: &Word) -> usize {
    word.target.width().max(word.input.trim().width())
}

/// Greedy word wrap. Returns the line each word lands on.
pub fn wrap_words(words: &[Word], width: usize) -> Vec<usize> {
    let width = width.max(1);
    let mut lines = Vec::with_capacity(words.len());
    let mut line = 0;
    let mut used = 0;
    for word in words {
        let w = slot_width(word);
        if used > 0 && used + 1 + w > width {
            line += 1;
            used = 0;
        }
        used += if used == 0 { w } else { w + 1 };
        lines.push(line);
    }
    lines
}

/// Keep the scroll target on the active word's line.
pub fn follow_current_word(app: &mut App, area: Rect) {
    let layout = typing_layout(area, !app.paper_tape.is_empty());
    let lines = wrap_words(app.session.words(), layout.words.width as usize);
    let line = lines.get(app.session.current_index()).copied().unwrap_or(0);
    app.scroll_to(line);
}

fn word_spans<'a>(word: &'a Word, style: Style) -> Vec<Span<'a>> {
    vec![Span::styled(word.target.as_str(), style)]
}

fn active_word_spans(word: &Word) -> Vec<Span<'static>> {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let typed: Vec<char> = word.input.trim_start().chars().collect();
    let target: Vec<char> = word.target.chars().collect();

    let mut spans = Vec::new();
    for (i, &expected) in target.iter().enumerate() {
        let span = match typed.get(i) {
            Some(&c) if c == expected => Span::styled(c.to_string(), bold.fg(Color::Green)),
            Some(&c) => Span::styled(
                match c {
                    ' ' => "·".to_string(),
                    c => c.to_string(),
                },
                bold.fg(Color::Red),
            ),
            None => Span::styled(
                expected.to_string(),
                bold.add_modifier(Modifier::DIM | Modifier::UNDERLINED),
            ),
        };
        spans.push(span);
    }
    if typed.len() > target.len() {
        let extra: String = typed[target.len()..].iter().collect();
        spans.push(Span::styled(extra, bold.fg(Color::Red)));
    }
    spans
}

fn words_text(app: &App, width: usize) -> Vec<Line<'_>> {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let words = app.session.words();
    let current = app.session.current_index();
    let placement = wrap_words(words, width);

    let mut lines: Vec<Line> = Vec::new();
    for (idx, word) in words.iter().enumerate() {
        let line = placement[idx];
        if lines.len() <= line {
            lines.push(Line::default());
        } else {
            lines[line].spans.push(Span::raw(" "));
        }

        let spans = match idx.cmp(&current) {
            std::cmp::Ordering::Less if word.soft_error => word_spans(word, bold.fg(Color::Red)),
            std::cmp::Ordering::Less if word.backspaced => {
                word_spans(word, bold.fg(Color::Rgb(255, 165, 0)))
            }
            std::cmp::Ordering::Less => word_spans(word, bold.fg(Color::Green)),
            std::cmp::Ordering::Equal => active_word_spans(word),
            std::cmp::Ordering::Greater => word_spans(word, bold.add_modifier(Modifier::DIM)),
        };
        lines[line].spans.extend(spans);
    }
    lines
}

fn status_line(app: &App) -> Line<'_> {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let dim = Style::default().add_modifier(Modifier::DIM);
    let session = &app.session;

    let clock_style = if session.timer_running() { bold } else { dim };
    let source = match app.plover {
        ConnectionState::Connected => Span::styled("plover", Style::default().fg(Color::Green)),
        ConnectionState::Connecting => Span::styled("connecting", Style::default().fg(Color::Yellow)),
        ConnectionState::Disconnected => Span::styled("keyboard", dim),
    };

    Line::from(vec![
        Span::styled(format_time(session.elapsed_secs()), clock_style),
        Span::raw("   "),
        Span::styled(format_wpm(app.wpm), bold.fg(Color::Magenta)),
        Span::raw("   "),
        Span::styled(format!("{:>3.0}%", session.progress() * 100.0), bold),
        Span::raw("   "),
        Span::styled(session.lesson_name().to_string(), Style::default().add_modifier(Modifier::ITALIC)),
        Span::raw("   "),
        source,
    ])
}

fn render_paper_tape(app: &App, area: Rect, buf: &mut Buffer) {
    let rows = area.height.saturating_sub(2) as usize;
    let skip = app.paper_tape.len().saturating_sub(rows);
    let lines: Vec<Line> = app
        .paper_tape
        .iter()
        .skip(skip)
        .map(|l| match &l.translation {
            Some(t) => Line::from(vec![
                Span::raw(l.paper.as_str()),
                Span::raw(" "),
                Span::styled(t.as_str(), Style::default().fg(Color::Cyan)),
            ]),
            None => Line::from(l.paper.as_str()),
        })
        .collect();

    Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("paper"))
        .render(area, buf);
}

fn render_typing(app: &App, area: Rect, buf: &mut Buffer) {
    let italic_style = Style::default().add_modifier(Modifier::ITALIC);
    let layout = typing_layout(area, !app.paper_tape.is_empty());

    Paragraph::new(status_line(app))
        .alignment(Alignment::Center)
        .render(layout.status, buf);

    let offset = (app.scroll - 1.0).max(0.0).round() as u16;
    Paragraph::new(words_text(app, layout.words.width as usize))
        .scroll((offset, 0))
        .render(layout.words, buf);

    if let Some(outline) = app.hint() {
        Paragraph::new(Span::styled(
            format!("hint: {outline}"),
            Style::default().fg(Color::Cyan),
        ))
        .alignment(Alignment::Center)
        .render(layout.hint, buf);
    }

    Paragraph::new(Span::styled(
        "(←) restart / (ctrl-p) reconnect plover / (esc)ape",
        italic_style,
    ))
    .render(layout.legend, buf);

    if let Some(tape) = layout.tape {
        render_paper_tape(app, tape, buf);
    }
}

fn render_results(app: &App, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let italic_style = Style::default().add_modifier(Modifier::ITALIC);
    let magenta_style = Style::default().fg(Color::Magenta);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Min(1),    // chart
            Constraint::Length(1), // stats
            Constraint::Length(1), // personal best
            Constraint::Length(1), // padding
            Constraint::Length(1), // legend
        ])
        .split(area);

    let samples = app.session.wpm_samples();
    let (overall_duration, highest_wpm) = chart_bounds(samples);
    let tuples = charting::to_tuples(samples);
    let datasets = vec![Dataset::default()
        .marker(ratatui::symbols::Marker::Braille)
        .style(magenta_style)
        .graph_type(GraphType::Line)
        .data(&tuples)];

    Chart::new(datasets)
        .x_axis(
            Axis::default()
                .title("seconds")
                .bounds([0.0, overall_duration])
                .labels(vec![
                    Span::styled("0", bold_style),
                    Span::styled(charting::format_label(overall_duration), bold_style),
                ]),
        )
        .y_axis(
            Axis::default()
                .title("wpm")
                .bounds([0.0, highest_wpm.max(1.0)])
                .labels(vec![
                    Span::styled("0", bold_style),
                    Span::styled(charting::format_label(highest_wpm), bold_style),
                ]),
        )
        .render(chunks[0], buf);

    let word_count = app.session.words().len();
    let mistakes = app.session.mistake_count();
    let accuracy = app
        .session
        .result()
        .map(|r| r.accuracy(word_count))
        .unwrap_or(1.0);
    Paragraph::new(Span::styled(
        format!(
            "{} wpm   {} words   {} mistakes   {:.0}% acc   {}",
            app.wpm,
            app.session.rate().words_completed(),
            mistakes,
            accuracy * 100.0,
            format_time(app.session.elapsed_secs()).trim()
        ),
        bold_style,
    ))
    .alignment(Alignment::Center)
    .render(chunks[1], buf);

    let runs = app.lesson_history().len();
    if let Some(best) = app.personal_best() {
        Paragraph::new(Span::styled(
            format!("personal best {best} wpm over {runs} runs"),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::ITALIC),
        ))
        .alignment(Alignment::Center)
        .render(chunks[2], buf);
    }

    Paragraph::new(Span::styled("(r)etry / (h)istory / (esc)ape", italic_style))
        .render(chunks[4], buf);
}

pub fn render_history(app: &App, area: Rect, buf: &mut Buffer) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([
            Constraint::Length(3), // title
            Constraint::Min(0),    // table
            Constraint::Length(1), // legend
        ])
        .split(area);

    Paragraph::new(format!("{} results", app.history.len()))
        .block(Block::default().borders(Borders::ALL).title("History"))
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .alignment(Alignment::Center)
        .render(chunks[0], buf);

    let now = Local::now();
    let current_hash = app.lesson.fingerprint();
    let rows: Vec<Row> = app
        .history
        .iter()
        .rev()
        .skip(app.history_offset)
        .map(|r| {
            let style = if r.lesson_hash == current_hash {
                Style::default().fg(Color::Green)
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from(r.ago(now)),
                Cell::from(r.lesson_name.clone()),
                Cell::from(r.wpm.to_string()),
                Cell::from(r.mistakes.to_string()),
            ])
            .style(style)
        })
        .collect();

    let header = Row::new(vec!["when", "lesson", "wpm", "mistakes"])
        .style(Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED));

    Table::new(
        rows,
        [
            Constraint::Length(16),
            Constraint::Min(10),
            Constraint::Length(6),
            Constraint::Length(9),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL))
    .render(chunks[1], buf);

    Paragraph::new(Span::styled(
        "(↑/↓) scroll / (b)ack / (r)etry / (esc)ape",
        Style::default().add_modifier(Modifier::ITALIC),
    ))
    .wrap(Wrap { trim: true })
    .render(chunks[2], buf);
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        match self.state {
            AppState::Typing => render_typing(self, area, buf),
            AppState::Results => render_results(self, area, buf),
            AppState::History => render_history(self, area, buf),
        }
    }
}
