use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph},
};
use std::time::Duration;

use super::playlist::{MenuWindow, TrackList};
use crate::constants::{MAX_VOLUME, MENU_PAGE_LEN};

/// Everything the menu screen shows on one frame.
pub struct MenuScreen<'a> {
    pub tracks: &'a TrackList,
    pub window: &'a MenuWindow,
    pub playing: Option<&'a str>,
    pub position: Duration,
    pub duration: Option<Duration>,
    pub echo_on: bool,
    pub preload_on: bool,
    pub volume: u32,
}

pub fn draw(f: &mut Frame, screen: &MenuScreen) {
    let size = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(2),                       // Title
            Constraint::Length(3),                       // Progress bar + clock
            Constraint::Length(MENU_PAGE_LEN as u16 + 2), // Track page
            Constraint::Length(1),                       // Now playing
            Constraint::Length(4),                       // Controls (two rows)
        ])
        .split(size);

    let title = Paragraph::new("MixPlay")
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .alignment(Alignment::Center);
    f.render_widget(title, chunks[0]);

    draw_progress_bar(f, chunks[1], screen);
    draw_track_page(f, chunks[2], screen);
    draw_now_playing(f, chunks[3], screen);
    draw_controls(f, chunks[4], screen);
}

fn draw_track_page(f: &mut Frame, area: Rect, screen: &MenuScreen) {
    let mut rows: Vec<Line> = Vec::with_capacity(MENU_PAGE_LEN);
    for row in screen.window.visible() {
        let Some(entry) = screen.tracks.get(row) else {
            break;
        };
        let selected = row == screen.window.cursor();
        let marker = if selected { "-> " } else { "   " };
        let mut spans = vec![
            Span::styled(
                marker,
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("{:>3} ", row + 1), Style::default().fg(Color::DarkGray)),
        ];
        if selected {
            spans.push(Span::styled(
                entry.name().to_string(),
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ));
        } else {
            spans.push(Span::raw(entry.name().to_string()));
        }
        rows.push(Line::from(spans));
    }
    if screen.tracks.is_empty() {
        rows.push(Line::from(Span::styled(
            "no tracks found",
            Style::default().fg(Color::DarkGray),
        )));
    }

    let page = Paragraph::new(rows).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" tracks ({}) ", screen.tracks.len())),
    );
    f.render_widget(page, area);
}

fn draw_now_playing(f: &mut Frame, area: Rect, screen: &MenuScreen) {
    let line = if let Some(name) = screen.playing {
        Line::from(vec![
            Span::raw("Playing: "),
            Span::styled(
                name.to_string(),
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            ),
        ])
    } else {
        Line::from(vec![
            Span::raw("Playing: "),
            Span::styled("(stopped)", Style::default().fg(Color::DarkGray)),
        ])
    };
    f.render_widget(Paragraph::new(line), area);
}

fn draw_progress_bar(f: &mut Frame, area: Rect, screen: &MenuScreen) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Min(10),    // Progress bar
            Constraint::Length(16), // Time display
            Constraint::Length(11), // Volume
        ])
        .split(area);

    let progress = match screen.duration {
        Some(total) if !total.is_zero() => {
            (screen.position.as_secs_f32() / total.as_secs_f32()).clamp(0.0, 1.0)
        }
        _ => 0.0,
    };
    let progress_percent = (progress * 100.0) as u16;

    let label_style = if progress_percent >= 50 {
        Style::default()
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::White)
    };
    let progress_widget = Gauge::default()
        .block(Block::default().borders(Borders::ALL))
        .gauge_style(Style::default().fg(Color::Cyan))
        .percent(progress_percent)
        .label(Span::styled(format!("{progress_percent}%"), label_style));
    f.render_widget(progress_widget, chunks[0]);

    let time_widget = Paragraph::new(format!(
        "{} / {}",
        format_clock(screen.position),
        screen.duration.map_or_else(|| "--:--".to_string(), format_clock),
    ))
    .style(Style::default().fg(Color::White))
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(time_widget, chunks[1]);

    let volume_widget = Paragraph::new(format!("vol {:>3}", screen.volume.min(MAX_VOLUME)))
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(volume_widget, chunks[2]);
}

fn draw_controls(f: &mut Frame, area: Rect, screen: &MenuScreen) {
    let control_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(area);

    let controls_row1 = vec![
        Span::styled("[↑↓]", Style::default().fg(Color::Magenta)),
        Span::raw(" select  "),
        Span::styled("[enter]", Style::default().fg(Color::Green)),
        Span::raw(" play  "),
        Span::styled("[bksp]", Style::default().fg(Color::Yellow)),
        Span::raw(" stop  "),
        Span::styled("[←→]", Style::default().fg(Color::Magenta)),
        Span::raw(" volume  "),
        Span::styled("[q]", Style::default().fg(Color::Red)),
        Span::raw(" quit"),
    ];

    let controls_row2 = vec![
        if screen.echo_on {
            Span::styled(
                "[e]",
                Style::default().fg(Color::Magenta).bg(Color::DarkGray),
            )
        } else {
            Span::styled("[e]", Style::default().fg(Color::Magenta))
        },
        Span::raw(if screen.echo_on { " echo ●  " } else { " echo  " }),
        if screen.preload_on {
            Span::styled(
                "[r]",
                Style::default().fg(Color::Cyan).bg(Color::DarkGray),
            )
        } else {
            Span::styled("[r]", Style::default().fg(Color::Cyan))
        },
        Span::raw(if screen.preload_on {
            " preload ●  "
        } else {
            " preload  "
        }),
        Span::styled("[1]", Style::default().fg(Color::Blue)),
        Span::raw(" "),
        Span::styled("[2]", Style::default().fg(Color::Blue)),
        Span::raw(" sfx"),
    ];

    let border_widget = Block::default().borders(Borders::TOP);
    f.render_widget(border_widget, area);

    let controls_widget1 = Paragraph::new(Line::from(controls_row1)).alignment(Alignment::Center);
    let controls_widget2 = Paragraph::new(Line::from(controls_row2)).alignment(Alignment::Center);
    f.render_widget(controls_widget1, control_chunks[0]);
    f.render_widget(controls_widget2, control_chunks[1]);
}

fn format_clock(time: Duration) -> String {
    let total_secs = time.as_secs();
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}
