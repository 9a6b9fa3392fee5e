use color_eyre::Result;
use crossbeam::channel::Receiver;
use ratatui::{
    DefaultTerminal,
    crossterm::{
        event::{
            DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
            MouseEvent, MouseEventKind, poll, read,
        },
        execute,
    },
    layout::Flex,
    prelude::*,
    widgets::{Block, Clear, Paragraph, Wrap},
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tui_big_text::{BigText, PixelSize};

use crate::{
    analyzer::Spectrogram,
    builtin_themes,
    config::ColorMap,
    engine::EngineFactory,
    loader::LoadResult,
    shell::{PlayerEvent, PlayerShell, PlayerState},
    timeline::{TickKind, Timeline},
    viewport::Viewport,
};

const FRAME_POLL: Duration = Duration::from_millis(16);
const SEEK_STEP_SECS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalTheme {
    pub background: Color,
    pub foreground: Color,
    pub highlight: Option<Color>,
}

impl Default for GlobalTheme {
    fn default() -> Self {
        Self {
            background: Color::Reset,
            foreground: Color::Reset,
            highlight: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveformTheme {
    pub wave: Color,
    pub progress: Color,
    pub cursor: Color,
}

impl Default for WaveformTheme {
    fn default() -> Self {
        Self {
            wave: Color::Gray,
            progress: Color::Cyan,
            cursor: Color::Red,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub global: GlobalTheme,
    pub waveform: WaveformTheme,
    pub button: Color,
    pub button_text: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            global: GlobalTheme::default(),
            waveform: WaveformTheme::default(),
            button: Color::Cyan,
            button_text: Color::White,
        }
    }
}

impl Theme {
    /// Derive every widget color from the global palette.
    pub fn apply_global_as_default(&mut self) {
        let accent = self.global.highlight.unwrap_or(self.global.foreground);
        self.waveform = WaveformTheme {
            wave: self.global.foreground,
            progress: accent,
            cursor: accent,
        };
        self.button = accent;
        self.button_text = self.global.background;
    }

    fn base(&self) -> Style {
        Style::default()
            .fg(self.global.foreground)
            .bg(self.global.background)
    }
}

/// Symmetric bar waveform with played/unplayed coloring and a cursor.
struct WaveformWidget<'a> {
    peaks: &'a [f32],
    progress: f64,
    theme: &'a WaveformTheme,
}

impl Widget for WaveformWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.is_empty() || self.peaks.is_empty() {
            return;
        }
        let half_cells = u32::from(area.height) * 2;
        let cursor_col = ((self.progress * f64::from(area.width)).floor() as u16).min(area.width - 1);
        for col in 0..area.width {
            let index = usize::from(col) * self.peaks.len() / usize::from(area.width);
            let peak = self.peaks[index.min(self.peaks.len() - 1)];
            let extent = ((peak.clamp(0.0, 1.0) * half_cells as f32).round() as u32).max(1);
            let top = (half_cells - extent) / 2;
            let bottom = top + extent;

            let color = if col < cursor_col {
                self.theme.progress
            } else {
                self.theme.wave
            };
            for row in 0..area.height {
                let upper = u32::from(row) * 2;
                let lower = upper + 1;
                let upper_on = (top..bottom).contains(&upper);
                let lower_on = (top..bottom).contains(&lower);
                let symbol = match (upper_on, lower_on) {
                    (true, true) => "█",
                    (true, false) => "▀",
                    (false, true) => "▄",
                    (false, false) if col == cursor_col => "│",
                    (false, false) => continue,
                };
                let fg = if col == cursor_col { self.theme.cursor } else { color };
                buf[(area.x + col, area.y + row)].set_symbol(symbol).set_fg(fg);
            }
        }
    }
}

struct TimelineWidget<'a> {
    timeline: &'a Timeline,
    style: Style,
}

impl Widget for TimelineWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.is_empty() {
            return;
        }
        for tick in &self.timeline.ticks {
            let col = self.timeline.column(tick.seconds, area.width);
            let mark = match tick.kind {
                TickKind::Primary => "┃",
                TickKind::Secondary | TickKind::Notch => "╵",
            };
            buf[(area.x + col, area.y)].set_symbol(mark).set_style(self.style);
            let Some(label) = &tick.label else {
                continue;
            };
            if area.height > 1 {
                let room = area.width.saturating_sub(col);
                let style = match tick.kind {
                    TickKind::Primary => self.style.add_modifier(Modifier::BOLD),
                    _ => self.style.add_modifier(Modifier::DIM),
                };
                buf.set_stringn(area.x + col, area.y + 1, label, usize::from(room), style);
            }
        }
    }
}

/// Each cell shows two frequency bands: upper half as foreground, lower half
/// as background of a `▀`.
struct SpectrogramWidget<'a> {
    spectrogram: &'a Spectrogram,
    color_map: ColorMap,
}

impl Widget for SpectrogramWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.is_empty() || self.spectrogram.is_empty() {
            return;
        }
        let width = usize::from(area.width);
        let bands = usize::from(area.height) * 2;
        for col in 0..area.width {
            for row in 0..area.height {
                let band = usize::from(row) * 2;
                let upper = self.spectrogram.cell(usize::from(col), band, width, bands);
                let lower = self.spectrogram.cell(usize::from(col), band + 1, width, bands);
                buf[(area.x + col, area.y + row)]
                    .set_symbol("▀")
                    .set_fg(builtin_themes::color_map(self.color_map, upper))
                    .set_bg(builtin_themes::color_map(self.color_map, lower));
            }
        }
    }
}

fn big_title(title: &str, style: Style) -> BigText<'static> {
    BigText::builder()
        .pixel_size(PixelSize::Quadrant)
        .style(style)
        .lines(vec![Line::from(title.to_owned())])
        .alignment(Alignment::Center)
        .build()
}

struct App<F: EngineFactory> {
    shell: PlayerShell<F>,
    viewport: Arc<Viewport>,
    theme: Theme,
    waveform_area: Rect,
    exit: bool,
}

impl<F: EngineFactory> App<F> {
    fn new(shell: PlayerShell<F>, viewport: Arc<Viewport>, theme: Theme) -> Self {
        Self {
            shell,
            viewport,
            theme,
            waveform_area: Rect::default(),
            exit: false,
        }
    }

    fn draw(&mut self, f: &mut Frame) {
        let area = f.area();
        f.render_widget(Block::default().style(self.theme.base()), area);

        let config = self.shell.config();
        let [title, waveform, timeline, spectrogram, time, button, status] = Layout::vertical([
            Constraint::Length(4),
            Constraint::Fill(config.player.height.max(1)),
            Constraint::Length(2),
            Constraint::Fill(config.spectrogram.height.max(1)),
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .areas(area);
        self.waveform_area = waveform;

        self.render_title(f, title);
        self.render_visuals(f, waveform, timeline, spectrogram);
        self.render_time(f, time);
        self.render_button(f, button);
        self.render_status(f, status);

        if let Some(message) = self.shell.error() {
            let popup = Self::popup_area(area, 60, 30);
            f.render_widget(Clear, popup);
            f.render_widget(
                Paragraph::new(message.to_owned())
                    .wrap(Wrap { trim: true })
                    .style(self.theme.base())
                    .block(Block::bordered().title(" Could not load audio ")),
                popup,
            );
        }
    }

    fn render_title(&self, frame: &mut Frame, area: Rect) {
        let title = big_title(&self.shell.config().player.title, self.theme.base());
        frame.render_widget(title, area);
    }

    fn render_visuals(&self, frame: &mut Frame, waveform: Rect, timeline: Rect, spectrogram: Rect) {
        let Some(view) = self.shell.engine_view() else {
            return;
        };
        let progress = view.progress(self.shell.playback().current_time);
        frame.render_widget(
            WaveformWidget {
                peaks: &view.peaks,
                progress,
                theme: &self.theme.waveform,
            },
            waveform,
        );
        if let Some(tl) = &view.timeline {
            frame.render_widget(
                TimelineWidget {
                    timeline: tl,
                    style: self.theme.base(),
                },
                timeline,
            );
        }
        if let Some(spec) = &view.spectrogram {
            frame.render_widget(
                SpectrogramWidget {
                    spectrogram: spec,
                    color_map: self.shell.config().spectrogram.color_map,
                },
                spectrogram,
            );
        }
    }

    fn render_time(&self, frame: &mut Frame, area: Rect) {
        let readout = BigText::builder()
            .pixel_size(PixelSize::Quadrant)
            .style(self.theme.base())
            .lines(vec![Line::from(self.shell.time_display())])
            .alignment(Alignment::Center)
            .build();
        frame.render_widget(readout, area);
    }

    fn render_button(&self, frame: &mut Frame, area: Rect) {
        let glyph = if self.shell.playback().is_playing {
            "⏸"
        } else {
            "▶"
        };
        let [button] = Layout::horizontal([Constraint::Length(7)])
            .flex(Flex::Center)
            .areas(area);
        let style = Style::default().fg(self.theme.button_text).bg(self.theme.button);
        frame.render_widget(
            Paragraph::new(glyph)
                .alignment(Alignment::Center)
                .style(style)
                .block(Block::bordered().border_style(style)),
            button,
        );
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let state = match self.shell.state() {
            PlayerState::Idle => "starting",
            PlayerState::Loading => "loading audio…",
            PlayerState::Ready => "ready",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
            PlayerState::Error(_) => "error",
        };
        let line = Line::from(vec![
            Span::styled(format!(" {state} "), self.theme.base().add_modifier(Modifier::REVERSED)),
            Span::styled(
                "  space play/pause  ←/→ seek  q quit",
                self.theme.base().add_modifier(Modifier::DIM),
            ),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }

    fn run(mut self, mut terminal: DefaultTerminal) -> Result<()> {
        while !self.exit {
            self.shell.tick();
            terminal.draw(|f| self.draw(f))?;

            // event reader
            if poll(FRAME_POLL)? {
                self.handle_event(read()?);
            }
        }
        self.shell.unmount();
        Ok(())
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => self.exit = true,
                KeyCode::Char(' ') => {
                    self.shell.toggle_play_pause();
                }
                KeyCode::Left => self.seek_by(-SEEK_STEP_SECS),
                KeyCode::Right => self.seek_by(SEEK_STEP_SECS),
                _ => (),
            },
            Event::Mouse(mouse) => self.handle_mouse(mouse),
            Event::Resize(width, _) => self.viewport.publish(width),
            _ => (),
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        let drag_to_seek = self.shell.config().player.drag_to_seek;
        let seeking = match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => true,
            MouseEventKind::Drag(MouseButton::Left) => drag_to_seek,
            _ => false,
        };
        let area = self.waveform_area;
        if !seeking || area.width == 0 || !area.contains(Position::new(mouse.column, mouse.row)) {
            return;
        }
        let fraction = f64::from(mouse.column - area.x) / f64::from(area.width);
        self.shell.dispatch(PlayerEvent::Seek(fraction));
    }

    fn seek_by(&mut self, delta: f64) {
        let Some(duration) = self.shell.engine_view().map(|view| view.duration) else {
            return;
        };
        if duration <= 0.0 {
            return;
        }
        let target = self.shell.playback().current_time + delta;
        self.shell.dispatch(PlayerEvent::Seek(target / duration));
    }

    fn popup_area(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
        let vertical = Layout::vertical([Constraint::Percentage(percent_y)]).flex(Flex::Center);
        let horizontal = Layout::horizontal([Constraint::Percentage(percent_x)]).flex(Flex::Center);
        let [area] = vertical.areas(area);
        let [area] = horizontal.areas(area);
        area
    }
}

pub fn run<F: EngineFactory>(
    mut shell: PlayerShell<F>,
    theme: Theme,
    viewport: Arc<Viewport>,
    start_load: impl FnOnce() -> Receiver<LoadResult>,
) -> Result<()> {
    let terminal = ratatui::init();
    restore_after(
        move || {
            execute!(std::io::stdout(), EnableMouseCapture)?;
            viewport.publish(terminal.size()?.width);
            shell.mount(start_load);
            App::new(shell, viewport, theme).run(terminal)
        },
        || {
            let _ = execute!(std::io::stdout(), DisableMouseCapture);
            ratatui::restore();
        },
    )
}

/// Run `session`, then `restore` whether or not the session failed.
fn restore_after<T>(session: impl FnOnce() -> Result<T>, restore: impl FnOnce()) -> Result<T> {
    let result = session();
    restore();
    result
}
