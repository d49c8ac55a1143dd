use crate::actions::ShellEvent;
use lotradio::playback::FocusChange;
use lotradio::stream::{STATION_SUBTITLE, STATION_TITLE};
use lotradio::{AvailableActions, PlaybackState, StreamTarget};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

// Layout constants for better maintainability
const HEADER_HEIGHT: u16 = 5;
const FOOTER_HEIGHT: u16 = 3;
const STATUS_HEIGHT: u16 = 3;
const MARGIN: u16 = 1;

pub struct UIState {
    pub target: StreamTarget,
    pub state: PlaybackState,
    pub actions: AvailableActions,
    pub should_quit: bool,
    pub status_message: String,
    pub last_error: Option<String>,
    pub last_focus_change: Option<FocusChange>,
}

impl UIState {
    pub fn new(target: StreamTarget) -> Self {
        Self {
            target,
            state: PlaybackState::None,
            actions: AvailableActions::PLAY,
            should_quit: false,
            status_message: String::new(),
            last_error: None,
            last_focus_change: None,
        }
    }

    pub fn apply(&mut self, event: ShellEvent) {
        match event {
            ShellEvent::Status(status) => {
                self.state = status.state;
                self.actions = status.actions;
                self.status_message = match status.state {
                    PlaybackState::Buffering => "Connecting to stream…".to_string(),
                    PlaybackState::Stopped => "Stopped".to_string(),
                    _ => String::new(),
                };
            }
            ShellEvent::Completed => {
                self.status_message = "Stream ended".to_string();
            }
            ShellEvent::Error(message) => {
                self.last_error = Some(message);
            }
        }
    }

    /// The notification rule: offer Play when paused, Pause otherwise.
    pub fn primary_action_label(&self) -> &'static str {
        if self.state == PlaybackState::Paused || !self.actions.contains(AvailableActions::PAUSE) {
            "Play"
        } else {
            "Pause"
        }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }
}

pub fn render_ui(f: &mut Frame, app: &UIState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(MARGIN)
        .constraints([
            Constraint::Length(HEADER_HEIGHT), // Station and playback state
            Constraint::Min(5),                // Stream details
            Constraint::Length(STATUS_HEIGHT), // Status bar
            Constraint::Length(FOOTER_HEIGHT), // Footer
        ])
        .split(f.area());

    render_header(f, chunks[0], app);
    render_details(f, chunks[1], app);
    render_status(f, chunks[2], app);
    render_footer(f, chunks[3], app);
}

fn state_color(state: PlaybackState) -> Color {
    match state {
        PlaybackState::Playing => Color::Green,
        PlaybackState::Buffering => Color::Yellow,
        PlaybackState::Paused => Color::Cyan,
        PlaybackState::Error => Color::Red,
        PlaybackState::None | PlaybackState::Stopped => Color::Gray,
    }
}

fn render_header(f: &mut Frame, area: Rect, app: &UIState) {
    let content = vec![
        Line::from(vec![
            Span::styled(STATION_TITLE, Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD)),
            Span::styled("  ", Style::default()),
            Span::styled(
                app.state.label(),
                Style::default().fg(state_color(app.state)).add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(""),
        Line::from(vec![Span::styled(STATION_SUBTITLE, Style::default().fg(Color::Cyan))]),
    ];

    let header = Paragraph::new(Text::from(content)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta))
            .title("Now Playing"),
    );

    f.render_widget(header, area);
}

fn render_details(f: &mut Frame, area: Rect, app: &UIState) {
    let focus = match app.last_focus_change {
        Some(change) => format!("{:?}", change),
        None => "not simulated".to_string(),
    };

    let content = vec![
        Line::from(vec![
            Span::styled("Stream: ", Style::default()),
            Span::styled(app.target.to_string(), Style::default().fg(Color::Yellow)),
            Span::styled(" • ", Style::default().fg(Color::Gray)),
            Span::styled(app.target.uri(), Style::default().fg(Color::Blue)),
        ]),
        Line::from(vec![
            Span::styled("Last focus event: ", Style::default()),
            Span::styled(focus, Style::default().fg(Color::White)),
        ]),
    ];

    let details = Paragraph::new(Text::from(content)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title("Stream"),
    );

    f.render_widget(details, area);
}

fn render_footer(f: &mut Frame, area: Rect, app: &UIState) {
    let controls_text = vec![Line::from(vec![
        Span::styled("SPACE ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::styled(format!("{} • ", app.primary_action_label()), Style::default().fg(Color::White)),
        Span::styled("S ", Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD)),
        Span::styled("Stop • ", Style::default().fg(Color::White)),
        Span::styled("G/T/D/L ", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        Span::styled("Focus gain/transient/duck/loss • ", Style::default().fg(Color::White)),
        Span::styled("Q ", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
        Span::styled("Quit", Style::default().fg(Color::White)),
    ])];

    let controls = Paragraph::new(Text::from(controls_text))
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Gray))
                .title("Controls"),
        );

    f.render_widget(controls, area);
}

fn render_status(f: &mut Frame, area: Rect, app: &UIState) {
    // Errors take priority over informational messages
    let (text, color) = match &app.last_error {
        Some(error) => (format!("Error: {}", error), Color::Red),
        None => (app.status_message.clone(), Color::White),
    };

    let status = Paragraph::new(Text::from(Line::from(vec![Span::styled(
        text,
        Style::default().fg(color),
    )])))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue))
            .title("Status"),
    );

    f.render_widget(status, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotradio::PlaybackStatus;

    fn status(state: PlaybackState, actions: AvailableActions) -> ShellEvent {
        ShellEvent::Status(PlaybackStatus { state, actions })
    }

    #[test]
    fn test_primary_action_follows_state() {
        let mut ui = UIState::new(StreamTarget::default());
        assert_eq!(ui.primary_action_label(), "Play");

        ui.apply(status(PlaybackState::Buffering, AvailableActions::PLAY | AvailableActions::PAUSE));
        assert_eq!(ui.primary_action_label(), "Pause");

        ui.apply(status(PlaybackState::Paused, AvailableActions::PLAY | AvailableActions::PAUSE));
        assert_eq!(ui.primary_action_label(), "Play");
    }

    #[test]
    fn test_error_is_kept_until_cleared() {
        let mut ui = UIState::new(StreamTarget::default());
        ui.apply(ShellEvent::Error("decoder X unavailable".to_string()));
        ui.apply(status(PlaybackState::Playing, AvailableActions::PLAY | AvailableActions::PAUSE));

        assert_eq!(ui.state, PlaybackState::Playing);
        assert_eq!(ui.last_error.as_deref(), Some("decoder X unavailable"));
    }

    #[test]
    fn test_completion_sets_message() {
        let mut ui = UIState::new(StreamTarget::default());
        ui.apply(ShellEvent::Completed);
        assert_eq!(ui.status_message, "Stream ended");
    }
}
