//! Messages from the playback controller to the terminal shell
use lotradio::{PlaybackListener, PlaybackStatus};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum ShellEvent {
    Status(PlaybackStatus),
    Completed,
    Error(String),
}

/// Forwards controller output into the UI loop.
pub struct ShellListener {
    tx: mpsc::UnboundedSender<ShellEvent>,
}

impl ShellListener {
    pub fn new(tx: mpsc::UnboundedSender<ShellEvent>) -> Self {
        Self { tx }
    }
}

impl PlaybackListener for ShellListener {
    fn on_playback_status_changed(&mut self, status: PlaybackStatus) {
        let _ = self.tx.send(ShellEvent::Status(status));
    }

    fn on_completion(&mut self) {
        let _ = self.tx.send(ShellEvent::Completed);
    }

    fn on_error(&mut self, message: &str) {
        let _ = self.tx.send(ShellEvent::Error(message.to_string()));
    }
}
