use anyhow::Result;
use crossterm::event::KeyCode;
use log::debug;
use lotradio::playback::FocusChange;
use lotradio::{ControllerHandle, StreamTarget};
use tokio::sync::mpsc;

use crate::actions::ShellEvent;
use crate::ui::UIState as UIApp;

pub struct AppController {
    pub ui_app: UIApp,
    handle: ControllerHandle,
    events: mpsc::UnboundedReceiver<ShellEvent>,
}

impl AppController {
    pub fn new(
        target: StreamTarget,
        handle: ControllerHandle,
        events: mpsc::UnboundedReceiver<ShellEvent>,
    ) -> Self {
        Self {
            ui_app: UIApp::new(target),
            handle,
            events,
        }
    }

    pub async fn handle_key_event(&mut self, key_code: KeyCode) -> Result<bool> {
        match key_code {
            KeyCode::Char('q') | KeyCode::Esc | KeyCode::Char('Q') => {
                self.handle.shutdown();
                self.ui_app.quit();
                return Ok(true);
            }
            KeyCode::Char(' ') | KeyCode::Enter => {
                self.toggle_playback().await;
            }
            KeyCode::Char('s') | KeyCode::Char('S') => {
                self.handle.stop(true);
            }
            // Simulated focus changes from other applications
            KeyCode::Char('g') => self.inject_focus(FocusChange::Gain),
            KeyCode::Char('t') => self.inject_focus(FocusChange::LossTransient),
            KeyCode::Char('d') => self.inject_focus(FocusChange::LossTransientCanDuck),
            KeyCode::Char('l') => self.inject_focus(FocusChange::Loss),
            _ => {}
        }
        Ok(false)
    }

    /// Play only if not already playing, pause only if playing.
    async fn toggle_playback(&mut self) {
        if self.handle.is_playing().await {
            self.handle.pause();
        } else {
            self.ui_app.last_error = None;
            self.handle.play();
        }
    }

    fn inject_focus(&mut self, change: FocusChange) {
        use lotradio::playback::FocusChangeListener;
        self.ui_app.last_focus_change = Some(change);
        self.handle.on_audio_focus_change(change);
    }

    /// Apply everything the controller has reported since the last frame.
    pub fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.process_event(event);
        }
    }

    pub fn process_event(&mut self, event: ShellEvent) {
        debug!("Shell event: {:?}", event);
        self.ui_app.apply(event);
    }

    pub fn should_quit(&self) -> bool {
        self.ui_app.should_quit
    }
}
