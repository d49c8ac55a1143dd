//! Playback state machine and the contracts of the collaborators it drives.
//!
//! The [`PlaybackController`] is a plain synchronous object; every entry point
//! mutates its state in place. Collaborators that call back from other threads
//! (focus arbiter, decoder engine, output route monitor) are handed listeners
//! that feed the [`ControllerHandle`] queue instead, which serialises their
//! events onto the task that owns the controller.

mod controller;
mod handle;
mod noisy;

pub use controller::{Collaborators, PlaybackController, DUCK_VOLUME, FULL_VOLUME};
pub use handle::{Command, ControllerHandle};
pub use noisy::{NoisyOutputGuard, NoisyOutputListener, OutputRouteMonitor};

use crate::error::EngineError;
use crate::stream::StreamTarget;
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    None,
    Buffering,
    Playing,
    Paused,
    Stopped,
    /// Part of the session vocabulary only. Engine errors are delivered through
    /// [`PlaybackListener::on_error`] and never stored as the current state.
    Error,
}

impl PlaybackState {
    pub fn label(&self) -> &'static str {
        match self {
            PlaybackState::None => "IDLE",
            PlaybackState::Buffering => "BUFFERING",
            PlaybackState::Playing => "PLAYING",
            PlaybackState::Paused => "PAUSED",
            PlaybackState::Stopped => "STOPPED",
            PlaybackState::Error => "ERROR",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the controller believes about its audio-focus grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioFocusLevel {
    /// No focus and ducking is not allowed.
    #[default]
    None,
    /// Focus is temporarily lost but we may keep playing quietly.
    Duck,
    Focused,
}

/// Focus changes as reported by the platform's focus arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusChange {
    Gain,
    Loss,
    LossTransient,
    LossTransientCanDuck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusRequestResult {
    Granted,
    Failed,
}

/// Transport actions a session shell may offer for the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AvailableActions(u8);

impl AvailableActions {
    pub const PLAY: AvailableActions = AvailableActions(0b01);
    pub const PAUSE: AvailableActions = AvailableActions(0b10);

    pub fn contains(&self, other: AvailableActions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for AvailableActions {
    type Output = AvailableActions;

    fn bitor(self, rhs: Self) -> Self::Output {
        AvailableActions(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    pub actions: AvailableActions,
}

/// The decode/render pipeline for one stream. Treated as opaque: the
/// controller only toggles play intent and volume and manages its lifetime.
pub trait DecoderEngine: Send {
    /// Start fetching and decoding. Readiness is reported asynchronously.
    fn prepare(&mut self);
    fn set_play_intent(&mut self, play: bool);
    fn play_intent(&self) -> bool;
    /// Volume in `[0.0, 1.0]`.
    fn set_volume(&mut self, volume: f32);
    fn release(&mut self);
}

pub trait EngineFactory: Send {
    fn create(
        &self,
        target: StreamTarget,
        listener: Arc<dyn EngineListener>,
    ) -> Result<Box<dyn DecoderEngine>, EngineError>;
}

/// Engine lifecycle callbacks. Each fires at most once per terminal event and
/// may arrive on the engine's own thread.
pub trait EngineListener: Send + Sync {
    fn on_ready(&self);
    fn on_ended(&self);
    fn on_error(&self, error: EngineError);
}

/// An engine callback, as delivered to the controller.
#[derive(Debug)]
pub enum EngineEvent {
    Ready,
    Ended,
    Failed(EngineError),
}

/// Receives engine callbacks tagged with the generation of the engine that
/// raised them.
pub trait EngineEventSink: Send + Sync {
    fn engine_event(&self, generation: u64, event: EngineEvent);
}

/// Listener handed to a single engine. Events keep the engine's generation so
/// the controller can drop the ones a released engine had already queued.
pub struct EngineEvents {
    sink: Arc<dyn EngineEventSink>,
    generation: u64,
}

impl EngineEvents {
    pub fn new(sink: Arc<dyn EngineEventSink>, generation: u64) -> Self {
        Self { sink, generation }
    }
}

impl EngineListener for EngineEvents {
    fn on_ready(&self) {
        self.sink.engine_event(self.generation, EngineEvent::Ready);
    }

    fn on_ended(&self) {
        self.sink.engine_event(self.generation, EngineEvent::Ended);
    }

    fn on_error(&self, error: EngineError) {
        self.sink.engine_event(self.generation, EngineEvent::Failed(error));
    }
}

pub trait AudioFocusService: Send {
    fn request_focus(&mut self, listener: Arc<dyn FocusChangeListener>) -> FocusRequestResult;
    fn abandon_focus(&mut self) -> FocusRequestResult;
}

pub trait FocusChangeListener: Send + Sync {
    fn on_audio_focus_change(&self, change: FocusChange);
}

/// Exclusive device resource that keeps the network alive while streaming.
/// Both calls must tolerate being made when already in the target state.
pub trait WakeResource: Send {
    fn acquire(&mut self);
    fn release(&mut self);
    fn is_held(&self) -> bool;
}

/// Receiver of controller output, usually a media-session or notification shell.
pub trait PlaybackListener: Send {
    fn on_playback_status_changed(&mut self, status: PlaybackStatus);
    fn on_completion(&mut self);
    fn on_error(&mut self, message: &str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_actions_contains() {
        let actions = AvailableActions::PLAY | AvailableActions::PAUSE;
        assert!(actions.contains(AvailableActions::PLAY));
        assert!(actions.contains(AvailableActions::PAUSE));
        assert!(!AvailableActions::PLAY.contains(AvailableActions::PAUSE));
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<(u64, String)>>);

    impl EngineEventSink for RecordingSink {
        fn engine_event(&self, generation: u64, event: EngineEvent) {
            self.0.lock().unwrap().push((generation, format!("{:?}", event)));
        }
    }

    #[test]
    fn test_engine_events_carry_generation() {
        let sink = Arc::new(RecordingSink::default());
        let first = EngineEvents::new(sink.clone(), 1);
        let second = EngineEvents::new(sink.clone(), 2);

        second.on_ready();
        first.on_error(EngineError::Decode("late".to_string()));
        second.on_ended();

        let seen = sink.0.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], (2, "Ready".to_string()));
        assert_eq!(seen[1].0, 1);
        assert!(seen[1].1.starts_with("Failed"));
        assert_eq!(seen[2], (2, "Ended".to_string()));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(PlaybackState::default(), PlaybackState::None);
        assert_eq!(AudioFocusLevel::default(), AudioFocusLevel::None);
        assert_eq!(PlaybackState::Buffering.to_string(), "BUFFERING");
    }
}
