use log::{debug, warn};
use std::sync::Arc;

use super::noisy::{NoisyOutputGuard, NoisyOutputListener, OutputRouteMonitor};
use super::{
    AudioFocusLevel, AudioFocusService, AvailableActions, DecoderEngine, EngineEvent,
    EngineEventSink, EngineEvents, EngineFactory, FocusChange, FocusChangeListener,
    FocusRequestResult, PlaybackListener, PlaybackState, PlaybackStatus, WakeResource,
};
use crate::error::EngineError;
use crate::stream::StreamTarget;

/// Engine volume while another app holds transient focus that allows ducking.
pub const DUCK_VOLUME: f32 = 0.2;
/// Engine volume while we hold audio focus.
pub const FULL_VOLUME: f32 = 1.0;

/// Platform collaborators injected into a [`PlaybackController`].
pub struct Collaborators {
    pub engines: Box<dyn EngineFactory>,
    pub focus: Box<dyn AudioFocusService>,
    pub wake: Box<dyn WakeResource>,
    pub route_monitor: Box<dyn OutputRouteMonitor>,
}

/// Playback state machine for a single stream.
///
/// The wake resource is held exactly while a decoder engine exists; the engine
/// is created lazily by [`play`](Self::play) and torn down by
/// [`stop`](Self::stop).
pub struct PlaybackController {
    target: StreamTarget,
    state: PlaybackState,
    audio_focus: AudioFocusLevel,
    play_on_focus_gain: bool,
    engine: Option<Box<dyn DecoderEngine>>,
    /// Bumped for every engine created; events from older engines are stale.
    engine_generation: u64,
    engines: Box<dyn EngineFactory>,
    focus_service: Box<dyn AudioFocusService>,
    wake: Box<dyn WakeResource>,
    noisy: NoisyOutputGuard,
    listener: Option<Box<dyn PlaybackListener>>,
    focus_events: Arc<dyn FocusChangeListener>,
    engine_events: Arc<dyn EngineEventSink>,
}

impl PlaybackController {
    /// `events` receives the callbacks of every collaborator; in production it
    /// feeds the queue of the [`ControllerHandle`](super::ControllerHandle)
    /// that routes them back to this controller.
    pub fn new<E>(target: StreamTarget, parts: Collaborators, events: Arc<E>) -> Self
    where
        E: FocusChangeListener + EngineEventSink + NoisyOutputListener + 'static,
    {
        let noisy_events: Arc<dyn NoisyOutputListener> = events.clone();
        let focus_events: Arc<dyn FocusChangeListener> = events.clone();
        let engine_events: Arc<dyn EngineEventSink> = events;

        Self {
            target,
            state: PlaybackState::None,
            audio_focus: AudioFocusLevel::None,
            play_on_focus_gain: false,
            engine: None,
            engine_generation: 0,
            engines: parts.engines,
            focus_service: parts.focus,
            wake: parts.wake,
            noisy: NoisyOutputGuard::new(parts.route_monitor, noisy_events),
            listener: None,
            focus_events,
            engine_events,
        }
    }

    pub fn set_listener(&mut self, listener: Option<Box<dyn PlaybackListener>>) {
        self.listener = listener;
    }

    pub fn target(&self) -> StreamTarget {
        self.target
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn audio_focus(&self) -> AudioFocusLevel {
        self.audio_focus
    }

    /// Whether playback resumes by itself once focus is (re)gained.
    pub fn resume_pending(&self) -> bool {
        self.play_on_focus_gain
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Optimistic: also true while playback is requested but focus has not
    /// been granted yet, so a shell shows "about to play" rather than stopped.
    pub fn is_playing(&self) -> bool {
        self.play_on_focus_gain || self.engine.as_ref().map_or(false, |e| e.play_intent())
    }

    pub fn available_actions(&self) -> AvailableActions {
        if self.is_playing() {
            AvailableActions::PLAY | AvailableActions::PAUSE
        } else {
            AvailableActions::PLAY
        }
    }

    pub fn play(&mut self) {
        self.play_on_focus_gain = true;
        self.try_to_get_audio_focus();
        self.noisy.register();

        match self.state {
            PlaybackState::Paused | PlaybackState::Playing if self.engine.is_some() => {
                self.configure_engine_state();
            }
            PlaybackState::Buffering if self.engine.is_some() => {
                // Preparation already in flight; readiness will reconcile.
                self.notify_status();
            }
            _ => self.start_buffering(),
        }
    }

    /// User-initiated pause. Unlike a pause forced by focus loss, this cancels
    /// any pending automatic resume.
    ///
    /// This deliberately diverges from a media player that keeps the pending
    /// resume on pause: here `is_playing()` is false right after a pause during
    /// buffering, and a later focus gain does not start playback.
    pub fn pause(&mut self) {
        self.play_on_focus_gain = false;
        self.pause_playback();
    }

    pub fn stop(&mut self, notify: bool) {
        self.set_state(PlaybackState::Stopped);
        self.play_on_focus_gain = false;
        self.give_up_audio_focus();
        self.noisy.unregister();
        self.release_engine();
        if notify {
            self.notify_status();
        }
    }

    pub fn on_audio_focus_change(&mut self, change: FocusChange) {
        debug!("Audio focus change: {:?}", change);
        match change {
            FocusChange::Gain => self.audio_focus = AudioFocusLevel::Focused,
            FocusChange::Loss | FocusChange::LossTransient | FocusChange::LossTransientCanDuck => {
                let can_duck = change == FocusChange::LossTransientCanDuck;
                self.audio_focus = if can_duck {
                    AudioFocusLevel::Duck
                } else {
                    AudioFocusLevel::None
                };
                // Remember we were playing so focus gain can resume us.
                if self.state == PlaybackState::Playing && !can_duck {
                    self.play_on_focus_gain = true;
                }
            }
        }
        self.configure_engine_state();
    }

    /// Entry point for engine callbacks. Events from an engine other than the
    /// current one (released by `stop`, or replaced since) are dropped.
    pub fn on_engine_event(&mut self, generation: u64, event: EngineEvent) {
        if self.engine.is_none() || generation != self.engine_generation {
            debug!(
                "Ignoring {:?} from engine #{} (current #{})",
                event, generation, self.engine_generation
            );
            return;
        }
        match event {
            EngineEvent::Ready => self.on_engine_ready(),
            EngineEvent::Ended => self.on_engine_ended(),
            EngineEvent::Failed(error) => self.on_engine_error(error),
        }
    }

    fn on_engine_ready(&mut self) {
        debug!("Engine ready");
        self.configure_engine_state();
    }

    /// Completion policy (replay, reconnect) belongs to the listener.
    fn on_engine_ended(&mut self) {
        debug!("Engine reached end of stream");
        if let Some(listener) = self.listener.as_mut() {
            listener.on_completion();
        }
    }

    fn on_engine_error(&mut self, error: EngineError) {
        self.forward_error(&error);
    }

    pub fn on_audio_becoming_noisy(&mut self) {
        if self.is_playing() {
            debug!("Output route disappearing, pausing");
            self.pause();
        }
    }

    fn start_buffering(&mut self) {
        if self.engine.is_none() {
            self.engine_generation += 1;
            let listener = EngineEvents::new(self.engine_events.clone(), self.engine_generation);
            match self.engines.create(self.target, Arc::new(listener)) {
                Ok(engine) => {
                    debug!("Created engine #{} for {}", self.engine_generation, self.target.uri());
                    self.engine = Some(engine);
                }
                Err(error) => {
                    // Roll the request back; nothing can play without an engine.
                    self.play_on_focus_gain = false;
                    self.give_up_audio_focus();
                    self.noisy.unregister();
                    self.forward_error(&error);
                    return;
                }
            }
        }

        self.set_state(PlaybackState::Buffering);
        if let Some(engine) = self.engine.as_mut() {
            engine.prepare();
        }
        if !self.wake.is_held() {
            debug!("Acquiring wake resource");
            self.wake.acquire();
        }
        self.notify_status();
    }

    fn pause_playback(&mut self) {
        if self.state == PlaybackState::Playing {
            if let Some(engine) = self.engine.as_mut() {
                if engine.play_intent() {
                    engine.set_play_intent(false);
                }
            }
            self.give_up_audio_focus();
        }
        self.set_state(PlaybackState::Paused);
        self.notify_status();
        self.noisy.unregister();
    }

    /// Applies the current focus level to the engine: pause without focus,
    /// duck or restore volume otherwise, and resume if a resume is pending.
    fn configure_engine_state(&mut self) {
        if self.audio_focus == AudioFocusLevel::None {
            if self.state == PlaybackState::Playing {
                self.pause_playback();
            }
        } else if let Some(engine) = self.engine.as_mut() {
            let volume = if self.audio_focus == AudioFocusLevel::Duck {
                DUCK_VOLUME
            } else {
                FULL_VOLUME
            };
            engine.set_volume(volume);

            let mut resumed = false;
            if self.play_on_focus_gain {
                if !engine.play_intent() {
                    engine.set_play_intent(true);
                    resumed = true;
                }
                self.play_on_focus_gain = false;
            }
            if resumed {
                self.set_state(PlaybackState::Playing);
                self.noisy.register();
            }
        }
        self.notify_status();
    }

    fn try_to_get_audio_focus(&mut self) {
        if self.audio_focus != AudioFocusLevel::Focused {
            let result = self.focus_service.request_focus(self.focus_events.clone());
            debug!("Audio focus request: {:?}", result);
            if result == FocusRequestResult::Granted {
                self.audio_focus = AudioFocusLevel::Focused;
            }
        }
    }

    fn give_up_audio_focus(&mut self) {
        if self.audio_focus == AudioFocusLevel::Focused {
            let result = self.focus_service.abandon_focus();
            debug!("Audio focus abandon: {:?}", result);
            if result == FocusRequestResult::Granted {
                self.audio_focus = AudioFocusLevel::None;
            }
        }
    }

    fn release_engine(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            debug!("Releasing engine");
            engine.release();
        }
        if self.wake.is_held() {
            debug!("Releasing wake resource");
            self.wake.release();
        }
    }

    fn forward_error(&mut self, error: &EngineError) {
        warn!("Playback engine error: {}", error);
        if let Some(listener) = self.listener.as_mut() {
            listener.on_error(&error.to_string());
        }
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state != state {
            debug!("Playback state changing from {:?} to {:?}", self.state, state);
        }
        self.state = state;
    }

    fn notify_status(&mut self) {
        let status = PlaybackStatus {
            state: self.state,
            actions: self.available_actions(),
        };
        if let Some(listener) = self.listener.as_mut() {
            listener.on_playback_status_changed(status);
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        if self.engine.is_some() || self.noisy.is_registered() {
            self.stop(false);
        }
    }
}
