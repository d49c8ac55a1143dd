//! Single-writer access to a [`PlaybackController`].
//!
//! Transport commands and collaborator callbacks are turned into [`Command`]s
//! and applied one at a time by the task that owns the controller.

use log::debug;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::noisy::NoisyOutputListener;
use super::{
    Collaborators, EngineEvent, EngineEventSink, FocusChange, FocusChangeListener,
    PlaybackController, PlaybackListener,
};
use crate::stream::StreamTarget;

pub enum Command {
    Play,
    Pause,
    Stop { notify: bool },
    FocusChanged(FocusChange),
    /// A callback from the engine created as number `generation`.
    Engine { generation: u64, event: EngineEvent },
    AudioBecomingNoisy,
    QueryPlaying(oneshot::Sender<bool>),
    SetListener(Option<Box<dyn PlaybackListener>>),
    /// Tear down without notifying and end the controller task.
    Shutdown,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Play => f.write_str("Play"),
            Command::Pause => f.write_str("Pause"),
            Command::Stop { notify } => f.debug_struct("Stop").field("notify", notify).finish(),
            Command::FocusChanged(change) => f.debug_tuple("FocusChanged").field(change).finish(),
            Command::Engine { generation, event } => f
                .debug_struct("Engine")
                .field("generation", generation)
                .field("event", event)
                .finish(),
            Command::AudioBecomingNoisy => f.write_str("AudioBecomingNoisy"),
            Command::QueryPlaying(_) => f.write_str("QueryPlaying"),
            Command::SetListener(listener) => f
                .debug_tuple("SetListener")
                .field(&listener.as_ref().map(|_| "Some(Listener)"))
                .finish(),
            Command::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Cloneable, thread-safe front for a controller running on its own task.
///
/// Sends never block; commands sent after the task has ended are dropped.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl ControllerHandle {
    /// Builds a controller wired to this handle and spawns the task that owns it.
    ///
    /// The task runs until [`shutdown`](Self::shutdown) or until every
    /// `ControllerHandle` clone is dropped; either way the controller is torn
    /// down without a final notification. Collaborators only hold a weak
    /// sender, so their callbacks never keep the task alive.
    pub fn spawn(
        target: StreamTarget,
        parts: Collaborators,
        listener: Option<Box<dyn PlaybackListener>>,
    ) -> (ControllerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = Arc::new(ControllerEvents { tx: tx.downgrade() });
        let handle = ControllerHandle { tx };

        let mut controller = PlaybackController::new(target, parts, events);
        controller.set_listener(listener);

        let task = tokio::spawn(run_controller(controller, rx));
        (handle, task)
    }

    pub fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            debug!("Controller task gone, dropping command");
        }
    }

    pub fn play(&self) {
        self.send(Command::Play);
    }

    pub fn pause(&self) {
        self.send(Command::Pause);
    }

    pub fn stop(&self, notify: bool) {
        self.send(Command::Stop { notify });
    }

    pub fn set_listener(&self, listener: Option<Box<dyn PlaybackListener>>) {
        self.send(Command::SetListener(listener));
    }

    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    /// Asks the controller task. Reports `false` once the task has ended.
    pub async fn is_playing(&self) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::QueryPlaying(reply_tx));
        reply_rx.await.unwrap_or(false)
    }
}

/// Lets a shell inject focus changes the way the platform arbiter would.
impl FocusChangeListener for ControllerHandle {
    fn on_audio_focus_change(&self, change: FocusChange) {
        self.send(Command::FocusChanged(change));
    }
}

/// Callback side of the queue, handed to the collaborators.
struct ControllerEvents {
    tx: mpsc::WeakUnboundedSender<Command>,
}

impl ControllerEvents {
    fn send(&self, command: Command) {
        match self.tx.upgrade() {
            Some(tx) => {
                if tx.send(command).is_err() {
                    debug!("Controller task gone, dropping event");
                }
            }
            None => debug!("Controller handles dropped, ignoring {:?}", command),
        }
    }
}

impl FocusChangeListener for ControllerEvents {
    fn on_audio_focus_change(&self, change: FocusChange) {
        self.send(Command::FocusChanged(change));
    }
}

impl EngineEventSink for ControllerEvents {
    fn engine_event(&self, generation: u64, event: EngineEvent) {
        self.send(Command::Engine { generation, event });
    }
}

impl NoisyOutputListener for ControllerEvents {
    fn on_audio_becoming_noisy(&self) {
        self.send(Command::AudioBecomingNoisy);
    }
}

async fn run_controller(mut controller: PlaybackController, mut rx: mpsc::UnboundedReceiver<Command>) {
    debug!("Controller task started for {}", controller.target());
    while let Some(command) = rx.recv().await {
        debug!("Controller command: {:?}", command);
        match command {
            Command::Play => controller.play(),
            Command::Pause => controller.pause(),
            Command::Stop { notify } => controller.stop(notify),
            Command::FocusChanged(change) => controller.on_audio_focus_change(change),
            Command::Engine { generation, event } => controller.on_engine_event(generation, event),
            Command::AudioBecomingNoisy => controller.on_audio_becoming_noisy(),
            Command::QueryPlaying(reply) => {
                let _ = reply.send(controller.is_playing());
            }
            Command::SetListener(listener) => controller.set_listener(listener),
            Command::Shutdown => {
                controller.stop(false);
                debug!("Controller task ended");
                return;
            }
        }
    }
    // Every handle is gone; dropping the controller tears it down silently.
    debug!("Controller task ended, all handles dropped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::playback::controller::tests::{fake_collaborators, RecordingListener, Shared};
    use crate::playback::{EngineListener, PlaybackState};

    fn spawn(world: &Shared) -> (ControllerHandle, JoinHandle<()>) {
        ControllerHandle::spawn(
            StreamTarget::default(),
            fake_collaborators(world),
            Some(Box::new(RecordingListener(world.clone()))),
        )
    }

    fn states(world: &Shared) -> Vec<PlaybackState> {
        world.lock().unwrap().statuses.iter().map(|s| s.state).collect()
    }

    /// The listener the controller gave to its `index`th engine.
    fn engine_listener(world: &Shared, index: usize) -> Arc<dyn EngineListener> {
        world.lock().unwrap().engine_listeners.0[index].clone()
    }

    #[tokio::test]
    async fn test_commands_apply_in_order() {
        let world = Shared::default();
        let (handle, task) = spawn(&world);

        handle.play();
        // Round trip so the engine exists before it reports.
        assert!(handle.is_playing().await);
        engine_listener(&world, 0).on_ready();
        handle.pause();
        assert!(!handle.is_playing().await);

        handle.shutdown();
        task.await.unwrap();

        assert_eq!(
            states(&world),
            vec![PlaybackState::Buffering, PlaybackState::Playing, PlaybackState::Paused]
        );
    }

    #[tokio::test]
    async fn test_events_from_other_threads_are_serialised() {
        let world = Shared::default();
        let (handle, task) = spawn(&world);

        handle.play();
        assert!(handle.is_playing().await);
        let engine_side = engine_listener(&world, 0);
        let focus_side = handle.clone();
        std::thread::spawn(move || {
            engine_side.on_ready();
            focus_side.on_audio_focus_change(FocusChange::LossTransientCanDuck);
        })
        .join()
        .unwrap();

        assert!(handle.is_playing().await);
        handle.shutdown();
        task.await.unwrap();

        let w = world.lock().unwrap();
        assert_eq!(w.statuses.last().map(|s| s.state), Some(PlaybackState::Playing));
        assert_eq!(w.volume, Some(crate::playback::DUCK_VOLUME));
    }

    #[tokio::test]
    async fn test_released_engine_ready_does_not_start_new_engine() {
        let world = Shared::default();
        let (handle, task) = spawn(&world);

        handle.play();
        handle.stop(true);
        handle.play();
        assert!(handle.is_playing().await);

        let released = engine_listener(&world, 0);
        released.on_ready();
        released.on_error(EngineError::Decode("late".to_string()));
        assert!(handle.is_playing().await);

        handle.shutdown();
        task.await.unwrap();

        let w = world.lock().unwrap();
        assert_eq!(w.engines_created, 2);
        assert_eq!(w.statuses.last().map(|s| s.state), Some(PlaybackState::Buffering));
        assert!(!w.play_intent);
        assert!(w.errors.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_releases_silently() {
        let world = Shared::default();
        let (handle, task) = spawn(&world);

        handle.play();
        assert!(handle.is_playing().await);
        engine_listener(&world, 0).on_ready();
        handle.shutdown();
        task.await.unwrap();

        let w = world.lock().unwrap();
        assert_eq!(w.statuses.last().map(|s| s.state), Some(PlaybackState::Playing));
        assert!(!w.wake_held);
        assert_eq!(w.engine_releases, 1);
    }

    #[tokio::test]
    async fn test_dropping_every_handle_ends_task() {
        let world = Shared::default();
        let (handle, task) = spawn(&world);

        handle.play();
        assert!(handle.is_playing().await);
        let late_engine = engine_listener(&world, 0);
        drop(handle);
        task.await.unwrap();
        late_engine.on_ready();

        let w = world.lock().unwrap();
        assert_eq!(w.engine_releases, 1);
        assert!(!w.wake_held);
        assert!(!w.subscribed);
        assert_eq!(w.statuses.last().map(|s| s.state), Some(PlaybackState::Buffering));
    }

    #[tokio::test]
    async fn test_engine_error_reaches_listener() {
        let world = Shared::default();
        let (handle, task) = spawn(&world);

        handle.play();
        assert!(handle.is_playing().await);
        engine_listener(&world, 0).on_error(EngineError::Decode("decoder X unavailable".to_string()));
        handle.shutdown();
        task.await.unwrap();

        assert_eq!(world.lock().unwrap().errors, vec!["decoder X unavailable".to_string()]);
    }

    #[tokio::test]
    async fn test_is_playing_after_task_ended() {
        let world = Shared::default();
        let (handle, task) = spawn(&world);

        handle.shutdown();
        task.await.unwrap();
        assert!(!handle.is_playing().await);
    }
}
