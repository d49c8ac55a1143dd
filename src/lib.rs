//! Playback core for a single-station internet radio player.
//!
//! The [`playback`] module holds the state machine that reconciles transport
//! commands, audio-focus changes and decoder lifecycle events. The remaining
//! modules provide the desktop collaborators it drives.

pub mod audio;
pub mod error;
pub mod platform;
pub mod playback;
pub mod stream;

pub use error::EngineError;
pub use playback::{
    AudioFocusLevel, AvailableActions, Collaborators, ControllerHandle, PlaybackController,
    PlaybackListener, PlaybackState, PlaybackStatus,
};
pub use stream::StreamTarget;
