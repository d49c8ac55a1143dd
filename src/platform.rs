//! Desktop stand-ins for the platform services the controller depends on.

use log::{debug, info};
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::playback::{
    AudioFocusService, FocusChangeListener, FocusRequestResult, NoisyOutputListener,
    OutputRouteMonitor, WakeResource,
};

const DEVICE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Desktop systems have no focus arbiter, so every request is granted.
///
/// Focus changes can still be injected through the controller handle.
#[derive(Default)]
pub struct GrantingFocusService {
    listener: Option<Arc<dyn FocusChangeListener>>,
}

impl GrantingFocusService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }
}

impl AudioFocusService for GrantingFocusService {
    fn request_focus(&mut self, listener: Arc<dyn FocusChangeListener>) -> FocusRequestResult {
        self.listener = Some(listener);
        FocusRequestResult::Granted
    }

    fn abandon_focus(&mut self) -> FocusRequestResult {
        self.listener = None;
        FocusRequestResult::Granted
    }
}

/// Keeps the stream connection marked as in use for as long as it is held.
pub struct NetworkKeepAlive {
    tag: &'static str,
    held: bool,
}

impl NetworkKeepAlive {
    pub fn new(tag: &'static str) -> Self {
        Self { tag, held: false }
    }
}

impl WakeResource for NetworkKeepAlive {
    fn acquire(&mut self) {
        if !self.held {
            info!("Network keep-alive '{}' acquired", self.tag);
            self.held = true;
        }
    }

    fn release(&mut self) {
        if self.held {
            info!("Network keep-alive '{}' released", self.tag);
            self.held = false;
        }
    }

    fn is_held(&self) -> bool {
        self.held
    }
}

/// Watches the default output device and reports when it goes away or is
/// replaced, the desktop equivalent of headphones being unplugged.
#[derive(Default)]
pub struct DefaultDeviceMonitor {
    watch: Option<CancellationToken>,
}

impl DefaultDeviceMonitor {
    pub fn new() -> Self {
        Self::default()
    }
}

fn default_output_device_name() -> Option<String> {
    rodio::cpal::default_host()
        .default_output_device()
        .and_then(|device| device.name().ok())
}

impl OutputRouteMonitor for DefaultDeviceMonitor {
    fn subscribe(&mut self, listener: Arc<dyn NoisyOutputListener>) {
        let cancel = CancellationToken::new();
        if let Some(previous) = self.watch.replace(cancel.clone()) {
            previous.cancel();
        }

        tokio::spawn(async move {
            let mut current = tokio::task::spawn_blocking(default_output_device_name)
                .await
                .ok()
                .flatten();
            debug!("Watching output device {:?}", current);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(DEVICE_POLL_INTERVAL) => {}
                }
                let Ok(now) = tokio::task::spawn_blocking(default_output_device_name).await else {
                    continue;
                };
                if now != current {
                    info!("Output device changed from {:?} to {:?}", current, now);
                    current = now;
                    if !cancel.is_cancelled() {
                        listener.on_audio_becoming_noisy();
                    }
                }
            }
            debug!("Output device watch ended");
        });
    }

    fn unsubscribe(&mut self) {
        if let Some(cancel) = self.watch.take() {
            cancel.cancel();
        }
    }
}

impl Drop for DefaultDeviceMonitor {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
