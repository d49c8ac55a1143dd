use log::debug;
use std::sync::Arc;

/// Called when the active audio output route is about to disappear.
pub trait NoisyOutputListener: Send + Sync {
    fn on_audio_becoming_noisy(&self);
}

/// Platform source of "output route going away" notifications.
pub trait OutputRouteMonitor: Send {
    fn subscribe(&mut self, listener: Arc<dyn NoisyOutputListener>);
    /// Stop delivering notifications and drop the listener.
    fn unsubscribe(&mut self);
}

/// Owns the single noisy-output subscription of one playback session.
///
/// Registration is idempotent in both directions and is torn down when the
/// guard is dropped.
pub struct NoisyOutputGuard {
    monitor: Box<dyn OutputRouteMonitor>,
    listener: Arc<dyn NoisyOutputListener>,
    registered: bool,
}

impl NoisyOutputGuard {
    pub fn new(monitor: Box<dyn OutputRouteMonitor>, listener: Arc<dyn NoisyOutputListener>) -> Self {
        Self {
            monitor,
            listener,
            registered: false,
        }
    }

    pub fn register(&mut self) {
        if !self.registered {
            debug!("Registering noisy output receiver");
            self.monitor.subscribe(self.listener.clone());
            self.registered = true;
        }
    }

    pub fn unregister(&mut self) {
        if self.registered {
            debug!("Unregistering noisy output receiver");
            self.monitor.unsubscribe();
            self.registered = false;
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }
}

impl Drop for NoisyOutputGuard {
    fn drop(&mut self) {
        self.unregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Counts {
        subscribed: usize,
        unsubscribed: usize,
    }

    struct CountingMonitor(Arc<Mutex<Counts>>);

    impl OutputRouteMonitor for CountingMonitor {
        fn subscribe(&mut self, _listener: Arc<dyn NoisyOutputListener>) {
            self.0.lock().unwrap().subscribed += 1;
        }

        fn unsubscribe(&mut self) {
            self.0.lock().unwrap().unsubscribed += 1;
        }
    }

    struct Ignore;

    impl NoisyOutputListener for Ignore {
        fn on_audio_becoming_noisy(&self) {}
    }

    fn guard() -> (NoisyOutputGuard, Arc<Mutex<Counts>>) {
        let counts = Arc::new(Mutex::new(Counts::default()));
        let guard = NoisyOutputGuard::new(Box::new(CountingMonitor(counts.clone())), Arc::new(Ignore));
        (guard, counts)
    }

    #[test]
    fn test_register_is_idempotent() {
        let (mut guard, counts) = guard();
        guard.register();
        guard.register();
        assert!(guard.is_registered());
        assert_eq!(counts.lock().unwrap().subscribed, 1);
    }

    #[test]
    fn test_unregister_without_register_is_noop() {
        let (mut guard, counts) = guard();
        guard.unregister();
        assert_eq!(counts.lock().unwrap().unsubscribed, 0);

        guard.register();
        guard.unregister();
        guard.unregister();
        assert!(!guard.is_registered());
        assert_eq!(counts.lock().unwrap().unsubscribed, 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let (mut guard, counts) = guard();
        guard.register();
        drop(guard);
        assert_eq!(counts.lock().unwrap().unsubscribed, 1);
    }
}
