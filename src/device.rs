//! Hooks into the rest of the firmware. The console only ever asks the device to reset,
//! and gives it a chance to do periodic work between accepts.

use tracing::warn;

pub trait DeviceControl: Send + Sync {
    /// Hard reset. On a board this never returns.
    fn reset(&self);

    /// Called whenever the accept loop times out waiting for a client.
    fn idle(&self) {}
}

/// Host stand-in for the board: a reset exits the process so a supervisor restarts it.
pub struct ProcessDevice {
    pub exit_code: i32,
}

impl Default for ProcessDevice {
    fn default() -> Self {
        Self { exit_code: 0 }
    }
}

impl DeviceControl for ProcessDevice {
    fn reset(&self) {
        warn!("[device] hard reset requested, exiting with code {}", self.exit_code);
        std::process::exit(self.exit_code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        resets: AtomicUsize,
    }

    impl DeviceControl for Counting {
        fn reset(&self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_idle_defaults_to_noop() {
        let device = Counting::default();
        device.idle();
        assert_eq!(device.resets.load(Ordering::SeqCst), 0);
        device.reset();
        assert_eq!(device.resets.load(Ordering::SeqCst), 1);
        assert_eq!(ProcessDevice::default().exit_code, 0);
    }
}
