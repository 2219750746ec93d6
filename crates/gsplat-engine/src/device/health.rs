use std::sync::{Arc, Mutex};

use crate::error::{SplatError, SplatResult};

/// Shared flag flipped by wgpu's device-lost callback.
///
/// Cloning shares the flag. A lost device is terminal: nothing resets it.
#[derive(Debug, Clone, Default)]
pub struct DeviceHealth {
    lost: Arc<Mutex<Option<String>>>,
}

impl DeviceHealth {
    /// Installs a device-lost callback on `device` and returns the tracker.
    ///
    /// wgpu keeps a single callback per device; installing another replaces this one.
    pub fn watch(device: &wgpu::Device) -> Self {
        let health = Self::default();
        let slot = Arc::clone(&health.lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("device lost ({reason:?}): {message}");
            if let Ok(mut lost) = slot.lock() {
                *lost = Some(format!("{reason:?}: {message}"));
            }
        });
        health
    }

    pub fn is_lost(&self) -> bool {
        self.lost.lock().map(|l| l.is_some()).unwrap_or(true)
    }

    /// Fails with `SplatError::DeviceLost` once the device has been lost.
    pub fn check(&self) -> SplatResult<()> {
        let lost = self.lost.lock().map_err(|_| SplatError::DeviceLost {
            reason: "device health lock poisoned".to_string(),
        })?;
        match lost.as_ref() {
            Some(reason) => Err(SplatError::DeviceLost {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    #[cfg(test)]
    pub(crate) fn mark_lost(&self, reason: &str) {
        if let Ok(mut lost) = self.lost.lock() {
            *lost = Some(reason.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_tracker_is_healthy() {
        let health = DeviceHealth::default();
        assert!(!health.is_lost());
        assert!(health.check().is_ok());
    }

    #[test]
    fn loss_is_visible_through_clones() {
        let health = DeviceHealth::default();
        let observer = health.clone();
        health.mark_lost("Destroyed: test");

        assert!(observer.is_lost());
        let err = observer.check().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("Destroyed"));
    }
}
