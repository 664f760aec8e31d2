//! Device enumeration

use crate::errors::CameraError;
use crate::platform::CameraBackend;
use crate::types::DeviceDescriptor;
use std::sync::{Arc, Mutex};

/// Lists capture devices and remembers the last successful listing
pub struct DeviceRegistry {
    backend: Arc<dyn CameraBackend>,
    snapshot: Mutex<Vec<DeviceDescriptor>>,
}

impl DeviceRegistry {
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Self {
            backend,
            snapshot: Mutex::new(Vec::new()),
        }
    }

    /// Query the backend afresh. Unlabelled devices are named `Camera N` by position.
    ///
    /// On failure the previous snapshot is cleared so callers fall back to an empty list.
    pub async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, CameraError> {
        let devices = match self.backend.enumerate().await {
            Ok(devices) => devices,
            Err(e) => {
                log::warn!("Device enumeration failed: {}", e);
                self.store(Vec::new());
                return Err(e);
            }
        };

        let devices: Vec<DeviceDescriptor> = devices
            .into_iter()
            .enumerate()
            .map(|(index, device)| {
                if device.label.trim().is_empty() {
                    DeviceDescriptor::new(device.id, format!("Camera {}", index + 1))
                } else {
                    device
                }
            })
            .collect();

        log::info!("Found {} camera(s)", devices.len());
        self.store(devices.clone());
        Ok(devices)
    }

    /// Devices from the last enumeration
    pub fn snapshot(&self) -> Vec<DeviceDescriptor> {
        self.snapshot
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.snapshot().iter().any(|d| d.id == device_id)
    }

    fn store(&self, devices: Vec<DeviceDescriptor>) {
        if let Ok(mut snapshot) = self.snapshot.lock() {
            *snapshot = devices;
        }
    }
}
