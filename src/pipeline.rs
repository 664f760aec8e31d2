//! The assembled appliance: registry, session, detection, sync and presentation wired
//! together around one camera backend and one bulb client.

use crate::bulb::BulbClient;
use crate::config::MirrorConfig;
use crate::detection::{ColorCell, DetectionLoop};
use crate::errors::CameraError;
use crate::extract::ColorExtractor;
use crate::platform::CameraBackend;
use crate::presentation::{Presenter, UiEvent};
use crate::registry::DeviceRegistry;
use crate::session::{CaptureSession, SessionEvent, SessionState};
use crate::sync::{SendOutcome, SyncScheduler};
use crate::types::{ColorSample, DeviceDescriptor};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const NO_CAMERAS_MESSAGE: &str = "No cameras found. Please connect a camera.";
pub const DISCONNECTED_MESSAGE: &str = "Camera disconnected. Attempting to reconnect...";

pub struct MirrorPipeline {
    config: MirrorConfig,
    registry: DeviceRegistry,
    session: CaptureSession,
    detection: DetectionLoop,
    sync: SyncScheduler,
    color: ColorCell,
    presenter: Presenter,
    pump: JoinHandle<()>,
}

impl MirrorPipeline {
    /// Wire up the pipeline. Must be called from within a tokio runtime.
    ///
    /// The returned receiver carries every presentation event.
    pub fn new(
        config: MirrorConfig,
        camera: Arc<dyn CameraBackend>,
        bulb: Arc<dyn BulbClient>,
    ) -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (presenter, ui_events) = Presenter::channel();
        let color = ColorCell::new();

        let registry = DeviceRegistry::new(Arc::clone(&camera));
        let (session, session_events) = CaptureSession::new(camera, &config.camera);
        let detection = DetectionLoop::new(
            session.clone(),
            ColorExtractor::new(&config.detection),
            color.clone(),
            presenter.clone(),
            config.detection.frame_interval(),
        );
        let sync = SyncScheduler::new(
            bulb,
            color.clone(),
            presenter.clone(),
            config.sync.auto_interval(),
        );

        let pump = tokio::spawn(pump_session_events(
            session_events,
            detection.clone(),
            presenter.clone(),
        ));

        let pipeline = Self {
            config,
            registry,
            session,
            detection,
            sync,
            color,
            presenter,
            pump,
        };
        (pipeline, ui_events)
    }

    /// Enumerate devices and select the preferred one, or the first.
    ///
    /// Problems are reported as status messages; the returned list is empty when
    /// enumeration failed or found nothing.
    pub async fn start(&self) -> Vec<DeviceDescriptor> {
        let devices = match self.registry.list_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                self.presenter.error(e.to_string());
                return Vec::new();
            }
        };

        let Some(first) = devices.first() else {
            self.presenter.error(NO_CAMERAS_MESSAGE);
            return devices;
        };

        let target = self
            .config
            .camera
            .preferred_device
            .as_deref()
            .filter(|id| devices.iter().any(|d| d.id == *id))
            .unwrap_or(first.id.as_str())
            .to_string();

        // Failures reach the presenter through the session event pump
        if let Err(e) = self.session.select(Some(target)).await {
            log::warn!("Initial camera selection failed: {}", e);
        }
        devices
    }

    /// Refresh the device list
    pub async fn devices(&self) -> Result<Vec<DeviceDescriptor>, CameraError> {
        self.registry.list_devices().await
    }

    /// Switch cameras (`None` = host default)
    pub async fn select_camera(&self, device_id: Option<String>) -> Result<(), CameraError> {
        self.session.select(device_id).await
    }

    pub async fn send_now(&self) -> SendOutcome {
        self.sync.send_now().await
    }

    pub fn toggle_auto(&self) -> bool {
        self.sync.toggle_auto()
    }

    pub fn set_auto(&self, enabled: bool) {
        if enabled {
            self.sync.enable_auto();
        } else {
            self.sync.disable_auto();
        }
    }

    pub fn last_color(&self) -> Option<ColorSample> {
        self.color.get()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn detection(&self) -> &DetectionLoop {
        &self.detection
    }

    pub fn sync(&self) -> &SyncScheduler {
        &self.sync
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Stop detection and auto mode and return the camera
    pub async fn shutdown(&self) {
        self.sync.disable_auto();
        self.detection.stop();
        self.session.release().await;
        log::info!("Pipeline shut down");
    }
}

impl Drop for MirrorPipeline {
    fn drop(&mut self) {
        self.detection.stop();
        self.pump.abort();
    }
}

async fn pump_session_events(
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    detection: DetectionLoop,
    presenter: Presenter,
) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Ready(ready) => {
                presenter.publish(UiEvent::CameraReady {
                    device_id: ready.device_id().map(str::to_string),
                });
                detection.start(&ready);
            }
            SessionEvent::Disconnected { device_id } => {
                presenter.error(DISCONNECTED_MESSAGE);
                presenter.publish(UiEvent::CameraDisconnected { device_id });
            }
            SessionEvent::Failed { error, .. } => {
                presenter.error(error.to_string());
            }
        }
    }
    log::debug!("Session event pump finished");
}
