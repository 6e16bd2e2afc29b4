use super::ShutdownReason;
use crate::collaborators::{Collaborators, Exporter, LogFeedback, TestPatternCamera, Uploader};
use crate::config::{SettingsHandle, StopmoConfig};
use crate::error::Result;
use crate::events::{EventBus, EventFilter, EventReceiver, StopmoEvent};
use crate::keyboard_input::KeyboardInputHandler;
use crate::recognizer::{DetectorRegistry, RecognizerKind, ScriptHandle};
use crate::router::RouterHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[cfg(feature = "upload")]
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

pub(super) type ShutdownSender = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

/// Wires the camera, the command router and its collaborators together
/// and keeps preview frames flowing until shutdown.
pub struct Studio {
    pub(super) config: StopmoConfig,
    pub(super) settings: SettingsHandle,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) camera: Arc<TestPatternCamera>,
    pub(super) script: ScriptHandle,
    pub(super) router: RouterHandle,
    pub(super) keyboard_handler: Option<KeyboardInputHandler>,

    // Lifecycle management
    pub(super) shutdown_sender: ShutdownSender,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
    pub(super) tasks: Vec<JoinHandle<()>>,
}

impl Studio {
    /// Build every component. The router task starts immediately; frames
    /// only flow once [`Studio::start`] is called.
    pub async fn new(config: StopmoConfig) -> Result<Self> {
        config.validate()?;

        let settings = SettingsHandle::new(config.clone());
        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let (width, height) = config.camera.resolution;
        let camera = Arc::new(TestPatternCamera::new(width, height));

        let script = ScriptHandle::new();
        let mut registry = DetectorRegistry::default();
        let manual = script.clone();
        registry.register(RecognizerKind::Manual, move |_| Box::new(manual.detector()));

        let collaborators = Collaborators {
            camera: camera.clone(),
            exporter: build_exporter(&config),
            uploader: build_uploader(),
            feedback: Arc::new(LogFeedback::new()),
        };
        let router = RouterHandle::spawn(
            settings.clone(),
            Arc::clone(&event_bus),
            registry,
            collaborators,
        )?;

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Ok(Self {
            config,
            settings,
            event_bus,
            camera,
            script,
            router,
            keyboard_handler: None,
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }

    /// Drive the manual recognizer from the terminal
    pub fn enable_keyboard(&mut self) {
        self.keyboard_handler = Some(KeyboardInputHandler::new(
            self.script.clone(),
            self.router.clone(),
            Arc::clone(&self.camera),
            Arc::clone(&self.event_bus),
        ));
    }

    /// Start the frame pump, the event monitor and keyboard control
    pub fn start(&mut self) {
        info!("Starting studio");
        self.tasks.push(self.spawn_event_monitor());
        self.tasks.push(self.spawn_frame_pump());
        if let Some(keyboard) = &self.keyboard_handler {
            keyboard.start();
        }
    }

    pub fn router(&self) -> &RouterHandle {
        &self.router
    }

    pub fn script(&self) -> &ScriptHandle {
        &self.script
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn camera(&self) -> Arc<TestPatternCamera> {
        Arc::clone(&self.camera)
    }

    fn spawn_frame_pump(&self) -> JoinHandle<()> {
        let fps = self.config.camera.fps.max(1);
        let camera = Arc::clone(&self.camera);
        let router = self.router.clone();
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(1000 / fps as u64));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            debug!("Frame pump running at {} fps", fps);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if !router.process_frame(camera.preview_frame()) && router.is_closed() {
                            warn!("Command router is gone, stopping frame pump");
                            break;
                        }
                    }
                }
            }
            debug!("Frame pump stopped");
        })
    }

    fn spawn_event_monitor(&self) -> JoinHandle<()> {
        let mut receiver = EventReceiver::new(
            self.event_bus.subscribe(),
            EventFilter::Custom(|event| !matches!(event, StopmoEvent::PlaybackFrame { .. })),
            "studio".to_string(),
        );
        let shutdown_sender = Arc::clone(&self.shutdown_sender);
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = receiver.recv() => match event {
                        Ok(StopmoEvent::ShutdownRequested { reason }) => {
                            if let Some(sender) = shutdown_sender.lock().await.take() {
                                let _ = sender.send(ShutdownReason::UserRequest(reason));
                            }
                        }
                        Ok(event) => info!("{}", event.description()),
                        Err(e) => {
                            error!("Event monitor stopped: {}", e);
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Stop every task and the router. Returns the process exit code.
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");
        self.cancellation_token.cancel();
        let mut exit_code = 0;

        if let Some(keyboard) = &self.keyboard_handler {
            keyboard.stop().await;
        }

        match timeout(Duration::from_secs(5), self.router.shutdown()).await {
            Ok(Ok(())) => info!("Command router stopped"),
            Ok(Err(e)) => {
                error!("Error stopping command router: {}", e);
                exit_code = 1;
            }
            Err(_) => {
                error!("Timed out stopping command router");
                exit_code = 1;
            }
        }

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Studio task ended abnormally: {}", e);
                exit_code = 1;
            }
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }
}

#[cfg(feature = "gif_export")]
fn build_exporter(config: &StopmoConfig) -> Arc<dyn Exporter> {
    Arc::new(crate::collaborators::GifExporter::new(
        config.export.path.clone(),
    ))
}

#[cfg(not(feature = "gif_export"))]
fn build_exporter(_config: &StopmoConfig) -> Arc<dyn Exporter> {
    warn!("Built without an encoder, films will not be exported");
    Arc::new(crate::collaborators::NoExport)
}

#[cfg(feature = "upload")]
fn build_uploader() -> Arc<dyn Uploader> {
    match crate::collaborators::HttpUploader::new(UPLOAD_TIMEOUT) {
        Ok(uploader) => Arc::new(uploader),
        Err(e) => {
            warn!("Sharing disabled: {}", e);
            Arc::new(crate::collaborators::NoUpload)
        }
    }
}

#[cfg(not(feature = "upload"))]
fn build_uploader() -> Arc<dyn Uploader> {
    Arc::new(crate::collaborators::NoUpload)
}
