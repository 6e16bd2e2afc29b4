use crate::error::EventBusError;
use crate::recognizer::RecognizerKind;
use crate::router::Mode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Effects that can be toggled by command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Kaleidoscope,
    Invert,
    Transparency,
}

/// Events published by the capture/playback core for UI and export listeners
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StopmoEvent {
    /// Make/Play mode changed
    ModeChanged { mode: Mode },
    /// The on-screen command text changed (empty means hidden)
    DisplayTextChanged { text: String },
    /// A capture landed in the frame store
    FrameCaptured {
        frame_id: u64,
        added: usize,
        frame_count: usize,
    },
    /// A capture was refused because the store is full
    CaptureRejected { reason: String },
    /// The camera failed to produce a capture
    CaptureFailed { error: String },
    /// A background image was stored for the transparency effect
    BackgroundCaptured { frame_id: u64 },
    /// Cursor or frame count changed
    StoreChanged {
        frame_count: usize,
        cursor_index: usize,
        viewing_live_feed: bool,
    },
    /// An effect was toggled
    EffectToggled { effect: Effect, enabled: bool },
    /// The active recognizer was replaced
    RecognizerSwitched { kind: RecognizerKind },
    /// An export finished
    ExportCompleted { path: PathBuf, frame_count: usize },
    /// An export failed
    ExportFailed { error: String },
    /// An upload finished
    UploadCompleted { destination: String },
    /// An upload failed
    UploadFailed { error: String },
    /// The playback engine shows a new frame
    PlaybackFrame { index: usize, frame_id: u64 },
    /// System shutdown requested
    ShutdownRequested { reason: String },
}

impl StopmoEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            StopmoEvent::ModeChanged { mode } => format!("Mode changed to {:?}", mode),
            StopmoEvent::DisplayTextChanged { text } if text.is_empty() => {
                "Display text cleared".to_string()
            }
            StopmoEvent::DisplayTextChanged { text } => format!("Display text: {}", text),
            StopmoEvent::FrameCaptured {
                frame_id,
                added,
                frame_count,
            } => format!(
                "Captured frame {} (+{}, {} total)",
                frame_id, added, frame_count
            ),
            StopmoEvent::CaptureRejected { reason } => format!("Capture rejected: {}", reason),
            StopmoEvent::CaptureFailed { error } => format!("Capture failed: {}", error),
            StopmoEvent::BackgroundCaptured { frame_id } => {
                format!("Background set from frame {}", frame_id)
            }
            StopmoEvent::StoreChanged {
                frame_count,
                cursor_index,
                viewing_live_feed,
            } => {
                if *viewing_live_feed {
                    format!("Live feed ({} frames)", frame_count)
                } else {
                    format!("Viewing frame {} of {}", cursor_index + 1, frame_count)
                }
            }
            StopmoEvent::EffectToggled { effect, enabled } => format!(
                "{:?} {}",
                effect,
                if *enabled { "enabled" } else { "disabled" }
            ),
            StopmoEvent::RecognizerSwitched { kind } => {
                format!("Recognizer switched to {}", kind.as_str())
            }
            StopmoEvent::ExportCompleted { path, frame_count } => {
                format!("Exported {} frames to {}", frame_count, path.display())
            }
            StopmoEvent::ExportFailed { error } => format!("Export failed: {}", error),
            StopmoEvent::UploadCompleted { destination } => {
                format!("Uploaded to {}", destination)
            }
            StopmoEvent::UploadFailed { error } => format!("Upload failed: {}", error),
            StopmoEvent::PlaybackFrame { index, frame_id } => {
                format!("Playback frame {} (id {})", index, frame_id)
            }
            StopmoEvent::ShutdownRequested { reason } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            StopmoEvent::ModeChanged { .. } => "mode_changed",
            StopmoEvent::DisplayTextChanged { .. } => "display_text_changed",
            StopmoEvent::FrameCaptured { .. } => "frame_captured",
            StopmoEvent::CaptureRejected { .. } => "capture_rejected",
            StopmoEvent::CaptureFailed { .. } => "capture_failed",
            StopmoEvent::BackgroundCaptured { .. } => "background_captured",
            StopmoEvent::StoreChanged { .. } => "store_changed",
            StopmoEvent::EffectToggled { .. } => "effect_toggled",
            StopmoEvent::RecognizerSwitched { .. } => "recognizer_switched",
            StopmoEvent::ExportCompleted { .. } => "export_completed",
            StopmoEvent::ExportFailed { .. } => "export_failed",
            StopmoEvent::UploadCompleted { .. } => "upload_completed",
            StopmoEvent::UploadFailed { .. } => "upload_failed",
            StopmoEvent::PlaybackFrame { .. } => "playback_frame",
            StopmoEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Event bus for component coordination using broadcast channels
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StopmoEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<StopmoEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of receivers; an error only means nobody is listening.
    pub fn publish(&self, event: StopmoEvent) -> Result<usize, EventBusError> {
        match &event {
            StopmoEvent::ExportFailed { error } | StopmoEvent::UploadFailed { error } => {
                warn!("{}", error);
            }
            StopmoEvent::CaptureFailed { .. } | StopmoEvent::CaptureRejected { .. } => {
                warn!("{}", event.description());
            }
            StopmoEvent::ShutdownRequested { reason } => {
                info!("Shutdown requested: {}", reason);
            }
            StopmoEvent::PlaybackFrame { .. } => {}
            _ => {
                if self.debug_logging {
                    debug!("Publishing event: {}", event.description());
                }
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Custom filter function
    Custom(fn(&StopmoEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &StopmoEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<StopmoEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<StopmoEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event.
    ///
    /// Lagging is logged and skipped; only a closed bus is an error.
    pub async fn recv(&mut self) -> Result<StopmoEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<StopmoEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let subscriber_count = event_bus
            .publish(StopmoEvent::ModeChanged { mode: Mode::Play })
            .unwrap();
        assert_eq!(subscriber_count, 1);

        match receiver.recv().await.unwrap() {
            StopmoEvent::ModeChanged { mode } => assert_eq!(mode, Mode::Play),
            _ => panic!("Unexpected event type"),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_reported() {
        let event_bus = EventBus::new(10);
        assert!(event_bus
            .publish(StopmoEvent::DisplayTextChanged {
                text: String::new()
            })
            .is_err());
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let filter = EventFilter::EventTypes(vec!["frame_captured"]);
        let mut filtered = EventReceiver::new(event_bus.subscribe(), filter, "test".to_string());

        event_bus
            .publish(StopmoEvent::DisplayTextChanged {
                text: "hello".to_string(),
            })
            .unwrap();
        event_bus
            .publish(StopmoEvent::FrameCaptured {
                frame_id: 3,
                added: 4,
                frame_count: 7,
            })
            .unwrap();

        let received = timeout(Duration::from_millis(100), filtered.recv())
            .await
            .unwrap()
            .unwrap();
        match received {
            StopmoEvent::FrameCaptured { added, .. } => assert_eq!(added, 4),
            _ => panic!("Unexpected event type"),
        }
        assert!(filtered.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_event_properties() {
        let event = StopmoEvent::StoreChanged {
            frame_count: 3,
            cursor_index: 1,
            viewing_live_feed: false,
        };

        assert_eq!(event.event_type(), "store_changed");
        assert_eq!(event.description(), "Viewing frame 2 of 3");
    }
}
