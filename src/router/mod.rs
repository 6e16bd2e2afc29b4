//! Command router: turns recognizer signals into captures, navigation,
//! mode changes and export/share requests.
//!
//! The router runs as a single task. Every input (preview frames,
//! recognizer switches, debounce firings, capture completions) goes through
//! one channel, so recognizer callbacks are never interleaved and store
//! mutations happen in the order their triggers fired.

mod command;
mod machine;
mod timer;


pub use command::{display_text, Command, SAVE_TEXT, SHARE_TEXT};

use crate::collaborators::Collaborators;
use crate::config::SettingsHandle;
use crate::error::{CaptureError, RecognizerError, Result, StopmoError};
use crate::events::EventBus;
use crate::frame::Frame;
use crate::playback::PlaybackStatus;
use crate::recognizer::{DetectorRegistry, RecognizerKind};
use machine::CommandRouter;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use timer::SlotId;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, trace};

/// Make: capture and navigate. Play: loop the film.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Make,
    Play,
}

/// Kind of capture a debounce timer or command requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    Normal,
    Long,
    Background,
}

pub(crate) enum RouterInput {
    Frame(Frame),
    SwitchRecognizer {
        kind: RecognizerKind,
        reply: oneshot::Sender<std::result::Result<(), RecognizerError>>,
    },
    TimerFired {
        slot: SlotId,
        generation: u64,
    },
    CaptureLanded {
        seq: u64,
        result: std::result::Result<Frame, CaptureError>,
    },
    NewSession,
    Snapshot(oneshot::Sender<RouterSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Point-in-time view of the router and its frame store
#[derive(Debug, Clone)]
pub struct RouterSnapshot {
    pub mode: Mode,
    pub detecting: bool,
    pub recognizer: RecognizerKind,
    pub last_payload: String,
    pub display_text: String,
    pub frame_ids: Vec<u64>,
    pub cursor_index: usize,
    pub viewing_live_feed: bool,
    pub has_background: bool,
    /// A capture debounce is counting down
    pub capture_pending: bool,
    /// Captures in flight plus store commands queued behind them
    pub pending_ops: usize,
    pub playback: PlaybackStatus,
}

impl RouterSnapshot {
    pub fn frame_count(&self) -> usize {
        self.frame_ids.len()
    }
}

/// Cloneable entry point into a running command router
#[derive(Clone)]
pub struct RouterHandle {
    inbox: mpsc::UnboundedSender<RouterInput>,
    queued_frames: Arc<AtomicUsize>,
    max_queued_frames: usize,
    playback_frames: watch::Receiver<Option<Frame>>,
}

impl RouterHandle {
    /// Start the router task with the recognizer selected in settings.
    pub fn spawn(
        settings: SettingsHandle,
        event_bus: Arc<EventBus>,
        registry: DetectorRegistry,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let (inbox, receiver) = mpsc::unbounded_channel();
        let queued_frames = Arc::new(AtomicUsize::new(0));
        let max_queued_frames = settings.read(|cfg| cfg.system.max_queued_frames.max(1));

        let router = CommandRouter::new(
            settings,
            event_bus,
            registry,
            collaborators,
            inbox.downgrade(),
            Arc::clone(&queued_frames),
        )?;
        let playback_frames = router.playback_frames();
        info!("Command router started with {} recognizer", router.recognizer_kind().as_str());
        tokio::spawn(router.run(receiver));

        Ok(Self {
            inbox,
            queued_frames,
            max_queued_frames,
            playback_frames,
        })
    }

    /// Hand a preview frame to the active recognizer.
    ///
    /// Returns false when the frame was dropped because the router is
    /// behind or has stopped.
    pub fn process_frame(&self, frame: Frame) -> bool {
        if self.queued_frames.fetch_add(1, Ordering::AcqRel) >= self.max_queued_frames {
            self.queued_frames.fetch_sub(1, Ordering::AcqRel);
            trace!("Router busy, dropping preview frame {}", frame.id);
            return false;
        }
        if self.inbox.send(RouterInput::Frame(frame)).is_err() {
            self.queued_frames.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        true
    }

    /// Replace the active recognizer. On error the current one stays active.
    pub async fn switch_recognizer(&self, kind: RecognizerKind) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(RouterInput::SwitchRecognizer { kind, reply })?;
        response.await.map_err(|_| stopped())?.map_err(StopmoError::from)
    }

    /// Throw away the current film and start over in Make mode.
    pub fn new_session(&self) -> Result<()> {
        self.send(RouterInput::NewSession)
    }

    pub async fn snapshot(&self) -> Result<RouterSnapshot> {
        let (reply, response) = oneshot::channel();
        self.send(RouterInput::Snapshot(reply))?;
        response.await.map_err(|_| stopped())
    }

    /// Frames shown by the playback engine
    pub fn playback_frames(&self) -> watch::Receiver<Option<Frame>> {
        self.playback_frames.clone()
    }

    /// Stop timers and playback, then end the router task.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.send(RouterInput::Shutdown(reply))?;
        done.await.map_err(|_| stopped())
    }

    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }

    fn send(&self, input: RouterInput) -> Result<()> {
        self.inbox.send(input).map_err(|_| stopped())
    }
}

fn stopped() -> StopmoError {
    StopmoError::component("router", "command router has stopped")
}
