use super::command::{display_text, Command};
use super::timer::{SlotId, TimerSlot};
use super::{CaptureKind, Mode, RouterInput, RouterSnapshot};
use crate::collaborators::{Collaborators, ExportOptions};
use crate::config::SettingsHandle;
use crate::error::{CaptureError, RecognizerError, Result};
use crate::events::{Effect, EventBus, StopmoEvent};
use crate::frame::Frame;
use crate::playback::PlaybackEngine;
use crate::recognizer::{DetectorRegistry, Recognizer, RecognizerKind, RecognizerSignal};
use crate::store::{FrameStore, LONG_CAPTURE_COPIES};
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, WeakUnboundedSender};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerAction {
    Capture(CaptureKind),
    ClearText,
}

/// Store mutations that must wait for earlier captures to land
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreCommand {
    MoveBack,
    MoveForward,
    DeleteCurrent,
    EnterPlay,
    ExitPlay,
    SaveAndReset,
    Share,
    /// Arm a normal capture if the store is on the live feed once this applies
    ArmCapture,
}

enum PendingOp {
    Capture {
        seq: u64,
        kind: CaptureKind,
        landed: Option<std::result::Result<Frame, CaptureError>>,
    },
    Store(StoreCommand),
}

impl PendingOp {
    fn is_ready(&self) -> bool {
        match self {
            PendingOp::Capture { landed, .. } => landed.is_some(),
            PendingOp::Store(_) => true,
        }
    }
}

pub(super) struct CommandRouter {
    settings: SettingsHandle,
    event_bus: Arc<EventBus>,
    collaborators: Collaborators,
    registry: DetectorRegistry,
    recognizer: Recognizer,
    store: FrameStore,
    playback: PlaybackEngine,

    mode: Mode,
    detecting: bool,
    last_payload: String,
    display_text: String,
    last_share: Option<Instant>,

    capture_timer: TimerSlot<TimerAction>,
    text_timer: TimerSlot<TimerAction>,
    pending: VecDeque<PendingOp>,
    next_capture_seq: u64,

    inbox: WeakUnboundedSender<RouterInput>,
    queued_frames: Arc<AtomicUsize>,
}

impl CommandRouter {
    pub(super) fn new(
        settings: SettingsHandle,
        event_bus: Arc<EventBus>,
        registry: DetectorRegistry,
        collaborators: Collaborators,
        inbox: WeakUnboundedSender<RouterInput>,
        queued_frames: Arc<AtomicUsize>,
    ) -> Result<Self> {
        let config = settings.current();
        let recognizer = registry.build(config.recognition.technique, &config)?;
        let playback = PlaybackEngine::new(settings.clone(), Arc::clone(&event_bus));

        Ok(Self {
            settings,
            event_bus,
            collaborators,
            registry,
            recognizer,
            store: FrameStore::new(config.store.capacity),
            playback,
            mode: Mode::Make,
            detecting: false,
            last_payload: String::new(),
            display_text: String::new(),
            last_share: None,
            capture_timer: TimerSlot::new(SlotId::CaptureDelay),
            text_timer: TimerSlot::new(SlotId::TextClear),
            pending: VecDeque::new(),
            next_capture_seq: 0,
            inbox,
            queued_frames,
        })
    }

    pub(super) fn recognizer_kind(&self) -> RecognizerKind {
        self.recognizer.kind()
    }

    pub(super) fn playback_frames(&self) -> watch::Receiver<Option<Frame>> {
        self.playback.subscribe()
    }

    pub(super) async fn run(mut self, mut inbox: UnboundedReceiver<RouterInput>) {
        while let Some(input) = inbox.recv().await {
            match input {
                RouterInput::Frame(frame) => {
                    self.queued_frames.fetch_sub(1, Ordering::AcqRel);
                    self.process_frame(&frame);
                }
                RouterInput::SwitchRecognizer { kind, reply } => {
                    let _ = reply.send(self.switch_recognizer(kind));
                }
                RouterInput::TimerFired { slot, generation } => {
                    self.on_timer(slot, generation);
                }
                RouterInput::CaptureLanded { seq, result } => {
                    self.on_capture_landed(seq, result);
                }
                RouterInput::NewSession => self.new_session(),
                RouterInput::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot());
                }
                RouterInput::Shutdown(done) => {
                    self.shutdown();
                    let _ = done.send(());
                    break;
                }
            }
        }
        debug!("Command router stopped");
    }

    fn process_frame(&mut self, frame: &Frame) {
        for signal in self.recognizer.process_frame(frame) {
            match signal {
                RecognizerSignal::TargetAcquired => self.on_target_acquired(),
                RecognizerSignal::DataDetected(payload) => self.on_data_detected(payload),
                RecognizerSignal::TargetLost => self.on_target_lost(),
            }
        }
    }

    fn on_target_acquired(&mut self) {
        trace!("Target acquired");
        self.detecting = true;
        if self.capture_timer.cancel() {
            debug!("Target reacquired, pending capture cancelled");
        }
        self.text_timer.cancel();
        let queued_arms = self.pending.len();
        self.pending
            .retain(|op| !matches!(op, PendingOp::Store(StoreCommand::ArmCapture)));
        if self.pending.len() != queued_arms {
            debug!("Target reacquired, queued capture dropped");
        }

        if Command::parse(&self.last_payload) == Command::Play {
            self.enter_play();
        } else {
            self.collaborators.feedback.start_hum();
        }
    }

    fn on_data_detected(&mut self, payload: String) {
        trace!("Data detected: {:?}", payload);
        self.last_payload = payload;
        self.refresh_display_text();
    }

    fn on_target_lost(&mut self) {
        trace!("Target lost");
        self.detecting = false;
        self.collaborators.feedback.stop_hum();

        let grace = self.settings.read(|cfg| cfg.recognition.grace_delay());
        let command = Command::parse(&self.last_payload);
        match command {
            Command::Play => self.exit_play(),
            Command::Back => self.submit(StoreCommand::MoveBack),
            Command::Forward => self.submit(StoreCommand::MoveForward),
            Command::Delete => self.submit(StoreCommand::DeleteCurrent),
            Command::Save => {
                info!("Save requested");
                self.submit(StoreCommand::SaveAndReset);
            }
            Command::Share => {
                info!("Share requested");
                self.submit(StoreCommand::Share);
            }
            Command::Toggle(effect) => self.toggle_effect(effect),
            Command::LongCapture => self.arm_capture(CaptureKind::Long),
            Command::BackgroundCapture => self.arm_capture(CaptureKind::Background),
            Command::Capture => {
                // Eligibility is decided against the store as earlier work leaves it
                self.submit(StoreCommand::ArmCapture);
                return;
            }
        }

        self.text_timer
            .schedule(grace, TimerAction::ClearText, &self.inbox);
    }

    fn arm_capture(&mut self, kind: CaptureKind) {
        let delay = self.settings.read(|cfg| cfg.recognition.capture_delay());
        debug!("{:?} capture in {:?} unless the target returns", kind, delay);
        self.capture_timer
            .schedule(delay, TimerAction::Capture(kind), &self.inbox);
    }

    fn on_timer(&mut self, slot: SlotId, generation: u64) {
        let action = match slot {
            SlotId::CaptureDelay => self.capture_timer.take_fired(generation),
            SlotId::TextClear => self.text_timer.take_fired(generation),
        };
        match action {
            Some(TimerAction::Capture(kind)) => self.fire_capture(kind),
            Some(TimerAction::ClearText) => self.clear_text(),
            None => trace!("Stale {:?} timer firing ignored", slot),
        }
    }

    fn fire_capture(&mut self, kind: CaptureKind) {
        self.collaborators.feedback.shutter();
        self.request_capture(kind);
        if kind == CaptureKind::Normal {
            let delay = self.settings.read(|cfg| cfg.recognition.post_capture_delay());
            self.text_timer
                .schedule(delay, TimerAction::ClearText, &self.inbox);
        }
    }

    /// Reserve a queue slot and ask the camera without blocking the router.
    fn request_capture(&mut self, kind: CaptureKind) {
        self.next_capture_seq += 1;
        let seq = self.next_capture_seq;
        self.pending.push_back(PendingOp::Capture {
            seq,
            kind,
            landed: None,
        });

        let camera = Arc::clone(&self.collaborators.camera);
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let result = camera.capture_photo().await;
            if let Some(inbox) = inbox.upgrade() {
                let _ = inbox.send(RouterInput::CaptureLanded { seq, result });
            }
        });
        debug!("{:?} capture #{} requested", kind, seq);
    }

    fn on_capture_landed(&mut self, seq: u64, result: std::result::Result<Frame, CaptureError>) {
        let slot = self.pending.iter_mut().find_map(|op| match op {
            PendingOp::Capture {
                seq: pending_seq,
                landed,
                ..
            } if *pending_seq == seq => Some(landed),
            _ => None,
        });
        match slot {
            Some(landed) => *landed = Some(result),
            None => {
                debug!("Capture #{} landed after its session ended, dropping it", seq);
                return;
            }
        }
        self.drain_pending();
    }

    fn submit(&mut self, command: StoreCommand) {
        if self.pending.is_empty() {
            self.apply_store_command(command);
        } else {
            debug!(
                "{:?} queued behind {} pending operation(s)",
                command,
                self.pending.len()
            );
            self.pending.push_back(PendingOp::Store(command));
        }
    }

    fn drain_pending(&mut self) {
        while self.pending.front().is_some_and(PendingOp::is_ready) {
            match self.pending.pop_front() {
                Some(PendingOp::Capture {
                    kind,
                    landed: Some(result),
                    ..
                }) => self.apply_capture(kind, result),
                Some(PendingOp::Store(command)) => self.apply_store_command(command),
                _ => {}
            }
        }
    }

    fn apply_capture(&mut self, kind: CaptureKind, result: std::result::Result<Frame, CaptureError>) {
        let frame = match result {
            Ok(frame) => frame,
            Err(e) => {
                self.publish(StopmoEvent::CaptureFailed {
                    error: e.to_string(),
                });
                return;
            }
        };

        let stored = match kind {
            CaptureKind::Normal => self.store.add_frame(frame).map(|id| (id, 1)),
            CaptureKind::Long => self
                .store
                .add_long_capture(frame)
                .map(|id| (id, LONG_CAPTURE_COPIES)),
            CaptureKind::Background => {
                let frame_id = frame.id;
                self.store.set_background(frame);
                info!("Background image captured");
                self.publish(StopmoEvent::BackgroundCaptured { frame_id });
                return;
            }
        };

        match stored {
            Ok((frame_id, added)) => {
                info!("Captured frame {} ({} in film)", frame_id, self.store.len());
                self.publish(StopmoEvent::FrameCaptured {
                    frame_id,
                    added,
                    frame_count: self.store.len(),
                });
                self.publish_store_changed();
            }
            Err(e) => self.publish(StopmoEvent::CaptureRejected {
                reason: e.to_string(),
            }),
        }
    }

    fn apply_store_command(&mut self, command: StoreCommand) {
        trace!("Applying {:?}", command);
        match command {
            StoreCommand::MoveBack => self.store.move_back(),
            StoreCommand::MoveForward => self.store.move_forward(),
            StoreCommand::DeleteCurrent => {
                self.store.delete_current();
            }
            StoreCommand::EnterPlay => {
                let frames = self.store.frames().to_vec();
                if !frames.is_empty() {
                    self.spawn_export(frames.clone(), None);
                }
                self.store.reset_to_last_frame();
                let start_index = (!frames.is_empty()).then(|| self.store.cursor_index());
                self.playback.set_frames(frames, start_index);
                self.playback.start();
            }
            StoreCommand::ExitPlay => {
                self.playback.stop();
                self.store.return_to_live_feed();
            }
            StoreCommand::SaveAndReset => {
                let frames = self.store.frames().to_vec();
                if frames.is_empty() {
                    debug!("Nothing to save");
                } else {
                    self.spawn_export(frames, None);
                }
                self.store.clear();
            }
            StoreCommand::Share => {
                self.share();
                return;
            }
            StoreCommand::ArmCapture => {
                if self.mode == Mode::Make && self.store.is_viewing_live_feed() {
                    // The text stays up until the capture fires
                    self.arm_capture(CaptureKind::Normal);
                } else {
                    debug!("Capture code ignored outside the live feed");
                    if !self.detecting {
                        let delay = self.settings.read(|cfg| cfg.recognition.grace_delay());
                        self.text_timer
                            .schedule(delay, TimerAction::ClearText, &self.inbox);
                    }
                }
                return;
            }
        }
        self.publish_store_changed();
    }

    /// The cooldown only starts once a share actually goes out.
    fn share(&mut self) {
        let now = Instant::now();
        let cooldown = self.settings.read(|cfg| cfg.recognition.share_cooldown());
        if self
            .last_share
            .is_some_and(|last| now.duration_since(last) <= cooldown)
        {
            debug!("Share ignored, still cooling down");
            return;
        }
        let Some(destination) = self.settings.read(|cfg| cfg.export.destination.clone()) else {
            warn!("Share requested but no upload destination is configured");
            return;
        };
        let frames = self.store.frames().to_vec();
        if frames.is_empty() {
            debug!("Nothing to share");
            return;
        }
        self.last_share = Some(now);
        self.spawn_export(frames, Some(destination));
    }

    /// Export in the background, then optionally upload the result.
    fn spawn_export(&self, frames: Vec<Frame>, upload_to: Option<String>) {
        let options = self.settings.read(ExportOptions::from_config);
        let exporter = Arc::clone(&self.collaborators.exporter);
        let uploader = Arc::clone(&self.collaborators.uploader);
        let event_bus = Arc::clone(&self.event_bus);
        debug!("Exporting {} frames", frames.len());

        tokio::spawn(async move {
            let artifact = match exporter.export_video(frames, options).await {
                Ok(artifact) => artifact,
                Err(e) => {
                    let _ = event_bus.publish(StopmoEvent::ExportFailed {
                        error: e.to_string(),
                    });
                    return;
                }
            };
            let _ = event_bus.publish(StopmoEvent::ExportCompleted {
                path: artifact.path.clone(),
                frame_count: artifact.frame_count,
            });

            if let Some(destination) = upload_to {
                let event = match uploader.upload_video(&artifact, &destination).await {
                    Ok(()) => StopmoEvent::UploadCompleted { destination },
                    Err(e) => StopmoEvent::UploadFailed {
                        error: e.to_string(),
                    },
                };
                let _ = event_bus.publish(event);
            }
        });
    }

    fn enter_play(&mut self) {
        if self.mode == Mode::Play {
            return;
        }
        info!("Entering Play mode");
        self.mode = Mode::Play;
        self.capture_timer.cancel();
        self.publish(StopmoEvent::ModeChanged { mode: Mode::Play });
        self.refresh_display_text();
        self.submit(StoreCommand::EnterPlay);
    }

    fn exit_play(&mut self) {
        if self.mode == Mode::Make {
            return;
        }
        info!("Back to Make mode");
        self.mode = Mode::Make;
        self.capture_timer.cancel();
        self.publish(StopmoEvent::ModeChanged { mode: Mode::Make });
        self.submit(StoreCommand::ExitPlay);
    }

    fn toggle_effect(&mut self, effect: Effect) {
        let rotation: f32 = rand::thread_rng().gen_range(0.0..360.0);
        let mut enabled = false;
        self.settings.update(|cfg| {
            let effects = &mut cfg.effects;
            match effect {
                Effect::Kaleidoscope => {
                    effects.kaleidoscope = !effects.kaleidoscope;
                    if effects.kaleidoscope {
                        effects.kaleidoscope_rotation = rotation;
                    }
                    enabled = effects.kaleidoscope;
                }
                Effect::Invert => {
                    effects.invert = !effects.invert;
                    enabled = effects.invert;
                }
                Effect::Transparency => {
                    effects.transparency = !effects.transparency;
                    enabled = effects.transparency;
                }
            }
        });
        info!("{:?} {}", effect, if enabled { "on" } else { "off" });
        self.publish(StopmoEvent::EffectToggled { effect, enabled });
    }

    fn switch_recognizer(&mut self, kind: RecognizerKind) -> std::result::Result<(), RecognizerError> {
        let config = self.settings.current();
        let replacement = self.registry.build(kind, &config)?;

        self.recognizer.reset();
        self.capture_timer.cancel();
        self.text_timer.cancel();
        self.collaborators.feedback.reset();
        self.recognizer = replacement;
        self.detecting = false;
        self.last_payload.clear();
        self.refresh_display_text();
        if config.recognition.technique != kind {
            self.settings.update(|cfg| cfg.recognition.technique = kind);
        }

        info!("Recognizer switched to {}", kind.as_str());
        self.publish(StopmoEvent::RecognizerSwitched { kind });
        Ok(())
    }

    fn new_session(&mut self) {
        info!("Starting a new session");
        self.capture_timer.cancel();
        self.text_timer.cancel();
        self.pending.clear();
        self.playback.stop();
        self.recognizer.reset();
        self.collaborators.feedback.reset();
        self.detecting = false;
        self.last_payload.clear();
        self.last_share = None;
        if self.mode != Mode::Make {
            self.mode = Mode::Make;
            self.publish(StopmoEvent::ModeChanged { mode: Mode::Make });
        }
        self.store.clear();
        self.refresh_display_text();
        self.publish_store_changed();
    }

    fn shutdown(&mut self) {
        self.capture_timer.cancel();
        self.text_timer.cancel();
        self.playback.stop();
        self.collaborators.feedback.reset();
        if !self.pending.is_empty() {
            warn!("Router stopping with {} pending operation(s)", self.pending.len());
        }
    }

    fn clear_text(&mut self) {
        self.last_payload.clear();
        self.refresh_display_text();
    }

    fn refresh_display_text(&mut self) {
        let text = display_text(&self.last_payload, self.mode);
        if text != self.display_text {
            self.display_text = text.clone();
            self.publish(StopmoEvent::DisplayTextChanged { text });
        }
    }

    fn publish_store_changed(&self) {
        self.publish(StopmoEvent::StoreChanged {
            frame_count: self.store.len(),
            cursor_index: self.store.cursor_index(),
            viewing_live_feed: self.store.is_viewing_live_feed(),
        });
    }

    fn publish(&self, event: StopmoEvent) {
        // No subscribers is fine
        let _ = self.event_bus.publish(event);
    }

    fn snapshot(&self) -> RouterSnapshot {
        RouterSnapshot {
            mode: self.mode,
            detecting: self.detecting,
            recognizer: self.recognizer.kind(),
            last_payload: self.last_payload.clone(),
            display_text: self.display_text.clone(),
            frame_ids: self.store.frames().iter().map(|f| f.id).collect(),
            cursor_index: self.store.cursor_index(),
            viewing_live_feed: self.store.is_viewing_live_feed(),
            has_background: self.store.background().is_some(),
            capture_pending: self.capture_timer.is_armed()
                || self
                    .pending
                    .iter()
                    .any(|op| matches!(op, PendingOp::Store(StoreCommand::ArmCapture))),
            pending_ops: self.pending.len(),
            playback: self.playback.status(),
        }
    }
}
