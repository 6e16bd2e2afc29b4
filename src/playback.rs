use crate::config::{PlaybackConfig, SettingsHandle, StopmoConfig};
use crate::events::{EventBus, StopmoEvent};
use crate::frame::Frame;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayDirection {
    Forward,
    Backward,
}

impl PlayDirection {
    fn step(self) -> isize {
        match self {
            PlayDirection::Forward => 1,
            PlayDirection::Backward => -1,
        }
    }

    fn flipped(self) -> Self {
        match self {
            PlayDirection::Forward => PlayDirection::Backward,
            PlayDirection::Backward => PlayDirection::Forward,
        }
    }
}

/// Index and direction after one playback step.
///
/// Looping wraps in both directions; bouncing flips direction at either end.
/// A single-frame sequence always stays on frame 0.
pub fn next_index(
    current: usize,
    direction: PlayDirection,
    len: usize,
    bounce: bool,
) -> (usize, PlayDirection) {
    if len <= 1 {
        return (0, direction);
    }
    let len = len as isize;
    let next = current as isize + direction.step();
    if !bounce {
        return (next.rem_euclid(len) as usize, direction);
    }
    if (0..len).contains(&next) {
        (next as usize, direction)
    } else {
        let flipped = direction.flipped();
        ((current as isize + flipped.step()) as usize, flipped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackStatus {
    pub is_playing: bool,
    pub current_frame_index: usize,
    pub direction: PlayDirection,
    pub frame_count: usize,
}

struct PlaybackState {
    frames: Arc<Vec<Frame>>,
    start_index: Option<usize>,
    current_frame_index: usize,
    direction: PlayDirection,
    is_playing: bool,
    /// Bumped on every start/stop so stale ticks can be recognized
    generation: u64,
}

#[derive(Clone)]
struct Shared {
    state: Arc<Mutex<PlaybackState>>,
    event_bus: Arc<EventBus>,
    now_showing: Arc<watch::Sender<Option<Frame>>>,
}

impl Shared {
    fn show(&self, state: &PlaybackState) {
        let Some(frame) = state.frames.get(state.current_frame_index) else {
            return;
        };
        let _ = self.event_bus.publish(StopmoEvent::PlaybackFrame {
            index: state.current_frame_index,
            frame_id: frame.id,
        });
        self.now_showing.send_replace(Some(frame.clone()));
    }

    /// Advance one step. Returns false once the ticker that owns
    /// `generation` has been superseded or stopped.
    fn advance(&self, generation: u64, bounce: bool) -> bool {
        let mut state = self.state.lock();
        if !state.is_playing || state.generation != generation {
            return false;
        }
        let (index, direction) = next_index(
            state.current_frame_index,
            state.direction,
            state.frames.len(),
            bounce,
        );
        state.current_frame_index = index;
        state.direction = direction;
        self.show(&state);
        true
    }
}

/// Loops a snapshot of the captured frames at the configured rate.
pub struct PlaybackEngine {
    shared: Shared,
    settings: SettingsHandle,
    ticker: Option<(CancellationToken, JoinHandle<()>)>,
}

impl PlaybackEngine {
    pub fn new(settings: SettingsHandle, event_bus: Arc<EventBus>) -> Self {
        let (now_showing, _) = watch::channel(None);
        Self {
            shared: Shared {
                state: Arc::new(Mutex::new(PlaybackState {
                    frames: Arc::new(Vec::new()),
                    start_index: None,
                    current_frame_index: 0,
                    direction: PlayDirection::Forward,
                    is_playing: false,
                    generation: 0,
                })),
                event_bus,
                now_showing: Arc::new(now_showing),
            },
            settings,
            ticker: None,
        }
    }

    /// Replace the sequence to play. Stops playback first if it is running.
    pub fn set_frames(&mut self, frames: Vec<Frame>, start_index: Option<usize>) {
        if self.is_playing() {
            debug!("New frames while playing, stopping playback first");
            self.stop();
        }
        let mut state = self.shared.state.lock();
        state.frames = Arc::new(frames);
        state.start_index = start_index;
        state.current_frame_index = 0;
    }

    /// Start looping. Returns false (and does nothing) when there is nothing to play.
    pub fn start(&mut self) -> bool {
        let config = self.settings.read(|cfg| cfg.playback.clone());
        let generation = {
            let mut state = self.shared.state.lock();
            if state.is_playing {
                return true;
            }
            let len = state.frames.len();
            if len == 0 {
                debug!("Playback requested with no frames");
                return false;
            }

            let (index, direction) = match (state.start_index, config.reverse) {
                (Some(index), true) => (index.min(len - 1), PlayDirection::Backward),
                (Some(index), false) => (index.min(len - 1), PlayDirection::Forward),
                (None, true) => (len - 1, PlayDirection::Backward),
                (None, false) => (0, PlayDirection::Forward),
            };
            state.current_frame_index = index;
            state.direction = direction;
            state.is_playing = true;
            state.generation += 1;
            self.shared.show(&state);
            info!(
                "Playback started: {} frames at {} fps from frame {}",
                len, config.frame_rate, index
            );
            state.generation
        };

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_ticker(
            self.shared.clone(),
            generation,
            token.clone(),
            self.settings.subscribe(),
            config,
        ));
        self.ticker = Some((token, handle));
        true
    }

    /// Stop looping. Safe to call repeatedly.
    pub fn stop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            if state.is_playing {
                state.is_playing = false;
                state.generation += 1;
                debug!("Playback stopped at frame {}", state.current_frame_index);
            }
        }
        if let Some((token, handle)) = self.ticker.take() {
            token.cancel();
            handle.abort();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.shared.state.lock().is_playing
    }

    pub fn status(&self) -> PlaybackStatus {
        let state = self.shared.state.lock();
        PlaybackStatus {
            is_playing: state.is_playing,
            current_frame_index: state.current_frame_index,
            direction: state.direction,
            frame_count: state.frames.len(),
        }
    }

    /// Frame currently on screen
    pub fn subscribe(&self) -> watch::Receiver<Option<Frame>> {
        self.shared.now_showing.subscribe()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn playback_changed(
    settings: &mut Option<watch::Receiver<StopmoConfig>>,
) -> Option<PlaybackConfig> {
    let Some(receiver) = settings.as_mut() else {
        return std::future::pending().await;
    };
    if receiver.changed().await.is_err() {
        *settings = None;
        return None;
    }
    let playback = receiver.borrow_and_update().playback.clone();
    Some(playback)
}

async fn run_ticker(
    shared: Shared,
    generation: u64,
    token: CancellationToken,
    settings: watch::Receiver<StopmoConfig>,
    config: PlaybackConfig,
) {
    let mut settings = Some(settings);
    let mut period = config.frame_interval();
    let mut bounce = config.bounce;
    let mut deadline = Instant::now() + period;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            update = playback_changed(&mut settings) => {
                if let Some(playback) = update {
                    bounce = playback.bounce;
                    let new_period = playback.frame_interval();
                    if new_period != period {
                        debug!("Playback rate changed to {} fps", playback.frame_rate);
                        deadline = deadline - period + new_period;
                        period = new_period;
                    }
                }
            }
            _ = sleep_until(deadline) => {
                if !shared.advance(generation, bounce) {
                    break;
                }
                deadline += period;
            }
        }
    }
}
