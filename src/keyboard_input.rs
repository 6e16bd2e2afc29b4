use crate::collaborators::TestPatternCamera;
use crate::events::{EventBus, StopmoEvent};
use crate::recognizer::ScriptHandle;
use crate::router::RouterHandle;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Marker color painted by the test camera when toggled with `c`
const MARKER_COLOR: [u8; 3] = [220, 30, 30];

#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyAction {
    /// Hold a code carrying this payload up to the camera
    Present(String),
    /// Take the code away
    Hide,
    ToggleMarker,
    NewSession,
    Quit,
}

fn key_action(code: KeyCode) -> Option<KeyAction> {
    let payload = match code {
        KeyCode::Enter => return Some(KeyAction::Hide),
        KeyCode::Esc | KeyCode::Char('q') => return Some(KeyAction::Quit),
        KeyCode::Char('n') => return Some(KeyAction::NewSession),
        KeyCode::Char('c') => return Some(KeyAction::ToggleMarker),
        KeyCode::Char(' ') => "snap".to_string(),
        KeyCode::Char(digit @ '0'..='9') => format!("scene {}", digit),
        KeyCode::Char('p') => "play".to_string(),
        KeyCode::Char('b') => "back".to_string(),
        KeyCode::Char('f') => "forward".to_string(),
        KeyCode::Char('d') => "delete".to_string(),
        KeyCode::Char('s') => "save".to_string(),
        KeyCode::Char('h') => "share".to_string(),
        KeyCode::Char('k') => "kaleidoscope".to_string(),
        KeyCode::Char('i') => "invert".to_string(),
        KeyCode::Char('t') => "transparency".to_string(),
        KeyCode::Char('l') => "long".to_string(),
        KeyCode::Char('g') => "background".to_string(),
        _ => return None,
    };
    Some(KeyAction::Present(payload))
}

/// Keyboard remote control for the manual recognizer.
///
/// A key "holds up" a command code until Enter takes it away, which is
/// exactly what a printed code in front of the camera does.
pub struct KeyboardInputHandler {
    script: ScriptHandle,
    router: RouterHandle,
    camera: Arc<TestPatternCamera>,
    event_bus: Arc<EventBus>,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(
        script: ScriptHandle,
        router: RouterHandle,
        camera: Arc<TestPatternCamera>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            script,
            router,
            camera,
            event_bus,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input
    pub fn start(&self) {
        info!("Keyboard control active: p/b/f/d/s/h/k/i/t/l/g, space or 0-9 hold a code, Enter hides it, n new film, c marker, q quit");

        let script = self.script.clone();
        let router = self.router.clone();
        let camera = Arc::clone(&self.camera);
        let event_bus = Arc::clone(&self.event_bus);
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            while !cancellation_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }
                        match key_action(key_event.code) {
                            Some(KeyAction::Present(payload)) => {
                                info!("Holding up code {:?}", payload);
                                script.present(payload);
                            }
                            Some(KeyAction::Hide) => {
                                debug!("Code taken away");
                                script.hide();
                            }
                            Some(KeyAction::ToggleMarker) => {
                                let marker = match camera.marker() {
                                    Some(_) => None,
                                    None => Some(MARKER_COLOR),
                                };
                                info!("Color marker {}", if marker.is_some() { "shown" } else { "hidden" });
                                camera.set_marker(marker);
                            }
                            Some(KeyAction::NewSession) => {
                                if let Err(e) = router.new_session() {
                                    warn!("Failed to start a new session: {}", e);
                                }
                            }
                            Some(KeyAction::Quit) => {
                                let _ = event_bus.publish(StopmoEvent::ShutdownRequested {
                                    reason: "User requested via keyboard".to_string(),
                                });
                                break;
                            }
                            None => debug!("Key pressed: {:?}", key_event.code),
                        }
                    }
                    Ok(false) => {}
                    Err(e) => warn!("Error polling for keyboard events: {}", e),
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Keyboard input handler task exited");
        });
    }

    /// Stop the keyboard input handler
    pub async fn stop(&self) {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Give the polling loop a moment to restore the terminal
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_keys_present_codes() {
        assert_eq!(
            key_action(KeyCode::Char('p')),
            Some(KeyAction::Present("play".to_string()))
        );
        assert_eq!(
            key_action(KeyCode::Char('7')),
            Some(KeyAction::Present("scene 7".to_string()))
        );
        assert_eq!(key_action(KeyCode::Enter), Some(KeyAction::Hide));
        assert_eq!(key_action(KeyCode::Esc), Some(KeyAction::Quit));
        assert_eq!(key_action(KeyCode::Tab), None);
    }
}
