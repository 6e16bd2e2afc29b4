use super::Mode;
use crate::events::Effect;

/// Text shown after a save code is read
pub const SAVE_TEXT: &str = "Saved! Starting a new film";
/// Text shown after a share code is read
pub const SHARE_TEXT: &str = "Sharing your film";

/// Meaning of a recognized payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Play,
    Back,
    Forward,
    Delete,
    Save,
    Share,
    Toggle(Effect),
    /// Capture stored as several identical frames
    LongCapture,
    /// Capture stored as the transparency background
    BackgroundCapture,
    /// Any other code: hold it up, take it away, and a frame is captured
    Capture,
}

impl Command {
    /// Case-insensitive; surrounding whitespace is ignored.
    pub fn parse(payload: &str) -> Self {
        match payload.trim().to_lowercase().as_str() {
            "play" => Command::Play,
            "back" => Command::Back,
            "forward" => Command::Forward,
            "delete" => Command::Delete,
            "save" => Command::Save,
            "share" => Command::Share,
            "kaleidoscope" => Command::Toggle(Effect::Kaleidoscope),
            "invert" => Command::Toggle(Effect::Invert),
            "transparency" => Command::Toggle(Effect::Transparency),
            "long" => Command::LongCapture,
            "background" => Command::BackgroundCapture,
            _ => Command::Capture,
        }
    }

    /// Reserved keywords never show up on screen
    pub fn is_hidden(&self) -> bool {
        !matches!(self, Command::Save | Command::Share | Command::Capture)
    }
}

/// On-screen text for the most recent payload. Empty means nothing is shown.
pub fn display_text(payload: &str, mode: Mode) -> String {
    if mode == Mode::Play || payload.trim().is_empty() {
        return String::new();
    }
    match Command::parse(payload) {
        Command::Save => SAVE_TEXT.to_string(),
        Command::Share => SHARE_TEXT.to_string(),
        Command::Capture => payload.to_string(),
        _ => String::new(),
    }
}
