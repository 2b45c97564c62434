//! Display backends.
//!
//! The status screen is a list of text lines at pixel positions, the way a
//! 128x64 SSD1306 panel is laid out with the default 6x8 font. Backends only
//! need to clear and draw whole frames.

mod log_display;
mod terminal;

pub use log_display::LogDisplay;
pub use terminal::TerminalDisplay;

use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("display I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("display disconnected")]
    Disconnected,
}

/// One piece of text anchored at its top-left pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLine {
    pub x: u32,
    pub y: u32,
    pub text: String,
}

/// An ordered set of text lines making up one screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    lines: Vec<TextLine>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, x: u32, y: u32, text: impl Into<String>) {
        self.lines.push(TextLine {
            x,
            y,
            text: text.into(),
        });
    }

    pub fn lines(&self) -> &[TextLine] {
        &self.lines
    }

    /// Text drawn at exactly `(x, y)`, if any.
    #[cfg(test)]
    pub fn text_at(&self, x: u32, y: u32) -> Option<&str> {
        self.lines
            .iter()
            .find(|line| line.x == x && line.y == y)
            .map(|line| line.text.as_str())
    }
}

/// A device that can show frames.
pub trait Display: Send {
    fn clear(&mut self) -> Result<(), DisplayError>;

    fn draw_frame(&mut self, frame: &Frame) -> Result<(), DisplayError>;

    /// Panel size in pixels as `(width, height)`.
    fn size(&self) -> (u32, u32);
}

struct Panel {
    device: Box<dyn Display>,
    blanked: bool,
}

/// Display handle shared by the render loop and shutdown cleanup.
///
/// Once `blank` has run, later frames are dropped so a render tick racing
/// with shutdown cannot repaint the panel after it was cleared.
#[derive(Clone)]
pub struct SharedDisplay {
    panel: Arc<Mutex<Panel>>,
}

impl SharedDisplay {
    pub fn new(device: Box<dyn Display>) -> Self {
        Self {
            panel: Arc::new(Mutex::new(Panel {
                device,
                blanked: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Panel> {
        self.panel.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn draw(&self, frame: &Frame) -> Result<(), DisplayError> {
        let mut panel = self.lock();
        if panel.blanked {
            return Ok(());
        }
        panel.device.draw_frame(frame)
    }

    /// Clears the panel and keeps it blank for the rest of the process.
    pub fn blank(&self) -> Result<(), DisplayError> {
        let mut panel = self.lock();
        panel.blanked = true;
        panel.device.clear()
    }

    #[cfg(test)]
    pub fn is_blanked(&self) -> bool {
        self.lock().blanked
    }

    pub fn size(&self) -> (u32, u32) {
        self.lock().device.size()
    }
}
