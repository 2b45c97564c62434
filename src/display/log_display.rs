//! Headless backend that only logs frames, for running without a panel.

use super::{Display, DisplayError, Frame};

pub struct LogDisplay {
    width: u32,
    height: u32,
    last: Option<Frame>,
    /// Frames written to the log so far.
    logged: u64,
}

impl LogDisplay {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            last: None,
            logged: 0,
        }
    }
}

impl Display for LogDisplay {
    fn clear(&mut self) -> Result<(), DisplayError> {
        log::debug!("display cleared");
        self.last = None;
        Ok(())
    }

    fn draw_frame(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        // Only log changes; at 10 frames per second the clock is the usual diff.
        if self.last.as_ref() != Some(frame) {
            self.logged += 1;
            log::debug!("frame {}", self.logged);
            for line in frame.lines() {
                log::debug!("({:>3},{:>2}) {}", line.x, line.y, line.text);
            }
            self.last = Some(frame.clone());
        }
        Ok(())
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
