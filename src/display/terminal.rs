//! Renders frames as text in a terminal, one 6x8 pixel cell per character.

use std::io::{self, Write};

use super::{Display, DisplayError, Frame};

const CELL_WIDTH: u32 = 6;
const CELL_HEIGHT: u32 = 8;
const HOME_AND_CLEAR: &str = "\x1b[H\x1b[2J";

pub struct TerminalDisplay<W: Write + Send> {
    out: W,
    width: u32,
    height: u32,
}

impl TerminalDisplay<io::Stdout> {
    pub fn stdout(width: u32, height: u32) -> Self {
        Self::new(io::stdout(), width, height)
    }
}

impl<W: Write + Send> TerminalDisplay<W> {
    pub fn new(out: W, width: u32, height: u32) -> Self {
        Self { out, width, height }
    }

    /// Lays the frame out on a character grid. Text past the right edge is
    /// kept so nothing is silently lost on a wide terminal.
    pub fn rasterize(&self, frame: &Frame) -> Vec<String> {
        let rows = self.height.div_ceil(CELL_HEIGHT) as usize;
        let mut grid: Vec<Vec<char>> = vec![Vec::new(); rows];
        for line in frame.lines() {
            let row = (line.y / CELL_HEIGHT) as usize;
            let Some(cells) = grid.get_mut(row) else {
                continue;
            };
            let column = (line.x / CELL_WIDTH) as usize;
            for (offset, ch) in line.text.trim_end().chars().enumerate() {
                let index = column + offset;
                if cells.len() <= index {
                    cells.resize(index + 1, ' ');
                }
                cells[index] = ch;
            }
        }
        grid.into_iter()
            .map(|cells| cells.into_iter().collect::<String>().trim_end().to_string())
            .collect()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), DisplayError> {
        self.out
            .write_all(bytes)
            .and_then(|()| self.out.flush())
            .map_err(|err| match err.kind() {
                io::ErrorKind::BrokenPipe => DisplayError::Disconnected,
                _ => DisplayError::Io(err),
            })
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Display for TerminalDisplay<W> {
    fn clear(&mut self) -> Result<(), DisplayError> {
        self.write(HOME_AND_CLEAR.as_bytes())
    }

    fn draw_frame(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        let rows = self.rasterize(frame);
        let mut buffer = String::from(HOME_AND_CLEAR);
        for row in rows {
            buffer.push_str(&row);
            buffer.push('\n');
        }
        self.write(buffer.as_bytes())
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn places_text_on_grid() {
        let display = TerminalDisplay::new(Vec::new(), 128, 32);
        let mut frame = Frame::new();
        frame.push(0, 0, "19 Oct 2026");
        frame.push(80, 0, "12:34:56");
        frame.push(0, 16, "wlan0: Tx: 1M, Rx: 2M");
        let rows = display.rasterize(&frame);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], "19 Oct 2026  12:34:56");
        assert_eq!(rows[1], "");
        assert_eq!(rows[2], "wlan0: Tx: 1M, Rx: 2M");
    }

    #[test]
    fn drops_lines_below_panel() {
        let display = TerminalDisplay::new(Vec::new(), 128, 32);
        let mut frame = Frame::new();
        frame.push(0, 56, "Atmo: --.--*C  --.--%");
        assert!(display.rasterize(&frame).iter().all(|row| row.is_empty()));
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn closed_output_is_disconnected() {
        let mut display = TerminalDisplay::new(ClosedPipe, 128, 64);
        assert!(matches!(display.clear(), Err(DisplayError::Disconnected)));
    }

    #[test]
    fn writes_ansi_frames() {
        let mut display = TerminalDisplay::new(Vec::new(), 128, 8);
        let mut frame = Frame::new();
        frame.push(0, 0, "hello");
        display.draw_frame(&frame).unwrap();
        display.clear().unwrap();
        let written = String::from_utf8(display.into_inner()).unwrap();
        assert_eq!(written, format!("{}hello\n{}", HOME_AND_CLEAR, HOME_AND_CLEAR));
    }
}
