use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use indicatif::HumanBytes;
use tokio::sync::oneshot;

use crate::plan::Part;
use crate::progress::{PartProgress, ProgressBoard};

pub const TICK: Duration = Duration::from_millis(100);
const BAR_WIDTH: usize = 25;
const CLEAR_SCREEN: &str = "\x1B[H\x1B[2J";

pub fn percent(received: u64, length: u64) -> u64 {
    (received.saturating_mul(100) / length.max(1)).min(100)
}

fn bar(percent: u64) -> String {
    let filled = (percent as usize / (100 / BAR_WIDTH)).min(BAR_WIDTH);
    "█".repeat(filled)
}

pub fn render_line(part: &Part, progress: &PartProgress) -> String {
    let received = progress.bytes();
    let length = part.display_len();
    let percent = percent(received, length);
    format!(
        "[{:<width$}] #{} - {}% | speed: {}/s | {} of {} ✓",
        bar(percent),
        part.id + 1,
        percent,
        HumanBytes(progress.rate().max(0.0) as u64),
        HumanBytes(received),
        HumanBytes(length),
        width = BAR_WIDTH,
    )
}

/// Repaints the per-part view on every tick until dismissed.
pub struct Renderer {
    parts: Arc<[Part]>,
    board: Arc<ProgressBoard>,
}

impl Renderer {
    pub fn new(parts: Arc<[Part]>, board: Arc<ProgressBoard>) -> Self {
        Self { parts, board }
    }

    pub fn frame(&self) -> String {
        let mut frame = String::new();
        for part in self.parts.iter() {
            if let Some(progress) = self.board.part(part.id) {
                let _ = writeln!(frame, "{}", render_line(part, progress));
            }
        }
        frame
    }

    /// Runs until `done` resolves or its sender is dropped, then paints a last frame.
    pub async fn run(self, mut done: oneshot::Receiver<()>) {
        let mut tick = tokio::time::interval(TICK);
        loop {
            tokio::select! {
                _ = tick.tick() => self.paint(),
                _ = &mut done => break,
            }
        }
        self.paint();
    }

    fn paint(&self) {
        let mut stdout = io::stdout().lock();
        // A failed repaint only loses one frame.
        let _ = write!(stdout, "{}{}", CLEAR_SCREEN, self.frame());
        let _ = stdout.flush();
    }
}
