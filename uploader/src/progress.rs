//! Upload progress as seen by whoever renders it.

/// Turns byte offsets into whole-number percentages and forwards each *new* percentage.
///
/// Emitted values never go down, and the same value is never emitted twice in a row, even when
/// the server acknowledges an offset lower than one it acknowledged before.
pub struct ProgressTracker<F> {
    total_bytes: u64,
    last_emitted: Option<u8>,
    on_progress: F,
}

impl<F> ProgressTracker<F>
where
    F: FnMut(u8),
{
    pub fn new(total_bytes: u64, on_progress: F) -> Self {
        Self {
            total_bytes,
            last_emitted: None,
            on_progress,
        }
    }

    /// Reports that the server holds `bytes_sent` bytes.
    pub fn update(&mut self, bytes_sent: u64) {
        let percent = percent_of(bytes_sent, self.total_bytes);
        if self.last_emitted.is_some_and(|last| percent <= last) {
            return;
        }
        self.last_emitted = Some(percent);
        (self.on_progress)(percent);
    }

    pub fn last_emitted(&self) -> Option<u8> {
        self.last_emitted
    }
}

/// Floor of `sent / total` as a percentage, clamped to 100.
fn percent_of(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = u128::from(sent.min(total)) * 100 / u128::from(total);
    percent as u8
}
