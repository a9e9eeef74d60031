//! Duration scan and seeking
//!
//! The scan plays the whole song once without mixing, recording the
//! sequencer state the first time each order is entered. Seeking restores
//! the latest of those marks at or before the requested time; playback
//! therefore resumes at the start of an order.

use std::sync::Arc;

use hashbrown::HashSet;
use modplay_song::Song;

use super::{OrderMark, Player, PlayerConfig};

/// Upper bound on scanned ticks (several hours at the fastest tempo)
const MAX_SCAN_TICKS: u32 = 2_000_000;

/// Play the song silently to measure it and collect seek points
pub(super) fn scan(song: &Arc<Song>, config: PlayerConfig) -> (u32, Vec<OrderMark>) {
    let mut probe = Player::unscanned(Arc::clone(song), config);
    let mut marks = Vec::new();
    let mut seen = HashSet::new();
    let mut ticks = 0u32;

    while !probe.is_finished() && ticks < MAX_SCAN_TICKS {
        if probe.seq.tick == 0 && seen.insert(probe.seq.order) {
            marks.push(probe.seq.mark());
        }
        probe.step(false);
        ticks += 1;
    }
    if ticks >= MAX_SCAN_TICKS {
        tracing::warn!(ticks, "song scan stopped at the tick limit");
    }
    (probe.seq.elapsed_ms(), marks)
}

impl Player {
    /// Jump to the start of the order playing at `ms`
    ///
    /// Times past the end clamp to the last seek point. Channel state is
    /// reset and loop detection starts afresh, so a finished song plays
    /// again after a seek.
    pub fn seek_time(&mut self, ms: u32) {
        let ms = ms.min(self.duration_ms);
        let mark = self
            .marks
            .iter()
            .rev()
            .find(|m| m.time_ms <= ms)
            .or(self.marks.first())
            .copied();
        if let Some(mark) = mark {
            tracing::debug!(ms, order = mark.order, at = mark.time_ms, "seek");
            self.restart_at(&mark);
        }
    }
}
