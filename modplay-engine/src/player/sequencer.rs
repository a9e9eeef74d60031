//! Order/row navigation
//!
//! Every (order, row) pair played is remembered. Arriving at a pair a second
//! time means the song has looped, which ends playback the same way running
//! off the end of the order list does.

use hashbrown::HashSet;
use modplay_song::{ORDER_END, ORDER_SKIP, Song};

use super::{OrderMark, Player};
use crate::SAMPLE_RATE;
use crate::utils::samples_per_tick;

/// Tempo limits for tempo slides
pub(super) const MIN_TEMPO: i32 = 32;
pub(super) const MAX_TEMPO: i32 = 255;

#[derive(Debug, Clone)]
pub(super) struct Sequencer {
    pub order: usize,
    pub row: u16,
    /// Tick within the row, counting pattern-delay repeats
    pub tick: u16,
    pub speed: u8,
    pub tempo: u8,
    /// Global volume (0-128)
    pub global_volume: i32,
    /// Extra repeats of the current row (pattern delay)
    pub pattern_delay: u8,
    /// Extra ticks added to the current row (fine pattern delay)
    pub fine_delay: u8,
    /// Pending position jump (order)
    pub jump: Option<usize>,
    /// Pending pattern break (row in the next pattern)
    pub break_row: Option<u16>,
    /// Pending pattern-loop jump (row in this pattern)
    pub loop_jump: Option<u16>,
    /// Rows already played
    pub visited: HashSet<(usize, u16)>,
    /// Output frames rendered so far
    pub frames: u64,
    /// Fractional frame carried between ticks
    pub remainder: f64,
}

impl Sequencer {
    /// Sequencer at the first playable order, or `None` if there is none
    pub fn new(song: &Song) -> Option<Self> {
        let order = resolve_order(song, 0)?;
        Some(Self::at(song, order, 0))
    }

    /// Sequencer that has nothing left to play
    pub fn ended(song: &Song) -> Self {
        Self::at(song, song.orders.len(), 0)
    }

    fn at(song: &Song, order: usize, row: u16) -> Self {
        let mut visited = HashSet::new();
        visited.insert((order, row));
        Self {
            order,
            row,
            tick: 0,
            speed: song.initial_speed.max(1),
            tempo: song.initial_tempo.max(MIN_TEMPO as u8),
            global_volume: song.global_volume.min(128) as i32,
            pattern_delay: 0,
            fine_delay: 0,
            jump: None,
            break_row: None,
            loop_jump: None,
            visited,
            frames: 0,
            remainder: 0.0,
        }
    }

    /// Sequencer restored from a seek point
    pub fn from_mark(song: &Song, mark: &OrderMark) -> Self {
        let mut seq = Self::at(song, mark.order, mark.row);
        seq.speed = mark.speed.max(1);
        seq.tempo = mark.tempo;
        seq.global_volume = mark.global_volume as i32;
        seq.frames = mark.frames;
        seq
    }

    /// Snapshot of the current state as a seek point
    pub fn mark(&self) -> OrderMark {
        OrderMark {
            order: self.order,
            row: self.row,
            time_ms: self.elapsed_ms(),
            frames: self.frames,
            speed: self.speed,
            tempo: self.tempo,
            global_volume: self.global_volume as u8,
        }
    }

    pub fn elapsed_ms(&self) -> u32 {
        (self.frames * 1000 / SAMPLE_RATE as u64).min(u32::MAX as u64) as u32
    }

    /// Output frames in the next tick, carrying the fractional part forward
    pub fn next_tick_frames(&mut self) -> usize {
        let exact = samples_per_tick(self.tempo) + self.remainder;
        let frames = exact.floor();
        self.remainder = exact - frames;
        frames as usize
    }

    /// Ticks in the current row, including delays
    pub fn row_ticks(&self) -> u16 {
        self.speed as u16 * (1 + self.pattern_delay as u16) + self.fine_delay as u16
    }

    /// Tick within the current repeat of the row
    pub fn effect_tick(&self) -> u16 {
        self.tick % self.speed.max(1) as u16
    }
}

/// First order at or after `order` that holds a pattern, skipping "+++"
/// entries; `None` at "---" or past the end of the list
fn resolve_order(song: &Song, mut order: usize) -> Option<usize> {
    loop {
        match *song.orders.get(order)? {
            ORDER_END => return None,
            ORDER_SKIP => order += 1,
            _ => return Some(order),
        }
    }
}

impl Player {
    /// Move to the next row after the current one has played all its ticks
    pub(super) fn next_row(&mut self) {
        let seq = &mut self.seq;
        let (mut order, mut row) = (seq.order, seq.row);

        if let Some(target) = seq.loop_jump.take() {
            // Replaying the loop body is not a song loop
            for r in target..=row {
                seq.visited.remove(&(order, r));
            }
            row = target;
            seq.jump = None;
            seq.break_row = None;
        } else if seq.jump.is_some() || seq.break_row.is_some() {
            order = seq.jump.take().unwrap_or(order + 1);
            row = seq.break_row.take().unwrap_or(0);
        } else {
            row += 1;
            if row >= self.song.rows_at_order(order) {
                order += 1;
                row = 0;
            }
        }

        let Some(order) = resolve_order(&self.song, order) else {
            self.end_song("end of order list");
            return;
        };
        if row >= self.song.rows_at_order(order) {
            row = 0;
        }
        if !self.seq.visited.insert((order, row)) {
            self.end_song("song loop");
            return;
        }
        if order != self.seq.order {
            tracing::trace!(order, row, "order change");
        }
        self.seq.order = order;
        self.seq.row = row;
    }

    fn end_song(&mut self, reason: &'static str) {
        self.loop_count += 1;
        tracing::debug!(
            reason,
            order = self.seq.order,
            row = self.seq.row,
            time_ms = self.seq.elapsed_ms(),
            "song ended"
        );
    }

    /// Restart at the given order (row 0, current speed and tempo)
    ///
    /// "+++" entries are skipped, so playback lands on the first playable
    /// order at or after `order`. Uses the scanned seek point for that order
    /// when there is one. Returns `false` and leaves playback untouched if
    /// no pattern follows.
    pub fn set_order(&mut self, order: usize) -> bool {
        let Some(order) = resolve_order(&self.song, order) else {
            return false;
        };
        let mark = match self.marks.iter().find(|m| m.order == order) {
            Some(mark) => *mark,
            None => OrderMark {
                order,
                row: 0,
                ..self.seq.mark()
            },
        };
        self.restart_at(&mark);
        true
    }

    /// Reset channels and sequencer to a seek point
    pub(super) fn restart_at(&mut self, mark: &OrderMark) {
        self.channels = super::fresh_channels(&self.song, self.config.panning_amplitude);
        self.background.clear();
        self.seq = Sequencer::from_mark(&self.song, mark);
        self.loop_count = 0;
    }
}
