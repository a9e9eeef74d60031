//! Byte builders for small synthetic modules
//!
//! Used by this crate's tests and, through the `testing` feature, by the
//! player and plugin tests. Every builder writes a file the matching loader
//! accepts; cells are addressed by (pattern, row, channel) and notes use the
//! shared 0-based key (60 plays a sample at its C-5 speed).

fn put_text(out: &mut Vec<u8>, text: &str, len: usize) {
    let bytes = text.as_bytes();
    let n = bytes.len().min(len);
    out.extend_from_slice(&bytes[..n]);
    out.resize(out.len() + len - n, 0);
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn align16(out: &mut Vec<u8>) {
    let padded = out.len().div_ceil(16) * 16;
    out.resize(padded, 0);
}

/// A short looped square wave, handy as a default instrument
pub fn square_wave(frames: usize, amplitude: i16) -> Vec<i16> {
    (0..frames)
        .map(|i| if (i / 16) % 2 == 0 { amplitude } else { -amplitude })
        .collect()
}

// =============================================================================
// ProTracker
// =============================================================================

struct ModSample {
    name: String,
    data: Vec<i8>,
    volume: u8,
    loop_range: Option<(usize, usize)>,
}

/// Builder for 31-sample ProTracker modules
pub struct ModBuilder {
    title: String,
    channels: usize,
    samples: Vec<ModSample>,
    orders: Vec<u8>,
    patterns: Vec<Vec<[u8; 4]>>,
}

impl ModBuilder {
    pub fn new(channels: usize) -> Self {
        Self {
            title: String::new(),
            channels,
            samples: Vec::new(),
            orders: vec![0],
            patterns: Vec::new(),
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    /// Add an 8-bit sample; loop bounds are in frames and must be even
    pub fn sample(
        mut self,
        name: &str,
        data: Vec<i8>,
        volume: u8,
        loop_range: Option<(usize, usize)>,
    ) -> Self {
        self.samples.push(ModSample {
            name: name.to_string(),
            data,
            volume,
            loop_range,
        });
        self
    }

    /// Append `count` empty 64-row patterns
    pub fn patterns(mut self, count: usize) -> Self {
        for _ in 0..count {
            self.patterns.push(vec![[0; 4]; 64 * self.channels]);
        }
        self
    }

    pub fn orders(mut self, orders: &[u8]) -> Self {
        self.orders = orders.to_vec();
        self
    }

    fn cell(&mut self, pattern: usize, row: usize, channel: usize) -> &mut [u8; 4] {
        &mut self.patterns[pattern][row * self.channels + channel]
    }

    /// Place a note with its sample number (1-based)
    pub fn note(mut self, pattern: usize, row: usize, channel: usize, key: u8, sample: u8) -> Self {
        let period = (428.0 * ((60.0 - key as f64) / 12.0).exp2()).round() as u16;
        let cell = self.cell(pattern, row, channel);
        cell[0] = (sample & 0xF0) | ((period >> 8) as u8 & 0x0F);
        cell[1] = period as u8;
        cell[2] = (cell[2] & 0x0F) | (sample << 4);
        self
    }

    /// Set the effect column (effect 0x0-0xF)
    pub fn effect(mut self, pattern: usize, row: usize, channel: usize, effect: u8, param: u8) -> Self {
        let cell = self.cell(pattern, row, channel);
        cell[2] = (cell[2] & 0xF0) | (effect & 0x0F);
        cell[3] = param;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_text(&mut out, &self.title, 20);
        for i in 0..31 {
            match self.samples.get(i) {
                Some(s) => {
                    put_text(&mut out, &s.name, 22);
                    out.extend_from_slice(&((s.data.len() / 2) as u16).to_be_bytes());
                    out.push(0);
                    out.push(s.volume);
                    let (start, end) = s.loop_range.unwrap_or((0, 2));
                    out.extend_from_slice(&((start / 2) as u16).to_be_bytes());
                    out.extend_from_slice(&(((end - start) / 2) as u16).to_be_bytes());
                }
                None => {
                    out.resize(out.len() + 28, 0);
                    out.extend_from_slice(&1u16.to_be_bytes());
                }
            }
        }
        out.push(self.orders.len() as u8);
        out.push(127);
        let mut table = self.orders.clone();
        table.resize(128, 0);
        out.extend_from_slice(&table);
        let tag = match self.channels {
            4 => *b"M.K.",
            n if n < 10 => [b'0' + n as u8, b'C', b'H', b'N'],
            n => [b'0' + (n / 10) as u8, b'0' + (n % 10) as u8, b'C', b'H'],
        };
        out.extend_from_slice(&tag);

        // The loader reads as many patterns as the order table references
        let needed = table.iter().copied().max().unwrap_or(0) as usize + 1;
        for index in 0..needed {
            match self.patterns.get(index) {
                Some(cells) => cells.iter().for_each(|c| out.extend_from_slice(c)),
                None => out.resize(out.len() + 64 * self.channels * 4, 0),
            }
        }
        for s in &self.samples {
            out.extend(s.data.iter().map(|&b| b as u8));
        }
        out
    }
}

// =============================================================================
// Scream Tracker 3
// =============================================================================

#[derive(Clone, Copy, Default)]
struct S3mCell {
    note: Option<u8>,
    instrument: u8,
    volume: Option<u8>,
    effect: Option<(u8, u8)>,
}

/// Builder for S3M modules with 8-bit samples
pub struct S3mBuilder {
    channels: usize,
    speed: u8,
    tempo: u8,
    samples: Vec<(String, Vec<i8>, Option<(u32, u32)>)>,
    orders: Vec<u8>,
    patterns: Vec<Vec<S3mCell>>,
}

impl S3mBuilder {
    pub fn new(channels: usize) -> Self {
        Self {
            channels: channels.min(16),
            speed: 6,
            tempo: 125,
            samples: Vec::new(),
            orders: vec![0],
            patterns: Vec::new(),
        }
    }

    pub fn speed(mut self, speed: u8) -> Self {
        self.speed = speed;
        self
    }

    pub fn tempo(mut self, tempo: u8) -> Self {
        self.tempo = tempo;
        self
    }

    pub fn sample(mut self, name: &str, data: Vec<i8>, loop_range: Option<(u32, u32)>) -> Self {
        self.samples.push((name.to_string(), data, loop_range));
        self
    }

    pub fn patterns(mut self, count: usize) -> Self {
        for _ in 0..count {
            self.patterns
                .push(vec![S3mCell::default(); 64 * self.channels]);
        }
        self
    }

    pub fn orders(mut self, orders: &[u8]) -> Self {
        self.orders = orders.to_vec();
        self
    }

    fn cell(&mut self, pattern: usize, row: usize, channel: usize) -> &mut S3mCell {
        &mut self.patterns[pattern][row * self.channels + channel]
    }

    pub fn note(mut self, pattern: usize, row: usize, channel: usize, key: u8, sample: u8) -> Self {
        let cell = self.cell(pattern, row, channel);
        cell.note = Some(key);
        cell.instrument = sample;
        self
    }

    pub fn volume(mut self, pattern: usize, row: usize, channel: usize, volume: u8) -> Self {
        self.cell(pattern, row, channel).volume = Some(volume);
        self
    }

    /// Effect letter as a number (A = 1) and parameter
    pub fn effect(mut self, pattern: usize, row: usize, channel: usize, command: u8, param: u8) -> Self {
        self.cell(pattern, row, channel).effect = Some((command, param));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_text(&mut out, "s3m test", 28);
        out.extend_from_slice(&[0x1A, 16, 0, 0]);
        let num_orders = self.orders.len() + self.orders.len() % 2;
        put_u16(&mut out, num_orders as u16);
        put_u16(&mut out, self.samples.len() as u16);
        put_u16(&mut out, self.patterns.len() as u16);
        put_u16(&mut out, 0);
        put_u16(&mut out, 0x1320);
        put_u16(&mut out, 2);
        out.extend_from_slice(b"SCRM");
        out.extend_from_slice(&[64, self.speed, self.tempo, 0x80 | 48, 0, 0]);
        out.resize(out.len() + 10, 0);
        for ch in 0..32 {
            out.push(match ch {
                c if c < self.channels && c % 2 == 0 => (c / 2) as u8,
                c if c < self.channels => 8 + (c / 2) as u8,
                _ => 255,
            });
        }
        out.extend_from_slice(&self.orders);
        if self.orders.len() % 2 == 1 {
            out.push(255);
        }
        let pointer_table = out.len();
        out.resize(out.len() + 2 * (self.samples.len() + self.patterns.len()), 0);
        align16(&mut out);

        let mut pointers = Vec::new();
        let mut header_positions = Vec::new();
        for (name, data, loop_range) in &self.samples {
            pointers.push((out.len() / 16) as u16);
            header_positions.push(out.len());
            out.push(1);
            out.resize(out.len() + 12, 0);
            out.extend_from_slice(&[0, 0, 0]);
            put_u32(&mut out, data.len() as u32);
            let (start, end) = loop_range.unwrap_or((0, 0));
            put_u32(&mut out, start);
            put_u32(&mut out, end);
            out.extend_from_slice(&[64, 0, 0, loop_range.is_some() as u8]);
            put_u32(&mut out, 8363);
            out.resize(out.len() + 12, 0);
            put_text(&mut out, name, 28);
            out.extend_from_slice(b"SCRS");
        }
        for (index, (_, data, _)) in self.samples.iter().enumerate() {
            align16(&mut out);
            let para = out.len() / 16;
            let header = header_positions[index];
            out[header + 13] = (para >> 16) as u8;
            out[header + 14..header + 16].copy_from_slice(&(para as u16).to_le_bytes());
            // Unsigned sample format
            out.extend(data.iter().map(|&s| (s as u8) ^ 0x80));
        }
        for cells in &self.patterns {
            align16(&mut out);
            pointers.push((out.len() / 16) as u16);
            let mut packed = Vec::new();
            for row in 0..64 {
                for ch in 0..self.channels {
                    let cell = cells[row * self.channels + ch];
                    let mut what = ch as u8;
                    if cell.note.is_some() || cell.instrument != 0 {
                        what |= 0x20;
                    }
                    if cell.volume.is_some() {
                        what |= 0x40;
                    }
                    if cell.effect.is_some() {
                        what |= 0x80;
                    }
                    if what & 0xE0 == 0 {
                        continue;
                    }
                    packed.push(what);
                    if what & 0x20 != 0 {
                        packed.push(cell.note.map_or(255, |k| {
                            let k = k.saturating_sub(12);
                            ((k / 12) << 4) | (k % 12)
                        }));
                        packed.push(cell.instrument);
                    }
                    if let Some(volume) = cell.volume {
                        packed.push(volume);
                    }
                    if let Some((command, param)) = cell.effect {
                        packed.extend_from_slice(&[command, param]);
                    }
                }
                packed.push(0);
            }
            put_u16(&mut out, packed.len() as u16 + 2);
            out.extend_from_slice(&packed);
        }
        for (i, pointer) in pointers.iter().enumerate() {
            let at = pointer_table + i * 2;
            out[at..at + 2].copy_from_slice(&pointer.to_le_bytes());
        }
        out
    }
}

// =============================================================================
// FastTracker II
// =============================================================================

struct XmInstrument {
    name: String,
    data: Vec<i16>,
    loop_range: Option<(usize, usize)>,
    volume_envelope: Option<(Vec<(u16, u16)>, Option<u8>)>,
    fadeout: u16,
}

/// Builder for XM modules with one 16-bit sample per instrument
pub struct XmBuilder {
    channels: usize,
    linear: bool,
    speed: u16,
    tempo: u16,
    instruments: Vec<XmInstrument>,
    orders: Vec<u8>,
    patterns: Vec<(u16, Vec<[u8; 5]>)>,
}

impl XmBuilder {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            linear: true,
            speed: 6,
            tempo: 125,
            instruments: Vec::new(),
            orders: vec![0],
            patterns: Vec::new(),
        }
    }

    pub fn linear(mut self, linear: bool) -> Self {
        self.linear = linear;
        self
    }

    pub fn speed(mut self, speed: u16) -> Self {
        self.speed = speed;
        self
    }

    pub fn tempo(mut self, tempo: u16) -> Self {
        self.tempo = tempo;
        self
    }

    pub fn instrument(mut self, name: &str, data: Vec<i16>, loop_range: Option<(usize, usize)>) -> Self {
        self.instruments.push(XmInstrument {
            name: name.to_string(),
            data,
            loop_range,
            volume_envelope: None,
            fadeout: 0,
        });
        self
    }

    /// Volume envelope (tick, 0-64) with an optional sustain point
    /// for the most recently added instrument
    pub fn volume_envelope(mut self, points: &[(u16, u16)], sustain: Option<u8>) -> Self {
        if let Some(last) = self.instruments.last_mut() {
            last.volume_envelope = Some((points.to_vec(), sustain));
        }
        self
    }

    pub fn fadeout(mut self, fadeout: u16) -> Self {
        if let Some(last) = self.instruments.last_mut() {
            last.fadeout = fadeout;
        }
        self
    }

    pub fn patterns(mut self, count: usize, rows: u16) -> Self {
        for _ in 0..count {
            self.patterns
                .push((rows, vec![[0; 5]; rows as usize * self.channels]));
        }
        self
    }

    pub fn orders(mut self, orders: &[u8]) -> Self {
        self.orders = orders.to_vec();
        self
    }

    fn cell(&mut self, pattern: usize, row: usize, channel: usize) -> &mut [u8; 5] {
        let channels = self.channels;
        &mut self.patterns[pattern].1[row * channels + channel]
    }

    pub fn note(mut self, pattern: usize, row: usize, channel: usize, key: u8, instrument: u8) -> Self {
        let cell = self.cell(pattern, row, channel);
        cell[0] = key.saturating_sub(11).clamp(1, 96);
        cell[1] = instrument;
        self
    }

    pub fn note_off(mut self, pattern: usize, row: usize, channel: usize) -> Self {
        self.cell(pattern, row, channel)[0] = 97;
        self
    }

    /// Raw volume column byte (0x10-0x50 sets volume)
    pub fn volume(mut self, pattern: usize, row: usize, channel: usize, volume: u8) -> Self {
        self.cell(pattern, row, channel)[2] = volume;
        self
    }

    pub fn effect(mut self, pattern: usize, row: usize, channel: usize, effect: u8, param: u8) -> Self {
        let cell = self.cell(pattern, row, channel);
        cell[3] = effect;
        cell[4] = param;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"Extended Module: ");
        put_text(&mut out, "xm test", 20);
        out.push(0x1A);
        put_text(&mut out, "modplay-song", 20);
        put_u16(&mut out, 0x0104);
        put_u32(&mut out, 276);
        put_u16(&mut out, self.orders.len() as u16);
        put_u16(&mut out, 0);
        put_u16(&mut out, self.channels as u16);
        put_u16(&mut out, self.patterns.len() as u16);
        put_u16(&mut out, self.instruments.len() as u16);
        put_u16(&mut out, self.linear as u16);
        put_u16(&mut out, self.speed);
        put_u16(&mut out, self.tempo);
        let mut table = self.orders.clone();
        table.resize(256, 0);
        out.extend_from_slice(&table);

        for (rows, cells) in &self.patterns {
            put_u32(&mut out, 9);
            out.push(0);
            put_u16(&mut out, *rows);
            // Every cell uses the packed form with all fields present
            put_u16(&mut out, (cells.len() * 6) as u16);
            for cell in cells {
                out.push(0x9F);
                out.extend_from_slice(cell);
            }
        }

        for instrument in &self.instruments {
            let start = out.len();
            put_u32(&mut out, 263);
            put_text(&mut out, &instrument.name, 22);
            out.push(0);
            put_u16(&mut out, 1);
            put_u32(&mut out, 40);
            out.resize(out.len() + 96, 0);
            let (points, sustain) = instrument
                .volume_envelope
                .clone()
                .unwrap_or((Vec::new(), None));
            for i in 0..12 {
                let (x, y) = points.get(i).copied().unwrap_or((0, 0));
                put_u16(&mut out, x);
                put_u16(&mut out, y);
            }
            out.resize(out.len() + 48, 0);
            out.extend_from_slice(&[points.len() as u8, 0, sustain.unwrap_or(0), 0, 0, 0, 0, 0]);
            let env_type = match (points.is_empty(), sustain.is_some()) {
                (true, _) => 0,
                (false, false) => 1,
                (false, true) => 3,
            };
            out.extend_from_slice(&[env_type, 0, 0, 0, 0, 0]);
            put_u16(&mut out, instrument.fadeout);
            out.resize(start + 263, 0);

            let frames = instrument.data.len();
            put_u32(&mut out, (frames * 2) as u32);
            let (loop_start, loop_end) = instrument.loop_range.unwrap_or((0, 0));
            put_u32(&mut out, (loop_start * 2) as u32);
            put_u32(&mut out, ((loop_end - loop_start) * 2) as u32);
            out.push(64);
            out.push(0);
            out.push(0x10 | instrument.loop_range.is_some() as u8);
            out.push(128);
            out.push(0);
            out.push(0);
            put_text(&mut out, &instrument.name, 22);

            let mut previous = 0i16;
            for &s in &instrument.data {
                put_u16(&mut out, s.wrapping_sub(previous) as u16);
                previous = s;
            }
        }
        out
    }
}

// =============================================================================
// Impulse Tracker
// =============================================================================

#[derive(Clone, Copy, Default)]
struct ItCell {
    note: Option<u8>,
    instrument: Option<u8>,
    volume: Option<u8>,
    effect: Option<(u8, u8)>,
}

struct ItInstrument {
    sample: u8,
    new_note_action: u8,
    fadeout: u16,
    volume_envelope: Option<Vec<(u16, i8)>>,
}

/// Builder for IT modules with uncompressed 16-bit samples
pub struct ItBuilder {
    speed: u8,
    tempo: u8,
    samples: Vec<(Vec<i16>, Option<(u32, u32)>, Option<(u32, u32)>)>,
    instruments: Vec<ItInstrument>,
    orders: Vec<u8>,
    patterns: Vec<(u16, Vec<ItCell>)>,
    channels: usize,
}

impl ItBuilder {
    pub fn new(channels: usize) -> Self {
        Self {
            speed: 6,
            tempo: 125,
            samples: Vec::new(),
            instruments: Vec::new(),
            orders: vec![0],
            patterns: Vec::new(),
            channels,
        }
    }

    pub fn speed(mut self, speed: u8) -> Self {
        self.speed = speed;
        self
    }

    pub fn tempo(mut self, tempo: u8) -> Self {
        self.tempo = tempo;
        self
    }

    /// Add a sample with optional loop and sustain loop (frames)
    pub fn sample(
        mut self,
        data: Vec<i16>,
        loop_range: Option<(u32, u32)>,
        sustain: Option<(u32, u32)>,
    ) -> Self {
        self.samples.push((data, loop_range, sustain));
        self
    }

    /// Add an instrument; any instrument switches the module to instrument mode
    pub fn instrument(
        mut self,
        sample: u8,
        new_note_action: u8,
        fadeout: u16,
        volume_envelope: Option<Vec<(u16, i8)>>,
    ) -> Self {
        self.instruments.push(ItInstrument {
            sample,
            new_note_action,
            fadeout,
            volume_envelope,
        });
        self
    }

    pub fn patterns(mut self, count: usize, rows: u16) -> Self {
        for _ in 0..count {
            self.patterns
                .push((rows, vec![ItCell::default(); rows as usize * self.channels]));
        }
        self
    }

    pub fn orders(mut self, orders: &[u8]) -> Self {
        self.orders = orders.to_vec();
        self
    }

    fn cell(&mut self, pattern: usize, row: usize, channel: usize) -> &mut ItCell {
        let channels = self.channels;
        &mut self.patterns[pattern].1[row * channels + channel]
    }

    pub fn note(mut self, pattern: usize, row: usize, channel: usize, key: u8, instrument: u8) -> Self {
        let cell = self.cell(pattern, row, channel);
        cell.note = Some(key);
        cell.instrument = Some(instrument);
        self
    }

    /// Raw note byte: 255 off, 254 cut, others above 119 fade
    pub fn note_action(mut self, pattern: usize, row: usize, channel: usize, value: u8) -> Self {
        self.cell(pattern, row, channel).note = Some(value);
        self
    }

    /// Raw volume column byte
    pub fn volume(mut self, pattern: usize, row: usize, channel: usize, volume: u8) -> Self {
        self.cell(pattern, row, channel).volume = Some(volume);
        self
    }

    /// Effect letter as a number (A = 1) and parameter
    pub fn effect(mut self, pattern: usize, row: usize, channel: usize, command: u8, param: u8) -> Self {
        self.cell(pattern, row, channel).effect = Some((command, param));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"IMPM");
        put_text(&mut out, "it test", 26);
        put_u16(&mut out, 0x1004);
        let mut orders = self.orders.clone();
        orders.push(255);
        put_u16(&mut out, orders.len() as u16);
        put_u16(&mut out, self.instruments.len() as u16);
        put_u16(&mut out, self.samples.len() as u16);
        put_u16(&mut out, self.patterns.len() as u16);
        put_u16(&mut out, 0x0214);
        put_u16(&mut out, 0x0214);
        let flags = 0x01 | 0x08 | if self.instruments.is_empty() { 0 } else { 0x04 };
        put_u16(&mut out, flags);
        put_u16(&mut out, 0);
        out.extend_from_slice(&[128, 48, self.speed, self.tempo, 128, 0]);
        put_u16(&mut out, 0);
        put_u32(&mut out, 0);
        put_u32(&mut out, 0);
        out.extend_from_slice(&[32; 64]);
        out.extend_from_slice(&[64; 64]);
        out.extend_from_slice(&orders);

        let table = out.len();
        let entries = self.instruments.len() + self.samples.len() + self.patterns.len();
        out.resize(out.len() + entries * 4, 0);
        let mut offsets = Vec::with_capacity(entries);

        for instrument in &self.instruments {
            offsets.push(out.len() as u32);
            out.extend_from_slice(b"IMPI");
            out.resize(out.len() + 13, 0);
            out.extend_from_slice(&[instrument.new_note_action, 0, 0]);
            put_u16(&mut out, instrument.fadeout);
            out.extend_from_slice(&[0, 60, 128, 0x80 | 32, 0, 0]);
            put_u16(&mut out, 0x0214);
            out.extend_from_slice(&[1, 0]);
            put_text(&mut out, "instrument", 26);
            out.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
            for key in 0..120u8 {
                out.extend_from_slice(&[key, instrument.sample]);
            }
            match &instrument.volume_envelope {
                Some(points) => {
                    out.extend_from_slice(&[0x01, points.len() as u8, 0, 0, 0, 0]);
                    for i in 0..25 {
                        let (tick, value) = points.get(i).copied().unwrap_or((0, 0));
                        out.push(value as u8);
                        put_u16(&mut out, tick);
                    }
                    out.push(0);
                }
                None => out.resize(out.len() + 82, 0),
            }
            out.resize(out.len() + 82 * 2 + 4, 0);
        }

        let mut sample_headers = Vec::new();
        for (data, loop_range, sustain) in &self.samples {
            offsets.push(out.len() as u32);
            sample_headers.push(out.len());
            out.extend_from_slice(b"IMPS");
            out.resize(out.len() + 13, 0);
            let mut flags = 0x01 | 0x02;
            if loop_range.is_some() {
                flags |= 0x10;
            }
            if sustain.is_some() {
                flags |= 0x20;
            }
            out.extend_from_slice(&[64, flags, 64]);
            put_text(&mut out, "sample", 26);
            out.extend_from_slice(&[0x01, 0]);
            put_u32(&mut out, data.len() as u32);
            let (ls, le) = loop_range.unwrap_or((0, 0));
            put_u32(&mut out, ls);
            put_u32(&mut out, le);
            put_u32(&mut out, 8363);
            let (ss, se) = sustain.unwrap_or((0, 0));
            put_u32(&mut out, ss);
            put_u32(&mut out, se);
            put_u32(&mut out, 0);
            out.extend_from_slice(&[0, 0, 0, 0]);
        }
        for (index, (data, _, _)) in self.samples.iter().enumerate() {
            let pointer = out.len() as u32;
            let at = sample_headers[index] + 0x48;
            out[at..at + 4].copy_from_slice(&pointer.to_le_bytes());
            for &s in data {
                put_u16(&mut out, s as u16);
            }
        }

        for (rows, cells) in &self.patterns {
            offsets.push(out.len() as u32);
            let mut packed = Vec::new();
            for row in 0..*rows as usize {
                for ch in 0..self.channels {
                    let cell = cells[row * self.channels + ch];
                    let mut mask = 0u8;
                    mask |= cell.note.is_some() as u8;
                    mask |= (cell.instrument.is_some() as u8) << 1;
                    mask |= (cell.volume.is_some() as u8) << 2;
                    mask |= (cell.effect.is_some() as u8) << 3;
                    if mask == 0 {
                        continue;
                    }
                    packed.extend_from_slice(&[(ch as u8 + 1) | 0x80, mask]);
                    packed.extend(cell.note);
                    packed.extend(cell.instrument);
                    packed.extend(cell.volume);
                    if let Some((command, param)) = cell.effect {
                        packed.extend_from_slice(&[command, param]);
                    }
                }
                packed.push(0);
            }
            put_u16(&mut out, packed.len() as u16);
            put_u16(&mut out, *rows);
            put_u32(&mut out, 0);
            out.extend_from_slice(&packed);
        }

        for (i, offset) in offsets.iter().enumerate() {
            let at = table + i * 4;
            out[at..at + 4].copy_from_slice(&offset.to_le_bytes());
        }
        out
    }
}
