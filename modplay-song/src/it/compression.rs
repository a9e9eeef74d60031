//! IT214/IT215 sample decompression
//!
//! Compressed samples are split into blocks (0x8000 frames for 8-bit,
//! 0x4000 for 16-bit). Each block starts with a u16 byte length, followed by
//! an LSB-first bit stream of variable-width deltas. IT215 integrates twice.

use crate::error::LoadError;

/// LSB-first bit reader over one compressed block
struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    fn read_bits(&mut self, count: u32) -> Result<u32, LoadError> {
        let mut value = 0u32;
        for i in 0..count {
            let byte = *self
                .data
                .get(self.byte_pos)
                .ok_or(LoadError::Decompression("bit stream ended inside a block"))?;
            value |= (((byte >> self.bit_pos) & 1) as u32) << i;
            self.bit_pos += 1;
            if self.bit_pos == 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
        }
        Ok(value)
    }
}

/// Split the stream into blocks, calling `decode` with each block's bytes
/// and the number of frames it holds
fn for_each_block(
    compressed: &[u8],
    frames: usize,
    block_frames: usize,
    mut decode: impl FnMut(&[u8], usize) -> Result<(), LoadError>,
) -> Result<(), LoadError> {
    let mut offset = 0usize;
    let mut remaining = frames;
    while remaining > 0 {
        let header = compressed
            .get(offset..offset + 2)
            .ok_or(LoadError::Decompression("missing block header"))?;
        let length = u16::from_le_bytes([header[0], header[1]]) as usize;
        let block = compressed
            .get(offset + 2..offset + 2 + length)
            .ok_or(LoadError::Decompression("block length past end of data"))?;
        let count = remaining.min(block_frames);
        decode(block, count)?;
        offset += 2 + length;
        remaining -= count;
    }
    Ok(())
}

/// Decompress 8-bit IT214 (`it215 == false`) or IT215 data
pub fn decompress_8bit(
    compressed: &[u8],
    frames: usize,
    it215: bool,
) -> Result<Vec<i8>, LoadError> {
    let mut output = Vec::with_capacity(frames);
    for_each_block(compressed, frames, 0x8000, |block, count| {
        let mut reader = BitReader::new(block);
        let mut width = 9u32;
        let (mut d1, mut d2) = (0i8, 0i8);
        let mut produced = 0;
        while produced < count {
            let value = reader.read_bits(width)?;
            if width < 7 {
                if value == 1 << (width - 1) {
                    let new_width = reader.read_bits(3)? + 1;
                    width = if new_width < width { new_width } else { new_width + 1 };
                    continue;
                }
            } else if width < 9 {
                let border = (0xFFu32 >> (9 - width)) - 4;
                if value > border && value <= border + 8 {
                    let new_width = value - border;
                    width = if new_width < width { new_width } else { new_width + 1 };
                    continue;
                }
            } else if width == 9 {
                if value & 0x100 != 0 {
                    width = (value + 1) & 0xFF;
                    continue;
                }
            } else {
                return Err(LoadError::Decompression("invalid 8-bit width"));
            }
            if width == 0 {
                return Err(LoadError::Decompression("invalid 8-bit width"));
            }

            let delta = if width < 8 {
                let shift = 8 - width;
                ((value << shift) as u8 as i8) >> shift
            } else {
                value as u8 as i8
            };
            d1 = d1.wrapping_add(delta);
            d2 = d2.wrapping_add(d1);
            output.push(if it215 { d2 } else { d1 });
            produced += 1;
        }
        Ok(())
    })?;
    Ok(output)
}

/// Decompress 16-bit IT214 (`it215 == false`) or IT215 data
pub fn decompress_16bit(
    compressed: &[u8],
    frames: usize,
    it215: bool,
) -> Result<Vec<i16>, LoadError> {
    let mut output = Vec::with_capacity(frames);
    for_each_block(compressed, frames, 0x4000, |block, count| {
        let mut reader = BitReader::new(block);
        let mut width = 17u32;
        let (mut d1, mut d2) = (0i16, 0i16);
        let mut produced = 0;
        while produced < count {
            let value = reader.read_bits(width)?;
            if width < 7 {
                if value == 1 << (width - 1) {
                    let new_width = reader.read_bits(4)? + 1;
                    width = if new_width < width { new_width } else { new_width + 1 };
                    continue;
                }
            } else if width < 17 {
                let border = (0xFFFFu32 >> (17 - width)) - 8;
                if value > border && value <= border + 16 {
                    let new_width = value - border;
                    width = if new_width < width { new_width } else { new_width + 1 };
                    continue;
                }
            } else if width == 17 {
                if value & 0x10000 != 0 {
                    width = (value + 1) & 0xFF;
                    continue;
                }
            } else {
                return Err(LoadError::Decompression("invalid 16-bit width"));
            }
            if width == 0 {
                return Err(LoadError::Decompression("invalid 16-bit width"));
            }

            let delta = if width < 16 {
                let shift = 16 - width;
                ((value << shift) as u16 as i16) >> shift
            } else {
                value as u16 as i16
            };
            d1 = d1.wrapping_add(delta);
            d2 = d2.wrapping_add(d1);
            output.push(if it215 { d2 } else { d1 });
            produced += 1;
        }
        Ok(())
    })?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// LSB-first bit packer for building test streams
    #[derive(Default)]
    struct BitWriter {
        bytes: Vec<u8>,
        bit: u32,
    }

    impl BitWriter {
        fn write(&mut self, value: u32, count: u32) {
            for i in 0..count {
                if self.bit == 0 {
                    self.bytes.push(0);
                }
                let last = self.bytes.len() - 1;
                self.bytes[last] |= (((value >> i) & 1) as u8) << self.bit;
                self.bit = (self.bit + 1) % 8;
            }
        }

        fn into_block(self) -> Vec<u8> {
            let mut block = (self.bytes.len() as u16).to_le_bytes().to_vec();
            block.extend(self.bytes);
            block
        }
    }

    #[test]
    fn test_8bit_deltas_at_initial_width() {
        let mut w = BitWriter::default();
        // 0xFE has bit 8 clear, so it is a plain -2 delta
        for delta in [1u32, 1, 1, 0xFE] {
            w.write(delta, 9);
        }
        let out = decompress_8bit(&w.into_block(), 4, false).unwrap();
        assert_eq!(out, vec![1, 2, 3, 1]);
    }

    #[test]
    fn test_it215_integrates_twice() {
        let mut w = BitWriter::default();
        for delta in [1u32, 1, 1] {
            w.write(delta, 9);
        }
        let out = decompress_8bit(&w.into_block(), 3, true).unwrap();
        assert_eq!(out, vec![1, 3, 6]);
    }

    #[test]
    fn test_8bit_width_change() {
        let mut w = BitWriter::default();
        // Width 9 with bit 8 set: new width = (value + 1) & 0xFF
        w.write(0x100 | 3, 9);
        // Width 4 deltas, sign-extended from 4 bits
        w.write(0x3, 4);
        w.write(0xF, 4);
        // Width 4 marker (1 << 3), then 3 bits: 2 + 1 = width 3
        w.write(0x8, 4);
        w.write(2, 3);
        w.write(0x1, 3);
        let out = decompress_8bit(&w.into_block(), 3, false).unwrap();
        assert_eq!(out, vec![3, 2, 3]);
    }

    #[test]
    fn test_16bit_deltas() {
        let mut w = BitWriter::default();
        w.write(1000, 17);
        w.write((-500i32 as u32) & 0xFFFF, 17);
        let out = decompress_16bit(&w.into_block(), 2, false).unwrap();
        assert_eq!(out, vec![1000, 500]);
    }

    #[test]
    fn test_blocks_reset_state() {
        // Second block starts again from zero with width 9
        let mut first = BitWriter::default();
        for _ in 0..0x8000 {
            first.write(0, 9);
        }
        let mut second = BitWriter::default();
        second.write(5, 9);
        let mut data = first.into_block();
        data.extend(second.into_block());
        let out = decompress_8bit(&data, 0x8001, false).unwrap();
        assert_eq!(out.len(), 0x8001);
        assert_eq!(out[0x8000], 5);
    }

    #[test]
    fn test_truncated_stream_is_an_error() {
        assert!(decompress_8bit(&[], 4, false).is_err());
        assert!(decompress_8bit(&[10, 0, 1], 4, false).is_err());
    }
}
