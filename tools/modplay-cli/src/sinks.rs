//! Host-side file access and the WAV sink

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use modplay_input::{OpenError, Playback, READ_ALL_LIMIT, SampleFormat, VfsFile};
use tracing::{debug, error};

/// Virtual file over a local path, capped at [`READ_ALL_LIMIT`]
pub struct LocalFile {
    path: PathBuf,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl VfsFile for LocalFile {
    fn read_all(&mut self) -> Result<Vec<u8>, OpenError> {
        let len = std::fs::metadata(&self.path)?.len();
        if len > READ_ALL_LIMIT as u64 {
            return Err(OpenError::ReadTooLarge {
                limit: READ_ALL_LIMIT,
            });
        }
        Ok(std::fs::read(&self.path)?)
    }
}

/// Interleaved native-endian i16 from a byte frame
pub fn pcm_samples(data: &[u8]) -> Vec<i16> {
    bytemuck::pod_collect_to_vec(data)
}

/// Writes playback into a 16-bit WAV file
pub struct WavSink {
    path: PathBuf,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    channels: u32,
    rate: u32,
    /// Sample frames written so far
    frames: u64,
    max_seconds: Option<u32>,
    max_frames: Option<u64>,
    seek: Option<u32>,
    error: Option<anyhow::Error>,
}

impl WavSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            channels: 0,
            rate: 0,
            frames: 0,
            max_seconds: None,
            max_frames: None,
            seek: None,
            error: None,
        }
    }

    /// Stop after this many seconds of audio at the rate playback opens with
    pub fn with_max_seconds(mut self, seconds: Option<u32>) -> Self {
        self.max_seconds = seconds;
        self
    }

    /// Start playback at `ms`
    pub fn with_seek(mut self, ms: Option<u32>) -> Self {
        self.seek = ms;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sample rate of the open output, 0 before playback opens it
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Close the file, reporting any error met while writing
    pub fn finish(mut self) -> Result<u64> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        let Some(writer) = self.writer.take() else {
            bail!("Playback never opened the audio output");
        };
        writer
            .finalize()
            .with_context(|| format!("Failed to finalize {}", self.path.display()))?;
        Ok(self.frames)
    }

    fn fail(&mut self, e: anyhow::Error) {
        error!(error = %e, "WAV output failed");
        self.error.get_or_insert(e);
    }
}

impl Playback for WavSink {
    fn open_audio(&mut self, format: SampleFormat, rate: u32, channels: u32) {
        let spec = hound::WavSpec {
            channels: channels as u16,
            sample_rate: rate,
            bits_per_sample: (format.bytes_per_sample() * 8) as u16,
            sample_format: hound::SampleFormat::Int,
        };
        match hound::WavWriter::create(&self.path, spec) {
            Ok(writer) => {
                debug!(path = %self.path.display(), rate, channels, "WAV output opened");
                self.writer = Some(writer);
                self.channels = channels;
                self.rate = rate;
                self.max_frames = self.max_seconds.map(|s| s as u64 * rate as u64);
            }
            Err(e) => self.fail(
                anyhow::Error::new(e).context(format!("Failed to create {}", self.path.display())),
            ),
        }
    }

    fn write_audio(&mut self, data: &[u8]) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let samples = pcm_samples(data);
        if let Err(e) = samples.iter().try_for_each(|s| writer.write_sample(*s)) {
            self.fail(anyhow::Error::new(e).context("Failed to write sample"));
            return;
        }
        self.frames += samples.len() as u64 / self.channels.max(1) as u64;
    }

    fn check_stop(&mut self) -> bool {
        self.error.is_some() || self.max_frames.is_some_and(|max| self.frames >= max)
    }

    fn check_seek(&mut self) -> Option<u32> {
        self.seek.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_file_reads_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, [1u8, 2, 3, 4]).unwrap();
        assert_eq!(LocalFile::new(&path).read_all().unwrap(), vec![1, 2, 3, 4]);
        assert!(matches!(
            LocalFile::new(dir.path().join("missing")).read_all(),
            Err(OpenError::Io(_))
        ));
    }

    #[test]
    fn test_pcm_samples_native_endian() {
        let bytes: Vec<u8> = [1i16, -2, 300]
            .iter()
            .flat_map(|s| s.to_ne_bytes())
            .collect();
        assert_eq!(pcm_samples(&bytes), vec![1, -2, 300]);
        // Unaligned input is copied, not reinterpreted in place
        assert_eq!(pcm_samples(&[0u8, 1, 0][1..]), vec![i16::from_ne_bytes([1, 0])]);
    }

    #[test]
    fn test_wav_sink_writes_and_limits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let mut sink = WavSink::new(&path).with_max_seconds(Some(1));
        sink.open_audio(SampleFormat::S16NE, 8000, 2);
        assert_eq!(sink.rate(), 8000);
        assert!(!sink.check_stop());
        // 5000 stereo frames
        let frame: Vec<u8> = [100i16, -100]
            .repeat(5000)
            .iter()
            .flat_map(|s| s.to_ne_bytes())
            .collect();
        sink.write_audio(&frame);
        assert!(!sink.check_stop());
        sink.write_audio(&frame);
        assert!(sink.check_stop());
        assert_eq!(sink.finish().unwrap(), 10_000);

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.len(), 20_000);
    }

    #[test]
    fn test_seek_is_reported_once() {
        let mut sink = WavSink::new("unused.wav").with_seek(Some(5000));
        assert_eq!(sink.check_seek(), Some(5000));
        assert_eq!(sink.check_seek(), None);
    }

    #[test]
    fn test_finish_without_open_fails() {
        assert!(WavSink::new("never.wav").finish().is_err());
    }
}
