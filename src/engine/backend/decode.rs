//! Source reference parsing and WAV decoding shared by the backends.

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::AdapterError;

/// How a source URI should be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    File(PathBuf),
    Remote(String),
    Blob(String),
    Unknown(String),
}

impl SourceRef {
    pub fn parse(uri: &str) -> Self {
        let trimmed = uri.trim();
        if let Some(path) = trimmed.strip_prefix("file://") {
            return SourceRef::File(PathBuf::from(path));
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return SourceRef::Remote(trimmed.to_string());
        }
        if trimmed.starts_with("blob:") {
            return SourceRef::Blob(trimmed.to_string());
        }
        if trimmed.is_empty() || trimmed.contains("://") {
            return SourceRef::Unknown(trimmed.to_string());
        }
        SourceRef::File(PathBuf::from(trimmed))
    }
}

/// Interleaved 32-bit float PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl PcmBuffer {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .fold(0.0_f32, |acc, sample| acc.max(sample.abs()))
    }

    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|s| (*s as f64) * (*s as f64)).sum();
        (sum / self.samples.len() as f64).sqrt() as f32
    }
}

fn wav_duration(spec: &WavSpec, frames: u32) -> f64 {
    if spec.sample_rate == 0 {
        return 0.0;
    }
    frames as f64 / spec.sample_rate as f64
}

/// Read only the WAV header of a file and return its duration in seconds.
pub fn probe_wav_file(path: &Path) -> Result<f64, AdapterError> {
    let file = File::open(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => AdapterError::NotFound {
            uri: path.display().to_string(),
        },
        _ => AdapterError::Io {
            reason: err.to_string(),
        },
    })?;
    let reader = WavReader::new(BufReader::new(file))?;
    Ok(wav_duration(&reader.spec(), reader.duration()))
}

/// Read only the WAV header of an in-memory source.
pub fn probe_wav_bytes(bytes: &[u8]) -> Result<f64, AdapterError> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    Ok(wav_duration(&reader.spec(), reader.duration()))
}

/// Fully decode a WAV stream into float PCM.
pub fn decode_wav<R: Read>(reader: R) -> Result<PcmBuffer, AdapterError> {
    let mut reader = WavReader::new(reader)?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 / scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(PcmBuffer {
        samples,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
    })
}

pub fn decode_wav_file(path: &Path) -> Result<PcmBuffer, AdapterError> {
    let file = File::open(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => AdapterError::NotFound {
            uri: path.display().to_string(),
        },
        _ => AdapterError::Io {
            reason: err.to_string(),
        },
    })?;
    decode_wav(BufReader::new(file))
}

pub fn decode_wav_bytes(bytes: &[u8]) -> Result<PcmBuffer, AdapterError> {
    decode_wav(Cursor::new(bytes))
}

/// Encode float PCM as a 32-bit float WAV.
pub fn encode_wav(buffer: &PcmBuffer) -> Result<Vec<u8>, AdapterError> {
    let spec = WavSpec {
        channels: buffer.channels.max(1),
        sample_rate: buffer.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for sample in &buffer.samples {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(seconds: f64, sample_rate: u32) -> PcmBuffer {
        let frames = (seconds * sample_rate as f64) as usize;
        let samples = (0..frames)
            .map(|i| (i as f32 * 0.05).sin() * 0.5)
            .collect();
        PcmBuffer {
            samples,
            channels: 1,
            sample_rate,
        }
    }

    #[test]
    fn test_parse_source_refs() {
        assert_eq!(
            SourceRef::parse("file:///sdcard/a.wav"),
            SourceRef::File(PathBuf::from("/sdcard/a.wav"))
        );
        assert_eq!(
            SourceRef::parse("/tmp/a.wav"),
            SourceRef::File(PathBuf::from("/tmp/a.wav"))
        );
        assert!(matches!(
            SourceRef::parse("https://cdn.example.com/a.wav"),
            SourceRef::Remote(_)
        ));
        assert!(matches!(SourceRef::parse("blob:7"), SourceRef::Blob(_)));
        assert!(matches!(
            SourceRef::parse("content://media/1"),
            SourceRef::Unknown(_)
        ));
        assert!(matches!(SourceRef::parse(""), SourceRef::Unknown(_)));
    }

    #[test]
    fn test_encode_then_probe_reports_duration() {
        let buffer = tone(1.5, 8_000);
        let bytes = encode_wav(&buffer).unwrap();
        let duration = probe_wav_bytes(&bytes).unwrap();
        assert!((duration - 1.5).abs() < 1e-6);

        let decoded = decode_wav_bytes(&bytes).unwrap();
        assert_eq!(decoded.frames(), buffer.frames());
        assert_eq!(decoded.sample_rate, 8_000);
    }

    #[test]
    fn test_probe_missing_file_is_not_found() {
        let err = probe_wav_file(Path::new("/nonexistent/track.wav")).unwrap_err();
        assert!(matches!(err, AdapterError::NotFound { .. }));
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let err = decode_wav_bytes(b"definitely not a riff header").unwrap_err();
        assert!(matches!(
            err,
            AdapterError::Decode { .. } | AdapterError::Io { .. }
        ));
    }

    #[test]
    fn test_levels() {
        let buffer = PcmBuffer {
            samples: vec![0.5, -1.0, 0.0, 0.5],
            channels: 2,
            sample_rate: 2,
        };
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.duration_secs(), 1.0);
        assert_eq!(buffer.peak(), 1.0);
        assert!((buffer.rms() - (1.5_f32 / 4.0).sqrt()).abs() < 1e-6);
    }
}
