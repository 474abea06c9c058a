use std::{
    io::Cursor,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::errors::{Result, TtsError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
}

pub fn detect_format(bytes: &[u8]) -> AudioFormat {
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        AudioFormat::Wav
    } else {
        AudioFormat::Mp3
    }
}

/// Length of a leading ID3v2 tag, zero when absent.
fn id3v2_len(bytes: &[u8]) -> usize {
    if bytes.len() < 10 || &bytes[0..3] != b"ID3" {
        return 0;
    }
    let size = bytes[6..10]
        .iter()
        .fold(0usize, |acc, b| (acc << 7) | (*b as usize & 0x7f));
    let footer = if bytes[5] & 0x10 != 0 { 10 } else { 0 };
    (10 + size + footer).min(bytes.len())
}

fn id3v1_len(bytes: &[u8]) -> usize {
    if bytes.len() >= 128 && &bytes[bytes.len() - 128..bytes.len() - 125] == b"TAG" {
        128
    } else {
        0
    }
}

/// Joins MP3 segments frame-wise; only the first keeps its leading tag.
fn concat_mp3(segments: &[Vec<u8>]) -> Vec<u8> {
    let last = segments.len().saturating_sub(1);
    let mut merged = Vec::with_capacity(segments.iter().map(Vec::len).sum());
    for (i, segment) in segments.iter().enumerate() {
        let start = if i == 0 { 0 } else { id3v2_len(segment) };
        let end = if i == last {
            segment.len()
        } else {
            segment.len() - id3v1_len(segment)
        };
        if start < end {
            merged.extend_from_slice(&segment[start..end]);
        }
    }
    merged
}

fn concat_wav(segments: &[Vec<u8>]) -> Result<Vec<u8>> {
    let mut readers = segments
        .iter()
        .map(|segment| hound::WavReader::new(Cursor::new(segment.as_slice())))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let spec = match readers.first() {
        Some(reader) => reader.spec(),
        None => return Err(TtsError::audio("no audio segments to merge")),
    };
    if readers.iter().any(|reader| reader.spec() != spec) {
        return Err(TtsError::audio("audio segments have different WAV formats"));
    }

    let mut merged = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut merged), spec)?;
        for reader in readers.iter_mut() {
            match (spec.sample_format, spec.bits_per_sample) {
                (hound::SampleFormat::Float, _) => {
                    for sample in reader.samples::<f32>() {
                        writer.write_sample(sample?)?;
                    }
                }
                (hound::SampleFormat::Int, bits) if bits <= 16 => {
                    for sample in reader.samples::<i16>() {
                        writer.write_sample(sample?)?;
                    }
                }
                (hound::SampleFormat::Int, _) => {
                    for sample in reader.samples::<i32>() {
                        writer.write_sample(sample?)?;
                    }
                }
            }
        }
        writer.finalize()?;
    }
    Ok(merged)
}

/// Merges in-memory segments, in the order given.
pub fn merge_bytes(segments: &[Vec<u8>]) -> Result<Vec<u8>> {
    let Some(first) = segments.first() else {
        return Err(TtsError::audio("no audio segments to merge"));
    };
    let format = detect_format(first);
    if segments.iter().any(|segment| detect_format(segment) != format) {
        return Err(TtsError::audio(
            "audio segments were produced in different formats",
        ));
    }

    match format {
        AudioFormat::Mp3 => Ok(concat_mp3(segments)),
        AudioFormat::Wav => concat_wav(segments),
    }
}

/// Writes the concatenation of `segments` to `output`.
pub async fn merge_files(segments: &[PathBuf], output: &Path) -> Result<u64> {
    let mut data = Vec::with_capacity(segments.len());
    for segment in segments {
        data.push(tokio::fs::read(segment).await?);
    }

    let merged = tokio::task::spawn_blocking(move || merge_bytes(&data))
        .await
        .map_err(|e| TtsError::audio(format!("merge worker failed: {}", e)))??;

    tokio::fs::write(output, &merged).await?;
    debug!(segments = segments.len(), bytes = merged.len(), output = %output.display(), "Merged audio");
    Ok(merged.len() as u64)
}
