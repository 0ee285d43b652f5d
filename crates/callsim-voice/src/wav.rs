//! PCM -> WAV for upload to the transcription endpoint.

use crate::error::VoiceResult;
use std::io::Write;

/// Encode f32 samples (-1.0..=1.0, interleaved) as 16-bit PCM WAV.
pub fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> VoiceResult<Vec<u8>> {
    let data_len = (samples.len() * 2) as u32; // 16-bit = 2 bytes per sample
    let block_align = channels * 2;
    let byte_rate = sample_rate * u32::from(block_align);

    let mut buf = Vec::with_capacity(44 + data_len as usize);
    // RIFF header
    buf.write_all(b"RIFF")?;
    buf.write_all(&(36 + data_len).to_le_bytes())?;
    buf.write_all(b"WAVE")?;
    // fmt subchunk
    buf.write_all(b"fmt ")?;
    buf.write_all(&16u32.to_le_bytes())?;
    buf.write_all(&1u16.to_le_bytes())?; // PCM
    buf.write_all(&channels.to_le_bytes())?;
    buf.write_all(&sample_rate.to_le_bytes())?;
    buf.write_all(&byte_rate.to_le_bytes())?;
    buf.write_all(&block_align.to_le_bytes())?;
    buf.write_all(&16u16.to_le_bytes())?;
    // data subchunk
    buf.write_all(b"data")?;
    buf.write_all(&data_len.to_le_bytes())?;
    for &s in samples {
        let i = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        buf.write_all(&i.to_le_bytes())?;
    }
    Ok(buf)
}

/// Seconds of audio in `samples`.
pub fn duration_secs(samples: usize, sample_rate: u32, channels: u16) -> f32 {
    if sample_rate == 0 || channels == 0 {
        return 0.0;
    }
    samples as f32 / (sample_rate as f32 * channels as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_describes_mono_16k() {
        let wav = encode_wav(&[0.0; 160], 16000, 1).unwrap();
        assert_eq!(wav.len(), 44 + 320);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(u32::from_le_bytes([wav[4], wav[5], wav[6], wav[7]]), 36 + 320);
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), 1);
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 16000);
        assert_eq!(u32::from_le_bytes([wav[28], wav[29], wav[30], wav[31]]), 32000);
        assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 320);
    }

    #[test]
    fn samples_are_clamped() {
        let wav = encode_wav(&[2.0, -2.0], 8000, 1).unwrap();
        assert_eq!(i16::from_le_bytes([wav[44], wav[45]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([wav[46], wav[47]]), -i16::MAX);
    }

    #[test]
    fn stereo_block_align() {
        let wav = encode_wav(&[0.1, 0.1], 44100, 2).unwrap();
        assert_eq!(u16::from_le_bytes([wav[32], wav[33]]), 4);
        assert!((duration_secs(88200, 44100, 2) - 1.0).abs() < f32::EPSILON);
    }
}
