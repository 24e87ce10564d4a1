//! Fixed-layout RIFF/WAVE header structures.
//!
//! Each structure is encoded and decoded as a single unit, field by field.
//! Multi-byte integers are little-endian on the wire whatever the host order.

use crate::ContainerError;

pub const RIFF_ID: [u8; 4] = *b"RIFF";
pub const WAVE_FORMAT: [u8; 4] = *b"WAVE";
pub const FMT_ID: [u8; 4] = *b"fmt ";
pub const DATA_ID: [u8; 4] = *b"data";

/// `audio_format` value for uncompressed linear PCM.
pub const PCM_FORMAT: u16 = 1;

/// Bytes before the first sample of a file produced by [`encode_wave_header`].
pub const HEADER_LEN: u64 =
    (RiffHeader::SIZE + SubChunkHeader::SIZE + WaveFormat::SIZE + SubChunkHeader::SIZE) as u64;

/// Printable form of a chunk id for diagnostics.
pub fn fourcc(id: [u8; 4]) -> String {
    id.escape_ascii().to_string()
}

fn ensure_len(bytes: &[u8], needed: usize, structure: &'static str) -> Result<(), ContainerError> {
    if bytes.len() < needed {
        return Err(ContainerError::Truncated {
            structure,
            needed,
            available: bytes.len(),
        });
    }
    Ok(())
}

fn id_at(bytes: &[u8], at: usize) -> [u8; 4] {
    [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]
}

fn u16_at(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(id_at(bytes, at))
}

/// The outer `RIFF` chunk header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RiffHeader {
    pub id: [u8; 4],
    /// File length minus the eight bytes of `id` and `size`.
    pub size: u32,
    pub format: [u8; 4],
}

impl RiffHeader {
    pub const SIZE: usize = 12;

    pub fn wave(size: u32) -> Self {
        Self {
            id: RIFF_ID,
            size,
            format: WAVE_FORMAT,
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.id);
        out[4..8].copy_from_slice(&self.size.to_le_bytes());
        out[8..12].copy_from_slice(&self.format);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ContainerError> {
        ensure_len(bytes, Self::SIZE, "RIFF header")?;
        Ok(Self {
            id: id_at(bytes, 0),
            size: u32_at(bytes, 4),
            format: id_at(bytes, 8),
        })
    }
}

/// Header shared by every sub-chunk (`fmt `, `data`, `LIST`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubChunkHeader {
    pub id: [u8; 4],
    pub size: u32,
}

impl SubChunkHeader {
    pub const SIZE: usize = 8;

    pub fn new(id: [u8; 4], size: u32) -> Self {
        Self { id, size }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.id);
        out[4..8].copy_from_slice(&self.size.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ContainerError> {
        ensure_len(bytes, Self::SIZE, "sub-chunk header")?;
        Ok(Self {
            id: id_at(bytes, 0),
            size: u32_at(bytes, 4),
        })
    }
}

/// Body of the `fmt ` sub-chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaveFormat {
    pub audio_format: u16,
    pub channel_count: u16,
    /// Frames per second.
    pub sample_rate: u32,
    pub byte_rate: u32,
    /// Bytes per frame across all channels.
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl WaveFormat {
    pub const SIZE: usize = 16;

    /// The only layout this crate reads and writes.
    pub fn pcm_mono_16(sample_rate: u32) -> Self {
        Self {
            audio_format: PCM_FORMAT,
            channel_count: 1,
            sample_rate,
            byte_rate: sample_rate * 2,
            block_align: 2,
            bits_per_sample: 16,
        }
    }

    /// Reject anything but 16-bit mono PCM with a consistent block align.
    pub fn validate(&self) -> Result<(), ContainerError> {
        if self.audio_format != PCM_FORMAT || self.channel_count != 1 || self.bits_per_sample != 16
        {
            return Err(ContainerError::Unsupported {
                audio_format: self.audio_format,
                channels: self.channel_count,
                bits_per_sample: self.bits_per_sample,
            });
        }
        if u32::from(self.block_align)
            != u32::from(self.channel_count) * u32::from(self.bits_per_sample) / 8
        {
            return Err(ContainerError::BlockAlignMismatch {
                block_align: self.block_align,
                channels: self.channel_count,
                bits_per_sample: self.bits_per_sample,
            });
        }
        if self.sample_rate == 0 {
            return Err(ContainerError::ZeroSampleRate);
        }
        Ok(())
    }

    /// Format written to output clips: PCM mono, everything else from the source.
    pub fn for_output(&self) -> Self {
        Self {
            audio_format: PCM_FORMAT,
            channel_count: 1,
            ..*self
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&self.audio_format.to_le_bytes());
        out[2..4].copy_from_slice(&self.channel_count.to_le_bytes());
        out[4..8].copy_from_slice(&self.sample_rate.to_le_bytes());
        out[8..12].copy_from_slice(&self.byte_rate.to_le_bytes());
        out[12..14].copy_from_slice(&self.block_align.to_le_bytes());
        out[14..16].copy_from_slice(&self.bits_per_sample.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ContainerError> {
        ensure_len(bytes, Self::SIZE, "fmt sub-chunk")?;
        Ok(Self {
            audio_format: u16_at(bytes, 0),
            channel_count: u16_at(bytes, 2),
            sample_rate: u32_at(bytes, 4),
            byte_rate: u32_at(bytes, 8),
            block_align: u16_at(bytes, 12),
            bits_per_sample: u16_at(bytes, 14),
        })
    }
}

/// Complete 44-byte header: RIFF chunk, `fmt ` sub-chunk and `data` header.
pub fn encode_wave_header(
    format: &WaveFormat,
    riff_size: u32,
    data_size: u32,
) -> [u8; HEADER_LEN as usize] {
    let mut out = [0u8; HEADER_LEN as usize];
    let fmt_header = SubChunkHeader::new(FMT_ID, WaveFormat::SIZE as u32);
    let data_header = SubChunkHeader::new(DATA_ID, data_size);

    out[0..12].copy_from_slice(&RiffHeader::wave(riff_size).encode());
    out[12..20].copy_from_slice(&fmt_header.encode());
    out[20..36].copy_from_slice(&format.encode());
    out[36..44].copy_from_slice(&data_header.encode());
    out
}
