//! Sequential WAVE writer with header patching on finalize.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::riff::{encode_wave_header, WaveFormat, HEADER_LEN};
use crate::{Result, SilenceSplitError};

/// Placeholder RIFF and data size written until the real sizes are known.
pub const SIZE_SENTINEL: u32 = i32::MAX as u32;

/// Writes samples to a new WAVE file.
///
/// The header carries [`SIZE_SENTINEL`] sizes until [`SampleWriter::finalize`]
/// rewrites it, so an unfinalized file is not a valid standalone WAVE file.
pub struct SampleWriter {
    file: BufWriter<File>,
    path: PathBuf,
    format: WaveFormat,
    data_len: u64,
    encoded: Vec<u8>,
}

impl SampleWriter {
    /// Create `path` and write a placeholder header for `source`.
    pub fn create<P: AsRef<Path>>(path: P, source: &WaveFormat) -> Result<Self> {
        let path = path.as_ref();
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|source| SilenceSplitError::Filesystem {
                operation: "create",
                path: path.to_path_buf(),
                source,
            })?;

        let mut writer = Self {
            file: BufWriter::new(file),
            path: path.to_path_buf(),
            format: source.for_output(),
            data_len: 0,
            encoded: Vec::new(),
        };
        writer.write_header(SIZE_SENTINEL, SIZE_SENTINEL)?;
        debug!("created '{}'", writer.path.display());

        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> &WaveFormat {
        &self.format
    }

    /// Bytes in the sample region.
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    /// Whole frames in the sample region.
    pub fn frames(&self) -> u64 {
        self.data_len / self.block_align()
    }

    /// Append `samples` after everything written so far.
    pub fn write(&mut self, samples: &[i16]) -> Result<()> {
        self.encoded.clear();
        self.encoded.reserve(samples.len() * 2);
        for sample in samples {
            self.encoded.extend_from_slice(&sample.to_le_bytes());
        }
        self.file.write_all(&self.encoded)?;
        self.data_len += self.encoded.len() as u64;
        Ok(())
    }

    /// Shrink the sample region to at most `data_len` bytes.
    ///
    /// The length is rounded down to a whole frame and the file never grows.
    pub fn truncate(&mut self, data_len: u64) -> Result<()> {
        let aligned = data_len - data_len % self.block_align();
        let kept = aligned.min(self.data_len);

        self.file.flush()?;
        self.file.get_ref().set_len(HEADER_LEN + kept)?;
        self.file.seek(SeekFrom::Start(HEADER_LEN + kept))?;
        self.data_len = kept;

        debug!("truncated '{}' to {kept} data bytes", self.path.display());
        Ok(())
    }

    /// Rewrite the header with the true sizes and close the file.
    pub fn finalize(mut self) -> Result<PathBuf> {
        let file_len = self.file.seek(SeekFrom::End(0))?;
        let riff_size = saturate(file_len.saturating_sub(8));
        let data_size = saturate(file_len.saturating_sub(HEADER_LEN));

        self.file.seek(SeekFrom::Start(0))?;
        self.write_header(riff_size, data_size)?;
        self.file.flush()?;
        self.file.into_inner().map_err(|err| err.into_error())?;

        debug!(
            "finalized '{}' with {data_size} data bytes",
            self.path.display()
        );
        Ok(self.path)
    }

    fn write_header(&mut self, riff_size: u32, data_size: u32) -> Result<()> {
        let header = encode_wave_header(&self.format, riff_size, data_size);
        self.file.write_all(&header)?;
        Ok(())
    }

    fn block_align(&self) -> u64 {
        u64::from(self.format.block_align).max(1)
    }
}

fn saturate(len: u64) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}
