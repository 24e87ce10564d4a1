//! Streaming reader for mono 16-bit PCM WAVE input.

use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read};

use log::debug;

use crate::config::InputSource;
use crate::riff::{fourcc, RiffHeader, SubChunkHeader, WaveFormat, DATA_ID, FMT_ID, RIFF_ID, WAVE_FORMAT};
use crate::{ContainerError, Result, SilenceSplitError};

/// Reads a validated WAVE stream one batch of samples at a time.
///
/// Construction consumes every header up to and including the `data`
/// sub-chunk header, so the remaining bytes of `inner` are raw samples.
pub struct SampleReader<R> {
    inner: R,
    format: WaveFormat,
    bytes: Vec<u8>,
}

impl SampleReader<Box<dyn Read>> {
    /// Open `source`, reading standard input when no path is given.
    pub fn open(source: &InputSource) -> Result<Self> {
        let inner: Box<dyn Read> = match source {
            InputSource::Stdin => Box::new(io::stdin().lock()),
            InputSource::File(path) => Box::new(BufReader::new(File::open(path)?)),
        };
        debug!("reading header from {source}");
        Self::new(inner)
    }
}

impl<R: Read> SampleReader<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let riff = RiffHeader::decode(&read_struct::<_, { RiffHeader::SIZE }>(
            &mut inner,
            "RIFF header",
        )?)?;
        if riff.id != RIFF_ID {
            return Err(ContainerError::NotRiff {
                found: fourcc(riff.id),
            }
            .into());
        }
        if riff.format != WAVE_FORMAT {
            return Err(ContainerError::NotWave {
                found: fourcc(riff.format),
            }
            .into());
        }

        let mut format = None;
        loop {
            let header = SubChunkHeader::decode(&read_struct::<_, { SubChunkHeader::SIZE }>(
                &mut inner,
                "sub-chunk header",
            )?)?;
            debug!("sub-chunk '{}' of {} bytes", fourcc(header.id), header.size);

            match header.id {
                FMT_ID => {
                    if (header.size as usize) < WaveFormat::SIZE {
                        return Err(ContainerError::FormatTooShort { size: header.size }.into());
                    }
                    let body = read_struct::<_, { WaveFormat::SIZE }>(&mut inner, "fmt sub-chunk")?;
                    format = Some(WaveFormat::decode(&body)?);
                    skip(&mut inner, u64::from(header.size) - WaveFormat::SIZE as u64)?;
                }
                DATA_ID => break,
                _ => skip(&mut inner, u64::from(header.size))?,
            }
        }

        let format = format.ok_or(ContainerError::MissingFormat)?;
        format.validate()?;

        Ok(Self {
            inner,
            format,
            bytes: Vec::new(),
        })
    }

    pub fn format(&self) -> &WaveFormat {
        &self.format
    }

    /// Fill `out` with decoded samples and return how many were read.
    ///
    /// Fewer than `out.len()` samples are returned only at the end of the
    /// stream; zero means the stream is exhausted. A trailing odd byte is dropped.
    pub fn read_samples(&mut self, out: &mut [i16]) -> Result<usize> {
        let wanted = out.len() * 2;
        if self.bytes.len() < wanted {
            self.bytes
                .try_reserve_exact(wanted - self.bytes.len())
                .map_err(|_| SilenceSplitError::Resource { samples: out.len() })?;
            self.bytes.resize(wanted, 0);
        }

        let filled = fill(&mut self.inner, &mut self.bytes[..wanted])?;
        let count = filled / 2;
        for (sample, bytes) in out.iter_mut().zip(self.bytes[..count * 2].chunks_exact(2)) {
            *sample = i16::from_le_bytes([bytes[0], bytes[1]]);
        }

        Ok(count)
    }

    /// Release the underlying stream.
    pub fn close(self) {
        drop(self.inner);
    }
}

/// Read until `buf` is full or the stream ends, returning the bytes read.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

fn read_struct<R: Read, const N: usize>(
    reader: &mut R,
    structure: &'static str,
) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    let available = fill(reader, &mut buf)?;
    if available < N {
        return Err(ContainerError::Truncated {
            structure,
            needed: N,
            available,
        }
        .into());
    }
    Ok(buf)
}

fn skip<R: Read>(reader: &mut R, len: u64) -> Result<()> {
    if len == 0 {
        return Ok(());
    }
    let skipped = io::copy(&mut reader.take(len), &mut io::sink())?;
    if skipped < len {
        return Err(ContainerError::Truncated {
            structure: "sub-chunk body",
            needed: usize::try_from(len).unwrap_or(usize::MAX),
            available: usize::try_from(skipped).unwrap_or(usize::MAX),
        }
        .into());
    }
    debug!("skipped {len} bytes");
    Ok(())
}
