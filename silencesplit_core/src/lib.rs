//! Sound-activated splitting of a mono 16-bit PCM WAVE stream.
//!
//! The input is consumed in fixed-size batches. Each batch is measured with
//! [`level::rms`] and handed to a [`Recorder`], which opens a new clip when the
//! level rises above the configured threshold and closes it again after a run
//! of silence, trimming that trailing silence off the finished file.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, warn};
use thiserror::Error;

pub mod config;
pub mod fs_util;
pub mod level;
pub mod reader;
pub mod recorder;
pub mod riff;
pub mod writer;

pub use config::{CancellationToken, Config, ConfigBuilder, ForcedStopTrim, InputSource};
pub use fs_util::{DirectoryCreator, LocalDirectories};
pub use reader::SampleReader;
pub use recorder::{ClipOutcome, Recorder, StatusSnapshot, StopReason, StreamState, Transition};
pub use riff::WaveFormat;
pub use writer::SampleWriter;

/// Problems with the RIFF/WAVE container of the input stream.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The stream ended before a fixed-size structure could be read in full.
    #[error("{structure} needs {needed} bytes but only {available} were available")]
    Truncated {
        structure: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("wrong RIFF id '{found}', not a RIFF file?")]
    NotRiff { found: String },

    #[error("RIFF format is '{found}', not WAVE")]
    NotWave { found: String },

    /// A `data` sub-chunk was reached before any `fmt ` sub-chunk.
    #[error("data sub-chunk found before the fmt sub-chunk")]
    MissingFormat,

    #[error("fmt sub-chunk is {size} bytes, at least 16 are required")]
    FormatTooShort { size: u32 },

    /// Only 16-bit mono PCM is accepted; nothing is transcoded.
    #[error(
        "unsupported audio: format {audio_format}, {channels} channel(s), {bits_per_sample} bits; 16 bit mono PCM is required"
    )]
    Unsupported {
        audio_format: u16,
        channels: u16,
        bits_per_sample: u16,
    },

    #[error("block align {block_align} does not match {channels} channel(s) of {bits_per_sample} bits")]
    BlockAlignMismatch {
        block_align: u16,
        channels: u16,
        bits_per_sample: u16,
    },

    #[error("sample rate must be greater than zero")]
    ZeroSampleRate,
}

/// Errors that can occur while splitting a stream into clips.
#[derive(Debug, Error)]
pub enum SilenceSplitError {
    /// The input is not a usable RIFF/WAVE stream.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// Wrapper around IO errors encountered while reading or writing streams.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Creating, renaming or removing a path failed.
    #[error("failed to {operation} '{}'", path.display())]
    Filesystem {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The sample buffer could not be allocated.
    #[error("failed to allocate a buffer for {samples} samples")]
    Resource { samples: usize },

    #[error("threshold must be between 0 and 1, got {0}")]
    InvalidThreshold(f64),

    #[error("run length must be greater than zero")]
    InvalidRunLength,

    #[error("slice divisor must be a positive number, got {0}")]
    InvalidSliceDivisor(f64),

    /// `sample_rate / divisor` rounds down to an empty batch.
    #[error("a sample rate of {sample_rate} Hz sliced by {divisor} leaves no samples per batch")]
    SliceTooSmall { sample_rate: u32, divisor: f64 },

    #[error("output template cannot be empty")]
    EmptyTemplate,

    #[error("output template '{template}' is not a valid time format")]
    InvalidTemplate { template: String },
}

pub type Result<T, E = SilenceSplitError> = std::result::Result<T, E>;

/// Events emitted while a stream is being processed.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// The input header was accepted and processing is about to begin.
    Started {
        source: InputSource,
        format: WaveFormat,
        batch_len: usize,
    },
    /// Emitted once for every batch after the recorder has seen it.
    Status(StatusSnapshot),
    ClipStarted {
        path: PathBuf,
    },
    ClipKept {
        path: PathBuf,
        duration: Duration,
    },
    ClipDiscarded {
        path: PathBuf,
        duration: Duration,
    },
    /// Something went wrong that did not stop the run.
    Warning {
        message: String,
    },
    Finished,
}

/// Receives [`ProgressEvent`]s from a run.
pub trait ProgressReporter {
    fn report(&mut self, _event: ProgressEvent) {}
}

impl<F> ProgressReporter for F
where
    F: FnMut(ProgressEvent),
{
    fn report(&mut self, event: ProgressEvent) {
        self(event)
    }
}

/// Counters describing a completed run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub batches: u64,
    pub samples: u64,
    pub clips_kept: u64,
    pub clips_discarded: u64,
    /// Clips left behind at their temporary path after a rename or delete failed.
    pub clips_stranded: u64,
}

impl RunSummary {
    fn record(&mut self, outcome: &ClipOutcome) {
        match outcome {
            ClipOutcome::Kept { .. } => self.clips_kept += 1,
            ClipOutcome::Discarded { .. } => self.clips_discarded += 1,
            ClipOutcome::Stranded { .. } => self.clips_stranded += 1,
        }
    }
}

/// Process the configured input until it ends or the run is cancelled.
pub fn run(config: Config) -> Result<RunSummary> {
    run_with_progress(config, &mut |_event: ProgressEvent| {})
}

/// Same as [`run`], reporting every state change to `progress`.
pub fn run_with_progress<P>(config: Config, progress: &mut P) -> Result<RunSummary>
where
    P: ProgressReporter + ?Sized,
{
    run_with_directories(config, &LocalDirectories, progress)
}

/// Same as [`run_with_progress`], creating missing output directories through `dirs`.
pub fn run_with_directories<P>(
    config: Config,
    dirs: &dyn DirectoryCreator,
    progress: &mut P,
) -> Result<RunSummary>
where
    P: ProgressReporter + ?Sized,
{
    let reader = SampleReader::open(&config.input)?;
    run_reader(config, reader, dirs, progress)
}

/// Run the loop over an already opened `reader`.
///
/// On a read error while a clip is open, the clip is closed on a best-effort
/// basis and the read error is returned.
pub fn run_reader<R, P>(
    config: Config,
    mut reader: SampleReader<R>,
    dirs: &dyn DirectoryCreator,
    progress: &mut P,
) -> Result<RunSummary>
where
    R: io::Read,
    P: ProgressReporter + ?Sized,
{
    let format = *reader.format();
    let batch_len = config.batch_len(format.sample_rate)?;
    let mut buffer = allocate_batch(batch_len)?;

    progress.report(ProgressEvent::Started {
        source: config.input.clone(),
        format,
        batch_len,
    });

    let mut recorder = Recorder::new(&config, format, dirs);
    let mut summary = RunSummary::default();

    loop {
        let cancelled = config.cancel.is_cancelled();
        if cancelled && recorder.state() == StreamState::Idle {
            debug!("cancelled while idle");
            break;
        }

        let read = match reader.read_samples(&mut buffer) {
            Ok(read) => read,
            Err(err) => {
                if recorder.state() == StreamState::Recording {
                    progress.report(ProgressEvent::Warning {
                        message: format!("error reading input ({err}), trying to close the clip nicely"),
                    });
                    match recorder.stop(StopReason::ReadError) {
                        Ok(Some(outcome)) => emit_outcome(outcome, &mut summary, progress),
                        Ok(None) => {}
                        Err(close_err) => progress.report(ProgressEvent::Warning {
                            message: format!("failed to close the clip: {close_err}"),
                        }),
                    }
                }
                return Err(err);
            }
        };

        if read == 0 {
            debug!("end of input after {} samples", recorder.total_length());
            if let Some(outcome) = recorder.stop(StopReason::EndOfStream)? {
                emit_outcome(outcome, &mut summary, progress);
            }
            break;
        }

        let batch = &buffer[..read];
        let level = level::rms(batch);
        summary.batches += 1;
        summary.samples += read as u64;

        match recorder.process(batch, level)? {
            Some(Transition::Started { path }) => {
                progress.report(ProgressEvent::ClipStarted { path });
            }
            Some(Transition::Stopped(outcome)) => emit_outcome(outcome, &mut summary, progress),
            None => {}
        }
        progress.report(ProgressEvent::Status(recorder.snapshot(level)));

        if cancelled {
            debug!("cancelled while recording, closing the clip");
            if let Some(outcome) = recorder.stop(StopReason::Cancelled)? {
                emit_outcome(outcome, &mut summary, progress);
            }
            break;
        }
    }

    reader.close();
    progress.report(ProgressEvent::Finished);

    Ok(summary)
}

fn allocate_batch(samples: usize) -> Result<Vec<i16>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(samples)
        .map_err(|_| SilenceSplitError::Resource { samples })?;
    buffer.resize(samples, 0);
    Ok(buffer)
}

fn emit_outcome<P>(outcome: ClipOutcome, summary: &mut RunSummary, progress: &mut P)
where
    P: ProgressReporter + ?Sized,
{
    summary.record(&outcome);
    match outcome {
        ClipOutcome::Kept { path, duration } => {
            progress.report(ProgressEvent::ClipKept { path, duration });
        }
        ClipOutcome::Discarded { path, duration } => {
            progress.report(ProgressEvent::ClipDiscarded { path, duration });
        }
        ClipOutcome::Stranded {
            temp_path, reason, ..
        } => {
            warn!("clip left at '{}': {reason}", temp_path.display());
            progress.report(ProgressEvent::Warning {
                message: format!("clip left at '{}': {reason}", temp_path.display()),
            });
        }
    }
}
