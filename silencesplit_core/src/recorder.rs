//! Idle/Recording state machine that turns loud stretches into clip files.
//!
//! While recording, `cut_length` counts every sample since the clip started
//! and `peak_length` counts samples since the level last exceeded the
//! threshold. A clip ends once `peak_length` covers the configured run length,
//! or when the caller forces a stop. Either way one run length of samples is
//! trimmed off the end before the file is finalized (see [`ForcedStopTrim`]
//! for the alternative on forced stops).

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{Local, TimeDelta};
use log::{info, warn};

use crate::config::{Config, ForcedStopTrim};
use crate::fs_util::DirectoryCreator;
use crate::riff::WaveFormat;
use crate::writer::SampleWriter;
use crate::{Result, SilenceSplitError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Recording,
}

/// Why a clip is being closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The level stayed below the threshold for a full run length.
    Silence,
    EndOfStream,
    Cancelled,
    /// Best-effort close before aborting on an input fault.
    ReadError,
}

impl StopReason {
    pub fn is_forced(self) -> bool {
        self != StopReason::Silence
    }
}

/// What happened to a finished clip.
#[derive(Clone, Debug, PartialEq)]
pub enum ClipOutcome {
    /// Renamed into place at `path`.
    Kept { path: PathBuf, duration: Duration },
    /// Deleted for being shorter than the short filter.
    Discarded { path: PathBuf, duration: Duration },
    /// Finalized, but the rename or delete failed; the file is still at `temp_path`.
    Stranded {
        temp_path: PathBuf,
        duration: Duration,
        reason: String,
    },
}

/// State change caused by a batch.
#[derive(Clone, Debug, PartialEq)]
pub enum Transition {
    Started { path: PathBuf },
    Stopped(ClipOutcome),
}

/// Values shown on the per-batch status line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatusSnapshot {
    pub state: StreamState,
    /// Seconds of input consumed so far.
    pub total_seconds: f64,
    /// Seconds in the current clip, trailing silence included.
    pub clip_seconds: f64,
    /// Seconds since the level last exceeded the threshold.
    pub silence_seconds: f64,
    /// RMS of the latest batch.
    pub level: f64,
}

struct RecordingSession {
    writer: SampleWriter,
    output_path: PathBuf,
    temp_path: PathBuf,
    cut_length: u64,
    peak_length: u64,
}

pub struct Recorder<'a> {
    config: &'a Config,
    format: WaveFormat,
    dirs: &'a dyn DirectoryCreator,
    session: Option<RecordingSession>,
    total_length: u64,
}

impl<'a> Recorder<'a> {
    pub fn new(config: &'a Config, format: WaveFormat, dirs: &'a dyn DirectoryCreator) -> Self {
        Self {
            config,
            format,
            dirs,
            session: None,
            total_length: 0,
        }
    }

    pub fn state(&self) -> StreamState {
        if self.session.is_some() {
            StreamState::Recording
        } else {
            StreamState::Idle
        }
    }

    /// Samples seen since the recorder was created.
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn cut_length(&self) -> u64 {
        self.session.as_ref().map_or(0, |session| session.cut_length)
    }

    pub fn peak_length(&self) -> u64 {
        self.session.as_ref().map_or(0, |session| session.peak_length)
    }

    pub fn snapshot(&self, level: f64) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state(),
            total_seconds: self.seconds(self.total_length),
            clip_seconds: self.seconds(self.cut_length()),
            silence_seconds: self.seconds(self.peak_length()),
            level,
        }
    }

    /// Feed one batch and its RMS level.
    ///
    /// While recording the batch is always written before the stop condition
    /// is checked; the trim on stop removes it again when it was silence.
    pub fn process(&mut self, batch: &[i16], level: f64) -> Result<Option<Transition>> {
        self.total_length += batch.len() as u64;
        let loud = level > self.config.threshold;

        let Some(session) = self.session.as_mut() else {
            if loud {
                let path = self.start(batch)?;
                return Ok(Some(Transition::Started { path }));
            }
            return Ok(None);
        };

        let len = batch.len() as u64;
        session.cut_length += len;
        session.peak_length += len;
        if loud {
            session.peak_length = 0;
        }
        session.writer.write(batch)?;

        let silent_for = session.peak_length as f64 / f64::from(self.format.sample_rate);
        if silent_for >= self.config.run_length.as_secs_f64() {
            let outcome = self.stop(StopReason::Silence)?;
            return Ok(outcome.map(Transition::Stopped));
        }
        Ok(None)
    }

    /// Close the current clip, if any: trim, finalize, then keep or discard it.
    ///
    /// The session is gone afterwards even when finalizing fails.
    pub fn stop(&mut self, reason: StopReason) -> Result<Option<ClipOutcome>> {
        let Some(session) = self.session.take() else {
            return Ok(None);
        };
        let RecordingSession {
            mut writer,
            output_path,
            temp_path,
            cut_length,
            peak_length,
        } = session;

        let run_length_samples =
            (self.config.run_length.as_secs_f64() * f64::from(self.format.sample_rate)) as u64;
        let trim = match (reason.is_forced(), self.config.forced_stop_trim) {
            (true, ForcedStopTrim::ObservedSilence) => run_length_samples.min(peak_length),
            _ => run_length_samples,
        };
        if trim > cut_length {
            warn!(
                "trimming {trim} samples from a clip of {cut_length} leaves '{}' empty",
                temp_path.display()
            );
        }
        let cut_length = cut_length.saturating_sub(trim);

        writer.truncate(cut_length * u64::from(self.format.block_align))?;
        writer.finalize()?;

        let seconds = self.seconds(cut_length);
        let duration = Duration::from_secs_f64(seconds);
        info!(
            "clip '{}' closed ({reason:?}) at {seconds:.3}s",
            output_path.display()
        );

        let too_short = self
            .config
            .short_filter
            .is_some_and(|minimum| seconds < minimum.as_secs_f64());
        let outcome = if too_short {
            match fs::remove_file(&temp_path) {
                Ok(()) => ClipOutcome::Discarded {
                    path: output_path,
                    duration,
                },
                Err(err) => ClipOutcome::Stranded {
                    temp_path,
                    duration,
                    reason: format!("failed to remove short clip: {err}"),
                },
            }
        } else {
            match fs::rename(&temp_path, &output_path) {
                Ok(()) => ClipOutcome::Kept {
                    path: output_path,
                    duration,
                },
                Err(err) => ClipOutcome::Stranded {
                    reason: format!(
                        "failed to rename to '{}': {err}",
                        output_path.display()
                    ),
                    temp_path,
                    duration,
                },
            }
        };
        Ok(Some(outcome))
    }

    fn start(&mut self, batch: &[i16]) -> Result<PathBuf> {
        let when = match self.config.start_time {
            Some(start) => {
                let offset = self.total_length / u64::from(self.format.sample_rate);
                i64::try_from(offset)
                    .ok()
                    .and_then(TimeDelta::try_seconds)
                    .and_then(|offset| start.checked_add_signed(offset))
                    .unwrap_or(start)
            }
            None => Local::now(),
        };
        let output_path = self.config.output_path(&when)?;
        let temp_path = self.config.temp_path(&output_path);

        if let Some(parent) = temp_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.dirs
                .create_missing(parent)
                .map_err(|source| SilenceSplitError::Filesystem {
                    operation: "create directory",
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let mut writer = SampleWriter::create(&temp_path, &self.format)?;
        writer.write(batch)?;
        info!("recording started to '{}'", output_path.display());

        self.session = Some(RecordingSession {
            writer,
            output_path: output_path.clone(),
            temp_path,
            cut_length: batch.len() as u64,
            peak_length: 0,
        });
        Ok(output_path)
    }

    fn seconds(&self, samples: u64) -> f64 {
        samples as f64 / f64::from(self.format.sample_rate)
    }
}
