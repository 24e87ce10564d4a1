use std::fmt::{self, Write as _};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};

use crate::{Result, SilenceSplitError};

/// Where the WAVE stream comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputSource {
    Stdin,
    File(PathBuf),
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Stdin => write!(f, "stdin"),
            InputSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// How much to trim when a clip is closed by end of input or cancellation
/// rather than by a run of silence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ForcedStopTrim {
    /// Remove a full run length, exactly as a silence-triggered stop does.
    #[default]
    RunLength,
    /// Remove only the silence actually observed at the end of the clip,
    /// up to one run length.
    ObservedSilence,
}

/// Cancellation flag checked once per batch by the run loop.
///
/// Clones share the same flag, so the hosting code can keep one and hand
/// another to [`Config`].
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Configuration for a silence-splitting run.
#[derive(Clone, Debug)]
pub struct Config {
    pub input: InputSource,
    /// strftime pattern expanded with the clip's start time.
    pub output_template: String,
    /// Appended to the output path while the clip is being recorded.
    pub temp_suffix: String,
    /// RMS level, between 0 and 1, above which a batch counts as sound.
    pub threshold: f64,
    /// Continuous silence that ends a clip.
    pub run_length: Duration,
    /// Clips shorter than this are deleted. `None` keeps everything.
    pub short_filter: Option<Duration>,
    /// Fixed time for the start of the input; clip times are offset from it by
    /// the input's elapsed duration. `None` uses the wall clock.
    pub start_time: Option<DateTime<Local>>,
    /// Batches hold `sample_rate / slice_divisor` samples.
    pub slice_divisor: f64,
    pub forced_stop_trim: ForcedStopTrim,
    pub cancel: CancellationToken,
}

impl Config {
    pub const DEFAULT_TEMPLATE: &'static str = "clip_%F_%H:%M:%S.wav";
    pub const DEFAULT_TEMP_SUFFIX: &'static str = ".recording.wav";
    pub const DEFAULT_THRESHOLD: f64 = 0.1;
    pub const DEFAULT_RUN_LENGTH: Duration = Duration::from_secs(4);
    pub const DEFAULT_SLICE_DIVISOR: f64 = 60.0;

    /// Construct a [`Config`] with default settings for everything but the
    /// input and the output template.
    pub fn new<S: Into<String>>(input: InputSource, output_template: S) -> Result<Self> {
        Self::builder(input, output_template).build()
    }

    pub fn builder<S: Into<String>>(input: InputSource, output_template: S) -> ConfigBuilder {
        ConfigBuilder {
            input,
            output_template: output_template.into(),
            temp_suffix: Self::DEFAULT_TEMP_SUFFIX.to_owned(),
            threshold: Self::DEFAULT_THRESHOLD,
            run_length: Self::DEFAULT_RUN_LENGTH,
            short_filter: None,
            start_time: None,
            slice_divisor: Self::DEFAULT_SLICE_DIVISOR,
            forced_stop_trim: ForcedStopTrim::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Samples per batch for a stream at `sample_rate`.
    pub fn batch_len(&self, sample_rate: u32) -> Result<usize> {
        let len = (f64::from(sample_rate) / self.slice_divisor) as usize;
        if len == 0 {
            return Err(SilenceSplitError::SliceTooSmall {
                sample_rate,
                divisor: self.slice_divisor,
            });
        }
        Ok(len)
    }

    /// Expand the output template for a clip starting at `when`.
    pub fn output_path(&self, when: &DateTime<Local>) -> Result<PathBuf> {
        let mut expanded = String::new();
        write!(expanded, "{}", when.format(&self.output_template)).map_err(|_| {
            SilenceSplitError::InvalidTemplate {
                template: self.output_template.clone(),
            }
        })?;
        Ok(PathBuf::from(expanded))
    }

    /// Path a clip is recorded to before it is renamed into place.
    pub fn temp_path(&self, output_path: &std::path::Path) -> PathBuf {
        let mut name = output_path.as_os_str().to_os_string();
        name.push(&self.temp_suffix);
        PathBuf::from(name)
    }
}

/// Builder for [`Config`].
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    input: InputSource,
    output_template: String,
    temp_suffix: String,
    threshold: f64,
    run_length: Duration,
    short_filter: Option<Duration>,
    start_time: Option<DateTime<Local>>,
    slice_divisor: f64,
    forced_stop_trim: ForcedStopTrim,
    cancel: CancellationToken,
}

impl ConfigBuilder {
    pub fn temp_suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.temp_suffix = suffix.into();
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn run_length(mut self, run_length: Duration) -> Self {
        self.run_length = run_length;
        self
    }

    /// Discard clips shorter than `minimum`; zero disables the filter.
    pub fn short_filter(mut self, minimum: Duration) -> Self {
        self.short_filter = (!minimum.is_zero()).then_some(minimum);
        self
    }

    pub fn start_time(mut self, start: Option<DateTime<Local>>) -> Self {
        self.start_time = start;
        self
    }

    pub fn slice_divisor(mut self, divisor: f64) -> Self {
        self.slice_divisor = divisor;
        self
    }

    pub fn forced_stop_trim(mut self, trim: ForcedStopTrim) -> Self {
        self.forced_stop_trim = trim;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn build(self) -> Result<Config> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(SilenceSplitError::InvalidThreshold(self.threshold));
        }
        if self.run_length.is_zero() {
            return Err(SilenceSplitError::InvalidRunLength);
        }
        if !self.slice_divisor.is_finite() || self.slice_divisor <= 0.0 {
            return Err(SilenceSplitError::InvalidSliceDivisor(self.slice_divisor));
        }
        if self.output_template.is_empty() {
            return Err(SilenceSplitError::EmptyTemplate);
        }
        if StrftimeItems::new(&self.output_template).any(|item| matches!(item, Item::Error)) {
            return Err(SilenceSplitError::InvalidTemplate {
                template: self.output_template,
            });
        }

        Ok(Config {
            input: self.input,
            output_template: self.output_template,
            temp_suffix: self.temp_suffix,
            threshold: self.threshold,
            run_length: self.run_length,
            short_filter: self.short_filter,
            start_time: self.start_time,
            slice_divisor: self.slice_divisor,
            forced_stop_trim: self.forced_stop_trim,
            cancel: self.cancel,
        })
    }
}
