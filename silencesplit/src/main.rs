mod cli;
mod signal;

use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Local};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::info;
use silencesplit_core::{
    run_with_progress, CancellationToken, Config, ForcedStopTrim, InputSource, ProgressEvent,
    StatusSnapshot, StreamState,
};

use crate::cli::build_cli;

const LEVEL_BAR_WIDTH: usize = 20;

/// Print a line prefixed with the wall-clock time, keeping the status line intact.
fn announce(progress: &ProgressBar, message: impl Display) {
    progress.suspend(|| println!("{} {message}", Local::now().format("%H:%M:%S")));
}

fn level_bar(level: f64) -> String {
    let filled = (level.clamp(0.0, 1.0) * LEVEL_BAR_WIDTH as f64).round() as usize;
    format!(
        "{}{}",
        "=".repeat(filled),
        " ".repeat(LEVEL_BAR_WIDTH - filled)
    )
}

fn status_line(status: &StatusSnapshot) -> String {
    let state = match status.state {
        StreamState::Recording => "Recording",
        StreamState::Idle => "Lurking",
    };
    format!(
        "{state} [t: {:.1} c: {:.1} p: {:.1}] [{}]",
        status.total_seconds,
        status.clip_seconds,
        status.silence_seconds,
        level_bar(status.level)
    )
}

fn recorded_length(duration: Duration) -> String {
    let seconds = duration.as_secs();
    format!("{} minutes {} seconds recorded", seconds / 60, seconds % 60)
}

/// Lines describing the active settings, printed once the input header is accepted.
fn settings_summary(config: &Config) -> Vec<String> {
    let mut lines = vec![
        format!("output: {}", config.output_template),
        format!("suffix: {}", config.temp_suffix),
        format!("threshold: {}", config.threshold),
        format!("run length: {:.3}s", config.run_length.as_secs_f64()),
    ];
    if let Some(filter) = config.short_filter {
        lines.push(format!("short filter: {:.3}s", filter.as_secs_f64()));
    }
    if let Some(start) = config.start_time {
        lines.push(format!("start time: {}", start.format("%Y-%m-%d %H:%M:%S")));
    }
    lines.push(format!("divisor: {}", config.slice_divisor));
    lines
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = build_cli().get_matches();

    let input = matches
        .get_one::<PathBuf>("input")
        .cloned()
        .map_or(InputSource::Stdin, InputSource::File);
    let template = matches
        .get_one::<String>("output")
        .cloned()
        .unwrap_or_else(|| Config::DEFAULT_TEMPLATE.to_owned());
    let suffix = matches
        .get_one::<String>("append")
        .cloned()
        .unwrap_or_else(|| Config::DEFAULT_TEMP_SUFFIX.to_owned());
    let threshold = matches
        .get_one::<f64>("threshold")
        .copied()
        .unwrap_or(Config::DEFAULT_THRESHOLD);
    let run_length = matches
        .get_one::<Duration>("runlength")
        .copied()
        .unwrap_or(Config::DEFAULT_RUN_LENGTH);
    let short_filter = matches
        .get_one::<Duration>("filter")
        .copied()
        .unwrap_or_default();
    let start_time = matches.get_one::<DateTime<Local>>("start").copied();
    let divisor = matches
        .get_one::<f64>("divisor")
        .copied()
        .unwrap_or(Config::DEFAULT_SLICE_DIVISOR);
    let forced_stop_trim = matches
        .get_one::<ForcedStopTrim>("forced-stop-trim")
        .copied()
        .unwrap_or_default();
    let quiet = matches.get_flag("quiet");

    let cancel = CancellationToken::new();
    let config = Config::builder(input.clone(), template)
        .temp_suffix(suffix)
        .threshold(threshold)
        .run_length(run_length)
        .short_filter(short_filter)
        .start_time(start_time)
        .slice_divisor(divisor)
        .forced_stop_trim(forced_stop_trim)
        .cancellation(cancel.clone())
        .build()
        .with_context(|| format!("failed to create configuration for {input}"))?;

    signal::install_termination_handler(cancel)
        .context("failed to install termination handler")?;

    let settings = settings_summary(&config);

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        let progress = ProgressBar::new_spinner();
        progress.set_draw_target(ProgressDrawTarget::stderr());
        progress
    };
    let spinner_style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    progress.set_style(spinner_style);

    let progress_handle = progress.clone();
    let result = run_with_progress(config, &mut |event: ProgressEvent| match event {
        ProgressEvent::Started {
            source,
            format,
            batch_len,
        } => {
            info!("{batch_len} samples per batch");
            announce(
                &progress_handle,
                format!("Lurking on {source}, {} Hz", format.sample_rate),
            );
            for line in &settings {
                progress_handle.suspend(|| println!("  {line}"));
            }
            progress_handle.enable_steady_tick(Duration::from_millis(100));
        }
        ProgressEvent::Status(status) => progress_handle.set_message(status_line(&status)),
        ProgressEvent::ClipStarted { path } => {
            announce(
                &progress_handle,
                format!("Recording started: {}", path.display()),
            );
        }
        ProgressEvent::ClipKept { path, duration } => {
            announce(
                &progress_handle,
                format!(
                    "Recording stopped, {}: {}",
                    recorded_length(duration),
                    path.display()
                ),
            );
        }
        ProgressEvent::ClipDiscarded { path, duration } => {
            announce(
                &progress_handle,
                format!(
                    "Recording removed, short filter ({:.1}s): {}",
                    duration.as_secs_f64(),
                    path.display()
                ),
            );
        }
        ProgressEvent::Warning { message } => {
            progress_handle.suspend(|| {
                eprintln!("{} warning: {message}", Local::now().format("%H:%M:%S"))
            });
        }
        ProgressEvent::Finished => progress_handle.set_message("Stopped"),
    })
    .with_context(|| format!("failed to split {input}"));

    progress.finish_and_clear();

    let summary = result?;
    info!(
        "{} batches, {} samples, {} clips kept, {} removed, {} left at their temporary path",
        summary.batches,
        summary.samples,
        summary.clips_kept,
        summary.clips_discarded,
        summary.clips_stranded
    );
    announce(&progress, "Stopped");

    Ok(())
}
