pub mod duration;

use std::path::PathBuf;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use clap::{builder::ValueParser, value_parser, Arg, ArgAction, Command};
use silencesplit_core::{Config, ForcedStopTrim};

use self::duration::parse_duration;

pub const START_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a threshold between 0 and 1.
pub fn parse_threshold(value: &str) -> Result<f64, String> {
    let threshold: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid number '{value}'"))?;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(format!("threshold must be between 0 and 1, got {threshold}"));
    }
    Ok(threshold)
}

/// Parse a finite, positive number of batches per second.
pub fn parse_divisor(value: &str) -> Result<f64, String> {
    let divisor: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid number '{value}'"))?;
    if !divisor.is_finite() || divisor <= 0.0 {
        return Err(format!("divisor must be a positive number, got {divisor}"));
    }
    Ok(divisor)
}

/// Parse `now` or a local `YYYY-MM-DD HH:MM:SS` timestamp.
pub fn parse_start_time(value: &str) -> Result<DateTime<Local>, String> {
    if value == "now" {
        return Ok(Local::now());
    }
    let naive = NaiveDateTime::parse_from_str(value, START_TIME_FORMAT)
        .map_err(|err| format!("invalid time format '{value}': {err}"))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| format!("'{value}' does not exist in the local time zone"))
}

/// Parse `run-length` or `observed-silence`.
pub fn parse_forced_stop_trim(value: &str) -> Result<ForcedStopTrim, String> {
    match value {
        "run-length" => Ok(ForcedStopTrim::RunLength),
        "observed-silence" => Ok(ForcedStopTrim::ObservedSilence),
        other => Err(format!(
            "unknown trim mode '{other}', expected 'run-length' or 'observed-silence'"
        )),
    }
}

pub fn build_cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("Record the sound in a WAVE stream into separate clips, dropping the silence")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("PATH")
                .help("Input WAVE file (reads stdin when omitted)")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("TEMPLATE")
                .help("Output path, strftime formatted with the clip start time")
                .default_value(Config::DEFAULT_TEMPLATE),
        )
        .arg(
            Arg::new("append")
                .short('a')
                .long("append")
                .value_name("SUFFIX")
                .help("Appended to the file name while a clip is being recorded")
                .default_value(Config::DEFAULT_TEMP_SUFFIX),
        )
        .arg(
            Arg::new("threshold")
                .short('t')
                .long("threshold")
                .value_name("NUMBER")
                .help("Sound level, between 0 and 1, that starts a clip")
                .default_value("0.1")
                .value_parser(ValueParser::new(parse_threshold)),
        )
        .arg(
            Arg::new("runlength")
                .short('r')
                .long("runlength")
                .value_name("DURATION")
                .help("Silence that ends a clip (e.g. 4, 2.5s, 1m)")
                .default_value("4")
                .value_parser(ValueParser::new(parse_duration)),
        )
        .arg(
            Arg::new("filter")
                .short('f')
                .long("filter")
                .value_name("DURATION")
                .help("Remove clips shorter than DURATION (0 keeps everything)")
                .default_value("0")
                .value_parser(ValueParser::new(parse_duration)),
        )
        .arg(
            Arg::new("start")
                .short('s')
                .long("start")
                .value_name("DATETIME")
                .help("Start time of the input, offset by audio time (\"2000-01-02 03:04:05\" or now)")
                .value_parser(ValueParser::new(parse_start_time)),
        )
        .arg(
            Arg::new("divisor")
                .short('d')
                .long("divisor")
                .value_name("NUMBER")
                .help("Slice each second of audio into NUMBER batches")
                .default_value("60")
                .value_parser(ValueParser::new(parse_divisor)),
        )
        .arg(
            Arg::new("forced-stop-trim")
                .long("forced-stop-trim")
                .value_name("MODE")
                .help("Trim on end of input or interrupt: run-length or observed-silence")
                .default_value("run-length")
                .value_parser(ValueParser::new(parse_forced_stop_trim)),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Do not draw the live status line")
                .action(ArgAction::SetTrue),
        )
}
