use chrono::{Local, TimeZone};
use silencesplit_core::riff::encode_wave_header;
use silencesplit_core::{
    run, run_reader, run_with_progress, CancellationToken, Config, ContainerError,
    ForcedStopTrim, InputSource, LocalDirectories, ProgressEvent, SampleReader,
    SilenceSplitError, StreamState, WaveFormat,
};
use std::error::Error;
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::tempdir;

const SAMPLE_RATE: u32 = 8_000;

/// One stretch of the synthetic input.
enum Section {
    Silence(Duration),
    Tone(Duration),
}

/// Write a mono 16-bit PCM WAVE file made of silent and loud sections.
///
/// Fixtures are synthesised at runtime so no binary assets live in the
/// repository. The tone is a full-scale 440 Hz sine, far above any threshold
/// used here.
fn write_sections<P: AsRef<Path>>(
    path: P,
    channels: u16,
    sections: &[Section],
) -> Result<(), Box<dyn Error>> {
    let mut samples = Vec::new();
    for section in sections {
        let (duration, loud) = match section {
            Section::Silence(duration) => (duration, false),
            Section::Tone(duration) => (duration, true),
        };
        let count = (duration.as_secs_f64() * f64::from(SAMPLE_RATE)).round() as usize;
        for n in 0..count {
            let sample = if loud {
                let theta = (n as f32 / SAMPLE_RATE as f32) * 2.0 * std::f32::consts::PI * 440.0;
                (theta.sin() * i16::MAX as f32) as i16
            } else {
                0
            };
            for _ in 0..channels {
                samples.extend_from_slice(&sample.to_le_bytes());
            }
        }
    }

    let block_align = channels * 2;
    let mut file = File::create(path)?;
    let data_len = samples.len() as u32;
    file.write_all(b"RIFF")?;
    file.write_all(&(36u32 + data_len).to_le_bytes())?;
    file.write_all(b"WAVE")?;
    file.write_all(b"fmt ")?;
    file.write_all(&16u32.to_le_bytes())?;
    file.write_all(&1u16.to_le_bytes())?;
    file.write_all(&channels.to_le_bytes())?;
    file.write_all(&SAMPLE_RATE.to_le_bytes())?;
    file.write_all(&(SAMPLE_RATE * u32::from(block_align)).to_le_bytes())?;
    file.write_all(&block_align.to_le_bytes())?;
    file.write_all(&16u16.to_le_bytes())?;
    file.write_all(b"data")?;
    file.write_all(&data_len.to_le_bytes())?;
    file.write_all(&samples)?;
    Ok(())
}

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value)
}

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn listing(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    let mut outputs: Vec<_> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()?;
    outputs.sort();
    Ok(outputs)
}

fn fixed_start() -> chrono::DateTime<Local> {
    Local.with_ymd_and_hms(2000, 1, 2, 3, 4, 5).unwrap()
}

#[test]
fn run_keeps_each_burst_as_a_clip() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("input.wav");
    write_sections(
        &input_path,
        1,
        &[
            Section::Silence(secs(1.0)),
            Section::Tone(secs(1.0)),
            Section::Silence(secs(2.0)),
            Section::Tone(secs(0.5)),
            Section::Silence(secs(2.0)),
        ],
    )?;

    let output_dir = tempdir()?;
    let template = output_dir.path().join("clip_%H%M%S.wav");
    let config = Config::builder(InputSource::File(input_path), template.to_string_lossy())
        .run_length(secs(1.0))
        .slice_divisor(8.0)
        .start_time(Some(fixed_start()))
        .build()?;
    let summary = run(config)?;

    assert_eq!(summary.clips_kept, 2);
    assert_eq!(summary.clips_discarded, 0);
    assert_eq!(summary.samples, 6_500 * 8);

    let outputs = listing(output_dir.path())?;
    assert_eq!(
        outputs,
        vec![
            output_dir.path().join("clip_030406.wav"),
            output_dir.path().join("clip_030409.wav"),
        ]
    );

    let first = fs::read(&outputs[0])?;
    assert_eq!(&first[0..4], b"RIFF");
    assert_eq!(u32_at(&first, 4) as usize, first.len() - 8);
    assert_eq!(u32_at(&first, 40), 16_000);
    let second = fs::read(&outputs[1])?;
    assert_eq!(u32_at(&second, 40), 8_000);

    output_dir.close()?;
    work_dir.close()?;
    Ok(())
}

#[test]
fn run_discards_clips_below_the_short_filter() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("input.wav");
    write_sections(
        &input_path,
        1,
        &[
            Section::Tone(secs(0.25)),
            Section::Silence(secs(1.5)),
            Section::Tone(secs(1.0)),
            Section::Silence(secs(1.5)),
        ],
    )?;

    let output_dir = tempdir()?;
    let template = output_dir.path().join("clip_%H%M%S.wav");
    let config = Config::builder(InputSource::File(input_path), template.to_string_lossy())
        .run_length(secs(1.0))
        .short_filter(secs(0.5))
        .slice_divisor(8.0)
        .start_time(Some(fixed_start()))
        .build()?;

    let mut events = Vec::new();
    let summary = run_with_progress(config, &mut |event: ProgressEvent| {
        if !matches!(event, ProgressEvent::Status(_)) {
            events.push(event);
        }
    })?;

    assert_eq!(summary.clips_kept, 1);
    assert_eq!(summary.clips_discarded, 1);
    assert!(events.contains(&ProgressEvent::ClipDiscarded {
        path: output_dir.path().join("clip_030405.wav"),
        duration: secs(0.25),
    }));
    assert!(events.contains(&ProgressEvent::ClipKept {
        path: output_dir.path().join("clip_030406.wav"),
        duration: secs(1.0),
    }));
    assert_eq!(events.last(), Some(&ProgressEvent::Finished));

    assert_eq!(
        listing(output_dir.path())?,
        vec![output_dir.path().join("clip_030406.wav")]
    );

    output_dir.close()?;
    work_dir.close()?;
    Ok(())
}

#[test]
fn end_of_stream_closes_the_open_clip_once() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("input.wav");
    write_sections(
        &input_path,
        1,
        &[Section::Silence(secs(0.5)), Section::Tone(secs(2.0))],
    )?;

    let output_dir = tempdir()?;
    let template = output_dir.path().join("tail.wav");
    let config = Config::builder(InputSource::File(input_path), template.to_string_lossy())
        .run_length(secs(0.5))
        .slice_divisor(8.0)
        .build()?;

    let mut stops = 0;
    let mut last_state = None;
    let summary = run_with_progress(config, &mut |event: ProgressEvent| match event {
        ProgressEvent::ClipKept { duration, .. } => {
            stops += 1;
            assert_eq!(duration, secs(1.5));
        }
        ProgressEvent::Status(snapshot) => last_state = Some(snapshot.state),
        _ => {}
    })?;

    assert_eq!(stops, 1);
    assert_eq!(summary.clips_kept, 1);
    assert_eq!(summary.batches, 20);
    assert_eq!(last_state, Some(StreamState::Recording));

    let clip = fs::read(output_dir.path().join("tail.wav"))?;
    assert_eq!(u32_at(&clip, 40), 24_000);
    assert!(!output_dir.path().join("tail.wav.recording.wav").exists());

    output_dir.close()?;
    work_dir.close()?;
    Ok(())
}

#[test]
fn forced_stop_trim_can_keep_captured_audio() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("input.wav");
    write_sections(&input_path, 1, &[Section::Tone(secs(2.0))])?;

    let output_dir = tempdir()?;
    let template = output_dir.path().join("whole.wav");
    let config = Config::builder(InputSource::File(input_path), template.to_string_lossy())
        .run_length(secs(1.0))
        .slice_divisor(8.0)
        .forced_stop_trim(ForcedStopTrim::ObservedSilence)
        .build()?;
    run(config)?;

    let clip = fs::read(output_dir.path().join("whole.wav"))?;
    assert_eq!(u32_at(&clip, 40), 32_000);

    output_dir.close()?;
    work_dir.close()?;
    Ok(())
}

#[test]
fn cancellation_while_recording_processes_one_more_batch() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("input.wav");
    write_sections(
        &input_path,
        1,
        &[Section::Silence(secs(0.25)), Section::Tone(secs(5.0))],
    )?;

    let output_dir = tempdir()?;
    let template = output_dir.path().join("cancelled.wav");
    let token = CancellationToken::new();
    let config = Config::builder(InputSource::File(input_path), template.to_string_lossy())
        .run_length(secs(0.125))
        .slice_divisor(8.0)
        .forced_stop_trim(ForcedStopTrim::ObservedSilence)
        .cancellation(token.clone())
        .build()?;

    let summary = run_with_progress(config, &mut |event: ProgressEvent| {
        if let ProgressEvent::ClipStarted { .. } = event {
            token.cancel();
        }
    })?;

    assert_eq!(summary.batches, 4);
    assert_eq!(summary.clips_kept, 1);
    let clip = fs::read(output_dir.path().join("cancelled.wav"))?;
    assert_eq!(u32_at(&clip, 40), 4_000);

    output_dir.close()?;
    work_dir.close()?;
    Ok(())
}

#[test]
fn cancellation_while_idle_stops_immediately() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("input.wav");
    write_sections(&input_path, 1, &[Section::Tone(secs(1.0))])?;

    let output_dir = tempdir()?;
    let token = CancellationToken::new();
    token.cancel();
    let config = Config::builder(
        InputSource::File(input_path),
        output_dir.path().join("never.wav").to_string_lossy(),
    )
    .cancellation(token)
    .build()?;

    let summary = run(config)?;
    assert_eq!(summary.batches, 0);
    assert!(listing(output_dir.path())?.is_empty());

    output_dir.close()?;
    work_dir.close()?;
    Ok(())
}

#[test]
fn run_creates_missing_output_directories() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("input.wav");
    write_sections(
        &input_path,
        1,
        &[Section::Tone(secs(1.0)), Section::Silence(secs(1.0))],
    )?;

    let output_dir = tempdir()?;
    let template = output_dir.path().join("%Y").join("%m").join("clip.wav");
    let config = Config::builder(InputSource::File(input_path), template.to_string_lossy())
        .run_length(secs(0.5))
        .slice_divisor(8.0)
        .start_time(Some(fixed_start()))
        .build()?;
    run(config)?;

    assert!(output_dir.path().join("2000").join("01").join("clip.wav").is_file());

    output_dir.close()?;
    work_dir.close()?;
    Ok(())
}

#[test]
fn run_rejects_stereo_input() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("stereo.wav");
    write_sections(&input_path, 2, &[Section::Tone(secs(0.5))])?;

    let config = Config::new(InputSource::File(input_path), "never.wav")?;
    let err = run(config).expect_err("stereo input should fail");
    assert!(matches!(
        err,
        SilenceSplitError::Container(ContainerError::Unsupported { channels: 2, .. })
    ));

    work_dir.close()?;
    Ok(())
}

#[test]
fn run_reports_unknown_input() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("input.bin");
    File::create(&input_path)?.write_all(b"not an audio file")?;

    let config = Config::new(InputSource::File(input_path), "never.wav")?;
    let err = run(config).expect_err("unknown input should fail");
    assert!(matches!(
        err,
        SilenceSplitError::Container(ContainerError::NotRiff { .. })
    ));

    work_dir.close()?;
    Ok(())
}

#[test]
fn run_reports_missing_input_file() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let config = Config::new(
        InputSource::File(work_dir.path().join("missing.wav")),
        "never.wav",
    )?;
    let err = run(config).expect_err("missing input should fail");
    assert!(matches!(err, SilenceSplitError::Io(_)));

    work_dir.close()?;
    Ok(())
}

/// Serves its bytes, then fails every read as if the pipe had closed.
struct BreaksAfter(Cursor<Vec<u8>>);

impl Read for BreaksAfter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0.read(buf)? {
            0 => Err(io::Error::new(io::ErrorKind::BrokenPipe, "input went away")),
            n => Ok(n),
        }
    }
}

#[test]
fn read_error_while_recording_closes_the_clip_and_fails() -> Result<(), Box<dyn Error>> {
    // Header announcing two seconds, followed by a single loud batch.
    let mut bytes = encode_wave_header(&WaveFormat::pcm_mono_16(SAMPLE_RATE), 36 + 32_000, 32_000)
        .to_vec();
    for n in 0..SAMPLE_RATE / 8 {
        let theta = (n as f32 / SAMPLE_RATE as f32) * 2.0 * std::f32::consts::PI * 440.0;
        bytes.extend_from_slice(&((theta.sin() * i16::MAX as f32) as i16).to_le_bytes());
    }
    let reader = SampleReader::new(BreaksAfter(Cursor::new(bytes)))?;

    let output_dir = tempdir()?;
    let template = output_dir.path().join("broken.wav");
    let config = Config::builder(InputSource::Stdin, template.to_string_lossy())
        .run_length(secs(1.0))
        .slice_divisor(8.0)
        .forced_stop_trim(ForcedStopTrim::ObservedSilence)
        .build()?;

    let mut events = Vec::new();
    let result = run_reader(
        config,
        reader,
        &LocalDirectories,
        &mut |event: ProgressEvent| {
            if !matches!(event, ProgressEvent::Status(_)) {
                events.push(event);
            }
        },
    );

    match result {
        Err(SilenceSplitError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::BrokenPipe),
        other => panic!("expected the read error, got {other:?}"),
    }
    assert!(events
        .iter()
        .any(|event| matches!(event, ProgressEvent::Warning { .. })));
    assert!(events.contains(&ProgressEvent::ClipKept {
        path: template.clone(),
        duration: secs(0.125),
    }));
    assert!(!events.contains(&ProgressEvent::Finished));

    let clip = fs::read(&template)?;
    assert_eq!(u32_at(&clip, 40), 2_000);
    assert_eq!(u32_at(&clip, 4) as usize, clip.len() - 8);
    assert!(!output_dir.path().join("broken.wav.recording.wav").exists());

    output_dir.close()?;
    Ok(())
}

#[test]
fn failed_rename_leaves_the_clip_and_keeps_running() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("input.wav");
    write_sections(
        &input_path,
        1,
        &[
            Section::Tone(secs(0.5)),
            Section::Silence(secs(1.0)),
            Section::Tone(secs(0.5)),
            Section::Silence(secs(1.0)),
        ],
    )?;

    // The final name is taken by a non-empty directory, so the rename fails.
    let output_dir = tempdir()?;
    let blocked = output_dir.path().join("o.wav");
    fs::create_dir(&blocked)?;
    fs::write(blocked.join("occupant"), b"keep")?;

    let config = Config::builder(InputSource::File(input_path), blocked.to_string_lossy())
        .run_length(secs(0.5))
        .slice_divisor(8.0)
        .build()?;

    let mut warnings = Vec::new();
    let summary = run_with_progress(config, &mut |event: ProgressEvent| {
        if let ProgressEvent::Warning { message } = event {
            warnings.push(message);
        }
    })?;

    assert_eq!(summary.clips_kept, 0);
    assert_eq!(summary.clips_stranded, 2);
    assert_eq!(warnings.len(), 2);
    assert!(warnings
        .iter()
        .all(|message| message.contains("clip left at")));
    assert!(output_dir.path().join("o.wav.recording.wav").is_file());
    assert!(blocked.join("occupant").is_file());

    output_dir.close()?;
    work_dir.close()?;
    Ok(())
}
