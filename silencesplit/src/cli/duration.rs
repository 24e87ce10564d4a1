use std::time::Duration;

use thiserror::Error;

/// Parse a duration given either as bare seconds or as unit-suffixed components.
///
/// # Grammar
///
/// ```text
/// duration  = seconds | component { component } ;
/// seconds   = number ;
/// component = number unit ;
/// number    = digits [ "." digits ] ;
/// unit      = "ms" | "s" | "m" | "h" ;
/// ```
///
/// `"4"`, `"0.5"`, `"500ms"` and `"1m30s"` are all accepted. A unit may only
/// appear once. Zero is allowed; callers that need a positive value check it.
pub fn parse_duration(value: &str) -> Result<Duration, DurationParseError> {
    let input = value.trim();
    if input.is_empty() {
        return Err(DurationParseError::Empty);
    }

    let bytes = input.as_bytes();
    let (number, consumed) = parse_number(bytes, 0)?;
    if consumed == bytes.len() {
        return to_duration(number);
    }

    let mut index = 0;
    let mut seen = [false; Unit::ALL.len()];
    let mut total = 0.0;
    while index < bytes.len() {
        let (number, consumed) = parse_number(bytes, index)?;
        index += consumed;

        let (unit, unit_len) = parse_unit(input, index)?;
        index += unit_len;

        if std::mem::replace(&mut seen[unit as usize], true) {
            return Err(DurationParseError::DuplicateUnit {
                unit: unit.symbol(),
            });
        }
        total += number * unit.seconds();
    }

    to_duration(total)
}

fn to_duration(seconds: f64) -> Result<Duration, DurationParseError> {
    Duration::try_from_secs_f64(seconds).map_err(|_| DurationParseError::TooLarge)
}

fn parse_number(bytes: &[u8], start: usize) -> Result<(f64, usize), DurationParseError> {
    let digits = |from: usize| {
        bytes[from..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count()
    };

    let whole = digits(start);
    let mut end = start + whole;
    if bytes.get(end) == Some(&b'.') {
        let fraction = digits(end + 1);
        if fraction == 0 {
            return Err(if whole == 0 {
                DurationParseError::ExpectedNumber { position: start + 1 }
            } else {
                DurationParseError::MissingFractionDigits { position: end + 1 }
            });
        }
        end += 1 + fraction;
    } else if whole == 0 {
        return Err(DurationParseError::ExpectedNumber { position: start + 1 });
    }

    std::str::from_utf8(&bytes[start..end])
        .ok()
        .and_then(|text| text.parse::<f64>().ok())
        .map(|number| (number, end - start))
        .ok_or(DurationParseError::ExpectedNumber { position: start + 1 })
}

fn parse_unit(input: &str, index: usize) -> Result<(Unit, usize), DurationParseError> {
    let remaining = &input[index..];
    if let Some(unit) = Unit::ALL
        .into_iter()
        .find(|unit| remaining.starts_with(unit.symbol()))
    {
        return Ok((unit, unit.symbol().len()));
    }

    let word: String = remaining
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect();
    if word.is_empty() {
        Err(DurationParseError::ExpectedUnit { position: index + 1 })
    } else {
        Err(DurationParseError::UnknownUnit {
            position: index + 1,
            unit: word,
        })
    }
}

/// Positions are 1-based character offsets into the trimmed input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    #[error("duration cannot be empty")]
    Empty,
    #[error("expected a number at position {position}")]
    ExpectedNumber { position: usize },
    #[error("expected one of ms, s, m or h at position {position}")]
    ExpectedUnit { position: usize },
    #[error("unknown unit '{unit}' at position {position}")]
    UnknownUnit { position: usize, unit: String },
    #[error("unit '{unit}' is given more than once")]
    DuplicateUnit { unit: &'static str },
    #[error("missing digits after the decimal point at position {position}")]
    MissingFractionDigits { position: usize },
    #[error("duration is too large")]
    TooLarge,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
enum Unit {
    Millisecond = 0,
    Second = 1,
    Minute = 2,
    Hour = 3,
}

impl Unit {
    /// `ms` must be tried before `m`.
    const ALL: [Unit; 4] = [Unit::Millisecond, Unit::Second, Unit::Minute, Unit::Hour];

    fn seconds(self) -> f64 {
        match self {
            Unit::Millisecond => 0.001,
            Unit::Second => 1.0,
            Unit::Minute => 60.0,
            Unit::Hour => 3_600.0,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Unit::Millisecond => "ms",
            Unit::Second => "s",
            Unit::Minute => "m",
            Unit::Hour => "h",
        }
    }
}
