//! Provider durations arrive as ISO-8601 strings (`PT2H30M`, `P1DT2H`).
//! Itinerary rows store whole minutes.

const MINUTES_PER_DAY: i64 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    #[error("duration must start with 'P': {0}")]
    MissingDesignator(String),
    #[error("duration has no components: {0}")]
    Empty(String),
    #[error("unexpected '{unit}' in duration {raw}")]
    UnexpectedUnit { raw: String, unit: char },
    #[error("number without unit in duration {0}")]
    DanglingNumber(String),
    #[error("malformed number in duration {0}")]
    InvalidNumber(String),
    #[error("duration out of range: {0}")]
    Overflow(String),
}

/// Converts an ISO-8601 duration to whole minutes.
///
/// Missing components count as zero and seconds are truncated away, so
/// `PT45M` is 45, `PT2H` is 120 and `PT1M59S` is 1.
pub fn parse_duration_minutes(raw: &str) -> Result<i32, DurationError> {
    let body = raw
        .strip_prefix('P')
        .ok_or_else(|| DurationError::MissingDesignator(raw.to_string()))?;

    let mut minutes: i64 = 0;
    let mut in_time = false;
    let mut components = 0;
    let mut number = String::new();

    for ch in body.chars() {
        if ch.is_ascii_digit() || ch == '.' {
            number.push(ch);
            continue;
        }

        if ch == 'T' && !in_time && number.is_empty() {
            in_time = true;
            continue;
        }

        if number.is_empty() {
            return Err(DurationError::UnexpectedUnit { raw: raw.to_string(), unit: ch });
        }

        let value: f64 = number
            .parse()
            .map_err(|_| DurationError::InvalidNumber(raw.to_string()))?;
        number.clear();

        let factor = match (in_time, ch) {
            (false, 'W') => 7.0 * MINUTES_PER_DAY as f64,
            (false, 'D') => MINUTES_PER_DAY as f64,
            (true, 'H') => 60.0,
            (true, 'M') => 1.0,
            (true, 'S') => 1.0 / 60.0,
            _ => return Err(DurationError::UnexpectedUnit { raw: raw.to_string(), unit: ch }),
        };

        components += 1;
        let scaled = (value * factor * 1000.0).round();
        if !scaled.is_finite() || scaled >= i64::MAX as f64 {
            return Err(DurationError::Overflow(raw.to_string()));
        }
        minutes = minutes
            .checked_add(scaled as i64)
            .ok_or_else(|| DurationError::Overflow(raw.to_string()))?;
    }

    if !number.is_empty() {
        return Err(DurationError::DanglingNumber(raw.to_string()));
    }
    if components == 0 {
        return Err(DurationError::Empty(raw.to_string()));
    }

    // accumulated in thousandths of a minute; floor drops the seconds
    i32::try_from(minutes / 1000).map_err(|_| DurationError::Overflow(raw.to_string()))
}
