//! Timestamp parsing utilities.
//!
//! Trim points arrive either as bare seconds (`45.5`) or as `MM:SS`
//! (`01:30`). Anything else is rejected.

/// Parse a timestamp string to total seconds.
///
/// # Examples
/// ```
/// use audiotk_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("01:30").unwrap(), 90.0);
/// assert_eq!(parse_timestamp("45.5").unwrap(), 45.5);
/// assert!(parse_timestamp("abc").is_err());
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    if let Some((minutes, seconds)) = ts.split_once(':') {
        // MM:SS with exactly two second digits
        if minutes.is_empty()
            || seconds.len() != 2
            || !minutes.bytes().all(|b| b.is_ascii_digit())
            || !seconds.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(TimestampError::InvalidFormat(ts.to_string()));
        }
        let minutes: f64 = minutes
            .parse()
            .map_err(|_| TimestampError::InvalidValue("minutes", minutes.to_string()))?;
        let seconds: f64 = seconds
            .parse()
            .map_err(|_| TimestampError::InvalidValue("seconds", seconds.to_string()))?;
        return Ok(minutes * 60.0 + seconds);
    }

    let seconds: f64 = ts
        .parse()
        .map_err(|_| TimestampError::InvalidFormat(ts.to_string()))?;
    if !seconds.is_finite() {
        return Err(TimestampError::InvalidFormat(ts.to_string()));
    }
    Ok(seconds)
}

/// Format seconds into HH:MM:SS or HH:MM:SS.mmm string.
pub fn format_seconds(total_secs: f64) -> String {
    let total_secs = total_secs.max(0.0);
    let hours = (total_secs / 3600.0).floor() as u32;
    let mins = ((total_secs % 3600.0) / 60.0).floor() as u32;
    let secs = total_secs % 60.0;

    if (secs - secs.floor()).abs() > 0.0001 {
        format!("{:02}:{:02}:{:06.3}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hours, mins, secs.floor() as u32)
    }
}

/// Timestamp parsing error.
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampError {
    /// Timestamp string is empty
    Empty,
    /// Invalid numeric value for a component
    InvalidValue(&'static str, String),
    /// Neither seconds nor MM:SS
    InvalidFormat(String),
}

impl std::fmt::Display for TimestampError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Timestamp cannot be empty"),
            Self::InvalidValue(component, value) => {
                write!(f, "Invalid {} value: {}", component, value)
            }
            Self::InvalidFormat(ts) => write!(
                f,
                "Invalid timestamp format: {}. Use seconds (e.g., '90') or MM:SS (e.g., '1:30')",
                ts
            ),
        }
    }
}

impl std::error::Error for TimestampError {}
