//! HH:MM:SS parsing and formatting for timer durations

use crate::state::timer_state::TimerError;

/// Parse a `"HH:MM:SS"` string into a total number of seconds.
///
/// The field values are not range-limited beyond being unsigned integers,
/// so `"00:90:00"` is ninety minutes. Anything that is not three
/// colon-separated numeric fields is an input-format error.
pub fn parse_hms(input: &str) -> Result<u64, TimerError> {
    let trimmed = input.trim();
    let fields: Vec<&str> = trimmed.split(':').collect();

    if fields.len() != 3 {
        return Err(TimerError::InvalidDuration(format!(
            "expected HH:MM:SS, got '{}'",
            trimmed
        )));
    }

    let mut parts = [0u64; 3];
    for (i, field) in fields.iter().enumerate() {
        parts[i] = field.parse::<u64>().map_err(|_| {
            TimerError::InvalidDuration(format!("'{}' is not a number in '{}'", field, trimmed))
        })?;
    }

    Ok(parts[0] * 3600 + parts[1] * 60 + parts[2])
}

/// Format a number of seconds as a zero-padded `"HH:MM:SS"` string.
pub fn format_hms(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats_round_numbers() {
        let pairs = vec![
            ("00:00:05", 5),
            ("00:01:00", 60),
            ("00:02:34", 154),
            ("01:00:03", 3603),
            ("10:00:00", 36000),
        ];

        for (text, seconds) in pairs {
            assert_eq!(parse_hms(text).unwrap(), seconds);
            assert_eq!(format_hms(seconds), text);
        }
    }

    #[test]
    fn accepts_unnormalized_fields() {
        assert_eq!(parse_hms("00:90:00").unwrap(), 5400);
        assert_eq!(parse_hms("0:5:0").unwrap(), 300);
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["", "90", "1:30", "aa:bb:cc", "1:2:3:4", "01:-1:00"] {
            assert!(parse_hms(bad).is_err(), "should reject '{}'", bad);
        }
    }

    #[test]
    fn formats_hours_past_two_digits() {
        assert_eq!(format_hms(100 * 3600), "100:00:00");
    }
}
