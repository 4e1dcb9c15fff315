//! Wall-clock time-of-day value type.
//!
//! Items store their daily fire time as a short string (`"22:55"` or
//! `"22:55:30"`). Both the HTTP validation path and the trigger registry parse
//! that string through this one type, so an item that was accepted at creation
//! time can never fail to register later for a different reason.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VigilError;

/// A normalized (hour, minute, second) wall-clock triple. No date, no
/// timezone offset; local time by convention, matching the stored schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl TimeOfDay {
    /// Construct a validated triple. `hour` 0–23, `minute`/`second` 0–59.
    pub fn new(hour: u8, minute: u8, second: u8) -> Result<Self, VigilError> {
        if hour > 23 || minute > 59 || second > 59 {
            return Err(VigilError::InvalidTimeOfDay {
                value: format!("{hour:02}:{minute:02}:{second:02}"),
                reason: "component out of range".to_string(),
            });
        }
        Ok(Self {
            hour,
            minute,
            second,
        })
    }

    /// Seconds since midnight, handy for ordering and duration math.
    pub fn seconds_from_midnight(&self) -> u32 {
        self.hour as u32 * 3600 + self.minute as u32 * 60 + self.second as u32
    }
}

impl FromStr for TimeOfDay {
    type Err = VigilError;

    /// Parse `HH:MM` or `HH:MM:SS`; the seconds field defaults to 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| VigilError::InvalidTimeOfDay {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        if s.trim().is_empty() {
            return Err(invalid("empty input"));
        }

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 2 && parts.len() != 3 {
            return Err(invalid("expected HH:MM or HH:MM:SS"));
        }

        let mut nums = [0u8; 3];
        for (i, part) in parts.iter().enumerate() {
            // Reject "1 2:30", "+1:30" and similar. Only ASCII digits allowed.
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("fields must be decimal digits"));
            }
            nums[i] = part.parse().map_err(|_| invalid("field out of range"))?;
        }

        Self::new(nums[0], nums[1], nums[2]).map_err(|_| invalid("component out of range"))
    }
}

impl fmt::Display for TimeOfDay {
    /// Canonical form is always `HH:MM:SS`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = VigilError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> String {
        t.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hh_mm() {
        let t: TimeOfDay = "22:55".parse().expect("parse failed");
        assert_eq!((t.hour, t.minute, t.second), (22, 55, 0));
    }

    #[test]
    fn parses_hh_mm_ss() {
        let t: TimeOfDay = "09:00:30".parse().expect("parse failed");
        assert_eq!((t.hour, t.minute, t.second), (9, 0, 30));
    }

    #[test]
    fn rejects_out_of_range_hour() {
        assert!("24:00".parse::<TimeOfDay>().is_err());
        assert!("23:60".parse::<TimeOfDay>().is_err());
        assert!("23:00:60".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn rejects_wrong_separators() {
        assert!("22.55".parse::<TimeOfDay>().is_err());
        assert!("22-55".parse::<TimeOfDay>().is_err());
        assert!("22:55:00:00".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert!("".parse::<TimeOfDay>().is_err());
        assert!("  ".parse::<TimeOfDay>().is_err());
        assert!("ab:cd".parse::<TimeOfDay>().is_err());
        assert!("2 2:30".parse::<TimeOfDay>().is_err());
        assert!(":30".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn display_is_canonical() {
        let t: TimeOfDay = "7:5".parse().expect("parse failed");
        assert_eq!(t.to_string(), "07:05:00");
    }

    #[test]
    fn seconds_from_midnight_ordering() {
        let a: TimeOfDay = "09:00".parse().unwrap();
        let b: TimeOfDay = "22:55".parse().unwrap();
        assert!(a.seconds_from_midnight() < b.seconds_from_midnight());
    }
}
