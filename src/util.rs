// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::fmt::{self, Write as _};
use std::str::FromStr;
use std::time::Duration;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const MS: u64 = 1;
const SECOND: u64 = 1000 * MS;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// A duration that reads and writes as a human friendly string such as
/// `"100ms"`, `"30m"` or `"1h30m"` in configuration files.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ReadableDuration(pub Duration);

impl From<ReadableDuration> for Duration {
    fn from(readable: ReadableDuration) -> Duration {
        readable.0
    }
}

impl ReadableDuration {
    pub const fn millis(millis: u64) -> ReadableDuration {
        ReadableDuration(Duration::from_millis(millis))
    }

    pub const fn secs(secs: u64) -> ReadableDuration {
        ReadableDuration(Duration::from_secs(secs))
    }

    pub const fn minutes(minutes: u64) -> ReadableDuration {
        ReadableDuration::secs(minutes * 60)
    }

    pub const fn hours(hours: u64) -> ReadableDuration {
        ReadableDuration::minutes(hours * 60)
    }

    pub fn as_secs(&self) -> u64 {
        self.0.as_secs()
    }

    pub fn as_millis(&self) -> u64 {
        self.0.as_millis() as u64
    }

    pub fn is_zero(&self) -> bool {
        self.0.as_nanos() == 0
    }
}

impl FromStr for ReadableDuration {
    type Err = String;

    fn from_str(dur_str: &str) -> Result<ReadableDuration, String> {
        let dur_str = dur_str.trim();
        if dur_str.is_empty() || !dur_str.is_ascii() {
            return Err(format!("{:?} is not a valid duration", dur_str));
        }
        let mut total = 0f64;
        let mut last_unit = u64::MAX;
        let mut rest = dur_str;
        while !rest.is_empty() {
            let number_len = rest
                .find(|c: char| !c.is_ascii_digit() && c != '.')
                .ok_or_else(|| format!("{:?} misses a time unit", dur_str))?;
            let (number, tail) = rest.split_at(number_len);
            let (unit, tail) = if let Some(t) = tail.strip_prefix("ms") {
                (MS, t)
            } else if let Some(t) = tail.strip_prefix('d') {
                (DAY, t)
            } else if let Some(t) = tail.strip_prefix('h') {
                (HOUR, t)
            } else if let Some(t) = tail.strip_prefix('m') {
                (MINUTE, t)
            } else if let Some(t) = tail.strip_prefix('s') {
                (SECOND, t)
            } else {
                return Err(format!(
                    "only d, h, m, s and ms units are supported: {:?}",
                    dur_str
                ));
            };
            if unit >= last_unit {
                return Err("d, h, m, s, ms must occur in descending order".to_owned());
            }
            last_unit = unit;
            let number: f64 = number
                .parse()
                .map_err(|_| format!("{:?} is not a valid duration", dur_str))?;
            total += number * unit as f64;
            rest = tail;
        }
        if total.is_sign_negative() {
            return Err("duration must be positive".to_owned());
        }
        Ok(ReadableDuration(Duration::from_millis(total as u64)))
    }
}

impl fmt::Display for ReadableDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest = self.as_millis();
        let mut written = false;
        for (unit, name) in [(DAY, "d"), (HOUR, "h"), (MINUTE, "m"), (SECOND, "s")] {
            if rest >= unit {
                write!(f, "{}{}", rest / unit, name)?;
                rest %= unit;
                written = true;
            }
        }
        if rest > 0 {
            write!(f, "{}ms", rest)?;
            written = true;
        }
        if !written {
            write!(f, "0s")?;
        }
        Ok(())
    }
}

impl Serialize for ReadableDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut buffer = String::new();
        write!(buffer, "{}", self).unwrap();
        serializer.serialize_str(&buffer)
    }
}

impl<'de> Deserialize<'de> for ReadableDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurVisitor;

        impl<'de> Visitor<'de> for DurVisitor {
            type Value = ReadableDuration;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("valid duration")
            }

            fn visit_str<E>(self, dur_str: &str) -> Result<ReadableDuration, E>
            where
                E: de::Error,
            {
                dur_str.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(DurVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_construction() {
        let mut dur = ReadableDuration::secs(1);
        assert_eq!(dur.0, Duration::new(1, 0));
        assert_eq!(dur.as_secs(), 1);
        assert_eq!(dur.as_millis(), 1000);
        dur = ReadableDuration::millis(1001);
        assert_eq!(dur.0, Duration::new(1, 1_000_000));
        assert_eq!(dur.as_secs(), 1);
        assert_eq!(dur.as_millis(), 1001);
        dur = ReadableDuration::minutes(2);
        assert_eq!(dur.0, Duration::new(2 * 60, 0));
        dur = ReadableDuration::hours(2);
        assert_eq!(dur.0, Duration::new(2 * 3600, 0));
        assert!(!dur.is_zero());
        assert!(ReadableDuration::secs(0).is_zero());
    }

    #[test]
    fn test_parse_duration() {
        let legal_cases = vec![
            (0, 0, "0s"),
            (0, 1, "1ms"),
            (2, 0, "2s"),
            (24 * 3600, 0, "1d"),
            (2 * 24 * 3600, 10, "2d10ms"),
            (4 * 60, 0, "4m"),
            (5 * 3600, 0, "5h"),
            (3600 + 2 * 60, 0, "1h2m"),
            (3600 + 2, 5, "1h2s5ms"),
        ];
        for (secs, ms, exp) in legal_cases {
            let d = ReadableDuration(Duration::new(secs, ms * 1_000_000));
            let text = format!("{}", d);
            assert_eq!(text, exp);
            assert_eq!(exp.parse::<ReadableDuration>().unwrap(), d);
        }

        // Fractional numbers parse but render in whole units.
        assert_eq!(
            "1.5h1.5s".parse::<ReadableDuration>().unwrap(),
            ReadableDuration(Duration::new(5401, 500 * 1_000_000))
        );

        let illegal_cases = vec!["1H", "1m1d", "1ms1s", "1", "s", "", "2fooms"];
        for case in illegal_cases {
            assert!(case.parse::<ReadableDuration>().is_err(), "{:?}", case);
        }
    }

    #[test]
    fn test_duration_serde() {
        #[derive(Serialize, Deserialize)]
        struct Holder {
            d: ReadableDuration,
        }
        let holder = Holder {
            d: ReadableDuration::minutes(30),
        };
        let text = serde_json::to_string(&holder).unwrap();
        assert_eq!(text, r#"{"d":"30m"}"#);
        let back: Holder = serde_json::from_str(&text).unwrap();
        assert_eq!(back.d, holder.d);
    }
}
