use chrono::{DateTime, Utc};

use crate::error::{GlbError, Result};

/// Request latency as reported by the load balancer, e.g. `"0.123s"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Latency {
    seconds: f64,
}

impl Latency {
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.strip_suffix('s').unwrap_or(input);
        let seconds: f64 = raw
            .parse()
            .map_err(|e| GlbError::BadDuration(format!("{input:?}: {e}")))?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(GlbError::BadDuration(format!(
                "{input:?}: expected a finite, non-negative number of seconds"
            )));
        }
        Ok(Self { seconds })
    }

    pub fn as_millis_f64(self) -> f64 {
        self.seconds * 1000.0
    }

    pub fn to_chrono(self) -> Result<chrono::Duration> {
        let nanos = (self.seconds * 1e9).round();
        if nanos > i64::MAX as f64 {
            return Err(GlbError::BadDuration(format!(
                "{}s does not fit in a time span",
                self.seconds
            )));
        }
        Ok(chrono::Duration::nanoseconds(nanos as i64))
    }

    /// Start of a request that ended at `end`.
    pub fn start_before(self, end: DateTime<Utc>) -> Result<DateTime<Utc>> {
        end.checked_sub_signed(self.to_chrono()?).ok_or_else(|| {
            GlbError::BadDuration(format!("{}s before {end} is out of range", self.seconds))
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn parses_suffixed_latency() {
        let latency = Latency::parse("0.123s").unwrap();
        assert!((latency.as_millis_f64() - 123.0).abs() < 1e-9);
        assert_eq!(Latency::parse("2").unwrap().as_millis_f64(), 2000.0);
        assert_eq!(Latency::parse("0s").unwrap().as_millis_f64(), 0.0);
    }

    #[test]
    fn rejects_bad_latency() {
        for bad in ["", "s", "fast", "1.5ms", "-1s", "NaNs", "infs", "1,5s"] {
            assert!(
                matches!(Latency::parse(bad), Err(GlbError::BadDuration(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn start_keeps_fractional_seconds() {
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 10).unwrap();
        let start = Latency::parse("2.5s").unwrap().start_before(end).unwrap();
        assert_eq!(start.to_rfc3339(), "2024-01-01T00:00:07.500+00:00");
    }

    #[test]
    fn rejects_out_of_range_start() {
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 10).unwrap();
        assert!(Latency::parse("1e300s").unwrap().start_before(end).is_err());
    }
}
