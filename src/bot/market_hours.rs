//! Trading window: when cycles may run, evaluated in the exchange timezone.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Daily eligibility window. Times are `HH:MM:SS` in `timezone`, inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketHours {
    pub timezone: Tz,
    pub open: NaiveTime,
    pub close: NaiveTime,
    /// Skip Saturdays and Sundays
    pub weekdays_only: bool,
}

impl Default for MarketHours {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::America::New_York,
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default(),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or_default(),
            weekdays_only: true,
        }
    }
}

impl MarketHours {
    pub fn validate(&self) -> Result<(), String> {
        if self.open >= self.close {
            return Err(format!(
                "market open ({}) must be before close ({})",
                self.open, self.close
            ));
        }
        Ok(())
    }

    fn trades_on(&self, day: Weekday) -> bool {
        !(self.weekdays_only && matches!(day, Weekday::Sat | Weekday::Sun))
    }
}

/// Whether a cycle may start at `now`.
pub fn is_eligible(now: DateTime<Utc>, hours: &MarketHours) -> bool {
    let local = now.with_timezone(&hours.timezone);
    if !hours.trades_on(local.weekday()) {
        return false;
    }
    let time = local.time();
    time >= hours.open && time <= hours.close
}

/// The next instant the window opens, or `now` if it is open already.
pub fn next_open(now: DateTime<Utc>, hours: &MarketHours) -> DateTime<Utc> {
    if is_eligible(now, hours) {
        return now;
    }

    let today = now.with_timezone(&hours.timezone).date_naive();
    for offset in 0..=7 {
        let date = today + Duration::days(offset);
        if !hours.trades_on(date.weekday()) {
            continue;
        }
        // None only inside a DST gap; try the next day
        let Some(open) = hours
            .timezone
            .from_local_datetime(&date.and_time(hours.open))
            .earliest()
        else {
            continue;
        };
        let open = open.with_timezone(&Utc);
        if open > now {
            return open;
        }
    }

    now + Duration::days(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(day: u32, hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, min, 0).unwrap()
    }

    #[test]
    fn test_weekday_window_boundaries() {
        let hours = MarketHours::default();
        // Monday 2 March 2026, EST (UTC-5)
        assert!(!is_eligible(utc(2, 14, 29), &hours)); // 09:29
        assert!(is_eligible(utc(2, 14, 30), &hours)); // 09:30
        assert!(is_eligible(utc(2, 21, 0), &hours)); // 16:00
        assert!(!is_eligible(utc(2, 21, 1), &hours)); // 16:01
    }

    #[test]
    fn test_weekend_is_closed() {
        let hours = MarketHours::default();
        // Saturday 7 March, 11:00 EST
        assert!(!is_eligible(utc(7, 16, 0), &hours));

        let always = MarketHours {
            weekdays_only: false,
            ..MarketHours::default()
        };
        assert!(is_eligible(utc(7, 16, 0), &always));
    }

    #[test]
    fn test_dst_shift() {
        let hours = MarketHours::default();
        // Friday 6 March: EST, so 13:30 UTC is 08:30 local
        assert!(!is_eligible(utc(6, 13, 30), &hours));
        // Monday 9 March: EDT, so 13:30 UTC is 09:30 local
        assert!(is_eligible(utc(9, 13, 30), &hours));
    }

    #[test]
    fn test_next_open_over_weekend_and_dst() {
        let hours = MarketHours::default();
        // Friday 6 March 17:00 EST -> Monday 9 March 09:30 EDT
        assert_eq!(next_open(utc(6, 22, 0), &hours), utc(9, 13, 30));
    }

    #[test]
    fn test_next_open_same_day_and_now() {
        let hours = MarketHours::default();
        // Monday 08:00 EST -> 09:30 EST same day
        assert_eq!(next_open(utc(2, 13, 0), &hours), utc(2, 14, 30));
        // Already open
        assert_eq!(next_open(utc(2, 15, 0), &hours), utc(2, 15, 0));
    }

    #[test]
    fn test_parse_from_json() {
        let hours: MarketHours = serde_json::from_str(
            r#"{"timezone": "Europe/London", "open": "08:00:00", "close": "16:30:00"}"#,
        )
        .unwrap();
        assert_eq!(hours.timezone, chrono_tz::Europe::London);
        assert!(hours.weekdays_only);
        assert!(hours.validate().is_ok());

        assert!(serde_json::from_str::<MarketHours>(r#"{"timezone": "Mars/Olympus"}"#).is_err());
    }
}
