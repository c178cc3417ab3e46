//! Repeat policy encoding.
//!
//! A policy is a single byte. With the high bit set, the low seven bits are
//! a fixed interval in days (`0x80 | 3` = every three days). With the high
//! bit clear, the low seven bits are a weekday mask, Sunday = bit 0 through
//! Saturday = bit 6.

use chrono::Weekday;
use serde::{Deserialize, Serialize};

const INTERVAL_FLAG: u8 = 0b1000_0000;
const LOW_BITS: u8 = 0b0111_1111;
const SUNDAY: u8 = 0b000_0001;
const SATURDAY: u8 = 0b100_0000;

/// 8-bit repeat policy; `0` means the entry does not recur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecurrencePolicy(u8);

impl RecurrencePolicy {
    pub const NONE: Self = Self(0);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Fixed cadence of `days` days (clamped to 127).
    pub fn every_days(days: u8) -> Self {
        Self(INTERVAL_FLAG | (days & LOW_BITS))
    }

    /// Recurs on each of the given weekdays.
    pub fn weekly(days: &[Weekday]) -> Self {
        Self(days.iter().fold(0, |mask, day| mask | weekday_bit(*day)))
    }

    /// Whether `days_until_next` can be non-zero. A bare interval flag
    /// (`0x80`) does not repeat.
    pub fn is_repeating(self) -> bool {
        self.0 & LOW_BITS != 0
    }

    pub fn is_interval(self) -> bool {
        self.0 & INTERVAL_FLAG == INTERVAL_FLAG
    }

    /// Days from an occurrence on `reference` to the next one.
    ///
    /// Returns 0 for a non-repeating or malformed policy; callers treat 0 as
    /// "does not repeat".
    pub fn days_until_next(self, reference: Weekday) -> u32 {
        if self.0 == 0 {
            return 0;
        }
        if self.is_interval() {
            return u32::from(self.0 & LOW_BITS);
        }

        let mut day = weekday_bit(reference);
        if self.0 & day == day {
            return 7;
        }
        for offset in 1..7 {
            day = if day == SATURDAY { SUNDAY } else { day << 1 };
            if self.0 & day == day {
                return offset;
            }
        }
        0
    }

    /// Weekdays present in the mask, Sunday first. Empty for interval policies.
    pub fn weekdays(self) -> Vec<Weekday> {
        if self.is_interval() {
            return Vec::new();
        }
        [
            Weekday::Sun,
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
        ]
        .into_iter()
        .filter(|d| self.0 & weekday_bit(*d) != 0)
        .collect()
    }
}

impl From<u8> for RecurrencePolicy {
    fn from(bits: u8) -> Self {
        Self(bits)
    }
}

impl std::fmt::Display for RecurrencePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 == 0 {
            return write!(f, "once");
        }
        if self.is_interval() {
            return match self.0 & LOW_BITS {
                1 => write!(f, "every day"),
                n => write!(f, "every {n} days"),
            };
        }
        let names: Vec<String> = self.weekdays().iter().map(|d| d.to_string()).collect();
        write!(f, "weekly on {}", names.join(", "))
    }
}

fn weekday_bit(day: Weekday) -> u8 {
    1 << day.num_days_from_sunday()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_DAYS: [Weekday; 7] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];

    #[test]
    fn test_non_repeating_is_zero() {
        for day in ALL_DAYS {
            assert_eq!(RecurrencePolicy::NONE.days_until_next(day), 0);
        }
    }

    #[test]
    fn test_interval_ignores_reference_day() {
        for n in 1..=127u8 {
            let policy = RecurrencePolicy::from_bits(0x80 | n);
            for day in ALL_DAYS {
                assert_eq!(policy.days_until_next(day), u32::from(n));
            }
        }
    }

    #[test]
    fn test_same_weekday_wins() {
        // Every mask that contains the reference day itself
        for mask in 1..=0x7Fu8 {
            for day in ALL_DAYS {
                if mask & weekday_bit(day) != 0 {
                    let policy = RecurrencePolicy::from_bits(mask);
                    assert_eq!(policy.days_until_next(day), 7, "mask {mask:#09b} on {day}");
                }
            }
        }
    }

    #[test]
    fn test_tuesday_thursday_from_monday() {
        let policy = RecurrencePolicy::weekly(&[Weekday::Tue, Weekday::Thu]);
        assert_eq!(policy.bits(), 0b001_0100);
        assert_eq!(policy.days_until_next(Weekday::Mon), 1);
        assert_eq!(policy.days_until_next(Weekday::Wed), 1);
        assert_eq!(policy.days_until_next(Weekday::Fri), 4);
    }

    #[test]
    fn test_saturday_wraps_to_sunday() {
        let policy = RecurrencePolicy::weekly(&[Weekday::Sun]);
        assert_eq!(policy.bits(), 1);
        assert_eq!(policy.days_until_next(Weekday::Sat), 1);
        assert_eq!(policy.days_until_next(Weekday::Mon), 6);
    }

    #[test]
    fn test_bare_interval_flag_is_non_repeating() {
        let policy = RecurrencePolicy::from_bits(0x80);
        assert!(!policy.is_repeating());
        assert_eq!(policy.days_until_next(Weekday::Wed), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(RecurrencePolicy::NONE.to_string(), "once");
        assert_eq!(RecurrencePolicy::every_days(1).to_string(), "every day");
        assert_eq!(RecurrencePolicy::every_days(3).to_string(), "every 3 days");
        assert_eq!(
            RecurrencePolicy::weekly(&[Weekday::Fri, Weekday::Mon]).to_string(),
            "weekly on Mon, Fri"
        );
    }
}
