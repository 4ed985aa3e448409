// src/slots.rs
//
// Availability core: wall-clock slot generation in the clinic's timezone,
// interval overlap arithmetic, and the opaque slot identifier.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/* -------------------------
   Operating hours
--------------------------*/

/// Open/close wall-clock times for a single day, serialized as "HH:MM".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DayHours {
    #[serde(with = "hhmm")]
    pub open: NaiveTime,
    #[serde(with = "hhmm")]
    pub close: NaiveTime,
}

/// Weekly hours keyed by day. Empty by default: a dentist schedule only
/// overrides the days it names, and a clinic without configured hours falls
/// back to the standard weekday hours at resolution time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeekHours {
    pub monday: Option<DayHours>,
    pub tuesday: Option<DayHours>,
    pub wednesday: Option<DayHours>,
    pub thursday: Option<DayHours>,
    pub friday: Option<DayHours>,
    pub saturday: Option<DayHours>,
    pub sunday: Option<DayHours>,
}

impl WeekHours {
    pub fn get(&self, day: Weekday) -> Option<DayHours> {
        match day {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }
}

/// Fallback when neither the dentist schedule nor the clinic settings name
/// hours for a weekday.
pub fn standard_day_hours() -> DayHours {
    DayHours {
        open: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        close: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
    }
}

/// Resolve the effective hours for one dentist on one day. Weekends are
/// closed under the default policy, even when a schedule entry exists.
pub fn resolve_day_hours(
    clinic_hours: &WeekHours,
    dentist_hours: &WeekHours,
    day: Weekday,
) -> Option<DayHours> {
    if matches!(day, Weekday::Sat | Weekday::Sun) {
        return None;
    }
    dentist_hours
        .get(day)
        .or_else(|| clinic_hours.get(day))
        .or_else(|| Some(standard_day_hours()))
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}

/* -------------------------
   Intervals
--------------------------*/

/// A half-open busy interval `[start, end)` taken by a non-cancelled
/// appointment.
#[derive(Debug, Clone, Copy)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Half-open interval overlap: touching endpoints do not conflict.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && a_end > b_start
}

/* -------------------------
   Slot generation
--------------------------*/

/// Candidate starts for one dentist-day, at `stride_mins` stride from opening
/// time, finishing no later than close. All wall-clock arithmetic happens in
/// the clinic timezone so days around a DST transition keep their local
/// opening hours. Candidates are dropped when they fall inside a DST gap,
/// start before `now`, or overlap a busy interval.
pub fn day_slots(
    date: NaiveDate,
    hours: DayHours,
    stride_mins: i64,
    tz: Tz,
    busy: &[BusyInterval],
    now: DateTime<Utc>,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut out = Vec::new();
    if stride_mins <= 0 {
        return out;
    }
    let stride = Duration::minutes(stride_mins);

    let mut cursor = date.and_time(hours.open);
    let close = date.and_time(hours.close);

    while cursor + stride <= close {
        let local_start = cursor;
        cursor += stride;

        let Some(start) = tz
            .from_local_datetime(&local_start)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
        else {
            // DST gap: this wall-clock time does not exist on this day
            continue;
        };
        let end = start + stride;

        if start < now {
            continue;
        }
        if busy.iter().any(|b| overlaps(start, end, b.start, b.end)) {
            continue;
        }
        out.push((start, end));
    }
    out
}

/* -------------------------
   Slot identity
--------------------------*/

pub const SLOT_ID_DELIMITER: char = '@';

#[derive(Debug, thiserror::Error)]
pub enum SlotIdError {
    #[error("slot_id must be '<dentist_id>@<rfc3339 start>'")]
    MissingDelimiter,
    #[error("slot_id dentist component is not a UUID")]
    BadDentistId,
    #[error("slot_id start component is not an RFC 3339 timestamp")]
    BadTimestamp,
}

/// `@` never occurs in a UUID or an RFC 3339 timestamp, so the encoding is
/// unambiguous and round-trips losslessly.
pub fn encode_slot_id(dentist_id: Uuid, start: DateTime<Utc>) -> String {
    format!("{dentist_id}{SLOT_ID_DELIMITER}{}", start.to_rfc3339())
}

pub fn parse_slot_id(slot_id: &str) -> Result<(Uuid, DateTime<Utc>), SlotIdError> {
    let (dentist_part, start_part) = slot_id
        .split_once(SLOT_ID_DELIMITER)
        .ok_or(SlotIdError::MissingDelimiter)?;
    let dentist_id = Uuid::parse_str(dentist_part).map_err(|_| SlotIdError::BadDentistId)?;
    let start = DateTime::parse_from_rfc3339(start_part)
        .map_err(|_| SlotIdError::BadTimestamp)?
        .with_timezone(&Utc);
    Ok((dentist_id, start))
}
