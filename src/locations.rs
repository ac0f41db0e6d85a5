use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::event::{Coordinate, LocationId, TravelModeId, ValidationError};

// --- Travel modes: immutable reference data, loaded once at startup ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelMode {
    #[serde(rename = "travel_type")]
    pub id: TravelModeId,
    pub description: String,
}

// --- Facilities: reference data linked from locations by key ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facility {
    #[serde(rename = "facility")]
    pub id: String,
    pub description: String,
}

// --- Events hosted at a location ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryEvent {
    pub title: String,
    pub location: LocationId,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub starts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends: Option<DateTime<Utc>>,
}

// --- Opening hours ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenState {
    Open,
    Closed,
    Unknown,
}

impl OpenState {
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// A single opening span on one weekday. Spans never cross midnight; the
/// upstream feed has none and inverted spans are dropped at conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySpan {
    pub weekday: Weekday,
    pub opens: NaiveTime,
    pub closes: NaiveTime,
}

impl DaySpan {
    pub fn parse(day: &str, opens: &str, closes: &str) -> Result<Self, ValidationError> {
        let weekday: Weekday = day
            .trim()
            .parse()
            .map_err(|_| ValidationError::InvalidWeekday(day.to_string()))?;
        let opens_at = parse_time(opens)?;
        let closes_at = parse_time(closes)?;
        if closes_at <= opens_at {
            return Err(ValidationError::InvertedHours {
                opens: opens.to_string(),
                closes: closes.to_string(),
            });
        }
        Ok(Self {
            weekday,
            opens: opens_at,
            closes: closes_at,
        })
    }

    pub fn contains(&self, weekday: Weekday, time: NaiveTime) -> bool {
        self.weekday == weekday && self.opens <= time && time < self.closes
    }
}

fn parse_time(value: &str) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value.trim(), "%H:%M:%S"))
        .map_err(|_| ValidationError::InvalidTime(value.to_string()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekSchedule {
    spans: Vec<DaySpan>,
}

impl WeekSchedule {
    pub fn new(spans: Vec<DaySpan>) -> Self {
        Self { spans }
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Open/closed status at an instant. Without a clock reading, or without
    /// any hours on record, the status is Unknown rather than Closed.
    pub fn open_state(&self, now: Option<DateTime<Utc>>) -> OpenState {
        let Some(now) = now else {
            return OpenState::Unknown;
        };
        if self.spans.is_empty() {
            return OpenState::Unknown;
        }
        let weekday = now.weekday();
        let time = now.time();
        if self.spans.iter().any(|s| s.contains(weekday, time)) {
            OpenState::Open
        } else {
            OpenState::Closed
        }
    }
}

// --- Location: replaced wholesale on every successful refresh ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub coordinate: Coordinate,
    pub opening_hours: WeekSchedule,
    pub facilities: Vec<String>,
}

// --- Wire types from the location service ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningHoursDto {
    pub day: String,
    pub opens: String,
    pub closes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationDto {
    pub location_name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub opening_hours: Vec<OpeningHoursDto>,
    #[serde(default)]
    pub facilities: Vec<String>,
}

impl LocationDto {
    /// Converts the wire record, dropping unparseable opening spans rather
    /// than failing the whole refresh. An invalid coordinate is fatal for
    /// the record.
    pub fn into_location(self) -> Result<Location, ValidationError> {
        let coordinate = Coordinate::new(self.latitude, self.longitude)?;
        let mut spans = Vec::with_capacity(self.opening_hours.len());
        for hours in &self.opening_hours {
            match DaySpan::parse(&hours.day, &hours.opens, &hours.closes) {
                Ok(span) => spans.push(span),
                Err(error) => {
                    warn!(location = %self.location_name, %error, "skipping opening span");
                }
            }
        }
        Ok(Location {
            id: LocationId::new(self.location_name),
            coordinate,
            opening_hours: WeekSchedule::new(spans),
            facilities: self.facilities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn schedule() -> WeekSchedule {
        WeekSchedule::new(vec![
            DaySpan::parse("monday", "09:00", "17:00").unwrap(),
            DaySpan::parse("monday", "18:00", "20:00").unwrap(),
            DaySpan::parse("saturday", "10:00", "16:00").unwrap(),
        ])
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn day_span_parses_common_formats() {
        assert!(DaySpan::parse("Monday", "09:00", "17:30").is_ok());
        assert!(DaySpan::parse("tue", "08:30", "12:00").is_ok());
        assert!(DaySpan::parse("monday", "09:00:00", "17:00:00").is_ok());
    }

    #[test]
    fn day_span_rejects_garbage() {
        assert!(DaySpan::parse("Moonday", "09:00", "17:00").is_err());
        assert!(DaySpan::parse("monday", "9am", "17:00").is_err());
        assert!(DaySpan::parse("monday", "17:00", "09:00").is_err());
    }

    #[test]
    fn open_within_span() {
        // 2019-03-04 was a Monday.
        assert_eq!(
            schedule().open_state(Some(at(2019, 3, 4, 10, 0))),
            OpenState::Open
        );
    }

    #[test]
    fn closed_between_spans_on_the_same_day() {
        assert_eq!(
            schedule().open_state(Some(at(2019, 3, 4, 17, 30))),
            OpenState::Closed
        );
    }

    #[test]
    fn closed_on_a_day_with_no_spans() {
        // 2019-03-06 was a Wednesday.
        assert_eq!(
            schedule().open_state(Some(at(2019, 3, 6, 10, 0))),
            OpenState::Closed
        );
    }

    #[test]
    fn closing_time_is_exclusive() {
        assert_eq!(
            schedule().open_state(Some(at(2019, 3, 4, 17, 0))),
            OpenState::Closed
        );
        assert_eq!(
            schedule().open_state(Some(at(2019, 3, 4, 9, 0))),
            OpenState::Open
        );
    }

    #[test]
    fn unknown_without_clock_or_hours() {
        assert_eq!(schedule().open_state(None), OpenState::Unknown);
        assert_eq!(
            WeekSchedule::default().open_state(Some(at(2019, 3, 4, 10, 0))),
            OpenState::Unknown
        );
    }

    #[test]
    fn location_dto_drops_bad_spans_but_keeps_the_record() {
        let dto = LocationDto {
            location_name: "Central Library".into(),
            latitude: 50.3715,
            longitude: -4.1427,
            opening_hours: vec![
                OpeningHoursDto {
                    day: "monday".into(),
                    opens: "09:00".into(),
                    closes: "17:00".into(),
                },
                OpeningHoursDto {
                    day: "someday".into(),
                    opens: "09:00".into(),
                    closes: "17:00".into(),
                },
            ],
            facilities: vec!["wifi".into()],
        };
        let location = dto.into_location().unwrap();
        assert_eq!(location.id, LocationId::new("Central Library"));
        assert!(!location.opening_hours.is_empty());
    }

    #[test]
    fn location_dto_rejects_bad_coordinate() {
        let dto = LocationDto {
            location_name: "Nowhere".into(),
            latitude: 120.0,
            longitude: 0.0,
            opening_hours: vec![],
            facilities: vec![],
        };
        assert!(dto.into_location().is_err());
    }
}
