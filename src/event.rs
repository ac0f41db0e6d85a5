use serde::{Deserialize, Serialize};
use std::fmt;

use crate::isochrones::IsochroneDto;
use crate::locations::{Facility, LibraryEvent, LocationDto, TravelMode};
use crate::CoreError;

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(LocationId);
typed_id!(TravelModeId);

// --- Coordinate: validated, NaN-safe ---

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Coordinate {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid coordinate: lat={0}, lng={1}")]
    InvalidCoordinate(f64, f64),
    #[error("invalid zoom: {0}")]
    InvalidZoom(f64),
    #[error("invalid weekday: {0}")]
    InvalidWeekday(String),
    #[error("invalid time of day: {0}")]
    InvalidTime(String),
    #[error("opening span closes ({closes}) before it opens ({opens})")]
    InvertedHours { opens: String, closes: String },
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Result<Self, ValidationError> {
        if lat.is_nan()
            || lng.is_nan()
            || lat.is_infinite()
            || lng.is_infinite()
            || !(-90.0..=90.0).contains(&lat)
            || !(-180.0..=180.0).contains(&lng)
        {
            return Err(ValidationError::InvalidCoordinate(lat, lng));
        }
        Ok(Self { lat, lng })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }
    pub fn lng(&self) -> f64 {
        self.lng
    }
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.lat.to_bits() == other.lat.to_bits() && self.lng.to_bits() == other.lng.to_bits()
    }
}

impl Eq for Coordinate {}

// --- Zoom: validated ---

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Zoom(f64);

impl Zoom {
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if value.is_nan() || value.is_infinite() || !(0.0..=25.0).contains(&value) {
            return Err(ValidationError::InvalidZoom(value));
        }
        Ok(Self(value))
    }
    pub fn value(&self) -> f64 {
        self.0
    }
}

// --- Map viewport requested by the core, consumed by the renderer ---

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Viewport {
    pub center: Coordinate,
    pub zoom: Zoom,
    pub pitch: f64,
    pub bearing: f64,
}

// --- Search mode: how the nearby-location list is derived ---

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Gps,
    Postcode,
}

impl SearchMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gps => "gps",
            Self::Postcode => "postcode",
        }
    }
}

// --- The query a location-list fetch was keyed on ---
//
// Carried through to the completion event so position and list are published
// in the same update, and so a completion can be matched against the search
// mode that is current when it lands.

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum LocationQuery {
    Gps { position: Coordinate },
    Postcode { postcode: String, center: Coordinate },
}

impl LocationQuery {
    pub fn center(&self) -> Coordinate {
        match self {
            Self::Gps { position } => *position,
            Self::Postcode { center, .. } => *center,
        }
    }

    pub const fn search_mode(&self) -> SearchMode {
        match self {
            Self::Gps { .. } => SearchMode::Gps,
            Self::Postcode { .. } => SearchMode::Postcode,
        }
    }
}

// --- Event enum ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Event {
    // Lifecycle. The shell sends Started on mount and Stopped on teardown;
    // ticks come back from one-shot delays the core re-arms itself.
    Started {
        now_ms: u64,
    },
    Stopped,
    PositionTick {
        generation: u64,
    },
    ClockTick {
        generation: u64,
        now_ms: u64,
    },

    // Search & refresh
    LocateRequested,
    PostcodeSearchRequested {
        postcode: String,
    },
    PositionFetched {
        result: Result<Coordinate, CoreError>,
    },
    PostcodeResolved {
        postcode: String,
        result: Result<Coordinate, CoreError>,
    },
    LocationsFetched {
        query: LocationQuery,
        result: Result<Vec<LocationDto>, CoreError>,
    },

    // Reference data, loaded once at startup
    FacilitiesFetched {
        result: Result<Vec<Facility>, CoreError>,
    },
    TravelModesFetched {
        result: Result<Vec<TravelMode>, CoreError>,
    },
    EventsFetched {
        result: Result<Vec<LibraryEvent>, CoreError>,
    },

    // Panels & map
    LocationSelected {
        location: LocationId,
    },
    DetailClosed,
    ViewportRequested {
        viewport: Viewport,
    },
    ErrorDismissed,

    // Isochrones
    IsochroneToggled {
        location: LocationId,
        mode: TravelModeId,
    },
    IsochronesFetched {
        location: LocationId,
        requested: Vec<TravelModeId>,
        result: Result<Vec<IsochroneDto>, CoreError>,
    },
}
