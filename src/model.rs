use chrono::{DateTime, TimeZone, Utc};
use url::Url;

use crate::event::{Coordinate, LocationId, SearchMode, Viewport, Zoom};
use crate::isochrones::IsochroneCache;
use crate::locations::{Facility, LibraryEvent, Location, TravelMode};
use crate::theme::Palette;
use crate::{
    CoreError, CLOCK_TICK_INTERVAL_MS, DEFAULT_API_BASE, DEFAULT_MAP_BEARING, DEFAULT_MAP_LAT,
    DEFAULT_MAP_LNG, DEFAULT_MAP_PITCH, DEFAULT_MAP_ZOOM, POSITION_REFRESH_INTERVAL_MS,
};

// --- Configuration, fixed at startup ---

#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    pub api_base: Url,
    pub refresh_interval_ms: u64,
    pub clock_interval_ms: u64,
    pub palette: Palette,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            api_base: Url::parse(DEFAULT_API_BASE).expect("default API base is a valid URL"),
            refresh_interval_ms: POSITION_REFRESH_INTERVAL_MS,
            clock_interval_ms: CLOCK_TICK_INTERVAL_MS,
            palette: Palette::default(),
        }
    }
}

// --- Which panel is visible ---
//
// Exactly one is active; opening a detail while another is open replaces it.

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Panel {
    #[default]
    List,
    Detail(LocationId),
}

impl Panel {
    pub fn current_detail(&self) -> Option<&LocationId> {
        match self {
            Self::List => None,
            Self::Detail(location) => Some(location),
        }
    }
}

// --- Application state ---
//
// Owned exclusively by the core; the cache and position/location data are
// only mutated through `update`.

#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub config: CoreConfig,

    pub search_mode: SearchMode,
    pub postcode: Option<String>,
    /// GPS-derived position; replaced together with `locations`, never
    /// merged. Postcode searches do not touch it.
    pub position: Option<Coordinate>,
    pub locations: Vec<Location>,

    pub facilities: Vec<Facility>,
    pub travel_modes: Vec<TravelMode>,
    pub events: Vec<LibraryEvent>,

    pub isochrones: IsochroneCache,

    pub panel: Panel,
    pub viewport: Viewport,

    pub refresh_in_flight: bool,
    pub timers_running: bool,
    /// Bumped on Stopped so delay callbacks armed earlier are orphaned.
    pub timer_generation: u64,
    pub now_ms: Option<u64>,

    pub active_error: Option<CoreError>,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            config: CoreConfig::default(),
            search_mode: SearchMode::Gps,
            postcode: None,
            position: None,
            locations: Vec::new(),
            facilities: Vec::new(),
            travel_modes: Vec::new(),
            events: Vec::new(),
            isochrones: IsochroneCache::default(),
            panel: Panel::default(),
            viewport: default_viewport(),
            refresh_in_flight: false,
            timers_running: false,
            timer_generation: 0,
            now_ms: None,
            active_error: None,
        }
    }
}

impl Model {
    pub fn set_error(&mut self, error: CoreError) {
        self.active_error = Some(error);
    }

    pub fn clear_error(&mut self) {
        self.active_error = None;
    }

    pub fn now(&self) -> Option<DateTime<Utc>> {
        let ms = self.now_ms?;
        Utc.timestamp_millis_opt(ms as i64).single()
    }

    pub fn location(&self, id: &LocationId) -> Option<&Location> {
        self.locations.iter().find(|location| &location.id == id)
    }

    pub fn known_travel_mode_ids(&self) -> Vec<crate::event::TravelModeId> {
        self.travel_modes.iter().map(|mode| mode.id.clone()).collect()
    }
}

fn default_viewport() -> Viewport {
    Viewport {
        center: Coordinate::new(DEFAULT_MAP_LAT, DEFAULT_MAP_LNG)
            .expect("default map center is a valid coordinate"),
        zoom: Zoom::new(DEFAULT_MAP_ZOOM).expect("default map zoom is valid"),
        pitch: DEFAULT_MAP_PITCH,
        bearing: DEFAULT_MAP_BEARING,
    }
}
