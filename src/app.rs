use chrono::{DateTime, Utc};
use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, warn};
use url::Url;

use crate::capabilities::{Capabilities, GeolocationResult, TimerId};
use crate::event::{
    Coordinate, Event, LocationId, LocationQuery, SearchMode, TravelModeId, Viewport,
};
use crate::isochrones::{population_bands, FetchPlan, IsochroneDto, PopulationBand};
use crate::locations::{Facility, LibraryEvent, Location, LocationDto, OpenState, TravelMode};
use crate::model::{Model, Panel};
use crate::theme::{ColorProvider, Rgb};
use crate::{format_distance, haversine_distance, CoreError};

// --- View model ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationListItem {
    pub id: LocationId,
    pub coordinate: Coordinate,
    pub open_state: OpenState,
    pub distance_meters: Option<f64>,
    pub distance_text: Option<String>,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelModeView {
    pub id: TravelModeId,
    pub description: String,
    pub selected: bool,
    pub retrieved: bool,
    pub fetching: bool,
    pub population_bands: Vec<PopulationBand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationDetailView {
    pub id: LocationId,
    pub coordinate: Coordinate,
    pub open_state: OpenState,
    pub color: Rgb,
    pub facilities: Vec<Facility>,
    pub events: Vec<LibraryEvent>,
    pub travel_modes: Vec<TravelModeView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMarker {
    pub id: LocationId,
    pub coordinate: Coordinate,
    pub open_state: OpenState,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsochronePolygon {
    pub location: LocationId,
    pub mode: TravelModeId,
    pub color: Rgb,
    pub geometry: FeatureCollection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    pub viewport: Viewport,
    pub markers: Vec<MapMarker>,
    pub position: Option<Coordinate>,
    pub polygons: Vec<IsochronePolygon>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewModel {
    pub list: Vec<LocationListItem>,
    /// Present while a detail panel is open and its location is known.
    pub detail: Option<LocationDetailView>,
    pub map: MapView,
    pub search_mode: SearchMode,
    pub postcode: Option<String>,
    pub has_position: bool,
    /// True while any core fetch is outstanding.
    pub is_loading: bool,
    pub error: Option<String>,
}

// --- The app ---

#[derive(Default)]
pub struct App;

impl App {
    fn arm_position_timer(model: &Model, caps: &Capabilities) {
        let generation = model.timer_generation;
        caps.timer.notify_after(
            TimerId::PositionRefresh,
            model.config.refresh_interval_ms,
            move |_| Event::PositionTick { generation },
        );
    }

    fn arm_clock_timer(model: &Model, caps: &Capabilities) {
        let generation = model.timer_generation;
        caps.timer.notify_after(
            TimerId::ClockTick,
            model.config.clock_interval_ms,
            move |output| Event::ClockTick {
                generation,
                now_ms: output.now_ms,
            },
        );
    }

    /// Kicks off a position-then-locations refresh. A refresh already in
    /// flight wins: the new request is skipped, not queued, so location
    /// lists can never land out of order.
    fn begin_refresh(model: &mut Model, caps: &Capabilities) {
        if model.refresh_in_flight {
            debug!("refresh skipped: previous refresh still in flight");
            return;
        }
        model.refresh_in_flight = true;
        caps.geolocation.locate(|result| Event::PositionFetched {
            result: position_result(result),
        });
    }

    fn request_locations(model: &Model, caps: &Capabilities, query: LocationQuery) {
        let url = locations_url(&model.config.api_base, query.center());
        caps.http
            .get(url.as_str())
            .expect_json::<Vec<LocationDto>>()
            .send(move |result| Event::LocationsFetched {
                query: query.clone(),
                result: into_core_result(result),
            });
    }

    fn request_isochrones(model: &Model, caps: &Capabilities, plan: FetchPlan) {
        let FetchPlan::Fetch { location, modes } = plan else {
            return;
        };
        debug!(location = %location, modes = modes.len(), "fetching isochrones");
        let url = isochrones_url(&model.config.api_base, &location, &modes);
        caps.http
            .get(url.as_str())
            .expect_json::<Vec<IsochroneDto>>()
            .send(move |result| Event::IsochronesFetched {
                location: location.clone(),
                requested: modes.clone(),
                result: into_core_result(result),
            });
    }

    fn request_reference_data(model: &Model, caps: &Capabilities) {
        let base = &model.config.api_base;
        caps.http
            .get(endpoint(base, &["api", "facilities"]).as_str())
            .expect_json::<Vec<Facility>>()
            .send(|result| Event::FacilitiesFetched {
                result: into_core_result(result),
            });
        caps.http
            .get(endpoint(base, &["api", "travel"]).as_str())
            .expect_json::<Vec<TravelMode>>()
            .send(|result| Event::TravelModesFetched {
                result: into_core_result(result),
            });
        caps.http
            .get(endpoint(base, &["api", "events"]).as_str())
            .expect_json::<Vec<LibraryEvent>>()
            .send(|result| Event::EventsFetched {
                result: into_core_result(result),
            });
    }

    fn build_list(model: &Model, now: Option<DateTime<Utc>>) -> Vec<LocationListItem> {
        let mut items: Vec<LocationListItem> = model
            .locations
            .iter()
            .map(|location| {
                let distance = model
                    .position
                    .map(|position| haversine_distance(position, location.coordinate));
                LocationListItem {
                    id: location.id.clone(),
                    coordinate: location.coordinate,
                    open_state: location.opening_hours.open_state(now),
                    distance_meters: distance,
                    distance_text: distance.map(format_distance),
                    color: model.config.palette.color_for(&location.id),
                }
            })
            .collect();

        items.sort_by(|a, b| match (a.distance_meters, b.distance_meters) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        });

        items
    }

    fn build_detail(
        model: &Model,
        id: &LocationId,
        now: Option<DateTime<Utc>>,
    ) -> Option<LocationDetailView> {
        let location = model.location(id)?;

        let facilities = model
            .facilities
            .iter()
            .filter(|facility| location.facilities.contains(&facility.id))
            .cloned()
            .collect();

        let events = model
            .events
            .iter()
            .filter(|event| &event.location == id)
            .cloned()
            .collect();

        let travel_modes = model
            .travel_modes
            .iter()
            .map(|mode| {
                let entry = model.isochrones.entry(id, &mode.id);
                TravelModeView {
                    id: mode.id.clone(),
                    description: mode.description.clone(),
                    selected: entry.map_or(false, |e| e.selected),
                    retrieved: entry.map_or(false, |e| e.retrieved),
                    fetching: entry.map_or(false, |e| e.in_flight),
                    population_bands: entry
                        .and_then(|e| e.geometry.as_ref())
                        .map(population_bands)
                        .unwrap_or_default(),
                }
            })
            .collect();

        Some(LocationDetailView {
            id: id.clone(),
            coordinate: location.coordinate,
            open_state: location.opening_hours.open_state(now),
            color: model.config.palette.color_for(id),
            facilities,
            events,
            travel_modes,
        })
    }

    fn build_map(model: &Model, now: Option<DateTime<Utc>>) -> MapView {
        let markers = model
            .locations
            .iter()
            .map(|location| MapMarker {
                id: location.id.clone(),
                coordinate: location.coordinate,
                open_state: location.opening_hours.open_state(now),
                color: model.config.palette.color_for(&location.id),
            })
            .collect();

        let polygons = model
            .isochrones
            .selected_entries()
            .filter_map(|selected| {
                let geometry = selected.entry.geometry.clone()?;
                Some(IsochronePolygon {
                    location: selected.location.clone(),
                    mode: selected.mode.clone(),
                    color: model.config.palette.color_for(selected.location),
                    geometry,
                })
            })
            .collect();

        MapView {
            viewport: model.viewport,
            markers,
            position: model.position,
            polygons,
        }
    }
}

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        match event {
            Event::Started { now_ms } => {
                model.now_ms = Some(now_ms);
                if model.timers_running {
                    debug!("start requested while already running");
                    caps.render.render();
                    return;
                }
                model.timers_running = true;
                Self::arm_position_timer(model, caps);
                Self::arm_clock_timer(model, caps);
                Self::request_reference_data(model, caps);
                Self::begin_refresh(model, caps);
                caps.render.render();
            }

            Event::Stopped => {
                // Orphans any tick still pending in the shell; it will come
                // back with a stale generation and be dropped.
                model.timers_running = false;
                model.timer_generation += 1;
                debug!("timers stopped");
            }

            Event::PositionTick { generation } => {
                if !model.timers_running || generation != model.timer_generation {
                    debug!("dropping stale position tick");
                    return;
                }
                Self::arm_position_timer(model, caps);
                if model.search_mode == SearchMode::Gps {
                    Self::begin_refresh(model, caps);
                }
            }

            Event::ClockTick { generation, now_ms } => {
                if !model.timers_running || generation != model.timer_generation {
                    debug!("dropping stale clock tick");
                    return;
                }
                model.now_ms = Some(now_ms);
                Self::arm_clock_timer(model, caps);
                caps.render.render();
            }

            Event::LocateRequested => {
                model.search_mode = SearchMode::Gps;
                model.postcode = None;
                Self::begin_refresh(model, caps);
                caps.render.render();
            }

            Event::PostcodeSearchRequested { postcode } => {
                model.search_mode = SearchMode::Postcode;
                model.postcode = Some(postcode.clone());
                if model.refresh_in_flight {
                    debug!("postcode search skipped: refresh in flight");
                } else {
                    model.refresh_in_flight = true;
                    let submitted = postcode;
                    caps.geolocation
                        .geocode(submitted.clone(), move |result| Event::PostcodeResolved {
                            postcode: submitted.clone(),
                            result: position_result(result),
                        });
                }
                caps.render.render();
            }

            Event::PositionFetched { result } => match result {
                Ok(position) if model.search_mode == SearchMode::Gps => {
                    // The position publishes together with the list, never
                    // before it.
                    Self::request_locations(model, caps, LocationQuery::Gps { position });
                }
                Ok(_) => {
                    model.refresh_in_flight = false;
                    debug!("dropping position resolved after a mode change");
                    caps.render.render();
                }
                Err(error) => {
                    model.refresh_in_flight = false;
                    warn!(%error, "position fetch failed");
                    model.set_error(error);
                    caps.render.render();
                }
            },

            Event::PostcodeResolved { postcode, result } => {
                if model.search_mode != SearchMode::Postcode {
                    model.refresh_in_flight = false;
                    debug!("dropping postcode resolution after a mode change");
                    caps.render.render();
                    return;
                }
                match result {
                    Ok(center) => {
                        Self::request_locations(
                            model,
                            caps,
                            LocationQuery::Postcode { postcode, center },
                        );
                    }
                    Err(error) => {
                        model.refresh_in_flight = false;
                        warn!(%error, %postcode, "postcode resolution failed");
                        model.set_error(error);
                        caps.render.render();
                    }
                }
            }

            Event::LocationsFetched { query, result } => {
                model.refresh_in_flight = false;
                if query.search_mode() != model.search_mode {
                    debug!("dropping location list resolved under a different search mode");
                    caps.render.render();
                    return;
                }
                match result {
                    Ok(dtos) => {
                        let locations = convert_locations(dtos);
                        debug!(count = locations.len(), "location list refreshed");
                        // Position and list land in the same update, so
                        // readers never see one without the other.
                        if let LocationQuery::Gps { position } = query {
                            model.position = Some(position);
                        }
                        model.locations = locations;
                        model.clear_error();
                    }
                    Err(error) => {
                        warn!(%error, "location refresh failed");
                        model.set_error(error);
                    }
                }
                caps.render.render();
            }

            Event::FacilitiesFetched { result } => {
                match result {
                    Ok(facilities) => model.facilities = facilities,
                    Err(error) => warn!(%error, "facilities fetch failed"),
                }
                caps.render.render();
            }

            Event::TravelModesFetched { result } => {
                match result {
                    Ok(modes) => {
                        model.travel_modes = modes;
                        // A detail opened before the reference data landed
                        // still wants its geometries.
                        if let Some(location) = model.panel.current_detail().cloned() {
                            let modes = model.known_travel_mode_ids();
                            let plan = model.isochrones.begin_ensure(&location, &modes);
                            Self::request_isochrones(model, caps, plan);
                        }
                    }
                    Err(error) => warn!(%error, "travel types fetch failed"),
                }
                caps.render.render();
            }

            Event::EventsFetched { result } => {
                match result {
                    Ok(events) => model.events = events,
                    Err(error) => warn!(%error, "events fetch failed"),
                }
                caps.render.render();
            }

            Event::LocationSelected { location } => {
                model.panel = Panel::Detail(location.clone());
                let modes = model.known_travel_mode_ids();
                let plan = model.isochrones.begin_ensure(&location, &modes);
                Self::request_isochrones(model, caps, plan);
                caps.render.render();
            }

            Event::DetailClosed => {
                model.panel = Panel::List;
                caps.render.render();
            }

            Event::ViewportRequested { viewport } => {
                model.viewport = viewport;
                caps.render.render();
            }

            Event::ErrorDismissed => {
                model.clear_error();
                caps.render.render();
            }

            Event::IsochroneToggled { location, mode } => {
                let (entry, plan) = model.isochrones.begin_toggle(&location, &mode);
                debug!(
                    location = %location,
                    mode = %mode,
                    selected = entry.selected,
                    "isochrone toggled"
                );
                Self::request_isochrones(model, caps, plan);
                caps.render.render();
            }

            Event::IsochronesFetched {
                location,
                requested,
                result,
            } => {
                match result {
                    Ok(payload) => {
                        model.isochrones.complete_fetch(&location, &requested, payload);
                    }
                    Err(error) => {
                        model.isochrones.fail_fetch(&location, &requested);
                        warn!(%error, location = %location, "isochrone fetch failed");
                        model.set_error(error);
                    }
                }
                // A completion landing after the user navigated away still
                // updates the cache but never forces a panel transition.
                caps.render.render();
            }
        }
    }

    fn view(&self, model: &Model) -> ViewModel {
        let now = model.now();
        let detail = model
            .panel
            .current_detail()
            .and_then(|id| Self::build_detail(model, id, now));

        ViewModel {
            list: Self::build_list(model, now),
            detail,
            map: Self::build_map(model, now),
            search_mode: model.search_mode,
            postcode: model.postcode.clone(),
            has_position: model.position.is_some(),
            is_loading: model.refresh_in_flight || model.isochrones.in_flight_count() > 0,
            error: model
                .active_error
                .as_ref()
                .map(CoreError::user_facing_message),
        }
    }
}

// --- Conversions & endpoints ---

fn position_result(result: GeolocationResult) -> Result<Coordinate, CoreError> {
    match result {
        Ok(position) => Coordinate::new(position.latitude, position.longitude).map_err(|error| {
            CoreError::PositionUnavailable {
                reason: error.to_string(),
            }
        }),
        Err(error) => Err(CoreError::PositionUnavailable {
            reason: error.to_string(),
        }),
    }
}

fn into_core_result<T, E>(result: Result<crux_http::Response<T>, E>) -> Result<T, CoreError>
where
    E: std::fmt::Display,
{
    match result {
        Ok(mut response) => response.take_body().ok_or_else(|| CoreError::NetworkFailure {
            reason: "response body missing".into(),
        }),
        Err(error) => Err(CoreError::NetworkFailure {
            reason: error.to_string(),
        }),
    }
}

fn convert_locations(dtos: Vec<LocationDto>) -> Vec<Location> {
    dtos.into_iter()
        .filter_map(|dto| {
            let name = dto.location_name.clone();
            match dto.into_location() {
                Ok(location) => Some(location),
                Err(error) => {
                    warn!(location = %name, %error, "dropping invalid location record");
                    None
                }
            }
        })
        .collect()
}

fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

fn locations_url(base: &Url, center: Coordinate) -> Url {
    let mut url = endpoint(base, &["api", "locations"]);
    url.query_pairs_mut()
        .append_pair("latitude", &center.lat().to_string())
        .append_pair("longitude", &center.lng().to_string());
    url
}

fn isochrones_url(base: &Url, location: &LocationId, modes: &[TravelModeId]) -> Url {
    let mut url = endpoint(base, &["api", "isochrones", location.as_str()]);
    let types: Vec<&str> = modes.iter().map(TravelModeId::as_str).collect();
    url.query_pairs_mut()
        .append_pair("travel_types", &types.join(","));
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{GeoPosition, GeolocationError};

    #[test]
    fn endpoint_joins_and_encodes_segments() {
        let base = Url::parse("https://librarymap-api.fly.dev/").unwrap();
        let url = isochrones_url(
            &base,
            &LocationId::new("Central Library"),
            &[TravelModeId::new("walk"), TravelModeId::new("cycle")],
        );
        assert_eq!(url.path(), "/api/isochrones/Central%20Library");
        let query = url.query().unwrap();
        assert!(query.contains("walk"));
        assert!(query.contains("cycle"));
    }

    #[test]
    fn locations_url_carries_the_query_position() {
        let base = Url::parse("https://librarymap-api.fly.dev/").unwrap();
        let center = Coordinate::new(50.3732, -4.1429).unwrap();
        let url = locations_url(&base, center);
        assert_eq!(url.path(), "/api/locations");
        let query = url.query().unwrap();
        assert!(query.contains("latitude=50.3732"));
        assert!(query.contains("longitude=-4.1429"));
    }

    #[test]
    fn endpoint_tolerates_a_base_with_a_path() {
        let base = Url::parse("https://example.org/libraries/").unwrap();
        let url = endpoint(&base, &["api", "events"]);
        assert_eq!(url.path(), "/libraries/api/events");
    }

    #[test]
    fn position_result_validates_coordinates() {
        let ok = position_result(Ok(GeoPosition {
            latitude: 50.4,
            longitude: -4.1,
        }));
        assert!(ok.is_ok());

        let bad = position_result(Ok(GeoPosition {
            latitude: 120.0,
            longitude: 0.0,
        }));
        assert!(matches!(bad, Err(CoreError::PositionUnavailable { .. })));

        let denied = position_result(Err(GeolocationError::PermissionDenied));
        assert!(matches!(denied, Err(CoreError::PositionUnavailable { .. })));
    }
}
