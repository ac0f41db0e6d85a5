use crux_core::testing::AppTester;
use crux_core::App as _;
use geojson::FeatureCollection;

use librarymap::event::{Coordinate, LocationId, LocationQuery, TravelModeId, Viewport, Zoom};
use librarymap::isochrones::IsochroneDto;
use librarymap::locations::{LibraryEvent, LocationDto, OpeningHoursDto, TravelMode};
use librarymap::model::Panel;
use librarymap::{App, Effect, Event, Model};

const MONDAY_10AM_MS: u64 = 1_551_693_600_000; // 2019-03-04T10:00:00Z
const MONDAY_6PM_MS: u64 = 1_551_722_400_000; // 2019-03-04T18:00:00Z

fn loc(name: &str) -> LocationId {
    LocationId::new(name)
}

fn position() -> Coordinate {
    Coordinate::new(50.3732, -4.1429).unwrap()
}

fn location_dto(name: &str) -> LocationDto {
    LocationDto {
        location_name: name.into(),
        latitude: 50.3715,
        longitude: -4.1427,
        opening_hours: vec![OpeningHoursDto {
            day: "monday".into(),
            opens: "09:00".into(),
            closes: "17:00".into(),
        }],
        facilities: vec![],
    }
}

fn load_locations(app: &AppTester<App, Effect>, model: &mut Model, names: &[&str]) {
    app.update(
        Event::LocationsFetched {
            query: LocationQuery::Gps {
                position: position(),
            },
            result: Ok(names.iter().map(|n| location_dto(n)).collect()),
        },
        model,
    );
}

fn load_travel_modes(app: &AppTester<App, Effect>, model: &mut Model) {
    app.update(
        Event::TravelModesFetched {
            result: Ok(vec![
                TravelMode {
                    id: TravelModeId::new("walk"),
                    description: "Walking".into(),
                },
                TravelMode {
                    id: TravelModeId::new("cycle"),
                    description: "Cycling".into(),
                },
            ]),
        },
        model,
    );
}

fn http_count(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, Effect::Http(_)))
        .count()
}

#[test]
fn the_app_starts_on_the_list() {
    let model = Model::default();
    assert_eq!(model.panel, Panel::List);
    let view = App.view(&model);
    assert!(view.detail.is_none());
}

#[test]
fn selecting_a_location_opens_its_detail_and_replaces_any_open_one() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();
    load_locations(&app, &mut model, &["Central Library", "Efford Library"]);

    app.update(
        Event::LocationSelected {
            location: loc("Central Library"),
        },
        &mut model,
    );
    assert_eq!(model.panel, Panel::Detail(loc("Central Library")));
    assert_eq!(
        App.view(&model).detail.unwrap().id,
        loc("Central Library")
    );

    // Opening another detail replaces the first; details never stack.
    app.update(
        Event::LocationSelected {
            location: loc("Efford Library"),
        },
        &mut model,
    );
    assert_eq!(model.panel, Panel::Detail(loc("Efford Library")));
    assert_eq!(App.view(&model).detail.unwrap().id, loc("Efford Library"));

    app.update(Event::DetailClosed, &mut model);
    assert_eq!(model.panel, Panel::List);
    assert!(App.view(&model).detail.is_none());
}

#[test]
fn opening_a_detail_requests_geometries_for_every_known_mode() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();
    load_locations(&app, &mut model, &["Central Library"]);
    load_travel_modes(&app, &mut model);

    let update = app.update(
        Event::LocationSelected {
            location: loc("Central Library"),
        },
        &mut model,
    );
    assert_eq!(http_count(&update.effects), 1);
    for mode_name in ["walk", "cycle"] {
        let entry = model
            .isochrones
            .entry(&loc("Central Library"), &TravelModeId::new(mode_name))
            .unwrap();
        assert!(entry.in_flight);
    }
}

#[test]
fn travel_modes_arriving_late_still_fill_an_open_detail() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();
    load_locations(&app, &mut model, &["Central Library"]);

    // Detail opens before the reference data has loaded: nothing to fetch.
    let update = app.update(
        Event::LocationSelected {
            location: loc("Central Library"),
        },
        &mut model,
    );
    assert_eq!(http_count(&update.effects), 0);

    // When the travel types land, the open detail fetches its geometries.
    let update = app.update(
        Event::TravelModesFetched {
            result: Ok(vec![TravelMode {
                id: TravelModeId::new("walk"),
                description: "Walking".into(),
            }]),
        },
        &mut model,
    );
    assert_eq!(http_count(&update.effects), 1);
}

#[test]
fn the_detail_panel_reflects_toggle_state_and_local_events() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();
    load_locations(&app, &mut model, &["Central Library", "Efford Library"]);
    load_travel_modes(&app, &mut model);
    app.update(
        Event::EventsFetched {
            result: Ok(vec![
                LibraryEvent {
                    title: "Story time".into(),
                    location: loc("Central Library"),
                    description: None,
                    starts: None,
                    ends: None,
                },
                LibraryEvent {
                    title: "Book club".into(),
                    location: loc("Efford Library"),
                    description: None,
                    starts: None,
                    ends: None,
                },
            ]),
        },
        &mut model,
    );

    app.update(
        Event::LocationSelected {
            location: loc("Central Library"),
        },
        &mut model,
    );
    app.update(
        Event::IsochroneToggled {
            location: loc("Central Library"),
            mode: TravelModeId::new("walk"),
        },
        &mut model,
    );

    let detail = App.view(&model).detail.unwrap();
    assert_eq!(detail.events.len(), 1, "only this location's events");
    assert_eq!(detail.events[0].title, "Story time");

    let walk = detail
        .travel_modes
        .iter()
        .find(|m| m.id == TravelModeId::new("walk"))
        .unwrap();
    assert!(walk.selected);
    assert!(walk.fetching);
    assert!(!walk.retrieved);
}

#[test]
fn a_late_completion_updates_the_cache_but_not_the_panel() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();
    load_locations(&app, &mut model, &["Central Library"]);
    load_travel_modes(&app, &mut model);

    app.update(
        Event::LocationSelected {
            location: loc("Central Library"),
        },
        &mut model,
    );
    app.update(Event::DetailClosed, &mut model);

    app.update(
        Event::IsochronesFetched {
            location: loc("Central Library"),
            requested: vec![TravelModeId::new("walk"), TravelModeId::new("cycle")],
            result: Ok(vec![IsochroneDto {
                travel: TravelModeId::new("walk"),
                iso: FeatureCollection {
                    bbox: None,
                    features: vec![],
                    foreign_members: None,
                },
            }]),
        },
        &mut model,
    );

    assert_eq!(model.panel, Panel::List, "no forced navigation");
    assert!(App.view(&model).detail.is_none());
    let entry = model
        .isochrones
        .entry(&loc("Central Library"), &TravelModeId::new("walk"))
        .unwrap();
    assert!(entry.retrieved, "the cache still benefits");
}

#[test]
fn a_detail_for_an_unknown_location_renders_empty() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();
    load_locations(&app, &mut model, &["Central Library"]);

    app.update(
        Event::LocationSelected {
            location: loc("Atlantis Library"),
        },
        &mut model,
    );
    assert_eq!(model.panel, Panel::Detail(loc("Atlantis Library")));
    assert!(App.view(&model).detail.is_none());
}

#[test]
fn viewport_requests_flow_through_to_the_map() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();

    let viewport = Viewport {
        center: Coordinate::new(50.39, -4.11).unwrap(),
        zoom: Zoom::new(15.0).unwrap(),
        pitch: 40.0,
        bearing: 20.0,
    };
    app.update(Event::ViewportRequested { viewport }, &mut model);
    assert_eq!(App.view(&model).map.viewport, viewport);
}

#[test]
fn open_state_follows_the_clock() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();
    app.update(Event::Started { now_ms: MONDAY_10AM_MS }, &mut model);
    load_locations(&app, &mut model, &["Central Library"]);

    let view = App.view(&model);
    assert!(view.list[0].open_state.is_open(), "open at 10:00 on Monday");

    app.update(
        Event::ClockTick {
            generation: 0,
            now_ms: MONDAY_6PM_MS,
        },
        &mut model,
    );
    let view = App.view(&model);
    assert!(
        !view.list[0].open_state.is_open(),
        "closed at 18:00 without a network roundtrip"
    );
}
