use std::collections::BTreeMap;

use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::event::{LocationId, TravelModeId};

// --- Wire type from the isochrone service ---
//
// `iso` is an opaque GeoJSON payload; the cache passes it through without
// looking inside. Ring properties are only read by `population_bands` for
// the detail panel.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsochroneDto {
    pub travel: TravelModeId,
    pub iso: FeatureCollection,
}

// --- Cache entry, keyed by (location, travel mode) ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsochroneEntry {
    /// Geometry has been fetched; `geometry` is Some exactly when this is.
    pub retrieved: bool,
    /// The user wants this mode's polygon visible.
    pub selected: bool,
    /// A fetch covering this key has been issued and has not resolved.
    pub in_flight: bool,
    pub geometry: Option<FeatureCollection>,
}

impl IsochroneEntry {
    fn absent() -> Self {
        Self {
            retrieved: false,
            selected: false,
            in_flight: false,
            geometry: None,
        }
    }
}

/// What a `begin_*` call decided: either nothing needs the network, or one
/// request for the listed modes must be issued. The caller owns turning the
/// plan into an HTTP effect; the cache has already marked the keys in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchPlan {
    Noop,
    Fetch {
        location: LocationId,
        modes: Vec<TravelModeId>,
    },
}

impl FetchPlan {
    pub const fn is_noop(&self) -> bool {
        matches!(self, Self::Noop)
    }
}

/// A selected entry, borrowed from the cache for rendering.
#[derive(Debug, Clone, Copy)]
pub struct SelectedIsochrone<'a> {
    pub location: &'a LocationId,
    pub mode: &'a TravelModeId,
    pub entry: &'a IsochroneEntry,
}

// --- The cache ---
//
// Grows monotonically; entries are never evicted. All mutation goes through
// `begin_ensure` / `begin_toggle` / `complete_fetch` / `fail_fetch`, which
// together guarantee at most one outstanding fetch per key.

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IsochroneCache {
    entries: BTreeMap<LocationId, BTreeMap<TravelModeId, IsochroneEntry>>,
}

impl IsochroneCache {
    /// Makes the requested modes available, fetching at most once per key.
    /// Already-retrieved and in-flight modes are left alone; the rest are
    /// marked in flight and returned as a single fetch plan. Calling this
    /// again before the fetch resolves coalesces into the outstanding
    /// request and plans nothing new.
    pub fn begin_ensure(&mut self, location: &LocationId, requested: &[TravelModeId]) -> FetchPlan {
        let slot = self.entries.entry(location.clone()).or_default();
        let mut missing = Vec::new();
        for mode in requested {
            let entry = slot
                .entry(mode.clone())
                .or_insert_with(IsochroneEntry::absent);
            if entry.retrieved || entry.in_flight {
                continue;
            }
            entry.in_flight = true;
            missing.push(mode.clone());
        }
        if missing.is_empty() {
            FetchPlan::Noop
        } else {
            debug!(location = %location, modes = missing.len(), "isochrone fetch planned");
            FetchPlan::Fetch {
                location: location.clone(),
                modes: missing,
            }
        }
    }

    /// Flips visibility for one key, fetching the geometry first if it was
    /// never retrieved. Toggling while that fetch is outstanding only
    /// records the new intent; completion applies whatever intent is latest.
    /// Returns the entry's new state for the caller to render.
    pub fn begin_toggle(
        &mut self,
        location: &LocationId,
        mode: &TravelModeId,
    ) -> (IsochroneEntry, FetchPlan) {
        let slot = self.entries.entry(location.clone()).or_default();
        let entry = slot
            .entry(mode.clone())
            .or_insert_with(IsochroneEntry::absent);

        if entry.retrieved || entry.in_flight {
            entry.selected = !entry.selected;
            return (entry.clone(), FetchPlan::Noop);
        }

        entry.selected = true;
        entry.in_flight = true;
        (
            entry.clone(),
            FetchPlan::Fetch {
                location: location.clone(),
                modes: vec![mode.clone()],
            },
        )
    }

    /// Applies a successful response. Returned modes become retrieved with
    /// their geometry, preserving whatever `selected` intent the entry holds.
    /// Requested modes missing from the response (a partial result) leave
    /// flight state and stay eligible for a later re-fetch; an optimistic
    /// selection on such a mode is dropped, since there is nothing to show.
    pub fn complete_fetch(
        &mut self,
        location: &LocationId,
        requested: &[TravelModeId],
        payload: Vec<IsochroneDto>,
    ) {
        let slot = self.entries.entry(location.clone()).or_default();
        for dto in payload {
            let entry = slot
                .entry(dto.travel.clone())
                .or_insert_with(IsochroneEntry::absent);
            entry.retrieved = true;
            entry.in_flight = false;
            entry.geometry = Some(dto.iso);
        }
        for mode in requested {
            let Some(entry) = slot.get_mut(mode) else {
                continue;
            };
            if !entry.retrieved && entry.in_flight {
                warn!(location = %location, mode = %mode, "isochrone response missing a requested mode");
                entry.in_flight = false;
                entry.selected = false;
            }
        }
    }

    /// Rolls the requested keys back after a failed fetch. Entries return to
    /// not-retrieved, not-in-flight, and an optimistic selection is dropped;
    /// the cache stays consistent for a retry on the next user action.
    pub fn fail_fetch(&mut self, location: &LocationId, requested: &[TravelModeId]) {
        let Some(slot) = self.entries.get_mut(location) else {
            return;
        };
        for mode in requested {
            if let Some(entry) = slot.get_mut(mode) {
                if !entry.retrieved {
                    entry.in_flight = false;
                    entry.selected = false;
                }
            }
        }
    }

    pub fn entry(&self, location: &LocationId, mode: &TravelModeId) -> Option<&IsochroneEntry> {
        self.entries.get(location).and_then(|slot| slot.get(mode))
    }

    /// All entries the user wants visible, recomputed fresh from current
    /// state. Entries still waiting on their geometry are included; renderers
    /// filter on `entry.geometry`.
    pub fn selected_entries(&self) -> impl Iterator<Item = SelectedIsochrone<'_>> {
        self.entries.iter().flat_map(|(location, slot)| {
            slot.iter()
                .filter(|(_, entry)| entry.selected)
                .map(move |(mode, entry)| SelectedIsochrone {
                    location,
                    mode,
                    entry,
                })
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LocationId, &TravelModeId, &IsochroneEntry)> {
        self.entries.iter().flat_map(|(location, slot)| {
            slot.iter().map(move |(mode, entry)| (location, mode, entry))
        })
    }

    pub fn in_flight_count(&self) -> usize {
        self.iter().filter(|(_, _, entry)| entry.in_flight).count()
    }
}

// --- Population bands ---

/// One ring of an isochrone: everywhere reachable within `seconds`, and the
/// population living inside that ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationBand {
    pub seconds: u32,
    pub population: u64,
}

/// Pulls the `value` / `total_pop` properties the isochrone service attaches
/// to each ring, sorted by time band. Rings without them are skipped.
pub fn population_bands(collection: &FeatureCollection) -> Vec<PopulationBand> {
    let mut bands: Vec<PopulationBand> = collection
        .features
        .iter()
        .filter_map(|feature| {
            let properties = feature.properties.as_ref()?;
            let seconds = properties.get("value")?.as_f64()?;
            let population = properties.get("total_pop")?.as_f64()?;
            if seconds < 0.0 || population < 0.0 {
                return None;
            }
            Some(PopulationBand {
                seconds: seconds.round() as u32,
                population: population.round() as u64,
            })
        })
        .collect();
    bands.sort_by_key(|band| band.seconds);
    bands
}
