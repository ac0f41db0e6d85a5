use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::LocationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn css(&self) -> String {
        format!("rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

/// Display attributes for a location. Implementations hold an explicit
/// mapping populated at configuration time; nothing is derived from the
/// location name at lookup.
pub trait ColorProvider {
    fn color_for(&self, location: &LocationId) -> Rgb;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: BTreeMap<LocationId, Rgb>,
    fallback: Rgb,
}

impl Palette {
    pub fn new(fallback: Rgb) -> Self {
        Self {
            colors: BTreeMap::new(),
            fallback,
        }
    }

    pub fn with_color(mut self, location: impl Into<String>, color: Rgb) -> Self {
        self.colors.insert(LocationId::new(location), color);
        self
    }
}

impl ColorProvider for Palette {
    fn color_for(&self, location: &LocationId) -> Rgb {
        self.colors.get(location).copied().unwrap_or(self.fallback)
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::new(Rgb::new(204, 204, 204))
            .with_color("Central Library", Rgb::new(143, 212, 0))
            .with_color("Crownhill Library", Rgb::new(236, 0, 140))
            .with_color("Devonport Library", Rgb::new(244, 170, 0))
            .with_color("Efford Library", Rgb::new(0, 120, 201))
            .with_color("Estover Library", Rgb::new(147, 37, 178))
            .with_color("North Prospect Library", Rgb::new(39, 189, 190))
            .with_color("Peverell Library", Rgb::new(0, 105, 62))
            .with_color("Plympton Library", Rgb::new(158, 27, 50))
            .with_color("Plymstock Library", Rgb::new(239, 130, 0))
            .with_color("Southway Library", Rgb::new(0, 58, 105))
            .with_color("St Budeaux Library", Rgb::new(77, 48, 145))
            .with_color("West Park Library", Rgb::new(233, 85, 37))
    }
}
