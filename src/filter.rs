//! The spot filter chain.
//!
//! A spot whose DX call sign is in the friend set always passes. Any other
//! spot must pass every dimension: band, mode, speed, and the DE/DX grid,
//! CQ zone and ITU zone selectors. A station with no callbook data fails
//! every selector that is not `all`.

use serde::Deserialize;
use serde::de::{self, Deserializer, Visitor};
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use crate::spot::{Band, Mode, Spot};
use crate::station::StationRecord;

/// Either every value (`"all"`) or an explicit set.
///
/// Deserializes from the string `"all"` or from an array:
/// - `dx_cq_zones = "all"`
/// - `dx_cq_zones = [3, 4, 5]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector<T: Eq + Hash> {
    All,
    Only(HashSet<T>),
}

impl<T: Eq + Hash> Default for Selector<T> {
    fn default() -> Self {
        Selector::All
    }
}

impl<T: Eq + Hash> Selector<T> {
    /// Build a selector from CLI-style values; no values means `All`.
    pub fn from_values(values: impl IntoIterator<Item = T>) -> Self {
        let set: HashSet<T> = values.into_iter().collect();
        if set.is_empty() {
            Selector::All
        } else {
            Selector::Only(set)
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selector::All)
    }

    /// `All` matches anything, including missing data. `Only` needs a value
    /// that is in the set.
    pub fn matches(&self, value: Option<&T>) -> bool {
        match self {
            Selector::All => true,
            Selector::Only(set) => value.is_some_and(|v| set.contains(v)),
        }
    }

    pub fn values(&self) -> Option<&HashSet<T>> {
        match self {
            Selector::All => None,
            Selector::Only(set) => Some(set),
        }
    }
}

impl<'de, T> Deserialize<'de> for Selector<T>
where
    T: Deserialize<'de> + Eq + Hash,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SelectorVisitor<T>(PhantomData<T>);

        impl<'de, T> Visitor<'de> for SelectorVisitor<T>
        where
            T: Deserialize<'de> + Eq + Hash,
        {
            type Value = Selector<T>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("\"all\" or an array")
            }

            fn visit_str<E>(self, value: &str) -> Result<Selector<T>, E>
            where
                E: de::Error,
            {
                if value.eq_ignore_ascii_case("all") {
                    Ok(Selector::All)
                } else {
                    Err(E::invalid_value(de::Unexpected::Str(value), &self))
                }
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Selector<T>, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let mut values = HashSet::new();
                while let Some(value) = seq.next_element::<T>()? {
                    values.insert(value);
                }
                Ok(Selector::from_values(values))
            }
        }

        deserializer.deserialize_any(SelectorVisitor(PhantomData))
    }
}

/// Operator-supplied filter criteria.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    pub bands: Vec<Band>,
    pub modes: HashSet<Mode>,
    pub min_wpm: u16,
    pub max_wpm: u16,
    pub de_cq_zones: Selector<u8>,
    pub dx_cq_zones: Selector<u8>,
    pub de_itu_zones: Selector<u8>,
    pub dx_itu_zones: Selector<u8>,
    /// Two-character grid prefixes, e.g. `FN`.
    pub de_grids: Selector<String>,
    pub dx_grids: Selector<String>,
    /// Call signs that pass regardless of every other criterion.
    pub friends: HashSet<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            bands: Band::ALL.to_vec(),
            modes: Mode::KNOWN.into_iter().collect(),
            min_wpm: 0,
            max_wpm: 100,
            de_cq_zones: Selector::All,
            dx_cq_zones: Selector::All,
            de_itu_zones: Selector::All,
            dx_itu_zones: Selector::All,
            de_grids: Selector::All,
            dx_grids: Selector::All,
            friends: HashSet::new(),
        }
    }
}

impl FilterConfig {
    /// Check ranges and normalise grid prefixes to upper case.
    pub fn validated(mut self) -> Result<Self, String> {
        if self.min_wpm > self.max_wpm {
            return Err(format!(
                "min_wpm ({}) is greater than max_wpm ({})",
                self.min_wpm, self.max_wpm
            ));
        }
        if self.bands.is_empty() {
            return Err("no bands selected".to_string());
        }
        if self.modes.is_empty() {
            return Err("no modes selected".to_string());
        }

        for (name, zones) in [("de_cq_zones", &self.de_cq_zones), ("dx_cq_zones", &self.dx_cq_zones)] {
            validate_zones(name, zones, 40)?;
        }
        for (name, zones) in [
            ("de_itu_zones", &self.de_itu_zones),
            ("dx_itu_zones", &self.dx_itu_zones),
        ] {
            validate_zones(name, zones, 90)?;
        }

        self.de_grids = normalize_grids("de_grids", self.de_grids)?;
        self.dx_grids = normalize_grids("dx_grids", self.dx_grids)?;
        Ok(self)
    }
}

fn validate_zones(name: &str, zones: &Selector<u8>, max: u8) -> Result<(), String> {
    if let Some(values) = zones.values()
        && let Some(bad) = values.iter().find(|z| **z == 0 || **z > max)
    {
        return Err(format!("{}: zone {} is outside 1-{}", name, bad, max));
    }
    Ok(())
}

fn normalize_grids(name: &str, grids: Selector<String>) -> Result<Selector<String>, String> {
    match grids {
        Selector::All => Ok(Selector::All),
        Selector::Only(values) => {
            if values.iter().any(|g| g.eq_ignore_ascii_case("all")) {
                return Ok(Selector::All);
            }
            let mut normalized = HashSet::new();
            for grid in values {
                let grid = grid.trim().to_ascii_uppercase();
                if grid.len() != 2 || !grid.chars().all(|c| c.is_ascii_alphabetic()) {
                    return Err(format!(
                        "{}: '{}' is not a two-letter grid field",
                        name, grid
                    ));
                }
                normalized.insert(grid);
            }
            Ok(Selector::Only(normalized))
        }
    }
}

/// Why a spot was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Band,
    Mode,
    Speed,
    DeGrid,
    DxGrid,
    DeCqZone,
    DxCqZone,
    DeItuZone,
    DxItuZone,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Rejection::Band => "band",
            Rejection::Mode => "mode",
            Rejection::Speed => "speed",
            Rejection::DeGrid => "DE grid",
            Rejection::DxGrid => "DX grid",
            Rejection::DeCqZone => "DE CQ zone",
            Rejection::DxCqZone => "DX CQ zone",
            Rejection::DeItuZone => "DE ITU zone",
            Rejection::DxItuZone => "DX ITU zone",
        };
        f.write_str(text)
    }
}

/// Result of running the chain over one spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The DX station is a friend.
    Friend,
    /// Every criterion held.
    Pass,
    Reject(Rejection),
}

impl Verdict {
    pub fn passes(self) -> bool {
        !matches!(self, Verdict::Reject(_))
    }
}

/// Evaluates spots against a validated [`FilterConfig`].
#[derive(Debug, Clone)]
pub struct FilterChain {
    config: FilterConfig,
}

impl FilterChain {
    pub fn new(config: FilterConfig) -> Result<Self, String> {
        Ok(Self {
            config: config.validated()?,
        })
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Exact, case-sensitive friend membership.
    pub fn is_friend(&self, call_sign: &str) -> bool {
        self.config.friends.contains(call_sign)
    }

    /// Whether any DE-side selector needs the spotter's callbook data.
    pub fn needs_de_station(&self) -> bool {
        let c = &self.config;
        !(c.de_grids.is_all() && c.de_cq_zones.is_all() && c.de_itu_zones.is_all())
    }

    /// Check the criteria that need no station data.
    ///
    /// Friends are never rejected here. A `None` means the spot still has to
    /// go through [`FilterChain::evaluate`].
    pub fn screen(&self, spot: &Spot) -> Option<Rejection> {
        if self.is_friend(&spot.dx_call) {
            return None;
        }

        let c = &self.config;
        if !c.bands.iter().any(|b| b.contains(spot.frequency_khz)) {
            Some(Rejection::Band)
        } else if !c.modes.contains(&spot.mode) {
            Some(Rejection::Mode)
        } else if !(c.min_wpm..=c.max_wpm).contains(&spot.wpm) {
            Some(Rejection::Speed)
        } else {
            None
        }
    }

    /// Evaluate one spot with whatever station data is available.
    pub fn evaluate(
        &self,
        spot: &Spot,
        de: Option<&StationRecord>,
        dx: Option<&StationRecord>,
    ) -> Verdict {
        if self.is_friend(&spot.dx_call) {
            return Verdict::Friend;
        }
        if let Some(rejection) = self.screen(spot) {
            return Verdict::Reject(rejection);
        }

        let c = &self.config;

        let de_grid = de.and_then(StationRecord::grid_prefix);
        if !c.de_grids.matches(de_grid.as_ref()) {
            return Verdict::Reject(Rejection::DeGrid);
        }
        let dx_grid = dx.and_then(StationRecord::grid_prefix);
        if !c.dx_grids.matches(dx_grid.as_ref()) {
            return Verdict::Reject(Rejection::DxGrid);
        }

        if !c.de_cq_zones.matches(de.and_then(|r| r.cq_zone.as_ref())) {
            return Verdict::Reject(Rejection::DeCqZone);
        }
        if !c.dx_cq_zones.matches(dx.and_then(|r| r.cq_zone.as_ref())) {
            return Verdict::Reject(Rejection::DxCqZone);
        }

        if !c.de_itu_zones.matches(de.and_then(|r| r.itu_zone.as_ref())) {
            return Verdict::Reject(Rejection::DeItuZone);
        }
        if !c.dx_itu_zones.matches(dx.and_then(|r| r.itu_zone.as_ref())) {
            return Verdict::Reject(Rejection::DxItuZone);
        }

        Verdict::Pass
    }

    /// Boolean form of [`FilterChain::evaluate`].
    pub fn passes(&self, spot: &Spot, de: Option<&StationRecord>, dx: Option<&StationRecord>) -> bool {
        self.evaluate(spot, de, dx).passes()
    }
}
