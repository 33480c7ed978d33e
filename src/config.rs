//! Engine configuration passed explicitly to the parser and evaluator.

use serde::{Deserialize, Serialize};

use crate::format::ModelFamily;

/// Mean Earth reference radius in km used by WMM/IGRF-class models.
pub const MEAN_EARTH_RADIUS_KM: f64 = 6371.2;

/// Reference radius a tabular file starts with until an `N` tag switches it.
pub const LEGACY_TABULAR_RADIUS_KM: f64 = 6371.0;

/// Reference ellipsoid, given as squared semi-axes in km².
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ellipsoid {
    pub a2: f64,
    pub b2: f64,
}

impl Ellipsoid {
    /// WGS84: a = 6378.137 km, b = 6356.7523142 km
    pub const WGS84: Ellipsoid = Ellipsoid {
        a2: 40_680_631.59,
        b2: 40_408_299.98,
    };
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Self::WGS84
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ellipsoid: Ellipsoid,
    pub earth_radius_km: f64,
    pub legacy_tabular_radius_km: f64,
    /// Truncate every model to this degree; rows above it are skipped.
    pub max_degree: Option<usize>,
    /// How far past its last epoch a periodically reissued model stays valid.
    pub validity_span_years: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ellipsoid: Ellipsoid::WGS84,
            earth_radius_km: MEAN_EARTH_RADIUS_KM,
            legacy_tabular_radius_km: LEGACY_TABULAR_RADIUS_KM,
            max_degree: None,
            validity_span_years: 5.0,
        }
    }
}

impl EngineConfig {
    pub fn max_degree_for(&self, family: ModelFamily) -> usize {
        let ceiling = family.default_max_degree();
        match self.max_degree {
            Some(limit) => limit.min(ceiling),
            None => ceiling,
        }
    }
}
