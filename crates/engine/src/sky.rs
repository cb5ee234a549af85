//! Great-circle matching on the celestial sphere.
//!
//! Tuples are `(longitude, latitude)` in degrees. Binning happens on the unit
//! vector in 3-D: the chord between two points grows monotonically with their
//! angular separation, so the Cartesian box argument carries over.

use crate::error::{check_positive, BinError, EngineError};
use crate::grid::{radius_bins, BinKey};
use crate::match_engine::{MatchEngine, NO_MATCH};
use crate::range::NdRange;
use crate::tuple::TupleField;

const LON: usize = 0;
const LAT: usize = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct SkyEngine {
    max_separation_rad: f64,
    bin_factor: f64,
    name: String,
}

impl SkyEngine {
    /// `max_separation_rad` must lie in `(0, π]`.
    pub fn new(max_separation_rad: f64) -> Result<Self, EngineError> {
        check_positive("max_separation", max_separation_rad)?;
        if max_separation_rad > std::f64::consts::PI {
            return Err(EngineError::InvalidConfig(format!(
                "max_separation must be <= pi radians (got {max_separation_rad})"
            )));
        }
        Ok(Self {
            max_separation_rad,
            bin_factor: 1.0,
            name: format!(
                "Sky ({:.3} arcsec)",
                max_separation_rad.to_degrees() * 3600.0
            ),
        })
    }

    pub fn from_arcsec(arcsec: f64) -> Result<Self, EngineError> {
        Self::new((arcsec / 3600.0).to_radians())
    }

    pub fn with_bin_factor(mut self, bin_factor: f64) -> Result<Self, EngineError> {
        check_positive("bin_factor", bin_factor)?;
        self.bin_factor = bin_factor;
        Ok(self)
    }

    pub fn max_separation_rad(&self) -> f64 {
        self.max_separation_rad
    }

    fn chord_half_radius(&self) -> f64 {
        (self.max_separation_rad * 0.5).sin()
    }

    /// Angular separation in radians, or `None` once it clearly exceeds
    /// the maximum.
    fn separation(&self, a: &[f64], b: &[f64]) -> Option<f64> {
        let lat1 = a[LAT].to_radians();
        let lat2 = b[LAT].to_radians();
        let dlat = lat2 - lat1;
        if dlat.abs() > self.max_separation_rad {
            return None;
        }
        let dlon = (b[LON] - a[LON]).to_radians();
        let s_lat = (dlat * 0.5).sin();
        let s_lon = (dlon * 0.5).sin();
        let h = s_lat * s_lat + lat1.cos() * lat2.cos() * s_lon * s_lon;
        Some(2.0 * h.sqrt().min(1.0).asin())
    }
}

fn unit_vector(lon_deg: f64, lat_deg: f64) -> [f64; 3] {
    let (lon, lat) = (lon_deg.to_radians(), lat_deg.to_radians());
    let c = lat.cos();
    [c * lon.cos(), c * lon.sin(), lat.sin()]
}

impl MatchEngine for SkyEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn tuple_infos(&self) -> Vec<TupleField> {
        vec![TupleField::longitude(), TupleField::latitude()]
    }

    fn arity(&self) -> usize {
        2
    }

    fn is_usable(&self, tuple: &[f64]) -> bool {
        tuple.len() == 2
            && tuple[LON].is_finite()
            && tuple[LAT].is_finite()
            && (-90.0..=90.0).contains(&tuple[LAT])
    }

    fn bins(&self, tuple: &[f64]) -> Result<Vec<BinKey>, BinError> {
        if tuple.len() != 2 {
            return Err(BinError::Arity {
                expected: 2,
                actual: tuple.len(),
            });
        }
        if !tuple[LON].is_finite() || !tuple[LAT].is_finite() {
            return Err(BinError::NonFinite);
        }
        let r = self.chord_half_radius();
        let xyz = unit_vector(tuple[LON], tuple[LAT]);
        radius_bins(&xyz, r, self.bin_factor * 2.0 * r)
    }

    fn score(&self, a: &[f64], b: &[f64]) -> f64 {
        if a.len() != 2 || b.len() != 2 {
            return NO_MATCH;
        }
        match self.separation(a, b) {
            Some(sep) if sep <= self.max_separation_rad => sep / self.max_separation_rad,
            _ => NO_MATCH,
        }
    }

    fn score_scale(&self) -> f64 {
        1.0
    }

    fn can_bound_match(&self) -> bool {
        true
    }

    /// Only latitude can be bounded; longitude wraps and is left open.
    fn match_bounds(&self, ranges: &[NdRange], index: usize) -> Option<NdRange> {
        let range = ranges.get(index)?;
        if range.dimensionality() != 2 {
            return None;
        }
        Some(
            range
                .extended(self.max_separation_rad.to_degrees(), &[LAT])
                .clamped(LAT, -90.0, 90.0),
        )
    }
}
