// src/channel/observation.rs
//
// Instantaneous link state seen by a power controller.
//
// Every field has a declared physical range (ObservationBounds). The
// environment only emits in-range observations; the inference path checks
// incoming ones before handing them to the network.

use serde::{Deserialize, Serialize};

use super::physics::{max_doppler_hz, slant_range_km};
use crate::config::ChannelConfig;

/// Version of the feature layout produced by `to_features`.
pub const OBS_VERSION: u32 = 1;

/// Number of features fed to the Q-network.
pub const OBS_DIM: usize = 6;

/// Highest rain rate any configuration may simulate (mm/h).
pub const MAX_RAIN_RATE_MM_H: f64 = 150.0;

/// Receiver measurement range (dBm); reported RSRP saturates here.
pub const RSRP_FLOOR_DBM: f64 = -200.0;
pub const RSRP_CEIL_DBM: f64 = 0.0;

/// Centre and scale used to normalise RSRP features.
const RSRP_FEATURE_CENTER_DBM: f64 = -100.0;
const RSRP_FEATURE_SCALE_DB: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Elevation angle (deg).
    pub elevation_deg: f64,
    /// Slant range (km).
    pub slant_range_km: f64,
    /// Rain rate (mm/h).
    pub rain_rate_mm_h: f64,
    /// Received reference signal power (dBm).
    pub rsrp_dbm: f64,
    /// Doppler shift (Hz).
    pub doppler_hz: f64,
    /// Transmit power currently applied (dBm).
    pub tx_power_dbm: f64,
}

impl Observation {
    /// True when every field is finite and inside `bounds`.
    pub fn is_within(&self, bounds: &ObservationBounds) -> bool {
        self.violations(bounds).is_empty()
    }

    /// Names of the fields that are non-finite or outside `bounds`.
    pub fn violations(&self, bounds: &ObservationBounds) -> Vec<&'static str> {
        let fields = [
            ("elevation_deg", self.elevation_deg, bounds.elevation_deg),
            ("slant_range_km", self.slant_range_km, bounds.slant_range_km),
            ("rain_rate_mm_h", self.rain_rate_mm_h, bounds.rain_rate_mm_h),
            ("rsrp_dbm", self.rsrp_dbm, bounds.rsrp_dbm),
            ("doppler_hz", self.doppler_hz, bounds.doppler_hz),
            ("tx_power_dbm", self.tx_power_dbm, bounds.tx_power_dbm),
        ];
        fields
            .iter()
            .filter(|(_, v, (lo, hi))| !(v.is_finite() && *v >= *lo && *v <= *hi))
            .map(|(name, _, _)| *name)
            .collect()
    }

    /// Normalised network input; each feature is roughly in [-1, 1].
    pub fn to_features(&self, bounds: &ObservationBounds) -> [f32; OBS_DIM] {
        let unit = |v: f64, (lo, hi): (f64, f64)| {
            if hi > lo {
                ((v - lo) / (hi - lo)).clamp(0.0, 1.0)
            } else {
                0.0
            }
        };
        let doppler_max = bounds.doppler_hz.1.max(1.0);
        let rsrp = ((self.rsrp_dbm - RSRP_FEATURE_CENTER_DBM) / RSRP_FEATURE_SCALE_DB).clamp(-5.0, 5.0);

        [
            unit(self.elevation_deg, bounds.elevation_deg) as f32,
            unit(self.slant_range_km, bounds.slant_range_km) as f32,
            unit(self.rain_rate_mm_h, bounds.rain_rate_mm_h) as f32,
            rsrp as f32,
            (self.doppler_hz / doppler_max).clamp(-1.0, 1.0) as f32,
            unit(self.tx_power_dbm, bounds.tx_power_dbm) as f32,
        ]
    }
}

/// Inclusive (min, max) range of every observation field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservationBounds {
    pub elevation_deg: (f64, f64),
    pub slant_range_km: (f64, f64),
    pub rain_rate_mm_h: (f64, f64),
    pub rsrp_dbm: (f64, f64),
    pub doppler_hz: (f64, f64),
    pub tx_power_dbm: (f64, f64),
}

impl ObservationBounds {
    pub fn from_channel(cfg: &ChannelConfig) -> Self {
        let max_doppler = max_doppler_hz(cfg.orbital_speed_km_s, cfg.carrier_freq_ghz);
        Self {
            elevation_deg: (0.0, 90.0),
            slant_range_km: (cfg.altitude_km, slant_range_km(cfg.altitude_km, 0.0)),
            rain_rate_mm_h: (0.0, MAX_RAIN_RATE_MM_H),
            rsrp_dbm: (RSRP_FLOOR_DBM, RSRP_CEIL_DBM),
            doppler_hz: (-max_doppler, max_doppler),
            tx_power_dbm: (cfg.min_tx_power_dbm, cfg.max_tx_power_dbm),
        }
    }
}
