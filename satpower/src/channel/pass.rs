// src/channel/pass.rs
//
// Parabolic satellite pass.
//
// Elevation rises from the configured minimum to a per-episode peak at the
// midpoint of the episode and falls back symmetrically:
//
//     u  = 2 t / T - 1              (t = step, T = episode length)
//     el = el_min + (el_peak - el_min) * (1 - u^2)
//
// Slant range follows from geometry and Doppler from the line-of-sight
// velocity, positive while approaching.

use serde::{Deserialize, Serialize};

use super::physics::{doppler_shift_hz, slant_range_km};
use crate::config::ChannelConfig;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassState {
    pub elevation_deg: f64,
    pub slant_range_km: f64,
    pub doppler_hz: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassProfile {
    pub peak_elevation_deg: f64,
    min_elevation_deg: f64,
    steps: usize,
    altitude_km: f64,
    orbital_speed_km_s: f64,
    carrier_freq_ghz: f64,
}

impl PassProfile {
    pub fn new(cfg: &ChannelConfig, peak_elevation_deg: f64, steps: usize) -> Self {
        Self {
            peak_elevation_deg: peak_elevation_deg.clamp(cfg.min_elevation_deg, 90.0),
            min_elevation_deg: cfg.min_elevation_deg,
            steps: steps.max(1),
            altitude_km: cfg.altitude_km,
            orbital_speed_km_s: cfg.orbital_speed_km_s,
            carrier_freq_ghz: cfg.carrier_freq_ghz,
        }
    }

    /// Position along the pass in [-1, 1]; steps past the end stay at 1.
    fn phase(&self, step: usize) -> f64 {
        let t = step.min(self.steps) as f64;
        2.0 * t / self.steps as f64 - 1.0
    }

    pub fn state_at(&self, step: usize) -> PassState {
        let u = self.phase(step);
        let span = self.peak_elevation_deg - self.min_elevation_deg;
        let elevation_deg = (self.min_elevation_deg + span * (1.0 - u * u)).clamp(0.0, 90.0);
        let approach = if u < 0.0 {
            1.0
        } else if u > 0.0 {
            -1.0
        } else {
            0.0
        };

        PassState {
            elevation_deg,
            slant_range_km: slant_range_km(self.altitude_km, elevation_deg),
            doppler_hz: doppler_shift_hz(
                elevation_deg,
                self.orbital_speed_km_s,
                self.carrier_freq_ghz,
                approach,
            ),
        }
    }
}
