// src/channel/physics.rs
//
// Link budget primitives for a LEO downlink.
//
// - Free-space path loss from slant range and carrier frequency
// - Rain specific attenuation gamma = k * R^alpha (ITU-R P.838 style
//   coefficients, log-interpolated in frequency) over the slant rain path
// - Elevation-dependent ground terminal gain
// - Spherical-earth slant range and line-of-sight Doppler
//
// All functions are pure; the environment composes them per step.

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;

/// Free-space path loss in dB.
///
/// FSPL = 92.45 + 20 log10(f_GHz) + 20 log10(d_km)
pub fn free_space_path_loss_db(distance_km: f64, freq_ghz: f64) -> f64 {
    92.45 + 20.0 * freq_ghz.log10() + 20.0 * distance_km.log10()
}

/// Slant range from ground station to satellite (km) at the given elevation.
pub fn slant_range_km(altitude_km: f64, elevation_deg: f64) -> f64 {
    let re = EARTH_RADIUS_KM;
    let el = elevation_deg.to_radians();
    let rs = re + altitude_km;
    (rs * rs - re * re * el.cos().powi(2)).sqrt() - re * el.sin()
}

/// Frequency-dependent rain coefficients (k, alpha), circular polarisation.
///
/// Table points between 1 and 100 GHz; k is interpolated log-log and alpha
/// log-linear, both clamped at the table ends.
pub fn rain_coefficients(freq_ghz: f64) -> (f64, f64) {
    const TABLE: [(f64, f64, f64); 9] = [
        (1.0, 0.0000387, 0.912),
        (2.0, 0.000154, 0.963),
        (4.0, 0.000650, 1.121),
        (6.0, 0.00175, 1.308),
        (10.0, 0.0101, 1.276),
        (20.0, 0.0751, 1.099),
        (30.0, 0.187, 1.021),
        (40.0, 0.350, 0.939),
        (100.0, 1.12, 0.743),
    ];

    if freq_ghz <= TABLE[0].0 {
        return (TABLE[0].1, TABLE[0].2);
    }
    let last = TABLE[TABLE.len() - 1];
    if freq_ghz >= last.0 {
        return (last.1, last.2);
    }

    for pair in TABLE.windows(2) {
        let (f_lo, k_lo, a_lo) = pair[0];
        let (f_hi, k_hi, a_hi) = pair[1];
        if freq_ghz >= f_lo && freq_ghz <= f_hi {
            let t = (freq_ghz / f_lo).ln() / (f_hi / f_lo).ln();
            let k = (k_lo.ln() + t * (k_hi.ln() - k_lo.ln())).exp();
            let alpha = a_lo + t * (a_hi - a_lo);
            return (k, alpha);
        }
    }
    (last.1, last.2)
}

/// Specific attenuation in rain (dB/km).
pub fn rain_specific_attenuation_db_km(rain_rate_mm_h: f64, freq_ghz: f64) -> f64 {
    if rain_rate_mm_h <= 0.0 {
        return 0.0;
    }
    let (k, alpha) = rain_coefficients(freq_ghz);
    k * rain_rate_mm_h.powf(alpha)
}

/// Total rain attenuation along the slant path through the rain layer (dB).
pub fn rain_attenuation_db(
    rain_rate_mm_h: f64,
    elevation_deg: f64,
    freq_ghz: f64,
    rain_height_km: f64,
) -> f64 {
    let sin_el = elevation_deg.to_radians().sin().max(1e-3);
    rain_specific_attenuation_db_km(rain_rate_mm_h, freq_ghz) * rain_height_km / sin_el
}

/// Ground terminal gain (dBi), peak at zenith, rolling off towards the horizon.
pub fn antenna_gain_dbi(elevation_deg: f64, peak_gain_dbi: f64, rolloff_db: f64) -> f64 {
    let sin_el = elevation_deg.to_radians().sin().clamp(0.0, 1.0);
    peak_gain_dbi - rolloff_db * (1.0 - sin_el)
}

/// Largest Doppler magnitude for the given speed and carrier (Hz).
pub fn max_doppler_hz(orbital_speed_km_s: f64, freq_ghz: f64) -> f64 {
    freq_ghz * 1e9 * orbital_speed_km_s / SPEED_OF_LIGHT_KM_S
}

/// Doppler shift (Hz) from the line-of-sight velocity component.
///
/// `approach` is +1 while the satellite approaches, -1 while it recedes and 0
/// at culmination.
pub fn doppler_shift_hz(
    elevation_deg: f64,
    orbital_speed_km_s: f64,
    freq_ghz: f64,
    approach: f64,
) -> f64 {
    let radial = elevation_deg.to_radians().cos().clamp(0.0, 1.0);
    approach.clamp(-1.0, 1.0) * radial * max_doppler_hz(orbital_speed_km_s, freq_ghz)
}

pub fn dbm_to_mw(dbm: f64) -> f64 {
    10f64.powf(dbm / 10.0)
}

pub fn mw_to_dbm(mw: f64) -> f64 {
    10.0 * mw.log10()
}

/// Per-step link budget terms, all in dB or dBm.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LinkBudget {
    pub tx_power_dbm: f64,
    pub tx_gain_dbi: f64,
    pub rx_gain_dbi: f64,
    pub path_loss_db: f64,
    pub rain_loss_db: f64,
    pub misc_losses_db: f64,
    pub rsrp_dbm: f64,
}

impl LinkBudget {
    pub fn compute(
        tx_power_dbm: f64,
        tx_gain_dbi: f64,
        rx_gain_dbi: f64,
        path_loss_db: f64,
        rain_loss_db: f64,
        misc_losses_db: f64,
    ) -> Self {
        let rsrp_dbm =
            tx_power_dbm + tx_gain_dbi + rx_gain_dbi - path_loss_db - rain_loss_db - misc_losses_db;
        Self {
            tx_power_dbm,
            tx_gain_dbi,
            rx_gain_dbi,
            path_loss_db,
            rain_loss_db,
            misc_losses_db,
            rsrp_dbm,
        }
    }

    pub fn is_finite(&self) -> bool {
        [
            self.tx_power_dbm,
            self.tx_gain_dbi,
            self.rx_gain_dbi,
            self.path_loss_db,
            self.rain_loss_db,
            self.misc_losses_db,
            self.rsrp_dbm,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}
