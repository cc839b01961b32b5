//! Radio signal and timing calculations.
//!
//! Contains helpers for:
//! - Log-distance path loss with optional log-normal shadowing
//! - LoRa airtime from the SX127x symbol formula
//! - Bit and packet error rates from SNR
//! - Coverage distance estimation from a simple link budget
//!
//! Units:
//! - Power: dBm
//! - Time: seconds (f64)
//! - Distance: meters
//! - Bandwidth: kHz

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;

use super::types::PREAMBLE_SYMBOLS;

/// Parameters defining the radio channel propagation model.
///
/// These constants feed the log-distance path loss model with log-normal
/// shadowing, and the coverage radius used when placing nodes.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct PathLossParameters {
    /// Path loss exponent (γ).
    ///
    /// - γ = 2.0: Free space
    /// - γ = 2.7 to 3.5: Urban areas
    pub path_loss_exponent: f64,

    /// Standard deviation for log-normal shadowing (σ) in dB. 0.0 disables shadowing.
    pub shadowing_sigma: f64,

    /// Path loss at the reference distance d₀ in dB.
    pub path_loss_at_reference_distance: f64,

    /// Reference distance d₀ in meters.
    pub reference_distance: f64,

    /// Combined antenna/cable loss (GL) in dB.
    pub antenna_loss: f64,

    /// Transmit power (dBm) that defines the coverage radius nodes are placed in.
    pub placement_tx_power: f64,
}

impl Default for PathLossParameters {
    fn default() -> Self {
        Self {
            path_loss_exponent: 2.0,
            shadowing_sigma: 2.0,
            path_loss_at_reference_distance: 127.41,
            reference_distance: 150.0,
            antenna_loss: 0.0,
            placement_tx_power: 9.75,
        }
    }
}

/// Calculate the deterministic path loss (in dB) at a given distance.
///
/// # Formula
///
/// ```text
/// PL(d) = PL(d₀) + 10 × γ × log₁₀(d/d₀)
/// ```
///
/// Distances below one meter are clamped to one meter.
pub(crate) fn calculate_mean_path_loss(distance: f64, params: &PathLossParameters) -> f64 {
    let distance = distance.max(1.0);
    params.path_loss_at_reference_distance + 10.0 * params.path_loss_exponent * (distance / params.reference_distance).log10()
}

/// Sample a log-normal shadowing term as Normal(0, σ) in dB.
///
/// Returns 0.0 without touching the RNG when shadowing is disabled.
pub(crate) fn sample_shadowing<R: Rng + ?Sized>(params: &PathLossParameters, rng: &mut R) -> f64 {
    if params.shadowing_sigma > 0.0 {
        match Normal::new(0.0, params.shadowing_sigma) {
            Ok(normal) => normal.sample(rng),
            Err(_) => 0.0,
        }
    } else {
        0.0
    }
}

/// Calculate the path loss (in dB) at a given distance with a fresh shadowing sample.
///
/// # Formula
///
/// ```text
/// PL(d) = PL(d₀) + 10 × γ × log₁₀(d/d₀) + X_σ
/// ```
///
/// Each call samples a new shadowing value, so repeated calls with the same
/// distance yield different results.
pub(crate) fn calculate_path_loss<R: Rng + ?Sized>(distance: f64, params: &PathLossParameters, rng: &mut R) -> f64 {
    calculate_mean_path_loss(distance, params) + sample_shadowing(params, rng)
}

/// Instantaneous uplink RSSI (dBm) at the base station.
///
/// Formula: RSSI = P_tx − GL − PL(d), with a fresh shadowing draw.
pub(crate) fn calculate_rssi<R: Rng + ?Sized>(distance: f64, tx_power_dbm: f64, params: &PathLossParameters, rng: &mut R) -> f64 {
    tx_power_dbm - params.antenna_loss - calculate_path_loss(distance, params, rng)
}

/// Mean received power (dBm) without shadowing; used for parameter assignment.
pub(crate) fn calculate_mean_rssi(distance: f64, tx_power_dbm: f64, params: &PathLossParameters) -> f64 {
    tx_power_dbm - params.antenna_loss - calculate_mean_path_loss(distance, params)
}

/// Maximum distance at which the weakest sensitivity is still met.
///
/// Solves `P_tx − PL(d) = S_min` for d:
///
/// ```text
/// d = d₀ × 10^((P_tx − S_min − PL(d₀)) / (10γ))
/// ```
pub(crate) fn calculate_max_distance(min_sensitivity: f64, params: &PathLossParameters) -> f64 {
    let link_budget = params.placement_tx_power - min_sensitivity;
    params.reference_distance * 10.0_f64.powf((link_budget - params.path_loss_at_reference_distance) / (10.0 * params.path_loss_exponent))
}

/// Compute the airtime of a packet in seconds.
///
/// # Parameters
///
/// * `spreading_factor` - 6..12
/// * `coding_rate` - 1..4 representing 4/5..4/8
/// * `payload_length` - bytes, header included
/// * `bandwidth` - kHz
///
/// Low data rate optimization is enabled for 125 kHz at SF11/SF12, implicit
/// header only for SF6. A 16-bit CRC is always present.
pub(crate) fn calculate_air_time(spreading_factor: u8, coding_rate: u8, payload_length: u32, bandwidth: u32) -> f64 {
    let sf = spreading_factor as f64;
    let de = if bandwidth == 125 && (spreading_factor == 11 || spreading_factor == 12) { 1.0 } else { 0.0 };
    let ih = if spreading_factor == 6 { 1.0 } else { 0.0 };

    // Symbol time in milliseconds since bandwidth is in kHz
    let symbol_time = 2.0_f64.powi(spreading_factor as i32) / bandwidth as f64;
    let preamble_time = (PREAMBLE_SYMBOLS + 4.25) * symbol_time;

    // N_payload = 8 + max(ceil((8*PL - 4*SF + 28 + 16*CRC - 20*IH) / (4 * (SF - 2*DE))) * (CR + 4), 0)
    let numerator = 8.0 * payload_length as f64 - 4.0 * sf + 28.0 + 16.0 - 20.0 * ih;
    let denominator = 4.0 * (sf - 2.0 * de);
    let payload_symbols = 8.0 + ((numerator / denominator).ceil() * (coding_rate as f64 + 4.0)).max(0.0);

    (preamble_time + payload_symbols * symbol_time) / 1000.0
}

/// Gaussian tail probability Q(x) = P(Z > x).
fn q_function(x: f64) -> f64 {
    0.5 * libm::erfc(x / std::f64::consts::SQRT_2)
}

/// Bit error rate for an Eb/N0 (dB) at a spreading factor.
pub(crate) fn calculate_ber(eb_no: f64, spreading_factor: u8) -> f64 {
    let sf = spreading_factor as f64;
    q_function(sf.ln() / 12.0_f64.ln() / std::f64::consts::SQRT_2 * eb_no)
}

/// Bit error rate from SNR (dB), spreading factor, bandwidth (kHz) and coding rate.
pub(crate) fn calculate_ber_from_snr(snr: f64, spreading_factor: u8, bandwidth: u32, coding_rate: u8) -> f64 {
    let code_rate: f64 = match coding_rate {
        2 => 4.0 / 6.0,
        3 => 4.0 / 7.0,
        4 => 4.0 / 8.0,
        _ => 4.0 / 5.0,
    };
    let bw_hz = bandwidth as f64 * 1000.0;
    let sf = spreading_factor as f64;

    let eb_no = snr - 10.0 * (bw_hz / 2.0_f64.powi(spreading_factor as i32)).log10() - 10.0 * sf.log10() - 10.0 * code_rate.log10()
        + 10.0 * bw_hz.log10();
    calculate_ber(eb_no, spreading_factor)
}

/// Packet error rate for an RSSI and payload length.
///
/// The SNR is taken against the thermal noise floor (−174 dBm/Hz) plus a 6 dB
/// receiver noise figure; the bit error rate is then raised to the payload bit count:
///
/// ```text
/// PER = 1 − (1 − BER)^(8 × PL)
/// ```
pub(crate) fn calculate_per(spreading_factor: u8, bandwidth: u32, coding_rate: u8, rssi: f64, payload_length: u32) -> f64 {
    let snr = rssi + 174.0 - 10.0 * (bandwidth as f64 * 1000.0).log10() - 6.0;
    let ber = calculate_ber_from_snr(snr, spreading_factor, bandwidth, coding_rate);
    1.0 - (1.0 - ber).powf(payload_length as f64 * 8.0)
}

/// Duration of a full preamble (receiver listening cost) in seconds.
pub(crate) fn get_preamble_time(spreading_factor: u8, bandwidth: u32) -> f64 {
    let symbol_time = 2.0_f64.powi(spreading_factor as i32) / (bandwidth as f64 * 1000.0);
    (PREAMBLE_SYMBOLS + 4.25) * symbol_time
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn no_shadowing() -> PathLossParameters {
        PathLossParameters {
            shadowing_sigma: 0.0,
            ..PathLossParameters::default()
        }
    }

    #[test]
    fn airtime_matches_reference_value() {
        // SF7, 125 kHz, 27 bytes, CR 4/5: 12.25 preamble + 53 payload symbols of 1.024 ms
        let t = calculate_air_time(7, 1, 27, 125);
        assert!((t - 0.066816).abs() < 1e-6, "airtime {}", t);
    }

    #[test]
    fn airtime_positive_and_non_decreasing_in_sf() {
        for bw in [125, 250, 500] {
            for payload in [1, 7, 27, 64, 255] {
                let mut previous = 0.0;
                for sf in 7..=12 {
                    let t = calculate_air_time(sf, 1, payload, bw);
                    assert!(t > 0.0);
                    assert!(t >= previous, "sf {} bw {} payload {}", sf, bw, payload);
                    previous = t;
                }
            }
        }
    }

    #[test]
    fn airtime_increases_with_payload() {
        assert!(calculate_air_time(9, 1, 100, 125) > calculate_air_time(9, 1, 10, 125));
    }

    #[test]
    fn mean_path_loss_at_reference_distance() {
        let params = no_shadowing();
        assert!((calculate_mean_path_loss(150.0, &params) - 127.41).abs() < 1e-9);
        assert!((calculate_mean_path_loss(1500.0, &params) - 147.41).abs() < 1e-9);
    }

    #[test]
    fn rssi_without_shadowing_is_deterministic() {
        let params = no_shadowing();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let a = calculate_rssi(500.0, 14.0, &params, &mut rng);
        let b = calculate_rssi(500.0, 14.0, &params, &mut rng);
        assert_eq!(a, b);
        assert_eq!(a, calculate_mean_rssi(500.0, 14.0, &params));
    }

    #[test]
    fn shadowing_varies_between_draws() {
        let params = PathLossParameters::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let a = calculate_path_loss(500.0, &params, &mut rng);
        let b = calculate_path_loss(500.0, &params, &mut rng);
        assert_ne!(a, b);
    }

    #[test]
    fn max_distance_matches_link_budget() {
        let params = PathLossParameters::default();
        let d = calculate_max_distance(-137.0, &params);
        // At the edge the mean received power equals the weakest sensitivity
        let prx = params.placement_tx_power - calculate_mean_path_loss(d, &params);
        assert!((prx - -137.0).abs() < 1e-6);
        assert!(d > 1000.0 && d < 2000.0);
    }

    #[test]
    fn per_falls_with_stronger_signal() {
        let weak = calculate_per(7, 125, 1, -125.0, 27);
        let strong = calculate_per(7, 125, 1, -100.0, 27);
        assert!(weak > strong);
        assert!((0.0..=1.0).contains(&weak));
        assert!(strong < 1e-6);
    }

    #[test]
    fn stronger_coding_lowers_ber() {
        let light = calculate_ber_from_snr(-12.0, 7, 125, 1);
        let heavy = calculate_ber_from_snr(-12.0, 7, 125, 4);
        assert!(light.is_finite() && heavy.is_finite());
        assert!(heavy < light);
        // Unknown codes fall back to 4/5
        assert_eq!(calculate_ber_from_snr(-12.0, 7, 125, 9), light);
    }

    #[test]
    fn q_function_reference_points() {
        assert!((q_function(0.0) - 0.5).abs() < 1e-12);
        assert!((q_function(1.0) - 0.158_655_253_9).abs() < 1e-9);
    }

    #[test]
    fn preamble_time_scales_with_symbol_time() {
        let t7 = get_preamble_time(7, 125);
        assert!((t7 - 0.012544).abs() < 1e-9);
        assert!((get_preamble_time(12, 125) / t7 - 32.0).abs() < 1e-9);
    }
}
