//! Empirical receiver tables used by the physical layer and collision engine.
//!
//! Both tables are plain data so a configuration file can swap them for a
//! different transceiver revision without touching the engine:
//! - `sensitivity`: minimum decodable RSSI (dBm) per spreading factor and bandwidth
//! - `isolation`: inter-SF isolation thresholds (dB) for capture/non-orthogonality

use serde::Deserialize;

/// Lowest spreading factor supported by the tables.
pub const MIN_SF: u8 = 7;
/// Highest spreading factor supported by the tables.
pub const MAX_SF: u8 = 12;
/// Bandwidths (kHz) that index the sensitivity table columns.
pub const BANDWIDTHS: [u32; 3] = [125, 250, 500];

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RadioTables {
    /// Rows SF7..SF12, columns BW125/BW250/BW500, in dBm.
    pub sensitivity: [[f64; 3]; 6],
    /// Row is the SF of the packet being judged, column the SF of the other packet.
    /// The diagonal is the same-SF capture threshold.
    pub isolation: [[f64; 6]; 6],
}

impl Default for RadioTables {
    fn default() -> Self {
        Self {
            sensitivity: [
                [-123.0, -120.0, -117.0],
                [-126.0, -123.0, -120.0],
                [-129.0, -126.0, -123.0],
                [-132.0, -129.0, -126.0],
                [-134.53, -131.52, -128.51],
                [-137.0, -134.0, -131.0],
            ],
            isolation: [
                [1.0, -8.0, -9.0, -9.0, -9.0, -9.0],
                [-11.0, 1.0, -11.0, -12.0, -13.0, -13.0],
                [-15.0, -13.0, 1.0, -13.0, -14.0, -15.0],
                [-19.0, -18.0, -17.0, 1.0, -17.0, -18.0],
                [-22.0, -22.0, -21.0, -20.0, 1.0, -20.0],
                [-25.0, -25.0, -25.0, -24.0, -23.0, 1.0],
            ],
        }
    }
}

impl RadioTables {
    /// Receiver sensitivity for a spreading factor and bandwidth.
    ///
    /// Unknown bandwidths fall back to the 125 kHz column; configuration
    /// validation keeps them out of a running simulation.
    pub fn sensitivity(&self, spreading_factor: u8, bandwidth: u32) -> f64 {
        let column = BANDWIDTHS.iter().position(|&bw| bw == bandwidth).unwrap_or(0);
        self.sensitivity[sf_index(spreading_factor)][column]
    }

    /// Isolation threshold of `judged` against interference from `other`.
    pub fn isolation(&self, judged: u8, other: u8) -> f64 {
        self.isolation[sf_index(judged)][sf_index(other)]
    }

    /// The weakest sensitivity over all spreading factors for a bandwidth.
    pub fn min_sensitivity(&self, bandwidth: u32) -> f64 {
        (MIN_SF..=MAX_SF).map(|sf| self.sensitivity(sf, bandwidth)).fold(f64::INFINITY, f64::min)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        for row in &self.sensitivity {
            if row.iter().any(|v| !v.is_finite()) {
                return Err("RADIO_TABLES.SENSITIVITY contains a non-finite value".to_string());
            }
        }
        for row in &self.isolation {
            if row.iter().any(|v| !v.is_finite()) {
                return Err("RADIO_TABLES.ISOLATION contains a non-finite value".to_string());
            }
        }
        Ok(())
    }
}

fn sf_index(spreading_factor: u8) -> usize {
    (spreading_factor.clamp(MIN_SF, MAX_SF) - MIN_SF) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensitivity_lookup_by_sf_and_bandwidth() {
        let tables = RadioTables::default();
        assert_eq!(tables.sensitivity(7, 125), -123.0);
        assert_eq!(tables.sensitivity(12, 500), -131.0);
        assert_eq!(tables.sensitivity(11, 250), -131.52);
    }

    #[test]
    fn isolation_matrix_is_asymmetric() {
        let tables = RadioTables::default();
        assert_eq!(tables.isolation(7, 8), -8.0);
        assert_eq!(tables.isolation(8, 7), -11.0);
        assert_eq!(tables.isolation(9, 9), 1.0);
    }

    #[test]
    fn min_sensitivity_is_sf12() {
        let tables = RadioTables::default();
        assert_eq!(tables.min_sensitivity(125), -137.0);
    }

    #[test]
    fn tables_deserialize_from_json() {
        let sensitivity = vec![vec![-1.0, -2.0, -3.0]; 6];
        let isolation = vec![vec![0.5; 6]; 6];
        let json = serde_json::json!({
            "SENSITIVITY": sensitivity,
            "ISOLATION": isolation,
        });
        let tables: RadioTables = serde_json::from_value(json).unwrap();
        assert_eq!(tables.sensitivity(10, 250), -2.0);
        assert_eq!(tables.isolation(7, 12), 0.5);
    }
}
