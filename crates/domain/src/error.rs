//! Error types raised by the domain layer.
//!
//! Only the wire codec can fail here: advertisements that do not belong to a
//! die are rejected with an [`AdvertisementError`]. Callers treat that as
//! "not ours" and discard the advertisement.

use uuid::Uuid;

/// Why an advertisement was not recognised as coming from a die.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdvertisementError {
    /// The advertised services do not include the die service UUID.
    #[error("advertisement does not expose service {expected}")]
    UnexpectedService {
        /// The UUID dice are expected to advertise.
        expected: Uuid,
    },

    /// The die service is advertised but no service data came with it.
    #[error("advertisement carries no service data")]
    MissingServiceData,

    /// The service data is too short to hold a die identifier.
    #[error("service data must be at least {expected} bytes, got {actual}")]
    ServiceDataTooShort {
        /// Minimum byte count.
        expected: usize,
        /// Actual byte count.
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_missing_service_data() {
        assert_eq!(
            AdvertisementError::MissingServiceData.to_string(),
            "advertisement carries no service data"
        );
    }

    #[test]
    fn should_display_short_service_data() {
        let err = AdvertisementError::ServiceDataTooShort {
            expected: 4,
            actual: 2,
        };
        assert_eq!(err.to_string(), "service data must be at least 4 bytes, got 2");
    }

    #[test]
    fn should_name_expected_uuid_for_unexpected_service() {
        let expected = Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e_24dc_ca9e);
        let err = AdvertisementError::UnexpectedService { expected };
        assert!(err.to_string().contains("6e400001-b5a3-f393-e0a9-e50e24dcca9e"));
    }
}
