//! BLE adapter error types.

use dicefleet_app::ports::TransportError;

/// Errors specific to the BLE adapter.
#[derive(Debug, thiserror::Error)]
pub enum BleError {
    /// No BLE adapter found on the host.
    #[error("no BLE adapter available")]
    NotAvailable,

    /// No BLE adapter matches the configured name.
    #[error("no BLE adapter matching {0:?}")]
    AdapterNotFound(String),

    /// A btleplug operation failed.
    #[error("BLE operation failed")]
    Radio(#[from] btleplug::Error),

    /// The peripheral does not expose the characteristic.
    #[error("characteristic {uuid} not found")]
    CharacteristicNotFound {
        /// UUID that was looked up.
        uuid: uuid::Uuid,
    },
}

impl From<BleError> for TransportError {
    fn from(err: BleError) -> Self {
        match err {
            BleError::NotAvailable => Self::NotAvailable,
            BleError::Radio(btleplug::Error::NotConnected) => Self::NotConnected,
            other => Self::Radio(Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_not_available_error() {
        let err = BleError::NotAvailable;
        assert_eq!(err.to_string(), "no BLE adapter available");
    }

    #[test]
    fn should_display_adapter_not_found_error() {
        let err = BleError::AdapterNotFound("hci9".to_owned());
        assert_eq!(err.to_string(), "no BLE adapter matching \"hci9\"");
    }

    #[test]
    fn should_display_radio_error() {
        let err = BleError::Radio(btleplug::Error::DeviceNotFound);
        assert_eq!(err.to_string(), "BLE operation failed");
    }

    #[test]
    fn should_convert_not_available_to_transport_error() {
        let err: TransportError = BleError::NotAvailable.into();
        assert!(matches!(err, TransportError::NotAvailable));
    }

    #[test]
    fn should_convert_not_connected_to_transport_error() {
        let err: TransportError = BleError::Radio(btleplug::Error::NotConnected).into();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[test]
    fn should_wrap_other_errors_as_radio_errors() {
        let err: TransportError = BleError::Radio(btleplug::Error::DeviceNotFound).into();
        assert!(matches!(err, TransportError::Radio(_)));

        let err: TransportError = BleError::CharacteristicNotFound {
            uuid: uuid::Uuid::nil(),
        }
        .into();
        assert!(matches!(err, TransportError::Radio(_)));
    }
}
