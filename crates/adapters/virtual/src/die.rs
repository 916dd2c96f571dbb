//! Simulated die state.

use tokio::sync::mpsc;

use dicefleet_app::ports::{CharacteristicInfo, ServiceInfo};
use dicefleet_domain::codec::{
    AdvertisementData, BATTERY_LEVEL_TAG, NOTIFY_CHARACTERISTIC_UUID, ROLL_STATE_TAG,
    SERVICE_UUID, WRITE_CHARACTERISTIC_UUID,
};
use dicefleet_domain::die::{BatteryEvent, RollEvent, RollState};

use crate::config::VirtualDieConfig;

/// Company identifier put in front of the manufacturer data.
const COMPANY_ID: u16 = 0xFFFF;

/// Firmware build timestamp advertised by every virtual die.
const BUILD_TIMESTAMP: u32 = 1_700_000_000;

/// A misbehavior a virtual die can be told to exhibit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Connection attempts fail at the radio level.
    RefuseConnect,
    /// The die service is absent once connected.
    MissingService,
    /// The write characteristic is absent.
    MissingWriteCharacteristic,
    /// The notify characteristic cannot notify.
    NotifyUnsupported,
    /// Writes are rejected.
    WriteRejected,
}

pub(crate) struct DieState {
    pub(crate) config: VirtualDieConfig,
    pub(crate) roll: RollEvent,
    pub(crate) battery: BatteryEvent,
    pub(crate) fault: Option<Fault>,
    pub(crate) connected: bool,
    /// Incremented on every connection; links from older sessions are dead.
    pub(crate) session: u64,
    pub(crate) notifier: Option<mpsc::UnboundedSender<Vec<u8>>>,
    pub(crate) commands: Vec<Vec<u8>>,
}

impl DieState {
    pub(crate) fn new(config: VirtualDieConfig) -> Self {
        let battery = BatteryEvent {
            level: config.battery_level.min(100),
            charging: false,
        };
        Self {
            config,
            roll: RollEvent {
                state: RollState::OnFace,
                face: 0,
            },
            battery,
            fault: None,
            connected: false,
            session: 0,
            notifier: None,
            commands: Vec::new(),
        }
    }

    pub(crate) fn advertisement(&self) -> AdvertisementData {
        let mut service_data = self.config.id.to_le_bytes().to_vec();
        service_data.extend_from_slice(&BUILD_TIMESTAMP.to_le_bytes());

        let mut manufacturer_data = COMPANY_ID.to_le_bytes().to_vec();
        manufacturer_data.extend_from_slice(&[
            self.config.led_count,
            self.config.design_color,
            self.roll.state.code(),
            self.roll.face,
            self.battery.level | if self.battery.charging { 0x80 } else { 0 },
        ]);

        AdvertisementData {
            local_name: Some(self.config.name.clone()),
            services: vec![SERVICE_UUID],
            service_data: Some(service_data),
            manufacturer_data: Some(manufacturer_data),
        }
    }

    pub(crate) fn service(&self) -> Option<ServiceInfo> {
        if self.fault == Some(Fault::MissingService) {
            return None;
        }
        let mut characteristics = vec![CharacteristicInfo {
            uuid: NOTIFY_CHARACTERISTIC_UUID,
            service_uuid: SERVICE_UUID,
            can_notify: self.fault != Some(Fault::NotifyUnsupported),
            can_write: false,
        }];
        if self.fault != Some(Fault::MissingWriteCharacteristic) {
            characteristics.push(CharacteristicInfo {
                uuid: WRITE_CHARACTERISTIC_UUID,
                service_uuid: SERVICE_UUID,
                can_notify: false,
                can_write: true,
            });
        }
        Some(ServiceInfo {
            uuid: SERVICE_UUID,
            characteristics,
        })
    }

    /// Update the roll state and notify it.
    pub(crate) fn set_roll(&mut self, roll: RollEvent) {
        self.roll = roll;
        self.notify(vec![ROLL_STATE_TAG, roll.state.code(), roll.face]);
    }

    /// Update the battery state and notify it.
    pub(crate) fn set_battery(&mut self, battery: BatteryEvent) {
        self.battery = battery;
        self.notify(vec![
            BATTERY_LEVEL_TAG,
            battery.level,
            u8::from(battery.charging),
        ]);
    }

    pub(crate) fn notify(&mut self, payload: Vec<u8>) {
        if let Some(notifier) = &self.notifier
            && notifier.send(payload).is_err()
        {
            self.notifier = None;
        }
    }

    pub(crate) fn disconnect(&mut self) {
        self.connected = false;
        self.notifier = None;
    }
}
