//! Wire codec for the die protocol.
//!
//! Pure functions operating on raw `&[u8]` slices, with no radio dependency
//! needed. Three formats are handled:
//!
//! - **Advertisements**: service data (identity) and manufacturer data
//!   (description + current state), decoded by [`parse_advertisement`]
//! - **Notifications**: typed telemetry pushed by a connected die, decoded by
//!   [`parse_notification`]
//! - **Commands**: fixed-layout frames written to the die, produced by
//!   [`encode_blink`]
//!
//! All multi-byte fields are little-endian.

use uuid::Uuid;

use crate::command::BlinkParams;
use crate::die::{BatteryEvent, DeviceDescription, RollEvent, RollState};
use crate::error::AdvertisementError;
use crate::id::DeviceId;

/// Service UUID advertised by dice, also used for the GATT service lookup.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e_24dc_ca9e);

/// Characteristic the die pushes notifications on.
pub const NOTIFY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e_24dc_ca9e);

/// Characteristic commands are written to.
pub const WRITE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x6e40_0002_b5a3_f393_e0a9_e50e_24dc_ca9e);

/// Notification tag of a roll state message.
pub const ROLL_STATE_TAG: u8 = 3;
/// Notification tag of a battery level message.
pub const BATTERY_LEVEL_TAG: u8 = 34;
/// Command tag of a blink message.
pub const BLINK_TAG: u8 = 29;

/// Size of an encoded blink frame.
pub const BLINK_FRAME_LEN: usize = 14;

const DEVICE_ID_LEN: usize = 4;
const BUILD_TIMESTAMP_END: usize = 8;
const MANUFACTURER_DESCRIPTION_END: usize = 4;
const MANUFACTURER_ROLL_END: usize = 6;
const MANUFACTURER_BATTERY_END: usize = 7;

const BATTERY_LEVEL_MASK: u8 = 0x7F;
const BATTERY_CHARGING_BIT: u8 = 0x80;

/// Transport-neutral view of one advertisement.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AdvertisementData {
    /// Advertised local name.
    pub local_name: Option<String>,
    /// Advertised service UUIDs.
    pub services: Vec<Uuid>,
    /// Service data payload.
    pub service_data: Option<Vec<u8>>,
    /// Manufacturer data payload, including the 2-byte company identifier.
    pub manufacturer_data: Option<Vec<u8>>,
}

/// A die recognised from its advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAdvertisement {
    pub id: DeviceId,
    pub description: DeviceDescription,
    /// Roll state carried by the manufacturer data, if long enough.
    pub roll: Option<RollEvent>,
    /// Battery state carried by the manufacturer data, if long enough.
    pub battery: Option<BatteryEvent>,
}

/// A decoded notification payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    Roll(RollEvent),
    Battery(BatteryEvent),
    /// Any other message type, or a payload too short to decode.
    Unrecognized,
}

/// Decode an advertisement into a die identity and description.
///
/// Service data:
///
/// | Offset | Field | Type |
/// |--------|-------|------|
/// | 0–3 | Die id | u32 LE |
/// | 4–7 | Firmware build timestamp (optional) | u32 LE |
///
/// Manufacturer data (optional):
///
/// | Offset | Field | Type |
/// |--------|-------|------|
/// | 0–1 | Company id | u16 LE |
/// | 2 | LED count | u8 |
/// | 3 | Design / color | u8 |
/// | 4 | Roll state | u8 |
/// | 5 | Current face | u8 |
/// | 6 | Battery | bits 0–6 level %, bit 7 charging |
///
/// # Errors
///
/// Returns [`AdvertisementError`] when the die service is not advertised,
/// when service data is absent, or when it is shorter than 4 bytes.
pub fn parse_advertisement(
    advertisement: &AdvertisementData,
) -> Result<ParsedAdvertisement, AdvertisementError> {
    if !advertisement.services.contains(&SERVICE_UUID) {
        return Err(AdvertisementError::UnexpectedService {
            expected: SERVICE_UUID,
        });
    }

    let service_data = advertisement
        .service_data
        .as_deref()
        .ok_or(AdvertisementError::MissingServiceData)?;
    if service_data.len() < DEVICE_ID_LEN {
        return Err(AdvertisementError::ServiceDataTooShort {
            expected: DEVICE_ID_LEN,
            actual: service_data.len(),
        });
    }

    let id = DeviceId::from_le_bytes([
        service_data[0],
        service_data[1],
        service_data[2],
        service_data[3],
    ]);
    let build_timestamp = match service_data.get(DEVICE_ID_LEN..BUILD_TIMESTAMP_END) {
        Some(&[b0, b1, b2, b3]) => u32::from_le_bytes([b0, b1, b2, b3]),
        _ => 0,
    };

    let manufacturer = advertisement.manufacturer_data.as_deref().unwrap_or_default();
    let (led_count, design_color) = if manufacturer.len() >= MANUFACTURER_DESCRIPTION_END {
        (manufacturer[2], manufacturer[3])
    } else {
        (0, 0)
    };
    let roll = (manufacturer.len() >= MANUFACTURER_ROLL_END).then(|| RollEvent {
        state: RollState::from_code(manufacturer[4]),
        face: manufacturer[5],
    });
    let battery = (manufacturer.len() >= MANUFACTURER_BATTERY_END).then(|| BatteryEvent {
        level: manufacturer[6] & BATTERY_LEVEL_MASK,
        charging: manufacturer[6] & BATTERY_CHARGING_BIT != 0,
    });

    let name = advertisement.local_name.as_deref().unwrap_or_default();

    Ok(ParsedAdvertisement {
        id,
        description: DeviceDescription::new(name, led_count, design_color, build_timestamp),
        roll,
        battery,
    })
}

/// Decode a notification payload.
///
/// | Tag (byte 0) | Message | Byte 1 | Byte 2 |
/// |--------------|---------|--------|--------|
/// | 3 | Roll state | state code | face index |
/// | 34 | Battery level | level % | charging when non-zero |
///
/// Anything else, including payloads shorter than 3 bytes, is
/// [`Notification::Unrecognized`].
#[must_use]
pub fn parse_notification(payload: &[u8]) -> Notification {
    let &[tag, first, second, ..] = payload else {
        return Notification::Unrecognized;
    };

    match tag {
        ROLL_STATE_TAG => Notification::Roll(RollEvent {
            state: RollState::from_code(first),
            face: second,
        }),
        BATTERY_LEVEL_TAG => Notification::Battery(BatteryEvent {
            level: first,
            charging: second != 0,
        }),
        _ => Notification::Unrecognized,
    }
}

/// Encode a blink command into its 14-byte frame.
///
/// | Offset | Field | Type |
/// |--------|-------|------|
/// | 0 | Tag (29) | u8 |
/// | 1 | Count | u8 |
/// | 2–3 | Duration (ms) | u16 LE |
/// | 4–7 | Color (ARGB) | u32 LE |
/// | 8–11 | Face mask | u32 LE |
/// | 12 | Fade | u8 |
/// | 13 | Loop | u8 |
#[must_use]
pub fn encode_blink(params: &BlinkParams) -> [u8; BLINK_FRAME_LEN] {
    let mut frame = [0u8; BLINK_FRAME_LEN];
    frame[0] = BLINK_TAG;
    frame[1] = params.count;
    frame[2..4].copy_from_slice(&params.duration_ms.to_le_bytes());
    frame[4..8].copy_from_slice(&params.color.to_le_bytes());
    frame[8..12].copy_from_slice(&params.face_mask.to_le_bytes());
    frame[12] = params.fade;
    frame[13] = params.looping;
    frame
}
