//! Static directory of the GATT services and characteristics we read.
//!
//! The sensor exposes the standard Environmental Sensing service (0x181A)
//! with Temperature (0x2A6E) and Humidity (0x2A6F), and the Battery
//! service (0x180F) with Battery Level (0x2A19).

/// Environmental Sensing service UUID.
pub const SERVICE_UUID_ENVIRONMENTAL: u16 = 0x181A;
/// Battery service UUID.
pub const SERVICE_UUID_BATTERY: u16 = 0x180F;

/// Temperature characteristic UUID (sint16, 0.01 °C).
pub const CHAR_UUID_TEMPERATURE: u16 = 0x2A6E;
/// Humidity characteristic UUID (uint16, 0.01 %RH).
pub const CHAR_UUID_HUMIDITY: u16 = 0x2A6F;
/// Battery Level characteristic UUID (uint8, %).
pub const CHAR_UUID_BATTERY_LEVEL: u16 = 0x2A19;

/// Services of interest on the peripheral.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServiceKind {
    Environmental,
    Battery,
}

/// Characteristics of interest on the peripheral.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CharacteristicKind {
    Temperature,
    Humidity,
    BatteryLevel,
}

/// One row of the directory.
pub struct ServiceEntry {
    pub kind: ServiceKind,
    pub uuid: u16,
    pub characteristics: &'static [(CharacteristicKind, u16)],
}

/// The full directory, in characteristic-discovery order.
pub static DIRECTORY: [ServiceEntry; 2] = [
    ServiceEntry {
        kind: ServiceKind::Environmental,
        uuid: SERVICE_UUID_ENVIRONMENTAL,
        characteristics: &[
            (CharacteristicKind::Temperature, CHAR_UUID_TEMPERATURE),
            (CharacteristicKind::Humidity, CHAR_UUID_HUMIDITY),
        ],
    },
    ServiceEntry {
        kind: ServiceKind::Battery,
        uuid: SERVICE_UUID_BATTERY,
        characteristics: &[(CharacteristicKind::BatteryLevel, CHAR_UUID_BATTERY_LEVEL)],
    },
];

impl ServiceKind {
    pub const ALL: [ServiceKind; 2] = [ServiceKind::Environmental, ServiceKind::Battery];

    /// Classify a discovered primary service by its 16-bit UUID.
    pub fn from_uuid16(uuid: u16) -> Option<Self> {
        DIRECTORY.iter().find(|e| e.uuid == uuid).map(|e| e.kind)
    }

    pub fn uuid16(self) -> u16 {
        self.entry().uuid
    }

    pub fn entry(self) -> &'static ServiceEntry {
        &DIRECTORY[self.index()]
    }

    pub(crate) fn index(self) -> usize {
        match self {
            ServiceKind::Environmental => 0,
            ServiceKind::Battery => 1,
        }
    }
}

impl CharacteristicKind {
    /// Fixed order in which values are read once per connection.
    pub const READ_ORDER: [CharacteristicKind; 3] = [
        CharacteristicKind::Temperature,
        CharacteristicKind::Humidity,
        CharacteristicKind::BatteryLevel,
    ];

    /// Classify a characteristic found inside `service`.
    ///
    /// A UUID only counts when it belongs to the service being walked, so a
    /// stray 0x2A19 inside the environmental range is ignored.
    pub fn classify(service: ServiceKind, uuid: u16) -> Option<Self> {
        service
            .entry()
            .characteristics
            .iter()
            .find(|(_, u)| *u == uuid)
            .map(|(kind, _)| *kind)
    }

    pub fn uuid16(self) -> u16 {
        match self {
            CharacteristicKind::Temperature => CHAR_UUID_TEMPERATURE,
            CharacteristicKind::Humidity => CHAR_UUID_HUMIDITY,
            CharacteristicKind::BatteryLevel => CHAR_UUID_BATTERY_LEVEL,
        }
    }

    pub fn service(self) -> ServiceKind {
        match self {
            CharacteristicKind::Temperature | CharacteristicKind::Humidity => {
                ServiceKind::Environmental
            }
            CharacteristicKind::BatteryLevel => ServiceKind::Battery,
        }
    }

    /// Minimum payload width in bytes.
    pub fn value_len(self) -> usize {
        match self {
            CharacteristicKind::Temperature | CharacteristicKind::Humidity => 2,
            CharacteristicKind::BatteryLevel => 1,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            CharacteristicKind::Temperature => 0,
            CharacteristicKind::Humidity => 1,
            CharacteristicKind::BatteryLevel => 2,
        }
    }
}
