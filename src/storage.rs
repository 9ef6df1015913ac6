//! Flash persistence for [`Settings`].
//!
//! Uses the nRF52840's internal flash via the `sequential-storage` crate.
//! Each namespace owns one key of the map; the value is the serialized
//! record described in [`ble2mqtt::settings`].  `sequential-storage`
//! handles wear levelling and page GC.

use ble2mqtt::config::{STORAGE_FLASH_PAGE_COUNT, STORAGE_FLASH_PAGE_START};
use ble2mqtt::settings::{Settings, MAX_RECORD_SIZE};
use ble2mqtt::Error;
use core::ops::Range;
use defmt::{error, info, warn};
use embedded_storage_async::nor_flash::NorFlash;
use sequential_storage::cache::NoCache;

/// Flash page size for nRF52840 (4 KB).
const FLASH_PAGE_SIZE: u32 = 4096;

/// Start address of our storage region.
const STORAGE_START: u32 = STORAGE_FLASH_PAGE_START * FLASH_PAGE_SIZE;

/// End address (exclusive) of our storage region.
const STORAGE_END: u32 = (STORAGE_FLASH_PAGE_START + STORAGE_FLASH_PAGE_COUNT) * FLASH_PAGE_SIZE;

/// Map keys, one per settings namespace.
#[derive(Clone, Copy)]
#[repr(u8)]
enum Namespace {
    Acquisition = 0x01,
}

fn flash_range() -> Range<u32> {
    STORAGE_START..STORAGE_END
}

/// Read the stored settings. `None` when nothing usable is stored.
pub async fn load_settings(flash: &mut impl NorFlash) -> Option<Settings> {
    let mut buf = [0u8; MAX_RECORD_SIZE * 2];
    let key = Namespace::Acquisition as u8;

    match sequential_storage::map::fetch_item::<u8, &[u8], _>(
        flash,
        flash_range(),
        &mut NoCache::new(),
        &mut buf,
        &key,
    )
    .await
    {
        Ok(Some(data)) => {
            let settings = Settings::deserialize(data);
            if settings.is_none() {
                warn!("Stored settings record is corrupt, ignoring");
            }
            settings
        }
        Ok(None) => None,
        Err(e) => {
            error!("Flash read error: {:?}", defmt::Debug2Format(&e));
            None
        }
    }
}

/// Persist `settings`.
pub async fn save_settings(flash: &mut impl NorFlash, settings: &Settings) -> Result<(), Error> {
    let mut record = [0u8; MAX_RECORD_SIZE];
    let len = settings.serialize(&mut record);
    if len == 0 {
        return Err(Error::BufferOverflow);
    }
    let item = &record[..len];

    let mut buf = [0u8; MAX_RECORD_SIZE * 2];
    let key = Namespace::Acquisition as u8;
    sequential_storage::map::store_item::<u8, &[u8], _>(
        flash,
        flash_range(),
        &mut NoCache::new(),
        &mut buf,
        &key,
        &item,
    )
    .await
    .map_err(|e| {
        error!("Flash write error: {:?}", defmt::Debug2Format(&e));
        Error::Storage
    })
}

/// Load the settings, writing the defaults back on first boot so the next
/// boot finds a record.
pub async fn load_or_init(flash: &mut impl NorFlash) -> Settings {
    if let Some(settings) = load_settings(flash).await {
        info!(
            "Loaded settings: target {=str}, period {} s, timeout {} s",
            settings.target_name.as_str(),
            settings.acquisition_period_secs,
            settings.cycle_timeout_secs
        );
        return settings;
    }

    let settings = Settings::default();
    info!("No stored settings, using defaults");
    if save_settings(flash, &settings).await.is_ok() {
        info!("Defaults saved to flash");
    }
    settings
}
