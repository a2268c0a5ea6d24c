//! NVS (Non-Volatile Storage) settings adapter.
//!
//! Implements [`SettingsPort`] for [`MachineSettings`], encoded with
//! `postcard` under one key of the `fullwash` namespace.
//!
//! - **`target_os = "espidf"`**: default NVS partition through
//!   `esp_idf_svc::nvs::EspNvs`.
//! - **`not(target_os = "espidf")`**: an in-memory map, so host tests
//!   exercise the same encode/validate path.
//!
//! Settings are validated before every save; a stored blob that fails to
//! decode or validate is reported, and callers fall back to defaults.

use log::{info, warn};

use crate::app::ports::{ConfigError, SettingsPort};
use crate::config::MachineSettings;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

const NAMESPACE: &str = "fullwash";
const SETTINGS_KEY: &str = "settings";

/// Upper bound on the encoded settings blob.
const MAX_BLOB_SIZE: usize = 256;

pub struct NvsSettingsStore {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,

    #[cfg(target_os = "espidf")]
    nvs: std::sync::Mutex<EspNvs<NvsDefault>>,
}

impl NvsSettingsStore {
    /// Open the settings namespace on the default partition.
    #[cfg(target_os = "espidf")]
    pub fn new(partition: EspDefaultNvsPartition) -> Result<Self, ConfigError> {
        let nvs = EspNvs::new(partition, NAMESPACE, true).map_err(|e| {
            warn!("NVS: cannot open namespace {NAMESPACE}: {e}");
            ConfigError::IoError
        })?;
        info!("NvsSettingsStore: ESP-IDF NVS namespace {NAMESPACE} open");
        Ok(Self {
            nvs: std::sync::Mutex::new(nvs),
        })
    }

    /// In-memory store for host builds.
    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Result<Self, ConfigError> {
        info!("NvsSettingsStore: simulation backend");
        Ok(Self {
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    /// Load settings, falling back to defaults if the stored copy is
    /// unusable. Never fails.
    pub fn load_or_default(&self) -> MachineSettings {
        match self.load() {
            Ok(s) => s,
            Err(e) => {
                warn!("NvsSettingsStore: {e}, using defaults");
                MachineSettings::default()
            }
        }
    }

    fn read_blob(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        #[cfg(not(target_os = "espidf"))]
        {
            Ok(self.store.borrow().get(&composite_key()).cloned())
        }

        #[cfg(target_os = "espidf")]
        {
            let nvs = self.nvs.lock().map_err(|_| ConfigError::IoError)?;
            let mut buf = [0u8; MAX_BLOB_SIZE];
            match nvs.get_raw(SETTINGS_KEY, &mut buf) {
                Ok(found) => Ok(found.map(<[u8]>::to_vec)),
                Err(e) => {
                    warn!("NVS: read error {e}");
                    Err(ConfigError::IoError)
                }
            }
        }
    }

    fn write_blob(&self, bytes: &[u8]) -> Result<(), ConfigError> {
        if bytes.len() > MAX_BLOB_SIZE {
            return Err(ConfigError::StorageFull);
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.store.borrow_mut().insert(composite_key(), bytes.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let mut nvs = self.nvs.lock().map_err(|_| ConfigError::IoError)?;
            nvs.set_raw(SETTINGS_KEY, bytes).map(|_| ()).map_err(|e| {
                warn!("NVS: write error {e}");
                ConfigError::IoError
            })
        }
    }

    /// Overwrite the stored blob without validation (corruption tests).
    #[cfg(all(test, not(target_os = "espidf")))]
    fn poke(&self, bytes: &[u8]) {
        self.store.borrow_mut().insert(composite_key(), bytes.to_vec());
    }
}

#[cfg(not(target_os = "espidf"))]
fn composite_key() -> String {
    format!("{}::{}", NAMESPACE, SETTINGS_KEY)
}

impl SettingsPort for NvsSettingsStore {
    fn load(&self) -> Result<MachineSettings, ConfigError> {
        let Some(bytes) = self.read_blob()? else {
            info!("NvsSettingsStore: no stored settings, using defaults");
            return Ok(MachineSettings::default());
        };
        let settings: MachineSettings =
            postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
        settings.validate()?;
        info!("NvsSettingsStore: loaded settings ({} bytes)", bytes.len());
        Ok(settings)
    }

    fn save(&self, settings: &MachineSettings) -> Result<(), ConfigError> {
        settings.validate()?;
        let bytes = postcard::to_allocvec(settings).map_err(|_| ConfigError::IoError)?;
        self.write_blob(&bytes)?;
        info!("NvsSettingsStore: settings saved ({} bytes)", bytes.len());
        Ok(())
    }
}
