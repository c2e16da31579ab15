//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`] for Misty.
//!
//! - Config validation: all fields are range-checked before persistence.
//! - Namespace isolation: schedules and system config use separate namespaces.
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.
//! - Iteration: [`StoragePort::find_entries`] walks blob keys with the
//!   `nvs_entry_find` iterator.  The simulation backend iterates in
//!   insertion order.

use crate::app::ports::{
    ConfigError, ConfigPort, EntryInfo, MAX_KEY_LEN, StorageError, StoragePort,
};
use crate::config::{SystemConfig, validate_config};
use log::info;

#[cfg(target_os = "espidf")]
use log::warn;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "misty";
const CONFIG_KEY: &str = "syscfg";

#[cfg(target_os = "espidf")]
const MAX_BLOB_SIZE: usize = 512;

#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone)]
struct SimEntry {
    namespace: String,
    key: String,
    value: Vec<u8>,
}

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<Vec<SimEntry>>,
}

/// NUL-terminated copy of a namespace or key, truncated to the NVS limit.
#[cfg(target_os = "espidf")]
fn c_name(s: &str) -> [u8; MAX_KEY_LEN + 1] {
    let mut buf = [0u8; MAX_KEY_LEN + 1];
    let b = s.as_bytes();
    let len = b.len().min(MAX_KEY_LEN);
    buf[..len].copy_from_slice(&b[..len]);
    buf
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// Returns `Err(StorageError::Unavailable)` if flash initialisation fails
    /// unrecoverably. On first boot or after a version mismatch the NVS
    /// partition is erased and re-initialised automatically.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("nvs: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StorageError::Unavailable);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::Unavailable);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::Unavailable);
            }
            info!("nvs: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("nvs: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(Vec::new()),
        })
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns = c_name(namespace);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(not(target_os = "espidf"))]
    fn position(&self, namespace: &str, key: &str) -> Option<usize> {
        self.store
            .borrow()
            .iter()
            .position(|e| e.namespace == namespace && e.key == key)
    }
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let mut buf = [0u8; 256];
        match self.read(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf) {
            Ok(len) => {
                let cfg: SystemConfig =
                    postcard::from_bytes(&buf[..len]).map_err(|_| ConfigError::Corrupted)?;
                validate_config(&cfg).map_err(ConfigError::ValidationFailed)?;
                info!("nvs: loaded config ({} bytes)", len);
                Ok(cfg)
            }
            Err(StorageError::NotFound) => {
                info!("nvs: no stored config, using defaults");
                Ok(SystemConfig::default())
            }
            Err(_) => Err(ConfigError::IoError),
        }
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        validate_config(config).map_err(ConfigError::ValidationFailed)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;

        #[cfg(not(target_os = "espidf"))]
        {
            let mut store = self.store.borrow_mut();
            store.retain(|e| !(e.namespace == CONFIG_NAMESPACE && e.key == CONFIG_KEY));
            store.push(SimEntry {
                namespace: CONFIG_NAMESPACE.into(),
                key: CONFIG_KEY.into(),
                value: bytes,
            });
            info!("nvs: config saved (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key = c_name(CONFIG_KEY);
            let result = Self::with_nvs_handle(CONFIG_NAMESPACE, true, |handle| {
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key.as_ptr() as *const _,
                        bytes.as_ptr() as *const _,
                        bytes.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("nvs: config saved ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) => {
                    warn!("nvs: config write error {}", e);
                    Err(ConfigError::IoError)
                }
            }
        }
    }
}

impl StoragePort for NvsAdapter {
    fn open(&mut self, namespace: &str) -> Result<(), StorageError> {
        if namespace.is_empty() || namespace.len() > MAX_KEY_LEN {
            return Err(StorageError::Unavailable);
        }

        #[cfg(not(target_os = "espidf"))]
        {
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            // A read-write open creates the namespace if it doesn't exist.
            Self::with_nvs_handle(namespace, true, |_| Ok(())).map_err(|e| {
                warn!("nvs: open '{}' failed: {}", namespace, e);
                StorageError::Unavailable
            })
        }
    }

    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let store = self.store.borrow();
            let entry = store
                .iter()
                .find(|e| e.namespace == namespace && e.key == key)
                .ok_or(StorageError::NotFound)?;
            let len = entry.value.len().min(buf.len());
            buf[..len].copy_from_slice(&entry.value[..len]);
            Ok(len)
        }

        #[cfg(target_os = "espidf")]
        {
            let k = c_name(key);
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let mut size = buf.len().min(MAX_BLOB_SIZE);
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        k.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            });
            match result {
                Ok(size) => Ok(size),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            match self.position(namespace, key) {
                Some(i) => self.store.borrow_mut()[i].value = data.to_vec(),
                None => self.store.borrow_mut().push(SimEntry {
                    namespace: namespace.into(),
                    key: key.into(),
                    value: data.to_vec(),
                }),
            }
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let k = c_name(key);
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        k.as_ptr() as *const _,
                        data.as_ptr() as *const _,
                        data.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|e| {
                if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                    StorageError::Full
                } else {
                    StorageError::IoError
                }
            })
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            if let Some(i) = self.position(namespace, key) {
                self.store.borrow_mut().remove(i);
            }
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let k = c_name(key);
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let ret = unsafe { nvs_erase_key(handle, k.as_ptr() as *const _) };
                if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|_| StorageError::IoError)
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            self.position(namespace, key).is_some()
        }

        #[cfg(target_os = "espidf")]
        {
            let k = c_name(key);
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let ret =
                    unsafe { nvs_find_key(handle, k.as_ptr() as *const _, core::ptr::null_mut()) };
                Ok(ret == ESP_OK)
            });
            result.unwrap_or(false)
        }
    }

    fn find_entries(&self, namespace: &str) -> Result<Vec<EntryInfo>, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let mut out = Vec::new();
            for e in self.store.borrow().iter().filter(|e| e.namespace == namespace) {
                let mut key = heapless::String::new();
                if key.push_str(&e.key).is_err() {
                    continue;
                }
                out.push(EntryInfo { key });
            }
            Ok(out)
        }

        #[cfg(target_os = "espidf")]
        {
            let ns = c_name(namespace);
            let mut out = Vec::new();
            let mut it: nvs_iterator_t = core::ptr::null_mut();
            // SAFETY: the iterator is only used inside this block and
            // released on every exit path once it is non-null.
            let mut ret = unsafe {
                nvs_entry_find(
                    b"nvs\0".as_ptr() as *const _,
                    ns.as_ptr() as *const _,
                    nvs_type_t_NVS_TYPE_BLOB,
                    &mut it,
                )
            };
            while ret == ESP_OK {
                let mut info: nvs_entry_info_t = unsafe { core::mem::zeroed() };
                if unsafe { nvs_entry_info(it, &mut info) } != ESP_OK {
                    break;
                }
                let bytes: Vec<u8> = info
                    .key
                    .iter()
                    .take_while(|&&c| c != 0)
                    .map(|&c| c as u8)
                    .collect();
                let mut key = heapless::String::new();
                match core::str::from_utf8(&bytes) {
                    Ok(s) if key.push_str(s).is_ok() => out.push(EntryInfo { key }),
                    _ => warn!("nvs: skipping non-UTF-8 key in '{}'", namespace),
                }
                ret = unsafe { nvs_entry_next(&mut it) };
            }
            unsafe { nvs_release_iterator(it) };
            if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                warn!("nvs: iteration of '{}' failed: {}", namespace, ret);
                return Err(StorageError::IoError);
            }
            Ok(out)
        }
    }
}
