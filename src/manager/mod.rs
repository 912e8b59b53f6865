//! # Tuner Manager Module
//!
//! Hands out tuners across every HDHomeRun device on the network.
//!
//! ## Key Types
//!
//! - [`TunerManager`] - the shared registry of discovered and checked-out tuners
//! - [`TunerBackend`] - discovery, model lookup and liveness probing
//! - [`NetworkBackend`] - [`TunerBackend`] over UDP discovery and TCP control
//! - [`SettingsStore`] - persistence of the last-scanned device id
//!
//! ## Lifecycle
//!
//! 1. Build once at startup: `TunerManager::from_config(&config)`
//! 2. Share by reference (or `Arc`) with every caller
//! 3. `acquire_device()` / `release_device()` around each use of a tuner
//!
//! All entry points block on the network and are serialized behind one lock;
//! call them from a worker thread.

pub mod store;

pub use store::*;

use crate::config::TunerConfig;
use crate::discover::{
    is_multicast, Device, DiscoveredDevice, DiscoverySocketPool, DEVICE_ID_WILDCARD, DEVICE_TYPE_TUNER,
};
use crate::error::Result;
use crate::logging::{default_logger, LogLevel, TunerLogger};
use crate::transport::{ControlSocket, InterfaceSource, SystemInterfaces};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const COMPONENT: &str = "Manager";

/// Store key of the device whose channel line-up was scanned last.
pub const LAST_SCANNED_DEVICE_ID_KEY: &str = "last_scanned_device_id";
/// Property holding the device model.
pub const MODEL_PROPERTY: &str = "/sys/model";

/// Network operations the manager depends on.
pub trait TunerBackend: Send {
    /// Tuner devices matching `device_id` (or any, for the wildcard), at most `max_count`.
    fn find_devices(&mut self, device_id: u32, max_count: usize) -> Vec<DiscoveredDevice>;

    /// Model string of a discovered device.
    fn fetch_model(&mut self, device: &DiscoveredDevice) -> Option<String>;

    /// Whether the device still answers.
    fn is_device_available(&mut self, device_id: u32, ip: u32, tuner_index: u32) -> bool;
}

/// [`TunerBackend`] talking to real devices.
pub struct NetworkBackend {
    config: TunerConfig,
    pool: Option<DiscoverySocketPool>,
    interfaces: Arc<dyn InterfaceSource>,
    logger: Arc<dyn TunerLogger>,
}

impl NetworkBackend {
    pub fn new(config: &TunerConfig, interfaces: Arc<dyn InterfaceSource>, logger: Arc<dyn TunerLogger>) -> Self {
        NetworkBackend {
            config: config.clone(),
            pool: None,
            interfaces,
            logger,
        }
    }

    fn control_socket(&self, device_id: u32, ip: u32) -> ControlSocket {
        ControlSocket::new(device_id, ip, &self.config, self.interfaces.clone(), self.logger.clone())
    }
}

impl TunerBackend for NetworkBackend {
    fn find_devices(&mut self, device_id: u32, max_count: usize) -> Vec<DiscoveredDevice> {
        if self.pool.is_none() {
            match DiscoverySocketPool::new(&self.config, self.interfaces.clone(), self.logger.clone()) {
                Ok(pool) => self.pool = Some(pool),
                Err(e) => {
                    self.logger.log(LogLevel::Warn, COMPONENT, &format!("Cannot open discovery sockets: {}", e));
                    return Vec::new();
                }
            }
        }

        match self.pool.as_mut() {
            Some(pool) => pool.find_devices(0, DEVICE_TYPE_TUNER, device_id, max_count),
            None => Vec::new(),
        }
    }

    fn fetch_model(&mut self, device: &DiscoveredDevice) -> Option<String> {
        self.control_socket(device.device_id, device.ip_address).get(MODEL_PROPERTY)
    }

    fn is_device_available(&mut self, device_id: u32, ip: u32, tuner_index: u32) -> bool {
        if is_multicast(ip) {
            return false;
        }
        let mut control = self.control_socket(device_id, ip);
        match control.connect() {
            Ok(()) => true,
            Err(e) => {
                self.logger.log(
                    LogLevel::Debug,
                    COMPONENT,
                    &format!("{:08X}-{} at {} unavailable: {}", device_id, tuner_index, Ipv4Addr::from(ip), e),
                );
                false
            }
        }
    }
}

struct Registry<B> {
    backend: B,
    store: Box<dyn SettingsStore>,
    all_devices: BTreeSet<Device>,
    used_devices: BTreeSet<Device>,
}

/// Shared registry of tuners.
///
/// `used_devices` is not pruned on rescan, so a device that disappeared from
/// the network can stay checked out until it is released.
pub struct TunerManager<B: TunerBackend> {
    registry: Mutex<Registry<B>>,
    max_devices: usize,
    model_fetch_attempts: u32,
    logger: Arc<dyn TunerLogger>,
}

impl TunerManager<NetworkBackend> {
    /// Manager over the host's interfaces, persisting to `config.store_path`
    /// when set.
    pub fn from_config(config: &TunerConfig) -> Result<Self> {
        let logger = default_logger();
        let store: Box<dyn SettingsStore> = match &config.store_path {
            Some(path) => Box::new(JsonFileStore::open(path)?),
            None => Box::new(MemoryStore::new()),
        };
        let backend = NetworkBackend::new(config, Arc::new(SystemInterfaces), logger.clone());
        Ok(TunerManager::new(backend, store, config, logger))
    }
}

impl<B: TunerBackend> TunerManager<B> {
    pub fn new(backend: B, store: Box<dyn SettingsStore>, config: &TunerConfig, logger: Arc<dyn TunerLogger>) -> Self {
        TunerManager {
            registry: Mutex::new(Registry {
                backend,
                store,
                all_devices: BTreeSet::new(),
                used_devices: BTreeSet::new(),
            }),
            max_devices: config.max_devices.max(1),
            model_fetch_attempts: config.model_fetch_attempts.max(1),
            logger,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry<B>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rescan and check out a free tuner, preferring the last-scanned device.
    ///
    /// While the last-scanned device answers discovery, only its tuners are
    /// candidates: with all of them checked out this returns `None` even if
    /// other devices have free tuners.
    pub fn acquire_device(&self) -> Option<Device> {
        let mut registry = self.lock();
        let last_scanned = registry.store.get_int(LAST_SCANNED_DEVICE_ID_KEY).unwrap_or(0);
        self.rescan(&mut registry, last_scanned);

        let free: Vec<Device> = registry
            .all_devices
            .iter()
            .filter(|device| !registry.used_devices.contains(*device))
            .cloned()
            .collect();

        let (preferred, others): (Vec<Device>, Vec<Device>) = free
            .into_iter()
            .partition(|device| last_scanned != 0 && device.device_id == last_scanned);

        for device in preferred.into_iter().chain(others) {
            if registry.backend.is_device_available(device.device_id, device.ip_address, device.tuner_index) {
                self.logger.log(LogLevel::Info, COMPONENT, &format!("Acquired {}", device));
                registry.used_devices.insert(device.clone());
                return Some(device);
            }
        }

        self.logger.log(LogLevel::Info, COMPONENT, "No tuner available");
        None
    }

    /// Return a tuner. Releasing a device that is not checked out does nothing.
    pub fn release_device(&self, device: &Device) {
        let mut registry = self.lock();
        if registry.used_devices.remove(device) {
            self.logger.log(LogLevel::Info, COMPONENT, &format!("Released {}", device));
        }
    }

    /// Rescan and count every tuner found, used or not.
    pub fn get_tuner_count(&self) -> usize {
        let mut registry = self.lock();
        let last_scanned = registry.store.get_int(LAST_SCANNED_DEVICE_ID_KEY).unwrap_or(0);
        self.rescan(&mut registry, last_scanned);
        registry.all_devices.len()
    }

    /// Remember `device` as the one whose channel line-up was scanned.
    pub fn mark_as_scanned_device(&self, device: &Device) {
        let mut registry = self.lock();
        match registry.store.put_int(LAST_SCANNED_DEVICE_ID_KEY, device.device_id) {
            Ok(()) => self.logger.log(
                LogLevel::Debug,
                COMPONENT,
                &format!("Last scanned device is now {:08X}", device.device_id),
            ),
            Err(e) => self.logger.log(LogLevel::Warn, COMPONENT, &format!("Cannot persist scanned device: {}", e)),
        }
    }

    pub fn last_scanned_device_id(&self) -> Option<u32> {
        self.lock().store.get_int(LAST_SCANNED_DEVICE_ID_KEY).filter(|id| *id != 0)
    }

    /// Discover tuners without touching the registry. With a `device_id`,
    /// that device is tried first and the wildcard scan is the fallback.
    pub fn scan_devices(&self, device_id: Option<u32>) -> BTreeSet<Device> {
        let mut registry = self.lock();
        self.scan(&mut registry.backend, device_id)
    }

    pub fn is_device_available(&self, device_id: u32, ip: u32, tuner_index: u32) -> bool {
        self.lock().backend.is_device_available(device_id, ip, tuner_index)
    }

    /// Snapshot of the checked-out tuners.
    pub fn used_devices(&self) -> BTreeSet<Device> {
        self.lock().used_devices.clone()
    }

    fn rescan(&self, registry: &mut Registry<B>, last_scanned: u32) {
        let device_id = (last_scanned != 0).then_some(last_scanned);
        registry.all_devices = self.scan(&mut registry.backend, device_id);
        self.logger.log(
            LogLevel::Debug,
            COMPONENT,
            &format!("{} tuner(s), {} in use", registry.all_devices.len(), registry.used_devices.len()),
        );
    }

    fn scan(&self, backend: &mut B, device_id: Option<u32>) -> BTreeSet<Device> {
        let mut discovered = match device_id {
            Some(id) => backend.find_devices(id, 1),
            None => Vec::new(),
        };
        if discovered.is_empty() {
            discovered = backend.find_devices(DEVICE_ID_WILDCARD, self.max_devices);
        }

        let mut devices = BTreeSet::new();
        for found in &discovered {
            let model = (0..self.model_fetch_attempts).find_map(|_| backend.fetch_model(found));
            if model.is_none() {
                self.logger.log(
                    LogLevel::Warn,
                    COMPONENT,
                    &format!("No model for {:08X} at {}", found.device_id, found.ip()),
                );
            }
            for tuner_index in 0..found.tuner_count as u32 {
                devices.insert(Device::new(found, tuner_index, model.clone()));
            }
        }
        devices
    }
}
