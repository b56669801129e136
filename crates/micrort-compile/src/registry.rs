//! Device backend registry.
//!
//! The process-wide registry is seeded with the built-in device families on
//! first access and only ever grows afterwards. A [`DeviceRegistry`] value can
//! also be built directly, which is how tests inject their own backends.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::backend::DeviceBackend;
use crate::error::{CompileError, Result};
use crate::toolchain::ToolchainBackend;

static GLOBAL: Lazy<RwLock<DeviceRegistry>> =
    Lazy::new(|| RwLock::new(DeviceRegistry::with_builtins()));

/// Append-only mapping from device id to backend.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    backends: BTreeMap<String, Arc<dyn DeviceBackend>>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in device families.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for backend in builtin_backends() {
            if let Err(e) = registry.register(Arc::new(backend)) {
                log::error!("skipping built-in backend: {e}");
            }
        }
        registry
    }

    /// A snapshot of the process-wide registry.
    pub fn global() -> Self {
        GLOBAL.read().clone()
    }

    /// Register a backend under its device id. Existing ids cannot be replaced.
    pub fn register(&mut self, backend: Arc<dyn DeviceBackend>) -> Result<()> {
        let id = backend.device_id().to_string();
        if self.backends.contains_key(&id) {
            return Err(CompileError::DuplicateDevice { device_id: id });
        }
        log::debug!("registered device backend '{id}'");
        self.backends.insert(id, backend);
        Ok(())
    }

    /// Look up the backend for a device id.
    pub fn get(&self, device_id: &str) -> Result<Arc<dyn DeviceBackend>> {
        self.backends
            .get(device_id)
            .cloned()
            .ok_or_else(|| CompileError::UnknownDevice {
                device_id: device_id.to_string(),
            })
    }

    /// Registered device ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

/// Register a backend in the process-wide registry.
pub fn register_device(backend: Arc<dyn DeviceBackend>) -> Result<()> {
    GLOBAL.write().register(backend)
}

/// Look up a backend in the process-wide registry.
pub fn get_device_funcs(device_id: &str) -> Result<Arc<dyn DeviceBackend>> {
    GLOBAL.read().get(device_id)
}

/// Device ids in the process-wide registry.
pub fn registered_devices() -> Vec<String> {
    GLOBAL.read().ids()
}

fn builtin_backends() -> [ToolchainBackend; 3] {
    [
        ToolchainBackend::host(),
        ToolchainBackend::stm32f746xx(),
        ToolchainBackend::riscv_spike(),
    ]
}
