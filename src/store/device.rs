use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::proto::{memory, Device, Filter, Memory};
use crate::{Error, Result};

/// Receives each device matched by [`DeviceStore::search`].
///
/// Returning an error stops the search immediately. Devices already handed to
/// the sink stay delivered.
#[tonic::async_trait]
pub trait DeviceSink: Send {
    /// Accepts one matching device.
    async fn visit(&mut self, device: Device) -> Result<()>;
}

#[tonic::async_trait]
impl DeviceSink for Vec<Device> {
    async fn visit(&mut self, device: Device) -> Result<()> {
        self.push(device);
        Ok(())
    }
}

/// Storage for catalog devices.
#[tonic::async_trait]
pub trait DeviceStore: Send + Sync {
    /// Saves a copy of `device`, generating an id when it has none.
    ///
    /// Returns the id the device is stored under.
    async fn save(&self, device: &Device) -> Result<String>;

    /// Returns a copy of the device stored under `id`.
    async fn find(&self, id: &str) -> Option<Device>;

    /// Feeds every device matching `filter` to `sink`, in no particular order.
    async fn search(&self, filter: &Filter, sink: &mut dyn DeviceSink) -> Result<()>;
}

/// Device store kept entirely in memory.
#[derive(Clone, Default)]
pub struct InMemoryDeviceStore {
    devices: Arc<RwLock<HashMap<String, Device>>>,
}

impl InMemoryDeviceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored devices.
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }
}

#[tonic::async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn save(&self, device: &Device) -> Result<String> {
        let id = if device.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            Uuid::parse_str(&device.id)
                .map_err(|e| Error::InvalidArgument(format!("device id is not a UUID: {e}")))?;
            device.id.clone()
        };

        let mut devices = self.devices.write().await;

        if devices.contains_key(&id) {
            return Err(Error::AlreadyExists(format!("device '{id}'")));
        }

        let mut stored = device.clone();
        stored.id.clone_from(&id);
        devices.insert(id.clone(), stored);

        Ok(id)
    }

    async fn find(&self, id: &str) -> Option<Device> {
        let devices = self.devices.read().await;
        devices.get(id).cloned()
    }

    async fn search(&self, filter: &Filter, sink: &mut dyn DeviceSink) -> Result<()> {
        let devices = self.devices.read().await;

        for device in devices.values().filter(|device| is_qualified(filter, device)) {
            sink.visit(device.clone()).await?;
        }

        Ok(())
    }
}

fn is_qualified(filter: &Filter, device: &Device) -> bool {
    if device.price_usd > filter.max_price_usd {
        return false;
    }

    let (cores, min_ghz) = device
        .cpu
        .as_ref()
        .map_or((0, 0.0), |cpu| (cpu.number_cores, cpu.min_ghz));

    if cores < filter.min_cpu_cores {
        return false;
    }

    if min_ghz < filter.min_cpu_ghz {
        return false;
    }

    to_bits(device.ram.as_ref()) >= to_bits(filter.min_ram.as_ref())
}

/// Normalizes a memory size to bits. Unknown units count as zero.
pub fn to_bits(memory: Option<&Memory>) -> u64 {
    let Some(memory) = memory else {
        return 0;
    };

    let value = memory.value;
    match memory.unit() {
        memory::Unit::Bit => value,
        memory::Unit::Byte => value << 3,
        memory::Unit::Kilobyte => value << 13,
        memory::Unit::Megabyte => value << 23,
        memory::Unit::Gigabyte => value << 33,
        memory::Unit::Terabyte => value << 43,
        memory::Unit::Unknown => 0,
    }
}
