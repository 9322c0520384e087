//! Capability probe for a simulated device

use oldtom_audio::{BatteryStatus, CapabilityFlags, CapabilityProbe, Error, Result};

use crate::config::DeviceConfig;

/// Reports the configured device; a zero value reads as "unknown"
#[derive(Debug, Clone)]
pub struct HeadlessProbe {
    device: DeviceConfig,
}

impl HeadlessProbe {
    pub fn new(device: DeviceConfig) -> Self {
        Self { device }
    }
}

impl CapabilityProbe for HeadlessProbe {
    fn hardware_concurrency(&self) -> Result<usize> {
        match self.device.cores {
            0 => Err(Error::CapabilityUnavailable("hardware concurrency".into())),
            cores => Ok(cores),
        }
    }

    fn memory_mb(&self) -> Result<u64> {
        match self.device.memory_mb {
            0 => Err(Error::CapabilityUnavailable("device memory".into())),
            mb => Ok(mb),
        }
    }

    fn sample_rate(&self) -> Result<u32> {
        match self.device.sample_rate {
            0 => Err(Error::CapabilityUnavailable("sample rate".into())),
            rate => Ok(rate),
        }
    }

    fn flags(&self) -> Result<CapabilityFlags> {
        Ok(self.device.flags())
    }

    fn battery(&self) -> Result<BatteryStatus> {
        self.device
            .battery
            .map(|level| BatteryStatus {
                level: level.clamp(0.0, 1.0),
                charging: false,
            })
            .ok_or_else(|| Error::CapabilityUnavailable("battery".into()))
    }
}
