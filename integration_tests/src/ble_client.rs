//! BLE client for communicating with the RemoteLed device.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Automation IO service and characteristic UUIDs (16-bit assigned numbers
/// in their 128-bit base form)
const AIO_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001815_0000_1000_8000_00805f9b34fb);
const COMMAND_UUID: Uuid = Uuid::from_u128(0x00002a56_0000_1000_8000_00805f9b34fb); // Write to device
const RESPONSE_UUID: Uuid = Uuid::from_u128(0x00002a57_0000_1000_8000_00805f9b34fb); // Read/notify from device

/// BLE client for communicating with the RemoteLed device.
pub struct BleClient {
    peripheral: Peripheral,
    command_char: Characteristic,
    response_char: Characteristic,
    /// Confirmations received via notification, oldest first
    notifications: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl BleClient {
    /// Scan for a device by name and connect.
    pub async fn connect_by_name(name: &str, scan_timeout: Duration) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No Bluetooth adapters found"))?;

        // Start scanning
        adapter.start_scan(ScanFilter::default()).await?;

        // Wait for the device to appear
        let peripheral = Self::find_device_by_name(&adapter, name, scan_timeout).await?;

        adapter.stop_scan().await?;

        // Connect to the device
        peripheral.connect().await?;

        // Discover services
        peripheral.discover_services().await?;

        // Find the Automation IO characteristics
        let characteristics = peripheral.characteristics();

        let command_char = characteristics
            .iter()
            .find(|c| c.uuid == COMMAND_UUID)
            .cloned()
            .ok_or_else(|| anyhow!("Command characteristic not found"))?;

        let response_char = characteristics
            .iter()
            .find(|c| c.uuid == RESPONSE_UUID)
            .cloned()
            .ok_or_else(|| anyhow!("Response characteristic not found"))?;

        // Subscribe to notifications on the response characteristic
        peripheral.subscribe(&response_char).await?;

        let notifications = Arc::new(Mutex::new(Vec::new()));

        // Spawn notification handler
        let notifications_clone = notifications.clone();
        let peripheral_clone = peripheral.clone();
        tokio::spawn(async move {
            let mut stream = match peripheral_clone.notifications().await {
                Ok(s) => s,
                Err(_) => return,
            };

            while let Some(data) = stream.next().await {
                if data.uuid == RESPONSE_UUID {
                    let mut buf = notifications_clone.lock().await;
                    buf.push(data.value);
                }
            }
        });

        Ok(Self {
            peripheral,
            command_char,
            response_char,
            notifications,
        })
    }

    /// Find a device by name within the scan timeout.
    async fn find_device_by_name(
        adapter: &Adapter,
        name: &str,
        scan_timeout: Duration,
    ) -> Result<Peripheral> {
        let start = std::time::Instant::now();

        while start.elapsed() < scan_timeout {
            let peripherals = adapter.peripherals().await?;

            for peripheral in peripherals {
                if let Some(props) = peripheral.properties().await? {
                    if let Some(local_name) = props.local_name {
                        if local_name == name {
                            return Ok(peripheral);
                        }
                    }
                }
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        Err(anyhow!("Device '{}' not found within timeout", name))
    }

    /// Write a 2-byte command frame to the command characteristic.
    pub async fn write_command(&self, frame: &[u8; 2]) -> Result<()> {
        self.peripheral
            .write(&self.command_char, frame, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    /// Wait for the next confirmation notification.
    ///
    /// Returns `None` if nothing arrives within the timeout - expected for
    /// invalid or unknown commands, which the firmware drops silently.
    pub async fn wait_for_notification(&self, timeout: Duration) -> Option<Vec<u8>> {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            {
                let mut buf = self.notifications.lock().await;
                if !buf.is_empty() {
                    return Some(buf.remove(0));
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        None
    }

    /// Read the response characteristic directly.
    pub async fn read_response(&self) -> Result<Vec<u8>> {
        Ok(self.peripheral.read(&self.response_char).await?)
    }

    /// Discard any pending notifications.
    pub async fn clear_notifications(&self) {
        self.notifications.lock().await.clear();
    }

    /// Disconnect from the device.
    pub async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
