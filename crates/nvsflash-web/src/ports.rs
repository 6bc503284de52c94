//! Serial port enumeration.

use nvsflash_core::device::PortInfo;
use serialport::{SerialPortInfo, SerialPortType};

/// Source of the host's serial ports.
///
/// Enumeration blocks; handlers call it from `spawn_blocking`.
pub trait PortScanner: Send + Sync {
    fn scan(&self) -> Result<Vec<PortInfo>, String>;
}

/// Ports reported by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPorts;

impl PortScanner for SystemPorts {
    fn scan(&self) -> Result<Vec<PortInfo>, String> {
        let ports = serialport::available_ports().map_err(|e| e.to_string())?;
        Ok(ports.into_iter().map(port_info).collect())
    }
}

/// A fixed list of ports.
#[derive(Debug, Clone, Default)]
pub struct StaticPorts(pub Vec<PortInfo>);

impl PortScanner for StaticPorts {
    fn scan(&self) -> Result<Vec<PortInfo>, String> {
        Ok(self.0.clone())
    }
}

fn port_info(port: SerialPortInfo) -> PortInfo {
    match port.port_type {
        SerialPortType::UsbPort(usb) => {
            let mut hwid = format!("USB VID:PID={:04X}:{:04X}", usb.vid, usb.pid);
            if let Some(serial) = &usb.serial_number {
                hwid.push_str(" SER=");
                hwid.push_str(serial);
            }
            PortInfo {
                device: port.port_name,
                description: usb.product.unwrap_or_else(|| "n/a".to_string()),
                hwid,
                manufacturer: usb.manufacturer.unwrap_or_default(),
                vid: Some(usb.vid),
                pid: Some(usb.pid),
            }
        }
        SerialPortType::PciPort => other(port.port_name, "PCI"),
        SerialPortType::BluetoothPort => other(port.port_name, "BLUETOOTH"),
        SerialPortType::Unknown => other(port.port_name, "n/a"),
    }
}

fn other(device: String, hwid: &str) -> PortInfo {
    PortInfo {
        device,
        description: "n/a".to_string(),
        hwid: hwid.to_string(),
        manufacturer: String::new(),
        vid: None,
        pid: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    #[test]
    fn test_usb_hwid() {
        let port = port_info(SerialPortInfo {
            port_name: "/dev/ttyUSB0".to_string(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid: 0x10c4,
                pid: 0xea60,
                serial_number: Some("0001".to_string()),
                manufacturer: Some("Silicon Labs".to_string()),
                product: Some("CP2102 USB to UART Bridge Controller".to_string()),
            }),
        });

        assert_eq!(port.hwid, "USB VID:PID=10C4:EA60 SER=0001");
        assert_eq!(port.description, "CP2102 USB to UART Bridge Controller");
        assert_eq!(port.manufacturer, "Silicon Labs");
        assert_eq!(port.vid, Some(0x10c4));
    }

    #[test]
    fn test_non_usb_port() {
        let port = port_info(SerialPortInfo {
            port_name: "/dev/ttyS0".to_string(),
            port_type: SerialPortType::Unknown,
        });
        assert_eq!(port.description, "n/a");
        assert_eq!(port.vid, None);
    }
}
