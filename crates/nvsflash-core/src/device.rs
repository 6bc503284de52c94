//! Serial port classification.
//!
//! Flashing happens in the browser over WebUSB; the port list only helps
//! users who run the generator's manual command against a local board.
//! Ports are scored on USB vendor IDs and description substrings of the
//! USB-UART bridges ESP32 boards ship with.

use serde::{Deserialize, Serialize};

/// Espressif's USB vendor ID (native USB on S2/S3/C3/C6).
pub const VID_ESPRESSIF: u16 = 0x303a;
/// Silicon Labs CP210x.
pub const VID_SILABS: u16 = 0x10c4;
/// QinHeng CH340/CH341.
pub const VID_QINHENG: u16 = 0x1a86;
/// FTDI.
pub const VID_FTDI: u16 = 0x0403;

const VENDOR_IDS: &[u16] = &[VID_ESPRESSIF, VID_SILABS, VID_QINHENG, VID_FTDI];
const DESCRIPTION_HINTS: &[&str] = &["cp210x", "ch340", "ch341", "esp32", "silicon labs"];
const HWID_HINTS: &[&str] = &["cp210x", "ch340", "ch341"];

const VID_SCORE: u32 = 10;
const HINT_SCORE: u32 = 5;

/// A port as reported by the operating system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub device: String,
    pub description: String,
    pub hwid: String,
    pub manufacturer: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

/// A port annotated for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedPort {
    #[serde(flatten)]
    pub info: PortInfo,
    pub esp_type: String,
    pub display_name: String,
    pub is_esp_device: bool,
    pub confidence: u32,
}

/// Response body of the port list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortListing {
    pub ports: Vec<ClassifiedPort>,
    pub esp_count: usize,
    pub total_count: usize,
}

/// Score a port and name its likely board type.
pub fn classify(info: PortInfo) -> ClassifiedPort {
    let description = info.description.to_lowercase();
    let hwid = info.hwid.to_lowercase();

    let mut confidence = 0;
    let mut matched = false;
    if info.vid.is_some_and(|vid| VENDOR_IDS.contains(&vid)) {
        matched = true;
        confidence += VID_SCORE;
    }
    for hint in DESCRIPTION_HINTS {
        if description.contains(hint) {
            matched = true;
            confidence += HINT_SCORE;
        }
    }
    for hint in HWID_HINTS {
        if hwid.contains(hint) {
            matched = true;
            confidence += HINT_SCORE;
        }
    }

    let esp_type = if !matched {
        "Generic Device"
    } else if info.vid == Some(VID_ESPRESSIF) {
        "ESP32-S3 (Native USB)"
    } else if description.contains("cp210x") {
        "ESP32 (CP210x Bridge)"
    } else if description.contains("ch340") || description.contains("ch341") {
        "ESP32 (CH34x Bridge)"
    } else {
        "ESP32 Compatible"
    };

    let display_name = if matched {
        format!("{} - {}", info.device, esp_type)
    } else {
        format!("{} - {}", info.device, info.description)
    };

    ClassifiedPort {
        info,
        esp_type: esp_type.to_string(),
        display_name,
        is_esp_device: matched,
        confidence,
    }
}

/// Classify and order ports: ESP boards first, most confident first, then
/// by device name.
pub fn list_ports(ports: Vec<PortInfo>) -> PortListing {
    let mut ports: Vec<ClassifiedPort> = ports.into_iter().map(classify).collect();
    ports.sort_by(|a, b| {
        b.is_esp_device
            .cmp(&a.is_esp_device)
            .then(b.confidence.cmp(&a.confidence))
            .then_with(|| a.info.device.cmp(&b.info.device))
    });

    let esp_count = ports.iter().filter(|p| p.is_esp_device).count();
    PortListing {
        total_count: ports.len(),
        esp_count,
        ports,
    }
}
