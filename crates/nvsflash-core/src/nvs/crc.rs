//! CRC-32 as used by NVS.
//!
//! ESP-IDF seeds `esp_rom_crc32_le` with `0xFFFFFFFF`, which the ROM inverts
//! before processing; the shift register therefore starts at zero. Apart from
//! the seed this is the common reflected CRC-32.

use crc::{Algorithm, Crc};

const CRC_32_NVS: Algorithm<u32> = Algorithm {
    width: 32,
    poly: 0x04c1_1db7,
    init: 0x0000_0000,
    refin: true,
    refout: true,
    xorout: 0xffff_ffff,
    check: 0xd202_d277,
    residue: 0xdebb_20e3,
};

const NVS_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_NVS);

/// CRC of a byte slice.
pub fn checksum(bytes: &[u8]) -> u32 {
    NVS_CRC.checksum(bytes)
}

/// CRC of an entry: bytes 0..4 then 8..32, skipping the CRC field itself.
pub fn entry_crc(entry: &[u8; 32]) -> u32 {
    let mut digest = NVS_CRC.digest();
    digest.update(&entry[0..4]);
    digest.update(&entry[8..32]);
    digest.finalize()
}

/// CRC of a page header: bytes 4..28 (sequence number, version, reserved).
pub fn header_crc(header: &[u8]) -> u32 {
    NVS_CRC.checksum(&header[4..28])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(checksum(b"123456789"), 0xd202_d277);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(checksum(&[]), 0xffff_ffff);
    }

    #[test]
    fn test_string_payload() {
        assert_eq!(checksum(b"BB-0001\0"), 0x4fdd_ead2);
    }

    #[test]
    fn test_header_crc_skips_state() {
        let mut header = [0xffu8; 32];
        header[4..8].copy_from_slice(&0u32.to_le_bytes());
        header[8] = 0xfe;
        let active = header_crc(&header);

        header[0] = 0xfc;
        assert_eq!(header_crc(&header), active);
        assert_eq!(active, 0xb9ba_2d84);
    }
}
