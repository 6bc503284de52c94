//! Byte-level layout checks for generated partitions.
//!
//! Expected bytes follow the layout ESP-IDF's `nvs_partition_gen` emits for
//! the same input.

use nvsflash_core::nvs::{PAGE_SIZE, ENTRY_SIZE};
use nvsflash_core::{
    generate, parse_csv, read_partition, GenerateOptions, NoFiles, NvsValue, PartitionWriter,
    Version,
};

const FIRST_ENTRY: usize = 64;

fn entry(image: &[u8], page: usize, slot: usize) -> String {
    let offset = page * PAGE_SIZE + FIRST_ENTRY + slot * ENTRY_SIZE;
    hex::encode(&image[offset..offset + ENTRY_SIZE])
}

fn single_device_image() -> Vec<u8> {
    let csv = "key,type,encoding,value\nbonicbot,namespace,,\ndevice_id,data,string,BB-0001\n";
    let rows = parse_csv(csv).unwrap();
    generate(&rows, &GenerateOptions::default(), &NoFiles).unwrap()
}

#[test]
fn single_device_partition_matches_reference() {
    let image = single_device_image();
    assert_eq!(image.len(), 0x4000);

    // Page 0 header, marked full.
    assert_eq!(
        hex::encode(&image[..32]),
        "fcffffff00000000feffffffffffffffffffffffffffffffffffffff842dbab9"
    );
    // Slots 0 to 2 written.
    assert_eq!(hex::encode(&image[32..40]), "eaffffffffffffff");

    assert_eq!(
        entry(&image, 0, 0),
        "000101fff8656d7d626f6e6963626f74000000000000000001ffffffffffffff"
    );
    assert_eq!(
        entry(&image, 0, 1),
        "012102ffaaab9b076465766963655f6964000000000000000800ffffd2eadd4f"
    );
    assert_eq!(
        entry(&image, 0, 2),
        "42422d3030303100ffffffffffffffffffffffffffffffffffffffffffffffff"
    );
}

#[test]
fn padding_pages_and_reserved_page() {
    let image = single_device_image();

    for page in 0..3 {
        assert_eq!(&image[page * PAGE_SIZE..page * PAGE_SIZE + 4], &[0xfc, 0xff, 0xff, 0xff]);
    }
    assert_eq!(
        hex::encode(&image[PAGE_SIZE..PAGE_SIZE + 32]),
        "fcffffff01000000feffffffffffffffffffffffffffffffffffffffa3489f38"
    );
    assert!(image[3 * PAGE_SIZE..].iter().all(|&b| b == 0xff));
}

#[test]
fn multipage_blob_is_chunked() {
    let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();

    let mut writer = PartitionWriter::new(0x5000, Version::V2).unwrap();
    writer.namespace("cfg").unwrap();
    writer.write("cal", &NvsValue::Blob(data.clone())).unwrap();
    let image = writer.finish();

    // Chunk 0 fills the rest of page 0: 3968 bytes, span 125.
    assert_eq!(
        entry(&image, 0, 1),
        "01427d00c3fbbf2563616c00000000000000000000000000800fffff5801a813"
    );
    // Chunk 1 opens page 1 with the remaining 1032 bytes, span 34.
    assert_eq!(
        entry(&image, 1, 0),
        "0142220123e438c163616c000000000000000000000000000804ffff75903d45"
    );
    // Index entry right after chunk 1: total 5000, 2 chunks starting at 0.
    assert_eq!(
        entry(&image, 1, 34),
        "014801ffdae1af1c63616c00000000000000000000000000881300000200ffff"
    );

    let partition = read_partition(&image).unwrap();
    assert_eq!(partition.get("cfg", "cal"), Some(&NvsValue::Blob(data)));
}

#[test]
fn integer_entries() {
    let mut writer = PartitionWriter::new(0x4000, Version::V2).unwrap();
    writer.namespace("ns").unwrap();
    writer.write("a", &NvsValue::I8(-2)).unwrap();
    writer.write("b", &NvsValue::U64(0x1122_3344_5566_7788)).unwrap();
    let image = writer.finish();

    assert_eq!(
        entry(&image, 0, 1),
        "011101ff85d929e461000000000000000000000000000000feffffffffffffff"
    );
    assert_eq!(
        entry(&image, 0, 2),
        "010801ff9f3897be620000000000000000000000000000008877665544332211"
    );
}

#[test]
fn version1_single_page_blob() {
    let mut writer = PartitionWriter::new(0x3000, Version::V1).unwrap();
    writer.namespace("v1").unwrap();
    writer.write("blob", &NvsValue::Blob(vec![1, 2, 3])).unwrap();
    let image = writer.finish();

    assert_eq!(
        hex::encode(&image[..32]),
        "fcffffff00000000ffffffffffffffffffffffffffffffffffffffffc216dddc"
    );
    assert_eq!(
        entry(&image, 0, 1),
        "014102ffdc319cf6626c6f620000000000000000000000000300fffff0a60255"
    );

    let partition = read_partition(&image).unwrap();
    assert_eq!(partition.pages[0].version, Some(Version::V1));
    assert_eq!(partition.get("v1", "blob"), Some(&NvsValue::Blob(vec![1, 2, 3])));
}

#[test]
fn mixed_input_reads_back() {
    let csv = "\
key,type,encoding,value
wifi,namespace,,
ssid,data,string,workshop
channel,data,u8,11
mac,data,hex2bin,a0b1c2d3e4f5
app,namespace,,
token,data,base64,c2VjcmV0
offset,data,i32,-1200
";
    let rows = parse_csv(csv).unwrap();
    let options = GenerateOptions {
        size: 0x6000,
        version: Version::V2,
    };
    let image = generate(&rows, &options, &NoFiles).unwrap();
    let partition = read_partition(&image).unwrap();

    assert_eq!(partition.namespaces(), vec!["wifi", "app"]);
    assert_eq!(
        partition.get("wifi", "ssid"),
        Some(&NvsValue::Str("workshop".to_string()))
    );
    assert_eq!(partition.get("wifi", "channel"), Some(&NvsValue::U8(11)));
    assert_eq!(
        partition.get("wifi", "mac"),
        Some(&NvsValue::Blob(vec![0xa0, 0xb1, 0xc2, 0xd3, 0xe4, 0xf5]))
    );
    assert_eq!(
        partition.get("app", "token"),
        Some(&NvsValue::Blob(b"secret".to_vec()))
    );
    assert_eq!(partition.get("app", "offset"), Some(&NvsValue::I32(-1200)));
    assert_eq!(partition.items.len(), 5);
}

#[test]
fn data_larger_than_partition_is_rejected() {
    let mut rows = parse_csv("key,type,encoding,value\nbig,namespace,,\n").unwrap();
    for i in 0..3 {
        rows.push(nvsflash_core::Row::data(
            format!("s{i}"),
            nvsflash_core::Encoding::String,
            "x".repeat(3000),
        ));
    }
    let err = generate(&rows, &GenerateOptions { size: 0x3000, version: Version::V2 }, &NoFiles)
        .unwrap_err();
    assert!(err.to_string().contains("Please increase size"));
}
