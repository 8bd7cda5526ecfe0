// SPDX-License-Identifier: MPL-2.0

use super::error::*;
use super::{CpioDecoder, FileType};

fn newc_entry(ino: u32, name: &str, mode: u32, data: &[u8]) -> Vec<u8> {
    let mut entry = format!(
        "070701{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}",
        ino,
        mode,
        0,
        0,
        1,
        0,
        data.len(),
        0,
        0,
        0,
        0,
        name.len() + 1,
        0
    )
    .into_bytes();
    entry.extend_from_slice(name.as_bytes());
    entry.push(0);
    entry.resize(entry.len().next_multiple_of(4), 0);
    entry.extend_from_slice(data);
    entry.resize(entry.len().next_multiple_of(4), 0);
    entry
}

fn sample_archive() -> Vec<u8> {
    let mut buffer = Vec::new();
    buffer.extend(newc_entry(1, "dev", 0o040755, &[]));
    buffer.extend(newc_entry(2, "init", 0o100755, b"#!/bin/sh\n"));
    buffer.extend(newc_entry(0, "TRAILER!!!", 0, &[]));
    buffer
}

#[test]
fn decoder() {
    let buffer = sample_archive();
    let decoder = CpioDecoder::new(buffer.as_slice());
    let mut entries = decoder.decode_entries();

    // 1st entry
    let entry = entries.next().unwrap().unwrap();
    assert_eq!(entry.name(), "dev");
    assert_eq!(entry.metadata().file_type(), FileType::Dir);
    assert_eq!(entry.metadata().permission_mode(), 0o755);
    assert_eq!(entry.metadata().ino(), 1);
    assert_eq!(entry.header_offset(), 0);
    // 110 header bytes and "dev\0", padded to 4 bytes.
    assert_eq!(entry.data_offset(), 116);
    assert!(entry.data().is_empty());

    // 2nd entry
    let entry = entries.next().unwrap().unwrap();
    assert_eq!(entry.name(), "init");
    assert_eq!(entry.metadata().file_type(), FileType::File);
    assert_eq!(entry.metadata().size(), 10);
    assert_eq!(entry.header_offset(), 116);
    assert_eq!(entry.data_offset(), 116 + 116);
    assert_eq!(entry.data(), b"#!/bin/sh\n");
    assert_eq!(entry.end_offset(), 116 + 116 + 12);

    // The trailer ends the iteration.
    assert!(entries.next().is_none());
    assert!(entries.next().is_none());
    assert_eq!(entries.offset(), buffer.len());
}

#[test]
fn decoder_ignores_bytes_after_trailer() {
    let mut buffer = sample_archive();
    let archive_len = buffer.len();
    buffer.extend_from_slice(&[0u8; 512]);
    let decoder = CpioDecoder::new(buffer.as_slice());
    let mut entries = decoder.decode_entries();
    assert_eq!(entries.by_ref().filter_map(|entry| entry.ok()).count(), 2);
    assert_eq!(entries.offset(), archive_len);
}

#[test]
fn short_buffer() {
    let short_buffer: Vec<u8> = Vec::new();
    let decoder = CpioDecoder::new(short_buffer.as_slice());
    let mut entries = decoder.decode_entries();
    let entry_result = entries.next().unwrap();
    assert!(entry_result.is_err());
    assert!(entry_result.err() == Some(Error::BufferShortError));
    assert!(entries.next().is_none());
}

#[test]
fn truncated_data() {
    let buffer = newc_entry(3, "init", 0o100755, b"0123456789abcdef");
    let decoder = CpioDecoder::new(&buffer[..buffer.len() - 8]);
    let entry_result = decoder.decode_entries().next().unwrap();
    assert_eq!(entry_result.err(), Some(Error::BufferShortError));
}

#[test]
fn invalid_buffer() {
    let buffer: &[u8] = b"invalidmagic.invalidmagic.invalidmagic.invalidmagic.invalidmagic.invalidmagic.invalidmagic.invalidmagic.invalidmagic.invalidmagic";
    let decoder = CpioDecoder::new(buffer);
    let entry_result = decoder.decode_entries().next().unwrap();
    assert!(entry_result.is_err());
    assert!(entry_result.err() == Some(Error::MagicError));
}

#[test]
fn magic_followed_by_garbage() {
    let mut buffer = b"070701".to_vec();
    buffer.extend_from_slice(&[b'z'; 200]);
    let decoder = CpioDecoder::new(buffer.as_slice());
    let entry_result = decoder.decode_entries().next().unwrap();
    assert_eq!(entry_result.err(), Some(Error::ParseIntError));
}
