//! Shared builders for synthetic devices and file payloads.

#![allow(dead_code)]

use std::io::Write;

use tempfile::NamedTempFile;

/// Structurally complete JPEG: SOI + APP0/JFIF, stuffed 0xFF marker bytes,
/// pseudo-random body, EOI. The body filler is taken mod 251 so it never
/// contains 0xFF and the only markers are the deliberate ones.
pub fn synthetic_jpeg(total_len: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(total_len);
    data.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]);
    data.extend_from_slice(b"JFIF\x00\x01\x01\x01\x00\x48\x00\x48\x00\x00");
    for _ in 0..12 {
        data.extend_from_slice(&[0xFF, 0x00]);
    }
    while data.len() < total_len - 2 {
        let i = data.len();
        data.push(((i.wrapping_mul(131).wrapping_add(17)) % 251) as u8);
    }
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

/// Like [`synthetic_jpeg`] but with a constant-byte body, for images where
/// the filler must not collide with other on-disk structures.
pub fn synthetic_jpeg_flat(total_len: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(total_len);
    data.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]);
    data.extend_from_slice(b"JFIF\x00\x01\x01\x01\x00\x48\x00\x48\x00\x00");
    for _ in 0..12 {
        data.extend_from_slice(&[0xFF, 0x00]);
    }
    data.resize(total_len - 2, 0x41);
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

/// Minimal structurally valid PNG: correct IHDR with CRC, one junk IDAT,
/// IEND trailer.
pub fn synthetic_png(total_len: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(total_len);
    data.extend_from_slice(b"\x89PNG\r\n\x1a\n");
    let ihdr_body: [u8; 13] = [0, 0, 0, 1, 0, 0, 0, 1, 8, 0, 0, 0, 0];
    data.extend_from_slice(&[0, 0, 0, 13]);
    let mut chunk = Vec::new();
    chunk.extend_from_slice(b"IHDR");
    chunk.extend_from_slice(&ihdr_body);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&chunk);
    let crc = hasher.finalize();
    data.extend_from_slice(&chunk);
    data.extend_from_slice(&crc.to_be_bytes());

    let filler_len = total_len.saturating_sub(data.len() + 12 + 12);
    data.extend_from_slice(&(filler_len as u32).to_be_bytes());
    data.extend_from_slice(b"IDAT");
    for i in 0..filler_len {
        data.push(((i.wrapping_mul(97).wrapping_add(13)) % 251) as u8);
    }
    data.extend_from_slice(&[0, 0, 0, 0]);
    data.extend_from_slice(&[0, 0, 0, 0]);
    data.extend_from_slice(b"IEND\xae\x42\x60\x82");
    data
}

/// A zeroed disk image with payloads placed at fixed offsets.
pub fn disk_with(size: usize, placements: &[(usize, &[u8])]) -> Vec<u8> {
    let mut disk = vec![0u8; size];
    for (offset, payload) in placements {
        disk[*offset..*offset + payload.len()].copy_from_slice(payload);
    }
    disk
}

/// Writes an image to a temp file and returns the handle keeping it alive.
pub fn write_image(data: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file.flush().unwrap();
    file
}

pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::Digest;
    hex::encode(sha2::Sha256::digest(data))
}
