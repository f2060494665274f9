//! Structural validation and scoring of recovered candidates.
//!
//! Every candidate passes the base rules (size floor, header match, check
//! bytes), then format-specific structural rules. Valid candidates are
//! scored 0-100: 50 for passing, +30 when a footer or terminator is
//! present, a format-specific +20 when the strict terminator is located,
//! small adjustments from the optional decode pass. A candidate whose
//! structure is sound but whose terminator is missing is flagged partial
//! rather than rejected.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use memchr::memmem;

use crate::signatures::Signature;

/// Candidates below this are never valid.
pub const MIN_CANDIDATE_BYTES: usize = 512;
/// The carver applies a stricter floor to reject tiny fragments.
pub const MIN_CARVE_BYTES: usize = 4096;
/// Acceptance threshold applied by the carver.
pub const MIN_CARVE_SCORE: u8 = 70;

/// Candidates larger than this skip the decode pass.
const MAX_DECODE_BYTES: usize = 50 * 1024 * 1024;

/// Outcome of validating one candidate.
#[derive(Debug, Clone)]
pub struct Validation {
    pub is_valid: bool,
    pub score: u8,
    pub is_partial: bool,
    pub reason: String,
}

impl Validation {
    fn reject(reason: impl Into<String>) -> Validation {
        Validation {
            is_valid: false,
            score: 0,
            is_partial: false,
            reason: reason.into(),
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    memmem::find(haystack, needle).is_some()
}

fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    memmem::find_iter(haystack, needle).count()
}

fn tail(data: &[u8], n: usize) -> &[u8] {
    &data[data.len().saturating_sub(n)..]
}

fn head(data: &[u8], n: usize) -> &[u8] {
    &data[..n.min(data.len())]
}

/// Validates `data` against `sig` and scores the result.
pub fn validate(data: &[u8], sig: &Signature) -> Validation {
    if data.len() < MIN_CANDIDATE_BYTES {
        return Validation::reject("file too small (< 512 bytes)");
    }

    if let Some(header) = sig.header {
        let at = sig.header_offset as usize;
        if data.len() < at + header.len() || &data[at..at + header.len()] != header {
            return Validation::reject("header mismatch");
        }
    }

    if let Some(check) = sig.check {
        if !contains(head(data, 1024), check) {
            return Validation::reject("secondary check bytes absent");
        }
    }

    if let Err(reason) = structural_check(data, sig.extension) {
        return Validation::reject(reason);
    }

    let (score, is_partial) = score_candidate(data, sig);
    Validation {
        is_valid: true,
        score,
        is_partial,
        reason: if is_partial {
            "structure valid, terminator missing".to_string()
        } else {
            "validation passed".to_string()
        },
    }
}

/// Strict per-format structural rules. Formats without specific rules fall
/// through with only the base checks applied.
fn structural_check(data: &[u8], extension: &str) -> Result<(), &'static str> {
    match extension {
        "jpg" | "jpeg" => jpeg_check(data),
        "png" => png_check(data),
        "pdf" => pdf_check(data),
        "docx" => office_check(data, b"word/", b"document.xml"),
        "xlsx" => office_check(data, b"xl/", b"workbook.xml"),
        "pptx" => office_check(data, b"ppt/", b"presentation.xml"),
        "zip" => zip_check(data),
        "rar" => rar_check(data),
        "mp3" => mp3_check(data),
        "wav" => wav_check(data),
        "mp4" | "mov" => mp4_check(data),
        "avi" => avi_check(data),
        "sqlite" => sqlite_check(data),
        _ => Ok(()),
    }
}

fn jpeg_check(data: &[u8]) -> Result<(), &'static str> {
    if !data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Err("missing SOI marker");
    }
    if data.len() < 2048 {
        return Err("too small for a real JPEG");
    }
    if !contains(tail(data, 10), &[0xFF, 0xD9]) {
        return Err("missing EOI marker");
    }
    if data.iter().filter(|&&b| b == 0xFF).count() < 10 {
        return Err("too few JPEG markers");
    }
    if !contains(head(data, 50), b"JFIF") && !contains(head(data, 50), b"Exif") {
        return Err("no JFIF or Exif tag");
    }
    Ok(())
}

fn png_check(data: &[u8]) -> Result<(), &'static str> {
    if !data.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Err("invalid PNG signature");
    }
    if data.len() < 50 {
        return Err("truncated PNG header");
    }
    if !contains(&data[8..25.min(data.len())], b"IHDR") {
        return Err("missing IHDR chunk");
    }
    if !contains(data, b"IDAT") {
        return Err("missing IDAT chunk");
    }
    if !contains(tail(data, 50), b"IEND\xae\x42\x60\x82") {
        return Err("missing IEND chunk");
    }
    Ok(())
}

fn pdf_check(data: &[u8]) -> Result<(), &'static str> {
    if !data.starts_with(b"%PDF-") {
        return Err("missing %PDF header");
    }
    if !contains(tail(data, 100), b"%%EOF") {
        return Err("missing %%EOF");
    }
    if !contains(data, b"/Catalog") {
        return Err("missing /Catalog");
    }
    if !contains(data, b"/Page") {
        return Err("missing /Page");
    }
    if !contains(data, b"xref") && !contains(data, b"/XRef") {
        return Err("missing xref table");
    }
    if count_occurrences(data, b"obj") < 2 {
        return Err("too few objects");
    }
    Ok(())
}

fn zip_base_check(data: &[u8]) -> Result<(), &'static str> {
    if !data.starts_with(b"PK\x03\x04") {
        return Err("missing local file header");
    }
    if !contains(tail(data, 1000), b"PK\x05\x06") {
        return Err("missing end of central directory");
    }
    if !contains(data, b"PK\x01\x02") {
        return Err("missing central directory");
    }
    Ok(())
}

fn zip_check(data: &[u8]) -> Result<(), &'static str> {
    zip_base_check(data)?;
    if data.len() < 100 {
        return Err("too small for a ZIP archive");
    }
    Ok(())
}

fn office_check(
    data: &[u8],
    prefix: &'static [u8],
    content_marker: &'static [u8],
) -> Result<(), &'static str> {
    zip_base_check(data)?;
    if !contains(head(data, 5000), b"[Content_Types].xml") {
        return Err("missing [Content_Types].xml");
    }
    if !contains(head(data, 5000), prefix) {
        return Err("missing Office part prefix");
    }
    if !contains(head(data, 10000), content_marker) {
        return Err("missing Office content part");
    }
    Ok(())
}

fn rar_check(data: &[u8]) -> Result<(), &'static str> {
    if !data.starts_with(b"Rar!\x1a\x07") {
        return Err("invalid RAR marker");
    }
    if data.len() < 100 {
        return Err("too small for a RAR archive");
    }
    if !data.contains(&0x74) {
        return Err("no file header block");
    }
    Ok(())
}

/// ID3v2 tag sizes are synch-safe: four 7-bit bytes.
fn id3_tag_size(data: &[u8]) -> Option<usize> {
    if data.len() < 10 {
        return None;
    }
    let size = ((data[6] as usize & 0x7F) << 21)
        | ((data[7] as usize & 0x7F) << 14)
        | ((data[8] as usize & 0x7F) << 7)
        | (data[9] as usize & 0x7F);
    Some(10 + size)
}

fn mp3_frame_count(data: &[u8]) -> usize {
    if data.starts_with(b"ID3") {
        match id3_tag_size(data) {
            Some(audio_start) if audio_start < data.len() => {
                count_occurrences(&data[audio_start..], &[0xFF, 0xFB])
            }
            _ => 0,
        }
    } else {
        count_occurrences(data, &[0xFF, 0xFB])
    }
}

fn mp3_check(data: &[u8]) -> Result<(), &'static str> {
    if data.len() < 32768 {
        return Err("too small for a real MP3");
    }
    if mp3_frame_count(data) < 100 {
        return Err("too few MP3 frames");
    }
    Ok(())
}

fn wav_check(data: &[u8]) -> Result<(), &'static str> {
    if !data.starts_with(b"RIFF") {
        return Err("missing RIFF header");
    }
    if data.len() < 44 {
        return Err("truncated WAV header");
    }
    if &data[8..12] != b"WAVE" {
        return Err("missing WAVE form type");
    }
    if !contains(&data[12..100.min(data.len())], b"fmt ") {
        return Err("missing fmt chunk");
    }
    if !contains(head(data, 1000), b"data") {
        return Err("missing data chunk");
    }
    if LittleEndian::read_u32(&data[4..8]) < 36 {
        return Err("RIFF size too small");
    }
    Ok(())
}

const MP4_BRANDS: [&[u8]; 6] = [b"mp41", b"mp42", b"isom", b"qt  ", b"M4V ", b"M4A "];

fn mp4_check(data: &[u8]) -> Result<(), &'static str> {
    if !contains(head(data, 32), b"ftyp") {
        return Err("missing ftyp atom");
    }
    if !MP4_BRANDS.iter().any(|b| contains(head(data, 32), b)) {
        return Err("unrecognized brand");
    }
    if !contains(data, b"moov") {
        return Err("missing moov atom");
    }
    if !contains(head(data, 50000), b"mdat") && !contains(head(data, 50000), b"skip") {
        return Err("missing mdat atom");
    }
    Ok(())
}

fn avi_check(data: &[u8]) -> Result<(), &'static str> {
    if !data.starts_with(b"RIFF") {
        return Err("missing RIFF header");
    }
    if data.len() < 1024 {
        return Err("too small for an AVI");
    }
    if &data[8..12] != b"AVI " {
        return Err("missing AVI form type");
    }
    if !contains(head(data, 1000), b"hdrl") {
        return Err("missing hdrl list");
    }
    if !contains(head(data, 10000), b"movi") {
        return Err("missing movi list");
    }
    Ok(())
}

fn sqlite_check(data: &[u8]) -> Result<(), &'static str> {
    if !data.starts_with(b"SQLite format 3\x00") {
        return Err("invalid SQLite header");
    }
    let page_size = BigEndian::read_u16(&data[16..18]) as usize;
    if !(512..=65536).contains(&page_size) || !page_size.is_power_of_two() {
        return Err("invalid page size");
    }
    if data.len() < page_size {
        return Err("shorter than one page");
    }
    if !contains(head(data, page_size * 2), b"sqlite_master") {
        return Err("missing sqlite_master schema");
    }
    Ok(())
}

/// Completeness scoring for a candidate that already passed validation.
fn score_candidate(data: &[u8], sig: &Signature) -> (u8, bool) {
    let mut score: i32 = 50;
    let mut is_partial = false;

    match sig.footer {
        Some(footer) => {
            if data.ends_with(footer) || contains(tail(data, 100), footer) {
                score += 30;
            } else {
                is_partial = true;
                score += 10;
            }
        }
        // No footer defined for the format; nothing to miss.
        None => score += 30,
    }

    match sig.extension {
        "jpg" | "jpeg" => {
            if contains(tail(data, 10), &[0xFF, 0xD9]) {
                score += 20;
            } else {
                is_partial = true;
                score -= 10;
            }
        }
        "png" => {
            if data.ends_with(b"IEND\xae\x42\x60\x82") {
                score += 20;
            } else {
                is_partial = true;
                score -= 10;
            }
        }
        "pdf" => {
            if contains(tail(data, 100), b"%%EOF") {
                score += 20;
            } else {
                is_partial = true;
                score -= 10;
            }
        }
        "docx" | "xlsx" | "pptx" | "zip" => {
            if contains(tail(data, 1000), b"PK\x05\x06") {
                score += 20;
            } else {
                is_partial = true;
                score -= 10;
            }
        }
        "mp4" | "mov" | "avi" | "wav" => {
            score += if data.len() > 100_000 { 20 } else { 10 };
        }
        "mp3" => {
            let frames = mp3_frame_count(data);
            score += if frames > 1000 {
                20
            } else if frames > 500 {
                15
            } else {
                10
            };
        }
        _ => {}
    }

    score += decode_bonus(data, sig.extension);

    (score.clamp(0, 100) as u8, is_partial)
}

/// Optional deep checks: decoding images with the `image` crate, verifying
/// the PNG IHDR CRC, and sniffing the leading bytes against the expected
/// media type. Bonuses and penalties only; never flips validity.
fn decode_bonus(data: &[u8], extension: &str) -> i32 {
    let mut bonus = 0;

    if matches!(extension, "jpg" | "jpeg" | "png") && data.len() <= MAX_DECODE_BYTES {
        bonus += match image::load_from_memory(data) {
            Ok(_) => 5,
            Err(_) => -10,
        };
    }

    if extension == "png" && png_ihdr_crc_ok(data) {
        bonus += 3;
    }

    if let Some(expected) = expected_mime(extension) {
        if sniff_mime(data) == Some(expected) {
            bonus += 3;
        }
    }

    bonus
}

/// Verifies the CRC trailing the 13-byte IHDR chunk.
fn png_ihdr_crc_ok(data: &[u8]) -> bool {
    // 8-byte signature, 4-byte length, "IHDR", 13 data bytes, 4-byte CRC.
    if data.len() < 33 || &data[12..16] != b"IHDR" {
        return false;
    }
    let stored = BigEndian::read_u32(&data[29..33]);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&data[12..29]);
    hasher.finalize() == stored
}

fn expected_mime(extension: &str) -> Option<&'static str> {
    match extension {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "pdf" => Some("application/pdf"),
        "zip" | "docx" | "xlsx" | "pptx" => Some("application/zip"),
        "mp3" => Some("audio/mpeg"),
        _ => None,
    }
}

fn sniff_mime(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if data.starts_with(b"%PDF-") {
        Some("application/pdf")
    } else if data.starts_with(b"PK\x03\x04") {
        Some("application/zip")
    } else if data.starts_with(b"ID3") || data.starts_with(&[0xFF, 0xFB]) {
        Some("audio/mpeg")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::SignatureRegistry;

    fn sig(id: &str) -> &'static Signature {
        SignatureRegistry::global().by_id(id).unwrap()
    }

    /// Structurally complete JPEG: SOI, APP0/JFIF, padded body with stuffed
    /// 0xFF bytes, EOI. The filler pattern never produces 0xFF so the only
    /// markers are the ones placed deliberately.
    pub(crate) fn synthetic_jpeg(total_len: usize) -> Vec<u8> {
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

    #[test]
    fn jpeg_complete_scores_high() {
        let data = synthetic_jpeg(8192);
        let v = validate(&data, sig("jpg"));
        assert!(v.is_valid, "{}", v.reason);
        assert!(!v.is_partial);
        assert!(v.score >= 80, "score {}", v.score);
    }

    #[test]
    fn jpeg_without_eoi_is_rejected() {
        let mut data = synthetic_jpeg(8192);
        data.truncate(data.len() - 2);
        data.extend_from_slice(&[0x01, 0x02]);
        let v = validate(&data, sig("jpg"));
        assert!(!v.is_valid);
        assert_eq!(v.reason, "missing EOI marker");
    }

    #[test]
    fn jpeg_without_jfif_or_exif_is_rejected() {
        let mut data = synthetic_jpeg(4096);
        data[6..10].copy_from_slice(b"XXXX");
        let v = validate(&data, sig("jpg"));
        assert!(!v.is_valid);
    }

    #[test]
    fn undersized_candidate_is_rejected() {
        let v = validate(&[0u8; 100], sig("jpg"));
        assert!(!v.is_valid);
        assert_eq!(v.reason, "file too small (< 512 bytes)");
    }

    pub(crate) fn synthetic_png(total_len: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(total_len);
        data.extend_from_slice(b"\x89PNG\r\n\x1a\n");
        // IHDR: 1x1, 8-bit grayscale, with correct CRC.
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
        // Oversized IDAT filler so the candidate clears the size floors.
        let filler_len = total_len.saturating_sub(data.len()) - 8 - 12 - 12;
        data.extend_from_slice(&(filler_len as u32).to_be_bytes());
        data.extend_from_slice(b"IDAT");
        for i in 0..filler_len {
            data.push(((i.wrapping_mul(97).wrapping_add(13)) % 251) as u8);
        }
        data.extend_from_slice(&[0, 0, 0, 0]); // IDAT CRC, unchecked
        data.extend_from_slice(&[0, 0, 0, 0]);
        data.extend_from_slice(b"IEND\xae\x42\x60\x82");
        data
    }

    #[test]
    fn png_structure_is_accepted() {
        let data = synthetic_png(8192);
        let v = validate(&data, sig("png"));
        assert!(v.is_valid, "{}", v.reason);
        // The filler is not decodable image data, so the decode penalty
        // applies, but the CRC bonus holds the score at a usable level.
        assert!(v.score >= MIN_CARVE_SCORE, "score {}", v.score);
    }

    #[test]
    fn png_missing_iend_is_rejected() {
        let mut data = synthetic_png(8192);
        let len = data.len();
        data.truncate(len - 12);
        data.extend_from_slice(&[0u8; 12]);
        let v = validate(&data, sig("png"));
        assert!(!v.is_valid);
    }

    #[test]
    fn png_ihdr_crc_detects_corruption() {
        let mut data = synthetic_png(8192);
        assert!(png_ihdr_crc_ok(&data));
        data[20] ^= 0xFF;
        assert!(!png_ihdr_crc_ok(&data));
    }

    pub(crate) fn synthetic_pdf() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"%PDF-1.4\n");
        data.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
        data.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 >>\nendobj\n");
        data.extend_from_slice(b"3 0 obj\n<< /Type /Page /Parent 2 0 R >>\nendobj\n");
        while data.len() < 4500 {
            data.extend_from_slice(b"% padding stream content for body length\n");
        }
        data.extend_from_slice(b"xref\n0 4\ntrailer\n<< /Root 1 0 R >>\nstartxref\n9\n%%EOF");
        data
    }

    #[test]
    fn pdf_needs_catalog_and_eof() {
        let data = synthetic_pdf();
        let v = validate(&data, sig("pdf"));
        assert!(v.is_valid, "{}", v.reason);
        assert!(v.score >= MIN_CARVE_SCORE);

        let mut broken = data.clone();
        let pos = memmem::find(&broken, b"/Catalog").unwrap();
        broken[pos..pos + 8].copy_from_slice(b"/Cutalog");
        assert!(!validate(&broken, sig("pdf")).is_valid);
    }

    pub(crate) fn synthetic_zip(total_len: usize) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"PK\x03\x04");
        while data.len() < total_len - 120 {
            let i = data.len();
            data.push(((i.wrapping_mul(73).wrapping_add(31)) % 251) as u8);
        }
        data.extend_from_slice(b"PK\x01\x02");
        data.extend_from_slice(&[0u8; 42]);
        data.extend_from_slice(b"PK\x05\x06");
        data.extend_from_slice(&[0u8; 18]);
        data
    }

    #[test]
    fn zip_requires_central_directory() {
        let data = synthetic_zip(8192);
        assert!(validate(&data, sig("zip")).is_valid);

        let mut no_cd = data.clone();
        let pos = memmem::find(&no_cd, b"PK\x01\x02").unwrap();
        no_cd[pos] = b'Q';
        assert!(!validate(&no_cd, sig("zip")).is_valid);
    }

    #[test]
    fn office_check_requires_content_types() {
        let mut data = synthetic_zip(16384);
        data.splice(4..4, b"[Content_Types].xml word/ document.xml".iter().copied());
        assert!(validate(&data, sig("docx")).is_valid);
        assert!(!validate(&data, sig("xlsx")).is_valid);
    }

    pub(crate) fn synthetic_wav(total_len: usize) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"RIFF");
        data.extend_from_slice(&((total_len - 8) as u32).to_le_bytes());
        data.extend_from_slice(b"WAVE");
        data.extend_from_slice(b"fmt ");
        data.extend_from_slice(&16u32.to_le_bytes());
        data.extend_from_slice(&[0u8; 16]);
        data.extend_from_slice(b"data");
        data.extend_from_slice(&((total_len - 44) as u32).to_le_bytes());
        while data.len() < total_len {
            let i = data.len();
            data.push(((i.wrapping_mul(57).wrapping_add(7)) % 251) as u8);
        }
        data
    }

    #[test]
    fn wav_riff_structure() {
        let data = synthetic_wav(8192);
        let v = validate(&data, sig("wav"));
        assert!(v.is_valid, "{}", v.reason);

        let mut bad = data.clone();
        bad[8..12].copy_from_slice(b"AVI ");
        assert!(!validate(&bad, sig("wav")).is_valid);
    }

    pub(crate) fn synthetic_sqlite() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"SQLite format 3\x00");
        data.extend_from_slice(&4096u16.to_be_bytes());
        data.resize(100, 0);
        data.extend_from_slice(b"CREATE TABLE sqlite_master (type text, name text);");
        data.resize(4096 * 2, 0);
        data
    }

    #[test]
    fn sqlite_page_size_must_be_power_of_two() {
        let data = synthetic_sqlite();
        assert!(validate(&data, sig("sqlite")).is_valid);

        let mut bad = data.clone();
        bad[16..18].copy_from_slice(&4097u16.to_be_bytes());
        assert!(!validate(&bad, sig("sqlite")).is_valid);
    }

    #[test]
    fn mp3_needs_one_hundred_frames() {
        let mut data = Vec::new();
        for _ in 0..150 {
            data.extend_from_slice(&[0xFF, 0xFB]);
            data.extend_from_slice(&[0x90, 0x00, 0x11, 0x22]);
        }
        data.resize(40000, 0x55);
        assert!(validate(&data, sig("mp3")).is_valid);

        let few: Vec<u8> = data[..40000]
            .iter()
            .map(|&b| if b == 0xFB { 0xFA } else { b })
            .collect();
        assert!(!validate(&few, sig("mp3")).is_valid);
    }

    #[test]
    fn mp3_id3_tag_is_skipped() {
        let mut data = Vec::new();
        data.extend_from_slice(b"ID3\x04\x00\x00");
        // Synch-safe size 0x100 = 128 bytes of tag.
        data.extend_from_slice(&[0x00, 0x00, 0x01, 0x00]);
        data.resize(10 + 128, 0);
        for _ in 0..200 {
            data.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
        }
        data.resize(40000, 0x11);
        let v = validate(&data, sig("mp3_id3"));
        assert!(v.is_valid, "{}", v.reason);
    }

    #[test]
    fn partial_flag_set_when_terminator_missing() {
        // A format with a footer but lenient structure: GIF.
        let mut data = vec![0u8; 8192];
        data[..6].copy_from_slice(b"GIF89a");
        let v = validate(&data, sig("gif"));
        assert!(v.is_valid);
        assert!(v.is_partial);
        assert!(v.score < 80);
    }

    #[test]
    fn score_rewards_complete_files() {
        let complete = validate(&synthetic_wav(200_000), sig("wav"));
        let small = validate(&synthetic_wav(8192), sig("wav"));
        assert!(complete.score > small.score);
    }
}
