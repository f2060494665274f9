//! File format signature registry.
//!
//! A static, immutable table of magic-byte descriptions drives the carving
//! pipeline: header bytes locate candidates, optional footer bytes terminate
//! them, and `check` bytes disambiguate container formats that share a
//! header (ZIP-based Office files, RIFF media). Formats with neither a
//! header nor a check (plain text, CSV) cannot be carved and only appear in
//! metadata-driven recovery.

use aho_corasick::AhoCorasick;

use crate::error::{EngineError, Result};
use crate::types::{FileCategory, SignatureSet};

/// One registry entry.
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    /// Stable id, unique across the table.
    pub id: &'static str,
    pub extension: &'static str,
    pub header: Option<&'static [u8]>,
    pub footer: Option<&'static [u8]>,
    /// Secondary marker that must occur within 1 KiB after the header.
    pub check: Option<&'static [u8]>,
    /// Distance of the header from the start of the file (ISO's volume
    /// descriptor sits at byte 32769).
    pub header_offset: u64,
    pub important: bool,
    /// Cap applied when no structural terminator exists for the format.
    pub max_size: u64,
    pub category: Option<FileCategory>,
}

impl Signature {
    /// Only formats with a detectable header can be carved.
    pub fn carvable(&self) -> bool {
        self.header.is_some()
    }
}

const MIB: u64 = 1024 * 1024;

use crate::types::FileCategory::{Archives, Audio, Databases, Documents, Images, Videos};

macro_rules! sig {
    ($id:literal, $ext:literal, $header:expr, $footer:expr, $check:expr,
     $offset:expr, $important:expr, $max:expr, $cat:expr) => {
        Signature {
            id: $id,
            extension: $ext,
            header: $header,
            footer: $footer,
            check: $check,
            header_offset: $offset,
            important: $important,
            max_size: $max,
            category: $cat,
        }
    };
}

#[rustfmt::skip]
pub static SIGNATURES: &[Signature] = &[
    // Images
    sig!("jpg", "jpg", Some(&[0xFF, 0xD8, 0xFF]), Some(&[0xFF, 0xD9]), None, 0, true, 50 * MIB, Some(Images)),
    sig!("png", "png", Some(b"\x89PNG\r\n\x1a\n"), Some(&[0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82]), None, 0, true, 100 * MIB, Some(Images)),
    sig!("gif", "gif", Some(b"GIF89a"), Some(&[0x00, 0x3B]), None, 0, false, 20 * MIB, Some(Images)),
    sig!("gif87", "gif", Some(b"GIF87a"), Some(&[0x00, 0x3B]), None, 0, false, 20 * MIB, Some(Images)),
    sig!("bmp", "bmp", Some(b"BM"), None, None, 0, false, 10 * MIB, Some(Images)),
    sig!("tiff_le", "tif", Some(&[0x49, 0x49, 0x2A, 0x00]), None, None, 0, false, 20 * MIB, Some(Images)),
    sig!("tiff_be", "tif", Some(&[0x4D, 0x4D, 0x00, 0x2A]), None, None, 0, false, 20 * MIB, Some(Images)),
    sig!("heic", "heic", Some(b"\x00\x00\x00\x18ftypheic"), None, None, 0, false, 10 * MIB, Some(Images)),
    sig!("psd", "psd", Some(b"8BPS"), None, None, 0, false, 50 * MIB, Some(Images)),
    sig!("svg", "svg", Some(b"<?xml"), Some(b"</svg>"), Some(b"<svg"), 0, false, 5 * MIB, Some(Images)),
    sig!("ico", "ico", Some(&[0x00, 0x00, 0x01, 0x00]), None, None, 0, false, MIB, Some(Images)),
    sig!("cur", "cur", Some(&[0x00, 0x00, 0x02, 0x00]), None, None, 0, false, MIB, Some(Images)),
    // Documents
    sig!("pdf", "pdf", Some(b"%PDF-"), Some(b"%%EOF"), None, 0, true, 50 * MIB, Some(Documents)),
    sig!("docx", "docx", Some(b"PK\x03\x04"), None, Some(b"word/"), 0, true, 50 * MIB, Some(Documents)),
    sig!("xlsx", "xlsx", Some(b"PK\x03\x04"), None, Some(b"xl/"), 0, true, 50 * MIB, Some(Documents)),
    sig!("pptx", "pptx", Some(b"PK\x03\x04"), None, Some(b"ppt/"), 0, true, 50 * MIB, Some(Documents)),
    sig!("rtf", "rtf", Some(b"{\\rtf"), None, None, 0, false, 5 * MIB, Some(Documents)),
    // Text formats carry no usable magic; metadata recovery only.
    sig!("txt", "txt", None, None, None, 0, true, MIB, Some(Documents)),
    sig!("csv", "csv", None, None, None, 0, true, MIB, Some(Documents)),
    // Archives
    sig!("zip", "zip", Some(b"PK\x03\x04"), Some(b"PK\x05\x06"), None, 0, true, 50 * MIB, Some(Archives)),
    sig!("rar", "rar", Some(b"Rar!\x1a\x07"), None, None, 0, true, 5 * MIB, Some(Archives)),
    sig!("7z", "7z", Some(&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C]), None, None, 0, false, 5 * MIB, Some(Archives)),
    sig!("iso", "iso", Some(b"CD001"), None, None, 32769, false, 10 * MIB, Some(Archives)),
    // Audio
    sig!("mp3", "mp3", Some(&[0xFF, 0xFB]), None, None, 0, true, 5 * MIB, Some(Audio)),
    sig!("mp3_id3", "mp3", Some(b"ID3"), None, None, 0, true, 5 * MIB, Some(Audio)),
    sig!("wav", "wav", Some(b"RIFF"), None, Some(b"WAVE"), 0, true, 5 * MIB, Some(Audio)),
    sig!("flac", "flac", Some(b"fLaC"), None, None, 0, false, 10 * MIB, Some(Audio)),
    sig!("ogg", "ogg", Some(b"OggS"), None, None, 0, false, 5 * MIB, Some(Audio)),
    sig!("m4a", "m4a", Some(b"\x00\x00\x00\x20ftypM4A"), None, None, 0, false, 5 * MIB, Some(Audio)),
    // Video
    sig!("mp4", "mp4", Some(b"\x00\x00\x00\x18ftypmp4"), None, None, 0, true, 10 * MIB, Some(Videos)),
    sig!("mov", "mov", Some(b"\x00\x00\x00\x14ftyp"), None, None, 0, true, 10 * MIB, Some(Videos)),
    sig!("avi", "avi", Some(b"RIFF"), None, Some(b"AVI "), 0, true, 10 * MIB, Some(Videos)),
    sig!("wmv", "wmv", Some(&[0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11]), None, None, 0, false, 10 * MIB, Some(Videos)),
    sig!("flv", "flv", Some(b"FLV\x01"), None, None, 0, false, 10 * MIB, Some(Videos)),
    sig!("mkv", "mkv", Some(&[0x1A, 0x45, 0xDF, 0xA3]), None, None, 0, false, 10 * MIB, Some(Videos)),
    // Databases
    sig!("sqlite", "sqlite", Some(b"SQLite format 3\x00"), None, None, 0, true, 5 * MIB, Some(Databases)),
    // System types, excluded from the category presets.
    sig!("exe", "exe", Some(b"MZ"), None, None, 0, false, 5 * MIB, None),
    sig!("dll", "dll", Some(b"MZ"), None, None, 0, false, 5 * MIB, None),
];

/// Extensions included in the quick preset.
const QUICK_EXTENSIONS: &[&str] = &["jpg", "png", "pdf", "docx", "xlsx", "mp4", "mp3"];

/// Lookup facade over the static table.
pub struct SignatureRegistry {
    entries: &'static [Signature],
}

static REGISTRY: SignatureRegistry = SignatureRegistry {
    entries: SIGNATURES,
};

impl SignatureRegistry {
    pub fn global() -> &'static SignatureRegistry {
        &REGISTRY
    }

    pub fn entries(&self) -> &'static [Signature] {
        self.entries
    }

    pub fn by_id(&self, id: &str) -> Option<&'static Signature> {
        self.entries.iter().find(|s| s.id == id)
    }

    pub fn by_extension(&self, extension: &str) -> Vec<&'static Signature> {
        self.entries
            .iter()
            .filter(|s| s.extension.eq_ignore_ascii_case(extension))
            .collect()
    }

    /// Resolves a preset to the carvable signatures it covers.
    pub fn select(&self, set: &SignatureSet) -> Vec<&'static Signature> {
        self.entries
            .iter()
            .filter(|s| s.carvable())
            .filter(|s| match set {
                SignatureSet::Quick => s.important && QUICK_EXTENSIONS.contains(&s.extension),
                SignatureSet::Deep => true,
                SignatureSet::Selective(categories) => {
                    s.category.is_some_and(|c| categories.contains(&c))
                }
            })
            .collect()
    }
}

/// Multi-pattern header search over a buffer, built per carving pass from
/// the active signature subset.
pub struct HeaderMatcher {
    automaton: AhoCorasick,
    signatures: Vec<&'static Signature>,
}

impl HeaderMatcher {
    pub fn new(signatures: &[&'static Signature]) -> Result<HeaderMatcher> {
        let with_headers: Vec<&'static Signature> = signatures
            .iter()
            .copied()
            .filter(|s| s.header.is_some())
            .collect();
        if with_headers.is_empty() {
            return Err(EngineError::EmptySignatureSet);
        }
        let patterns: Vec<&[u8]> = with_headers.iter().map(|s| s.header.unwrap()).collect();
        let automaton = AhoCorasick::new(&patterns)
            .map_err(|e| EngineError::UnsupportedDevice(format!("bad signature table: {e}")))?;
        Ok(HeaderMatcher {
            automaton,
            signatures: with_headers,
        })
    }

    /// All header hits whose start position is below `limit`, ordered by
    /// position. Overlapping matches are reported so that formats sharing a
    /// prefix are each considered.
    pub fn find(&self, haystack: &[u8], limit: usize) -> Vec<(usize, &'static Signature)> {
        let mut hits: Vec<(usize, &'static Signature)> = self
            .automaton
            .find_overlapping_iter(haystack)
            .filter(|m| m.start() < limit)
            .map(|m| (m.start(), self.signatures[m.pattern().as_usize()]))
            .collect();
        hits.sort_by_key(|(pos, sig)| (*pos, sig.id));
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique() {
        let mut seen = HashSet::new();
        for sig in SIGNATURES {
            assert!(seen.insert(sig.id), "duplicate id {}", sig.id);
        }
    }

    #[test]
    fn text_formats_are_not_carvable() {
        let registry = SignatureRegistry::global();
        assert!(!registry.by_id("txt").unwrap().carvable());
        assert!(!registry.by_id("csv").unwrap().carvable());
        assert!(registry.by_id("jpg").unwrap().carvable());
    }

    #[test]
    fn quick_preset_is_a_subset_of_deep() {
        let registry = SignatureRegistry::global();
        let quick = registry.select(&SignatureSet::Quick);
        let deep = registry.select(&SignatureSet::Deep);
        assert!(!quick.is_empty());
        assert!(quick.len() < deep.len());
        let deep_ids: HashSet<&str> = deep.iter().map(|s| s.id).collect();
        for sig in &quick {
            assert!(deep_ids.contains(sig.id));
        }
        // Deep covers every carvable entry, including system types.
        assert_eq!(
            deep.len(),
            SIGNATURES.iter().filter(|s| s.carvable()).count()
        );
    }

    #[test]
    fn selective_preset_filters_by_category() {
        let registry = SignatureRegistry::global();
        let mut categories = HashSet::new();
        categories.insert(FileCategory::Images);
        let images = registry.select(&SignatureSet::Selective(categories));
        assert!(images.iter().any(|s| s.id == "jpg"));
        assert!(images.iter().all(|s| s.category == Some(FileCategory::Images)));
        assert!(!images.iter().any(|s| s.id == "exe"));
    }

    #[test]
    fn extension_lookup_finds_both_tiff_byte_orders() {
        let registry = SignatureRegistry::global();
        assert_eq!(registry.by_extension("tif").len(), 2);
        assert_eq!(registry.by_extension("mp3").len(), 2);
    }

    #[test]
    fn matcher_reports_hits_in_position_order() {
        let registry = SignatureRegistry::global();
        let sigs = registry.select(&SignatureSet::Quick);
        let matcher = HeaderMatcher::new(&sigs).unwrap();

        let mut haystack = vec![0u8; 1024];
        haystack[100..103].copy_from_slice(&[0xFF, 0xD8, 0xFF]);
        haystack[500..508].copy_from_slice(b"\x89PNG\r\n\x1a\n");

        let hits = matcher.find(&haystack, haystack.len());
        let positions: Vec<(usize, &str)> = hits.iter().map(|(p, s)| (*p, s.id)).collect();
        assert!(positions.contains(&(100, "jpg")));
        assert!(positions.contains(&(500, "png")));
        assert!(positions.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[test]
    fn matcher_respects_search_limit() {
        let registry = SignatureRegistry::global();
        let sigs = registry.select(&SignatureSet::Quick);
        let matcher = HeaderMatcher::new(&sigs).unwrap();

        let mut haystack = vec![0u8; 1024];
        haystack[900..903].copy_from_slice(&[0xFF, 0xD8, 0xFF]);
        assert!(matcher.find(&haystack, 512).is_empty());
        assert_eq!(matcher.find(&haystack, 1024).len(), 1);
    }

    #[test]
    fn empty_selection_is_rejected() {
        assert!(matches!(
            HeaderMatcher::new(&[]),
            Err(EngineError::EmptySignatureSet)
        ));
    }
}
