//! Small shared helpers.

/// Strips path separators and control characters from a recovered filename
/// so it is safe to create under the output directory.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Formats a duration in seconds as `HH:MM:SS`.
pub fn format_hms(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// Extrapolates remaining time from elapsed time and completed percentage.
pub fn estimate_remaining(elapsed_seconds: f64, progress_percent: f64) -> String {
    if progress_percent <= 0.0 || progress_percent >= 100.0 {
        return "calculating".to_string();
    }
    let total = (elapsed_seconds / progress_percent) * 100.0;
    format_hms(total - elapsed_seconds)
}

/// Renders bytes as a printable ASCII preview, one character per byte.
pub fn ascii_preview(data: &[u8]) -> String {
    data.iter()
        .map(|&b| if (32..127).contains(&b) { b as char } else { '.' })
        .collect()
}

/// True when every byte in `data` is zero.
pub fn all_zero(data: &[u8]) -> bool {
    data.iter().all(|&b| b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_separators() {
        assert_eq!(sanitize_filename("a/b\\c:d.txt"), "a_b_c_d.txt");
        assert_eq!(sanitize_filename("  notes.txt  "), "notes.txt");
        assert_eq!(sanitize_filename("///"), "unnamed");
    }

    #[test]
    fn hms_formatting() {
        assert_eq!(format_hms(0.0), "00:00:00");
        assert_eq!(format_hms(3661.0), "01:01:01");
        assert_eq!(format_hms(-5.0), "00:00:00");
    }

    #[test]
    fn remaining_time_extrapolates() {
        assert_eq!(estimate_remaining(30.0, 50.0), "00:00:30");
        assert_eq!(estimate_remaining(10.0, 0.0), "calculating");
    }

    #[test]
    fn preview_replaces_non_printable() {
        assert_eq!(ascii_preview(b"ab\x00\xffcd"), "ab..cd");
    }
}
