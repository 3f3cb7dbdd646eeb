//! CLI command implementations for ciao-image.
//!
//! - [`image`] - Create, list, show, upload, update and delete images

pub mod image;

/// Format a byte count for humans (`0 B`, `1.5 KiB`, `10.0 MiB`).
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
