/// Render a byte count as a human-friendly size string.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const STEP: f64 = 1024.0;

    let mut value = bytes as f64;
    for unit in ["bytes", "KB", "MB", "GB"] {
        if value < STEP {
            return format!("{value:.2} {unit}");
        }
        value /= STEP;
    }
    format!("{value:.2} TB")
}

/// Shorten a version token for display. Tokens under eight characters are
/// shown whole rather than sliced.
#[must_use]
pub fn short_version(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}

/// Render a human-friendly transfer speed string.
#[must_use]
pub fn format_speed(bytes_per_sec: f32) -> String {
    const KIB: f32 = 1024.0;
    const MIB: f32 = KIB * 1024.0;

    if bytes_per_sec < KIB {
        format!("{bytes_per_sec:.0} B/s")
    } else if bytes_per_sec < MIB {
        format!("{:.1} KB/s", bytes_per_sec / KIB)
    } else {
        format!("{:.1} MB/s", bytes_per_sec / MIB)
    }
}

/// True when a manifest-relative name contains a parent-directory segment
/// and would resolve outside the installation root.
#[must_use]
pub fn escapes_root(name: &str) -> bool {
    name.split(['/', '\\']).any(|segment| segment == "..")
}
