//! Serial port discovery and candidate ordering.

use tracing::{debug, warn};

/// First and last COM number tried when the OS reports no ports on Windows.
const FALLBACK_COM_RANGE: std::ops::RangeInclusive<u32> = 3..=40;

/// Ports the operating system currently reports, in scan order.
///
/// On Windows, when enumeration yields nothing, `COM3`..=`COM40` are returned
/// so that a scan still has something to try.
pub fn detect_serial_ports() -> Vec<String> {
    let detected: Vec<String> = match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(e) => {
            warn!("Serial port enumeration failed: {}", e);
            Vec::new()
        }
    };
    debug!("Detected serial ports: {:?}", detected);

    if detected.is_empty() && cfg!(windows) {
        return fallback_com_ports();
    }
    sort_candidates(detected)
}

/// `COM3` through `COM40`.
pub fn fallback_com_ports() -> Vec<String> {
    FALLBACK_COM_RANGE.map(|n| format!("COM{n}")).collect()
}

/// Normalize, deduplicate and order port names for scanning.
///
/// `COM` names are upper-cased and compared case-insensitively. Names are
/// ordered by their non-numeric prefix, then by the numeric suffix, so
/// `COM3` sorts before `COM10`. Names without a numeric suffix sort after
/// numbered names sharing the same prefix.
///
/// ```
/// use sps30_core::ports::sort_candidates;
///
/// let sorted = sort_candidates(["COM10", "com3", "COM4", "COM3"].map(String::from));
/// assert_eq!(sorted, ["COM3", "COM4", "COM10"]);
/// ```
pub fn sort_candidates(ports: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out: Vec<String> = ports
        .into_iter()
        .map(|p| normalize(p.trim()))
        .filter(|p| !p.is_empty())
        .filter(|p| seen.insert(p.to_uppercase()))
        .collect();
    out.sort_by_cached_key(|p| sort_key(p));
    out
}

fn normalize(name: &str) -> String {
    if name.len() > 3 && name.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("COM")) {
        name.to_uppercase()
    } else {
        name.to_string()
    }
}

fn sort_key(name: &str) -> (String, u32, String) {
    let prefix = name.trim_end_matches(|c: char| c.is_ascii_digit());
    let number = name[prefix.len()..].parse::<u32>().unwrap_or(u32::MAX);
    (prefix.to_uppercase(), number, name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_numeric_suffix_order() {
        let sorted = sort_candidates(strings(&["COM12", "COM3", "COM40", "COM5"]));
        assert_eq!(sorted, ["COM3", "COM5", "COM12", "COM40"]);
    }

    #[test]
    fn test_case_insensitive_dedupe() {
        let sorted = sort_candidates(strings(&["com7", "COM7", " COM7 ", "Com8"]));
        assert_eq!(sorted, ["COM7", "COM8"]);
    }

    #[test]
    fn test_unix_names_keep_case() {
        let sorted = sort_candidates(strings(&["/dev/ttyUSB10", "/dev/ttyUSB2", "/dev/ttyACM0"]));
        assert_eq!(sorted, ["/dev/ttyACM0", "/dev/ttyUSB2", "/dev/ttyUSB10"]);
    }

    #[test]
    fn test_name_without_number_sorts_after_numbered() {
        let sorted = sort_candidates(strings(&["COMX", "COM9"]));
        assert_eq!(sorted, ["COM9", "COMX"]);
    }

    #[test]
    fn test_fallback_range() {
        let ports = fallback_com_ports();
        assert_eq!(ports.len(), 38);
        assert_eq!(ports.first().map(String::as_str), Some("COM3"));
        assert_eq!(ports.last().map(String::as_str), Some("COM40"));
    }
}
