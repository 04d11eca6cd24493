// ─── Version Ordering ───
// Loose numeric ordering for library and game version strings.

use std::cmp::Ordering;

fn parse_numeric_version_parts(raw: &str) -> Vec<u64> {
    raw.split(|c: char| !c.is_ascii_digit())
        .filter(|segment| !segment.is_empty())
        .filter_map(|segment| segment.parse::<u64>().ok())
        .collect()
}

/// Compare two version strings by their numeric segments, padding the shorter
/// one with zeros. Identical numeric parts fall back to a lexical comparison so
/// the order is total and deterministic.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a_parts = parse_numeric_version_parts(a);
    let b_parts = parse_numeric_version_parts(b);

    let max_len = a_parts.len().max(b_parts.len());
    for idx in 0..max_len {
        let a_val = a_parts.get(idx).copied().unwrap_or(0);
        let b_val = b_parts.get(idx).copied().unwrap_or(0);
        match a_val.cmp(&b_val) {
            Ordering::Equal => continue,
            non_eq => return non_eq,
        }
    }

    a.cmp(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_segments_win_over_lexical_order() {
        assert_eq!(compare_versions("9.10", "9.8"), Ordering::Greater);
        assert_eq!(compare_versions("1.20.1", "1.20"), Ordering::Greater);
        assert_eq!(compare_versions("2.1.6", "2.1.8"), Ordering::Less);
    }

    #[test]
    fn equal_numbers_use_lexical_tiebreak() {
        assert_eq!(compare_versions("1.0", "1.0"), Ordering::Equal);
        assert_ne!(compare_versions("1.0-beta", "1.0"), Ordering::Equal);
    }
}
