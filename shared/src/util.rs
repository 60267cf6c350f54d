/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Canonical form of a courier identity used as the session-registry key.
///
/// Clients have been seen sending ids with stray whitespace or mixed case,
/// so every lookup goes through this.
pub fn normalize_identity(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_identity("  Courier-42 "), "courier-42");
        assert_eq!(normalize_identity("c1"), "c1");
    }
}
