/// Glob match where `*` matches any (possibly empty) run of bytes.
///
/// Used for resource names at check time; `proj-*` matches `proj-api` and
/// `proj-`.
pub fn wildcard_match(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let (mut p_idx, mut v_idx) = (0usize, 0usize);
    let (mut star_idx, mut match_idx) = (None, 0usize);
    let pattern_bytes = pattern.as_bytes();
    let value_bytes = value.as_bytes();

    while v_idx < value_bytes.len() {
        if p_idx < pattern_bytes.len() && pattern_bytes[p_idx] == b'*' {
            star_idx = Some(p_idx);
            match_idx = v_idx;
            p_idx += 1;
            continue;
        }

        if p_idx < pattern_bytes.len() && pattern_bytes[p_idx] == value_bytes[v_idx] {
            p_idx += 1;
            v_idx += 1;
            continue;
        }

        // Backtrack: let the last star swallow one more byte.
        if let Some(star) = star_idx {
            p_idx = star + 1;
            match_idx += 1;
            v_idx = match_idx;
            continue;
        }

        return false;
    }

    while p_idx < pattern_bytes.len() && pattern_bytes[p_idx] == b'*' {
        p_idx += 1;
    }

    p_idx == pattern_bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_names() {
        assert!(wildcard_match("api-server", "api-server"));
        assert!(!wildcard_match("api-server", "api-server-v2"));
        assert!(!wildcard_match("api-server", "api"));
    }

    #[test]
    fn prefix_glob() {
        assert!(wildcard_match("proj-*", "proj-api"));
        assert!(wildcard_match("proj-*", "proj-"));
        assert!(!wildcard_match("proj-*", "other-api"));
    }

    #[test]
    fn star_matches_everything() {
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("*", ""));
    }

    #[test]
    fn inner_star_backtracks() {
        assert!(wildcard_match("svc-*-prod", "svc-billing-prod"));
        assert!(wildcard_match("svc-*-prod", "svc-a-prod-prod"));
        assert!(!wildcard_match("svc-*-prod", "svc-billing-dev"));
    }

    #[test]
    fn literal_pattern_never_matches_glob_value() {
        assert!(!wildcard_match("proj-a", "proj-*"));
    }
}
