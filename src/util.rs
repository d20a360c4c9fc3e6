use reqwest::Url;

/// Accepts `1/0`, `true/false`, `yes/no`, `on/off` in any case.
pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Returns true for localhost, loopback IPv4/IPv6, and 0.0.0.0 URLs.
pub fn is_local_endpoint_url(url: &str) -> bool {
    let parsed = match Url::parse(url.trim()) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };

    match parsed.host_str() {
        Some(host) => {
            let normalized = host
                .trim()
                .trim_start_matches('[')
                .trim_end_matches(']')
                .to_ascii_lowercase();
            normalized == "localhost"
                || normalized == "::1"
                || normalized == "0.0.0.0"
                || normalized.starts_with("127.")
        }
        None => false,
    }
}

/// Human-facing name for an agent tag: `"cassandra"` -> `"Cassandra"`,
/// `"root_cause-bot"` -> `"Root Cause Bot"`.
pub fn agent_display_name(agent: &str) -> String {
    agent
        .split(['_', '-', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read an env var, treating unset and blank values alike.
pub fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_flag() {
        assert_eq!(parse_bool_flag(" On "), Some(true));
        assert_eq!(parse_bool_flag("0"), Some(false));
        assert_eq!(parse_bool_flag("YES"), Some(true));
        assert_eq!(parse_bool_flag(""), None);
        assert_eq!(parse_bool_flag("enabled"), None);
    }

    #[test]
    fn test_is_local_endpoint_url_normalizes_case_and_space() {
        assert!(is_local_endpoint_url(" HTTP://LOCALHOST:8000/api "));
        assert!(is_local_endpoint_url("https://127.0.0.1/api"));
        assert!(is_local_endpoint_url("http://[::1]:8000"));
        assert!(is_local_endpoint_url("https://0.0.0.0/api"));
        assert!(!is_local_endpoint_url("https://evil-localhost.com/api"));
        assert!(!is_local_endpoint_url("https://console.example.com"));
    }

    #[test]
    fn test_agent_display_name() {
        assert_eq!(agent_display_name("cassandra"), "Cassandra");
        assert_eq!(agent_display_name("root_cause-bot"), "Root Cause Bot");
        assert_eq!(agent_display_name(""), "");
    }
}
