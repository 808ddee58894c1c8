use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub timeout: Duration,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl DashboardConfig {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let timeout = lookup("TYE_HTTP_TIMEOUT_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT);

        Self { timeout }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DashboardConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_new_config() {
        let config = DashboardConfig::new(Duration::from_millis(250));
        assert_eq!(config.timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_from_lookup() {
        assert_eq!(DashboardConfig::from_lookup(|_| None).timeout, Duration::from_secs(10));

        let config = DashboardConfig::from_lookup(|name| (name == "TYE_HTTP_TIMEOUT_MS").then(|| "1500".to_string()));
        assert_eq!(config.timeout, Duration::from_millis(1500));

        let config = DashboardConfig::from_lookup(|_| Some("not-a-number".to_string()));
        assert_eq!(config.timeout, Duration::from_secs(10));
    }
}
