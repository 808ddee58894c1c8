use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MDNS_SERVICE_TYPE: &str = "_microsoft-tye._tcp.local";
pub const DEFAULT_DEBUGGER_KIND: &str = "coreclr";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Poll the OS process and port tables.
    Process,
    /// Browse multicast DNS announcements.
    Mdns,
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub poll_interval: Duration,
    /// Overrides tool path resolution when set (the `tyePath` setting).
    pub tye_path: Option<PathBuf>,
    pub mode: DiscoveryMode,
    pub mdns_service_type: String,
    pub debugger_kind: String,
    pub shutdown_timeout: Duration,
    /// Process image names searched, in priority order, beneath a function host.
    pub function_host_patterns: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            tye_path: None,
            mode: DiscoveryMode::Process,
            mdns_service_type: DEFAULT_MDNS_SERVICE_TYPE.to_string(),
            debugger_kind: DEFAULT_DEBUGGER_KIND.to_string(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            function_host_patterns: vec![
                "Microsoft.Azure.WebJobs.Script.WebHost".to_string(),
                "dotnet".to_string(),
            ],
        }
    }
}

fn millis(value: Option<String>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl DiscoveryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from `TYE_*` variables served by `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let mode = match non_blank(lookup("TYE_DISCOVERY")).as_deref() {
            Some(v) if v.eq_ignore_ascii_case("mdns") => DiscoveryMode::Mdns,
            _ => DiscoveryMode::Process,
        };

        Self {
            poll_interval: millis(lookup("TYE_POLL_INTERVAL_MS"))
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults.poll_interval),
            tye_path: non_blank(lookup("TYE_PATH")).map(PathBuf::from),
            mode,
            mdns_service_type: non_blank(lookup("TYE_MDNS_SERVICE_TYPE"))
                .unwrap_or(defaults.mdns_service_type),
            debugger_kind: non_blank(lookup("TYE_DEBUGGER_KIND")).unwrap_or(defaults.debugger_kind),
            shutdown_timeout: millis(lookup("TYE_SHUTDOWN_TIMEOUT_MS"))
                .unwrap_or(defaults.shutdown_timeout),
            function_host_patterns: defaults.function_host_patterns,
        }
    }
}
