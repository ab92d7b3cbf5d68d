use std::num::{NonZeroU32, NonZeroU64};

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    #[serde(default = "ServerConfig::default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

impl ServerConfig {
    fn default_max_upload_bytes() -> usize {
        // Matches the upload ceiling the web client enforces.
        25 * 1024 * 1024
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            max_upload_bytes: Self::default_max_upload_bytes(),
            rate_limit: RateLimitConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "RateLimitConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "RateLimitConfig::default_window_ms")]
    pub window_ms: NonZeroU64,
    #[serde(default = "RateLimitConfig::default_convert_limit")]
    pub convert: RouteLimitConfig,
    #[serde(default = "RateLimitConfig::default_generate_limit")]
    pub generate: RouteLimitConfig,
}

impl RateLimitConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_window_ms() -> NonZeroU64 {
        NonZeroU64::new(1_000).expect("non-zero window defaults to 1000ms")
    }

    fn default_convert_limit() -> RouteLimitConfig {
        RouteLimitConfig::convert_defaults()
    }

    fn default_generate_limit() -> RouteLimitConfig {
        RouteLimitConfig::generate_defaults()
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            window_ms: Self::default_window_ms(),
            convert: Self::default_convert_limit(),
            generate: Self::default_generate_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RouteLimitConfig {
    #[serde(default = "RouteLimitConfig::default_requests")]
    pub max_requests: NonZeroU32,
    #[serde(default = "RouteLimitConfig::default_burst")]
    pub burst: NonZeroU32,
}

impl RouteLimitConfig {
    fn default_requests() -> NonZeroU32 {
        NonZeroU32::new(1).expect("default requests bound must be non-zero")
    }

    fn default_burst() -> NonZeroU32 {
        NonZeroU32::new(1).expect("default burst bound must be non-zero")
    }

    fn convert_defaults() -> Self {
        Self {
            max_requests: NonZeroU32::new(6).expect("convert default must be non-zero"),
            burst: NonZeroU32::new(12).expect("convert burst must be non-zero"),
        }
    }

    fn generate_defaults() -> Self {
        Self {
            max_requests: NonZeroU32::new(2).expect("generate default must be non-zero"),
            burst: NonZeroU32::new(4).expect("generate burst must be non-zero"),
        }
    }
}

impl Default for RouteLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: Self::default_requests(),
            burst: Self::default_burst(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub allow_origins: Vec<String>,
    #[serde(default = "CorsConfig::default_allow_methods")]
    pub allow_methods: Vec<String>,
    #[serde(default = "CorsConfig::default_allow_headers")]
    pub allow_headers: Vec<String>,
    #[serde(default = "CorsConfig::default_max_age_secs")]
    pub max_age_secs: u64,
}

impl CorsConfig {
    fn default_allow_methods() -> Vec<String> {
        vec!["GET".to_string(), "POST".to_string(), "OPTIONS".to_string()]
    }

    fn default_allow_headers() -> Vec<String> {
        vec!["authorization".to_string(), "content-type".to_string()]
    }

    fn default_max_age_secs() -> u64 {
        600
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allow_origins: Vec::new(),
            allow_methods: Self::default_allow_methods(),
            allow_headers: Self::default_allow_headers(),
            max_age_secs: Self::default_max_age_secs(),
        }
    }
}
