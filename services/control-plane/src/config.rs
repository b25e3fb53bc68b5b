use std::env;
use std::time::Duration;

/// Process-wide configuration, read once at startup (§10.C). Everything not
/// listed here is a fixed protocol constant, not a deployment knob.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub base_url: Option<String>,
    pub cors_origins: Vec<String>,
    pub trust_proxy: bool,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        let port = env::var("PORT").unwrap_or_else(|_| "8080".to_owned());
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| format!("0.0.0.0:{port}")),
            base_url: env::var("BASE_URL").ok(),
            cors_origins: env::var("CORS_ORIGIN")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_owned()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default(),
            trust_proxy: env::var("TRUST_PROXY")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "control_plane=info,tower_http=info".to_owned()),
        }
    }
}

/// Derives the external base URL (protocol + host) from request headers per §6.
pub fn derive_external_base(config: &Config, headers: &axum::http::HeaderMap, host: &str) -> String {
    if let Some(base) = &config.base_url {
        return base.clone();
    }
    let proto = if config.trust_proxy {
        headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned)
    } else {
        None
    };
    let proto = proto.unwrap_or_else(|| {
        let is_local = host.starts_with("localhost") || host.starts_with("127.0.0.1");
        let forwarded = headers.get("x-forwarded-for").is_some();
        if forwarded && !is_local && !host.contains(':') {
            "https".to_owned()
        } else {
            "http".to_owned()
        }
    });
    format!("{proto}://{host}")
}

pub const RELAY_AUTH_TIMEOUT: Duration = Duration::from_secs(10);
pub const RELAY_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const RELAY_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(90);
pub const DEVICE_ONLINE_WINDOW: Duration = Duration::from_secs(120);
pub const PAIRING_TTL: Duration = Duration::from_secs(5 * 60);
pub const ENROLLMENT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const PAIR_INITIATE_RATE: (u32, Duration) = (10, Duration::from_secs(60));
pub const PAIR_COMPLETE_RATE: (u32, Duration) = (15, Duration::from_secs(60));

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    fn config() -> Config {
        Config {
            database_url: String::new(),
            bind_addr: String::new(),
            base_url: None,
            cors_origins: vec![],
            trust_proxy: false,
            log_level: String::new(),
        }
    }

    #[test]
    fn base_url_override_wins_outright() {
        let mut cfg = config();
        cfg.base_url = Some("https://fleet.example".to_owned());
        assert_eq!(
            derive_external_base(&cfg, &HeaderMap::new(), "ignored:8080"),
            "https://fleet.example"
        );
    }

    #[test]
    fn trust_proxy_honors_x_forwarded_proto() {
        let mut cfg = config();
        cfg.trust_proxy = true;
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-proto", "https".parse().unwrap());
        assert_eq!(
            derive_external_base(&cfg, &headers, "fleet.example"),
            "https://fleet.example"
        );
    }

    #[test]
    fn untrusted_forwarded_for_on_non_local_host_assumes_https() {
        let cfg = config();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9".parse().unwrap());
        assert_eq!(
            derive_external_base(&cfg, &headers, "fleet.example"),
            "https://fleet.example"
        );
    }

    #[test]
    fn local_host_defaults_to_http() {
        let cfg = config();
        assert_eq!(
            derive_external_base(&cfg, &HeaderMap::new(), "localhost:8080"),
            "http://localhost:8080"
        );
    }
}
