use reqwest::Proxy;

/// Proxy configuration. The service historically only needed a SOCKS5
/// hook, so a bare `host:port` is treated as a SOCKS5 proxy; any other
/// scheme is passed through to reqwest as-is.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Proxy URL (e.g. "socks5://127.0.0.1:1080" or "host:1080").
    pub url: String,
}

impl ProxyConfig {
    pub fn new(url: impl Into<String>) -> Self {
        ProxyConfig { url: url.into() }
    }
}

/// Build a reqwest Proxy object from our proxy configuration.
pub fn build_proxy_from_config(config: &ProxyConfig) -> Result<Proxy, String> {
    let url = if config.url.contains("://") {
        config.url.clone()
    } else {
        format!("socks5://{}", config.url)
    };

    Proxy::all(&url).map_err(|e| format!("invalid proxy URL {url:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_port_defaults_to_socks5() {
        assert!(build_proxy_from_config(&ProxyConfig::new("127.0.0.1:1080")).is_ok());
    }

    #[test]
    fn explicit_scheme_is_kept() {
        assert!(build_proxy_from_config(&ProxyConfig::new("http://proxy.example:8080")).is_ok());
    }
}
