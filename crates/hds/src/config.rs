use std::time::Duration;

use crate::proxy::ProxyConfig;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/115.0";

/// Configurable options for an HDS fetch.
#[derive(Debug, Clone)]
pub struct HdsConfig {
    /// User agent string sent with every request.
    pub user_agent: String,

    /// Overall timeout for a single HTTP request. Zero disables it.
    pub timeout: Duration,

    /// Connection timeout (time to establish the initial connection).
    pub connect_timeout: Duration,

    /// Proxy configuration (optional).
    pub proxy: Option<ProxyConfig>,

    /// Player hash used for Akamai player verification (base64 SHA-256 of
    /// the decompressed player, supplied by the service configuration).
    pub player: Option<String>,

    /// HMAC-SHA256 key for the `pvtoken` query parameter.
    pub akamai_key: Option<Vec<u8>>,
}

impl Default for HdsConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            proxy: None,
            player: None,
            akamai_key: None,
        }
    }
}

impl HdsConfig {
    pub fn builder() -> HdsConfigBuilder {
        HdsConfigBuilder::new()
    }
}

/// Builder for [`HdsConfig`].
#[derive(Debug, Default)]
pub struct HdsConfigBuilder {
    config: HdsConfig,
}

impl HdsConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = Some(proxy);
        self
    }

    pub fn player(mut self, player: impl Into<String>) -> Self {
        self.config.player = Some(player.into());
        self
    }

    pub fn akamai_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.config.akamai_key = Some(key.into());
        self
    }

    pub fn build(self) -> HdsConfig {
        self.config
    }
}
