//! Configuration for handshake sessions

use std::time::Duration;

/// Fixed message authenticated at the end of every handshake
pub const DEFAULT_AUTH_MESSAGE: &str = "AUTH_CHECK";

/// Deadlines and options for handshake sessions
#[derive(Clone, Debug)]
pub struct HandshakeConfig {
    /// Deadline on the initiator's SYN send-with-ack.
    /// `None` blocks until acknowledged, however long that takes.
    pub syn_ack_timeout: Option<Duration>,

    /// Responder's bounded wait for the SYN
    pub syn_wait: Duration,

    /// Deadline for every other send-with-ack
    pub ack_timeout: Duration,

    /// Bounded wait for public keys and ciphertexts
    pub artifact_wait: Duration,

    /// Bounded wait for the authentication message
    pub auth_wait: Duration,

    /// Plaintext authenticated with the derived secret
    pub auth_message: String,

    /// Whether to log every protocol step
    pub verbose_logging: bool,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl HandshakeConfig {
    /// Create a configuration with the standard deadlines
    pub fn new() -> Self {
        Self {
            syn_ack_timeout: Some(Duration::from_secs(10)),
            syn_wait: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(5),
            artifact_wait: Duration::from_secs(5),
            auth_wait: Duration::from_secs(5),
            auth_message: DEFAULT_AUTH_MESSAGE.to_string(),
            verbose_logging: false,
        }
    }

    /// Validating builder starting from the standard deadlines
    pub fn builder() -> HandshakeConfigBuilder {
        HandshakeConfigBuilder::new()
    }

    /// Reference benchmark behavior: the SYN blocks until acknowledged
    pub fn reference() -> Self {
        Self {
            syn_ack_timeout: None,
            ..Self::new()
        }
    }

    /// Short deadlines for tests
    pub fn fast() -> Self {
        let deadline = Duration::from_millis(250);
        Self {
            syn_ack_timeout: Some(deadline),
            syn_wait: deadline,
            ack_timeout: deadline,
            artifact_wait: deadline,
            auth_wait: deadline,
            ..Self::new()
        }
    }

    /// Apply one deadline to every bounded wait, including the SYN
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.syn_ack_timeout = Some(timeout);
        self.syn_wait = timeout;
        self.ack_timeout = timeout;
        self.artifact_wait = timeout;
        self.auth_wait = timeout;
        self
    }

    /// Set the authenticated test message
    pub fn with_auth_message(mut self, message: impl Into<String>) -> Self {
        self.auth_message = message.into();
        self
    }

    /// Enable verbose logging
    pub fn with_verbose_logging(mut self) -> Self {
        self.verbose_logging = true;
        self
    }
}

/// Builder for HandshakeConfig
pub struct HandshakeConfigBuilder {
    config: HandshakeConfig,
}

impl Default for HandshakeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HandshakeConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self {
            config: HandshakeConfig::new(),
        }
    }

    pub fn syn_ack_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.syn_ack_timeout = timeout;
        self
    }

    /// One deadline for every bounded wait, including the SYN
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_timeout(timeout);
        self
    }

    pub fn syn_wait(mut self, wait: Duration) -> Self {
        self.config.syn_wait = wait;
        self
    }

    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.ack_timeout = timeout;
        self
    }

    pub fn artifact_wait(mut self, wait: Duration) -> Self {
        self.config.artifact_wait = wait;
        self
    }

    pub fn auth_wait(mut self, wait: Duration) -> Self {
        self.config.auth_wait = wait;
        self
    }

    pub fn auth_message(mut self, message: impl Into<String>) -> Self {
        self.config.auth_message = message.into();
        self
    }

    pub fn verbose(mut self) -> Self {
        self.config.verbose_logging = true;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<HandshakeConfig, &'static str> {
        let c = &self.config;
        let bounded = [c.syn_wait, c.ack_timeout, c.artifact_wait, c.auth_wait];
        if bounded.iter().any(Duration::is_zero) || c.syn_ack_timeout == Some(Duration::ZERO) {
            return Err("deadlines must be non-zero");
        }
        if c.auth_message.is_empty() {
            return Err("auth message must not be empty");
        }
        if c.auth_message.contains(crate::wire::AUTH_DELIMITER) {
            return Err("auth message must not contain the wire delimiter");
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_preset_has_no_syn_deadline() {
        let config = HandshakeConfig::reference();
        assert_eq!(config.syn_ack_timeout, None);
        assert_eq!(config.syn_wait, Duration::from_secs(10));
        assert_eq!(config.artifact_wait, Duration::from_secs(5));
    }

    #[test]
    fn default_bounds_the_syn() {
        assert!(HandshakeConfig::default().syn_ack_timeout.is_some());
    }

    #[test]
    fn builder_rejects_delimiter_in_message() {
        let result = HandshakeConfigBuilder::new().auth_message("A|B").build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_rejects_zero_deadline() {
        let result = HandshakeConfigBuilder::new()
            .artifact_wait(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_timeout_covers_every_wait() {
        let deadline = Duration::from_millis(75);
        let config = HandshakeConfig::builder().timeout(deadline).build().unwrap();
        assert_eq!(config.syn_ack_timeout, Some(deadline));
        assert_eq!(
            [config.syn_wait, config.ack_timeout, config.artifact_wait, config.auth_wait],
            [deadline; 4]
        );
        assert!(HandshakeConfig::builder()
            .timeout(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn builder_applies_overrides() {
        let config = HandshakeConfigBuilder::new()
            .syn_ack_timeout(None)
            .auth_wait(Duration::from_millis(50))
            .auth_message("PING")
            .verbose()
            .build()
            .unwrap();
        assert_eq!(config.syn_ack_timeout, None);
        assert_eq!(config.auth_wait, Duration::from_millis(50));
        assert_eq!(config.auth_message, "PING");
        assert!(config.verbose_logging);
    }
}
