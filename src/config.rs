use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub gateway: GatewayConfig,
    pub engine: EngineConfig,
    pub identity: IdentityConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    /// Ceiling on one engine round, in seconds. Batch jobs and the
    /// post-end drain of a live channel both fail past this.
    pub processing_timeout_secs: u64,

    /// How long a finished session stays queryable before the sweeper
    /// evicts it.
    pub retention_secs: u64,

    /// Interval between sweeper passes.
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct EngineConfig {
    pub nats_url: String,
}

#[derive(Debug, Deserialize)]
pub struct IdentityConfig {
    /// Identity service endpoint for token verification. When unset,
    /// `tokens` supplies a static allow-list instead.
    pub verify_url: Option<String>,

    /// Tokens accepted without an identity service. Development only.
    #[serde(default)]
    pub tokens: Vec<String>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
