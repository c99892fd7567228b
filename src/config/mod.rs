use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub collaborative: CollaborativeConfig,
    pub content: ContentConfig,
    pub hybrid: HybridConfig,
    pub blend: BlendConfig,
    pub resilience: ResilienceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port).parse().unwrap()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborativeConfig {
    /// Upper bound on latent dimensions; the effective k is
    /// min(max_components, min(matrix dims) - 1).
    pub max_components: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    pub max_terms: usize,
    /// Terms appearing in fewer documents than this are dropped.
    pub min_document_frequency: usize,
    /// Terms appearing in more than this fraction of documents are dropped.
    pub max_document_fraction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub validation_fraction: f64,
    pub random_seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlendConfig {
    pub collaborative_weight: f64,
    pub content_weight: f64,
    pub hybrid_weight: f64,
    pub default_limit: usize,
    pub max_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub prediction_timeout_secs: u64,
    pub error_log_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                workers: num_cpus::get(),
            },
            collaborative: CollaborativeConfig { max_components: 50 },
            content: ContentConfig {
                max_terms: 1000,
                min_document_frequency: 2,
                max_document_fraction: 0.95,
            },
            hybrid: HybridConfig {
                n_trees: 100,
                max_depth: 10,
                min_samples_split: 5,
                min_samples_leaf: 2,
                validation_fraction: 0.2,
                random_seed: 42,
            },
            // Blend weights are inherited defaults, not tuned optima.
            blend: BlendConfig {
                collaborative_weight: 0.4,
                content_weight: 0.3,
                hybrid_weight: 0.3,
                default_limit: 10,
                max_limit: 50,
            },
            resilience: ResilienceConfig {
                failure_threshold: 5,
                recovery_timeout_secs: 60,
                prediction_timeout_secs: 5,
                error_log_capacity: 100,
            },
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("POLICYREC"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
