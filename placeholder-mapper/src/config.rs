use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time;

use envconfig::Envconfig;
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use thiserror::Error;

use placeholder_common::docstore::HttpClientSettings;
use placeholder_common::resolver::AuthorityMappings;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "8080")]
    pub port: u16,

    #[envconfig(default = "http://localhost:8080/__document-store-api")]
    pub document_store_api_address: String,

    /// Host used to build promotional image ids.
    #[envconfig(default = "api.ft.com")]
    pub api_host: String,

    #[envconfig(default = "./brandMappings.json")]
    pub authority_mappings_path: PathBuf,

    #[envconfig(default = "blog,webchat-live-blogs,webchat-live-qa,webchat-markets-live,fastft")]
    pub blog_categories: CommaSeparated,

    #[envconfig(default = "5000")]
    pub http_connect_timeout: EnvMsDuration,

    #[envconfig(default = "10000")]
    pub http_request_timeout: EnvMsDuration,

    #[envconfig(default = "90000")]
    pub http_idle_timeout: EnvMsDuration,

    #[envconfig(default = "100")]
    pub http_max_idle_per_host: usize,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn http_client_settings(&self) -> HttpClientSettings {
        HttpClientSettings {
            connect_timeout: self.http_connect_timeout.0,
            request_timeout: self.http_request_timeout.0,
            pool_idle_timeout: self.http_idle_timeout.0,
            max_idle_per_host: self.http_max_idle_per_host,
        }
    }
}

#[derive(Envconfig, Clone)]
pub struct KafkaConfig {
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,

    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    #[envconfig(default = "methode-content-placeholder-mapper")]
    pub kafka_consumer_group: String,

    #[envconfig(default = "NativeCmsPublicationEvents")]
    pub kafka_consumer_topic: String,

    #[envconfig(default = "earliest")]
    pub kafka_consumer_offset_reset: String, // earliest, latest

    #[envconfig(default = "CmsPublicationEvents")]
    pub kafka_producer_topic: String,

    #[envconfig(default = "20")]
    pub kafka_producer_linger_ms: u32, // Maximum time between producer batches during low traffic

    #[envconfig(default = "400")]
    pub kafka_producer_queue_mib: u32, // Size of the in-memory producer queue in mebibytes

    #[envconfig(default = "20000")]
    pub kafka_message_timeout_ms: u32, // Time before we stop retrying producing a message: 20 seconds

    #[envconfig(default = "none")]
    pub kafka_compression_codec: String, // none, gzip, snappy, lz4, zstd
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

/// A comma separated list, blank entries dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommaSeparated(pub Vec<String>);

impl FromStr for CommaSeparated {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CommaSeparated(
            s.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_owned)
                .collect(),
        ))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read authority mappings from {path}: {source}")]
    ReadMappings {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse authority mappings from {path}: {source}")]
    ParseMappings {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Authority mappings as they appear in the file, order included.
struct OrderedMappings(Vec<(String, String)>);

struct OrderedMappingsVisitor;

impl<'de> Visitor<'de> for OrderedMappingsVisitor {
    type Value = OrderedMappings;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "an object of domain to authority names")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut mappings = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((domain, authority)) = access.next_entry::<String, String>()? {
            mappings.push((domain, authority));
        }
        Ok(OrderedMappings(mappings))
    }
}

impl<'de> Deserialize<'de> for OrderedMappings {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(OrderedMappingsVisitor)
    }
}

pub fn parse_authority_mappings(contents: &str) -> Result<AuthorityMappings, serde_json::Error> {
    let OrderedMappings(mappings) = serde_json::from_str(contents)?;
    Ok(AuthorityMappings::new(mappings))
}

pub fn load_authority_mappings(path: &Path) -> Result<AuthorityMappings, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadMappings {
        path: path.display().to_string(),
        source,
    })?;

    parse_authority_mappings(&contents).map_err(|source| ConfigError::ParseMappings {
        path: path.display().to_string(),
        source,
    })
}
