use super::RequestsLoggingLevel;
use reqwest::Url;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    /// Incoming paths are resolved against this URL.
    pub origin: Url,
}
