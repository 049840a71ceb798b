use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub password: SecretString,
    /// Full URL, e.g. from `REDIS_URL`; wins over the parts above
    #[serde(default)]
    pub url: Option<SecretString>,
}

impl RedisSettings {
    pub fn get_redis_url(&self) -> SecretString {
        match &self.url {
            Some(url) => url.clone(),
            None => SecretString::new(
                format!(
                    "redis://:{}@{}:{}",
                    self.password.expose_secret(),
                    self.host,
                    self.port
                )
                .into_boxed_str(),
            ),
        }
    }
}
