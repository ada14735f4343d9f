// Service configuration, read from the environment
//
// Every setting has a default, so an empty environment yields a working
// server. `from_lookup` takes any key lookup, which keeps parsing testable
// without touching the process environment.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use thiserror::Error;

use crate::downloader::extractors::{InnertubeConfig, InvidiousConfig, YtDlpConfig};
use crate::downloader::models::Handoff;
use crate::downloader::transcoder::{TargetFormat, TranscodeOptions};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("unknown provider {0:?}, expected one of innertube, yt-dlp, yt-dlp-python, invidious")]
    UnknownProvider(String),

    #[error("{0} must name at least one provider")]
    NoProviders(&'static str),
}

/// Providers that can be placed in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderName {
    Innertube,
    YtDlp,
    YtDlpPython,
    Invidious,
}

impl FromStr for ProviderName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "innertube" => Ok(Self::Innertube),
            "yt-dlp" | "ytdlp" => Ok(Self::YtDlp),
            "yt-dlp-python" | "ytdlp-python" => Ok(Self::YtDlpPython),
            "invidious" => Ok(Self::Invidious),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Innertube => "innertube",
            Self::YtDlp => "yt-dlp",
            Self::YtDlpPython => "yt-dlp-python",
            Self::Invidious => "invidious",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Used when `RUST_LOG` is not set
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            default_filter: "info,mp3rapide=debug,tower_http=info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscoderConfig {
    pub ffmpeg_path: String,
    pub bitrate_kbps: u32,
}

impl TranscoderConfig {
    pub fn options(&self) -> TranscodeOptions {
        TranscodeOptions {
            format: TargetFormat::MP3,
            bitrate_kbps: self.bitrate_kbps,
        }
    }
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            bitrate_kbps: 320,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// Chain order; each chain keeps the providers that offer its operation
    pub providers: Vec<ProviderName>,
    pub innertube: InnertubeConfig,
    pub ytdlp: YtDlpConfig,
    pub invidious: InvidiousConfig,
    pub transcoder: TranscoderConfig,
    pub metadata_timeout_secs: u64,
    pub audio_timeout_secs: u64,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            providers: vec![
                ProviderName::Innertube,
                ProviderName::YtDlp,
                ProviderName::YtDlpPython,
                ProviderName::Invidious,
            ],
            innertube: InnertubeConfig::default(),
            ytdlp: YtDlpConfig::default(),
            invidious: InvidiousConfig::default(),
            transcoder: TranscoderConfig::default(),
            metadata_timeout_secs: 30,
            audio_timeout_secs: 120,
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);
        let mut config = Self::default();

        if let Some(host) = env.parsed::<IpAddr>("HOST")? {
            config.server.host = host;
        }
        if let Some(port) = env.parsed::<u16>("PORT")? {
            config.server.port = port;
        }

        if let Some(list) = env.get("MP3RAPIDE_PROVIDERS") {
            config.providers = list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(ProviderName::from_str)
                .collect::<Result<Vec<_>, _>>()?;
            if config.providers.is_empty() {
                return Err(ConfigError::NoProviders("MP3RAPIDE_PROVIDERS"));
            }
        }

        if let Some(secs) = env.parsed::<u64>("METADATA_TIMEOUT")? {
            config.metadata_timeout_secs = secs;
        }
        if let Some(secs) = env.parsed::<u64>("AUDIO_TIMEOUT")? {
            config.audio_timeout_secs = secs;
        }

        let ytdlp = &mut config.ytdlp;
        if let Some(path) = env.get("YTDLP_PATH") {
            ytdlp.binary = path;
        }
        if let Some(python) = env.get("YTDLP_PYTHON") {
            ytdlp.python = python;
        }
        if let Some(client) = env.get("YTDLP_PLAYER_CLIENT") {
            ytdlp.player_client = client;
        }
        if let Some(agent) = env.get("YTDLP_USER_AGENT") {
            ytdlp.user_agent = agent;
        }
        if let Some(flag) = env.flag("YTDLP_NO_CHECK_CERTIFICATES")? {
            ytdlp.no_check_certificates = flag;
        }
        ytdlp.proxy = env.get("YTDLP_PROXY");
        ytdlp.cookies = env.get("YTDLP_COOKIES");
        if let Some(secs) = env.parsed::<u64>("YTDLP_SOCKET_TIMEOUT")? {
            ytdlp.socket_timeout_secs = secs;
        }
        if let Some(mode) = env.get("AUDIO_HANDOFF") {
            ytdlp.handoff = match mode.to_ascii_lowercase().as_str() {
                "stream" | "streaming" => Handoff::Streaming,
                "spool" | "spooled" => Handoff::Spooled,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "AUDIO_HANDOFF",
                        value: mode,
                    })
                }
            };
        }
        ytdlp.metadata_timeout_secs = config.metadata_timeout_secs;
        ytdlp.audio_timeout_secs = config.audio_timeout_secs;

        // One proxy setting covers the HTTP providers too
        config.innertube.proxy = config.ytdlp.proxy.clone();
        config.invidious.proxy = config.ytdlp.proxy.clone();

        if let Some(list) = env.get("INVIDIOUS_INSTANCES") {
            config.invidious.instances = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(secs) = env.parsed::<u64>("INVIDIOUS_TIMEOUT")? {
            config.invidious.timeout_secs = secs;
        }

        if let Some(path) = env.get("FFMPEG_PATH") {
            config.transcoder.ffmpeg_path = path;
        }
        if let Some(kbps) = env.parsed::<u32>("MP3_BITRATE")? {
            if kbps == 0 {
                return Err(ConfigError::Invalid {
                    key: "MP3_BITRATE",
                    value: kbps.to_string(),
                });
            }
            config.transcoder.bitrate_kbps = kbps;
        }

        if let Some(format) = env.get("LOG_FORMAT") {
            config.logging.format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" | "pretty" | "plain" => LogFormat::Text,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "LOG_FORMAT",
                        value: format,
                    })
                }
            };
        }

        Ok(config)
    }
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-blank value of `key`
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T: FromStr>(&self, key: &'static str) -> Result<Option<T>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::Invalid { key, value }),
        }
    }

    fn flag(&self, key: &'static str) -> Result<Option<bool>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(Some(true)),
                "0" | "false" | "no" | "off" => Ok(Some(false)),
                _ => Err(ConfigError::Invalid { key, value }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.server.addr().to_string(), "0.0.0.0:3000");
        assert_eq!(config.transcoder.bitrate_kbps, 320);
        assert_eq!(config.ytdlp.handoff, Handoff::Streaming);
        assert!(config.ytdlp.no_check_certificates);
        assert_eq!(config.providers.len(), 4);
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("PORT", "8080"),
            ("MP3RAPIDE_PROVIDERS", "yt-dlp, invidious"),
            ("AUDIO_HANDOFF", "spool"),
            ("YTDLP_PROXY", "socks5h://127.0.0.1:1080"),
            ("YTDLP_NO_CHECK_CERTIFICATES", "false"),
            ("AUDIO_TIMEOUT", "60"),
            ("INVIDIOUS_INSTANCES", "https://a.example, https://b.example"),
            ("MP3_BITRATE", "192"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.providers, vec![ProviderName::YtDlp, ProviderName::Invidious]);
        assert_eq!(config.ytdlp.handoff, Handoff::Spooled);
        assert!(!config.ytdlp.no_check_certificates);
        assert_eq!(config.ytdlp.audio_timeout_secs, 60);
        assert_eq!(config.innertube.proxy.as_deref(), Some("socks5h://127.0.0.1:1080"));
        assert_eq!(config.invidious.instances, vec!["https://a.example", "https://b.example"]);
        assert_eq!(config.transcoder.options().bitrate_kbps, 192);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_values() {
        assert_eq!(
            from_pairs(&[("PORT", "eighty")]).unwrap_err(),
            ConfigError::Invalid {
                key: "PORT",
                value: "eighty".to_string()
            }
        );
        assert!(matches!(
            from_pairs(&[("AUDIO_HANDOFF", "carrier-pigeon")]),
            Err(ConfigError::Invalid { key: "AUDIO_HANDOFF", .. })
        ));
        assert!(matches!(
            from_pairs(&[("MP3RAPIDE_PROVIDERS", "innertube,rustube")]),
            Err(ConfigError::UnknownProvider(name)) if name == "rustube"
        ));
        assert_eq!(
            from_pairs(&[("MP3RAPIDE_PROVIDERS", " , ")]).unwrap_err(),
            ConfigError::NoProviders("MP3RAPIDE_PROVIDERS")
        );
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = from_pairs(&[("PORT", "  "), ("YTDLP_PATH", "")]).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.ytdlp.binary, "yt-dlp");
    }
}
