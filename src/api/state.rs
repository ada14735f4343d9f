// Shared application state
//
// Built once at startup and read-only afterwards: the two provider chains
// and the transcoder. Nothing per-request lives here.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, ProviderName};
use crate::downloader::errors::ProviderError;
use crate::downloader::extractors::{InnertubeProvider, InvidiousProvider, YtDlpProvider};
use crate::downloader::models::Operation;
use crate::downloader::orchestrator::ProviderChain;
use crate::downloader::traits::ExtractionProvider;
use crate::downloader::transcoder::{ProcessTranscoder, TranscodeOptions, Transcoder};

#[derive(Clone)]
pub struct AppState {
    pub metadata_chain: Arc<ProviderChain>,
    pub audio_chain: Arc<ProviderChain>,
    pub transcoder: Arc<dyn Transcoder>,
    pub options: TranscodeOptions,
}

impl AppState {
    pub fn new(
        metadata_chain: ProviderChain,
        audio_chain: ProviderChain,
        transcoder: Arc<dyn Transcoder>,
        options: TranscodeOptions,
    ) -> Self {
        Self {
            metadata_chain: Arc::new(metadata_chain),
            audio_chain: Arc::new(audio_chain),
            transcoder,
            options,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let providers = config
            .providers
            .iter()
            .map(|name| build_provider(*name, config))
            .collect::<Result<Vec<_>, _>>()?;

        let metadata_chain = chain_for(
            &providers,
            Operation::Metadata,
            Duration::from_secs(config.metadata_timeout_secs),
        );
        let audio_chain = chain_for(
            &providers,
            Operation::Audio,
            Duration::from_secs(config.audio_timeout_secs),
        );

        tracing::info!(
            metadata = ?metadata_chain.provider_names(),
            audio = ?audio_chain.provider_names(),
            "provider chains configured"
        );

        let transcoder = ProcessTranscoder::ffmpeg(config.transcoder.ffmpeg_path.clone());
        Ok(Self::new(
            metadata_chain,
            audio_chain,
            Arc::new(transcoder),
            config.transcoder.options(),
        ))
    }

    /// Every configured provider once, in chain order
    pub fn providers(&self) -> Vec<Arc<dyn ExtractionProvider>> {
        let mut seen: Vec<Arc<dyn ExtractionProvider>> = Vec::new();
        for provider in self
            .metadata_chain
            .providers()
            .iter()
            .chain(self.audio_chain.providers())
        {
            if !seen.iter().any(|p| p.name() == provider.name()) {
                seen.push(Arc::clone(provider));
            }
        }
        seen
    }
}

fn build_provider(name: ProviderName, config: &AppConfig) -> Result<Arc<dyn ExtractionProvider>, ProviderError> {
    let provider: Arc<dyn ExtractionProvider> = match name {
        ProviderName::Innertube => Arc::new(InnertubeProvider::new(config.innertube.clone())?),
        ProviderName::YtDlp => Arc::new(YtDlpProvider::binary(config.ytdlp.clone())),
        ProviderName::YtDlpPython => Arc::new(YtDlpProvider::python_module(config.ytdlp.clone())),
        ProviderName::Invidious => Arc::new(InvidiousProvider::new(config.invidious.clone())?),
    };
    Ok(provider)
}

fn chain_for(providers: &[Arc<dyn ExtractionProvider>], operation: Operation, timeout: Duration) -> ProviderChain {
    providers
        .iter()
        .filter(|p| p.supports(operation))
        .fold(ProviderChain::new(timeout), |chain, p| chain.with_provider(Arc::clone(p)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chains_follow_configured_order() {
        let state = AppState::from_config(&AppConfig::default()).unwrap();

        assert_eq!(
            state.metadata_chain.provider_names(),
            vec!["innertube", "yt-dlp", "yt-dlp-python", "invidious"]
        );
        // The fallback API never serves audio
        assert_eq!(
            state.audio_chain.provider_names(),
            vec!["innertube", "yt-dlp", "yt-dlp-python"]
        );
        assert_eq!(state.providers().len(), 4);
        assert_eq!(state.options.bitrate_kbps, 320);
    }

    #[test]
    fn test_custom_order() {
        let config = AppConfig {
            providers: vec![ProviderName::YtDlp, ProviderName::Innertube],
            ..AppConfig::default()
        };
        let state = AppState::from_config(&config).unwrap();
        assert_eq!(state.metadata_chain.provider_names(), vec!["yt-dlp", "innertube"]);
    }
}
