// Extraction providers
//
// Three strategies behind one trait:
// - InnerTube: in-process player endpoint client (fast, no subprocess)
// - yt-dlp: external tool, as a binary or as a Python module
// - Invidious: read-only public API, metadata only, last resort

pub mod innertube;
pub mod invidious;
pub mod ytdlp;

pub use innertube::{InnertubeConfig, InnertubeProvider};
pub use invidious::{InvidiousConfig, InvidiousProvider};
pub use ytdlp::{YtDlpConfig, YtDlpProvider};
