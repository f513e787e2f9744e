// Resolver module - turns short-video links into playable media
//
// Providers are tried in priority order:
// - TikWM API: cheap, returns a direct CDN URL
// - yt-dlp: slow, downloads the clip to a temporary directory
//
// The first provider to succeed wins; when all fail only the last failure
// reaches the caller.

pub mod cache;
pub mod errors;
pub mod expander;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod traits;
pub mod utils;

pub use cache::{Clock, ManualClock, SystemClock, UrlCache};
pub use errors::{ProviderError, ResolveError};
pub use expander::UrlExpander;
pub use models::{MediaReference, MediaSummary, ProviderFailure};
pub use orchestrator::Resolver;
pub use providers::{TikwmProvider, UnavailableProvider, YtDlpProvider};
pub use traits::Provider;
pub use utils::extract_link;
