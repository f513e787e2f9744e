// Provider implementations

pub mod tikwm;
pub mod unavailable;
pub mod ytdlp;

pub use tikwm::TikwmProvider;
pub use unavailable::UnavailableProvider;
pub use ytdlp::YtDlpProvider;
