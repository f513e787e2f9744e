pub mod config;
pub mod logging;
pub mod resolver;

pub use config::Settings;
pub use resolver::{MediaReference, ProviderError, ResolveError, Resolver, UrlExpander};
