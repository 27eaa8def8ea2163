pub mod api;
pub mod auth;
pub mod fetcher;
pub mod rate_limiter;

#[cfg(test)]
mod tests;

pub use api::{ListingKind, ListingPage, RedditApiClient};
pub use auth::{RedditAuth, RedditToken};
pub use fetcher::{ActivitySource, RedditFetcher, UserActivity};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
