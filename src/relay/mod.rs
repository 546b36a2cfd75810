pub mod auth;
pub mod proto;
pub mod searcher;

pub use auth::{AuthError, AuthSession, BearerInterceptor, RelayAuthClient, SharedSession};
pub use searcher::{BundleRelay, MempoolFilter, RelayError, SearcherRelay};
