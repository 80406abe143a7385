//! Core plumbing for the platform API client: configuration, transports and sessions.

pub mod cassette;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod session;
pub mod transport;

pub use cassette::{Cassette, CassetteTransport, Interaction, RecordingTransport};
pub use config::ClientConfig;
pub use error::ApiError;
pub use http::HttpTransport;
pub use session::ApiSession;
pub use transport::{ApiRequest, ApiResponse, HttpMethod, Transport};
