//! HTTP query endpoints for the one-block merger.
//!
//! Exposes the merger's [`QueryService`](obm_merger::QueryService) so that
//! consumers can fetch blocks that are accepted but not yet merged.
//!
//! | Method | Path            | Body                   |
//! |--------|-----------------|------------------------|
//! | GET    | `/v1/health`    |                        |
//! | GET    | `/v1/status`    |                        |
//! | POST   | `/v1/premerged` | `PreMergedRequest` JSON |

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::HealthResponse;
pub use server::ObmServer;
