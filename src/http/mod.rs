//! HTTP front end.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID, per-route metrics)
//!     → intents.rs / legacy.rs / admin (handlers)
//!     → error.rs (failures become JSON bodies)
//!     → Send to client
//! ```

pub mod error;
pub mod intents;
pub mod legacy;
pub mod request;
pub mod server;

pub use error::{ApiError, ErrorBody};
pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
