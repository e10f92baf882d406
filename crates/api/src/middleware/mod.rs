//! HTTP middleware for the API.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (`http_request` span with status and latency)
//! 3. Request ID (`x-request-id`, recorded on the span)
//! 4. CORS
//! 5. Per-route gates (`require_auth`, then a role gate)

pub mod auth;
pub mod request_id;

pub use auth::{
    Access, CurrentIdentity, GateRejection, check_access, require_auth, require_client,
    require_one_of, require_role,
};
pub use request_id::{REQUEST_ID_HEADER, request_id};
