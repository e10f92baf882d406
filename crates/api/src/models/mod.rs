//! Records exchanged with the managed backend and the HTTP surface.
//!
//! Stored records use the backend's snake_case column names. Request
//! payloads from the browser arrive in camelCase and are mapped here.

pub mod identity;
pub mod quote;
pub mod shipment;

pub use identity::{AuthContext, User};
pub use quote::{NewQuote, Quote, QuoteCreated, QuoteIntake, TransportType};
pub use shipment::{ConvertQuoteRequest, Shipment, StatusUpdateRequest};
