//! Business logic services for the API.
//!
//! # Services
//!
//! - `identity` - Bearer token to user and role resolution
//! - `email` - Message rendering and delivery via Resend
//! - `notifications` - Outbound notification queue and worker

pub mod email;
pub mod identity;
pub mod notifications;

pub use email::{
    DisabledMailer, MailError, MailOutcome, Mailer, OutboundEmail, RecordingMailer, ResendMailer,
    mailer_from_config,
};
pub use identity::{IdentityResolver, ResolvedIdentity, bearer_token};
pub use notifications::{
    DispatchReport, DispatchStats, Notification, NotificationQueue, NotificationWorker,
    NotifyError, QuoteSummary, StatusChange,
};
