//! Status enums for quotes and shipments.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Error returned when a status string is not one of the allowed values.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid status: {0:?}")]
pub struct InvalidStatus(pub String);

/// Shipment status.
///
/// Transitions are unconstrained: staff may set any value in any order. The
/// wire form is the human label, spaces included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ShipmentStatus {
    #[default]
    Submitted,
    #[serde(rename = "Driver Assigned")]
    DriverAssigned,
    #[serde(rename = "In Transit")]
    InTransit,
    Delivered,
    Cancelled,
}

impl ShipmentStatus {
    /// Every allowed status, in display order.
    pub const ALL: [Self; 5] = [
        Self::Submitted,
        Self::DriverAssigned,
        Self::InTransit,
        Self::Delivered,
        Self::Cancelled,
    ];

    /// The wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "Submitted",
            Self::DriverAssigned => "Driver Assigned",
            Self::InTransit => "In Transit",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Every allowed wire label.
    #[must_use]
    pub fn labels() -> Vec<&'static str> {
        Self::ALL.into_iter().map(Self::as_str).collect()
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ShipmentStatus {
    type Err = InvalidStatus;

    /// Exact, case-sensitive match against the five labels.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| InvalidStatus(s.to_string()))
    }
}

/// Quote lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuoteStatus {
    /// Submitted by a customer, not yet acted on.
    #[default]
    New,
    /// Turned into a shipment.
    Converted,
    /// Closed by staff without conversion.
    Closed,
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Converted => write!(f, "converted"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
