//! # Domain Enums
//!
//! Closed enumerations shared by the dispatch core:
//!
//! - [`Channel`] - Transport used to deliver an RFQ to a counterparty
//! - [`Role`] - Back-office role of a user reading or writing the timeline
//! - [`Visibility`] - Read-access gate on a timeline event
//!
//! All enums implement `Display` and `FromStr` using the lowercase storage
//! representation, and serialize the same way.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Delivery channel for an RFQ send attempt.
///
/// # Examples
///
/// ```
/// use rfq_dispatch::domain::value_objects::enums::Channel;
///
/// let channel: Channel = "WhatsApp".parse().unwrap();
/// assert_eq!(channel, Channel::WhatsApp);
/// assert_eq!(channel.to_string(), "whatsapp");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Plain e-mail to the counterparty desk.
    Email,
    /// Counterparty HTTP API.
    Api,
    /// WhatsApp Business message.
    WhatsApp,
    /// Broker platform (LME brokers).
    Broker,
}

impl Channel {
    /// All supported channels.
    pub const ALL: [Self; 4] = [Self::Email, Self::Api, Self::WhatsApp, Self::Broker];

    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Api => "api",
            Self::WhatsApp => "whatsapp",
            Self::Broker => "broker",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "api" => Ok(Self::Api),
            "whatsapp" => Ok(Self::WhatsApp),
            "broker" => Ok(Self::Broker),
            _ => Err(ParseEnumError::InvalidValue("Channel", s.to_string())),
        }
    }
}

/// Back-office role.
///
/// The set is closed: access decisions are pure functions over
/// `Role × Visibility` (see [`crate::domain::services::access`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Administrator.
    Admin,
    /// Purchasing.
    Compras,
    /// Sales.
    Vendas,
    /// Finance / treasury.
    Financeiro,
    /// Inventory.
    Estoque,
    /// Read-only auditor.
    Auditoria,
}

impl Role {
    /// All roles, for exhaustive matrix checks.
    pub const ALL: [Self; 6] = [
        Self::Admin,
        Self::Compras,
        Self::Vendas,
        Self::Financeiro,
        Self::Estoque,
        Self::Auditoria,
    ];

    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Compras => "compras",
            Self::Vendas => "vendas",
            Self::Financeiro => "financeiro",
            Self::Estoque => "estoque",
            Self::Auditoria => "auditoria",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseEnumError::InvalidValue("Role", s.to_string()))
    }
}

/// Read-access gate on a timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible to every authenticated role.
    #[default]
    All,
    /// Visible to finance, admin and audit only.
    Finance,
}

impl Visibility {
    /// Both visibilities.
    pub const ALL: [Self; 2] = [Self::All, Self::Finance];

    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Finance => "finance",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "finance" => Ok(Self::Finance),
            _ => Err(ParseEnumError::InvalidValue("Visibility", s.to_string())),
        }
    }
}

/// Error type for parsing enum values from strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEnumError {
    /// The provided string value is not valid for the enum.
    InvalidValue(&'static str, String),
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue(enum_name, value) => {
                write!(f, "invalid {} value: '{}'", enum_name, value)
            }
        }
    }
}

impl std::error::Error for ParseEnumError {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod channel {
        use super::*;

        #[test]
        fn parse_is_case_insensitive() {
            assert_eq!("EMAIL".parse::<Channel>().unwrap(), Channel::Email);
            assert_eq!(" broker ".parse::<Channel>().unwrap(), Channel::Broker);
        }

        #[test]
        fn display_matches_parse() {
            for channel in Channel::ALL {
                assert_eq!(channel.to_string().parse::<Channel>().unwrap(), channel);
            }
        }

        #[test]
        fn unknown_channel_fails() {
            let err = "telex".parse::<Channel>().unwrap_err();
            assert!(err.to_string().contains("Channel"));
        }
    }

    mod role {
        use super::*;

        #[test]
        fn parse_all_roles() {
            for role in Role::ALL {
                assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
            }
            assert_eq!("FINANCEIRO".parse::<Role>().unwrap(), Role::Financeiro);
        }

        #[test]
        fn unknown_role_fails() {
            assert!("guest".parse::<Role>().is_err());
        }

        #[test]
        fn serializes_lowercase() {
            assert_eq!(
                serde_json::to_string(&Role::Auditoria).unwrap(),
                "\"auditoria\""
            );
        }
    }

    mod visibility {
        use super::*;

        #[test]
        fn default_is_all() {
            assert_eq!(Visibility::default(), Visibility::All);
        }

        #[test]
        fn parse_and_display() {
            assert_eq!("finance".parse::<Visibility>().unwrap(), Visibility::Finance);
            assert_eq!(Visibility::All.to_string(), "all");
            assert!("private".parse::<Visibility>().is_err());
        }
    }
}
