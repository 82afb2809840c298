//! Opaque string identifiers.
//!
//! All identifiers cross process boundaries (store rows, payment-provider
//! metadata, webhook payloads) as plain strings, so they are modeled as
//! string newtypes rather than raw UUIDs. `OrderId::generate` mints a
//! UUIDv4 in its canonical text form.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from a string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// Unique identifier for an order, assigned at creation.
    OrderId
}

string_id! {
    /// Identifier for the customer who placed an order.
    CustomerId
}

string_id! {
    /// Product identifier (SKU).
    ProductId
}

string_id! {
    /// Identifier for a warehouse holding inventory.
    WarehouseId
}

impl OrderId {
    /// Mints a new random order identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}
