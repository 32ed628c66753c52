//! Opaque identifiers used across the coordination core.
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns `true` when the identifier is empty or whitespace only.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Isolated customer of the bridge. Every key in the shared store is scoped by it.
    ///
    /// ```
    /// use bridge_core::TenantId;
    ///
    /// let tenant = TenantId::from("acme");
    /// assert_eq!(tenant.to_string(), "acme");
    /// ```
    TenantId
);

string_id!(
    /// Consumer-channel thread identifier, stable for the lifetime of a conversation.
    ThreadId
);

string_id!(
    /// Contact-center conversation identifier assigned by the remote platform.
    ConversationId
);
