//! Typed id wrappers.
//!
//! Ids are serde-transparent strings. Generated ids take the form
//! `<prefix>-<uuid v4>` so a trace reader can tell an event id from a trace id
//! at a glance; caller-assigned ids (module ids, edge ids) are kept verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Prefix used by [`Self::generate`].
            pub const PREFIX: &'static str = $prefix;

            /// Wrap an existing id verbatim.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Generate a fresh `<prefix>-<uuid>` id.
            pub fn generate() -> Self {
                Self(format!("{}-{}", Self::PREFIX, uuid::Uuid::new_v4()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

typed_id!(
    /// Caller-assigned identifier of a registered module.
    ModuleId,
    "module"
);
typed_id!(
    /// Unique identifier of one event in the log.
    EventId,
    "evt"
);
typed_id!(
    /// Correlates every event produced by one external operation.
    TraceId,
    "trace"
);
typed_id!(
    /// Identifier of a wiring edge. Reusing an id replaces the edge.
    EdgeId,
    "edge"
);
typed_id!(
    /// Identifier of a mounted view.
    ViewId,
    "view"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_carry_prefix_and_are_unique() {
        let a = EventId::generate();
        let b = EventId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("evt-"));
        assert!(TraceId::generate().as_str().starts_with("trace-"));
        assert!(EdgeId::generate().as_str().starts_with("edge-"));
    }

    #[test]
    fn typed_id_is_transparent_on_the_wire() {
        let id = ModuleId::from_string("pdf");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"pdf\"");
        let back: ModuleId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, "pdf");
    }

    #[test]
    fn blank_ids_report_empty() {
        assert!(ModuleId::from_string("  ").is_empty());
        assert!(!ModuleId::from_string("say").is_empty());
    }
}
