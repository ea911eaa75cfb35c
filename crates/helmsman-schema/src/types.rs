//! Newtype wrappers for string identifiers used across the workspace.
//!
//! All newtypes serialize/deserialize as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Name of a control-plane model (e.g. `openstack`, `controller`).
    ModelName
);

string_newtype!(
    /// Name of an application unit, `<application>/<ordinal>` (e.g. `mysql/2`).
    UnitName
);

impl UnitName {
    /// The application part of the unit name.
    pub fn application(&self) -> &str {
        self.0.split('/').next().unwrap_or("")
    }

    /// The numeric ordinal of the unit, if the name is well-formed.
    pub fn ordinal(&self) -> Option<u32> {
        self.0.rsplit('/').next()?.parse().ok()
    }
}
