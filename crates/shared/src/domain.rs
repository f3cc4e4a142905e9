use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(VillageId);
id_newtype!(HelpRequestId);
id_newtype!(SuggestionId);

/// Declares a string-coded enum whose decoding is total: any code that is not
/// recognised (or a value that is not a string at all) maps to `$default`.
macro_rules! coded_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident,
        { $($variant:ident => $code:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn from_code(code: &str) -> Self {
                match code {
                    $($code => $name::$variant,)+
                    _ => $name::$default,
                }
            }

            pub fn as_code(&self) -> &'static str {
                match self {
                    $($name::$variant => $code),+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_code())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_code())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = serde_json::Value::deserialize(deserializer)?;
                Ok(raw.as_str().map($name::from_code).unwrap_or_default())
            }
        }
    };
}

coded_enum!(
    UserRole, default = Resident,
    {
        SuperAdmin => "SUPER_ADMIN",
        VillageAdmin => "VILLAGE_ADMIN",
        Resident => "RESIDENT",
    }
);

coded_enum!(
    HelpCategory, default = Other,
    {
        Emergency => "EMERGENCY",
        Infrastructure => "INFRASTRUCTURE",
        Social => "SOCIAL",
        Health => "HEALTH",
        Education => "EDUCATION",
        Other => "OTHER",
    }
);

coded_enum!(
    HelpStatus, default = Pending,
    {
        Pending => "PENDING",
        InProgress => "IN_PROGRESS",
        Resolved => "RESOLVED",
        Rejected => "REJECTED",
    }
);

impl UserRole {
    /// Super admins and village admins may curate villages and triage requests.
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::SuperAdmin | UserRole::VillageAdmin)
    }
}

impl HelpStatus {
    pub fn is_closed(&self) -> bool {
        matches!(self, HelpStatus::Resolved | HelpStatus::Rejected)
    }
}

/// Help request urgency, stored as its ordinal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HelpPriority {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl HelpPriority {
    pub fn from_ordinal(ordinal: i64) -> Self {
        match ordinal {
            1 => HelpPriority::Medium,
            2 => HelpPriority::High,
            3 => HelpPriority::Critical,
            _ => HelpPriority::Low,
        }
    }

    pub fn ordinal(&self) -> i64 {
        match self {
            HelpPriority::Low => 0,
            HelpPriority::Medium => 1,
            HelpPriority::High => 2,
            HelpPriority::Critical => 3,
        }
    }
}

impl Serialize for HelpPriority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.ordinal())
    }
}

impl<'de> Deserialize<'de> for HelpPriority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(raw
            .as_i64()
            .map(HelpPriority::from_ordinal)
            .unwrap_or_default())
    }
}
