//! Privilege escalation for the macOS install tools.
//!
//! `hdiutil attach` and `installer -target /` need root. The profile's
//! `privilege` field decides how that is obtained; [`Privilege::resolve`]
//! collapses it into the concrete wrapper (or none) for the current process.

use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// Privilege escalation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivilegeMethod {
    /// Use `sudo` for privilege escalation.
    Sudo,
    /// Use `doas` for privilege escalation.
    Doas,
}

impl PrivilegeMethod {
    /// Returns the command name for this privilege method.
    pub fn command_name(&self) -> &'static str {
        match self {
            Self::Sudo => "sudo",
            Self::Doas => "doas",
        }
    }
}

impl std::fmt::Display for PrivilegeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.command_name())
    }
}

/// Privilege escalation setting from the profile.
///
/// This type supports the following YAML representations:
/// - Absent or `privilege: true` → `Auto` (sudo unless already privileged)
/// - `privilege: false` → `Disabled` (run the tools directly)
/// - `privilege: { method: doas }` → `Method(Doas)` (explicit method)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Privilege {
    /// Escalate with `sudo` when the process is not already privileged.
    #[default]
    Auto,
    /// Never escalate.
    Disabled,
    /// Escalate with the given method when not already privileged.
    Method(PrivilegeMethod),
}

impl Privilege {
    /// Resolves the setting into the wrapper to use for privileged commands.
    ///
    /// Returns `None` when the tools should be invoked directly: escalation
    /// is disabled, the platform is Windows (where the agent user already
    /// holds the rights the installers need), or `already_privileged` is set.
    pub fn resolve(&self, platform: Platform, already_privileged: bool) -> Option<PrivilegeMethod> {
        if platform == Platform::Windows || already_privileged {
            return None;
        }
        match self {
            Self::Auto => Some(PrivilegeMethod::Sudo),
            Self::Disabled => None,
            Self::Method(method) => Some(*method),
        }
    }
}

/// Returns true when the effective user is root.
#[cfg(unix)]
pub fn running_as_root() -> bool {
    rustix::process::geteuid().is_root()
}

/// Returns true when the effective user is root.
#[cfg(not(unix))]
pub fn running_as_root() -> bool {
    false
}

impl<'de> Deserialize<'de> for Privilege {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de;

        struct PrivilegeVisitor;

        impl<'de> de::Visitor<'de> for PrivilegeVisitor {
            type Value = Privilege;

            fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                formatter.write_str("a boolean or a map with a 'method' field")
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Privilege::Auto)
            }

            fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if v {
                    Ok(Privilege::Auto)
                } else {
                    Ok(Privilege::Disabled)
                }
            }

            fn visit_map<A>(self, map: A) -> Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                #[derive(Deserialize)]
                #[serde(deny_unknown_fields)]
                struct PrivilegeMap {
                    method: PrivilegeMethod,
                }
                let pm = PrivilegeMap::deserialize(de::value::MapAccessDeserializer::new(map))?;
                Ok(Privilege::Method(pm.method))
            }
        }

        deserializer.deserialize_any(PrivilegeVisitor)
    }
}

impl Serialize for Privilege {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Auto => serializer.serialize_bool(true),
            Self::Disabled => serializer.serialize_bool(false),
            Self::Method(method) => {
                use serde::ser::SerializeMap;
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("method", method)?;
                map.end()
            }
        }
    }
}
