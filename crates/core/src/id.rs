// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier newtypes.
//!
//! Unlike a generated-ID system (random suffix behind a fixed-size inline
//! buffer), the identifiers here are either user-supplied (job names,
//! machine names can be arbitrarily long hostnames) or deterministically
//! derived from one (`job_instance_id`). A fixed-size inline buffer would
//! silently truncate a long hostname, so these wrap `String` instead.

use std::fmt;

/// Returns a string slice truncated to at most `n` characters.
pub fn short(s: &str, n: usize) -> &str {
    let end = s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len());
    &s[..end]
}

/// Define a `String`-backed identifier newtype with the common trait impls.
macro_rules! string_id {
    ($(#[$meta:meta])* pub struct $name:ident;) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// The unique name of a job definition (`JobDefinition::name`).
    pub struct JobName;
}

string_id! {
    /// A target machine, as resolved by the bus.
    pub struct MachineId;
}

string_id! {
    /// Identifies one dispatch of a job. Always of the form
    /// `{job_name}_{monotonic_seconds}`.
    pub struct JobInstanceId;
}

impl JobInstanceId {
    /// Build an instance id from a job name and a monotonically increasing
    /// counter (seconds since epoch at dispatch time is sufficient in
    /// practice, and is what makes these ids sortable by dispatch order).
    pub fn new(job_name: &str, counter: u64) -> Self {
        Self(format!("{job_name}_{counter}"))
    }

    /// Recover the job name this instance belongs to.
    ///
    /// Job names may themselves contain `_`, so this trusts the *last*
    /// `_`-separated segment to be the monotonic counter.
    pub fn job_name(&self) -> &str {
        self.0.rsplit_once('_').map(|(name, _)| name).unwrap_or(&self.0)
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
