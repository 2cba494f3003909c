//! Host-creation jobs and the payload they turn into.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// JSON object submitted to the management API when creating a host.
pub type HostPayload = serde_json::Map<String, Value>;

/// Job field renamed on its way into the payload.
const HOST_PARAMETERS_FIELD: &str = "host_parameters";

/// Name the management API expects for nested host parameters.
const HOST_PARAMETERS_ATTRIBUTES_FIELD: &str = "host_parameters_attributes";

/// Errors raised while building a job from template fields.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum JobError {
    /// Every job needs a name before it can be queued.
    #[error("host name must not be empty")]
    EmptyName,

    /// Reference fields must hold a plain identifier.
    #[error("host {host}: {field} must be a string or number")]
    InvalidReference { host: String, field: &'static str },
}

/// Job fields whose human-readable value is resolved to a remote id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// Host group, by title or id.
    Hostgroup,
    /// Subnet, by name or id.
    Subnet,
    /// Compute profile, by name or id.
    ComputeProfile,
}

impl ReferenceKind {
    /// Every reference kind, in payload order.
    pub const ALL: [Self; 3] = [Self::Hostgroup, Self::Subnet, Self::ComputeProfile];

    /// Field name used in the host template.
    #[must_use]
    pub const fn field(self) -> &'static str {
        match self {
            Self::Hostgroup => "hostgroup",
            Self::Subnet => "subnet",
            Self::ComputeProfile => "compute_profile",
        }
    }

    /// Payload key that carries the resolved id.
    #[must_use]
    pub const fn id_field(self) -> &'static str {
        match self {
            Self::Hostgroup => "hostgroup_id",
            Self::Subnet => "subnet_id",
            Self::ComputeProfile => "compute_profile_id",
        }
    }

    /// Look up the reference kind for a template field name.
    #[must_use]
    pub fn from_field(field: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.field() == field)
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

/// One host to create.
///
/// Reference fields are split out at construction so that payload building
/// only has to resolve them; everything else is carried verbatim. Reference
/// values are kept as written and only checked when the job is processed,
/// so a malformed host fails on its own instead of rejecting the template.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    name: String,
    references: Vec<(ReferenceKind, Value)>,
    fields: HostPayload,
}

impl Job {
    /// Create a job with only a name.
    ///
    /// # Errors
    /// Returns [`JobError::EmptyName`] if `name` is empty.
    pub fn new(name: impl Into<String>) -> Result<Self, JobError> {
        Self::from_fields(name, HostPayload::new())
    }

    /// Create a job from the fields listed under a host in the template.
    ///
    /// A `name` entry in `fields` is ignored; the job name always wins.
    ///
    /// # Errors
    /// Returns [`JobError::EmptyName`] if `name` is empty.
    pub fn from_fields(name: impl Into<String>, fields: HostPayload) -> Result<Self, JobError> {
        let name = name.into();
        if name.is_empty() {
            return Err(JobError::EmptyName);
        }

        let mut references = Vec::new();
        let mut passthrough = HostPayload::new();

        for (key, value) in fields {
            if key == "name" {
                continue;
            }
            match ReferenceKind::from_field(&key) {
                Some(kind) => references.push((kind, value)),
                None => {
                    passthrough.insert(key, value);
                }
            }
        }

        Ok(Self {
            name,
            references,
            fields: passthrough,
        })
    }

    /// Host name, also used for the existence check.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reference fields still waiting to be resolved, as identifiers.
    ///
    /// Strings are used as they are; numbers and booleans are stringified.
    ///
    /// # Errors
    /// Returns [`JobError::InvalidReference`] if a reference field holds a
    /// list, mapping or null.
    pub fn references(&self) -> Result<Vec<(ReferenceKind, String)>, JobError> {
        self.references
            .iter()
            .map(|(kind, value)| {
                let identifier = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => {
                        return Err(JobError::InvalidReference {
                            host: self.name.clone(),
                            field: kind.field(),
                        })
                    }
                };
                Ok((*kind, identifier))
            })
            .collect()
    }

    /// Payload without any resolved references.
    ///
    /// Contains `name` and every pass-through field, with `host_parameters`
    /// renamed to `host_parameters_attributes`.
    #[must_use]
    pub fn base_payload(&self) -> HostPayload {
        let mut payload = HostPayload::new();
        payload.insert("name".to_string(), Value::String(self.name.clone()));

        for (key, value) in &self.fields {
            let key = if key == HOST_PARAMETERS_FIELD {
                HOST_PARAMETERS_ATTRIBUTES_FIELD
            } else {
                key.as_str()
            };
            payload.insert(key.to_string(), value.clone());
        }

        payload
    }
}
