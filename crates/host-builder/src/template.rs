//! Host template loading.
//!
//! The template is a YAML document with a `hosts` mapping; each key is a host
//! name and its value holds the fields for that host:
//!
//! ```yaml
//! hosts:
//!   web1:
//!     hostgroup: base/web
//!     subnet: dmz
//!     host_parameters:
//!       - name: env
//!         value: prod
//! ```

use std::path::{Path, PathBuf};

use serde_yaml::Value;
use thiserror::Error;
use tracing::debug;

use crate::job::{HostPayload, Job, JobError};

/// Errors raised while loading the host template.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// The file could not be read.
    #[error("Failed reading YAML file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML.
    #[error("Failed parsing YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The YAML is valid but not a host template.
    #[error("Invalid host template: {0}")]
    Invalid(String),

    /// A host entry could not be turned into a job.
    #[error(transparent)]
    Job(#[from] JobError),
}

impl TemplateError {
    /// Process exit code for this startup failure.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Read { .. } => 1,
            Self::Parse(_) | Self::Invalid(_) | Self::Job(_) => 2,
        }
    }
}

/// Read the host template at `path` and build one job per host.
///
/// # Errors
/// Returns an error if the file cannot be read or is not a valid template.
pub fn load_jobs(path: &Path) -> Result<Vec<Job>, TemplateError> {
    debug!(path = %path.display(), "Trying to parse YAML file");

    let content = std::fs::read_to_string(path).map_err(|source| TemplateError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    parse_jobs(&content)
}

/// Build jobs from template text, in document order.
///
/// # Errors
/// Returns an error if the text is not YAML, has no `hosts` mapping, or a
/// host entry is not a mapping or has an empty name. Malformed field values
/// are left for the job itself to report when it is processed.
pub fn parse_jobs(content: &str) -> Result<Vec<Job>, TemplateError> {
    let document: Value = serde_yaml::from_str(content)?;

    let hosts = match document.get("hosts") {
        Some(Value::Mapping(hosts)) => hosts,
        Some(Value::Null) => return Ok(Vec::new()),
        Some(_) => return Err(TemplateError::Invalid("hosts must be a mapping".into())),
        None => return Err(TemplateError::Invalid("missing hosts mapping".into())),
    };

    hosts
        .iter()
        .map(|(key, body)| {
            let name = host_name(key)?;
            let not_a_mapping =
                || TemplateError::Invalid(format!("host {name}: fields must be a mapping"));
            let fields = match body {
                Value::Null => HostPayload::new(),
                Value::Mapping(_) => match serde_json::to_value(body) {
                    Ok(serde_json::Value::Object(fields)) => fields,
                    Ok(_) => return Err(not_a_mapping()),
                    Err(e) => {
                        return Err(TemplateError::Invalid(format!("host {name}: {e}")));
                    }
                },
                _ => return Err(not_a_mapping()),
            };
            Ok(Job::from_fields(name, fields)?)
        })
        .collect()
}

/// Host names are mapping keys; YAML may type them as numbers.
fn host_name(key: &Value) -> Result<String, TemplateError> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(TemplateError::Invalid(format!(
            "host name must be a string, got {other:?}"
        ))),
    }
}
