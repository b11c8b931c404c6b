use std::collections::HashMap;
use std::path::PathBuf;

use ocivm_common::error::{Error, Result};

const DEFAULT_REGION: &str = "us-phoenix-1";

const ENV_USER: &str = "OCI_USER_OCID";
const ENV_KEY_FILE: &str = "OCI_KEY_FILE";
const ENV_FINGERPRINT: &str = "OCI_FINGERPRINT";
const ENV_TENANCY: &str = "OCI_TENANCY_OCID";
const ENV_REGION: &str = "OCI_REGION";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Environment,
    File,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Environment => "environment",
            CredentialSource::File => "file",
        }
    }
}

/// API credentials for the provider. The tenancy OCID doubles as the root
/// compartment id for every scoped call.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: String,
    pub key_file: String,
    pub fingerprint: String,
    pub tenancy: String,
    pub region: String,
    pub source: CredentialSource,
}

impl Credentials {
    /// Resolve credentials: environment variables first, then the
    /// `[DEFAULT]` profile of `~/.oci/config`. Fails naming the missing
    /// environment fields when neither source is complete.
    pub fn resolve() -> Result<Self> {
        match Self::from_env() {
            Ok(creds) => Ok(creds),
            Err(env_err) => match Self::from_file(default_config_path()) {
                Ok(creds) => Ok(creds),
                Err(_) => Err(env_err),
            },
        }
    }

    pub fn from_env() -> Result<Self> {
        let mut missing = Vec::new();
        let mut read = |name: &str| -> Option<String> {
            match std::env::var(name) {
                Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
                _ => {
                    missing.push(name.to_string());
                    None
                }
            }
        };

        let user = read(ENV_USER);
        let key_file = read(ENV_KEY_FILE);
        let fingerprint = read(ENV_FINGERPRINT);
        let tenancy = read(ENV_TENANCY);
        let region = std::env::var(ENV_REGION)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        if !missing.is_empty() {
            return Err(Error::Configuration { missing });
        }

        Ok(Credentials {
            user: user.unwrap_or_default(),
            key_file: expand_home(&key_file.unwrap_or_default()),
            fingerprint: fingerprint.unwrap_or_default(),
            tenancy: tenancy.unwrap_or_default(),
            region,
            source: CredentialSource::Environment,
        })
    }

    pub fn from_file(path: PathBuf) -> Result<Self> {
        let display_path = path.display().to_string();
        let contents = std::fs::read_to_string(&path).map_err(|_| Error::Configuration {
            missing: vec![format!("credential file {display_path}")],
        })?;
        Self::from_profile(&parse_profile(&contents, "DEFAULT"))
    }

    fn from_profile(profile: &HashMap<String, String>) -> Result<Self> {
        let mut missing = Vec::new();
        let mut read = |key: &str| -> String {
            match profile.get(key) {
                Some(v) if !v.is_empty() => v.clone(),
                _ => {
                    missing.push(key.to_string());
                    String::new()
                }
            }
        };

        let user = read("user");
        let key_file = read("key_file");
        let fingerprint = read("fingerprint");
        let tenancy = read("tenancy");
        let region = profile
            .get("region")
            .cloned()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        if !missing.is_empty() {
            return Err(Error::Configuration { missing });
        }

        Ok(Credentials {
            user,
            key_file: expand_home(&key_file),
            fingerprint,
            tenancy,
            region,
            source: CredentialSource::File,
        })
    }

    /// Root compartment: every list/launch call is scoped to the tenancy.
    pub fn compartment_id(&self) -> &str {
        &self.tenancy
    }
}

fn default_config_path() -> PathBuf {
    PathBuf::from(expand_home("~/.oci/config"))
}

/// Minimal INI-profile parse: `[section]` headers, `key = value` lines,
/// `#`/`;` comments.
fn parse_profile(contents: &str, profile: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    let mut in_profile = false;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_profile = section.trim() == profile;
            continue;
        }
        if !in_profile {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            values.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    values
}

/// Expand a leading `~/` with `$HOME`. Paths without the prefix pass
/// through untouched.
pub fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{home}/{rest}");
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# comment
[DEFAULT]
user = ocid1.user.oc1..abc
fingerprint = aa:bb:cc
key_file = ~/.oci/api_key.pem
tenancy = ocid1.tenancy.oc1..def
region = eu-frankfurt-1

[OTHER]
user = ocid1.user.oc1..other
";

    #[test]
    fn parses_default_profile_only() {
        let profile = parse_profile(SAMPLE, "DEFAULT");
        assert_eq!(profile.get("user").unwrap(), "ocid1.user.oc1..abc");
        assert_eq!(profile.get("region").unwrap(), "eu-frankfurt-1");
        assert!(!profile.contains_key("OTHER"));

        let other = parse_profile(SAMPLE, "OTHER");
        assert_eq!(other.get("user").unwrap(), "ocid1.user.oc1..other");
    }

    #[test]
    fn incomplete_profile_names_missing_fields() {
        let err = Credentials::from_profile(&parse_profile("[DEFAULT]\nuser = u\n", "DEFAULT"))
            .unwrap_err();
        match err {
            Error::Configuration { missing } => {
                assert!(missing.contains(&"key_file".to_string()));
                assert!(missing.contains(&"fingerprint".to_string()));
                assert!(missing.contains(&"tenancy".to_string()));
                assert!(!missing.contains(&"user".to_string()));
            }
            other => panic!("expected Configuration, got {other:?}"),
        }
    }

    #[test]
    fn region_defaults_when_absent() {
        let creds = Credentials::from_profile(&parse_profile(
            "[DEFAULT]\nuser=u\nfingerprint=f\nkey_file=/k.pem\ntenancy=t\n",
            "DEFAULT",
        ))
        .unwrap();
        assert_eq!(creds.region, DEFAULT_REGION);
        assert_eq!(creds.source, CredentialSource::File);
        assert_eq!(creds.compartment_id(), "t");
    }
}
