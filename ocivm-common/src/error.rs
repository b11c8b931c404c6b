use serde::{Deserialize, Serialize};

/// Best-effort category for a provider rejection, derived by substring
/// matching on the provider's error text. Not guaranteed accurate.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RejectionHint {
    Quota,
    Shape,
    Auth,
    Unknown,
}

impl RejectionHint {
    pub fn classify(status: Option<u16>, message: &str) -> Self {
        if matches!(status, Some(401) | Some(403)) {
            return RejectionHint::Auth;
        }
        let lower = message.to_ascii_lowercase();
        if lower.contains("quota") || lower.contains("limit exceeded") {
            RejectionHint::Quota
        } else if lower.contains("shape") {
            RejectionHint::Shape
        } else if lower.contains("auth") || lower.contains("signature") {
            RejectionHint::Auth
        } else {
            RejectionHint::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionHint::Quota => "quota",
            RejectionHint::Shape => "shape",
            RejectionHint::Auth => "auth",
            RejectionHint::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for RejectionHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Credentials incomplete in both the environment and the config file.
    /// Unrecoverable without operator action.
    #[error("missing configuration: {}", missing.join(", "))]
    Configuration { missing: Vec<String> },

    #[error("{resource} not found: {ident}")]
    NotFound {
        resource: &'static str,
        ident: String,
    },

    #[error("cannot read ssh public key {path}: {reason}")]
    KeyNotFound { path: String, reason: String },

    /// API-level failure (quota, invalid shape, malformed metadata).
    /// The provider's message is surfaced verbatim with a category hint.
    #[error("{operation} rejected by provider (hint: {hint}): {message}")]
    Rejected {
        operation: &'static str,
        message: String,
        hint: RejectionHint,
    },

    /// Instance reached RUNNING but no network interface is attached yet.
    /// The instance is left running; this is a degraded result, not a
    /// rollback trigger.
    #[error("instance {instance_id} is RUNNING but has no network interface attached yet")]
    IpUnavailable { instance_id: String },

    /// Poll budget elapsed. The instance is left running server-side;
    /// the caller decides whether to terminate it.
    #[error("timed out after {waited_secs}s waiting for instance {instance_id} to reach RUNNING")]
    Timeout {
        instance_id: String,
        waited_secs: u64,
    },

    /// Transport-level failure (connection, TLS, signing). Fatal for the
    /// current call, never retried.
    #[error("{operation} request failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    /// The provider answered but the response did not decode into the
    /// expected shape.
    #[error("{operation} returned a malformed response: {detail}")]
    Malformed {
        operation: &'static str,
        detail: String,
    },
}

impl Error {
    pub fn not_found(resource: &'static str, ident: impl Into<String>) -> Self {
        Error::NotFound {
            resource,
            ident: ident.into(),
        }
    }

    pub fn rejected(operation: &'static str, status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        let hint = RejectionHint::classify(status, &message);
        Error::Rejected {
            operation,
            message,
            hint,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_classification() {
        assert_eq!(
            RejectionHint::classify(Some(400), "QuotaExceeded: compute quota reached"),
            RejectionHint::Quota
        );
        assert_eq!(
            RejectionHint::classify(Some(400), "Shape VM.Standard.A1.Flex not available"),
            RejectionHint::Shape
        );
        assert_eq!(
            RejectionHint::classify(Some(401), "NotAuthenticated"),
            RejectionHint::Auth
        );
        assert_eq!(
            RejectionHint::classify(None, "something else entirely"),
            RejectionHint::Unknown
        );
    }

    #[test]
    fn rejection_message_carries_hint() {
        let err = Error::rejected("launch_instance", Some(400), "QuotaExceeded for shape");
        assert!(err.to_string().contains("quota"));
        assert!(err.to_string().contains("QuotaExceeded for shape"));
    }
}
