//! Plugin error codes.

use std::collections::BTreeMap;
use std::fmt;

/// Result alias for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Error category reported back to the function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    Internal,
    Unimplemented,
    Unavailable,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::Internal => "INTERNAL",
            Self::Unimplemented => "UNIMPLEMENTED",
            Self::Unavailable => "UNAVAILABLE",
        };
        f.write_str(name)
    }
}

/// The plugin call that failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    /// Qualified operation name, e.g. `DevStorage.Read`.
    pub service: String,
    /// Arguments the operation was called with.
    pub args: BTreeMap<String, String>,
}

impl Scope {
    /// Build an error within this scope.
    pub fn error(&self, code: Code, message: impl Into<String>) -> PluginError {
        PluginError {
            code,
            scope: self.clone(),
            message: message.into(),
            cause: None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.service)?;
        for (i, (k, v)) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        f.write_str(")")
    }
}

/// Error returned by plugin collaborators.
#[derive(Debug, thiserror::Error)]
#[error("{scope}: {code}: {message}")]
pub struct PluginError {
    pub code: Code,
    pub scope: Scope,
    pub message: String,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl PluginError {
    /// Start a scope for errors raised by one operation.
    pub fn scoped<K, V>(service: impl Into<String>, args: impl IntoIterator<Item = (K, V)>) -> Scope
    where
        K: Into<String>,
        V: ToString,
    {
        Scope {
            service: service.into(),
            args: args
                .into_iter()
                .map(|(k, v)| (k.into(), v.to_string()))
                .collect(),
        }
    }

    /// Error for an operation a provider does not support.
    pub fn unimplemented(service: &str) -> Self {
        Self::scoped(service, std::iter::empty::<(String, String)>())
            .error(Code::Unimplemented, "operation not supported by this provider")
    }

    /// Attach the underlying cause.
    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_error_message() {
        let scope = PluginError::scoped("DevStorage.Read", [("bucket", "b"), ("key", "k")]);
        let err = scope.error(Code::NotFound, "object not found");

        assert_eq!(err.code, Code::NotFound);
        assert_eq!(
            err.to_string(),
            "DevStorage.Read(bucket=b, key=k): NOT_FOUND: object not found"
        );
    }

    #[test]
    fn test_cause_is_exposed_as_source() {
        use std::error::Error;

        let err = PluginError::scoped("Events.Publish", [("topic", "t")])
            .error(Code::Internal, "publish failed")
            .with_cause(std::io::Error::new(std::io::ErrorKind::Other, "boom"));

        assert_eq!(err.source().map(|s| s.to_string()), Some("boom".to_string()));
    }

    #[test]
    fn test_unimplemented() {
        let err = PluginError::unimplemented("Queue.Receive");
        assert_eq!(err.code, Code::Unimplemented);
        assert!(err.scope.args.is_empty());
    }
}
