use thiserror::Error as ThisError;

/// Normalized provider failure
/// Implements Clone so one failure can be logged, counted
/// and still handed back to the caller
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum Error
{   /// Credentials or identifiers are absent, no request was sent
    #[error("{provider}: configuration missing: {cause}")]
    ConfigurationMissing
    {   provider: String
      , cause: String
    }
  , /// Connection, body read or timeout failure
    #[error("{provider}: transport error: {cause}")]
    TransportError
    {   provider: String
      , cause: String
    }
  , /// Remote API answered with a non-2xx status
    #[error("{provider} API error {status}: {body}")]
    NonSuccessStatus
    {   provider: String
      , status: u16
      , body: String
    }
  , /// 2xx answer missing an expected field
    #[error("{provider}: malformed response: {cause}")]
    MalformedResponse
    {   provider: String
      , cause: String
    }
  , /// Operation is not implemented by this provider
    #[error("{provider}: {operation} is not supported")]
    NotSupported
    {   provider: String
      , operation: String
    }
}

/// Failure kind, used as the `error_type` telemetry label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind
{   ConfigurationMissing
  , TransportError
  , NonSuccessStatus
  , MalformedResponse
  , NotSupported
}

impl FailureKind
{   pub fn as_str(&self) -> &'static str
    {   match self
        {   FailureKind::ConfigurationMissing => "configuration_missing"
          , FailureKind::TransportError => "transport_error"
          , FailureKind::NonSuccessStatus => "non_success_status"
          , FailureKind::MalformedResponse => "malformed_response"
          , FailureKind::NotSupported => "not_supported"
        }
    }
}

impl std::fmt::Display for FailureKind
{   fn fmt(&self, f: &mut std::fmt::Formatter<'_>)
      -> std::fmt::Result
    {   f.write_str(self.as_str())
    }
}

impl Error
{   pub fn configuration(
      provider: impl Into<String>
    , cause: impl Into<String>
    ) -> Self
    {   Error::ConfigurationMissing
        {   provider: provider.into()
          , cause: cause.into()
        }
    }

    pub fn transport(
      provider: impl Into<String>
    , cause: impl Into<String>
    ) -> Self
    {   Error::TransportError
        {   provider: provider.into()
          , cause: cause.into()
        }
    }

    pub fn status(
      provider: impl Into<String>
    , status: u16
    , body: impl Into<String>
    ) -> Self
    {   Error::NonSuccessStatus
        {   provider: provider.into()
          , status
          , body: body.into()
        }
    }

    pub fn malformed(
      provider: impl Into<String>
    , cause: impl Into<String>
    ) -> Self
    {   Error::MalformedResponse
        {   provider: provider.into()
          , cause: cause.into()
        }
    }

    pub fn not_supported(
      provider: impl Into<String>
    , operation: impl Into<String>
    ) -> Self
    {   Error::NotSupported
        {   provider: provider.into()
          , operation: operation.into()
        }
    }

    pub fn kind(&self) -> FailureKind
    {   match self
        {   Error::ConfigurationMissing { .. } => {
              FailureKind::ConfigurationMissing
            }
          , Error::TransportError { .. } => FailureKind::TransportError
          , Error::NonSuccessStatus { .. } => {
              FailureKind::NonSuccessStatus
            }
          , Error::MalformedResponse { .. } => {
              FailureKind::MalformedResponse
            }
          , Error::NotSupported { .. } => FailureKind::NotSupported
        }
    }

    /// Name of the provider the failure originated from
    pub fn provider(&self) -> &str
    {   match self
        {   Error::ConfigurationMissing { provider, .. }
          | Error::TransportError { provider, .. }
          | Error::NonSuccessStatus { provider, .. }
          | Error::MalformedResponse { provider, .. }
          | Error::NotSupported { provider, .. } => provider
        }
    }

    /// Whether a fallback hop may be attempted after this failure
    pub fn is_retryable(&self) -> bool
    {   !matches!(self, Error::NotSupported { .. })
    }
}

/// Startup and reload time configuration problems
#[derive(Debug, ThisError)]
pub enum ConfigError
{   /// Secondary traffic ratio outside [0.0, 1.0]
    #[error("secondary ratio must be within [0.0, 1.0], got {0}")]
    InvalidRatio(f64)
  , /// Environment value could not be parsed
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue
    {   key: String
      , value: String
    }
  , /// Reading or writing the env file failed
    #[error("env file error: {0}")]
    Io(#[from] std::io::Error)
  , /// Env file could not be parsed
    #[error("env file parse error: {0}")]
    EnvFile(#[from] dotenvy::Error)
}
