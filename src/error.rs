use oid4vci_frontend::IssueStatus;
pub use oid4vci_frontend::ErrorResponse;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the protocol core.
///
/// Collaborator failures (HTTP transport, stores, signers) arrive as [anyhow::Error] and are
/// wrapped with the protocol step that failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed credential offer: {0}")]
    MalformedOffer(String),

    #[error("credential offer could not be fetched from {uri} (status: {status}): {reason}")]
    OfferFetch {
        uri: String,
        status: u16,
        reason: String,
    },

    #[error("could not derive authorization_details: {0}")]
    Derivation(String),

    #[error("pushed authorization requests are required but the authorization server does not support them")]
    ParUnsupported,

    #[error("pushed authorization request failed: {0}")]
    Par(String),

    #[error("invalid session state transition from {from} to {to}")]
    InvalidStateTransition { from: IssueStatus, to: IssueStatus },

    /// The `c_nonce` bound to the proof is unknown, expired or already consumed.
    #[error("issuer state or c_nonce not found ({0})")]
    StateMissing(String),

    #[error("credential offer session not found ({0})")]
    SessionNotFound(String),

    #[error("invalid or unsupported proof signing algorithm: {0}")]
    Algorithm(String),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid credential request: {0}")]
    InvalidCredentialRequest(String),

    #[error("invalid proof")]
    InvalidProof(#[source] anyhow::Error),

    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    #[error("credential signing failed")]
    CredentialSigning(#[source] anyhow::Error),

    /// The credential endpoint answered with a structured error.
    #[error("credential endpoint responded with status {status}: {}", .response.error)]
    CredentialEndpoint { status: u16, response: ErrorResponse },

    #[error("http request failed while {context}")]
    Http {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("store operation failed while {context}")]
    Store {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    pub(crate) fn http(context: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Http { context, source }
    }

    pub(crate) fn store(context: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Store { context, source }
    }

    /// Stable OAuth/OID4VCI error code for this error.
    ///
    /// Errors reported by a remote credential endpoint keep the code the endpoint sent.
    pub fn code(&self) -> &str {
        match self {
            Error::CredentialEndpoint { response, .. } => &response.error,
            Error::MalformedOffer(_) | Error::OfferFetch { .. } => "invalid_credential_offer",
            Error::Derivation(_) => "invalid_authorization_details",
            Error::ParUnsupported | Error::InvalidMetadata(_) => "invalid_client_metadata",
            Error::Par(_) | Error::Http { .. } => "temporarily_unavailable",
            Error::InvalidStateTransition { .. } | Error::InvalidRequest(_) => "invalid_request",
            Error::StateMissing(_) | Error::Algorithm(_) | Error::InvalidProof(_) => {
                "invalid_proof"
            }
            Error::SessionNotFound(_) | Error::InvalidGrant(_) => "invalid_grant",
            Error::InvalidCredentialRequest(_) => "invalid_credential_request",
            Error::CredentialSigning(_) | Error::Store { .. } => "server_error",
        }
    }

    /// Whether this error is an expected outcome under concurrent or retried traffic rather
    /// than a server fault.
    pub fn is_routine(&self) -> bool {
        match self {
            Error::StateMissing(_) | Error::SessionNotFound(_) => true,
            Error::CredentialEndpoint { response, .. } => response.error == "invalid_nonce",
            _ => false,
        }
    }

    /// The structured `{error, error_description}` form of this error.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.code().to_string(),
            error_description: Some(self.to_string()),
        }
    }
}

impl From<&Error> for ErrorResponse {
    fn from(value: &Error) -> Self {
        value.to_response()
    }
}
