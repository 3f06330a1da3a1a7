//! OID4VCI library data structures that are needed on the frontend, without all of the other
//! dependencies that can cause compilation issues with web targets.
use serde::{Deserialize, Serialize};

/// Status of a credential offer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueStatus {
    /// The offer has been created, waiting for the wallet to pick it up.
    OfferCreated,
    /// The wallet started an authorization code flow for the offer.
    AuthorizationInitiated,
    /// The token endpoint issued an access token for the offer.
    AccessTokenCreated,
    /// At least one credential has been delivered.
    CredentialIssued,
    /// The session failed and will not progress any further.
    Error,
}

impl IssueStatus {
    fn rank(&self) -> Option<u8> {
        match self {
            IssueStatus::OfferCreated => Some(0),
            IssueStatus::AuthorizationInitiated => Some(1),
            IssueStatus::AccessTokenCreated => Some(2),
            IssueStatus::CredentialIssued => Some(3),
            IssueStatus::Error => None,
        }
    }

    /// Whether the session can move from `self` to `next`.
    ///
    /// Staying in the same state is allowed, so a session can deliver several credentials.
    /// `Error` can be entered from any state but never left.
    pub fn can_transition_to(&self, next: IssueStatus) -> bool {
        match (self.rank(), next.rank()) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(current), Some(next)) => next >= current,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IssueStatus::Error)
    }
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueStatus::OfferCreated => "OFFER_CREATED",
            IssueStatus::AuthorizationInitiated => "AUTHORIZATION_INITIATED",
            IssueStatus::AccessTokenCreated => "ACCESS_TOKEN_CREATED",
            IssueStatus::CredentialIssued => "CREDENTIAL_ISSUED",
            IssueStatus::Error => "ERROR",
        }
        .fmt(f)
    }
}

/// Structured error returned by the issuer endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

#[cfg(test)]
mod test {
    use super::IssueStatus;

    #[test]
    fn transitions_only_move_forward() {
        assert!(IssueStatus::OfferCreated.can_transition_to(IssueStatus::AccessTokenCreated));
        assert!(IssueStatus::CredentialIssued.can_transition_to(IssueStatus::CredentialIssued));
        assert!(!IssueStatus::AccessTokenCreated.can_transition_to(IssueStatus::OfferCreated));
        assert!(IssueStatus::AuthorizationInitiated.can_transition_to(IssueStatus::Error));
        assert!(!IssueStatus::Error.can_transition_to(IssueStatus::CredentialIssued));
        assert!(!IssueStatus::Error.can_transition_to(IssueStatus::Error));
    }

    #[test]
    fn serializes_as_screaming_snake_case() {
        let value = serde_json::to_value(IssueStatus::AccessTokenCreated).unwrap();
        assert_eq!(value, serde_json::json!("ACCESS_TOKEN_CREATED"));
    }
}
