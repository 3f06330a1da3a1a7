use base64::prelude::*;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{Map, Value as Json};

use crate::{
    core::{
        object::{ParsingErrorContext, TypedParameter, UntypedObject},
        version::Version,
    },
    Error, Result,
};

use super::{
    parameters::{
        AuthorizationCodeGrant, CredentialIssuer, Grants, LegacyCredentialType,
        LegacyIssuer, LegacyPreAuthorizedCode, OfferClientId, OfferedCredential, OpState,
        PreAuthorizedCodeGrant, UserPinRequired,
    },
    CredentialOffer, OfferedCredentials,
};

/// The character set left unescaped by ECMAScript's `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub(crate) const CREDENTIAL_OFFER: &str = "credential_offer";
pub(crate) const CREDENTIAL_OFFER_URI: &str = "credential_offer_uri";

/// What the query of an offer URI carries.
#[derive(Debug, Clone)]
pub(crate) enum OfferQuery {
    ByValue(UntypedObject),
    ByReference(String),
}

/// Wire strategy of one offer revision.
pub(crate) trait OfferCodec: Send + Sync {
    fn version(&self) -> Version;

    /// Read the payload (or its reference) from the decoded query pairs of an offer URI.
    fn decode(&self, query: &[(String, String)]) -> Result<OfferQuery>;

    /// Write the payload as the query component of an offer URI, without a leading `?`.
    fn encode(&self, payload: &UntypedObject) -> Result<String>;

    /// Map the payload onto the canonical [CredentialOffer].
    fn canonicalize(&self, payload: &UntypedObject) -> Result<CredentialOffer>;

    /// The `client_id` the issuer expects the wallet to use, if the payload names one.
    fn client_id(&self, payload: &UntypedObject, offer: &CredentialOffer) -> Option<String> {
        if let Some(Ok(OfferClientId(client_id))) = payload.get::<OfferClientId>() {
            return Some(client_id);
        }
        offer
            .grants()
            .issuer_state()
            .and_then(client_id_from_issuer_state)
    }
}

static DRAFT_9: FlatOfferCodec = FlatOfferCodec;
static DRAFT_11: JsonOfferCodec = JsonOfferCodec(Version::V1_0_11);
static DRAFT_12: JsonOfferCodec = JsonOfferCodec(Version::V1_0_12);
static DRAFT_13: JsonOfferCodec = JsonOfferCodec(Version::V1_0_13);

pub(crate) fn for_version(version: Version) -> &'static dyn OfferCodec {
    match version {
        Version::V1_0_09 => &DRAFT_9,
        Version::V1_0_11 => &DRAFT_11,
        Version::V1_0_12 => &DRAFT_12,
        Version::V1_0_13 => &DRAFT_13,
    }
}

/// Draft 9: every member is its own query parameter.
#[derive(Debug)]
pub(crate) struct FlatOfferCodec;

impl OfferCodec for FlatOfferCodec {
    fn version(&self) -> Version {
        Version::V1_0_09
    }

    fn decode(&self, query: &[(String, String)]) -> Result<OfferQuery> {
        let mut object = Map::new();
        for (key, value) in query {
            if key == LegacyCredentialType::KEY {
                let entry = object
                    .entry(key.clone())
                    .or_insert_with(|| Json::Array(vec![]));
                if let Json::Array(values) = entry {
                    values.push(Json::String(value.clone()));
                }
            } else {
                object.insert(key.clone(), Json::String(value.clone()));
            }
        }

        for required in [LegacyIssuer::KEY, LegacyCredentialType::KEY] {
            if !object.contains_key(required) {
                return Err(Error::MalformedOffer(format!("'{required}' is missing")));
            }
        }

        Ok(OfferQuery::ByValue(object.into()))
    }

    fn encode(&self, payload: &UntypedObject) -> Result<String> {
        let mut parameters = vec![];
        for (key, value) in payload.as_map() {
            match value {
                Json::Array(values) => {
                    for value in values {
                        parameters.push(flat_parameter(key, value));
                    }
                }
                value => parameters.push(flat_parameter(key, value)),
            }
        }
        Ok(parameters.join("&"))
    }

    fn canonicalize(&self, payload: &UntypedObject) -> Result<CredentialOffer> {
        let malformed = |e: anyhow::Error| Error::MalformedOffer(format!("{e:#}"));

        let LegacyIssuer(issuer) = payload
            .get::<LegacyIssuer>()
            .parsing_error()
            .map_err(malformed)?;
        let LegacyCredentialType(types) = payload
            .get::<LegacyCredentialType>()
            .parsing_error()
            .map_err(malformed)?;

        let mut grants = Grants::default();
        if let Some(code) = payload.get::<LegacyPreAuthorizedCode>() {
            let LegacyPreAuthorizedCode(code) = code.parsing_error().map_err(malformed)?;
            let user_pin_required = payload
                .get::<UserPinRequired>()
                .transpose()
                .map_err(malformed)?
                .map(|UserPinRequired(required)| required);
            grants.pre_authorized_code = Some(PreAuthorizedCodeGrant {
                pre_authorized_code: code,
                user_pin_required,
                ..Default::default()
            });
        }
        if let Some(op_state) = payload.get::<OpState>() {
            let OpState(op_state) = op_state.parsing_error().map_err(malformed)?;
            grants.authorization_code = Some(AuthorizationCodeGrant {
                issuer_state: Some(op_state),
                ..Default::default()
            });
        }
        if !grants.has_recognized_grant() {
            grants.authorization_code = Some(AuthorizationCodeGrant::default());
        }

        let credentials = types.into_iter().map(OfferedCredential::Id).collect();
        CredentialOffer::new(
            CredentialIssuer(issuer),
            OfferedCredentials::Credentials(credentials),
            grants,
        )
        .map_err(malformed)
    }
}

/// Draft 11 and later: one `credential_offer` parameter holding the JSON object, or a
/// `credential_offer_uri` pointing at it.
#[derive(Debug)]
pub(crate) struct JsonOfferCodec(Version);

impl OfferCodec for JsonOfferCodec {
    fn version(&self) -> Version {
        self.0
    }

    fn decode(&self, query: &[(String, String)]) -> Result<OfferQuery> {
        if let Some((_, uri)) = query.iter().find(|(key, _)| key == CREDENTIAL_OFFER_URI) {
            return Ok(OfferQuery::ByReference(uri.clone()));
        }

        let Some((_, offer)) = query.iter().find(|(key, _)| key == CREDENTIAL_OFFER) else {
            return Err(Error::MalformedOffer(format!(
                "either '{CREDENTIAL_OFFER}' or '{CREDENTIAL_OFFER_URI}' is required"
            )));
        };

        serde_json::from_str::<Json>(offer)
            .map_err(anyhow::Error::from)
            .and_then(UntypedObject::try_from)
            .map(OfferQuery::ByValue)
            .map_err(|e| {
                Error::MalformedOffer(format!("'{CREDENTIAL_OFFER}' is not a JSON object: {e}"))
            })
    }

    fn encode(&self, payload: &UntypedObject) -> Result<String> {
        let json = serde_json::to_string(payload)
            .map_err(|e| Error::MalformedOffer(format!("offer could not be serialized: {e}")))?;
        Ok(format!("{CREDENTIAL_OFFER}={}", encode_component(&json)))
    }

    fn canonicalize(&self, payload: &UntypedObject) -> Result<CredentialOffer> {
        if !payload.contains::<Grants>() {
            return Err(Error::MalformedOffer(format!(
                "'grants' is required in {} offers",
                self.0
            )));
        }
        CredentialOffer::try_from(payload.clone())
            .map_err(|e| Error::MalformedOffer(format!("{e:#}")))
    }
}

/// Percent-encode with the `encodeURIComponent` character set.
pub(crate) fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// Decode the query component of a URI into its (repeatable) key/value pairs.
pub(crate) fn query_pairs(uri: &str) -> Vec<(String, String)> {
    let query = uri
        .split_once('?')
        .map(|(_, query)| query)
        .unwrap_or_default();
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

/// Join `base_url` and an encoded query, prefixing `scheme://` when the base has no scheme.
pub(crate) fn compose_uri(scheme: &str, base_url: Option<&str>, query: &str) -> String {
    let scheme = scheme.trim_end_matches("://");
    let mut uri = match base_url {
        Some(base) if base.contains("://") => base.to_owned(),
        Some(base) => format!("{scheme}://{base}"),
        None => format!("{scheme}://"),
    };

    match uri.split_once('?') {
        None => uri.push('?'),
        Some((_, existing)) if existing.is_empty() || uri.ends_with('&') => {}
        Some(_) => uri.push('&'),
    }
    uri.push_str(query);
    uri
}

fn flat_parameter(key: &str, value: &Json) -> String {
    let value = match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    };
    format!("{key}={}", encode_component(&value))
}

/// The `client_id` claim of an issuer state that is shaped like a JWT.
fn client_id_from_issuer_state(issuer_state: &str) -> Option<String> {
    let mut parts = issuer_state.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let payload = BASE64_URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: Map<String, Json> = serde_json::from_slice(&payload).ok()?;
    claims.get("client_id")?.as_str().map(ToOwned::to_owned)
}
