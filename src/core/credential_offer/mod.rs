use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::debug;

use crate::{Error, Result};

use self::{
    codec::{compose_uri, encode_component, query_pairs, OfferQuery, CREDENTIAL_OFFER_URI},
    parameters::{
        CredentialConfigurationIds, CredentialIssuer, Credentials, Grants, OfferedCredential,
        TxCode,
    },
};

use super::{
    object::{ParsingErrorContext, TypedParameter, UntypedObject},
    util::{base_request, is_json, AsyncHttpClient},
    version::Version,
};

pub(crate) mod codec;
pub mod parameters;

pub const DEFAULT_OFFER_SCHEME: &str = "openid-credential-offer";

/// A credential offer in its canonical shape: `credential_issuer`, the offered credentials and
/// at least one recognized grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "UntypedObject", into = "UntypedObject")]
pub struct CredentialOffer(UntypedObject, CredentialIssuer, OfferedCredentials, Grants);

/// The credentials a [CredentialOffer] refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum OfferedCredentials {
    /// Draft 13 `credential_configuration_ids`.
    ConfigurationIds(Vec<String>),
    /// Draft 12 and earlier `credentials`, identifiers or inline objects.
    Credentials(Vec<OfferedCredential>),
}

impl OfferedCredentials {
    /// Identifiers into the issuer metadata, in offer order.
    pub fn ids(&self) -> Vec<&str> {
        match self {
            OfferedCredentials::ConfigurationIds(ids) => ids.iter().map(String::as_str).collect(),
            OfferedCredentials::Credentials(credentials) => {
                credentials.iter().filter_map(OfferedCredential::id).collect()
            }
        }
    }

    /// Inline credential objects (draft 11).
    pub fn inline(&self) -> Vec<&UntypedObject> {
        match self {
            OfferedCredentials::ConfigurationIds(_) => vec![],
            OfferedCredentials::Credentials(credentials) => credentials
                .iter()
                .filter_map(|credential| match credential {
                    OfferedCredential::Object(object) => Some(object),
                    OfferedCredential::Id(_) => None,
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            OfferedCredentials::ConfigurationIds(ids) => ids.is_empty(),
            OfferedCredentials::Credentials(credentials) => credentials.is_empty(),
        }
    }
}

impl CredentialOffer {
    /// Build an offer from its parts, with members in wire order.
    pub fn new(
        credential_issuer: CredentialIssuer,
        offered: OfferedCredentials,
        grants: Grants,
    ) -> anyhow::Result<Self> {
        let mut object = UntypedObject::default();
        object.insert(credential_issuer);
        match offered {
            OfferedCredentials::ConfigurationIds(ids) => {
                object.insert(CredentialConfigurationIds(ids));
            }
            OfferedCredentials::Credentials(credentials) => {
                if let Some(Err(e)) = object.insert(Credentials(credentials)) {
                    return Err(e);
                }
            }
        }
        if let Some(Err(e)) = object.insert(grants) {
            return Err(e);
        }
        object.try_into()
    }

    /// Replace the grants, keeping every other member as is.
    pub fn with_grants(mut self, grants: Grants) -> anyhow::Result<Self> {
        if let Some(Err(e)) = self.0.insert(grants) {
            return Err(e);
        }
        self.0.try_into()
    }

    pub fn credential_issuer(&self) -> &str {
        &self.1 .0
    }

    pub fn offered(&self) -> &OfferedCredentials {
        &self.2
    }

    pub fn grants(&self) -> &Grants {
        &self.3
    }

    pub fn as_object(&self) -> &UntypedObject {
        &self.0
    }
}

impl From<CredentialOffer> for UntypedObject {
    fn from(value: CredentialOffer) -> Self {
        value.0
    }
}

impl TryFrom<UntypedObject> for CredentialOffer {
    type Error = anyhow::Error;

    fn try_from(value: UntypedObject) -> anyhow::Result<Self> {
        let issuer = value.get::<CredentialIssuer>().parsing_error()?;

        let offered = if let Some(ids) = value.get::<CredentialConfigurationIds>() {
            OfferedCredentials::ConfigurationIds(ids.parsing_error()?.0)
        } else if let Some(credentials) = value.get::<Credentials>() {
            OfferedCredentials::Credentials(credentials.parsing_error()?.0)
        } else {
            bail!(
                "either '{}' or '{}' is required",
                CredentialConfigurationIds::KEY,
                Credentials::KEY
            )
        };

        let grants = value.get::<Grants>().parsing_error()?;
        if !grants.has_recognized_grant() {
            bail!("'grants' does not contain a supported grant type")
        }

        Ok(Self(value, issuer, offered, grants))
    }
}

/// A credential offer object as found on the wire, tagged with the revision it follows.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialOfferPayload {
    pub version: Version,
    pub object: UntypedObject,
}

impl CredentialOfferPayload {
    pub fn new(version: Version, object: UntypedObject) -> Self {
        Self { version, object }
    }

    /// Tag an object with the revision detected from its shape.
    pub fn detect(object: UntypedObject) -> Self {
        Self {
            version: Version::detect_payload(&object),
            object,
        }
    }
}

impl From<CredentialOffer> for CredentialOfferPayload {
    fn from(value: CredentialOffer) -> Self {
        Self::detect(value.0)
    }
}

/// Authorization flows a wallet can start from an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthzFlowType {
    #[serde(rename = "Authorization Code Flow")]
    AuthorizationCodeFlow,
    #[serde(rename = "Pre-Authorized Code Flow")]
    PreAuthorizedCodeFlow,
}

/// Where an offer came from: the scheme and base of the offer URI, and the reference it was
/// fetched from, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfferOrigin {
    pub scheme: String,
    pub base_url: Option<String>,
    pub credential_offer_uri: Option<String>,
}

impl OfferOrigin {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_credential_offer_uri(mut self, uri: impl Into<String>) -> Self {
        self.credential_offer_uri = Some(uri.into());
        self
    }
}

/// A credential offer of any revision, in one uniform shape.
///
/// Produced by [decode] or [normalize] and immutable afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct UniformCredentialOfferRequest {
    scheme: String,
    base_url: Option<String>,
    credential_offer: CredentialOffer,
    original_credential_offer: Json,
    #[serde(skip_serializing_if = "Option::is_none")]
    credential_offer_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    issuer_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pre_authorized_code: Option<String>,
    user_pin_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tx_code: Option<TxCode>,
    version: Version,
    supported_flows: Vec<AuthzFlowType>,
}

impl UniformCredentialOfferRequest {
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn credential_offer(&self) -> &CredentialOffer {
        &self.credential_offer
    }

    /// The offer object exactly as received.
    pub fn original_credential_offer(&self) -> &Json {
        &self.original_credential_offer
    }

    pub fn credential_offer_uri(&self) -> Option<&str> {
        self.credential_offer_uri.as_deref()
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn issuer_state(&self) -> Option<&str> {
        self.issuer_state.as_deref()
    }

    pub fn pre_authorized_code(&self) -> Option<&str> {
        self.pre_authorized_code.as_deref()
    }

    pub fn user_pin_required(&self) -> bool {
        self.user_pin_required
    }

    pub fn tx_code(&self) -> Option<&TxCode> {
        self.tx_code.as_ref()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn supported_flows(&self) -> &[AuthzFlowType] {
        &self.supported_flows
    }

    pub fn credential_issuer(&self) -> &str {
        self.credential_offer.credential_issuer()
    }

    /// Re-encode the offer as a URI, as it was received.
    pub fn to_uri(&self) -> Result<String> {
        let payload = match &self.original_credential_offer {
            Json::Object(map) => map.clone().into(),
            _ => self.credential_offer.0.clone(),
        };
        let options = EncodeOptions {
            scheme: self.scheme.clone(),
            base_url: self.base_url.clone(),
            credential_offer_uri: self.credential_offer_uri.clone(),
        };
        encode(&CredentialOfferPayload::new(self.version, payload), &options)
    }
}

/// Parse a credential offer URI of any revision, fetching by-reference offers through
/// `http_client`.
pub async fn decode<H>(uri: &str, http_client: &H) -> Result<UniformCredentialOfferRequest>
where
    H: AsyncHttpClient + ?Sized,
{
    let (Some((scheme, _)), Some((base_url, _))) = (uri.split_once("://"), uri.split_once('?'))
    else {
        return Err(Error::MalformedOffer(
            "credential offer URI must contain '://' and '?'".into(),
        ));
    };

    let version = Version::detect(uri);
    debug!("credential offer URI determined to be of version {version}");

    let origin = OfferOrigin::new(scheme).with_base_url(base_url);
    match version.codec().decode(&query_pairs(uri))? {
        OfferQuery::ByValue(object) => {
            normalize(origin, CredentialOfferPayload::new(version, object))
        }
        OfferQuery::ByReference(reference) => {
            let object = fetch_offer(&reference, http_client).await?;
            let payload = CredentialOfferPayload::detect(object);
            // References only exist from draft 11 onwards.
            let payload = CredentialOfferPayload::new(
                payload.version.max(Version::V1_0_11),
                payload.object,
            );
            debug!(
                "credential offer fetched from {reference} is of version {}",
                payload.version
            );
            normalize(origin.with_credential_offer_uri(reference), payload)
        }
    }
}

async fn fetch_offer<H>(uri: &str, http_client: &H) -> Result<UntypedObject>
where
    H: AsyncHttpClient + ?Sized,
{
    let request = base_request()
        .method("GET")
        .uri(uri)
        .body(vec![])
        .context("failed to build credential offer request")
        .map_err(Error::http("fetching the credential offer"))?;

    let response = http_client
        .execute(request)
        .await
        .with_context(|| format!("failed to make credential offer request at {uri}"))
        .map_err(Error::http("fetching the credential offer"))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::OfferFetch {
            uri: uri.to_owned(),
            status: status.as_u16(),
            reason: status
                .canonical_reason()
                .map(ToOwned::to_owned)
                .unwrap_or_else(|| String::from_utf8_lossy(response.body()).into_owned()),
        });
    }

    if !is_json(&response) {
        return Err(Error::OfferFetch {
            uri: uri.to_owned(),
            status: status.as_u16(),
            reason: "the response content type is not application/json".into(),
        });
    }

    serde_json::from_slice::<Json>(response.body())
        .map_err(anyhow::Error::from)
        .and_then(UntypedObject::try_from)
        .map_err(|e| Error::MalformedOffer(format!("fetched credential offer is invalid: {e}")))
}

/// Derive the uniform offer from a payload of any revision.
pub fn normalize(
    origin: OfferOrigin,
    payload: CredentialOfferPayload,
) -> Result<UniformCredentialOfferRequest> {
    let codec = payload.version.codec();
    let credential_offer = codec.canonicalize(&payload.object)?;
    let client_id = codec.client_id(&payload.object, &credential_offer);

    let grants = credential_offer.grants();
    let issuer_state = grants.issuer_state().map(ToOwned::to_owned);
    let pre_authorized_code = grants.pre_authorized_code().map(ToOwned::to_owned);
    let tx_code = grants
        .pre_authorized_code
        .as_ref()
        .and_then(|grant| grant.tx_code.clone());
    let user_pin_required = grants
        .pre_authorized_code
        .as_ref()
        .and_then(|grant| grant.user_pin_required)
        .unwrap_or(tx_code.is_some());

    let mut supported_flows = vec![];
    if grants.authorization_code.is_some() {
        supported_flows.push(AuthzFlowType::AuthorizationCodeFlow);
    }
    if grants.pre_authorized_code.is_some() {
        supported_flows.push(AuthzFlowType::PreAuthorizedCodeFlow);
    }

    Ok(UniformCredentialOfferRequest {
        scheme: origin.scheme,
        base_url: origin.base_url,
        original_credential_offer: payload.object.into(),
        credential_offer,
        credential_offer_uri: origin.credential_offer_uri,
        client_id,
        issuer_state,
        pre_authorized_code,
        user_pin_required,
        tx_code,
        version: payload.version,
        supported_flows,
    })
}

/// How [encode] shapes the URI around the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOptions {
    pub scheme: String,
    /// Base of the URI; `scheme://` is prepended when it has no scheme of its own.
    pub base_url: Option<String>,
    /// Write a by-reference offer pointing here instead of the payload itself.
    pub credential_offer_uri: Option<String>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_OFFER_SCHEME.into(),
            base_url: None,
            credential_offer_uri: None,
        }
    }
}

/// Encode a payload as a credential offer URI of its revision.
pub fn encode(payload: &CredentialOfferPayload, options: &EncodeOptions) -> Result<String> {
    let query = match &options.credential_offer_uri {
        Some(reference) => format!("{CREDENTIAL_OFFER_URI}={}", encode_component(reference)),
        None => payload.version.codec().encode(&payload.object)?,
    };
    Ok(compose_uri(
        &options.scheme,
        options.base_url.as_deref(),
        &query,
    ))
}
