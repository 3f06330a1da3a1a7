use std::{
    collections::BTreeMap,
    ops::{Deref, DerefMut},
};

use anyhow::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use tracing::warn;

use crate::core::{
    object::{ParsingErrorContext, TypedParameter, UntypedObject},
    version::Version,
};

use super::{
    parameters::issuer::{CredentialConfigurationsSupported, CredentialsSupported},
    CredentialIssuerMetadata,
};

const VERIFIABLE_CREDENTIAL: &str = "VerifiableCredential";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format(pub String);

impl TypedParameter for Format {
    const KEY: &'static str = "format";
}

impl TryFrom<Json> for Format {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<Format> for Json {
    fn from(value: Format) -> Json {
        Json::String(value.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationId(pub String);

impl TypedParameter for ConfigurationId {
    const KEY: &'static str = "id";
}

impl TryFrom<Json> for ConfigurationId {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(Self(serde_json::from_value(value)?))
    }
}

impl From<ConfigurationId> for Json {
    fn from(value: ConfigurationId) -> Json {
        Json::String(value.0)
    }
}

/// Description of one credential an issuer can issue.
///
/// Only `format` is interpreted eagerly; every other member is preserved verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UntypedObject", into = "UntypedObject")]
pub struct CredentialConfigurationSupported(UntypedObject, Format);

impl CredentialConfigurationSupported {
    pub fn format(&self) -> &str {
        &self.1 .0
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get_raw(ConfigurationId::KEY)?.as_str()
    }

    /// Every credential type the configuration declares, through `credential_definition.type`,
    /// `type`, `types` or `vct`, without duplicates.
    pub fn declared_types(&self) -> Vec<&str> {
        let definition = self
            .0
            .get_raw("credential_definition")
            .and_then(|definition| definition.get("type"));
        let lists = [definition, self.0.get_raw("type"), self.0.get_raw("types")];

        let mut types: Vec<&str> = vec![];
        for list in lists.into_iter().flatten() {
            let values: Vec<&str> = match list {
                Json::Array(values) => values.iter().filter_map(Json::as_str).collect(),
                Json::String(value) => vec![value.as_str()],
                _ => vec![],
            };
            for value in values {
                if !types.contains(&value) {
                    types.push(value);
                }
            }
        }
        if let Some(vct) = self.0.get_raw("vct").and_then(Json::as_str) {
            if !types.contains(&vct) {
                types.push(vct);
            }
        }
        types
    }

    pub fn declared_types_without_verifiable_credential(&self) -> Vec<&str> {
        self.declared_types()
            .into_iter()
            .filter(|t| *t != VERIFIABLE_CREDENTIAL)
            .collect()
    }

    pub fn cryptographic_binding_methods_supported(&self) -> Vec<&str> {
        string_list(self.0.get_raw("cryptographic_binding_methods_supported"))
    }

    /// Signing algorithms, read from `cryptographic_suites_supported` in older drafts.
    pub fn credential_signing_alg_values_supported(&self) -> Vec<&str> {
        string_list(
            self.0
                .get_raw("credential_signing_alg_values_supported")
                .or_else(|| self.0.get_raw("cryptographic_suites_supported")),
        )
    }

    fn matches(&self, types: &[String], formats: &[String]) -> bool {
        let declared = self.declared_types();
        let type_match = types.is_empty() || types.iter().any(|t| declared.contains(&t.as_str()));
        let format_match = formats.is_empty() || formats.iter().any(|f| f == self.format());
        type_match && format_match
    }

    fn with_id(mut self, id: &str) -> Self {
        if !self.0.contains::<ConfigurationId>() {
            self.0.insert(ConfigurationId(id.to_owned()));
        }
        self
    }
}

fn string_list(value: Option<&Json>) -> Vec<&str> {
    value
        .and_then(Json::as_array)
        .map(|values| values.iter().filter_map(Json::as_str).collect())
        .unwrap_or_default()
}

impl From<CredentialConfigurationSupported> for UntypedObject {
    fn from(value: CredentialConfigurationSupported) -> Self {
        value.0
    }
}

impl TryFrom<UntypedObject> for CredentialConfigurationSupported {
    type Error = Error;

    fn try_from(value: UntypedObject) -> Result<Self, Self::Error> {
        let format = value.get().parsing_error()?;
        Ok(Self(value, format))
    }
}

impl TryFrom<Json> for CredentialConfigurationSupported {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        UntypedObject::try_from(value)?.try_into()
    }
}

impl Deref for CredentialConfigurationSupported {
    type Target = UntypedObject;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for CredentialConfigurationSupported {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Result of [get_supported_credentials], shaped after the requested version.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SupportedCredentials {
    /// Drafts before 13: configurations in metadata order.
    List(Vec<CredentialConfigurationSupported>),
    /// Draft 13: configurations keyed by identifier.
    Map(BTreeMap<String, CredentialConfigurationSupported>),
}

impl SupportedCredentials {
    pub fn len(&self) -> usize {
        match self {
            SupportedCredentials::List(list) => list.len(),
            SupportedCredentials::Map(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find a configuration by its identifier (map key or `id`).
    pub fn get(&self, id: &str) -> Option<&CredentialConfigurationSupported> {
        match self {
            SupportedCredentials::List(list) => list.iter().find(|c| c.id() == Some(id)),
            SupportedCredentials::Map(map) => map.get(id),
        }
    }

    pub fn configurations(&self) -> Vec<&CredentialConfigurationSupported> {
        match self {
            SupportedCredentials::List(list) => list.iter().collect(),
            SupportedCredentials::Map(map) => map.values().collect(),
        }
    }
}

/// Which configurations [get_supported_credentials] should return.
#[derive(Debug, Clone, Default)]
pub struct SupportedCredentialsQuery {
    pub version: Version,
    /// Alternative type sets; a configuration matches a set when it declares any of its types.
    pub types: Vec<Vec<String>>,
    pub formats: Vec<String>,
}

impl SupportedCredentialsQuery {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            ..Default::default()
        }
    }

    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types.push(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.formats.push(format.into());
        self
    }
}

/// Resolve the credential configurations an issuer supports, in the shape of `query.version`.
///
/// # Errors
/// Fails when an entry of the metadata is not a valid configuration, or when a draft 13 entry
/// carries an `id` that differs from its key.
pub fn get_supported_credentials(
    metadata: &CredentialIssuerMetadata,
    query: &SupportedCredentialsQuery,
) -> crate::Result<SupportedCredentials> {
    let entries = source_entries(metadata, query.version)
        .map_err(|e| crate::Error::InvalidMetadata(format!("{e:#}")))?;

    let no_filter = [vec![]];
    let type_sets: &[Vec<String>] = if query.types.is_empty() {
        &no_filter
    } else {
        &query.types
    };

    if query.version.uses_configuration_map() {
        let mut map = BTreeMap::new();
        for types in type_sets {
            for (key, config) in matching(&entries, types, &query.formats) {
                let Some(key) = key.as_deref().or(config.id()) else {
                    warn!(
                        "skipping credential configuration without identifier (format: {})",
                        config.format()
                    );
                    continue;
                };
                map.insert(key.to_owned(), config.clone().with_id(key));
            }
        }
        Ok(SupportedCredentials::Map(map))
    } else {
        let list = type_sets
            .iter()
            .flat_map(|types| matching(&entries, types, &query.formats))
            .map(|(key, config)| match key {
                Some(key) => config.clone().with_id(key),
                None => config.clone(),
            })
            .collect();
        Ok(SupportedCredentials::List(list))
    }
}

type Entry = (Option<String>, CredentialConfigurationSupported);

fn matching<'a>(
    entries: &'a [Entry],
    types: &'a [String],
    formats: &'a [String],
) -> impl Iterator<Item = &'a Entry> + 'a {
    entries
        .iter()
        .filter(move |(_, config)| config.matches(types, formats))
}

fn source_entries(
    metadata: &CredentialIssuerMetadata,
    version: Version,
) -> anyhow::Result<Vec<Entry>> {
    if version < Version::V1_0_12 || metadata.contains::<CredentialsSupported>() {
        let Some(credentials_supported) = metadata.get::<CredentialsSupported>() else {
            warn!("no credentials_supported found in credential issuer metadata");
            return Ok(vec![]);
        };
        return match credentials_supported.parsing_error()? {
            CredentialsSupported::List(list) => list
                .into_iter()
                .map(|value| CredentialConfigurationSupported::try_from(value).map(|c| (None, c)))
                .collect(),
            CredentialsSupported::ByType(by_type) => by_type_entries(by_type),
        };
    }

    let Some(configurations) = metadata.get::<CredentialConfigurationsSupported>() else {
        warn!("no credential_configurations_supported found in credential issuer metadata");
        return Ok(vec![]);
    };
    configurations
        .parsing_error()?
        .0
        .into_iter()
        .map(|(key, value)| {
            let config = CredentialConfigurationSupported::try_from(value)?;
            if let Some(id) = config.id() {
                if id != key {
                    anyhow::bail!("credential configuration '{key}' declares a different id '{id}'")
                }
            }
            Ok((Some(key), config))
        })
        .collect()
}

/// Draft 8 `credentials_supported`: `{type: {display, claims, formats: {format: details}}}`, one
/// configuration per type and format.
fn by_type_entries(by_type: Map<String, Json>) -> anyhow::Result<Vec<Entry>> {
    let mut entries = vec![];
    for (credential_type, supported) in by_type {
        let Json::Object(mut supported) = supported else {
            anyhow::bail!("credentials_supported entry '{credential_type}' is not an object");
        };
        let Some(Json::Object(formats)) = supported.remove("formats") else {
            anyhow::bail!("credentials_supported entry '{credential_type}' has no formats");
        };
        for (format, details) in formats {
            let mut config = Map::new();
            config.insert(Format::KEY.into(), Json::String(format));
            if let Some(display) = supported.get("display") {
                config.insert("display".into(), display.clone());
            }
            if let Json::Object(details) = details {
                config.extend(details);
            }
            if let Some(claims) = supported.get("claims") {
                config.insert("credentialSubject".into(), claims.clone());
            }
            let config = CredentialConfigurationSupported::try_from(UntypedObject::from(config))?;
            entries.push((Some(credential_type.clone()), config));
        }
    }
    Ok(entries)
}
