use anyhow::{Context, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// A JSON object as found on the wire (credential offers, issuer metadata, credential
/// configurations), from which [TypedParameters](TypedParameter) are read.
///
/// Unknown members are kept so that objects survive a decode/encode cycle untouched.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UntypedObject(pub(crate) Map<String, Json>);

/// A member of an [UntypedObject] with a fixed key and a typed representation.
pub trait TypedParameter:
    TryFrom<Json, Error = anyhow::Error> + TryInto<Json> + Clone + std::fmt::Debug
{
    const KEY: &'static str;
}

impl UntypedObject {
    pub fn new(map: Map<String, Json>) -> Self {
        Self(map)
    }

    /// Get a [TypedParameter], falling back to its default when the key is absent.
    pub fn get_or_default<T: TypedParameter + Default>(&self) -> Result<T> {
        self.get().transpose().map(Option::unwrap_or_default)
    }

    /// Get a [TypedParameter] from the object. The underlying JSON is cloned.
    pub fn get<T: TypedParameter>(&self) -> Option<Result<T>> {
        let value = self.0.get(T::KEY)?.clone();
        Some(value.try_into())
    }

    /// Remove a [TypedParameter] from the object.
    pub fn remove<T: TypedParameter>(&mut self) -> Option<Result<T>> {
        Some(self.0.remove(T::KEY)?.try_into())
    }

    /// Insert a [TypedParameter], returning the previous value under the same key.
    ///
    /// # Errors
    /// Returns an error if the parameter cannot be represented as JSON, or if the previous value
    /// cannot be parsed.
    pub fn insert<T: TypedParameter>(&mut self, t: T) -> Option<Result<T>> {
        let Ok(value) = TryInto::<Json>::try_into(t) else {
            return Some(Err(Error::msg(format!(
                "'{}' could not be represented as JSON",
                T::KEY
            ))));
        };
        Some(self.0.insert(T::KEY.to_owned(), value)?.try_into())
    }

    pub fn contains<T: TypedParameter>(&self) -> bool {
        self.0.contains_key(T::KEY)
    }

    /// Raw access to a member by key.
    pub fn get_raw(&self, key: &str) -> Option<&Json> {
        self.0.get(key)
    }

    pub fn insert_raw(&mut self, key: impl Into<String>, value: Json) -> Option<Json> {
        self.0.insert(key.into(), value)
    }

    pub fn as_map(&self) -> &Map<String, Json> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Json> {
        self.0
    }
}

impl From<UntypedObject> for Json {
    fn from(value: UntypedObject) -> Self {
        value.0.into()
    }
}

impl From<Map<String, Json>> for UntypedObject {
    fn from(value: Map<String, Json>) -> Self {
        Self(value)
    }
}

impl TryFrom<Json> for UntypedObject {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self> {
        match value {
            Json::Object(map) => Ok(Self(map)),
            other => Err(Error::msg(format!("expected a JSON object, found {other}"))),
        }
    }
}

pub trait ParsingErrorContext {
    type T: TypedParameter;

    fn parsing_error(self) -> Result<Self::T>;
}

impl<T: TypedParameter> ParsingErrorContext for Option<Result<T>> {
    type T = T;

    fn parsing_error(self) -> Result<T> {
        self.with_context(|| format!("'{}' is missing", T::KEY))?
            .with_context(|| format!("'{}' could not be parsed", T::KEY))
    }
}

impl<T: TypedParameter> ParsingErrorContext for Result<T> {
    type T = T;

    fn parsing_error(self) -> Result<T> {
        self.with_context(|| format!("'{}' could not be parsed", T::KEY))
    }
}
