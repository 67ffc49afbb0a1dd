//! Request types for the Data Plane API.

use std::fmt::{self, Display};
use std::str::FromStr;

use crate::errors::Error;
use crate::responses::ResponseShape;

/// Prefix of every configuration object path.
pub const CONFIGURATION: &str = "/services/haproxy/configuration";
/// Prefix of the transaction endpoints.
pub const TRANSACTIONS: &str = "/services/haproxy/transactions";

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum ApiVersion {
    /// Legacy API: payloads wrapped in `{"data": ...}`, children addressed with query parameters.
    V2,
    /// Current API: bare payloads, children nested under their parent's path.
    #[default]
    V3,
}

impl ApiVersion {
    /// The path segment inserted after the base URL.
    pub fn segment(self) -> &'static str {
        match self {
            ApiVersion::V2 => "v2",
            ApiVersion::V3 => "v3",
        }
    }

    /// How configuration responses are shaped on this version.
    pub fn response_shape(self) -> ResponseShape {
        match self {
            ApiVersion::V2 => ResponseShape::Wrapped,
            ApiVersion::V3 => ResponseShape::Bare,
        }
    }
}

impl Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.segment())
    }
}

impl FromStr for ApiVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v2" | "2" => Ok(ApiVersion::V2),
            "v3" | "3" => Ok(ApiVersion::V3),
            other => Err(Error::InvalidConfig(format!(
                "unsupported API version '{}', expected v2 or v3",
                other
            ))),
        }
    }
}

/// The entity a nested configuration object belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParentScope<'a> {
    /// Top-level objects (frontends, backends, resolvers...).
    Root,
    Frontend(&'a str),
    Backend(&'a str),
    Resolver(&'a str),
    PeerSection(&'a str),
}

impl<'a> ParentScope<'a> {
    /// Collection the parent itself lives in, as used in nested v3 paths.
    fn collection(&self) -> Option<&'static str> {
        match self {
            ParentScope::Root => None,
            ParentScope::Frontend(_) => Some("frontends"),
            ParentScope::Backend(_) => Some("backends"),
            ParentScope::Resolver(_) => Some("resolvers"),
            ParentScope::PeerSection(_) => Some("peer_section"),
        }
    }

    /// Value of `parent_type` in legacy query strings.
    fn kind(&self) -> &'static str {
        match self {
            ParentScope::Root => "",
            ParentScope::Frontend(_) => "frontend",
            ParentScope::Backend(_) => "backend",
            ParentScope::Resolver(_) => "resolver",
            ParentScope::PeerSection(_) => "peer_section",
        }
    }

    pub fn name(&self) -> Option<&'a str> {
        match *self {
            ParentScope::Root => None,
            ParentScope::Frontend(name)
            | ParentScope::Backend(name)
            | ParentScope::Resolver(name)
            | ParentScope::PeerSection(name) => Some(name),
        }
    }
}

impl Display for ParentScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} {}", self.kind(), name),
            None => f.write_str("configuration"),
        }
    }
}

/// How the legacy API expresses a child collection's parent.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LegacyParent {
    /// The object is top-level.
    None,
    /// A single query parameter naming the parent, e.g. `?backend=be_app`.
    Named(&'static str),
    /// `?parent_type=frontend&parent_name=fe_main`.
    Typed,
}

/// Key identifying one object within its collection.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ResourceKey {
    Name(String),
    Index(i64),
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResourceKey::Name(name) => f.write_str(name),
            ResourceKey::Index(index) => index.fmt(f),
        }
    }
}

/// A logical path plus query parameters, without the version prefix.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Location {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl Location {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Extend the path by one segment.
    pub fn child(mut self, segment: impl Display) -> Self {
        self.path = format!("{}/{}", self.path, segment);
        self
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.path)?;
        for (i, (key, value)) in self.query.iter().enumerate() {
            write!(f, "{}{}={}", if i == 0 { '?' } else { '&' }, key, value)?;
        }
        Ok(())
    }
}

/// Location of a configuration collection for the given API version.
///
/// ```
/// use haptik_dataplane::requests::{collection_location, ApiVersion, LegacyParent, ParentScope};
///
/// let v3 = collection_location(ApiVersion::V3, "servers", LegacyParent::Named("backend"), ParentScope::Backend("be"));
/// assert_eq!(v3.to_string(), "/services/haproxy/configuration/backends/be/servers");
///
/// let v2 = collection_location(ApiVersion::V2, "servers", LegacyParent::Named("backend"), ParentScope::Backend("be"));
/// assert_eq!(v2.to_string(), "/services/haproxy/configuration/servers?backend=be");
/// ```
pub fn collection_location(
    version: ApiVersion,
    collection: &str,
    legacy: LegacyParent,
    parent: ParentScope,
) -> Location {
    match (version, parent.collection(), parent.name()) {
        (ApiVersion::V3, Some(parent_collection), Some(parent_name)) => Location::new(format!(
            "{}/{}/{}/{}",
            CONFIGURATION, parent_collection, parent_name, collection
        )),
        (ApiVersion::V2, _, Some(parent_name)) => {
            let location = Location::new(format!("{}/{}", CONFIGURATION, collection));
            match legacy {
                LegacyParent::None => location,
                LegacyParent::Named(param) => location.with_query(param, parent_name),
                LegacyParent::Typed => location
                    .with_query("parent_type", parent.kind())
                    .with_query("parent_name", parent_name),
            }
        }
        _ => Location::new(format!("{}/{}", CONFIGURATION, collection)),
    }
}
