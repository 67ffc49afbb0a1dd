//! Configuration objects managed through the Data Plane API.
//!
//! Only the attributes this crate reasons about are named; everything else the API returns is
//! kept in `extra` and sent back unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::requests::{LegacyParent, ResourceKey};
use crate::resources::Resource;

pub type Extra = Map<String, Value>;

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Balance {
    pub algorithm: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Frontend {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_backend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxconn: Option<i64>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Backend {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<Balance>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Server {
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Bind {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// An ACL line inside a frontend or backend, addressed by its position.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Acl {
    #[serde(default)]
    pub index: i64,
    pub acl_name: String,
    pub criterion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Common shape of the positional rule lists (`http-request`, `tcp-request`, checks...).
macro_rules! rule_model {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
        pub struct $name {
            #[serde(default)]
            pub index: i64,
            #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
            pub kind: Option<String>,
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub action: Option<String>,
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub cond: Option<String>,
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub cond_test: Option<String>,
            #[serde(flatten)]
            pub extra: Extra,
        }
    };
}

rule_model!(HttpRequestRule);
rule_model!(HttpResponseRule);
rule_model!(TcpRequestRule);
rule_model!(TcpResponseRule);
rule_model!(HttpCheck);
rule_model!(TcpCheck);
rule_model!(
    /// `stick on`/`stick store-request`... rules; the table itself is configured on the backend.
    StickRule
);

/// Common shape of named objects that only need a name plus pass-through attributes.
macro_rules! named_model {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
        pub struct $name {
            pub name: String,
            #[serde(flatten)]
            pub extra: Extra,
        }
    };
}

named_model!(Resolver);
named_model!(
    /// A `peers` section.
    PeerSection
);
named_model!(LogForward);

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Nameserver {
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct PeerEntry {
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// The `global` section. There is exactly one; it can be read and replaced but not created.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Global {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxconn: Option<i64>,
    #[serde(flatten)]
    pub extra: Extra,
}

macro_rules! named_resource {
    ($ty:ty, $kind:literal / $plural:literal, $collection:literal, $legacy:expr) => {
        impl Resource for $ty {
            const KIND: &'static str = $kind;
            const PLURAL: &'static str = $plural;
            const COLLECTION: &'static str = $collection;
            const LEGACY_PARENT: LegacyParent = $legacy;

            fn key(&self) -> ResourceKey {
                ResourceKey::Name(self.name.clone())
            }
        }
    };
}

macro_rules! indexed_resource {
    ($ty:ty, $kind:literal / $plural:literal, $collection:literal, $legacy:expr $(, name = $field:ident)?) => {
        impl Resource for $ty {
            const KIND: &'static str = $kind;
            const PLURAL: &'static str = $plural;
            const COLLECTION: &'static str = $collection;
            const LEGACY_PARENT: LegacyParent = $legacy;
            const INDEXED: bool = true;
            const UNPROCESSABLE_IS_EMPTY: bool = true;

            fn key(&self) -> ResourceKey {
                ResourceKey::Index(self.index)
            }

            fn set_index(&mut self, index: i64) {
                self.index = index;
            }

            $(
                fn display_name(&self) -> Option<&str> {
                    Some(&self.$field)
                }
            )?
        }
    };
}

named_resource!(Frontend, "frontend" / "frontends", "frontends", LegacyParent::None);
named_resource!(Backend, "backend" / "backends", "backends", LegacyParent::None);
named_resource!(Server, "server" / "servers", "servers", LegacyParent::Named("backend"));
named_resource!(Bind, "bind" / "binds", "binds", LegacyParent::Named("frontend"));
named_resource!(Resolver, "resolver" / "resolvers", "resolvers", LegacyParent::None);
named_resource!(Nameserver, "nameserver" / "nameservers", "nameservers", LegacyParent::Named("resolver"));
named_resource!(PeerSection, "peer section" / "peer sections", "peer_section", LegacyParent::None);
named_resource!(PeerEntry, "peer entry" / "peer entries", "peer_entries", LegacyParent::Named("peer_section"));
named_resource!(LogForward, "log forward" / "log forwards", "log_forwards", LegacyParent::None);

indexed_resource!(Acl, "acl" / "acls", "acls", LegacyParent::Typed, name = acl_name);
indexed_resource!(HttpRequestRule, "http-request rule" / "http-request rules", "http_request_rules", LegacyParent::Typed);
indexed_resource!(HttpResponseRule, "http-response rule" / "http-response rules", "http_response_rules", LegacyParent::Typed);
indexed_resource!(TcpRequestRule, "tcp-request rule" / "tcp-request rules", "tcp_request_rules", LegacyParent::Typed);
indexed_resource!(TcpResponseRule, "tcp-response rule" / "tcp-response rules", "tcp_response_rules", LegacyParent::Named("backend"));
indexed_resource!(HttpCheck, "http-check" / "http-checks", "http_checks", LegacyParent::Typed);
indexed_resource!(TcpCheck, "tcp-check" / "tcp-checks", "tcp_checks", LegacyParent::Typed);
indexed_resource!(StickRule, "stick rule" / "stick rules", "stick_rules", LegacyParent::Named("backend"));
