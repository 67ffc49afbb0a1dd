//! Create, read, update and delete configuration objects.
//!
//! Every object type goes through the same generic code; the [`Resource`] implementations in
//! [`crate::models`] only say where the collection lives and how an object is keyed.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::connection::Connection;
use crate::errors::Result;
use crate::models::Global;
use crate::requests::{
    collection_location, ApiVersion, LegacyParent, Location, ParentScope, ResourceKey,
    CONFIGURATION,
};
use crate::transaction::TransactionScope;

/// A configuration object type exposed by the Data Plane API.
pub trait Resource: Serialize + DeserializeOwned + Send + Sync {
    /// Human-readable name of the object type, used in error messages.
    const KIND: &'static str;
    /// Plural of [`Resource::KIND`].
    const PLURAL: &'static str;
    /// Path segment of the collection.
    const COLLECTION: &'static str;
    /// How the legacy API names the parent of this collection.
    const LEGACY_PARENT: LegacyParent;
    /// Objects are addressed by position rather than by name.
    const INDEXED: bool = false;
    /// The API answers 422 when the parent has no objects of this type yet.
    const UNPROCESSABLE_IS_EMPTY: bool = false;

    fn key(&self) -> ResourceKey;

    /// Record the position of an object read from a positional list.
    fn set_index(&mut self, _index: i64) {}

    fn display_name(&self) -> Option<&str> {
        None
    }

    /// Short description such as `server s1` or `acl 2 (is_api)`.
    fn label(&self) -> String {
        match self.display_name() {
            Some(name) => format!("{} {} ({})", Self::KIND, self.key(), name),
            None => format!("{} {}", Self::KIND, self.key()),
        }
    }

    fn collection(version: ApiVersion, parent: ParentScope) -> Location {
        collection_location(version, Self::COLLECTION, Self::LEGACY_PARENT, parent)
    }

    /// Location of a single object. Legacy query parameters stay after the key.
    fn entity(version: ApiVersion, parent: ParentScope, key: &ResourceKey) -> Location {
        Self::collection(version, parent).child(key)
    }
}

fn describe(kind: &str, key: &ResourceKey, parent: ParentScope) -> String {
    match parent {
        ParentScope::Root => format!("{} {}", kind, key),
        parent => format!("{} {} in {}", kind, key, parent),
    }
}

fn in_transaction(location: Location, transaction_id: Option<&str>) -> Location {
    match transaction_id {
        Some(id) => location.with_query("transaction_id", id),
        None => location,
    }
}

/// Request body for `resource` on `version`.
///
/// `v3` takes the position of indexed objects from the path and rejects it in the body.
fn body<R: Resource>(version: ApiVersion, resource: &R) -> Result<Value> {
    let mut value = serde_json::to_value(resource)?;
    if R::INDEXED && version == ApiVersion::V3 {
        if let Value::Object(map) = &mut value {
            map.remove("index");
        }
    }
    Ok(value)
}

impl Connection {
    /// List the committed objects of type `R` under `parent`.
    ///
    /// A missing collection is reported as empty rather than as an error.
    ///
    /// # Examples
    /// ```no_run
    /// # async fn run() -> haptik_dataplane::errors::Result<()> {
    /// use haptik_dataplane::ConnectionBuilder;
    /// use haptik_dataplane::models::Server;
    /// use haptik_dataplane::requests::ParentScope;
    ///
    /// let connection = ConnectionBuilder::from_env()?.connect()?;
    /// for server in connection.list::<Server>(ParentScope::Backend("be_app")).await? {
    ///     println!("{} -> {}:{:?}", server.name, server.address, server.port);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn list<R: Resource>(&self, parent: ParentScope<'_>) -> Result<Vec<R>> {
        self.list_in(parent, None).await
    }

    /// Read one committed object; `Ok(None)` if it does not exist.
    pub async fn get<R: Resource>(
        &self,
        parent: ParentScope<'_>,
        key: &ResourceKey,
    ) -> Result<Option<R>> {
        self.get_in(parent, key, None).await
    }

    /// Read the `global` section.
    pub async fn global(&self) -> Result<Option<Global>> {
        let location = Location::new(format!("{}/global", CONFIGURATION));
        self.read_one(&location).await
    }

    pub(crate) async fn list_in<R: Resource>(
        &self,
        parent: ParentScope<'_>,
        transaction_id: Option<&str>,
    ) -> Result<Vec<R>> {
        let location = in_transaction(R::collection(self.api_version(), parent), transaction_id);
        let mut items: Vec<R> = self
            .read_list(&location, R::UNPROCESSABLE_IS_EMPTY)
            .await
            .map_err(|e| e.during("list", format!("{} in {}", R::PLURAL, parent)))?;

        // v3 lists do not carry positions; the order is the position.
        if R::INDEXED && self.api_version() == ApiVersion::V3 {
            for (index, item) in items.iter_mut().enumerate() {
                item.set_index(index as i64);
            }
        }
        Ok(items)
    }

    pub(crate) async fn get_in<R: Resource>(
        &self,
        parent: ParentScope<'_>,
        key: &ResourceKey,
        transaction_id: Option<&str>,
    ) -> Result<Option<R>> {
        let location = in_transaction(R::entity(self.api_version(), parent, key), transaction_id);
        let mut item: Option<R> = self
            .read_one(&location)
            .await
            .map_err(|e| e.during("read", describe(R::KIND, key, parent)))?;

        if let (Some(item), ResourceKey::Index(index)) = (item.as_mut(), key) {
            item.set_index(*index);
        }
        Ok(item)
    }

    pub(crate) async fn create_in<R: Resource>(
        &self,
        parent: ParentScope<'_>,
        resource: &R,
        transaction_id: &str,
    ) -> Result<()> {
        let version = self.api_version();
        let location = if R::INDEXED && version == ApiVersion::V3 {
            R::entity(version, parent, &resource.key())
        } else {
            R::collection(version, parent)
        };
        let location = in_transaction(location, Some(transaction_id));
        let body = body(version, resource)?;

        self.write(Method::POST, &location, Some(&body))
            .await
            .map_err(|e| e.during("create", describe_resource(resource, parent)))
    }

    pub(crate) async fn replace_in<R: Resource>(
        &self,
        parent: ParentScope<'_>,
        resource: &R,
        transaction_id: &str,
    ) -> Result<()> {
        let version = self.api_version();
        let location = in_transaction(
            R::entity(version, parent, &resource.key()),
            Some(transaction_id),
        );
        let body = body(version, resource)?;

        self.write(Method::PUT, &location, Some(&body))
            .await
            .map_err(|e| e.during("replace", describe_resource(resource, parent)))
    }

    pub(crate) async fn delete_in<R: Resource>(
        &self,
        parent: ParentScope<'_>,
        key: &ResourceKey,
        transaction_id: &str,
    ) -> Result<()> {
        let location = in_transaction(
            R::entity(self.api_version(), parent, key),
            Some(transaction_id),
        );

        self.write(Method::DELETE, &location, None)
            .await
            .map_err(|e| e.during("delete", describe(R::KIND, key, parent)))
    }
}

fn describe_resource<R: Resource>(resource: &R, parent: ParentScope) -> String {
    match parent {
        ParentScope::Root => resource.label(),
        parent => format!("{} in {}", resource.label(), parent),
    }
}

/// Mutations are only possible inside a transaction; reads see the transaction's staged changes.
impl TransactionScope {
    pub async fn create<R: Resource>(&self, parent: ParentScope<'_>, resource: &R) -> Result<()> {
        self.connection().create_in(parent, resource, self.id()).await
    }

    pub async fn replace<R: Resource>(&self, parent: ParentScope<'_>, resource: &R) -> Result<()> {
        self.connection().replace_in(parent, resource, self.id()).await
    }

    pub async fn delete<R: Resource>(&self, parent: ParentScope<'_>, key: &ResourceKey) -> Result<()> {
        self.connection().delete_in::<R>(parent, key, self.id()).await
    }

    pub async fn list<R: Resource>(&self, parent: ParentScope<'_>) -> Result<Vec<R>> {
        self.connection().list_in(parent, Some(self.id())).await
    }

    pub async fn get<R: Resource>(
        &self,
        parent: ParentScope<'_>,
        key: &ResourceKey,
    ) -> Result<Option<R>> {
        self.connection().get_in(parent, key, Some(self.id())).await
    }

    /// Replace the `global` section.
    pub async fn replace_global(&self, global: &Global) -> Result<()> {
        let location = Location::new(format!("{}/global", CONFIGURATION))
            .with_query("transaction_id", self.id());
        let body = serde_json::to_value(global)?;
        self.connection()
            .write(Method::PUT, &location, Some(&body))
            .await
            .map_err(|e| e.during("replace", "global section"))
    }
}
