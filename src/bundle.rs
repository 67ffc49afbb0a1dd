//! Apply related configuration objects together, in dependency order, inside one transaction.
//!
//! A bundle is one backend with its servers and one frontend with its ACLs. Creating it touches
//! backend → servers → frontend → ACLs; deleting it walks the same list backwards. Every bundle
//! operation runs under the [`Orchestrator`]'s retry policy, so a concurrent configuration
//! change only costs a fresh transaction.

use std::future::Future;

use tracing::{debug, info};

use crate::connection::Connection;
use crate::errors::{Error, Result};
use crate::models::{Acl, Backend, Frontend, Server};
use crate::requests::{ParentScope, ResourceKey};
use crate::resources::Resource;
use crate::retry::RetryPolicy;
use crate::transaction::TransactionScope;

/// Objects created, updated or deleted together.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceBundle {
    pub backend: Option<Backend>,
    /// Servers of `backend`, in order.
    pub servers: Vec<Server>,
    pub frontend: Option<Frontend>,
    /// ACLs of `frontend`, in order.
    pub acls: Vec<Acl>,
}

impl ResourceBundle {
    /// Servers need a backend and ACLs need a frontend to live in.
    pub fn validate(&self) -> Result<()> {
        if !self.servers.is_empty() && self.backend.is_none() {
            return Err(Error::InvalidConfig(
                "bundle has servers but no backend".to_string(),
            ));
        }
        if !self.acls.is_empty() && self.frontend.is_none() {
            return Err(Error::InvalidConfig(
                "bundle has ACLs but no frontend".to_string(),
            ));
        }
        Ok(())
    }

    fn backend_scope(&self) -> ParentScope<'_> {
        match &self.backend {
            Some(backend) => ParentScope::Backend(&backend.name),
            None => ParentScope::Root,
        }
    }

    fn frontend_scope(&self) -> ParentScope<'_> {
        match &self.frontend {
            Some(frontend) => ParentScope::Frontend(&frontend.name),
            None => ParentScope::Root,
        }
    }

    /// Create the bundle's ACLs in order. Failures also name the ACL's 1-based place in the
    /// bundle, next to the 0-based index HAProxy uses.
    async fn create_acls(&self, tx: &TransactionScope) -> Result<()> {
        let acls = self.positioned_acls();
        let total = acls.len();
        for (position, acl) in acls.iter().enumerate() {
            tx.create(self.frontend_scope(), acl).await.map_err(|e| {
                e.during("apply", format!("bundle ACL {} of {}", position + 1, total))
            })?;
        }
        Ok(())
    }

    /// The bundle's ACLs with their positions made explicit, in creation order.
    fn positioned_acls(&self) -> Vec<Acl> {
        self.acls
            .iter()
            .enumerate()
            .map(|(index, acl)| Acl {
                index: index as i64,
                ..acl.clone()
            })
            .collect()
    }
}

/// Runs bundle operations against one Data Plane API with retries.
#[derive(Clone, Debug)]
pub struct Orchestrator {
    connection: Connection,
    policy: RetryPolicy,
}

impl Orchestrator {
    pub fn new(connection: Connection) -> Self {
        Self::with_policy(connection, RetryPolicy::default())
    }

    pub fn with_policy(connection: Connection, policy: RetryPolicy) -> Self {
        Self { connection, policy }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `work` in a transaction, starting over in a new transaction on retryable failures.
    ///
    /// `work` is called once per attempt and must not assume anything from a previous attempt
    /// survived: a failed attempt is always rolled back.
    pub async fn run<F, Fut, T>(&self, operation: &str, work: F) -> Result<T>
    where
        F: Fn(TransactionScope) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let work = &work;
        let connection = &self.connection;
        self.policy
            .execute(operation, connection.cancellation(), move |attempt| {
                debug!(operation, attempt, "starting transaction attempt");
                connection.run_in_transaction(work)
            })
            .await
    }

    /// Create every object of the bundle in one transaction.
    ///
    /// # Examples
    /// ```no_run
    /// # async fn run() -> haptik_dataplane::errors::Result<()> {
    /// use haptik_dataplane::{ConnectionBuilder, Orchestrator, ResourceBundle};
    /// use haptik_dataplane::models::{Backend, Frontend, Server};
    ///
    /// let orchestrator = Orchestrator::new(ConnectionBuilder::from_env()?.connect()?);
    /// let bundle = ResourceBundle {
    ///     backend: Some(Backend { name: "be_app".into(), ..Backend::default() }),
    ///     servers: vec![Server { name: "app1".into(), address: "10.0.0.1".into(), port: Some(8080), ..Server::default() }],
    ///     frontend: Some(Frontend { name: "fe_app".into(), default_backend: Some("be_app".into()), ..Frontend::default() }),
    ///     acls: vec![],
    /// };
    /// orchestrator.create_bundle(&bundle).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create_bundle(&self, bundle: &ResourceBundle) -> Result<()> {
        bundle.validate()?;
        self.run("create bundle", |tx| create_all(tx, bundle)).await?;
        info!(
            backend = bundle.backend.as_ref().map(|b| b.name.as_str()),
            frontend = bundle.frontend.as_ref().map(|f| f.name.as_str()),
            "bundle created"
        );
        Ok(())
    }

    /// Replace every object of the bundle in one transaction.
    ///
    /// Servers missing from the live configuration are created. The frontend's ACL list is
    /// replaced as a whole.
    pub async fn update_bundle(&self, bundle: &ResourceBundle) -> Result<()> {
        bundle.validate()?;
        self.run("update bundle", |tx| update_all(tx, bundle)).await?;
        info!(
            backend = bundle.backend.as_ref().map(|b| b.name.as_str()),
            frontend = bundle.frontend.as_ref().map(|f| f.name.as_str()),
            "bundle updated"
        );
        Ok(())
    }

    /// Delete every object of the bundle in one transaction, in reverse creation order.
    ///
    /// ACLs that are already gone are skipped.
    pub async fn delete_bundle(&self, bundle: &ResourceBundle) -> Result<()> {
        bundle.validate()?;
        self.run("delete bundle", |tx| delete_all(tx, bundle)).await?;
        info!(
            backend = bundle.backend.as_ref().map(|b| b.name.as_str()),
            frontend = bundle.frontend.as_ref().map(|f| f.name.as_str()),
            "bundle deleted"
        );
        Ok(())
    }

    /// Read the committed state of a backend and a frontend together with their children.
    pub async fn read_bundle(
        &self,
        backend: Option<&str>,
        frontend: Option<&str>,
    ) -> Result<ResourceBundle> {
        let mut bundle = ResourceBundle::default();

        if let Some(name) = backend {
            bundle.backend = self
                .connection
                .get(ParentScope::Root, &ResourceKey::Name(name.to_string()))
                .await?;
            if bundle.backend.is_some() {
                bundle.servers = self.connection.list(ParentScope::Backend(name)).await?;
            }
        }
        if let Some(name) = frontend {
            bundle.frontend = self
                .connection
                .get(ParentScope::Root, &ResourceKey::Name(name.to_string()))
                .await?;
            if bundle.frontend.is_some() {
                bundle.acls = self.connection.list(ParentScope::Frontend(name)).await?;
            }
        }

        Ok(bundle)
    }
}

async fn create_all(tx: TransactionScope, bundle: &ResourceBundle) -> Result<()> {
    if let Some(backend) = &bundle.backend {
        tx.create(ParentScope::Root, backend).await?;
    }
    for server in &bundle.servers {
        tx.create(bundle.backend_scope(), server).await?;
    }
    if let Some(frontend) = &bundle.frontend {
        tx.create(ParentScope::Root, frontend).await?;
    }
    bundle.create_acls(&tx).await
}

async fn update_all(tx: TransactionScope, bundle: &ResourceBundle) -> Result<()> {
    if let Some(backend) = &bundle.backend {
        tx.replace(ParentScope::Root, backend).await?;
    }
    for server in &bundle.servers {
        replace_or_create(&tx, bundle.backend_scope(), server).await?;
    }
    if let Some(frontend) = &bundle.frontend {
        tx.replace(ParentScope::Root, frontend).await?;

        // Positions shift on delete, so remove from the end.
        let mut existing: Vec<Acl> = tx.list(bundle.frontend_scope()).await?;
        existing.sort_by_key(|acl| std::cmp::Reverse(acl.index));
        for acl in &existing {
            delete_if_present::<Acl>(&tx, bundle.frontend_scope(), &acl.key()).await?;
        }
        bundle.create_acls(&tx).await?;
    }
    Ok(())
}

async fn delete_all(tx: TransactionScope, bundle: &ResourceBundle) -> Result<()> {
    for acl in bundle.positioned_acls().iter().rev() {
        delete_if_present::<Acl>(&tx, bundle.frontend_scope(), &acl.key()).await?;
    }
    if let Some(frontend) = &bundle.frontend {
        tx.delete::<Frontend>(ParentScope::Root, &frontend.key())
            .await?;
    }
    for server in bundle.servers.iter().rev() {
        tx.delete::<Server>(bundle.backend_scope(), &server.key())
            .await?;
    }
    if let Some(backend) = &bundle.backend {
        tx.delete::<Backend>(ParentScope::Root, &backend.key())
            .await?;
    }
    Ok(())
}

async fn replace_or_create<R: Resource>(
    tx: &TransactionScope,
    parent: ParentScope<'_>,
    resource: &R,
) -> Result<()> {
    match tx.replace(parent, resource).await {
        Err(err) if err.is_not_found() => {
            debug!(resource = %resource.label(), "not present yet, creating");
            tx.create(parent, resource).await
        }
        other => other,
    }
}

async fn delete_if_present<R: Resource>(
    tx: &TransactionScope,
    parent: ParentScope<'_>,
    key: &ResourceKey,
) -> Result<()> {
    match tx.delete::<R>(parent, key).await {
        Err(err) if err.is_not_found() => {
            debug!(kind = R::KIND, key = %key, parent = %parent, "already gone");
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_requires_parents() {
        let orphan_servers = ResourceBundle {
            servers: vec![Server {
                name: "s1".into(),
                ..Server::default()
            }],
            ..ResourceBundle::default()
        };
        assert!(matches!(orphan_servers.validate(), Err(Error::InvalidConfig(_))));

        let orphan_acls = ResourceBundle {
            acls: vec![Acl::default()],
            ..ResourceBundle::default()
        };
        assert!(matches!(orphan_acls.validate(), Err(Error::InvalidConfig(_))));

        assert!(ResourceBundle::default().validate().is_ok());
    }

    #[test]
    fn acl_positions_follow_bundle_order() {
        let bundle = ResourceBundle {
            frontend: Some(Frontend {
                name: "fe".into(),
                ..Frontend::default()
            }),
            acls: vec![
                Acl {
                    index: 7,
                    acl_name: "a".into(),
                    ..Acl::default()
                },
                Acl {
                    index: 7,
                    acl_name: "b".into(),
                    ..Acl::default()
                },
            ],
            ..ResourceBundle::default()
        };
        let indexes: Vec<i64> = bundle.positioned_acls().iter().map(|a| a.index).collect();
        assert_eq!(indexes, vec![0, 1]);
    }
}
