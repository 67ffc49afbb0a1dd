//! Server-side configuration transactions.
//!
//! A [`Transaction`] is terminated by [`Transaction::commit`] or [`Transaction::rollback`], both
//! of which take `self`, so each identifier gets at most one terminal request.

use std::future::Future;

use reqwest::Method;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::errors::{Error, Result};
use crate::redact::redact;
use crate::requests::{Location, TRANSACTIONS};
use crate::responses::{ResponseShape, TransactionInfo};

/// An open transaction.
#[derive(Debug)]
pub struct Transaction {
    connection: Connection,
    info: TransactionInfo,
    finished: bool,
}

/// Handle passed to work running inside a transaction.
///
/// It carries the transaction identifier but cannot commit or roll back.
#[derive(Clone, Debug)]
pub struct TransactionScope {
    connection: Connection,
    id: String,
}

impl TransactionScope {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

impl Transaction {
    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// The configuration version the transaction was opened against.
    pub fn version(&self) -> i64 {
        self.info.version
    }

    pub fn scope(&self) -> TransactionScope {
        TransactionScope {
            connection: self.connection.clone(),
            id: self.info.id.clone(),
        }
    }

    fn location(&self) -> Location {
        Location::new(format!("{}/{}", TRANSACTIONS, self.info.id))
    }

    /// Apply every staged change.
    ///
    /// If the commit is refused the transaction is rolled back before the commit error is
    /// returned; a failing rollback is only logged.
    pub async fn commit(mut self) -> Result<()> {
        self.finished = true;
        let location = self.location();

        match self.connection.write(Method::PUT, &location, None).await {
            Ok(()) => {
                info!(transaction = %self.info.id, version = self.info.version, "transaction committed");
                Ok(())
            }
            Err(err) => {
                self.discard(&err).await;
                Err(err)
            }
        }
    }

    /// Discard every staged change.
    pub async fn rollback(mut self) -> Result<()> {
        self.finished = true;
        let location = self.location();
        self.connection
            .detached()
            .write(Method::DELETE, &location, None)
            .await?;
        debug!(transaction = %self.info.id, "transaction rolled back");
        Ok(())
    }

    /// Roll back after `cause` and keep `cause` as the reported error.
    pub(crate) async fn rollback_after(self, cause: &Error) {
        let id = self.info.id.clone();
        if let Err(rollback_err) = self.rollback().await {
            warn!(
                transaction = %id,
                error = %redact(&cause.to_string()),
                rollback_error = %redact(&rollback_err.to_string()),
                "rollback failed after transaction error"
            );
        }
    }

    async fn discard(&self, cause: &Error) {
        let location = self.location();
        if let Err(rollback_err) = self
            .connection
            .detached()
            .write(Method::DELETE, &location, None)
            .await
        {
            warn!(
                transaction = %self.info.id,
                error = %redact(&cause.to_string()),
                rollback_error = %redact(&rollback_err.to_string()),
                "rollback failed after commit error"
            );
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                transaction = %self.info.id,
                "transaction dropped without commit or rollback"
            );
        }
    }
}

impl Connection {
    /// Open a transaction against the current configuration version.
    pub async fn begin(&self) -> Result<Transaction> {
        let version = self.configuration_version().await?;
        let location = Location::new(TRANSACTIONS).with_query("version", version);
        let response = self.send(Method::POST, &location, None).await?.success()?;
        let info: TransactionInfo = ResponseShape::Bare.decode(&response.body)?;

        debug!(transaction = %info.id, version = info.version, "transaction started");
        Ok(Transaction {
            connection: self.clone(),
            info,
            finished: false,
        })
    }

    /// Run `work` inside a fresh transaction.
    ///
    /// Commits when `work` succeeds. When it fails, the transaction is rolled back and the
    /// error from `work` is returned even if the rollback fails too.
    ///
    /// # Examples
    /// ```no_run
    /// # async fn run() -> haptik_dataplane::errors::Result<()> {
    /// use haptik_dataplane::ConnectionBuilder;
    /// use haptik_dataplane::models::Backend;
    /// use haptik_dataplane::requests::ParentScope;
    ///
    /// let connection = ConnectionBuilder::from_env()?.connect()?;
    /// let backend = Backend { name: "be_app".into(), ..Backend::default() };
    /// connection
    ///     .run_in_transaction(|tx| async move { tx.create(ParentScope::Root, &backend).await })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run_in_transaction<F, Fut, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce(TransactionScope) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let transaction = self.begin().await?;
        match work(transaction.scope()).await {
            Ok(value) => {
                transaction.commit().await?;
                Ok(value)
            }
            Err(err) => {
                transaction.rollback_after(&err).await;
                Err(err)
            }
        }
    }
}
