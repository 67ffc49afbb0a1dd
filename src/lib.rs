//! Manage HAProxy configuration through the Data Plane API.
//!
//! Every change goes through a server-side transaction. Related objects (a backend, its servers,
//! a frontend and its ACLs) are applied together by an [`Orchestrator`], which starts over in a
//! fresh transaction when a concurrent writer changed the configuration first.
//!
//! # Examples
//! ```no_run
//! # async fn run() -> haptik_dataplane::errors::Result<()> {
//! use haptik_dataplane::{ConnectionBuilder, Orchestrator, ResourceBundle};
//! use haptik_dataplane::models::{Acl, Backend, Frontend};
//!
//! let connection = ConnectionBuilder::new("http://127.0.0.1:5555")
//!     .credentials("admin", "adminpwd")
//!     .connect()?;
//! let orchestrator = Orchestrator::new(connection);
//!
//! let bundle = ResourceBundle {
//!     backend: Some(Backend { name: "be_api".into(), ..Backend::default() }),
//!     frontend: Some(Frontend { name: "fe_main".into(), ..Frontend::default() }),
//!     acls: vec![Acl {
//!         acl_name: "is_api".into(),
//!         criterion: "path_beg".into(),
//!         value: Some("/api".into()),
//!         ..Acl::default()
//!     }],
//!     ..ResourceBundle::default()
//! };
//! orchestrator.create_bundle(&bundle).await?;
//! # Ok(())
//! # }
//! ```

pub mod bundle;
pub mod classify;
mod connection;
pub mod errors;
pub mod models;
pub mod redact;
pub mod requests;
pub mod resources;
pub mod responses;
pub mod retry;
pub mod transaction;

pub use bundle::{Orchestrator, ResourceBundle};
pub use connection::{Connection, ConnectionBuilder, Credentials};
pub use connection::{
    ENV_API_VERSION, ENV_INSECURE, ENV_PASSWORD, ENV_TIMEOUT_SECS, ENV_URL, ENV_USERNAME,
};
pub use errors::{Error, ErrorKind, Result};
pub use retry::RetryPolicy;
pub use transaction::{Transaction, TransactionScope};
