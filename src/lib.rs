//! A DB-API style client for the Cloud Spanner database.
//!
//! # Example
//!
//! ```no_run
//! use spanner_dbapi::{params, Credentials, Error};
//!
//! fn main() -> Result<(), Error> {
//!     let connection = spanner_dbapi::connect(
//!         "my-instance",
//!         "my-database",
//!         Some("my-gcp-project"),
//!         Credentials::Default,
//!         None,
//!     )?;
//!     let mut cursor = connection.cursor()?;
//!
//!     // assuming the following table:
//!     //   person(id INT64, name STRING(MAX), data BYTES(MAX))
//!     cursor.execute(
//!         "INSERT INTO person (id, name, data) VALUES (%s, %s, NULL), (%s, %s, NULL)",
//!         params![42, "ferris", 43, "corro"],
//!     )?;
//!     assert_eq!(cursor.rowcount(), 2);
//!
//!     cursor.execute("SELECT id, name FROM person WHERE id > %s", params![0])?;
//!     for row in cursor.fetchall()? {
//!         let id: i64 = row.get(0)?;
//!         let name: &str = row.get_by_name("name")?;
//!         println!("found person: {} {}", id, name);
//!     }
//!
//!     connection.commit()
//! }
//! ```
//!
//! # Statements
//!
//! Statements use the `format` parameter style: `%s` placeholders bound to [`Params::Positional`]
//! values, or `%(name)s` placeholders bound to [`Params::Named`] values. They are translated into
//! Cloud Spanner's named parameters before being sent.
//!
//! * queries (`SELECT`, `WITH`) stream their rows back through the cursor;
//! * DML (`INSERT`, `UPDATE`, `DELETE`) report the number of modified rows in [`Cursor::rowcount`].
//!   An `INSERT` with several rows is executed as one statement per row, and unqualified `UPDATE`
//!   and `DELETE` statements are given a `WHERE 1=1` clause as Cloud Spanner requires one;
//! * DDL (`CREATE`, `ALTER`, `DROP`) is deferred and applied as a single schema update before the
//!   next statement of another kind, or on commit.
//!
//! # Transactions
//!
//! Outside of autocommit mode, a connection runs its statements in a read/write transaction until
//! [`Connection::commit`] or [`Connection::rollback`] is called.
//!
//! Cloud Spanner may abort a read/write transaction at any time, in which case the connection
//! replays every statement of the transaction in a new one. The replay is transparent as long as
//! each statement observes the same results as it did originally, which is verified with a
//! checksum of the results the application has seen. When results differ, the transaction is
//! rolled back and [`Error::RetryAborted`] is returned.
//!
//! ## Authentication
//!
//! Authentication uses the [`gcp_auth`] crate which supports several authentication methods.
//! When the `SPANNER_EMULATOR_HOST` environment variable is set, connections go to the emulator.

pub use crate::auth::Credentials;
pub use crate::backend::*;
pub use crate::checksum::ResultsChecksum;
pub use crate::config::*;
pub use crate::connection::{ColumnDetails, Connection};
pub use crate::cursor::{Column, Cursor, UNSET_COUNT};
pub use crate::dbapi::*;
pub use crate::error::{Error, ErrorKind};
pub use crate::from_spanner::*;
pub use crate::params::*;
pub use crate::parser::{parse_values, Args, ValueTree, Values};
pub use crate::resource::*;
pub use crate::result_set::*;
pub use crate::rewrite::{
    backtick_unicode, classify, ensure_where_clause, escape_name, rewrite, rewrite_insert,
    sanitize, strip_backticks, Classify, DefaultClassifier, StatementKind,
};
pub use crate::session::Session;
pub use crate::statement::*;
pub use crate::telemetry::{Event, Observer};
pub use crate::to_spanner::*;
pub use crate::transaction::{Transaction, TransactionMode, TransactionSelector, TimestampBound};
pub use crate::types::*;
pub use crate::value::*;

mod auth;
mod backend;
mod checksum;
mod config;
mod connection;
mod cursor;
mod database;
mod dbapi;
mod error;
mod from_spanner;
mod params;
mod parser;
mod resource;
mod result_set;
mod rewrite;
mod session;
mod statement;
mod telemetry;
mod to_spanner;
mod transaction;
mod types;
mod value;

/// Connects to `database_id` in `instance_id`, see [`Config`] for more options.
///
/// The project defaults to the one of the environment, see [`ConfigBuilder::project`].
pub fn connect(
    instance_id: &str,
    database_id: &str,
    project: Option<&str>,
    credentials: Credentials,
    user_agent: Option<&str>,
) -> Result<Connection, Error> {
    let mut builder = Config::builder()
        .instance(instance_id)
        .database(database_id)
        .credentials(credentials);
    if let Some(project) = project {
        builder = builder.project(project);
    }
    if let Some(user_agent) = user_agent {
        builder = builder.user_agent(user_agent);
    }
    builder.connect()
}
