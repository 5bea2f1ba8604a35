use std::sync::Arc;
use std::time::Duration;

use derive_builder::Builder;

use crate::{
    Backend, Classify, Connection, Credentials, DefaultClassifier, Error, Observer, TimestampBound,
};

fn default_user_agent() -> String {
    format!("spanner-dbapi/{}", env!("CARGO_PKG_VERSION"))
}

/// Configuration of a [`Connection`].
///
/// ```no_run
/// # use spanner_dbapi::*;
/// # fn main() -> Result<(), Error> {
/// let connection = Config::builder()
///     .project("my-project")
///     .instance("my-instance")
///     .database("my-database")
///     .pool_size(4)
///     .autocommit(true)
///     .connect()?;
/// # Ok(()) }
/// ```
///
/// The project defaults to the `GOOGLE_CLOUD_PROJECT` environment variable, then to the project of
/// the discovered credentials. When `SPANNER_EMULATOR_HOST` is set and no endpoint is configured,
/// connections go to the emulator in plaintext.
#[derive(Builder, Clone)]
#[builder(pattern = "owned", build_fn(error = "crate::Error"))]
pub struct Config {
    #[builder(setter(into, strip_option), default)]
    pub(crate) project: Option<String>,

    #[builder(setter(into))]
    pub(crate) instance: String,

    #[builder(setter(into))]
    pub(crate) database: String,

    /// The gRPC endpoint, e.g. `http://localhost:9010` for a local emulator.
    #[builder(setter(into, strip_option), default)]
    pub(crate) endpoint: Option<String>,

    #[builder(default)]
    pub(crate) credentials: Credentials,

    #[builder(setter(into), default = "default_user_agent()")]
    pub(crate) user_agent: String,

    /// The maximum number of sessions pooled for the database.
    #[builder(default = "10")]
    pub(crate) pool_size: u32,

    /// How long to wait for a session when all of them are in use.
    #[builder(default = "Duration::from_secs(30)")]
    pub(crate) checkout_timeout: Duration,

    /// The deadline of each individual RPC.
    #[builder(default = "Duration::from_secs(60)")]
    pub(crate) operation_timeout: Duration,

    /// How many replays a single statement, fetch or commit may attempt before giving up.
    #[builder(default = "5")]
    pub(crate) max_replay_attempts: u32,

    /// The initial delay between replay attempts, doubled on each attempt.
    #[builder(default = "Duration::from_millis(100)")]
    pub(crate) replay_backoff: Duration,

    #[builder(default)]
    pub(crate) autocommit: bool,

    #[builder(default)]
    pub(crate) read_only: bool,

    /// The staleness of reads in read-only transactions and autocommit queries.
    #[builder(default)]
    pub(crate) staleness: TimestampBound,

    #[builder(default = "Arc::new(DefaultClassifier)")]
    pub(crate) classifier: Arc<dyn Classify>,

    #[builder(setter(strip_option), default)]
    pub(crate) observer: Option<Arc<dyn Observer>>,

    /// Replaces the gRPC transport. Connections using a custom backend never share their session pool.
    #[builder(setter(strip_option), default)]
    pub(crate) backend: Option<Box<dyn Backend>>,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn connect(self) -> Result<Connection, Error> {
        Connection::open(self)
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn database(&self) -> &str {
        &self.database
    }
}

impl ConfigBuilder {
    pub fn connect(self) -> Result<Connection, Error> {
        self.build()?.connect()
    }
}
