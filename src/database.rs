use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use once_cell::sync::Lazy;
use tokio::runtime::Runtime;

use crate::result_set::{Row, StreamedResultSet};
use crate::session::{PooledSession, SessionManager, SessionPool};
use crate::telemetry::Telemetry;
use crate::{
    Backend, Config, DatabaseId, Error, GrpcBackend, InstanceId, Session, SpannerResource,
    Statement, Transaction, TransactionMode, TransactionSelector,
};

// Databases opened with the default transport, keyed by project, instance, database and endpoint.
static SHARED: Lazy<Mutex<HashMap<String, Weak<Database>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// A Cloud Spanner database along with the runtime, transport and session pool used to reach it.
///
/// Every RPC is bounded by the operation timeout and reported to the telemetry observer. When
/// shared, the transport settings are those of the first connection that opened the database.
pub(crate) struct Database {
    id: DatabaseId,
    backend: Box<dyn Backend>,
    pool: SessionPool,
    operation_timeout: Duration,
    telemetry: Telemetry,
    // dropped last: the pool and backend may hold resources bound to it
    runtime: Runtime,
}

impl Database {
    /// Opens the database described by `config`, reusing an already opened one when possible.
    pub(crate) fn shared(config: &Config) -> Result<Arc<Self>, Error> {
        if config.backend.is_some() {
            return Ok(Arc::new(Self::open(config)?));
        }

        let key = format!(
            "{}|{}|{}|{}",
            config.project.as_deref().unwrap_or_default(),
            config.instance,
            config.database,
            config.endpoint.as_deref().unwrap_or_default()
        );
        let mut shared = SHARED
            .lock()
            .map_err(|_| Error::Internal("database registry is poisoned".to_string()))?;
        if let Some(database) = shared.get(&key).and_then(Weak::upgrade) {
            log::debug!("reusing database {}", database.id);
            return Ok(database);
        }
        let database = Arc::new(Self::open(config)?);
        shared.retain(|_, database| database.strong_count() > 0);
        shared.insert(key, Arc::downgrade(&database));
        Ok(database)
    }

    fn open(config: &Config) -> Result<Self, Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|err| Error::Operational(format!("unable to start runtime: {}", err)))?;

        let telemetry = Telemetry::new(config.observer.clone());
        let (id, backend, pool) = runtime.block_on(async {
            // a custom transport with an explicit project needs no credentials
            let auth = match (&config.backend, &config.project) {
                (Some(_), Some(_)) => None,
                _ => config.credentials.manager().await?,
            };
            let project = match &config.project {
                Some(project) => project.clone(),
                None => match std::env::var("GOOGLE_CLOUD_PROJECT") {
                    Ok(project) => project,
                    Err(_) => match &auth {
                        Some(auth) => auth.project_id().await.map_err(|err| {
                            Error::Config(format!("unable to determine project: {}", err))
                        })?,
                        None => return Err(Error::Config("missing project".to_string())),
                    },
                },
            };
            let instance = InstanceId::new(&project, &config.instance);
            let id = DatabaseId::new(instance.clone(), &config.database);

            let mut backend = match &config.backend {
                Some(backend) => dyn_clone::clone_box(&**backend),
                None => {
                    let endpoint = config
                        .endpoint
                        .clone()
                        .or_else(|| {
                            std::env::var("SPANNER_EMULATOR_HOST")
                                .ok()
                                .map(|host| format!("http://{}", host))
                        });
                    Box::new(GrpcBackend::connect(endpoint, auth, &config.user_agent).await?)
                        as Box<dyn Backend>
                }
            };

            if !backend.instance_exists(&instance).await? {
                return Err(Error::Database(format!(
                    "instance {} does not exist",
                    instance.id()
                )));
            }
            if !backend.database_exists(&id).await? {
                return Err(Error::Database(format!("database {} does not exist", id)));
            }

            let manager = SessionManager::new(dyn_clone::clone_box(&*backend), id.clone());
            let pool = SessionPool::new(manager, config.pool_size, config.checkout_timeout);
            Ok((id, backend, pool))
        })?;

        log::debug!("opened database {}", id);
        Ok(Self {
            id,
            backend,
            pool,
            operation_timeout: config.operation_timeout,
            telemetry,
            runtime,
        })
    }

    /// Drives `future` to completion on this database's runtime.
    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Enters the runtime's context, which sessions must be returned to the pool from.
    pub(crate) fn enter(&self) -> tokio::runtime::EnterGuard<'_> {
        self.runtime.enter()
    }

    fn backend(&self) -> Box<dyn Backend> {
        dyn_clone::clone_box(&*self.backend)
    }

    async fn run<T, F>(&self, name: &'static str, sql: Option<&str>, rpc: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        let started = self.telemetry.start();
        let result = match tokio::time::timeout(self.operation_timeout, rpc).await {
            Ok(result) => result,
            Err(elapsed) => Err(elapsed.into()),
        };
        self.telemetry.record(name, sql, started, &result);
        result
    }

    pub(crate) async fn checkout(&self) -> Result<PooledSession, Error> {
        self.pool.checkout().await
    }

    pub(crate) async fn begin_transaction(
        &self,
        session: &Session,
        mode: &TransactionMode,
    ) -> Result<Transaction, Error> {
        let mut backend = self.backend();
        self.run(
            "CloudSpanner.BeginTransaction",
            None,
            backend.begin_transaction(session, mode),
        )
        .await
    }

    pub(crate) async fn commit(
        &self,
        session: &Session,
        transaction: &Transaction,
    ) -> Result<(), Error> {
        let mut backend = self.backend();
        self.run("CloudSpanner.Commit", None, backend.commit(session, transaction))
            .await
    }

    pub(crate) async fn rollback(
        &self,
        session: &Session,
        transaction: &Transaction,
    ) -> Result<(), Error> {
        let mut backend = self.backend();
        self.run(
            "CloudSpanner.Rollback",
            None,
            backend.rollback(session, transaction),
        )
        .await
    }

    /// Starts a query and peeks its first row so that server errors, and the row type, are known
    /// before returning.
    pub(crate) async fn query(
        &self,
        session: &Session,
        selector: &TransactionSelector,
        statement: &Statement,
    ) -> Result<StreamedResultSet, Error> {
        let mut backend = self.backend();
        self.run(
            "CloudSpanner.ExecuteStreamingSql",
            Some(&statement.sql),
            async {
                let chunks = backend
                    .execute_streaming_sql(session, selector, statement)
                    .await?;
                let mut stream = StreamedResultSet::new(chunks);
                stream.peek().await?;
                Ok(stream)
            },
        )
        .await
    }

    pub(crate) async fn next_row(&self, stream: &mut StreamedResultSet) -> Result<Option<Row>, Error> {
        match tokio::time::timeout(self.operation_timeout, stream.next()).await {
            Ok(row) => row,
            Err(elapsed) => Err(elapsed.into()),
        }
    }

    pub(crate) async fn execute_update(
        &self,
        session: &Session,
        transaction: &Transaction,
        statement: &Statement,
        seqno: i64,
    ) -> Result<i64, Error> {
        let mut backend = self.backend();
        self.run(
            "CloudSpanner.ExecuteUpdate",
            Some(&statement.sql),
            backend.execute_update(session, transaction, statement, seqno),
        )
        .await
    }

    pub(crate) async fn update_ddl(&self, statements: &[String]) -> Result<(), Error> {
        let mut backend = self.backend();
        let sql = statements.join(";\n");
        log::debug!("applying {} DDL statements", statements.len());
        self.run(
            "CloudSpanner.UpdateDdl",
            Some(&sql),
            backend.update_ddl(&self.id, statements),
        )
        .await
    }
}
