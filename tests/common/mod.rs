use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use ctor::ctor;
use futures::StreamExt;
use spanner_dbapi::{
    Backend, ChunkStream, Config, ConfigBuilder, Connection, Credentials, DatabaseId, Error,
    InstanceId, ResultChunk, Session, Statement, StructType, Transaction, TransactionMode,
    TransactionSelector, Type, Value,
};

#[ctor]
fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// The RPCs a failure can be injected into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(dead_code)]
pub enum Rpc {
    BeginTransaction,
    Commit,
    Rollback,
    ExecuteStreamingSql,
    ExecuteUpdate,
    UpdateDdl,
}

/// The rows returned by one execution of a query.
#[derive(Clone, Debug)]
pub struct Script {
    row_type: StructType,
    rows: Vec<Vec<Value>>,
    abort_after: Option<usize>,
}

#[allow(dead_code)]
impl Script {
    pub fn new(row_type: StructType, rows: Vec<Vec<Value>>) -> Self {
        Self {
            row_type,
            rows,
            abort_after: None,
        }
    }

    /// A single `INT64` column.
    pub fn ints(column: &str, values: &[i64]) -> Self {
        Self::new(
            StructType::new(vec![(column, Type::Int64)]),
            values.iter().map(|value| vec![Value::Int64(*value)]).collect(),
        )
    }

    /// Streams `rows` rows, then fails as if the server aborted the transaction.
    pub fn abort_after(mut self, rows: usize) -> Self {
        self.abort_after = Some(rows);
        self
    }

    fn into_stream(self) -> ChunkStream {
        let limit = self.abort_after.unwrap_or(self.rows.len());
        let mut chunks = vec![Ok(ResultChunk::new(Some(self.row_type), Vec::new()))];
        chunks.extend(
            self.rows
                .into_iter()
                .take(limit)
                .map(|row| Ok(ResultChunk::new(None, vec![row]))),
        );
        if self.abort_after.is_some() {
            chunks.push(Err(aborted()));
        }
        futures::stream::iter(chunks).boxed()
    }
}

#[allow(dead_code)]
pub fn aborted() -> Error {
    Error::Aborted {
        message: "Transaction was aborted.".to_string(),
        retry_delay: None,
    }
}

#[derive(Default)]
struct State {
    queries: HashMap<String, VecDeque<Script>>,
    updates: HashMap<String, VecDeque<i64>>,
    failures: HashMap<Rpc, VecDeque<Error>>,
    calls: Vec<String>,
    statements: Vec<Statement>,
    ddl: Vec<Vec<String>>,
    sessions: usize,
    transactions: usize,
}

impl State {
    fn fail(&mut self, rpc: Rpc) -> Result<(), Error> {
        match self.failures.get_mut(&rpc).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// Scripted responses are consumed in order, the last one is repeated.
fn next_response<T: Clone>(responses: Option<&mut VecDeque<T>>) -> Option<T> {
    let responses = responses?;
    if responses.len() > 1 {
        responses.pop_front()
    } else {
        responses.front().cloned()
    }
}

/// A scripted, in-memory stand-in for Cloud Spanner.
///
/// Every RPC is recorded in [`FakeBackend::calls`], e.g. `begin`, `query SELECT 1`, `commit`.
/// Clones share their state so that tests can keep scripting a backend handed to a connection.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<State>>,
}

#[allow(dead_code)]
impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn on_query(&self, sql: &str, script: Script) -> &Self {
        self.state()
            .queries
            .entry(sql.to_string())
            .or_default()
            .push_back(script);
        self
    }

    pub fn on_update(&self, sql: &str, count: i64) -> &Self {
        self.state()
            .updates
            .entry(sql.to_string())
            .or_default()
            .push_back(count);
        self
    }

    /// Fails the next call to `rpc` with `err`; queued failures are used in order.
    pub fn fail_next(&self, rpc: Rpc, err: Error) -> &Self {
        self.state()
            .failures
            .entry(rpc)
            .or_default()
            .push_back(err);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// The statements executed so far, queries and DML alike.
    pub fn statements(&self) -> Vec<Statement> {
        self.state().statements.clone()
    }

    /// The DDL batches applied so far.
    pub fn ddl(&self) -> Vec<Vec<String>> {
        self.state().ddl.clone()
    }

    pub fn sessions(&self) -> usize {
        self.state().sessions
    }

    /// A connection using this backend, with a short replay backoff.
    pub fn connect(&self) -> Connection {
        self.config().connect().unwrap()
    }

    pub fn config(&self) -> ConfigBuilder {
        Config::builder()
            .project("test-project")
            .instance("test-instance")
            .database("test-database")
            .credentials(Credentials::None)
            .replay_backoff(Duration::from_millis(1))
            .backend(Box::new(self.clone()))
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn instance_exists(&mut self, instance: &InstanceId) -> Result<bool, Error> {
        Ok(instance.project() == "test-project")
    }

    async fn database_exists(&mut self, database: &DatabaseId) -> Result<bool, Error> {
        Ok(database.to_string().ends_with("/databases/test-database"))
    }

    async fn create_session(&mut self, database: &DatabaseId) -> Result<Session, Error> {
        let mut state = self.state();
        state.sessions += 1;
        Ok(Session::new(format!(
            "{}/sessions/{}",
            database, state.sessions
        )))
    }

    async fn begin_transaction(
        &mut self,
        _session: &Session,
        mode: &TransactionMode,
    ) -> Result<Transaction, Error> {
        let mut state = self.state();
        state.calls.push(match mode {
            TransactionMode::ReadWrite => "begin".to_string(),
            TransactionMode::ReadOnly(_) => "begin read-only".to_string(),
        });
        state.fail(Rpc::BeginTransaction)?;
        state.transactions += 1;
        Ok(Transaction::new(state.transactions.to_be_bytes().to_vec()))
    }

    async fn commit(&mut self, _session: &Session, _transaction: &Transaction) -> Result<(), Error> {
        let mut state = self.state();
        state.calls.push("commit".to_string());
        state.fail(Rpc::Commit)
    }

    async fn rollback(
        &mut self,
        _session: &Session,
        _transaction: &Transaction,
    ) -> Result<(), Error> {
        let mut state = self.state();
        state.calls.push("rollback".to_string());
        state.fail(Rpc::Rollback)
    }

    async fn execute_streaming_sql(
        &mut self,
        _session: &Session,
        selector: &TransactionSelector,
        statement: &Statement,
    ) -> Result<ChunkStream, Error> {
        let mut state = self.state();
        let call = match selector {
            TransactionSelector::SingleUse(_) => "snapshot",
            TransactionSelector::Id(_) => "query",
        };
        state.calls.push(format!("{} {}", call, statement.sql));
        state.statements.push(statement.clone());
        state.fail(Rpc::ExecuteStreamingSql)?;
        next_response(state.queries.get_mut(&statement.sql))
            .map(Script::into_stream)
            .ok_or_else(|| Error::Programming(format!("unexpected query: {}", statement.sql)))
    }

    async fn execute_update(
        &mut self,
        _session: &Session,
        _transaction: &Transaction,
        statement: &Statement,
        _seqno: i64,
    ) -> Result<i64, Error> {
        let mut state = self.state();
        state.calls.push(format!("update {}", statement.sql));
        state.statements.push(statement.clone());
        state.fail(Rpc::ExecuteUpdate)?;
        next_response(state.updates.get_mut(&statement.sql))
            .ok_or_else(|| Error::Programming(format!("unexpected statement: {}", statement.sql)))
    }

    async fn update_ddl(
        &mut self,
        _database: &DatabaseId,
        statements: &[String],
    ) -> Result<(), Error> {
        let mut state = self.state();
        state.calls.push("ddl".to_string());
        state.fail(Rpc::UpdateDdl)?;
        state.ddl.push(statements.to_vec());
        Ok(())
    }
}
