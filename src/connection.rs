use std::cell::{RefCell, RefMut};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::cursor::{self, CursorState, Rows};
use crate::database::Database;
use crate::rewrite::{rewrite, Classify, StatementKind};
use crate::transaction::{ActiveTransaction, Handover, QuerySink, ReplayPolicy};
use crate::{
    named_params, Config, Cursor, Error, Params, Row, Statement, TimestampBound, TransactionMode,
    TransactionSelector,
};

const AUTOCOMMIT_MODE_WARNING: &str = "this method is non-operational in autocommit mode";

const LIST_TABLES: &str = "SELECT t.table_name FROM information_schema.tables AS t \
    WHERE t.table_catalog = '' AND t.table_schema = ''";

const TABLE_COLUMN_SCHEMA: &str = "SELECT COLUMN_NAME, IS_NULLABLE, SPANNER_TYPE \
    FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_SCHEMA = '' AND TABLE_NAME = @table_name";

/// Nullability and type of a column, see [`Connection::get_table_column_schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDetails {
    pub null_ok: bool,
    /// The column's type as declared in the schema, e.g. `STRING(MAX)`.
    pub spanner_type: String,
}

struct Options {
    autocommit: bool,
    read_only: bool,
    staleness: TimestampBound,
    classifier: Arc<dyn Classify>,
    policy: ReplayPolicy,
}

impl From<&Config> for Options {
    fn from(config: &Config) -> Self {
        Self {
            autocommit: config.autocommit,
            read_only: config.read_only,
            staleness: config.staleness.clone(),
            classifier: config.classifier.clone(),
            policy: ReplayPolicy {
                max_attempts: config.max_replay_attempts,
                backoff: config.replay_backoff,
            },
        }
    }
}

struct ConnectionState {
    closed: bool,
    options: Options,
    transaction: Option<ActiveTransaction>,
    pending_ddl: Vec<String>,
    cursors: Vec<Weak<RefCell<CursorState>>>,
    statements: u64,
}

/// A DB-API connection to a Cloud Spanner database.
///
/// Outside of autocommit mode, statements run in a read/write transaction (or a read-only one, see
/// [`Connection::set_read_only`]) begun by the first statement and ended by [`Connection::commit`]
/// or [`Connection::rollback`]. When Cloud Spanner aborts the transaction, it is replayed
/// transparently as long as every statement observes the same results as it did the first time.
///
/// In autocommit mode, queries read from a single-use snapshot and DML statements are committed as
/// they are executed.
///
/// Connections are not `Send`; open one connection per thread. Connections to the same database
/// share their session pool.
pub struct Connection {
    database: Arc<Database>,
    state: RefCell<ConnectionState>,
}

impl Connection {
    pub(crate) fn open(config: Config) -> Result<Self, Error> {
        let database = Database::shared(&config)?;
        Ok(Self {
            database,
            state: RefCell::new(ConnectionState {
                closed: false,
                options: Options::from(&config),
                transaction: None,
                pending_ddl: Vec::new(),
                cursors: Vec::new(),
                statements: 0,
            }),
        })
    }

    pub(crate) fn database(&self) -> &Database {
        &self.database
    }

    pub(crate) fn check_open(&self) -> Result<(), Error> {
        if self.state.borrow().closed {
            Err(Error::closed("connection"))
        } else {
            Ok(())
        }
    }

    // A live connection, borrowed for the duration of one operation.
    fn open_state(&self) -> Result<RefMut<'_, ConnectionState>, Error> {
        let state = self.state.borrow_mut();
        if state.closed {
            Err(Error::closed("connection"))
        } else {
            Ok(state)
        }
    }

    pub fn cursor(&self) -> Result<Cursor<'_>, Error> {
        let mut state = self.open_state()?;
        let cursor = Cursor::new(self);
        state.cursors.retain(|cursor| cursor.strong_count() > 0);
        state.cursors.push(Rc::downgrade(cursor.state()));
        Ok(cursor)
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    pub fn autocommit(&self) -> bool {
        self.state.borrow().options.autocommit
    }

    /// Changes the autocommit mode, committing the transaction in progress when turning it on.
    pub fn set_autocommit(&self, autocommit: bool) -> Result<(), Error> {
        self.check_open()?;
        if autocommit && !self.autocommit() {
            self.commit()?;
        }
        self.state.borrow_mut().options.autocommit = autocommit;
        Ok(())
    }

    pub fn read_only(&self) -> bool {
        self.state.borrow().options.read_only
    }

    /// Makes the following transactions read-only, reading at `staleness`.
    pub fn set_read_only(&self, read_only: bool) -> Result<(), Error> {
        let mut state = self.open_state()?;
        if state.transaction.is_some() {
            return Err(Error::Programming(
                "read-only mode cannot change while a transaction is in progress".to_string(),
            ));
        }
        state.options.read_only = read_only;
        Ok(())
    }

    pub fn staleness(&self) -> TimestampBound {
        self.state.borrow().options.staleness.clone()
    }

    pub fn set_staleness(&self, staleness: TimestampBound) -> Result<(), Error> {
        let mut state = self.open_state()?;
        if state.transaction.is_some() {
            return Err(Error::Programming(
                "staleness cannot change while a transaction is in progress".to_string(),
            ));
        }
        state.options.staleness = staleness;
        Ok(())
    }

    /// Applies the pending DDL statements, then commits the transaction in progress, if any.
    pub fn commit(&self) -> Result<(), Error> {
        self.check_open()?;
        if self.autocommit() {
            log::warn!("commit: {}", AUTOCOMMIT_MODE_WARNING);
            return Ok(());
        }
        self.flush_ddl()?;

        let mut state = self.state.borrow_mut();
        if state.transaction.is_none() {
            return Ok(());
        }
        let db = &*self.database;
        self.retrying(&mut state, |transaction| {
            db.block_on(transaction.commit(db))
        })?;
        self.finish(&mut state);
        Ok(())
    }

    /// Rolls back the transaction in progress, if any. Pending DDL statements are kept.
    pub fn rollback(&self) -> Result<(), Error> {
        self.check_open()?;
        if self.autocommit() {
            log::warn!("rollback: {}", AUTOCOMMIT_MODE_WARNING);
            return Ok(());
        }

        let mut state = self.state.borrow_mut();
        let result = match state.transaction.as_mut() {
            Some(transaction) => self.database.block_on(transaction.rollback(&self.database)),
            None => return Ok(()),
        };
        self.finish(&mut state);
        result
    }

    /// Closes every cursor of this connection and rolls back the transaction in progress.
    ///
    /// Any use of a closed connection, or of its cursors, fails with an interface error.
    pub fn close(&self) {
        let cursors = {
            let mut state = self.state.borrow_mut();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.cursors)
        };
        for cursor in cursors.iter().filter_map(Weak::upgrade) {
            cursor::close(&cursor, self);
        }

        let mut state = self.state.borrow_mut();
        state.pending_ddl.clear();
        if let Some(transaction) = state.transaction.as_mut() {
            if let Err(err) = self.database.block_on(transaction.rollback(&self.database)) {
                log::warn!("unable to roll back transaction on close: {}", err);
            }
        }
        self.finish(&mut state);
    }

    /// Runs `f`, then commits when it succeeds or rolls back when it fails, and closes the connection.
    pub fn scoped<T, F>(self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&Connection) -> Result<T, Error>,
    {
        let result = match f(&self) {
            Ok(value) if self.autocommit() => Ok(value),
            Ok(value) => self.commit().map(|_| value),
            Err(err) => {
                if !self.autocommit() {
                    if let Err(rollback) = self.rollback() {
                        log::warn!("unable to roll back transaction: {}", rollback);
                    }
                }
                Err(err)
            }
        };
        self.close();
        result
    }

    /// Runs a query in a single-use read-only snapshot, outside of the transaction in progress.
    ///
    /// Pending DDL statements are applied first. Some queries, e.g. against `INFORMATION_SCHEMA`,
    /// cannot run in read/write transactions.
    pub fn run_sql_in_snapshot(&self, sql: &str, params: impl Into<Params>) -> Result<Vec<Row>, Error> {
        self.check_open()?;
        self.flush_ddl()?;
        let statement = rewrite(sql, &params.into())?;
        let mut rows = self.snapshot(&statement)?;
        let db = &*self.database;
        let mut collected = Vec::new();
        let result = loop {
            match db.block_on(db.next_row(&mut rows.stream)) {
                Ok(Some(row)) => collected.push(row),
                Ok(None) => break Ok(collected),
                Err(err) => break Err(err),
            }
        };
        let _guard = db.enter();
        drop(rows);
        result
    }

    pub fn list_tables(&self) -> Result<Vec<String>, Error> {
        self.run_sql_in_snapshot(LIST_TABLES, Params::None)?
            .iter()
            .map(|row| row.get::<String>(0))
            .collect()
    }

    /// The columns of `table_name`, by name.
    pub fn get_table_column_schema(
        &self,
        table_name: &str,
    ) -> Result<BTreeMap<String, ColumnDetails>, Error> {
        self.run_sql_in_snapshot(TABLE_COLUMN_SCHEMA, named_params! { "table_name" => table_name })?
            .iter()
            .map(|row| {
                let name = row.get::<String>(0)?;
                let details = ColumnDetails {
                    null_ok: row.get::<&str>(1)? == "YES",
                    spanner_type: row.get::<String>(2)?,
                };
                Ok((name, details))
            })
            .collect()
    }

    pub(crate) fn classify(&self, sql: &str) -> StatementKind {
        self.state.borrow().options.classifier.classify(sql)
    }

    pub(crate) fn next_statement_id(&self) -> u64 {
        let mut state = self.state.borrow_mut();
        state.statements += 1;
        state.statements
    }

    /// Defers a DDL statement until the next statement of another kind, or the next commit.
    /// In autocommit mode, the statement is applied right away.
    pub(crate) fn queue_ddl(&self, sql: &str) -> Result<(), Error> {
        let statement = sql.trim().trim_end_matches(';').trim_end().to_string();
        let mut state = self.open_state()?;
        if state.options.autocommit {
            drop(state);
            let db = &*self.database;
            return db.block_on(db.update_ddl(&[statement]));
        }
        state.pending_ddl.push(statement);
        Ok(())
    }

    /// Applies the pending DDL statements in a single schema update.
    pub(crate) fn flush_ddl(&self) -> Result<(), Error> {
        let statements = std::mem::take(&mut self.open_state()?.pending_ddl);
        if statements.is_empty() {
            return Ok(());
        }
        log::debug!("applying {} pending DDL statements", statements.len());
        let db = &*self.database;
        db.block_on(db.update_ddl(&statements))
    }

    /// Runs a query, in the transaction in progress unless in autocommit mode.
    pub(crate) fn query(&self, statement: Statement, sink: QuerySink) -> Result<Rows, Error> {
        let mut state = self.open_state()?;
        if state.options.autocommit {
            drop(state);
            return self.snapshot(&statement);
        }

        self.begin(&mut state)?;
        let db = &*self.database;
        let stream = self.retrying(&mut state, |transaction| {
            db.block_on(transaction.query(db, &statement))
        })?;
        let checksum = in_progress(&mut state)?.record_query(statement, sink);
        Ok(Rows {
            stream,
            checksum: Some(checksum),
            session: None,
        })
    }

    /// Runs DML statements, returning the total number of modified rows.
    ///
    /// In autocommit mode the statements run in their own transaction, committed before returning.
    pub(crate) fn update(&self, statements: Vec<Statement>) -> Result<i64, Error> {
        let mut state = self.open_state()?;
        if state.options.read_only {
            return Err(Error::Programming(
                "DML statements are not allowed in read-only mode".to_string(),
            ));
        }

        self.begin(&mut state)?;
        let db = &*self.database;
        let mut total = 0;
        for statement in statements {
            let count = self.retrying(&mut state, |transaction| {
                db.block_on(transaction.update(db, &statement))
            })?;
            in_progress(&mut state)?.record_update(statement, count);
            total += count;
        }

        if state.options.autocommit {
            self.retrying(&mut state, |transaction| {
                db.block_on(transaction.commit(db))
            })?;
            self.finish(&mut state);
        }
        Ok(total)
    }

    /// Replays the transaction in progress after it was aborted while a cursor was reading from it.
    pub(crate) fn recover(&self, cause: Error) -> Result<(), Error> {
        let mut state = self.state.borrow_mut();
        let db = &*self.database;
        let replayed = match state.transaction.as_mut() {
            Some(transaction) => db.block_on(transaction.replay(db, cause, &mut 0)),
            None => return Err(cause),
        };
        match replayed {
            Ok(handovers) => {
                hand_over(handovers);
                Ok(())
            }
            Err(err) => {
                self.abandon(&mut state, &err);
                Err(err)
            }
        }
    }

    fn snapshot(&self, statement: &Statement) -> Result<Rows, Error> {
        let staleness = self.state.borrow().options.staleness.clone();
        let db = &*self.database;
        let session = db.block_on(db.checkout())?;
        let selector = TransactionSelector::SingleUse(staleness);
        let stream = match db.block_on(db.query(&session, &selector, statement)) {
            Ok(stream) => stream,
            Err(err) => {
                let _guard = db.enter();
                drop(session);
                return Err(err);
            }
        };
        Ok(Rows {
            stream,
            checksum: None,
            session: Some(session),
        })
    }

    fn begin(&self, state: &mut ConnectionState) -> Result<(), Error> {
        if state.transaction.is_some() {
            return Ok(());
        }
        let mode = if state.options.read_only {
            TransactionMode::ReadOnly(state.options.staleness.clone())
        } else {
            TransactionMode::ReadWrite
        };
        let db = &*self.database;
        let transaction = db.block_on(ActiveTransaction::begin(db, mode, state.options.policy))?;
        state.transaction = Some(transaction);
        Ok(())
    }

    /// Runs `attempt` against the transaction in progress, replaying the transaction and trying
    /// again when the server aborts it. Any other failure rolls the transaction back.
    fn retrying<T>(
        &self,
        state: &mut ConnectionState,
        mut attempt: impl FnMut(&mut ActiveTransaction) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let db = &*self.database;
        let mut attempts = 0;
        loop {
            let transaction = in_progress(state)?;
            let cause = match attempt(transaction) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => err,
                Err(err) => {
                    self.abandon(state, &err);
                    return Err(err);
                }
            };
            match db.block_on(transaction.replay(db, cause, &mut attempts)) {
                Ok(handovers) => hand_over(handovers),
                Err(err) => {
                    self.abandon(state, &err);
                    return Err(err);
                }
            }
        }
    }

    // Rolls back and forgets the transaction in progress, invalidating the cursors reading from it.
    fn abandon(&self, state: &mut ConnectionState, cause: &Error) {
        let mut transaction = match state.transaction.take() {
            Some(transaction) => transaction,
            None => return,
        };
        let db = &*self.database;
        if let Err(err) = db.block_on(transaction.rollback(db)) {
            log::warn!("unable to roll back transaction: {}", err);
        }
        if matches!(cause, Error::SessionNotFound(_)) {
            transaction.discard_session();
        }
        for sink in transaction.sinks() {
            if let Some(cursor) = sink.cursor.upgrade() {
                if let Ok(mut cursor) = cursor.try_borrow_mut() {
                    cursor.invalidate(sink.statement_id, cause);
                }
            }
        }
        let _guard = db.enter();
        drop(transaction);
    }

    // Forgets the transaction in progress, returning its session to the pool.
    fn finish(&self, state: &mut ConnectionState) {
        if let Some(transaction) = state.transaction.take() {
            let _guard = self.database.enter();
            drop(transaction);
        }
    }
}

fn in_progress(state: &mut ConnectionState) -> Result<&mut ActiveTransaction, Error> {
    state
        .transaction
        .as_mut()
        .ok_or_else(|| Error::Internal("no transaction in progress".to_string()))
}

fn hand_over(handovers: Vec<Handover>) {
    for Handover { sink, stream } in handovers {
        if let Some(cursor) = sink.cursor.upgrade() {
            let accepted = match cursor.try_borrow_mut() {
                Ok(mut cursor) => cursor.accept_replay(sink.statement_id, stream),
                Err(_) => false,
            };
            if !accepted {
                log::debug!("statement {} has no reader anymore", sink.statement_id);
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
