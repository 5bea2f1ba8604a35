use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use google_api_proto::google::spanner::v1 as proto;
use prost::Message;

use crate::connection::Connection;
use crate::result_set::{Row, StreamedResultSet};
use crate::rewrite::{ensure_where_clause, rewrite, rewrite_insert, StatementKind};
use crate::session::PooledSession;
use crate::transaction::{QuerySink, SharedChecksum};
use crate::{Error, Params, Type, TypeCode};

/// `rowcount` of a cursor that has not executed DML.
pub const UNSET_COUNT: i64 = -1;

/// One entry of [`Cursor::description`].
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub type_code: TypeCode,
    pub display_size: Option<usize>,
    /// The encoded size of the column's metadata, as received from the server.
    pub internal_size: Option<usize>,
    pub precision: Option<usize>,
    pub scale: Option<usize>,
    pub null_ok: Option<bool>,
}

impl Column {
    fn new(name: Option<&str>, tpe: &Type) -> Self {
        let field = proto::struct_type::Field {
            name: name.unwrap_or_default().to_string(),
            r#type: Some(tpe.into()),
        };
        Self {
            name: field.name.clone(),
            type_code: tpe.code(),
            display_size: tpe.code().display_size(),
            internal_size: Some(field.encoded_len()),
            precision: None,
            scale: None,
            null_ok: None,
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Column(name='{}', type_code={}", self.name, self.type_code.name())?;
        if let Some(display_size) = self.display_size {
            write!(f, ", display_size={}", display_size)?;
        }
        if let Some(internal_size) = self.internal_size {
            write!(f, ", internal_size={}", internal_size)?;
        }
        write!(f, ")")
    }
}

/// The rows produced by a query.
///
/// Rows read within a transaction feed the checksum the transaction recorded for the query.
/// Queries running outside of a transaction hold on to their session until the cursor moves on.
pub(crate) struct Rows {
    pub(crate) stream: StreamedResultSet,
    pub(crate) checksum: Option<SharedChecksum>,
    pub(crate) session: Option<PooledSession>,
}

enum Results {
    None,
    Rows(Rows),
    /// The transaction that produced the rows was abandoned.
    Invalidated { message: String, divergent: bool },
}

pub(crate) struct CursorState {
    closed: bool,
    statement_id: u64,
    results: Results,
    rowcount: i64,
    arraysize: usize,
}

impl CursorState {
    fn new() -> Self {
        Self {
            closed: false,
            statement_id: 0,
            results: Results::None,
            rowcount: UNSET_COUNT,
            arraysize: 1,
        }
    }

    /// Swaps in the stream of a replayed query, if this cursor is still reading that query's rows.
    pub(crate) fn accept_replay(&mut self, statement_id: u64, stream: StreamedResultSet) -> bool {
        if self.closed || self.statement_id != statement_id {
            return false;
        }
        match &mut self.results {
            Results::Rows(rows) => {
                rows.stream = stream;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn invalidate(&mut self, statement_id: u64, cause: &Error) {
        if self.statement_id == statement_id && matches!(self.results, Results::Rows(_)) {
            self.results = Results::Invalidated {
                message: cause.to_string(),
                divergent: matches!(cause, Error::RetryAborted(_)),
            };
        }
    }

    // Leaves the previous results to the caller, who decides where they are dropped.
    fn reset(&mut self, statement_id: u64) -> Results {
        self.statement_id = statement_id;
        self.rowcount = UNSET_COUNT;
        std::mem::replace(&mut self.results, Results::None)
    }
}

/// A DB-API cursor, executing statements and iterating over their results.
///
/// Fetching may transparently replay the connection's transaction when the server aborts it; rows
/// already returned are guaranteed to be the same in the replayed transaction, otherwise fetching
/// fails with [`Error::RetryAborted`].
pub struct Cursor<'conn> {
    connection: &'conn Connection,
    state: Rc<RefCell<CursorState>>,
}

impl<'conn> Cursor<'conn> {
    pub(crate) fn new(connection: &'conn Connection) -> Self {
        Self {
            connection,
            state: Rc::new(RefCell::new(CursorState::new())),
        }
    }

    pub(crate) fn state(&self) -> &Rc<RefCell<CursorState>> {
        &self.state
    }

    pub fn connection(&self) -> &'conn Connection {
        self.connection
    }

    fn check_open(&self) -> Result<(), Error> {
        self.connection.check_open()?;
        if self.state.borrow().closed {
            Err(Error::closed("cursor"))
        } else {
            Ok(())
        }
    }

    // Drops the current results, returning their session to the pool.
    fn start(&self) -> u64 {
        let statement_id = self.connection.next_statement_id();
        let previous = self.state.borrow_mut().reset(statement_id);
        let _guard = self.connection.database().enter();
        drop(previous);
        statement_id
    }

    /// Executes a single statement, see [`crate::Params`] for the supported placeholder styles.
    ///
    /// DDL statements are deferred until the next statement of another kind, or until the
    /// transaction commits, whichever happens first. DML statements set [`Cursor::rowcount`].
    pub fn execute(&mut self, sql: &str, params: impl Into<Params>) -> Result<(), Error> {
        self.check_open()?;
        let params = params.into();
        let statement_id = self.start();
        let connection = self.connection;

        let kind = connection.classify(sql);
        log::debug!("executing {:?} statement: {}", kind, sql);
        match kind {
            StatementKind::Ddl => connection.queue_ddl(sql),
            StatementKind::Query => {
                connection.flush_ddl()?;
                let statement = rewrite(sql, &params)?;
                let sink = QuerySink {
                    cursor: Rc::downgrade(&self.state),
                    statement_id,
                };
                let rows = connection.query(statement, sink)?;
                self.state.borrow_mut().results = Results::Rows(rows);
                Ok(())
            }
            StatementKind::Insert => {
                connection.flush_ddl()?;
                let count = connection.update(rewrite_insert(sql, &params)?)?;
                self.state.borrow_mut().rowcount = count;
                Ok(())
            }
            StatementKind::Update => {
                connection.flush_ddl()?;
                let sql = ensure_where_clause(sql)?;
                let count = connection.update(vec![rewrite(&sql, &params)?])?;
                self.state.borrow_mut().rowcount = count;
                Ok(())
            }
        }
    }

    /// Executes `sql` once for each set of parameters, in order.
    ///
    /// `rowcount` is the total number of rows modified across every execution.
    pub fn executemany<I, P>(&mut self, sql: &str, seq_of_params: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = P>,
        P: Into<Params>,
    {
        self.check_open()?;
        let mut total = None;
        for params in seq_of_params {
            self.execute(sql, params)?;
            let rowcount = self.rowcount();
            if rowcount != UNSET_COUNT {
                total = Some(total.unwrap_or(0) + rowcount);
            }
        }
        if let Some(total) = total {
            self.state.borrow_mut().rowcount = total;
        }
        Ok(())
    }

    pub fn fetchone(&mut self) -> Result<Option<Row>, Error> {
        self.check_open()?;
        self.next_row()
    }

    /// Fetches up to `size` rows, [`Cursor::arraysize`] when `None`.
    pub fn fetchmany(&mut self, size: Option<usize>) -> Result<Vec<Row>, Error> {
        self.check_open()?;
        let size = size.unwrap_or_else(|| self.arraysize());
        let mut rows = Vec::with_capacity(size);
        while rows.len() < size {
            match self.next_row()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    pub fn fetchall(&mut self) -> Result<Vec<Row>, Error> {
        self.check_open()?;
        let mut rows = Vec::new();
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    fn next_row(&mut self) -> Result<Option<Row>, Error> {
        let database = self.connection.database();
        loop {
            let cause = {
                let mut state = self.state.borrow_mut();
                let rows = match &mut state.results {
                    Results::Rows(rows) => rows,
                    Results::None => {
                        return Err(Error::Programming("no results to fetch".to_string()))
                    }
                    Results::Invalidated { message, divergent } => {
                        return Err(if *divergent {
                            Error::RetryAborted(message.clone())
                        } else {
                            Error::Operational(message.clone())
                        })
                    }
                };
                match database.block_on(database.next_row(&mut rows.stream)) {
                    Ok(Some(row)) => {
                        if let Some(checksum) = &rows.checksum {
                            checksum.borrow_mut().consume_row(row.values());
                        }
                        return Ok(Some(row));
                    }
                    Ok(None) => return Ok(None),
                    Err(err) if err.is_retryable() && rows.checksum.is_some() => err,
                    Err(err) => return Err(err),
                }
            };
            // the replay hands this cursor a new stream, positioned after the rows already read
            self.connection.recover(cause)?;
        }
    }

    /// Describes the columns of the current query's results, `None` when there are none.
    pub fn description(&self) -> Option<Vec<Column>> {
        let state = self.state.borrow();
        match &state.results {
            Results::Rows(rows) => rows.stream.metadata().map(|row_type| {
                row_type
                    .fields()
                    .iter()
                    .map(|(name, tpe)| Column::new(name.as_deref(), tpe))
                    .collect()
            }),
            _ => None,
        }
    }

    /// The number of rows modified by the last DML statement, [`UNSET_COUNT`] otherwise.
    pub fn rowcount(&self) -> i64 {
        self.state.borrow().rowcount
    }

    pub fn arraysize(&self) -> usize {
        self.state.borrow().arraysize
    }

    pub fn set_arraysize(&mut self, arraysize: usize) {
        self.state.borrow_mut().arraysize = arraysize;
    }

    /// Cloud Spanner has no row ids.
    pub fn lastrowid(&self) -> Option<i64> {
        None
    }

    pub fn setinputsizes(&mut self, _sizes: &[Option<usize>]) {}

    pub fn setoutputsize(&mut self, _size: usize, _column: Option<usize>) {}

    pub fn callproc(&mut self, name: &str, _params: impl Into<Params>) -> Result<(), Error> {
        Err(Error::NotSupported(format!(
            "stored procedures are not supported: {}",
            name
        )))
    }

    pub fn nextset(&mut self) -> Result<Option<bool>, Error> {
        Err(Error::NotSupported(
            "multiple result sets are not supported".to_string(),
        ))
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    /// Closes this cursor, releasing its results. Closing a closed cursor does nothing.
    pub fn close(&mut self) {
        close(&self.state, self.connection);
    }
}

pub(crate) fn close(state: &RefCell<CursorState>, connection: &Connection) {
    let previous = {
        let mut state = state.borrow_mut();
        state.closed = true;
        std::mem::replace(&mut state.results, Results::None)
    };
    let _guard = connection.database().enter();
    drop(previous);
}

impl Iterator for Cursor<'_> {
    type Item = Result<Row, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.fetchone().transpose()
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures::StreamExt;

    use crate::result_set::ResultChunk;
    use crate::single_column;

    fn rows(chunks: Vec<Result<ResultChunk, Error>>) -> Results {
        Results::Rows(Rows {
            stream: StreamedResultSet::new(futures::stream::iter(chunks).boxed()),
            checksum: None,
            session: None,
        })
    }

    #[test]
    fn test_column_description() {
        let column = Column::new(Some("id"), &Type::Int64);
        assert_eq!(column.name, "id");
        assert_eq!(column.type_code, TypeCode::Int64);
        assert_eq!(column.display_size, Some(8));
        assert!(column.internal_size.unwrap() > 0);
        assert_eq!(column.null_ok, None);

        let column = Column::new(None, &Type::String);
        assert_eq!(column.name, "");
        assert_eq!(column.display_size, None);
    }

    #[test]
    fn test_replay_only_reaches_current_statement() {
        let mut state = CursorState::new();
        state.reset(2);
        state.results = rows(vec![]);

        let replayed = || StreamedResultSet::new(futures::stream::empty().boxed());
        assert!(!state.accept_replay(1, replayed()));
        assert!(state.accept_replay(2, replayed()));

        state.closed = true;
        assert!(!state.accept_replay(2, replayed()));
    }

    #[test]
    fn test_invalidate() {
        let mut state = CursorState::new();
        state.reset(7);
        state.results = rows(vec![Ok(ResultChunk::new(
            Some(single_column("n", Type::Int64)),
            vec![],
        ))]);

        state.invalidate(6, &Error::RetryAborted("stale".to_string()));
        assert!(matches!(state.results, Results::Rows(_)));

        state.invalidate(7, &Error::RetryAborted("diverged".to_string()));
        assert!(matches!(
            state.results,
            Results::Invalidated {
                divergent: true,
                ..
            }
        ));
    }
}
