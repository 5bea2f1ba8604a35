use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;
use std::time::SystemTime;

use google_api_proto::google::spanner::v1 as proto;

use crate::checksum::ResultsChecksum;
use crate::cursor::CursorState;
use crate::database::Database;
use crate::result_set::StreamedResultSet;
use crate::session::PooledSession;
use crate::{Error, Statement};

/// Bounds the staleness of the data observed by read-only transactions.
#[derive(Clone, Debug, PartialEq)]
pub enum TimestampBound {
    Strong,
    ReadTimestamp(SystemTime),
    MinReadTimestamp(SystemTime),
    ExactStaleness(Duration),
    MaxStaleness(Duration),
}

impl Default for TimestampBound {
    fn default() -> Self {
        TimestampBound::Strong
    }
}

impl From<TimestampBound> for proto::transaction_options::read_only::TimestampBound {
    fn from(value: TimestampBound) -> Self {
        match value {
            TimestampBound::Strong => {
                proto::transaction_options::read_only::TimestampBound::Strong(true)
            }
            TimestampBound::ReadTimestamp(timestamp) => {
                proto::transaction_options::read_only::TimestampBound::ReadTimestamp(
                    timestamp.into(),
                )
            }
            TimestampBound::MinReadTimestamp(timestamp) => {
                proto::transaction_options::read_only::TimestampBound::MinReadTimestamp(
                    timestamp.into(),
                )
            }
            TimestampBound::MaxStaleness(duration) => {
                proto::transaction_options::read_only::TimestampBound::MaxStaleness(duration.into())
            }
            TimestampBound::ExactStaleness(duration) => {
                proto::transaction_options::read_only::TimestampBound::ExactStaleness(
                    duration.into(),
                )
            }
        }
    }
}

fn read_only(bound: &TimestampBound) -> proto::transaction_options::Mode {
    proto::transaction_options::Mode::ReadOnly(proto::transaction_options::ReadOnly {
        timestamp_bound: Some(bound.clone().into()),
        ..Default::default()
    })
}

/// The kind of transaction begun by a connection outside of autocommit mode.
#[derive(Clone, Debug, PartialEq)]
pub enum TransactionMode {
    ReadWrite,
    ReadOnly(TimestampBound),
}

impl From<&TransactionMode> for proto::TransactionOptions {
    fn from(value: &TransactionMode) -> Self {
        let mode = match value {
            TransactionMode::ReadWrite => {
                proto::transaction_options::Mode::ReadWrite(Default::default())
            }
            TransactionMode::ReadOnly(bound) => read_only(bound),
        };
        proto::TransactionOptions {
            mode: Some(mode),
            ..Default::default()
        }
    }
}

/// Selects the transaction a query runs in.
#[derive(Clone, Debug)]
pub enum TransactionSelector {
    /// A single-use, read-only snapshot.
    SingleUse(TimestampBound),
    /// A transaction previously begun with [`crate::Backend::begin_transaction`].
    Id(Transaction),
}

impl From<&TransactionSelector> for proto::TransactionSelector {
    fn from(value: &TransactionSelector) -> Self {
        let selector = match value {
            TransactionSelector::SingleUse(bound) => {
                proto::transaction_selector::Selector::SingleUse(proto::TransactionOptions {
                    mode: Some(read_only(bound)),
                    ..Default::default()
                })
            }
            TransactionSelector::Id(tx) => {
                proto::transaction_selector::Selector::Id(tx.id().to_vec().into())
            }
        };
        proto::TransactionSelector {
            selector: Some(selector),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    id: Vec<u8>,
}

impl Transaction {
    pub fn new(id: impl Into<Vec<u8>>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &[u8] {
        &self.id
    }
}

impl From<proto::Transaction> for Transaction {
    fn from(spanner_tx: proto::Transaction) -> Self {
        Transaction::new(spanner_tx.id.to_vec())
    }
}

pub(crate) type SharedChecksum = Rc<RefCell<ResultsChecksum>>;

/// Where the rows of a replayed query should go: the cursor that ran it, as long as the cursor
/// is still positioned on that statement.
#[derive(Clone)]
pub(crate) struct QuerySink {
    pub(crate) cursor: Weak<RefCell<CursorState>>,
    pub(crate) statement_id: u64,
}

enum Recorded {
    Query(QuerySink),
    Update,
}

struct RecordedStatement {
    statement: Statement,
    kind: Recorded,
    checksum: SharedChecksum,
}

/// A replayed query stream, positioned after the rows its cursor had already consumed.
pub(crate) struct Handover {
    pub(crate) sink: QuerySink,
    pub(crate) stream: StreamedResultSet,
}

/// How many times, and how patiently, an aborted transaction is replayed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ReplayPolicy {
    pub(crate) max_attempts: u32,
    pub(crate) backoff: Duration,
}

/// A transaction in progress, along with every statement that ran successfully in it.
pub(crate) struct ActiveTransaction {
    session: PooledSession,
    handle: Transaction,
    mode: TransactionMode,
    policy: ReplayPolicy,
    statements: Vec<RecordedStatement>,
    seqno: i64,
}

impl ActiveTransaction {
    pub(crate) async fn begin(
        db: &Database,
        mode: TransactionMode,
        policy: ReplayPolicy,
    ) -> Result<Self, Error> {
        let session = db.checkout().await?;
        let handle = db.begin_transaction(&session, &mode).await?;
        log::debug!("began {:?} transaction in session {}", mode, session.name());
        Ok(Self {
            session,
            handle,
            mode,
            policy,
            statements: Vec::new(),
            seqno: 0,
        })
    }

    /// Runs a query and waits for its first row or the end of its results.
    pub(crate) async fn query(
        &mut self,
        db: &Database,
        statement: &Statement,
    ) -> Result<StreamedResultSet, Error> {
        let selector = TransactionSelector::Id(self.handle.clone());
        db.query(&self.session, &selector, statement).await
    }

    pub(crate) fn record_query(&mut self, statement: Statement, sink: QuerySink) -> SharedChecksum {
        let checksum = SharedChecksum::default();
        self.statements.push(RecordedStatement {
            statement,
            kind: Recorded::Query(sink),
            checksum: checksum.clone(),
        });
        checksum
    }

    pub(crate) async fn update(&mut self, db: &Database, statement: &Statement) -> Result<i64, Error> {
        self.seqno += 1;
        db.execute_update(&self.session, &self.handle, statement, self.seqno)
            .await
    }

    pub(crate) fn record_update(&mut self, statement: Statement, count: i64) {
        let mut checksum = ResultsChecksum::new();
        checksum.consume_update_count(count);
        self.statements.push(RecordedStatement {
            statement,
            kind: Recorded::Update,
            checksum: Rc::new(RefCell::new(checksum)),
        });
    }

    // Read-only transactions hold no locks and are neither committed nor rolled back.
    pub(crate) async fn commit(&mut self, db: &Database) -> Result<(), Error> {
        match self.mode {
            TransactionMode::ReadWrite => db.commit(&self.session, &self.handle).await,
            TransactionMode::ReadOnly(_) => Ok(()),
        }
    }

    pub(crate) async fn rollback(&mut self, db: &Database) -> Result<(), Error> {
        match self.mode {
            TransactionMode::ReadWrite => db.rollback(&self.session, &self.handle).await,
            TransactionMode::ReadOnly(_) => Ok(()),
        }
    }

    /// Keeps the session out of the pool once this transaction is dropped.
    pub(crate) fn discard_session(&mut self) {
        self.session.invalidate();
    }

    /// The cursors that read from this transaction.
    pub(crate) fn sinks(&self) -> impl Iterator<Item = &QuerySink> {
        self.statements.iter().filter_map(|recorded| match &recorded.kind {
            Recorded::Query(sink) => Some(sink),
            Recorded::Update => None,
        })
    }

    /// Starts over in a new transaction after the server aborted this one, re-running every recorded
    /// statement and checking it observes the same results as the first time.
    ///
    /// `attempts` counts the replays made on behalf of one operation. Aborts during the replay
    /// itself are retried with exponential backoff, up to the configured number of attempts.
    pub(crate) async fn replay(
        &mut self,
        db: &Database,
        mut cause: Error,
        attempts: &mut u32,
    ) -> Result<Vec<Handover>, Error> {
        let policy = self.policy;
        loop {
            if *attempts >= policy.max_attempts {
                return Err(Error::Operational(format!(
                    "transaction aborted after {} replay attempts: {}",
                    attempts, cause
                )));
            }
            *attempts += 1;
            let delay = backoff(policy.backoff, *attempts, cause.retry_delay());
            log::info!(
                "transaction aborted ({}), replaying {} statements in {:?} (attempt {} of {})",
                cause,
                self.statements.len(),
                delay,
                attempts,
                policy.max_attempts
            );
            tokio::time::sleep(delay).await;

            match self.replay_once(db, &cause).await {
                Ok(handovers) => return Ok(handovers),
                Err(err) if err.is_retryable() => cause = err,
                Err(err) => return Err(err),
            }
        }
    }

    async fn replay_once(&mut self, db: &Database, cause: &Error) -> Result<Vec<Handover>, Error> {
        if matches!(cause, Error::SessionNotFound(_)) {
            self.session.invalidate();
            self.session = db.checkout().await?;
        }
        self.handle = db.begin_transaction(&self.session, &self.mode).await?;

        let mut handovers = Vec::new();
        for recorded in &self.statements {
            let mut retried = ResultsChecksum::new();
            match &recorded.kind {
                Recorded::Update => {
                    self.seqno += 1;
                    let count = db
                        .execute_update(&self.session, &self.handle, &recorded.statement, self.seqno)
                        .await?;
                    retried.consume_update_count(count);
                    ResultsChecksum::compare(&recorded.checksum.borrow(), &retried)?;
                }
                Recorded::Query(sink) => {
                    let selector = TransactionSelector::Id(self.handle.clone());
                    let mut stream = db.query(&self.session, &selector, &recorded.statement).await?;
                    let consumed = recorded.checksum.borrow().len();
                    for _ in 0..consumed {
                        match db.next_row(&mut stream).await? {
                            Some(row) => retried.consume_row(row.values()),
                            None => break,
                        }
                    }
                    ResultsChecksum::compare(&recorded.checksum.borrow(), &retried)?;
                    handovers.push(Handover {
                        sink: sink.clone(),
                        stream,
                    });
                }
            }
        }
        log::info!("replayed {} statements", self.statements.len());
        Ok(handovers)
    }
}

// Exponential backoff from `base`, doubling on every attempt up to 32 times `base`, but never
// shorter than what the server asked for.
fn backoff(base: Duration, attempt: u32, server_delay: Option<Duration>) -> Duration {
    let factor = 1_u32 << attempt.saturating_sub(1).min(5);
    let delay = base * factor;
    match server_delay {
        Some(server_delay) => delay.max(server_delay),
        None => delay,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_backoff() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff(base, 1, None), Duration::from_millis(100));
        assert_eq!(backoff(base, 2, None), Duration::from_millis(200));
        assert_eq!(backoff(base, 4, None), Duration::from_millis(800));
        assert_eq!(backoff(base, 6, None), Duration::from_millis(3200));
        assert_eq!(backoff(base, 10, None), Duration::from_millis(3200));
        assert_eq!(
            backoff(base, 1, Some(Duration::from_secs(1))),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_selector_to_proto() {
        let selector = proto::TransactionSelector::from(&TransactionSelector::Id(
            Transaction::new(vec![1, 2, 3]),
        ));
        match selector.selector {
            Some(proto::transaction_selector::Selector::Id(id)) => assert_eq!(&id[..], &[1, 2, 3]),
            other => panic!("unexpected selector {:?}", other),
        }

        let selector = proto::TransactionSelector::from(&TransactionSelector::SingleUse(
            TimestampBound::ExactStaleness(Duration::from_secs(10)),
        ));
        assert!(matches!(
            selector.selector,
            Some(proto::transaction_selector::Selector::SingleUse(_))
        ));
    }

    #[test]
    fn test_read_only_mode_to_proto() {
        let options = proto::TransactionOptions::from(&TransactionMode::ReadOnly(
            TimestampBound::Strong,
        ));
        match options.mode {
            Some(proto::transaction_options::Mode::ReadOnly(read_only)) => assert_eq!(
                read_only.timestamp_bound,
                Some(proto::transaction_options::read_only::TimestampBound::Strong(true))
            ),
            other => panic!("unexpected mode {:?}", other),
        }
    }
}
