use std::time::Duration;

use bb8::{ManageConnection, Pool, PooledConnection};
use google_api_proto::google::spanner::v1 as proto;

use crate::{Backend, DatabaseId, Error};

/// A Cloud Spanner session, against which transactions are begun.
#[derive(Debug)]
pub struct Session {
    name: String,
    invalidated: bool,
}

impl Session {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            invalidated: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Marks this session as unusable so that it is discarded instead of returned to the pool.
    pub(crate) fn invalidate(&mut self) {
        self.invalidated = true;
    }

    pub(crate) fn is_invalidated(&self) -> bool {
        self.invalidated
    }
}

impl From<proto::Session> for Session {
    fn from(value: proto::Session) -> Self {
        Self::new(value.name)
    }
}

pub(crate) struct SessionManager {
    backend: Box<dyn Backend>,
    database: DatabaseId,
}

impl SessionManager {
    pub(crate) fn new(backend: Box<dyn Backend>, database: DatabaseId) -> Self {
        Self { backend, database }
    }
}

#[async_trait::async_trait]
impl ManageConnection for SessionManager {
    type Connection = Session;
    type Error = Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let session = dyn_clone::clone_box(&*self.backend)
            .create_session(&self.database)
            .await?;
        log::debug!("created session {}", session.name());
        Ok(session)
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        if conn.is_invalidated() {
            Err(Error::SessionNotFound(conn.name().to_string()))
        } else {
            Ok(())
        }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_invalidated()
    }
}

/// A session checked out of the pool; it goes back to the pool when dropped.
pub(crate) type PooledSession = PooledConnection<'static, SessionManager>;

#[derive(Clone)]
pub(crate) struct SessionPool {
    pool: Pool<SessionManager>,
}

impl SessionPool {
    /// Must be called within the context of a tokio runtime.
    pub(crate) fn new(
        manager: SessionManager,
        max_size: u32,
        checkout_timeout: Duration,
    ) -> Self {
        let pool = Pool::builder()
            .max_size(max_size)
            .connection_timeout(checkout_timeout)
            .test_on_check_out(false)
            .build_unchecked(manager);
        Self { pool }
    }

    /// Waits for a session, failing with an operational error after the checkout timeout.
    pub(crate) async fn checkout(&self) -> Result<PooledSession, Error> {
        Ok(self.pool.get_owned().await?)
    }
}
