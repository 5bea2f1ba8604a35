use async_trait::async_trait;
use dyn_clone::DynClone;

use crate::{
    ChunkStream, DatabaseId, Error, InstanceId, Session, Statement, Transaction, TransactionMode,
    TransactionSelector,
};

/// The Cloud Spanner RPCs the driver relies on.
///
/// [`GrpcBackend`] talks to Cloud Spanner (or its emulator); other implementations can be plugged in
/// through [`crate::ConfigBuilder::backend`].
#[async_trait]
pub trait Backend
where
    Self: DynClone + Send + Sync,
{
    async fn instance_exists(&mut self, instance: &InstanceId) -> Result<bool, Error>;
    async fn database_exists(&mut self, database: &DatabaseId) -> Result<bool, Error>;

    async fn create_session(&mut self, database: &DatabaseId) -> Result<Session, Error>;

    async fn begin_transaction(
        &mut self,
        session: &Session,
        mode: &TransactionMode,
    ) -> Result<Transaction, Error>;
    async fn commit(&mut self, session: &Session, transaction: &Transaction) -> Result<(), Error>;
    async fn rollback(&mut self, session: &Session, transaction: &Transaction)
        -> Result<(), Error>;

    /// Runs a query, returning its rows as they are streamed back.
    async fn execute_streaming_sql(
        &mut self,
        session: &Session,
        selector: &TransactionSelector,
        statement: &Statement,
    ) -> Result<ChunkStream, Error>;

    /// Runs a DML statement, returning the number of modified rows.
    ///
    /// `seqno` orders DML statements within a transaction and must increase with each call.
    async fn execute_update(
        &mut self,
        session: &Session,
        transaction: &Transaction,
        statement: &Statement,
        seqno: i64,
    ) -> Result<i64, Error>;

    /// Applies the DDL statements and waits for the schema change to complete.
    async fn update_ddl(&mut self, database: &DatabaseId, statements: &[String])
        -> Result<(), Error>;
}

dyn_clone::clone_trait_object!(Backend);

pub mod grpc;

pub use grpc::GrpcBackend;
