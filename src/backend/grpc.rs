use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use gcp_auth::AuthenticationManager;
use google_api_proto::google::longrunning::{
    operation, operations_client::OperationsClient, GetOperationRequest, Operation,
};
use google_api_proto::google::spanner::admin::database::v1::{
    database_admin_client::DatabaseAdminClient, GetDatabaseRequest, UpdateDatabaseDdlRequest,
};
use google_api_proto::google::spanner::admin::instance::v1::{
    instance_admin_client::InstanceAdminClient, GetInstanceRequest,
};
use google_api_proto::google::spanner::v1 as proto;
use prost_types::value::Kind;
use proto::{
    execute_sql_request::QueryMode, spanner_client::SpannerClient, BeginTransactionRequest,
    CommitRequest, CreateSessionRequest, ExecuteSqlRequest, PartialResultSet, RollbackRequest,
};
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::{Code, Request};
use tower::filter::{AsyncFilter, AsyncFilterLayer};
use tower::util::Either;
use tower::ServiceBuilder;

use super::Backend;
use crate::auth::{AuthFilter, Scopes};
use crate::result_set::{ChunkStream, ResultChunk};
use crate::{
    DatabaseId, Error, InstanceId, Session, SpannerResource, Statement, StructType, Transaction,
    TransactionMode, TransactionSelector, Value,
};

const SPANNER_ENDPOINT: &str = "https://spanner.googleapis.com";

const OPERATION_POLL_INTERVAL: Duration = Duration::from_millis(500);

type Transport = Either<AsyncFilter<Channel, AuthFilter>, Channel>;

/// The [`Backend`] speaking gRPC to Cloud Spanner, or to the emulator when given a plaintext endpoint.
#[derive(Clone)]
pub struct GrpcBackend {
    spanner: SpannerClient<Transport>,
    databases: DatabaseAdminClient<Transport>,
    instances: InstanceAdminClient<Transport>,
    operations: OperationsClient<Transport>,
}

fn authenticated(
    channel: Channel,
    auth: &Option<Arc<AuthenticationManager>>,
    scopes: Scopes,
) -> Transport {
    let auth_layer = auth
        .clone()
        .map(|auth| AsyncFilterLayer::new(AuthFilter::new(auth, scopes)));
    ServiceBuilder::new()
        .option_layer(auth_layer)
        .service(channel)
}

impl GrpcBackend {
    /// Connects to `endpoint`, or to the Cloud Spanner API over TLS when `None`.
    pub async fn connect(
        endpoint: Option<String>,
        auth: Option<Arc<AuthenticationManager>>,
        user_agent: &str,
    ) -> Result<Self, Error> {
        let endpoint = match endpoint {
            None => Endpoint::from_static(SPANNER_ENDPOINT)
                .tls_config(ClientTlsConfig::new().domain_name("spanner.googleapis.com"))?,
            Some(endpoint) => {
                log::debug!("connecting to {}", endpoint);
                let tls = endpoint.starts_with("https://");
                let endpoint = Channel::from_shared(endpoint).map_err(|invalid_uri| {
                    Error::Config(format!("invalid endpoint: {}", invalid_uri))
                })?;
                if tls {
                    endpoint.tls_config(ClientTlsConfig::new())?
                } else {
                    endpoint
                }
            }
        };
        let channel = endpoint.user_agent(user_agent)?.connect().await?;

        let data = authenticated(channel.clone(), &auth, Scopes::Database);
        let admin = authenticated(channel, &auth, Scopes::Admin);
        Ok(Self {
            spanner: SpannerClient::new(data),
            databases: DatabaseAdminClient::new(admin.clone()),
            instances: InstanceAdminClient::new(admin.clone()),
            operations: OperationsClient::new(admin),
        })
    }

    async fn wait_for(&mut self, mut operation: Operation) -> Result<(), Error> {
        while !operation.done {
            tokio::time::sleep(OPERATION_POLL_INTERVAL).await;
            operation = self
                .operations
                .get_operation(Request::new(GetOperationRequest {
                    name: operation.name.clone(),
                    ..Default::default()
                }))
                .await?
                .into_inner();
        }
        match operation.result {
            Some(operation::Result::Error(status)) => Err(tonic::Status::new(
                Code::from_i32(status.code),
                status.message,
            )
            .into()),
            _ => Ok(()),
        }
    }
}

// NOT_FOUND means the resource doesn't exist, anything else is a genuine failure.
fn exists<T>(response: Result<T, tonic::Status>) -> Result<bool, Error> {
    match response {
        Ok(_) => Ok(true),
        Err(status) if status.code() == Code::NotFound => Ok(false),
        Err(status) => Err(status.into()),
    }
}

fn sql_request(
    session: &Session,
    selector: &TransactionSelector,
    statement: &Statement,
    seqno: i64,
) -> ExecuteSqlRequest {
    ExecuteSqlRequest {
        session: session.name().to_string(),
        transaction: Some(selector.into()),
        sql: statement.sql.clone(),
        params: statement.proto_params(),
        param_types: statement.proto_param_types().into_iter().collect(),
        query_mode: QueryMode::Normal as i32,
        seqno,
        ..Default::default()
    }
}

#[async_trait]
impl Backend for GrpcBackend {
    async fn instance_exists(&mut self, instance: &InstanceId) -> Result<bool, Error> {
        exists(
            self.instances
                .get_instance(Request::new(GetInstanceRequest {
                    name: instance.id(),
                    ..Default::default()
                }))
                .await,
        )
    }

    async fn database_exists(&mut self, database: &DatabaseId) -> Result<bool, Error> {
        exists(
            self.databases
                .get_database(Request::new(GetDatabaseRequest {
                    name: database.id(),
                    ..Default::default()
                }))
                .await,
        )
    }

    async fn create_session(&mut self, database: &DatabaseId) -> Result<Session, Error> {
        let response = self
            .spanner
            .create_session(Request::new(CreateSessionRequest {
                database: database.id(),
                ..Default::default()
            }))
            .await?;
        Ok(response.into_inner().into())
    }

    async fn begin_transaction(
        &mut self,
        session: &Session,
        mode: &TransactionMode,
    ) -> Result<Transaction, Error> {
        let response = self
            .spanner
            .begin_transaction(Request::new(BeginTransactionRequest {
                session: session.name().to_string(),
                options: Some(mode.into()),
                ..Default::default()
            }))
            .await?;
        Ok(response.into_inner().into())
    }

    async fn commit(&mut self, session: &Session, transaction: &Transaction) -> Result<(), Error> {
        self.spanner
            .commit(Request::new(CommitRequest {
                session: session.name().to_string(),
                transaction: Some(proto::commit_request::Transaction::TransactionId(
                    transaction.id().to_vec().into(),
                )),
                ..Default::default()
            }))
            .await?;
        Ok(())
    }

    async fn rollback(
        &mut self,
        session: &Session,
        transaction: &Transaction,
    ) -> Result<(), Error> {
        self.spanner
            .rollback(Request::new(RollbackRequest {
                session: session.name().to_string(),
                transaction_id: transaction.id().to_vec().into(),
                ..Default::default()
            }))
            .await?;
        Ok(())
    }

    async fn execute_streaming_sql(
        &mut self,
        session: &Session,
        selector: &TransactionSelector,
        statement: &Statement,
    ) -> Result<ChunkStream, Error> {
        let streaming = self
            .spanner
            .execute_streaming_sql(Request::new(sql_request(session, selector, statement, 0)))
            .await?
            .into_inner();

        let chunks = futures::stream::try_unfold(
            (streaming, RowAssembler::default()),
            |(mut streaming, mut rows)| async move {
                match streaming.message().await? {
                    Some(partial) => {
                        let chunk = rows.push(partial)?;
                        Ok(Some((chunk, (streaming, rows))))
                    }
                    None => {
                        rows.finish()?;
                        Ok(None)
                    }
                }
            },
        );
        Ok(chunks.boxed())
    }

    async fn execute_update(
        &mut self,
        session: &Session,
        transaction: &Transaction,
        statement: &Statement,
        seqno: i64,
    ) -> Result<i64, Error> {
        let selector = TransactionSelector::Id(transaction.clone());
        let result_set = self
            .spanner
            .execute_sql(Request::new(sql_request(
                session, &selector, statement, seqno,
            )))
            .await?
            .into_inner();

        match result_set.stats.and_then(|stats| stats.row_count) {
            Some(proto::result_set_stats::RowCount::RowCountExact(count)) => Ok(count),
            Some(proto::result_set_stats::RowCount::RowCountLowerBound(count)) => Ok(count),
            None => Err(Error::Codec(
                "DML result set is missing its row count".to_string(),
            )),
        }
    }

    async fn update_ddl(&mut self, database: &DatabaseId, statements: &[String]) -> Result<(), Error> {
        let operation = self
            .databases
            .update_database_ddl(Request::new(UpdateDatabaseDdlRequest {
                database: database.id(),
                statements: statements.to_vec(),
                ..Default::default()
            }))
            .await?
            .into_inner();
        self.wait_for(operation).await
    }
}

/// Reassembles rows out of a stream of `PartialResultSet`s.
///
/// Values are streamed flat and may be split over two messages (`chunked_value`), in which case the
/// last value of a message must be merged with the first value of the next one.
#[derive(Default)]
struct RowAssembler {
    row_type: Option<StructType>,
    pending: Vec<prost_types::Value>,
    chunked: bool,
}

impl RowAssembler {
    fn push(&mut self, partial: PartialResultSet) -> Result<ResultChunk, Error> {
        let metadata = match partial.metadata.and_then(|metadata| metadata.row_type) {
            Some(row_type) => {
                let row_type = StructType::try_from(&row_type)?;
                self.row_type = Some(row_type.clone());
                Some(row_type)
            }
            None => None,
        };

        let received = !partial.values.is_empty();
        let mut values = partial.values.into_iter();
        if self.chunked {
            if let Some(tail) = values.next() {
                match self.pending.pop() {
                    Some(head) => self.pending.push(merge(head, tail)?),
                    None => self.pending.push(tail),
                }
            }
        }
        self.pending.extend(values);
        // a message without values leaves a chunked value open
        self.chunked = partial.chunked_value || (self.chunked && !received);

        let row_type = match &self.row_type {
            Some(row_type) if !row_type.is_empty() => row_type,
            _ if self.pending.is_empty() => return Ok(ResultChunk::new(metadata, Vec::new())),
            _ => {
                return Err(Error::Codec(
                    "received values before the result set metadata".to_string(),
                ))
            }
        };

        let complete = if self.chunked {
            self.pending.len().saturating_sub(1)
        } else {
            self.pending.len()
        };
        let width = row_type.len();
        let rows = self
            .pending
            .drain(..complete / width * width)
            .collect::<Vec<_>>()
            .chunks(width)
            .map(|values| {
                row_type
                    .fields()
                    .iter()
                    .zip(values.iter().cloned())
                    .map(|((_, tpe), value)| Value::try_from(tpe, value))
                    .collect::<Result<Vec<_>, Error>>()
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(ResultChunk::new(metadata, rows))
    }

    fn finish(&self) -> Result<(), Error> {
        if self.pending.is_empty() && !self.chunked {
            Ok(())
        } else {
            Err(Error::Codec(format!(
                "result set ended with {} values of an incomplete row",
                self.pending.len()
            )))
        }
    }
}

fn mergeable(value: &prost_types::Value) -> bool {
    matches!(
        value.kind,
        Some(Kind::StringValue(_)) | Some(Kind::ListValue(_))
    )
}

// Strings are concatenated, lists are concatenated with their boundary elements merged.
fn merge(head: prost_types::Value, tail: prost_types::Value) -> Result<prost_types::Value, Error> {
    let kind = match (head.kind, tail.kind) {
        (Some(Kind::StringValue(mut head)), Some(Kind::StringValue(tail))) => {
            head.push_str(&tail);
            Kind::StringValue(head)
        }
        (Some(Kind::ListValue(mut head)), Some(Kind::ListValue(tail))) => {
            let mut tail = tail.values.into_iter();
            match (head.values.pop(), tail.next()) {
                (Some(last), Some(first)) if mergeable(&last) && mergeable(&first) => {
                    head.values.push(merge(last, first)?);
                }
                (last, first) => {
                    head.values.extend(last);
                    head.values.extend(first);
                }
            }
            head.values.extend(tail);
            Kind::ListValue(head)
        }
        (head, tail) => {
            return Err(Error::Codec(format!(
                "unable to merge chunked values {:?} and {:?}",
                head, tail
            )))
        }
    };
    Ok(prost_types::Value { kind: Some(kind) })
}
