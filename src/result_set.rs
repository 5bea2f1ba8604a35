use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;

use crate::{Error, FromSpanner, StructType, Type, Value};

/// A single row of a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    row_type: Arc<StructType>,
    columns: Vec<Value>,
}

impl Row {
    pub fn new(row_type: Arc<StructType>, columns: Vec<Value>) -> Self {
        Self { row_type, columns }
    }

    pub fn row_type(&self) -> &StructType {
        &self.row_type
    }

    pub fn values(&self) -> &[Value] {
        &self.columns
    }

    pub fn into_values(self) -> Vec<Value> {
        self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get_value(&self, column: usize) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Converts the value of the column at the provided index.
    pub fn get<'a, T>(&'a self, column: usize) -> Result<T, Error>
    where
        T: FromSpanner<'a>,
    {
        let tpe = self
            .row_type
            .fields()
            .get(column)
            .map(|(_, tpe)| tpe)
            .ok_or_else(|| Error::Programming(format!("no such column: {}", column)))?;
        let value = self
            .columns
            .get(column)
            .ok_or_else(|| Error::Programming(format!("no such column: {}", column)))?;
        T::from_spanner_nullable(tpe, value)
    }

    /// Converts the value of the column with the provided name.
    pub fn get_by_name<'a, T>(&'a self, column_name: &str) -> Result<T, Error>
    where
        T: FromSpanner<'a>,
    {
        let idx = self
            .row_type
            .field_index(column_name)
            .ok_or_else(|| Error::Programming(format!("no such column: {}", column_name)))?;
        self.get(idx)
    }
}

/// A piece of a streaming result set: the row type (sent with the first piece only) and
/// the complete rows that were assembled from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultChunk {
    pub metadata: Option<StructType>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultChunk {
    pub fn new(metadata: Option<StructType>, rows: Vec<Vec<Value>>) -> Self {
        Self { metadata, rows }
    }
}

pub type ChunkStream = BoxStream<'static, Result<ResultChunk, Error>>;

/// A streaming result set with one row of lookahead.
///
/// Cloud Spanner only sends the row type along with the first piece of a result set, so the
/// metadata is known only once the stream has been peeked.
pub struct StreamedResultSet {
    chunks: ChunkStream,
    row_type: Option<Arc<StructType>>,
    buffered: VecDeque<Vec<Value>>,
    exhausted: bool,
}

impl StreamedResultSet {
    pub fn new(chunks: ChunkStream) -> Self {
        Self {
            chunks,
            row_type: None,
            buffered: VecDeque::new(),
            exhausted: false,
        }
    }

    /// The row type, if the stream has been peeked.
    pub fn metadata(&self) -> Option<&StructType> {
        self.row_type.as_deref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.buffered.is_empty()
    }

    // Pulls chunks until at least one row is buffered or the stream ends.
    async fn fill(&mut self) -> Result<(), Error> {
        while self.buffered.is_empty() && !self.exhausted {
            match self.chunks.next().await {
                Some(chunk) => {
                    let chunk = chunk?;
                    if let Some(metadata) = chunk.metadata {
                        self.row_type = Some(Arc::new(metadata));
                    }
                    self.buffered.extend(chunk.rows);
                }
                None => self.exhausted = true,
            }
        }
        Ok(())
    }

    /// Makes the next row available without consuming it. Returns `false` at the end of the stream.
    pub async fn peek(&mut self) -> Result<bool, Error> {
        self.fill().await?;
        Ok(!self.buffered.is_empty())
    }

    pub async fn next(&mut self) -> Result<Option<Row>, Error> {
        self.fill().await?;
        match self.buffered.pop_front() {
            Some(columns) => {
                let row_type = self
                    .row_type
                    .clone()
                    .ok_or_else(|| Error::Codec("missing result set metadata".to_string()))?;
                Ok(Some(Row::new(row_type, columns)))
            }
            None => Ok(None),
        }
    }

    /// Drains the remaining rows.
    pub async fn collect(mut self) -> Result<Vec<Row>, Error> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }
}

/// Convenience for building a single column row type in tests and fakes.
pub fn single_column(name: &str, tpe: Type) -> StructType {
    StructType::new(vec![(name, tpe)])
}
