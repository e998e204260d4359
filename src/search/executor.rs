//! Per-shard search execution.
//!
//! The executor wires the two halves of a search together: a collector
//! thread running the query against a shard snapshot, and the consumer
//! loop on the calling thread resolving stored fields and emitting rows.
//! The collector thread is always joined before the search concludes, even
//! when the consumer fails or the search is cancelled, so no collector is
//! ever orphaned.

use std::sync::Arc;

use log::debug;

use crate::config::IndexConfig;
use crate::data::DataValue;
use crate::error::{Result, SalixError};
use crate::index::query::Query;
use crate::index::reader::IndexReader;
use crate::search::collector::{CollectorOutcome, collect_matches};
use crate::search::queue::DocIdQueue;
use crate::search::task::SearchTaskContext;
use crate::shard::searcher::ShardSnapshot;

/// One materialized result row: the requested stored-field values of a
/// matched document, in request order. Missing fields yield None, keeping
/// rows fixed-width.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRow {
    pub shard_id: u64,
    pub doc_id: u64,
    pub values: Vec<Option<DataValue>>,
}

/// Receives materialized rows, in collector order.
pub trait RowSink {
    fn accept(&mut self, row: SearchRow) -> Result<()>;
}

impl<F> RowSink for F
where
    F: FnMut(SearchRow) -> Result<()>,
{
    fn accept(&mut self, row: SearchRow) -> Result<()> {
        self(row)
    }
}

/// How a search concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// All matches were streamed.
    Complete,
    /// The search was cancelled; the emitted rows are a prefix of the full
    /// result stream with no completeness guarantee.
    Terminated,
}

/// Result of a search run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSummary {
    /// Number of rows emitted to the sink.
    pub rows: u64,
    pub outcome: SearchOutcome,
}

/// Executes searches over shard snapshots.
#[derive(Debug, Clone)]
pub struct SearchExecutor {
    queue_capacity: usize,
}

impl SearchExecutor {
    pub fn new(queue_capacity: usize) -> Self {
        SearchExecutor {
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn from_config(config: &IndexConfig) -> Self {
        SearchExecutor::new(config.doc_id_queue_capacity)
    }

    /// Run a query over a snapshot, emitting one row per match to the sink
    /// in the query's natural match order.
    ///
    /// The collector runs on its own thread and is joined before this
    /// returns. Cancellation through `task` yields
    /// `SearchOutcome::Terminated` with the rows emitted so far; it is not
    /// an error. Consumer failures terminate and join the collector before
    /// propagating.
    pub fn search(
        &self,
        snapshot: &ShardSnapshot,
        query: &dyn Query,
        fields: &[String],
        task: &Arc<SearchTaskContext>,
        sink: &mut dyn RowSink,
    ) -> Result<SearchSummary> {
        let queue = Arc::new(DocIdQueue::new(self.queue_capacity));
        let reader = snapshot.reader();
        let shard_id = snapshot.shard_id();

        std::thread::scope(|scope| {
            let collector_handle = std::thread::Builder::new()
                .name(format!("search-collector-{shard_id}"))
                .spawn_scoped(scope, {
                    let queue = queue.clone();
                    let task = task.clone();
                    move || collect_matches(reader, query, &queue, &task)
                })?;

            let mut rows = 0u64;
            let consumer_result: Result<()> = loop {
                match queue.take() {
                    Some(doc_id) => match materialize(reader, shard_id, doc_id, fields) {
                        Ok(row) => {
                            if let Err(e) = sink.accept(row) {
                                break Err(e);
                            }
                            rows += 1;
                        }
                        Err(e) => break Err(e),
                    },
                    None => break Ok(()),
                }
            };

            if consumer_result.is_err() {
                // Stop and unblock the collector before joining it so the
                // error path leaves no orphaned thread.
                task.terminate();
                queue.complete();
            }

            let collector_result = collector_handle
                .join()
                .map_err(|_| SalixError::internal("search collector thread panicked"))?;

            match (consumer_result, collector_result) {
                (Err(e), _) => Err(e),
                (Ok(()), Err(e)) => Err(e),
                (Ok(()), Ok(CollectorOutcome::Finished)) => {
                    debug!("shard {shard_id}: search complete, {rows} rows");
                    Ok(SearchSummary {
                        rows,
                        outcome: SearchOutcome::Complete,
                    })
                }
                (Ok(()), Ok(CollectorOutcome::Terminated)) => {
                    debug!("shard {shard_id}: search terminated after {rows} rows");
                    Ok(SearchSummary {
                        rows,
                        outcome: SearchOutcome::Terminated,
                    })
                }
            }
        })
    }
}

/// Resolve the requested stored fields of one matched document.
fn materialize(
    reader: &IndexReader,
    shard_id: u64,
    doc_id: u64,
    fields: &[String],
) -> Result<SearchRow> {
    let doc = reader.doc(doc_id).ok_or_else(|| {
        SalixError::index(format!("shard {shard_id}: stored document {doc_id} missing"))
    })?;
    let values = fields.iter().map(|field| doc.get(field).cloned()).collect();
    Ok(SearchRow {
        shard_id,
        doc_id,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::data::Document;
    use crate::index::query::TermQuery;
    use crate::shard::key::ShardKey;
    use crate::shard::searcher::ShardSearcher;
    use crate::shard::store::ShardStore;
    use crate::shard::writer::ShardWriter;
    use crate::storage::Storage;
    use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};

    fn make_storage() -> Arc<dyn Storage> {
        Arc::new(MemoryStorage::new(MemoryStorageConfig::default()))
    }

    fn make_snapshot(docs: usize) -> (Arc<ShardStore>, ShardSearcher) {
        let store = Arc::new(ShardStore::open(make_storage(), vec![make_storage()]).unwrap());
        let key = ShardKey::new("IDX1", "P0", 0);
        let descriptor = store.create_shard(&key).unwrap();
        let config = IndexConfig::default();
        let writer = ShardWriter::open(store.clone(), &descriptor, &config).unwrap();

        for i in 0..docs {
            writer
                .add_document(
                    Document::new()
                        .add_field("body", "hello world")
                        .add_field("seq", i as i64),
                )
                .unwrap();
        }
        writer.flush().unwrap();
        writer.close().unwrap();

        let searcher =
            ShardSearcher::open(&store, descriptor.id, config.analyzers.clone()).unwrap();
        (store, searcher)
    }

    #[test]
    fn test_streams_all_rows_in_order() {
        let (_store, searcher) = make_snapshot(10);
        let snapshot = searcher.acquire().unwrap();

        let executor = SearchExecutor::new(2);
        let task = Arc::new(SearchTaskContext::new());
        let fields = vec!["seq".to_string()];
        let mut rows: Vec<SearchRow> = Vec::new();
        let mut sink = |row: SearchRow| -> Result<()> {
            rows.push(row);
            Ok(())
        };

        let summary = executor
            .search(
                &snapshot,
                &TermQuery::new("body", "hello"),
                &fields,
                &task,
                &mut sink,
            )
            .unwrap();
        drop(sink);

        assert_eq!(summary.outcome, SearchOutcome::Complete);
        assert_eq!(summary.rows, 10);
        assert_eq!(rows.len(), 10);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.doc_id, i as u64);
            assert_eq!(row.values, vec![Some(DataValue::Int64(i as i64))]);
        }
    }

    #[test]
    fn test_missing_fields_stay_fixed_width() {
        let (_store, searcher) = make_snapshot(1);
        let snapshot = searcher.acquire().unwrap();

        let executor = SearchExecutor::new(4);
        let task = Arc::new(SearchTaskContext::new());
        let fields = vec!["body".to_string(), "absent".to_string()];
        let mut rows: Vec<SearchRow> = Vec::new();
        let mut sink = |row: SearchRow| -> Result<()> {
            rows.push(row);
            Ok(())
        };

        executor
            .search(
                &snapshot,
                &TermQuery::new("body", "hello"),
                &fields,
                &task,
                &mut sink,
            )
            .unwrap();
        drop(sink);

        assert_eq!(rows[0].values.len(), 2);
        assert_eq!(
            rows[0].values[0],
            Some(DataValue::Text("hello world".to_string()))
        );
        assert_eq!(rows[0].values[1], None);
    }

    #[test]
    fn test_termination_mid_search() {
        let (_store, searcher) = make_snapshot(50);
        let snapshot = searcher.acquire().unwrap();

        let executor = SearchExecutor::new(1);
        let task = Arc::new(SearchTaskContext::new());
        let fields = vec!["seq".to_string()];
        let mut rows: Vec<SearchRow> = Vec::new();
        let terminate_task = task.clone();
        let mut sink = move |row: SearchRow| -> Result<()> {
            // Cancel as soon as the first row lands.
            terminate_task.terminate();
            rows.push(row);
            Ok(())
        };

        let summary = executor
            .search(
                &snapshot,
                &TermQuery::new("body", "hello"),
                &fields,
                &task,
                &mut sink,
            )
            .unwrap();

        // An early-terminated search is a normal outcome: a prefix of the
        // stream arrived and the collector thread was joined.
        assert_eq!(summary.outcome, SearchOutcome::Terminated);
        assert!(summary.rows >= 1);
        assert!(summary.rows < 50);
    }

    #[test]
    fn test_sink_error_joins_collector_and_propagates() {
        let (_store, searcher) = make_snapshot(50);
        let snapshot = searcher.acquire().unwrap();

        let executor = SearchExecutor::new(1);
        let task = Arc::new(SearchTaskContext::new());
        let fields = vec!["seq".to_string()];
        let mut sink =
            |_row: SearchRow| -> Result<()> { Err(SalixError::internal("sink exploded")) };

        let err = executor
            .search(
                &snapshot,
                &TermQuery::new("body", "hello"),
                &fields,
                &task,
                &mut sink,
            )
            .unwrap_err();
        assert!(matches!(err, SalixError::Internal(_)));
    }

    #[test]
    fn test_invalid_query_propagates() {
        let (_store, searcher) = make_snapshot(2);
        let snapshot = searcher.acquire().unwrap();

        let executor = SearchExecutor::new(2);
        let task = Arc::new(SearchTaskContext::new());
        let mut sink = |_row: SearchRow| -> Result<()> { Ok(()) };

        let err = executor
            .search(
                &snapshot,
                &TermQuery::new("body", "two words"),
                &[],
                &task,
                &mut sink,
            )
            .unwrap_err();
        assert!(matches!(err, SalixError::InvalidArgument(_)));
    }
}
