//! Queries, records and the paginated collector.

mod paginate;
mod query;
mod record;

pub use paginate::{CollectError, Collection, CollectionError, Collector};
pub use query::{
    BlockRange, Query, RecordKind, SortOrder, TimeWindow, DEFAULT_END_BLOCK, MAX_LOG_PAGE_SIZE,
    MAX_TX_PAGE_SIZE,
};
pub use record::{Record, DATETIME_FIELD, TIMESTAMP_FIELD};

/// Keep records whose timestamp falls inside `window`. Records without a timestamp are dropped.
pub fn filter_window(records: Vec<Record>, window: &TimeWindow) -> Vec<Record> {
    records
        .into_iter()
        .filter(|r| r.timestamp().is_some_and(|ts| window.contains(ts)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(ts: Option<&str>) -> Record {
        let v = match ts {
            Some(ts) => json!({"timeStamp": ts}),
            None => json!({"hash": "0x"}),
        };
        Record::from_provider(v.as_object().cloned().unwrap())
    }

    #[test]
    fn window_filter_is_idempotent() {
        let w = TimeWindow::new(100, 200);
        let input = vec![
            rec(Some("50")),
            rec(Some("100")),
            rec(Some("150")),
            rec(None),
            rec(Some("200")),
            rec(Some("201")),
        ];
        let once = filter_window(input, &w);
        assert_eq!(once.len(), 3);
        let twice = filter_window(once.clone(), &w);
        assert_eq!(once, twice);
    }
}
