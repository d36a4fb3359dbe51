use std::cmp::Reverse;

use forming_core::{StatusCode, StoredRecord};
use jiff::{Timestamp, civil::Date, tz::TimeZone};
use sqlx::{QueryBuilder, Sqlite};

use super::filter::{FilterCriteria, SortMode};

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("invalid status filter: {0}")]
    InvalidStatus(String),
    #[error("invalid date bound: {0}")]
    InvalidDate(#[from] jiff::Error),
}

/// One constraint on stored readings, paired with the value it binds.
///
/// The SQL side of each variant is a fixed fragment; values only ever
/// travel as bind parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    ReceivedFrom(Timestamp),
    ReceivedBefore(Timestamp),
    Prefix(String),
    Status(StatusCode),
}

impl Predicate {
    fn clause(&self) -> &'static str {
        match self {
            Predicate::ReceivedFrom(_) => "created_at >= ",
            Predicate::ReceivedBefore(_) => "created_at < ",
            Predicate::Prefix(_) => "prefix = ",
            Predicate::Status(_) => "status = ",
        }
    }

    fn push_bind(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Predicate::ReceivedFrom(ts) | Predicate::ReceivedBefore(ts) => {
                qb.push_bind(ts.as_millisecond());
            }
            Predicate::Prefix(prefix) => {
                qb.push_bind(prefix.clone());
            }
            Predicate::Status(status) => {
                qb.push_bind(status.0);
            }
        }
    }

    pub fn matches(&self, record: &StoredRecord) -> bool {
        match self {
            Predicate::ReceivedFrom(ts) => record.received_at >= *ts,
            Predicate::ReceivedBefore(ts) => record.received_at < *ts,
            Predicate::Prefix(prefix) => record.reading.prefix.as_deref() == Some(prefix.as_str()),
            Predicate::Status(status) => record.reading.status == *status,
        }
    }
}

impl SortMode {
    fn order_by(self) -> &'static str {
        match self {
            SortMode::Newest => " ORDER BY created_at DESC, id DESC",
            SortMode::WeightAsc => " ORDER BY weight ASC",
            SortMode::WeightDesc => " ORDER BY weight DESC",
        }
    }
}

/// A bounded, filtered and sorted read over stored readings.
///
/// The same query drives every dashboard view; views differ only in which
/// criteria they populate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingQuery {
    predicates: Vec<Predicate>,
    sort: SortMode,
    limit: usize,
}

impl ReadingQuery {
    /// Translates dashboard criteria into predicates, in the order
    /// date range, prefix, status.
    ///
    /// Calendar dates are resolved to instants in `tz`. The end date is
    /// inclusive, so its bound is midnight of the following day.
    pub fn build(
        criteria: &FilterCriteria,
        tz: &TimeZone,
        limit: usize,
    ) -> Result<Self, FilterError> {
        let mut predicates = Vec::with_capacity(4);

        if let Some(start) = criteria.start {
            predicates.push(Predicate::ReceivedFrom(start_of_day(start, tz)?));
        }

        if let Some(end) = criteria.end {
            predicates.push(Predicate::ReceivedBefore(start_of_day(end.tomorrow()?, tz)?));
        }

        if let Some(prefix) = criteria.prefix_constraint() {
            predicates.push(Predicate::Prefix(prefix.to_string()));
        }

        if let Some(status) = criteria.status_constraint() {
            let code = status
                .trim()
                .parse::<i64>()
                .map_err(|_| FilterError::InvalidStatus(status.to_string()))?;
            predicates.push(Predicate::Status(StatusCode(code)));
        }

        Ok(Self {
            predicates,
            sort: criteria.sort,
            limit,
        })
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn sort(&self) -> SortMode {
        self.sort
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Appends the `WHERE`, `ORDER BY` and `LIMIT` clauses.
    pub fn push_sql(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE 1 = 1");

        for predicate in &self.predicates {
            qb.push(" AND ").push(predicate.clause());
            predicate.push_bind(qb);
        }

        qb.push(self.sort.order_by());
        qb.push(" LIMIT ").push_bind(self.limit as i64);
    }

    pub fn matches(&self, record: &StoredRecord) -> bool {
        self.predicates.iter().all(|p| p.matches(record))
    }

    /// Evaluates the query over records held in memory.
    pub fn apply<'a, I>(&self, records: I) -> Vec<StoredRecord>
    where
        I: IntoIterator<Item = &'a StoredRecord>,
    {
        let mut selected: Vec<StoredRecord> = records
            .into_iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect();

        match self.sort {
            SortMode::Newest => selected.sort_by_key(|r| Reverse((r.received_at, r.id))),
            SortMode::WeightAsc => selected.sort_by_key(|r| r.reading.weight),
            SortMode::WeightDesc => selected.sort_by_key(|r| Reverse(r.reading.weight)),
        }

        selected.truncate(self.limit);
        selected
    }
}

fn start_of_day(date: Date, tz: &TimeZone) -> Result<Timestamp, jiff::Error> {
    Ok(date.to_zoned(tz.clone())?.timestamp())
}
