//! Predicates and ordering for [`JobStore::query`](super::JobStore::query).

use chrono::{DateTime, Utc};

use crate::db::format_timestamp;
use crate::db::job_repo::{JobFilter, SortOrder};
use crate::model::{JobRecord, JobStatus};

/// Which records a query selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPredicate {
    All,
    ByStatus(JobStatus),
    ByTool(String),
    ByStatusAndTool(JobStatus, String),
    /// `from <= created_at <= to`.
    CreatedBetween(DateTime<Utc>, DateTime<Utc>),
    /// `created_at >= since`.
    CreatedSince(DateTime<Utc>),
    /// FAILED and `created_at >= since`.
    FailedSince(DateTime<Utc>),
    /// PENDING or PROCESSING.
    Active,
    /// Incomplete and `created_at < cutoff`.
    StaleBefore(DateTime<Utc>),
    /// COMPLETED and `completed_at < cutoff`.
    CompletedBefore(DateTime<Utc>),
    ByResultHash(String),
    /// COMPLETED jobs of `tool_name` produced from the same input.
    ReusableResult {
        tool_name: String,
        input_fingerprint: String,
    },
}

impl JobPredicate {
    pub fn matches(&self, job: &JobRecord) -> bool {
        match self {
            JobPredicate::All => true,
            JobPredicate::ByStatus(status) => job.status == *status,
            JobPredicate::ByTool(tool) => job.tool_name == *tool,
            JobPredicate::ByStatusAndTool(status, tool) => {
                job.status == *status && job.tool_name == *tool
            }
            JobPredicate::CreatedBetween(from, to) => {
                job.created_at >= *from && job.created_at <= *to
            }
            JobPredicate::CreatedSince(since) => job.created_at >= *since,
            JobPredicate::FailedSince(since) => {
                job.status == JobStatus::Failed && job.created_at >= *since
            }
            JobPredicate::Active => job.status.is_active(),
            JobPredicate::StaleBefore(cutoff) => {
                job.status.is_active() && job.created_at < *cutoff
            }
            JobPredicate::CompletedBefore(cutoff) => {
                job.status == JobStatus::Completed
                    && job.completed_at.map_or(false, |at| at < *cutoff)
            }
            JobPredicate::ByResultHash(hash) => job.result_hash.as_deref() == Some(hash.as_str()),
            JobPredicate::ReusableResult {
                tool_name,
                input_fingerprint,
            } => {
                job.status == JobStatus::Completed
                    && job.tool_name == *tool_name
                    && job.input_fingerprint.as_deref() == Some(input_fingerprint.as_str())
                    && job.result_url.is_some()
            }
        }
    }

    /// Lowers the predicate to the SQL filter of the `jobs` table.
    pub(crate) fn to_filter(&self) -> JobFilter {
        let status = |s: JobStatus| vec![s.as_str().to_string()];
        let active = || {
            vec![
                JobStatus::Pending.as_str().to_string(),
                JobStatus::Processing.as_str().to_string(),
            ]
        };

        match self {
            JobPredicate::All => JobFilter::default(),
            JobPredicate::ByStatus(s) => JobFilter {
                statuses: status(*s),
                ..Default::default()
            },
            JobPredicate::ByTool(tool) => JobFilter {
                tool_name: Some(tool.clone()),
                ..Default::default()
            },
            JobPredicate::ByStatusAndTool(s, tool) => JobFilter {
                statuses: status(*s),
                tool_name: Some(tool.clone()),
                ..Default::default()
            },
            JobPredicate::CreatedBetween(from, to) => JobFilter {
                created_from: Some(format_timestamp(*from)),
                created_to: Some(format_timestamp(*to)),
                ..Default::default()
            },
            JobPredicate::CreatedSince(since) => JobFilter {
                created_from: Some(format_timestamp(*since)),
                ..Default::default()
            },
            JobPredicate::FailedSince(since) => JobFilter {
                statuses: status(JobStatus::Failed),
                created_from: Some(format_timestamp(*since)),
                ..Default::default()
            },
            JobPredicate::Active => JobFilter {
                statuses: active(),
                ..Default::default()
            },
            JobPredicate::StaleBefore(cutoff) => JobFilter {
                statuses: active(),
                created_before: Some(format_timestamp(*cutoff)),
                ..Default::default()
            },
            JobPredicate::CompletedBefore(cutoff) => JobFilter {
                statuses: status(JobStatus::Completed),
                completed_before: Some(format_timestamp(*cutoff)),
                ..Default::default()
            },
            JobPredicate::ByResultHash(hash) => JobFilter {
                result_hash: Some(hash.clone()),
                ..Default::default()
            },
            JobPredicate::ReusableResult {
                tool_name,
                input_fingerprint,
            } => JobFilter {
                statuses: status(JobStatus::Completed),
                tool_name: Some(tool_name.clone()),
                input_fingerprint: Some(input_fingerprint.clone()),
                ..Default::default()
            },
        }
    }
}

/// Ordering of query results. `Unordered` leaves the order to the backend.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrder {
    #[default]
    Unordered,
    /// Oldest `created_at` first, ties broken by `id`.
    OldestFirst,
    /// Newest `created_at` first, ties broken by `id`.
    NewestFirst,
}

impl From<QueryOrder> for SortOrder {
    fn from(order: QueryOrder) -> Self {
        match order {
            QueryOrder::Unordered => SortOrder::Unordered,
            QueryOrder::OldestFirst => SortOrder::OldestFirst,
            QueryOrder::NewestFirst => SortOrder::NewestFirst,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobQuery {
    pub predicate: JobPredicate,
    pub order: QueryOrder,
    pub limit: Option<usize>,
}

impl JobQuery {
    pub fn new(predicate: JobPredicate) -> Self {
        Self {
            predicate,
            order: QueryOrder::Unordered,
            limit: None,
        }
    }

    pub fn all() -> Self {
        Self::new(JobPredicate::All)
    }

    pub fn oldest_first(mut self) -> Self {
        self.order = QueryOrder::OldestFirst;
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.order = QueryOrder::NewestFirst;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn to_filter(&self) -> JobFilter {
        JobFilter {
            order: self.order.into(),
            limit: self.limit.map(|l| l as u64),
            ..self.predicate.to_filter()
        }
    }

    /// Applies this query to an in-memory set of records.
    pub(crate) fn apply<'a, I>(&self, records: I) -> Vec<JobRecord>
    where
        I: IntoIterator<Item = &'a JobRecord>,
    {
        let mut matched: Vec<JobRecord> = records
            .into_iter()
            .filter(|job| self.predicate.matches(job))
            .cloned()
            .collect();

        match self.order {
            QueryOrder::Unordered => {}
            QueryOrder::OldestFirst => matched.sort_by(|a, b| {
                a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
            }),
            QueryOrder::NewestFirst => matched.sort_by(|a, b| {
                b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
            }),
        }

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}

impl From<JobPredicate> for JobQuery {
    fn from(predicate: JobPredicate) -> Self {
        Self::new(predicate)
    }
}
