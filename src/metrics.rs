//! Engineering metrics derived from pull request and branch records.
//!
//! Every aggregation here is a pure function of its input and an explicit `now`.
//! Records are filtered to a trailing lookback window and grouped by ISO week;
//! weeks without activity are omitted rather than zero-filled.

use chrono::{DateTime, Datelike, Months, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

const MILLIS_PER_HOUR: f64 = 60.0 * 60.0 * 1000.0;

/// A pull request as consumed by the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PullRequestRecord {
    pub number: u64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(rename = "user")]
    pub author: String,
    #[serde(rename = "merge_time")]
    merge_time_hours: Option<f64>,
}

impl PullRequestRecord {
    pub fn new(
        number: u64,
        title: impl Into<String>,
        created_at: DateTime<Utc>,
        merged_at: Option<DateTime<Utc>>,
        author: impl Into<String>,
    ) -> Self {
        let merge_time_hours = merged_at
            .map(|merged_at| (merged_at - created_at).num_milliseconds() as f64 / MILLIS_PER_HOUR);

        Self {
            number,
            title: title.into(),
            created_at,
            merged_at,
            author: author.into(),
            merge_time_hours,
        }
    }

    /// Hours between creation and merge. `None` for unmerged pull requests.
    pub fn merge_time_hours(&self) -> Option<f64> {
        self.merge_time_hours
    }

    pub fn is_merged(&self) -> bool {
        self.merged_at.is_some()
    }
}

/// Commit activity on a single branch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchSummary {
    pub name: String,
    pub commit_count: usize,
    #[serde(rename = "earliestCommit")]
    pub earliest_commit_at: Option<DateTime<Utc>>,
    #[serde(rename = "latestCommit")]
    pub latest_commit_at: Option<DateTime<Utc>>,
}

impl BranchSummary {
    /// Summarizes a branch from its commit list.
    ///
    /// `commit_count` counts every commit, while the earliest and latest timestamps
    /// only consider commits that carry a date.
    pub fn from_commits(
        name: impl Into<String>,
        commit_count: usize,
        commit_dates: impl IntoIterator<Item = DateTime<Utc>>,
    ) -> Self {
        let (earliest, latest) = commit_dates.into_iter().fold(
            (None::<DateTime<Utc>>, None::<DateTime<Utc>>),
            |(earliest, latest), date| {
                (
                    Some(earliest.map_or(date, |e| e.min(date))),
                    Some(latest.map_or(date, |l| l.max(date))),
                )
            },
        );

        Self {
            name: name.into(),
            commit_count,
            earliest_commit_at: earliest,
            latest_commit_at: latest,
        }
    }
}

/// Everything the dashboard needs for one repository.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsPayload {
    #[serde(rename = "prs")]
    pub pull_requests: Vec<PullRequestRecord>,
    pub branches: Vec<BranchSummary>,
    #[serde(rename = "avgMergeTime", serialize_with = "serialize_two_decimals")]
    pub average_merge_time_hours: f64,
    #[serde(rename = "totalBranchActivity")]
    pub total_branch_count: usize,
}

impl MetricsPayload {
    pub fn new(pull_requests: Vec<PullRequestRecord>, branches: Vec<BranchSummary>) -> Self {
        let average_merge_time_hours = average_merge_time_hours(&pull_requests);
        let total_branch_count = branches.len();

        Self {
            pull_requests,
            branches,
            average_merge_time_hours,
            total_branch_count,
        }
    }
}

fn serialize_two_decimals<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64((value * 100.0).round() / 100.0)
}

/// Mean merge time in hours over every merged pull request, or 0 when none are merged.
pub fn average_merge_time_hours(prs: &[PullRequestRecord]) -> f64 {
    let (sum, count) = prs
        .iter()
        .filter_map(PullRequestRecord::merge_time_hours)
        .fold((0.0, 0usize), |(sum, count), hours| (sum + hours, count + 1));

    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// The trailing period covered by the charts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum TimeRange {
    #[default]
    #[serde(rename = "3 months")]
    ThreeMonths,
    #[serde(rename = "6 months")]
    SixMonths,
}

impl TimeRange {
    pub fn from_months(months: u32) -> Option<Self> {
        match months {
            3 => Some(Self::ThreeMonths),
            6 => Some(Self::SixMonths),
            _ => None,
        }
    }

    pub fn months(self) -> u32 {
        match self {
            Self::ThreeMonths => 3,
            Self::SixMonths => 6,
        }
    }
}

/// Closed interval `[now - range, now]`, stepping back whole calendar months.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookbackWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl LookbackWindow {
    pub fn new(range: TimeRange, now: DateTime<Utc>) -> Self {
        let start = now
            .checked_sub_months(Months::new(range.months()))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        Self { start, end: now }
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

/// ISO-8601 week of a timestamp. Orders chronologically, including across years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeekKey {
    year: i32,
    week: u32,
}

impl WeekKey {
    pub fn of(timestamp: DateTime<Utc>) -> Self {
        let iso = timestamp.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W{:02}, {}", self.week, self.year)
    }
}

/// Week labels with one value per label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeBucketSeries<V> {
    labels: Vec<String>,
    values: Vec<V>,
}

impl<V> TimeBucketSeries<V> {
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn values(&self) -> &[V] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl<V> FromIterator<(String, V)> for TimeBucketSeries<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        let (labels, values) = iter.into_iter().unzip();
        Self { labels, values }
    }
}

/// Records grouped by the week they fall into.
pub struct WeeklyBuckets<'a, T> {
    weeks: BTreeMap<WeekKey, Vec<&'a T>>,
}

impl<'a, T> WeeklyBuckets<'a, T> {
    /// Number of records per week.
    pub fn count(&self) -> TimeBucketSeries<u32> {
        self.weeks
            .iter()
            .map(|(week, items)| (week.to_string(), items.len() as u32))
            .collect()
    }

    /// Arithmetic mean of `value` per week. Records without a value are skipped,
    /// and a week left with no values reports 0.
    pub fn mean(&self, value: impl Fn(&T) -> Option<f64>) -> TimeBucketSeries<f64> {
        self.weeks
            .iter()
            .map(|(week, items)| {
                let values: Vec<f64> = items.iter().filter_map(|item| value(*item)).collect();
                let mean = if values.is_empty() {
                    0.0
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                };
                (week.to_string(), mean)
            })
            .collect()
    }

    /// Every bucketed record, in week order.
    pub fn records(&self) -> impl Iterator<Item = &'a T> + '_ {
        self.weeks.values().flat_map(|items| items.iter().copied())
    }
}

/// Groups `items` by week.
///
/// An item is kept when `window_ts` falls inside `window`; it is then placed in the
/// week of `bucket_ts`. Items missing either timestamp are dropped.
pub fn bucket_by_week<'a, T>(
    items: &'a [T],
    window: &LookbackWindow,
    window_ts: impl Fn(&T) -> Option<DateTime<Utc>>,
    bucket_ts: impl Fn(&T) -> Option<DateTime<Utc>>,
) -> WeeklyBuckets<'a, T> {
    let mut weeks: BTreeMap<WeekKey, Vec<&'a T>> = BTreeMap::new();

    for item in items {
        if !window_ts(item).is_some_and(|ts| window.contains(ts)) {
            continue;
        }
        if let Some(ts) = bucket_ts(item) {
            weeks.entry(WeekKey::of(ts)).or_default().push(item);
        }
    }

    WeeklyBuckets { weeks }
}

/// Merged pull requests per week and per author.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PullRequestActivity {
    pub merged: TimeBucketSeries<u32>,
    pub contributors: BTreeMap<String, u32>,
}

fn merged_buckets<'a>(
    prs: &'a [PullRequestRecord],
    range: TimeRange,
    now: DateTime<Utc>,
) -> WeeklyBuckets<'a, PullRequestRecord> {
    let window = LookbackWindow::new(range, now);
    bucket_by_week(prs, &window, |pr| Some(pr.created_at), |pr| pr.merged_at)
}

/// Counts merged pull requests per week of merge, for pull requests opened inside the window.
pub fn aggregate_pull_requests(
    prs: &[PullRequestRecord],
    range: TimeRange,
    now: DateTime<Utc>,
) -> PullRequestActivity {
    let buckets = merged_buckets(prs, range, now);

    let mut contributors = BTreeMap::new();
    for pr in buckets.records() {
        *contributors.entry(pr.author.clone()).or_insert(0) += 1;
    }

    PullRequestActivity {
        merged: buckets.count(),
        contributors,
    }
}

/// Average merge time in hours per week of merge.
pub fn aggregate_merge_time(
    prs: &[PullRequestRecord],
    range: TimeRange,
    now: DateTime<Utc>,
) -> TimeBucketSeries<f64> {
    merged_buckets(prs, range, now).mean(PullRequestRecord::merge_time_hours)
}

/// Branches per week of their earliest commit.
pub fn aggregate_branch_activity(
    branches: &[BranchSummary],
    range: TimeRange,
    now: DateTime<Utc>,
) -> TimeBucketSeries<u32> {
    let window = LookbackWindow::new(range, now);
    bucket_by_week(
        branches,
        &window,
        |branch| branch.earliest_commit_at,
        |branch| branch.earliest_commit_at,
    )
    .count()
}

/// Merged pull requests of a single author, aligned to `labels`.
///
/// Weeks in `labels` where the author merged nothing are reported as 0, so the
/// result can be drawn on the same axis as the team series.
pub fn aggregate_contributor(
    prs: &[PullRequestRecord],
    author: &str,
    range: TimeRange,
    now: DateTime<Utc>,
    labels: &[String],
) -> TimeBucketSeries<u32> {
    let own: Vec<PullRequestRecord> = prs
        .iter()
        .filter(|pr| pr.author == author)
        .cloned()
        .collect();
    let counts = merged_buckets(&own, range, now).count();

    let by_label: BTreeMap<&str, u32> = counts
        .labels()
        .iter()
        .map(String::as_str)
        .zip(counts.values().iter().copied())
        .collect();

    labels
        .iter()
        .map(|label| {
            let count = by_label.get(label.as_str()).copied().unwrap_or(0);
            (label.clone(), count)
        })
        .collect()
}
