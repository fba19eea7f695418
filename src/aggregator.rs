use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::HaloClient;
use crate::error::{Error, Result, TruncationWarning};
use crate::models::{
    DEFAULT_ASSET_STATES, Issue, IssueQuery, IssueStatus, IssuesPage, MAX_PER_PAGE,
};
use crate::time_filter::Threshold;

/// ステータスごとに取得できる最大件数（Halo APIの制限）
pub const MAX_RECORDS_PER_STATUS: usize = 2000;

/// Issueの取得元
#[async_trait]
pub trait IssueSource: Send + Sync {
    /// Issue一覧を1ページ分取得
    async fn list_issues(&self, query: &IssueQuery) -> Result<IssuesPage>;

    /// Issueの全項目を取得
    async fn describe_issue(&self, issue_id: &str, timeout: Option<Duration>) -> Result<Issue>;
}

#[async_trait]
impl IssueSource for HaloClient {
    async fn list_issues(&self, query: &IssueQuery) -> Result<IssuesPage> {
        HaloClient::list_issues(self, query).await
    }

    async fn describe_issue(&self, issue_id: &str, timeout: Option<Duration>) -> Result<Issue> {
        HaloClient::describe_issue(self, issue_id, timeout).await
    }
}

/// 集約処理の設定
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// 取得対象のステータス（この順で取得し、重複時は先に取得したものを残す）
    pub statuses: Vec<IssueStatus>,
    /// criticalなIssueのみ取得
    pub critical_only: bool,
    /// アセット状態フィルター
    pub asset_states: Vec<String>,
    /// 1ページあたりの件数
    pub per_page: u32,
    /// ステータスごとの最大件数
    pub max_records_per_status: usize,
    /// Issue詳細取得の並行数
    pub describe_concurrency: usize,
    /// 各リクエストのタイムアウト
    pub request_timeout: Option<Duration>,
}

impl AggregatorConfig {
    pub fn new() -> Self {
        Self {
            statuses: vec![IssueStatus::Resolved, IssueStatus::Active],
            critical_only: true,
            asset_states: DEFAULT_ASSET_STATES.iter().map(|s| s.to_string()).collect(),
            per_page: MAX_PER_PAGE,
            max_records_per_status: MAX_RECORDS_PER_STATUS,
            describe_concurrency: 5,
            request_timeout: None,
        }
    }

    pub fn statuses(mut self, statuses: Vec<IssueStatus>) -> Self {
        self.statuses = statuses;
        self
    }

    pub fn critical_only(mut self, critical_only: bool) -> Self {
        self.critical_only = critical_only;
        self
    }

    pub fn asset_states(mut self, states: Vec<String>) -> Self {
        self.asset_states = states;
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn max_records_per_status(mut self, max: usize) -> Self {
        self.max_records_per_status = max;
        self
    }

    pub fn describe_concurrency(mut self, concurrency: usize) -> Self {
        self.describe_concurrency = concurrency;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// 設定の妥当性チェック
    pub fn validate(&self) -> Result<()> {
        if self.statuses.is_empty() {
            return Err(Error::InvalidConfiguration(
                "At least one issue status must be tracked".to_string(),
            ));
        }

        let unique: HashSet<_> = self.statuses.iter().collect();
        if unique.len() != self.statuses.len() {
            return Err(Error::InvalidConfiguration(
                "Issue statuses must not repeat".to_string(),
            ));
        }

        if self.per_page == 0 || self.per_page > MAX_PER_PAGE {
            return Err(Error::InvalidConfiguration(format!(
                "per_page must be between 1 and {}",
                MAX_PER_PAGE
            )));
        }

        if self.max_records_per_status == 0 {
            return Err(Error::InvalidConfiguration(
                "max_records_per_status must be at least 1".to_string(),
            ));
        }

        if self.describe_concurrency == 0 {
            return Err(Error::InvalidConfiguration(
                "describe_concurrency must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    fn base_query(&self, status: IssueStatus, since: Threshold) -> IssueQuery {
        IssueQuery::new(status, since)
            .asset_states(self.asset_states.clone())
            .critical_only(self.critical_only)
            .per_page(self.per_page)
            .timeout(self.request_timeout)
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// ステータスごとの取得結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub status: IssueStatus,
    /// 取得したページ数
    pub pages: u32,
    /// 取得したIssue数（上限で切り詰めた後）
    pub fetched: usize,
    /// 上限に達して続きを取得しなかったかどうか
    pub truncated: bool,
}

impl StatusSummary {
    fn new(status: IssueStatus) -> Self {
        Self {
            status,
            pages: 0,
            fetched: 0,
            truncated: false,
        }
    }
}

/// 集約結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedIssues {
    /// 重複除外済みのIssue（ステータス順、ページ順、ページ内の順）
    pub issues: Vec<Issue>,
    pub summaries: Vec<StatusSummary>,
    /// 閾値より前のため除外した件数
    pub discarded: usize,
    /// 重複のため除外した件数
    pub duplicates: usize,
    /// ステータスごとの最大件数
    pub ceiling: usize,
}

impl AggregatedIssues {
    /// いずれかのステータスで上限に達したか
    pub fn is_truncated(&self) -> bool {
        self.summaries.iter().any(|s| s.truncated)
    }

    pub fn truncation_warnings(&self) -> Vec<TruncationWarning> {
        self.summaries
            .iter()
            .filter(|s| s.truncated)
            .map(|s| TruncationWarning {
                status: s.status,
                ceiling: self.ceiling,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.issues.iter().map(|i| i.id.as_str()).collect()
    }

    pub fn into_issues(self) -> Vec<Issue> {
        self.issues
    }
}

/// 重複除外処理（先に出現したものを残す）
///
/// 除外後のIssueと除外した件数を返す。
pub fn deduplicate_issues(issues: Vec<Issue>) -> (Vec<Issue>, usize) {
    let mut seen_ids = HashSet::new();
    let mut deduplicated = Vec::with_capacity(issues.len());
    let mut duplicates = 0;

    for issue in issues {
        if seen_ids.insert(issue.id.clone()) {
            deduplicated.push(issue);
        } else {
            duplicates += 1;
        }
    }

    (deduplicated, duplicates)
}

/// 複数ステータスのIssueを取得し、1つの結果にまとめる
pub struct IssueAggregator<S = HaloClient> {
    source: S,
    config: AggregatorConfig,
}

impl<S: IssueSource> IssueAggregator<S> {
    pub fn new(source: S, config: AggregatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { source, config })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// 指定時刻以降に作成・検知・解決されたIssueをすべて取得
    pub async fn issues_touched_since(&self, since: &str) -> Result<AggregatedIssues> {
        let threshold = Threshold::parse(since)?;
        self.aggregate(&threshold).await
    }

    /// 指定時刻以降のIssueをすべて取得し、各Issueの全項目を取得し直す
    pub async fn describe_all_issues(&self, since: &str) -> Result<AggregatedIssues> {
        let touched = self.issues_touched_since(since).await?;

        info!(
            count = touched.len(),
            concurrency = self.config.describe_concurrency,
            "Describing all Halo issues"
        );

        let described: Vec<Issue> = stream::iter(
            touched
                .issues
                .iter()
                .map(|issue| {
                    self.source
                        .describe_issue(&issue.id, self.config.request_timeout)
                }),
        )
        .buffered(self.config.describe_concurrency)
        .try_collect()
        .await?;

        Ok(AggregatedIssues {
            issues: described,
            ..touched
        })
    }

    /// 集約処理本体
    ///
    /// いずれかのリクエストが失敗した場合は途中結果を返さずにエラーとする。
    pub async fn aggregate(&self, since: &Threshold) -> Result<AggregatedIssues> {
        let mut combined = Vec::new();
        let mut summaries = Vec::with_capacity(self.config.statuses.len());

        for &status in &self.config.statuses {
            let (issues, summary) = self.fetch_status(status, *since).await?;

            info!(
                status = %status,
                count = summary.fetched,
                pages = summary.pages,
                "Fetched Halo issues"
            );
            if summary.truncated {
                warn!(
                    status = %status,
                    ceiling = self.config.max_records_per_status,
                    "Issue ceiling reached, remaining issues are not retrievable"
                );
            }

            combined.extend(issues);
            summaries.push(summary);
        }

        let (in_range, discarded) = since.partition(combined);
        if !discarded.is_empty() {
            info!(
                discarded = discarded.len(),
                "Discarding issues outside of time range"
            );
            for issue in &discarded {
                debug!(
                    issue_id = %issue.id,
                    touched_at = %issue.touched_at(),
                    "Issue out of time range (discarding)"
                );
            }
        }

        let (issues, duplicates) = deduplicate_issues(in_range);

        Ok(AggregatedIssues {
            issues,
            summaries,
            discarded: discarded.len(),
            duplicates,
            ceiling: self.config.max_records_per_status,
        })
    }

    /// 1ステータス分をページ送りしながら取得
    async fn fetch_status(
        &self,
        status: IssueStatus,
        since: Threshold,
    ) -> Result<(Vec<Issue>, StatusSummary)> {
        let ceiling = self.config.max_records_per_status;
        let mut query = self.config.base_query(status, since);
        let mut summary = StatusSummary::new(status);
        let mut buffer: Vec<Issue> = Vec::new();

        loop {
            let page = self.source.list_issues(&query).await?;
            summary.pages += 1;

            let has_next = page.has_next();
            let received = page.issues.len();
            debug!(
                status = %status,
                page = query.page,
                received,
                has_next,
                "Received issues page"
            );

            buffer.extend(page.issues);

            if buffer.len() >= ceiling {
                summary.truncated = has_next || buffer.len() > ceiling;
                buffer.truncate(ceiling);
                break;
            }

            // 空ページで続きがあると言われても打ち切る
            if !has_next || received == 0 {
                break;
            }

            query = query.next_page();
        }

        summary.fetched = buffer.len();
        Ok((buffer, summary))
    }
}
