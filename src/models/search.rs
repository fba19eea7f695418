use super::{Issue, IssueStatus};
use crate::time_filter::Threshold;
use serde::Deserialize;
use std::time::Duration;

/// 1ページあたりの最大件数（Halo APIの上限）
pub const MAX_PER_PAGE: u32 = 100;

/// 既定のアセット状態フィルター
pub const DEFAULT_ASSET_STATES: [&str; 4] = ["active", "inactive", "missing", "retired"];

/// Issue一覧APIへの1回分の問い合わせ
#[derive(Debug, Clone, PartialEq)]
pub struct IssueQuery {
    pub status: IssueStatus,
    pub since: Threshold,
    pub asset_states: Vec<String>,
    pub critical_only: bool,
    pub page: u32,
    pub per_page: u32,
    pub timeout: Option<Duration>,
}

impl IssueQuery {
    pub fn new(status: IssueStatus, since: Threshold) -> Self {
        Self {
            status,
            since,
            asset_states: DEFAULT_ASSET_STATES.iter().map(|s| s.to_string()).collect(),
            critical_only: false,
            page: 1,
            per_page: MAX_PER_PAGE,
            timeout: None,
        }
    }

    pub fn asset_states(mut self, states: Vec<String>) -> Self {
        self.asset_states = states;
        self
    }

    pub fn critical_only(mut self, critical_only: bool) -> Self {
        self.critical_only = critical_only;
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// 1..=100 の範囲に丸める
    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.clamp(1, MAX_PER_PAGE);
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// 次のページ用のクエリ
    pub fn next_page(&self) -> Self {
        self.clone().page(self.page + 1)
    }

    /// URLクエリパラメータに変換
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("status", self.status.as_str().to_string())];

        if !self.asset_states.is_empty() {
            pairs.push(("state", self.asset_states.join(",")));
        }
        if self.critical_only {
            pairs.push(("critical", "true".to_string()));
        }

        pairs.push((self.status.threshold_param(), self.since.to_query_value()));
        pairs.push(("page", self.page.to_string()));
        pairs.push(("per_page", self.per_page.to_string()));
        pairs
    }
}

/// Issue一覧APIのレスポンス1ページ分
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssuesPage {
    #[serde(default)]
    pub count: u64,
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
}

impl IssuesPage {
    /// 続きのページがあるかどうか
    pub fn has_next(&self) -> bool {
        self.pagination
            .as_ref()
            .is_some_and(|p| p.next.as_deref().is_some_and(|next| !next.is_empty()))
    }
}
