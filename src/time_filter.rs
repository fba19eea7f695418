use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::models::Issue;

/// 取得対象の下限時刻（この時刻以降に作成・検知・解決されたIssueを対象とする）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Threshold(DateTime<Utc>);

impl Threshold {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// ISO 8601の日付、またはRFC 3339 / オフセットなしの日時をパース
    ///
    /// 日付のみの場合はUTCの0時、オフセットなしの日時はUTCとして扱う。
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self(dt.with_timezone(&Utc)));
        }

        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                return Ok(Self(naive.and_utc()));
            }
        }

        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                return Ok(Self(midnight.and_utc()));
            }
        }

        Err(Error::InvalidInput(format!(
            "Unrecognized timestamp '{}': expected an ISO 8601 date or datetime",
            s
        )))
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// APIのクエリパラメータ用の表現（例: 2019-01-01T00:00:00.000Z）
    pub fn to_query_value(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Issueが閾値以降に更新されているか
    pub fn includes(&self, issue: &Issue) -> bool {
        issue.touched_at() >= self.0
    }

    /// 閾値以降のIssueと範囲外のIssueに分割（順序は保持）
    pub fn partition(&self, issues: Vec<Issue>) -> (Vec<Issue>, Vec<Issue>) {
        issues.into_iter().partition(|issue| self.includes(issue))
    }
}

impl FromStr for Threshold {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<DateTime<Utc>> for Threshold {
    fn from(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn issue_touched(id: &str, created: &str, last_seen: Option<&str>) -> Issue {
        serde_json::from_value(json!({
            "id": id,
            "status": "active",
            "created_at": created,
            "last_seen_at": last_seen,
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_date_only() {
        let threshold = Threshold::parse("2019-01-01").unwrap();

        assert_eq!(
            threshold.as_datetime(),
            Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(threshold.to_query_value(), "2019-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let threshold = Threshold::parse("2019-01-01T09:00:00+09:00").unwrap();

        assert_eq!(
            threshold.as_datetime(),
            Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_naive_datetime_as_utc() {
        let threshold: Threshold = "2019-03-04T05:06:07.250".parse().unwrap();

        assert_eq!(threshold.to_query_value(), "2019-03-04T05:06:07.250Z");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let result = Threshold::parse("last tuesday");

        match result.unwrap_err() {
            Error::InvalidInput(msg) => assert!(msg.contains("last tuesday")),
            other => panic!("Expected InvalidInput error, got {:?}", other),
        }
    }

    #[test]
    fn test_includes_is_inclusive() {
        let threshold = Threshold::parse("2019-01-02").unwrap();

        let on_boundary = issue_touched("a", "2019-01-02T00:00:00Z", None);
        let before = issue_touched("b", "2018-12-30T00:00:00Z", Some("2019-01-01T23:59:59Z"));
        let seen_after = issue_touched("c", "2018-12-30T00:00:00Z", Some("2019-01-03T00:00:00Z"));

        assert!(threshold.includes(&on_boundary));
        assert!(!threshold.includes(&before));
        assert!(threshold.includes(&seen_after));
    }

    #[test]
    fn test_partition_preserves_order() {
        let threshold = Threshold::parse("2019-01-02").unwrap();
        let issues = vec![
            issue_touched("a", "2019-01-05T00:00:00Z", None),
            issue_touched("b", "2018-01-01T00:00:00Z", None),
            issue_touched("c", "2019-01-03T00:00:00Z", None),
        ];

        let (kept, discarded) = threshold.partition(issues);

        let kept_ids: Vec<_> = kept.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(kept_ids, vec!["a", "c"]);
        assert_eq!(discarded.len(), 1);
        assert_eq!(discarded[0].id, "b");
    }
}
