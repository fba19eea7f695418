use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<String>,
    pub status: IssueStatus,
    #[serde(default)]
    pub critical: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,

    // スキーマ外のフィールドはそのまま保持
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Issue {
    /// created_at / last_seen_at / resolved_at のうち最も新しい時刻
    pub fn touched_at(&self) -> DateTime<Utc> {
        [self.last_seen_at, self.resolved_at]
            .into_iter()
            .flatten()
            .fold(self.created_at, std::cmp::max)
    }
}

/// Halo側で管理されるIssueのステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    Active,
    Resolved,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Active => "active",
            IssueStatus::Resolved => "resolved",
        }
    }

    /// このステータスの検索で閾値として使う時刻パラメータ名
    pub fn threshold_param(&self) -> &'static str {
        match self {
            IssueStatus::Active => "last_seen_at_gte",
            IssueStatus::Resolved => "resolved_at_gte",
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Issue詳細APIのレスポンス
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct IssueEnvelope {
    pub issue: Issue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_issue_deserialization() {
        let json_data = json!({
            "id": "b5a4a0a2c3f011e8",
            "name": "Missing password policy",
            "type": "csm",
            "status": "active",
            "critical": true,
            "asset_id": "8b3f0e5ec3f011e8",
            "asset_type": "server",
            "created_at": "2019-01-02T10:00:00.000Z",
            "last_seen_at": "2019-01-05T08:30:00.000Z",
            "resolved_at": null,
            "rule_key": "password_policy",
            "group_name": "Production"
        });

        let issue: Issue = serde_json::from_value(json_data).unwrap();

        assert_eq!(issue.id, "b5a4a0a2c3f011e8");
        assert_eq!(issue.issue_type.as_deref(), Some("csm"));
        assert_eq!(issue.status, IssueStatus::Active);
        assert!(issue.critical);
        assert!(issue.resolved_at.is_none());
        assert_eq!(issue.extra.get("rule_key").unwrap(), "password_policy");
        assert_eq!(issue.extra.get("group_name").unwrap(), "Production");
    }

    #[test]
    fn test_issue_deserialization_rejects_missing_created_at() {
        let json_data = json!({
            "id": "abc",
            "status": "resolved"
        });

        assert!(serde_json::from_value::<Issue>(json_data).is_err());
    }

    #[test]
    fn test_issue_deserialization_rejects_unknown_status() {
        let json_data = json!({
            "id": "abc",
            "status": "snoozed",
            "created_at": "2019-01-02T10:00:00Z"
        });

        assert!(serde_json::from_value::<Issue>(json_data).is_err());
    }

    #[test]
    fn test_touched_at_picks_newest_timestamp() {
        let issue: Issue = serde_json::from_value(json!({
            "id": "abc",
            "status": "resolved",
            "created_at": "2019-01-01T00:00:00Z",
            "last_seen_at": "2019-01-03T00:00:00Z",
            "resolved_at": "2019-01-02T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(
            issue.touched_at(),
            Utc.with_ymd_and_hms(2019, 1, 3, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_touched_at_falls_back_to_created_at() {
        let issue: Issue = serde_json::from_value(json!({
            "id": "abc",
            "status": "active",
            "created_at": "2019-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(issue.touched_at(), issue.created_at);
    }

    #[test]
    fn test_issue_status_params() {
        assert_eq!(IssueStatus::Active.threshold_param(), "last_seen_at_gte");
        assert_eq!(IssueStatus::Resolved.threshold_param(), "resolved_at_gte");
        assert_eq!(IssueStatus::Resolved.to_string(), "resolved");
    }
}
