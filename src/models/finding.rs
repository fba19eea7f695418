use url::Url;

use crate::error::{Error, Result};

/// IssueのfindingsURLが指す参照先
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindingRef {
    /// スキャン結果のfinding
    ScanFinding { scan_id: String, finding_id: String },
    /// イベント
    Event { event_id: String },
}

impl FindingRef {
    /// finding URLをパース
    ///
    /// `.../scans/{scan_id}/findings/{finding_id}` と `.../events/{event_id}` に対応。
    pub fn parse(finding_url: &str) -> Result<Self> {
        let url = Url::parse(finding_url)
            .map_err(|e| Error::InvalidInput(format!("Invalid finding URL '{}': {}", finding_url, e)))?;

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|segment| !segment.is_empty()).collect())
            .unwrap_or_default();

        match segments.as_slice() {
            [.., "scans", scan_id, "findings", finding_id]
                if is_object_id(scan_id) && is_object_id(finding_id) =>
            {
                Ok(FindingRef::ScanFinding {
                    scan_id: scan_id.to_string(),
                    finding_id: finding_id.to_string(),
                })
            }
            [.., "events", event_id] if is_object_id(event_id) => Ok(FindingRef::Event {
                event_id: event_id.to_string(),
            }),
            _ => Err(Error::InvalidInput(format!(
                "Unable to determine finding type: {}",
                finding_url
            ))),
        }
    }

    /// Halo APIのパス
    pub fn api_path(&self) -> String {
        match self {
            FindingRef::ScanFinding { scan_id, finding_id } => {
                format!("/v1/scans/{}/findings/{}", scan_id, finding_id)
            }
            FindingRef::Event { event_id } => format!("/v1/events/{}", event_id),
        }
    }
}

fn is_object_id(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
}
