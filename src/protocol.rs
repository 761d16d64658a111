use serde::{Deserialize, Serialize};

/// One complete push-cycle payload from `/realtime/stream`.
///
/// Delivered once per cycle as a single SSE data frame. All contained
/// state is a point-in-time view; nothing here is retained across cycles
/// except what the coordinator explicitly copies into a series or the
/// event feed.
#[derive(Clone, Debug, Deserialize)]
pub struct Snapshot {
    pub rates: Rates,
    pub tools: Vec<ToolState>,
    pub recent_events: RecentEvents,
    pub buffer_stats: BufferStats,
}

/// Server-side rate aggregates, already converted to per-minute values.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Rates {
    pub borrow_per_min: f64,
    pub return_per_min: f64,
    pub failure_per_min: f64,
    /// Share of current checkouts that are overage, 0–100.
    pub overage_percent: f64,
}

/// Per-tool seat counts as reported by the server.
///
/// Well-formed data satisfies `borrowed = min(borrowed, commit) + overage`
/// and `available = total - borrowed`; violations are a server defect and
/// are rendered as given, not corrected here.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ToolState {
    pub tool: String,
    pub total: u64,
    pub borrowed: u64,
    pub commit: u64,
    pub overage: u64,
    pub available: u64,
}

/// Events inside the server's fixed look-back window.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RecentEvents {
    #[serde(default)]
    pub borrows: Vec<BorrowEvent>,
    #[serde(default)]
    pub returns: Vec<ReturnEvent>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BorrowEvent {
    pub id: String,
    pub tool: String,
    pub user: String,
    pub timestamp: String,
    #[serde(default)]
    pub is_overage: bool,
}

/// Correlates to the `BorrowEvent` with the same id.
#[derive(Clone, Debug, Deserialize)]
pub struct ReturnEvent {
    pub id: String,
    #[serde(default)]
    pub user: Option<String>,
    pub timestamp: String,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct BufferStats {
    pub total_events: u64,
}

/// One row of `GET /borrows`, the live outstanding-borrow list.
///
/// This is current point-in-time state, a different data source from the
/// historical `recent_events` window in a [`Snapshot`].
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct OutstandingBorrow {
    pub id: String,
    pub tool: String,
    pub user: String,
    pub borrowed_at: String,
}

/// One row of `GET /licenses/status`: snapshot-shaped seat counts plus the
/// derived cost fields consumed by the cost summary panel.
#[derive(Clone, Debug, Deserialize)]
pub struct ToolStatus {
    #[serde(flatten)]
    pub state: ToolState,
    #[serde(default)]
    pub commit_price: f64,
    #[serde(default)]
    pub current_overage_cost: f64,
    #[serde(default)]
    pub total_cost: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct BorrowRequest {
    pub tool: String,
    pub user: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BorrowReceipt {
    pub id: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReturnRequest {
    pub id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReturnReceipt {
    pub tool: String,
}

/// Error body the server attaches to rejected requests.
#[derive(Clone, Debug, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "rates": {"borrow_per_min": 12.4, "return_per_min": 11.0,
                  "failure_per_min": 0.5, "overage_percent": 18.75},
        "tools": [
            {"tool": "CAD Suite", "total": 10, "borrowed": 8,
             "commit": 5, "overage": 3, "available": 2, "in_commit": 5}
        ],
        "recent_events": {
            "borrows": [{"id": "b-1", "tool": "CAD Suite", "user": "alice",
                         "timestamp": "2025-11-03T10:15:00Z", "is_overage": true}],
            "returns": [{"id": "b-0", "user": "bob",
                         "timestamp": "2025-11-03T10:14:30Z"}]
        },
        "buffer_stats": {"total_events": 48211}
    }"#;

    #[test]
    fn parses_full_snapshot() {
        let snap: Snapshot = serde_json::from_str(SAMPLE).unwrap();
        assert!((snap.rates.overage_percent - 18.75).abs() < f64::EPSILON);
        assert_eq!(snap.tools.len(), 1);
        assert_eq!(snap.tools[0].borrowed, 8);
        assert_eq!(snap.recent_events.borrows[0].user, "alice");
        assert!(snap.recent_events.borrows[0].is_overage);
        assert_eq!(snap.recent_events.returns[0].user.as_deref(), Some("bob"));
        assert_eq!(snap.buffer_stats.total_events, 48211);
    }

    #[test]
    fn missing_rates_is_an_error() {
        let err = serde_json::from_str::<Snapshot>(r#"{"tools": []}"#);
        assert!(err.is_err());
    }

    #[test]
    fn empty_recent_events_defaults() {
        let json = r#"{
            "rates": {"borrow_per_min": 0, "return_per_min": 0,
                      "failure_per_min": 0, "overage_percent": 0},
            "tools": [],
            "recent_events": {},
            "buffer_stats": {"total_events": 0}
        }"#;
        let snap: Snapshot = serde_json::from_str(json).unwrap();
        assert!(snap.recent_events.borrows.is_empty());
        assert!(snap.recent_events.returns.is_empty());
    }

    #[test]
    fn tool_status_carries_cost_fields() {
        let json = r#"{"tool": "FEA Solver", "total": 6, "borrowed": 6,
                       "commit": 4, "overage": 2, "available": 0,
                       "commit_price": 4000.0, "current_overage_cost": 900.0,
                       "total_cost": 4900.0}"#;
        let status: ToolStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.state.overage, 2);
        assert!((status.total_cost - 4900.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cost_fields_default_to_zero() {
        let json = r#"{"tool": "FEA Solver", "total": 6, "borrowed": 1,
                       "commit": 4, "overage": 0, "available": 5}"#;
        let status: ToolStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.total_cost, 0.0);
    }
}
