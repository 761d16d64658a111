use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::protocol::{BorrowEvent, OutstandingBorrow, RecentEvents, ToolState};

/// How an overage rate should be presented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverageLevel {
    Normal,
    Warning,
    Critical,
}

/// Classify an overage percentage against the contract thresholds.
/// Boundary values sit in the lower tier: exactly 15 is Normal,
/// exactly 30 is Warning.
pub fn classify_overage(percent: f64) -> OverageLevel {
    if percent > 30.0 {
        OverageLevel::Critical
    } else if percent > 15.0 {
        OverageLevel::Warning
    } else {
        OverageLevel::Normal
    }
}

/// Rate value as shown on a metric card. Thresholding and pulse detection
/// on integer-rate cards use this same rounded value.
pub fn display_rate(rate: f64) -> i64 {
    rate.round() as i64
}

/// The three-way seat split for one tool's stacked utilization bar.
///
/// The segments are rendered exactly as derived from the server's counts;
/// if they fail to sum to `total` that is upstream data, not ours to fix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UtilizationSplit {
    pub in_commit: u64,
    pub in_overage: u64,
    pub available: u64,
}

pub fn utilization_split(tool: &ToolState) -> UtilizationSplit {
    UtilizationSplit {
        in_commit: tool.borrowed.min(tool.commit),
        in_overage: tool.overage,
        available: tool.available,
    }
}

impl UtilizationSplit {
    pub fn sum(&self) -> u64 {
        self.in_commit + self.in_overage + self.available
    }
}

/// Seats currently checked out across the whole pool.
pub fn total_borrowed(tools: &[ToolState]) -> u64 {
    tools.iter().map(|t| t.borrowed).sum()
}

/// Overage checkouts inside the recent-events window.
pub fn overage_count(borrows: &[BorrowEvent]) -> usize {
    borrows.iter().filter(|b| b.is_overage).count()
}

/// Group the live outstanding-borrow list by user for one tool.
///
/// Input is the point-in-time `/borrows` list, not the historical
/// recent-events window. Sorted by count descending, then name, so the
/// donut reads largest-first and stays stable between refreshes.
pub fn user_distribution(borrows: &[OutstandingBorrow], tool: &str) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for b in borrows.iter().filter(|b| b.tool == tool) {
        *counts.entry(b.user.as_str()).or_insert(0) += 1;
    }
    let mut out: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(user, n)| (user.to_string(), n))
        .collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

// ─── ACTIVITY ROWS ──────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activity {
    Borrow { overage: bool },
    Return,
}

/// One rendered line of borrow/return activity.
#[derive(Clone, Debug)]
pub struct ActivityRow {
    /// Borrow id; a return carries the id of the borrow it closes.
    pub id: String,
    pub timestamp: String,
    pub time: String,
    pub tool: String,
    pub user: String,
    pub activity: Activity,
}

/// Flatten a recent-events window into display rows, newest first.
///
/// With `tool` set, only that tool's borrows are kept and returns are
/// matched to them by id (the window carries no tool on returns). Without
/// a filter, returns are still correlated to borrows in the same window to
/// recover their tool; uncorrelated ones render with an unknown tool.
pub fn activity_rows(events: &RecentEvents, tool: Option<&str>, limit: usize) -> Vec<ActivityRow> {
    let borrows: Vec<&BorrowEvent> = events
        .borrows
        .iter()
        .filter(|b| tool.is_none_or(|t| b.tool == t))
        .collect();

    let mut rows: Vec<ActivityRow> = borrows
        .iter()
        .map(|b| ActivityRow {
            id: b.id.clone(),
            timestamp: b.timestamp.clone(),
            time: time_label(&b.timestamp),
            tool: b.tool.clone(),
            user: b.user.clone(),
            activity: Activity::Borrow {
                overage: b.is_overage,
            },
        })
        .collect();

    for r in &events.returns {
        let Some(matched) = borrows.iter().find(|b| b.id == r.id) else {
            if tool.is_some() {
                continue;
            }
            rows.push(ActivityRow {
                id: r.id.clone(),
                timestamp: r.timestamp.clone(),
                time: time_label(&r.timestamp),
                tool: String::from("unknown"),
                user: r.user.clone().unwrap_or_else(|| String::from("unknown")),
                activity: Activity::Return,
            });
            continue;
        };
        rows.push(ActivityRow {
            id: r.id.clone(),
            timestamp: r.timestamp.clone(),
            time: time_label(&r.timestamp),
            tool: matched.tool.clone(),
            user: r.user.clone().unwrap_or_else(|| matched.user.clone()),
            activity: Activity::Return,
        });
    }

    rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    rows.truncate(limit);
    rows
}

/// Local wall-clock label for an RFC 3339 timestamp; falls back to the raw
/// string when the server sends something unparsable.
pub fn time_label(timestamp: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|_| timestamp.to_string())
}

/// Label for a sample taken right now.
pub fn now_label() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

// ─── ACTIVITY PULSE ─────────────────────────────────────────────

/// Card-highlight duration after a rate increase.
const PULSE_DURATION: Duration = Duration::from_secs(1);

/// One-shot highlight for a metric card.
///
/// Fires when the observed value strictly exceeds the previous cycle's
/// value and self-clears after one second regardless of later values.
#[derive(Clone, Copy, Debug, Default)]
pub struct Pulse {
    deadline: Option<Instant>,
}

impl Pulse {
    /// Feed one cycle's (previous, current) pair.
    pub fn observe(&mut self, previous: f64, current: f64, now: Instant) {
        if current > previous {
            self.deadline = Some(now + PULSE_DURATION);
        }
    }

    pub fn active(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now < d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ReturnEvent;

    fn tool(borrowed: u64, commit: u64, overage: u64, available: u64, total: u64) -> ToolState {
        ToolState {
            tool: String::from("CAD Suite"),
            total,
            borrowed,
            commit,
            overage,
            available,
        }
    }

    #[test]
    fn overage_classification_boundaries() {
        assert_eq!(classify_overage(0.0), OverageLevel::Normal);
        assert_eq!(classify_overage(15.0), OverageLevel::Normal);
        assert_eq!(classify_overage(15.01), OverageLevel::Warning);
        assert_eq!(classify_overage(30.0), OverageLevel::Warning);
        assert_eq!(classify_overage(30.01), OverageLevel::Critical);
        assert_eq!(classify_overage(100.0), OverageLevel::Critical);
    }

    #[test]
    fn utilization_split_sums_to_total() {
        let split = utilization_split(&tool(8, 5, 3, 2, 10));
        assert_eq!(
            split,
            UtilizationSplit {
                in_commit: 5,
                in_overage: 3,
                available: 2
            }
        );
        assert_eq!(split.sum(), 10);
    }

    #[test]
    fn utilization_split_under_commit() {
        let split = utilization_split(&tool(3, 5, 0, 7, 10));
        assert_eq!(split.in_commit, 3);
        assert_eq!(split.in_overage, 0);
        assert_eq!(split.available, 7);
    }

    #[test]
    fn inconsistent_split_is_rendered_as_given() {
        // borrowed=9 with overage=1 and available=5 cannot sum to 10;
        // the split still reports the server's numbers untouched.
        let split = utilization_split(&tool(9, 5, 1, 5, 10));
        assert_eq!(split.sum(), 11);
    }

    #[test]
    fn display_rate_rounds_to_nearest() {
        assert_eq!(display_rate(12.4), 12);
        assert_eq!(display_rate(12.5), 13);
        assert_eq!(display_rate(0.0), 0);
    }

    fn outstanding(id: &str, tool: &str, user: &str) -> OutstandingBorrow {
        OutstandingBorrow {
            id: id.into(),
            tool: tool.into(),
            user: user.into(),
            borrowed_at: String::from("2025-11-03T10:00:00Z"),
        }
    }

    #[test]
    fn user_distribution_groups_and_sorts() {
        let borrows = vec![
            outstanding("1", "CAD Suite", "alice"),
            outstanding("2", "CAD Suite", "bob"),
            outstanding("3", "CAD Suite", "alice"),
            outstanding("4", "FEA Solver", "carol"),
        ];
        let dist = user_distribution(&borrows, "CAD Suite");
        assert_eq!(
            dist,
            vec![(String::from("alice"), 2), (String::from("bob"), 1)]
        );
    }

    fn borrow_event(id: &str, tool: &str, user: &str, ts: &str, overage: bool) -> BorrowEvent {
        BorrowEvent {
            id: id.into(),
            tool: tool.into(),
            user: user.into(),
            timestamp: ts.into(),
            is_overage: overage,
        }
    }

    #[test]
    fn activity_rows_filters_and_correlates() {
        let events = RecentEvents {
            borrows: vec![
                borrow_event("b-1", "CAD Suite", "alice", "2025-11-03T10:01:00Z", false),
                borrow_event("b-2", "FEA Solver", "bob", "2025-11-03T10:02:00Z", true),
            ],
            returns: vec![
                ReturnEvent {
                    id: String::from("b-1"),
                    user: None,
                    timestamp: String::from("2025-11-03T10:03:00Z"),
                },
                ReturnEvent {
                    id: String::from("b-9"),
                    user: Some(String::from("dave")),
                    timestamp: String::from("2025-11-03T10:04:00Z"),
                },
            ],
        };

        let entity = activity_rows(&events, Some("CAD Suite"), 20);
        assert_eq!(entity.len(), 2);
        // newest first: the return closing b-1 happened after the borrow
        assert_eq!(entity[0].activity, Activity::Return);
        assert_eq!(entity[0].tool, "CAD Suite");
        // return user recovered from the matched borrow
        assert_eq!(entity[0].user, "alice");

        let all = activity_rows(&events, None, 20);
        assert_eq!(all.len(), 4);
        // the uncorrelated return survives an unfiltered flatten
        assert!(all.iter().any(|r| r.id == "b-9" && r.user == "dave"));
    }

    #[test]
    fn activity_rows_caps_output() {
        let events = RecentEvents {
            borrows: (0..40)
                .map(|i| {
                    borrow_event(
                        &format!("b-{i}"),
                        "CAD Suite",
                        "alice",
                        &format!("2025-11-03T10:{:02}:00Z", i % 60),
                        false,
                    )
                })
                .collect(),
            returns: vec![],
        };
        assert_eq!(activity_rows(&events, None, 20).len(), 20);
    }

    #[test]
    fn pulse_fires_on_strict_increase_only() {
        let t0 = Instant::now();
        let mut pulse = Pulse::default();
        pulse.observe(5.0, 5.0, t0);
        assert!(!pulse.active(t0));
        pulse.observe(5.0, 4.0, t0);
        assert!(!pulse.active(t0));
        pulse.observe(4.0, 6.0, t0);
        assert!(pulse.active(t0));
    }

    #[test]
    fn pulse_self_clears_after_one_second() {
        let t0 = Instant::now();
        let mut pulse = Pulse::default();
        pulse.observe(1.0, 2.0, t0);
        assert!(pulse.active(t0 + Duration::from_millis(999)));
        assert!(!pulse.active(t0 + Duration::from_millis(1001)));
        // a later non-increase does not re-arm it
        pulse.observe(2.0, 2.0, t0 + Duration::from_secs(2));
        assert!(!pulse.active(t0 + Duration::from_secs(2)));
    }

    #[test]
    fn time_label_falls_back_on_garbage() {
        assert_eq!(time_label("not-a-time"), "not-a-time");
    }
}
