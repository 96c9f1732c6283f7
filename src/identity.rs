//! Node Identity Service: stable identifiers and LLM-facing summarization.
//!
//! The historical root cause of "node not found" errors was that the
//! summarization step and the mutation step read two different snapshots of
//! the itinerary. Every function here is pure (itinerary in, itinerary or
//! string out) specifically so callers are forced to thread the *same*
//! in-memory object from summarization through to [`crate::change_engine`]
//! instead of re-reading between the two.

use std::collections::HashSet;

use regex::Regex;

use crate::model::itinerary::Itinerary;

/// Canonical node id pattern: `day{N}_node{M}`.
fn canonical_id_regex() -> Regex {
    Regex::new(r"^day(\d+)_node(\d+)$").expect("static pattern is valid")
}

/// True when `id` matches the canonical `day{N}_node{M}` shape.
pub fn is_canonical_id(id: &str) -> bool {
    canonical_id_regex().is_match(id)
}

fn mint_id(day_number: u32, position_one_based: usize) -> String {
    format!("day{day_number}_node{position_one_based}")
}

/// Renumbers every node in every day to the canonical `day{N}_node{M}` shape
/// in list order, starting at 1 per day, remapping each day's edges to the
/// new identifiers so a renumbering never orphans an edge reference. No-op
/// (save for `updated_at`) if every identifier is already canonical and
/// unique within its day — so a second call is idempotent as required by
/// §4.1.
pub fn migrate_if_needed(mut itinerary: Itinerary) -> Itinerary {
    if !needs_migration(&itinerary) {
        return itinerary;
    }
    for day in &mut itinerary.days {
        let mut remap = std::collections::HashMap::new();
        for (idx, node) in day.nodes.iter_mut().enumerate() {
            let new_id = mint_id(day.day_number, idx + 1);
            if node.id != new_id {
                remap.insert(node.id.clone(), new_id.clone());
            }
            node.id = new_id;
        }
        if !remap.is_empty() {
            day.edges.retain_mut(|edge| {
                if let Some(new_from) = remap.get(&edge.from) {
                    edge.from = new_from.clone();
                }
                if let Some(new_to) = remap.get(&edge.to) {
                    edge.to = new_to.clone();
                }
                true
            });
        }
    }
    itinerary.version += 1;
    itinerary.updated_at = chrono::Utc::now();
    itinerary
}

/// True when migration must run: some id doesn't match the canonical
/// `day{N}_node{M}` *pattern* (§4.1) or two nodes in the same day share an
/// id. Position alignment with `idx + 1` is irrelevant here — a canonical,
/// unique id must be left alone even if it isn't at the position its number
/// names, since renumbering it anyway would break node identity across a
/// summarize/apply pair for no reason the spec calls for.
fn needs_migration(itinerary: &Itinerary) -> bool {
    for day in &itinerary.days {
        let mut seen = HashSet::new();
        for node in &day.nodes {
            if !is_canonical_id(&node.id) {
                return true;
            }
            if !seen.insert(node.id.clone()) {
                return true;
            }
        }
    }
    false
}

/// One validation failure surfaced by [`validate_consistency`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyError {
    pub day_number: u32,
    pub node_id: String,
    pub message: String,
}

impl std::fmt::Display for ConsistencyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "day {} node {}: {}",
            self.day_number, self.node_id, self.message
        )
    }
}

/// Detects missing identifiers, blank titles, start > end timings, duplicate
/// identifiers within a day, and edges whose `from`/`to` no longer name a
/// node present in that day (orphaned references — the shape a stale edge
/// takes once the node it pointed at was renumbered or deleted without the
/// edge following it). Does not mutate; the pipeline aborts with these
/// diagnostics verbatim on any non-empty result (§4.1).
pub fn validate_consistency(itinerary: &Itinerary) -> Vec<ConsistencyError> {
    let mut errors = Vec::new();
    for day in &itinerary.days {
        let mut seen = HashSet::new();
        for node in &day.nodes {
            if node.id.trim().is_empty() {
                errors.push(ConsistencyError {
                    day_number: day.day_number,
                    node_id: node.id.clone(),
                    message: "missing identifier".to_string(),
                });
                continue;
            }
            if !seen.insert(node.id.clone()) {
                errors.push(ConsistencyError {
                    day_number: day.day_number,
                    node_id: node.id.clone(),
                    message: "duplicate identifier within day".to_string(),
                });
            }
            if node.title.trim().is_empty() {
                errors.push(ConsistencyError {
                    day_number: day.day_number,
                    node_id: node.id.clone(),
                    message: "blank title".to_string(),
                });
            }
            if let (Some(start), Some(end)) =
                (node.timing.start_epoch_millis, node.timing.end_epoch_millis)
            {
                if start > end {
                    errors.push(ConsistencyError {
                        day_number: day.day_number,
                        node_id: node.id.clone(),
                        message: format!("timing start {start} after end {end}"),
                    });
                }
            }
        }

        let node_ids: HashSet<&str> = day.nodes.iter().map(|n| n.id.as_str()).collect();
        for edge in &day.edges {
            if !node_ids.contains(edge.from.as_str()) {
                errors.push(ConsistencyError {
                    day_number: day.day_number,
                    node_id: edge.from.clone(),
                    message: "orphaned edge reference: 'from' node not present in day".to_string(),
                });
            }
            if !node_ids.contains(edge.to.as_str()) {
                errors.push(ConsistencyError {
                    day_number: day.day_number,
                    node_id: edge.to.clone(),
                    message: "orphaned edge reference: 'to' node not present in day".to_string(),
                });
            }
        }
    }
    errors
}

/// Which worker is asking, so the summary can be trimmed to what that
/// worker kind actually needs (a booking worker doesn't need meal slot
/// details, for instance). Kept intentionally coarse — all kinds currently
/// render the same fields; this is the seam for future specialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryScope {
    pub worker_kind: crate::model::event::WorkerKind,
}

/// Renders a compact textual summary of the itinerary for an LLM prompt.
///
/// Emits exactly the identifiers present in `itinerary.days[].nodes[].id` —
/// never invents or elides an entry within a day that is included. If the
/// rendering would exceed `char_budget`, whole trailing days are dropped
/// (never a mid-entry truncation) and a trailing marker notes how many were
/// omitted.
pub fn summarize_for_worker(
    itinerary: &Itinerary,
    _scope: SummaryScope,
    char_budget: usize,
) -> String {
    let mut rendered_days: Vec<String> = Vec::with_capacity(itinerary.days.len());
    for day in &itinerary.days {
        let mut block = format!("Day {} ({}):\n", day.day_number, day.date);
        for node in &day.nodes {
            let window = match (node.timing.start_epoch_millis, node.timing.end_epoch_millis) {
                (Some(s), Some(e)) => format!("{s}-{e}"),
                (Some(s), None) => format!("{s}-?"),
                (None, Some(e)) => format!("?-{e}"),
                (None, None) => "unscheduled".to_string(),
            };
            let location_name = node
                .location
                .as_ref()
                .map(|l| l.name.as_str())
                .unwrap_or("(no location)");
            let type_label = node
                .node_type
                .map(|t| format!("{t:?}"))
                .unwrap_or_else(|| "unknown".to_string());
            block.push_str(&format!(
                "  {} | {} | {} | {} | {}\n",
                node.id, node.title, type_label, window, location_name
            ));
        }
        rendered_days.push(block);
    }

    let mut out = String::new();
    let mut omitted = 0usize;
    for (idx, block) in rendered_days.iter().enumerate() {
        if out.len() + block.len() > char_budget && !out.is_empty() {
            omitted = rendered_days.len() - idx;
            break;
        }
        out.push_str(block);
    }
    if omitted > 0 {
        out.push_str(&format!("... ({omitted} day(s) omitted for budget)\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::event::WorkerKind;
    use crate::model::itinerary::{BudgetTier, CreationStatus, Day, Party, Settings, TripMetadata};
    use crate::model::node::{Node, NodeType};
    use chrono::NaiveDate;

    fn blank_itinerary() -> Itinerary {
        let now = chrono::Utc::now();
        Itinerary {
            id: "itin_1".into(),
            owner_id: "user_1".into(),
            version: 1,
            created_at: now,
            updated_at: now,
            status: CreationStatus::Draft,
            days: vec![],
            settings: Settings::default(),
            trip: TripMetadata {
                destination: "Warsaw".into(),
                start_date: NaiveDate::from_ymd_opt(2026, 1, 24).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2026, 1, 27).unwrap(),
                inclusive: true,
                party: Party {
                    adults: 2,
                    children: 0,
                    rooms: 1,
                },
                budget_tier: BudgetTier::Mid,
                interests: vec![],
                language: None,
            },
        }
    }

    #[test]
    fn migrate_renumbers_legacy_ids() {
        let mut itin = blank_itinerary();
        let mut day = Day::new(1, NaiveDate::from_ymd_opt(2026, 1, 24).unwrap());
        day.nodes.push(Node::new("legacy-abc", "Castle", NodeType::Attraction));
        day.nodes.push(Node::new("legacy-def", "Park", NodeType::Attraction));
        itin.days.push(day);

        let migrated = migrate_if_needed(itin);
        assert_eq!(migrated.days[0].nodes[0].id, "day1_node1");
        assert_eq!(migrated.days[0].nodes[1].id, "day1_node2");
        assert_eq!(migrated.version, 2);
    }

    #[test]
    fn migrate_is_idempotent() {
        let mut itin = blank_itinerary();
        let mut day = Day::new(1, NaiveDate::from_ymd_opt(2026, 1, 24).unwrap());
        day.nodes.push(Node::new("legacy-abc", "Castle", NodeType::Attraction));
        itin.days.push(day);

        let once = migrate_if_needed(itin);
        let twice = migrate_if_needed(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn validate_consistency_flags_duplicate_ids() {
        let mut itin = blank_itinerary();
        let mut day = Day::new(1, NaiveDate::from_ymd_opt(2026, 1, 24).unwrap());
        day.nodes.push(Node::new("day1_node1", "Castle", NodeType::Attraction));
        day.nodes.push(Node::new("day1_node1", "Park", NodeType::Attraction));
        itin.days.push(day);

        let errors = validate_consistency(&itin);
        assert!(errors.iter().any(|e| e.message.contains("duplicate")));
    }

    #[test]
    fn validate_consistency_flags_blank_title() {
        let mut itin = blank_itinerary();
        let mut day = Day::new(1, NaiveDate::from_ymd_opt(2026, 1, 24).unwrap());
        day.nodes.push(Node::new("day1_node1", "  ", NodeType::Attraction));
        itin.days.push(day);

        let errors = validate_consistency(&itin);
        assert!(errors.iter().any(|e| e.message.contains("blank title")));
    }

    #[test]
    fn summarize_emits_exactly_present_identifiers() {
        let mut itin = blank_itinerary();
        let mut day = Day::new(1, NaiveDate::from_ymd_opt(2026, 1, 24).unwrap());
        day.nodes.push(Node::new("day1_node1", "Castle", NodeType::Attraction));
        day.nodes.push(Node::new("day1_node2", "Lunch", NodeType::Meal));
        itin.days.push(day);

        let summary = summarize_for_worker(
            &itin,
            SummaryScope {
                worker_kind: WorkerKind::Enrichment,
            },
            10_000,
        );
        assert!(summary.contains("day1_node1"));
        assert!(summary.contains("day1_node2"));
        assert!(!summary.contains("day1_node3"));
    }

    #[test]
    fn summarize_drops_whole_trailing_days_under_budget() {
        let mut itin = blank_itinerary();
        for d in 1..=5u32 {
            let mut day = Day::new(d, NaiveDate::from_ymd_opt(2026, 1, 24).unwrap());
            day.nodes
                .push(Node::new(format!("day{d}_node1"), "Something", NodeType::Attraction));
            itin.days.push(day);
        }
        let summary = summarize_for_worker(
            &itin,
            SummaryScope {
                worker_kind: WorkerKind::Enrichment,
            },
            80,
        );
        assert!(summary.contains("omitted"));
        assert!(summary.contains("day1_node1"));
    }

    #[test]
    fn migrate_remaps_edges_to_the_new_node_ids() {
        let mut itin = blank_itinerary();
        let mut day = Day::new(1, NaiveDate::from_ymd_opt(2026, 1, 24).unwrap());
        day.nodes.push(Node::new("legacy-a", "Castle", NodeType::Attraction));
        day.nodes.push(Node::new("legacy-b", "Park", NodeType::Attraction));
        day.edges.push(crate::model::itinerary::Edge {
            from: "legacy-a".into(),
            to: "legacy-b".into(),
            label: Some("walk".into()),
        });
        itin.days.push(day);

        let migrated = migrate_if_needed(itin);
        assert_eq!(migrated.days[0].edges[0].from, "day1_node1");
        assert_eq!(migrated.days[0].edges[0].to, "day1_node2");
        assert!(validate_consistency(&migrated).is_empty());
    }

    #[test]
    fn validate_consistency_flags_orphaned_edge_reference() {
        let mut itin = blank_itinerary();
        let mut day = Day::new(1, NaiveDate::from_ymd_opt(2026, 1, 24).unwrap());
        day.nodes.push(Node::new("day1_node1", "Castle", NodeType::Attraction));
        day.edges.push(crate::model::itinerary::Edge {
            from: "day1_node1".into(),
            to: "day1_node99".into(),
            label: None,
        });
        itin.days.push(day);

        let errors = validate_consistency(&itin);
        assert!(errors.iter().any(|e| e.message.contains("orphaned edge reference") && e.node_id == "day1_node99"));
    }

    #[test]
    fn is_canonical_id_rejects_legacy_shapes() {
        assert!(is_canonical_id("day1_node1"));
        assert!(!is_canonical_id("legacy-abc"));
        assert!(!is_canonical_id("day1node1"));
    }
}
