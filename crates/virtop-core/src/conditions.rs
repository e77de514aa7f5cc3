//! Typed status conditions and their aggregation
//!
//! A condition is a named status record attached to a resource: a type, a
//! boolean-like status, a severity (meaningful only when the status is
//! False), a reason, and a message. A resource carries at most one condition
//! per type.
//!
//! The aggregation half of this module reduces many independent conditions
//! into a deterministic summary: conditions are partitioned into groups by
//! (status, severity), groups are ranked Error > Warning > Info > Unknown >
//! True, and the first reason/message is picked from the top-ranked group,
//! honoring a caller-supplied type priority list before falling back to
//! lexicographic order. Every function here is pure: identical inputs always
//! yield identical outputs, because these run on every reconcile tick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Condition type used for the composed summary condition.
pub const READY: &str = "Ready";

/// Boolean-like status of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Severity of a condition; meaningful only when the status is False.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionSeverity {
    Error,
    Warning,
    Info,
    None,
}

/// A typed status record attached to a resource.
///
/// Invariant: at most one condition per type per resource; [`set`] enforces
/// this by replacing in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Condition type, unique per owning resource.
    pub condition_type: String,
    /// Boolean-like status.
    pub status: ConditionStatus,
    /// Severity; meaningful only when status is False.
    pub severity: ConditionSeverity,
    /// Machine-readable reason for the last transition.
    pub reason: String,
    /// Human-readable message.
    pub message: String,
    /// When the status last changed.
    pub last_transition_time: DateTime<Utc>,
}

/// Kind/name reference to the resource owning a set of conditions.
///
/// Used to localize reasons when conditions from several resources are
/// surfaced in one place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

/// Create a condition with status True.
pub fn true_condition(condition_type: impl Into<String>) -> Condition {
    Condition {
        condition_type: condition_type.into(),
        status: ConditionStatus::True,
        severity: ConditionSeverity::None,
        reason: String::new(),
        message: String::new(),
        last_transition_time: Utc::now(),
    }
}

/// Create a condition with status False and the given severity.
pub fn false_condition(
    condition_type: impl Into<String>,
    reason: impl Into<String>,
    severity: ConditionSeverity,
    message: impl Into<String>,
) -> Condition {
    Condition {
        condition_type: condition_type.into(),
        status: ConditionStatus::False,
        severity,
        reason: reason.into(),
        message: message.into(),
        last_transition_time: Utc::now(),
    }
}

/// Create a condition with status Unknown.
pub fn unknown_condition(
    condition_type: impl Into<String>,
    reason: impl Into<String>,
    message: impl Into<String>,
) -> Condition {
    Condition {
        condition_type: condition_type.into(),
        status: ConditionStatus::Unknown,
        severity: ConditionSeverity::None,
        reason: reason.into(),
        message: message.into(),
        last_transition_time: Utc::now(),
    }
}

/// Get the condition with the given type, if present.
pub fn get<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions
        .iter()
        .find(|c| c.condition_type == condition_type)
}

/// Check whether the condition with the given type exists and is True.
pub fn is_true(conditions: &[Condition], condition_type: &str) -> bool {
    get(conditions, condition_type)
        .map(|c| c.status == ConditionStatus::True)
        .unwrap_or(false)
}

/// Set a condition, replacing any existing condition of the same type.
///
/// The transition time is preserved when the status did not change, so
/// repeated reconcile passes that re-assert the same status do not churn
/// the timestamp.
pub fn set(conditions: &mut Vec<Condition>, mut condition: Condition) {
    if let Some(existing) = conditions
        .iter_mut()
        .find(|c| c.condition_type == condition.condition_type)
    {
        if existing.status == condition.status {
            condition.last_transition_time = existing.last_transition_time;
        }
        *existing = condition;
    } else {
        conditions.push(condition);
    }
}

/// Remove the condition with the given type, if present.
pub fn delete(conditions: &mut Vec<Condition>, condition_type: &str) {
    conditions.retain(|c| c.condition_type != condition_type);
}

/// Conditions partitioned by (status, severity), ranked by merge priority.
#[derive(Debug, Clone)]
pub struct ConditionGroups(Vec<ConditionGroup>);

/// One (status, severity) bucket, with conditions in lexicographic type order.
#[derive(Debug, Clone)]
pub struct ConditionGroup {
    pub status: ConditionStatus,
    pub severity: ConditionSeverity,
    pub conditions: Vec<Condition>,
}

impl ConditionGroup {
    /// Merge priority of this bucket; lower ranks first.
    fn priority(&self) -> u8 {
        match (self.status, self.severity) {
            (ConditionStatus::False, ConditionSeverity::Error) => 0,
            (ConditionStatus::False, ConditionSeverity::Warning) => 1,
            (ConditionStatus::False, _) => 2,
            (ConditionStatus::Unknown, _) => 3,
            (ConditionStatus::True, _) => 4,
        }
    }
}

impl ConditionGroups {
    /// The highest-priority non-empty group, if any conditions exist.
    pub fn top(&self) -> Option<&ConditionGroup> {
        self.0.first()
    }

    /// Number of conditions with status True across all groups.
    pub fn true_count(&self) -> usize {
        self.0
            .iter()
            .filter(|g| g.status == ConditionStatus::True)
            .map(|g| g.conditions.len())
            .sum()
    }
}

/// Partition conditions into (status, severity) groups.
///
/// Groups are ordered Error > Warning > Info > Unknown > True and the
/// conditions within each group are sorted lexicographically by type, so the
/// result is deterministic regardless of input order.
pub fn condition_groups<'a>(conditions: impl IntoIterator<Item = &'a Condition>) -> ConditionGroups {
    let mut groups: Vec<ConditionGroup> = Vec::new();
    for condition in conditions {
        match groups
            .iter_mut()
            .find(|g| g.status == condition.status && g.severity == condition.severity)
        {
            Some(group) => group.conditions.push(condition.clone()),
            None => groups.push(ConditionGroup {
                status: condition.status,
                severity: condition.severity,
                conditions: vec![condition.clone()],
            }),
        }
    }
    for group in &mut groups {
        group
            .conditions
            .sort_by(|a, b| a.condition_type.cmp(&b.condition_type));
    }
    groups.sort_by_key(ConditionGroup::priority);
    ConditionGroups(groups)
}

/// Append `" @ <Kind>/<Name>"` to a reason, identifying the owning resource.
///
/// Idempotent: a reason that already carries an `" @ "` location is returned
/// unchanged.
pub fn localize_reason(reason: &str, obj: &ObjectRef) -> String {
    if reason.contains(" @ ") {
        return reason.to_string();
    }
    format!("{reason} @ {}/{}", obj.kind, obj.name)
}

fn first_condition<'a>(
    groups: &'a ConditionGroups,
    order: &[&str],
) -> Option<&'a Condition> {
    let top = groups.top()?;
    for wanted in order {
        if let Some(found) = top
            .conditions
            .iter()
            .find(|c| c.condition_type == *wanted)
        {
            return Some(found);
        }
    }
    top.conditions.first()
}

/// Reason of the first condition in the top-priority group.
///
/// The caller-supplied `order` wins within the group; when none of the
/// listed types is present the lexicographic-first condition is used. With
/// `localize` set, the owning resource is appended to the reason.
pub fn first_reason(
    groups: &ConditionGroups,
    order: &[&str],
    localize: Option<&ObjectRef>,
) -> Option<String> {
    let condition = first_condition(groups, order)?;
    Some(match localize {
        Some(obj) => localize_reason(&condition.reason, obj),
        None => condition.reason.clone(),
    })
}

/// Message of the first condition in the top-priority group.
pub fn first_message(groups: &ConditionGroups, order: &[&str]) -> Option<String> {
    first_condition(groups, order).map(|c| c.message.clone())
}

/// Render a `"<n> of <total> completed"` progress message.
///
/// `n` is the number of True conditions across all groups.
pub fn step_counter_message(groups: &ConditionGroups, total: usize) -> String {
    format!("{} of {total} completed", groups.true_count())
}

/// Output of [`aggregate`]: the deterministic reduction of a condition set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateOutput {
    pub first_reason: Option<String>,
    pub first_message: Option<String>,
    pub step_counter_message: String,
}

/// Reduce a set of conditions into a first reason/message and step counter.
pub fn aggregate(
    conditions: &[Condition],
    order: &[&str],
    total_steps: usize,
    localize: Option<&ObjectRef>,
) -> AggregateOutput {
    let groups = condition_groups(conditions);
    AggregateOutput {
        first_reason: first_reason(&groups, order, localize),
        first_message: first_message(&groups, order),
        step_counter_message: step_counter_message(&groups, total_steps),
    }
}

/// Options for composing a summary condition.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryOptions<'a> {
    /// Condition type priority within the top group.
    pub order: &'a [&'a str],
    /// When set, use a step counter over this many steps as the message.
    pub step_counter: Option<usize>,
    /// When set, localize the reason to this resource.
    pub localize: Option<&'a ObjectRef>,
}

/// Compose a single `Ready` condition summarizing all other conditions.
///
/// Returns None when there is nothing to summarize. Any existing `Ready`
/// condition in the input is ignored so the summary never feeds back into
/// itself.
pub fn summary(conditions: &[Condition], opts: &SummaryOptions<'_>) -> Option<Condition> {
    let non_summary: Vec<&Condition> = conditions
        .iter()
        .filter(|c| c.condition_type != READY)
        .collect();
    let groups = condition_groups(non_summary.iter().copied());
    let top = groups.top()?;

    let message = match opts.step_counter {
        Some(total) => step_counter_message(&groups, total),
        None => first_message(&groups, opts.order).unwrap_or_default(),
    };

    Some(match top.status {
        ConditionStatus::True => {
            let mut ready = true_condition(READY);
            ready.message = message;
            ready
        }
        ConditionStatus::False => false_condition(
            READY,
            first_reason(&groups, opts.order, opts.localize).unwrap_or_default(),
            top.severity,
            message,
        ),
        ConditionStatus::Unknown => unknown_condition(
            READY,
            first_reason(&groups, opts.order, opts.localize).unwrap_or_default(),
            message,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn false_info(condition_type: &str) -> Condition {
        false_condition(
            condition_type,
            format!("false{condition_type}"),
            ConditionSeverity::Info,
            format!("message false{condition_type}"),
        )
    }

    #[test]
    fn test_step_counter_message() {
        let conditions = vec![
            true_condition("a"),
            true_condition("b"),
            false_condition("c", "r", ConditionSeverity::Info, "m"),
            false_condition("d", "r", ConditionSeverity::Warning, "m"),
            false_condition("e", "r", ConditionSeverity::Warning, "m"),
            false_condition("f", "r", ConditionSeverity::Error, "m"),
            unknown_condition("g", "r", "m"),
        ];
        let groups = condition_groups(&conditions);

        // step count message reports the number of True conditions over total
        assert_eq!(step_counter_message(&groups, 8), "2 of 8 completed");
    }

    #[test]
    fn test_localize_reason() {
        let obj = ObjectRef::new("ManagedResource", "test-vm");

        assert_eq!(
            localize_reason("foo", &obj),
            "foo @ ManagedResource/test-vm"
        );

        // localize should not alter an existing location
        assert_eq!(
            localize_reason("foo @ SomeKind/some-name", &obj),
            "foo @ SomeKind/some-name"
        );
    }

    #[test]
    fn test_localize_is_idempotent() {
        let obj = ObjectRef::new("ManagedResource", "test-vm");
        let once = localize_reason("foo", &obj);
        assert_eq!(localize_reason(&once, &obj), once);
    }

    #[test]
    fn test_first_reason_and_message() {
        let obj = ObjectRef::new("ManagedResource", "test-vm");
        let groups = condition_groups(&[false_info("foo"), false_info("bar")]);

        // lexicographic order when no priority is given
        assert_eq!(
            first_reason(&groups, &[], None).as_deref(),
            Some("falsebar")
        );
        assert_eq!(
            first_message(&groups, &[]).as_deref(),
            Some("message falsebar")
        );

        // explicit priority order wins
        assert_eq!(
            first_reason(&groups, &["foo", "bar"], None).as_deref(),
            Some("falsefoo")
        );
        assert_eq!(
            first_message(&groups, &["foo", "bar"]).as_deref(),
            Some("message falsefoo")
        );

        // missing types in the priority list are skipped
        assert_eq!(
            first_reason(&groups, &["missing", "foo", "bar"], None).as_deref(),
            Some("falsefoo")
        );

        // fall back to lexicographic-first when nothing in the list exists
        assert_eq!(
            first_reason(&groups, &["missing"], None).as_deref(),
            Some("falsebar")
        );

        // localized reason carries the owning resource
        assert_eq!(
            first_reason(&groups, &[], Some(&obj)).as_deref(),
            Some("falsebar @ ManagedResource/test-vm")
        );
    }

    #[test]
    fn test_group_priority_order() {
        let conditions = vec![
            true_condition("ok"),
            unknown_condition("unk", "r", "m"),
            false_condition("warn", "warnReason", ConditionSeverity::Warning, "m"),
            false_condition("err", "errReason", ConditionSeverity::Error, "m"),
        ];
        let groups = condition_groups(&conditions);

        // the error bucket outranks everything else
        assert_eq!(
            first_reason(&groups, &[], None).as_deref(),
            Some("errReason")
        );
    }

    #[test]
    fn test_set_preserves_transition_time_on_same_status() {
        let mut conditions = Vec::new();
        set(&mut conditions, true_condition("Created"));
        let original = conditions[0].last_transition_time;

        let mut refreshed = true_condition("Created");
        refreshed.message = "still fine".to_string();
        set(&mut conditions, refreshed);

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, original);
        assert_eq!(conditions[0].message, "still fine");
    }

    #[test]
    fn test_set_updates_transition_time_on_status_change() {
        let mut conditions = Vec::new();
        set(&mut conditions, true_condition("Created"));
        let original = conditions[0].last_transition_time;

        set(
            &mut conditions,
            false_condition("Created", "gone", ConditionSeverity::Error, "m"),
        );

        assert_eq!(conditions.len(), 1);
        assert!(conditions[0].last_transition_time >= original);
        assert_eq!(conditions[0].status, ConditionStatus::False);
    }

    #[test]
    fn test_summary_reflects_top_group() {
        let conditions = vec![
            true_condition("a"),
            false_condition("b", "bNotReady", ConditionSeverity::Warning, "waiting for b"),
        ];
        let ready = summary(&conditions, &SummaryOptions::default()).unwrap();
        assert_eq!(ready.condition_type, READY);
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.severity, ConditionSeverity::Warning);
        assert_eq!(ready.reason, "bNotReady");
    }

    #[test]
    fn test_summary_all_true_with_step_counter() {
        let conditions = vec![true_condition("a"), true_condition("b")];
        let opts = SummaryOptions {
            step_counter: Some(2),
            ..Default::default()
        };
        let ready = summary(&conditions, &opts).unwrap();
        assert_eq!(ready.status, ConditionStatus::True);
        assert_eq!(ready.message, "2 of 2 completed");
    }

    #[test]
    fn test_summary_ignores_existing_summary() {
        let conditions = vec![
            false_condition(READY, "stale", ConditionSeverity::Error, "old"),
            true_condition("a"),
        ];
        let ready = summary(&conditions, &SummaryOptions::default()).unwrap();
        assert_eq!(ready.status, ConditionStatus::True);
    }

    #[test]
    fn test_summary_empty_is_none() {
        assert!(summary(&[], &SummaryOptions::default()).is_none());
    }

    #[test]
    fn test_aggregate_is_deterministic() {
        let conditions = vec![false_info("foo"), false_info("bar"), true_condition("ok")];
        let a = aggregate(&conditions, &[], 3, None);
        let b = aggregate(&conditions, &[], 3, None);
        assert_eq!(a, b);
        assert_eq!(a.step_counter_message, "1 of 3 completed");
    }
}
