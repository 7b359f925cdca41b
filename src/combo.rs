//! Combo-ticket groups and the constraint algebra applied to them.
//!
//! Spec §9 calls for replacing "combo-ticket constraints as string literals
//! inside the solver" with a small algebra: constraint kind × group → added
//! constraint function. `ComboConstraintKind` is that algebra's vocabulary;
//! the Sequencer (`crate::sequencer`) is the consumer that turns a
//! `(ComboConstraintKind, &ComboGroup)` pair into model constraints.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitOrder {
    Fixed,
    Flexible,
    Chronological,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketType {
    SameDayConsecutive,
    SameDayAnyOrder,
    MultiDay,
    SameDayClustered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComboConstraints {
    pub must_visit_together: bool,
    pub max_separation_hours: f64,
    pub visit_order: VisitOrder,
    pub same_day_required: bool,
    pub ticket_type: TicketType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComboGroup {
    pub id: String,
    pub city: String,
    pub members: Vec<String>,
    pub constraints: ComboConstraints,
}

impl ComboGroup {
    /// Members of this group present in `selected` (POI slugs), preserving
    /// the group's declared member order.
    pub fn present_members<'a>(&'a self, selected: &[String]) -> Vec<&'a str> {
        self.members
            .iter()
            .filter(|m| selected.iter().any(|s| s == *m))
            .map(|m| m.as_str())
            .collect()
    }
}

/// The constraint-kind vocabulary the Sequencer dispatches on. Each kind
/// corresponds to one of the clustered-visit behaviors named in spec §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComboConstraintKind {
    /// All present members share the same `day[·]`.
    SameDay,
    /// In addition to `SameDay`, present members occupy a contiguous block
    /// of positions within that day.
    Contiguous,
}

impl ComboGroup {
    /// Which constraint kinds apply to this group. Spec §4.5 gates all
    /// clustering solely on `must_visit_together`; `same_day_required` and
    /// `ticket_type` only decide whether the same-day constraint additionally
    /// becomes a contiguous-block constraint.
    pub fn applicable_kinds(&self) -> Vec<ComboConstraintKind> {
        let mut kinds = Vec::new();
        if self.constraints.must_visit_together {
            kinds.push(ComboConstraintKind::SameDay);
            if matches!(self.constraints.ticket_type, TicketType::SameDayConsecutive) {
                kinds.push(ComboConstraintKind::Contiguous);
            }
        }
        kinds
    }
}

/// A validation issue surfaced by catalog enrichment/validation (spec §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub severity: IssueSeverity,
    pub message: String,
}

impl Issue {
    pub fn error(message: impl Into<String>) -> Self {
        Self { severity: IssueSeverity::Error, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { severity: IssueSeverity::Warning, message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(must_visit_together: bool, same_day_required: bool, ticket_type: TicketType) -> ComboGroup {
        ComboGroup {
            id: "g".into(),
            city: "rome".into(),
            members: vec!["a".into(), "b".into()],
            constraints: ComboConstraints {
                must_visit_together,
                max_separation_hours: 4.0,
                visit_order: VisitOrder::Flexible,
                same_day_required,
                ticket_type,
            },
        }
    }

    #[test]
    fn must_visit_together_false_applies_no_constraints_even_with_consecutive_ticket_type() {
        let g = group(false, false, TicketType::SameDayConsecutive);
        assert!(g.applicable_kinds().is_empty());
    }

    #[test]
    fn same_day_required_alone_does_not_force_clustering() {
        let g = group(false, true, TicketType::SameDayAnyOrder);
        assert!(g.applicable_kinds().is_empty());
    }

    #[test]
    fn must_visit_together_with_any_order_yields_same_day_only() {
        let g = group(true, true, TicketType::SameDayAnyOrder);
        assert_eq!(g.applicable_kinds(), vec![ComboConstraintKind::SameDay]);
    }

    #[test]
    fn must_visit_together_with_consecutive_yields_same_day_and_contiguous() {
        let g = group(true, true, TicketType::SameDayConsecutive);
        assert_eq!(g.applicable_kinds(), vec![ComboConstraintKind::SameDay, ComboConstraintKind::Contiguous]);
    }
}
