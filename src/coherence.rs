//! Coherence Scorer (C3): a pure function computing narrative-flow scores
//! between ordered POI pairs, grounded in the original's
//! `_calculate_pair_coherence`/`_get_chronological_order`/`_extract_year`
//! (`original_source/src/trip_planner/itinerary_optimizer.py`), re-expressed
//! with the distilled spec's "missing data contributes 0" rule rather than
//! the original's "two unknown periods count as equal" quirk.

use std::collections::HashMap;

use crate::poi::Poi;

/// Historical-period rank table, in the order the original hardcodes in
/// `_get_chronological_order`. Periods not listed here are "unknown" and
/// contribute no chronological-order or same-period bonus.
const PERIOD_ORDER: &[&str] = &[
    "Classical Greece",
    "Hellenistic",
    "Roman Empire",
    "Byzantine",
    "Ottoman",
    "Modern",
];

/// `P(x)`: rank of a historical-period label, 1-indexed, or `None` if the
/// label isn't in the fixed enumeration.
pub fn period_rank(period: &str) -> Option<u32> {
    PERIOD_ORDER.iter().position(|p| *p == period).map(|i| i as u32 + 1)
}

/// `Y(x)`: parses a year out of a free-text date field. Handles "BC"/"AD"
/// suffixes, bare digit years, and `"year1-year2"` ranges (midpoint),
/// matching the original's `_extract_year`.
pub fn parse_year(date_str: &str) -> Option<f64> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }
    let upper = trimmed.to_uppercase();
    let is_bc = upper.contains("BC");

    if let Some((a, b)) = parse_range(trimmed) {
        let midpoint = (a + b) / 2.0;
        return Some(if is_bc { -midpoint } else { midpoint });
    }

    let digits = first_digit_run(trimmed)?;
    let year: f64 = digits.parse().ok()?;
    Some(if is_bc { -year } else { year })
}

fn parse_range(s: &str) -> Option<(f64, f64)> {
    let dash_pos = s.find(['-', '\u{2013}'])?;
    let (left, right) = (&s[..dash_pos], &s[dash_pos + 1..]);
    let a = first_digit_run(left)?.parse().ok()?;
    let b = first_digit_run(right)?.parse().ok()?;
    Some((a, b))
}

fn first_digit_run(s: &str) -> Option<String> {
    let mut run = String::new();
    let mut started = false;
    for ch in s.chars() {
        if ch.is_ascii_digit() {
            run.push(ch);
            started = true;
        } else if started {
            break;
        }
    }
    if run.is_empty() {
        None
    } else {
        Some(run)
    }
}

fn poi_period(poi: &Poi) -> Option<&str> {
    poi.historical_period.as_deref().filter(|s| !s.is_empty())
}

fn poi_year(poi: &Poi) -> Option<f64> {
    poi.construction_date.as_deref().and_then(parse_year)
}

/// Coherence score for the ordered pair `(a, b)`: "how good is it to visit
/// `a` immediately before `b`." Diagonal (`a == b`) is 1.0 by convention,
/// handled by the caller in `build_matrix`/lookup, not here.
pub fn score(a: &Poi, b: &Poi) -> f64 {
    let mut total = 0.0;

    if let (Some(ra), Some(rb)) = (poi_period(a).and_then(period_rank), poi_period(b).and_then(period_rank)) {
        if ra < rb {
            total += 0.4;
        } else if ra == rb {
            total += 0.3;
        }
        if ra == rb {
            total += 0.3;
        }
    }

    if let (Some(ya), Some(yb)) = (poi_year(a), poi_year(b)) {
        let diff = (ya - yb).abs();
        if diff < 50.0 {
            total += 0.3;
        } else if diff < 200.0 {
            total += 0.2;
        } else if diff < 500.0 {
            total += 0.1;
        }
    }

    total.clamp(0.0, 1.0)
}

/// A precomputed, dense coherence matrix over a fixed POI set.
#[derive(Debug, Clone, Default)]
pub struct CoherenceMatrix {
    scores: HashMap<(String, String), f64>,
}

impl CoherenceMatrix {
    pub fn build(pois: &[&Poi]) -> Self {
        let mut scores = HashMap::with_capacity(pois.len() * pois.len());
        for a in pois {
            for b in pois {
                let value = if a.slug == b.slug { 1.0 } else { score(a, b) };
                scores.insert((a.slug.clone(), b.slug.clone()), value);
            }
        }
        Self { scores }
    }

    pub fn lookup(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        self.scores.get(&(a.to_string(), b.to_string())).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poi::Poi;

    fn poi_with(slug: &str, period: Option<&str>, date: Option<&str>) -> Poi {
        let mut poi = Poi::minimal(slug, slug, "rome");
        poi.historical_period = period.map(str::to_string);
        poi.construction_date = date.map(str::to_string);
        poi
    }

    #[test]
    fn earlier_period_scores_higher_than_reverse() {
        let forum = poi_with("forum", Some("Roman Empire"), None);
        let hagia = poi_with("hagia", Some("Byzantine"), None);
        assert!(score(&forum, &hagia) > score(&hagia, &forum));
    }

    #[test]
    fn same_period_and_close_dates_stack() {
        let a = poi_with("a", Some("Roman Empire"), Some("80 AD"));
        let b = poi_with("b", Some("Roman Empire"), Some("100 AD"));
        // +0.3 tie + 0.3 same-period bonus + 0.3 date proximity (<50y diff), clamped to 1.0
        assert_eq!(score(&a, &b), 1.0);
    }

    #[test]
    fn unknown_period_contributes_zero_not_a_match() {
        let a = poi_with("a", None, None);
        let b = poi_with("b", None, None);
        assert_eq!(score(&a, &b), 0.0);
    }

    #[test]
    fn bc_dates_parse_negative() {
        assert_eq!(parse_year("447 BC"), Some(-447.0));
        assert_eq!(parse_year("131-132 AD"), Some(131.5));
        assert_eq!(parse_year("1687"), Some(1687.0));
    }

    #[test]
    fn diagonal_is_one() {
        let matrix = CoherenceMatrix::build(&[]);
        assert_eq!(matrix.lookup("x", "x"), 1.0);
    }
}
