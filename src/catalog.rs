//! POI Catalog (C1): loads POI records and combo-ticket groups for a city
//! from the on-disk store, validates them, and exposes a queryable
//! in-memory view enriched with resolved combo-group data.
//!
//! On-disk layout (relative to an explicitly-passed root — no global
//! singleton, per spec §9):
//!   `<root>/pois/<city>/*.poi`          one declarative record per file
//!   `<root>/combo_groups/<city>/*.combo` one record per combo group
//!
//! The "declarative key-value document format" named in spec §6 is a flat
//! `key: value` format with repeated keys for list fields (`period:`,
//! `preferred_slot:`, `combo_group:`, `member:`), matching how opening-hours
//! periods and combo memberships are both naturally one-record-per-line.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::combo::{ComboConstraints, ComboGroup, Issue, IssueSeverity, TicketType, VisitOrder};
use crate::error::{Error, Result};
use crate::poi::{BookingInfo, CoordinateSource, GeoPoint, IndoorOutdoor, OpeningHours, Period, Poi, PreferredSlot};

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    city: String,
    pois: HashMap<String, Poi>,
    combo_groups: HashMap<String, ComboGroup>,
}

impl Catalog {
    /// Loads all POI records for `city`. Fails with `CityNotFound` if no
    /// record directory exists; returns an empty catalog if the directory
    /// is empty. Malformed records are logged as warnings and dropped, per
    /// spec §4.1 / §7.
    #[instrument(skip(root), fields(city = %city))]
    pub fn load_city(root: &Path, city: &str) -> Result<Self> {
        let poi_dir = root.join("pois").join(city);
        if !poi_dir.is_dir() {
            return Err(Error::not_found("CITY_NOT_FOUND", format!("no POI directory for city '{city}'")));
        }

        let mut pois = HashMap::new();
        for entry in read_dir_sorted(&poi_dir)? {
            if entry.extension().and_then(|e| e.to_str()) != Some("poi") {
                continue;
            }
            match fs::read_to_string(&entry).map_err(Error::from).and_then(|text| parse_poi_record(&text)) {
                Ok(poi) => {
                    pois.insert(poi.slug.clone(), poi);
                }
                Err(err) => {
                    warn!(file = %entry.display(), error = %err, "skipping malformed POI record");
                }
            }
        }

        let combo_dir = root.join("combo_groups").join(city);
        let mut combo_groups = HashMap::new();
        if combo_dir.is_dir() {
            for entry in read_dir_sorted(&combo_dir)? {
                if entry.extension().and_then(|e| e.to_str()) != Some("combo") {
                    continue;
                }
                match fs::read_to_string(&entry).map_err(Error::from).and_then(|text| parse_combo_record(&text, city)) {
                    Ok(group) => {
                        combo_groups.insert(group.id.clone(), group);
                    }
                    Err(err) => {
                        warn!(file = %entry.display(), error = %err, "skipping malformed combo group record");
                    }
                }
            }
        }

        let mut catalog = Catalog { city: city.to_string(), pois, combo_groups };
        catalog.enrich();
        info!(poi_count = catalog.pois.len(), combo_groups = catalog.combo_groups.len(), "catalog loaded");
        Ok(catalog)
    }

    /// Attaches resolved `ComboGroup`s to every POI that references them.
    /// Unknown group IDs produce a warning and are dropped from the
    /// attached view (the raw ID list on the record is left untouched).
    fn enrich(&mut self) {
        let groups = self.combo_groups.clone();
        for poi in self.pois.values_mut() {
            let mut resolved = Vec::new();
            for group_id in &poi.combo_group_ids {
                match groups.get(group_id) {
                    Some(group) => resolved.push(group.clone()),
                    None => warn!(poi = %poi.slug, group_id, "unknown combo group id, dropping from enrichment"),
                }
            }
            poi.combo_groups = resolved;
        }
    }

    pub fn list(&self) -> Vec<&Poi> {
        let mut all: Vec<&Poi> = self.pois.values().collect();
        all.sort_by(|a, b| a.slug.cmp(&b.slug));
        all
    }

    pub fn get(&self, slug: &str) -> Result<&Poi> {
        self.pois.get(slug).ok_or_else(|| Error::not_found("POI_NOT_FOUND", format!("no POI '{slug}' in city '{}'", self.city)))
    }

    pub fn combo_groups(&self) -> Vec<&ComboGroup> {
        let mut all: Vec<&ComboGroup> = self.combo_groups.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn combo_group(&self, id: &str) -> Option<&ComboGroup> {
        self.combo_groups.get(id)
    }

    /// Validates the bidirectional membership invariant: for every group G
    /// and member M, M's combo-memberships must contain G; and for every M
    /// and every group G in M's memberships, M must be in G.members.
    /// `error`-severity issues break this invariant; everything else is a
    /// `warning`.
    pub fn validate(&self) -> Vec<Issue> {
        let mut issues = Vec::new();

        for group in self.combo_groups.values() {
            if !(2..=10).contains(&group.members.len()) {
                issues.push(Issue::warning(format!(
                    "combo group '{}' has {} members (expected 2..10)",
                    group.id,
                    group.members.len()
                )));
            }
            if group.constraints.max_separation_hours <= 0.0 {
                issues.push(Issue::warning(format!(
                    "combo group '{}' has non-positive max_separation_hours",
                    group.id
                )));
            }
            for member_name in &group.members {
                let member_poi = self.pois.values().find(|p| &p.name == member_name);
                match member_poi {
                    None => issues.push(Issue::warning(format!(
                        "combo group '{}' references unknown POI '{}'",
                        group.id, member_name
                    ))),
                    Some(poi) => {
                        if !poi.combo_group_ids.iter().any(|g| g == &group.id) {
                            issues.push(Issue::error(format!(
                                "POI '{}' is a member of group '{}' but does not list it in combo_group_ids",
                                poi.slug, group.id
                            )));
                        }
                    }
                }
            }
        }

        for poi in self.pois.values() {
            for group_id in &poi.combo_group_ids {
                match self.combo_groups.get(group_id) {
                    None => issues.push(Issue::warning(format!(
                        "POI '{}' references unknown combo group '{}'",
                        poi.slug, group_id
                    ))),
                    Some(group) => {
                        if !group.members.iter().any(|m| m == &poi.name) {
                            issues.push(Issue::error(format!(
                                "POI '{}' claims membership in group '{}' which does not list it",
                                poi.slug, group_id
                            )));
                        }
                    }
                }
            }
        }

        issues
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    /// Builds a catalog directly from in-memory records, skipping the
    /// on-disk declarative format — for callers that already hold POI/combo
    /// records (an alternate loader, or a test harness).
    pub fn from_parts(city: &str, pois: Vec<Poi>, combo_groups: Vec<ComboGroup>) -> Self {
        let mut catalog = Catalog {
            city: city.to_string(),
            pois: pois.into_iter().map(|p| (p.slug.clone(), p)).collect(),
            combo_groups: combo_groups.into_iter().map(|g| (g.id.clone(), g)).collect(),
        };
        catalog.enrich();
        catalog
    }
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.sort();
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Declarative key-value record parsing
// ---------------------------------------------------------------------------

fn parse_kv_lines(text: &str) -> Vec<(String, String)> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn parse_poi_record(text: &str) -> std::result::Result<Poi, Error> {
    let lines = parse_kv_lines(text);
    let get = |key: &str| lines.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone());
    let get_all = |key: &str| -> Vec<String> {
        lines.iter().filter(|(k, _)| k == key).map(|(_, v)| v.clone()).collect()
    };

    let slug = get("slug").ok_or_else(|| Error::invalid("POI_MISSING_SLUG", "record has no 'slug' key"))?;
    let name = get("name").unwrap_or_else(|| slug.clone());
    let city = get("city").ok_or_else(|| Error::invalid("POI_MISSING_CITY", format!("record '{slug}' has no 'city' key")))?;

    let location = match (get("latitude"), get("longitude")) {
        (Some(lat), Some(lng)) => {
            let latitude: f64 = lat.parse().map_err(|_| Error::invalid("POI_BAD_COORD", format!("bad latitude in '{slug}'")))?;
            let longitude: f64 = lng.parse().map_err(|_| Error::invalid("POI_BAD_COORD", format!("bad longitude in '{slug}'")))?;
            let source = match get("source").as_deref() {
                Some("geocoder") => CoordinateSource::Geocoder,
                Some("manual") => CoordinateSource::Manual,
                _ => CoordinateSource::Api,
            };
            let collected_at = get("collected_at").and_then(|s| s.parse().ok()).unwrap_or(0);
            Some(GeoPoint { latitude, longitude, source, collected_at })
        }
        _ => None,
    };

    let estimated_visit_minutes = get("estimated_visit_minutes").and_then(|s| s.parse().ok()).unwrap_or(120);

    let indoor_outdoor = match get("indoor_outdoor").as_deref() {
        Some("indoor") => Some(IndoorOutdoor::Indoor),
        Some("outdoor") => Some(IndoorOutdoor::Outdoor),
        Some("mixed") => Some(IndoorOutdoor::Mixed),
        Some("unknown") => Some(IndoorOutdoor::Unknown),
        _ => None,
    };

    let mut periods = Vec::new();
    for raw in get_all("period") {
        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(Error::invalid("POI_BAD_PERIOD", format!("malformed period '{raw}' in '{slug}'")));
        }
        let day_of_week: u8 = parts[0].parse().map_err(|_| Error::invalid("POI_BAD_PERIOD", format!("bad day_of_week in '{slug}'")))?;
        let open_hhmm: u16 = parts[1].parse().map_err(|_| Error::invalid("POI_BAD_PERIOD", format!("bad open_hhmm in '{slug}'")))?;
        let close_hhmm: u16 = parts[2].parse().map_err(|_| Error::invalid("POI_BAD_PERIOD", format!("bad close_hhmm in '{slug}'")))?;
        periods.push(Period { day_of_week, open_hhmm, close_hhmm });
    }

    let mut preferred_slots = Vec::new();
    for raw in get_all("preferred_slot") {
        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        if parts.len() == 2 {
            if let (Ok(start_hhmm), Ok(end_hhmm)) = (parts[0].parse(), parts[1].parse()) {
                preferred_slots.push(PreferredSlot { start_hhmm, end_hhmm });
            }
        }
    }

    let booking = BookingInfo {
        required: get("booking.required").map(|v| v == "true").unwrap_or(false),
        advance_days: get("booking.advance_days").and_then(|s| s.parse().ok()),
        preferred_slots,
        url: get("booking.url"),
    };

    let combo_group_ids = get_all("combo_group");
    let must_visit_after = get_all("must_visit_after");

    Ok(Poi {
        slug,
        name,
        city,
        location,
        estimated_visit_minutes,
        indoor_outdoor,
        opening_hours: OpeningHours::new(periods),
        booking,
        combo_group_ids,
        address: get("address"),
        phone: get("phone"),
        website: get("website"),
        rating: get("rating").and_then(|s| s.parse().ok()),
        wheelchair_accessible: get("wheelchair_accessible").map(|v| v == "true"),
        historical_period: get("historical_period"),
        construction_date: get("construction_date"),
        notes: get("notes"),
        must_visit_after,
        combo_groups: Vec::new(),
    })
}

fn parse_combo_record(text: &str, city: &str) -> std::result::Result<ComboGroup, Error> {
    let lines = parse_kv_lines(text);
    let get = |key: &str| lines.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone());
    let get_all = |key: &str| -> Vec<String> {
        lines.iter().filter(|(k, _)| k == key).map(|(_, v)| v.clone()).collect()
    };

    let id = get("id").ok_or_else(|| Error::invalid("COMBO_MISSING_ID", "combo record has no 'id' key"))?;
    let members = get_all("member");

    let ticket_type = match get("ticket_type").as_deref() {
        Some("same_day_any_order") => TicketType::SameDayAnyOrder,
        Some("multi_day") => TicketType::MultiDay,
        Some("same_day_clustered") => TicketType::SameDayClustered,
        _ => TicketType::SameDayConsecutive,
    };
    let visit_order = match get("visit_order").as_deref() {
        Some("fixed") => VisitOrder::Fixed,
        Some("chronological") => VisitOrder::Chronological,
        _ => VisitOrder::Flexible,
    };

    Ok(ComboGroup {
        id,
        city: city.to_string(),
        members,
        constraints: ComboConstraints {
            must_visit_together: get("must_visit_together").map(|v| v == "true").unwrap_or(false),
            max_separation_hours: get("max_separation_hours").and_then(|s| s.parse().ok()).unwrap_or(0.0),
            visit_order,
            same_day_required: get("same_day_required").map(|v| v == "true").unwrap_or(false),
            ticket_type,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_poi_record() {
        let text = "slug: colosseum\nname: Colosseum\ncity: rome\nlatitude: 41.89\nlongitude: 12.49\nperiod: 1,0900,1930\n";
        let poi = parse_poi_record(text).unwrap();
        assert_eq!(poi.slug, "colosseum");
        assert!(poi.opening_hours.is_open(1, 1000));
        assert!(!poi.opening_hours.is_open(0, 1000));
    }

    #[test]
    fn parses_combo_record() {
        let text = "id: archaeological_pass\nmember: Colosseum\nmember: Roman Forum\nmust_visit_together: true\nticket_type: same_day_consecutive\nmax_separation_hours: 4\n";
        let group = parse_combo_record(text, "rome").unwrap();
        assert_eq!(group.members.len(), 2);
        assert!(group.constraints.must_visit_together);
    }
}
