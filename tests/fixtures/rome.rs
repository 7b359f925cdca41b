//! Real Rome locations for the seed scenarios in spec §8, analogous to the
//! teacher crate's `las_vegas_locations.rs`.

/// A named location with coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Location {
    pub name: &'static str,
    pub slug: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(name: &'static str, slug: &'static str, lat: f64, lng: f64) -> Self {
        Self { name, slug, lat, lng }
    }

    pub fn coords(&self) -> (f64, f64) {
        (self.lat, self.lng)
    }
}

pub const COLOSSEUM: Location = Location::new("Colosseum", "colosseum", 41.8902, 12.4922);
pub const ROMAN_FORUM: Location = Location::new("Roman Forum", "roman-forum", 41.8925, 12.4853);
pub const PALATINE_HILL: Location = Location::new("Palatine Hill", "palatine-hill", 41.8888, 12.4879);
pub const PANTHEON: Location = Location::new("Pantheon", "pantheon", 41.8986, 12.4769);
pub const TREVI_FOUNTAIN: Location = Location::new("Trevi Fountain", "trevi-fountain", 41.9009, 12.4833);
pub const SPANISH_STEPS: Location = Location::new("Spanish Steps", "spanish-steps", 41.9058, 12.4823);
pub const CASTEL_SANT_ANGELO: Location = Location::new("Castel Sant'Angelo", "castel-sant-angelo", 41.9031, 12.4663);

pub const ARCHAEOLOGICAL_CORE: &[Location] = &[COLOSSEUM, ROMAN_FORUM, PALATINE_HILL];
pub const CENTRO_STORICO: &[Location] = &[PANTHEON, TREVI_FOUNTAIN, SPANISH_STEPS, CASTEL_SANT_ANGELO];
