//! Fault taxonomy: the closed, ordered set of fault categories and their
//! synonym terms.
//!
//! Declared order matters. The classifier walks categories in this order and
//! the first category with a matching synonym wins, so a taxonomy is kept as
//! an ordered list rather than a map. JSON taxonomies use the
//! `{"category": ["synonym", ...]}` layout and keep the order in which keys
//! appear in the file.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// One fault category and its synonym terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaultCategory {
    pub id: String,
    pub synonyms: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TaxonomyError {
    #[error("taxonomy has no categories")]
    Empty,

    #[error("category '{0}' is declared more than once")]
    DuplicateCategory(String),

    #[error("category '{0}' has no usable synonym")]
    NoSynonyms(String),

    #[error("synonym '{synonym}' of '{category}' overlaps with '{first}'")]
    OverlappingSynonym {
        synonym: String,
        category: String,
        first: String,
    },

    #[error("io error reading taxonomy: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed taxonomy json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Ordered fault taxonomy.
///
/// Category identifiers are unique. Synonym overlap is checked by the
/// classifier once terms are stemmed, see [`crate::classifier::FaultClassifier::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taxonomy {
    categories: Vec<FaultCategory>,
}

impl Taxonomy {
    pub fn new(categories: Vec<FaultCategory>) -> Result<Self, TaxonomyError> {
        if categories.is_empty() {
            return Err(TaxonomyError::Empty);
        }

        let mut seen = HashSet::new();
        let categories = categories
            .into_iter()
            .map(|category| {
                let id = category.id.trim().to_lowercase();
                if !seen.insert(id.clone()) {
                    return Err(TaxonomyError::DuplicateCategory(id));
                }
                let synonyms = category
                    .synonyms
                    .iter()
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>();
                if synonyms.is_empty() {
                    return Err(TaxonomyError::NoSynonyms(id));
                }
                Ok(FaultCategory { id, synonyms })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { categories })
    }

    pub fn from_json(json: &str) -> Result<Self, TaxonomyError> {
        let ordered: OrderedCategories = serde_json::from_str(json)?;
        Self::new(ordered.0)
    }

    pub fn load(path: &Path) -> Result<Self, TaxonomyError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn categories(&self) -> &[FaultCategory] {
        &self.categories
    }

    /// Category identifiers in declared order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.id.as_str())
    }

    /// Position of a category in declared order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.categories.iter().position(|c| c.id == id)
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        let categories = DEFAULT_TAXONOMY
            .iter()
            .map(|(id, synonyms)| FaultCategory {
                id: id.to_string(),
                synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
            })
            .collect();
        Self { categories }
    }
}

/// JSON object deserialized into a list, preserving key order.
struct OrderedCategories(Vec<FaultCategory>);

impl<'de> Deserialize<'de> for OrderedCategories {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = OrderedCategories;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of category name to a list of synonyms")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut categories = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((id, synonyms)) = map.next_entry::<String, Vec<String>>()? {
                    categories.push(FaultCategory { id, synonyms });
                }
                Ok(OrderedCategories(categories))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

/// Built-in vehicle taxonomy. Terms shared between subsystems are listed
/// only under the first category that claims them.
const DEFAULT_TAXONOMY: &[(&str, &[&str])] = &[
    (
        "engine",
        &[
            "engine", "motor", "engine block", "engine system", "cylinder", "piston",
            "crankshaft", "camshaft", "timing belt", "timing chain", "spark plug",
            "ignition coil", "valve", "oil pan", "flywheel", "intake manifold",
            "exhaust manifold", "fuel injector", "throttle body", "turbocharger",
            "supercharger", "engine mount", "cooling system", "radiator", "thermostat",
            "water pump",
        ],
    ),
    (
        "transmission",
        &[
            "transmission", "manual transmission", "automatic transmission",
            "transmission system", "clutch", "gearbox", "driveshaft", "differential",
            "axle", "cv joint", "torque converter", "shift linkage", "propeller shaft",
        ],
    ),
    (
        "suspension",
        &[
            "suspension", "shock absorber", "strut", "coil spring", "leaf spring",
            "control arm", "ball joint", "stabilizer bar", "sway bar", "tie rod",
            "wheel hub", "spindle",
        ],
    ),
    (
        "steering",
        &[
            "steering", "steering wheel", "rack and pinion", "power steering pump",
            "tie rod end", "pitman arm", "idler arm", "steering gearbox", "universal joint",
        ],
    ),
    (
        "brakes",
        &[
            "brake", "brake pedal", "brake pad", "brake rotor", "brake drum",
            "brake caliper", "master cylinder", "brake line", "abs system",
            "anti-lock braking system", "parking brake", "handbrake", "brake booster",
        ],
    ),
    (
        "fuel_system",
        &[
            "fuel system", "fuel tank", "fuel pump", "fuel rail", "fuel filter",
            "fuel pressure regulator", "carburetor",
        ],
    ),
    (
        "exhaust_system",
        &[
            "exhaust system", "catalytic converter", "muffler", "exhaust pipe",
            "oxygen sensor",
        ],
    ),
    (
        "electrical_system",
        &[
            "electrical system", "battery", "alternator", "starter motor",
            "wiring harness", "fuse box", "relay", "sensor", "ignition switch", "ecm",
            "engine control module", "tcm", "transmission control module",
        ],
    ),
    (
        "climate_control",
        &[
            "climate control", "ac compressor", "condenser", "evaporator", "heater core",
            "blower motor", "cabin air filter", "refrigerant line",
        ],
    ),
    ("cooling_system", &["radiator fan", "coolant reservoir", "radiator hose"]),
    (
        "body_and_exterior",
        &[
            "chassis", "frame", "hood", "trunk lid", "door", "fender", "bumper",
            "side mirror", "windshield", "window", "roof rack", "spoiler", "grille",
        ],
    ),
    (
        "interior",
        &[
            "seat", "seat belt", "dashboard", "center console", "gear lever", "pedal",
            "airbag", "glove compartment", "sun visor", "headliner", "floor mat",
        ],
    ),
    (
        "lighting",
        &[
            "light", "lighting system", "headlight", "taillight", "fog light",
            "brake light", "turn signal", "reverse light", "daytime running light",
            "interior dome light",
        ],
    ),
    (
        "wheels_and_tires",
        &["wheel", "rim", "tire", "tire valve", "hubcap", "wheel bearing", "lug nut"],
    ),
    ("drivetrain", &["drivetrain", "u-joint"]),
    (
        "safety_systems",
        &[
            "safety system", "abs", "traction control", "electronic stability control",
            "lane departure warning", "blind spot detection",
        ],
    ),
    (
        "adas",
        &[
            "adas", "adas system", "adaptive cruise control", "lane keep assist",
            "parking sensor", "backup camera", "collision avoidance system",
            "autonomous emergency braking", "surround view camera",
        ],
    ),
    (
        "miscellaneous",
        &[
            "wiper blade", "windshield washer pump", "horn", "jack", "spare tire",
            "tool kit", "tow hook",
        ],
    ),
];
