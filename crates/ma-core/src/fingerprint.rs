//! Order-independent fingerprints for prospecting reports.
//!
//! The game emits a fresh `ProspectedAsteroid` each time a prospector limpet
//! hits a rock, including rocks that were already prospected. Two reports with
//! the same composition and content label are treated as the same asteroid.

use std::fmt;

/// Decimal places kept when comparing proportions.
pub const PROPORTION_PRECISION: u32 = 4;

const PROPORTION_SCALE: f64 = 10_000.0;

/// Canonical identity of a prospecting report.
///
/// Proportions are stored as integer ten-thousandths so the fingerprint can be
/// hashed and compared exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProspectFingerprint {
    label: String,
    materials: Vec<(String, i64)>,
}

impl ProspectFingerprint {
    /// Builds a fingerprint from a content label and `(material, proportion)` pairs.
    ///
    /// Empty label parts are dropped and the rest joined with `|`. Material
    /// names are lower-cased and the pairs sorted. Returns `None` when there
    /// are no pairs, since an empty composition cannot identify an asteroid.
    pub fn new<'a, L, M>(label_parts: L, materials: M) -> Option<Self>
    where
        L: IntoIterator<Item = &'a str>,
        M: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut pairs: Vec<(String, i64)> = materials
            .into_iter()
            .map(|(name, proportion)| (name.to_lowercase(), quantize(proportion)))
            .collect();
        if pairs.is_empty() {
            return None;
        }
        pairs.sort();

        let label = label_parts
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("|");

        Some(Self {
            label,
            materials: pairs,
        })
    }
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "proportions are percentages, far inside i64 range once scaled"
)]
fn quantize(proportion: f64) -> i64 {
    (proportion * PROPORTION_SCALE).round() as i64
}

impl fmt::Display for ProspectFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#", self.label)?;
        for (index, (name, scaled)) in self.materials.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            let whole = scaled / 10_000;
            let fraction = (scaled % 10_000).abs();
            let sign = if *scaled < 0 && whole == 0 { "-" } else { "" };
            write!(f, "{name}={sign}{whole}.{fraction:04}")?;
        }
        Ok(())
    }
}
