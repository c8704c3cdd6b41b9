//! Star rating reconciliation across EXIF and XMP.
//!
//! Four tags can carry a rating:
//!
//! | key                         | scale | type  |
//! |-----------------------------|-------|-------|
//! | `Exif.Image.Rating`         | 0–5   | Short |
//! | `Exif.Image.RatingPercent`  | 0–100 | Short |
//! | `Xmp.xmp.Rating`            | 0–5   | text  |
//! | `Xmp.MicrosoftPhoto.Rating` | 0–100 | text  |
//!
//! Reading folds them into one canonical 0–5 value; writing fans one value
//! back out to all four. An unrated image has none of the tags, which is
//! distinct from an explicit zero.

pub const EXIF_RATING: &str = "Exif.Image.Rating";
pub const EXIF_RATING_PERCENT: &str = "Exif.Image.RatingPercent";
pub const XMP_RATING: &str = "Xmp.xmp.Rating";
pub const XMP_MICROSOFT_RATING: &str = "Xmp.MicrosoftPhoto.Rating";

/// Every tag touched by a rating write.
pub const RATING_KEYS: [&str; 4] = [
    EXIF_RATING,
    EXIF_RATING_PERCENT,
    XMP_RATING,
    XMP_MICROSOFT_RATING,
];

// Percent values written for ratings 1..=5. Five stars is 99, not 100.
const PERCENT_BY_RATING: [u16; 5] = [1, 25, 50, 75, 99];

/// Raw rating values as found in the tag maps. `None` means the tag is
/// absent or unparseable.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RatingSources {
    pub exif: Option<f64>,
    pub xmp: Option<f64>,
    /// `Xmp.MicrosoftPhoto.Rating` on its native 0–100 scale.
    pub microsoft: Option<f64>,
}

/// Fold a 0–100 vendor percentage onto the 0–5 star scale.
pub fn fold_percent(percent: f64) -> f64 {
    match percent.round() as i64 {
        i64::MIN..=0 => 0.0,
        1..=12 => 1.0,
        13..=37 => 2.0,
        38..=62 => 3.0,
        63..=87 => 4.0,
        _ => 5.0,
    }
}

/// Canonical rating: EXIF wins, then `Xmp.xmp.Rating`, then the folded
/// Microsoft rating. `None` means unrated.
pub fn reconcile(sources: RatingSources) -> Option<u8> {
    let xmp = sources.xmp.or_else(|| sources.microsoft.map(fold_percent));
    sources
        .exif
        .or(xmp)
        .map(|v| v.round().clamp(0.0, 5.0) as u8)
}

/// Percent value stored alongside star rating `r`.
pub fn percent_for(r: u8) -> Option<u16> {
    match r {
        1..=5 => Some(PERCENT_BY_RATING[usize::from(r) - 1]),
        _ => None,
    }
}

/// The tag mutations needed to store a rating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RatingWrite {
    /// Remove all of [`RATING_KEYS`].
    Clear,
    Set {
        stars: u16,
        percent: u16,
    },
}

impl RatingWrite {
    /// Plan the write for rating `r`. Zero and anything outside `1..=5`
    /// clear the rating.
    pub fn plan(r: i32) -> Self {
        match u8::try_from(r).ok().and_then(|r| percent_for(r).map(|p| (r, p))) {
            Some((stars, percent)) => Self::Set {
                stars: u16::from(stars),
                percent,
            },
            None => Self::Clear,
        }
    }
}
