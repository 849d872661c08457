//! Record Normalizer & Validator - turns one raw record into a `PriceRecord`
//! or an explicit skip reason. Rejections are row-scoped: a bad row never
//! aborts the batch.

use chrono::NaiveDate;
use csv::StringRecord;
use serde::Serialize;
use std::fmt;

/// Region names exactly as they appear in the source CSV, matched
/// case-sensitively. Trentino-Alto Adige is absent from the file; the
/// autonomous provinces of Bolzano and Trento appear as separate entries.
pub const REGIONS: &[&str] = &[
    "Abruzzo",
    "Basilicata",
    "Bolzano",
    "Calabria",
    "Campania",
    "Emilia Romagna",
    "Friuli Venezia Giulia",
    "Lazio",
    "Liguria",
    "Lombardia",
    "Marche",
    "Molise",
    "Piemonte",
    "Puglia",
    "Sardegna",
    "Sicilia",
    "Toscana",
    "Trento",
    "Umbria",
    "Valle d'Aosta",
    "Veneto",
];

/// Fuel vocabulary, in presentation priority order.
pub const FUEL_TYPES: &[&str] = &["Benzina", "Gasolio", "GPL", "Metano"];

/// The persisted fact: one average price per (region, fuel, date) triple.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRecord {
    pub region: String,
    pub fuel_type: String,
    pub average_price: f64,
    pub publication_date: NaiveDate,
}

/// Why a row was rejected. Each reason is counted and logged; none of them
/// is an error for the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    TooShort,
    MissingData,
    InvalidPrice(String),
    NegativePrice(String),
    UnknownRegion(String),
    UnknownFuel(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::TooShort => write!(f, "too short"),
            SkipReason::MissingData => write!(f, "missing data"),
            SkipReason::InvalidPrice(v) => write!(f, "invalid price '{}'", v),
            SkipReason::NegativePrice(v) => write!(f, "negative price '{}'", v),
            SkipReason::UnknownRegion(r) => write!(f, "unrecognized region '{}'", r),
            SkipReason::UnknownFuel(t) => write!(f, "unrecognized fuel type '{}'", t),
        }
    }
}

/// Validate one record. Field layout of the source: 0 = region, 1 = fuel
/// type, 3 = average price with a comma decimal separator. The canonical
/// sets are injected so tests can substitute smaller fixtures.
pub fn normalize_row(
    row: &StringRecord,
    publication_date: NaiveDate,
    regions: &[&str],
    fuels: &[&str],
) -> Result<PriceRecord, SkipReason> {
    if row.len() < 4 {
        return Err(SkipReason::TooShort);
    }

    let region = row.get(0).unwrap_or("").trim();
    let fuel_type = row.get(1).unwrap_or("").trim();
    let price_str = row.get(3).unwrap_or("").trim();
    if region.is_empty() || fuel_type.is_empty() || price_str.is_empty() {
        return Err(SkipReason::MissingData);
    }

    // The source writes decimals with a comma; an already period-separated
    // value parses identically.
    let average_price: f64 = price_str
        .replace(',', ".")
        .parse()
        .map_err(|_| SkipReason::InvalidPrice(price_str.to_string()))?;
    if !average_price.is_finite() {
        return Err(SkipReason::InvalidPrice(price_str.to_string()));
    }
    if average_price < 0.0 {
        return Err(SkipReason::NegativePrice(price_str.to_string()));
    }

    if !regions.contains(&region) {
        return Err(SkipReason::UnknownRegion(region.to_string()));
    }
    if !fuels.contains(&fuel_type) {
        return Err(SkipReason::UnknownFuel(fuel_type.to_string()));
    }

    Ok(PriceRecord {
        region: region.to_string(),
        fuel_type: fuel_type.to_string(),
        average_price,
        publication_date,
    })
}
