//! The invoice record extracted from each document.
//!
//! Field names are PascalCase on the wire so the template sent to the model
//! and the JSON stored next to the document read the same. Dates are UTC;
//! the minimum timestamp (`0001-01-01T00:00:00Z`) is the template's
//! placeholder and counts as "not present".

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Data extracted from one invoice document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvoiceData {
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default, with = "utc_date")]
    pub invoice_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub products: Option<Vec<InvoiceProduct>>,
    #[serde(default)]
    pub total_quantity: Option<f64>,
    #[serde(default)]
    pub total_price: Option<f64>,
    #[serde(default)]
    pub signatures: Option<Vec<InvoiceSignature>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<InvoiceReturns>,
}

/// One invoice line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvoiceProduct {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub unit_price: Option<f64>,
    /// A `null` quantity reads as zero.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub quantity: f64,
    #[serde(default)]
    pub total: Option<f64>,
}

/// Who signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureType {
    #[serde(alias = "distributor", alias = "DISTRIBUTOR")]
    Distributor,
    #[serde(alias = "customer", alias = "CUSTOMER")]
    Customer,
    /// Any other role the model reports.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvoiceSignature {
    #[serde(rename = "Type", default)]
    pub kind: Option<SignatureType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, with = "utc_date")]
    pub signed_on: Option<DateTime<Utc>>,
}

impl InvoiceSignature {
    /// `true` for a signature of `kind` with a real signing date.
    pub fn is_signed(&self, kind: SignatureType) -> bool {
        self.kind == Some(kind) && self.signed_on.is_some_and(|d| !is_default_timestamp(&d))
    }
}

/// Goods handed back with the delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvoiceReturns {
    #[serde(default)]
    pub products: Option<Vec<ReturnedProduct>>,
    #[serde(default)]
    pub signatures: Option<Vec<InvoiceSignature>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReturnedProduct {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl InvoiceData {
    /// The empty template sent to the model as the schema description.
    pub fn template() -> Self {
        let placeholder = Some(min_timestamp());
        let signature = |kind| InvoiceSignature {
            kind: Some(kind),
            name: Some(String::new()),
            signed_on: placeholder,
        };
        Self {
            customer_name: Some(String::new()),
            invoice_date: placeholder,
            products: Some(vec![InvoiceProduct {
                id: Some(String::new()),
                unit_price: Some(0.0),
                quantity: 0.0,
                total: Some(0.0),
            }]),
            total_quantity: Some(0.0),
            total_price: Some(0.0),
            signatures: Some(vec![signature(SignatureType::Distributor)]),
            returns: Some(InvoiceReturns {
                products: Some(vec![ReturnedProduct {
                    id: Some(String::new()),
                    quantity: Some(0.0),
                    reason: Some(String::new()),
                }]),
                signatures: Some(vec![signature(SignatureType::Distributor)]),
            }),
        }
    }
}

/// `0001-01-01T00:00:00Z`, the "no date" placeholder.
pub fn min_timestamp() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| n.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// `true` for the placeholder date (or anything before it).
pub fn is_default_timestamp(d: &DateTime<Utc>) -> bool {
    d.year() <= 1
}

/// Parse the date shapes models actually produce into UTC.
///
/// RFC 3339 with an offset is converted; a naive date-time or a bare date is
/// taken as UTC. Anything else is `None`.
pub fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(n) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(n.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| n.and_utc())
}

mod utc_date {
    use super::*;

    pub fn serialize<S: Serializer>(v: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(d) => s.serialize_str(&d.to_rfc3339_opts(SecondsFormat::Secs, true)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        Ok(raw.as_deref().and_then(parse_utc))
    }
}

fn null_as_zero<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(d)?.unwrap_or(0.0))
}
