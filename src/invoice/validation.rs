//! Business rules over one extracted invoice.
//!
//! [`validate_invoice`] is pure: it reads the record, sets one
//! [`ValidationStatus`] bit and appends one message per failed rule, and
//! never stops at the first failure.

use super::data::{InvoiceData, InvoiceSignature, SignatureType};
use crate::workflow::ValidationResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Flag set describing the outcome of validation.
///
/// Every condition is a distinct bit. `SUCCESS` has its own bit, so a
/// validated record can be told apart from one never validated (`NONE`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationStatus(u32);

impl ValidationStatus {
    pub const NONE: Self = Self(0);
    pub const DISTRIBUTOR_SIGNATURE_MISSING: Self = Self(1 << 0);
    pub const CUSTOMER_SIGNATURE_MISSING: Self = Self(1 << 1);
    pub const CUSTOMER_NAME_MISSING: Self = Self(1 << 2);
    pub const PRODUCTS_TOTAL_QUANTITY_INVALID: Self = Self(1 << 3);
    pub const PRODUCTS_TOTAL_PRICE_INVALID: Self = Self(1 << 4);
    pub const RETURNS_REASON_MISSING: Self = Self(1 << 5);
    pub const RETURNS_DISTRIBUTOR_SIGNATURE_MISSING: Self = Self(1 << 6);
    pub const RETURNS_CUSTOMER_SIGNATURE_MISSING: Self = Self(1 << 7);
    pub const INPUT_MISSING: Self = Self(1 << 8);
    pub const SUCCESS: Self = Self(1 << 31);

    const NAMED: [(Self, &'static str); 10] = [
        (Self::DISTRIBUTOR_SIGNATURE_MISSING, "DistributorSignatureMissing"),
        (Self::CUSTOMER_SIGNATURE_MISSING, "CustomerSignatureMissing"),
        (Self::CUSTOMER_NAME_MISSING, "CustomerNameMissing"),
        (Self::PRODUCTS_TOTAL_QUANTITY_INVALID, "ProductsTotalQuantityInvalid"),
        (Self::PRODUCTS_TOTAL_PRICE_INVALID, "ProductsTotalPriceInvalid"),
        (Self::RETURNS_REASON_MISSING, "ReturnsReasonMissing"),
        (Self::RETURNS_DISTRIBUTOR_SIGNATURE_MISSING, "ReturnsDistributorSignatureMissing"),
        (Self::RETURNS_CUSTOMER_SIGNATURE_MISSING, "ReturnsCustomerSignatureMissing"),
        (Self::INPUT_MISSING, "InputMissing"),
        (Self::SUCCESS, "Success"),
    ];

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// `true` if every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Any failure bit set.
    pub const fn has_failures(self) -> bool {
        self.0 & !Self::SUCCESS.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitOr for ValidationStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ValidationStatus {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("None");
        }
        let names: Vec<&str> = Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join(" | "))
    }
}

/// Outcome of validating one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvoiceValidation {
    pub name: String,
    pub is_valid: bool,
    pub status: ValidationStatus,
    pub messages: Vec<String>,
}

impl InvoiceValidation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_valid: true,
            status: ValidationStatus::NONE,
            messages: Vec::new(),
        }
    }

    /// Record a failed rule. Flags accumulate and are never cleared.
    pub fn fail(&mut self, flag: ValidationStatus, message: impl Into<String>) {
        self.status |= flag;
        self.is_valid = false;
        self.messages.push(message.into());
    }

    /// Fold in a request-level validation result.
    pub fn merge(&mut self, other: &ValidationResult) {
        self.is_valid &= other.is_valid;
        self.messages.extend(other.messages.iter().cloned());
    }
}

fn has_signature(signatures: &[InvoiceSignature], kind: SignatureType) -> bool {
    signatures.iter().any(|s| s.is_signed(kind))
}

/// Validate one invoice. `None` is invalid with `INPUT_MISSING`.
pub fn validate_invoice(name: &str, data: Option<&InvoiceData>) -> InvoiceValidation {
    let mut result = InvoiceValidation::new(name);

    let Some(data) = data else {
        result.fail(ValidationStatus::INPUT_MISSING, "Data is required.");
        return result;
    };

    if data
        .customer_name
        .as_deref()
        .is_none_or(|n| n.trim().is_empty())
    {
        result.fail(ValidationStatus::CUSTOMER_NAME_MISSING, "CustomerName is required.");
    }

    match &data.signatures {
        None => {
            result.status |= ValidationStatus::DISTRIBUTOR_SIGNATURE_MISSING;
            result.fail(
                ValidationStatus::CUSTOMER_SIGNATURE_MISSING,
                "Signatures is required.",
            );
        }
        Some(signatures) => {
            if !has_signature(signatures, SignatureType::Distributor) {
                result.fail(
                    ValidationStatus::DISTRIBUTOR_SIGNATURE_MISSING,
                    "Signatures must contain a distributor signature.",
                );
            }
            if !has_signature(signatures, SignatureType::Customer) {
                result.fail(
                    ValidationStatus::CUSTOMER_SIGNATURE_MISSING,
                    "Signatures must contain a customer signature.",
                );
            }
        }
    }

    if let Some(products) = &data.products {
        let quantity: f64 = products.iter().map(|p| p.quantity).sum();
        if data.total_quantity != Some(quantity) {
            result.fail(
                ValidationStatus::PRODUCTS_TOTAL_QUANTITY_INVALID,
                "Products quantity total must match TotalQuantity.",
            );
        }

        // A line without a total makes the sum unknown, not smaller.
        let price: Option<f64> = products.iter().map(|p| p.total).sum();
        if price.is_none() || data.total_price != price {
            result.fail(
                ValidationStatus::PRODUCTS_TOTAL_PRICE_INVALID,
                "Products price total must match TotalPrice.",
            );
        }
    }

    if let Some(returns) = &data.returns {
        let products = returns.products.as_deref().unwrap_or_default();
        if products
            .iter()
            .any(|p| p.reason.as_deref().is_none_or(|r| r.trim().is_empty()))
        {
            result.fail(
                ValidationStatus::RETURNS_REASON_MISSING,
                "Returns products must each have a reason.",
            );
        }

        let signatures = returns.signatures.as_deref().unwrap_or_default();
        if !has_signature(signatures, SignatureType::Distributor) {
            result.fail(
                ValidationStatus::RETURNS_DISTRIBUTOR_SIGNATURE_MISSING,
                "Returns must contain a distributor signature.",
            );
        }
        if !has_signature(signatures, SignatureType::Customer) {
            result.fail(
                ValidationStatus::RETURNS_CUSTOMER_SIGNATURE_MISSING,
                "Returns must contain a customer signature.",
            );
        }
    }

    if result.is_valid {
        result.status = ValidationStatus::SUCCESS;
    }

    result
}
