//! Invoice domain: the extracted record and its validation rules.

pub mod data;
pub mod validation;

pub use data::{
    InvoiceData, InvoiceProduct, InvoiceReturns, InvoiceSignature, ReturnedProduct, SignatureType,
};
pub use validation::{validate_invoice, InvoiceValidation, ValidationStatus};
