//! Input sanitization and field validation.
//!
//! Every user-supplied field belongs to one [`FieldKind`], which fixes both
//! its normalization and its rules. All functions here are pure.

mod custom;
mod field_kind;
mod sanitizer;

pub use custom::{
    validate_collection_name, validate_color, validate_description, validate_email,
    validate_field, validate_notes, validate_password, validate_tags, validate_title,
    validate_url, validate_username,
};
pub use field_kind::{FieldKind, Validation, ValidationError, check_tags, validate};
pub use sanitizer::{MAX_TAGS, normalize_tags, sanitize};
