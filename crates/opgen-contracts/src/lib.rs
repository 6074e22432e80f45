//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for schema/version strings that
//! appear in the JSON files `opgen` reads and in the text it writes.

pub const OPGEN_MAPPINGS_SCHEMA_VERSION: &str = "opgen.mappings@0.1.0";
pub const OPGEN_MANIFEST_SCHEMA_VERSION: &str = "opgen.manifest@0.1.0";

/// Flag keys of the JSON object attached to each host declaration.
pub const METADATA_KEY_DISPATCH: &str = "dispatch";
pub const METADATA_KEY_DEFAULT: &str = "default";

/// Mapping-file keyword for an operator emitted as a prototype only.
pub const SIGNATURE_ONLY_KEYWORD: &str = "signature_only";

pub const GENERATED_BANNER: &str = "// AUTO-GENERATED CODE! - DO NOT EDIT!";
