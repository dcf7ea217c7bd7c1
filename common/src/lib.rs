//! Shared building blocks for sourceprep: layered list resources and
//! sandbox-relative path handling.

pub mod path;
pub mod resources;

pub use path::{PathError, posix_relative, to_posix_string};
pub use resources::{
    BUILD_FLAGS, CLEANING_LIST, DOMAIN_REGEX_LIST, DOMAIN_SUBSTITUTION_LIST, PATCH_ORDER,
    PATCHES_DIR, ResourceError, ResourceLayout, parse_byte_lines, parse_lines,
};
