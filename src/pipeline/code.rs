//! Document code generation and parsing.
//!
//! A code is `{institution_id}.{suffix}` where the suffix is 6 random bytes
//! from the thread-local CSPRNG, hex-encoded to 12 lowercase characters.

use once_cell::sync::Lazy;
use regex::Regex;

/// Number of random bytes behind each code suffix.
pub const CODE_ENTROPY_BYTES: usize = 6;

/// `{institution}.{12 lowercase hex}`; the institution part may itself contain dots.
static CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<institution>.+)\.(?P<suffix>[0-9a-f]{12})$").unwrap());

/// Generate a fresh code for `institution_id`.
///
/// The institution id is used verbatim; it is not checked against any registry.
pub fn generate_code(institution_id: &str) -> String {
    let bytes: [u8; CODE_ENTROPY_BYTES] = rand::random();
    format!("{}.{}", institution_id, hex::encode(bytes))
}

/// The two halves of a well-formed code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeParts<'a> {
    pub institution_id: &'a str,
    pub suffix: &'a str,
}

/// Split a code into institution id and random suffix.
///
/// Returns `None` for strings that could not have come from [`generate_code`].
pub fn parse_code(code: &str) -> Option<CodeParts<'_>> {
    let caps = CODE_PATTERN.captures(code)?;
    Some(CodeParts {
        institution_id: caps.name("institution")?.as_str(),
        suffix: caps.name("suffix")?.as_str(),
    })
}

/// Source of codes for the registration pipeline.
pub trait CodeGenerator: Send + Sync {
    fn next_code(&self, institution_id: &str) -> String;
}

/// The production generator: [`generate_code`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodes;

impl CodeGenerator for RandomCodes {
    fn next_code(&self, institution_id: &str) -> String {
        generate_code(institution_id)
    }
}
