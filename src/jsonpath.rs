//! Validation of field-projection paths.
//!
//! A projection path names a field of an indexed resource using a restricted
//! dot/bracket grammar:
//!
//! - `.spec.name`
//! - `.metadata.labels["app"]`
//! - `.spec.containers[0].name`
//! - `.metadata.annotations["kubernetes.io/name"]`
//!
//! Validation is purely syntactic; whether the path exists on the target
//! resource is not checked here.

use std::fmt;

/// Why a projection path failed to validate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PathError {
    /// The path was the empty string.
    Empty,
    /// The path did not start with `.`.
    MissingLeadingDot,
    /// Parsing stopped at `remaining`, which matches no segment form.
    InvalidSyntax {
        /// The unconsumed suffix of the path.
        remaining: String,
    },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::Empty => write!(f, "path cannot be empty"),
            PathError::MissingLeadingDot => write!(f, "path must start with '.'"),
            PathError::InvalidSyntax { remaining } => {
                write!(f, "invalid path syntax at: {remaining}")
            }
        }
    }
}

impl std::error::Error for PathError {}

/// Validate a field-projection path.
///
/// The path must consist entirely of segments, each either `.identifier`,
/// a quoted bracket key (`["key"]` or `['key']`), or a numeric bracket
/// index (`[0]`), with no separators between segments.
///
/// # Example
///
/// ```
/// use indexpolicy::{validate_path, PathError};
///
/// assert!(validate_path(".spec.name").is_ok());
/// assert_eq!(validate_path(""), Err(PathError::Empty));
/// ```
pub fn validate_path(path: &str) -> Result<(), PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    if !path.starts_with('.') {
        return Err(PathError::MissingLeadingDot);
    }

    let mut remaining = path;
    while !remaining.is_empty() {
        match consume_segment(remaining) {
            Some(len) => remaining = &remaining[len..],
            None => {
                return Err(PathError::InvalidSyntax {
                    remaining: remaining.to_string(),
                })
            }
        }
    }
    Ok(())
}

/// Match one segment at the front of `rest`, returning its length in bytes.
fn consume_segment(rest: &str) -> Option<usize> {
    let mut chars = rest.chars();
    match chars.next()? {
        '.' => {
            let ident = &rest[1..];
            let mut len = 0;
            for (i, c) in ident.char_indices() {
                let valid = if i == 0 {
                    c.is_ascii_alphabetic() || c == '_'
                } else {
                    c.is_ascii_alphanumeric() || c == '_'
                };
                if !valid {
                    break;
                }
                len = i + c.len_utf8();
            }
            if len == 0 {
                None
            } else {
                Some(1 + len)
            }
        }
        '[' => match chars.next()? {
            quote @ ('"' | '\'') => {
                let key = &rest[2..];
                let end = key.find(quote)?;
                if end == 0 {
                    return None;
                }
                let after = &key[end + 1..];
                if after.starts_with(']') {
                    // `[` + opening quote, the key, the closing quote + `]`.
                    Some(2 + end + 2)
                } else {
                    None
                }
            }
            c if c.is_ascii_digit() => {
                let digits = rest[1..]
                    .chars()
                    .take_while(|c| c.is_ascii_digit())
                    .count();
                let after = &rest[1 + digits..];
                if after.starts_with(']') {
                    Some(1 + digits + 1)
                } else {
                    None
                }
            }
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_paths() {
        let paths = [
            ".spec.name",
            ".spec.container.image",
            ".metadata.name",
            ".status.phase",
            r#".metadata.labels["app"]"#,
            ".metadata.labels['app']",
            r#".metadata.annotations["kubernetes.io/name"]"#,
            ".spec.containers[0].name",
            ".spec.containers[0].ports[1].containerPort",
            ".spec.my_field",
            r#".spec.template.metadata.labels["app.kubernetes.io/name"]"#,
        ];
        for path in paths {
            assert_eq!(validate_path(path), Ok(()), "path {path:?}");
        }
    }

    #[test]
    fn invalid_paths() {
        let paths = [
            ".spec..name",
            ".1spec.name",
            ".metadata.labels[app",
            ".metadata.labels[app]",
            ".spec.name.",
            ".spec. name",
            ".spec.my-field",
        ];
        for path in paths {
            assert!(validate_path(path).is_err(), "path {path:?}");
        }
    }

    #[test]
    fn empty_path() {
        assert_eq!(validate_path("").unwrap_err().to_string(), "path cannot be empty");
    }

    #[test]
    fn missing_leading_dot() {
        assert_eq!(
            validate_path("spec.name").unwrap_err().to_string(),
            "path must start with '.'"
        );
    }

    #[test]
    fn error_reports_the_unconsumed_suffix() {
        assert_eq!(
            validate_path(".metadata.labels[app]").unwrap_err().to_string(),
            "invalid path syntax at: [app]"
        );
        assert_eq!(
            validate_path(".spec.name.").unwrap_err().to_string(),
            "invalid path syntax at: ."
        );
    }

    #[test]
    fn quotes_must_match() {
        assert_eq!(validate_path(".labels['a\"b']"), Ok(()));
        assert!(validate_path(r#".labels["a']"#).is_err());
    }

    #[test]
    fn empty_bracket_key_is_rejected() {
        assert!(validate_path(r#".labels[""]"#).is_err());
        assert!(validate_path(".labels['']").is_err());
    }
}
