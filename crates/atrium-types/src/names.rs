//! Name and path grammar validation.
//!
//! The grammars here are a wire contract: persisted layouts and external
//! callers depend on exactly these shapes, so the validators accept and
//! reject precisely what the grammar says, nothing more.
//!
//! - Site name: `^[a-z][a-z0-9]*([_-][a-z0-9]+)*$`
//! - Realm name: `^[A-Z][A-Z0-9]*(_[A-Z0-9]+)*$`
//! - Account index name: `^[a-z]+$`
//! - Generic file path: `^[\w@-]+(/[\w@-]+)*(\.[\w]*)+$`
//! - Generic path (file or directory): `^[\w@-]+(/[\w@-]+)*(\.[\w]*)*$`
//!
//! Validation happens before any I/O; a bad name never reaches storage.

use serde::{Deserialize, Serialize};

use crate::error::{NameError, Result};

/// A word character in the path grammars: `[A-Za-z0-9_]`.
fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// A path component character: `[\w@-]`.
fn is_component_char(c: char) -> bool {
    is_word(c) || c == '@' || c == '-'
}

/// Validate a site name: lowercase alphanumeric words, starting with a
/// letter, joined by single `_` or `-` separators.
pub fn validate_site_name(name: &str) -> Result<()> {
    let err = |reason: &str| NameError::InvalidSiteName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let mut chars = name.chars();
    match chars.next() {
        Some('a'..='z') => {}
        Some(_) => return Err(err("must start with a lowercase letter")),
        None => return Err(err("must not be empty")),
    }

    let mut after_separator = false;
    for c in chars {
        match c {
            'a'..='z' | '0'..='9' => after_separator = false,
            '_' | '-' if !after_separator => after_separator = true,
            '_' | '-' => return Err(err("separators must not be consecutive")),
            _ => return Err(err("only lowercase letters, digits, '_' and '-' are allowed")),
        }
    }
    if after_separator {
        return Err(err("must not end with a separator"));
    }
    Ok(())
}

/// Validate a realm name: uppercase alphanumeric words, starting with a
/// letter, joined by single `_` separators.
pub fn validate_realm_name(name: &str) -> Result<()> {
    let err = |reason: &str| NameError::InvalidRealmName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let mut chars = name.chars();
    match chars.next() {
        Some('A'..='Z') => {}
        Some(_) => return Err(err("must start with an uppercase letter")),
        None => return Err(err("must not be empty")),
    }

    let mut after_separator = false;
    for c in chars {
        match c {
            'A'..='Z' | '0'..='9' => after_separator = false,
            '_' if !after_separator => after_separator = true,
            '_' => return Err(err("separators must not be consecutive")),
            _ => return Err(err("only uppercase letters, digits and '_' are allowed")),
        }
    }
    if after_separator {
        return Err(err("must not end with a separator"));
    }
    Ok(())
}

/// Validate an account index name: one or more lowercase letters.
pub fn validate_index_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(NameError::InvalidIndexName {
            name: name.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    if !name.chars().all(|c| c.is_ascii_lowercase()) {
        return Err(NameError::InvalidIndexName {
            name: name.to_string(),
            reason: "only lowercase letters are allowed".to_string(),
        });
    }
    Ok(())
}

/// Shared core of the two path grammars.
///
/// A path is one or more `/`-separated components of `[\w@-]+`, optionally
/// followed (after the last component only) by extension groups, each a `.`
/// and zero or more word characters. `require_extension` demands at least
/// one such group, which is what distinguishes a file path from a path that
/// may also name a directory.
fn validate_path_impl(path: &str, require_extension: bool) -> Result<()> {
    let err = |reason: &str| NameError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if path.is_empty() {
        return Err(err("must not be empty"));
    }

    // Split at the first '.': everything before is the component section,
    // everything from there on is the extension section.
    let (components, extensions) = match path.find('.') {
        Some(pos) => (&path[..pos], Some(&path[pos..])),
        None => (path, None),
    };

    if components.is_empty() {
        return Err(err("must not start with '.'"));
    }
    for component in components.split('/') {
        if component.is_empty() {
            return Err(err("path components must not be empty"));
        }
        if let Some(c) = component.chars().find(|c| !is_component_char(*c)) {
            return Err(err(&format!("invalid character {c:?} in path component")));
        }
    }

    match extensions {
        Some(ext) => {
            // The extension section decomposes into `\.[\w]*` groups exactly
            // when every character is a word character or '.'.
            if let Some(c) = ext.chars().find(|c| !is_word(*c) && *c != '.') {
                return Err(err(&format!("invalid character {c:?} after extension dot")));
            }
        }
        None if require_extension => {
            return Err(err("file paths must carry an extension"));
        }
        None => {}
    }

    Ok(())
}

/// Validate a generic path that may name a file or a directory.
pub fn validate_path(path: &str) -> Result<()> {
    validate_path_impl(path, false)
}

/// Validate a file path (an extension is required).
pub fn validate_file_path(path: &str) -> Result<()> {
    validate_path_impl(path, true)
}

/// Validate a directory path (same shape as the generic path grammar).
pub fn validate_dir_path(path: &str) -> Result<()> {
    validate_path_impl(path, false)
}

// ---------------------------------------------------------------------------
// Validated name newtypes
// ---------------------------------------------------------------------------

macro_rules! validated_name {
    ($(#[$doc:meta])* $name:ident, $validate:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Parse and validate.
            pub fn parse(s: impl Into<String>) -> Result<Self> {
                let s = s.into();
                $validate(&s)?;
                Ok(Self(s))
            }

            /// The validated name as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = NameError;

            fn from_str(s: &str) -> Result<Self> {
                Self::parse(s)
            }
        }
    };
}

validated_name!(
    /// A validated site name.
    SiteName,
    validate_site_name
);
validated_name!(
    /// A validated realm name.
    RealmName,
    validate_realm_name
);
validated_name!(
    /// A validated account index name.
    IndexName,
    validate_index_name
);
