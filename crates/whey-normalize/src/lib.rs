use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

pub use extra_name::ExtraName;
pub use identifier::Identifier;
pub use package_name::PackageName;

mod extra_name;
mod identifier;
mod package_name;

/// Validate and normalize an owned package or extra name.
fn validate_and_normalize(name: &str) -> Result<String, InvalidNameError> {
    if is_normalized(name)? {
        return Ok(name.to_string());
    }

    let mut normalized = String::with_capacity(name.len());
    let mut last = None;
    for char in name.bytes() {
        match char {
            b'A'..=b'Z' => {
                normalized.push(char.to_ascii_lowercase() as char);
            }
            b'a'..=b'z' | b'0'..=b'9' => {
                normalized.push(char as char);
            }
            b'-' | b'_' | b'.' => {
                match last {
                    // Names can't start with punctuation.
                    None => return Err(InvalidNameError(name.to_string())),
                    Some(b'-' | b'_' | b'.') => {}
                    Some(_) => normalized.push('-'),
                }
            }
            _ => return Err(InvalidNameError(name.to_string())),
        }
        last = Some(char);
    }

    // Names can't end with punctuation.
    if matches!(last, None | Some(b'-' | b'_' | b'.')) {
        return Err(InvalidNameError(name.to_string()));
    }

    Ok(normalized)
}

/// Returns `true` if the name is already lowercase and free of punctuation runs.
fn is_normalized(name: &str) -> Result<bool, InvalidNameError> {
    let mut last = None;
    for char in name.bytes() {
        match char {
            b'A'..=b'Z' | b'_' | b'.' => {
                return Ok(false);
            }
            b'a'..=b'z' | b'0'..=b'9' => {}
            b'-' => {
                if matches!(last, None | Some(b'-')) {
                    // Names can't start with punctuation, and `--` is normalized to `-`.
                    return if last.is_none() {
                        Err(InvalidNameError(name.to_string()))
                    } else {
                        Ok(false)
                    };
                }
            }
            _ => return Err(InvalidNameError(name.to_string())),
        }
        last = Some(char);
    }

    if matches!(last, None | Some(b'-')) {
        return Err(InvalidNameError(name.to_string()));
    }

    Ok(true)
}

/// Invalid [`PackageName`] or [`ExtraName`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidNameError(String);

impl InvalidNameError {
    /// Returns the invalid name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InvalidNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Not a valid package or extra name: `{}`. Names must start and end with a letter or \
            digit and may only contain -, _, ., and alphanumeric characters.",
            self.0
        )
    }
}

impl Error for InvalidNameError {}
