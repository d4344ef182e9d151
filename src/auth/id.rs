//! Validated identifiers for users and applications.
//!
//! Graph application ids are decimal strings. User ids are opaque: app-scoped ids are numeric
//! today, but nothing here depends on that, so they only have to be printable tokens.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

/// Longest application id accepted, in digits.
pub const APP_ID_MAX_DIGITS: usize = 32;
/// Longest user id accepted, in bytes.
pub const USER_ID_MAX_LEN: usize = 128;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (user, app).
		kind: &'static str,
	},
	/// A user identifier contained whitespace or control characters.
	#[error("User identifier contains whitespace or control characters.")]
	NotPrintable,
	/// An application identifier contained something other than ASCII digits.
	#[error("App identifier `{value}` is not a decimal number.")]
	NotNumeric {
		/// Rejected value.
		value: String,
	},
	/// The identifier exceeded its length limit.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (user, app).
		kind: &'static str,
		/// Maximum permitted length.
		max: usize,
	},
}

/// Identifier of the user a credential was issued to.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);
impl UserId {
	/// Validates `value` as a user id.
	pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
		let value = value.into();

		if value.is_empty() {
			return Err(IdentifierError::Empty { kind: "User" });
		}
		if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
			return Err(IdentifierError::NotPrintable);
		}
		if value.len() > USER_ID_MAX_LEN {
			return Err(IdentifierError::TooLong { kind: "User", max: USER_ID_MAX_LEN });
		}

		Ok(Self(value))
	}
}

/// Identifier of the application whose requests are batched.
///
/// Doubles as the Graph path of the configuration fetch, so it must be a bare decimal number.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppId(String);
impl AppId {
	/// Validates `value` as a Graph application id.
	pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
		let value = value.into();

		if value.is_empty() {
			return Err(IdentifierError::Empty { kind: "App" });
		}
		if !value.bytes().all(|b| b.is_ascii_digit()) {
			return Err(IdentifierError::NotNumeric { value });
		}
		if value.len() > APP_ID_MAX_DIGITS {
			return Err(IdentifierError::TooLong { kind: "App", max: APP_ID_MAX_DIGITS });
		}

		Ok(Self(value))
	}
}

macro_rules! string_newtype {
	($name:ident, $label:literal) => {
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &str {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				Self::new(value)
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($label, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
	};
}

string_newtype!(UserId, "User");
string_newtype!(AppId, "App");
