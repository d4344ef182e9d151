//! Permission sets attached to credentials and the diffs produced by refreshes.

// std
use std::{cmp::Ordering, collections::BTreeSet, sync::OnceLock};
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use serde::{Deserializer, Serializer, de::Error as DeError, ser::SerializeSeq};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Errors emitted when validating permission names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum PermissionValidationError {
	/// Empty permission names are not allowed.
	#[error("Permission names cannot be empty.")]
	Empty,
	/// Permission names cannot contain whitespace.
	#[error("Permission contains whitespace: {permission}.")]
	ContainsWhitespace {
		/// The offending permission name.
		permission: String,
	},
}

/// Normalized set of permission names.
///
/// Names are deduplicated and sorted so equality and hashing do not depend on the order the
/// server listed them in. [`fingerprint`](Self::fingerprint) lazily caches a base64 (no
/// padding) SHA-256 digest of the normalized list, which lets callers compare permission
/// snapshots without holding onto both sets.
#[derive(Default)]
pub struct PermissionSet {
	names: Arc<[String]>,
	fingerprint_cache: OnceLock<String>,
}
impl PermissionSet {
	/// Creates a normalized permission set from any iterator.
	pub fn new<I, S>(names: I) -> Result<Self, PermissionValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Ok(Self { names: normalize(names)?, fingerprint_cache: OnceLock::new() })
	}

	/// Number of distinct permissions.
	pub fn len(&self) -> usize {
		self.names.len()
	}

	/// Returns true if the set holds no permissions.
	pub fn is_empty(&self) -> bool {
		self.names.is_empty()
	}

	/// Returns true if the set contains `permission`.
	pub fn contains(&self, permission: &str) -> bool {
		self.names.binary_search_by(|candidate| candidate.as_str().cmp(permission)).is_ok()
	}

	/// Iterator over the normalized names.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.names.iter().map(String::as_str)
	}

	/// Permissions present in `self` but not in `other`.
	pub fn difference(&self, other: &PermissionSet) -> PermissionSet {
		let names = self.iter().filter(|name| !other.contains(name)).map(str::to_owned);

		Self { names: names.collect::<Vec<_>>().into(), fingerprint_cache: OnceLock::new() }
	}

	/// Stable fingerprint derived from the normalized, comma-delimited name list.
	pub fn fingerprint(&self) -> String {
		self.fingerprint_cache.get_or_init(|| compute_fingerprint(&self.names)).clone()
	}
}
impl Clone for PermissionSet {
	fn clone(&self) -> Self {
		Self { names: self.names.clone(), fingerprint_cache: OnceLock::new() }
	}
}
impl PartialEq for PermissionSet {
	fn eq(&self, other: &Self) -> bool {
		self.names == other.names
	}
}
impl Eq for PermissionSet {}
impl PartialOrd for PermissionSet {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}
impl Ord for PermissionSet {
	fn cmp(&self, other: &Self) -> Ordering {
		self.names.cmp(&other.names)
	}
}
impl Hash for PermissionSet {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.names.hash(state);
	}
}
impl Debug for PermissionSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_set().entries(self.names.iter()).finish()
	}
}
impl Display for PermissionSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.names.join(","))
	}
}
impl FromStr for PermissionSet {
	type Err = PermissionValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.trim().is_empty() {
			return Ok(Self::default());
		}

		Self::new(s.split(',').map(str::trim))
	}
}
impl Serialize for PermissionSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let mut seq = serializer.serialize_seq(Some(self.names.len()))?;

		for name in self.names.iter() {
			seq.serialize_element(name)?;
		}

		seq.end()
	}
}
impl<'de> Deserialize<'de> for PermissionSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let values = <Vec<String>>::deserialize(deserializer)?;

		PermissionSet::new(values).map_err(DeError::custom)
	}
}

/// Granted/declined permissions before and after one refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionChange {
	/// Granted permissions carried by the credential the refresh started from.
	pub previous_granted: PermissionSet,
	/// Declined permissions carried by the credential the refresh started from.
	pub previous_declined: PermissionSet,
	/// Granted permissions after the refresh.
	pub granted: PermissionSet,
	/// Declined permissions after the refresh.
	pub declined: PermissionSet,
}
impl PermissionChange {
	/// Returns `true` when either set differs.
	pub fn is_changed(&self) -> bool {
		self.previous_granted != self.granted || self.previous_declined != self.declined
	}

	/// Permissions granted by the refresh that were not granted before.
	pub fn newly_granted(&self) -> PermissionSet {
		self.granted.difference(&self.previous_granted)
	}

	/// Permissions declined by the refresh that were not declined before.
	pub fn newly_declined(&self) -> PermissionSet {
		self.declined.difference(&self.previous_declined)
	}
}

fn normalize<I, S>(names: I) -> Result<Arc<[String]>, PermissionValidationError>
where
	I: IntoIterator<Item = S>,
	S: Into<String>,
{
	let mut set = BTreeSet::new();

	for name in names {
		let owned: String = name.into();

		if owned.is_empty() {
			return Err(PermissionValidationError::Empty);
		}
		if owned.chars().any(char::is_whitespace) {
			return Err(PermissionValidationError::ContainsWhitespace { permission: owned });
		}

		set.insert(owned);
	}

	Ok(Arc::from(set.into_iter().collect::<Vec<_>>()))
}

fn compute_fingerprint(names: &[String]) -> String {
	let mut hasher = Sha256::new();

	hasher.update(names.join(",").as_bytes());

	STANDARD_NO_PAD.encode(hasher.finalize())
}
