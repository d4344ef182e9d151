//! In-process [`Connection`] that queues sub-requests and routes sub-responses by name.

// self
use crate::{
	_prelude::*,
	connection::{Completion, Connection, SubRequest, SubRequestResult},
};

/// Append-only batch of sub-requests.
///
/// A transport drains it with [`dispatch`](Self::dispatch) or resolves entries one at a time
/// with [`resolve`](Self::resolve). Any completion still pending when the batch is cancelled or
/// dropped receives [`Error::Cancelled`].
pub struct RequestBatch {
	id: String,
	requests: Vec<SubRequest>,
	completions: Vec<Option<Completion>>,
}
impl RequestBatch {
	/// Creates an empty batch.
	pub fn new(id: impl Into<String>) -> Self {
		Self { id: id.into(), requests: Vec::new(), completions: Vec::new() }
	}

	/// Number of sub-requests whose completion has not fired yet.
	pub fn pending(&self) -> usize {
		self.completions.iter().filter(|completion| completion.is_some()).count()
	}

	/// Resolves the first pending sub-request named `name`.
	///
	/// Returns `false` when no pending sub-request carries that name.
	pub fn resolve(&mut self, name: &str, result: SubRequestResult) -> bool {
		let slot = self
			.requests
			.iter()
			.zip(self.completions.iter_mut())
			.find(|(request, completion)| request.name == name && completion.is_some())
			.and_then(|(_, completion)| completion.take());

		match slot {
			Some(completion) => {
				completion(result);

				true
			},
			None => false,
		}
	}

	/// Resolves every pending sub-request in queue order with the responder's answer.
	pub fn dispatch<F>(mut self, mut responder: F)
	where
		F: FnMut(&SubRequest) -> SubRequestResult,
	{
		for (request, completion) in self.requests.iter().zip(self.completions.iter_mut()) {
			if let Some(completion) = completion.take() {
				completion(responder(request));
			}
		}
	}

	/// Aborts the batch, failing every pending completion with [`Error::Cancelled`].
	pub fn cancel(mut self) {
		self.cancel_pending();
	}

	fn cancel_pending(&mut self) {
		for completion in self.completions.iter_mut().filter_map(Option::take) {
			completion(Err(Error::Cancelled));
		}
	}
}
impl Connection for RequestBatch {
	fn id(&self) -> &str {
		&self.id
	}

	fn sub_requests(&self) -> &[SubRequest] {
		&self.requests
	}

	fn add_sub_request(&mut self, request: SubRequest, completion: Completion) {
		self.requests.push(request);
		self.completions.push(Some(completion));
	}
}
impl Drop for RequestBatch {
	fn drop(&mut self) {
		self.cancel_pending();
	}
}
impl Debug for RequestBatch {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestBatch")
			.field("id", &self.id)
			.field("requests", &self.requests)
			.field("pending", &self.pending())
			.finish()
	}
}
