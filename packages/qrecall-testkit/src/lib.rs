//! Live Qdrant harness for tests that need a real server.
//!
//! Collections handed out by [`TestQdrant::collection_name`] are deleted on cleanup or drop.

mod error;

pub use error::{Error, Result};

use std::{collections::HashSet, env, sync::Mutex, thread, time::Duration};

use qdrant_client::Qdrant;
use tokio::{runtime::Builder, time};
use uuid::Uuid;

pub const QDRANT_URL_ENV: &str = "QRECALL_QDRANT_URL";

pub struct TestQdrant {
	url: String,
	run_id: String,
	cleaned: bool,
	collections: Mutex<HashSet<String>>,
}
impl TestQdrant {
	pub fn new(url: &str) -> Self {
		Self {
			url: url.to_string(),
			run_id: Uuid::new_v4().simple().to_string(),
			cleaned: false,
			collections: Mutex::new(HashSet::new()),
		}
	}

	pub fn url(&self) -> &str {
		&self.url
	}

	pub fn collection_name(&self, prefix: &str) -> String {
		let collection = format!("qrecall_test_{prefix}_{}", self.run_id);
		let mut tracked = self.collections.lock().unwrap_or_else(|err| err.into_inner());

		tracked.insert(collection.clone());

		collection
	}

	pub async fn cleanup(mut self) -> Result<()> {
		self.cleanup_inner().await
	}

	async fn cleanup_inner(&mut self) -> Result<()> {
		if self.cleaned {
			return Ok(());
		}

		let collections = self.tracked();

		cleanup_qdrant_collections(&self.url, &collections).await?;

		self.cleaned = true;

		Ok(())
	}

	fn tracked(&self) -> Vec<String> {
		self.collections.lock().unwrap_or_else(|err| err.into_inner()).iter().cloned().collect()
	}
}
impl Drop for TestQdrant {
	fn drop(&mut self) {
		if self.cleaned {
			return;
		}

		let url = self.url.clone();
		let collections = self.tracked();
		let cleanup_thread = thread::spawn(move || {
			let runtime = match Builder::new_current_thread().enable_all().build() {
				Ok(runtime) => runtime,
				Err(err) => {
					eprintln!("Test Qdrant cleanup failed: {err}.");

					return;
				},
			};

			if let Err(err) = runtime.block_on(cleanup_qdrant_collections(&url, &collections)) {
				eprintln!("Test Qdrant cleanup failed: {err}.");
			}
		});
		let _ = cleanup_thread.join();
	}
}

pub fn env_qdrant_url() -> Option<String> {
	env::var(QDRANT_URL_ENV).ok().filter(|url| !url.trim().is_empty())
}

async fn cleanup_qdrant_collections(url: &str, collections: &[String]) -> Result<()> {
	if collections.is_empty() {
		return Ok(());
	}

	let client = Qdrant::from_url(url)
		.build()
		.map_err(|err| Error::Message(format!("Failed to build Qdrant client: {err}.")))?;
	let max_attempts = 6;
	let mut remaining = collections.iter().cloned().collect::<HashSet<_>>();
	let mut backoff = Duration::from_millis(100);

	for attempt in 1..=max_attempts {
		let existing = time::timeout(Duration::from_secs(10), client.list_collections())
			.await
			.map_err(|_| Error::Message("Qdrant list_collections timed out.".to_string()))?
			.map_err(|err| Error::Message(format!("Failed to list Qdrant collections: {err}.")))?;
		let existing = existing.collections.into_iter().map(|c| c.name).collect::<HashSet<_>>();

		remaining.retain(|collection| existing.contains(collection));

		if remaining.is_empty() {
			return Ok(());
		}

		for collection in remaining.iter().cloned().collect::<Vec<_>>() {
			let result = time::timeout(
				Duration::from_secs(10),
				client.delete_collection(collection.clone()),
			)
			.await;

			match result {
				Ok(Ok(_)) => {},
				Ok(Err(err)) =>
					if attempt == max_attempts {
						return Err(Error::Message(format!(
							"Failed to delete Qdrant collection {collection:?} after {attempt} attempts: {err}."
						)));
					},
				Err(_) =>
					if attempt == max_attempts {
						return Err(Error::Message(format!(
							"Timed out deleting Qdrant collection {collection:?} after {attempt} attempts."
						)));
					},
			}
		}

		time::sleep(backoff).await;

		backoff = backoff.saturating_mul(2).min(Duration::from_secs(2));
	}

	Ok(())
}
