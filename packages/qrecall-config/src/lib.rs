mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, FieldType, FilterCondition, FilterableField,
	PAYLOAD_INDEX_SCHEMAS, PayloadIndex, PriorityStrategy, Providers, Qdrant,
	RerankProviderConfig, Search, Service, Storage, Tools, Transport,
};

/// Argument names the find and delete tools already use.
pub const RESERVED_TOOL_ARGUMENTS: [&str; 8] = [
	"query",
	"collection_name",
	"collections",
	"mode",
	"limit",
	"query_filter",
	"rerank",
	"point_ids",
];

use std::{collections::HashSet, fs, net::SocketAddr, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.transport == Transport::StreamableHttp {
		if cfg.service.mcp_bind.trim().is_empty() {
			return Err(Error::Validation {
				message: "service.mcp_bind must be non-empty.".to_string(),
			});
		}
		if cfg.service.mcp_bind.parse::<SocketAddr>().is_err() {
			return Err(Error::Validation {
				message: "service.mcp_bind must be a valid socket address.".to_string(),
			});
		}
	}
	if cfg.storage.qdrant.url.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.url must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "storage.qdrant.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}

	for index in &cfg.storage.qdrant.payload_indexes {
		if index.field.trim().is_empty() {
			return Err(Error::Validation {
				message: "storage.qdrant.payload_indexes.field must be non-empty.".to_string(),
			});
		}
		if !PAYLOAD_INDEX_SCHEMAS.contains(&index.schema.as_str()) {
			return Err(Error::Validation {
				message: format!(
					"storage.qdrant.payload_indexes.schema must be one of {}.",
					PAYLOAD_INDEX_SCHEMAS.join(", ")
				),
			});
		}
	}

	validate_filterable_fields(&cfg.storage.qdrant.filterable_fields)?;

	if cfg.search.default_limit == 0 {
		return Err(Error::Validation {
			message: "search.default_limit must be greater than zero.".to_string(),
		});
	}
	if cfg.search.multi_collection_limit_multiplier == 0 {
		return Err(Error::Validation {
			message: "search.multi_collection_limit_multiplier must be greater than zero."
				.to_string(),
		});
	}

	let mut seen = HashSet::new();

	for name in &cfg.search.priority_order {
		if name.trim().is_empty() {
			return Err(Error::Validation {
				message: "search.priority_order entries must be non-empty.".to_string(),
			});
		}
		if !seen.insert(name.as_str()) {
			return Err(Error::Validation {
				message: format!("search.priority_order lists {name} more than once."),
			});
		}
	}

	if cfg.search.priority_strategy != PriorityStrategy::None
		&& cfg.search.priority_order.is_empty()
	{
		return Err(Error::Validation {
			message: "search.priority_order must be non-empty when search.priority_strategy is not none."
				.to_string(),
		});
	}
	if cfg.search.minimal_fields.iter().any(|field| field.trim().is_empty()) {
		return Err(Error::Validation {
			message: "search.minimal_fields entries must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "Provider embedding api_key must be non-empty.".to_string(),
		});
	}
	if cfg.providers.rerank.enabled {
		let rerank = &cfg.providers.rerank;

		if rerank.api_base.trim().is_empty() {
			return Err(Error::Validation {
				message: "providers.rerank.api_base must be non-empty when enabled.".to_string(),
			});
		}
		if rerank.api_key.trim().is_empty() {
			return Err(Error::Validation {
				message: "Provider rerank api_key must be non-empty.".to_string(),
			});
		}
		if rerank.top_k == 0 {
			return Err(Error::Validation {
				message: "providers.rerank.top_k must be greater than zero.".to_string(),
			});
		}
	}

	Ok(())
}

fn validate_filterable_fields(fields: &[FilterableField]) -> Result<()> {
	let mut seen = HashSet::new();

	for field in fields {
		let name = field.name.as_str();

		if name.trim().is_empty() {
			return Err(Error::Validation {
				message: "storage.qdrant.filterable_fields.name must be non-empty.".to_string(),
			});
		}
		if RESERVED_TOOL_ARGUMENTS.contains(&name) {
			return Err(Error::Validation {
				message: format!(
					"storage.qdrant.filterable_fields name {name} collides with a tool argument."
				),
			});
		}
		if !seen.insert(name) {
			return Err(Error::Validation {
				message: format!("storage.qdrant.filterable_fields lists {name} more than once."),
			});
		}

		match field.condition {
			Some(condition) if !field.field_type.supports(condition) => {
				return Err(Error::Validation {
					message: format!(
						"storage.qdrant.filterable_fields {name} does not support condition {} for type {}.",
						condition.as_str(),
						field.field_type.as_str()
					),
				});
			},
			None if field.required => {
				return Err(Error::Validation {
					message: format!(
						"storage.qdrant.filterable_fields {name} is required but has no condition."
					),
				});
			},
			_ => {},
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.storage.qdrant.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
		cfg.storage.qdrant.api_key = None;
	}
	if cfg
		.storage
		.qdrant
		.default_collection
		.as_deref()
		.map(|name| name.trim().is_empty())
		.unwrap_or(false)
	{
		cfg.storage.qdrant.default_collection = None;
	}

	for description in [
		&mut cfg.tools.find_description,
		&mut cfg.tools.store_description,
		&mut cfg.tools.retrieve_description,
		&mut cfg.tools.delete_description,
	] {
		if description.as_deref().map(|text| text.trim().is_empty()).unwrap_or(false) {
			*description = None;
		}
	}
}
