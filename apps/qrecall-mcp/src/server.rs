use std::{borrow::Cow, net::SocketAddr, sync::Arc};

use axum::Router;
use color_eyre::Result;
use rmcp::{
	ErrorData, ServerHandler, ServiceExt,
	handler::server::router::tool::ToolRouter,
	model::{CallToolResult, Content, JsonObject, ServerCapabilities, ServerInfo},
	transport::{
		stdio,
		streamable_http_server::{
			StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
		},
	},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::net::TcpListener;

use qrecall_config::{Config, FieldType, FilterCondition, FilterableField};
use qrecall_service::{
	DeleteRequest, DeleteResponse, Error, FindRequest, FindResponse, RecallService,
	RetrieveRequest, StoreRequest, format,
};

pub const TOOL_FIND: &str = "qdrant-find";
pub const TOOL_STORE: &str = "qdrant-store";
pub const TOOL_RETRIEVE: &str = "qdrant-retrieve";
pub const TOOL_DELETE: &str = "qdrant-delete";

#[derive(Clone)]
pub struct RecallMcp {
	service: Arc<RecallService>,
	tool_router: ToolRouter<Self>,
}
impl RecallMcp {
	pub fn new(service: Arc<RecallService>) -> Self {
		let tool_router = configure_tools(Self::tool_router(), &service.cfg);

		Self { service, tool_router }
	}
}

#[rmcp::tool_router]
impl RecallMcp {
	#[rmcp::tool(
		name = "qdrant-find",
		description = "Look up memories in Qdrant. Use this tool when you need to find memories by their content, across one collection, several collections, or all of them with [\"*\"].",
		input_schema = find_schema()
	)]
	async fn qdrant_find(&self, params: JsonObject) -> Result<CallToolResult, ErrorData> {
		let req: FindRequest = parse_params(params)?;
		let response = self.service.find(req).await.map_err(into_error_data)?;

		Ok(text_result(render_find(&response)))
	}

	#[rmcp::tool(
		name = "qdrant-store",
		description = "Keep the memory for later use, when you are asked to remember something.",
		input_schema = store_schema()
	)]
	async fn qdrant_store(&self, params: JsonObject) -> Result<CallToolResult, ErrorData> {
		let req: StoreRequest = parse_params(params)?;
		let information = req.information.clone();
		let response = self.service.store(req).await.map_err(into_error_data)?;

		Ok(text_result(vec![format!(
			"Remembered: {information} in collection {} (point_id: {})",
			response.collection, response.point_id
		)]))
	}

	#[rmcp::tool(
		name = "qdrant-retrieve",
		description = "Retrieve a point by exact ID from Qdrant. Faster than semantic search for known point IDs because nothing is embedded.",
		input_schema = retrieve_schema()
	)]
	async fn qdrant_retrieve(&self, params: JsonObject) -> Result<CallToolResult, ErrorData> {
		let req: RetrieveRequest = parse_params(params)?;
		let point_id = req.point_id.clone();
		let response = self.service.retrieve(req).await.map_err(into_error_data)?;
		let text = match response.entry {
			Some(entry) => format::format_retrieved(&entry),
			None => format!("Point {point_id} not found in collection {}", response.collection),
		};

		Ok(text_result(vec![text]))
	}

	#[rmcp::tool(
		name = "qdrant-delete",
		description = "Delete points from Qdrant by point IDs or metadata filters. ID-based deletion via point_ids is preferred. Provide either point_ids or query_filter, not both.",
		input_schema = delete_schema()
	)]
	async fn qdrant_delete(&self, params: JsonObject) -> Result<CallToolResult, ErrorData> {
		let req: DeleteRequest = parse_params(params)?;
		let response = self.service.delete(req).await.map_err(into_error_data)?;

		Ok(text_result(vec![render_delete(&response)]))
	}
}

#[rmcp::tool_handler]
impl ServerHandler for RecallMcp {
	fn get_info(&self) -> ServerInfo {
		ServerInfo {
			instructions: Some(
				"Semantic memory over Qdrant. Search several collections at once with qdrant-find."
					.to_string(),
			),
			capabilities: ServerCapabilities::builder().enable_tools().build(),
			..Default::default()
		}
	}
}

pub async fn serve_http(service: Arc<RecallService>) -> Result<()> {
	let bind_addr: SocketAddr = service.cfg.service.mcp_bind.parse()?;
	let session_manager: Arc<LocalSessionManager> = Default::default();
	let mcp = StreamableHttpService::new(
		move || Ok(RecallMcp::new(service.clone())),
		session_manager,
		StreamableHttpServerConfig::default(),
	);
	let router = Router::new().fallback_service(mcp);
	let listener = TcpListener::bind(bind_addr).await?;

	tracing::info!(%bind_addr, "MCP server listening.");

	axum::serve(listener, router).await?;

	Ok(())
}

pub async fn serve_stdio(service: Arc<RecallService>) -> Result<()> {
	tracing::info!("MCP server listening on stdio.");

	let running = RecallMcp::new(service).serve(stdio()).await?;

	running.waiting().await?;

	Ok(())
}

/// Applies `service.read_only`, description overrides, and filter exposure to the tool set.
fn configure_tools(mut router: ToolRouter<RecallMcp>, cfg: &Config) -> ToolRouter<RecallMcp> {
	if cfg.service.read_only {
		router.map.remove(TOOL_STORE);
		router.map.remove(TOOL_DELETE);
	}

	let overrides = [
		(TOOL_FIND, &cfg.tools.find_description),
		(TOOL_STORE, &cfg.tools.store_description),
		(TOOL_RETRIEVE, &cfg.tools.retrieve_description),
		(TOOL_DELETE, &cfg.tools.delete_description),
	];

	for (name, description) in overrides {
		if let (Some(route), Some(description)) = (router.map.get_mut(name), description) {
			route.attr.description = Some(Cow::Owned(description.clone()));
		}
	}

	let typed: Vec<(&FilterableField, FilterCondition)> =
		cfg.storage.qdrant.filter_arguments().collect();

	if typed.is_empty() && cfg.search.allow_arbitrary_filter {
		return router;
	}

	for name in [TOOL_FIND, TOOL_DELETE] {
		let Some(route) = router.map.get_mut(name) else { continue };
		let mut schema = (*route.attr.input_schema).clone();

		if let Some(Value::Object(properties)) = schema.get_mut("properties") {
			properties.remove("query_filter");

			for (field, condition) in &typed {
				properties.insert(field.name.clone(), filter_argument_schema(field, *condition));
			}
		}

		let required: Vec<Value> = typed
			.iter()
			.filter(|(field, _)| field.required)
			.map(|(field, _)| Value::from(field.name.clone()))
			.collect();

		if !required.is_empty() {
			if let Value::Array(list) =
				schema.entry("required").or_insert_with(|| Value::Array(Vec::new()))
			{
				list.extend(required);
			}
		}

		route.attr.input_schema = Arc::new(schema);
	}

	router
}

/// Schema of one typed filter argument. List conditions take an array of the field type.
fn filter_argument_schema(field: &FilterableField, condition: FilterCondition) -> Value {
	let scalar = match field.field_type {
		FieldType::Keyword => "string",
		FieldType::Integer => "integer",
		FieldType::Float => "number",
		FieldType::Boolean => "boolean",
	};
	let outer = if condition.takes_list() { "array" } else { scalar };
	let kind =
		if field.required { Value::from(outer) } else { serde_json::json!([outer, "null"]) };
	let description = format!(
		"{} Matches points where {} {} this value.",
		field.description,
		field.payload_path(),
		condition.as_str()
	);

	if condition.takes_list() {
		serde_json::json!({
			"type": kind,
			"items": { "type": scalar },
			"description": description
		})
	} else {
		serde_json::json!({ "type": kind, "description": description })
	}
}

fn parse_params<T>(params: JsonObject) -> Result<T, ErrorData>
where
	T: DeserializeOwned,
{
	serde_json::from_value(Value::Object(params))
		.map_err(|err| ErrorData::invalid_params(format!("Invalid arguments: {err}."), None))
}

fn into_error_data(err: Error) -> ErrorData {
	match err {
		Error::InvalidRequest { message } => ErrorData::invalid_params(message, None),
		other => {
			tracing::error!(error = %other, "Tool call failed.");

			ErrorData::internal_error(other.to_string(), None)
		},
	}
}

fn text_result(lines: Vec<String>) -> CallToolResult {
	CallToolResult::success(lines.into_iter().map(Content::text).collect())
}

fn render_find(response: &FindResponse) -> Vec<String> {
	let mut lines = Vec::with_capacity(response.lines.len() + 1);

	if response.lines.is_empty() {
		lines.push(format!("No results found for the query '{}'", response.query));
	} else {
		lines.push(format!("Results for the query '{}'", response.query));
		lines.extend(response.lines.iter().cloned());
	}

	for failure in &response.failures {
		lines.push(format!(
			"Search failed for collection {}: {}",
			failure.collection, failure.message
		));
	}
	for warning in &response.warnings {
		lines.push(format!("Warning: {warning}"));
	}

	lines
}

fn render_delete(response: &DeleteResponse) -> String {
	if response.status == "deleted_nothing" {
		return format!("Collection {} does not exist. Deleted nothing.", response.collection);
	}

	let operation_id =
		response.operation_id.map(|id| id.to_string()).unwrap_or_else(|| "N/A".to_string());

	format!(
		"Delete operation completed for {}: status={}, operation_id={operation_id}",
		response.collection, response.status
	)
}

fn find_schema() -> Arc<JsonObject> {
	Arc::new(rmcp::object!({
		"type": "object",
		"additionalProperties": false,
		"required": ["query"],
		"properties": {
			"query": { "type": "string", "description": "What to search for." },
			"collection_name": {
				"type": ["string", "null"],
				"description": "Deprecated single collection selector. Prefer collections."
			},
			"collections": {
				"type": ["array", "null"],
				"items": { "type": "string" },
				"description": "Collections to search. Use [\"*\"] to search every collection."
			},
			"mode": {
				"type": ["string", "null"],
				"enum": ["minimal", "full", null],
				"description": "minimal returns ids, scores, and selected metadata. full returns complete chunks."
			},
			"limit": {
				"type": ["integer", "null"],
				"description": "Results per collection. Defaults to search.default_limit."
			},
			"query_filter": {
				"type": ["object", "null"],
				"additionalProperties": true,
				"description": "Qdrant filter with must, should, and must_not clauses."
			},
			"rerank": {
				"type": "boolean",
				"description": "Rerank the merged results with the configured reranker."
			}
		}
	}))
}

fn store_schema() -> Arc<JsonObject> {
	Arc::new(rmcp::object!({
		"type": "object",
		"additionalProperties": false,
		"required": ["information"],
		"properties": {
			"information": { "type": "string", "description": "Text to store." },
			"collection_name": { "type": ["string", "null"] },
			"metadata": {
				"type": ["object", "null"],
				"additionalProperties": true,
				"description": "Extra metadata stored with the text."
			}
		}
	}))
}

fn retrieve_schema() -> Arc<JsonObject> {
	Arc::new(rmcp::object!({
		"type": "object",
		"additionalProperties": false,
		"required": ["point_id"],
		"properties": {
			"point_id": { "type": "string", "description": "Exact point id (UUID or integer)." },
			"collection_name": { "type": ["string", "null"] }
		}
	}))
}

fn delete_schema() -> Arc<JsonObject> {
	Arc::new(rmcp::object!({
		"type": "object",
		"additionalProperties": false,
		"properties": {
			"collection_name": { "type": ["string", "null"] },
			"point_ids": {
				"type": ["array", "null"],
				"items": { "type": "string" },
				"description": "Point ids to delete. Preferred over query_filter."
			},
			"query_filter": {
				"type": ["object", "null"],
				"additionalProperties": true
			}
		}
	}))
}
