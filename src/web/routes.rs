//! HTTP API routes.

use super::error::ApiError;
use super::{AppState, SharedContext};
use crate::commands::special_commands::split_leading_token;
use crate::config::Config;
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Component, Path as FsPath, PathBuf};

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Conversations
        .route("/conversations", get(list_conversations))
        .route("/new_chat", post(new_chat))
        .route("/chat", post(chat))
        .route("/conversation/:id", get(conversation_history))
        .route("/delete_conversation/:id", delete(delete_conversation))
        .route("/rename_conversation/:id", patch(rename_conversation))
        // Knowledge
        .route("/search", post(search))
        .route("/ingest", post(ingest))
        // Backups
        .route("/zip_backup/:id", get(zip_backup))
        .route("/load_backup", post(load_backup))
        // Session configuration
        .route("/api/config/:id", get(read_config).post(write_config))
        .route("/plugins", get(list_plugins))
        .route("/serve_from_memory/:folder/*file", get(serve_from_memory))
        .with_state(state)
}

// ============ Health Check ============

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "aeon",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ============ Conversations ============

#[derive(Debug, Serialize)]
struct ConversationEntry {
    id: String,
    name: String,
}

async fn list_conversations(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConversationEntry>>, ApiError> {
    let mut sessions = state.manager.lock().await.list()?;
    sessions.reverse();
    Ok(Json(
        sessions
            .into_iter()
            .map(|summary| ConversationEntry {
                name: summary.id.clone(),
                id: summary.id,
            })
            .collect(),
    ))
}

async fn create_context(state: &AppState) -> Result<SharedContext, ApiError> {
    let mut binder = state.binder().await;
    let context = binder.new_session().await?;
    tracing::info!(session = %context.id(), "Created conversation over HTTP");
    Ok(state.insert(context).await)
}

async fn new_chat(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let context = create_context(&state).await?;
    let id = context.lock().await.id().to_string();
    Ok(Json(json!({ "conversation_id": id })))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    conversation_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    response: String,
    conversation_id: String,
    source: String,
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = request.message.as_deref().map(str::trim).unwrap_or_default();
    if message.is_empty() {
        return Err(ApiError::bad_request("No message provided."));
    }

    let context = match request.conversation_id.filter(|id| state.store.exists(id)) {
        Some(id) => state.context(&id).await?,
        None => create_context(&state).await?,
    };
    let mut context = context.lock().await;

    let (token, rest) = split_leading_token(message);
    let (response, source) = match state.registry.get(token) {
        Some(descriptor) => {
            let result = context
                .run_plugin(&state.store, &state.invoker, &descriptor, message, rest)
                .await?;
            (result.message, result.source)
        }
        None => {
            let reply = context.chat(&state.store, message).await?;
            (reply.answer, reply.sources.join(", "))
        }
    };

    Ok(Json(ChatResponse {
        response,
        conversation_id: context.id().to_string(),
        source,
    }))
}

async fn conversation_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = state.store.session(&id)?;
    let loaded = state.store.load_history(&session)?;
    Ok(Json(json!({
        "conversation_id": id,
        "history": loaded.turns,
        "warning": loaded.warning,
    })))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let in_flight = state.detach(&id).await;
    state.manager.lock().await.store_mut().delete_by_id(&id)?;
    state.forget(&id).await;
    drop(in_flight);
    Ok(Json(json!({
        "message": format!("Conversation '{}' successfully deleted.", id)
    })))
}

#[derive(Debug, Deserialize)]
struct RenameRequest {
    name: String,
}

async fn rename_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RenameRequest>,
) -> Result<Json<Value>, ApiError> {
    let in_flight = state.detach(&id).await;
    let renamed = state
        .manager
        .lock()
        .await
        .store_mut()
        .rename_by_id(&id, request.name.trim())?;
    if in_flight.is_some() {
        state.forget(&id).await;
        drop(in_flight);
        state.context(&renamed.id).await?;
    }
    Ok(Json(json!({ "conversation_id": renamed.id })))
}

// ============ Knowledge ============

#[derive(Debug, Deserialize)]
struct SearchRequest {
    #[serde(default)]
    search_term: Option<String>,
    conversation_id: String,
}

async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let term = request
        .search_term
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();
    if term.is_empty() {
        return Err(ApiError::bad_request("No search term provided."));
    }

    let context = state.context(&request.conversation_id).await?;
    let mut context = context.lock().await;
    let reply = context
        .web_search(&state.store, &format!("/search {}", term), term)
        .await?;
    Ok(Json(ChatResponse {
        response: reply.answer,
        conversation_id: request.conversation_id,
        source: reply.sources.join(", "),
    }))
}

#[derive(Debug, Deserialize)]
struct IngestRequest {
    conversation_id: String,
    path: PathBuf,
}

async fn ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<Value>, ApiError> {
    let context = state.context(&request.conversation_id).await?;
    let report = context.lock().await.ingest(&request.path).await?;
    Ok(Json(json!({
        "message": report.summary(),
        "succeeded": report.succeeded,
        "failed": report.failed,
        "total": report.total,
        "errors": report.errors,
    })))
}

// ============ Backups ============

async fn zip_backup(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = state.store.session(&id)?;
    let archive = state.backups.zip(&session)?;
    Ok(Json(json!({ "zip_file": archive.display().to_string() })))
}

#[derive(Debug, Deserialize)]
struct LoadBackupRequest {
    path: PathBuf,
}

async fn load_backup(
    State(state): State<AppState>,
    Json(request): Json<LoadBackupRequest>,
) -> Result<Json<Value>, ApiError> {
    let restored = state.backups.restore(&request.path)?;
    // a replaced session must re-open over the restored index
    state.forget(&restored.id).await;
    Ok(Json(json!({
        "conversation_id": restored.id,
        "replaced": restored.replaced,
    })))
}

// ============ Session configuration ============

async fn read_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = state.store.session(&id)?;
    let content = tokio::fs::read_to_string(session.config_path())
        .await
        .map_err(|_| ApiError::not_found("Configuration file not found."))?;
    Ok(Json(json!({ "config_content": content })))
}

#[derive(Debug, Deserialize)]
struct ConfigRequest {
    #[serde(default)]
    config_content: Option<String>,
}

async fn write_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ConfigRequest>,
) -> Result<Json<Value>, ApiError> {
    let content = request
        .config_content
        .ok_or_else(|| ApiError::bad_request("No configuration content provided."))?;
    let config: Config = serde_yaml::from_str(&content)
        .map_err(|e| ApiError::bad_request(format!("Invalid configuration YAML: {}", e)))?;
    config.validate()?;

    let session = state.store.session(&id)?;
    tokio::fs::write(session.config_path(), content).await?;
    state.forget(&id).await;
    tracing::info!(session = %id, "Configuration snapshot updated");
    Ok(Json(json!({ "message": "Configuration updated successfully." })))
}

#[derive(Debug, Serialize)]
struct PluginEntry {
    name: String,
    parameters: String,
    description: String,
}

async fn list_plugins(State(state): State<AppState>) -> Json<Vec<PluginEntry>> {
    Json(
        state
            .registry
            .list()
            .iter()
            .map(|plugin| PluginEntry {
                name: plugin.command.clone(),
                parameters: plugin.parameter_string(),
                description: plugin.description.clone(),
            })
            .collect(),
    )
}

// ============ Files ============

#[derive(Debug, Deserialize)]
struct ServeQuery {
    conv_id: String,
}

async fn serve_from_memory(
    State(state): State<AppState>,
    Path((folder, file)): Path<(String, String)>,
    Query(query): Query<ServeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.store.session(&query.conv_id)?;
    let relative = FsPath::new(&folder).join(&file);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(ApiError::not_found("File not found."));
    }

    let root = tokio::fs::canonicalize(&session.memory_path).await?;
    let path = tokio::fs::canonicalize(session.memory_path.join(&relative))
        .await
        .map_err(|_| ApiError::not_found("File not found."))?;
    if !path.starts_with(&root) || !path.is_file() {
        return Err(ApiError::not_found("File not found."));
    }

    let bytes = tokio::fs::read(&path).await?;
    Ok(([(header::CONTENT_TYPE, content_type(&path))], bytes))
}

fn content_type(path: &FsPath) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "html" => "text/html; charset=utf-8",
        "md" | "txt" | "yml" | "yaml" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_by_extension() {
        assert_eq!(content_type(FsPath::new("a/b.PNG")), "image/png");
        assert_eq!(content_type(FsPath::new("speech.wav")), "audio/wav");
        assert_eq!(
            content_type(FsPath::new("blob")),
            "application/octet-stream"
        );
    }
}
