mod backend;

use backend::client::HttpInfluxClient;
use backend::error::WorkspaceError;
use backend::models::{
    ConnectionProfile, DatabaseInfo, DialectVersion, QueryHistoryEntry, QueryResult,
    SessionStatus, ValidationVerdict,
};
use backend::profiles::ProfileUpdate;
use backend::rewrite;
use backend::statement;
use backend::workspace::Workspace;
use serde::Serialize;
use std::sync::Arc;
use tauri::State;

#[derive(Serialize)]
struct ImportSummary {
    imported: usize,
    skipped: usize,
}

#[tauri::command]
fn profiles_list(workspace: State<'_, Workspace>) -> Vec<ConnectionProfile> {
    workspace.list_profiles()
}

#[tauri::command]
fn profiles_add_or_update(
    workspace: State<'_, Workspace>,
    profile: ConnectionProfile,
) -> Result<ConnectionProfile, WorkspaceError> {
    workspace.add_or_update_profile(profile)
}

#[tauri::command]
fn profiles_update(
    workspace: State<'_, Workspace>,
    id: String,
    patch: ProfileUpdate,
) -> Result<ConnectionProfile, WorkspaceError> {
    workspace.update_profile(&id, patch)
}

#[tauri::command]
fn profiles_remove(workspace: State<'_, Workspace>, id: String) -> Result<bool, WorkspaceError> {
    workspace.remove_profile(&id)
}

#[tauri::command]
fn profiles_unrecognized(workspace: State<'_, Workspace>) -> Vec<serde_json::Value> {
    workspace.unrecognized_profiles()
}

#[tauri::command]
fn profiles_import(
    workspace: State<'_, Workspace>,
    file_path: String,
) -> Result<ImportSummary, WorkspaceError> {
    let (imported, skipped) = workspace.import_profiles(std::path::Path::new(&file_path))?;
    Ok(ImportSummary { imported, skipped })
}

#[tauri::command]
fn profiles_export(
    workspace: State<'_, Workspace>,
    file_path: String,
) -> Result<(), WorkspaceError> {
    workspace.export_profiles(std::path::Path::new(&file_path))
}

#[tauri::command]
async fn session_connect(
    workspace: State<'_, Workspace>,
    id: String,
) -> Result<bool, WorkspaceError> {
    Ok(workspace.connect(&id).await)
}

#[tauri::command]
async fn session_test(
    workspace: State<'_, Workspace>,
    id: String,
) -> Result<bool, WorkspaceError> {
    Ok(workspace.test(&id).await)
}

#[tauri::command]
fn session_disconnect(workspace: State<'_, Workspace>, id: String) {
    workspace.disconnect(&id);
}

#[tauri::command]
fn session_status(workspace: State<'_, Workspace>, id: String) -> Option<SessionStatus> {
    workspace.session_status(&id)
}

#[tauri::command]
fn session_statuses(workspace: State<'_, Workspace>) -> Vec<SessionStatus> {
    workspace.session_statuses()
}

#[tauri::command]
fn session_active(workspace: State<'_, Workspace>) -> Option<String> {
    workspace.active_profile_id()
}

#[tauri::command]
fn query_validate(query: String, version: DialectVersion) -> ValidationVerdict {
    statement::validate(&query, version)
}

#[tauri::command]
fn query_examples(version: DialectVersion) -> Vec<String> {
    statement::query_examples(version)
}

#[tauri::command]
fn sql_replace_table_name(sql: String, new_name: String) -> String {
    rewrite::rewrite_table_name(&sql, &new_name)
}

#[tauri::command]
fn sql_has_any_table_name(sql: String) -> bool {
    rewrite::has_any_table_name(&sql)
}

#[tauri::command]
fn sql_contains_identifier(sql: String, name: String) -> bool {
    rewrite::contains_identifier(&sql, &name)
}

#[tauri::command]
fn sql_first_identifier(sql: String) -> Option<String> {
    rewrite::first_identifier(&sql)
}

#[tauri::command]
async fn query_execute(
    workspace: State<'_, Workspace>,
    query: String,
    database: String,
    profile_id: String,
) -> Result<QueryResult, WorkspaceError> {
    workspace.execute_query(&query, &database, &profile_id).await
}

#[tauri::command]
fn history_list(workspace: State<'_, Workspace>) -> Vec<QueryHistoryEntry> {
    workspace.history()
}

#[tauri::command]
fn history_recent(workspace: State<'_, Workspace>, count: usize) -> Vec<QueryHistoryEntry> {
    workspace.recent_history(count)
}

#[tauri::command]
fn history_remove(workspace: State<'_, Workspace>, id: String) -> Result<bool, WorkspaceError> {
    workspace.remove_history_entry(&id)
}

#[tauri::command]
fn history_clear(workspace: State<'_, Workspace>) -> Result<(), WorkspaceError> {
    workspace.clear_history()
}

#[tauri::command]
async fn metadata_get_databases(
    workspace: State<'_, Workspace>,
    profile_id: String,
) -> Result<Vec<String>, WorkspaceError> {
    workspace.get_databases(&profile_id).await
}

#[tauri::command]
async fn metadata_get_database_info(
    workspace: State<'_, Workspace>,
    profile_id: String,
    database: String,
) -> Result<DatabaseInfo, WorkspaceError> {
    workspace.get_database_info(&profile_id, &database).await
}

#[tauri::command]
async fn metadata_create_database(
    workspace: State<'_, Workspace>,
    profile_id: String,
    database: String,
    retention_policy: Option<String>,
) -> Result<bool, WorkspaceError> {
    workspace
        .create_database(&profile_id, &database, retention_policy.as_deref())
        .await
}

#[tauri::command]
async fn metadata_drop_database(
    workspace: State<'_, Workspace>,
    profile_id: String,
    database: String,
) -> Result<bool, WorkspaceError> {
    workspace.drop_database(&profile_id, &database).await
}

#[tauri::command]
async fn metadata_get_measurements(
    workspace: State<'_, Workspace>,
    profile_id: String,
    database: String,
) -> Result<Vec<String>, WorkspaceError> {
    workspace.get_measurements(&profile_id, &database).await
}

#[tauri::command]
fn app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let workspace = Workspace::open_default(Arc::new(HttpInfluxClient::new()))
        .expect("failed to open workspace storage");

    tauri::Builder::default()
        .plugin(tauri_plugin_updater::Builder::new().build())
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_fs::init())
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_process::init())
        .plugin(tauri_plugin_shell::init())
        .manage(workspace)
        .invoke_handler(tauri::generate_handler![
            profiles_list,
            profiles_add_or_update,
            profiles_update,
            profiles_remove,
            profiles_unrecognized,
            profiles_import,
            profiles_export,
            session_connect,
            session_test,
            session_disconnect,
            session_status,
            session_statuses,
            session_active,
            query_validate,
            query_examples,
            sql_replace_table_name,
            sql_has_any_table_name,
            sql_contains_identifier,
            sql_first_identifier,
            query_execute,
            history_list,
            history_recent,
            history_remove,
            history_clear,
            metadata_get_databases,
            metadata_get_database_info,
            metadata_create_database,
            metadata_drop_database,
            metadata_get_measurements,
            app_version
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
