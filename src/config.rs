use std::env;
use std::path::PathBuf;

use crate::constants::{
    DEFAULT_CORS_ORIGINS, DEFAULT_DATA_TABLE, DEFAULT_LOCAL_DATA_FILES, DEFAULT_MAPPINGS_PATH,
    DEFAULT_PORT,
};
use crate::error::{Result, ServiceError};

/// Service configuration, read from the process environment (after `.env`
/// has been loaded by the binary).
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub data_table: String,
    pub supabase: Option<SupabaseConfig>,
    pub mappings_path: PathBuf,
    pub local_data_files: Vec<PathBuf>,
    pub cors_origins: Vec<String>,
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_role_key: String,
}

impl SupabaseConfig {
    /// Host part of the project URL, safe to log.
    pub fn host(&self) -> &str {
        self.url.split("://").last().unwrap_or(&self.url)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = match non_empty_var("PORT") {
            Some(raw) => raw.parse().map_err(|e| {
                ServiceError::Configuration(format!("PORT '{}' is not a valid port: {}", raw, e))
            })?,
            None => DEFAULT_PORT,
        };

        let metrics_port = match non_empty_var("METRICS_PORT") {
            Some(raw) => Some(raw.parse().map_err(|e| {
                ServiceError::Configuration(format!(
                    "METRICS_PORT '{}' is not a valid port: {}",
                    raw, e
                ))
            })?),
            None => None,
        };

        let supabase = match (
            non_empty_var("SUPABASE_URL"),
            non_empty_var("SUPABASE_SERVICE_ROLE_KEY"),
        ) {
            (Some(url), Some(service_role_key)) => Some(SupabaseConfig {
                url,
                service_role_key,
            }),
            _ => None,
        };

        let local_data_files = match non_empty_var("LOCAL_DATA_FILES") {
            Some(list) => split_list(&list).into_iter().map(PathBuf::from).collect(),
            None => DEFAULT_LOCAL_DATA_FILES.iter().map(PathBuf::from).collect(),
        };

        let mut cors_origins = match non_empty_var("CORS_ORIGINS") {
            Some(list) => split_list(&list),
            None => DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect(),
        };
        if let Some(frontend) = non_empty_var("FRONTEND_URL") {
            if !cors_origins.contains(&frontend) {
                cors_origins.push(frontend);
            }
        }

        Ok(Self {
            port,
            database_url: non_empty_var("DATABASE_URL"),
            data_table: non_empty_var("DATA_TABLE")
                .unwrap_or_else(|| DEFAULT_DATA_TABLE.to_string()),
            supabase,
            mappings_path: non_empty_var("MAPPINGS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MAPPINGS_PATH)),
            local_data_files,
            cors_origins,
            metrics_port,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
