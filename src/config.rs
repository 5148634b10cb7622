use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_DATA_KEY: &str = "fitfocus_v3_data";

#[derive(Debug, Clone, Deserialize)]
pub enum StorageConfig {
    File {
        data_dir: PathBuf,
    },
    S3 {
        endpoint: String,
        bucket: String,
        access_key: String,
        secret_key: String,
        region: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    /// Estimation is disabled without a key.
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub data_key: String,
    pub storage: StorageConfig,
    pub gemini: GeminiConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let storage = match std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "file".into())
            .to_ascii_lowercase()
            .as_str()
        {
            "file" => StorageConfig::File {
                data_dir: std::env::var("DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./data")),
            },
            "s3" => StorageConfig::S3 {
                endpoint: required("MINIO_ENDPOINT")?,
                bucket: required("MINIO_BUCKET")?,
                access_key: required("MINIO_ACCESS_KEY")?,
                secret_key: required("MINIO_SECRET_KEY")?,
                region: std::env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".into()),
            },
            other => anyhow::bail!("unsupported STORAGE_BACKEND `{other}`; expected file|s3"),
        };

        let gemini = GeminiConfig {
            api_key: std::env::var("GEMINI_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".into()),
            timeout_secs: std::env::var("GEMINI_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
        };

        Ok(Self {
            data_key: std::env::var("DATA_KEY").unwrap_or_else(|_| DEFAULT_DATA_KEY.into()),
            storage,
            gemini,
        })
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set when STORAGE_BACKEND=s3"))
}
