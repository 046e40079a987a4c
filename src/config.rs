use anyhow::Result;
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackendKind {
    Local,
    S3,
    Azure,
}

impl std::str::FromStr for StorageBackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "local" => Ok(StorageBackendKind::Local),
            "s3" => Ok(StorageBackendKind::S3),
            "azure" => Ok(StorageBackendKind::Azure),
            other => Err(anyhow::anyhow!("Unknown storage backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket_name: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub account: String,
    pub access_key: String,
    pub container_name: String,
}

/// Names of the external conversion tools. Each can be overridden through the
/// environment so deployments can point at absolute paths.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub qpdf: String,
    pub ghostscript: String,
    pub pdftoppm: String,
    pub pdftotext: String,
    pub img2pdf: String,
    pub ebook_convert: String,
    pub libreoffice: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_address: String,
    pub jwt_secret: String,
    pub storage_backend: StorageBackendKind,
    pub local_storage_path: String,
    pub s3_config: Option<S3Config>,
    pub azure_config: Option<AzureConfig>,
    pub conversion_timeout_seconds: u64,
    pub tools: ToolConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // DATABASE_URL takes priority; fall back to assembling from POSTGRES_* parts
        let database_url = match env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                let host = env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string());
                let port = env::var("POSTGRES_PORT").unwrap_or_else(|_| "5432".to_string());
                let db = env::var("POSTGRES_DB").unwrap_or_else(|_| "docuvault".to_string());
                let user = env::var("POSTGRES_USER").unwrap_or_else(|_| "docuvault".to_string());
                let password = env::var("POSTGRES_PASSWORD").unwrap_or_default();
                format!("postgresql://{}:{}@{}:{}/{}", user, password, host, port, db)
            }
        };

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        let storage_backend = env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .parse::<StorageBackendKind>()?;

        let s3_config = match storage_backend {
            StorageBackendKind::S3 => Some(S3Config {
                bucket_name: env::var("S3_BUCKET_NAME")
                    .map_err(|_| anyhow::anyhow!("S3_BUCKET_NAME is required for the s3 backend"))?,
                region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                access_key_id: env::var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
                secret_access_key: env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
                endpoint_url: env::var("S3_ENDPOINT_URL").ok(),
            }),
            _ => None,
        };

        let azure_config = match storage_backend {
            StorageBackendKind::Azure => Some(AzureConfig {
                account: env::var("AZURE_STORAGE_ACCOUNT").map_err(|_| {
                    anyhow::anyhow!("AZURE_STORAGE_ACCOUNT is required for the azure backend")
                })?,
                access_key: env::var("AZURE_STORAGE_ACCESS_KEY").map_err(|_| {
                    anyhow::anyhow!("AZURE_STORAGE_ACCESS_KEY is required for the azure backend")
                })?,
                container_name: env::var("AZURE_CONTAINER_NAME")
                    .unwrap_or_else(|_| "documents".to_string()),
            }),
            _ => None,
        };

        let conversion_timeout_seconds = env::var("CONVERSION_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);

        let tool = |var: &str, default: &str| env::var(var).unwrap_or_else(|_| default.to_string());

        Ok(Config {
            database_url,
            server_address: env::var("SERVER_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            jwt_secret,
            storage_backend,
            local_storage_path: env::var("LOCAL_STORAGE_PATH")
                .unwrap_or_else(|_| "./storage".to_string()),
            s3_config,
            azure_config,
            conversion_timeout_seconds,
            tools: ToolConfig {
                qpdf: tool("QPDF_PATH", "qpdf"),
                ghostscript: tool("GHOSTSCRIPT_PATH", "gs"),
                pdftoppm: tool("PDFTOPPM_PATH", "pdftoppm"),
                pdftotext: tool("PDFTOTEXT_PATH", "pdftotext"),
                img2pdf: tool("IMG2PDF_PATH", "img2pdf"),
                ebook_convert: tool("EBOOK_CONVERT_PATH", "ebook-convert"),
                libreoffice: tool("LIBREOFFICE_PATH", "libreoffice"),
            },
        })
    }
}
