use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use docuvault::config::Config;
use docuvault::db::Database;
use docuvault::models::{
    AppendChatEntry, ChatHistoryResponse, CreateUser, DocumentResponse, TokenRequest,
    TokenResponse, UserResponse,
};
use docuvault::routes;
use docuvault::routes::convert::{
    AddTextRequest, EditTextRequest, MergeRequest, ReorderRequest, RotateRequest,
    SplitRequest, WatermarkRequest,
};
use docuvault::storage::factory::create_storage_backend;
use docuvault::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::auth::register,
        routes::auth::token,
        routes::auth::me,
        routes::documents::upload,
        routes::documents::list,
        routes::documents::download,
        routes::documents::remove,
        routes::documents::text,
        routes::convert::merge,
        routes::convert::watermark,
        routes::convert::compress,
        routes::convert::to_jpg,
        routes::convert::to_epub,
        routes::convert::to_docx,
        routes::convert::image_to_pdf,
        routes::convert::office_to_pdf,
        routes::convert::edit_text,
        routes::convert::add_text,
        routes::convert::remove_images,
        routes::convert::annotate,
        routes::convert::reorder_pages,
        routes::convert::rotate,
        routes::convert::split,
        routes::chat::list_history,
        routes::chat::append_entry,
    ),
    components(schemas(
        CreateUser,
        UserResponse,
        TokenRequest,
        TokenResponse,
        DocumentResponse,
        ChatHistoryResponse,
        AppendChatEntry,
        MergeRequest,
        WatermarkRequest,
        AddTextRequest,
        EditTextRequest,
        ReorderRequest,
        RotateRequest,
        SplitRequest,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration and token issuance"),
        (name = "documents", description = "Upload, listing, download, deletion"),
        (name = "convert", description = "PDF transformations and format conversions"),
        (name = "chat", description = "Per-document chat transcripts"),
    )
)]
struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let db = Database::new(&config.database_url).await?;
    db.migrate().await?;
    tracing::info!("Database ready");

    let storage = create_storage_backend(&config).await?;

    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        storage,
    });

    let documents_router = routes::documents::router()
        .merge(routes::convert::router())
        .merge(routes::chat::router());

    let app = Router::new()
        .route("/api/health", get(routes::health_check))
        .nest("/api/auth", routes::auth::router())
        .nest("/api/documents", documents_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server_address).await?;
    tracing::info!("Listening on {}", config.server_address);
    axum::serve(listener, app).await?;

    Ok(())
}
