//! Axum handlers for the template catalog HTTP surface.

use crate::catalog::TemplateCatalog;
use crate::models::{CreateTemplate, Template, UpdateTemplate};
use crate::repository::TemplateRepository;
use crate::resolver::TemplateResolver;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use axum_helpers::{ApiResponse, AppError, PaginationMeta, ValidatedJson};
use serde::Deserialize;

/// Shared state for the template routes.
#[derive(Clone)]
pub struct TemplatesState<R: TemplateRepository> {
    pub resolver: TemplateResolver<R>,
    pub catalog: TemplateCatalog<R>,
}

/// Build the `/templates` router.
pub fn router<R: TemplateRepository + Clone + 'static>(state: TemplatesState<R>) -> Router {
    Router::new()
        .route("/templates", get(list_templates).post(create_template))
        .route(
            "/templates/{code}",
            get(get_template).put(update_template).delete(delete_template),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ResolveQuery {
    #[serde(default = "default_lang")]
    lang: String,
    version: Option<i32>,
}

fn default_lang() -> String {
    "en".to_string()
}

#[derive(Debug, Deserialize)]
struct DeleteQuery {
    #[serde(default = "default_lang")]
    lang: String,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default = "default_page")]
    page: u64,
    #[serde(default = "default_limit")]
    limit: u64,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    10
}

async fn get_template<R: TemplateRepository>(
    State(state): State<TemplatesState<R>>,
    Path(code): Path<String>,
    Query(query): Query<ResolveQuery>,
) -> Result<Response, AppError> {
    let template = state
        .resolver
        .resolve(&code, &query.lang, query.version)
        .await?;

    Ok(Json(ApiResponse::success(template, "Template retrieved")).into_response())
}

async fn create_template<R: TemplateRepository>(
    State(state): State<TemplatesState<R>>,
    ValidatedJson(dto): ValidatedJson<CreateTemplate>,
) -> Result<Response, AppError> {
    let template = state.catalog.create(dto).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(template, "Template created")),
    )
        .into_response())
}

async fn update_template<R: TemplateRepository>(
    State(state): State<TemplatesState<R>>,
    Path(code): Path<String>,
    ValidatedJson(dto): ValidatedJson<UpdateTemplate>,
) -> Result<Response, AppError> {
    let template = state.catalog.update(&code, dto).await?;

    Ok(Json(ApiResponse::success(template, "Template updated")).into_response())
}

async fn delete_template<R: TemplateRepository>(
    State(state): State<TemplatesState<R>>,
    Path(code): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<Response, AppError> {
    state.catalog.delete(&code, &query.lang).await?;

    Ok(Json(ApiResponse::<()>::success((), "Template deleted")).into_response())
}

async fn list_templates<R: TemplateRepository>(
    State(state): State<TemplatesState<R>>,
    Query(query): Query<ListQuery>,
) -> Result<Response, AppError> {
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, 100);

    let (templates, total) = state.catalog.list(page, limit).await?;
    let meta = PaginationMeta::new(total, page, limit);

    Ok(Json(ApiResponse::<Vec<Template>>::success_with_meta(
        templates,
        "Templates retrieved",
        meta,
    ))
    .into_response())
}
