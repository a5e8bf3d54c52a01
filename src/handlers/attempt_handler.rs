use actix_web::{get, post, web, HttpRequest, HttpResponse};
use uuid::Uuid;
use validator::Validate;

use crate::{
    app_state::AppState,
    auth::{AuthenticatedUser, MaybeUser},
    errors::AppError,
    models::dto::request::{
        normalize_payload, AnswerRequest, GradeAnswerRequest, ListAttemptsQuery,
        StartAttemptRequest, SubmitRequest,
    },
    models::dto::response::{
        AnswerResponse, AttemptSummaryResponse, AttemptSummaryView, DoneResponse, SubmitResponse,
    },
    services::AttemptMetadata,
};

#[get("/health")]
async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    match state.db.health_check().await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "status": "ok" })),
        Err(err) => {
            log::error!("Health check failed: {}", err);
            HttpResponse::ServiceUnavailable()
                .json(serde_json::json!({ "status": "degraded" }))
        }
    }
}

#[post("/v1/attempts/start")]
async fn start_attempt(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<StartAttemptRequest>,
    user: MaybeUser,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    body.validate()?;

    let meta = AttemptMetadata {
        client_ip: client_ip(&req),
        fingerprint: fingerprint(&req, body.fingerprint.as_deref()),
    };
    let attempt = state
        .attempt_service
        .start_attempt(user.0, body.guest_name, body.assignment_id, meta)
        .await?;
    Ok(HttpResponse::Ok().json(attempt))
}

#[get("/v1/attempts/{id}/question")]
async fn next_question(
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
    user: MaybeUser,
) -> Result<HttpResponse, AppError> {
    match state.attempt_service.next_question(user.0, *id).await {
        Ok(response) => Ok(HttpResponse::Ok().json(response)),
        Err(AppError::NoMoreQuestions) => {
            Ok(HttpResponse::Ok().json(DoneResponse { done: true }))
        }
        Err(err) => Err(err),
    }
}

#[post("/v1/attempts/{id}/answer")]
async fn answer(
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
    body: web::Json<AnswerRequest>,
    user: MaybeUser,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    body.validate()?;
    let payload = normalize_payload(&body.payload)?;

    match state
        .attempt_service
        .answer_current(user.0, *id, body.version, payload)
        .await
    {
        Ok((attempt, question_id)) => Ok(HttpResponse::Ok().json(AnswerResponse {
            attempt,
            question_id,
        })),
        Err(AppError::NoMoreQuestions) => {
            Ok(HttpResponse::Ok().json(DoneResponse { done: true }))
        }
        Err(err) => Err(err),
    }
}

#[post("/v1/attempts/{id}/submit")]
async fn submit(
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
    body: web::Json<SubmitRequest>,
    user: MaybeUser,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    body.validate()?;

    let attempt = state
        .attempt_service
        .submit(user.0, *id, body.version)
        .await?;
    Ok(HttpResponse::Ok().json(SubmitResponse { attempt }))
}

#[post("/v1/attempts/{id}/cancel")]
async fn cancel(
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
    body: web::Json<SubmitRequest>,
    user: MaybeUser,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    body.validate()?;

    let attempt = state
        .attempt_service
        .cancel(user.0, *id, body.version)
        .await?;
    Ok(HttpResponse::Ok().json(SubmitResponse { attempt }))
}

#[get("/v1/attempts")]
async fn list_attempts(
    state: web::Data<AppState>,
    query: web::Query<ListAttemptsQuery>,
    owner: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let summaries = state
        .attempt_service
        .list_assignment_attempts(owner.0, query.assignment_id)
        .await?;
    Ok(HttpResponse::Ok().json(AttemptSummaryResponse {
        attempts: summaries
            .into_iter()
            .map(AttemptSummaryView::from)
            .collect(),
    }))
}

#[get("/v1/attempts/{id}/details")]
async fn attempt_details(
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
    owner: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let details = state.attempt_service.attempt_details(owner.0, *id).await?;
    Ok(HttpResponse::Ok().json(details))
}

#[post("/v1/attempts/{id}/grade")]
async fn grade_answer(
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
    body: web::Json<GradeAnswerRequest>,
    owner: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    body.validate()?;

    let response = state
        .attempt_service
        .grade_answer(owner.0, *id, &body.question_id, body.score, body.is_correct)
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

fn client_ip(req: &HttpRequest) -> String {
    req.connection_info()
        .realip_remote_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_default()
}

/// Fingerprint capture priority: request body, then the dedicated header,
/// then the cookie set by the web client.
fn fingerprint(req: &HttpRequest, from_body: Option<&str>) -> String {
    if let Some(fp) = from_body {
        return fp.to_string();
    }
    if let Some(header) = req
        .headers()
        .get("X-Attempt-Fingerprint")
        .and_then(|h| h.to_str().ok())
    {
        if !header.is_empty() {
            return header.to_string();
        }
    }
    if let Some(cookie) = req.cookie("attempt_fingerprint") {
        return cookie.value().to_string();
    }
    String::new()
}
