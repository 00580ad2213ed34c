use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::{
    admin_api,
    auth::{auth_middleware, AuthService, AuthUser, MaybeAuthUser},
    config::SurveyConfig,
    database::Database,
    errors::{into_api_error, ApiError, ErrorContext},
    models::*,
    session::{is_valid_session_key, SessionManager},
    status_cache::StatusCache,
    survey_service::{
        RedirectTarget, Respondent, SubmissionDetail, SubmissionOutcome, SurveyResults, SurveyService,
        SurveySummary,
    },
};

// Import logging macros
use crate::{api_error, log_api_error, log_api_start, log_api_success, log_api_warn};

pub const COOKIES_REQUIRED_MESSAGE: &str = "Cookies must be enabled.";
pub const INSUFFICIENT_PRIVILEGES_MESSAGE: &str = "Insufficient Privileges.";
pub const THANK_YOU_MESSAGE: &str = "Thank you for taking the survey.";

#[derive(Clone)]
pub struct AppState {
    pub survey_service: SurveyService,
    pub sessions: SessionManager,
    pub auth: AuthService,
    pub login_url: String,
}

impl AppState {
    pub fn new(db: Database, config: &SurveyConfig) -> Self {
        Self {
            survey_service: SurveyService::new(db.clone(), StatusCache::new(config.status_cache_max_entries)),
            sessions: SessionManager::new(db.clone(), config),
            auth: AuthService::new(Arc::new(db)),
            login_url: config.login_url.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, Response>;

#[derive(Deserialize)]
pub struct NextParams {
    pub next: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Serialize)]
pub struct ThankYou {
    pub slug: String,
    pub title: String,
    pub message: String,
}

pub fn survey_path(slug: &str) -> String {
    format!("/api/surveys/{}", slug)
}

pub fn results_path(slug: &str) -> String {
    format!("/api/surveys/{}/answers", slug)
}

pub fn submission_path(slug: &str, session_key: &str) -> String {
    format!("/api/surveys/{}/answers/{}", slug, session_key)
}

/// Map a service failure onto the response the client sees.
pub(crate) fn service_error(error: anyhow::Error, operation: &str, resource_type: &str) -> Response {
    into_api_error(error).to_response_with_context(ErrorContext::new(operation, resource_type))
}

fn survey_not_found(operation: &str, slug: &str) -> Response {
    log_api_warn!(operation, slug = slug, "survey not found");
    ApiError::NotFound(format!("Survey '{}' not found", slug)).to_response_with_context(
        ErrorContext::new(operation, "survey")
            .with_id(slug)
            .with_user_message("Survey not found"),
    )
}

async fn load_visible_survey(state: &AppState, slug: &str, operation: &str) -> Result<Survey, Response> {
    match state.survey_service.get_visible_survey(slug).await {
        Ok(Some(survey)) => Ok(survey),
        Ok(None) => Err(survey_not_found(operation, slug)),
        Err(e) => {
            log_api_error!(operation, slug = slug, error = e, "database error loading survey");
            Err(api_error!(database, operation, "survey", e))
        }
    }
}

fn redirect_response(survey: &Survey, target: RedirectTarget) -> Response {
    match target {
        RedirectTarget::Next(next) => Redirect::to(&next).into_response(),
        RedirectTarget::Results => Redirect::to(&results_path(&survey.slug)).into_response(),
        RedirectTarget::OwnSubmission(key) => Redirect::to(&submission_path(&survey.slug, &key)).into_response(),
        RedirectTarget::ThankYou => Json(ApiResponse::success(ThankYou {
            slug: survey.slug.clone(),
            title: survey.title.clone(),
            message: THANK_YOU_MESSAGE.to_string(),
        }))
        .into_response(),
    }
}

/// Checks shared by GET and POST on a survey: visibility, the open window,
/// repeat answers and login-only surveys. `Err` carries the response to send.
async fn gate_survey(
    state: &AppState,
    slug: &str,
    operation: &str,
    respondent: Respondent<'_>,
    next: Option<&str>,
) -> Result<Survey, Response> {
    let survey = load_visible_survey(state, slug, operation).await?;
    let path = survey_path(&survey.slug);

    if !state.survey_service.is_open(&survey).await {
        if survey.answers_viewable_by(respondent.user) {
            return Err(Redirect::to(&results_path(&survey.slug)).into_response());
        }
        return Err(survey_not_found(operation, slug));
    }

    if !survey.allows_multiple_interviews {
        let answered = state
            .survey_service
            .has_answers_from(&survey, respondent)
            .await
            .map_err(|e| service_error(e, operation, "survey"))?;
        if answered {
            debug!(slug = %survey.slug, "Respondent already answered");
            let target = state
                .survey_service
                .redirect_target(&survey, respondent, next, &path)
                .await
                .map_err(|e| service_error(e, operation, "survey"))?;
            return Err(redirect_response(&survey, target));
        }
    }

    if survey.restricted && respondent.user.is_none() {
        return Err(Redirect::to(&format!("{}?next={}", state.login_url, path)).into_response());
    }

    Ok(survey)
}

// Respondent endpoints
pub async fn list_surveys(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    jar: CookieJar,
) -> ApiResult<Vec<SurveySummary>> {
    log_api_start!("list_surveys");

    let session_key = state
        .sessions
        .resolve(&jar)
        .await
        .map_err(|e| service_error(e, "list_surveys", "session"))?;
    let respondent = Respondent {
        user: user.as_ref(),
        session_key: session_key.as_deref(),
    };

    match state.survey_service.list_visible_surveys(respondent).await {
        Ok(surveys) => {
            log_api_success!("list_surveys", count = surveys.len(), "surveys listed");
            Ok(Json(ApiResponse::success(surveys)))
        }
        Err(e) => {
            log_api_error!("list_surveys", error = e, "database error listing surveys");
            Err(api_error!(database, "list_surveys", "survey", e))
        }
    }
}

pub async fn survey_form(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(params): Query<NextParams>,
    MaybeAuthUser(user): MaybeAuthUser,
    jar: CookieJar,
) -> Response {
    log_api_start!("survey_form", slug = slug);

    let session_key = match state.sessions.resolve(&jar).await {
        Ok(key) => key,
        Err(e) => return service_error(e, "survey_form", "session"),
    };
    let respondent = Respondent {
        user: user.as_ref(),
        session_key: session_key.as_deref(),
    };

    let survey = match gate_survey(&state, &slug, "survey_form", respondent, params.next.as_deref()).await {
        Ok(survey) => survey,
        Err(response) => return response,
    };

    let (jar, _) = match state.sessions.resolve_or_create(jar).await {
        Ok(resolved) => resolved,
        Err(e) => return service_error(e, "survey_form", "session"),
    };

    match state.survey_service.build_form(&survey).await {
        Ok(form) => {
            log_api_success!("survey_form", slug = survey.slug, "form rendered");
            (jar, Json(ApiResponse::success(form))).into_response()
        }
        Err(e) => {
            log_api_error!("survey_form", slug = survey.slug, error = e, "failed to build form");
            service_error(e, "survey_form", "survey")
        }
    }
}

pub async fn submit_survey(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(params): Query<NextParams>,
    MaybeAuthUser(user): MaybeAuthUser,
    jar: CookieJar,
    Form(data): Form<Vec<(String, String)>>,
) -> Response {
    log_api_start!("submit_survey", slug = slug);

    let session_key = match state.sessions.resolve(&jar).await {
        Ok(key) => key,
        Err(e) => return service_error(e, "submit_survey", "session"),
    };
    let respondent = Respondent {
        user: user.as_ref(),
        session_key: session_key.as_deref(),
    };
    let next = params.next.as_deref();

    let survey = match gate_survey(&state, &slug, "submit_survey", respondent, next).await {
        Ok(survey) => survey,
        Err(response) => return response,
    };

    let Some(session_key) = respondent.session_key else {
        log_api_warn!("submit_survey", slug = survey.slug, "submission without a session cookie");
        return ApiError::Forbidden(COOKIES_REQUIRED_MESSAGE.to_string())
            .to_response_with_context(ErrorContext::new("submit_survey", "session").with_id(&survey.slug));
    };

    match state
        .survey_service
        .submit(&survey, &data, session_key, respondent.user)
        .await
    {
        Ok(SubmissionOutcome::Invalid(form)) => {
            log_api_warn!("submit_survey", slug = survey.slug, "submission rejected by form validation");
            let body = ApiResponse {
                success: false,
                data: Some(form),
                error: Some("Please correct the errors below.".to_string()),
            };
            (StatusCode::BAD_REQUEST, Json(body)).into_response()
        }
        Ok(SubmissionOutcome::Saved {
            interview_uuid,
            answer_count,
        }) => {
            info!(
                slug = %survey.slug,
                interview_uuid = %interview_uuid,
                answer_count = answer_count,
                "Survey answers saved"
            );
            match state
                .survey_service
                .redirect_target(&survey, respondent, next, &survey_path(&survey.slug))
                .await
            {
                Ok(target) => redirect_response(&survey, target),
                Err(e) => service_error(e, "submit_survey", "survey"),
            }
        }
        Err(e) => {
            log_api_error!("submit_survey", slug = survey.slug, error = e, "failed to store answers");
            service_error(e, "submit_survey", "answer")
        }
    }
}

// Results endpoints
pub async fn survey_results(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    MaybeAuthUser(user): MaybeAuthUser,
    jar: CookieJar,
) -> Result<Json<ApiResponse<SurveyResults>>, Response> {
    log_api_start!("survey_results", slug = slug);

    let survey = load_visible_survey(&state, &slug, "survey_results").await?;

    if !survey.answers_viewable_by(user.as_ref()) {
        let session_key = state
            .sessions
            .resolve(&jar)
            .await
            .map_err(|e| service_error(e, "survey_results", "session"))?;
        if let Some(key) = session_key {
            // Only this session's answers: the redirect target is keyed by session.
            let respondent = Respondent {
                user: None,
                session_key: Some(&key),
            };
            let answered = state
                .survey_service
                .has_answers_from(&survey, respondent)
                .await
                .map_err(|e| service_error(e, "survey_results", "answer"))?;
            if answered {
                return Err(Redirect::to(&submission_path(&survey.slug, &key)).into_response());
            }
        }
        return Err(ApiError::Forbidden(INSUFFICIENT_PRIVILEGES_MESSAGE.to_string())
            .to_response_with_context(ErrorContext::new("survey_results", "survey").with_id(&slug)));
    }

    let view_submissions = user
        .as_ref()
        .is_some_and(|u| u.has_perm(Permission::ViewSubmissions));

    match state.survey_service.results(&survey, view_submissions).await {
        Ok(results) => {
            log_api_success!("survey_results", slug = slug, "results computed");
            Ok(Json(ApiResponse::success(results)))
        }
        Err(e) => {
            log_api_error!("survey_results", slug = slug, error = e, "failed to compute results");
            Err(service_error(e, "survey_results", "answer"))
        }
    }
}

pub async fn submission_detail(
    State(state): State<AppState>,
    Path((slug, key)): Path<(String, String)>,
    MaybeAuthUser(user): MaybeAuthUser,
    jar: CookieJar,
) -> Result<Json<ApiResponse<SubmissionDetail>>, Response> {
    log_api_start!("submission_detail", slug = slug);

    let survey = load_visible_survey(&state, &slug, "submission_detail").await?;
    let not_found = || {
        ApiError::NotFound(format!("No submission '{}'", key))
            .to_response_with_context(ErrorContext::new("submission_detail", "submission").with_id(&key))
    };

    if !is_valid_session_key(&key) {
        return Err(not_found());
    }

    let detail = match state.survey_service.submission(&survey, &key).await {
        Ok(Some(detail)) => detail,
        Ok(None) => return Err(not_found()),
        Err(e) => return Err(service_error(e, "submission_detail", "submission")),
    };

    let own_session = state
        .sessions
        .resolve(&jar)
        .await
        .map_err(|e| service_error(e, "submission_detail", "session"))?
        .is_some_and(|own| own == detail.session_key);
    let privileged = user
        .as_ref()
        .is_some_and(|u| u.has_perm(Permission::ViewSubmissions))
        && survey.answers_viewable_by(user.as_ref());

    if !own_session && !privileged {
        return Err(ApiError::Forbidden(INSUFFICIENT_PRIVILEGES_MESSAGE.to_string())
            .to_response_with_context(ErrorContext::new("submission_detail", "submission").with_id(&key)));
    }

    log_api_success!("submission_detail", slug = slug, "submission retrieved");
    Ok(Json(ApiResponse::success(detail)))
}

// Authentication endpoints
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    log_api_start!("login");

    match state.auth.login(&request.username, &request.password).await {
        Ok(Some((user, token))) => {
            log_api_success!("login", id = user.id, "user logged in");
            Ok(Json(ApiResponse::success(LoginResponse { token, user })))
        }
        Ok(None) => Err(ApiError::Unauthorized("Invalid username or password".to_string())
            .to_response_with_context(ErrorContext::new("login", "user"))),
        Err(e) => Err(service_error(e, "login", "user")),
    }
}

pub async fn logout(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<bool> {
    match state.auth.logout(&user).await {
        Ok(()) => Ok(Json(ApiResponse::success(true))),
        Err(e) => Err(service_error(e, "logout", "user")),
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Respondent routes
        .route("/api/surveys", get(list_surveys))
        .route("/api/surveys/:slug", get(survey_form).post(submit_survey))
        .route("/api/surveys/:slug/answers", get(survey_results))
        .route("/api/surveys/:slug/answers/:key", get(submission_detail))

        // Auth routes
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))

        // Administration routes
        .merge(admin_api::routes())

        .layer(middleware::from_fn_with_state(state.auth.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
