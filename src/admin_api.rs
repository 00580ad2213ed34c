//! Authenticated administration: surveys, questionnaires with their
//! questions, and choice groups with their choices.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Json, Response},
    routing::{get, post, put},
    Router,
};
use uuid::Uuid;

use crate::{
    api::{service_error, ApiResponse, ApiResult, AppState, INSUFFICIENT_PRIVILEGES_MESSAGE},
    auth::AuthUser,
    models::*,
    survey_service::{ChoiceGroupDetail, QuestionnaireDetail, SurveyDetail, SurveySummary},
};

use crate::{api_error, log_api_start, log_api_success};

fn not_found(operation: &str, resource_type: &str, id: &str) -> Response {
    api_error!(not_found, operation, resource_type, id)
}

fn created<T>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::success(data)))
}

// Surveys
pub async fn list_surveys(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Vec<SurveySummary>> {
    log_api_start!("admin_list_surveys");

    match state.survey_service.list_editable_surveys(&user).await {
        Ok(surveys) => {
            log_api_success!("admin_list_surveys", count = surveys.len(), "editable surveys listed");
            Ok(Json(ApiResponse::success(surveys)))
        }
        Err(e) => Err(service_error(e, "admin_list_surveys", "survey")),
    }
}

pub async fn create_survey(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateSurveyRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Survey>>), Response> {
    log_api_start!("create_survey");

    match state.survey_service.create_survey(request, &user).await {
        Ok(survey) => {
            log_api_success!("create_survey", slug = survey.slug, "survey created");
            Ok(created(survey))
        }
        Err(e) => Err(service_error(e, "create_survey", "survey")),
    }
}

pub async fn get_survey(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(slug): Path<String>,
) -> ApiResult<SurveyDetail> {
    log_api_start!("admin_get_survey", slug = slug);

    let survey = match state.survey_service.database().get_survey_by_slug(&slug).await {
        Ok(Some(survey)) => survey,
        Ok(None) => return Err(not_found("admin_get_survey", "survey", &slug)),
        Err(e) => return Err(service_error(e, "admin_get_survey", "survey")),
    };
    if !survey.is_editable_by(&user) {
        return Err(api_error!(forbidden, "admin_get_survey", "survey", INSUFFICIENT_PRIVILEGES_MESSAGE));
    }

    state
        .survey_service
        .survey_detail(survey)
        .await
        .map(|detail| Json(ApiResponse::success(detail)))
        .map_err(|e| service_error(e, "admin_get_survey", "survey"))
}

pub async fn update_survey(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(slug): Path<String>,
    Json(request): Json<UpdateSurveyRequest>,
) -> ApiResult<Survey> {
    log_api_start!("update_survey", slug = slug);

    match state.survey_service.update_survey(&slug, request, &user).await {
        Ok(survey) => {
            log_api_success!("update_survey", slug = survey.slug, "survey updated");
            Ok(Json(ApiResponse::success(survey)))
        }
        Err(e) => Err(service_error(e, "update_survey", "survey")),
    }
}

pub async fn delete_survey(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(slug): Path<String>,
) -> ApiResult<bool> {
    log_api_start!("delete_survey", slug = slug);

    match state.survey_service.delete_survey(&slug, &user).await {
        Ok(()) => {
            log_api_success!("delete_survey", slug = slug, "survey deleted");
            Ok(Json(ApiResponse::success(true)))
        }
        Err(e) => Err(service_error(e, "delete_survey", "survey")),
    }
}

// Questionnaires
pub async fn list_questionnaires(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
) -> ApiResult<Vec<Questionnaire>> {
    state
        .survey_service
        .database()
        .list_questionnaires()
        .await
        .map(|items| Json(ApiResponse::success(items)))
        .map_err(|e| service_error(e, "list_questionnaires", "questionnaire"))
}

pub async fn create_questionnaire(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Json(request): Json<CreateQuestionnaireRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Questionnaire>>), Response> {
    log_api_start!("create_questionnaire");

    if request.name.trim().is_empty() {
        return Err(api_error!(
            validation,
            "create_questionnaire",
            "questionnaire",
            "Questionnaire name must not be empty"
        ));
    }

    match state.survey_service.database().create_questionnaire(request).await {
        Ok(questionnaire) => {
            log_api_success!("create_questionnaire", id = questionnaire.id, "questionnaire created");
            Ok(created(questionnaire))
        }
        Err(e) => Err(service_error(e, "create_questionnaire", "questionnaire")),
    }
}

pub async fn get_questionnaire(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<QuestionnaireDetail> {
    match state.survey_service.questionnaire_detail(id).await {
        Ok(Some(detail)) => Ok(Json(ApiResponse::success(detail))),
        Ok(None) => Err(not_found("get_questionnaire", "questionnaire", &id.to_string())),
        Err(e) => Err(service_error(e, "get_questionnaire", "questionnaire")),
    }
}

pub async fn update_questionnaire(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateQuestionnaireRequest>,
) -> ApiResult<Questionnaire> {
    log_api_start!("update_questionnaire", id = id);

    match state.survey_service.update_questionnaire(id, request).await {
        Ok(Some(questionnaire)) => Ok(Json(ApiResponse::success(questionnaire))),
        Ok(None) => Err(not_found("update_questionnaire", "questionnaire", &id.to_string())),
        Err(e) => Err(service_error(e, "update_questionnaire", "questionnaire")),
    }
}

pub async fn delete_questionnaire(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<bool> {
    log_api_start!("delete_questionnaire", id = id);

    match state.survey_service.database().delete_questionnaire(id).await {
        Ok(true) => Ok(Json(ApiResponse::success(true))),
        Ok(false) => Err(not_found("delete_questionnaire", "questionnaire", &id.to_string())),
        Err(e) => Err(service_error(e, "delete_questionnaire", "questionnaire")),
    }
}

// Questions
pub async fn add_question(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(questionnaire_id): Path<Uuid>,
    Json(request): Json<CreateQuestionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Question>>), Response> {
    log_api_start!("add_question", id = questionnaire_id);

    match state.survey_service.add_question(questionnaire_id, request).await {
        Ok(question) => {
            log_api_success!("add_question", id = question.id, "question added");
            Ok(created(question))
        }
        Err(e) => Err(service_error(e, "add_question", "question")),
    }
}

pub async fn update_question(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path((questionnaire_id, question_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateQuestionRequest>,
) -> ApiResult<Question> {
    log_api_start!("update_question", id = question_id);

    state
        .survey_service
        .update_question(questionnaire_id, question_id, request)
        .await
        .map(|question| Json(ApiResponse::success(question)))
        .map_err(|e| service_error(e, "update_question", "question"))
}

pub async fn delete_question(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path((questionnaire_id, question_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<bool> {
    log_api_start!("delete_question", id = question_id);

    state
        .survey_service
        .delete_question(questionnaire_id, question_id)
        .await
        .map(|()| Json(ApiResponse::success(true)))
        .map_err(|e| service_error(e, "delete_question", "question"))
}

// Choice groups
pub async fn list_choice_groups(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
) -> ApiResult<Vec<ChoiceGroup>> {
    state
        .survey_service
        .database()
        .list_choice_groups()
        .await
        .map(|groups| Json(ApiResponse::success(groups)))
        .map_err(|e| service_error(e, "list_choice_groups", "choice_group"))
}

pub async fn create_choice_group(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Json(request): Json<CreateChoiceGroupRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ChoiceGroup>>), Response> {
    log_api_start!("create_choice_group");

    match state.survey_service.create_choice_group(request).await {
        Ok(group) => {
            log_api_success!("create_choice_group", id = group.id, "choice group created");
            Ok(created(group))
        }
        Err(e) => Err(service_error(e, "create_choice_group", "choice_group")),
    }
}

pub async fn get_choice_group(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<ChoiceGroupDetail> {
    match state.survey_service.choice_group_detail(id).await {
        Ok(Some(detail)) => Ok(Json(ApiResponse::success(detail))),
        Ok(None) => Err(not_found("get_choice_group", "choice_group", &id.to_string())),
        Err(e) => Err(service_error(e, "get_choice_group", "choice_group")),
    }
}

pub async fn update_choice_group(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateChoiceGroupRequest>,
) -> ApiResult<ChoiceGroup> {
    log_api_start!("update_choice_group", id = id);

    match state.survey_service.update_choice_group(id, request).await {
        Ok(Some(group)) => Ok(Json(ApiResponse::success(group))),
        Ok(None) => Err(not_found("update_choice_group", "choice_group", &id.to_string())),
        Err(e) => Err(service_error(e, "update_choice_group", "choice_group")),
    }
}

pub async fn delete_choice_group(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<bool> {
    log_api_start!("delete_choice_group", id = id);

    // Still referenced by a question: the foreign key rejects the delete.
    match state.survey_service.database().delete_choice_group(id).await {
        Ok(true) => Ok(Json(ApiResponse::success(true))),
        Ok(false) => Err(not_found("delete_choice_group", "choice_group", &id.to_string())),
        Err(e) => Err(service_error(e, "delete_choice_group", "choice_group")),
    }
}

// Choices
pub async fn add_choice(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(group_id): Path<Uuid>,
    Json(request): Json<CreateChoiceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Choice>>), Response> {
    log_api_start!("add_choice", id = group_id);

    match state.survey_service.add_choice(group_id, request).await {
        Ok(choice) => Ok(created(choice)),
        Err(e) => Err(service_error(e, "add_choice", "choice")),
    }
}

pub async fn update_choice(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path((group_id, choice_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateChoiceRequest>,
) -> ApiResult<Choice> {
    state
        .survey_service
        .update_choice(group_id, choice_id, request)
        .await
        .map(|choice| Json(ApiResponse::success(choice)))
        .map_err(|e| service_error(e, "update_choice", "choice"))
}

pub async fn delete_choice(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path((group_id, choice_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<bool> {
    state
        .survey_service
        .delete_choice(group_id, choice_id)
        .await
        .map(|()| Json(ApiResponse::success(true)))
        .map_err(|e| service_error(e, "delete_choice", "choice"))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        // Survey routes
        .route("/api/admin/surveys", get(list_surveys).post(create_survey))
        .route(
            "/api/admin/surveys/:slug",
            get(get_survey).put(update_survey).delete(delete_survey),
        )

        // Questionnaire routes
        .route("/api/admin/questionnaires", get(list_questionnaires).post(create_questionnaire))
        .route(
            "/api/admin/questionnaires/:id",
            get(get_questionnaire).put(update_questionnaire).delete(delete_questionnaire),
        )
        .route("/api/admin/questionnaires/:id/questions", post(add_question))
        .route(
            "/api/admin/questionnaires/:id/questions/:question_id",
            put(update_question).delete(delete_question),
        )

        // Choice group routes
        .route("/api/admin/choice-groups", get(list_choice_groups).post(create_choice_group))
        .route(
            "/api/admin/choice-groups/:id",
            get(get_choice_group).put(update_choice_group).delete(delete_choice_group),
        )
        .route("/api/admin/choice-groups/:id/choices", post(add_choice))
        .route(
            "/api/admin/choice-groups/:id/choices/:choice_id",
            put(update_choice).delete(delete_choice),
        )
}
