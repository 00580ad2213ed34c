mod common;

use axum::http::{header, StatusCode};
use axum_test::TestServer;
use common::*;
use serde_json::{json, Value};
use survey_tool::Database;

async fn open_session(server: &TestServer) -> axum_extra::extract::cookie::Cookie<'static> {
    let response = server.get(SURVEY_PATH).await;
    response.assert_status_ok();
    response.cookie("sessionid")
}

fn location(response: &axum_test::TestResponse) -> String {
    response.header(header::LOCATION).to_str().unwrap().to_string()
}

async fn answer_count(db: &Database, fixture: &Fixture) -> i64 {
    db.count_answers(fixture.survey.id).await.unwrap()
}

#[tokio::test]
async fn test_list_surveys_shows_visible_only() {
    let db = test_db().await;
    let fixture = seed_survey(&db, |_| {}).await;
    let server = test_server(&db);

    let response = server.get("/api/surveys").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["success"], true);
    let surveys = body["data"].as_array().unwrap();
    assert_eq!(surveys.len(), 1);
    assert_eq!(surveys[0]["slug"], fixture.survey.slug);
    assert_eq!(surveys[0]["status"], "open");
    assert_eq!(surveys[0]["open"], true);
    assert_eq!(surveys[0]["has_answered"], false);
    assert_eq!(surveys[0]["can_view_answers"], false);
}

#[tokio::test]
async fn test_survey_form_issues_session_cookie() {
    let db = test_db().await;
    let fixture = seed_survey(&db, |_| {}).await;
    let server = test_server(&db);

    let response = server.get(SURVEY_PATH).await;
    response.assert_status_ok();

    let cookie = response.cookie("sessionid");
    assert!(survey_tool::session::is_valid_session_key(cookie.value()));

    let body: Value = response.json();
    let fields = body["data"]["fields"].as_array().unwrap();
    assert_eq!(fields.len(), 4);
    assert_eq!(fields[0]["name"], fixture.field(&fixture.name));
    assert_eq!(fields[0]["widget"], "text_input");
    assert_eq!(fields[1]["widget"], "radio_list");
    assert_eq!(fields[1]["choices"].as_array().unwrap().len(), 3);
    assert_eq!(fields[2]["widget"], "checkbox_list");
    assert_eq!(fields[2]["max_selected"], 2);
    assert_eq!(fields[3]["help_text"], "(this question is optional)");
}

#[tokio::test]
async fn test_unknown_and_hidden_surveys_are_not_found() {
    let db = test_db().await;
    seed_survey(&db, |s| s.visible = false).await;
    let server = test_server(&db);

    server.get(SURVEY_PATH).await.assert_status(StatusCode::NOT_FOUND);
    let response = server.get("/api/surveys/nope").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"], "Survey not found");
    server.get(RESULTS_PATH).await.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submit_without_session_cookie_is_forbidden() {
    let db = test_db().await;
    let fixture = seed_survey(&db, |_| {}).await;
    let server = test_server(&db);

    let response = server.post(SURVEY_PATH).form(&fixture.valid_answers()).await;

    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.text(), "Cookies must be enabled.");
    assert_eq!(answer_count(&db, &fixture).await, 0);
}

#[tokio::test]
async fn test_valid_submission_stores_one_interview() {
    let db = test_db().await;
    let fixture = seed_survey(&db, |_| {}).await;
    let server = test_server(&db);
    let cookie = open_session(&server).await;

    let response = server
        .post(SURVEY_PATH)
        .add_cookie(cookie.clone())
        .form(&fixture.valid_answers())
        .await;

    // Anonymous respondent on a private survey lands on their own submission.
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        format!("{}/{}", RESULTS_PATH, cookie.value())
    );

    // Name, color and two toppings; the skipped comment stores nothing.
    let answers = db.answers_for_survey(fixture.survey.id).await.unwrap();
    assert_eq!(answers.len(), 4);
    let interview = answers[0].interview_uuid;
    assert!(answers.iter().all(|a| a.interview_uuid == interview));
    assert!(answers.iter().all(|a| a.session_key == cookie.value()));

    let toppings: Vec<&str> = answers
        .iter()
        .filter(|a| a.question_id == fixture.toppings.id)
        .map(|a| a.text.as_str())
        .collect();
    assert_eq!(toppings, vec!["Cheese", "Basil"]);
    assert!(answers.iter().any(|a| a.question_id == fixture.color.id && a.text == "Green"));
}

#[tokio::test]
async fn test_second_submission_is_redirected_without_new_answers() {
    let db = test_db().await;
    let fixture = seed_survey(&db, |_| {}).await;
    let server = test_server(&db);
    let cookie = open_session(&server).await;

    server
        .post(SURVEY_PATH)
        .add_cookie(cookie.clone())
        .form(&fixture.valid_answers())
        .await
        .assert_status(StatusCode::SEE_OTHER);
    assert_eq!(answer_count(&db, &fixture).await, 4);

    let again = server
        .post(SURVEY_PATH)
        .add_cookie(cookie.clone())
        .form(&fixture.valid_answers())
        .await;
    again.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(answer_count(&db, &fixture).await, 4);

    // Reopening the form is redirected the same way.
    let form = server.get(SURVEY_PATH).add_cookie(cookie.clone()).await;
    form.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(location(&form), format!("{}/{}", RESULTS_PATH, cookie.value()));
}

#[tokio::test]
async fn test_multiple_interviews_allowed() {
    let db = test_db().await;
    let fixture = seed_survey(&db, |s| s.allows_multiple_interviews = true).await;
    let server = test_server(&db);
    let cookie = open_session(&server).await;

    for _ in 0..2 {
        server
            .post(SURVEY_PATH)
            .add_cookie(cookie.clone())
            .form(&fixture.valid_answers())
            .await
            .assert_status(StatusCode::SEE_OTHER);
    }

    let answers = db.answers_for_survey(fixture.survey.id).await.unwrap();
    assert_eq!(answers.len(), 8);
    assert_ne!(answers[0].interview_uuid, answers[7].interview_uuid);
}

#[tokio::test]
async fn test_invalid_submission_returns_form_errors() {
    let db = test_db().await;
    let fixture = seed_survey(&db, |_| {}).await;
    let server = test_server(&db);
    let cookie = open_session(&server).await;

    let data = vec![
        (fixture.field(&fixture.color), "not-a-choice".to_string()),
        (fixture.field(&fixture.toppings), fixture.topping_choices[0].id.to_string()),
        (fixture.field(&fixture.toppings), fixture.topping_choices[1].id.to_string()),
        (fixture.field(&fixture.toppings), fixture.topping_choices[2].id.to_string()),
    ];
    let response = server.post(SURVEY_PATH).add_cookie(cookie).form(&data).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    let fields = body["data"]["fields"].as_array().unwrap();
    assert_eq!(fields[0]["errors"][0], "This field is required.");
    assert_eq!(
        fields[1]["errors"][0],
        "Select a valid choice. not-a-choice is not one of the available choices."
    );
    assert_eq!(fields[2]["errors"][0], "Select at most 2 choices.");
    assert!(fields[3].get("errors").is_none());
    assert_eq!(answer_count(&db, &fixture).await, 0);
}

#[tokio::test]
async fn test_next_parameter_is_followed() {
    let db = test_db().await;
    let fixture = seed_survey(&db, |_| {}).await;
    let server = test_server(&db);
    let cookie = open_session(&server).await;

    let response = server
        .post(&format!("{}?next=/thanks", SURVEY_PATH))
        .add_cookie(cookie)
        .form(&fixture.valid_answers())
        .await;

    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/thanks");
}

#[tokio::test]
async fn test_public_survey_redirects_to_results() {
    let db = test_db().await;
    let fixture = seed_survey(&db, |s| s.public = true).await;
    let server = test_server(&db);
    let cookie = open_session(&server).await;

    let response = server
        .post(SURVEY_PATH)
        .add_cookie(cookie)
        .form(&fixture.valid_answers())
        .await;

    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(location(&response), RESULTS_PATH);

    let results = server.get(RESULTS_PATH).await;
    results.assert_status_ok();
    let body: Value = results.json();
    assert_eq!(body["data"]["title"], "Customer Feedback - Results");
    assert_eq!(body["data"]["submission_count"], 1);
    assert_eq!(body["data"]["answer_count"], 4);
    assert_eq!(body["data"]["view_submissions"], false);
    assert!(body["data"].get("submissions").is_none());

    let color = &body["data"]["questions"][1];
    assert_eq!(color["answer_count"], 1);
    assert_eq!(color["choices"][1]["text"], "Green");
    assert_eq!(color["choices"][1]["count"], 1);
    assert_eq!(body["data"]["questions"][0]["responses"][0], "Ada");
}

#[tokio::test]
async fn test_closed_survey() {
    let db = test_db().await;
    seed_survey(&db, |s| {
        s.opens = s.opens - chrono::Duration::days(30);
        s.closes = s.opens + chrono::Duration::days(1);
    })
    .await;
    let server = test_server(&db);
    server.get(SURVEY_PATH).await.assert_status(StatusCode::NOT_FOUND);

    let listed: Value = server.get("/api/surveys").await.json();
    assert_eq!(listed["data"][0]["status"], "closed");

    let public_db = test_db().await;
    seed_survey(&public_db, |s| {
        s.public = true;
        s.closes = s.opens;
        s.opens = s.opens - chrono::Duration::days(1);
    })
    .await;
    let response = test_server(&public_db).get(SURVEY_PATH).await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(location(&response), RESULTS_PATH);
}

#[tokio::test]
async fn test_restricted_survey_requires_login() {
    let db = test_db().await;
    seed_survey(&db, |s| s.restricted = true).await;
    let staff = seed_user(&db, "staff", |_| {}).await;
    let server = test_server(&db);

    let response = server.get(SURVEY_PATH).await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/login?next={}", SURVEY_PATH));

    server
        .get(SURVEY_PATH)
        .add_header(header::AUTHORIZATION, bearer(&staff))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_results_require_permission() {
    let db = test_db().await;
    let fixture = seed_survey(&db, |_| {}).await;
    let analyst = seed_user(&db, "analyst", |u| u.can_view_answers = true).await;
    let reviewer = seed_user(&db, "reviewer", |u| {
        u.can_view_answers = true;
        u.can_view_submissions = true;
    })
    .await;
    let server = test_server(&db);

    let response = server.get(RESULTS_PATH).await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.text(), "Insufficient Privileges.");

    // Once answered, the respondent is sent to their own submission instead.
    let cookie = open_session(&server).await;
    server
        .post(SURVEY_PATH)
        .add_cookie(cookie.clone())
        .form(&fixture.valid_answers())
        .await
        .assert_status(StatusCode::SEE_OTHER);
    let response = server.get(RESULTS_PATH).add_cookie(cookie.clone()).await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("{}/{}", RESULTS_PATH, cookie.value()));

    let response = server
        .get(RESULTS_PATH)
        .add_header(header::AUTHORIZATION, bearer(&analyst))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["view_submissions"], false);

    let response = server
        .get(RESULTS_PATH)
        .add_header(header::AUTHORIZATION, bearer(&reviewer))
        .await;
    let body: Value = response.json();
    assert_eq!(body["data"]["view_submissions"], true);
    assert_eq!(body["data"]["submissions"][0]["session_key"], cookie.value());
}

#[tokio::test]
async fn test_results_from_another_browser_are_not_redirected() {
    let db = test_db().await;
    let fixture = seed_survey(&db, |_| {}).await;
    let member = seed_user(&db, "member", |_| {}).await;
    let server = test_server(&db);

    let first_browser = open_session(&server).await;
    server
        .post(SURVEY_PATH)
        .add_cookie(first_browser.clone())
        .add_header(header::AUTHORIZATION, bearer(&member))
        .form(&fixture.valid_answers())
        .await
        .assert_status(StatusCode::SEE_OTHER);

    // Same account, fresh browser: this session has no submission to show.
    let second_browser = open_session(&server).await;
    assert_ne!(second_browser.value(), first_browser.value());
    let response = server
        .get(RESULTS_PATH)
        .add_cookie(second_browser.clone())
        .add_header(header::AUTHORIZATION, bearer(&member))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.text(), "Insufficient Privileges.");

    let response = server
        .get(RESULTS_PATH)
        .add_cookie(first_browser.clone())
        .add_header(header::AUTHORIZATION, bearer(&member))
        .await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        format!("{}/{}", RESULTS_PATH, first_browser.value())
    );
}

#[tokio::test]
async fn test_submission_detail_access() {
    let db = test_db().await;
    let fixture = seed_survey(&db, |_| {}).await;
    let reviewer = seed_user(&db, "reviewer", |u| {
        u.can_view_answers = true;
        u.can_view_submissions = true;
    })
    .await;
    let server = test_server(&db);

    let cookie = open_session(&server).await;
    server
        .post(SURVEY_PATH)
        .add_cookie(cookie.clone())
        .form(&fixture.valid_answers())
        .await;
    let own_path = format!("{}/{}", RESULTS_PATH, cookie.value());

    let response = server.get(&own_path).add_cookie(cookie.clone()).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["title"], "Customer Feedback - Submission");
    let interview = &body["data"]["interviews"][0];
    assert_eq!(interview["answers"][0]["question"], "Your name");
    assert_eq!(interview["answers"][2]["answers"], json!(["Cheese", "Basil"]));

    // Another browser may not read it.
    let stranger = open_session(&server).await;
    let response = server.get(&own_path).add_cookie(stranger).await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.text(), "Insufficient Privileges.");

    server
        .get(&own_path)
        .add_header(header::AUTHORIZATION, bearer(&reviewer))
        .await
        .assert_status_ok();

    server
        .get(&format!("{}/not-hex", RESULTS_PATH))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .get(&format!("{}/0123456789abcdef", RESULTS_PATH))
        .add_header(header::AUTHORIZATION, bearer(&reviewer))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_login_and_logout() {
    let db = test_db().await;
    seed_user(&db, "staff", with_password("correct horse")).await;
    let server = test_server(&db);

    server
        .post("/api/auth/login")
        .json(&json!({ "username": "staff", "password": "wrong" }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let response = server
        .post("/api/auth/login")
        .json(&json!({ "username": "staff", "password": "correct horse" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let token = body["data"]["token"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["user"]["username"], "staff");
    assert!(body["data"]["user"].get("password_hash").is_none());

    let auth = axum::http::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap();
    server
        .get("/api/admin/surveys")
        .add_header(header::AUTHORIZATION, auth.clone())
        .await
        .assert_status_ok();

    server
        .post("/api/auth/logout")
        .add_header(header::AUTHORIZATION, auth.clone())
        .await
        .assert_status_ok();
    server
        .get("/api/admin/surveys")
        .add_header(header::AUTHORIZATION, auth)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}
