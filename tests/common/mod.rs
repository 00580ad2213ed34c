#![allow(dead_code)]

use axum::http::HeaderValue;
use axum_test::TestServer;
use chrono::{Duration, Utc};
use survey_tool::{
    auth::hash_password, create_router, config::SurveyConfig, forms::field_name, AppState, Choice,
    CreateChoiceGroupRequest, CreateChoiceRequest, CreateQuestionRequest, CreateQuestionnaireRequest,
    Database, Question, QuestionType, Survey, User,
};
use uuid::Uuid;

pub const SLUG: &str = "customer-feedback";
pub const SURVEY_PATH: &str = "/api/surveys/customer-feedback";
pub const RESULTS_PATH: &str = "/api/surveys/customer-feedback/answers";

pub struct Fixture {
    pub survey: Survey,
    pub name: Question,
    pub color: Question,
    pub toppings: Question,
    pub comment: Question,
    pub colors: Vec<Choice>,
    pub topping_choices: Vec<Choice>,
}

impl Fixture {
    /// A complete submission: name, one color, two toppings, no comment.
    pub fn valid_answers(&self) -> Vec<(String, String)> {
        vec![
            (self.field(&self.name), "Ada".to_string()),
            (self.field(&self.color), self.colors[1].id.to_string()),
            (self.field(&self.toppings), self.topping_choices[0].id.to_string()),
            (self.field(&self.toppings), self.topping_choices[2].id.to_string()),
        ]
    }

    pub fn field(&self, question: &Question) -> String {
        field_name(self.survey.id, question.id)
    }
}

pub async fn test_db() -> Database {
    Database::new("sqlite::memory:").await.unwrap()
}

pub fn test_server(db: &Database) -> TestServer {
    let state = AppState::new(db.clone(), &SurveyConfig::default());
    TestServer::new(create_router(state)).unwrap()
}

async fn add_choices(db: &Database, group_id: Uuid, texts: &[&str]) -> Vec<Choice> {
    let mut choices = Vec::new();
    for text in texts {
        choices.push(
            db.create_choice(
                group_id,
                CreateChoiceRequest {
                    text: text.to_string(),
                    image: None,
                    order: None,
                },
            )
            .await
            .unwrap(),
        );
    }
    choices
}

async fn add_question(
    db: &Database,
    questionnaire_id: Uuid,
    qtype: QuestionType,
    text: &str,
    required: bool,
    choice_group_id: Option<Uuid>,
) -> Question {
    db.create_question(
        questionnaire_id,
        CreateQuestionRequest {
            qtype,
            text: text.to_string(),
            required,
            order: None,
            image: None,
            choice_group_id,
        },
    )
    .await
    .unwrap()
}

/// Seeds an open, visible survey with four questions. `customize` adjusts
/// the survey before it is stored.
pub async fn seed_survey(db: &Database, customize: impl FnOnce(&mut Survey)) -> Fixture {
    let questionnaire = db
        .create_questionnaire(CreateQuestionnaireRequest {
            name: "Feedback".to_string(),
            description: "General feedback".to_string(),
        })
        .await
        .unwrap();

    let color_group = db
        .create_choice_group(CreateChoiceGroupRequest {
            name: "Colors".to_string(),
            min_selected: None,
            max_selected: None,
        })
        .await
        .unwrap();
    let colors = add_choices(db, color_group.id, &["Red", "Green", "Blue"]).await;

    let topping_group = db
        .create_choice_group(CreateChoiceGroupRequest {
            name: "Toppings".to_string(),
            min_selected: Some(1),
            max_selected: Some(2),
        })
        .await
        .unwrap();
    let topping_choices = add_choices(db, topping_group.id, &["Cheese", "Olives", "Basil"]).await;

    let name = add_question(db, questionnaire.id, QuestionType::Text, "Your name", true, None).await;
    let color = add_question(db, questionnaire.id, QuestionType::Radio, "Favourite color", true, Some(color_group.id)).await;
    let toppings = add_question(db, questionnaire.id, QuestionType::Checkbox, "Toppings", true, Some(topping_group.id)).await;
    let comment = add_question(db, questionnaire.id, QuestionType::Textarea, "Anything else?", false, None).await;

    let now = Utc::now();
    let mut survey = Survey {
        id: Uuid::new_v4(),
        slug: SLUG.to_string(),
        title: "Customer Feedback".to_string(),
        description: "Tell us what you think".to_string(),
        questionnaire_id: questionnaire.id,
        opens: now - Duration::days(1),
        closes: now + Duration::days(7),
        visible: true,
        public: false,
        restricted: false,
        allows_multiple_interviews: false,
        created_by: None,
        editable_by: None,
        created_at: now,
    };
    customize(&mut survey);
    db.insert_survey(&survey).await.unwrap();

    Fixture {
        survey,
        name,
        color,
        toppings,
        comment,
        colors,
        topping_choices,
    }
}

/// Stores a user whose bearer token is `<username>-token`. The password
/// hash is unusable unless `customize` sets one.
pub async fn seed_user(db: &Database, username: &str, customize: impl FnOnce(&mut User)) -> User {
    let mut user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        password_hash: "unusable".to_string(),
        is_superuser: false,
        can_view_answers: false,
        can_view_submissions: false,
        token: Some(format!("{}-token", username)),
    };
    customize(&mut user);
    db.insert_user(&user).await.unwrap();
    user
}

pub fn bearer(user: &User) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", user.token.as_deref().unwrap())).unwrap()
}

pub fn with_password(password: &str) -> impl FnOnce(&mut User) {
    let hash = hash_password(password).unwrap();
    move |user: &mut User| user.password_hash = hash
}
