use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// How long a closed survey keeps its cached status.
pub const CLOSED_STATUS_TTL_SECONDS: i64 = 60 * 60 * 24 * 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Text,
    Textarea,
    Select,
    Radio,
    Image,
    Checkbox,
    Grid,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Text => "text",
            QuestionType::Textarea => "textarea",
            QuestionType::Select => "select",
            QuestionType::Radio => "radio",
            QuestionType::Image => "image",
            QuestionType::Checkbox => "checkbox",
            QuestionType::Grid => "grid",
        }
    }

    /// Whether answers are picked from a choice group.
    pub fn uses_choices(&self) -> bool {
        !matches!(self, QuestionType::Text | QuestionType::Textarea)
    }

    pub fn allows_multiple(&self) -> bool {
        matches!(self, QuestionType::Checkbox)
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(QuestionType::Text),
            "textarea" => Ok(QuestionType::Textarea),
            "select" => Ok(QuestionType::Select),
            "radio" => Ok(QuestionType::Radio),
            "image" => Ok(QuestionType::Image),
            "checkbox" => Ok(QuestionType::Checkbox),
            "grid" => Ok(QuestionType::Grid),
            other => Err(anyhow::anyhow!("Unknown question type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Questionnaire {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub questionnaire_id: Uuid,
    pub qtype: QuestionType,
    pub text: String,
    pub required: bool,
    pub order: i32,
    pub image: Option<String>,
    pub choice_group_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceGroup {
    pub id: Uuid,
    pub name: String,
    pub min_selected: Option<i32>,
    pub max_selected: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub id: Uuid,
    pub choice_group_id: Uuid,
    pub text: String,
    pub image: Option<String>,
    pub order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Survey {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub questionnaire_id: Uuid,
    pub opens: DateTime<Utc>,
    pub closes: DateTime<Utc>,
    pub visible: bool,
    pub public: bool,
    pub restricted: bool,
    pub allows_multiple_interviews: bool,
    pub created_by: Option<Uuid>,
    pub editable_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Where a survey's submission window stands at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurveyWindow {
    Pending,
    Open,
    Closed,
}

impl Survey {
    pub fn window_at(&self, now: DateTime<Utc>) -> SurveyWindow {
        if now < self.opens {
            SurveyWindow::Pending
        } else if now < self.closes {
            SurveyWindow::Open
        } else {
            SurveyWindow::Closed
        }
    }

    /// Open iff visible and `opens <= now < closes`.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.visible && self.window_at(now) == SurveyWindow::Open
    }

    /// How long the status computed at `now` stays valid.
    pub fn status_ttl_at(&self, now: DateTime<Utc>) -> Duration {
        match self.window_at(now) {
            SurveyWindow::Pending => self.opens - now,
            SurveyWindow::Open => self.closes - now,
            SurveyWindow::Closed => Duration::seconds(CLOSED_STATUS_TTL_SECONDS),
        }
    }

    /// Human readable status label shown in survey listings.
    pub fn status_at(&self, now: DateTime<Utc>) -> String {
        if !self.visible {
            return String::new();
        }
        match self.window_at(now) {
            SurveyWindow::Open => "open".to_string(),
            SurveyWindow::Pending => format!("opens {}", self.opens.format("%b. %-d, %Y")),
            SurveyWindow::Closed => "closed".to_string(),
        }
    }

    pub fn is_editable_by(&self, user: &User) -> bool {
        user.is_superuser
            || self.created_by == Some(user.id)
            || self.editable_by == Some(user.id)
    }

    /// Results are visible to everyone when public, otherwise only to
    /// authenticated users holding the `view_answers` permission.
    pub fn answers_viewable_by(&self, user: Option<&User>) -> bool {
        if !self.visible {
            return false;
        }
        if self.public {
            return true;
        }
        match user {
            Some(user) => user.has_perm(Permission::ViewAnswers),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub question_id: Uuid,
    pub session_key: String,
    pub user_id: Option<Uuid>,
    pub interview_uuid: Uuid,
    pub text: String,
    pub submission_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ViewAnswers,
    ViewSubmissions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_superuser: bool,
    pub can_view_answers: bool,
    pub can_view_submissions: bool,
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl User {
    pub fn has_perm(&self, permission: Permission) -> bool {
        if self.is_superuser {
            return true;
        }
        match permission {
            Permission::ViewAnswers => self.can_view_answers,
            Permission::ViewSubmissions => self.can_view_submissions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_key: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// Admin request payloads

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQuestionnaireRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateQuestionnaireRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQuestionRequest {
    pub qtype: QuestionType,
    pub text: String,
    #[serde(default = "default_true")]
    pub required: bool,
    pub order: Option<i32>,
    pub image: Option<String>,
    pub choice_group_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateQuestionRequest {
    pub qtype: Option<QuestionType>,
    pub text: Option<String>,
    pub required: Option<bool>,
    pub order: Option<i32>,
    /// Absent leaves the image alone, `null` removes it.
    #[serde(default, deserialize_with = "explicit_null", skip_serializing_if = "Option::is_none")]
    pub image: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit_null", skip_serializing_if = "Option::is_none")]
    pub choice_group_id: Option<Option<Uuid>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChoiceGroupRequest {
    pub name: String,
    pub min_selected: Option<i32>,
    pub max_selected: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateChoiceGroupRequest {
    pub name: Option<String>,
    pub min_selected: Option<i32>,
    pub max_selected: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChoiceRequest {
    pub text: String,
    pub image: Option<String>,
    pub order: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateChoiceRequest {
    pub text: Option<String>,
    pub image: Option<String>,
    pub order: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSurveyRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub questionnaire_id: Uuid,
    pub opens: DateTime<Utc>,
    pub closes: DateTime<Utc>,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub restricted: bool,
    #[serde(default)]
    pub allows_multiple_interviews: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSurveyRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub questionnaire_id: Option<Uuid>,
    pub opens: Option<DateTime<Utc>>,
    pub closes: Option<DateTime<Utc>>,
    pub visible: Option<bool>,
    pub public: Option<bool>,
    pub restricted: Option<bool>,
    pub allows_multiple_interviews: Option<bool>,
}

fn default_true() -> bool {
    true
}

/// Tells a `null` field (`Some(None)`) apart from a missing one (`None`,
/// via `#[serde(default)]`).
fn explicit_null<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Lower-case, ASCII-only slug: runs of anything other than letters, digits,
/// `-` and `_` collapse into a single hyphen.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_hyphen = false;
    for c in value.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() || c == '-' {
            pending_hyphen = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn survey(visible: bool, opens: DateTime<Utc>, closes: DateTime<Utc>) -> Survey {
        Survey {
            id: Uuid::new_v4(),
            slug: "test".to_string(),
            title: "Test".to_string(),
            description: String::new(),
            questionnaire_id: Uuid::new_v4(),
            opens,
            closes,
            visible,
            public: false,
            restricted: false,
            allows_multiple_interviews: false,
            created_by: None,
            editable_by: None,
            created_at: opens,
        }
    }

    fn user(view_answers: bool) -> User {
        User {
            id: Uuid::new_v4(),
            username: "staff".to_string(),
            password_hash: String::new(),
            is_superuser: false,
            can_view_answers: view_answers,
            can_view_submissions: false,
            token: None,
        }
    }

    #[test]
    fn test_open_window_is_half_open() {
        let opens = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let closes = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let s = survey(true, opens, closes);

        assert!(!s.is_open_at(opens - Duration::seconds(1)));
        assert!(s.is_open_at(opens));
        assert!(s.is_open_at(closes - Duration::seconds(1)));
        assert!(!s.is_open_at(closes));
    }

    #[test]
    fn test_invisible_survey_is_never_open() {
        let opens = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let s = survey(false, opens, opens + Duration::days(10));
        assert!(!s.is_open_at(opens + Duration::days(1)));
        assert_eq!(s.status_at(opens + Duration::days(1)), "");
    }

    #[test]
    fn test_status_labels() {
        let opens = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
        let s = survey(true, opens, opens + Duration::days(7));

        assert_eq!(s.status_at(opens - Duration::days(1)), "opens Mar. 5, 2024");
        assert_eq!(s.status_at(opens + Duration::days(1)), "open");
        assert_eq!(s.status_at(opens + Duration::days(8)), "closed");
    }

    #[test]
    fn test_status_ttl_follows_window() {
        let opens = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let closes = opens + Duration::days(2);
        let s = survey(true, opens, closes);

        assert_eq!(s.status_ttl_at(opens - Duration::hours(3)), Duration::hours(3));
        assert_eq!(s.status_ttl_at(opens + Duration::days(1)), Duration::days(1));
        assert_eq!(
            s.status_ttl_at(closes + Duration::days(1)),
            Duration::seconds(CLOSED_STATUS_TTL_SECONDS)
        );
    }

    #[test]
    fn test_answers_viewable_by() {
        let now = Utc::now();
        let mut s = survey(true, now, now + Duration::days(1));

        assert!(!s.answers_viewable_by(None));
        assert!(!s.answers_viewable_by(Some(&user(false))));
        assert!(s.answers_viewable_by(Some(&user(true))));

        s.public = true;
        assert!(s.answers_viewable_by(None));

        s.visible = false;
        assert!(!s.answers_viewable_by(Some(&user(true))));
    }

    #[test]
    fn test_superuser_holds_every_permission() {
        let mut admin = user(false);
        admin.is_superuser = true;
        assert!(admin.has_perm(Permission::ViewAnswers));
        assert!(admin.has_perm(Permission::ViewSubmissions));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Example Survey"), "example-survey");
        assert_eq!(slugify("  Café & Bar: 2024!  "), "caf-bar-2024");
        assert_eq!(slugify("already-slugged_name"), "already-slugged_name");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn test_question_type_round_trip_names() {
        for qtype in [
            QuestionType::Text,
            QuestionType::Textarea,
            QuestionType::Select,
            QuestionType::Radio,
            QuestionType::Image,
            QuestionType::Checkbox,
            QuestionType::Grid,
        ] {
            assert_eq!(qtype.as_str().parse::<QuestionType>().unwrap(), qtype);
        }
        assert!("bogus".parse::<QuestionType>().is_err());
        assert!(!QuestionType::Textarea.uses_choices());
        assert!(QuestionType::Grid.uses_choices());
    }

    #[test]
    fn test_update_question_null_differs_from_missing() {
        let request: UpdateQuestionRequest =
            serde_json::from_str(r#"{"text": "Size?", "image": null}"#).unwrap();
        assert_eq!(request.image, Some(None));
        assert_eq!(request.choice_group_id, None);

        let group = Uuid::new_v4();
        let request: UpdateQuestionRequest =
            serde_json::from_value(serde_json::json!({ "choice_group_id": group })).unwrap();
        assert_eq!(request.choice_group_id, Some(Some(group)));
        assert_eq!(request.image, None);
    }
}
