use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::Database;
use crate::errors::ApiError;
use crate::forms::{AnswerField, SurveyForm};
use crate::models::*;
use crate::status_cache::StatusCache;
use crate::{log_service_error, log_service_start, log_service_success, log_service_warn, log_validation};

#[derive(Debug, Clone, Serialize)]
pub struct SurveySummary {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub opens: DateTime<Utc>,
    pub closes: DateTime<Utc>,
    pub status: String,
    pub open: bool,
    pub has_answered: bool,
    pub can_view_answers: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionDetail {
    #[serde(flatten)]
    pub question: Question,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionnaireDetail {
    #[serde(flatten)]
    pub questionnaire: Questionnaire,
    pub questions: Vec<QuestionDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SurveyDetail {
    #[serde(flatten)]
    pub survey: Survey,
    pub status: String,
    pub open: bool,
    pub questionnaire: QuestionnaireDetail,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChoiceGroupDetail {
    #[serde(flatten)]
    pub group: ChoiceGroup,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChoiceCount {
    pub choice_id: Uuid,
    pub text: String,
    pub image: Option<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionResults {
    pub question_id: Uuid,
    pub text: String,
    pub qtype: QuestionType,
    pub answer_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<ChoiceCount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub responses: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionSummary {
    pub interview_uuid: Uuid,
    pub session_key: String,
    pub submitted_at: DateTime<Utc>,
    pub answer_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SurveyResults {
    pub survey_id: Uuid,
    pub slug: String,
    pub title: String,
    pub submission_count: usize,
    pub answer_count: usize,
    pub questions: Vec<QuestionResults>,
    pub view_submissions: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submissions: Option<Vec<SubmissionSummary>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnsweredQuestion {
    pub question_id: Uuid,
    pub question: String,
    pub answers: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Interview {
    pub interview_uuid: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub answers: Vec<AnsweredQuestion>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionDetail {
    pub survey_id: Uuid,
    pub slug: String,
    pub title: String,
    pub session_key: String,
    pub interviews: Vec<Interview>,
}

#[derive(Debug)]
pub enum SubmissionOutcome {
    /// Form redisplayed with per-field errors; nothing was stored.
    Invalid(SurveyForm),
    Saved { interview_uuid: Uuid, answer_count: usize },
}

/// Where a respondent goes once they have submitted (or already answered).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    Next(String),
    Results,
    OwnSubmission(String),
    ThankYou,
}

/// Who is asking, as far as survey logic is concerned.
#[derive(Debug, Clone, Copy)]
pub struct Respondent<'a> {
    pub user: Option<&'a User>,
    pub session_key: Option<&'a str>,
}

fn validation(message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(ApiError::ValidationError(message.into()))
}

fn not_found(message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(ApiError::NotFound(message.into()))
}

fn forbidden(message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(ApiError::Forbidden(message.into()))
}

/// `next` is followed when it is an absolute http(s) URL or a site-relative
/// path, and is not the page the respondent is already on.
pub fn acceptable_next(next: &str, current_path: &str) -> bool {
    let absolute = next.starts_with("http://") || next.starts_with("https://");
    let relative = next.starts_with('/') && !next.starts_with("//");
    (absolute || relative) && next != current_path
}

#[derive(Clone)]
pub struct SurveyService {
    db: Database,
    status_cache: StatusCache,
}

impl SurveyService {
    pub fn new(db: Database, status_cache: StatusCache) -> Self {
        Self { db, status_cache }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // Survey status

    /// Cached `open` flag: visible and `opens <= now < closes`.
    pub async fn is_open(&self, survey: &Survey) -> bool {
        self.is_open_at(survey, Utc::now()).await
    }

    pub async fn is_open_at(&self, survey: &Survey, now: DateTime<Utc>) -> bool {
        if !survey.visible {
            return false;
        }
        if let Some(open) = self.status_cache.get(survey.id, now).await {
            return open;
        }

        let open = survey.is_open_at(now);
        self.status_cache
            .store(survey.id, open, survey.status_ttl_at(now), now)
            .await;
        open
    }

    async fn summarize(&self, survey: &Survey, respondent: Respondent<'_>) -> Result<SurveySummary> {
        let now = Utc::now();
        let has_answered = match respondent.session_key {
            Some(key) => {
                self.db
                    .has_answers_from(survey.id, key, respondent.user.map(|u| u.id))
                    .await?
            }
            None => false,
        };

        Ok(SurveySummary {
            id: survey.id,
            slug: survey.slug.clone(),
            title: survey.title.clone(),
            description: survey.description.clone(),
            opens: survey.opens,
            closes: survey.closes,
            status: survey.status_at(now),
            open: self.is_open_at(survey, now).await,
            has_answered,
            can_view_answers: survey.answers_viewable_by(respondent.user),
        })
    }

    pub async fn list_visible_surveys(&self, respondent: Respondent<'_>) -> Result<Vec<SurveySummary>> {
        let surveys = self.db.list_visible_surveys().await?;
        let mut summaries = Vec::with_capacity(surveys.len());
        for survey in &surveys {
            summaries.push(self.summarize(survey, respondent).await?);
        }
        Ok(summaries)
    }

    pub async fn list_editable_surveys(&self, user: &User) -> Result<Vec<SurveySummary>> {
        let surveys = self.db.list_editable_surveys(user.id).await?;
        let respondent = Respondent {
            user: Some(user),
            session_key: None,
        };
        let mut summaries = Vec::with_capacity(surveys.len());
        for survey in &surveys {
            summaries.push(self.summarize(survey, respondent).await?);
        }
        Ok(summaries)
    }

    pub async fn get_visible_survey(&self, slug: &str) -> Result<Option<Survey>> {
        Ok(self
            .db
            .get_survey_by_slug(slug)
            .await?
            .filter(|survey| survey.visible))
    }

    pub async fn has_answers_from(&self, survey: &Survey, respondent: Respondent<'_>) -> Result<bool> {
        match respondent.session_key {
            Some(key) => {
                self.db
                    .has_answers_from(survey.id, key, respondent.user.map(|u| u.id))
                    .await
            }
            None => Ok(false),
        }
    }

    // Answering

    pub async fn build_form(&self, survey: &Survey) -> Result<SurveyForm> {
        let questions = self.db.list_questions(survey.questionnaire_id).await?;
        let mut groups: HashMap<Uuid, (ChoiceGroup, Vec<Choice>)> = HashMap::new();
        let mut fields = Vec::with_capacity(questions.len());

        for question in &questions {
            let entry = match question.choice_group_id {
                Some(group_id) if question.qtype.uses_choices() => {
                    if !groups.contains_key(&group_id) {
                        match self.db.get_choice_group(group_id).await? {
                            Some(group) => {
                                let choices = self.db.list_choices(group_id).await?;
                                groups.insert(group_id, (group, choices));
                            }
                            None => {
                                log_service_warn!(
                                    "survey_service",
                                    "build_form",
                                    format!("question {} references missing choice group {}", question.id, group_id)
                                );
                            }
                        }
                    }
                    groups.get(&group_id)
                }
                _ => None,
            };

            let field = match entry {
                Some((group, choices)) => AnswerField::for_question(survey.id, question, Some(group), choices),
                None => AnswerField::for_question(survey.id, question, None, &[]),
            };
            fields.push(field);
        }

        Ok(SurveyForm::new(survey, fields))
    }

    /// Validate a submission and, when valid, store every answer under one
    /// new interview.
    pub async fn submit(
        &self,
        survey: &Survey,
        data: &[(String, String)],
        session_key: &str,
        user: Option<&User>,
    ) -> Result<SubmissionOutcome> {
        log_service_start!("survey_service", "submit", survey_id = survey.id);

        let mut form = self.build_form(survey).await?;
        let cleaned = match form.bind(data) {
            Some(cleaned) => cleaned,
            None => {
                log_validation!(failure, "answer_form", error = format!("{} invalid fields", form.error_count()));
                return Ok(SubmissionOutcome::Invalid(form));
            }
        };

        let interview_uuid = Uuid::new_v4();
        let now = Utc::now();
        let session_key = session_key.to_lowercase();
        let answers: Vec<Answer> = cleaned
            .into_iter()
            .flat_map(|answer| {
                let question_id = answer.question_id;
                answer.texts.into_iter().map(move |text| (question_id, text))
            })
            .map(|(question_id, text)| Answer {
                id: Uuid::new_v4(),
                survey_id: survey.id,
                question_id,
                session_key: session_key.clone(),
                user_id: user.map(|u| u.id),
                interview_uuid,
                text,
                submission_date: now,
            })
            .collect();

        if let Err(e) = self.db.insert_answers(&answers).await {
            log_service_error!("survey_service", "submit", survey_id = survey.id, error = e);
            return Err(e);
        }
        log_service_success!("survey_service", "submit", survey_id = survey.id, answer_count = answers.len());

        Ok(SubmissionOutcome::Saved {
            interview_uuid,
            answer_count: answers.len(),
        })
    }

    /// Pick where to send the respondent: an acceptable `next`, the results
    /// page when they may see it, their own submission when they have one,
    /// or a thank-you page.
    pub async fn redirect_target(
        &self,
        survey: &Survey,
        respondent: Respondent<'_>,
        next: Option<&str>,
        current_path: &str,
    ) -> Result<RedirectTarget> {
        if let Some(next) = next {
            if acceptable_next(next, current_path) {
                return Ok(RedirectTarget::Next(next.to_string()));
            }
        }

        if survey.answers_viewable_by(respondent.user) {
            return Ok(RedirectTarget::Results);
        }

        if let Some(key) = respondent.session_key {
            if !self.db.answers_for_session(survey.id, key).await?.is_empty() {
                return Ok(RedirectTarget::OwnSubmission(key.to_lowercase()));
            }
        }

        Ok(RedirectTarget::ThankYou)
    }

    // Results

    pub async fn results(&self, survey: &Survey, view_submissions: bool) -> Result<SurveyResults> {
        let questions = self.db.list_questions(survey.questionnaire_id).await?;
        let answers = self.db.answers_for_survey(survey.id).await?;

        let mut by_question: HashMap<Uuid, Vec<&Answer>> = HashMap::new();
        for answer in &answers {
            by_question.entry(answer.question_id).or_default().push(answer);
        }

        let mut question_results = Vec::with_capacity(questions.len());
        for question in &questions {
            let answered = by_question.get(&question.id).map(Vec::as_slice).unwrap_or(&[]);

            let choices = match question.choice_group_id {
                Some(group_id) if question.qtype.uses_choices() => self
                    .db
                    .list_choices(group_id)
                    .await?
                    .into_iter()
                    .map(|choice| ChoiceCount {
                        count: answered.iter().filter(|a| a.text == choice.text).count(),
                        choice_id: choice.id,
                        text: choice.text,
                        image: choice.image,
                    })
                    .collect(),
                _ => Vec::new(),
            };

            let responses = if question.qtype.uses_choices() {
                Vec::new()
            } else {
                answered.iter().map(|a| a.text.clone()).collect()
            };

            question_results.push(QuestionResults {
                question_id: question.id,
                text: question.text.clone(),
                qtype: question.qtype,
                answer_count: answered.len(),
                choices,
                responses,
            });
        }

        let submissions = summarize_interviews(&answers);

        Ok(SurveyResults {
            survey_id: survey.id,
            slug: survey.slug.clone(),
            title: format!("{} - Results", survey.title),
            submission_count: submissions.len(),
            answer_count: answers.len(),
            questions: question_results,
            view_submissions,
            submissions: view_submissions.then_some(submissions),
        })
    }

    /// Every interview submitted under `session_key`, `None` when there are none.
    pub async fn submission(&self, survey: &Survey, session_key: &str) -> Result<Option<SubmissionDetail>> {
        let answers = self.db.answers_for_session(survey.id, session_key).await?;
        if answers.is_empty() {
            return Ok(None);
        }

        let questions = self.db.list_questions(survey.questionnaire_id).await?;
        let mut interviews: Vec<Interview> = Vec::new();

        for answer in &answers {
            let position = match interviews
                .iter()
                .position(|i| i.interview_uuid == answer.interview_uuid)
            {
                Some(position) => position,
                None => {
                    interviews.push(Interview {
                        interview_uuid: answer.interview_uuid,
                        submitted_at: answer.submission_date,
                        answers: Vec::new(),
                    });
                    interviews.len() - 1
                }
            };
            let interview = &mut interviews[position];

            match interview
                .answers
                .iter_mut()
                .find(|a| a.question_id == answer.question_id)
            {
                Some(existing) => existing.answers.push(answer.text.clone()),
                None => interview.answers.push(AnsweredQuestion {
                    question_id: answer.question_id,
                    question: questions
                        .iter()
                        .find(|q| q.id == answer.question_id)
                        .map(|q| q.text.clone())
                        .unwrap_or_default(),
                    answers: vec![answer.text.clone()],
                }),
            }
        }

        let order: HashMap<Uuid, usize> = questions.iter().enumerate().map(|(i, q)| (q.id, i)).collect();
        for interview in &mut interviews {
            interview
                .answers
                .sort_by_key(|a| order.get(&a.question_id).copied().unwrap_or(usize::MAX));
        }

        Ok(Some(SubmissionDetail {
            survey_id: survey.id,
            slug: survey.slug.clone(),
            title: format!("{} - Submission", survey.title),
            session_key: session_key.to_lowercase(),
            interviews,
        }))
    }

    // Survey administration

    pub async fn create_survey(&self, request: CreateSurveyRequest, owner: &User) -> Result<Survey> {
        let slug = slugify(&request.title);
        if slug.is_empty() {
            return Err(validation("Survey title must contain letters or digits"));
        }
        if request.closes <= request.opens {
            return Err(validation("Survey must close after it opens"));
        }
        if self.db.get_questionnaire(request.questionnaire_id).await?.is_none() {
            return Err(validation(format!("Questionnaire '{}' does not exist", request.questionnaire_id)));
        }

        let survey = Survey {
            id: Uuid::new_v4(),
            slug,
            title: request.title,
            description: request.description,
            questionnaire_id: request.questionnaire_id,
            opens: request.opens,
            closes: request.closes,
            visible: request.visible,
            public: request.public,
            restricted: request.restricted,
            allows_multiple_interviews: request.allows_multiple_interviews,
            created_by: Some(owner.id),
            editable_by: Some(owner.id),
            created_at: Utc::now(),
        };

        self.db.insert_survey(&survey).await?;
        self.status_cache.invalidate(survey.id).await;
        Ok(survey)
    }

    pub async fn survey_detail(&self, survey: Survey) -> Result<SurveyDetail> {
        let questionnaire = self
            .questionnaire_detail(survey.questionnaire_id)
            .await?
            .ok_or_else(|| not_found("Questionnaire not found"))?;
        let now = Utc::now();

        Ok(SurveyDetail {
            status: survey.status_at(now),
            open: self.is_open_at(&survey, now).await,
            survey,
            questionnaire,
        })
    }

    async fn editable_survey(&self, slug: &str, user: &User) -> Result<Survey> {
        let survey = self
            .db
            .get_survey_by_slug(slug)
            .await?
            .ok_or_else(|| not_found(format!("Survey '{}' not found", slug)))?;
        if !survey.is_editable_by(user) {
            return Err(forbidden("Insufficient Privileges."));
        }
        Ok(survey)
    }

    pub async fn update_survey(&self, slug: &str, request: UpdateSurveyRequest, user: &User) -> Result<Survey> {
        let mut survey = self.editable_survey(slug, user).await?;

        if let Some(title) = request.title {
            let new_slug = slugify(&title);
            if new_slug.is_empty() {
                return Err(validation("Survey title must contain letters or digits"));
            }
            survey.slug = new_slug;
            survey.title = title;
        }
        if let Some(description) = request.description {
            survey.description = description;
        }
        if let Some(questionnaire_id) = request.questionnaire_id {
            if self.db.get_questionnaire(questionnaire_id).await?.is_none() {
                return Err(validation(format!("Questionnaire '{}' does not exist", questionnaire_id)));
            }
            survey.questionnaire_id = questionnaire_id;
        }
        if let Some(opens) = request.opens {
            survey.opens = opens;
        }
        if let Some(closes) = request.closes {
            survey.closes = closes;
        }
        if survey.closes <= survey.opens {
            return Err(validation("Survey must close after it opens"));
        }
        if let Some(visible) = request.visible {
            survey.visible = visible;
        }
        if let Some(public) = request.public {
            survey.public = public;
        }
        if let Some(restricted) = request.restricted {
            survey.restricted = restricted;
        }
        if let Some(multiple) = request.allows_multiple_interviews {
            survey.allows_multiple_interviews = multiple;
        }
        survey.editable_by = Some(user.id);

        self.db.update_survey(&survey).await?;
        self.status_cache.invalidate(survey.id).await;
        Ok(survey)
    }

    pub async fn delete_survey(&self, slug: &str, user: &User) -> Result<()> {
        let survey = self.editable_survey(slug, user).await?;
        self.db.delete_survey(survey.id).await?;
        self.status_cache.invalidate(survey.id).await;
        Ok(())
    }

    // Questionnaires and questions

    pub async fn questionnaire_detail(&self, id: Uuid) -> Result<Option<QuestionnaireDetail>> {
        let questionnaire = match self.db.get_questionnaire(id).await? {
            Some(questionnaire) => questionnaire,
            None => return Ok(None),
        };

        let mut questions = Vec::new();
        for question in self.db.list_questions(id).await? {
            let choices = match question.choice_group_id {
                Some(group_id) => self.db.list_choices(group_id).await?,
                None => Vec::new(),
            };
            questions.push(QuestionDetail { question, choices });
        }

        Ok(Some(QuestionnaireDetail {
            questionnaire,
            questions,
        }))
    }

    pub async fn update_questionnaire(&self, id: Uuid, request: UpdateQuestionnaireRequest) -> Result<Option<Questionnaire>> {
        let mut questionnaire = match self.db.get_questionnaire(id).await? {
            Some(questionnaire) => questionnaire,
            None => return Ok(None),
        };
        if let Some(name) = request.name {
            questionnaire.name = name;
        }
        if let Some(description) = request.description {
            questionnaire.description = description;
        }
        self.db.update_questionnaire(&questionnaire).await?;
        Ok(Some(questionnaire))
    }

    async fn check_question_shape(&self, qtype: QuestionType, text: &str, choice_group_id: Option<Uuid>) -> Result<()> {
        if text.trim().is_empty() {
            return Err(validation("Question text must not be empty"));
        }
        match choice_group_id {
            Some(group_id) => {
                if self.db.get_choice_group(group_id).await?.is_none() {
                    return Err(validation(format!("Choice group '{}' does not exist", group_id)));
                }
            }
            None if qtype.uses_choices() => {
                return Err(validation(format!("A {} question needs a choice group", qtype)));
            }
            None => {}
        }
        Ok(())
    }

    pub async fn add_question(&self, questionnaire_id: Uuid, request: CreateQuestionRequest) -> Result<Question> {
        if self.db.get_questionnaire(questionnaire_id).await?.is_none() {
            return Err(not_found(format!("Questionnaire '{}' not found", questionnaire_id)));
        }
        self.check_question_shape(request.qtype, &request.text, request.choice_group_id)
            .await?;
        self.db.create_question(questionnaire_id, request).await
    }

    async fn owned_question(&self, questionnaire_id: Uuid, question_id: Uuid) -> Result<Question> {
        self.db
            .get_question(question_id)
            .await?
            .filter(|q| q.questionnaire_id == questionnaire_id)
            .ok_or_else(|| not_found(format!("Question '{}' not found", question_id)))
    }

    pub async fn update_question(&self, questionnaire_id: Uuid, question_id: Uuid, request: UpdateQuestionRequest) -> Result<Question> {
        let mut question = self.owned_question(questionnaire_id, question_id).await?;

        if let Some(qtype) = request.qtype {
            question.qtype = qtype;
        }
        if let Some(text) = request.text {
            question.text = text;
        }
        if let Some(required) = request.required {
            question.required = required;
        }
        if let Some(order) = request.order {
            question.order = order;
        }
        if let Some(image) = request.image {
            question.image = image;
        }
        if let Some(choice_group_id) = request.choice_group_id {
            question.choice_group_id = choice_group_id;
        }

        self.check_question_shape(question.qtype, &question.text, question.choice_group_id)
            .await?;
        self.db.update_question(&question).await?;
        Ok(question)
    }

    pub async fn delete_question(&self, questionnaire_id: Uuid, question_id: Uuid) -> Result<()> {
        let question = self.owned_question(questionnaire_id, question_id).await?;
        self.db.delete_question(question.id).await?;
        Ok(())
    }

    // Choice groups and choices

    fn check_bounds(min: Option<i32>, max: Option<i32>) -> Result<()> {
        if min.is_some_and(|m| m < 0) || max.is_some_and(|m| m < 1) {
            return Err(validation("Selection bounds must be positive"));
        }
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(validation("min_selected must not exceed max_selected"));
            }
        }
        Ok(())
    }

    pub async fn create_choice_group(&self, request: CreateChoiceGroupRequest) -> Result<ChoiceGroup> {
        Self::check_bounds(request.min_selected, request.max_selected)?;
        self.db.create_choice_group(request).await
    }

    pub async fn choice_group_detail(&self, id: Uuid) -> Result<Option<ChoiceGroupDetail>> {
        let group = match self.db.get_choice_group(id).await? {
            Some(group) => group,
            None => return Ok(None),
        };
        let choices = self.db.list_choices(id).await?;
        Ok(Some(ChoiceGroupDetail { group, choices }))
    }

    pub async fn update_choice_group(&self, id: Uuid, request: UpdateChoiceGroupRequest) -> Result<Option<ChoiceGroup>> {
        let mut group = match self.db.get_choice_group(id).await? {
            Some(group) => group,
            None => return Ok(None),
        };
        if let Some(name) = request.name {
            group.name = name;
        }
        if request.min_selected.is_some() {
            group.min_selected = request.min_selected;
        }
        if request.max_selected.is_some() {
            group.max_selected = request.max_selected;
        }
        Self::check_bounds(group.min_selected, group.max_selected)?;
        self.db.update_choice_group(&group).await?;
        Ok(Some(group))
    }

    pub async fn add_choice(&self, group_id: Uuid, request: CreateChoiceRequest) -> Result<Choice> {
        if self.db.get_choice_group(group_id).await?.is_none() {
            return Err(not_found(format!("Choice group '{}' not found", group_id)));
        }
        if request.text.trim().is_empty() {
            return Err(validation("Choice text must not be empty"));
        }
        self.db.create_choice(group_id, request).await
    }

    async fn owned_choice(&self, group_id: Uuid, choice_id: Uuid) -> Result<Choice> {
        self.db
            .get_choice(choice_id)
            .await?
            .filter(|c| c.choice_group_id == group_id)
            .ok_or_else(|| not_found(format!("Choice '{}' not found", choice_id)))
    }

    pub async fn update_choice(&self, group_id: Uuid, choice_id: Uuid, request: UpdateChoiceRequest) -> Result<Choice> {
        let mut choice = self.owned_choice(group_id, choice_id).await?;
        if let Some(text) = request.text {
            if text.trim().is_empty() {
                return Err(validation("Choice text must not be empty"));
            }
            choice.text = text;
        }
        if request.image.is_some() {
            choice.image = request.image;
        }
        if let Some(order) = request.order {
            choice.order = order;
        }
        self.db.update_choice(&choice).await?;
        Ok(choice)
    }

    pub async fn delete_choice(&self, group_id: Uuid, choice_id: Uuid) -> Result<()> {
        let choice = self.owned_choice(group_id, choice_id).await?;
        self.db.delete_choice(choice.id).await?;
        Ok(())
    }
}

fn summarize_interviews(answers: &[Answer]) -> Vec<SubmissionSummary> {
    let mut summaries: Vec<SubmissionSummary> = Vec::new();
    for answer in answers {
        match summaries
            .iter_mut()
            .find(|s| s.interview_uuid == answer.interview_uuid)
        {
            Some(summary) => summary.answer_count += 1,
            None => summaries.push(SubmissionSummary {
                interview_uuid: answer.interview_uuid,
                session_key: answer.session_key.clone(),
                submitted_at: answer.submission_date,
                answer_count: 1,
            }),
        }
    }
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_acceptable_next() {
        let current = "/api/surveys/example";
        assert!(acceptable_next("http://example.com/done", current));
        assert!(acceptable_next("https://example.com/done", current));
        assert!(acceptable_next("/thanks", current));
        assert!(!acceptable_next(current, current));
        assert!(!acceptable_next("//evil.example.com", current));
        assert!(!acceptable_next("javascript:alert(1)", current));
    }

    #[tokio::test]
    async fn test_open_status_is_cached_until_invalidated() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let service = SurveyService::new(db, StatusCache::new(16));
        let now = Utc::now();
        let mut survey = Survey {
            id: Uuid::new_v4(),
            slug: "cached".to_string(),
            title: "Cached".to_string(),
            description: String::new(),
            questionnaire_id: Uuid::new_v4(),
            opens: now - Duration::days(1),
            closes: now + Duration::days(1),
            visible: true,
            public: false,
            restricted: false,
            allows_multiple_interviews: false,
            created_by: None,
            editable_by: None,
            created_at: now,
        };

        assert!(service.is_open_at(&survey, now).await);

        // Window moved without a save: the cached value still answers.
        survey.closes = now - Duration::hours(1);
        assert!(service.is_open_at(&survey, now).await);

        service.status_cache.invalidate(survey.id).await;
        assert!(!service.is_open_at(&survey, now).await);

        // Hidden surveys bypass the cache entirely.
        survey.visible = false;
        survey.closes = now + Duration::days(1);
        assert!(!service.is_open_at(&survey, now).await);
    }

    #[test]
    fn test_summarize_interviews_groups_by_uuid() {
        let survey_id = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let answer = |interview_uuid: Uuid| Answer {
            id: Uuid::new_v4(),
            survey_id,
            question_id: Uuid::new_v4(),
            session_key: "abcdef0123".to_string(),
            user_id: None,
            interview_uuid,
            text: "x".to_string(),
            submission_date: Utc::now(),
        };

        let answers = vec![answer(first), answer(first), answer(second)];
        let summaries = summarize_interviews(&answers);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].answer_count, 2);
        assert_eq!(summaries[1].answer_count, 1);
    }
}
