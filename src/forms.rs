//! Answer forms generated from a survey's questions.
//!
//! Every question becomes one [`AnswerField`]; the question type picks the
//! widget and with it the cleaning rules applied to submitted values.

use serde::Serialize;
use uuid::Uuid;

use crate::models::{Choice, ChoiceGroup, Question, QuestionType, Survey};

pub const REQUIRED_MESSAGE: &str = "This field is required.";
pub const OPTIONAL_HELP_TEXT: &str = "(this question is optional)";
pub const EMPTY_CHOICE_LABEL: &str = "---------";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "widget", rename_all = "snake_case")]
pub enum AnswerWidget {
    TextInput,
    Textarea,
    Select { empty_label: String },
    RadioList,
    ImageRadioList,
    /// Radio buttons laid out as a single table row.
    HorizontalRadioList,
    CheckboxList {
        min_selected: Option<i32>,
        max_selected: Option<i32>,
    },
}

impl AnswerWidget {
    fn for_question(qtype: QuestionType, group: Option<&ChoiceGroup>) -> Self {
        match qtype {
            QuestionType::Text => AnswerWidget::TextInput,
            QuestionType::Textarea => AnswerWidget::Textarea,
            QuestionType::Select => AnswerWidget::Select {
                empty_label: EMPTY_CHOICE_LABEL.to_string(),
            },
            QuestionType::Radio => AnswerWidget::RadioList,
            QuestionType::Image => AnswerWidget::ImageRadioList,
            QuestionType::Grid => AnswerWidget::HorizontalRadioList,
            QuestionType::Checkbox => AnswerWidget::CheckboxList {
                min_selected: group.and_then(|g| g.min_selected),
                max_selected: group.and_then(|g| g.max_selected),
            },
        }
    }

    fn takes_choices(&self) -> bool {
        !matches!(self, AnswerWidget::TextInput | AnswerWidget::Textarea)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChoice {
    pub value: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip)]
    text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerField {
    pub name: String,
    pub question_id: Uuid,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(flatten)]
    pub widget: AnswerWidget,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<FieldChoice>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub value: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

pub fn field_name(survey_id: Uuid, question_id: Uuid) -> String {
    format!("{}_{}-answer", survey_id, question_id)
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

impl AnswerField {
    pub fn for_question(
        survey_id: Uuid,
        question: &Question,
        group: Option<&ChoiceGroup>,
        choices: &[Choice],
    ) -> Self {
        let widget = AnswerWidget::for_question(question.qtype, group);

        let choices = if widget.takes_choices() {
            choices
                .iter()
                .map(|choice| {
                    let label = match widget {
                        AnswerWidget::ImageRadioList => {
                            let src = choice.image.as_deref().unwrap_or(&choice.text);
                            format!("<img src=\"{}\"/>", escape_attribute(src))
                        }
                        _ => choice.text.clone(),
                    };
                    FieldChoice {
                        value: choice.id.to_string(),
                        label,
                        image: choice.image.clone(),
                        text: choice.text.clone(),
                    }
                })
                .collect()
        } else {
            Vec::new()
        };

        AnswerField {
            name: field_name(survey_id, question.id),
            question_id: question.id,
            label: question.text.clone(),
            help_text: (!question.required).then(|| OPTIONAL_HELP_TEXT.to_string()),
            required: question.required,
            image: question.image.clone(),
            widget,
            choices,
            value: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn find_choice(&self, value: &str) -> Option<&FieldChoice> {
        let wanted = Uuid::parse_str(value).ok()?;
        self.choices
            .iter()
            .find(|choice| Uuid::parse_str(&choice.value).ok() == Some(wanted))
    }

    fn invalid_choice(value: &str) -> String {
        format!("Select a valid choice. {} is not one of the available choices.", value)
    }

    /// Turn raw submitted values into the answer texts to store.
    ///
    /// An empty result means the optional question was skipped.
    pub fn clean(&self, raw: &[String]) -> Result<Vec<String>, String> {
        let values: Vec<&str> = raw
            .iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .collect();

        match &self.widget {
            AnswerWidget::TextInput | AnswerWidget::Textarea => match values.first() {
                Some(text) => Ok(vec![text.to_string()]),
                None if self.required => Err(REQUIRED_MESSAGE.to_string()),
                None => Ok(Vec::new()),
            },
            AnswerWidget::Select { .. }
            | AnswerWidget::RadioList
            | AnswerWidget::ImageRadioList
            | AnswerWidget::HorizontalRadioList => match values.last() {
                Some(value) => self
                    .find_choice(value)
                    .map(|choice| vec![choice.text.clone()])
                    .ok_or_else(|| Self::invalid_choice(value)),
                None if self.required => Err(REQUIRED_MESSAGE.to_string()),
                None => Ok(Vec::new()),
            },
            AnswerWidget::CheckboxList {
                min_selected,
                max_selected,
            } => {
                let mut selected: Vec<String> = Vec::new();
                for value in &values {
                    let choice = self
                        .find_choice(value)
                        .ok_or_else(|| Self::invalid_choice(value))?;
                    if !selected.contains(&choice.text) {
                        selected.push(choice.text.clone());
                    }
                }

                if selected.is_empty() {
                    return if self.required {
                        Err(REQUIRED_MESSAGE.to_string())
                    } else {
                        Ok(Vec::new())
                    };
                }
                if let Some(min) = min_selected {
                    if (selected.len() as i32) < *min {
                        return Err(format!("Select at least {} choices.", min));
                    }
                }
                if let Some(max) = max_selected {
                    if (selected.len() as i32) > *max {
                        return Err(format!("Select at most {} choices.", max));
                    }
                }
                Ok(selected)
            }
        }
    }
}

/// Answers accepted for one question.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedAnswer {
    pub question_id: Uuid,
    pub texts: Vec<String>,
}

/// The whole answer form of a survey.
#[derive(Debug, Clone, Serialize)]
pub struct SurveyForm {
    pub survey_id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub fields: Vec<AnswerField>,
}

impl SurveyForm {
    pub fn new(survey: &Survey, fields: Vec<AnswerField>) -> Self {
        Self {
            survey_id: survey.id,
            slug: survey.slug.clone(),
            title: survey.title.clone(),
            description: survey.description.clone(),
            fields,
        }
    }

    /// Binds submitted form data to every field.
    ///
    /// Returns the cleaned answers when every field validates; otherwise the
    /// per-field errors are left on the form for redisplay.
    pub fn bind(&mut self, data: &[(String, String)]) -> Option<Vec<CleanedAnswer>> {
        let mut cleaned = Vec::with_capacity(self.fields.len());
        let mut valid = true;

        for field in &mut self.fields {
            let raw: Vec<String> = data
                .iter()
                .filter(|(key, _)| *key == field.name)
                .map(|(_, value)| value.clone())
                .collect();

            match field.clean(&raw) {
                Ok(texts) => {
                    field.errors.clear();
                    cleaned.push(CleanedAnswer {
                        question_id: field.question_id,
                        texts,
                    });
                }
                Err(message) => {
                    field.errors = vec![message];
                    valid = false;
                }
            }
            field.value = raw;
        }

        valid.then_some(cleaned)
    }

    pub fn error_count(&self) -> usize {
        self.fields.iter().map(|f| f.errors.len()).sum()
    }
}
