use anyhow::{Context, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use crate::log_db_operation;
use crate::models::*;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("invalid uuid '{}' in database", value))
}

fn parse_optional_uuid(value: Option<String>) -> Result<Option<Uuid>> {
    value.as_deref().map(parse_uuid).transpose()
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("invalid timestamp '{}' in database", value))?
        .with_timezone(&Utc))
}

/// Fixed-width UTC form so session expiry can be compared as text in SQL.
fn session_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_max_connections(database_url, 5).await
    }

    pub async fn with_max_connections(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to an in-memory database must be the same one.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            max_connections
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        let db = Database { pool };
        db.migrate().await?;
        log_db_operation!(info, "migrate", "database initialized");
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                is_superuser INTEGER NOT NULL DEFAULT 0,
                can_view_answers INTEGER NOT NULL DEFAULT 0,
                can_view_submissions INTEGER NOT NULL DEFAULT 0,
                token TEXT UNIQUE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS questionnaires (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS choice_groups (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                min_selected INTEGER,
                max_selected INTEGER
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS choices (
                id TEXT PRIMARY KEY,
                choice_group_id TEXT NOT NULL,
                text TEXT NOT NULL,
                image TEXT,
                sort_order INTEGER NOT NULL DEFAULT 0,
                UNIQUE (choice_group_id, text),
                FOREIGN KEY (choice_group_id) REFERENCES choice_groups(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS questions (
                id TEXT PRIMARY KEY,
                questionnaire_id TEXT NOT NULL,
                qtype TEXT NOT NULL,
                text TEXT NOT NULL,
                required INTEGER NOT NULL DEFAULT 1,
                sort_order INTEGER NOT NULL DEFAULT 0,
                image TEXT,
                choice_group_id TEXT,
                UNIQUE (questionnaire_id, text),
                FOREIGN KEY (questionnaire_id) REFERENCES questionnaires(id) ON DELETE CASCADE,
                FOREIGN KEY (choice_group_id) REFERENCES choice_groups(id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS surveys (
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                questionnaire_id TEXT NOT NULL,
                opens TEXT NOT NULL,
                closes TEXT NOT NULL,
                visible INTEGER NOT NULL DEFAULT 0,
                public INTEGER NOT NULL DEFAULT 0,
                restricted INTEGER NOT NULL DEFAULT 0,
                allows_multiple_interviews INTEGER NOT NULL DEFAULT 0,
                created_by TEXT,
                editable_by TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (questionnaire_id) REFERENCES questionnaires(id),
                FOREIGN KEY (created_by) REFERENCES users(id) ON DELETE SET NULL,
                FOREIGN KEY (editable_by) REFERENCES users(id) ON DELETE SET NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS answers (
                id TEXT PRIMARY KEY,
                survey_id TEXT NOT NULL,
                question_id TEXT NOT NULL,
                session_key TEXT NOT NULL,
                user_id TEXT,
                interview_uuid TEXT NOT NULL,
                text TEXT NOT NULL,
                submission_date TEXT NOT NULL,
                FOREIGN KEY (survey_id) REFERENCES surveys(id) ON DELETE CASCADE,
                FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE SET NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_answers_survey_session ON answers (survey_id, session_key)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_key TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // Questionnaire operations
    pub async fn create_questionnaire(&self, request: CreateQuestionnaireRequest) -> Result<Questionnaire> {
        let questionnaire = Questionnaire {
            id: Uuid::new_v4(),
            name: request.name,
            description: request.description,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO questionnaires (id, name, description, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(questionnaire.id.to_string())
        .bind(&questionnaire.name)
        .bind(&questionnaire.description)
        .bind(questionnaire.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(questionnaire)
    }

    pub async fn get_questionnaire(&self, id: Uuid) -> Result<Option<Questionnaire>> {
        let row = sqlx::query("SELECT * FROM questionnaires WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_questionnaire).transpose()
    }

    pub async fn list_questionnaires(&self) -> Result<Vec<Questionnaire>> {
        let rows = sqlx::query("SELECT * FROM questionnaires ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_questionnaire).collect()
    }

    pub async fn update_questionnaire(&self, questionnaire: &Questionnaire) -> Result<()> {
        sqlx::query("UPDATE questionnaires SET name = ?1, description = ?2 WHERE id = ?3")
            .bind(&questionnaire.name)
            .bind(&questionnaire.description)
            .bind(questionnaire.id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn delete_questionnaire(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM questionnaires WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // Question operations
    pub async fn create_question(&self, questionnaire_id: Uuid, request: CreateQuestionRequest) -> Result<Question> {
        let order = match request.order {
            Some(order) => order,
            None => {
                let max: Option<i32> = sqlx::query_scalar(
                    "SELECT MAX(sort_order) FROM questions WHERE questionnaire_id = ?1",
                )
                .bind(questionnaire_id.to_string())
                .fetch_one(&self.pool)
                .await?;
                max.map_or(0, |m| m + 1)
            }
        };

        let question = Question {
            id: Uuid::new_v4(),
            questionnaire_id,
            qtype: request.qtype,
            text: request.text,
            required: request.required,
            order,
            image: request.image,
            choice_group_id: request.choice_group_id,
        };

        sqlx::query(
            r#"
            INSERT INTO questions (id, questionnaire_id, qtype, text, required, sort_order, image, choice_group_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(question.id.to_string())
        .bind(question.questionnaire_id.to_string())
        .bind(question.qtype.as_str())
        .bind(&question.text)
        .bind(question.required)
        .bind(question.order)
        .bind(&question.image)
        .bind(question.choice_group_id.map(|id| id.to_string()))
        .execute(&self.pool)
        .await?;

        log_db_operation!(debug, "create_question", id = question.id);
        Ok(question)
    }

    pub async fn get_question(&self, id: Uuid) -> Result<Option<Question>> {
        let row = sqlx::query("SELECT * FROM questions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_question).transpose()
    }

    /// Questions of a questionnaire in display order.
    pub async fn list_questions(&self, questionnaire_id: Uuid) -> Result<Vec<Question>> {
        let rows = sqlx::query(
            "SELECT * FROM questions WHERE questionnaire_id = ?1 ORDER BY sort_order, rowid",
        )
        .bind(questionnaire_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_question).collect()
    }

    pub async fn update_question(&self, question: &Question) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE questions
            SET qtype = ?1, text = ?2, required = ?3, sort_order = ?4, image = ?5, choice_group_id = ?6
            WHERE id = ?7
            "#,
        )
        .bind(question.qtype.as_str())
        .bind(&question.text)
        .bind(question.required)
        .bind(question.order)
        .bind(&question.image)
        .bind(question.choice_group_id.map(|id| id.to_string()))
        .bind(question.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete_question(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM questions WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // Choice group operations
    pub async fn create_choice_group(&self, request: CreateChoiceGroupRequest) -> Result<ChoiceGroup> {
        let group = ChoiceGroup {
            id: Uuid::new_v4(),
            name: request.name,
            min_selected: request.min_selected,
            max_selected: request.max_selected,
        };

        sqlx::query(
            "INSERT INTO choice_groups (id, name, min_selected, max_selected) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(group.id.to_string())
        .bind(&group.name)
        .bind(group.min_selected)
        .bind(group.max_selected)
        .execute(&self.pool)
        .await?;

        Ok(group)
    }

    pub async fn get_choice_group(&self, id: Uuid) -> Result<Option<ChoiceGroup>> {
        let row = sqlx::query("SELECT * FROM choice_groups WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_choice_group).transpose()
    }

    pub async fn list_choice_groups(&self) -> Result<Vec<ChoiceGroup>> {
        let rows = sqlx::query("SELECT * FROM choice_groups ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_choice_group).collect()
    }

    pub async fn update_choice_group(&self, group: &ChoiceGroup) -> Result<()> {
        sqlx::query(
            "UPDATE choice_groups SET name = ?1, min_selected = ?2, max_selected = ?3 WHERE id = ?4",
        )
        .bind(&group.name)
        .bind(group.min_selected)
        .bind(group.max_selected)
        .bind(group.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete_choice_group(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM choice_groups WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // Choice operations
    pub async fn create_choice(&self, choice_group_id: Uuid, request: CreateChoiceRequest) -> Result<Choice> {
        let order = match request.order {
            Some(order) => order,
            None => {
                let max: Option<i32> = sqlx::query_scalar(
                    "SELECT MAX(sort_order) FROM choices WHERE choice_group_id = ?1",
                )
                .bind(choice_group_id.to_string())
                .fetch_one(&self.pool)
                .await?;
                max.map_or(0, |m| m + 1)
            }
        };

        let choice = Choice {
            id: Uuid::new_v4(),
            choice_group_id,
            text: request.text,
            image: request.image,
            order,
        };

        sqlx::query(
            "INSERT INTO choices (id, choice_group_id, text, image, sort_order) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(choice.id.to_string())
        .bind(choice.choice_group_id.to_string())
        .bind(&choice.text)
        .bind(&choice.image)
        .bind(choice.order)
        .execute(&self.pool)
        .await?;

        Ok(choice)
    }

    pub async fn get_choice(&self, id: Uuid) -> Result<Option<Choice>> {
        let row = sqlx::query("SELECT * FROM choices WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_choice).transpose()
    }

    /// Choices of a group in display order.
    pub async fn list_choices(&self, choice_group_id: Uuid) -> Result<Vec<Choice>> {
        let rows = sqlx::query(
            "SELECT * FROM choices WHERE choice_group_id = ?1 ORDER BY sort_order, rowid",
        )
        .bind(choice_group_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_choice).collect()
    }

    pub async fn update_choice(&self, choice: &Choice) -> Result<()> {
        sqlx::query("UPDATE choices SET text = ?1, image = ?2, sort_order = ?3 WHERE id = ?4")
            .bind(&choice.text)
            .bind(&choice.image)
            .bind(choice.order)
            .bind(choice.id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn delete_choice(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM choices WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // Survey operations
    pub async fn insert_survey(&self, survey: &Survey) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO surveys (id, slug, title, description, questionnaire_id, opens, closes,
                                 visible, public, restricted, allows_multiple_interviews,
                                 created_by, editable_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(survey.id.to_string())
        .bind(&survey.slug)
        .bind(&survey.title)
        .bind(&survey.description)
        .bind(survey.questionnaire_id.to_string())
        .bind(survey.opens.to_rfc3339())
        .bind(survey.closes.to_rfc3339())
        .bind(survey.visible)
        .bind(survey.public)
        .bind(survey.restricted)
        .bind(survey.allows_multiple_interviews)
        .bind(survey.created_by.map(|id| id.to_string()))
        .bind(survey.editable_by.map(|id| id.to_string()))
        .bind(survey.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        log_db_operation!(debug, "insert_survey", id = survey.id);
        Ok(())
    }

    pub async fn get_survey(&self, id: Uuid) -> Result<Option<Survey>> {
        let row = sqlx::query("SELECT * FROM surveys WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_survey).transpose()
    }

    pub async fn get_survey_by_slug(&self, slug: &str) -> Result<Option<Survey>> {
        let row = sqlx::query("SELECT * FROM surveys WHERE slug = ?1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_survey).transpose()
    }

    pub async fn list_visible_surveys(&self) -> Result<Vec<Survey>> {
        let rows = sqlx::query("SELECT * FROM surveys WHERE visible = 1 ORDER BY opens DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_survey).collect()
    }

    pub async fn list_editable_surveys(&self, user_id: Uuid) -> Result<Vec<Survey>> {
        let rows = sqlx::query(
            "SELECT * FROM surveys WHERE created_by = ?1 OR editable_by = ?1 ORDER BY created_at DESC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_survey).collect()
    }

    pub async fn update_survey(&self, survey: &Survey) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE surveys
            SET slug = ?1, title = ?2, description = ?3, questionnaire_id = ?4, opens = ?5,
                closes = ?6, visible = ?7, public = ?8, restricted = ?9,
                allows_multiple_interviews = ?10, editable_by = ?11
            WHERE id = ?12
            "#,
        )
        .bind(&survey.slug)
        .bind(&survey.title)
        .bind(&survey.description)
        .bind(survey.questionnaire_id.to_string())
        .bind(survey.opens.to_rfc3339())
        .bind(survey.closes.to_rfc3339())
        .bind(survey.visible)
        .bind(survey.public)
        .bind(survey.restricted)
        .bind(survey.allows_multiple_interviews)
        .bind(survey.editable_by.map(|id| id.to_string()))
        .bind(survey.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete_survey(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM surveys WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // Answer operations

    /// Stores one interview atomically.
    pub async fn insert_answers(&self, answers: &[Answer]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for answer in answers {
            sqlx::query(
                r#"
                INSERT INTO answers (id, survey_id, question_id, session_key, user_id,
                                     interview_uuid, text, submission_date)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(answer.id.to_string())
            .bind(answer.survey_id.to_string())
            .bind(answer.question_id.to_string())
            .bind(&answer.session_key)
            .bind(answer.user_id.map(|id| id.to_string()))
            .bind(answer.interview_uuid.to_string())
            .bind(&answer.text)
            .bind(answer.submission_date.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        log_db_operation!(debug, "insert_answers", count = answers.len());
        Ok(())
    }

    /// Whether the session (or the authenticated user) already answered the survey.
    pub async fn has_answers_from(&self, survey_id: Uuid, session_key: &str, user_id: Option<Uuid>) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM answers
            WHERE survey_id = ?1 AND (session_key = ?2 OR (?3 IS NOT NULL AND user_id = ?3))
            "#,
        )
        .bind(survey_id.to_string())
        .bind(session_key.to_lowercase())
        .bind(user_id.map(|id| id.to_string()))
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    pub async fn answers_for_session(&self, survey_id: Uuid, session_key: &str) -> Result<Vec<Answer>> {
        let rows = sqlx::query(
            "SELECT * FROM answers WHERE survey_id = ?1 AND session_key = ?2 ORDER BY submission_date, rowid",
        )
        .bind(survey_id.to_string())
        .bind(session_key.to_lowercase())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_answer).collect()
    }

    pub async fn answers_for_survey(&self, survey_id: Uuid) -> Result<Vec<Answer>> {
        let rows = sqlx::query(
            "SELECT * FROM answers WHERE survey_id = ?1 ORDER BY submission_date, rowid",
        )
        .bind(survey_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let answers: Vec<Answer> = rows.iter().map(row_to_answer).collect::<Result<_>>()?;
        log_db_operation!(debug, "answers_for_survey", count = answers.len());
        Ok(answers)
    }

    pub async fn count_answers(&self, survey_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM answers WHERE survey_id = ?1")
            .bind(survey_id.to_string())
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    // User operations
    pub async fn insert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, password_hash, is_superuser, can_view_answers,
                               can_view_submissions, token)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.is_superuser)
        .bind(user.can_view_answers)
        .bind(user.can_view_submissions)
        .bind(&user.token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = ?1, is_superuser = ?2, can_view_answers = ?3,
                can_view_submissions = ?4, token = ?5
            WHERE id = ?6
            "#,
        )
        .bind(&user.password_hash)
        .bind(user.is_superuser)
        .bind(user.can_view_answers)
        .bind(user.can_view_submissions)
        .bind(&user.token)
        .bind(user.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    pub async fn get_user_by_token(&self, token: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE token = ?1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    pub async fn set_user_token(&self, user_id: Uuid, token: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE users SET token = ?1 WHERE id = ?2")
            .bind(token)
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // Session operations
    pub async fn create_session(&self, ttl: Duration) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            session_key: Uuid::new_v4().simple().to_string(),
            created_at: now,
            expires_at: now + ttl,
        };

        sqlx::query("INSERT INTO sessions (session_key, created_at, expires_at) VALUES (?1, ?2, ?3)")
            .bind(&session.session_key)
            .bind(session_timestamp(session.created_at))
            .bind(session_timestamp(session.expires_at))
            .execute(&self.pool)
            .await?;

        Ok(session)
    }

    /// Returns the session only while it has not expired.
    pub async fn get_session(&self, session_key: &str) -> Result<Option<Session>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE session_key = ?1")
            .bind(session_key.to_lowercase())
            .fetch_optional(&self.pool)
            .await?;

        let session = match row {
            Some(row) => Session {
                session_key: row.get("session_key"),
                created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
                expires_at: parse_timestamp(&row.get::<String, _>("expires_at"))?,
            },
            None => return Ok(None),
        };

        if session.expires_at <= Utc::now() {
            return Ok(None);
        }
        Ok(Some(session))
    }

    pub async fn delete_expired_sessions(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?1")
            .bind(session_timestamp(Utc::now()))
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        log_db_operation!(debug, "delete_expired_sessions", count = removed);
        Ok(removed)
    }
}

fn row_to_questionnaire(row: &SqliteRow) -> Result<Questionnaire> {
    Ok(Questionnaire {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        name: row.get("name"),
        description: row.get("description"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

fn row_to_question(row: &SqliteRow) -> Result<Question> {
    Ok(Question {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        questionnaire_id: parse_uuid(&row.get::<String, _>("questionnaire_id"))?,
        qtype: row.get::<String, _>("qtype").parse()?,
        text: row.get("text"),
        required: row.get("required"),
        order: row.get("sort_order"),
        image: row.get("image"),
        choice_group_id: parse_optional_uuid(row.get("choice_group_id"))?,
    })
}

fn row_to_choice_group(row: &SqliteRow) -> Result<ChoiceGroup> {
    Ok(ChoiceGroup {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        name: row.get("name"),
        min_selected: row.get("min_selected"),
        max_selected: row.get("max_selected"),
    })
}

fn row_to_choice(row: &SqliteRow) -> Result<Choice> {
    Ok(Choice {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        choice_group_id: parse_uuid(&row.get::<String, _>("choice_group_id"))?,
        text: row.get("text"),
        image: row.get("image"),
        order: row.get("sort_order"),
    })
}

fn row_to_survey(row: &SqliteRow) -> Result<Survey> {
    Ok(Survey {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        slug: row.get("slug"),
        title: row.get("title"),
        description: row.get("description"),
        questionnaire_id: parse_uuid(&row.get::<String, _>("questionnaire_id"))?,
        opens: parse_timestamp(&row.get::<String, _>("opens"))?,
        closes: parse_timestamp(&row.get::<String, _>("closes"))?,
        visible: row.get("visible"),
        public: row.get("public"),
        restricted: row.get("restricted"),
        allows_multiple_interviews: row.get("allows_multiple_interviews"),
        created_by: parse_optional_uuid(row.get("created_by"))?,
        editable_by: parse_optional_uuid(row.get("editable_by"))?,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

fn row_to_answer(row: &SqliteRow) -> Result<Answer> {
    Ok(Answer {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        survey_id: parse_uuid(&row.get::<String, _>("survey_id"))?,
        question_id: parse_uuid(&row.get::<String, _>("question_id"))?,
        session_key: row.get("session_key"),
        user_id: parse_optional_uuid(row.get("user_id"))?,
        interview_uuid: parse_uuid(&row.get::<String, _>("interview_uuid"))?,
        text: row.get("text"),
        submission_date: parse_timestamp(&row.get::<String, _>("submission_date"))?,
    })
}

fn row_to_user(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        is_superuser: row.get("is_superuser"),
        can_view_answers: row.get("can_view_answers"),
        can_view_submissions: row.get("can_view_submissions"),
        token: row.get("token"),
    })
}
