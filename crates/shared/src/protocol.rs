use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::{QuestionId, SerieBac, SessionId, SessionStatus, UserId};

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Match scores are generated text stored as-is by the backend: floats and
/// numeric strings are rounded and clamped to 0..=100, anything else is 0.
fn lenient_percentage<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let score = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().trim_end_matches('%').trim_end().parse().ok(),
        _ => None,
    };
    Ok(score
        .filter(|score: &f64| score.is_finite())
        .map(|score| score.round().clamp(0.0, 100.0) as u8)
        .unwrap_or(0))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    #[serde(rename = "question")]
    pub prompt: String,
}

/// Body of a successful `POST /orientation/submit-initial/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialSubmissionResponse {
    pub session_id: SessionId,
    #[serde(
        rename = "analyse_initiale",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub initial_analysis: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub questions: Vec<Question>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub question_id: QuestionId,
    #[serde(rename = "reponse")]
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitAnswersRequest {
    pub session_id: SessionId,
    #[serde(rename = "reponses")]
    pub answers: Vec<AnswerPayload>,
}

/// A recommended course of study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filiere {
    #[serde(rename = "nom")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "duree", default)]
    pub duration: String,
    #[serde(rename = "correspondance", default, deserialize_with = "lenient_percentage")]
    pub match_percentage: u8,
    #[serde(rename = "debouches", default, deserialize_with = "null_as_default")]
    pub outlets: Vec<String>,
    #[serde(rename = "points_forts", default, deserialize_with = "null_as_default")]
    pub strengths: Vec<String>,
    #[serde(
        rename = "etablissements",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub institutions: Vec<String>,
}

/// Body of a successful `POST /orientation/submit-reponses/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub filieres: Vec<Filiere>,
    #[serde(
        rename = "conseil_general",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub general_advice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDetail {
    pub id: SessionId,
    pub serie_bac: SerieBac,
    pub status: SessionStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub questions: Vec<Question>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reponses: Vec<AnswerPayload>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub filieres_recommandees: Vec<Filiere>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password2: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_display: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Where and from what the pending sign-in came, as reported in the
/// verification email.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginAttemptDetails {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub browser: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginChallenge {
    pub message: String,
    #[serde(default)]
    pub details: Option<LoginAttemptDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyLoginRequest {
    pub token: String,
    pub approved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyLoginResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub refresh: Option<String>,
    #[serde(default)]
    pub user: Option<UserSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}
