use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, RequestBuilder, Response, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    domain::{SerieBac, SessionId},
    error::ApiError,
    protocol::{
        InitialSubmissionResponse, LoginChallenge, LoginRequest, LogoutRequest, MessageResponse,
        RecommendationResponse, RefreshRequest, RefreshResponse, RegisterRequest,
        RegisterResponse, SessionDetail, SubmitAnswersRequest, VerifyLoginRequest,
        VerifyLoginResponse,
    },
};
use tracing::{debug, info, warn};
use url::Url;

pub mod credentials;
pub mod error;
pub mod transcript;
pub mod workflow;

pub use credentials::{Credentials, CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{ApiClientError, ValidationError, WorkflowError};
pub use transcript::{InitialInput, TranscriptImage, MAX_TRANSCRIPT_BYTES};
pub use workflow::{Answer, BusyIndicator, OrientationWorkflow, WorkflowStep};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";

const SUBMIT_INITIAL_PATH: &str = "orientation/submit-initial/";
const SUBMIT_ANSWERS_PATH: &str = "orientation/submit-reponses/";
const SESSIONS_PATH: &str = "orientation/sessions/";
const REGISTER_PATH: &str = "auth/register/";
const LOGIN_PATH: &str = "auth/login/";
const VERIFY_LOGIN_PATH: &str = "auth/verify-login/";
const REFRESH_PATH: &str = "auth/refresh/";
const LOGOUT_PATH: &str = "auth/logout/";

/// The two backend calls the orientation workflow depends on.
#[async_trait]
pub trait OrientationApi: Send + Sync {
    async fn submit_initial(
        &self,
        serie: SerieBac,
        transcript: &TranscriptImage,
    ) -> Result<InitialSubmissionResponse, ApiClientError>;

    async fn submit_answers(
        &self,
        request: &SubmitAnswersRequest,
    ) -> Result<RecommendationResponse, ApiClientError>;
}

#[async_trait]
impl<T> OrientationApi for Arc<T>
where
    T: OrientationApi + ?Sized,
{
    async fn submit_initial(
        &self,
        serie: SerieBac,
        transcript: &TranscriptImage,
    ) -> Result<InitialSubmissionResponse, ApiClientError> {
        (**self).submit_initial(serie, transcript).await
    }

    async fn submit_answers(
        &self,
        request: &SubmitAnswersRequest,
    ) -> Result<RecommendationResponse, ApiClientError> {
        (**self).submit_answers(request).await
    }
}

pub struct HttpOrientationClient {
    http: Client,
    base_url: Url,
    credentials: Arc<dyn CredentialStore>,
}

impl HttpOrientationClient {
    pub fn new(
        base_url: &str,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, ApiClientError> {
        Self::with_http_client(Client::new(), base_url, credentials)
    }

    pub fn with_http_client(
        http: Client,
        base_url: &str,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, ApiClientError> {
        let base_url = normalize_base_url(base_url)?;
        Ok(Self {
            http,
            base_url,
            credentials,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiClientError> {
        self.base_url
            .join(path)
            .map_err(|source| ApiClientError::InvalidBaseUrl {
                url: format!("{}{path}", self.base_url),
                source,
            })
    }

    /// Attaches the bearer token currently in the store, if any.
    fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, ApiClientError> {
        match self.credentials.access_token()? {
            Some(token) => Ok(request.bearer_auth(token)),
            None => {
                debug!("no access token stored; sending unauthenticated request");
                Ok(request)
            }
        }
    }

    pub async fn register(
        &self,
        request: &RegisterRequest,
    ) -> Result<RegisterResponse, ApiClientError> {
        if request.password != request.password2 {
            return Err(crate::ValidationError::PasswordMismatch.into());
        }
        info!(username = %request.username, "registering account");
        let response = self
            .http
            .post(self.endpoint(REGISTER_PATH)?)
            .json(request)
            .send()
            .await?;
        read_json(response).await
    }

    /// First sign-in step; the backend emails a verification link.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<LoginChallenge, ApiClientError> {
        info!(%username, "requesting sign-in verification");
        let response = self
            .http
            .post(self.endpoint(LOGIN_PATH)?)
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        read_json(response).await
    }

    /// Confirms or refuses a pending sign-in. Tokens returned on approval are
    /// written to the credential store.
    pub async fn verify_login(
        &self,
        token: &str,
        approved: bool,
    ) -> Result<VerifyLoginResponse, ApiClientError> {
        let response = self
            .http
            .post(self.endpoint(VERIFY_LOGIN_PATH)?)
            .json(&VerifyLoginRequest {
                token: token.to_string(),
                approved,
            })
            .send()
            .await?;
        let body: VerifyLoginResponse = read_json(response).await?;

        if body.access.is_some() {
            self.credentials.save(&Credentials {
                access: body.access.clone(),
                refresh: body.refresh.clone(),
            })?;
            info!(
                username = body.user.as_ref().map(|u| u.username.as_str()).unwrap_or_default(),
                "sign-in approved; tokens stored"
            );
        } else {
            warn!(approved, "sign-in verification returned no tokens");
        }
        Ok(body)
    }

    pub async fn refresh_access_token(&self) -> Result<String, ApiClientError> {
        let mut stored = self.credentials.load()?;
        let refresh = self
            .credentials
            .refresh_token()?
            .ok_or(ApiClientError::MissingRefreshToken)?;

        let response = self
            .http
            .post(self.endpoint(REFRESH_PATH)?)
            .json(&RefreshRequest { refresh })
            .send()
            .await?;
        let body: RefreshResponse = read_json(response).await?;

        stored.access = Some(body.access.clone());
        self.credentials.save(&stored)?;
        debug!("access token refreshed");
        Ok(body.access)
    }

    /// Signs out. Local tokens are dropped even when the backend call fails.
    pub async fn logout(&self) -> Result<MessageResponse, ApiClientError> {
        let refresh = self.credentials.refresh_token()?;
        let request = self
            .http
            .post(self.endpoint(LOGOUT_PATH)?)
            .json(&LogoutRequest { refresh });
        let result = match self.authorize(request)?.send().await {
            Ok(response) => read_json(response).await,
            Err(err) => Err(err.into()),
        };
        self.credentials.clear()?;
        if let Err(err) = &result {
            warn!(%err, "logout request failed; local credentials cleared anyway");
        }
        result
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionDetail>, ApiClientError> {
        let request = self.http.get(self.endpoint(SESSIONS_PATH)?);
        let response = self.authorize(request)?.send().await?;
        read_json(response).await
    }

    pub async fn get_session(&self, session_id: SessionId) -> Result<SessionDetail, ApiClientError> {
        let request = self
            .http
            .get(self.endpoint(&format!("orientation/session/{session_id}/"))?);
        let response = self.authorize(request)?.send().await?;
        read_json(response).await
    }

    pub async fn delete_session(&self, session_id: SessionId) -> Result<(), ApiClientError> {
        let request = self
            .http
            .delete(self.endpoint(&format!("orientation/session/{session_id}/delete/"))?);
        let response = self.authorize(request)?.send().await?;
        read_empty(response).await?;
        info!(%session_id, "deleted orientation session");
        Ok(())
    }
}

#[async_trait]
impl OrientationApi for HttpOrientationClient {
    async fn submit_initial(
        &self,
        serie: SerieBac,
        transcript: &TranscriptImage,
    ) -> Result<InitialSubmissionResponse, ApiClientError> {
        // reqwest fills in the multipart content type and boundary.
        let part = Part::bytes(transcript.bytes.clone())
            .file_name(transcript.filename.clone())
            .mime_str(&transcript.mime_type)?;
        let form = Form::new()
            .text("serie_bac", serie.as_str())
            .part("releve_note", part);

        info!(
            %serie,
            filename = %transcript.filename,
            size = transcript.bytes.len(),
            "submitting initial orientation data"
        );
        let request = self.http.post(self.endpoint(SUBMIT_INITIAL_PATH)?).multipart(form);
        let response = self.authorize(request)?.send().await?;
        read_json(response).await
    }

    async fn submit_answers(
        &self,
        request: &SubmitAnswersRequest,
    ) -> Result<RecommendationResponse, ApiClientError> {
        info!(
            session_id = %request.session_id,
            answers = request.answers.len(),
            "submitting orientation answers"
        );
        let builder = self
            .http
            .post(self.endpoint(SUBMIT_ANSWERS_PATH)?)
            .json(request);
        let response = self.authorize(builder)?.send().await?;
        read_json(response).await
    }
}

fn normalize_base_url(raw: &str) -> Result<Url, ApiClientError> {
    let trimmed = raw.trim();
    // `Url::join` replaces the last segment unless the base ends in '/'.
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&with_slash).map_err(|source| ApiClientError::InvalidBaseUrl {
        url: raw.to_string(),
        source,
    })
}

/// Reads the body as JSON on every path; non-success statuses become
/// [`ApiClientError::Backend`].
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiClientError> {
    let status = response.status();
    let bytes = response.bytes().await?;
    if !status.is_success() {
        return Err(backend_error(status, &bytes).into());
    }
    Ok(serde_json::from_slice(&bytes)?)
}

async fn read_empty(response: Response) -> Result<(), ApiClientError> {
    let status = response.status();
    let bytes = response.bytes().await?;
    if !status.is_success() {
        return Err(backend_error(status, &bytes).into());
    }
    Ok(())
}

fn backend_error(status: StatusCode, bytes: &[u8]) -> ApiError {
    let body = serde_json::from_slice::<Value>(bytes).ok();
    let error = ApiError::from_response(status.as_u16(), body.as_ref());
    warn!(status = status.as_u16(), message = %error.message, "backend rejected request");
    error
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
