//! REST client for the platform backend.

use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{
    api::error::{ApiError, ApiResult},
    dto::{
        SessionCode,
        poll::{ActivePollPayload, Participant, SessionInfo, SubmissionReply, SubmissionRequest},
    },
};

/// Connection state reported to the backend liveness endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionReport {
    /// The push channel is connected.
    Online,
    /// The push channel dropped or was closed.
    Offline,
}

/// REST surface of the platform consumed by the student session core.
pub trait StudentBackend: Send + Sync {
    /// Fetch the metadata of a session by its join code.
    fn fetch_session(&self, code: &SessionCode) -> BoxFuture<'static, ApiResult<SessionInfo>>;
    /// Register the student as a participant of the session.
    fn join_session(&self, code: &SessionCode, student: Uuid) -> BoxFuture<'static, ApiResult<()>>;
    /// Remove the student from the session roster.
    fn leave_session(&self, code: &SessionCode, student: Uuid) -> BoxFuture<'static, ApiResult<()>>;
    /// Ask whether a poll is running right now; `None` when there is none.
    fn fetch_active_poll(
        &self,
        code: &SessionCode,
    ) -> BoxFuture<'static, ApiResult<Option<ActivePollPayload>>>;
    /// Record the student's answer for a poll.
    fn submit_response(
        &self,
        student: Uuid,
        poll: Uuid,
        request: SubmissionRequest,
    ) -> BoxFuture<'static, ApiResult<SubmissionReply>>;
    /// Fetch the participant roster of the session.
    fn fetch_participants(
        &self,
        code: &SessionCode,
    ) -> BoxFuture<'static, ApiResult<Vec<Participant>>>;
    /// Report recent activity for the student (liveness signal).
    fn update_activity(&self, code: &SessionCode, student: Uuid)
    -> BoxFuture<'static, ApiResult<()>>;
    /// Report the push channel connection state for the student.
    fn update_connection(
        &self,
        code: &SessionCode,
        student: Uuid,
        report: ConnectionReport,
    ) -> BoxFuture<'static, ApiResult<()>>;
}

#[derive(Serialize)]
struct StudentRef {
    student_id: Uuid,
}

#[derive(Serialize)]
struct ConnectionUpdate {
    student_id: Uuid,
    connection_status: ConnectionReport,
}

/// [`StudentBackend`] implementation speaking HTTP to the platform API.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Arc<str>,
    auth_token: Option<Arc<str>>,
}

impl HttpBackend {
    /// Build a client against `base_url`, optionally attaching a bearer token.
    pub fn new(base_url: &str, auth_token: Option<&str>) -> ApiResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| ApiError::ClientBuilder { source })?;

        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            auth_token: auth_token.map(Arc::from),
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        if let Some(ref token) = self.auth_token {
            builder.bearer_auth(token.as_ref())
        } else {
            builder
        }
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        path: &str,
    ) -> ApiResult<reqwest::Response> {
        let response = builder
            .send()
            .await
            .map_err(|source| ApiError::RequestSend {
                path: path.to_string(),
                source,
            })?;

        match response.status() {
            status if status == StatusCode::UNAUTHORIZED => Err(ApiError::AuthRequired),
            status if status == StatusCode::FORBIDDEN => Err(ApiError::AccessDenied),
            _ => Ok(response),
        }
    }

    async fn get_json<T>(&self, path: &str) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        let response = self.send(self.request(Method::GET, path), path).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::RequestStatus {
                path: path.to_string(),
                status,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|source| ApiError::DecodeResponse {
                path: path.to_string(),
                source,
            })
    }

    /// Like [`HttpBackend::get_json`], with not-found mapped to `None`.
    async fn get_json_opt<T>(&self, path: &str) -> ApiResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self.send(self.request(Method::GET, path), path).await?;
        match response.status() {
            status if status == StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response.json::<T>().await.map(Some).map_err(
                |source| ApiError::DecodeResponse {
                    path: path.to_string(),
                    source,
                },
            ),
            other => Err(ApiError::RequestStatus {
                path: path.to_string(),
                status: other,
            }),
        }
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .send(self.request(Method::POST, path).json(body), path)
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::RequestStatus {
                path: path.to_string(),
                status,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|source| ApiError::DecodeResponse {
                path: path.to_string(),
                source,
            })
    }

    async fn post_unit<B>(&self, path: &str, body: &B) -> ApiResult<()>
    where
        B: Serialize + ?Sized,
    {
        let response = self
            .send(self.request(Method::POST, path).json(body), path)
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ApiError::RequestStatus {
                path: path.to_string(),
                status,
            })
        }
    }
}

impl StudentBackend for HttpBackend {
    fn fetch_session(&self, code: &SessionCode) -> BoxFuture<'static, ApiResult<SessionInfo>> {
        let backend = self.clone();
        let path = format!("/sessions/{}", code.as_str());
        Box::pin(async move { backend.get_json(&path).await })
    }

    fn join_session(&self, code: &SessionCode, student: Uuid) -> BoxFuture<'static, ApiResult<()>> {
        let backend = self.clone();
        let path = format!("/sessions/{}/join", code.as_str());
        Box::pin(async move {
            backend
                .post_unit(&path, &StudentRef { student_id: student })
                .await
        })
    }

    fn leave_session(
        &self,
        code: &SessionCode,
        student: Uuid,
    ) -> BoxFuture<'static, ApiResult<()>> {
        let backend = self.clone();
        let path = format!("/sessions/{}/leave", code.as_str());
        Box::pin(async move {
            backend
                .post_unit(&path, &StudentRef { student_id: student })
                .await
        })
    }

    fn fetch_active_poll(
        &self,
        code: &SessionCode,
    ) -> BoxFuture<'static, ApiResult<Option<ActivePollPayload>>> {
        let backend = self.clone();
        let path = format!("/sessions/{}/active-poll", code.as_str());
        Box::pin(async move { backend.get_json_opt(&path).await })
    }

    fn submit_response(
        &self,
        student: Uuid,
        poll: Uuid,
        request: SubmissionRequest,
    ) -> BoxFuture<'static, ApiResult<SubmissionReply>> {
        let backend = self.clone();
        let path = format!("/students/{student}/polls/{poll}/respond");
        Box::pin(async move { backend.post_json(&path, &request).await })
    }

    fn fetch_participants(
        &self,
        code: &SessionCode,
    ) -> BoxFuture<'static, ApiResult<Vec<Participant>>> {
        let backend = self.clone();
        let path = format!("/sessions/{}/participants", code.as_str());
        Box::pin(async move { backend.get_json(&path).await })
    }

    fn update_activity(
        &self,
        code: &SessionCode,
        student: Uuid,
    ) -> BoxFuture<'static, ApiResult<()>> {
        let backend = self.clone();
        let path = format!("/sessions/{}/update-activity", code.as_str());
        Box::pin(async move {
            backend
                .post_unit(&path, &StudentRef { student_id: student })
                .await
        })
    }

    fn update_connection(
        &self,
        code: &SessionCode,
        student: Uuid,
        report: ConnectionReport,
    ) -> BoxFuture<'static, ApiResult<()>> {
        let backend = self.clone();
        let path = format!("/sessions/{}/update-connection", code.as_str());
        Box::pin(async move {
            backend
                .post_unit(
                    &path,
                    &ConnectionUpdate {
                        student_id: student,
                        connection_status: report,
                    },
                )
                .await
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Configurable in-memory backend used by the session unit tests.
    pub(crate) struct StubBackend {
        /// Payload returned by `fetch_active_poll`.
        pub active: Mutex<Option<ActivePollPayload>>,
        /// Verdict returned for submissions.
        pub submit_is_correct: bool,
        /// When set, submissions fail with a server error status.
        pub fail_submissions: bool,
        /// Roster returned by `fetch_participants`.
        pub participants: Mutex<Vec<Participant>>,
        /// Submissions received, newest last.
        pub submissions: Mutex<Vec<(Uuid, SubmissionRequest)>>,
        /// Activity pings received.
        pub activity_pings: Mutex<usize>,
    }

    impl Default for StubBackend {
        fn default() -> Self {
            Self {
                active: Mutex::new(None),
                submit_is_correct: true,
                fail_submissions: false,
                participants: Mutex::new(Vec::new()),
                submissions: Mutex::new(Vec::new()),
                activity_pings: Mutex::new(0),
            }
        }
    }

    impl StudentBackend for StubBackend {
        fn fetch_session(&self, code: &SessionCode) -> BoxFuture<'static, ApiResult<SessionInfo>> {
            let id = code.as_str().to_string();
            Box::pin(async move {
                Ok(SessionInfo {
                    id,
                    title: "Networking 101".into(),
                    course_name: None,
                    teacher_name: None,
                })
            })
        }

        fn join_session(&self, _: &SessionCode, _: Uuid) -> BoxFuture<'static, ApiResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn leave_session(&self, _: &SessionCode, _: Uuid) -> BoxFuture<'static, ApiResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn fetch_active_poll(
            &self,
            _: &SessionCode,
        ) -> BoxFuture<'static, ApiResult<Option<ActivePollPayload>>> {
            let active = self.active.lock().unwrap().clone();
            Box::pin(async move { Ok(active) })
        }

        fn submit_response(
            &self,
            _: Uuid,
            poll: Uuid,
            request: SubmissionRequest,
        ) -> BoxFuture<'static, ApiResult<SubmissionReply>> {
            self.submissions.lock().unwrap().push((poll, request));
            let verdict = if self.fail_submissions {
                Err(ApiError::RequestStatus {
                    path: format!("/polls/{poll}/respond"),
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                })
            } else {
                Ok(SubmissionReply {
                    is_correct: self.submit_is_correct,
                })
            };
            Box::pin(async move { verdict })
        }

        fn fetch_participants(
            &self,
            _: &SessionCode,
        ) -> BoxFuture<'static, ApiResult<Vec<Participant>>> {
            let roster = self.participants.lock().unwrap().clone();
            Box::pin(async move { Ok(roster) })
        }

        fn update_activity(&self, _: &SessionCode, _: Uuid) -> BoxFuture<'static, ApiResult<()>> {
            *self.activity_pings.lock().unwrap() += 1;
            Box::pin(async { Ok(()) })
        }

        fn update_connection(
            &self,
            _: &SessionCode,
            _: Uuid,
            _: ConnectionReport,
        ) -> BoxFuture<'static, ApiResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }
}
