//! Server contract used by the session controller.
//!
//! [`HttpBackend`] talks to the real viva server. [`MemoryBackend`] keeps the
//! transcript in process; it drives the offline demo and the headless tests.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, COOKIE};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;

use crate::config::Config;
use crate::error::{Result, VivaError};
use crate::protocol::{
    EndRequest, FeedbackPoll, LogBatch, LogSingle, Message, RatingRequest, SendRequest,
    SendResponse, Sender, SessionId, TranscriptResponse, START_SENTINEL,
};

const CSRF_COOKIE: &str = "csrftoken";
const CSRF_HEADER: &str = "X-CSRFToken";

#[async_trait]
pub trait VivaBackend: Send + Sync {
    async fn send_message(&self, req: &SendRequest) -> Result<SendResponse>;
    async fn end_session(&self, req: &EndRequest) -> Result<SendResponse>;
    async fn fetch_transcript(&self, session: &SessionId) -> Result<TranscriptResponse>;
    async fn log_events(&self, batch: &LogBatch) -> Result<()>;
    async fn log_event(&self, event: &LogSingle) -> Result<()>;
    async fn submit_rating(&self, req: &RatingRequest) -> Result<()>;
    async fn fetch_feedback(&self, session: &SessionId) -> Result<FeedbackPoll>;
}

/// Value of `name` in a `Cookie`-style string (`a=1; b=2`), if present.
pub fn cookie_value(cookies: &str, name: &str) -> Option<String> {
    cookies
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix(name)?.strip_prefix('='))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    config: Config,
    cookie: Option<String>,
    csrf_token: String,
}

impl HttpBackend {
    /// `cookie` is the raw cookie string the browser would send; the CSRF
    /// token is read from its `csrftoken` entry.
    pub fn new(config: Config, cookie: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        let csrf_token = cookie
            .as_deref()
            .and_then(|c| cookie_value(c, CSRF_COOKIE))
            .unwrap_or_default();
        Ok(Self {
            client,
            config,
            cookie,
            csrf_token,
        })
    }

    fn url(&self, path: &str, session: &SessionId) -> String {
        self.config.endpoint(path, session)
    }

    fn headers(&self, mutating: bool) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = &self.cookie {
            headers.insert(COOKIE, header_value(cookie)?);
        }
        if mutating {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            headers.insert(CSRF_HEADER, header_value(&self.csrf_token)?);
        }
        Ok(headers)
    }

    fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<RequestBuilder> {
        Ok(self.client.post(url).headers(self.headers(true)?).json(body))
    }

    async fn execute(&self, endpoint: &str, req: RequestBuilder) -> Result<Response> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(VivaError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp)
    }

    async fn post_for_reply(&self, url: String, body: &impl Serialize) -> Result<SendResponse> {
        let resp = self.execute(&url, self.post(&url, body)?).await?;
        let bytes = resp.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(SendResponse::default());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|err| VivaError::Config(format!("invalid header value: {err}")))
}

#[async_trait]
impl VivaBackend for HttpBackend {
    async fn send_message(&self, req: &SendRequest) -> Result<SendResponse> {
        let url = self.url(&self.config.send_path, &req.session_id);
        self.post_for_reply(url, req).await
    }

    async fn end_session(&self, req: &EndRequest) -> Result<SendResponse> {
        let url = self.url(&self.config.send_path, &req.session_id);
        self.post_for_reply(url, req).await
    }

    async fn fetch_transcript(&self, session: &SessionId) -> Result<TranscriptResponse> {
        let url = self.url(&self.config.poll_path, session);
        let req = self.client.get(&url).headers(self.headers(false)?);
        let resp = self.execute(&url, req).await?;
        Ok(resp.json::<TranscriptResponse>().await?)
    }

    async fn log_events(&self, batch: &LogBatch) -> Result<()> {
        let url = self.url(&self.config.log_path, &batch.session_id);
        self.execute(&url, self.post(&url, batch)?).await?;
        Ok(())
    }

    async fn log_event(&self, event: &LogSingle) -> Result<()> {
        let url = self.url(&self.config.log_path, &event.session_id);
        self.execute(&url, self.post(&url, event)?).await?;
        Ok(())
    }

    async fn submit_rating(&self, req: &RatingRequest) -> Result<()> {
        let url = self.url(&self.config.send_path, &req.session_id);
        self.execute(&url, self.post(&url, req)?).await?;
        Ok(())
    }

    async fn fetch_feedback(&self, session: &SessionId) -> Result<FeedbackPoll> {
        let url = self.url(&self.config.feedback_path, session);
        let req = self.client.get(&url).headers(self.headers(false)?);
        let resp = self.execute(&url, req).await?;
        Ok(resp.json::<FeedbackPoll>().await?)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    transcript: Vec<Message>,
    script: Vec<String>,
    replies_sent: usize,
    sent: Vec<SendRequest>,
    ended: Vec<EndRequest>,
    batches: Vec<LogBatch>,
    singles: Vec<LogSingle>,
    ratings: Vec<RatingRequest>,
    fetches: usize,
    failing_logs: u32,
    failing_fetches: u32,
    end_response: SendResponse,
    feedback: FeedbackPoll,
}

/// In-process stand-in for the viva server.
///
/// Stores student messages the way the server does (the sentinel is never
/// stored) and, when given a script, answers each send with the next AI line.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
    fetch_delay: Duration,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripted examiner used by `viva --demo`.
    pub fn demo() -> Self {
        let backend = Self::new().with_script(vec![
            "Thanks for joining. In two sentences, what is the main argument of your \
             submission and why did you choose this approach?"
                .to_string(),
            "What evidence best backs that choice, and what would you strengthen first?"
                .to_string(),
            "Where did you consider an alternative approach, and why did you reject it?"
                .to_string(),
            "Name one limitation in your work and how you'd address it next.".to_string(),
        ]);
        backend.set_end_response(SendResponse {
            feedback_text: Some(
                "Thanks for finishing the viva. Solid structure; tighten the evidence behind your \
                 main claim and state the limitations of your approach explicitly."
                    .to_string(),
            ),
            feedback_visible: Some(true),
            status: Some("ended".to_string()),
            ..SendResponse::default()
        });
        backend.with_fetch_delay(Duration::from_millis(150))
    }

    pub fn with_script(self, script: Vec<String>) -> Self {
        self.lock().script = script;
        self
    }

    /// Simulated server latency for transcript fetches.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// Append a message server-side, as if another writer had produced it.
    pub fn push_message(&self, message: Message) {
        self.lock().transcript.push(message);
    }

    pub fn fail_next_logs(&self, count: u32) {
        self.lock().failing_logs = count;
    }

    pub fn fail_next_fetches(&self, count: u32) {
        self.lock().failing_fetches = count;
    }

    pub fn set_end_response(&self, response: SendResponse) {
        self.lock().end_response = response;
    }

    pub fn set_feedback(&self, feedback: FeedbackPoll) {
        self.lock().feedback = feedback;
    }

    pub fn transcript(&self) -> Vec<Message> {
        self.lock().transcript.clone()
    }

    pub fn sent(&self) -> Vec<SendRequest> {
        self.lock().sent.clone()
    }

    pub fn ended(&self) -> Vec<EndRequest> {
        self.lock().ended.clone()
    }

    pub fn batches(&self) -> Vec<LogBatch> {
        self.lock().batches.clone()
    }

    pub fn singles(&self) -> Vec<LogSingle> {
        self.lock().singles.clone()
    }

    pub fn ratings(&self) -> Vec<RatingRequest> {
        self.lock().ratings.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.lock().fetches
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MemoryState {
    fn next_reply(&mut self) -> Option<String> {
        let reply = match (self.replies_sent, self.script.len()) {
            (_, 0) => return None,
            (0, _) => self.script[0].clone(),
            (_, 1) => self.script[0].clone(),
            (n, len) => self.script[1 + (n - 1) % (len - 1)].clone(),
        };
        self.replies_sent += 1;
        Some(reply)
    }
}

#[async_trait]
impl VivaBackend for MemoryBackend {
    async fn send_message(&self, req: &SendRequest) -> Result<SendResponse> {
        let mut state = self.lock();
        state.sent.push(req.clone());
        if req.text != START_SENTINEL {
            state
                .transcript
                .push(Message::new(Sender::Student, req.text.trim()));
        }
        let ai_text = state.next_reply();
        if let Some(reply) = &ai_text {
            state.transcript.push(Message::new(Sender::Ai, reply.clone()));
        }
        Ok(SendResponse {
            ai_text,
            status: Some("ok".to_string()),
            ..SendResponse::default()
        })
    }

    async fn end_session(&self, req: &EndRequest) -> Result<SendResponse> {
        let mut state = self.lock();
        state.ended.push(req.clone());
        if let Some(text) = &req.text {
            state.transcript.push(Message::new(Sender::Student, text.clone()));
        }
        Ok(state.end_response.clone())
    }

    async fn fetch_transcript(&self, _session: &SessionId) -> Result<TranscriptResponse> {
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        let mut state = self.lock();
        state.fetches += 1;
        if state.failing_fetches > 0 {
            state.failing_fetches -= 1;
            return Err(VivaError::Unavailable("transcript fetch failed".into()));
        }
        Ok(TranscriptResponse {
            messages: state.transcript.clone(),
        })
    }

    async fn log_events(&self, batch: &LogBatch) -> Result<()> {
        let mut state = self.lock();
        if state.failing_logs > 0 {
            state.failing_logs -= 1;
            return Err(VivaError::Unavailable("log endpoint failed".into()));
        }
        state.batches.push(batch.clone());
        Ok(())
    }

    async fn log_event(&self, event: &LogSingle) -> Result<()> {
        self.lock().singles.push(event.clone());
        Ok(())
    }

    async fn submit_rating(&self, req: &RatingRequest) -> Result<()> {
        self.lock().ratings.push(req.clone());
        Ok(())
    }

    async fn fetch_feedback(&self, _session: &SessionId) -> Result<FeedbackPoll> {
        Ok(self.lock().feedback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csrf_token_is_read_from_cookie_string() {
        let cookies = "sessionid=abc; csrftoken=tok123; theme=dark";
        assert_eq!(cookie_value(cookies, "csrftoken").as_deref(), Some("tok123"));
        assert_eq!(cookie_value(cookies, "missing"), None);
        assert_eq!(cookie_value("csrftoken=", "csrftoken"), None);
    }

    #[test]
    fn cookie_prefix_does_not_match_longer_names() {
        assert_eq!(cookie_value("csrftokenx=1; csrftoken=2", "csrftoken").as_deref(), Some("2"));
    }

    #[test]
    fn http_backend_sends_csrf_header_on_mutations_only() {
        let backend = HttpBackend::new(Config::default(), Some("csrftoken=abc".into())).unwrap();
        let post = backend.headers(true).unwrap();
        assert_eq!(post.get(CSRF_HEADER).unwrap(), "abc");
        assert_eq!(post.get(COOKIE).unwrap(), "csrftoken=abc");

        let get = backend.headers(false).unwrap();
        assert!(get.get(CSRF_HEADER).is_none());
        assert_eq!(get.get(COOKIE).unwrap(), "csrftoken=abc");
    }

    #[tokio::test]
    async fn memory_backend_stores_student_messages_but_not_sentinel() {
        let backend = MemoryBackend::new().with_script(vec!["Q1".into(), "Q2".into()]);
        let id = SessionId::new("1");
        backend
            .send_message(&SendRequest {
                session_id: id.clone(),
                text: START_SENTINEL.into(),
            })
            .await
            .unwrap();
        backend
            .send_message(&SendRequest {
                session_id: id.clone(),
                text: "my answer".into(),
            })
            .await
            .unwrap();

        let transcript = backend.fetch_transcript(&id).await.unwrap().messages;
        let texts: Vec<_> = transcript.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["Q1", "my answer", "Q2"]);
        assert_eq!(backend.sent().len(), 2);
    }

    #[tokio::test]
    async fn memory_backend_script_cycles_after_opening_question() {
        let backend = MemoryBackend::new().with_script(vec!["open".into(), "a".into(), "b".into()]);
        let mut state = backend.lock();
        let replies: Vec<_> = (0..5).filter_map(|_| state.next_reply()).collect();
        assert_eq!(replies, vec!["open", "a", "b", "a", "b"]);
    }

    #[tokio::test]
    async fn memory_backend_fails_scheduled_log_calls() {
        let backend = MemoryBackend::new();
        backend.fail_next_logs(1);
        let batch = LogBatch {
            session_id: SessionId::new("1"),
            events: vec![],
        };
        assert!(backend.log_events(&batch).await.is_err());
        assert!(backend.log_events(&batch).await.is_ok());
        assert_eq!(backend.batches().len(), 1);
    }
}
