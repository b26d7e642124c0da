//! Test doubles
//!
//! A scripted HTTP server for exercising the real clients, and in-memory
//! mocks of the identity and backend seams.

use crate::api::{ApiError, ChatBackend, ChatReply};
use crate::auth::{
    Account, AuthError, Credential, IdentityProvider, ProviderGrant, SignedIn, TokenSource,
};
use crate::model::{Conversation, Message};
use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use chrono::Duration;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Yield until `ready` holds. Panics if it never does.
pub async fn wait_until(what: &str, ready: impl Fn() -> bool) {
    for _ in 0..10_000 {
        if ready() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("timed out waiting for {what}");
}

/// Per-call gates, created on first use by either side
#[derive(Default)]
struct Gates {
    gates: Mutex<HashMap<usize, Arc<Semaphore>>>,
}

impl Gates {
    fn gate(&self, index: usize) -> Arc<Semaphore> {
        self.gates
            .lock()
            .unwrap()
            .entry(index)
            .or_insert_with(|| Arc::new(Semaphore::new(0)))
            .clone()
    }

    fn release(&self, index: usize) {
        self.gate(index).add_permits(1);
    }

    async fn pass(&self, index: usize) {
        let gate = self.gate(index);
        let _permit = gate.acquire().await.unwrap();
    }
}

// ============================================================================
// Fake HTTP server
// ============================================================================

/// A request as seen by [`FakeServer`]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: String,
}

#[derive(Default)]
struct FakeState {
    responses: Mutex<HashMap<String, (u16, String, &'static str)>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Local HTTP server answering scripted responses by path.
///
/// Unscripted paths answer 404. Every request is recorded.
pub struct FakeServer {
    pub base_url: String,
    state: Arc<FakeState>,
}

impl FakeServer {
    pub async fn start() -> Self {
        let state = Arc::new(FakeState::default());
        let router = Router::new().fallback(handle).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    /// Answer `path` with a plain-text body
    pub fn respond(&self, path: &str, status: u16, body: &str) {
        self.state
            .responses
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body.to_string(), "text/plain"));
    }

    /// Answer `path` with a JSON body
    pub fn respond_json(&self, path: &str, status: u16, body: &serde_json::Value) {
        self.state.responses.lock().unwrap().insert(
            path.to_string(),
            (status, body.to_string(), "application/json"),
        );
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

async fn handle(
    State(state): State<Arc<FakeState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let path = uri.path().to_string();
    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.to_string(),
        path: path.clone(),
        query: uri.query().map(str::to_string),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });

    let scripted = state.responses.lock().unwrap().get(&path).cloned();
    match scripted {
        Some((status, body, content_type)) => (
            StatusCode::from_u16(status).unwrap(),
            [(header::CONTENT_TYPE, content_type)],
            body,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, format!("no response scripted for {path}"))
            .into_response(),
    }
}

/// Base URL of a port nobody is listening on
pub async fn unreachable_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

// ============================================================================
// Token source
// ============================================================================

/// Hands out a fixed token, or nothing
pub struct StaticTokenSource {
    token: Result<String, AuthError>,
}

impl StaticTokenSource {
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token: token.map(str::to_string).ok_or(AuthError::Unavailable),
        }
    }

    /// Every read fails with `error`
    pub fn failing(error: AuthError) -> Self {
        Self { token: Err(error) }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn current_token(&self) -> Result<Credential, AuthError> {
        self.token.clone().map(Credential::new)
    }
}

// ============================================================================
// Mock identity provider
// ============================================================================

/// Identity provider with scripted sign-in outcomes.
///
/// Sign-ins succeed for any email unless an outcome is queued. `get_token`
/// issues a new one-hour credential per call while a user is signed in.
#[derive(Default)]
pub struct MockIdentityProvider {
    user: Mutex<Option<Account>>,
    sign_in_results: Mutex<VecDeque<Result<SignedIn, AuthError>>>,
    token_errors: Mutex<VecDeque<AuthError>>,
    hold_sign_ins: AtomicBool,
    sign_in_gates: Gates,
    hold_tokens: AtomicBool,
    token_gates: Gates,
    sign_in_calls: AtomicUsize,
    token_calls: AtomicUsize,
    forced_refreshes: AtomicUsize,
    sign_out_calls: AtomicUsize,
    issued: AtomicUsize,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend `uid` is already signed in
    pub fn sign_in_as(&self, uid: &str) {
        *self.user.lock().unwrap() = Some(Account {
            uid: uid.to_string(),
            email: None,
        });
    }

    pub fn queue_sign_in(&self, result: Result<SignedIn, AuthError>) {
        self.sign_in_results.lock().unwrap().push_back(result);
    }

    pub fn queue_token_error(&self, error: AuthError) {
        self.token_errors.lock().unwrap().push_back(error);
    }

    /// Park every sign-in until [`Self::release_sign_in`]
    pub fn hold_sign_ins(&self) {
        self.hold_sign_ins.store(true, Ordering::SeqCst);
    }

    /// Let the `index`th sign-in call complete
    pub fn release_sign_in(&self, index: usize) {
        self.sign_in_gates.release(index);
    }

    pub async fn wait_for_sign_in_calls(&self, n: usize) {
        wait_until("sign-in calls", || self.sign_in_calls() >= n).await;
    }

    /// Park every `get_token` call until [`Self::release_token`]
    pub fn hold_tokens(&self) {
        self.hold_tokens.store(true, Ordering::SeqCst);
    }

    pub fn release_token(&self, index: usize) {
        self.token_gates.release(index);
    }

    pub async fn wait_for_token_calls(&self, n: usize) {
        wait_until("token calls", || self.token_calls() >= n).await;
    }

    pub fn signed_in_user(&self) -> Option<String> {
        self.user.lock().unwrap().as_ref().map(|a| a.uid.clone())
    }

    pub fn sign_in_calls(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn forced_refreshes(&self) -> usize {
        self.forced_refreshes.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    fn issue(&self) -> Credential {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        Credential::expiring_in(format!("token-{n}"), Duration::hours(1))
    }

    async fn complete_sign_in(&self, email: Option<&str>) -> Result<SignedIn, AuthError> {
        let index = self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        let queued = self.sign_in_results.lock().unwrap().pop_front();
        if self.hold_sign_ins.load(Ordering::SeqCst) {
            self.sign_in_gates.pass(index).await;
        }

        let result = queued.unwrap_or_else(|| {
            Ok(SignedIn {
                account: Account {
                    uid: format!("uid-{index}"),
                    email: email.map(str::to_string),
                },
                credential: self.issue(),
            })
        });
        if let Ok(signed_in) = &result {
            *self.user.lock().unwrap() = Some(signed_in.account.clone());
        }
        result
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn sign_up(&self, email: &str, _password: &str) -> Result<SignedIn, AuthError> {
        self.complete_sign_in(Some(email)).await
    }

    async fn sign_in(&self, email: &str, _password: &str) -> Result<SignedIn, AuthError> {
        self.complete_sign_in(Some(email)).await
    }

    async fn sign_in_with_provider(&self, _grant: &ProviderGrant) -> Result<SignedIn, AuthError> {
        self.complete_sign_in(None).await
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        *self.user.lock().unwrap() = None;
        Ok(())
    }

    async fn get_token(&self, force_refresh: bool) -> Result<Credential, AuthError> {
        let index = self.token_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_tokens.load(Ordering::SeqCst) {
            self.token_gates.pass(index).await;
        }
        if force_refresh {
            self.forced_refreshes.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(err) = self.token_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        if self.user.lock().unwrap().is_none() {
            return Err(AuthError::Unavailable);
        }
        Ok(self.issue())
    }
}

// ============================================================================
// Mock chat backend
// ============================================================================

/// A call made against [`MockChatBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    ListConversations,
    CreateConversation {
        title: String,
    },
    GetMessages {
        conversation_id: String,
    },
    SendMessage {
        conversation_id: String,
        content: String,
    },
}

/// Backend returning queued results.
///
/// Results are taken when a call starts. Message loads and sends can be held
/// until released, so tests decide the completion order.
#[derive(Default)]
pub struct MockChatBackend {
    conversations: Mutex<VecDeque<Result<Vec<Conversation>, ApiError>>>,
    created: Mutex<VecDeque<Result<Conversation, ApiError>>>,
    messages: Mutex<VecDeque<Result<Vec<Message>, ApiError>>>,
    replies: Mutex<VecDeque<Result<ChatReply, ApiError>>>,
    calls: Mutex<Vec<BackendCall>>,
    hold_messages: AtomicBool,
    hold_replies: AtomicBool,
    message_gates: Gates,
    reply_gates: Gates,
    message_calls: AtomicUsize,
    send_calls: AtomicUsize,
}

impl MockChatBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_conversations(&self, result: Result<Vec<Conversation>, ApiError>) {
        self.conversations.lock().unwrap().push_back(result);
    }

    pub fn queue_created(&self, result: Result<Conversation, ApiError>) {
        self.created.lock().unwrap().push_back(result);
    }

    pub fn queue_messages(&self, result: Result<Vec<Message>, ApiError>) {
        self.messages.lock().unwrap().push_back(result);
    }

    pub fn queue_reply(&self, result: Result<ChatReply, ApiError>) {
        self.replies.lock().unwrap().push_back(result);
    }

    /// Park every `get_messages` call until released
    pub fn hold_messages(&self) {
        self.hold_messages.store(true, Ordering::SeqCst);
    }

    /// Let the `index`th `get_messages` call complete
    pub fn release_messages(&self, index: usize) {
        self.message_gates.release(index);
    }

    /// Park every `send_message` call until released
    pub fn hold_replies(&self) {
        self.hold_replies.store(true, Ordering::SeqCst);
    }

    /// Let the `index`th `send_message` call complete
    pub fn release_reply(&self, index: usize) {
        self.reply_gates.release(index);
    }

    pub async fn wait_for_message_calls(&self, n: usize) {
        wait_until("get_messages calls", || self.message_calls() >= n).await;
    }

    pub async fn wait_for_send_calls(&self, n: usize) {
        wait_until("send_message calls", || self.send_calls() >= n).await;
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn message_calls(&self) -> usize {
        self.message_calls.load(Ordering::SeqCst)
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }
}

fn nothing_queued() -> ApiError {
    ApiError::Network("No mock response queued".to_string())
}

#[async_trait]
impl ChatBackend for MockChatBackend {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        self.record(BackendCall::ListConversations);
        self.conversations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn create_conversation(&self, title: &str) -> Result<Conversation, ApiError> {
        self.record(BackendCall::CreateConversation {
            title: title.to_string(),
        });
        self.created
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(nothing_queued()))
    }

    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>, ApiError> {
        self.record(BackendCall::GetMessages {
            conversation_id: conversation_id.to_string(),
        });
        let queued = self.messages.lock().unwrap().pop_front();
        let index = self.message_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_messages.load(Ordering::SeqCst) {
            self.message_gates.pass(index).await;
        }
        queued.unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> Result<ChatReply, ApiError> {
        self.record(BackendCall::SendMessage {
            conversation_id: conversation_id.to_string(),
            content: content.to_string(),
        });
        let queued = self.replies.lock().unwrap().pop_front();
        let index = self.send_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_replies.load(Ordering::SeqCst) {
            self.reply_gates.pass(index).await;
        }
        queued.unwrap_or_else(|| Err(nothing_queued()))
    }
}

/// Backend reply with the given id and content
pub fn reply(message_id: &str, content: &str) -> ChatReply {
    ChatReply {
        message_id: message_id.to_string(),
        content: content.to_string(),
        conversation_id: None,
    }
}
