// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Authenticated print API client.
//
// One call goes through at most two sends and one refresh:
//
//   Sending ─┬─> Success
//            ├─> Failure                         (transport error / rejection)
//            └─> NeedsRefresh ─> Refreshing ─┬─> RetrySending ─┬─> Success
//                                            │                 └─> Failure
//                                            └─> RefreshFailed
//
// The credential is shared by every call.  Refreshes are single-flight: a call
// that hits 401 while another call is already refreshing waits for it and
// reuses the new token instead of refreshing again.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use tagprint_core::error::{Result, TagprintError};
use tagprint_core::store::CredentialStore;
use tagprint_core::types::Credential;

use crate::oauth::TokenRefresher;
use crate::transport::{HttpReply, HttpTransport, ReplyClass, RequestSpec};

/// Print API client that renews its own credential.
pub struct AuthenticatedPrintClient {
    transport: Arc<dyn HttpTransport>,
    refresher: Arc<dyn TokenRefresher>,
    store: Option<Arc<dyn CredentialStore>>,
    credential: RwLock<Credential>,
    /// Held for the whole duration of a refresh.
    refresh_gate: Mutex<()>,
}

impl AuthenticatedPrintClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        refresher: Arc<dyn TokenRefresher>,
        credential: Credential,
    ) -> Self {
        Self {
            transport,
            refresher,
            store: None,
            credential: RwLock::new(credential),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Persist refreshed credentials to `store`.
    pub fn with_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Snapshot of the credential currently in use.
    pub async fn credential(&self) -> Credential {
        self.credential.read().await.clone()
    }

    /// Send `request` and decode the JSON body of a successful reply.
    ///
    /// An empty body decodes as JSON `null`.
    pub async fn call<T: DeserializeOwned>(&self, request: &RequestSpec) -> Result<T> {
        let reply = self.exchange(request).await?;
        let body = if reply.body.trim().is_empty() {
            "null"
        } else {
            reply.body.as_str()
        };
        Ok(serde_json::from_str(body)?)
    }

    /// Send `request`, refreshing the credential and retrying once on 401/403.
    ///
    /// Returns the successful reply; every terminal failure is an error.
    #[instrument(skip_all, fields(method = ?request.method, url = %request.url))]
    pub async fn exchange(&self, request: &RequestSpec) -> Result<HttpReply> {
        let token = self.credential.read().await.access_token.clone();
        let reply = self.transport.send(request, &token).await?;

        if reply.class() != ReplyClass::AuthExpired {
            return finish(reply);
        }

        info!(status = reply.status, "access token rejected, refreshing");
        let fresh = self.refresh_after(&token).await?;

        let retry = self.transport.send(request, &fresh).await?;
        if retry.class() == ReplyClass::AuthExpired {
            warn!(status = retry.status, "refreshed token rejected as well");
        }
        finish(retry)
    }

    /// Refresh the credential unless a concurrent call already replaced
    /// `stale_token`, and return the access token to retry with.
    async fn refresh_after(&self, stale_token: &str) -> Result<String> {
        let _gate = self.refresh_gate.lock().await;

        let refresh_token = {
            let current = self.credential.read().await;
            if current.access_token != stale_token {
                debug!("credential already refreshed by a concurrent call");
                return Ok(current.access_token.clone());
            }
            current.refresh_token.clone()
        };

        let grant = self.refresher.refresh(&refresh_token).await?;

        let updated = {
            let mut current = self.credential.write().await;
            current.apply_grant(grant, Utc::now());
            current.clone()
        };

        if let Some(store) = &self.store {
            // Not fatal: the in-memory credential is already updated.
            if let Err(e) = store.save(&updated).await {
                warn!(error = %e, "could not persist refreshed credential");
            }
        }

        info!("access token refreshed");
        Ok(updated.access_token)
    }
}

fn finish(reply: HttpReply) -> Result<HttpReply> {
    match reply.class() {
        ReplyClass::Success => Ok(reply),
        ReplyClass::AuthExpired | ReplyClass::Rejected => {
            warn!(status = reply.status, "print API rejected request");
            Err(TagprintError::RemoteRejected {
                status: reply.status,
                body: reply.body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tagprint_core::store::MemoryCredentialStore;
    use tagprint_core::types::TokenGrant;

    /// Replays canned replies and records the token used for each send.
    #[derive(Default)]
    struct ScriptedTransport {
        replies: StdMutex<VecDeque<Result<HttpReply>>>,
        tokens: StdMutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<HttpReply>>) -> Arc<Self> {
            Arc::new(Self {
                replies: StdMutex::new(replies.into()),
                tokens: StdMutex::default(),
            })
        }

        fn sent_tokens(&self) -> Vec<String> {
            self.tokens.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(&self, _request: &RequestSpec, access_token: &str) -> Result<HttpReply> {
            self.tokens.lock().unwrap().push(access_token.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected request #{}", self.tokens.lock().unwrap().len()))
        }
    }

    /// Accepts only `valid_token`; anything else gets a 401.
    struct TokenCheckingTransport {
        valid_token: String,
        sends: AtomicUsize,
    }

    #[async_trait]
    impl HttpTransport for TokenCheckingTransport {
        async fn send(&self, _request: &RequestSpec, access_token: &str) -> Result<HttpReply> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if access_token == self.valid_token {
                Ok(HttpReply::new(200, r#"{"success":true}"#))
            } else {
                Ok(HttpReply::new(401, "token expired"))
            }
        }
    }

    struct FakeRefresher {
        outcome: fn() -> Result<TokenGrant>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl FakeRefresher {
        fn granting() -> Arc<Self> {
            Arc::new(Self {
                outcome: || {
                    Ok(TokenGrant {
                        access_token: "fresh".into(),
                        refresh_token: None,
                        expires_in: Some(3600),
                        expiry_date: None,
                        token_type: Some("Bearer".into()),
                    })
                },
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                outcome: || Err(TagprintError::AuthRefreshFailed("invalid_grant".into())),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenRefresher for FakeRefresher {
        async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
            assert_eq!(refresh_token, "refresh-1");
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            (self.outcome)()
        }
    }

    fn stale_credential() -> Credential {
        Credential::new("stale", "refresh-1")
    }

    fn request() -> RequestSpec {
        RequestSpec::post("https://print.test/submit").field("printerid", "p1")
    }

    #[tokio::test]
    async fn direct_success_sends_once() {
        let transport = ScriptedTransport::new(vec![Ok(HttpReply::new(200, r#"{"success":true}"#))]);
        let refresher = FakeRefresher::granting();
        let client =
            AuthenticatedPrintClient::new(transport.clone(), refresher.clone(), stale_credential());

        let body: Value = client.call(&request()).await.expect("call");
        assert_eq!(body, json!({"success": true}));
        assert_eq!(transport.sent_tokens(), vec!["stale"]);
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn unauthorized_then_refresh_retries_once_with_new_token() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpReply::new(401, "expired")),
            Ok(HttpReply::new(200, r#"{"success":true,"job":{"id":"j1"}}"#)),
        ]);
        let refresher = FakeRefresher::granting();
        let store = Arc::new(MemoryCredentialStore::new());
        let client =
            AuthenticatedPrintClient::new(transport.clone(), refresher.clone(), stale_credential())
                .with_store(store.clone());

        let body: Value = client.call(&request()).await.expect("call");
        assert_eq!(body["job"]["id"], "j1");
        assert_eq!(transport.sent_tokens(), vec!["stale", "fresh"]);
        assert_eq!(refresher.calls(), 1);

        let current = client.credential().await;
        assert_eq!(current.access_token, "fresh");
        assert_eq!(current.refresh_token, "refresh-1");

        assert_eq!(store.save_count(), 1);
        let saved = store.load().await.expect("load").expect("saved");
        assert_eq!(saved.access_token, "fresh");
    }

    #[tokio::test]
    async fn forbidden_also_triggers_refresh() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpReply::new(403, "forbidden")),
            Ok(HttpReply::new(200, "{}")),
        ]);
        let refresher = FakeRefresher::granting();
        let client =
            AuthenticatedPrintClient::new(transport.clone(), refresher.clone(), stale_credential());

        let _: Value = client.call(&request()).await.expect("call");
        assert_eq!(refresher.calls(), 1);
        assert_eq!(transport.sent_tokens().len(), 2);
    }

    #[tokio::test]
    async fn failed_refresh_is_fatal_and_sends_nothing_more() {
        let transport = ScriptedTransport::new(vec![Ok(HttpReply::new(401, "expired"))]);
        let refresher = FakeRefresher::failing();
        let store = Arc::new(MemoryCredentialStore::new());
        let client =
            AuthenticatedPrintClient::new(transport.clone(), refresher.clone(), stale_credential())
                .with_store(store.clone());

        let err = client.call::<Value>(&request()).await.unwrap_err();
        assert!(matches!(err, TagprintError::AuthRefreshFailed(_)), "{err}");
        assert_eq!(transport.sent_tokens().len(), 1);
        assert_eq!(store.save_count(), 0);
        assert_eq!(client.credential().await.access_token, "stale");
    }

    #[tokio::test]
    async fn retry_is_not_repeated_when_new_token_is_rejected() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpReply::new(401, "expired")),
            Ok(HttpReply::new(401, "still expired")),
        ]);
        let refresher = FakeRefresher::granting();
        let client =
            AuthenticatedPrintClient::new(transport.clone(), refresher.clone(), stale_credential());

        let err = client.call::<Value>(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            TagprintError::RemoteRejected { status: 401, .. }
        ));
        assert_eq!(transport.sent_tokens().len(), 2);
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn server_error_is_rejected_without_retry() {
        let transport = ScriptedTransport::new(vec![Ok(HttpReply::new(500, "backend down"))]);
        let refresher = FakeRefresher::granting();
        let client =
            AuthenticatedPrintClient::new(transport.clone(), refresher.clone(), stale_credential());

        match client.call::<Value>(&request()).await {
            Err(TagprintError::RemoteRejected { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "backend down");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(transport.sent_tokens().len(), 1);
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn transport_error_is_not_retried() {
        let transport = ScriptedTransport::new(vec![Err(TagprintError::Transport(
            "connection reset".into(),
        ))]);
        let refresher = FakeRefresher::granting();
        let client =
            AuthenticatedPrintClient::new(transport.clone(), refresher.clone(), stale_credential());

        let err = client.call::<Value>(&request()).await.unwrap_err();
        assert!(matches!(err, TagprintError::Transport(_)));
        assert_eq!(transport.sent_tokens().len(), 1);
    }

    #[tokio::test]
    async fn empty_success_body_decodes_as_null() {
        let transport = ScriptedTransport::new(vec![Ok(HttpReply::new(204, ""))]);
        let client = AuthenticatedPrintClient::new(
            transport,
            FakeRefresher::granting(),
            stale_credential(),
        );
        let body: Value = client.call(&request()).await.expect("call");
        assert!(body.is_null());
    }

    #[tokio::test]
    async fn malformed_success_body_is_a_serialization_error() {
        let transport = ScriptedTransport::new(vec![Ok(HttpReply::new(200, "<html>"))]);
        let client = AuthenticatedPrintClient::new(
            transport,
            FakeRefresher::granting(),
            stale_credential(),
        );
        let err = client.call::<Value>(&request()).await.unwrap_err();
        assert!(matches!(err, TagprintError::Serialization(_)));
    }

    #[tokio::test]
    async fn concurrent_unauthorized_calls_share_one_refresh() {
        let transport = Arc::new(TokenCheckingTransport {
            valid_token: "fresh".into(),
            sends: AtomicUsize::new(0),
        });
        let refresher = Arc::new(FakeRefresher {
            delay: Duration::from_millis(20),
            ..Arc::into_inner(FakeRefresher::granting()).expect("sole owner")
        });
        let store = Arc::new(MemoryCredentialStore::new());
        let client =
            AuthenticatedPrintClient::new(transport.clone(), refresher.clone(), stale_credential())
                .with_store(store.clone());

        let (req_a, req_b) = (request(), request());
        let (a, b) = tokio::join!(
            client.call::<Value>(&req_a),
            client.call::<Value>(&req_b)
        );
        a.expect("first call");
        b.expect("second call");

        assert_eq!(refresher.calls(), 1);
        assert_eq!(store.save_count(), 1);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 4);
    }

    /// Store whose writes always fail.
    #[derive(Default)]
    struct BrokenStore {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl CredentialStore for BrokenStore {
        async fn load(&self) -> Result<Option<Credential>> {
            Ok(None)
        }

        async fn save(&self, _credential: &Credential) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(TagprintError::Database("disk full".into()))
        }
    }

    #[tokio::test]
    async fn failed_credential_save_does_not_fail_the_call() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpReply::new(401, "expired")),
            Ok(HttpReply::new(200, r#"{"success":true}"#)),
        ]);
        let store = Arc::new(BrokenStore::default());
        let client = AuthenticatedPrintClient::new(
            transport.clone(),
            FakeRefresher::granting(),
            stale_credential(),
        )
        .with_store(store.clone());

        let body: Value = client.call(&request()).await.expect("call");
        assert_eq!(body, json!({"success": true}));
        assert_eq!(store.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(transport.sent_tokens(), vec!["stale", "fresh"]);
        assert_eq!(client.credential().await.access_token, "fresh");
    }

    #[tokio::test]
    async fn absurd_token_lifetime_still_refreshes() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpReply::new(401, "expired")),
            Ok(HttpReply::new(200, r#"{"success":true}"#)),
        ]);
        let refresher = Arc::new(FakeRefresher {
            outcome: || {
                Ok(TokenGrant {
                    access_token: "fresh".into(),
                    refresh_token: None,
                    expires_in: Some(i64::MAX),
                    expiry_date: None,
                    token_type: None,
                })
            },
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        });
        let client = AuthenticatedPrintClient::new(transport, refresher, stale_credential());

        let _: Value = client.call(&request()).await.expect("call");
        let current = client.credential().await;
        assert_eq!(current.access_token, "fresh");
        assert_eq!(current.expiry_date, None);
    }
}
