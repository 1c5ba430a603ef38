// SPDX-FileCopyrightText: 2022-2024 Noah Fontes
//
// SPDX-License-Identifier: Apache-2.0

//! The session manager: the one owner of the current session and the only
//! writer of its shadow copy in storage.

use std::{
    fmt,
    future::Future,
    sync::atomic::{AtomicUsize, Ordering},
};

use futures_util::lock::Mutex;
use log::{debug, error, info, warn};
use secrecy::{ExposeSecret as _, SecretString};
use tokio::sync::watch;

use crate::{
    auth,
    error::{self, Result, Stage},
    session::{self, Session},
    storage,
};

#[derive(Clone, Debug)]
pub(crate) enum State {
    Uninitialized,
    Loading,
    Authenticated(Session),
    Anonymous,
}

impl State {
    pub(crate) const fn session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated(session) => Some(session),
            Self::Uninitialized | Self::Loading | Self::Anonymous => None,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("uninitialized"),
            Self::Loading => f.write_str("loading"),
            Self::Authenticated(session) => write!(f, "signed in as {}", session.email()),
            Self::Anonymous => f.write_str("signed out"),
        }
    }
}

/// Marks an operation as in flight until dropped, including when the
/// operation's future is dropped before completion.
struct InFlight<'counter>(&'counter AtomicUsize);

impl<'counter> InFlight<'counter> {
    fn enter(counter: &'counter AtomicUsize) -> Self {
        _ = counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        _ = self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

pub(crate) struct Manager<Storage: storage::Storage, Api: auth::Api> {
    // Held across every operation that reads then writes storage, which also
    // serializes concurrent logins.
    storage: Mutex<Storage>,
    api: Api,
    state: watch::Sender<State>,
    in_flight: AtomicUsize,
}

impl<Storage: storage::Storage, Api: auth::Api> Manager<Storage, Api> {
    pub(crate) fn new(storage: Storage, api: Api) -> Self {
        let (state, _) = watch::channel(State::Uninitialized);
        Self {
            storage: Mutex::new(storage),
            api,
            state,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Restores whatever session storage holds. No network requests are
    /// made; use [`Manager::revalidate`] to check the token with the server.
    pub(crate) async fn initialize(&self) {
        let _in_flight = InFlight::enter(&self.in_flight);
        _ = self.state.send_replace(State::Loading);

        let mut storage = self.storage.lock().await;
        let next = match session::load(&mut *storage).await {
            Ok(Some(session)) => {
                info!("Restored the session of {}", session.email());
                State::Authenticated(session)
            }
            Ok(None) => State::Anonymous,
            Err(e) => {
                warn!("Could not read the stored session, continuing signed out: {}", e);
                State::Anonymous
            }
        };
        _ = self.state.send_replace(next);
    }

    /// Signs in, reporting only whether it worked. The reason for a failure
    /// is logged.
    pub(crate) async fn login(&self, email: &str, password: &SecretString) -> bool {
        match self.try_login(email, password).await {
            Ok(_) => true,
            Err(e) => {
                error!("Signing in as {} failed: {}", email, e);
                false
            }
        }
    }

    /// Signs in and replaces the current session. On failure the current
    /// session and storage are left as they were.
    pub(crate) async fn try_login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Session, error::Login> {
        let _in_flight = InFlight::enter(&self.in_flight);
        if email.trim().is_empty() || password.expose_secret().is_empty() {
            return Err(error::Login::EmptyCredentials);
        }

        let mut storage = self.storage.lock().await;
        let token = self.api.exchange_credentials(email, password).await?;
        let profile = self.api.fetch_profile(&token).await?;
        let session =
            Session::from_profile(profile, token).map_err(|e| error::Login::MalformedResponse {
                stage: Stage::Profile,
                reason: e.to_string(),
            })?;

        session::persist(&mut *storage, &session)
            .await
            .map_err(|e| error::Login::Persist(Box::new(e)))?;
        info!(
            "Signed in as {} ({}, {})",
            session.email(),
            session.role(),
            session.department()
        );
        _ = self.state.send_replace(State::Authenticated(session.clone()));
        Ok(session)
    }

    /// Forgets the current session, if any. The in-memory session is gone
    /// even when removing the stored copy fails.
    pub(crate) async fn logout(&self) -> Result<()> {
        let mut storage = self.storage.lock().await;
        if let State::Authenticated(session) = self.state.send_replace(State::Anonymous) {
            info!("Signed out {}", session.email());
        }
        session::clear(&mut *storage).await
    }

    /// Asks the server whether the current token is still good. A rejected
    /// token ends the session; a returned profile refreshes it. Other failures
    /// leave the session alone.
    pub(crate) async fn revalidate(&self) -> Result<Option<Session>> {
        let _in_flight = InFlight::enter(&self.in_flight);
        let mut storage = self.storage.lock().await;
        let Some(current) = self.current_session() else {
            return Ok(None);
        };

        match self.api.fetch_profile(current.auth_token()).await {
            Ok(profile) => {
                let refreshed = Session::from_profile(profile, current.auth_token().clone())
                    .map_err(|e| error::Login::MalformedResponse {
                        stage: Stage::Profile,
                        reason: e.to_string(),
                    })?;
                session::persist(&mut *storage, &refreshed).await?;
                debug!("The server still accepts the session of {}", refreshed.email());
                _ = self
                    .state
                    .send_replace(State::Authenticated(refreshed.clone()));
                Ok(Some(refreshed))
            }
            Err(e) if e.is_rejection() => {
                warn!("Ending the session of {}: {}", current.email(), e);
                _ = self.state.send_replace(State::Anonymous);
                session::clear(&mut *storage).await?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Runs an authenticated request with the current token. If the server
    /// rejects the token, the session it belonged to is ended.
    pub(crate) async fn authorized<T, F, Fut>(&self, request: F) -> Result<T>
    where
        F: FnOnce(SecretString) -> Fut,
        Fut: Future<Output = Result<T, error::Document>>,
    {
        let token = self
            .current_session()
            .ok_or(error::Error::NotAuthenticated)?
            .auth_token()
            .clone();

        match request(token.clone()).await {
            Err(error::Document::TokenRejected) => {
                self.invalidate(&token).await?;
                Err(error::Document::TokenRejected.into())
            }
            result => result.map_err(Into::into),
        }
    }

    async fn invalidate(&self, token: &SecretString) -> Result<()> {
        let mut storage = self.storage.lock().await;
        // A newer login may have replaced the session while the request ran.
        let Some(current) = self.current_session().filter(|s| s.holds_token(token)) else {
            return Ok(());
        };

        warn!("The server no longer accepts the session of {}", current.email());
        _ = self.state.send_replace(State::Anonymous);
        session::clear(&mut *storage).await
    }

    pub(crate) fn current_session(&self) -> Option<Session> {
        self.state.borrow().session().cloned()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    // LINT: Part of the manager's contract for embedders that drive a user
    // interface; the command-line client never observes it mid-operation.
    #[allow(dead_code)]
    pub(crate) fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) > 0
            || matches!(*self.state.borrow(), State::Uninitialized | State::Loading)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex as StdMutex};

    use async_trait::async_trait;
    use reqwest::StatusCode;

    use super::*;
    use crate::{
        auth::Profile,
        session::{tests::rajesh, TOKEN_KEY, USER_KEY},
        storage::{Memory, Storage as _},
    };

    #[derive(Copy, Clone, Debug, PartialEq)]
    enum Call {
        Exchange,
        Profile,
    }

    enum Reply {
        Profile(Profile),
        Status(StatusCode),
    }

    /// Answers with canned replies and records the order of calls.
    struct Scripted {
        token: Option<&'static str>,
        profile: Reply,
        calls: Arc<StdMutex<Vec<Call>>>,
    }

    fn status_error(stage: Stage, status: StatusCode) -> error::Login {
        if status.is_server_error() {
            error::Login::Server { stage, status }
        } else {
            error::Login::Rejected { stage, status }
        }
    }

    #[async_trait]
    impl auth::Api for Scripted {
        async fn exchange_credentials(
            &self,
            _email: &str,
            _password: &SecretString,
        ) -> Result<SecretString, error::Login> {
            self.calls.lock().unwrap().push(Call::Exchange);
            self.token
                .map(|t| SecretString::new(t.to_owned()))
                .ok_or_else(|| status_error(Stage::Credentials, StatusCode::UNAUTHORIZED))
        }

        async fn fetch_profile(&self, token: &SecretString) -> Result<Profile, error::Login> {
            self.calls.lock().unwrap().push(Call::Profile);
            assert_eq!(Some(token.expose_secret().as_str()), self.token);
            match &self.profile {
                Reply::Profile(profile) => Ok(profile.clone()),
                Reply::Status(status) => Err(status_error(Stage::Profile, *status)),
            }
        }
    }

    fn rajesh_profile() -> Profile {
        serde_json::from_value(serde_json::json!({
            "id": 1,
            "name": "Rajesh Kumar",
            "email": "admin@kmrl.co.in",
            "role": "Chief Safety Officer",
            "department": "Operations & Safety",
        }))
        .unwrap()
    }

    fn scripted(token: Option<&'static str>, profile: Reply) -> (Scripted, Arc<StdMutex<Vec<Call>>>) {
        let calls = Arc::new(StdMutex::new(Vec::new()));
        (
            Scripted {
                token,
                profile,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }

    fn password(value: &str) -> SecretString {
        SecretString::new(value.to_owned())
    }

    async fn stored(storage: &Memory) -> (Option<String>, Option<String>) {
        let mut probe = storage.clone();
        (
            probe.get(USER_KEY).await.unwrap(),
            probe.get(TOKEN_KEY).await.unwrap(),
        )
    }

    fn assert_is_rajesh(session: &Session, token: &str) {
        assert_eq!(session.user_id(), "1");
        assert_eq!(session.display_name(), "Rajesh Kumar");
        assert_eq!(session.email(), "admin@kmrl.co.in");
        assert_eq!(session.role(), "Chief Safety Officer");
        assert_eq!(session.department(), "Operations & Safety");
        assert_eq!(session.auth_token().expose_secret(), token);
    }

    #[tokio::test]
    async fn successful_login_becomes_the_session() {
        let storage = Memory::new();
        let (api, calls) = scripted(Some("tok-1"), Reply::Profile(rajesh_profile()));
        let manager = Manager::new(storage.clone(), api);
        manager.initialize().await;

        assert!(manager.login("admin@kmrl.co.in", &password("admin123")).await);
        assert_is_rajesh(&manager.current_session().unwrap(), "tok-1");
        assert_eq!(*calls.lock().unwrap(), vec![Call::Exchange, Call::Profile]);
        assert!(!manager.is_loading());

        let (user, token) = stored(&storage).await;
        assert!(user.is_some());
        assert_eq!(token.as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn rejected_credentials_never_fetch_a_profile() {
        let storage = Memory::new();
        let (api, calls) = scripted(None, Reply::Profile(rajesh_profile()));
        let manager = Manager::new(storage.clone(), api);
        manager.initialize().await;

        assert!(!manager.login("wrong@x.com", &password("bad")).await);
        assert!(manager.current_session().is_none());
        assert_eq!(*calls.lock().unwrap(), vec![Call::Exchange]);
        assert_eq!(stored(&storage).await, (None, None));
        assert!(!manager.is_loading());
    }

    #[tokio::test]
    async fn empty_credentials_make_no_requests() {
        let (api, calls) = scripted(Some("tok-1"), Reply::Profile(rajesh_profile()));
        let manager = Manager::new(Memory::new(), api);
        manager.initialize().await;

        assert!(matches!(
            manager.try_login("", &password("admin123")).await,
            Err(error::Login::EmptyCredentials)
        ));
        assert!(matches!(
            manager.try_login("admin@kmrl.co.in", &password("")).await,
            Err(error::Login::EmptyCredentials)
        ));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn restores_a_stored_session_without_requests() {
        let mut storage = Memory::new();
        session::persist(&mut storage, &rajesh("tok-1")).await.unwrap();

        let (api, calls) = scripted(None, Reply::Status(StatusCode::INTERNAL_SERVER_ERROR));
        let manager = Manager::new(storage, api);
        assert!(manager.is_loading());
        manager.initialize().await;

        assert!(!manager.is_loading());
        assert_is_rajesh(&manager.current_session().unwrap(), "tok-1");
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn login_survives_a_reload() {
        let storage = Memory::new();
        let (api, _) = scripted(Some("tok-1"), Reply::Profile(rajesh_profile()));
        let first = Manager::new(storage.clone(), api);
        first.initialize().await;
        assert!(first.login("admin@kmrl.co.in", &password("admin123")).await);
        drop(first);

        let (api, calls) = scripted(None, Reply::Status(StatusCode::INTERNAL_SERVER_ERROR));
        let second = Manager::new(storage, api);
        second.initialize().await;
        assert_is_rajesh(&second.current_session().unwrap(), "tok-1");
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn logout_twice_is_fine() {
        let mut storage = Memory::new();
        session::persist(&mut storage, &rajesh("tok-1")).await.unwrap();
        let (api, _) = scripted(None, Reply::Status(StatusCode::INTERNAL_SERVER_ERROR));
        let manager = Manager::new(storage.clone(), api);
        manager.initialize().await;

        manager.logout().await.unwrap();
        assert!(manager.current_session().is_none());
        manager.logout().await.unwrap();
        assert!(manager.current_session().is_none());
        assert_eq!(stored(&storage).await, (None, None));
    }

    #[tokio::test]
    async fn logout_without_a_session_leaves_storage_empty() {
        let storage = Memory::new();
        let (api, _) = scripted(None, Reply::Status(StatusCode::INTERNAL_SERVER_ERROR));
        let manager = Manager::new(storage.clone(), api);
        manager.initialize().await;

        manager.logout().await.unwrap();
        assert_eq!(stored(&storage).await, (None, None));
    }

    #[tokio::test]
    async fn profile_failure_writes_nothing() {
        let storage = Memory::new();
        let (api, calls) = scripted(Some("tok-1"), Reply::Status(StatusCode::INTERNAL_SERVER_ERROR));
        let manager = Manager::new(storage.clone(), api);
        manager.initialize().await;

        let err = manager
            .try_login("admin@kmrl.co.in", &password("admin123"))
            .await
            .unwrap_err();
        assert!(matches!(err, error::Login::Server { stage: Stage::Profile, .. }));
        assert_eq!(*calls.lock().unwrap(), vec![Call::Exchange, Call::Profile]);
        assert!(manager.current_session().is_none());
        assert_eq!(stored(&storage).await, (None, None));
    }

    #[tokio::test]
    async fn profile_failure_keeps_the_previous_session() {
        let mut storage = Memory::new();
        session::persist(&mut storage, &rajesh("tok-0")).await.unwrap();
        let before = stored(&storage).await;

        let (api, _) = scripted(Some("tok-1"), Reply::Status(StatusCode::INTERNAL_SERVER_ERROR));
        let manager = Manager::new(storage.clone(), api);
        manager.initialize().await;

        assert!(!manager.login("admin@kmrl.co.in", &password("admin123")).await);
        assert_is_rajesh(&manager.current_session().unwrap(), "tok-0");
        assert_eq!(stored(&storage).await, before);
    }

    #[tokio::test]
    async fn incomplete_profile_is_refused() {
        let mut profile = rajesh_profile();
        profile.department = None;
        let storage = Memory::new();
        let (api, _) = scripted(Some("tok-1"), Reply::Profile(profile));
        let manager = Manager::new(storage.clone(), api);
        manager.initialize().await;

        let err = manager
            .try_login("admin@kmrl.co.in", &password("admin123"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            error::Login::MalformedResponse { stage: Stage::Profile, .. }
        ));
        assert!(manager.current_session().is_none());
        assert_eq!(stored(&storage).await, (None, None));
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let (api, _) = scripted(Some("tok-1"), Reply::Profile(rajesh_profile()));
        let manager = Manager::new(Memory::new(), api);
        let mut rx = manager.subscribe();
        assert!(matches!(*rx.borrow_and_update(), State::Uninitialized));

        manager.initialize().await;
        assert!(matches!(*rx.borrow_and_update(), State::Anonymous));

        assert!(manager.login("admin@kmrl.co.in", &password("admin123")).await);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().session().is_some());

        manager.logout().await.unwrap();
        assert!(matches!(*rx.borrow_and_update(), State::Anonymous));
    }

    #[tokio::test]
    async fn revalidation_drops_a_rejected_token() {
        let mut storage = Memory::new();
        session::persist(&mut storage, &rajesh("tok-1")).await.unwrap();
        let (api, calls) = scripted(Some("tok-1"), Reply::Status(StatusCode::UNAUTHORIZED));
        let manager = Manager::new(storage.clone(), api);
        manager.initialize().await;

        assert!(manager.revalidate().await.unwrap().is_none());
        assert!(manager.current_session().is_none());
        assert_eq!(*calls.lock().unwrap(), vec![Call::Profile]);
        assert_eq!(stored(&storage).await, (None, None));
    }

    #[tokio::test]
    async fn revalidation_keeps_the_session_on_server_errors() {
        let mut storage = Memory::new();
        session::persist(&mut storage, &rajesh("tok-1")).await.unwrap();
        let before = stored(&storage).await;
        let (api, _) = scripted(Some("tok-1"), Reply::Status(StatusCode::BAD_GATEWAY));
        let manager = Manager::new(storage.clone(), api);
        manager.initialize().await;

        assert!(manager.revalidate().await.is_err());
        assert_is_rajesh(&manager.current_session().unwrap(), "tok-1");
        assert_eq!(stored(&storage).await, before);
    }

    #[tokio::test]
    async fn revalidation_refreshes_the_profile() {
        let mut storage = Memory::new();
        session::persist(&mut storage, &rajesh("tok-1")).await.unwrap();
        let mut profile = rajesh_profile();
        profile.role = Some("Director (Operations)".to_owned());
        let (api, _) = scripted(Some("tok-1"), Reply::Profile(profile));
        let manager = Manager::new(storage.clone(), api);
        manager.initialize().await;

        let refreshed = manager.revalidate().await.unwrap().unwrap();
        assert_eq!(refreshed.role(), "Director (Operations)");

        let mut probe = storage.clone();
        let reloaded = session::load(&mut probe).await.unwrap().unwrap();
        assert_eq!(reloaded.role(), "Director (Operations)");
    }

    #[tokio::test]
    async fn authorized_requires_a_session() {
        let (api, _) = scripted(None, Reply::Status(StatusCode::INTERNAL_SERVER_ERROR));
        let manager = Manager::new(Memory::new(), api);
        manager.initialize().await;

        let mut called = false;
        let result = manager
            .authorized(|_| {
                called = true;
                async { Ok(()) }
            })
            .await;
        assert!(matches!(result, Err(error::Error::NotAuthenticated)));
        assert!(!called);
    }

    #[tokio::test]
    async fn authorized_hands_over_the_token() {
        let mut storage = Memory::new();
        session::persist(&mut storage, &rajesh("tok-1")).await.unwrap();
        let (api, _) = scripted(None, Reply::Status(StatusCode::INTERNAL_SERVER_ERROR));
        let manager = Manager::new(storage, api);
        manager.initialize().await;

        let seen = manager
            .authorized(|token| async move { Ok(token.expose_secret().clone()) })
            .await
            .unwrap();
        assert_eq!(seen, "tok-1");
    }

    #[tokio::test]
    async fn rejected_token_ends_the_session() {
        let mut storage = Memory::new();
        session::persist(&mut storage, &rajesh("tok-1")).await.unwrap();
        let (api, _) = scripted(None, Reply::Status(StatusCode::INTERNAL_SERVER_ERROR));
        let manager = Manager::new(storage.clone(), api);
        manager.initialize().await;

        let result: Result<()> = manager
            .authorized(|_| async { Err(error::Document::TokenRejected) })
            .await;
        assert!(matches!(
            result,
            Err(error::Error::Document(error::Document::TokenRejected))
        ));
        assert!(manager.current_session().is_none());
        assert_eq!(stored(&storage).await, (None, None));
    }

    #[tokio::test]
    async fn other_request_failures_keep_the_session() {
        let mut storage = Memory::new();
        session::persist(&mut storage, &rajesh("tok-1")).await.unwrap();
        let (api, _) = scripted(None, Reply::Status(StatusCode::INTERNAL_SERVER_ERROR));
        let manager = Manager::new(storage, api);
        manager.initialize().await;

        let result: Result<()> = manager
            .authorized(|_| async { Err(error::Document::Status(StatusCode::NOT_FOUND)) })
            .await;
        assert!(result.is_err());
        assert!(manager.current_session().is_some());
    }
}
