//! Client-side session state: who is signed in, their profile and
//! memberships, and which lodge they are working in.
//!
//! A [`SessionContext`] is built from its collaborators and handed to
//! whatever needs it; nothing here is global.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::auth::{AuthEvent, AuthUser, Session};
use crate::error::{BackendError, ErrorKind};
use crate::local_store::KeyValueStore;
use crate::models::{ProfileUpdate, ProfileView};
use crate::services::{AuthService, MemberService};

pub const SESSION_KEY: &str = "auth_session";
pub const ACTIVE_LODGE_KEY: &str = "active_lodge_id";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

/// A toast: level plus a message key for the translation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub key: &'static str,
}

impl Notice {
    pub fn success(key: &'static str) -> Self {
        Self {
            level: NoticeLevel::Success,
            key,
        }
    }

    pub fn info(key: &'static str) -> Self {
        Self {
            level: NoticeLevel::Info,
            key,
        }
    }

    pub fn error(kind: ErrorKind) -> Self {
        Self {
            level: NoticeLevel::Error,
            key: error_key(kind),
        }
    }
}

/// Message key for a failure, chosen by kind.
pub fn error_key(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidCredentials => "auth.errors.invalid_credentials",
        ErrorKind::EmailNotConfirmed => "auth.errors.email_not_confirmed",
        ErrorKind::UserAlreadyRegistered => "auth.errors.user_already_registered",
        ErrorKind::WeakPassword => "auth.errors.weak_password",
        ErrorKind::Unauthenticated => "auth.errors.session_expired",
        ErrorKind::PermissionDenied => "errors.permission_denied",
        ErrorKind::NotFound => "errors.not_found",
        ErrorKind::Conflict | ErrorKind::Constraint => "errors.conflict",
        ErrorKind::Validation => "errors.validation",
        ErrorKind::RateLimited => "errors.rate_limited",
        ErrorKind::Network => "errors.network",
        ErrorKind::Internal => "errors.generic",
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Sends notices to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => tracing::warn!(key = notice.key, "notice"),
            _ => tracing::info!(key = notice.key, "notice"),
        }
    }
}

/// Keeps every notice; drained with [`NoticeLog::take`].
#[derive(Default)]
pub struct NoticeLog {
    notices: Mutex<Vec<Notice>>,
}

impl NoticeLog {
    pub fn take(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock())
    }
}

impl Notifier for NoticeLog {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}

/// What a session operation reports back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    pub success: bool,
    pub error: Option<BackendError>,
    /// Where the UI should go next.
    pub redirect: Option<String>,
}

impl ActionResult {
    fn ok(redirect: Option<&str>) -> Self {
        Self {
            success: true,
            error: None,
            redirect: redirect.map(str::to_string),
        }
    }

    fn failed(error: BackendError) -> Self {
        Self {
            success: false,
            error: Some(error),
            redirect: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub is_loading: bool,
    pub session: Option<Session>,
    pub user: Option<AuthUser>,
    pub profile: Option<ProfileView>,
    pub active_lodge_id: Option<Uuid>,
}

pub struct SessionContext {
    auth: AuthService,
    members: MemberService,
    store: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn Notifier>,
    state: RwLock<SessionSnapshot>,
}

impl SessionContext {
    pub fn new(
        auth: AuthService,
        members: MemberService,
        store: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            auth,
            members,
            store,
            notifier,
            state: RwLock::new(SessionSnapshot::default()),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.read().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.read().phase
    }

    pub fn is_initialized(&self) -> bool {
        self.phase() == SessionPhase::Ready
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().is_loading
    }

    pub fn session(&self) -> Option<Session> {
        self.state.read().session.clone()
    }

    pub fn user(&self) -> Option<AuthUser> {
        self.state.read().user.clone()
    }

    pub fn profile(&self) -> Option<ProfileView> {
        self.state.read().profile.clone()
    }

    pub fn active_lodge_id(&self) -> Option<Uuid> {
        self.state.read().active_lodge_id
    }

    /// Restores the persisted session, refreshing it if needed, and loads
    /// the profile that goes with it.
    pub async fn initialize(&self) {
        self.state.write().phase = SessionPhase::Initializing;
        let stored = self.load_stored_session().await;
        match self.auth.get_session(stored).await.into_result() {
            Ok(Some(session)) => self.apply_signed_in(session).await,
            Ok(None) => self.apply_signed_out().await,
            Err(e) => {
                tracing::warn!("Initial session check failed: {}", e);
                self.notifier.notify(Notice::error(e.kind));
            }
        }
        self.state.write().phase = SessionPhase::Ready;
    }

    /// Relays auth events into this context until the channel closes.
    pub fn listen(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.auth.on_auth_state_change();
        let context = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => context.handle_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Session listener lagged, {} auth events skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Applies one auth transition. Applying the same event twice leaves the
    /// same state as applying it once.
    pub async fn handle_event(&self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(session) | AuthEvent::PasswordRecovery(session) => {
                let current = {
                    let state = self.state.read();
                    state.profile.is_some()
                        && state
                            .session
                            .as_ref()
                            .is_some_and(|s| s.access_token == session.access_token)
                };
                if !current {
                    self.apply_signed_in(session).await;
                }
            }
            AuthEvent::TokenRefreshed(session) => {
                let same_user = self
                    .state
                    .read()
                    .user
                    .as_ref()
                    .is_some_and(|u| u.id == session.user.id);
                if same_user {
                    self.store_session(session).await;
                } else {
                    self.apply_signed_in(session).await;
                }
            }
            AuthEvent::UserUpdated(user) => {
                let session = {
                    let mut state = self.state.write();
                    if let Some(session) = state.session.as_mut() {
                        session.user = user.clone();
                    }
                    state.user = Some(user);
                    state.session.clone()
                };
                if let Some(session) = session {
                    self.persist_session(&session).await;
                }
            }
            AuthEvent::SignedOut => self.apply_signed_out().await,
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> ActionResult {
        self.with_loading(async {
            match self.auth.sign_in(email, password).await.into_result() {
                Ok(session) => {
                    self.apply_signed_in(session).await;
                    self.notifier.notify(Notice::success("auth.sign_in.success"));
                    ActionResult::ok(Some("/dashboard"))
                }
                Err(e) => self.fail(e),
            }
        })
        .await
    }

    pub async fn sign_up(&self, email: &str, password: &str, display_name: Option<&str>) -> ActionResult {
        self.with_loading(async {
            match self.auth.sign_up(email, password, display_name).await.into_result() {
                Ok(outcome) => match outcome.session {
                    Some(session) => {
                        self.apply_signed_in(session).await;
                        self.notifier.notify(Notice::success("auth.sign_up.success"));
                        ActionResult::ok(Some("/dashboard"))
                    }
                    None => {
                        self.notifier.notify(Notice::info("auth.sign_up.confirm_email"));
                        ActionResult::ok(Some("/login"))
                    }
                },
                Err(e) => self.fail(e),
            }
        })
        .await
    }

    /// A session the backend no longer knows still ends locally.
    pub async fn sign_out(&self) -> ActionResult {
        self.with_loading(async {
            let Some(session) = self.session() else {
                self.apply_signed_out().await;
                return ActionResult::ok(Some("/login"));
            };
            match self.auth.sign_out(&session.access_token).await.into_result() {
                Ok(()) => {}
                Err(e) if e.kind == ErrorKind::Unauthenticated => {}
                Err(e) => return self.fail(e),
            }
            self.apply_signed_out().await;
            self.notifier.notify(Notice::success("auth.sign_out.success"));
            ActionResult::ok(Some("/login"))
        })
        .await
    }

    pub async fn forgot_password(&self, email: &str) -> ActionResult {
        self.with_loading(async {
            match self.auth.forgot_password(email).await.into_result() {
                Ok(()) => {
                    self.notifier.notify(Notice::info("auth.forgot_password.sent"));
                    ActionResult::ok(Some("/login"))
                }
                Err(e) => self.fail(e),
            }
        })
        .await
    }

    pub async fn update_password(&self, password: &str) -> ActionResult {
        self.with_loading(async {
            let Some(session) = self.session() else {
                return self.fail(BackendError::unauthenticated("not signed in"));
            };
            match self.auth.update_password(&session.access_token, password).await.into_result() {
                Ok(user) => {
                    self.handle_event(AuthEvent::UserUpdated(user)).await;
                    self.notifier.notify(Notice::success("auth.update_password.success"));
                    ActionResult::ok(Some("/dashboard"))
                }
                Err(e) => self.fail(e),
            }
        })
        .await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> ActionResult {
        self.with_loading(async {
            let Some(user) = self.user() else {
                return self.fail(BackendError::unauthenticated("not signed in"));
            };
            match self.members.update_profile(user.id, update).await.into_result() {
                Ok(profile) => {
                    if let Some(view) = self.state.write().profile.as_mut() {
                        view.profile = profile;
                    }
                    self.notifier.notify(Notice::success("profile.update.success"));
                    ActionResult::ok(None)
                }
                Err(e) => self.fail(e),
            }
        })
        .await
    }

    /// Switches lodge; only lodges with an active membership are accepted.
    pub async fn set_active_lodge(&self, lodge_id: Uuid) -> ActionResult {
        let allowed = self
            .state
            .read()
            .profile
            .as_ref()
            .is_some_and(|p| p.is_active_member_of(lodge_id));
        if !allowed {
            return self.fail(BackendError::new(
                ErrorKind::PermissionDenied,
                format!("no active membership in lodge {}", lodge_id),
            ));
        }
        self.state.write().active_lodge_id = Some(lodge_id);
        if let Err(e) = self.store.set(ACTIVE_LODGE_KEY, &lodge_id.to_string()).await {
            tracing::warn!("Could not persist active lodge: {}", e);
        }
        ActionResult::ok(None)
    }

    /// Reloads the profile view, e.g. after joining a lodge.
    pub async fn refresh_profile(&self) -> ActionResult {
        let Some(user) = self.user() else {
            return self.fail(BackendError::unauthenticated("not signed in"));
        };
        self.load_profile(&user).await;
        ActionResult::ok(None)
    }

    async fn with_loading<F>(&self, action: F) -> ActionResult
    where
        F: std::future::Future<Output = ActionResult>,
    {
        self.state.write().is_loading = true;
        let result = action.await;
        self.state.write().is_loading = false;
        result
    }

    fn fail(&self, error: BackendError) -> ActionResult {
        self.notifier.notify(Notice::error(error.kind));
        ActionResult::failed(error)
    }

    async fn load_stored_session(&self) -> Option<Session> {
        match self.store.get(SESSION_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(session) => Some(session),
                Err(e) => {
                    tracing::warn!("Discarding unreadable stored session: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Could not read stored session: {}", e);
                None
            }
        }
    }

    async fn persist_session(&self, session: &Session) {
        let result = match serde_json::to_string(session) {
            Ok(raw) => self.store.set(SESSION_KEY, &raw).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::warn!("Could not persist session: {}", e);
        }
    }

    async fn store_session(&self, session: Session) {
        {
            let mut state = self.state.write();
            state.user = Some(session.user.clone());
            state.session = Some(session.clone());
        }
        self.persist_session(&session).await;
    }

    async fn apply_signed_in(&self, session: Session) {
        let user = session.user.clone();
        self.store_session(session).await;
        self.load_profile(&user).await;
    }

    async fn load_profile(&self, user: &AuthUser) {
        let mut result = self.members.get_profile_view(user.id).await.into_result();
        if matches!(&result, Err(e) if e.kind == ErrorKind::NotFound) {
            result = match self.members.ensure_profile(user).await.into_result() {
                Ok(_) => self.members.get_profile_view(user.id).await.into_result(),
                Err(e) => Err(e),
            };
        }
        let view = match result {
            Ok(view) => view,
            Err(e) => {
                tracing::warn!("Profile for {} not loaded: {}", user.id, e);
                return;
            }
        };

        let persisted = match self.store.get(ACTIVE_LODGE_KEY).await {
            Ok(raw) => raw.and_then(|raw| raw.parse::<Uuid>().ok()),
            Err(e) => {
                tracing::warn!("Could not read active lodge: {}", e);
                None
            }
        };
        let active = persisted
            .filter(|id| view.is_active_member_of(*id))
            .or_else(|| view.active_memberships().next().map(|m| m.membership.lodge_id));

        {
            let mut state = self.state.write();
            state.profile = Some(view);
            state.active_lodge_id = active;
        }

        let written = match active {
            Some(id) if Some(id) != persisted => {
                self.store.set(ACTIVE_LODGE_KEY, &id.to_string()).await
            }
            None if persisted.is_some() => self.store.remove(ACTIVE_LODGE_KEY).await,
            _ => Ok(()),
        };
        if let Err(e) = written {
            tracing::warn!("Could not persist active lodge: {}", e);
        }
    }

    async fn apply_signed_out(&self) {
        {
            let mut state = self.state.write();
            state.session = None;
            state.user = None;
            state.profile = None;
            state.active_lodge_id = None;
        }
        for key in [SESSION_KEY, ACTIVE_LODGE_KEY] {
            if let Err(e) = self.store.remove(key).await {
                tracing::warn!("Could not clear {}: {}", key, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthApi, MemoryAuth};
    use crate::backend::MemoryTables;
    use crate::local_store::MemoryStore;
    use crate::models::NewLodge;
    use crate::services::LodgeService;
    use serde_json::json;
    use tokio::time::{Duration, sleep};

    const EMAIL: &str = "hiram@example.org";
    const PASSWORD: &str = "acacia-123";

    struct Fixture {
        auth: Arc<MemoryAuth>,
        db: Arc<MemoryTables>,
        store: Arc<MemoryStore>,
        notices: Arc<NoticeLog>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                auth: Arc::new(MemoryAuth::new()),
                db: Arc::new(MemoryTables::with_portal_schema()),
                store: Arc::new(MemoryStore::new()),
                notices: Arc::new(NoticeLog::default()),
            }
        }

        fn context_with(&self, auth: AuthService) -> Arc<SessionContext> {
            Arc::new(SessionContext::new(
                auth,
                MemberService::new(self.db.clone()),
                self.store.clone(),
                self.notices.clone(),
            ))
        }

        fn context(&self) -> Arc<SessionContext> {
            self.context_with(AuthService::new(self.auth.clone()))
        }

        async fn register(&self) -> Uuid {
            self.auth
                .sign_up(EMAIL, PASSWORD, json!({ "display_name": "Hiram" }), None)
                .await
                .unwrap()
                .user
                .id
        }

        async fn found_lodge(&self, founder: Uuid, name: &str) -> Uuid {
            let lodge = NewLodge {
                name: name.into(),
                number: None,
                obedience: None,
                rite: None,
                colors: None,
                city: Some("Lyon".into()),
                country: None,
                description: None,
            };
            LodgeService::new(self.db.clone())
                .create_lodge_with_founder(&lodge, founder)
                .await
                .into_result()
                .unwrap()
                .lodge
                .id
        }
    }

    #[tokio::test]
    async fn sign_in_loads_profile_and_first_lodge() {
        let fx = Fixture::new();
        let user = fx.register().await;
        let lodge = fx.found_lodge(user, "Les Amis Réunis").await;
        let context = fx.context();

        let result = context.sign_in(EMAIL, PASSWORD).await;
        assert!(result.success);
        assert_eq!(result.redirect.as_deref(), Some("/dashboard"));
        assert!(!context.is_loading());

        let profile = context.profile().unwrap();
        assert_eq!(profile.profile.id, user);
        assert_eq!(profile.profile.display_name.as_deref(), Some("Hiram"));
        assert_eq!(context.active_lodge_id(), Some(lodge));
        assert_eq!(
            fx.store.get(ACTIVE_LODGE_KEY).await.unwrap(),
            Some(lodge.to_string())
        );
        assert!(fx.store.get(SESSION_KEY).await.unwrap().is_some());
        assert_eq!(fx.notices.take(), vec![Notice::success("auth.sign_in.success")]);
    }

    #[tokio::test]
    async fn wrong_password_reports_keyed_notice() {
        let fx = Fixture::new();
        fx.register().await;
        let context = fx.context();

        let result = context.sign_in(EMAIL, "not-the-password").await;
        assert!(!result.success);
        assert_eq!(result.error.unwrap().kind, ErrorKind::InvalidCredentials);
        assert!(context.session().is_none());
        assert!(!context.is_loading());
        assert_eq!(
            fx.notices.take(),
            vec![Notice {
                level: NoticeLevel::Error,
                key: "auth.errors.invalid_credentials",
            }]
        );
    }

    #[tokio::test]
    async fn signed_out_event_clears_everything() {
        let fx = Fixture::new();
        let user = fx.register().await;
        fx.found_lodge(user, "La Parfaite Union").await;
        let context = fx.context();
        assert!(context.sign_in(EMAIL, PASSWORD).await.success);

        context.handle_event(AuthEvent::SignedOut).await;
        assert!(context.session().is_none());
        assert!(context.profile().is_none());
        assert!(context.active_lodge_id().is_none());
        assert_eq!(fx.store.get(ACTIVE_LODGE_KEY).await.unwrap(), None);
        assert_eq!(fx.store.get(SESSION_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn sign_out_ends_the_session() {
        let fx = Fixture::new();
        fx.register().await;
        let context = fx.context();
        assert!(context.sign_in(EMAIL, PASSWORD).await.success);
        let token = context.session().unwrap().access_token;

        let result = context.sign_out().await;
        assert!(result.success);
        assert_eq!(result.redirect.as_deref(), Some("/login"));
        assert!(context.user().is_none());
        assert!(fx.auth.get_user(&token).await.is_err());
    }

    #[tokio::test]
    async fn initialize_restores_the_stored_session() {
        let fx = Fixture::new();
        let user = fx.register().await;
        let lodge = fx.found_lodge(user, "L'Étoile Polaire").await;
        assert!(fx.context().sign_in(EMAIL, PASSWORD).await.success);

        let restored = fx.context();
        assert_eq!(restored.phase(), SessionPhase::Uninitialized);
        restored.initialize().await;
        assert!(restored.is_initialized());
        assert_eq!(restored.user().unwrap().id, user);
        assert_eq!(restored.active_lodge_id(), Some(lodge));
    }

    #[tokio::test]
    async fn initialize_without_stored_session_is_ready_and_empty() {
        let fx = Fixture::new();
        let context = fx.context();
        context.initialize().await;
        assert_eq!(context.phase(), SessionPhase::Ready);
        assert!(context.session().is_none());
    }

    #[tokio::test]
    async fn stale_persisted_lodge_falls_back_to_first_membership() {
        let fx = Fixture::new();
        let user = fx.register().await;
        let first = fx.found_lodge(user, "Première").await;
        fx.found_lodge(user, "Seconde").await;
        fx.store
            .set(ACTIVE_LODGE_KEY, &Uuid::new_v4().to_string())
            .await
            .unwrap();

        let context = fx.context();
        assert!(context.sign_in(EMAIL, PASSWORD).await.success);
        assert_eq!(context.active_lodge_id(), Some(first));
    }

    #[tokio::test]
    async fn active_lodge_requires_membership() {
        let fx = Fixture::new();
        let user = fx.register().await;
        let first = fx.found_lodge(user, "Première").await;
        let second = fx.found_lodge(user, "Seconde").await;
        let context = fx.context();
        assert!(context.sign_in(EMAIL, PASSWORD).await.success);

        assert!(context.set_active_lodge(second).await.success);
        assert_eq!(context.active_lodge_id(), Some(second));
        assert_eq!(
            fx.store.get(ACTIVE_LODGE_KEY).await.unwrap(),
            Some(second.to_string())
        );

        let refused = context.set_active_lodge(Uuid::new_v4()).await;
        assert_eq!(refused.error.unwrap().kind, ErrorKind::PermissionDenied);
        assert_eq!(context.active_lodge_id(), Some(second));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn repeated_sign_in_event_is_idempotent() {
        let fx = Fixture::new();
        fx.register().await;
        let session = fx.auth.sign_in_with_password(EMAIL, PASSWORD).await.unwrap();
        let context = fx.context();

        context.handle_event(AuthEvent::SignedIn(session.clone())).await;
        let once = context.snapshot();
        context.handle_event(AuthEvent::SignedIn(session)).await;
        assert_eq!(context.snapshot(), once);
        assert!(once.profile.is_some());
    }

    #[tokio::test]
    async fn update_profile_refreshes_the_view() {
        let fx = Fixture::new();
        fx.register().await;
        let context = fx.context();
        assert!(context.sign_in(EMAIL, PASSWORD).await.success);

        let update = ProfileUpdate {
            city: Some("Bordeaux".into()),
            ..Default::default()
        };
        assert!(context.update_profile(&update).await.success);
        assert_eq!(context.profile().unwrap().profile.city.as_deref(), Some("Bordeaux"));
    }

    #[tokio::test]
    async fn signed_out_context_rejects_profile_update() {
        let fx = Fixture::new();
        let result = fx.context().update_profile(&ProfileUpdate::default()).await;
        assert_eq!(result.error.unwrap().kind, ErrorKind::Unauthenticated);
        assert_eq!(fx.notices.take()[0].key, "auth.errors.session_expired");
    }

    #[tokio::test]
    async fn listener_follows_sign_in_elsewhere() {
        let fx = Fixture::new();
        fx.register().await;
        let auth = AuthService::new(fx.auth.clone());
        let context = fx.context_with(auth.clone());
        let relay = context.listen();

        auth.sign_in(EMAIL, PASSWORD).await.into_result().unwrap();
        for _ in 0..100 {
            if context.profile().is_some() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(context.session().is_some());
        assert!(context.profile().is_some());
        relay.abort();
    }

    #[test]
    fn every_kind_has_a_key() {
        assert_eq!(error_key(ErrorKind::WeakPassword), "auth.errors.weak_password");
        assert_eq!(error_key(ErrorKind::Constraint), error_key(ErrorKind::Conflict));
    }
}
