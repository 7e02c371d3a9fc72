//! In-process backend: a record store with live subscriptions and an
//! email/password authenticator. Used by the simulator and the tests.

use std::collections::{BTreeMap, HashMap};
use std::future::ready;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use tracing::debug;

use crate::auth::AuthError;
use crate::error::StoreError;
use crate::feed::{self, Feed, FeedSender};
use crate::ports::{Authenticator, RecordStore};
use crate::session::Session;
use crate::types::{Alert, AlertChange, AlertWindowDelta, NewAlert, UserPatch, UserRecord};

const ID_LEN: usize = 20;
const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn generate_id() -> String {
    generate_id_with_rng(&mut OsRng)
}

pub(crate) fn generate_id_with_rng<R: RngCore>(rng: &mut R) -> String {
    rng.sample_iter(Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

type UsersSender = FeedSender<Result<Vec<UserRecord>, StoreError>>;
type UserSender = FeedSender<Result<Option<UserRecord>, StoreError>>;
type WindowSender = FeedSender<Result<AlertWindowDelta, StoreError>>;

struct WindowWatcher {
    limit: usize,
    visible: Vec<Alert>,
    sender: WindowSender,
}

#[derive(Default)]
struct StoreState {
    users: BTreeMap<String, UserRecord>,
    alerts: Vec<Alert>,
    users_watchers: Vec<UsersSender>,
    user_watchers: Vec<(String, UserSender)>,
    window_watchers: Vec<WindowWatcher>,
    read_failure: Option<StoreError>,
    write_failure: Option<StoreError>,
}

impl StoreState {
    fn users_snapshot(&self) -> Vec<UserRecord> {
        self.users.values().cloned().collect()
    }

    fn publish_users(&mut self, uid: &str) {
        let snapshot = self.users_snapshot();
        self.users_watchers
            .retain(|sender| sender.send(Ok(snapshot.clone())));

        let record = self.users.get(uid).cloned();
        self.user_watchers.retain(|(watched, sender)| {
            if watched != uid {
                return !sender.is_closed();
            }
            sender.send(Ok(record.clone()))
        });
    }

    fn publish_alerts(&mut self) {
        let alerts = &self.alerts;
        self.window_watchers.retain_mut(|watcher| {
            if watcher.sender.is_closed() {
                return false;
            }
            let next = window(alerts, watcher.limit);
            let mut changes: Vec<AlertChange> = watcher
                .visible
                .iter()
                .filter(|alert| !next.iter().any(|candidate| candidate.id == alert.id))
                .cloned()
                .map(AlertChange::removed)
                .collect();
            changes.extend(
                next.iter()
                    .filter(|alert| {
                        watcher
                            .visible
                            .iter()
                            .any(|seen| seen.id == alert.id && seen != *alert)
                    })
                    .cloned()
                    .map(AlertChange::modified),
            );
            changes.extend(
                next.iter()
                    .filter(|alert| !watcher.visible.iter().any(|seen| seen.id == alert.id))
                    .cloned()
                    .map(AlertChange::added),
            );
            watcher.visible = next;
            if changes.is_empty() {
                return true;
            }
            watcher.sender.send(Ok(AlertWindowDelta {
                changes,
                backlog: false,
            }))
        });
    }
}

/// The `limit` newest alerts, newest first.
fn window(alerts: &[Alert], limit: usize) -> Vec<Alert> {
    let mut sorted = alerts.to_vec();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sorted.truncate(limit);
    sorted
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
    backlog_batch_size: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers the initial alert backlog in deltas of at most `size` changes.
    pub fn with_backlog_batch_size(mut self, size: usize) -> Self {
        self.backlog_batch_size = Some(size.max(1));
        self
    }

    pub fn insert_user(&self, record: UserRecord) {
        let mut state = self.lock();
        let uid = record.uid.clone();
        state.users.insert(uid.clone(), record);
        state.publish_users(&uid);
    }

    pub fn remove_user(&self, uid: &str) {
        let mut state = self.lock();
        if state.users.remove(uid).is_some() {
            state.publish_users(uid);
        }
    }

    /// Stores an alert with a caller-chosen id.
    pub fn insert_alert(&self, alert: Alert) {
        let mut state = self.lock();
        state.alerts.push(alert);
        state.publish_alerts();
    }

    /// Replaces the stored alert with the same id, as an edit made by another
    /// client would.
    pub fn update_alert(&self, alert: Alert) -> Result<(), StoreError> {
        let mut state = self.lock();
        let Some(stored) = state.alerts.iter_mut().find(|stored| stored.id == alert.id) else {
            return Err(StoreError::NotFound(format!("alerts/{}", alert.id)));
        };
        *stored = alert;
        state.publish_alerts();
        Ok(())
    }

    pub fn users(&self) -> Vec<UserRecord> {
        self.lock().users_snapshot()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.lock().alerts.clone()
    }

    /// Number of open subscriptions of any kind.
    pub fn subscriptions(&self) -> usize {
        let mut state = self.lock();
        state.users_watchers.retain(|sender| !sender.is_closed());
        state.user_watchers.retain(|(_, sender)| !sender.is_closed());
        state.window_watchers.retain(|watcher| !watcher.sender.is_closed());
        state.users_watchers.len() + state.user_watchers.len() + state.window_watchers.len()
    }

    /// Makes one-shot reads fail until cleared with `None`.
    pub fn fail_reads(&self, failure: Option<StoreError>) {
        self.lock().read_failure = failure;
    }

    /// Makes writes fail until cleared with `None`.
    pub fn fail_writes(&self, failure: Option<StoreError>) {
        self.lock().write_failure = failure;
    }

    /// Sends `err` to every open subscription. Subscriptions stay open.
    pub fn fail_subscriptions(&self, err: StoreError) {
        let mut state = self.lock();
        state
            .users_watchers
            .retain(|sender| sender.send(Err(err.clone())));
        state
            .user_watchers
            .retain(|(_, sender)| sender.send(Err(err.clone())));
        state
            .window_watchers
            .retain(|watcher| watcher.sender.send(Err(err.clone())));
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().expect("memory store lock")
    }

    fn read<T>(&self, read: impl FnOnce(&StoreState) -> T) -> Result<T, StoreError> {
        let state = self.lock();
        match &state.read_failure {
            Some(err) => Err(err.clone()),
            None => Ok(read(&state)),
        }
    }
}

impl RecordStore for MemoryStore {
    fn user<'a>(
        &'a self,
        uid: &'a str,
    ) -> impl Future<Output = Result<Option<UserRecord>, StoreError>> + Send + 'a {
        ready(self.read(|state| state.users.get(uid).cloned()))
    }

    fn merge_user<'a>(
        &'a self,
        uid: &'a str,
        patch: UserPatch,
    ) -> impl Future<Output = Result<(), StoreError>> + Send + 'a {
        let mut state = self.lock();
        if let Some(err) = state.write_failure.clone() {
            return ready(Err(err));
        }
        match state.users.get_mut(uid) {
            Some(record) => patch.apply(record),
            None => {
                state.users.insert(uid.to_string(), patch.into_record(uid));
            }
        }
        state.publish_users(uid);
        ready(Ok(()))
    }

    fn watch_user(&self, uid: &str) -> Feed<Result<Option<UserRecord>, StoreError>> {
        let (sender, feed) = feed::channel();
        let mut state = self.lock();
        sender.send(Ok(state.users.get(uid).cloned()));
        state.user_watchers.push((uid.to_string(), sender));
        feed
    }

    fn watch_users(&self) -> Feed<Result<Vec<UserRecord>, StoreError>> {
        let (sender, feed) = feed::latest();
        let mut state = self.lock();
        sender.send(Ok(state.users_snapshot()));
        state.users_watchers.push(sender);
        feed
    }

    fn watch_alert_window(&self, limit: usize) -> Feed<Result<AlertWindowDelta, StoreError>> {
        let (sender, feed) = feed::channel();
        let mut state = self.lock();
        let visible = window(&state.alerts, limit);
        let changes: Vec<AlertChange> = visible.iter().cloned().map(AlertChange::added).collect();

        match self.backlog_batch_size {
            Some(size) if !changes.is_empty() => {
                for chunk in changes.chunks(size) {
                    sender.send(Ok(AlertWindowDelta {
                        changes: chunk.to_vec(),
                        backlog: true,
                    }));
                }
            }
            _ => {
                sender.send(Ok(AlertWindowDelta {
                    changes,
                    backlog: true,
                }));
            }
        }
        debug!(limit, backlog = visible.len(), "alert window opened");
        state.window_watchers.push(WindowWatcher {
            limit,
            visible,
            sender,
        });
        feed
    }

    fn alerts_by_author<'a>(
        &'a self,
        uid: &'a str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Alert>, StoreError>> + Send + 'a {
        ready(self.read(|state| {
            let authored: Vec<Alert> = state
                .alerts
                .iter()
                .filter(|alert| alert.user_id == uid)
                .cloned()
                .collect();
            window(&authored, limit)
        }))
    }

    fn create_alert<'a>(
        &'a self,
        alert: &'a NewAlert,
    ) -> impl Future<Output = Result<String, StoreError>> + Send + 'a {
        let mut state = self.lock();
        if let Some(err) = state.write_failure.clone() {
            return ready(Err(err));
        }
        let id = generate_id();
        state.alerts.push(alert.clone().persisted(id.clone()));
        state.publish_alerts();
        ready(Ok(id))
    }
}

struct Account {
    uid: String,
    password: String,
}

#[derive(Default)]
struct AuthState {
    accounts: HashMap<String, Account>,
    current: Option<Session>,
}

/// Email/password accounts kept in memory.
#[derive(Clone, Default)]
pub struct MemoryAuthenticator {
    state: Arc<Mutex<AuthState>>,
}

impl MemoryAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().expect("memory auth lock")
    }

    fn sign_in_now(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = normalize_email(email)?;
        let mut state = self.lock();
        let account = state.accounts.get(&email).ok_or(AuthError::UserNotFound)?;
        if account.password != password {
            return Err(AuthError::WrongPassword);
        }
        let session = Session::new(account.uid.clone(), email);
        state.current = Some(session.clone());
        Ok(session)
    }

    fn create_account_now(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = normalize_email(email)?;
        let mut state = self.lock();
        if state.accounts.contains_key(&email) {
            return Err(AuthError::EmailAlreadyInUse);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        let uid = generate_id();
        state.accounts.insert(
            email.clone(),
            Account {
                uid: uid.clone(),
                password: password.to_string(),
            },
        );
        let session = Session::new(uid, email);
        state.current = Some(session.clone());
        Ok(session)
    }
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_ascii_lowercase();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(AuthError::InvalidEmail);
    };
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
    {
        return Err(AuthError::InvalidEmail);
    }
    Ok(email)
}

impl Authenticator for MemoryAuthenticator {
    fn current_session(&self) -> Option<Session> {
        self.lock().current.clone()
    }

    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> impl Future<Output = Result<Session, AuthError>> + Send + 'a {
        ready(self.sign_in_now(email, password))
    }

    fn create_account<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> impl Future<Output = Result<Session, AuthError>> + Send + 'a {
        ready(self.create_account_now(email, password))
    }

    fn sign_out(&self) -> impl Future<Output = Result<(), AuthError>> + Send + '_ {
        self.lock().current = None;
        ready(Ok(()))
    }
}
