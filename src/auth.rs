use thiserror::Error;
use tracing::{error, info};

use crate::error::StoreError;
use crate::ports::{Authenticator, RecordStore, TimeProvider};
use crate::session::Session;
use crate::types::UserPatch;
use crate::types::user::email_local_part;

/// Failure codes reported by the authentication service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no account for this email")]
    UserNotFound,
    #[error("wrong password")]
    WrongPassword,
    #[error("invalid credential")]
    InvalidCredential,
    #[error("malformed email")]
    InvalidEmail,
    #[error("email already in use")]
    EmailAlreadyInUse,
    #[error("password too weak")]
    WeakPassword,
    #[error("{0}")]
    Other(String),
}

/// What the user is told when signing in fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("email and password are required")]
    MissingFields,
    #[error("incorrect email or password")]
    InvalidCredential,
    #[error("password too weak (minimum 6 characters)")]
    WeakCredential,
    #[error("email already registered, check your password")]
    AlreadyRegistered,
    #[error("invalid email")]
    InvalidIdentifier,
    #[error("{0}")]
    Other(String),
}

impl AuthFailure {
    pub fn message(&self) -> String {
        self.to_string()
    }

    fn from_sign_in(err: AuthError) -> Self {
        match err {
            AuthError::WrongPassword | AuthError::InvalidCredential => {
                AuthFailure::InvalidCredential
            }
            AuthError::InvalidEmail => AuthFailure::InvalidIdentifier,
            other => AuthFailure::Other(other.to_string()),
        }
    }

    fn from_create(err: AuthError) -> Self {
        match err {
            AuthError::EmailAlreadyInUse => AuthFailure::AlreadyRegistered,
            AuthError::WeakPassword => AuthFailure::WeakCredential,
            other => AuthFailure::Other(other.to_string()),
        }
    }
}

impl From<StoreError> for AuthFailure {
    fn from(err: StoreError) -> Self {
        AuthFailure::Other(err.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    /// Optional display name. Defaults to the local part of the email.
    pub username: Option<String>,
}

impl Credentials {
    fn profile_name(&self, email: &str) -> Option<String> {
        self.username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .or_else(|| email_local_part(email))
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedIn {
    pub session: Session,
    /// Whether a new account was created.
    pub registered: bool,
}

/// Signs in, creating the account when the email is unknown, and writes the
/// user's profile record.
pub async fn sign_in_or_register<A, S, T>(
    auth: &A,
    store: &S,
    time: &T,
    credentials: &Credentials,
) -> Result<SignedIn, AuthFailure>
where
    A: Authenticator,
    S: RecordStore,
    T: TimeProvider,
{
    let email = credentials.email.trim();
    if email.is_empty() || credentials.password.is_empty() {
        return Err(AuthFailure::MissingFields);
    }

    let (session, registered) = match auth.sign_in(email, &credentials.password).await {
        Ok(session) => (session, false),
        Err(AuthError::UserNotFound) => {
            let session = auth
                .create_account(email, &credentials.password)
                .await
                .map_err(AuthFailure::from_create)?;
            (session, true)
        }
        Err(err) => return Err(AuthFailure::from_sign_in(err)),
    };

    let now = time.now_millis();
    let patch = UserPatch {
        username: credentials.profile_name(email),
        email: Some(email.to_string()),
        updated_at: Some(now),
        created_at: registered.then_some(now),
        ..UserPatch::default()
    };
    if let Err(err) = store.merge_user(&session.uid, patch).await {
        error!(%err, uid = %session.uid, "failed to write profile");
        return Err(err.into());
    }

    info!(uid = %session.uid, registered, "signed in");
    Ok(SignedIn {
        session,
        registered,
    })
}
