use crate::auth::AuthError;
use crate::session::Session;

/// The hosted authentication service. Only used to learn who the local user is.
pub trait Authenticator: Clone + Send + Sync + 'static {
    fn current_session(&self) -> Option<Session>;

    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> impl Future<Output = Result<Session, AuthError>> + Send + 'a;

    fn create_account<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> impl Future<Output = Result<Session, AuthError>> + Send + 'a;

    fn sign_out(&self) -> impl Future<Output = Result<(), AuthError>> + Send + '_;
}
