use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;

/// Single shared password for every tenant. The user name is ignored; the
/// database name selects the tenant.
#[derive(Debug)]
pub struct CourtbookAuthSource {
    password: String,
}

impl CourtbookAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for CourtbookAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        tracing::debug!(user = ?login.user(), db = ?login.database(), "password lookup");
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}
