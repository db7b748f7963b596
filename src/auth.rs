use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};

use crate::limits::MAX_CLIENT_ID_LEN;

/// Shared-secret password check. The login user becomes the session's
/// client id, so it must be present and fit the id limits.
#[derive(Debug)]
pub struct SlotbookAuthSource {
    password: String,
}

impl SlotbookAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

fn invalid_user(message: &str) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "FATAL".into(),
        "28000".into(),
        message.to_string(),
    )))
}

#[async_trait]
impl AuthSource for SlotbookAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        let user = login.user().map(str::trim).unwrap_or_default();
        if user.is_empty() {
            return Err(invalid_user("a user name is required"));
        }
        if user.len() > MAX_CLIENT_ID_LEN {
            return Err(invalid_user("user name too long"));
        }
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}
