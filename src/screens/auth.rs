use serde::Deserialize;

use crate::account::{Accounts, User};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<()> {
        if self.email.is_empty() || self.password.is_empty() {
            return Err(Error::Invalid(
                "Please enter both email and password.".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn submit(&self, accounts: &Accounts) -> Result<User> {
        self.validate()?;
        accounts.login(&self.email, &self.password).await
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<()> {
        if self.email.is_empty() || self.password.is_empty() || self.confirm_password.is_empty() {
            return Err(Error::Invalid("Please fill out all fields.".to_string()));
        }
        if self.password != self.confirm_password {
            return Err(Error::Invalid("Passwords do not match.".to_string()));
        }
        Ok(())
    }

    pub async fn submit(&self, accounts: &Accounts) -> Result<User> {
        self.validate()?;
        accounts.register(&self.email, &self.password).await
    }
}
