//! Account lifecycle: registration by invite, activation and password reset
//!
//! Every operation runs in one transaction and starts by sweeping expired
//! pending activations; activation keys are only looked up after that sweep.

mod mailer;

use std::sync::Arc;

use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::users::{ActivationLookup, UserRepository};
use crate::db::{Database, DbError};
use crate::models::{PendingActivation, PendingActivationType, User};

pub use mailer::{LogMailer, Mailer};

const MIN_PASSWORD_LENGTH: usize = 8;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

#[derive(Debug, Error)]
pub enum UserError {
    #[error("invalid or expired activation key")]
    InvalidActivationKey,

    #[error("email already in use")]
    EmailInUse,

    #[error("invite key required")]
    InviteKeyRequired,

    #[error("invalid invite key")]
    InvalidInviteKey,

    #[error("invite key already used")]
    InviteKeyUsed,

    #[error("username already in use")]
    UsernameInUse,

    #[error("user not found")]
    UserNotFound,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error("sending email failed: {0}")]
    Mail(anyhow::Error),
}

impl From<sqlx::Error> for UserError {
    fn from(e: sqlx::Error) -> Self {
        UserError::Db(e.into())
    }
}

/// Treat expired and missing activation records alike
fn live<T>(result: Result<Option<T>, DbError>) -> Result<Option<T>, DbError> {
    match result {
        Err(e) if e.is_not_found() => Ok(None),
        other => other,
    }
}

#[derive(Debug, Clone)]
pub struct ActivationConfig {
    pub require_invite: bool,
    pub require_activation: bool,
    /// How long a pending activation stays valid
    pub expiry: Duration,
    /// Base URL used in emailed links
    pub host_url: String,
    pub bcrypt_cost: u32,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            require_invite: true,
            require_activation: true,
            expiry: Duration::hours(2),
            host_url: "http://localhost:9998".to_string(),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActivateNewUserInput {
    pub name: String,
    pub email: String,
    pub activation_key: Uuid,
    pub password: String,
}

pub struct AccountService {
    db: Database,
    mailer: Arc<dyn Mailer>,
    config: ActivationConfig,
}

impl AccountService {
    pub fn new(db: Database, mailer: Arc<dyn Mailer>, config: ActivationConfig) -> Self {
        Self { db, mailer, config }
    }

    /// Sweep activations older than the configured expiry. The returned
    /// lookup is what activation-key reads require.
    pub async fn clear_expired_activations(&self) -> Result<ActivationLookup, UserError> {
        let mut conn = self.db.pool().acquire().await?;
        let mut repo = UserRepository::new(&mut *conn, self.db.registry());
        Ok(repo.clear_expired_activations(self.config.expiry).await?)
    }

    /// Start a registration. Returns the activation key directly when email
    /// activation is disabled, otherwise emails it and returns `None`.
    pub async fn new_user(
        &self,
        email: &str,
        invite_key: Option<Uuid>,
    ) -> Result<Option<Uuid>, UserError> {
        validate_email(email)?;

        let mut tx = self.db.begin().await?;
        let activation = {
            let mut repo = UserRepository::new(&mut *tx, self.db.registry());
            let lookup = repo.clear_expired_activations(self.config.expiry).await?;

            if repo.find_user_by_email(email).await?.is_some() {
                return Err(UserError::EmailInUse);
            }

            repo.destroy_activations_for(email, PendingActivationType::NewUser)
                .await?;

            if self.config.require_invite {
                let key = invite_key.ok_or(UserError::InviteKeyRequired)?;
                if repo.find_invite_key(key).await?.is_none() {
                    return Err(UserError::InvalidInviteKey);
                }
                if live(repo.find_activation_by_invite_key(&lookup, key).await)?.is_some() {
                    return Err(UserError::InviteKeyUsed);
                }
            }

            let mut activation = PendingActivation::new(email, PendingActivationType::NewUser);
            activation.invite_key = invite_key;
            repo.create_activation(activation).await?
        };

        if !self.config.require_activation {
            tx.commit().await?;
            debug!(email, "Registration started without email activation");
            return Ok(Some(activation.id));
        }

        let link = format!(
            "{}/activate?email={}&key={}",
            self.config.host_url, email, activation.id
        );
        self.mailer
            .send(
                email,
                "Activate your account",
                &format!("Please follow this link to activate your account: {}", link),
            )
            .await
            .map_err(UserError::Mail)?;

        tx.commit().await?;
        info!(email, "Activation email sent");
        Ok(None)
    }

    /// Finish a registration: consume the activation and its invite key and
    /// create the user
    pub async fn activate_new_user(&self, input: &ActivateNewUserInput) -> Result<User, UserError> {
        if input.name.trim().is_empty() {
            return Err(UserError::Validation("name must not be empty".to_string()));
        }
        validate_password(&input.password, &input.name, &input.email)?;

        let mut tx = self.db.begin().await?;
        let user = {
            let mut repo = UserRepository::new(&mut *tx, self.db.registry());
            let lookup = repo.clear_expired_activations(self.config.expiry).await?;

            let activation = live(repo.find_activation(&lookup, input.activation_key).await)?
                .ok_or(UserError::InvalidActivationKey)?;
            if activation.email != input.email
                || activation.activation_type != PendingActivationType::NewUser
            {
                return Err(UserError::InvalidActivationKey);
            }

            let invited_by = match activation.invite_key {
                Some(key) => Some(
                    repo.find_invite_key(key)
                        .await?
                        .ok_or(UserError::InvalidInviteKey)?
                        .generated_by,
                ),
                None if self.config.require_invite => return Err(UserError::InvalidInviteKey),
                None => None,
            };

            if repo.find_user_by_name(&input.name).await?.is_some() {
                return Err(UserError::UsernameInUse);
            }

            let password_hash = bcrypt::hash(&input.password, self.config.bcrypt_cost)?;
            let user = repo
                .create_user(User {
                    name: input.name.clone(),
                    email: input.email.clone(),
                    password_hash,
                    invited_by,
                    ..Default::default()
                })
                .await?;

            repo.destroy_activation(activation.id).await?;
            if let Some(key) = activation.invite_key {
                repo.destroy_invite_key(key).await?;
            }
            user
        };

        tx.commit().await?;
        info!(user_id = %user.id, name = %user.name, "User activated");
        Ok(user)
    }

    /// Email a password reset key. Unknown emails succeed silently. Any
    /// earlier reset key for the email is replaced.
    pub async fn reset_password(&self, email: &str) -> Result<(), UserError> {
        let mut tx = self.db.begin().await?;
        let activation = {
            let mut repo = UserRepository::new(&mut *tx, self.db.registry());
            repo.clear_expired_activations(self.config.expiry).await?;

            if repo.find_user_by_email(email).await?.is_none() {
                debug!(email, "Password reset for unknown email ignored");
                return Ok(());
            }

            repo.destroy_activations_for(email, PendingActivationType::ResetPassword)
                .await?;
            repo.create_activation(PendingActivation::new(
                email,
                PendingActivationType::ResetPassword,
            ))
            .await?
        };

        let link = format!(
            "{}/resetPassword?key={}",
            self.config.host_url, activation.id
        );
        self.mailer
            .send(
                email,
                "Reset your password",
                &format!("Please follow this link to set a new password: {}", link),
            )
            .await
            .map_err(UserError::Mail)?;

        tx.commit().await?;
        info!(email, "Password reset email sent");
        Ok(())
    }

    /// Set a new password using an emailed reset key
    pub async fn activate_reset_password(
        &self,
        activation_key: Uuid,
        new_password: &str,
    ) -> Result<User, UserError> {
        let mut tx = self.db.begin().await?;
        let user = {
            let mut repo = UserRepository::new(&mut *tx, self.db.registry());
            let lookup = repo.clear_expired_activations(self.config.expiry).await?;

            let activation = live(repo.find_activation(&lookup, activation_key).await)?
                .ok_or(UserError::InvalidActivationKey)?;
            if activation.activation_type != PendingActivationType::ResetPassword {
                return Err(UserError::InvalidActivationKey);
            }

            let mut user = repo
                .find_user_by_email(&activation.email)
                .await?
                .ok_or(UserError::UserNotFound)?;

            validate_password(new_password, &user.name, &user.email)?;
            user.password_hash = bcrypt::hash(new_password, self.config.bcrypt_cost)?;
            user.updated_at = Utc::now();
            let user = repo.update_user(user).await?;

            repo.destroy_activation(activation.id).await?;
            user
        };

        tx.commit().await?;
        info!(user_id = %user.id, "Password reset");
        Ok(user)
    }
}

fn validate_email(email: &str) -> Result<(), UserError> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(UserError::Validation(format!("invalid email address '{}'", email)))
    }
}

fn validate_password(password: &str, name: &str, email: &str) -> Result<(), UserError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(UserError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if password == name || password == email {
        return Err(UserError::Validation(
            "password must differ from name and email".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(validate_email("jane@example.org").is_ok());
        assert!(validate_email("jane@example").is_err());
        assert!(validate_email("not an email").is_err());
    }

    #[test]
    fn password_validation() {
        assert!(validate_password("short", "jane", "jane@example.org").is_err());
        assert!(validate_password("jane@example.org", "jane", "jane@example.org").is_err());
        assert!(validate_password("correct horse", "jane", "jane@example.org").is_ok());
    }
}
