use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::AccountUpdateRequest,
    jwt::JwtKeys,
    password::{check_new_password, hash_password, random_password, verify_password},
};
use crate::{
    config::AdminSeed,
    error::{AppError, AppResult},
    store::{Role, Store, StoreError, User},
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trimmed and lowercased; emails compare case-insensitively everywhere.
pub(crate) fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::validation("Valid email is required"));
    }
    Ok(email)
}

#[derive(Debug)]
pub struct Session {
    pub user: User,
    pub token: String,
}

pub async fn signup(store: &dyn Store, keys: &JwtKeys, email: &str, password: &str) -> AppResult<Session> {
    let email = normalize_email(email)?;
    check_new_password(password, "Password")?;

    if store.find_user_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::conflict(crate::store::EMAIL_TAKEN));
    }

    let user = User {
        id: Uuid::new_v4(),
        email,
        password_hash: hash_password(password)?,
        role: Role::User,
        created_at: OffsetDateTime::now_utc(),
    };
    store.insert_user(&user).await?;

    let token = keys.sign(user.id)?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(Session { user, token })
}

pub async fn login(store: &dyn Store, keys: &JwtKeys, email: &str, password: &str) -> AppResult<Session> {
    let email = normalize_email(email)?;
    if password.is_empty() {
        return Err(AppError::validation("Password is required"));
    }

    let Some(user) = store.find_user_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AppError::unauthenticated("Invalid credentials"));
    };

    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::unauthenticated("Invalid credentials"));
    }

    let token = keys.sign(user.id)?;
    info!(user_id = %user.id, "user logged in");
    Ok(Session { user, token })
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

/// Applies an email and/or password change for `user`. Everything is
/// validated before the first write.
pub async fn update_account(store: &dyn Store, user: &User, req: AccountUpdateRequest) -> AppResult<User> {
    let new_email = match non_empty(req.email) {
        Some(raw) => {
            let email = normalize_email(&raw)?;
            (email != user.email).then_some(email)
        }
        None => None,
    };

    let new_hash = match non_empty(req.new_password) {
        Some(new_password) => {
            check_new_password(&new_password, "New password")?;
            let current = non_empty(req.current_password).ok_or_else(|| {
                AppError::validation("Current password is required to change password")
            })?;
            if !verify_password(&current, &user.password_hash)? {
                warn!(user_id = %user.id, "account update with wrong current password");
                return Err(AppError::validation("Current password is incorrect"));
            }
            Some(hash_password(&new_password)?)
        }
        None => None,
    };

    if let Some(email) = &new_email {
        if let Some(other) = store.find_user_by_email(email).await? {
            if other.id != user.id {
                return Err(AppError::conflict(crate::store::EMAIL_TAKEN));
            }
        }
    }

    if new_email.is_some() || new_hash.is_some() {
        store
            .update_account(user.id, new_email.as_deref(), new_hash.as_deref())
            .await?;
        info!(
            user_id = %user.id,
            email_changed = new_email.is_some(),
            password_changed = new_hash.is_some(),
            "account updated"
        );
    }

    store
        .find_user(user.id)
        .await?
        .ok_or(AppError::NotFound("User"))
}

/// Seeds one admin account when none exists. Returns the created admin.
pub async fn bootstrap_admin(store: &dyn Store, seed: &AdminSeed) -> anyhow::Result<Option<User>> {
    if store.admin_exists().await? {
        return Ok(None);
    }

    let password = match &seed.password {
        Some(p) => p.clone(),
        None => {
            let generated = random_password(16);
            warn!(
                email = %seed.email,
                password = %generated,
                "ADMIN_PASSWORD not set; generated a password for the seeded admin"
            );
            generated
        }
    };

    let admin = User {
        id: Uuid::new_v4(),
        email: seed.email.trim().to_lowercase(),
        password_hash: hash_password(&password)?,
        role: Role::Admin,
        created_at: OffsetDateTime::now_utc(),
    };

    match store.insert_user(&admin).await {
        Ok(()) => {
            info!(user_id = %admin.id, email = %admin.email, "default admin created");
            Ok(Some(admin))
        }
        Err(StoreError::Conflict(_)) => {
            warn!(email = %admin.email, "admin seed email already belongs to a regular user; skipping");
            Ok(None)
        }
        Err(StoreError::Backend(e)) => Err(e),
    }
}
