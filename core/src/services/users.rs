use chrono::{DateTime, Utc};
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::task::{JoinError, spawn_blocking};
use tracing::info;

use super::{ErrorStatus, to_utc};
use crate::db::{Db, DbError, Role, User};

lazy_static::lazy_static! {
    static ref EMAIL: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$")
            .unwrap();
    static ref USERNAME: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MIN_PASSWORD_LENGTH: usize = 4;
const TOKEN_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("username must have at least 3 characters")]
    UsernameTooShort,
    #[error("username must contain only letters, numbers, '-' or '_'")]
    InvalidUsername,
    #[error("email format is not valid")]
    InvalidEmail,
    #[error("password must have at least 4 characters")]
    InvalidPassword,
    #[error("username or email already exists")]
    CredentialsAlreadyExist,
    #[error("one of the fields username or email cannot be empty")]
    MissingCredentials,
    #[error("field password cannot be empty")]
    PasswordRequired,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid token")]
    InvalidToken,
    #[error("user not found")]
    NotFound,
    #[error("failed to hash password: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("blocking task failed: {0}")]
    Task(#[from] JoinError),
    #[error(transparent)]
    Db(DbError)
}

impl ErrorStatus for UserError {
    fn status(&self) -> Option<u16> {
        match self {
            UserError::UsernameTooShort |
            UserError::InvalidUsername |
            UserError::InvalidEmail |
            UserError::InvalidPassword |
            UserError::MissingCredentials |
            UserError::PasswordRequired => Some(400),
            UserError::InvalidCredentials | UserError::InvalidToken => {
                Some(401)
            }
            UserError::NotFound => Some(404),
            UserError::CredentialsAlreadyExist => Some(409),
            UserError::Hash(_) | UserError::Task(_) | UserError::Db(_) => None
        }
    }
}

impl From<DbError> for UserError {
    fn from(error: DbError) -> Self {
        match error {
            DbError::NotFound => UserError::NotFound,
            DbError::Duplicate => UserError::CredentialsAlreadyExist,
            error => UserError::Db(error)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUserRequest {
    #[serde(default)]
    pub name:     Option<String>,
    pub username: String,
    #[serde(default)]
    pub email:    Option<String>,
    pub password: String
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email:    Option<String>,
    #[serde(default)]
    pub password: String
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id:            String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name:          Option<String>,
    pub username:      String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email:         Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url:    Option<String>,
    pub groups:        Vec<String>,
    pub role:          Role,
    pub is_active:     bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at:    DateTime<Utc>,
    pub updated_at:    DateTime<Utc>
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id:            user.id,
            name:          user.name,
            username:      user.username,
            email:         user.email,
            avatar_url:    user.avatar_url,
            groups:        user.groups,
            role:          user.role,
            is_active:     user.is_active,
            last_login_at: user.last_login_at.map(to_utc),
            created_at:    to_utc(user.created_at),
            updated_at:    to_utc(user.updated_at)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type:   &'static str,
    pub user:         UserResponse
}

/// The caller behind a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id:   String,
    pub role: Role
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub fn validate_username(username: &str) -> Result<(), UserError> {
    if username.chars().count() < MIN_USERNAME_LENGTH {
        return Err(UserError::UsernameTooShort);
    }

    if !USERNAME.is_match(username) {
        return Err(UserError::InvalidUsername);
    }

    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), UserError> {
    if !EMAIL.is_match(email) {
        return Err(UserError::InvalidEmail);
    }

    Ok(())
}

fn hash_token(secret: &str) -> String {
    let mut hasher = Sha256::new();

    hasher.update(secret.as_bytes());

    format!("{:x}", hasher.finalize())
}

fn new_secret() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];

    rand::thread_rng().fill_bytes(&mut bytes);

    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Splits `<userId>.<secret>`.
pub fn parse_token(token: &str) -> Option<(&str, &str)> {
    let (user_id, secret) = token.split_once('.')?;

    if user_id.is_empty() || secret.is_empty() {
        return None;
    }

    Some((user_id, secret))
}

async fn hash_password(password: String) -> Result<String, UserError> {
    Ok(spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await??)
}

async fn verify_password(
    password: String,
    hashed: String
) -> Result<bool, UserError> {
    Ok(spawn_blocking(move || bcrypt::verify(password, &hashed)).await??)
}


#[derive(Debug, Clone)]
pub struct UserService {
    db: Db
}

impl UserService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create_user(
        &self,
        request: NewUserRequest,
        role: Role
    ) -> Result<UserResponse, UserError> {
        let username = request.username.trim();
        validate_username(username)?;

        let email = request
            .email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty());

        if let Some(email) = email {
            validate_email(email)?;
        }

        if request.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(UserError::InvalidPassword);
        }

        let mut user = User::new(
            username,
            email,
            hash_password(request.password).await?,
            role
        );
        user.name = request
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        self.db.insert_user(&user).await?;

        info!(user_id = %user.id, username = %user.username, "user created");

        Ok(user.into())
    }

    /// Creates an admin unless the username is taken. `Ok(None)` when it
    /// already exists.
    pub async fn create_superuser(
        &self,
        username: &str,
        email: Option<&str>,
        password: &str
    ) -> Result<Option<UserResponse>, UserError> {
        if self.db.get_user_by_username(username).await?.is_some() {
            info!(username, "superuser already exists, skipping");
            return Ok(None);
        }

        let request = NewUserRequest {
            name:     None,
            username: username.to_string(),
            email:    email.map(str::to_string),
            password: password.to_string()
        };

        Ok(Some(self.create_user(request, Role::Admin).await?))
    }

    pub async fn get_user(&self, id: &str) -> Result<UserResponse, UserError> {
        Ok(self.db.get_user(id).await?.into())
    }

    pub async fn list_users(&self) -> Result<Vec<UserResponse>, UserError> {
        Ok(self
            .db
            .list_users()
            .await?
            .into_iter()
            .map(UserResponse::from)
            .collect())
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), UserError> {
        if !self.db.delete_user(id).await? {
            return Err(UserError::NotFound);
        }

        info!(user_id = id, "user deleted");

        Ok(())
    }

    /// Verifies the password and issues a fresh token, replacing any
    /// previous one.
    pub async fn login(
        &self,
        request: LoginRequest
    ) -> Result<LoginResponse, UserError> {
        let username = request
            .username
            .as_deref()
            .map(str::trim)
            .filter(|username| !username.is_empty());
        let email = request
            .email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty());

        if request.password.trim().is_empty() {
            return Err(UserError::PasswordRequired);
        }

        let user = match (username, email) {
            (Some(username), _) => self.db.get_user_by_username(username).await?,
            (None, Some(email)) => self.db.get_user_by_email(email).await?,
            (None, None) => return Err(UserError::MissingCredentials)
        };

        let Some(user) = user.filter(|user| user.is_active) else {
            return Err(UserError::InvalidCredentials);
        };

        if !verify_password(request.password, user.password_hash.clone())
            .await?
        {
            return Err(UserError::InvalidCredentials);
        }

        let secret = new_secret();

        self.db.set_user_token(&user.id, &hash_token(&secret)).await?;

        info!(user_id = %user.id, "user logged in");

        let access_token = format!("{}.{secret}", user.id);
        let user = self.db.get_user(&user.id).await?;

        Ok(LoginResponse {
            access_token,
            token_type: "bearer",
            user: user.into()
        })
    }

    pub async fn authenticate(&self, token: &str) -> Result<AuthUser, UserError> {
        let (user_id, secret) =
            parse_token(token).ok_or(UserError::InvalidToken)?;

        let user = match self.db.get_user(user_id).await {
            Err(DbError::NotFound) => return Err(UserError::InvalidToken),
            result => result?
        };

        if !user.is_active ||
            user.token_hash.as_deref() != Some(hash_token(secret).as_str())
        {
            return Err(UserError::InvalidToken);
        }

        Ok(AuthUser {
            id:   user.id,
            role: user.role
        })
    }
}
