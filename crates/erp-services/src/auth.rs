//! Account Service
//!
//! Registration, login, profile and password changes.

use std::sync::Arc;

use chrono::Utc;
use erp_auth::{
    check_length, hash_password, verify_password, CurrentUser, JwtService, PasswordError,
    PermissionResolver,
};
use erp_core::{ErpError, ErpResult, Id};
use erp_db::{EmployeeStore, RoleStore, UserStore};
use erp_models::{Employee, NewUser, Role, User, UserStatus, FULL_ACCESS_LEVEL};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role_id: Option<Id>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordInput {
    pub current_password: String,
    pub new_password: String,
}

/// A signed-in user and their bearer token
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub token: String,
    pub expires_in: i64,
    pub user: User,
    pub role: Option<Role>,
}

/// The caller with role, HR record and resolved permissions
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user: User,
    pub role: Option<Role>,
    pub employee: Option<Employee>,
    pub departments: Vec<String>,
    pub permissions: Vec<String>,
    pub full_access: bool,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    roles: Arc<dyn RoleStore>,
    employees: Arc<dyn EmployeeStore>,
    jwt: Arc<JwtService>,
    resolver: Arc<PermissionResolver>,
    password_min_length: usize,
}

fn password_error(err: PasswordError) -> ErpError {
    match err {
        PasswordError::TooShort(min) => {
            ErpError::invalid("password", format!("must be at least {} characters", min))
        }
        PasswordError::Hash(e) => ErpError::internal(e),
    }
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        roles: Arc<dyn RoleStore>,
        employees: Arc<dyn EmployeeStore>,
        jwt: Arc<JwtService>,
        resolver: Arc<PermissionResolver>,
        password_min_length: usize,
    ) -> Self {
        Self {
            users,
            roles,
            employees,
            jwt,
            resolver,
            password_min_length,
        }
    }

    /// Create an account and sign it in.
    ///
    /// The first account becomes `Root`. Later accounts get the requested
    /// role when it is below full access, otherwise `Employee`.
    pub async fn register(&self, input: RegisterInput) -> ErpResult<AuthSession> {
        let name = input.name.trim().to_string();
        let email = input.email.trim().to_lowercase();
        if name.is_empty() {
            return Err(ErpError::invalid("name", "is required"));
        }
        if !validator::validate_email(email.as_str()) {
            return Err(ErpError::invalid("email", "is not a valid email"));
        }
        check_length(&input.password, self.password_min_length).map_err(password_error)?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(ErpError::conflict("User already exists"));
        }

        let role = self.role_for_new_user(input.role_id).await?;
        let password_hash = hash_password(&input.password).map_err(password_error)?;

        let user = self
            .users
            .create(NewUser {
                name,
                email,
                password_hash,
                role_id: role.as_ref().map(|r| r.id),
                status: UserStatus::Active,
            })
            .await?;

        info!(
            user_id = user.id,
            role = role.as_ref().map(|r| r.name.as_str()).unwrap_or("none"),
            "User registered"
        );
        self.session(user, role)
    }

    pub async fn login(&self, input: LoginInput) -> ErpResult<AuthSession> {
        let email = input.email.trim().to_lowercase();
        let user = match self.users.find_by_email(&email).await? {
            Some(user) if verify_password(&input.password, &user.password_hash) => user,
            _ => {
                warn!(email = %email, "Failed login attempt");
                return Err(ErpError::unauthorized("Invalid email or password"));
            }
        };

        if !user.is_active() {
            return Err(ErpError::forbidden("Account is not active"));
        }

        let now = Utc::now();
        self.users.touch_login(user.id, now).await?;
        let user = User {
            last_login_at: Some(now),
            ..user
        };

        let role = match user.role_id {
            Some(role_id) => self.roles.find_by_id(role_id).await?,
            None => None,
        };

        info!(user_id = user.id, "User logged in");
        self.session(user, role)
    }

    pub async fn me(&self, current: &CurrentUser) -> ErpResult<Profile> {
        let user = self
            .users
            .find_by_id(current.id)
            .await?
            .ok_or_else(|| ErpError::unauthorized("User no longer exists"))?;
        let role = match user.role_id {
            Some(role_id) => self.roles.find_by_id(role_id).await?,
            None => None,
        };
        let employee = self.employees.find_by_user_id(user.id).await?;

        Ok(Profile {
            user,
            role,
            employee,
            departments: current.departments.clone(),
            permissions: current.permissions().map(str::to_string).collect(),
            full_access: current.has_full_access(),
        })
    }

    pub async fn change_password(
        &self,
        current: &CurrentUser,
        input: ChangePasswordInput,
    ) -> ErpResult<()> {
        let mut user = self
            .users
            .find_by_id(current.id)
            .await?
            .ok_or_else(|| ErpError::unauthorized("User no longer exists"))?;

        if !verify_password(&input.current_password, &user.password_hash) {
            return Err(ErpError::unauthorized("Current password is incorrect"));
        }
        check_length(&input.new_password, self.password_min_length).map_err(password_error)?;

        user.password_hash = hash_password(&input.new_password).map_err(password_error)?;
        self.users.update(user.id, user).await?;
        self.resolver.invalidate(current.id);

        info!(user_id = current.id, "Password changed");
        Ok(())
    }

    async fn role_for_new_user(&self, requested: Option<Id>) -> ErpResult<Option<Role>> {
        if self.users.count().await? == 0 {
            if let Some(root) = self.roles.find_by_name("Root").await? {
                return Ok(Some(root));
            }
        }

        if let Some(role_id) = requested {
            let role = self
                .roles
                .find_by_id(role_id)
                .await?
                .ok_or_else(|| ErpError::bad_request("Unknown role"))?;
            if role.level >= FULL_ACCESS_LEVEL {
                return Err(ErpError::forbidden("Privileged roles are assigned by an administrator"));
            }
            return Ok(Some(role));
        }

        Ok(self.roles.find_by_name("Employee").await?)
    }

    fn session(&self, user: User, role: Option<Role>) -> ErpResult<AuthSession> {
        let level = role.as_ref().map_or(0, |r| r.level);
        let token = self
            .jwt
            .create_token(user.id, &user.email, level)
            .map_err(|e| ErpError::internal(e.to_string()))?;

        Ok(AuthSession {
            token,
            expires_in: self.jwt.expires_in_seconds(),
            user,
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixture;

    fn register(email: &str, password: &str) -> RegisterInput {
        RegisterInput {
            name: "Asha".into(),
            email: email.into(),
            password: password.into(),
            role_id: None,
        }
    }

    #[tokio::test]
    async fn test_first_user_becomes_root() {
        let fx = fixture().await;
        let first = fx.services.auth.register(register("a@x.io", "password1")).await.unwrap();
        let second = fx.services.auth.register(register("b@x.io", "password1")).await.unwrap();

        assert_eq!(first.role.map(|r| r.name), Some("Root".to_string()));
        assert_eq!(second.role.map(|r| r.name), Some("Employee".to_string()));
        assert!(!first.token.is_empty());
    }

    #[tokio::test]
    async fn test_register_validation() {
        let fx = fixture().await;
        let err = fx.services.auth.register(register("a@x.io", "short")).await.unwrap_err();
        assert_eq!(err.status_code(), 422);

        fx.services.auth.register(register("a@x.io", "password1")).await.unwrap();
        let err = fx
            .services
            .auth
            .register(register("A@x.io", "password1"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn test_cannot_self_assign_privileged_role() {
        let fx = fixture().await;
        fx.services.auth.register(register("a@x.io", "password1")).await.unwrap();
        let director = fx.stores.roles.find_by_name("Director").await.unwrap().unwrap();

        let err = fx
            .services
            .auth
            .register(RegisterInput {
                role_id: Some(director.id),
                ..register("b@x.io", "password1")
            })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_login() {
        let fx = fixture().await;
        fx.services.auth.register(register("a@x.io", "password1")).await.unwrap();

        let session = fx
            .services
            .auth
            .login(LoginInput {
                email: " A@X.IO ".into(),
                password: "password1".into(),
            })
            .await
            .unwrap();
        assert!(session.user.last_login_at.is_some());

        let err = fx
            .services
            .auth
            .login(LoginInput {
                email: "a@x.io".into(),
                password: "wrong-password".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn test_locked_user_cannot_login() {
        let fx = fixture().await;
        let session = fx.services.auth.register(register("a@x.io", "password1")).await.unwrap();
        let mut user = session.user;
        user.status = UserStatus::Locked;
        fx.stores.users.update(user.id, user).await.unwrap();

        let err = fx
            .services
            .auth
            .login(LoginInput {
                email: "a@x.io".into(),
                password: "password1".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_change_password() {
        let fx = fixture().await;
        let session = fx.services.auth.register(register("a@x.io", "password1")).await.unwrap();
        let current = fx.resolver.resolve(session.user.id).await.unwrap();

        let err = fx
            .services
            .auth
            .change_password(
                &current,
                ChangePasswordInput {
                    current_password: "nope".into(),
                    new_password: "password2".into(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 401);

        fx.services
            .auth
            .change_password(
                &current,
                ChangePasswordInput {
                    current_password: "password1".into(),
                    new_password: "password2".into(),
                },
            )
            .await
            .unwrap();

        let profile = fx.services.auth.me(&current).await.unwrap();
        assert!(profile.full_access);
        let stored = fx.stores.users.find_by_id(current.id).await.unwrap().unwrap();
        assert!(verify_password("password2", &stored.password_hash));
    }
}
