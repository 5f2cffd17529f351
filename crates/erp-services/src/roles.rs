//! Role and user administration

use std::sync::Arc;

use erp_auth::{builtin, validate_permission_names, CurrentUser, PermissionResolver};
use erp_core::{ErpError, ErpResult, Id, Page, PaginationParams};
use erp_db::{RoleStore, UserFilter, UserStore};
use erp_models::{NewRole, Role, User, UserStatus};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub level: Option<i32>,
    pub permissions: Option<Vec<String>>,
    pub description: Option<String>,
}

/// Admin changes to an account
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAdminUpdate {
    pub status: Option<UserStatus>,
    pub role_id: Option<Id>,
}

#[derive(Clone)]
pub struct RoleService {
    roles: Arc<dyn RoleStore>,
    users: Arc<dyn UserStore>,
    resolver: Arc<PermissionResolver>,
}

impl RoleService {
    pub fn new(
        roles: Arc<dyn RoleStore>,
        users: Arc<dyn UserStore>,
        resolver: Arc<PermissionResolver>,
    ) -> Self {
        Self {
            roles,
            users,
            resolver,
        }
    }

    pub async fn list(&self, user: &CurrentUser) -> ErpResult<Vec<Role>> {
        user.require(builtin::ROLES_MANAGE)?;
        Ok(self.roles.list().await?)
    }

    pub async fn get(&self, user: &CurrentUser, id: Id) -> ErpResult<Role> {
        user.require(builtin::ROLES_MANAGE)?;
        self.find(id).await
    }

    pub async fn create(&self, user: &CurrentUser, mut input: NewRole) -> ErpResult<Role> {
        user.require(builtin::ROLES_MANAGE)?;

        input.name = input.name.trim().to_string();
        input.validate()?;
        validate_permission_names(&input.permissions)?;
        self.ensure_can_grant(user, input.level)?;

        if self.roles.find_by_name(&input.name).await?.is_some() {
            return Err(ErpError::conflict("Role already exists"));
        }

        let role = self.roles.create(input).await?;
        info!(role_id = role.id, name = %role.name, level = role.level, "Role created");
        Ok(role)
    }

    pub async fn update(&self, user: &CurrentUser, id: Id, update: RoleUpdate) -> ErpResult<Role> {
        user.require(builtin::ROLES_MANAGE)?;

        let mut role = self.find(id).await?;
        self.ensure_can_grant(user, role.level)?;

        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ErpError::invalid("name", "is required"));
            }
            if let Some(other) = self.roles.find_by_name(&name).await? {
                if other.id != id {
                    return Err(ErpError::conflict("Role already exists"));
                }
            }
            role.name = name;
        }
        if let Some(level) = update.level {
            if !(0..=100).contains(&level) {
                return Err(ErpError::invalid("level", "must be between 0 and 100"));
            }
            self.ensure_can_grant(user, level)?;
            role.level = level;
        }
        if let Some(permissions) = update.permissions {
            validate_permission_names(&permissions)?;
            role.permissions = permissions;
        }
        if let Some(description) = update.description {
            role.description = Some(description).filter(|d| !d.trim().is_empty());
        }

        let role = self.roles.update(id, role).await?;
        self.resolver.invalidate_all();
        Ok(role)
    }

    /// Rejected while any user still holds the role
    pub async fn delete(&self, user: &CurrentUser, id: Id) -> ErpResult<()> {
        user.require(builtin::ROLES_MANAGE)?;

        let role = self.find(id).await?;
        let holders = self
            .users
            .count_matching(&UserFilter {
                role_id: Some(id),
                ..Default::default()
            })
            .await?;
        if holders > 0 {
            return Err(ErpError::bad_request(format!(
                "Role is assigned to {} users",
                holders
            )));
        }

        self.roles.delete(id).await?;
        info!(role_id = id, name = %role.name, "Role deleted");
        Ok(())
    }

    async fn find(&self, id: Id) -> ErpResult<Role> {
        self.roles
            .find_by_id(id)
            .await?
            .ok_or_else(|| ErpError::not_found("Role", id))
    }

    /// Nobody may hand out a level above their own
    fn ensure_can_grant(&self, user: &CurrentUser, level: i32) -> ErpResult<()> {
        if level > user.role_level {
            return Err(ErpError::forbidden("Cannot manage a role above your own level"));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserStore>,
    roles: Arc<dyn RoleStore>,
    resolver: Arc<PermissionResolver>,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserStore>,
        roles: Arc<dyn RoleStore>,
        resolver: Arc<PermissionResolver>,
    ) -> Self {
        Self {
            users,
            roles,
            resolver,
        }
    }

    pub async fn list(
        &self,
        user: &CurrentUser,
        filter: &UserFilter,
        params: &PaginationParams,
    ) -> ErpResult<Page<User>> {
        user.require(builtin::USERS_MANAGE)?;

        let items = self.users.list(filter, params.limit(), params.offset()).await?;
        let total = self.users.count_matching(filter).await?;
        Ok(Page::new(items, total, params))
    }

    pub async fn get(&self, user: &CurrentUser, id: Id) -> ErpResult<User> {
        if user.id != id {
            user.require(builtin::USERS_MANAGE)?;
        }
        self.find(id).await
    }

    pub async fn update(
        &self,
        user: &CurrentUser,
        id: Id,
        update: UserAdminUpdate,
    ) -> ErpResult<User> {
        user.require(builtin::USERS_MANAGE)?;
        if user.id == id && update.status.map_or(false, |s| s != UserStatus::Active) {
            return Err(ErpError::bad_request("You cannot deactivate your own account"));
        }

        let mut target = self.find(id).await?;
        if let Some(status) = update.status {
            target.status = status;
        }
        if let Some(role_id) = update.role_id {
            let role = self
                .roles
                .find_by_id(role_id)
                .await?
                .ok_or_else(|| ErpError::bad_request("Unknown role"))?;
            if role.level > user.role_level {
                return Err(ErpError::forbidden("Cannot assign a role above your own level"));
            }
            target.role_id = Some(role.id);
        }

        let target = self.users.update(id, target).await?;
        self.resolver.invalidate(id);
        info!(user_id = id, status = %target.status, "User updated");
        Ok(target)
    }

    pub async fn delete(&self, user: &CurrentUser, id: Id) -> ErpResult<()> {
        user.require(builtin::USERS_MANAGE)?;
        if user.id == id {
            return Err(ErpError::bad_request("You cannot delete your own account"));
        }

        self.find(id).await?;
        self.users.delete(id).await?;
        self.resolver.invalidate(id);
        info!(user_id = id, "User deleted");
        Ok(())
    }

    async fn find(&self, id: Id) -> ErpResult<User> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| ErpError::not_found("User", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{admin, fixture, member};

    #[tokio::test]
    async fn test_role_lifecycle() {
        let fx = fixture().await;
        let roles = &fx.services.roles;

        let role = roles
            .create(
                &admin(),
                NewRole {
                    name: "Auditor".into(),
                    level: 40,
                    permissions: vec!["finance.view".into()],
                    description: None,
                },
            )
            .await
            .unwrap();

        let role = roles
            .update(
                &admin(),
                role.id,
                RoleUpdate {
                    permissions: Some(vec!["finance.view".into(), "admin.activity".into()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(role.permissions.len(), 2);

        roles.delete(&admin(), role.id).await.unwrap();
        assert_eq!(roles.get(&admin(), role.id).await.unwrap_err().status_code(), 404);
    }

    #[tokio::test]
    async fn test_role_in_use_cannot_be_deleted() {
        let fx = fixture().await;
        let user = fx.register("a@x.io").await;
        let root = user.role_id.unwrap();

        let err = fx.services.roles.delete(&admin(), root).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_invalid_permission_name_rejected() {
        let fx = fixture().await;
        let err = fx
            .services
            .roles
            .create(
                &admin(),
                NewRole {
                    name: "Bad".into(),
                    level: 10,
                    permissions: vec!["DROP TABLE".into()],
                    description: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 422);
    }

    #[tokio::test]
    async fn test_user_admin_update() {
        let fx = fixture().await;
        fx.register("root@x.io").await;
        let user = fx.register("a@x.io").await;

        let manager = fx.stores.roles.find_by_name("Manager").await.unwrap().unwrap();
        let updated = fx
            .services
            .users
            .update(
                &admin(),
                user.id,
                UserAdminUpdate {
                    status: Some(UserStatus::Locked),
                    role_id: Some(manager.id),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, UserStatus::Locked);
        assert_eq!(updated.role_id, Some(manager.id));

        let err = fx
            .services
            .users
            .list(&member(5, &[]), &UserFilter::default(), &PaginationParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }
}
