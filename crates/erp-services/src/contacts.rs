//! Contact Service (CRM)
//!
//! A user sees their own contacts, public ones, and department contacts of
//! their departments. Full access sees everything. Contacts outside a
//! user's reach are reported as missing rather than forbidden.

use std::sync::Arc;

use erp_auth::{builtin, CurrentUser};
use erp_core::{ErpError, ErpResult, Id, Page, PaginationParams};
use erp_db::{ContactFilter, ContactStore, ContactViewer};
use erp_models::contact::normalize_phone;
use erp_models::{Contact, ContactVisibility, NewContact};
use serde::Deserialize;
use tracing::info;

use crate::support::non_blank;

pub const SEARCH_MAX_LENGTH: usize = 100;
pub const SEARCH_LIMIT: i64 = 50;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactQuery {
    pub search: Option<String>,
    pub visibility: Option<ContactVisibility>,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInput {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub alternative_phone: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub reference: Option<String>,
    pub visibility: Option<ContactVisibility>,
    pub department: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub alternative_phone: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
    pub reference: Option<String>,
    pub visibility: Option<ContactVisibility>,
    pub department: Option<String>,
}

#[derive(Clone)]
pub struct ContactService {
    contacts: Arc<dyn ContactStore>,
}

impl ContactService {
    pub fn new(contacts: Arc<dyn ContactStore>) -> Self {
        Self { contacts }
    }

    pub async fn list(
        &self,
        user: &CurrentUser,
        query: ContactQuery,
        params: &PaginationParams,
    ) -> ErpResult<Page<Contact>> {
        user.require(builtin::CONTACTS_VIEW)?;

        let filter = ContactFilter {
            viewer: viewer(user),
            search: non_blank(query.search.as_deref()),
            visibility: query.visibility,
            tag: non_blank(query.tag.as_deref()),
        };
        let items = self
            .contacts
            .list(&filter, params.limit(), params.offset())
            .await?;
        let total = self.contacts.count_matching(&filter).await?;
        Ok(Page::new(items, total, params))
    }

    pub async fn get(&self, user: &CurrentUser, id: Id) -> ErpResult<Contact> {
        user.require(builtin::CONTACTS_VIEW)?;
        let contact = self.find(id).await?;
        if !can_see(user, &contact) {
            return Err(ErpError::not_found("Contact", id));
        }
        Ok(contact)
    }

    pub async fn create(&self, user: &CurrentUser, input: ContactInput) -> ErpResult<Contact> {
        user.require(builtin::CONTACTS_MANAGE)?;

        let name = non_blank(input.name.as_deref());
        let phone = non_blank(input.phone.as_deref());
        let (name, phone) = match (name, phone) {
            (Some(name), Some(phone)) => (name, phone),
            _ => return Err(ErpError::bad_request("Name and phone are required")),
        };
        self.ensure_unique_phone(&phone, None).await?;

        let visibility = input.visibility.unwrap_or_default();
        let department = resolve_department(user, visibility, input.department)?;

        let contact = self
            .contacts
            .create(NewContact {
                name,
                phone,
                alternative_phone: non_blank(input.alternative_phone.as_deref()),
                email: non_blank(input.email.as_deref()).map(|e| e.to_lowercase()),
                company: non_blank(input.company.as_deref()),
                position: non_blank(input.position.as_deref()),
                address: non_blank(input.address.as_deref()),
                notes: non_blank(input.notes.as_deref()),
                tags: clean_tags(input.tags),
                reference: non_blank(input.reference.as_deref()),
                visibility,
                department,
                created_by: user.id,
            })
            .await?;

        info!(contact_id = contact.id, visibility = %contact.visibility, "Contact created");
        Ok(contact)
    }

    pub async fn update(
        &self,
        user: &CurrentUser,
        id: Id,
        update: ContactUpdate,
    ) -> ErpResult<Contact> {
        user.require(builtin::CONTACTS_MANAGE)?;
        let mut contact = self.owned(user, id).await?;

        if let Some(name) = update.name {
            contact.name = non_blank(Some(&name))
                .ok_or_else(|| ErpError::bad_request("Name and phone are required"))?;
        }
        if let Some(phone) = update.phone {
            let phone = non_blank(Some(&phone))
                .ok_or_else(|| ErpError::bad_request("Name and phone are required"))?;
            if normalize_phone(&phone) != normalize_phone(&contact.phone) {
                self.ensure_unique_phone(&phone, Some(id)).await?;
            }
            contact.phone = phone;
        }
        if let Some(v) = update.alternative_phone {
            contact.alternative_phone = non_blank(Some(&v));
        }
        if let Some(v) = update.email {
            contact.email = non_blank(Some(&v)).map(|e| e.to_lowercase());
        }
        if let Some(v) = update.company {
            contact.company = non_blank(Some(&v));
        }
        if let Some(v) = update.position {
            contact.position = non_blank(Some(&v));
        }
        if let Some(v) = update.address {
            contact.address = non_blank(Some(&v));
        }
        if let Some(v) = update.notes {
            contact.notes = non_blank(Some(&v));
        }
        if let Some(tags) = update.tags {
            contact.tags = clean_tags(tags);
        }
        if let Some(v) = update.reference {
            contact.reference = non_blank(Some(&v));
        }
        if update.visibility.is_some() || update.department.is_some() {
            let visibility = update.visibility.unwrap_or(contact.visibility);
            let department = update.department.or_else(|| contact.department.clone());
            contact.department = resolve_department(user, visibility, department)?;
            contact.visibility = visibility;
        }

        Ok(self.contacts.update(id, contact).await?)
    }

    pub async fn delete(&self, user: &CurrentUser, id: Id) -> ErpResult<()> {
        user.require(builtin::CONTACTS_MANAGE)?;
        self.owned(user, id).await?;
        self.contacts.delete(id).await?;
        info!(contact_id = id, "Contact deleted");
        Ok(())
    }

    /// Case-insensitive match on name, email, phone or company
    pub async fn search(&self, user: &CurrentUser, q: Option<&str>) -> ErpResult<Vec<Contact>> {
        user.require(builtin::CONTACTS_VIEW)?;

        let term = non_blank(q).ok_or_else(|| ErpError::bad_request("Search query is required"))?;
        if term.chars().count() > SEARCH_MAX_LENGTH {
            return Err(ErpError::bad_request(format!(
                "Search query must be at most {} characters",
                SEARCH_MAX_LENGTH
            )));
        }

        let filter = ContactFilter {
            viewer: viewer(user),
            search: Some(term),
            ..Default::default()
        };
        Ok(self.contacts.list(&filter, SEARCH_LIMIT, 0).await?)
    }

    async fn ensure_unique_phone(&self, phone: &str, exclude: Option<Id>) -> ErpResult<()> {
        let digits = normalize_phone(phone);
        if digits.is_empty() {
            return Err(ErpError::invalid("phone", "must contain digits"));
        }
        if self.contacts.find_by_phone_digits(&digits, exclude).await?.is_some() {
            return Err(ErpError::conflict("A contact with this phone number already exists"));
        }
        Ok(())
    }

    /// Creator or full access; anyone else gets a 404
    async fn owned(&self, user: &CurrentUser, id: Id) -> ErpResult<Contact> {
        let contact = self.find(id).await?;
        if contact.created_by != user.id && !user.has_full_access() {
            return Err(ErpError::not_found("Contact", id));
        }
        Ok(contact)
    }

    async fn find(&self, id: Id) -> ErpResult<Contact> {
        self.contacts
            .find_by_id(id)
            .await?
            .ok_or_else(|| ErpError::not_found("Contact", id))
    }
}

fn viewer(user: &CurrentUser) -> Option<ContactViewer> {
    if user.has_full_access() {
        None
    } else {
        Some(ContactViewer {
            user_id: user.id,
            departments: user.departments.clone(),
        })
    }
}

fn can_see(user: &CurrentUser, contact: &Contact) -> bool {
    user.has_full_access() || contact.visible_to(user.id, &user.departments)
}

/// Department contacts default to the creator's first department
fn resolve_department(
    user: &CurrentUser,
    visibility: ContactVisibility,
    department: Option<String>,
) -> ErpResult<Option<String>> {
    let department = non_blank(department.as_deref());
    if visibility != ContactVisibility::Department {
        return Ok(department);
    }
    department
        .or_else(|| user.departments.first().cloned())
        .map(Some)
        .ok_or_else(|| ErpError::invalid("department", "is required for department contacts"))
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut tags: Vec<String> = tags
        .iter()
        .filter_map(|t| non_blank(Some(t)))
        .map(|t| t.to_lowercase())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{admin, fixture, member};

    fn input(name: &str, phone: &str, visibility: ContactVisibility) -> ContactInput {
        ContactInput {
            name: Some(name.into()),
            phone: Some(phone.into()),
            visibility: Some(visibility),
            ..Default::default()
        }
    }

    const EDITOR: &[&str] = &["contacts.view", "contacts.manage"];

    #[tokio::test]
    async fn test_viewer_cannot_create_or_delete() {
        let fx = fixture().await;
        let viewer = member(2, &["contacts.view"]);
        let err = fx
            .services
            .contacts
            .create(&viewer, input("Ravi", "123", ContactVisibility::Public))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);

        let contact = fx
            .services
            .contacts
            .create(&member(2, EDITOR), input("Ravi", "123", ContactVisibility::Public))
            .await
            .unwrap();
        let err = fx.services.contacts.delete(&viewer, contact.id).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert!(fx.services.contacts.get(&viewer, contact.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_name_and_phone_required() {
        let fx = fixture().await;
        let err = fx
            .services
            .contacts
            .create(&admin(), ContactInput { name: Some("Ravi".into()), ..Default::default() })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_duplicate_phone_conflicts() {
        let fx = fixture().await;
        fx.services
            .contacts
            .create(&admin(), input("Ravi", "+91 98765-43210", ContactVisibility::Private))
            .await
            .unwrap();

        let other = member(2, EDITOR);
        let err = fx
            .services
            .contacts
            .create(&other, input("Someone", "919876543210", ContactVisibility::Private))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn test_visibility_scoping() {
        let fx = fixture().await;
        let owner = member(2, EDITOR).with_employee(20, vec!["Sales".into()]);
        let colleague = member(3, EDITOR).with_employee(30, vec!["Sales".into()]);
        let stranger = member(4, EDITOR);

        let private = fx
            .services
            .contacts
            .create(&owner, input("Private", "111", ContactVisibility::Private))
            .await
            .unwrap();
        let shared = fx
            .services
            .contacts
            .create(&owner, input("Team", "222", ContactVisibility::Department))
            .await
            .unwrap();
        assert_eq!(shared.department.as_deref(), Some("Sales"));
        fx.services
            .contacts
            .create(&owner, input("Everyone", "333", ContactVisibility::Public))
            .await
            .unwrap();

        for (user, expected) in [(&owner, 3), (&colleague, 2), (&stranger, 1), (&admin(), 3)] {
            let page = fx
                .services
                .contacts
                .list(user, ContactQuery::default(), &PaginationParams::default())
                .await
                .unwrap();
            assert_eq!(page.total, expected, "user {}", user.id);
        }

        let err = fx.services.contacts.get(&stranger, private.id).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_only_creator_may_edit() {
        let fx = fixture().await;
        let owner = member(2, EDITOR);
        let contact = fx
            .services
            .contacts
            .create(&owner, input("Vendor", "555", ContactVisibility::Public))
            .await
            .unwrap();

        let err = fx
            .services
            .contacts
            .update(&member(3, EDITOR), contact.id, ContactUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);

        let updated = fx
            .services
            .contacts
            .update(
                &owner,
                contact.id,
                ContactUpdate {
                    company: Some("Acme".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.company.as_deref(), Some("Acme"));

        fx.services.contacts.delete(&admin(), contact.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_search_rules() {
        let fx = fixture().await;
        fx.services
            .contacts
            .create(
                &admin(),
                ContactInput {
                    company: Some("Globex".into()),
                    ..input("Hank", "777", ContactVisibility::Public)
                },
            )
            .await
            .unwrap();

        let err = fx.services.contacts.search(&admin(), Some("   ")).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        let long = "x".repeat(101);
        let err = fx.services.contacts.search(&admin(), Some(&long)).await.unwrap_err();
        assert_eq!(err.status_code(), 400);

        let hits = fx.services.contacts.search(&admin(), Some(" globex ")).await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}
