//! Contact (CRM) model
//!
//! Table: contacts

use chrono::{DateTime, Utc};
use erp_core::{Id, Identifiable, Timestamped};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::NewRecord;

text_enum! {
    pub enum ContactVisibility ("contact visibility") {
        Private => "private",
        Department => "department",
        Public => "public",
    }
}

impl Default for ContactVisibility {
    fn default() -> Self {
        ContactVisibility::Private
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Id,
    pub name: String,
    pub phone: String,
    pub alternative_phone: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub reference: Option<String>,
    #[sqlx(try_from = "String")]
    pub visibility: ContactVisibility,
    pub department: Option<String>,
    pub created_by: Id,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    /// Whether a viewer with the given departments may see this contact
    pub fn visible_to(&self, user_id: Id, departments: &[String]) -> bool {
        match self.visibility {
            _ if self.created_by == user_id => true,
            ContactVisibility::Public => true,
            ContactVisibility::Department => self
                .department
                .as_ref()
                .map_or(false, |d| departments.iter().any(|own| own == d)),
            ContactVisibility::Private => false,
        }
    }
}

/// Digits of a phone number, used for duplicate detection
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[derive(Debug, Clone)]
pub struct NewContact {
    pub name: String,
    pub phone: String,
    pub alternative_phone: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub reference: Option<String>,
    pub visibility: ContactVisibility,
    pub department: Option<String>,
    pub created_by: Id,
}

impl NewRecord<Contact> for NewContact {
    fn into_record(self, id: Id, now: DateTime<Utc>) -> Contact {
        Contact {
            id,
            name: self.name,
            phone: self.phone,
            alternative_phone: self.alternative_phone,
            email: self.email,
            company: self.company,
            position: self.position,
            address: self.address,
            notes: self.notes,
            tags: self.tags,
            reference: self.reference,
            visibility: self.visibility,
            department: self.department,
            created_by: self.created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Identifiable for Contact {
    fn id(&self) -> Id {
        self.id
    }
}

impl Timestamped for Contact {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(visibility: ContactVisibility, department: Option<&str>) -> Contact {
        NewContact {
            name: "Vendor".into(),
            phone: "+91 98765-43210".into(),
            alternative_phone: None,
            email: None,
            company: None,
            position: None,
            address: None,
            notes: None,
            tags: vec![],
            reference: None,
            visibility,
            department: department.map(String::from),
            created_by: 1,
        }
        .into_record(1, Utc::now())
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+91 98765-43210"), "919876543210");
        assert_eq!(normalize_phone("(022) 555 0100"), "0225550100");
    }

    #[test]
    fn test_visibility_rules() {
        let sales = vec!["Sales".to_string()];

        assert!(contact(ContactVisibility::Private, None).visible_to(1, &[]));
        assert!(!contact(ContactVisibility::Private, None).visible_to(2, &sales));
        assert!(contact(ContactVisibility::Public, None).visible_to(2, &[]));
        assert!(contact(ContactVisibility::Department, Some("Sales")).visible_to(2, &sales));
        assert!(!contact(ContactVisibility::Department, Some("HR")).visible_to(2, &sales));
    }
}
