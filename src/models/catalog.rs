use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A book row as exposed by the catalog collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub book_id: Uuid,
    pub code: String,
    pub name: String,
    pub price: Decimal,
    pub grade: Option<String>,
    #[serde(default)]
    pub grades: Vec<String>,
    pub inventory_quantity: i32,
    pub reserved_quantity: i32,
    pub active: bool,
    pub restricted_catalog: bool,
}

impl CatalogItem {
    pub fn available_quantity(&self) -> i32 {
        self.inventory_quantity - self.reserved_quantity
    }

    pub fn in_stock(&self) -> bool {
        self.available_quantity() > 0
    }

    /// Every grade label this row is tagged with.
    pub fn grade_labels(&self) -> impl Iterator<Item = &str> {
        self.grade
            .as_deref()
            .into_iter()
            .chain(self.grades.iter().map(String::as_str))
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EnrollmentStatus {
    Pending,
    Approved,
    Rejected,
}

/// Student enrollment for one school year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub student_id: Uuid,
    pub user_id: Uuid,
    pub student_name: String,
    pub grade: String,
    pub school_year: i32,
    pub status: EnrollmentStatus,
}

/// Display identity of a buyer, used for board payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: Uuid,
    pub display_name: String,
    pub email: Option<String>,
}
