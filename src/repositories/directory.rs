//! Read-only adapters over tables owned by neighbouring modules
//! (catalog, enrollments, users).

use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::entities::{app_user, catalog_book, student_enrollment};
use crate::errors::ServiceError;
use crate::models::{CatalogItem, Enrollment, EnrollmentStatus, UserIdentity};

use super::{CatalogSource, EnrollmentDirectory, UserDirectory};

#[derive(Debug, Clone)]
pub struct SeaOrmCatalog {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmCatalog {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<catalog_book::Model> for CatalogItem {
    fn from(model: catalog_book::Model) -> Self {
        let grades = match serde_json::from_value::<Vec<String>>(model.grades) {
            Ok(grades) => grades,
            Err(e) => {
                warn!(book_id = %model.id, error = %e, "ignoring malformed grades list");
                Vec::new()
            }
        };
        CatalogItem {
            book_id: model.id,
            code: model.code,
            name: model.name,
            price: model.price,
            grade: model.grade,
            grades,
            inventory_quantity: model.inventory_quantity,
            reserved_quantity: model.reserved_quantity,
            active: model.active,
            restricted_catalog: model.restricted_catalog,
        }
    }
}

#[async_trait]
impl CatalogSource for SeaOrmCatalog {
    async fn restricted_books(&self) -> Result<Vec<CatalogItem>, ServiceError> {
        let models = catalog_book::Entity::find()
            .filter(catalog_book::Column::Active.eq(true))
            .filter(catalog_book::Column::RestrictedCatalog.eq(true))
            .order_by_asc(catalog_book::Column::Name)
            .all(self.db.as_ref())
            .await?;
        Ok(models.into_iter().map(CatalogItem::from).collect())
    }

    async fn active_books(&self) -> Result<Vec<CatalogItem>, ServiceError> {
        let models = catalog_book::Entity::find()
            .filter(catalog_book::Column::Active.eq(true))
            .order_by_asc(catalog_book::Column::Name)
            .all(self.db.as_ref())
            .await?;
        Ok(models.into_iter().map(CatalogItem::from).collect())
    }
}

#[derive(Debug, Clone)]
pub struct SeaOrmEnrollments {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmEnrollments {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EnrollmentDirectory for SeaOrmEnrollments {
    async fn enrollment(
        &self,
        student_id: Uuid,
        school_year: i32,
    ) -> Result<Option<Enrollment>, ServiceError> {
        let Some(model) = student_enrollment::Entity::find()
            .filter(student_enrollment::Column::StudentId.eq(student_id))
            .filter(student_enrollment::Column::SchoolYear.eq(school_year))
            .one(self.db.as_ref())
            .await?
        else {
            return Ok(None);
        };

        let status = EnrollmentStatus::from_str(&model.status).map_err(|_| {
            ServiceError::SerializationError(format!(
                "unknown enrollment status '{}' for student {}",
                model.status, student_id
            ))
        })?;
        Ok(Some(Enrollment {
            student_id: model.student_id,
            user_id: model.user_id,
            student_name: model.student_name,
            grade: model.grade,
            school_year: model.school_year,
            status,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct SeaOrmUsers {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmUsers {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for SeaOrmUsers {
    async fn identity(&self, user_id: Uuid) -> Result<Option<UserIdentity>, ServiceError> {
        Ok(app_user::Entity::find_by_id(user_id)
            .one(self.db.as_ref())
            .await?
            .map(|model| UserIdentity {
                user_id: model.id,
                display_name: model.display_name,
                email: model.email,
            }))
    }
}
