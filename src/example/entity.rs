//! `SeaORM` Entity for example records

use async_trait::async_trait;
use sea_orm::{entity::prelude::*, sea_query::StringLen, Set};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "example_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub status: ExampleStatus,
    pub metadata: Json,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

/// Lifecycle state of an example record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum ExampleStatus {
    #[default]
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "inactive")]
    Inactive,
    #[sea_orm(string_value = "archived")]
    Archived,
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    /// Fills in the id, defaults and timestamps.
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = chrono::Utc::now();

        if insert {
            if self.id.is_not_set() {
                self.id = Set(Uuid::new_v4());
            }
            if self.status.is_not_set() {
                self.status = Set(ExampleStatus::default());
            }
            if self.metadata.is_not_set() {
                self.metadata = Set(serde_json::json!({}));
            }
            self.created_at = Set(now);
        }
        self.updated_at = Set(now);

        Ok(self)
    }
}
