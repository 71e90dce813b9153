use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub username: String,

    /// Unique among active accounts only (partial index, see migration).
    pub email: String,

    /// Argon2id password hash
    pub password_hash: String,

    /// Only active accounts may authenticate.
    pub is_active: bool,

    /// Random activation key (64-char hex), consumed by the emailed
    /// activation link. Generated once at creation and never reused.
    pub activation_key: String,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
