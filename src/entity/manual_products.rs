use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "manual_products")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    pub business_id: Uuid,
    pub original_text: String,
    pub name: String,
    pub quantity: i32,
    pub price: i64,
    pub status: String,
    pub linked_product_id: Option<Uuid>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::businesses::Entity",
        from = "Column::BusinessId",
        to = "super::businesses::Column::Id"
    )]
    Businesses,
    #[sea_orm(
        belongs_to = "super::products::Entity",
        from = "Column::LinkedProductId",
        to = "super::products::Column::Id"
    )]
    Products,
}

impl Related<super::businesses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Businesses.def()
    }
}

impl Related<super::products::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Products.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
