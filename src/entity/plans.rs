use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "plans")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    pub name: String,
    pub price: i64,
    pub currency: String,
    pub features: Json,
    pub active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::plan_payments::Entity")]
    PlanPayments,
}

impl Related<super::plan_payments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PlanPayments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
