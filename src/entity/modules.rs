use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "modules")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    pub coach_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub difficulty: String,
    pub video_url: Option<String>,
    pub is_free: bool,
    pub price: Option<i64>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::CoachId",
        to = "super::users::Column::Id"
    )]
    Users,
    #[sea_orm(has_many = "super::course_modules::Entity")]
    CourseModules,
    #[sea_orm(has_many = "super::attachments::Entity")]
    Attachments,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl Related<super::course_modules::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CourseModules.def()
    }
}

impl Related<super::attachments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Attachments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
