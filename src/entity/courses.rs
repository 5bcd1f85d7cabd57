use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "courses")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    pub theme_id: Uuid,
    pub coach_id: Uuid,
    pub title: String,
    pub description: String,
    pub cover_image: Option<String>,
    pub is_approved: bool,
    pub is_free: bool,
    pub price: Option<i64>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::themes::Entity",
        from = "Column::ThemeId",
        to = "super::themes::Column::Id"
    )]
    Themes,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::CoachId",
        to = "super::users::Column::Id"
    )]
    Users,
    #[sea_orm(has_many = "super::course_modules::Entity")]
    CourseModules,
}

impl Related<super::themes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Themes.def()
    }
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

impl ActiveModelBehavior for ActiveModel {}
