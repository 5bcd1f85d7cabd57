//! Entitlement checks: may a user consume the protected payload (video,
//! attachments) of a course or module? Distinct from the policy layer, which
//! only guards metadata visibility and CRUD.
//!
//! Evaluated fresh per request. Purchase state changes out of band through
//! webhooks, so results must never be cached across requests.

use uuid::Uuid;

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};

use crate::db::OrmConn;
use crate::entity::{course_modules, courses, purchases};
use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::models::{Purchasable, PurchasableKind, PurchaseStatus, Role};

/// Does a completed purchase exist for this user and purchasable?
/// Pending, failed and cancelled purchases grant nothing.
///
/// Generic over the connection so the purchase orchestrator can run the
/// duplicate check inside its insert transaction.
pub async fn has_purchased<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    kind: PurchasableKind,
    purchasable_id: Uuid,
) -> AppResult<bool> {
    let count = purchases::Entity::find()
        .filter(purchases::Column::UserId.eq(user_id))
        .filter(purchases::Column::PurchasableType.eq(kind.as_str()))
        .filter(purchases::Column::PurchasableId.eq(purchasable_id))
        .filter(purchases::Column::Status.eq(PurchaseStatus::Completed.as_str()))
        .count(conn)
        .await?;
    Ok(count > 0)
}

/// Decide whether `user` may consume the protected payload of `item`.
///
/// Rules are evaluated in strict precedence order; the first match wins:
/// admin, free item, coach ownership (direct, or any owned course containing
/// the module), completed purchase (direct, or any purchased course
/// containing the module).
pub async fn can_access(conn: &OrmConn, user: &AuthUser, item: &Purchasable) -> AppResult<bool> {
    if user.role == Role::Admin {
        return Ok(true);
    }

    if item.is_free() {
        return Ok(true);
    }

    if user.role == Role::Coach {
        match item {
            Purchasable::Course(course) => {
                if course.coach_id == user.user_id {
                    return Ok(true);
                }
            }
            Purchasable::Module(module) => {
                if module.coach_id == Some(user.user_id) {
                    return Ok(true);
                }
                if coach_owns_course_containing(conn, user.user_id, module.id).await? {
                    return Ok(true);
                }
            }
        }
        // A coach buying another coach's content is a regular customer.
    }

    match item {
        Purchasable::Course(course) => {
            has_purchased(conn, user.user_id, PurchasableKind::Course, course.id).await
        }
        Purchasable::Module(module) => {
            if has_purchased(conn, user.user_id, PurchasableKind::Module, module.id).await? {
                return Ok(true);
            }
            purchased_course_containing(conn, user.user_id, module.id).await
        }
    }
}

async fn containing_course_ids(conn: &OrmConn, module_id: Uuid) -> AppResult<Vec<Uuid>> {
    let ids = course_modules::Entity::find()
        .filter(course_modules::Column::ModuleId.eq(module_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|row| row.course_id)
        .collect();
    Ok(ids)
}

async fn coach_owns_course_containing(
    conn: &OrmConn,
    coach_id: Uuid,
    module_id: Uuid,
) -> AppResult<bool> {
    let course_ids = containing_course_ids(conn, module_id).await?;
    if course_ids.is_empty() {
        return Ok(false);
    }
    let count = courses::Entity::find()
        .filter(courses::Column::Id.is_in(course_ids))
        .filter(courses::Column::CoachId.eq(coach_id))
        .count(conn)
        .await?;
    Ok(count > 0)
}

/// One purchased course containing the module is sufficient, even if the
/// module also appears in courses the user never bought.
async fn purchased_course_containing(
    conn: &OrmConn,
    user_id: Uuid,
    module_id: Uuid,
) -> AppResult<bool> {
    let course_ids = containing_course_ids(conn, module_id).await?;
    if course_ids.is_empty() {
        return Ok(false);
    }
    let count = purchases::Entity::find()
        .filter(purchases::Column::UserId.eq(user_id))
        .filter(purchases::Column::PurchasableType.eq(PurchasableKind::Course.as_str()))
        .filter(purchases::Column::PurchasableId.is_in(course_ids))
        .filter(purchases::Column::Status.eq(PurchaseStatus::Completed.as_str()))
        .count(conn)
        .await?;
    Ok(count > 0)
}
