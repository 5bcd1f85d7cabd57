//! Entitlement matrix over roles, ownership, pricing and purchase state.

mod common;

use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

use axum_coursehub_api::{
    access,
    entity::purchases,
    models::{Purchasable, PurchasableKind, PurchaseStatus, Role},
    state::AppState,
};
use common::{attach_module, create_course, create_module, create_theme, create_user, setup_state};

async fn insert_purchase(
    state: &AppState,
    user_id: Uuid,
    kind: PurchasableKind,
    purchasable_id: Uuid,
    status: PurchaseStatus,
) -> anyhow::Result<purchases::Model> {
    let purchase = purchases::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        purchasable_type: Set(kind.as_str().to_string()),
        purchasable_id: Set(purchasable_id),
        amount: Set(4900),
        currency: Set("USD".into()),
        payment_provider: Set("stripe".into()),
        payment_id: Set(None),
        checkout_session_id: Set(None),
        status: Set(status.as_str().to_string()),
        metadata: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(purchase)
}

#[tokio::test]
async fn admin_accesses_everything_unconditionally() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let admin = create_user(&state, Role::Admin).await?;
    let coach = create_user(&state, Role::Coach).await?;
    let theme = create_theme(&state).await?;

    let paid_course =
        create_course(&state, coach.user_id, theme.id, true, false, Some(9999)).await?;
    let paid_module = create_module(&state, Some(coach.user_id), false, Some(900)).await?;

    assert!(access::can_access(&state.orm, &admin, &Purchasable::Course(paid_course)).await?);
    assert!(access::can_access(&state.orm, &admin, &Purchasable::Module(paid_module)).await?);
    Ok(())
}

#[tokio::test]
async fn student_needs_a_completed_purchase_for_a_paid_course() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let coach = create_user(&state, Role::Coach).await?;
    let student = create_user(&state, Role::Student).await?;
    let theme = create_theme(&state).await?;
    let course = create_course(&state, coach.user_id, theme.id, true, false, Some(9999)).await?;
    let item = Purchasable::Course(course.clone());

    assert!(!access::can_access(&state.orm, &student, &item).await?);

    // Pending, failed and cancelled grant nothing.
    for status in [
        PurchaseStatus::Pending,
        PurchaseStatus::Failed,
        PurchaseStatus::Cancelled,
    ] {
        insert_purchase(
            &state,
            student.user_id,
            PurchasableKind::Course,
            course.id,
            status,
        )
        .await?;
        assert!(
            !access::can_access(&state.orm, &student, &item).await?,
            "{status:?} purchase must not grant access"
        );
    }

    insert_purchase(
        &state,
        student.user_id,
        PurchasableKind::Course,
        course.id,
        PurchaseStatus::Completed,
    )
    .await?;
    assert!(access::can_access(&state.orm, &student, &item).await?);
    Ok(())
}

#[tokio::test]
async fn free_module_in_paid_course_needs_no_purchase() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let coach = create_user(&state, Role::Coach).await?;
    let student = create_user(&state, Role::Student).await?;
    let theme = create_theme(&state).await?;
    let course = create_course(&state, coach.user_id, theme.id, true, false, Some(9999)).await?;
    let free_module = create_module(&state, Some(coach.user_id), true, None).await?;
    attach_module(&state, course.id, free_module.id, 1).await?;

    assert!(
        access::can_access(&state.orm, &student, &Purchasable::Module(free_module)).await?,
        "the module's own free flag dominates the course paywall"
    );
    Ok(())
}

#[tokio::test]
async fn paid_module_in_free_course_still_requires_purchase() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let coach = create_user(&state, Role::Coach).await?;
    let student = create_user(&state, Role::Student).await?;
    let theme = create_theme(&state).await?;
    let free_course = create_course(&state, coach.user_id, theme.id, true, true, None).await?;
    let paid_module = create_module(&state, Some(coach.user_id), false, Some(900)).await?;
    attach_module(&state, free_course.id, paid_module.id, 1).await?;

    let item = Purchasable::Module(paid_module.clone());
    assert!(!access::can_access(&state.orm, &student, &item).await?);

    insert_purchase(
        &state,
        student.user_id,
        PurchasableKind::Module,
        paid_module.id,
        PurchaseStatus::Completed,
    )
    .await?;
    assert!(access::can_access(&state.orm, &student, &item).await?);
    Ok(())
}

#[tokio::test]
async fn purchased_course_unlocks_its_modules() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let coach = create_user(&state, Role::Coach).await?;
    let student = create_user(&state, Role::Student).await?;
    let theme = create_theme(&state).await?;

    let bought = create_course(&state, coach.user_id, theme.id, true, false, Some(9999)).await?;
    let other = create_course(&state, coach.user_id, theme.id, true, false, Some(9999)).await?;
    let module = create_module(&state, Some(coach.user_id), false, Some(900)).await?;

    // The module sits in a bought course and an unbought one; one purchased
    // course is sufficient.
    attach_module(&state, bought.id, module.id, 1).await?;
    attach_module(&state, other.id, module.id, 3).await?;

    let item = Purchasable::Module(module.clone());
    assert!(!access::can_access(&state.orm, &student, &item).await?);

    insert_purchase(
        &state,
        student.user_id,
        PurchasableKind::Course,
        bought.id,
        PurchaseStatus::Completed,
    )
    .await?;
    assert!(access::can_access(&state.orm, &student, &item).await?);
    Ok(())
}

#[tokio::test]
async fn coach_ownership_rules() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let coach = create_user(&state, Role::Coach).await?;
    let rival = create_user(&state, Role::Coach).await?;
    let theme = create_theme(&state).await?;

    // Unapproved and paid: ownership alone grants access.
    let own_course =
        create_course(&state, coach.user_id, theme.id, false, false, Some(9999)).await?;
    assert!(
        access::can_access(&state.orm, &coach, &Purchasable::Course(own_course.clone())).await?
    );

    let own_module = create_module(&state, Some(coach.user_id), false, Some(900)).await?;
    assert!(
        access::can_access(&state.orm, &coach, &Purchasable::Module(own_module)).await?
    );

    // An ownerless module inside one of the coach's courses is theirs too.
    let orphan_module = create_module(&state, None, false, Some(900)).await?;
    attach_module(&state, own_course.id, orphan_module.id, 1).await?;
    assert!(
        access::can_access(&state.orm, &coach, &Purchasable::Module(orphan_module)).await?
    );

    // Another coach's paid content needs a purchase like anyone else's.
    let rival_course =
        create_course(&state, rival.user_id, theme.id, true, false, Some(9999)).await?;
    let rival_item = Purchasable::Course(rival_course.clone());
    assert!(!access::can_access(&state.orm, &coach, &rival_item).await?);

    insert_purchase(
        &state,
        coach.user_id,
        PurchasableKind::Course,
        rival_course.id,
        PurchaseStatus::Completed,
    )
    .await?;
    assert!(access::can_access(&state.orm, &coach, &rival_item).await?);
    Ok(())
}

#[tokio::test]
async fn free_course_is_open_to_every_role() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let coach = create_user(&state, Role::Coach).await?;
    let student = create_user(&state, Role::Student).await?;
    let other_coach = create_user(&state, Role::Coach).await?;
    let theme = create_theme(&state).await?;

    // is_free flag unset, but a null price means free.
    let course = create_course(&state, coach.user_id, theme.id, true, false, None).await?;

    for user in [&student, &other_coach] {
        assert!(
            access::can_access(&state.orm, user, &Purchasable::Course(course.clone())).await?
        );
    }
    Ok(())
}
