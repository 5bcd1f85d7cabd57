//! Per-entity permission rules, evaluated over the acting user and the target
//! record. Pure functions; a denial maps to `AppError::Forbidden` at the
//! service layer and never mutates state. Every rule matches on `Role`
//! exhaustively.

use crate::entity::{courses, modules, purchases};
use crate::middleware::auth::AuthUser;
use crate::models::Role;

pub mod theme {
    use super::*;

    pub fn view_any(_user: Option<&AuthUser>) -> bool {
        true
    }

    pub fn view(_user: Option<&AuthUser>) -> bool {
        true
    }

    pub fn create(user: &AuthUser) -> bool {
        match user.role {
            Role::Admin => true,
            Role::Coach | Role::Student => false,
        }
    }

    pub fn update(user: &AuthUser) -> bool {
        create(user)
    }

    pub fn delete(user: &AuthUser) -> bool {
        create(user)
    }
}

pub mod course {
    use super::*;

    pub fn view_any(user: &AuthUser) -> bool {
        match user.role {
            Role::Admin | Role::Coach | Role::Student => true,
        }
    }

    pub fn view(user: Option<&AuthUser>, course: &courses::Model) -> bool {
        match user {
            None => course.is_approved,
            Some(user) => match user.role {
                Role::Admin => true,
                Role::Coach => course.coach_id == user.user_id || course.is_approved,
                Role::Student => course.is_approved,
            },
        }
    }

    pub fn create(user: &AuthUser) -> bool {
        match user.role {
            Role::Admin | Role::Coach => true,
            Role::Student => false,
        }
    }

    pub fn update(user: &AuthUser, course: &courses::Model) -> bool {
        match user.role {
            Role::Admin => true,
            Role::Coach => course.coach_id == user.user_id,
            Role::Student => false,
        }
    }

    pub fn delete(user: &AuthUser, course: &courses::Model) -> bool {
        match user.role {
            Role::Admin => true,
            // A coach may only remove a course the platform has not approved.
            Role::Coach => course.coach_id == user.user_id && !course.is_approved,
            Role::Student => false,
        }
    }

    pub fn approve(user: &AuthUser) -> bool {
        match user.role {
            Role::Admin => true,
            Role::Coach | Role::Student => false,
        }
    }
}

pub mod module {
    use super::*;

    pub fn view_any(_user: Option<&AuthUser>) -> bool {
        // Guests may browse module metadata for discovery.
        true
    }

    pub fn view(user: Option<&AuthUser>, module: &modules::Model) -> bool {
        match user {
            None => module.is_free,
            Some(user) => match user.role {
                Role::Admin | Role::Coach | Role::Student => true,
            },
        }
    }

    pub fn create(user: &AuthUser) -> bool {
        match user.role {
            Role::Admin | Role::Coach => true,
            Role::Student => false,
        }
    }

    pub fn update(user: &AuthUser, module: &modules::Model) -> bool {
        match user.role {
            Role::Admin => true,
            Role::Coach => module.coach_id == Some(user.user_id),
            Role::Student => false,
        }
    }

    pub fn delete(user: &AuthUser, module: &modules::Model) -> bool {
        update(user, module)
    }
}

pub mod purchase {
    use super::*;

    pub fn view_any(user: &AuthUser) -> bool {
        match user.role {
            Role::Student => true,
            Role::Admin | Role::Coach => false,
        }
    }

    pub fn view(user: &AuthUser, purchase: &purchases::Model) -> bool {
        if purchase.user_id == user.user_id {
            return true;
        }
        match user.role {
            Role::Admin | Role::Coach => true,
            Role::Student => false,
        }
    }

    pub fn create(user: &AuthUser) -> bool {
        match user.role {
            Role::Student => true,
            Role::Admin | Role::Coach => false,
        }
    }

    pub fn update(_user: &AuthUser) -> bool {
        false
    }

    pub fn delete(_user: &AuthUser) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn actor(role: Role) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            role,
        }
    }

    fn course_owned_by(coach_id: Uuid, is_approved: bool) -> courses::Model {
        courses::Model {
            id: Uuid::new_v4(),
            theme_id: Uuid::new_v4(),
            coach_id,
            title: "Fingerstyle".into(),
            description: "Patterns".into(),
            cover_image: None,
            is_approved,
            is_free: false,
            price: Some(4900),
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    fn module_owned_by(coach_id: Option<Uuid>, is_free: bool) -> modules::Model {
        modules::Model {
            id: Uuid::new_v4(),
            coach_id,
            title: "Barre chords".into(),
            description: "Shapes".into(),
            difficulty: "medium".into(),
            video_url: None,
            is_free,
            price: Some(900),
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[test]
    fn themes_are_admin_managed_but_public_to_read() {
        assert!(theme::view_any(None));
        assert!(theme::view(None));
        assert!(theme::create(&actor(Role::Admin)));
        assert!(!theme::create(&actor(Role::Coach)));
        assert!(!theme::delete(&actor(Role::Student)));
    }

    #[test]
    fn coach_sees_own_unapproved_course_student_does_not() {
        let coach = actor(Role::Coach);
        let own = course_owned_by(coach.user_id, false);
        let foreign = course_owned_by(Uuid::new_v4(), false);

        assert!(course::view(Some(&coach), &own));
        assert!(!course::view(Some(&coach), &foreign));
        assert!(!course::view(Some(&actor(Role::Student)), &own));
        assert!(course::view(Some(&actor(Role::Admin)), &foreign));
    }

    #[test]
    fn approved_course_is_visible_to_guests_and_other_coaches() {
        let approved = course_owned_by(Uuid::new_v4(), true);
        assert!(course::view(None, &approved));
        assert!(course::view(Some(&actor(Role::Coach)), &approved));
        assert!(course::view(Some(&actor(Role::Student)), &approved));
    }

    #[test]
    fn coach_cannot_delete_approved_course() {
        let coach = actor(Role::Coach);
        let approved = course_owned_by(coach.user_id, true);
        let pending = course_owned_by(coach.user_id, false);

        assert!(!course::delete(&coach, &approved));
        assert!(course::delete(&coach, &pending));
        assert!(course::delete(&actor(Role::Admin), &approved));
    }

    #[test]
    fn only_admin_approves() {
        assert!(course::approve(&actor(Role::Admin)));
        assert!(!course::approve(&actor(Role::Coach)));
        assert!(!course::approve(&actor(Role::Student)));
    }

    #[test]
    fn guests_view_only_free_modules() {
        assert!(module::view(None, &module_owned_by(None, true)));
        assert!(!module::view(None, &module_owned_by(None, false)));
        assert!(module::view(
            Some(&actor(Role::Student)),
            &module_owned_by(None, false)
        ));
    }

    #[test]
    fn ownerless_module_is_admin_only_to_edit() {
        let orphan = module_owned_by(None, false);
        assert!(module::update(&actor(Role::Admin), &orphan));
        assert!(!module::update(&actor(Role::Coach), &orphan));

        let coach = actor(Role::Coach);
        let owned = module_owned_by(Some(coach.user_id), false);
        assert!(module::update(&coach, &owned));
        assert!(module::delete(&coach, &owned));
    }

    #[test]
    fn purchases_are_created_by_students_only_and_never_mutated() {
        assert!(purchase::create(&actor(Role::Student)));
        assert!(!purchase::create(&actor(Role::Coach)));
        assert!(!purchase::create(&actor(Role::Admin)));
        assert!(!purchase::update(&actor(Role::Admin)));
        assert!(!purchase::delete(&actor(Role::Admin)));
    }

    #[test]
    fn purchase_is_visible_to_owner_and_staff() {
        let owner = actor(Role::Student);
        let stranger = actor(Role::Student);
        let record = purchases::Model {
            id: Uuid::new_v4(),
            user_id: owner.user_id,
            purchasable_type: "course".into(),
            purchasable_id: Uuid::new_v4(),
            amount: 4900,
            currency: "USD".into(),
            payment_provider: "stripe".into(),
            payment_id: None,
            checkout_session_id: None,
            status: "pending".into(),
            metadata: None,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        };

        assert!(purchase::view(&owner, &record));
        assert!(!purchase::view(&stranger, &record));
        assert!(purchase::view(&actor(Role::Admin), &record));
        assert!(purchase::view(&actor(Role::Coach), &record));
    }
}
