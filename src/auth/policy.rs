//! Who may mutate what. Every predicate denies anonymous actors.

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::{Reply, Review, Role, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Anonymous,
    Member { id: Uuid, role: Role },
}

impl Actor {
    pub fn of(user: &User) -> Self {
        Actor::Member {
            id: user.id,
            role: user.role,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::Member { role: Role::Admin, .. })
    }

    fn is(&self, user_id: Uuid) -> bool {
        matches!(self, Actor::Member { id, .. } if *id == user_id)
    }
}

impl From<Option<&User>> for Actor {
    fn from(user: Option<&User>) -> Self {
        user.map_or(Actor::Anonymous, Actor::of)
    }
}

pub fn can_manage_review(actor: &Actor, review: &Review) -> bool {
    actor.is_admin() || actor.is(review.user_id)
}

pub fn can_manage_reply(actor: &Actor, reply: &Reply) -> bool {
    actor.is_admin() || actor.is(reply.user_id)
}

pub fn can_manage_catalog(actor: &Actor) -> bool {
    actor.is_admin()
}

pub fn can_manage_site(actor: &Actor) -> bool {
    actor.is_admin()
}

/// Turns a denied predicate into an error: unauthenticated for anonymous
/// actors, forbidden otherwise.
pub fn ensure(actor: &Actor, allowed: bool, denied_msg: &str) -> AppResult<()> {
    match (allowed, actor) {
        (true, _) => Ok(()),
        (false, Actor::Anonymous) => Err(AppError::unauthenticated("Access token required")),
        (false, Actor::Member { .. }) => Err(AppError::forbidden(denied_msg)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn member(role: Role) -> Actor {
        Actor::Member {
            id: Uuid::new_v4(),
            role,
        }
    }

    fn review_by(user_id: Uuid) -> Review {
        Review {
            id: Uuid::new_v4(),
            game_id: Uuid::new_v4(),
            user_id,
            user_email: "a@x.com".into(),
            rating: 3,
            text: String::new(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn reply_by(user_id: Uuid) -> Reply {
        Reply {
            id: Uuid::new_v4(),
            review_id: Uuid::new_v4(),
            user_id,
            user_email: "a@x.com".into(),
            text: "hi".into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn admin_manages_any_review_and_reply() {
        let admin = member(Role::Admin);
        for _ in 0..5 {
            assert!(can_manage_review(&admin, &review_by(Uuid::new_v4())));
            assert!(can_manage_reply(&admin, &reply_by(Uuid::new_v4())));
        }
    }

    #[test]
    fn author_manages_own_only() {
        let author_id = Uuid::new_v4();
        let author = Actor::Member {
            id: author_id,
            role: Role::User,
        };
        let other = member(Role::User);

        assert!(can_manage_review(&author, &review_by(author_id)));
        assert!(!can_manage_review(&other, &review_by(author_id)));
        assert!(can_manage_reply(&author, &reply_by(author_id)));
        assert!(!can_manage_reply(&other, &reply_by(author_id)));
    }

    #[test]
    fn anonymous_is_always_denied() {
        let anon = Actor::Anonymous;
        assert!(!can_manage_review(&anon, &review_by(Uuid::new_v4())));
        assert!(!can_manage_reply(&anon, &reply_by(Uuid::new_v4())));
        assert!(!can_manage_catalog(&anon));
        assert!(!can_manage_site(&anon));
    }

    #[test]
    fn catalog_and_site_are_admin_only() {
        assert!(can_manage_catalog(&member(Role::Admin)));
        assert!(!can_manage_catalog(&member(Role::User)));
        assert!(can_manage_site(&member(Role::Admin)));
        assert!(!can_manage_site(&member(Role::User)));
    }

    #[test]
    fn ensure_maps_denials() {
        let user = member(Role::User);
        assert!(ensure(&user, true, "nope").is_ok());
        assert!(matches!(
            ensure(&user, false, "nope"),
            Err(AppError::Forbidden(ref m)) if m == "nope"
        ));
        assert!(matches!(
            ensure(&Actor::Anonymous, false, "nope"),
            Err(AppError::Unauthenticated(_))
        ));
    }
}
