use crate::errors::{AppError, AppResult};
use crate::models::domain::attempt::Attempt;

/// Who may start an attempt and who may mutate an existing one. The
/// `allow_guests` flag comes from the same settings snapshot the service
/// already loaded, so the policy itself stays free of I/O.
pub trait AccessPolicy: Send + Sync {
    fn can_start_attempt(
        &self,
        user_id: Option<u64>,
        guest_name: Option<&str>,
        allow_guests: bool,
    ) -> AppResult<()>;

    fn can_modify_attempt(&self, user_id: Option<u64>, attempt: &Attempt) -> AppResult<()>;
}

/// Default policy:
/// - any authenticated user may start;
/// - guests may start only when the test allows them and a non-empty guest
///   name is supplied;
/// - an attempt is modifiable by its owning user, or by an anonymous
///   requester when the attempt belongs to a guest (possession of the
///   attempt id is the guest's credential).
pub struct GuestAwarePolicy;

impl AccessPolicy for GuestAwarePolicy {
    fn can_start_attempt(
        &self,
        user_id: Option<u64>,
        guest_name: Option<&str>,
        allow_guests: bool,
    ) -> AppResult<()> {
        if user_id.is_some() {
            return Ok(());
        }
        if !allow_guests {
            return Err(AppError::GuestsNotAllowed(
                "this test does not accept guest attempts".to_string(),
            ));
        }
        match guest_name {
            Some(name) if !name.trim().is_empty() => Ok(()),
            _ => Err(AppError::Validation("guest name required".to_string())),
        }
    }

    fn can_modify_attempt(&self, user_id: Option<u64>, attempt: &Attempt) -> AppResult<()> {
        if attempt.guest_name().is_some() && user_id.is_none() {
            return Ok(());
        }
        if let Some(uid) = user_id {
            if uid == attempt.user_id() {
                return Ok(());
            }
        }
        Err(AppError::Forbidden(
            "attempt belongs to another participant".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::domain::policy::AttemptPolicy;
    use chrono::Utc;
    use uuid::Uuid;

    fn attempt(user_id: u64, guest_name: Option<&str>) -> Attempt {
        Attempt::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            user_id,
            guest_name.map(|g| g.to_string()),
            Utc::now(),
            AttemptPolicy::default(),
            1,
            vec!["q1".to_string()],
            String::new(),
            String::new(),
        )
    }

    #[test]
    fn test_authenticated_user_can_always_start() {
        let policy = GuestAwarePolicy;
        assert!(policy.can_start_attempt(Some(5), None, false).is_ok());
    }

    #[test]
    fn test_guest_blocked_when_not_allowed() {
        let policy = GuestAwarePolicy;
        let err = policy
            .can_start_attempt(None, Some("G"), false)
            .unwrap_err();
        assert!(matches!(err, AppError::GuestsNotAllowed(_)));
    }

    #[test]
    fn test_guest_needs_non_blank_name() {
        let policy = GuestAwarePolicy;
        assert!(policy.can_start_attempt(None, Some("Kim"), true).is_ok());
        assert!(policy.can_start_attempt(None, Some("   "), true).is_err());
        assert!(policy.can_start_attempt(None, None, true).is_err());
    }

    #[test]
    fn test_owner_can_modify() {
        let policy = GuestAwarePolicy;
        let a = attempt(5, None);
        assert!(policy.can_modify_attempt(Some(5), &a).is_ok());
        assert!(policy.can_modify_attempt(Some(6), &a).is_err());
        assert!(policy.can_modify_attempt(None, &a).is_err());
    }

    #[test]
    fn test_anonymous_requester_can_modify_guest_attempt() {
        let policy = GuestAwarePolicy;
        let a = attempt(0, Some("Kim"));
        assert!(policy.can_modify_attempt(None, &a).is_ok());
        // An authenticated user is not the guest.
        assert!(policy.can_modify_attempt(Some(5), &a).is_err());
    }
}
