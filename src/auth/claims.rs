use serde::{Deserialize, Serialize};

/// Bearer-token claims. Tokens are issued by the identity service; this
/// server only verifies them and reads the numeric subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (numeric user id)
    pub exp: usize,  // Expiration time (as UTC timestamp)
    pub iat: usize,  // Issued at (as UTC timestamp)
}

impl Claims {
    pub fn user_id(&self) -> Option<u64> {
        self.sub.parse::<u64>().ok().filter(|id| *id != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_subject_parses() {
        let claims = Claims {
            sub: "42".to_string(),
            exp: 2,
            iat: 1,
        };
        assert_eq!(claims.user_id(), Some(42));
    }

    #[test]
    fn test_non_numeric_or_zero_subject_is_rejected() {
        let named = Claims {
            sub: "johndoe".to_string(),
            exp: 2,
            iat: 1,
        };
        assert_eq!(named.user_id(), None);

        // Zero is the guest marker, never a real authenticated subject.
        let zero = Claims {
            sub: "0".to_string(),
            exp: 2,
            iat: 1,
        };
        assert_eq!(zero.user_id(), None);
    }
}
