//! Property tests for expiry decisions

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use tokenwarden::AccessToken;

fn instant(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

proptest! {
    #[test]
    fn expired_exactly_from_recorded_expiry(
        expires in 1_000_000_000i64..2_000_000_000,
        offset in -10_000i64..10_000,
        skew in 0i64..3_600,
    ) {
        let token = AccessToken::bearer("t", None, Some(instant(expires)), Vec::new());
        let now = instant(expires + offset);

        prop_assert_eq!(token.is_expired(now, Duration::seconds(skew)), offset >= 0);
    }

    #[test]
    fn expired_beyond_skew_is_always_expired(
        past in 1i64..10_000,
        skew in 0i64..3_600,
    ) {
        let now = instant(1_700_000_000);
        let expires = now - Duration::seconds(skew + past);
        let token = AccessToken::bearer("t", Some(expires - Duration::hours(1)), Some(expires), Vec::new());

        prop_assert!(token.is_expired(now, Duration::seconds(skew)));
    }

    #[test]
    fn larger_skew_never_expires_a_valid_token(
        issued_offset in -10_000i64..10_000,
        skew in 0i64..3_600,
        extra in 0i64..3_600,
    ) {
        let now = instant(1_700_000_000);
        let token = AccessToken::bearer(
            "t",
            Some(now + Duration::seconds(issued_offset)),
            Some(now + Duration::days(1)),
            Vec::new(),
        );

        if !token.is_expired(now, Duration::seconds(skew)) {
            prop_assert!(!token.is_expired(now, Duration::seconds(skew + extra)));
        }
    }

    #[test]
    fn no_recorded_expiry_never_expires(offset in -1_000_000i64..1_000_000, skew in 0i64..3_600) {
        let token = AccessToken::bearer("t", None, None, Vec::new());
        let now = instant(1_700_000_000 + offset);
        prop_assert!(!token.is_expired(now, Duration::seconds(skew)));
    }
}
