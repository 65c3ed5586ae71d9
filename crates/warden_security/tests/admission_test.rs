//! Admission controller behavior over explicit clocks.

use std::time::{Duration, Instant};
use warden_security::{AdmissionConfig, AdmissionController, AdmissionDecision, MAX_PENALTY};

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[test]
fn test_cooldown_escalates_to_suspension() {
    let controller = AdmissionController::new(AdmissionConfig::default());
    let t0 = Instant::now();

    assert_eq!(controller.check_at("~u@h", t0), AdmissionDecision::Accepted);
    assert_eq!(
        controller.check_at("~u@h", t0 + ms(100)),
        AdmissionDecision::Accepted
    );
    assert_eq!(
        controller.check_at("~u@h", t0 + ms(200)),
        AdmissionDecision::Cooldown {
            remaining: Duration::from_secs(10)
        }
    );
    assert_eq!(
        controller.check_at("~u@h", t0 + Duration::from_secs(5)),
        AdmissionDecision::Suspended {
            remaining: Duration::from_secs(3600)
        }
    );

    let half_hour = Duration::from_secs(30 * 60);
    assert_eq!(
        controller.check_at("~u@h", t0 + Duration::from_secs(5) + half_hour),
        AdmissionDecision::Suspended {
            remaining: half_hour
        }
    );
}

#[test]
fn test_attempts_while_suspended_do_not_extend_it() {
    let controller = AdmissionController::new(AdmissionConfig::default());
    let t0 = Instant::now();
    controller.check_at("~u@h", t0);
    controller.check_at("~u@h", t0);
    controller.check_at("~u@h", t0);
    controller.check_at("~u@h", t0 + ms(500));

    let end = t0 + ms(500) + Duration::from_secs(3600);
    controller.check_at("~u@h", end - Duration::from_secs(1));
    assert_eq!(controller.check_at("~u@h", end), AdmissionDecision::Accepted);
}

#[test]
fn test_cooldown_lapses_without_suspension() {
    let controller = AdmissionController::new(AdmissionConfig::default());
    let t0 = Instant::now();
    controller.check_at("~u@h", t0);
    controller.check_at("~u@h", t0);
    assert!(matches!(
        controller.check_at("~u@h", t0),
        AdmissionDecision::Cooldown { .. }
    ));

    let after = t0 + Duration::from_secs(11);
    assert_eq!(controller.check_at("~u@h", after), AdmissionDecision::Accepted);
}

#[test]
fn test_global_limit_across_identities() {
    let controller = AdmissionController::new(AdmissionConfig::default());
    let t0 = Instant::now();

    for (i, identity) in ["~a@h", "~b@h", "~c@h", "~d@h", "~e@h"].iter().enumerate() {
        assert_eq!(
            controller.check_at(identity, t0 + ms(i as u64 * 10)),
            AdmissionDecision::Accepted
        );
    }
    assert_eq!(
        controller.check_at("~f@h", t0 + ms(100)),
        AdmissionDecision::GloballyThrottled
    );

    // A throttled identity is not penalized and the window rolls on.
    assert_eq!(
        controller.check_at("~f@h", t0 + ms(1_100)),
        AdmissionDecision::Accepted
    );
}

#[test]
fn test_at_most_limit_accepted_in_any_window() {
    let controller = AdmissionController::new(AdmissionConfig::default());
    let t0 = Instant::now();
    let mut accepted = Vec::new();

    // One attempt every 150ms for a minute.
    for step in 0..400u64 {
        let now = t0 + ms(step * 150);
        if controller.check_at("~busy@h", now).is_accepted() {
            accepted.push(now);
        }
    }

    assert!(!accepted.is_empty());
    for (i, start) in accepted.iter().enumerate() {
        let in_window = accepted[i..]
            .iter()
            .take_while(|at| at.duration_since(*start) < Duration::from_secs(1))
            .count();
        assert!(in_window <= 2, "{} accepted within one window", in_window);
    }
}

#[test]
fn test_spaced_attempts_are_always_accepted() {
    let controller = AdmissionController::new(AdmissionConfig::default());
    let t0 = Instant::now();
    for step in 0..20u64 {
        assert!(controller.check_at("~calm@h", t0 + ms(step * 600)).is_accepted());
    }
}

#[test]
fn test_suspension_notices_are_spaced() {
    let controller = AdmissionController::new(AdmissionConfig::default());
    let t0 = Instant::now();

    assert!(controller.can_notify_at("~u@h", t0));
    assert!(!controller.can_notify_at("~u@h", t0 + Duration::from_secs(30)));
    assert!(!controller.can_notify_at("~u@h", t0 + Duration::from_secs(60)));
    assert!(controller.can_notify_at("~u@h", t0 + Duration::from_secs(61)));

    // Independent per identity.
    assert!(controller.can_notify_at("~other@h", t0 + Duration::from_secs(30)));
}

#[test]
fn test_custom_limits() {
    let config = AdmissionConfig::default()
        .with_per_identity_limit(1)
        .with_cooldown(Duration::from_secs(2))
        .with_suspension(Duration::from_secs(20));
    let controller = AdmissionController::new(config);
    let t0 = Instant::now();

    assert!(controller.check_at("~u@h", t0).is_accepted());
    assert_eq!(
        controller.check_at("~u@h", t0 + ms(10)),
        AdmissionDecision::Cooldown {
            remaining: Duration::from_secs(2)
        }
    );
    assert_eq!(
        controller.check_at("~u@h", t0 + ms(20)),
        AdmissionDecision::Suspended {
            remaining: Duration::from_secs(20)
        }
    );
}

#[test]
fn test_oversized_penalties_are_capped() {
    let config = AdmissionConfig::default()
        .with_per_identity_limit(1)
        .with_cooldown(Duration::MAX)
        .with_suspension(Duration::MAX);
    let controller = AdmissionController::new(config);
    assert_eq!(*controller.config().suspension(), MAX_PENALTY);
    let t0 = Instant::now();

    assert!(controller.check_at("~u@h", t0).is_accepted());
    assert_eq!(
        controller.check_at("~u@h", t0 + ms(10)),
        AdmissionDecision::Cooldown {
            remaining: MAX_PENALTY
        }
    );
    assert_eq!(
        controller.check_at("~u@h", t0 + ms(20)),
        AdmissionDecision::Suspended {
            remaining: MAX_PENALTY
        }
    );
    assert!(matches!(
        controller.check_at("~u@h", t0 + Duration::from_secs(60)),
        AdmissionDecision::Suspended { .. }
    ));
}
