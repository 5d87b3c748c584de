// tests/deadline.rs

use std::time::Duration;

use packrun::deadline::Deadline;
use packrun::errors::PackrunError;

#[test]
fn irrelevant_deadline_never_expires() {
    let d = Deadline::irrelevant();
    assert!(!d.is_relevant());
    assert_eq!(d.remaining(), Duration::ZERO);

    let checked = d.checked().expect("irrelevant deadlines never time out");
    assert!(!checked.is_relevant());
    assert_eq!(Deadline::default(), Deadline::irrelevant());
}

#[test]
fn checked_right_away_keeps_most_of_the_budget() {
    let budget = Duration::from_secs(5);
    let d = Deadline::relevant(budget).checked().unwrap();

    assert!(d.is_relevant());
    assert!(d.remaining() <= budget);
    assert!(d.remaining() > Duration::from_secs(4));
}

#[test]
fn checked_after_budget_elapsed_times_out() {
    let d = Deadline::relevant(Duration::from_millis(20));
    std::thread::sleep(Duration::from_millis(40));

    assert!(matches!(d.checked(), Err(PackrunError::TimedOut)));
}

#[test]
fn rederived_deadlines_share_one_budget() {
    let d = Deadline::relevant(Duration::from_millis(300));
    std::thread::sleep(Duration::from_millis(100));
    let second = d.checked().unwrap();
    assert!(second.remaining() <= Duration::from_millis(200));

    std::thread::sleep(Duration::from_millis(250));
    assert!(matches!(second.checked(), Err(PackrunError::TimedOut)));
}

#[test]
fn zero_budget_is_already_expired() {
    let d = Deadline::relevant(Duration::ZERO);
    assert!(matches!(d.checked(), Err(PackrunError::TimedOut)));
}

#[test]
fn optional_timeout_converts() {
    assert!(!Deadline::from(None).is_relevant());

    let d = Deadline::from(Some(Duration::from_secs(1)));
    assert!(d.is_relevant());
    assert_eq!(d.remaining(), Duration::from_secs(1));
}
