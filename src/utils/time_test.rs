use std::thread::sleep;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use super::time::epoch_millis;
use super::time::now_millis;

#[test]
fn test_now_millis_moves_forward() {
    let t1 = now_millis();
    sleep(Duration::from_millis(10));
    let t2 = now_millis();

    assert!(t2 > t1);
    assert!(t1 > 1_609_459_200_000); // after 2021-01-01
}

#[test]
fn test_epoch_millis() {
    assert_eq!(epoch_millis(UNIX_EPOCH + Duration::from_millis(1_500)), 1_500);
}

#[test]
fn test_epoch_millis_before_epoch_is_zero() {
    let before = UNIX_EPOCH - Duration::from_secs(1);
    assert_eq!(epoch_millis(before), 0);
    assert!(epoch_millis(SystemTime::now()) > 0);
}
