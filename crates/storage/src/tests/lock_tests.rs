use std::time::Duration;

use super::create_test_storage;
use crate::traits::DistributedLock;

#[tokio::test]
#[expect(clippy::unwrap_used, reason = "test code")]
async fn second_owner_is_refused_while_held() {
    let storage = create_test_storage();
    let ttl = Duration::from_secs(60);
    assert!(storage.acquire("followup:a", "w1", ttl).await.unwrap());
    assert!(!storage.acquire("followup:a", "w2", ttl).await.unwrap());
    assert!(storage.acquire("followup:b", "w2", ttl).await.unwrap());
}

#[tokio::test]
#[expect(clippy::unwrap_used, reason = "test code")]
async fn release_frees_key() {
    let storage = create_test_storage();
    let ttl = Duration::from_secs(60);
    assert!(storage.acquire("k", "w1", ttl).await.unwrap());
    assert!(storage.release("k", "w1").await.unwrap());
    assert!(storage.acquire("k", "w2", ttl).await.unwrap());
}

#[tokio::test]
#[expect(clippy::unwrap_used, reason = "test code")]
async fn release_by_other_owner_is_ignored() {
    let storage = create_test_storage();
    let ttl = Duration::from_secs(60);
    assert!(storage.acquire("k", "w1", ttl).await.unwrap());
    assert!(!storage.release("k", "w2").await.unwrap());
    assert!(!storage.acquire("k", "w2", ttl).await.unwrap());
}

#[tokio::test]
#[expect(clippy::unwrap_used, reason = "test code")]
async fn expired_lease_can_be_taken_over() {
    let storage = create_test_storage();
    assert!(storage.acquire("k", "crashed", Duration::from_millis(20)).await.unwrap());
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(storage.acquire("k", "w2", Duration::from_secs(60)).await.unwrap());
    // The original holder's late release must not free the new lease.
    assert!(!storage.release("k", "crashed").await.unwrap());
    assert!(!storage.acquire("k", "w3", Duration::from_secs(60)).await.unwrap());
}

#[tokio::test]
#[expect(clippy::unwrap_used, reason = "test code")]
async fn concurrent_acquire_has_single_winner() {
    let storage = create_test_storage();
    let mut handles = Vec::new();
    for i in 0..16 {
        let storage = storage.clone();
        handles.push(tokio::spawn(async move {
            storage.acquire("followup:lead", &format!("w{i}"), Duration::from_secs(60)).await
        }));
    }
    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}
