//! Account pool behaviour under realistic call sequences

use crate::common::{memory_storage, pool, RecordingVerifier};
use chrono::{Duration, Utc};
use crawl_warden::config::Config;
use crawl_warden::pool::{AccountQuery, CredentialVerdict};
use crawl_warden::state::MAX_COOLDOWN_SECS;
use crawl_warden::storage::{lock_storage, NewAccount};
use crawl_warden::{AccountPool, AccountStatus, Platform};
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_usage_is_not_lost() -> anyhow::Result<()> {
    let storage = memory_storage();
    let pool = Arc::new(pool(storage.clone()));
    let account = pool.add_account(NewAccount::new(Platform::Xhs, "shared", "cookie"))?;

    let mut handles = Vec::new();
    for _ in 0..40 {
        let pool = pool.clone();
        let id = account.id;
        handles.push(tokio::spawn(async move {
            pool.mark_account_used(id, true, Some(1), None).await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let cached = pool.get_account(account.id).expect("cached account");
    assert_eq!(cached.use_count, 40);
    assert_eq!(cached.success_count, 40);

    let stored = lock_storage(&storage)
        .get_account(account.id)?
        .expect("stored account");
    assert_eq!(stored.use_count, 40);
    Ok(())
}

#[tokio::test]
async fn test_backoff_sequence_and_reset() -> anyhow::Result<()> {
    let pool = pool(memory_storage());
    let account = pool.add_account(NewAccount::new(Platform::Douyin, "x", "cookie"))?;
    let t0 = Utc::now();

    let mut record = pool.mark_account_used_at(account.id, false, None, None, t0).await?;
    assert_eq!(record.cooldown_until, Some(t0 + Duration::seconds(300)));

    record = pool.mark_account_used_at(account.id, false, None, None, t0).await?;
    assert_eq!(record.cooldown_until, Some(t0 + Duration::seconds(600)));

    record = pool.mark_account_used_at(account.id, false, None, None, t0).await?;
    assert_eq!(record.consecutive_fails, 3);
    assert_eq!(record.cooldown_until, Some(t0 + Duration::seconds(1200)));
    assert_eq!(record.health_score, 70);

    let t1 = t0 + Duration::seconds(1200);
    record = pool.mark_account_used_at(account.id, true, None, None, t1).await?;
    assert_eq!(record.consecutive_fails, 0);

    record = pool.mark_account_used_at(account.id, false, None, None, t1).await?;
    assert_eq!(record.consecutive_fails, 1);
    assert_eq!(record.cooldown_until, Some(t1 + Duration::seconds(300)));
    Ok(())
}

#[tokio::test]
async fn test_health_stays_in_range() -> anyhow::Result<()> {
    let pool = pool(memory_storage());
    let account = pool.add_account(NewAccount::new(Platform::Weibo, "x", "cookie"))?;

    for i in 0..40 {
        let success = i % 7 == 0;
        let record = pool.mark_account_used(account.id, success, Some(1), None).await?;
        assert!(record.health_score <= 100);
    }
    let record = pool.get_account(account.id).expect("account");
    assert_eq!(record.status, AccountStatus::Cooldown);

    for _ in 0..40 {
        let record = pool.mark_account_used(account.id, true, Some(1), None).await?;
        assert!(record.health_score <= 100);
    }
    let record = pool.get_account(account.id).expect("account");
    assert_eq!(record.health_score, 100);
    assert_eq!(record.status, AccountStatus::Active);
    Ok(())
}

#[tokio::test]
async fn test_never_returns_cooling_account() -> anyhow::Result<()> {
    let pool = pool(memory_storage());
    let account = pool.add_account(NewAccount::new(Platform::Bilibili, "x", "cookie"))?;
    let t0 = Utc::now();

    pool.mark_account_used_at(account.id, true, Some(120), None, t0).await?;

    let query = AccountQuery::new(Platform::Bilibili);
    assert!(pool.select_at(&query, t0 + Duration::seconds(119)).is_none());
    assert_eq!(
        pool.select_at(&query, t0 + Duration::seconds(120)).map(|a| a.id),
        Some(account.id)
    );
    Ok(())
}

#[tokio::test]
async fn test_oversized_cooldown_is_capped() -> anyhow::Result<()> {
    let pool = pool(memory_storage());
    let account = pool.add_account(NewAccount::new(Platform::Xhs, "x", "cookie"))?;
    let other = pool.add_account(NewAccount::new(Platform::Xhs, "y", "cookie-2"))?;
    let t0 = Utc::now();
    let cap = Duration::seconds(MAX_COOLDOWN_SECS);

    let record = pool
        .mark_account_used_at(account.id, true, Some(u64::MAX), None, t0)
        .await?;
    assert_eq!(record.cooldown_until, Some(t0 + cap));
    let query = AccountQuery::new(Platform::Xhs);
    assert_ne!(pool.select_at(&query, t0).map(|a| a.id), Some(account.id));

    let record = pool
        .mark_account_used_at(other.id, false, Some(10_000_000_000_000), None, t0)
        .await?;
    assert_eq!(record.cooldown_until, Some(t0 + cap));
    assert!(pool.select_at(&query, t0 + Duration::days(30)).is_none());
    Ok(())
}

#[tokio::test]
async fn test_circuit_breaker_blocks_whole_platform() -> anyhow::Result<()> {
    let pool = pool(memory_storage());
    let mut ids = Vec::new();
    for i in 0..8 {
        let account = pool.add_account(NewAccount::new(
            Platform::Kuaishou,
            format!("k{}", i),
            format!("cookie-{}", i),
        ))?;
        ids.push(account.id);
    }
    let healthy = pool.add_account(NewAccount::new(Platform::Zhihu, "z", "cookie"))?;

    let t0 = Utc::now();
    for (i, id) in ids.iter().take(5).enumerate() {
        pool.mark_account_used_at(*id, false, Some(1), None, t0 + Duration::seconds(i as i64))
            .await?;
    }

    // Three untouched accounts remain healthy, but the breaker is open
    let query = AccountQuery::new(Platform::Kuaishou);
    assert!(pool.select_at(&query, t0 + Duration::seconds(10)).is_none());
    assert!(pool
        .select_at(&query, t0 + Duration::seconds(599))
        .is_none());

    // Once the first failure ages out the platform recovers
    assert!(pool.select_at(&query, t0 + Duration::seconds(600)).is_some());

    let zhihu = AccountQuery::new(Platform::Zhihu);
    assert_eq!(
        pool.select_at(&zhihu, t0 + Duration::seconds(10)).map(|a| a.id),
        Some(healthy.id)
    );
    Ok(())
}

#[tokio::test]
async fn test_sticky_project_preference() -> anyhow::Result<()> {
    let pool = pool(memory_storage());
    let first = pool.add_account(NewAccount::new(Platform::Xhs, "first", "c1"))?;
    let second = pool.add_account(NewAccount::new(Platform::Xhs, "second", "c2"))?;

    let t0 = Utc::now() - Duration::hours(1);
    pool.mark_account_used_at(first.id, true, Some(1), Some("campaign-a"), t0)
        .await?;
    pool.mark_account_used_at(second.id, true, Some(1), Some("campaign-b"), t0)
        .await?;

    let picked = pool.get_available_account(Platform::Xhs, &[], Some("campaign-b"), None);
    assert_eq!(picked.map(|a| a.id), Some(second.id));

    let picked = pool.get_available_account(Platform::Xhs, &[second.id], Some("campaign-b"), None);
    assert_eq!(picked.map(|a| a.id), Some(first.id));
    Ok(())
}

#[tokio::test]
async fn test_probe_never_undoes_ban() -> anyhow::Result<()> {
    let verifier = Arc::new(RecordingVerifier::new(CredentialVerdict::Valid));
    let pool = AccountPool::new(memory_storage(), &Config::default(), verifier.clone())?;
    let banned = pool.add_account(NewAccount::new(Platform::Tieba, "b", "c1"))?;
    let fine = pool.add_account(NewAccount::new(Platform::Tieba, "f", "c2"))?;

    pool.set_account_status(banned.id, AccountStatus::Banned, "platform ban")
        .await?;
    let outcomes = pool.batch_check_health(Some(Platform::Tieba)).await;
    assert_eq!(outcomes.len(), 2);

    let mut probed = verifier.probed.lock().unwrap().clone();
    probed.sort();
    assert_eq!(probed, vec![banned.id, fine.id]);

    assert_eq!(
        pool.get_account(banned.id).map(|a| a.status),
        Some(AccountStatus::Banned)
    );
    assert_eq!(
        pool.get_account(fine.id).map(|a| a.status),
        Some(AccountStatus::Active)
    );

    pool.set_account_status(banned.id, AccountStatus::Active, "unbanned")
        .await?;
    assert_eq!(
        pool.get_available_account(Platform::Tieba, &[fine.id], None, None)
            .map(|a| a.id),
        Some(banned.id)
    );
    Ok(())
}

#[tokio::test]
async fn test_state_survives_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("warden.db");

    let account_id = {
        let storage = crawl_warden::storage::shared(crawl_warden::storage::open_storage(&db_path)?);
        let pool = pool(storage);
        let account = pool.add_account(NewAccount::new(Platform::Xhs, "x", "cookie"))?;
        pool.mark_account_used(account.id, false, None, Some("p"))
            .await?;
        account.id
    };

    let storage = crawl_warden::storage::shared(crawl_warden::storage::open_storage(&db_path)?);
    let pool = pool(storage);
    let record = pool.get_account(account_id).expect("reloaded account");
    assert_eq!(record.fail_count, 1);
    assert_eq!(record.consecutive_fails, 1);
    assert_eq!(record.last_project_id.as_deref(), Some("p"));
    assert!(record.cooldown_until.is_some());
    Ok(())
}
