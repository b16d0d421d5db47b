//! End-to-end sync runs against a scripted archive and a real SQLite store

mod common;

use std::sync::Arc;

use card_sales_sync::domain::{ExistenceOracle, SearchQuery, SyncMode};
use card_sales_sync::infrastructure::{read_queries, write_queries};
use common::{Archive, coordinator, hit, hits, open_store};
use tokio_test::assert_ok;

#[tokio::test]
async fn small_query_is_stored_once_and_then_skipped() -> anyhow::Result<()> {
    let store = open_store().await?;
    let archive = Arc::new(Archive::new());
    let query = SearchQuery::new("1984 Star Michael Jordan 101");
    archive.publish(
        &query,
        vec![
            hit("a1", "2024-03-03T10:00:00.000Z", 1200.0),
            hit("a2", "2024-02-14T10:00:00.000Z", 1150.0),
            hit("a3", "2024-01-09T10:00:00.000Z", 990.0),
        ],
    );

    let stats = coordinator(archive.clone(), &store, SyncMode::Full, 50)
        .run(std::slice::from_ref(&query))
        .await?;
    assert_eq!(stats.inserted, 3);
    assert_eq!(stats.queries_updated, 1);
    assert_eq!(archive.pages_requested(&query), vec![0]);
    assert_eq!(store.sales.count_for_query(&query).await?, 3);

    archive.clear_requests();
    let again = coordinator(archive.clone(), &store, SyncMode::Full, 50)
        .run(std::slice::from_ref(&query))
        .await?;
    assert_eq!(again.queries_up_to_date, 1);
    assert_eq!(again.inserted, 0);
    assert_eq!(again.duplicates, 0);
    assert_eq!(archive.pages_requested(&query), vec![0]);
    assert_eq!(store.sales.total_records().await?, 3);
    Ok(())
}

#[tokio::test]
async fn daily_run_stops_at_the_first_known_sale() -> anyhow::Result<()> {
    let store = open_store().await?;
    let archive = Arc::new(Archive::new());
    let query = SearchQuery::new("2018 Prizm Luka Doncic 280 PSA 10").with_tier("A");
    archive.publish(&query, hits("old", 120));

    let full = coordinator(archive.clone(), &store, SyncMode::Full, 50)
        .run(std::slice::from_ref(&query))
        .await?;
    assert_eq!(full.inserted, 120);
    assert_eq!(archive.pages_requested(&query), vec![0, 1, 2]);

    archive.prepend(&query, hits("new", 7));
    archive.clear_requests();
    let daily = coordinator(archive.clone(), &store, SyncMode::Daily, 20)
        .run(std::slice::from_ref(&query))
        .await?;

    assert_eq!(daily.inserted, 7);
    assert_eq!(daily.duplicates, 0);
    assert_eq!(archive.pages_requested(&query), vec![0]);
    assert_eq!(store.sales.count_for_query(&query).await?, 127);
    Ok(())
}

#[tokio::test]
async fn sale_shared_by_two_queries_is_stored_once() -> anyhow::Result<()> {
    let store = open_store().await?;
    let archive = Arc::new(Archive::new());
    let first = SearchQuery::new("1986 Fleer Jordan 57");
    let second = SearchQuery::new("1986 Fleer Michael Jordan 57 PSA");
    archive.publish(&first, vec![hit("shared", "2024-05-01T00:00:00.000Z", 5000.0)]);
    archive.publish(
        &second,
        vec![
            hit("own", "2024-05-02T00:00:00.000Z", 5100.0),
            hit("shared", "2024-05-01T00:00:00.000Z", 5000.0),
        ],
    );

    let stats = coordinator(archive, &store, SyncMode::Full, 2)
        .run(&[first.clone(), second.clone()])
        .await?;

    assert_eq!(stats.records_fetched, 3);
    assert_eq!(stats.inserted, 2);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(store.sales.total_records().await?, 2);
    let owners = [
        store.sales.exists(&first, "shared").await?,
        store.sales.exists(&second, "shared").await?,
    ];
    assert_eq!(owners.iter().filter(|owned| **owned).count(), 1);
    Ok(())
}

#[tokio::test]
async fn daily_walk_passes_sales_stored_under_another_query() -> anyhow::Result<()> {
    let store = open_store().await?;
    let archive = Arc::new(Archive::new());
    let owner = SearchQuery::new("1989 Upper Deck Ken Griffey Jr 1");
    let overlapping = SearchQuery::new("1989 Upper Deck Griffey 1 PSA 9");
    archive.publish(&owner, vec![hit("shared", "2024-04-10T00:00:00.000Z", 300.0)]);
    coordinator(archive.clone(), &store, SyncMode::Full, 1)
        .run(std::slice::from_ref(&owner))
        .await?;

    archive.publish(
        &overlapping,
        vec![
            hit("kg-new", "2024-04-12T00:00:00.000Z", 310.0),
            hit("shared", "2024-04-10T00:00:00.000Z", 300.0),
            hit("kg-old-1", "2024-04-01T00:00:00.000Z", 280.0),
            hit("kg-old-2", "2024-03-20T00:00:00.000Z", 275.0),
        ],
    );
    let daily = coordinator(archive.clone(), &store, SyncMode::Daily, 1)
        .run(std::slice::from_ref(&overlapping))
        .await?;

    assert_eq!(daily.records_fetched, 4);
    assert_eq!(daily.inserted, 3);
    assert_eq!(daily.duplicates, 1);
    assert!(store.sales.exists(&overlapping, "kg-old-1").await?);
    assert!(store.sales.exists(&overlapping, "kg-old-2").await?);
    assert!(store.sales.exists(&owner, "shared").await?);

    archive.prepend(&overlapping, vec![hit("kg-newest", "2024-04-15T00:00:00.000Z", 320.0)]);
    archive.clear_requests();
    let next = coordinator(archive.clone(), &store, SyncMode::Daily, 1)
        .run(std::slice::from_ref(&overlapping))
        .await?;
    assert_eq!(next.inserted, 1);
    assert_eq!(archive.pages_requested(&overlapping), vec![0]);
    assert_eq!(store.sales.count_for_query(&overlapping).await?, 4);
    Ok(())
}

#[tokio::test]
async fn failed_query_is_reported_and_others_are_stored() -> anyhow::Result<()> {
    let store = open_store().await?;
    let archive = Arc::new(Archive::new());
    let healthy = SearchQuery::new("2003 Topps Chrome LeBron James 111");
    let broken = SearchQuery::new("2009 Bowman Chrome Mike Trout BDPP89");
    archive.publish(&healthy, hits("lbj", 64));
    archive.fail(&broken);

    let stats = coordinator(archive, &store, SyncMode::Full, 50)
        .run(&[broken.clone(), healthy.clone()])
        .await?;

    assert_eq!(stats.queries_failed, 1);
    assert_eq!(stats.failed_queries, vec![broken.clone()]);
    assert_eq!(stats.inserted, 64);
    assert_eq!(store.sales.count_for_query(&broken).await?, 0);

    let failed_out = store.dir.path().join("failed.csv");
    write_queries(&failed_out, &stats.failed_queries).await?;
    assert_eq!(read_queries(&failed_out).await?, vec![broken]);
    Ok(())
}

#[tokio::test]
async fn query_file_feeds_a_sync_run() -> anyhow::Result<()> {
    let store = open_store().await?;
    let input = store.dir.path().join("queries.csv");
    tokio::fs::write(
        &input,
        "Queries,Tier\n\"1993 SP Derek Jeter 279\",A\n  1993 SP  Derek Jeter 279 ,A\n1997 Pokemon Charizard 4,B\n",
    )
    .await?;

    let queries = assert_ok!(read_queries(&input).await);
    assert_eq!(queries.len(), 2);

    let archive = Arc::new(Archive::new());
    archive.publish(&queries[0], hits("jeter", 2));
    archive.publish(&queries[1], hits("zard", 5));
    let stats = coordinator(archive, &store, SyncMode::Daily, 20).run(&queries).await?;

    assert_eq!(stats.total_queries, 2);
    assert_eq!(stats.inserted, 7);
    assert_eq!(store.sales.total_records().await?, 7);
    Ok(())
}
