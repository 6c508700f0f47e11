#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Postgres store tests. These start a container and need Docker:
//! `cargo test --test test_store -- --ignored`

#[cfg(test)]
mod postgres_store_tests {
    use std::{str::FromStr, sync::Arc};

    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use testcontainers_modules::{
        postgres::Postgres,
        testcontainers::{runners::AsyncRunner, ContainerAsync},
    };
    use transfer_indexer::{
        db::DbConnection,
        store::{PostgresStore, Store, StoreConfig, TransferEventFilter},
        types::{Address, BlockNumber, TransactionHash, TransferEvent},
    };

    async fn start_postgres() -> (ContainerAsync<Postgres>, String) {
        let container = Postgres::default().start().await.unwrap();
        let db_url = format!(
            "postgres://postgres:postgres@{}:{}/postgres",
            container.get_host().await.unwrap(),
            container.get_host_port_ipv4(5432).await.unwrap()
        );
        (container, db_url)
    }

    fn address(n: u64) -> Address {
        Address::new(format!("0x{n:040x}")).unwrap()
    }

    fn transfer(chain: &str, block: i64, log_index: i64) -> TransferEvent {
        TransferEvent {
            chain: chain.to_string(),
            tx_hash: TransactionHash::new(format!("0x{block:032x}{log_index:032x}")).unwrap(),
            log_index,
            block_number: BlockNumber::from_trusted(block),
            timestamp: Utc.timestamp_opt(1_700_000_000 + block * 12, 0).unwrap(),
            from: address(1),
            from_label: Some("Exchange1".to_string()),
            to: address(2),
            to_label: None,
            token_address: address(0xaa),
            token_symbol: "USDX".to_string(),
            amount: Decimal::from_str("1.5").unwrap(),
            usd_value: Some(Decimal::from_str("3").unwrap()),
        }
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    #[serial_test::serial]
    async fn should_persist_transfers_idempotently() {
        let (_container, db_url) = start_postgres().await;
        let store = Store::connect(&StoreConfig::postgres(db_url)).await.unwrap();
        store.check_connection().await.unwrap();

        let batch: Vec<TransferEvent> = (100..103).map(|b| transfer("ethereum", b, 0)).collect();
        assert_eq!(store.save_transfer_events(&batch).await.unwrap(), 3);
        assert_eq!(store.save_transfer_events(&batch).await.unwrap(), 0);

        let events = store
            .get_transfer_events(&TransferEventFilter::for_chain("ethereum"))
            .await
            .unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], transfer("ethereum", 102, 0));
        assert_eq!(events[2].block_number.value(), 100);

        store.disconnect().await;
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    #[serial_test::serial]
    async fn should_filter_and_limit_transfers() {
        let (_container, db_url) = start_postgres().await;
        let store = Store::connect(&StoreConfig::postgres(db_url)).await.unwrap();

        let mut batch: Vec<TransferEvent> = (0..5).map(|i| transfer("ethereum", 200, i)).collect();
        let mut other = transfer("polygon", 200, 0);
        other.from = address(7);
        batch.push(other);
        store.save_transfer_events(&batch).await.unwrap();

        let limited = store
            .get_transfer_events(&TransferEventFilter::for_chain("ethereum").limit(2))
            .await
            .unwrap();
        assert_eq!(
            limited.iter().map(|e| e.log_index).collect::<Vec<_>>(),
            vec![4, 3]
        );

        let by_sender = store
            .get_transfer_events(&TransferEventFilter {
                from: Some(address(7)),
                ..TransferEventFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_sender.len(), 1);
        assert_eq!(by_sender[0].chain, "polygon");
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    #[serial_test::serial]
    async fn should_filter_by_token_recipient_and_block_range() {
        let (_container, db_url) = start_postgres().await;
        let store = Store::connect(&StoreConfig::postgres(db_url)).await.unwrap();

        let mut batch: Vec<TransferEvent> = (300..305).map(|b| transfer("ethereum", b, 0)).collect();
        let mut other_token = transfer("ethereum", 302, 1);
        other_token.token_address = address(0xbb);
        other_token.to = address(3);
        batch.push(other_token);
        store.save_transfer_events(&batch).await.unwrap();

        let by_token = store
            .get_transfer_events(&TransferEventFilter {
                token_address: Some(address(0xbb)),
                ..TransferEventFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_token.len(), 1);
        assert_eq!(by_token[0].to, address(3));

        let by_recipient = store
            .get_transfer_events(&TransferEventFilter {
                to: Some(address(2)),
                ..TransferEventFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_recipient.len(), 5);
        assert!(by_recipient.iter().all(|e| e.token_address == address(0xaa)));

        let window = store
            .get_transfer_events(&TransferEventFilter {
                from_block: Some(BlockNumber::from_trusted(301)),
                to_block: Some(BlockNumber::from_trusted(303)),
                ..TransferEventFilter::for_chain("ethereum")
            })
            .await
            .unwrap();
        assert_eq!(
            window
                .iter()
                .map(|e| (e.block_number.value(), e.log_index))
                .collect::<Vec<_>>(),
            vec![(303, 0), (302, 1), (302, 0), (301, 0)]
        );
    }

    #[tokio::test]
    #[ignore = "requires docker"]
    #[serial_test::serial]
    async fn should_never_move_checkpoint_backwards() {
        let (_container, db_url) = start_postgres().await;
        let db = DbConnection::new(db_url).await.unwrap();
        db.migrate().await.unwrap();
        let store = Store::Postgres(PostgresStore::from_connection(Arc::clone(&db)));

        assert_eq!(store.get_latest_block("ethereum").await.unwrap(), None);

        store
            .update_latest_block("ethereum", BlockNumber::from_trusted(120))
            .await
            .unwrap();
        store
            .update_latest_block("ethereum", BlockNumber::from_trusted(110))
            .await
            .unwrap();
        assert_eq!(
            store.get_latest_block("ethereum").await.unwrap(),
            Some(BlockNumber::from_trusted(120))
        );

        store
            .update_latest_block("polygon", BlockNumber::from_trusted(5))
            .await
            .unwrap();
        let checkpoints = store.get_checkpoints().await.unwrap();
        assert_eq!(checkpoints.len(), 2);
    }
}
