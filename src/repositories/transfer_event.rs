use rust_decimal::Decimal;
use sqlx::{query_builder::Separated, Pool, Postgres, QueryBuilder};
use tracing::debug;

use crate::errors::Result;
use crate::store::TransferEventFilter;
use crate::types::{Address, BlockNumber, TransactionHash, TransferEvent};

/// Rows per INSERT statement. 13 binds per row stays far below the
/// Postgres limit of 65535 parameters.
const INSERT_CHUNK_SIZE: usize = 1000;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TransferEventDto {
    pub chain: String,
    pub tx_hash: String,
    pub log_index: i64,
    pub block_number: i64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub from_address: String,
    pub from_label: Option<String>,
    pub to_address: String,
    pub to_label: Option<String>,
    pub token_address: String,
    pub token_symbol: String,
    pub amount: Decimal,
    pub usd_value: Option<Decimal>,
}

impl From<TransferEventDto> for TransferEvent {
    fn from(dto: TransferEventDto) -> Self {
        Self {
            chain: dto.chain,
            tx_hash: TransactionHash::from_trusted(dto.tx_hash),
            log_index: dto.log_index,
            block_number: BlockNumber::from_trusted(dto.block_number),
            timestamp: dto.timestamp,
            from: Address::from_trusted(dto.from_address),
            from_label: dto.from_label,
            to: Address::from_trusted(dto.to_address),
            to_label: dto.to_label,
            token_address: Address::from_trusted(dto.token_address),
            token_symbol: dto.token_symbol,
            amount: dto.amount,
            usd_value: dto.usd_value,
        }
    }
}

/// Inserts `events` in one transaction, skipping rows that already exist.
/// Returns how many rows were new.
pub async fn insert_transfer_events(pool: &Pool<Postgres>, events: &[TransferEvent]) -> Result<u64> {
    if events.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for chunk in events.chunks(INSERT_CHUNK_SIZE) {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO transfer_events (
                chain, tx_hash, log_index, block_number, timestamp,
                from_address, from_label, to_address, to_label,
                token_address, token_symbol, amount, usd_value
            )",
        );

        query_builder.push_values(
            chunk.iter(),
            |mut b: Separated<'_, '_, Postgres, &'static str>, event| {
                b.push_bind(&event.chain)
                    .push_bind(event.tx_hash.value())
                    .push_bind(event.log_index)
                    .push_bind(event.block_number.value())
                    .push_bind(event.timestamp)
                    .push_bind(event.from.value())
                    .push_bind(&event.from_label)
                    .push_bind(event.to.value())
                    .push_bind(&event.to_label)
                    .push_bind(event.token_address.value())
                    .push_bind(&event.token_symbol)
                    .push_bind(event.amount)
                    .push_bind(event.usd_value);
            },
        );

        query_builder.push(" ON CONFLICT (chain, tx_hash, log_index) DO NOTHING");

        let result = query_builder.build().execute(&mut *tx).await?;
        inserted += result.rows_affected();
    }

    tx.commit().await?;

    debug!(
        "[db] Inserted {} of {} transfer events",
        inserted,
        events.len()
    );
    Ok(inserted)
}

/// Filtered read, newest first by block then log index.
pub async fn get_transfer_events(
    pool: &Pool<Postgres>,
    filter: &TransferEventFilter,
) -> Result<Vec<TransferEvent>> {
    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT
            chain, tx_hash, log_index, block_number, timestamp,
            from_address, from_label, to_address, to_label,
            token_address, token_symbol, amount, usd_value
        FROM transfer_events
        WHERE TRUE",
    );

    if let Some(chain) = &filter.chain {
        query_builder.push(" AND chain = ").push_bind(chain);
    }
    if let Some(token) = &filter.token_address {
        query_builder
            .push(" AND token_address = ")
            .push_bind(token.value());
    }
    if let Some(from) = &filter.from {
        query_builder
            .push(" AND from_address = ")
            .push_bind(from.value());
    }
    if let Some(to) = &filter.to {
        query_builder.push(" AND to_address = ").push_bind(to.value());
    }
    if let Some(from_block) = filter.from_block {
        query_builder
            .push(" AND block_number >= ")
            .push_bind(from_block.value());
    }
    if let Some(to_block) = filter.to_block {
        query_builder
            .push(" AND block_number <= ")
            .push_bind(to_block.value());
    }

    query_builder
        .push(" ORDER BY block_number DESC, log_index DESC LIMIT ")
        .push_bind(filter.effective_limit());

    let rows: Vec<TransferEventDto> = query_builder.build_query_as().fetch_all(pool).await?;

    Ok(rows.into_iter().map(TransferEvent::from).collect())
}
