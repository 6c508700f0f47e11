use sqlx::{Pool, Postgres};

use crate::errors::Result;
use crate::types::{BlockNumber, ChainCheckpoint};

#[derive(Debug, sqlx::FromRow)]
pub struct ChainCheckpointDto {
    pub chain: String,
    pub latest_block: i64,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<ChainCheckpointDto> for ChainCheckpoint {
    fn from(dto: ChainCheckpointDto) -> Self {
        Self {
            chain: dto.chain,
            latest_block: BlockNumber::from_trusted(dto.latest_block),
            updated_at: dto.updated_at,
        }
    }
}

pub async fn get_latest_block(pool: &Pool<Postgres>, chain: &str) -> Result<Option<BlockNumber>> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT latest_block FROM chain_checkpoints WHERE chain = $1")
            .bind(chain)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(block,)| BlockNumber::from_trusted(block)))
}

/// Upserts the checkpoint. `GREATEST` keeps it from ever moving backwards.
pub async fn update_latest_block(
    pool: &Pool<Postgres>,
    chain: &str,
    block: BlockNumber,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO chain_checkpoints (chain, latest_block, updated_at)
        VALUES ($1, $2, CURRENT_TIMESTAMP)
        ON CONFLICT (chain)
        DO UPDATE SET
            latest_block = GREATEST(chain_checkpoints.latest_block, EXCLUDED.latest_block),
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(chain)
    .bind(block.value())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_checkpoints(pool: &Pool<Postgres>) -> Result<Vec<ChainCheckpoint>> {
    let rows: Vec<ChainCheckpointDto> = sqlx::query_as(
        r#"
        SELECT chain, latest_block, updated_at
        FROM chain_checkpoints
        ORDER BY chain
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ChainCheckpoint::from).collect())
}
